use tracing::warn;

use crate::backend::WindowBackend;
use crate::engine::Engine;
use crate::events::Event;
use crate::geometry::{Direction, Rect, SplitType};
use crate::model::client::ClientState;
use crate::model::forest::{NodeId, MAX_TREE_DEPTH};
use crate::model::monitor::{DesktopId, Layout, MonitorId};

fn clamped_rect(x: i32, y: i32, width: i32, height: i32) -> Rect {
    Rect::new(
        x.clamp(i16::MIN as i32, i16::MAX as i32) as i16,
        y.clamp(i16::MIN as i32, i16::MAX as i32) as i16,
        width.clamp(0, u16::MAX as i32) as u16,
        height.clamp(0, u16::MAX as i32) as u16,
    )
}

impl<B: WindowBackend> Engine<B> {
    /// Recomputes every leaf rectangle of the desktop from the monitor
    /// rectangle, paddings, gap and layout.
    pub fn arrange(&mut self, m: MonitorId, d: DesktopId) {
        let (Some(mon), Some(desk)) = (self.monitors.get(m), self.desktops.get(d)) else {
            return;
        };
        let Some(root) = desk.root else { return };

        let mr = mon.rectangle;
        let (mp, dp) = (mon.padding, desk.padding);
        let monocle = desk.layout == Layout::Monocle;
        let gap = desk.window_gap as i32;

        let mut x = mr.x as i32 + mp.left as i32 + dp.left as i32;
        let mut y = mr.y as i32 + mp.top as i32 + dp.top as i32;
        let mut width = mr.width as i32
            - (mp.left as i32 + dp.left as i32 + dp.right as i32 + mp.right as i32);
        let mut height = mr.height as i32
            - (mp.top as i32 + dp.top as i32 + dp.bottom as i32 + mp.bottom as i32);

        if monocle {
            let mo = self.settings.monocle_padding;
            x += mo.left as i32;
            y += mo.top as i32;
            width -= mo.left as i32 + mo.right as i32;
            height -= mo.top as i32 + mo.bottom as i32;
        }

        if !self.settings.gapless_monocle || !monocle {
            x += gap;
            y += gap;
            width -= gap;
            height -= gap;
        }

        let rect = clamped_rect(x, y, width, height);
        self.apply_layout(m, d, root, rect, rect, 0);
    }

    fn apply_layout(
        &mut self,
        m: MonitorId,
        d: DesktopId,
        n: NodeId,
        rect: Rect,
        root_rect: Rect,
        depth: usize,
    ) {
        if depth > MAX_TREE_DEPTH {
            warn!("depth guard tripped while applying layout");
            return;
        }
        if !self.forest.contains(n) {
            return;
        }

        self.forest[n].rectangle = rect;

        if self.forest[n].presel.is_some() {
            self.draw_presel_feedback(m, d, n);
        }

        let Some(children) = self.forest[n].children else {
            self.apply_leaf_layout(m, d, n, rect);
            return;
        };

        let [first, second] = children;
        let monocle = self.desktops[d].layout == Layout::Monocle;
        let either_vacant = self.forest[first].vacant || self.forest[second].vacant;

        let (first_rect, second_rect) = if monocle || either_vacant {
            (rect, rect)
        } else {
            let split_type = self.forest[n].split_type;
            let ratio = self.forest[n].split_ratio;
            let (c1, c2) = (self.forest[first].constraints, self.forest[second].constraints);

            match split_type {
                SplitType::Vertical => {
                    let mut fence = (rect.width as f64 * ratio) as u16;
                    let min_sum = c1.min_width.saturating_add(c2.min_width);
                    if min_sum <= rect.width {
                        if fence < c1.min_width {
                            fence = c1.min_width;
                            self.forest[n].split_ratio = fence as f64 / rect.width as f64;
                        } else if fence > rect.width - c2.min_width {
                            fence = rect.width - c2.min_width;
                            self.forest[n].split_ratio = fence as f64 / rect.width as f64;
                        }
                    }
                    (
                        Rect::new(rect.x, rect.y, fence, rect.height),
                        clamped_rect(
                            rect.x as i32 + fence as i32,
                            rect.y as i32,
                            rect.width as i32 - fence as i32,
                            rect.height as i32,
                        ),
                    )
                }
                SplitType::Horizontal => {
                    let mut fence = (rect.height as f64 * ratio) as u16;
                    let min_sum = c1.min_height.saturating_add(c2.min_height);
                    if min_sum <= rect.height {
                        if fence < c1.min_height {
                            fence = c1.min_height;
                            self.forest[n].split_ratio = fence as f64 / rect.height as f64;
                        } else if fence > rect.height - c2.min_height {
                            fence = rect.height - c2.min_height;
                            self.forest[n].split_ratio = fence as f64 / rect.height as f64;
                        }
                    }
                    (
                        Rect::new(rect.x, rect.y, rect.width, fence),
                        clamped_rect(
                            rect.x as i32,
                            rect.y as i32 + fence as i32,
                            rect.width as i32,
                            rect.height as i32 - fence as i32,
                        ),
                    )
                }
            }
        };

        self.apply_layout(m, d, first, first_rect, root_rect, depth + 1);
        self.apply_layout(m, d, second, second_rect, root_rect, depth + 1);
    }

    fn apply_leaf_layout(&mut self, m: MonitorId, d: DesktopId, n: NodeId, rect: Rect) {
        let id = self.forest[n].id;
        let Some(client) = self.forest[n].client.as_ref() else {
            return;
        };

        let monocle = self.desktops[d].layout == Layout::Monocle;
        let root_is_single_client = self.desktops[d]
            .root
            .map(|r| self.forest.is_leaf(r) && self.forest[r].client.is_some())
            .unwrap_or(false);
        let the_only_window = self.monitor_order.len() == 1 && root_is_single_client;

        let state = client.state;
        let bw = if (self.settings.borderless_monocle && monocle && state.is_tiled())
            || (self.settings.borderless_singleton && the_only_window)
            || state.is_fullscreen()
        {
            0
        } else {
            client.border_width
        };

        let floating = client.floating_rectangle;
        let honor_size_hints = client.honor_size_hints;

        let mut r = match state {
            ClientState::Tiled | ClientState::PseudoTiled => {
                let wg = if self.settings.gapless_monocle && monocle {
                    0
                } else {
                    self.desktops[d].window_gap
                };
                let bleed = wg as i32 + 2 * bw as i32;
                let mut r = rect;
                r.width = if bleed < r.width as i32 {
                    (r.width as i32 - bleed) as u16
                } else {
                    1
                };
                r.height = if bleed < r.height as i32 {
                    (r.height as i32 - bleed) as u16
                } else {
                    1
                };

                if state == ClientState::PseudoTiled {
                    r.width = r.width.min(floating.width.max(1));
                    r.height = r.height.min(floating.height.max(1));
                    if self.settings.center_pseudo_tiled {
                        r.x = (rect.x as i32 - bw as i32
                            + (rect.width as i32 - wg as i32 - r.width as i32) / 2)
                            .clamp(i16::MIN as i32, i16::MAX as i32)
                            as i16;
                        r.y = (rect.y as i32 - bw as i32
                            + (rect.height as i32 - wg as i32 - r.height as i32) / 2)
                            .clamp(i16::MIN as i32, i16::MAX as i32)
                            as i16;
                    }
                }
                r
            }
            ClientState::Floating => floating,
            ClientState::Fullscreen => self.monitors[m].rectangle,
        };

        if state.is_tiled() || state.is_fullscreen() {
            if let Some(client) = self.forest[n].client.as_mut() {
                client.tiled_rectangle = r;
            }
        }

        if honor_size_hints {
            let client = self.forest[n].client.as_ref().cloned();
            if let Some(client) = client {
                self.backend.apply_size_hints(&client, &mut r.width, &mut r.height);
            }
        }

        if self.backend.window_rectangle(id) != Some(r) {
            self.backend.move_resize(id, r);
            let (mid, did) = (self.mid(m), self.did(d));
            self.emit(Event::NodeGeometry { monitor: mid, desktop: did, node: id, rect: r });
        }

        self.backend.set_border_width(id, bw);
    }

    /// Positions (and creates on demand) the translucent feedback window
    /// over the area a preselected insertion would occupy.
    pub(crate) fn draw_presel_feedback(&mut self, m: MonitorId, d: DesktopId, n: NodeId) {
        if !self.settings.presel_feedback {
            return;
        }
        let Some(node) = self.forest.get(n) else { return };
        let Some(presel) = node.presel else { return };

        let monocle = self
            .desktops
            .get(d)
            .map(|x| x.layout == Layout::Monocle)
            .unwrap_or(false);
        let tiled = node.client.as_ref().map(|c| c.state.is_tiled()).unwrap_or(false);
        if monocle && tiled {
            return;
        }

        let gap = if self.settings.gapless_monocle && monocle {
            0
        } else {
            self.desktops.get(d).map(|x| x.window_gap).unwrap_or(0)
        };
        let hidden = node.hidden;
        let area = {
            let mut a = node.rectangle;
            a.width = a.width.saturating_sub(gap);
            a.height = a.height.saturating_sub(gap);
            a
        };

        let ratio = presel.split_ratio;
        let r = match presel.split_dir {
            Direction::West => Rect::new(
                area.x,
                area.y,
                ((area.width as f64) * ratio) as u16,
                area.height,
            ),
            Direction::East => {
                let fence = ((area.width as f64) * ratio) as u16;
                clamped_rect(
                    area.x as i32 + fence as i32,
                    area.y as i32,
                    area.width as i32 - fence as i32,
                    area.height as i32,
                )
            }
            Direction::North => Rect::new(
                area.x,
                area.y,
                area.width,
                ((area.height as f64) * ratio) as u16,
            ),
            Direction::South => {
                let fence = ((area.height as f64) * ratio) as u16;
                clamped_rect(
                    area.x as i32,
                    area.y as i32 + fence as i32,
                    area.width as i32,
                    area.height as i32 - fence as i32,
                )
            }
        };

        let feedback = match presel.feedback {
            Some(f) => f,
            None => {
                let f = self.backend.generate_id();
                if let Some(p) = self.forest[n].presel.as_mut() {
                    p.feedback = Some(f);
                }
                f
            }
        };

        self.backend.move_resize(feedback, r);
        let active = self.monitors.get(m).map(|x| x.desk == Some(d)).unwrap_or(false);
        if active && !hidden {
            self.backend.show(feedback);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::engine::test_support::{assert_invariants, managed, single_monitor};
    use crate::geometry::{Padding, Rect};
    use crate::model::client::ClientState;
    use crate::model::monitor::Layout;

    #[test]
    fn first_window_fills_the_padded_gapped_monitor() {
        let (mut engine, m, d) = single_monitor(Rect::new(0, 0, 1000, 1000));
        engine.set_window_gap(d, 10);
        let l = managed(&mut engine, m, d);

        let desk = engine.desktop(d).unwrap();
        assert_eq!(desk.root, Some(l));
        assert_eq!(desk.focus, Some(l));
        let client = engine.forest()[l].client.as_ref().unwrap();
        assert_eq!(client.tiled_rectangle, Rect::new(10, 10, 980, 980));
        assert_invariants(&engine);
    }

    #[test]
    fn longest_side_splits_a_wide_leaf_vertically() {
        let (mut engine, m, d) = single_monitor(Rect::new(0, 0, 1000, 1000));
        engine.set_window_gap(d, 10);
        let a = managed(&mut engine, m, d);
        let b = managed(&mut engine, m, d);

        let ca = engine.forest()[a].client.as_ref().unwrap();
        let cb = engine.forest()[b].client.as_ref().unwrap();
        assert_eq!(ca.tiled_rectangle, Rect::new(10, 10, 485, 980));
        assert_eq!(cb.tiled_rectangle, Rect::new(505, 10, 485, 980));
        assert_invariants(&engine);
    }

    #[test]
    fn monocle_layers_every_leaf_at_the_full_rect() {
        let (mut engine, m, d) = single_monitor(Rect::new(0, 0, 1000, 1000));
        engine.settings.gapless_monocle = true;
        engine.set_window_gap(d, 10);
        let a = managed(&mut engine, m, d);
        let b = managed(&mut engine, m, d);
        let stacking_before = engine.stacking().to_vec();

        engine.set_layout(m, d, Layout::Monocle, true);

        let ca = engine.forest()[a].client.as_ref().unwrap();
        let cb = engine.forest()[b].client.as_ref().unwrap();
        assert_eq!(ca.tiled_rectangle, Rect::new(0, 0, 1000, 1000));
        assert_eq!(cb.tiled_rectangle, ca.tiled_rectangle);
        assert_eq!(engine.stacking(), stacking_before.as_slice());
        assert_invariants(&engine);
    }

    #[test]
    fn monocle_padding_applies_on_top_of_desktop_padding() {
        let (mut engine, m, d) = single_monitor(Rect::new(0, 0, 1000, 1000));
        engine.settings.gapless_monocle = true;
        engine.settings.monocle_padding = Padding { top: 5, right: 5, bottom: 5, left: 5 };
        let a = managed(&mut engine, m, d);
        engine.set_layout(m, d, Layout::Monocle, true);

        let ca = engine.forest()[a].client.as_ref().unwrap();
        assert_eq!(ca.tiled_rectangle, Rect::new(5, 5, 990, 990));
    }

    #[test]
    fn split_ratio_clamps_against_child_minima() {
        let (mut engine, m, d) = single_monitor(Rect::new(0, 0, 100, 100));
        let a = managed(&mut engine, m, d);
        let b = managed(&mut engine, m, d);
        let root = engine.desktop(d).unwrap().root.unwrap();
        // 100px wide, both children need 32: a ratio of 0.1 would starve
        // the first child, so the fence clamps to 32 and the stored
        // ratio is rewritten.
        engine.forest.set_split_ratio(root, 0.1);
        engine.arrange(m, d);

        let ca = engine.forest()[a].client.as_ref().unwrap();
        assert_eq!(ca.tiled_rectangle.width, 32);
        assert!((engine.forest()[root].split_ratio - 0.32).abs() < 1e-9);
        let _ = b;
    }

    #[test]
    fn split_ratio_survives_when_minima_cannot_fit() {
        let (mut engine, m, d) = single_monitor(Rect::new(0, 0, 50, 100));
        let a = managed(&mut engine, m, d);
        let b = managed(&mut engine, m, d);
        let root = engine.desktop(d).unwrap().root.unwrap();
        engine.forest.set_split_ratio(root, 0.2);
        engine.arrange(m, d);
        // 50px cannot host two 32px minima: no clamping, ratio untouched.
        assert!((engine.forest()[root].split_ratio - 0.2).abs() < 1e-9);
        let _ = (a, b);
    }

    #[test]
    fn floating_leaf_keeps_its_own_rectangle() {
        let (mut engine, m, d) = single_monitor(Rect::new(0, 0, 1000, 1000));
        let a = managed(&mut engine, m, d);
        let b = managed(&mut engine, m, d);
        if let Some(client) = engine.forest.get_mut(b).and_then(|x| x.client.as_mut()) {
            client.floating_rectangle = Rect::new(100, 100, 300, 200);
        }
        engine.set_state(m, d, b, ClientState::Floating);
        engine.arrange(m, d);

        // The tiled sibling reclaims the whole area; the floating leaf
        // answers queries with its floating rectangle.
        let ca = engine.forest()[a].client.as_ref().unwrap();
        assert_eq!(ca.tiled_rectangle.width, 1000);
        assert_eq!(
            engine.get_rectangle(Some(m), Some(d), Some(b)),
            Rect::new(100, 100, 300, 200)
        );
    }

    #[test]
    fn fullscreen_leaf_covers_the_monitor() {
        let (mut engine, m, d) = single_monitor(Rect::new(0, 0, 1000, 1000));
        engine.set_window_gap(d, 10);
        let a = managed(&mut engine, m, d);
        let b = managed(&mut engine, m, d);
        engine.set_state(m, d, b, ClientState::Fullscreen);
        engine.arrange(m, d);

        let cb = engine.forest()[b].client.as_ref().unwrap();
        assert_eq!(cb.tiled_rectangle, Rect::new(0, 0, 1000, 1000));
        let _ = a;
    }

    #[test]
    fn pseudo_tiled_clamps_to_the_floating_size() {
        let (mut engine, m, d) = single_monitor(Rect::new(0, 0, 1000, 1000));
        let a = managed(&mut engine, m, d);
        if let Some(client) = engine.forest.get_mut(a).and_then(|x| x.client.as_mut()) {
            client.floating_rectangle = Rect::new(0, 0, 400, 300);
        }
        engine.set_state(m, d, a, ClientState::PseudoTiled);
        engine.arrange(m, d);

        let ca = engine.forest()[a].client.as_ref().unwrap();
        assert_eq!(ca.tiled_rectangle.width, 400);
        assert_eq!(ca.tiled_rectangle.height, 300);
    }

    #[test]
    fn unchanged_rectangles_are_not_reconfigured() {
        let (mut engine, m, d) = single_monitor(Rect::new(0, 0, 1000, 1000));
        let a = managed(&mut engine, m, d);
        engine.backend.clear_calls();
        engine.arrange(m, d);
        assert!(engine.backend.moves_of(engine.forest()[a].id).is_empty());
    }
}

use std::cmp::Ordering;

use crate::backend::WindowBackend;
use crate::engine::Engine;
use crate::events::Event;
use crate::geometry::{
    boundary_distance, cmp_rects, contains, is_inside, on_dir_side, CycleDir, Direction, Point,
    Rect,
};
use crate::model::client::Client;
use crate::model::forest::NodeId;
use crate::model::monitor::{Monitor, MonitorId};

/// One entry of the backend's output list, consumed by
/// [`Engine::update_monitors`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputInfo {
    pub randr_id: u32,
    pub name: String,
    /// Present when the output drives a CRTC.
    pub rect: Option<Rect>,
    pub connected: bool,
}

impl<B: WindowBackend> Engine<B> {
    pub fn add_monitor(&mut self, name: &str, rect: Rect) -> MonitorId {
        let id = self.backend.generate_id();
        let mut monitor = Monitor::new(id, name, rect);
        monitor.padding = self.settings.padding;
        monitor.border_width = self.settings.border_width;
        monitor.window_gap = self.settings.window_gap;
        let m = self.monitors.insert(monitor);

        // Keep the order sorted top-to-bottom, left-to-right.
        let pos = self
            .monitor_order
            .iter()
            .position(|&a| cmp_rects(rect, self.monitors[a].rectangle) != Ordering::Greater)
            .unwrap_or(self.monitor_order.len());
        self.monitor_order.insert(pos, m);

        if self.focused_monitor.is_none() {
            self.focused_monitor = Some(m);
        }

        let (mid, name) = (self.mid(m), self.monitors[m].name.clone());
        self.emit(Event::MonitorAdd { monitor: mid, name, rect });
        self.emit(Event::Report);
        m
    }

    pub fn rename_monitor(&mut self, m: MonitorId, name: &str) {
        let Some(monitor) = self.monitors.get_mut(m) else { return };
        let old_name = std::mem::replace(&mut monitor.name, name.to_string());
        let mid = self.mid(m);
        self.emit(Event::MonitorRename {
            monitor: mid,
            old_name,
            new_name: name.to_string(),
        });
        self.emit(Event::Report);
    }

    pub fn find_monitor_by_randr_id(&self, randr_id: u32) -> Option<MonitorId> {
        self.monitor_order
            .iter()
            .copied()
            .find(|&m| self.monitors[m].randr_id == Some(randr_id))
    }

    pub fn remove_monitor(&mut self, m: MonitorId) {
        if !self.monitors.contains_key(m) {
            return;
        }
        let mid = self.mid(m);
        self.emit(Event::MonitorRemove { monitor: mid });

        while let Some(d) = self.monitors[m].desk_head() {
            self.remove_desktop(m, d);
        }

        let last_focused = self.focused_monitor;
        self.monitor_order.retain(|&x| x != m);
        if self.primary_monitor == Some(m) {
            self.primary_monitor = None;
        }
        if self.focused_monitor == Some(m) {
            self.focused_monitor = None;
        }
        self.history.retain(|e| e.monitor != m);
        self.monitors.remove(m);

        if self.focused_monitor != last_focused {
            self.focus_node(None, None, None);
        }
        self.emit(Event::Report);
    }

    /// Moves every desktop of `ms` onto `md`.
    pub fn merge_monitors(&mut self, ms: MonitorId, md: MonitorId) {
        if ms == md || !self.monitors.contains_key(ms) || !self.monitors.contains_key(md) {
            return;
        }
        let desktops: Vec<_> = self.monitors[ms].desktops.clone();
        for d in desktops {
            self.transfer_desktop(ms, md, d, false);
        }
    }

    pub fn swap_monitors(&mut self, m1: MonitorId, m2: MonitorId) -> bool {
        if m1 == m2 {
            return false;
        }
        let (Some(i1), Some(i2)) = (
            self.monitor_order.iter().position(|&x| x == m1),
            self.monitor_order.iter().position(|&x| x == m2),
        ) else {
            return false;
        };
        self.monitor_order.swap(i1, i2);
        let (mid1, mid2) = (self.mid(m1), self.mid(m2));
        self.emit(Event::MonitorSwap { src_monitor: mid1, dst_monitor: mid2 });
        self.emit(Event::Report);
        true
    }

    /// Bubbles `m` to its sorted position after a geometry change.
    pub(crate) fn reorder_monitor(&mut self, m: MonitorId) {
        loop {
            let Some(pos) = self.monitor_order.iter().position(|&x| x == m) else { return };
            let rect = self.monitors[m].rectangle;
            if pos > 0 {
                let prev = self.monitor_order[pos - 1];
                if cmp_rects(rect, self.monitors[prev].rectangle) == Ordering::Less {
                    self.swap_monitors(m, prev);
                    continue;
                }
            }
            if pos + 1 < self.monitor_order.len() {
                let next = self.monitor_order[pos + 1];
                if cmp_rects(rect, self.monitors[next].rectangle) == Ordering::Greater {
                    self.swap_monitors(m, next);
                    continue;
                }
            }
            return;
        }
    }

    /// Applies a new output rectangle: floating windows keep their
    /// relative position, every desktop is re-arranged, and the monitor
    /// is re-sorted.
    pub fn update_root(&mut self, m: MonitorId, rect: Rect) {
        let Some(monitor) = self.monitors.get_mut(m) else { return };
        let last_rect = std::mem::replace(&mut monitor.rectangle, rect);

        if last_rect != rect {
            let mid = self.mid(m);
            self.emit(Event::MonitorGeometry { monitor: mid, rect });
        }

        let desktops: Vec<_> = self.monitors[m].desktops.clone();
        for d in desktops {
            if let Some(root) = self.desktops[d].root {
                self.adapt_geometry(last_rect, rect, root);
            }
            self.arrange(m, d);
        }
        self.reorder_monitor(m);
    }

    pub fn focus_monitor(&mut self, m: MonitorId) -> bool {
        self.focus_node(Some(m), None, None)
    }

    pub fn closest_monitor(&self, m: MonitorId, dir: CycleDir) -> Option<MonitorId> {
        if self.monitor_order.len() < 2 {
            return None;
        }
        let pos = self.monitor_order.iter().position(|&x| x == m)?;
        let next = match dir {
            CycleDir::Next => (pos + 1) % self.monitor_order.len(),
            CycleDir::Prev => (pos + self.monitor_order.len() - 1) % self.monitor_order.len(),
        };
        Some(self.monitor_order[next])
    }

    pub fn nearest_monitor(&self, m: MonitorId, dir: Direction) -> Option<MonitorId> {
        let rect = self.monitors.get(m)?.rectangle;
        let tightness = self.settings.directional_focus_tightness;
        let mut best: Option<(u32, MonitorId)> = None;
        for &f in &self.monitor_order {
            if f == m {
                continue;
            }
            let fr = self.monitors[f].rectangle;
            if !on_dir_side(rect, fr, dir, tightness) {
                continue;
            }
            let distance = boundary_distance(rect, fr, dir);
            if best.map(|(bd, _)| distance < bd).unwrap_or(true) {
                best = Some((distance, f));
            }
        }
        best.map(|(_, f)| f)
    }

    pub fn monitor_from_point(&self, p: Point) -> Option<MonitorId> {
        self.monitor_order
            .iter()
            .copied()
            .find(|&m| is_inside(p, self.monitors[m].rectangle))
    }

    /// The monitor a client's floating rectangle belongs to: the one
    /// under its center, else the one with the nearest center.
    pub fn monitor_from_client(&self, client: &Client) -> Option<MonitorId> {
        let cr = client.floating_rectangle;
        let center = cr.center();
        if let Some(m) = self.monitor_from_point(center) {
            return Some(m);
        }
        let mut best: Option<(u32, MonitorId)> = None;
        for &m in &self.monitor_order {
            let mc = self.monitors[m].rectangle.center();
            let dx = (mc.x as i32 - center.x as i32).unsigned_abs();
            let dy = (mc.y as i32 - center.y as i32).unsigned_abs();
            let distance = dx + dy;
            if best.map(|(bd, _)| distance < bd).unwrap_or(true) {
                best = Some((distance, m));
            }
        }
        best.map(|(_, m)| m)
    }

    /// Pulls a floating rectangle back inside the monitor.
    pub fn embrace_client(&self, m: MonitorId, client: &mut Client) {
        let Some(monitor) = self.monitors.get(m) else { return };
        let mr = monitor.rectangle;
        let cr = &mut client.floating_rectangle;

        if cr.x < mr.x {
            cr.x = mr.x;
        } else if cr.width <= mr.width {
            let max_x = (mr.x as i32 + mr.width as i32 - cr.width as i32) as i16;
            if cr.x > max_x {
                cr.x = max_x;
            }
        }
        if cr.y < mr.y {
            cr.y = mr.y;
        } else if cr.height <= mr.height {
            let max_y = (mr.y as i32 + mr.height as i32 - cr.height as i32) as i16;
            if cr.y > max_y {
                cr.y = max_y;
            }
        }
    }

    /// Maps the floating rectangles of every client under `n` from the
    /// source rectangle to the destination, preserving each window's
    /// relative position (scaled by the remaining slack on each axis).
    pub(crate) fn adapt_geometry(&mut self, rs: Rect, rd: Rect, n: NodeId) {
        let leaves: Vec<NodeId> = self
            .forest
            .leaves(n)
            .filter(|&f| self.forest[f].client.is_some())
            .collect();

        for f in leaves {
            let Some(client) = self.forest[f].client.as_mut() else { continue };
            let cr = client.floating_rectangle;

            let mut x = cr.x as i64;
            let mut y = cr.y as i64;
            let mut width = cr.width as i64;
            let mut height = cr.height as i64;

            // Clip the window to the source monitor before scaling, and
            // restore the overhang afterwards.
            let left_adjust = (rs.x as i64 - x).max(0);
            let top_adjust = (rs.y as i64 - y).max(0);
            let right_adjust = ((x + width) - (rs.x as i64 + rs.width as i64)).max(0);
            let bottom_adjust = ((y + height) - (rs.y as i64 + rs.height as i64)).max(0);

            x += left_adjust;
            y += top_adjust;
            width = (width - left_adjust - right_adjust).max(1);
            height = (height - top_adjust - bottom_adjust).max(1);

            let dx_s = x - rs.x as i64;
            let dy_s = y - rs.y as i64;
            let deno_x = rs.width as i64 - width;
            let deno_y = rs.height as i64 - height;

            let dx_d = if deno_x > 0 && rd.width as i64 > width {
                dx_s * (rd.width as i64 - width) / deno_x
            } else {
                0
            };
            let dy_d = if deno_y > 0 && rd.height as i64 > height {
                dy_s * (rd.height as i64 - height) / deno_y
            } else {
                0
            };

            width += left_adjust + right_adjust;
            height += top_adjust + bottom_adjust;
            let x = rd.x as i64 + dx_d - left_adjust;
            let y = rd.y as i64 + dy_d - top_adjust;

            client.floating_rectangle = Rect::new(
                x.clamp(i16::MIN as i64, i16::MAX as i64) as i16,
                y.clamp(i16::MIN as i64, i16::MAX as i64) as i16,
                width.clamp(1, u16::MAX as i64) as u16,
                height.clamp(1, u16::MAX as i64) as u16,
            );
        }
    }

    /// Reconciles the monitor list against the backend's outputs:
    /// existing monitors are re-wired and resized, new outputs create
    /// monitors, and the overlap/unplug policies decide who survives.
    pub fn update_monitors(&mut self, outputs: &[OutputInfo], primary: Option<u32>) -> bool {
        let order: Vec<_> = self.monitor_order.clone();
        for m in order {
            self.monitors[m].wired = false;
        }

        let mut last_wired: Option<MonitorId> = None;
        for output in outputs {
            match output.rect {
                Some(rect) => {
                    if let Some(m) = self.find_monitor_by_randr_id(output.randr_id) {
                        self.update_root(m, rect);
                        self.monitors[m].wired = true;
                        last_wired = Some(m);
                    } else {
                        let m = self.add_monitor(&output.name, rect);
                        self.monitors[m].randr_id = Some(output.randr_id);
                        last_wired = Some(m);
                    }
                }
                None => {
                    if !self.settings.remove_disabled_monitors && output.connected {
                        if let Some(m) = self.find_monitor_by_randr_id(output.randr_id) {
                            self.monitors[m].wired = true;
                        }
                    }
                }
            }
        }

        self.primary_monitor = primary.and_then(|p| self.find_monitor_by_randr_id(p));

        if self.settings.merge_overlapping_monitors {
            let order: Vec<_> = self.monitor_order.clone();
            for m in order {
                if !self.monitors.contains_key(m) || !self.monitors[m].wired {
                    continue;
                }
                let contenders: Vec<_> = self.monitor_order.clone();
                for mb in contenders {
                    if m == mb || !self.monitors.contains_key(mb) {
                        continue;
                    }
                    if self.monitors[mb].wired
                        && contains(self.monitors[m].rectangle, self.monitors[mb].rectangle)
                    {
                        if last_wired == Some(mb) {
                            last_wired = Some(m);
                        }
                        self.merge_monitors(mb, m);
                        self.remove_monitor(mb);
                    }
                }
            }
        }

        if self.settings.remove_unplugged_monitors {
            let order: Vec<_> = self.monitor_order.clone();
            for m in order {
                if !self.monitors.contains_key(m) || self.monitors[m].wired {
                    continue;
                }
                if let Some(target) = last_wired.filter(|&t| t != m) {
                    self.merge_monitors(m, target);
                }
                self.remove_monitor(m);
            }
        }

        let order: Vec<_> = self.monitor_order.clone();
        for m in order {
            if self.monitors[m].desktops.is_empty() {
                self.add_desktop(m, "");
            }
        }

        self.focused_monitor.is_some()
    }
}

#[cfg(test)]
mod tests {
    use crate::engine::test_support::{assert_invariants, managed, single_monitor};
    use crate::engine::OutputInfo;
    use crate::geometry::{CycleDir, Rect};
    use crate::model::client::ClientState;

    fn output(randr_id: u32, name: &str, rect: Rect) -> OutputInfo {
        OutputInfo {
            randr_id,
            name: name.to_string(),
            rect: Some(rect),
            connected: true,
        }
    }

    #[test]
    fn cross_monitor_transfer_preserves_relative_floating_position() {
        let (mut engine, m1, d1) = single_monitor(Rect::new(0, 0, 1000, 1000));
        let m2 = engine.add_monitor("right", Rect::new(1000, 0, 1000, 1000));
        let d2 = engine.add_desktop(m2, "two");

        let l = managed(&mut engine, m1, d1);
        if let Some(client) = engine.forest.get_mut(l).and_then(|x| x.client.as_mut()) {
            client.floating_rectangle = Rect::new(100, 100, 200, 200);
        }
        engine.set_state(m1, d1, l, ClientState::Floating);

        assert!(engine.transfer_node(m1, d1, l, m2, d2, None, false));
        assert!(engine.node_in_desktop(d2, l));
        let client = engine.forest()[l].client.as_ref().unwrap();
        assert_eq!(client.floating_rectangle, Rect::new(1100, 100, 200, 200));
        assert_invariants(&engine);
    }

    #[test]
    fn transfer_moves_sticky_counts() {
        let (mut engine, m1, d1) = single_monitor(Rect::new(0, 0, 1000, 1000));
        let m2 = engine.add_monitor("right", Rect::new(1000, 0, 1000, 1000));
        let d2 = engine.add_desktop(m2, "two");
        let l = managed(&mut engine, m1, d1);
        engine.set_sticky(m1, d1, l, true);
        assert_eq!(engine.monitor(m1).unwrap().sticky_count, 1);

        assert!(engine.transfer_node(m1, d1, l, m2, d2, None, false));
        assert_eq!(engine.monitor(m1).unwrap().sticky_count, 0);
        assert_eq!(engine.monitor(m2).unwrap().sticky_count, 1);
        assert_invariants(&engine);
    }

    #[test]
    fn monitors_stay_sorted_by_position() {
        let (mut engine, m1, _) = single_monitor(Rect::new(1000, 0, 1000, 1000));
        let m2 = engine.add_monitor("left", Rect::new(0, 0, 1000, 1000));
        assert_eq!(engine.monitor_order(), &[m2, m1]);

        // Moving the left monitor to the far right re-sorts the order.
        engine.update_root(m2, Rect::new(2000, 0, 1000, 1000));
        assert_eq!(engine.monitor_order(), &[m1, m2]);
    }

    #[test]
    fn update_monitors_creates_and_rewires_outputs() {
        let mut engine = crate::engine::test_support::engine();
        assert!(engine.update_monitors(
            &[output(7, "DP-1", Rect::new(0, 0, 1000, 1000))],
            Some(7),
        ));
        let m = engine.find_monitor_by_randr_id(7).unwrap();
        assert_eq!(engine.primary_monitor(), Some(m));
        // Each new monitor gets a default desktop.
        assert_eq!(engine.monitor(m).unwrap().desktops.len(), 1);

        engine.update_monitors(
            &[output(7, "DP-1", Rect::new(0, 0, 1920, 1080))],
            Some(7),
        );
        assert_eq!(
            engine.monitor(m).unwrap().rectangle,
            Rect::new(0, 0, 1920, 1080)
        );
        assert_eq!(engine.monitor_order().len(), 1);
    }

    #[test]
    fn unplugged_monitors_hand_their_desktops_over() {
        let mut engine = crate::engine::test_support::engine();
        engine.settings.remove_unplugged_monitors = true;
        engine.update_monitors(
            &[
                output(1, "DP-1", Rect::new(0, 0, 1000, 1000)),
                output(2, "DP-2", Rect::new(1000, 0, 1000, 1000)),
            ],
            None,
        );
        let m2 = engine.find_monitor_by_randr_id(2).unwrap();
        let d2 = engine.monitor(m2).unwrap().desk_head().unwrap();
        let l = managed(&mut engine, m2, d2);

        engine.update_monitors(&[output(1, "DP-1", Rect::new(0, 0, 1000, 1000))], None);
        assert_eq!(engine.monitor_order().len(), 1);
        let m1 = engine.find_monitor_by_randr_id(1).unwrap();
        assert!(engine
            .monitor(m1)
            .unwrap()
            .desktops
            .iter()
            .any(|&d| engine.node_in_desktop(d, l)));
        assert_invariants(&engine);
    }

    #[test]
    fn overlapping_monitors_merge_into_the_container() {
        let mut engine = crate::engine::test_support::engine();
        engine.settings.merge_overlapping_monitors = true;
        engine.update_monitors(
            &[
                output(1, "eDP-1", Rect::new(0, 0, 1920, 1080)),
                output(2, "mirror", Rect::new(0, 0, 1280, 720)),
            ],
            None,
        );
        assert_eq!(engine.monitor_order().len(), 1);
        assert_eq!(
            engine.find_monitor_by_randr_id(1),
            Some(engine.monitor_order()[0])
        );
    }

    #[test]
    fn closest_monitor_cycles_the_order() {
        let (mut engine, m1, _) = single_monitor(Rect::new(0, 0, 1000, 1000));
        let m2 = engine.add_monitor("right", Rect::new(1000, 0, 1000, 1000));
        assert_eq!(engine.closest_monitor(m1, CycleDir::Next), Some(m2));
        assert_eq!(engine.closest_monitor(m1, CycleDir::Prev), Some(m2));
        assert_eq!(engine.closest_monitor(m2, CycleDir::Next), Some(m1));
    }

    #[test]
    fn embrace_pulls_windows_back_inside() {
        let (engine, m, _) = single_monitor(Rect::new(0, 0, 1000, 1000));
        let mut client = crate::model::client::Client::default();
        client.floating_rectangle = Rect::new(900, -50, 300, 200);
        engine.embrace_client(m, &mut client);
        assert_eq!(client.floating_rectangle, Rect::new(700, 0, 300, 200));
    }
}

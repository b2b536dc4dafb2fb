use crate::backend::WindowBackend;
use crate::engine::Engine;
use crate::events::Event;
use crate::geometry::{CycleDir, Padding};
use crate::model::forest::NodeId;
use crate::model::monitor::{Desktop, DesktopId, Layout, MonitorId};

impl<B: WindowBackend> Engine<B> {
    pub(crate) fn make_desktop(&mut self, name: &str) -> DesktopId {
        let id = self.backend.generate_id();
        let mut desk = Desktop::new(id, name);
        desk.window_gap = self.settings.window_gap;
        desk.border_width = self.settings.border_width;
        desk.layout = if self.settings.single_monocle {
            Layout::Monocle
        } else {
            Layout::Tiled
        };
        self.desktops.insert(desk)
    }

    fn link_desktop(&mut self, m: MonitorId, d: DesktopId) {
        let mon = &mut self.monitors[m];
        self.desktops[d].border_width = mon.border_width;
        self.desktops[d].window_gap = mon.window_gap;
        mon.desktops.push(d);
        if mon.desk.is_none() {
            mon.desk = Some(d);
        }
    }

    pub fn add_desktop(&mut self, m: MonitorId, name: &str) -> DesktopId {
        let d = self.make_desktop(name);
        self.link_desktop(m, d);
        let (mid, did) = (self.mid(m), self.did(d));
        self.emit(Event::DesktopAdd {
            monitor: mid,
            desktop: did,
            name: self.desktops[d].name.clone(),
        });
        self.emit(Event::Report);
        d
    }

    /// Shows `d` on its monitor without moving the global focus there.
    pub fn activate_desktop(&mut self, m: MonitorId, d: Option<DesktopId>) -> bool {
        if !self.monitors.contains_key(m) {
            return false;
        }
        if d.is_some() && d == self.monitors[m].desk {
            return false;
        }

        let d = d
            .or(self.monitors[m].desk)
            .or_else(|| {
                self.history
                    .last_desktop(m, None, |dd| self.desktops.contains_key(dd))
            })
            .or_else(|| self.monitors[m].desk_head());
        let Some(d) = d.filter(|&dd| self.desktops.contains_key(dd)) else {
            return false;
        };
        if Some(d) == self.monitors[m].desk {
            return false;
        }

        if self.monitors[m].sticky_count > 0 {
            if let Some(old) = self.monitors[m].desk {
                let root = self.desktops[old].root;
                self.transfer_sticky_nodes(m, old, m, d, root);
            }
        }

        self.show_desktop(d);
        if let Some(old) = self.monitors[m].desk {
            self.hide_desktop(old);
        }
        self.monitors[m].desk = Some(d);

        self.history.add(m, d, None, false);
        let (mid, did) = (self.mid(m), self.did(d));
        self.emit(Event::DesktopActivate { monitor: mid, desktop: did });
        self.emit(Event::Report);
        true
    }

    pub fn rename_desktop(&mut self, m: MonitorId, d: DesktopId, name: &str) {
        let Some(desk) = self.desktops.get_mut(d) else { return };
        let old_name = std::mem::replace(&mut desk.name, name.to_string());
        let (mid, did) = (self.mid(m), self.did(d));
        self.emit(Event::DesktopRename {
            monitor: mid,
            desktop: did,
            old_name,
            new_name: name.to_string(),
        });
        self.emit(Event::Report);
    }

    pub(crate) fn unlink_desktop(&mut self, m: MonitorId, d: DesktopId) {
        let Some(mon) = self.monitors.get_mut(m) else { return };
        mon.desktops.retain(|&x| x != d);
        if mon.desk == Some(d) {
            mon.desk = None;
        }
    }

    pub fn remove_desktop(&mut self, m: MonitorId, d: DesktopId) {
        if !self.monitors.contains_key(m) || !self.desktops.contains_key(d) {
            return;
        }
        let (mid, did) = (self.mid(m), self.did(d));
        self.emit(Event::DesktopRemove { monitor: mid, desktop: did });

        if let Some(root) = self.desktops[d].root {
            self.remove_node(m, d, root);
        }
        self.unlink_desktop(m, d);
        self.history.retain(|e| e.desktop != d);
        self.desktops.remove(d);

        if self.monitors[m].desk.is_none() {
            if self.focused_monitor == Some(m) {
                self.focus_node(Some(m), None, None);
            } else {
                self.activate_desktop(m, None);
                if let Some(desk) = self.monitors[m].desk {
                    let focus = self.desktops[desk].focus;
                    self.activate_node(m, desk, focus);
                }
            }
        }

        self.emit(Event::Report);
    }

    pub fn merge_desktops(
        &mut self,
        ms: MonitorId,
        ds: DesktopId,
        md: MonitorId,
        dd: DesktopId,
    ) {
        if ds == dd {
            return;
        }
        let Some(root) = self.desktops.get(ds).and_then(|x| x.root) else { return };
        let target = self.desktops.get(dd).and_then(|x| x.focus);
        self.transfer_node(ms, ds, root, md, dd, target, false);
    }

    /// Exchanges the positions of two desktops, adapting geometry when
    /// they change monitors and parking sticky leaves so they stay put.
    pub fn swap_desktops(
        &mut self,
        m1: MonitorId,
        d1: DesktopId,
        m2: MonitorId,
        d2: DesktopId,
        follow: bool,
    ) -> bool {
        if d1 == d2
            || !self.monitors.contains_key(m1)
            || !self.monitors.contains_key(m2)
            || !self.desktops.contains_key(d1)
            || !self.desktops.contains_key(d2)
        {
            return false;
        }

        let idx1 = self.monitors[m1].desktops.iter().position(|&x| x == d1);
        let idx2 = self.monitors[m2].desktops.iter().position(|&x| x == d2);
        let (Some(idx1), Some(idx2)) = (idx1, idx2) else { return false };

        self.emit(Event::DesktopSwap {
            src_monitor: self.mid(m1),
            src_desktop: self.did(d1),
            dst_monitor: self.mid(m2),
            dst_desktop: self.did(d2),
        });

        let focused_desk = self
            .focused_monitor
            .and_then(|fm| self.monitors.get(fm))
            .and_then(|mm| mm.desk);
        let d1_was_active = self.monitors[m1].desk == Some(d1);
        let d2_was_active = self.monitors[m2].desk == Some(d2);
        let d1_was_focused = focused_desk == Some(d1);
        let d2_was_focused = focused_desk == Some(d2);

        // Sticky leaves are parked on scratch desktops for the duration
        // of the swap so they end up on the desktop that stays visible.
        let mut d1_stickies = None;
        if self.monitors[m1].sticky_count > 0 && d1_was_active {
            let sticky = self.desktops[d1]
                .root
                .map(|r| self.forest.sticky_count_in(r))
                .unwrap_or(0);
            if sticky > 0 {
                let park = self.make_desktop("");
                self.monitors[m1].desktops.push(park);
                let root = self.desktops[d1].root;
                self.transfer_sticky_nodes(m1, d1, m1, park, root);
                d1_stickies = Some(park);
            }
        }
        let mut d2_stickies = None;
        if self.monitors[m2].sticky_count > 0 && d2_was_active {
            let sticky = self.desktops[d2]
                .root
                .map(|r| self.forest.sticky_count_in(r))
                .unwrap_or(0);
            if sticky > 0 {
                let park = self.make_desktop("");
                self.monitors[m2].desktops.push(park);
                let root = self.desktops[d2].root;
                self.transfer_sticky_nodes(m2, d2, m2, park, root);
                d2_stickies = Some(park);
            }
        }

        self.monitors[m1].desktops[idx1] = d2;
        self.monitors[m2].desktops[idx2] = d1;

        if m1 != m2 {
            if self.monitors[m1].desk == Some(d1) {
                self.monitors[m1].desk = Some(d2);
            }
            if self.monitors[m2].desk == Some(d2) {
                self.monitors[m2].desk = Some(d1);
            }
        } else {
            let mon = &mut self.monitors[m1];
            if mon.desk == Some(d1) {
                mon.desk = Some(d2);
            } else if mon.desk == Some(d2) {
                mon.desk = Some(d1);
            }
        }

        if m1 != m2 {
            let (r1, r2) = (self.monitors[m1].rectangle, self.monitors[m2].rectangle);
            if let Some(root) = self.desktops[d1].root {
                self.adapt_geometry(r1, r2, root);
            }
            if let Some(root) = self.desktops[d2].root {
                self.adapt_geometry(r2, r1, root);
            }
            self.history.retain(|e| e.desktop != d1 && e.desktop != d2);
            self.arrange(m1, d2);
            self.arrange(m2, d1);
        }

        if let Some(park) = d1_stickies {
            let root = self.desktops[park].root;
            self.transfer_sticky_nodes(m1, park, m1, d2, root);
            self.unlink_desktop(m1, park);
            self.desktops.remove(park);
        }
        if let Some(park) = d2_stickies {
            let root = self.desktops[park].root;
            self.transfer_sticky_nodes(m2, park, m2, d1, root);
            self.unlink_desktop(m2, park);
            self.desktops.remove(park);
        }

        if d1_was_active && !d2_was_active {
            if (!follow && m1 != m2) || !d1_was_focused {
                self.hide_desktop(d1);
            }
            self.show_desktop(d2);
        } else if !d1_was_active && d2_was_active {
            self.show_desktop(d1);
            if (!follow && m1 != m2) || !d2_was_focused {
                self.hide_desktop(d2);
            }
        }

        let focus_of = |eng: &Self, d: DesktopId| eng.desktops[d].focus;
        if follow || m1 == m2 {
            if d1_was_focused {
                let f = focus_of(self, d1);
                self.focus_node(Some(m2), Some(d1), f);
            } else if d1_was_active {
                let f = focus_of(self, d1);
                self.activate_node(m2, d1, f);
            }
            if d2_was_focused {
                let f = focus_of(self, d2);
                self.focus_node(Some(m1), Some(d2), f);
            } else if d2_was_active {
                let f = focus_of(self, d2);
                self.activate_node(m1, d2, f);
            }
        } else {
            if d1_was_focused {
                let f = focus_of(self, d2);
                self.focus_node(Some(m1), Some(d2), f);
            } else if d1_was_active {
                let f = focus_of(self, d2);
                self.activate_node(m1, d2, f);
            }
            if d2_was_focused {
                let f = focus_of(self, d1);
                self.focus_node(Some(m2), Some(d1), f);
            } else if d2_was_active {
                let f = focus_of(self, d1);
                self.activate_node(m2, d1, f);
            }
        }

        self.emit(Event::Report);
        true
    }

    /// Moves a desktop to another monitor, keeping its tree and adapting
    /// floating geometry to the destination rectangle.
    pub fn transfer_desktop(
        &mut self,
        ms: MonitorId,
        md: MonitorId,
        d: DesktopId,
        follow: bool,
    ) -> bool {
        if ms == md
            || !self.monitors.contains_key(ms)
            || !self.monitors.contains_key(md)
            || !self.desktops.contains_key(d)
        {
            return false;
        }

        let d_was_active = self.monitors[ms].desk == Some(d);
        let ms_was_focused = self.focused_monitor == Some(ms);
        let sc = if self.monitors[ms].sticky_count > 0 && d_was_active {
            self.desktops[d]
                .root
                .map(|r| self.forest.sticky_count_in(r))
                .unwrap_or(0)
        } else {
            0
        };

        self.unlink_desktop(ms, d);
        self.monitors[ms].sticky_count = self.monitors[ms].sticky_count.saturating_sub(sc);

        if (!follow || !d_was_active || !ms_was_focused) && self.monitors[md].desk.is_some() {
            // Sticky leaves stay visible: they are handed back to the
            // source monitor's active desktop below.
            if let Some(root) = self.desktops[d].root {
                self.hide_node_with(d, root, false);
            }
        }

        self.monitors[md].desktops.push(d);
        if self.monitors[md].desk.is_none() {
            self.monitors[md].desk = Some(d);
        }
        self.monitors[md].sticky_count = self.monitors[md].sticky_count.saturating_add(sc);
        self.history.retain(|e| e.desktop != d);

        if d_was_active {
            if follow {
                if self.activate_desktop(ms, None) {
                    let desk = self.monitors[ms].desk;
                    if let Some(desk) = desk {
                        self.activate_node(ms, desk, None);
                    }
                }
                if ms_was_focused {
                    let focus = self.desktops[d].focus;
                    self.focus_node(Some(md), Some(d), focus);
                }
            } else if ms_was_focused {
                self.focus_node(Some(ms), None, None);
            } else if self.activate_desktop(ms, None) {
                let desk = self.monitors[ms].desk;
                if let Some(desk) = desk {
                    self.activate_node(ms, desk, None);
                }
            }
        }

        if sc > 0 {
            let root = self.desktops[d].root;
            if let Some(ms_desk) = self.monitors[ms].desk {
                self.transfer_sticky_nodes(md, d, ms, ms_desk, root);
            } else if self.monitors[md].desk != Some(d) {
                if let Some(md_desk) = self.monitors[md].desk {
                    self.transfer_sticky_nodes(md, d, md, md_desk, root);
                }
            }
        }

        let (rs, rd) = (self.monitors[ms].rectangle, self.monitors[md].rectangle);
        if let Some(root) = self.desktops[d].root {
            self.adapt_geometry(rs, rd, root);
        }
        self.arrange(md, d);

        if (!follow || !d_was_active || !ms_was_focused) && self.monitors[md].desk == Some(d) {
            let focus = self.desktops[d].focus;
            if self.focused_monitor == Some(md) {
                self.focus_node(Some(md), Some(d), focus);
            } else {
                self.activate_node(md, d, focus);
            }
        }

        self.emit(Event::DesktopTransfer {
            src_monitor: self.mid(ms),
            desktop: self.did(d),
            dst_monitor: self.mid(md),
        });
        self.emit(Event::Report);
        true
    }

    /// Switches the desktop layout. A user switch records the intent in
    /// `user_layout`; the effective layout may stay overridden while the
    /// single-window monocle rule applies.
    pub fn set_layout(&mut self, m: MonitorId, d: DesktopId, layout: Layout, user: bool) -> bool {
        let (Some(_), Some(desk)) = (self.monitors.get(m), self.desktops.get(d)) else {
            return false;
        };
        if (user && desk.user_layout == layout) || (!user && desk.layout == layout) {
            return false;
        }

        let old_layout = desk.layout;
        {
            let desk = &mut self.desktops[d];
            if user {
                desk.user_layout = layout;
            } else {
                desk.layout = layout;
            }
        }

        if user {
            let tiled = self.desktops[d]
                .root
                .map(|r| self.forest.tiled_count(r, true))
                .unwrap_or(0);
            if !self.settings.single_monocle || tiled > 1 {
                self.desktops[d].layout = layout;
            }
        }

        if self.desktops[d].layout != old_layout {
            self.handle_presel_feedbacks(m, d);
            if user {
                self.arrange(m, d);
            }
            let (mid, did) = (self.mid(m), self.did(d));
            let effective = self.desktops[d].layout;
            self.emit(Event::DesktopLayout { monitor: mid, desktop: did, layout: effective });
            if self.monitors[m].desk == Some(d) {
                self.emit(Event::Report);
            }
        }

        true
    }

    /// Feedback windows make no sense while everything is stacked
    /// full-area, so monocle hides them and tiled shows them again.
    pub(crate) fn handle_presel_feedbacks(&mut self, m: MonitorId, d: DesktopId) {
        if self.monitors.get(m).map(|x| x.desk) != Some(Some(d)) {
            return;
        }
        let Some(root) = self.desktops.get(d).and_then(|x| x.root) else { return };
        let monocle = self.desktops[d].layout == Layout::Monocle;
        let feedbacks: Vec<u32> = self
            .forest
            .subtree(root)
            .into_iter()
            .filter_map(|x| self.forest[x].presel.and_then(|p| p.feedback))
            .collect();
        for feedback in feedbacks {
            if monocle {
                self.backend.hide(feedback);
            } else {
                self.backend.show(feedback);
            }
        }
    }

    pub fn show_desktop(&mut self, d: DesktopId) {
        let Some(root) = self.desktops.get(d).and_then(|x| x.root) else { return };
        self.show_node(d, root);
    }

    pub fn hide_desktop(&mut self, d: DesktopId) {
        let Some(root) = self.desktops.get(d).and_then(|x| x.root) else { return };
        self.hide_node(d, root);
    }

    /// Next or previous desktop in list order, wrapping across monitors.
    pub fn closest_desktop(
        &self,
        m: MonitorId,
        d: DesktopId,
        dir: CycleDir,
    ) -> Option<(MonitorId, DesktopId)> {
        let world: Vec<(MonitorId, DesktopId)> = self
            .monitor_order
            .iter()
            .flat_map(|&mm| {
                self.monitors[mm].desktops.iter().map(move |&dd| (mm, dd))
            })
            .collect();
        if world.len() < 2 {
            return None;
        }
        let pos = world.iter().position(|&(mm, dd)| mm == m && dd == d)?;
        let next = match dir {
            CycleDir::Next => (pos + 1) % world.len(),
            CycleDir::Prev => (pos + world.len() - 1) % world.len(),
        };
        Some(world[next])
    }

    pub fn set_window_gap(&mut self, d: DesktopId, gap: u16) {
        if let Some(desk) = self.desktops.get_mut(d) {
            desk.window_gap = gap;
        }
    }

    pub fn set_desktop_padding(&mut self, d: DesktopId, padding: Padding) {
        if let Some(desk) = self.desktops.get_mut(d) {
            desk.padding = padding;
        }
    }

    pub fn set_desktop_border_width(&mut self, d: DesktopId, width: u16) {
        let Some(desk) = self.desktops.get_mut(d) else { return };
        desk.border_width = width;
        let leaves: Vec<NodeId> = desk
            .root
            .map(|r| self.forest.leaves(r).collect())
            .unwrap_or_default();
        for f in leaves {
            if let Some(client) = self.forest[f].client.as_mut() {
                client.border_width = width;
            }
        }
    }

    pub fn set_tile_limit(&mut self, d: DesktopId, limit: Option<u32>) {
        if let Some(desk) = self.desktops.get_mut(d) {
            desk.tile_limit = limit;
        }
    }
}

use crate::backend::WindowBackend;
use crate::engine::Engine;
use crate::events::Event;
use crate::model::forest::NodeId;
use crate::model::monitor::{DesktopId, MonitorId};

impl<B: WindowBackend> Engine<B> {
    fn history_node_valid(&self, d: DesktopId, n: NodeId) -> bool {
        self.node_in_desktop(d, n) && self.forest.is_focusable(n)
    }

    /// Makes `n` the globally focused node, resolving every absent
    /// argument from the current state, the history, then the heads.
    pub fn focus_node(
        &mut self,
        m: Option<MonitorId>,
        d: Option<DesktopId>,
        n: Option<NodeId>,
    ) -> bool {
        let m = m
            .or(self.focused_monitor)
            .or_else(|| {
                self.history
                    .last_monitor(None, |mm| self.monitors.contains_key(mm))
            })
            .or_else(|| self.monitor_order.first().copied());
        let Some(m) = m.filter(|&mm| self.monitors.contains_key(mm)) else {
            return false;
        };

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

        let guess = n.is_none();
        let mut n = n;
        if n.is_none() && self.desktops[d].root.is_some() {
            n = self.desktops[d]
                .focus
                .or_else(|| self.history.last_node(d, None, |x| self.history_node_valid(d, x)))
                .or_else(|| {
                    self.desktops[d].root.and_then(|r| self.forest.first_focusable_leaf(r))
                });
        }

        if let Some(node) = n {
            if !self.forest.contains(node) || !self.forest.is_focusable(node) {
                return false;
            }
        }

        let focused_desk = self
            .focused_monitor
            .and_then(|fm| self.monitors.get(fm))
            .and_then(|mm| mm.desk);
        let target_has_client = n
            .and_then(|x| self.forest.get(x))
            .map(|node| node.client.is_some())
            .unwrap_or(false);
        if focused_desk != Some(d) || !target_has_client {
            self.backend.clear_input_focus();
        }

        // Sticky leaves ride along when the active desktop changes.
        if self.monitors[m].sticky_count > 0 {
            let old_desk = self.monitors[m].desk;
            if let Some(old_d) = old_desk.filter(|&od| od != d) {
                if guess {
                    let old_focus = self.desktops[old_d].focus;
                    if let Some(of) = old_focus {
                        if self.forest.get(of).map(|x| x.sticky).unwrap_or(false) {
                            n = Some(of);
                        }
                    }
                }
                let old_root = self.desktops[old_d].root;
                self.transfer_sticky_nodes(m, old_d, m, d, old_root);
                if n.is_none() {
                    n = self.desktops[d].focus;
                }
            }
        }

        if let Some(node) = n {
            if self.desktops[d].focus.is_some() && self.desktops[d].focus != Some(node) {
                self.neutralize_occluding_windows(m, d, node);
            }
            let urgent = self
                .forest
                .get(node)
                .and_then(|x| x.client.as_ref())
                .map(|c| c.urgent)
                .unwrap_or(false);
            if urgent {
                self.set_urgent(m, d, node, false);
            }
        }

        // Repaint borders across monitor and desktop boundaries.
        if self.focused_monitor != Some(m) {
            if let Some(old_m) = self.focused_monitor {
                let desks: Vec<DesktopId> = self.monitors[old_m].desktops.clone();
                for e in desks {
                    let focus = self.desktops[e].focus;
                    self.draw_border(focus, true, false);
                }
            }
            let desks: Vec<DesktopId> = self.monitors[m].desktops.clone();
            for e in desks {
                if e == d {
                    continue;
                }
                let focus = self.desktops[e].focus;
                self.draw_border(focus, true, true);
            }
        }

        if self.desktops[d].focus != n {
            if let Some(old_focus) = self.desktops[d].focus {
                let leaves: Vec<NodeId> = self
                    .forest
                    .leaves(old_focus)
                    .filter(|&f| self.forest[f].client.is_some())
                    .collect();
                let color = self.border_color(false, true);
                for f in leaves {
                    let still_focused = n
                        .map(|x| self.forest.is_descendant(f, x))
                        .unwrap_or(false);
                    if !still_focused {
                        let id = self.nid(f);
                        self.backend.draw_border(id, color);
                    }
                }
            }
        }
        self.draw_border(n, true, true);

        let desk_changed =
            self.focused_monitor != Some(m) || self.monitors[m].desk != Some(d);
        let mut has_input_focus = false;

        if self.focused_monitor != Some(m) {
            self.focused_monitor = Some(m);
            if self.settings.pointer_follows_monitor {
                let rect = self.monitors[m].rectangle;
                self.backend.center_pointer(rect);
            }
            let mid = self.mid(m);
            self.emit(Event::MonitorFocus { monitor: mid });
        }

        if self.monitors[m].desk != Some(d) {
            self.show_desktop(d);
            self.set_input_focus(n);
            has_input_focus = true;
            if let Some(old) = self.monitors[m].desk {
                self.hide_desktop(old);
            }
            self.monitors[m].desk = Some(d);
        }

        if desk_changed {
            let (mid, did) = (self.mid(m), self.did(d));
            self.emit(Event::DesktopFocus { monitor: mid, desktop: did });
        }

        self.desktops[d].focus = n;
        if !has_input_focus {
            self.set_input_focus(n);
        }
        self.history.add(m, d, n, true);
        self.emit(Event::Report);

        let Some(n) = n else { return true };

        let (mid, did, nid) = (self.mid(m), self.did(d), self.nid(n));
        self.emit(Event::NodeFocus { monitor: mid, desktop: did, node: nid });

        self.stack(d, n, true);

        if self.settings.pointer_follows_focus {
            let rect = self.get_rectangle(Some(m), Some(d), Some(n));
            if rect.width > 0 && rect.height > 0 {
                self.backend.center_pointer(rect);
            }
        }

        true
    }

    /// Updates the focus of a non-current desktop without changing the
    /// focused monitor or desktop.
    pub fn activate_node(
        &mut self,
        m: MonitorId,
        d: DesktopId,
        n: Option<NodeId>,
    ) -> bool {
        if !self.monitors.contains_key(m) || !self.desktops.contains_key(d) {
            return false;
        }

        let mut n = n;
        if n.is_none() && self.desktops[d].root.is_some() {
            n = self.desktops[d]
                .focus
                .or_else(|| self.history.last_node(d, None, |x| self.history_node_valid(d, x)))
                .or_else(|| {
                    self.desktops[d].root.and_then(|r| self.forest.first_focusable_leaf(r))
                });
        }

        let focused_desk = self
            .focused_monitor
            .and_then(|fm| self.monitors.get(fm))
            .and_then(|mm| mm.desk);
        if focused_desk == Some(d) {
            return false;
        }
        if let Some(node) = n {
            if !self.forest.contains(node) || !self.forest.is_focusable(node) {
                return false;
            }
            if !self.node_in_desktop(d, node) {
                return false;
            }
        }

        if let Some(node) = n {
            if self.desktops[d].focus.is_some() && self.desktops[d].focus != Some(node) {
                self.neutralize_occluding_windows(m, d, node);
            }
            self.stack(d, node, true);
            if self.desktops[d].focus != Some(node) {
                if let Some(old_focus) = self.desktops[d].focus {
                    let leaves: Vec<NodeId> = self
                        .forest
                        .leaves(old_focus)
                        .filter(|&f| self.forest[f].client.is_some())
                        .collect();
                    let on_focused_monitor = self.focused_monitor == Some(m);
                    let color = self.border_color(false, on_focused_monitor);
                    for f in leaves {
                        if !self.forest.is_descendant(f, node) {
                            let id = self.nid(f);
                            self.backend.draw_border(id, color);
                        }
                    }
                }
            }
            let on_focused_monitor = self.focused_monitor == Some(m);
            self.draw_border(Some(node), true, on_focused_monitor);
        }

        self.desktops[d].focus = n;
        self.history.add(m, d, n, false);
        self.emit(Event::Report);

        if let Some(node) = n {
            let (mid, did, nid) = (self.mid(m), self.did(d), self.nid(node));
            self.emit(Event::NodeActivate { monitor: mid, desktop: did, node: nid });
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use crate::engine::test_support::{
        assert_invariants, engine_with_events, managed, single_monitor,
    };
    use crate::events::Event;
    use crate::geometry::Rect;

    fn rect() -> Rect { Rect::new(0, 0, 1000, 1000) }

    #[test]
    fn focusing_a_leaf_updates_history_and_emits() {
        let (mut engine, rx) = engine_with_events();
        let m = engine.add_monitor("main", rect());
        let d = engine.add_desktop(m, "one");
        let a = managed(&mut engine, m, d);
        let b = managed(&mut engine, m, d);
        while rx.try_recv().is_ok() {}

        assert!(engine.focus_node(Some(m), Some(d), Some(a)));
        assert_eq!(engine.desktop(d).unwrap().focus, Some(a));
        assert_eq!(engine.history().rank(a), 0);
        assert_eq!(engine.history().rank(b), 1);
        let events: Vec<Event> = rx.try_iter().collect();
        assert!(events.iter().any(|e| matches!(e, Event::NodeFocus { .. })));
        assert_invariants(&engine);
    }

    #[test]
    fn null_arguments_resolve_to_the_current_focus_chain() {
        let (mut engine, m, d) = single_monitor(rect());
        let a = managed(&mut engine, m, d);
        assert!(engine.focus_node(None, None, None));
        assert_eq!(engine.desktop(d).unwrap().focus, Some(a));
        assert_eq!(engine.focused_monitor(), Some(m));
    }

    #[test]
    fn hidden_nodes_are_not_focusable() {
        let (mut engine, m, d) = single_monitor(rect());
        let a = managed(&mut engine, m, d);
        let b = managed(&mut engine, m, d);
        engine.set_hidden(m, d, a, true);
        assert!(!engine.focus_node(Some(m), Some(d), Some(a)));
        assert_eq!(engine.desktop(d).unwrap().focus, Some(b));
    }

    #[test]
    fn focus_falls_back_to_history_after_removal() {
        let (mut engine, m, d) = single_monitor(rect());
        let a = managed(&mut engine, m, d);
        let b = managed(&mut engine, m, d);
        let c = managed(&mut engine, m, d);
        engine.focus_node(Some(m), Some(d), Some(a));
        engine.focus_node(Some(m), Some(d), Some(c));

        engine.remove_node(m, d, c);
        // History says A was focused before C.
        assert_eq!(engine.desktop(d).unwrap().focus, Some(a));
        let _ = b;
        assert_invariants(&engine);
    }

    #[test]
    fn switching_desktops_carries_sticky_leaves() {
        let (mut engine, m, d1) = single_monitor(rect());
        let d2 = engine.add_desktop(m, "two");
        let a = managed(&mut engine, m, d1);
        let b = managed(&mut engine, m, d1);
        engine.set_sticky(m, d1, b, true);
        assert_eq!(engine.monitor(m).unwrap().sticky_count, 1);

        engine.focus_node(Some(m), Some(d2), None);
        // The sticky leaf moved to the newly shown desktop.
        assert!(engine.desktop(d2).unwrap().root.is_some());
        assert!(engine.node_in_desktop(d2, b));
        assert!(engine.node_in_desktop(d1, a));
        assert_eq!(engine.monitor(m).unwrap().sticky_count, 1);
        assert_invariants(&engine);
    }

    #[test]
    fn focusing_clears_urgency() {
        let (mut engine, m, d) = single_monitor(rect());
        let a = managed(&mut engine, m, d);
        let b = managed(&mut engine, m, d);
        engine.set_urgent(m, d, a, true);
        assert!(engine.desktop(d).unwrap().is_urgent());

        engine.focus_node(Some(m), Some(d), Some(a));
        assert!(!engine.forest()[a].client.as_ref().unwrap().urgent);
        assert!(!engine.desktop(d).unwrap().is_urgent());
        let _ = b;
    }

    #[test]
    fn activation_refuses_the_currently_focused_desktop() {
        let (mut engine, m, d) = single_monitor(rect());
        let a = managed(&mut engine, m, d);
        assert!(!engine.activate_node(m, d, Some(a)));
    }

    #[test]
    fn activation_updates_focus_of_a_background_desktop() {
        let (mut engine, m, d1) = single_monitor(rect());
        let d2 = engine.add_desktop(m, "two");
        let a = managed(&mut engine, m, d1);
        let b = managed(&mut engine, m, d2);
        // Managing on the background desktop activates it there without
        // stealing the global focus.
        assert_eq!(engine.desktop(d2).unwrap().focus, Some(b));
        assert_eq!(engine.monitor(m).unwrap().desk, Some(d1));
        assert_eq!(engine.desktop(d1).unwrap().focus, Some(a));
    }
}

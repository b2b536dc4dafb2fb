use tracing::warn;

use crate::backend::WindowBackend;
use crate::common::config::{AutomaticScheme, InitialPolarity};
use crate::engine::Engine;
use crate::events::{Event, NodeFlag, PreselChange};
use crate::geometry::{area, CirculateDir, Direction, SplitType};
use crate::model::client::{stack_cmp, ClientState, StackLayer};
use crate::model::forest::{NodeId, Presel, MAX_TREE_DEPTH};
use crate::model::monitor::{DesktopId, Layout, MonitorId};

impl<B: WindowBackend> Engine<B> {
    fn replace_child(&mut self, p: NodeId, old: NodeId, new: NodeId) {
        if let Some(node) = self.forest.get_mut(p) {
            if let Some(children) = node.children.as_mut() {
                for c in children.iter_mut() {
                    if *c == old {
                        *c = new;
                    }
                }
            }
        }
    }

    fn count_tiled_clients(&self, root: NodeId) -> u32 {
        self.forest
            .subtree(root)
            .iter()
            .filter(|&&n| {
                self.forest[n]
                    .client
                    .as_ref()
                    .map(|c| !c.state.is_floating())
                    .unwrap_or(false)
            })
            .count() as u32
    }

    fn private_pressure(&self, f: NodeId) -> bool {
        let node = &self.forest[f];
        if node.presel.is_some() {
            return false;
        }
        node.private
            || node
                .parent
                .map(|p| self.forest.private_count_in(p) > 0)
                .unwrap_or(false)
    }

    /// Largest non-vacant leaf that welcomes automatic insertion: not
    /// private, without a presel, and with no private leaf sharing its
    /// parent. Falls back to the largest leaf that merely is not private
    /// (or carries a presel).
    pub fn find_public(&self, d: DesktopId) -> Option<NodeId> {
        let root = self.desktops.get(d)?.root?;

        let mut best_manual: Option<(u32, NodeId)> = None;
        let mut best_automatic: Option<(u32, NodeId)> = None;

        for f in self.forest.leaves(root) {
            let node = &self.forest[f];
            if node.vacant {
                continue;
            }
            let f_area = area(self.get_rectangle(None, Some(d), Some(f)));
            if node.presel.is_some() || !node.private {
                if best_manual.map(|(a, _)| f_area > a).unwrap_or(true) {
                    best_manual = Some((f_area, f));
                }
            }
            let parent_private = node
                .parent
                .map(|p| self.forest.private_count_in(p) > 0)
                .unwrap_or(false);
            if node.presel.is_none() && !node.private && !parent_private {
                if best_automatic.map(|(a, _)| f_area > a).unwrap_or(true) {
                    best_automatic = Some((f_area, f));
                }
            }
        }

        best_automatic.or(best_manual).map(|(_, n)| n)
    }

    /// Splices leaf `n` into desktop `d` next to the receptive target
    /// `f` (the focus when absent). Honors presels, private pressure,
    /// tile limits and the automatic scheme.
    pub fn insert_node(
        &mut self,
        m: MonitorId,
        d: DesktopId,
        n: NodeId,
        f: Option<NodeId>,
    ) -> bool {
        if !self.desktops.contains_key(d) || !self.forest.contains(n) {
            return false;
        }

        if let Some(max) = self.desktops[d].tile_limit {
            let candidate = self.forest[n]
                .client
                .as_ref()
                .map(|c| !c.state.is_floating() && !c.ignore_tile_limits)
                .unwrap_or(false);
            if candidate {
                let tiles = self.desktops[d]
                    .root
                    .map(|r| self.count_tiled_clients(r))
                    .unwrap_or(0);
                if tiles >= max {
                    // Keep the window managed by floating it instead of
                    // refusing it; the node is not linked yet, so no
                    // stacking adjustment is due.
                    if let Some(client) = self.forest[n].client.as_mut() {
                        client.state = ClientState::Floating;
                        client.last_state = ClientState::Floating;
                    }
                    let (mid, did, nid) = (self.mid(m), self.did(d), self.nid(n));
                    self.emit(Event::NodeState {
                        monitor: mid,
                        desktop: did,
                        node: nid,
                        state: ClientState::Floating,
                        active: true,
                    });
                }
            }
        }

        let d_was_not_occupied = self.desktops[d].root.is_none();

        match f.filter(|&x| self.forest.contains(x)).or(self.desktops[d].root) {
            None => {
                self.forest[n].parent = None;
                self.desktops[d].root = Some(n);
            }
            Some(f) if self.forest[f].is_receptacle() && self.forest[f].presel.is_none() => {
                // The placeholder dissolves; the new leaf takes its spot.
                let p = self.forest[f].parent;
                match p {
                    Some(p) => self.replace_child(p, f, n),
                    None => self.desktops[d].root = Some(n),
                }
                self.forest[n].parent = p;
                self.forest.free(f);
            }
            Some(mut f) => {
                let c = self
                    .forest
                    .make_node(self.backend.generate_id(), self.settings.split_ratio);
                let mut p = self.forest[f].parent;

                if self.private_pressure(f) {
                    if let Some(k) = self.find_public(d) {
                        f = k;
                        p = self.forest[f].parent;
                    }
                    if self.private_pressure(f) {
                        let rect = self.get_rectangle(Some(m), Some(d), Some(f));
                        let dir = if rect.width >= rect.height {
                            Direction::East
                        } else {
                            Direction::South
                        };
                        self.presel_dir(m, d, f, dir);
                    }
                }

                self.forest[n].parent = Some(c);
                let presel = self.forest[f].presel;
                match presel {
                    None => {
                        let single_tiled = self.forest[f]
                            .client
                            .as_ref()
                            .map(|cl| cl.state.is_tiled())
                            .unwrap_or(false)
                            && self.desktops[d]
                                .root
                                .map(|r| self.forest.tiled_count(r, true))
                                .unwrap_or(0)
                                == 1;
                        let scheme = self.settings.automatic_scheme;

                        if p.is_none() || scheme != AutomaticScheme::Spiral || single_tiled {
                            match p {
                                Some(p) => self.replace_child(p, f, c),
                                None => self.desktops[d].root = Some(c),
                            }
                            self.forest[c].parent = p;
                            self.forest[f].parent = Some(c);
                            self.forest[c].children =
                                Some(match self.settings.initial_polarity {
                                    InitialPolarity::First => [n, f],
                                    InitialPolarity::Second => [f, n],
                                });

                            if p.is_none()
                                || scheme == AutomaticScheme::LongestSide
                                || single_tiled
                            {
                                let fr = self.forest[f].rectangle;
                                self.forest[c].split_type = if fr.width > fr.height {
                                    SplitType::Vertical
                                } else {
                                    SplitType::Horizontal
                                };
                            } else {
                                // Alternate: oppose the nearest ancestor
                                // split that still has two solid sides.
                                let mut q = p;
                                for _ in 0..=MAX_TREE_DEPTH {
                                    let Some(qq) = q else { break };
                                    match self.forest.children(qq) {
                                        Some([a, b])
                                            if self.forest[a].vacant
                                                || self.forest[b].vacant =>
                                        {
                                            q = self.forest[qq].parent;
                                        }
                                        _ => break,
                                    }
                                }
                                if let Some(qq) = q.or(p) {
                                    self.forest[c].split_type =
                                        self.forest[qq].split_type.other();
                                }
                            }
                        } else {
                            // Spiral: the new split takes the parent's
                            // place and the old parent becomes the
                            // sibling of the inserted leaf.
                            let Some(p) = p else { return false };
                            let g = self.forest[p].parent;
                            self.forest[c].parent = g;
                            match g {
                                Some(g) => self.replace_child(g, p, c),
                                None => self.desktops[d].root = Some(c),
                            }
                            self.forest[c].split_type = self.forest[p].split_type;
                            self.forest[c].split_ratio = self.forest[p].split_ratio;
                            self.forest[p].parent = Some(c);
                            let (children, rot) = if self.forest.is_first_child(f) {
                                ([n, p], 90)
                            } else {
                                ([p, n], 270)
                            };
                            self.forest[c].children = Some(children);
                            if !self.forest[n].vacant {
                                self.forest.rotate_tree(p, rot);
                            }
                        }
                    }
                    Some(presel) => {
                        if let Some(p) = p {
                            self.replace_child(p, f, c);
                        }
                        self.forest[c].split_ratio = presel.split_ratio;
                        self.forest[c].parent = p;
                        self.forest[f].parent = Some(c);
                        let (split_type, children) = match presel.split_dir {
                            Direction::West => (SplitType::Vertical, [n, f]),
                            Direction::East => (SplitType::Vertical, [f, n]),
                            Direction::North => (SplitType::Horizontal, [n, f]),
                            Direction::South => (SplitType::Horizontal, [f, n]),
                        };
                        self.forest[c].split_type = split_type;
                        self.forest[c].children = Some(children);
                        if self.desktops[d].root == Some(f) {
                            self.desktops[d].root = Some(c);
                        }
                        self.cancel_presel(Some(m), Some(d), f);
                        self.set_marked(m, d, n, false);
                    }
                }
            }
        }

        let vacant = self.leaf_should_be_vacant(n);
        if self.forest[n].vacant != vacant {
            self.set_vacant_local(Some(m), Some(d), n, vacant);
        }

        self.propagate_flags_upward(m, d, n);

        if self.desktops[d].focus.is_none() && self.forest.is_focusable(n) {
            self.desktops[d].focus = Some(n);
        }

        if d_was_not_occupied {
            self.emit(Event::Report);
        }
        true
    }

    /// Client-less placeholder inserted like a window would be.
    pub fn insert_receptacle(&mut self, m: MonitorId, d: DesktopId, target: Option<NodeId>) {
        if !self.monitors.contains_key(m) || !self.desktops.contains_key(d) {
            return;
        }
        let id = self.backend.generate_id();
        let r = self.forest.make_node(id, self.settings.split_ratio);
        if !self.insert_node(m, d, r, target) {
            self.forest.free(r);
            return;
        }
        let (mid, did) = (self.mid(m), self.did(d));
        let target_id = target.map(|t| self.nid(t)).unwrap_or(0);
        self.emit(Event::NodeAdd {
            monitor: mid,
            desktop: did,
            target: target_id,
            node: id,
        });

        if self.settings.single_monocle && self.desktops[d].layout == Layout::Monocle {
            let tiled = self.desktops[d]
                .root
                .map(|r| self.forest.tiled_count(r, true))
                .unwrap_or(0);
            if tiled > 1 {
                let user = self.desktops[d].user_layout;
                self.set_layout(m, d, user, false);
            }
        }
    }

    /// Collapses the parent of `n` onto its sibling, applying the
    /// removal adjustment of the active scheme.
    pub fn unlink_node(&mut self, m: MonitorId, d: DesktopId, n: NodeId) {
        if !self.desktops.contains_key(d) || !self.forest.contains(n) {
            return;
        }

        let Some(p) = self.forest[n].parent else {
            self.desktops[d].root = None;
            self.desktops[d].focus = None;
            self.emit(Event::Report);
            return;
        };

        let focus = self.desktops[d].focus;
        if focus == Some(p)
            || focus.map(|fc| self.forest.is_descendant(fc, n)).unwrap_or(false)
        {
            self.desktops[d].focus = None;
        }

        self.history.retain(|e| !(e.desktop == d && e.node == Some(p)));
        self.cancel_presel(Some(m), Some(d), p);
        if self.forest[p].sticky {
            if let Some(mon) = self.monitors.get_mut(m) {
                mon.sticky_count = mon.sticky_count.saturating_sub(1);
            }
        }

        let Some(b) = self.forest.brother(n) else {
            warn!("internal node without a second child");
            return;
        };
        let g = self.forest[p].parent;

        self.forest[b].parent = g;
        match g {
            Some(g) => self.replace_child(g, p, b),
            None => self.desktops[d].root = Some(b),
        }

        if !self.forest[n].vacant && self.settings.removal_adjustment {
            let scheme = self.settings.automatic_scheme;
            if scheme == AutomaticScheme::Spiral {
                let rot = if self.forest.is_first_child(n) { 270 } else { 90 };
                self.forest.rotate_tree(b, rot);
            } else if scheme == AutomaticScheme::LongestSide || g.is_none() {
                let pr = self.forest[p].rectangle;
                self.forest[b].split_type = if pr.width > pr.height {
                    SplitType::Vertical
                } else {
                    SplitType::Horizontal
                };
            } else if scheme == AutomaticScheme::Alternate {
                if let Some(g) = g {
                    self.forest[b].split_type = self.forest[g].split_type.other();
                }
            }
        }

        self.forest.free(p);
        self.forest[n].parent = None;
        self.propagate_flags_upward(m, d, b);
    }

    /// Unlinks and destroys the subtree at `n`, scrubbing every global
    /// structure that referenced it, then re-resolves focus.
    pub fn remove_node(&mut self, m: MonitorId, d: DesktopId, n: NodeId) {
        if !self.monitors.contains_key(m)
            || !self.desktops.contains_key(d)
            || !self.forest.contains(n)
        {
            return;
        }

        let (mid, did, nid) = (self.mid(m), self.did(d), self.nid(n));
        self.emit(Event::NodeRemove { monitor: mid, desktop: did, node: nid });

        let sticky_in = self.forest.sticky_count_in(n);
        let clients_in = self.forest.clients_count_in(n);
        let urgent_in = self
            .forest
            .subtree(n)
            .iter()
            .filter(|&&x| {
                self.forest[x].client.as_ref().map(|c| c.urgent).unwrap_or(false)
            })
            .count() as u32;

        self.unlink_node(m, d, n);
        {
            let Self { history, forest, .. } = self;
            history.retain(|e| {
                !(e.desktop == d
                    && e.node
                        .map(|en| en == n || forest.is_descendant(en, n))
                        .unwrap_or(false))
            });
        }
        self.remove_stack_node(n);
        self.cancel_presel_in(Some(m), Some(d), n);

        if self.monitors[m].sticky_count > 0 && self.monitors[m].desk == Some(d) {
            let mon = &mut self.monitors[m];
            mon.sticky_count = mon.sticky_count.saturating_sub(sticky_in);
        }
        self.desktops[d].urgent_count =
            self.desktops[d].urgent_count.saturating_sub(urgent_in);
        self.clients_count = self.clients_count.saturating_sub(clients_in);

        if let Some(g) = self.grabbed_node {
            if !self.forest.contains(g) || self.forest.is_descendant(g, n) {
                self.grabbed_node = None;
            }
        }

        for node in self.forest.subtree(n) {
            self.forest.free(node);
        }

        if self.settings.single_monocle && self.desktops[d].layout != Layout::Monocle {
            let tiled = self.desktops[d]
                .root
                .map(|r| self.forest.tiled_count(r, true))
                .unwrap_or(0);
            if tiled <= 1 {
                self.set_layout(m, d, Layout::Monocle, false);
            }
        }

        if self.focused_monitor.is_some() && self.desktops[d].focus.is_none() {
            let focused_desk = self
                .focused_monitor
                .and_then(|fm| self.monitors.get(fm))
                .and_then(|mm| mm.desk);
            if focused_desk == Some(d) {
                self.focus_node(Some(m), Some(d), None);
            } else {
                self.activate_node(m, d, None);
            }
        }
    }

    /// Exchanges two subtrees in place, preserving which desktop holds
    /// the focused path.
    #[allow(clippy::too_many_arguments)]
    pub fn swap_nodes(
        &mut self,
        m1: MonitorId,
        d1: DesktopId,
        n1: NodeId,
        m2: MonitorId,
        d2: DesktopId,
        n2: NodeId,
        follow: bool,
    ) -> bool {
        if n1 == n2
            || !self.forest.contains(n1)
            || !self.forest.contains(n2)
            || !self.monitors.contains_key(m1)
            || !self.monitors.contains_key(m2)
        {
            return false;
        }
        if self.forest.is_descendant(n1, n2) || self.forest.is_descendant(n2, n1) {
            return false;
        }

        if d1 != d2 {
            let n1_sticky = self.forest.sticky_count_in(n1);
            let n2_sticky = self.forest.sticky_count_in(n2);
            if (self.monitors[m1].sticky_count > 0 && n1_sticky > 0)
                || (self.monitors[m2].sticky_count > 0 && n2_sticky > 0)
            {
                return false;
            }
        }

        if !self.node_in_desktop(d1, n1) || !self.node_in_desktop(d2, n2) {
            return false;
        }

        let pn1 = self.forest[n1].parent;
        let pn2 = self.forest[n2].parent;
        if pn1 == Some(n2) || pn2 == Some(n1) {
            return false;
        }

        self.emit(Event::NodeSwap {
            src_monitor: self.mid(m1),
            src_desktop: self.did(d1),
            src_node: self.nid(n1),
            dst_monitor: self.mid(m2),
            dst_desktop: self.did(d2),
            dst_node: self.nid(n2),
        });

        let n1_first_child = self.forest.is_first_child(n1);
        let n2_first_child = self.forest.is_first_child(n2);
        let d1_focus = self.desktops[d1].focus;
        let d2_focus = self.desktops[d2].focus;
        let n1_held_focus =
            d1_focus.map(|f| self.forest.is_descendant(f, n1)).unwrap_or(false);
        let n2_held_focus =
            d2_focus.map(|f| self.forest.is_descendant(f, n2)).unwrap_or(false);

        self.drop_presel_feedback(n1);
        self.drop_presel_feedback(n2);

        if let Some(p) = pn1 {
            let slot = if n1_first_child { 0 } else { 1 };
            if let Some(children) = self.forest[p].children.as_mut() {
                children[slot] = n2;
            }
        }
        if let Some(p) = pn2 {
            let slot = if n2_first_child { 0 } else { 1 };
            if let Some(children) = self.forest[p].children.as_mut() {
                children[slot] = n1;
            }
        }
        self.forest[n1].parent = pn2;
        self.forest[n2].parent = pn1;

        self.propagate_flags_upward(m2, d2, n1);
        self.propagate_flags_upward(m1, d1, n2);

        if d1 != d2 {
            if self.desktops[d1].root == Some(n1) {
                self.desktops[d1].root = Some(n2);
            }
            if self.desktops[d2].root == Some(n2) {
                self.desktops[d2].root = Some(n1);
            }

            if n1_held_focus {
                self.desktops[d1].focus = if n2_held_focus { d2_focus } else { Some(n2) };
            }
            if n2_held_focus {
                self.desktops[d2].focus = if n1_held_focus { d1_focus } else { Some(n1) };
            }

            if m1 != m2 {
                let (r1, r2) = (self.monitors[m1].rectangle, self.monitors[m2].rectangle);
                self.adapt_geometry(r2, r1, n2);
                self.adapt_geometry(r1, r2, n1);
            }

            {
                let Self { history, forest, .. } = self;
                history.retain(|e| {
                    !(e.desktop == d1
                        && e.node
                            .map(|en| en == n1 || forest.is_descendant(en, n1))
                            .unwrap_or(false))
                });
                history.retain(|e| {
                    !(e.desktop == d2
                        && e.node
                            .map(|en| en == n2 || forest.is_descendant(en, n2))
                            .unwrap_or(false))
                });
            }

            let focused_desk = self
                .focused_monitor
                .and_then(|fm| self.monitors.get(fm))
                .and_then(|mm| mm.desk);
            let d1_was_focused = focused_desk == Some(d1);
            let d2_was_focused = focused_desk == Some(d2);
            let d1_active = self.monitors[m1].desk == Some(d1);
            let d2_active = self.monitors[m2].desk == Some(d2);

            if !d1_active && d2_active {
                self.show_node(d2, n1);
                if !follow || !d2_was_focused || !n2_held_focus {
                    self.hide_node(d2, n2);
                }
            } else if d1_active && !d2_active {
                if !follow || !d1_was_focused || !n1_held_focus {
                    self.hide_node(d1, n1);
                }
                self.show_node(d1, n2);
            }

            if self.settings.single_monocle {
                for (m, d) in [(m1, d1), (m2, d2)] {
                    let tiled = self.desktops[d]
                        .root
                        .map(|r| self.forest.tiled_count(r, true))
                        .unwrap_or(0);
                    let layout = if tiled <= 1 {
                        Layout::Monocle
                    } else {
                        self.desktops[d].user_layout
                    };
                    self.set_layout(m, d, layout, false);
                }
            }

            if n1_held_focus {
                if d1_was_focused {
                    if follow && d1_focus.map(|f| self.forest.contains(f)).unwrap_or(false) {
                        self.focus_node(Some(m2), Some(d2), d1_focus);
                    } else {
                        let f = self.desktops[d1].focus;
                        self.focus_node(Some(m1), Some(d1), f);
                    }
                } else {
                    let f = self.desktops[d1].focus;
                    self.activate_node(m1, d1, f);
                }
            } else {
                let focused = self.desktops[d1]
                    .focus
                    .map(|f| self.forest.is_descendant(n2, f))
                    .unwrap_or(false);
                self.draw_border(Some(n2), focused, self.focused_monitor == Some(m1));
            }

            if n2_held_focus {
                if d2_was_focused {
                    if follow && d2_focus.map(|f| self.forest.contains(f)).unwrap_or(false) {
                        self.focus_node(Some(m1), Some(d1), d2_focus);
                    } else {
                        let f = self.desktops[d2].focus;
                        self.focus_node(Some(m2), Some(d2), f);
                    }
                } else {
                    let f = self.desktops[d2].focus;
                    self.activate_node(m2, d2, f);
                }
            } else {
                let focused = self.desktops[d2]
                    .focus
                    .map(|f| self.forest.is_descendant(n1, f))
                    .unwrap_or(false);
                self.draw_border(Some(n1), focused, self.focused_monitor == Some(m2));
            }
        } else {
            if !n1_held_focus {
                let focused = self.desktops[d1]
                    .focus
                    .map(|f| self.forest.is_descendant(n1, f))
                    .unwrap_or(false);
                self.draw_border(Some(n1), focused, self.focused_monitor == Some(m1));
            }
            if !n2_held_focus {
                let focused = self.desktops[d1]
                    .focus
                    .map(|f| self.forest.is_descendant(n2, f))
                    .unwrap_or(false);
                self.draw_border(Some(n2), focused, self.focused_monitor == Some(m1));
            }
        }

        self.arrange(m1, d1);
        if d1 != d2 {
            self.arrange(m2, d2);
        } else if self.settings.pointer_follows_focus && (n1_held_focus || n2_held_focus) {
            if let Some(f) = self.desktops[d1].focus {
                let rect = self.get_rectangle(Some(m1), Some(d1), Some(f));
                if rect.is_valid() {
                    self.backend.center_pointer(rect);
                }
            }
        }

        true
    }

    /// Unlinks at the source, reinserts at the destination target, and
    /// migrates geometry, sticky counts, history and stacking.
    #[allow(clippy::too_many_arguments)]
    pub fn transfer_node(
        &mut self,
        ms: MonitorId,
        ds: DesktopId,
        ns: NodeId,
        md: MonitorId,
        dd: DesktopId,
        nd: Option<NodeId>,
        follow: bool,
    ) -> bool {
        if !self.forest.contains(ns)
            || Some(ns) == nd
            || nd.map(|x| self.forest.is_child(ns, x)).unwrap_or(false)
            || nd.map(|x| self.forest.is_descendant(x, ns)).unwrap_or(false)
        {
            return false;
        }
        if !self.monitors.contains_key(ms)
            || !self.monitors.contains_key(md)
            || !self.desktops.contains_key(ds)
            || !self.desktops.contains_key(dd)
        {
            return false;
        }

        let sc = if self.monitors[ms].sticky_count > 0 && self.monitors[ms].desk == Some(ds) {
            self.forest.sticky_count_in(ns)
        } else {
            0
        };
        if self.sticky_still && sc > 0 && self.monitors[md].desk != Some(dd) {
            return false;
        }

        self.emit(Event::NodeTransfer {
            src_monitor: self.mid(ms),
            src_desktop: self.did(ds),
            src_node: self.nid(ns),
            dst_monitor: self.mid(md),
            dst_desktop: self.did(dd),
            dst_node: nd.map(|x| self.nid(x)).unwrap_or(0),
        });

        let ds_focus = self.desktops[ds].focus;
        let held_focus = ds_focus.map(|f| self.forest.is_descendant(f, ns)).unwrap_or(false);
        let focus_was_child = ds_focus.map(|f| self.forest.is_child(ns, f)).unwrap_or(false);
        let last_ds_focus = if focus_was_child { None } else { ds_focus };
        let focused_desk = self
            .focused_monitor
            .and_then(|fm| self.monitors.get(fm))
            .and_then(|mm| mm.desk);
        let ds_was_focused = focused_desk == Some(ds);

        if held_focus && ds_was_focused {
            self.backend.clear_input_focus();
        }

        self.unlink_node(ms, ds, ns);
        let last_ds_focus = last_ds_focus.filter(|&f| self.forest.contains(f));
        self.insert_node(md, dd, ns, nd);

        if md != ms {
            let adapt = match self.forest[ns].client.as_ref() {
                Some(client) => self
                    .monitor_from_client(client)
                    .map(|mc| mc != md)
                    .unwrap_or(true),
                None => true,
            };
            if adapt {
                let (rs, rd) = (self.monitors[ms].rectangle, self.monitors[md].rectangle);
                self.adapt_geometry(rs, rd, ns);
            }
            self.monitors[ms].sticky_count =
                self.monitors[ms].sticky_count.saturating_sub(sc);
            self.monitors[md].sticky_count =
                self.monitors[md].sticky_count.saturating_add(sc);
        }

        if ds != dd && self.sticky_still {
            let ds_active = self.monitors[ms].desk == Some(ds);
            let dd_active = self.monitors[md].desk == Some(dd);
            if ds_active && !dd_active {
                self.hide_node(ds, ns);
            } else if !ds_active && dd_active {
                self.show_node(dd, ns);
            }
        }

        {
            let Self { history, forest, .. } = self;
            history.retain(|e| {
                !(e.desktop == ds
                    && e.node
                        .map(|en| en == ns || forest.is_descendant(en, ns))
                        .unwrap_or(false))
            });
        }
        self.stack(dd, ns, false);

        if ds == dd {
            if held_focus {
                if ds_was_focused {
                    self.focus_node(Some(ms), Some(ds), last_ds_focus);
                } else {
                    self.activate_node(ms, ds, last_ds_focus);
                }
            } else {
                let focused = self.desktops[ds]
                    .focus
                    .map(|f| self.forest.is_descendant(ns, f))
                    .unwrap_or(false);
                self.draw_border(Some(ns), focused, self.focused_monitor == Some(ms));
            }
        } else {
            if self.settings.single_monocle {
                let ds_tiled = self.desktops[ds]
                    .root
                    .map(|r| self.forest.tiled_count(r, true))
                    .unwrap_or(0);
                if self.desktops[ds].layout != Layout::Monocle && ds_tiled <= 1 {
                    self.set_layout(ms, ds, Layout::Monocle, false);
                }
                let dd_tiled = self.desktops[dd]
                    .root
                    .map(|r| self.forest.tiled_count(r, true))
                    .unwrap_or(0);
                if self.desktops[dd].layout == Layout::Monocle && dd_tiled > 1 {
                    let user = self.desktops[dd].user_layout;
                    self.set_layout(md, dd, user, false);
                }
            }
            if held_focus {
                if follow {
                    if ds_was_focused {
                        self.focus_node(Some(md), Some(dd), last_ds_focus);
                    }
                    let f = self.desktops[ds].focus;
                    self.activate_node(ms, ds, f);
                } else if ds_was_focused {
                    let f = self.desktops[ds].focus;
                    self.focus_node(Some(ms), Some(ds), f);
                } else {
                    let f = self.desktops[ds].focus;
                    self.activate_node(ms, ds, f);
                }
            }
            if !held_focus || !follow || !ds_was_focused {
                if self.desktops[dd].focus == Some(ns) {
                    let target = if held_focus { last_ds_focus } else { Some(ns) };
                    let dd_is_focused_desk = self
                        .focused_monitor
                        .and_then(|fm| self.monitors.get(fm))
                        .and_then(|mm| mm.desk)
                        == Some(dd);
                    if dd_is_focused_desk {
                        self.focus_node(Some(md), Some(dd), target);
                    } else {
                        self.activate_node(md, dd, target);
                    }
                } else {
                    let focused = self.desktops[dd]
                        .focus
                        .map(|f| self.forest.is_descendant(ns, f))
                        .unwrap_or(false);
                    self.draw_border(Some(ns), focused, self.focused_monitor == Some(md));
                }
            }
        }

        self.arrange(ms, ds);
        if ds != dd {
            self.arrange(md, dd);
        }

        true
    }

    /// Carries every sticky leaf under `n` from the source desktop to
    /// the destination desktop so it stays visible.
    pub fn transfer_sticky_nodes(
        &mut self,
        ms: MonitorId,
        ds: DesktopId,
        md: MonitorId,
        dd: DesktopId,
        n: Option<NodeId>,
    ) {
        self.transfer_sticky_rec(ms, ds, md, dd, n, 0);
    }

    fn transfer_sticky_rec(
        &mut self,
        ms: MonitorId,
        ds: DesktopId,
        md: MonitorId,
        dd: DesktopId,
        n: Option<NodeId>,
        depth: usize,
    ) {
        let Some(n) = n else { return };
        if depth > MAX_TREE_DEPTH {
            warn!("depth guard tripped while transferring sticky leaves");
            return;
        }
        if !self.forest.contains(n) {
            return;
        }
        if self.forest[n].sticky {
            let target = self.desktops.get(dd).and_then(|x| x.focus);
            self.sticky_still = false;
            self.transfer_node(ms, ds, n, md, dd, target, false);
            self.sticky_still = true;
        } else if let Some([first, second]) = self.forest.children(n) {
            self.transfer_sticky_rec(ms, ds, md, dd, Some(first), depth + 1);
            self.transfer_sticky_rec(ms, ds, md, dd, Some(second), depth + 1);
        }
    }

    /// Rotates the tiled leaves of the subtree while keeping the tree
    /// shape: repeated pairwise swaps from one extremum to the other.
    pub fn circulate_leaves(
        &mut self,
        m: MonitorId,
        d: DesktopId,
        n: NodeId,
        dir: CirculateDir,
    ) {
        if !self.monitors.contains_key(m) || !self.desktops.contains_key(d) {
            return;
        }
        if self.forest.tiled_count(n, false) < 2 {
            return;
        }
        let Some(focus) = self.desktops[d].focus else { return };
        let Some(p) = self.forest.parent(focus) else { return };
        let focus_first_child = self.forest.is_first_child(focus);

        match dir {
            CirculateDir::Forward => {
                let mut e = self.forest.second_extrema(n);
                while let Some(x) = e {
                    let tiled = self.forest[x]
                        .client
                        .as_ref()
                        .map(|c| c.state.is_tiled())
                        .unwrap_or(false);
                    if tiled {
                        break;
                    }
                    e = self.forest.prev_leaf(x, n);
                }
                let mut s = e;
                let mut f = s.and_then(|x| self.forest.prev_tiled_leaf(x, n));
                while let (Some(sx), Some(fx)) = (s, f) {
                    self.swap_nodes(m, d, fx, m, d, sx, false);
                    s = self.forest.prev_tiled_leaf(fx, n);
                    f = s.and_then(|x| self.forest.prev_tiled_leaf(x, n));
                }
            }
            CirculateDir::Backward => {
                let mut e = self.forest.first_extrema(n);
                while let Some(x) = e {
                    let tiled = self.forest[x]
                        .client
                        .as_ref()
                        .map(|c| c.state.is_tiled())
                        .unwrap_or(false);
                    if tiled {
                        break;
                    }
                    e = self.forest.next_leaf(x, n);
                }
                let mut f = e;
                let mut s = f.and_then(|x| self.forest.next_tiled_leaf(x, n));
                while let (Some(fx), Some(sx)) = (f, s) {
                    self.swap_nodes(m, d, fx, m, d, sx, false);
                    f = self.forest.next_tiled_leaf(sx, n);
                    s = f.and_then(|x| self.forest.next_tiled_leaf(x, n));
                }
            }
        }

        let f = if focus_first_child {
            self.forest.first_child(p)
        } else {
            self.forest.second_child(p)
        };
        if let Some(f) = f {
            if self.forest.is_leaf(f) {
                let focused_desk = self
                    .focused_monitor
                    .and_then(|fm| self.monitors.get(fm))
                    .and_then(|mm| mm.desk);
                if focused_desk == Some(d) {
                    self.focus_node(Some(m), Some(d), Some(f));
                } else {
                    self.activate_node(m, d, Some(f));
                }
            }
        }
    }

    pub fn rotate_node(&mut self, m: MonitorId, d: DesktopId, n: NodeId, deg: u32) -> bool {
        if !matches!(deg, 90 | 180 | 270) || !self.node_in_desktop(d, n) {
            return false;
        }
        self.forest.rotate_tree(n, deg);
        self.arrange(m, d);
        true
    }

    pub fn flip_node(
        &mut self,
        m: MonitorId,
        d: DesktopId,
        n: NodeId,
        axis: crate::geometry::FlipAxis,
    ) -> bool {
        if !self.node_in_desktop(d, n) {
            return false;
        }
        self.forest.flip_tree(n, axis);
        self.arrange(m, d);
        true
    }

    pub fn equalize_node(&mut self, m: MonitorId, d: DesktopId, n: NodeId) -> bool {
        if !self.node_in_desktop(d, n) {
            return false;
        }
        let ratio = self.settings.split_ratio;
        self.forest.equalize_tree(n, ratio);
        self.arrange(m, d);
        true
    }

    pub fn balance_node(&mut self, m: MonitorId, d: DesktopId, n: NodeId) -> bool {
        if !self.node_in_desktop(d, n) {
            return false;
        }
        self.forest.balance_tree(n);
        self.arrange(m, d);
        true
    }

    pub fn set_split_type(
        &mut self,
        m: MonitorId,
        d: DesktopId,
        n: NodeId,
        split_type: SplitType,
    ) -> bool {
        if !self.node_in_desktop(d, n) || !self.forest.set_split_type(n, split_type) {
            return false;
        }
        self.arrange(m, d);
        true
    }

    pub fn set_split_ratio(&mut self, m: MonitorId, d: DesktopId, n: NodeId, ratio: f64) -> bool {
        if !self.node_in_desktop(d, n) || !self.forest.set_split_ratio(n, ratio) {
            return false;
        }
        self.arrange(m, d);
        true
    }

    // Flag propagation.

    pub fn set_vacant(&mut self, m: MonitorId, d: DesktopId, n: NodeId, value: bool) {
        let Some(node) = self.forest.get(n) else { return };
        if node.vacant == value {
            return;
        }
        self.propagate_vacant_downward(m, d, n, value, 0);
        self.propagate_vacant_upward(m, d, n);
    }

    pub(crate) fn set_vacant_local(
        &mut self,
        m: Option<MonitorId>,
        d: Option<DesktopId>,
        n: NodeId,
        value: bool,
    ) {
        let Some(node) = self.forest.get_mut(n) else { return };
        if node.vacant == value {
            return;
        }
        node.vacant = value;
        if value {
            self.cancel_presel(m, d, n);
        }
    }

    fn propagate_vacant_downward(
        &mut self,
        m: MonitorId,
        d: DesktopId,
        n: NodeId,
        value: bool,
        depth: usize,
    ) {
        if depth > MAX_TREE_DEPTH {
            warn!("depth guard tripped while propagating vacancy");
            return;
        }
        self.set_vacant_local(Some(m), Some(d), n, value);
        if let Some([first, second]) = self.forest.children(n) {
            self.propagate_vacant_downward(m, d, first, value, depth + 1);
            self.propagate_vacant_downward(m, d, second, value, depth + 1);
        }
    }

    fn propagate_vacant_upward(&mut self, m: MonitorId, d: DesktopId, n: NodeId) {
        let mut cur = self.forest.parent(n);
        for _ in 0..=MAX_TREE_DEPTH {
            let Some(p) = cur else { return };
            if let Some([first, second]) = self.forest.children(p) {
                let vacant = self.forest[first].vacant && self.forest[second].vacant;
                self.set_vacant_local(Some(m), Some(d), p, vacant);
            }
            cur = self.forest.parent(p);
        }
        warn!("depth guard tripped while propagating vacancy upward");
    }

    /// Reconciles vacancy, hiddenness and constraints along the path
    /// from `n`'s parent to the root.
    pub(crate) fn propagate_flags_upward(&mut self, m: MonitorId, d: DesktopId, n: NodeId) {
        let mut cur = self.forest.parent(n);
        for _ in 0..=MAX_TREE_DEPTH {
            let Some(p) = cur else { return };
            if let Some([first, second]) = self.forest.children(p) {
                let vacant = self.forest[first].vacant && self.forest[second].vacant;
                let hidden = self.forest[first].hidden && self.forest[second].hidden;
                self.set_vacant_local(Some(m), Some(d), p, vacant);
                self.set_hidden_local(m, d, p, hidden);
                self.forest.update_constraints(p);
            }
            cur = self.forest.parent(p);
        }
        warn!("depth guard tripped while propagating flags upward");
    }

    pub fn set_hidden(&mut self, m: MonitorId, d: DesktopId, n: NodeId, value: bool) {
        let Some(node) = self.forest.get(n) else { return };
        if node.hidden == value || !self.desktops.contains_key(d) {
            return;
        }

        let held_focus = self.desktops[d]
            .focus
            .map(|f| self.forest.is_descendant(f, n))
            .unwrap_or(false);

        self.propagate_hidden_downward(m, d, n, value, 0);
        self.propagate_hidden_upward(m, d, n);

        let (mid, did, nid) = (self.mid(m), self.did(d), self.nid(n));
        self.emit(Event::NodeFlag {
            monitor: mid,
            desktop: did,
            node: nid,
            flag: NodeFlag::Hidden,
            value,
        });

        if held_focus || self.desktops[d].focus.is_none() {
            if self.desktops[d].focus.is_some() {
                self.desktops[d].focus = None;
                self.draw_border(Some(n), false, self.focused_monitor == Some(m));
            }
            let focused_desk = self
                .focused_monitor
                .and_then(|fm| self.monitors.get(fm))
                .and_then(|mm| mm.desk);
            if focused_desk == Some(d) {
                self.focus_node(Some(m), Some(d), None);
            } else {
                self.activate_node(m, d, None);
            }
        }

        if self.settings.single_monocle {
            let tiled = self.desktops[d]
                .root
                .map(|r| self.forest.tiled_count(r, true))
                .unwrap_or(0);
            if value && self.desktops[d].layout != Layout::Monocle && tiled <= 1 {
                self.set_layout(m, d, Layout::Monocle, false);
            } else if !value && self.desktops[d].layout == Layout::Monocle && tiled > 1 {
                let user = self.desktops[d].user_layout;
                self.set_layout(m, d, user, false);
            }
        }
    }

    pub(crate) fn set_hidden_local(
        &mut self,
        m: MonitorId,
        d: DesktopId,
        n: NodeId,
        value: bool,
    ) {
        let Some(node) = self.forest.get_mut(n) else { return };
        if node.hidden == value {
            return;
        }
        node.hidden = value;

        let id = node.id;
        let (shown, tiled) = match node.client.as_mut() {
            Some(client) => {
                client.wm_flags.hidden = value;
                (client.shown, client.state.is_tiled())
            }
            None => return,
        };
        if shown {
            self.backend.set_visibility(id, !value);
        }
        if tiled {
            self.set_vacant(m, d, n, value);
        }
    }

    fn propagate_hidden_downward(
        &mut self,
        m: MonitorId,
        d: DesktopId,
        n: NodeId,
        value: bool,
        depth: usize,
    ) {
        if depth > MAX_TREE_DEPTH {
            warn!("depth guard tripped while propagating hiddenness");
            return;
        }
        self.set_hidden_local(m, d, n, value);
        if let Some([first, second]) = self.forest.children(n) {
            self.propagate_hidden_downward(m, d, first, value, depth + 1);
            self.propagate_hidden_downward(m, d, second, value, depth + 1);
        }
    }

    fn propagate_hidden_upward(&mut self, m: MonitorId, d: DesktopId, n: NodeId) {
        let mut cur = self.forest.parent(n);
        for _ in 0..=MAX_TREE_DEPTH {
            let Some(p) = cur else { return };
            if let Some([first, second]) = self.forest.children(p) {
                let hidden = self.forest[first].hidden && self.forest[second].hidden;
                self.set_hidden_local(m, d, p, hidden);
            }
            cur = self.forest.parent(p);
        }
        warn!("depth guard tripped while propagating hiddenness upward");
    }

    /// A sticky leaf follows its monitor across desktop switches; it is
    /// first moved to the active desktop if set elsewhere.
    pub fn set_sticky(&mut self, m: MonitorId, d: DesktopId, n: NodeId, value: bool) {
        if !self.monitors.contains_key(m) || !self.desktops.contains_key(d) {
            return;
        }
        let Some(node) = self.forest.get(n) else { return };
        if node.sticky == value {
            return;
        }

        if self.monitors[m].desk != Some(d) {
            if let Some(desk) = self.monitors[m].desk {
                let target = self.desktops[desk].focus;
                self.transfer_node(m, d, n, m, desk, target, false);
            }
        }

        self.forest[n].sticky = value;
        {
            let mon = &mut self.monitors[m];
            if value {
                mon.sticky_count += 1;
            } else {
                mon.sticky_count = mon.sticky_count.saturating_sub(1);
            }
        }

        if let Some(client) = self.forest[n].client.as_mut() {
            client.wm_flags.sticky = value;
        }

        let (mid, nid) = (self.mid(m), self.nid(n));
        let did = self.monitors[m].desk.map(|x| self.did(x)).unwrap_or(0);
        self.emit(Event::NodeFlag {
            monitor: mid,
            desktop: did,
            node: nid,
            flag: NodeFlag::Sticky,
            value,
        });
        let focus = self.monitors[m].desk.and_then(|x| self.desktops[x].focus);
        if focus == Some(n) {
            self.emit(Event::Report);
        }
    }

    pub fn set_private(&mut self, m: MonitorId, d: DesktopId, n: NodeId, value: bool) {
        self.set_simple_flag(m, d, n, NodeFlag::Private, value);
    }

    pub fn set_locked(&mut self, m: MonitorId, d: DesktopId, n: NodeId, value: bool) {
        self.set_simple_flag(m, d, n, NodeFlag::Locked, value);
    }

    pub fn set_marked(&mut self, m: MonitorId, d: DesktopId, n: NodeId, value: bool) {
        self.set_simple_flag(m, d, n, NodeFlag::Marked, value);
    }

    fn set_simple_flag(
        &mut self,
        m: MonitorId,
        d: DesktopId,
        n: NodeId,
        flag: NodeFlag,
        value: bool,
    ) {
        let Some(node) = self.forest.get_mut(n) else { return };
        let slot = match flag {
            NodeFlag::Private => &mut node.private,
            NodeFlag::Locked => &mut node.locked,
            NodeFlag::Marked => &mut node.marked,
            _ => return,
        };
        if *slot == value {
            return;
        }
        *slot = value;

        let (mid, did, nid) = (self.mid(m), self.did(d), self.nid(n));
        self.emit(Event::NodeFlag { monitor: mid, desktop: did, node: nid, flag, value });

        let focus = self
            .monitors
            .get(m)
            .and_then(|mm| mm.desk)
            .and_then(|x| self.desktops[x].focus);
        if focus == Some(n) {
            self.emit(Event::Report);
        }
    }

    pub fn set_urgent(&mut self, m: MonitorId, d: DesktopId, n: NodeId, value: bool) {
        let focused_focus = self
            .focused_monitor
            .and_then(|fm| self.monitors.get(fm))
            .and_then(|mm| mm.desk)
            .and_then(|x| self.desktops.get(x))
            .and_then(|desk| desk.focus);
        if value && focused_focus == Some(n) {
            return;
        }
        let Some(client) = self.forest.get_mut(n).and_then(|x| x.client.as_mut()) else {
            return;
        };
        if client.urgent == value {
            return;
        }
        client.urgent = value;
        client.wm_flags.demands_attention = value;

        if let Some(desk) = self.desktops.get_mut(d) {
            if value {
                desk.urgent_count += 1;
            } else {
                desk.urgent_count = desk.urgent_count.saturating_sub(1);
            }
        }

        let (mid, did, nid) = (self.mid(m), self.did(d), self.nid(n));
        self.emit(Event::NodeFlag {
            monitor: mid,
            desktop: did,
            node: nid,
            flag: NodeFlag::Urgent,
            value,
        });
        self.emit(Event::Report);
    }

    // Client state machine.

    pub fn set_state(
        &mut self,
        m: MonitorId,
        d: DesktopId,
        n: NodeId,
        state: ClientState,
    ) -> bool {
        let Some(client) = self.forest.get_mut(n).and_then(|x| x.client.as_mut()) else {
            return false;
        };
        if client.state == state {
            return false;
        }

        let was_tiled = client.state.is_tiled();
        client.last_state = client.state;
        client.state = state;
        let last = client.last_state;

        match last {
            ClientState::Floating => self.set_floating(m, d, n, false),
            ClientState::Fullscreen => self.set_fullscreen(m, d, n, false),
            _ => {}
        }
        let (mid, did, nid) = (self.mid(m), self.did(d), self.nid(n));
        self.emit(Event::NodeState {
            monitor: mid,
            desktop: did,
            node: nid,
            state: last,
            active: false,
        });

        match state {
            ClientState::Floating => self.set_floating(m, d, n, true),
            ClientState::Fullscreen => self.set_fullscreen(m, d, n, true),
            _ => {}
        }
        self.emit(Event::NodeState {
            monitor: mid,
            desktop: did,
            node: nid,
            state,
            active: true,
        });

        let focus = self
            .monitors
            .get(m)
            .and_then(|mm| mm.desk)
            .and_then(|x| self.desktops[x].focus);
        if focus == Some(n) {
            self.emit(Event::Report);
        }

        let is_tiled = state.is_tiled();
        if self.settings.single_monocle && was_tiled != is_tiled {
            let tiled = self.desktops[d]
                .root
                .map(|r| self.forest.tiled_count(r, true))
                .unwrap_or(0);
            if was_tiled && self.desktops[d].layout != Layout::Monocle && tiled <= 1 {
                self.set_layout(m, d, Layout::Monocle, false);
            } else if !was_tiled && self.desktops[d].layout == Layout::Monocle && tiled > 1 {
                let user = self.desktops[d].user_layout;
                self.set_layout(m, d, user, false);
            }
        }

        true
    }

    fn set_floating(&mut self, m: MonitorId, d: DesktopId, n: NodeId, value: bool) {
        if !self.forest.contains(n) {
            return;
        }
        self.cancel_presel(Some(m), Some(d), n);
        if !self.forest[n].hidden {
            self.set_vacant(m, d, n, value);
        }
        let is_focus = self.desktops.get(d).map(|x| x.focus == Some(n)).unwrap_or(false);
        if !value && is_focus {
            self.neutralize_occluding_windows(m, d, n);
        }
        self.stack(d, n, is_focus);
    }

    fn set_fullscreen(&mut self, m: MonitorId, d: DesktopId, n: NodeId, value: bool) {
        if self.forest.get(n).and_then(|x| x.client.as_ref()).is_none() {
            return;
        }
        self.cancel_presel(Some(m), Some(d), n);
        if !self.forest[n].hidden {
            self.set_vacant(m, d, n, value);
        }
        if let Some(client) = self.forest[n].client.as_mut() {
            client.wm_flags.fullscreen = value;
        }
        let is_focus = self.desktops.get(d).map(|x| x.focus == Some(n)).unwrap_or(false);
        if !value && is_focus {
            self.neutralize_occluding_windows(m, d, n);
        }
        self.stack(d, n, is_focus);
    }

    pub fn set_layer(&mut self, m: MonitorId, d: DesktopId, n: NodeId, layer: StackLayer) -> bool {
        let Some(client) = self.forest.get_mut(n).and_then(|x| x.client.as_mut()) else {
            return false;
        };
        if client.layer == layer {
            return false;
        }
        client.last_layer = client.layer;
        client.layer = layer;
        client.wm_flags.above = layer == StackLayer::Above;
        client.wm_flags.below = layer == StackLayer::Below;

        let (mid, did, nid) = (self.mid(m), self.did(d), self.nid(n));
        self.emit(Event::NodeLayer { monitor: mid, desktop: did, node: nid, layer });

        let is_focus = self.desktops.get(d).map(|x| x.focus == Some(n)).unwrap_or(false);
        if is_focus {
            self.neutralize_occluding_windows(m, d, n);
        }
        self.stack(d, n, is_focus);
        true
    }

    /// Any fullscreen client stacked above `n` reverts to its previous
    /// state so it stops occluding the newly relevant window.
    pub fn neutralize_occluding_windows(&mut self, m: MonitorId, d: DesktopId, n: NodeId) {
        let Some(root) = self.desktops.get(d).and_then(|x| x.root) else { return };
        if !self.forest.contains(n) {
            return;
        }

        let fs: Vec<NodeId> = self.forest.leaves(n).collect();
        let all: Vec<NodeId> = self.forest.leaves(root).collect();
        let mut reverts: Vec<(NodeId, ClientState)> = Vec::new();

        for &f in &fs {
            let Some(fc) = self.forest[f].client.as_ref() else { continue };
            for &a in &all {
                if a == f {
                    continue;
                }
                let Some(ac) = self.forest[a].client.as_ref() else { continue };
                if ac.state.is_fullscreen() && stack_cmp(fc, ac) < 0 {
                    reverts.push((a, ac.last_state));
                }
            }
        }

        let changed = !reverts.is_empty();
        for (a, last) in reverts {
            self.set_state(m, d, a, last);
        }
        if changed {
            self.arrange(m, d);
        }
    }

    // Preselection.

    pub fn presel_dir(&mut self, m: MonitorId, d: DesktopId, n: NodeId, dir: Direction) {
        let ratio = self.settings.split_ratio;
        let Some(node) = self.forest.get_mut(n) else { return };
        let presel = node.presel.get_or_insert(Presel {
            split_dir: Direction::East,
            split_ratio: ratio,
            feedback: None,
        });
        presel.split_dir = dir;

        let (mid, did, nid) = (self.mid(m), self.did(d), self.nid(n));
        self.emit(Event::NodePresel {
            monitor: mid,
            desktop: did,
            node: nid,
            change: PreselChange::Dir(dir),
        });
    }

    pub fn presel_ratio(&mut self, m: MonitorId, d: DesktopId, n: NodeId, ratio: f64) {
        if !(0.0..=1.0).contains(&ratio) {
            return;
        }
        let default_ratio = self.settings.split_ratio;
        let Some(node) = self.forest.get_mut(n) else { return };
        let presel = node.presel.get_or_insert(Presel {
            split_dir: Direction::East,
            split_ratio: default_ratio,
            feedback: None,
        });
        presel.split_ratio = ratio;

        let (mid, did, nid) = (self.mid(m), self.did(d), self.nid(n));
        self.emit(Event::NodePresel {
            monitor: mid,
            desktop: did,
            node: nid,
            change: PreselChange::Ratio(ratio),
        });
    }

    pub fn cancel_presel(&mut self, m: Option<MonitorId>, d: Option<DesktopId>, n: NodeId) {
        let Some(node) = self.forest.get_mut(n) else { return };
        let Some(presel) = node.presel.take() else { return };
        if let Some(feedback) = presel.feedback {
            self.backend.hide(feedback);
        }
        if let (Some(m), Some(d)) = (m, d) {
            let (mid, did, nid) = (self.mid(m), self.did(d), self.nid(n));
            self.emit(Event::NodePresel {
                monitor: mid,
                desktop: did,
                node: nid,
                change: PreselChange::Cancel,
            });
        }
    }

    pub fn cancel_presel_in(&mut self, m: Option<MonitorId>, d: Option<DesktopId>, n: NodeId) {
        for node in self.forest.subtree(n) {
            self.cancel_presel(m, d, node);
        }
    }

    fn drop_presel_feedback(&mut self, n: NodeId) {
        let Some(node) = self.forest.get_mut(n) else { return };
        if let Some(presel) = node.presel.as_mut() {
            if let Some(feedback) = presel.feedback.take() {
                self.backend.hide(feedback);
            }
        }
    }

    // Visibility.

    pub(crate) fn show_node(&mut self, d: DesktopId, n: NodeId) {
        self.show_node_rec(d, n, 0);
    }

    fn show_node_rec(&mut self, d: DesktopId, n: NodeId, depth: usize) {
        if depth > MAX_TREE_DEPTH {
            warn!("depth guard tripped while showing a subtree");
            return;
        }
        let Some(node) = self.forest.get(n) else { return };
        let monocle = self
            .desktops
            .get(d)
            .map(|x| x.layout == Layout::Monocle)
            .unwrap_or(false);

        if !node.hidden {
            let id = node.id;
            let feedback = node.presel.and_then(|p| p.feedback);
            if node.client.is_some() {
                self.backend.show(id);
            }
            if let Some(feedback) = feedback {
                if !monocle {
                    self.backend.show(feedback);
                }
            }
        }
        if let Some(client) = self.forest[n].client.as_mut() {
            client.shown = true;
        }
        if let Some([first, second]) = self.forest.children(n) {
            self.show_node_rec(d, first, depth + 1);
            self.show_node_rec(d, second, depth + 1);
        }
    }

    pub(crate) fn hide_node(&mut self, d: DesktopId, n: NodeId) {
        let hide_sticky = self.settings.hide_sticky;
        self.hide_node_rec(d, n, hide_sticky, 0);
    }

    pub(crate) fn hide_node_with(&mut self, d: DesktopId, n: NodeId, hide_sticky: bool) {
        self.hide_node_rec(d, n, hide_sticky, 0);
    }

    fn hide_node_rec(&mut self, d: DesktopId, n: NodeId, hide_sticky: bool, depth: usize) {
        if depth > MAX_TREE_DEPTH {
            warn!("depth guard tripped while hiding a subtree");
            return;
        }
        let Some(node) = self.forest.get(n) else { return };
        if !hide_sticky && node.sticky {
            return;
        }
        let monocle = self
            .desktops
            .get(d)
            .map(|x| x.layout == Layout::Monocle)
            .unwrap_or(false);

        if !node.hidden {
            let id = node.id;
            let feedback = node.presel.and_then(|p| p.feedback);
            if let Some(feedback) = feedback {
                if !monocle {
                    self.backend.hide(feedback);
                }
            }
            if node.client.is_some() {
                self.backend.hide(id);
            }
        }
        if let Some(client) = self.forest[n].client.as_mut() {
            client.shown = false;
        }
        if let Some([first, second]) = self.forest.children(n) {
            self.hide_node_rec(d, first, hide_sticky, depth + 1);
            self.hide_node_rec(d, second, hide_sticky, depth + 1);
        }
    }

    // Closing.

    /// Politely asks every client under `n` to close, falling back to a
    /// kill when the client does not speak the delete protocol.
    pub fn close_node(&mut self, n: NodeId) {
        let leaves: Vec<NodeId> = self
            .forest
            .subtree(n)
            .into_iter()
            .filter(|&x| self.forest[x].client.is_some())
            .collect();
        for leaf in leaves {
            let node = &self.forest[leaf];
            let id = node.id;
            let delete = node
                .client
                .as_ref()
                .map(|c| c.icccm.delete_window)
                .unwrap_or(false);
            if delete {
                self.backend.send_close_message(id);
            } else {
                self.backend.kill(id);
            }
        }
    }

    pub fn kill_node(&mut self, m: MonitorId, d: DesktopId, n: NodeId) {
        if !self.forest.contains(n) {
            return;
        }
        if self.forest[n].is_receptacle() {
            self.remove_node(m, d, n);
            self.arrange(m, d);
            return;
        }
        let ids: Vec<u32> = self
            .forest
            .leaves(n)
            .filter(|&f| self.forest[f].client.is_some())
            .map(|f| self.forest[f].id)
            .collect();
        for id in ids {
            self.backend.kill(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::backend::WindowBackend;
    use crate::common::config::{AutomaticScheme, InitialPolarity};
    use crate::engine::test_support::{assert_invariants, engine_with_events, single_monitor};
    use crate::events::Event;
    use crate::geometry::{Direction, Rect, SplitType};
    use crate::model::client::ClientState;

    fn rect() -> Rect { Rect::new(0, 0, 1000, 1000) }

    #[test]
    fn second_insertion_creates_exactly_one_split() {
        let (mut engine, m, d) = single_monitor(rect());
        let a = crate::engine::test_support::managed(&mut engine, m, d);
        assert_eq!(engine.forest().len(), 1);
        let b = crate::engine::test_support::managed(&mut engine, m, d);
        assert_eq!(engine.forest().len(), 3);

        let root = engine.desktop(d).unwrap().root.unwrap();
        let [first, second] = engine.forest().children(root).unwrap();
        assert_eq!((first, second), (a, b));
        assert_eq!(engine.forest()[root].split_type, SplitType::Vertical);
        assert_invariants(&engine);
    }

    #[test]
    fn polarity_first_puts_the_new_leaf_on_the_first_side() {
        let (mut engine, m, d) = single_monitor(rect());
        engine.settings.initial_polarity = InitialPolarity::First;
        let a = crate::engine::test_support::managed(&mut engine, m, d);
        let b = crate::engine::test_support::managed(&mut engine, m, d);
        let root = engine.desktop(d).unwrap().root.unwrap();
        assert_eq!(engine.forest().children(root).unwrap(), [b, a]);
    }

    #[test]
    fn presel_overrides_the_automatic_scheme() {
        let (mut engine, m, d) = single_monitor(rect());
        let a = crate::engine::test_support::managed(&mut engine, m, d);
        engine.presel_dir(m, d, a, Direction::North);
        engine.presel_ratio(m, d, a, 0.3);
        let b = crate::engine::test_support::managed(&mut engine, m, d);

        let root = engine.desktop(d).unwrap().root.unwrap();
        assert_eq!(engine.forest()[root].split_type, SplitType::Horizontal);
        assert!((engine.forest()[root].split_ratio - 0.3).abs() < 1e-9);
        assert_eq!(engine.forest().children(root).unwrap(), [b, a]);
        assert!(engine.forest()[a].presel.is_none());
        assert_invariants(&engine);
    }

    #[test]
    fn spiral_insertion_promotes_the_old_parent() {
        let (mut engine, m, d) = single_monitor(rect());
        engine.settings.automatic_scheme = AutomaticScheme::Spiral;
        let a = crate::engine::test_support::managed(&mut engine, m, d);
        let b = crate::engine::test_support::managed(&mut engine, m, d);
        // Focus back on A, a first child, so the next insertion targets it.
        engine.focus_node(Some(m), Some(d), Some(a));
        let c = crate::engine::test_support::managed(&mut engine, m, d);

        let root = engine.desktop(d).unwrap().root.unwrap();
        let [first, second] = engine.forest().children(root).unwrap();
        // C took the first half; the old parent (holding A and B) became
        // its sibling, its split axis turned by the quarter rotation.
        assert_eq!(first, c);
        assert_eq!(
            engine.forest().leaves(second).collect::<Vec<_>>(),
            vec![a, b]
        );
        assert_eq!(engine.forest()[second].split_type, SplitType::Horizontal);
        assert_invariants(&engine);
    }

    #[test]
    fn receptacle_is_replaced_in_place() {
        let (mut engine, m, d) = single_monitor(rect());
        let a = crate::engine::test_support::managed(&mut engine, m, d);
        engine.insert_receptacle(m, d, Some(a));
        let root = engine.desktop(d).unwrap().root.unwrap();
        let receptacle = engine
            .forest()
            .leaves(root)
            .find(|&f| engine.forest()[f].client.is_none())
            .unwrap();
        assert!(engine.forest()[receptacle].vacant);
        let slot_parent = engine.forest().parent(receptacle).unwrap();
        let node_count = engine.forest().len();

        // Insert a window targeting the receptacle: the placeholder
        // dissolves and the new leaf takes its exact spot.
        let id = engine.backend.generate_id();
        let n = engine.forest.make_node(id, engine.settings.split_ratio);
        engine.forest[n].client = Some(Default::default());
        assert!(engine.insert_node(m, d, n, Some(receptacle)));
        engine.clients_count += 1;
        engine.stack(d, n, false);
        engine.arrange(m, d);

        assert!(!engine.forest().contains(receptacle));
        assert_eq!(engine.forest().parent(n), Some(slot_parent));
        assert_eq!(engine.forest().len(), node_count);
        assert_invariants(&engine);
    }

    #[test]
    fn removal_adjustment_reorients_the_survivor() {
        let (mut engine, m, d) = single_monitor(Rect::new(0, 0, 600, 1000));
        let a = crate::engine::test_support::managed(&mut engine, m, d);
        let b = crate::engine::test_support::managed(&mut engine, m, d);
        // The dissolving split spanned 600x1000, taller than wide, so the
        // survivor is annotated for horizontal splits of future children.
        engine.remove_node(m, d, a);
        engine.arrange(m, d);

        let root = engine.desktop(d).unwrap().root.unwrap();
        assert_eq!(root, b);
        assert_eq!(engine.forest()[b].split_type, SplitType::Horizontal);
        assert_invariants(&engine);
    }

    #[test]
    fn removing_the_last_leaf_clears_the_desktop_and_reports() {
        let (mut engine, rx) = engine_with_events();
        engine.settings.window_gap = 0;
        let m = engine.add_monitor("main", rect());
        let d = engine.add_desktop(m, "one");
        let a = crate::engine::test_support::managed(&mut engine, m, d);
        while rx.try_recv().is_ok() {}

        engine.remove_node(m, d, a);
        let desk = engine.desktop(d).unwrap();
        assert_eq!(desk.root, None);
        assert_eq!(desk.focus, None);
        let events: Vec<Event> = rx.try_iter().collect();
        assert!(events
            .iter()
            .any(|e| matches!(e, Event::NodeRemove { .. })));
        assert!(events.iter().any(|e| matches!(e, Event::Report)));
        assert_invariants(&engine);
    }

    #[test]
    fn swap_nodes_twice_is_identity() {
        let (mut engine, m, d) = single_monitor(rect());
        let a = crate::engine::test_support::managed(&mut engine, m, d);
        let b = crate::engine::test_support::managed(&mut engine, m, d);
        let c = crate::engine::test_support::managed(&mut engine, m, d);

        let root = engine.desktop(d).unwrap().root.unwrap();
        let before: Vec<_> = engine.forest().leaves(root).collect();
        assert!(engine.swap_nodes(m, d, a, m, d, c, false));
        assert!(engine.swap_nodes(m, d, a, m, d, c, false));
        let after: Vec<_> = engine.forest().leaves(root).collect();
        assert_eq!(before, after);
        let _ = b;
        assert_invariants(&engine);
    }

    #[test]
    fn swap_refuses_related_nodes() {
        let (mut engine, m, d) = single_monitor(rect());
        let a = crate::engine::test_support::managed(&mut engine, m, d);
        let b = crate::engine::test_support::managed(&mut engine, m, d);
        let root = engine.desktop(d).unwrap().root.unwrap();
        assert!(!engine.swap_nodes(m, d, root, m, d, a, false));
        assert!(!engine.swap_nodes(m, d, a, m, d, a, false));
        let _ = b;
    }

    #[test]
    fn tile_limit_forces_overflow_to_floating() {
        let (mut engine, m, d) = single_monitor(rect());
        engine.set_tile_limit(d, Some(1));
        let a = crate::engine::test_support::managed(&mut engine, m, d);
        let b = crate::engine::test_support::managed(&mut engine, m, d);
        assert!(engine.forest()[a]
            .client
            .as_ref()
            .unwrap()
            .state
            .is_tiled());
        assert!(engine.forest()[b]
            .client
            .as_ref()
            .unwrap()
            .state
            .is_floating());
        assert_invariants(&engine);
    }

    #[test]
    fn private_leaves_redirect_automatic_insertion() {
        let (mut engine, m, d) = single_monitor(rect());
        let a = crate::engine::test_support::managed(&mut engine, m, d);
        let b = crate::engine::test_support::managed(&mut engine, m, d);
        engine.set_private(m, d, b, true);
        engine.focus_node(Some(m), Some(d), Some(b));
        let c = crate::engine::test_support::managed(&mut engine, m, d);

        // The insertion was redirected away from the private leaf: C
        // ended up paired with the public leaf A, not with B.
        assert_eq!(engine.forest().brother(c), Some(a));
        assert_invariants(&engine);
    }

    #[test]
    fn hiding_the_focus_reresolves_it() {
        let (mut engine, m, d) = single_monitor(rect());
        let a = crate::engine::test_support::managed(&mut engine, m, d);
        let b = crate::engine::test_support::managed(&mut engine, m, d);
        assert_eq!(engine.desktop(d).unwrap().focus, Some(b));

        engine.set_hidden(m, d, b, true);
        assert_eq!(engine.desktop(d).unwrap().focus, Some(a));
        assert!(engine.forest()[b].vacant);

        engine.set_hidden(m, d, b, false);
        assert!(!engine.forest()[b].vacant);
        assert_invariants(&engine);
    }

    #[test]
    fn fullscreen_reverts_when_occluding_a_raised_window() {
        let (mut engine, m, d) = single_monitor(rect());
        let a = crate::engine::test_support::managed(&mut engine, m, d);
        let b = crate::engine::test_support::managed(&mut engine, m, d);
        engine.set_state(m, d, b, ClientState::Fullscreen);
        assert!(engine.forest()[b].client.as_ref().unwrap().state.is_fullscreen());

        engine.focus_node(Some(m), Some(d), Some(a));
        assert_eq!(
            engine.forest()[b].client.as_ref().unwrap().state,
            ClientState::Tiled
        );
        assert_invariants(&engine);
    }

    #[test]
    fn state_round_trip_restores_vacancy() {
        let (mut engine, m, d) = single_monitor(rect());
        let a = crate::engine::test_support::managed(&mut engine, m, d);
        let b = crate::engine::test_support::managed(&mut engine, m, d);
        engine.set_state(m, d, a, ClientState::Floating);
        assert!(engine.forest()[a].vacant);
        // The sibling now receives the whole area.
        engine.arrange(m, d);
        assert_eq!(engine.forest()[b].client.as_ref().unwrap().tiled_rectangle.width, 1000);

        engine.set_state(m, d, a, ClientState::Tiled);
        assert!(!engine.forest()[a].vacant);
        assert_invariants(&engine);
    }
}

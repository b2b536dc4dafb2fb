use crate::backend::WindowBackend;
use crate::engine::Engine;
use crate::events::{Event, StackRelation};
use crate::model::client::{stack_cmp, Client};
use crate::model::forest::NodeId;
use crate::model::monitor::DesktopId;

impl<B: WindowBackend> Engine<B> {
    fn stacked_client(&self, n: NodeId) -> Option<&Client> {
        self.forest.get(n).and_then(|x| x.client.as_ref())
    }

    /// Bottom-most element strictly above `n`'s level, used when raising.
    fn limit_above(&self, n: NodeId) -> Option<NodeId> {
        let client = self.stacked_client(n)?;
        let mut i = 0;
        while i < self.stacking.len() {
            match self.stacked_client(self.stacking[i]) {
                Some(other) if stack_cmp(client, other) >= 0 => i += 1,
                _ => break,
            }
        }
        let mut idx = if i == self.stacking.len() {
            self.stacking.len().checked_sub(1)?
        } else {
            i
        };
        if self.stacking[idx] == n {
            idx = idx.checked_sub(1)?;
        }
        Some(self.stacking[idx])
    }

    /// Top-most element strictly below `n`'s level, used when lowering.
    fn limit_below(&self, n: NodeId) -> Option<NodeId> {
        let client = self.stacked_client(n)?;
        let mut i = self.stacking.len();
        while i > 0 {
            match self.stacked_client(self.stacking[i - 1]) {
                Some(other) if stack_cmp(client, other) <= 0 => i -= 1,
                _ => break,
            }
        }
        let mut idx = if i == 0 { 0 } else { i - 1 };
        if self.stacking.get(idx) == Some(&n) {
            idx += 1;
            if idx >= self.stacking.len() {
                return None;
            }
        }
        self.stacking.get(idx).copied()
    }

    fn stack_insert_before(&mut self, anchor: NodeId, n: NodeId) {
        if anchor == n {
            return;
        }
        self.stacking.retain(|&s| s != n);
        match self.stacking.iter().position(|&s| s == anchor) {
            Some(i) => self.stacking.insert(i, n),
            None => self.stacking.push(n),
        }
    }

    fn stack_insert_after(&mut self, anchor: NodeId, n: NodeId) {
        if anchor == n {
            return;
        }
        self.stacking.retain(|&s| s != n);
        match self.stacking.iter().position(|&s| s == anchor) {
            Some(i) => self.stacking.insert(i + 1, n),
            None => self.stacking.push(n),
        }
    }

    pub(crate) fn remove_stack_node(&mut self, n: NodeId) {
        let leaves: Vec<NodeId> = self.forest.leaves(n).collect();
        self.stacking.retain(|s| !leaves.contains(s));
    }

    /// Inserts every managed leaf under `n` at its stack-level boundary
    /// and mirrors the order to the backend.
    pub fn stack(&mut self, d: DesktopId, n: NodeId, focused: bool) {
        if !self.desktops.contains_key(d) || !self.forest.contains(n) {
            return;
        }

        let leaves: Vec<NodeId> = self.forest.leaves(n).collect();
        for f in leaves {
            let Some(client) = self.stacked_client(f) else { continue };
            if client.state.is_floating() && !self.settings.auto_raise {
                continue;
            }

            if self.stacking.is_empty() {
                self.stacking.push(f);
                continue;
            }

            let anchor = if focused { self.limit_above(f) } else { self.limit_below(f) };
            let Some(anchor) = anchor else { continue };
            let (Some(fc), Some(ac)) = (self.stacked_client(f), self.stacked_client(anchor))
            else {
                continue;
            };

            let order = stack_cmp(fc, ac);
            let (f_id, anchor_id) = (self.nid(f), self.nid(anchor));
            if order < 0 || (order == 0 && !focused) {
                self.stack_insert_before(anchor, f);
                self.backend.below(f_id, anchor_id);
                self.emit(Event::NodeStack {
                    node: f_id,
                    relation: StackRelation::Below,
                    reference: anchor_id,
                });
            } else {
                self.stack_insert_after(anchor, f);
                self.backend.above(f_id, anchor_id);
                self.emit(Event::NodeStack {
                    node: f_id,
                    relation: StackRelation::Above,
                    reference: anchor_id,
                });
            }
        }

        self.restack_presel_feedbacks(d);
    }

    /// Presel feedback windows float just above the topmost tiled leaf.
    pub(crate) fn restack_presel_feedbacks(&mut self, d: DesktopId) {
        let Some(root) = self.desktops.get(d).and_then(|x| x.root) else { return };

        let top_tiled = self
            .stacking
            .iter()
            .rev()
            .find(|&&s| {
                self.stacked_client(s).map(|c| c.state.is_tiled()).unwrap_or(false)
            })
            .copied();
        let Some(top_tiled) = top_tiled else { return };
        let reference = self.nid(top_tiled);

        let feedbacks: Vec<u32> = self
            .forest
            .subtree(root)
            .into_iter()
            .filter_map(|x| self.forest[x].presel.and_then(|p| p.feedback))
            .collect();
        for feedback in feedbacks {
            self.backend.above(feedback, reference);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::backend::BackendCall;
    use crate::engine::test_support::{assert_invariants, managed, single_monitor};
    use crate::geometry::Rect;
    use crate::model::client::{stack_level, ClientState, StackLayer};

    fn rect() -> Rect { Rect::new(0, 0, 1000, 1000) }

    #[test]
    fn every_managed_leaf_appears_exactly_once() {
        let (mut engine, m, d) = single_monitor(rect());
        let a = managed(&mut engine, m, d);
        let b = managed(&mut engine, m, d);
        let c = managed(&mut engine, m, d);
        for n in [a, b, c] {
            assert_eq!(engine.stacking().iter().filter(|&&s| s == n).count(), 1);
        }
        assert_invariants(&engine);
    }

    #[test]
    fn fullscreen_rises_above_tiled_and_floating() {
        let (mut engine, m, d) = single_monitor(rect());
        let a = managed(&mut engine, m, d);
        let b = managed(&mut engine, m, d);
        let c = managed(&mut engine, m, d);
        engine.set_state(m, d, a, ClientState::Floating);
        engine.set_state(m, d, b, ClientState::Fullscreen);

        let levels: Vec<i32> = engine
            .stacking()
            .iter()
            .map(|&s| stack_level(engine.forest()[s].client.as_ref().unwrap()))
            .collect();
        let mut sorted = levels.clone();
        sorted.sort();
        assert_eq!(levels, sorted);
        assert_eq!(*engine.stacking().last().unwrap(), b);
        let _ = c;
    }

    #[test]
    fn below_layer_sinks_under_normal_tiled() {
        let (mut engine, m, d) = single_monitor(rect());
        let a = managed(&mut engine, m, d);
        let b = managed(&mut engine, m, d);
        engine.set_layer(m, d, b, StackLayer::Below);
        assert_eq!(engine.stacking().first().copied(), Some(b));
        let _ = a;
        assert_invariants(&engine);
    }

    #[test]
    fn raising_emits_backend_restack_calls() {
        let (mut engine, m, d) = single_monitor(rect());
        let a = managed(&mut engine, m, d);
        let b = managed(&mut engine, m, d);
        engine.backend.clear_calls();
        engine.focus_node(Some(m), Some(d), Some(a));
        assert!(engine
            .backend
            .calls
            .iter()
            .any(|c| matches!(c, BackendCall::Above { .. } | BackendCall::Below { .. })));
        let _ = b;
    }

    #[test]
    fn ties_raise_the_focused_leaf_last() {
        let (mut engine, m, d) = single_monitor(rect());
        let a = managed(&mut engine, m, d);
        let b = managed(&mut engine, m, d);
        engine.focus_node(Some(m), Some(d), Some(a));
        assert_eq!(*engine.stacking().last().unwrap(), a);
        engine.focus_node(Some(m), Some(d), Some(b));
        assert_eq!(*engine.stacking().last().unwrap(), b);
    }
}

use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};
use slotmap::{new_key_type, SlotMap};
use tracing::warn;

use crate::geometry::{Direction, FlipAxis, Rect, SplitType};
use crate::model::client::Client;

pub const MAX_TREE_DEPTH: usize = 256;
pub const MIN_WIDTH: u16 = 32;
pub const MIN_HEIGHT: u16 = 32;

new_key_type! {
    pub struct NodeId;
}

/// Pending split recorded on a leaf: the next insertion next to it uses
/// this direction and ratio instead of the automatic scheme.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Presel {
    pub split_dir: Direction,
    pub split_ratio: f64,
    pub feedback: Option<u32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraints {
    pub min_width: u16,
    pub min_height: u16,
}

impl Default for Constraints {
    fn default() -> Self {
        Self {
            min_width: MIN_WIDTH,
            min_height: MIN_HEIGHT,
        }
    }
}

/// A cell of the full binary partition tree. Internal nodes always carry
/// both children, encoded as a single `Option` pair; leaves carry neither
/// and may hold a client (or none, for receptacles).
#[derive(Clone, Debug)]
pub struct Node {
    pub id: u32,
    pub parent: Option<NodeId>,
    pub children: Option<[NodeId; 2]>,
    pub split_type: SplitType,
    pub split_ratio: f64,
    pub rectangle: Rect,
    pub constraints: Constraints,
    pub vacant: bool,
    pub hidden: bool,
    pub sticky: bool,
    pub private: bool,
    pub locked: bool,
    pub marked: bool,
    pub presel: Option<Presel>,
    pub client: Option<Client>,
}

impl Node {
    pub fn new(id: u32, split_ratio: f64) -> Self {
        Self {
            id,
            parent: None,
            children: None,
            split_type: SplitType::Vertical,
            split_ratio,
            rectangle: Rect::default(),
            constraints: Constraints::default(),
            vacant: false,
            hidden: false,
            sticky: false,
            private: false,
            locked: false,
            marked: false,
            presel: None,
            client: None,
        }
    }

    pub fn is_leaf(&self) -> bool { self.children.is_none() }

    pub fn is_receptacle(&self) -> bool { self.is_leaf() && self.client.is_none() }
}

#[derive(Default)]
pub struct Forest {
    nodes: SlotMap<NodeId, Node>,
}

impl Index<NodeId> for Forest {
    type Output = Node;

    fn index(&self, n: NodeId) -> &Node { &self.nodes[n] }
}

impl IndexMut<NodeId> for Forest {
    fn index_mut(&mut self, n: NodeId) -> &mut Node { &mut self.nodes[n] }
}

impl Forest {
    pub fn new() -> Self { Self::default() }

    pub fn make_node(&mut self, id: u32, split_ratio: f64) -> NodeId {
        self.nodes.insert(Node::new(id, split_ratio))
    }

    pub fn get(&self, n: NodeId) -> Option<&Node> { self.nodes.get(n) }

    pub fn get_mut(&mut self, n: NodeId) -> Option<&mut Node> { self.nodes.get_mut(n) }

    pub fn contains(&self, n: NodeId) -> bool { self.nodes.contains_key(n) }

    pub fn free(&mut self, n: NodeId) { self.nodes.remove(n); }

    pub fn len(&self) -> usize { self.nodes.len() }

    pub fn is_empty(&self) -> bool { self.nodes.is_empty() }

    pub fn parent(&self, n: NodeId) -> Option<NodeId> { self.nodes.get(n)?.parent }

    pub fn children(&self, n: NodeId) -> Option<[NodeId; 2]> { self.nodes.get(n)?.children }

    pub fn first_child(&self, n: NodeId) -> Option<NodeId> {
        self.children(n).map(|c| c[0])
    }

    pub fn second_child(&self, n: NodeId) -> Option<NodeId> {
        self.children(n).map(|c| c[1])
    }

    pub fn is_leaf(&self, n: NodeId) -> bool {
        self.nodes.get(n).map(|node| node.is_leaf()).unwrap_or(false)
    }

    pub fn is_first_child(&self, n: NodeId) -> bool {
        self.parent(n)
            .and_then(|p| self.first_child(p))
            .map(|c| c == n)
            .unwrap_or(false)
    }

    pub fn is_second_child(&self, n: NodeId) -> bool {
        self.parent(n)
            .and_then(|p| self.second_child(p))
            .map(|c| c == n)
            .unwrap_or(false)
    }

    pub fn brother(&self, n: NodeId) -> Option<NodeId> {
        let p = self.parent(n)?;
        let [first, second] = self.children(p)?;
        Some(if first == n { second } else { first })
    }

    pub fn is_child(&self, a: NodeId, b: NodeId) -> bool { self.parent(a) == Some(b) }

    pub fn is_descendant(&self, a: NodeId, b: NodeId) -> bool {
        let mut cur = Some(a);
        for _ in 0..=MAX_TREE_DEPTH {
            match cur {
                Some(c) if c == b => return true,
                Some(c) => cur = self.parent(c),
                None => return false,
            }
        }
        warn!("depth guard tripped while walking ancestors");
        false
    }

    pub fn root_of(&self, n: NodeId) -> NodeId {
        let mut cur = n;
        for _ in 0..MAX_TREE_DEPTH {
            match self.parent(cur) {
                Some(p) => cur = p,
                None => return cur,
            }
        }
        warn!("depth guard tripped while walking to root");
        cur
    }

    /// Deepest descendant reached through first children.
    pub fn first_extrema(&self, n: NodeId) -> Option<NodeId> {
        if !self.contains(n) {
            return None;
        }
        let mut cur = n;
        for _ in 0..=MAX_TREE_DEPTH {
            match self.first_child(cur) {
                Some(c) => cur = c,
                None => return Some(cur),
            }
        }
        warn!("depth guard tripped in first_extrema");
        None
    }

    pub fn second_extrema(&self, n: NodeId) -> Option<NodeId> {
        if !self.contains(n) {
            return None;
        }
        let mut cur = n;
        for _ in 0..=MAX_TREE_DEPTH {
            match self.second_child(cur) {
                Some(c) => cur = c,
                None => return Some(cur),
            }
        }
        warn!("depth guard tripped in second_extrema");
        None
    }

    pub fn next_leaf(&self, n: NodeId, root: NodeId) -> Option<NodeId> {
        let mut p = n;
        for _ in 0..=MAX_TREE_DEPTH {
            if !self.is_second_child(p) || p == root {
                break;
            }
            p = self.parent(p)?;
        }
        if p == root {
            return None;
        }
        let parent = self.parent(p)?;
        self.first_extrema(self.second_child(parent)?)
    }

    pub fn prev_leaf(&self, n: NodeId, root: NodeId) -> Option<NodeId> {
        let mut p = n;
        for _ in 0..=MAX_TREE_DEPTH {
            if !self.is_first_child(p) || p == root {
                break;
            }
            p = self.parent(p)?;
        }
        if p == root {
            return None;
        }
        let parent = self.parent(p)?;
        self.second_extrema(self.first_child(parent)?)
    }

    pub fn next_tiled_leaf(&self, n: NodeId, root: NodeId) -> Option<NodeId> {
        let mut cur = self.next_leaf(n, root);
        while let Some(c) = cur {
            let node = self.get(c)?;
            if node.client.is_some() && !node.vacant {
                return Some(c);
            }
            cur = self.next_leaf(c, root);
        }
        None
    }

    pub fn prev_tiled_leaf(&self, n: NodeId, root: NodeId) -> Option<NodeId> {
        let mut cur = self.prev_leaf(n, root);
        while let Some(c) = cur {
            let node = self.get(c)?;
            if node.client.is_some() && !node.vacant {
                return Some(c);
            }
            cur = self.prev_leaf(c, root);
        }
        None
    }

    /// Full in-order node iteration, internal nodes included.
    pub fn next_node(&self, n: NodeId) -> Option<NodeId> {
        if let Some(second) = self.second_child(n) {
            return self.first_extrema(second);
        }
        let mut p = n;
        for _ in 0..=MAX_TREE_DEPTH {
            if !self.is_second_child(p) {
                break;
            }
            p = self.parent(p)?;
        }
        if self.is_first_child(p) {
            return self.parent(p);
        }
        None
    }

    pub fn prev_node(&self, n: NodeId) -> Option<NodeId> {
        if let Some(first) = self.first_child(n) {
            return self.second_extrema(first);
        }
        let mut p = n;
        for _ in 0..=MAX_TREE_DEPTH {
            if !self.is_first_child(p) {
                break;
            }
            p = self.parent(p)?;
        }
        if self.is_second_child(p) {
            return self.parent(p);
        }
        None
    }

    pub fn leaves(&self, root: NodeId) -> Leaves<'_> {
        Leaves {
            forest: self,
            root,
            next: self.first_extrema(root),
        }
    }

    /// Pre-order visit over a subtree, collected up front so callers may
    /// mutate while iterating.
    pub fn subtree(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![(root, 0usize)];
        while let Some((n, depth)) = stack.pop() {
            if depth > MAX_TREE_DEPTH {
                warn!("depth guard tripped while collecting a subtree");
                break;
            }
            if !self.contains(n) {
                continue;
            }
            out.push(n);
            if let Some([first, second]) = self.children(n) {
                stack.push((second, depth + 1));
                stack.push((first, depth + 1));
            }
        }
        out
    }

    pub fn find_node_by_id(&self, root: NodeId, id: u32) -> Option<NodeId> {
        self.subtree(root).into_iter().find(|&n| self[n].id == id)
    }

    pub fn is_focusable(&self, n: NodeId) -> bool {
        self.leaves(n)
            .any(|f| self[f].client.is_some() && !self[f].hidden)
    }

    pub fn first_focusable_leaf(&self, root: NodeId) -> Option<NodeId> {
        self.leaves(root)
            .find(|&f| self[f].client.is_some() && !self[f].hidden)
    }

    /// Nearest ancestor split matching the direction's axis whose extent
    /// strictly exceeds `n` on that side.
    pub fn find_fence(&self, n: NodeId, dir: Direction) -> Option<NodeId> {
        let rect = self.get(n)?.rectangle;
        let mut p = self.parent(n);
        for _ in 0..=MAX_TREE_DEPTH {
            let q = p?;
            let node = self.get(q)?;
            let pr = node.rectangle;
            let found = match dir {
                Direction::North => node.split_type == SplitType::Horizontal && pr.y < rect.y,
                Direction::West => node.split_type == SplitType::Vertical && pr.x < rect.x,
                Direction::South => {
                    node.split_type == SplitType::Horizontal && pr.bottom() > rect.bottom()
                }
                Direction::East => {
                    node.split_type == SplitType::Vertical && pr.right() > rect.right()
                }
            };
            if found {
                return Some(q);
            }
            p = node.parent;
        }
        warn!("depth guard tripped in find_fence");
        None
    }

    pub fn clients_count_in(&self, n: NodeId) -> u32 {
        self.leaves(n).filter(|&f| self[f].client.is_some()).count() as u32
    }

    pub fn sticky_count_in(&self, n: NodeId) -> u32 {
        self.subtree(n).iter().filter(|&&f| self[f].sticky).count() as u32
    }

    pub fn private_count_in(&self, n: NodeId) -> u32 {
        self.subtree(n).iter().filter(|&&f| self[f].private).count() as u32
    }

    pub fn locked_count_in(&self, n: NodeId) -> u32 {
        self.subtree(n).iter().filter(|&&f| self[f].locked).count() as u32
    }

    /// Number of layout-relevant leaves under `n`. Receptacles only count
    /// when asked for, hidden leaves never do.
    pub fn tiled_count(&self, n: NodeId, include_receptacles: bool) -> u32 {
        self.leaves(n)
            .filter(|&f| {
                let node = &self[f];
                !node.hidden
                    && ((include_receptacles && node.client.is_none())
                        || node.client.as_ref().map(|c| c.state.is_tiled()).unwrap_or(false))
            })
            .count() as u32
    }

    pub fn set_split_type(&mut self, n: NodeId, split_type: SplitType) -> bool {
        match self.get_mut(n) {
            Some(node) if node.split_type != split_type => node.split_type = split_type,
            _ => return false,
        }
        self.update_constraints(n);
        self.rebuild_constraints_towards_root(n);
        true
    }

    pub fn set_split_ratio(&mut self, n: NodeId, ratio: f64) -> bool {
        if !(0.0..=1.0).contains(&ratio) {
            return false;
        }
        match self.get_mut(n) {
            Some(node) if node.split_ratio != ratio => {
                node.split_ratio = ratio;
                true
            }
            _ => false,
        }
    }

    /// 90° swaps children and inverts the ratio when the axis matches the
    /// quarter-turn, then inverts the axis; 180° only mirrors. Constraints
    /// are rebuilt afterwards.
    pub fn rotate_tree(&mut self, n: NodeId, deg: u32) {
        self.rotate_tree_rec(n, deg, 0);
        self.rebuild_constraints_from_leaves(n);
        self.rebuild_constraints_towards_root(n);
    }

    fn rotate_tree_rec(&mut self, n: NodeId, deg: u32, depth: usize) {
        if deg == 0 || depth > MAX_TREE_DEPTH {
            if depth > MAX_TREE_DEPTH {
                warn!("depth guard tripped in rotate_tree");
            }
            return;
        }
        let Some(node) = self.get_mut(n) else { return };
        let Some(children) = node.children else { return };

        if (deg == 90 && node.split_type == SplitType::Horizontal)
            || (deg == 270 && node.split_type == SplitType::Vertical)
            || deg == 180
        {
            node.children = Some([children[1], children[0]]);
            node.split_ratio = 1.0 - node.split_ratio;
        }

        if deg != 180 {
            node.split_type = node.split_type.other();
        }

        self.rotate_tree_rec(children[0], deg, depth + 1);
        self.rotate_tree_rec(children[1], deg, depth + 1);
    }

    pub fn flip_tree(&mut self, n: NodeId, axis: FlipAxis) {
        self.flip_tree_rec(n, axis, 0);
    }

    fn flip_tree_rec(&mut self, n: NodeId, axis: FlipAxis, depth: usize) {
        if depth > MAX_TREE_DEPTH {
            warn!("depth guard tripped in flip_tree");
            return;
        }
        let Some(node) = self.get_mut(n) else { return };
        let Some(children) = node.children else { return };

        if (axis == FlipAxis::Horizontal && node.split_type == SplitType::Horizontal)
            || (axis == FlipAxis::Vertical && node.split_type == SplitType::Vertical)
        {
            node.children = Some([children[1], children[0]]);
            node.split_ratio = 1.0 - node.split_ratio;
        }

        self.flip_tree_rec(children[0], axis, depth + 1);
        self.flip_tree_rec(children[1], axis, depth + 1);
    }

    pub fn equalize_tree(&mut self, n: NodeId, default_ratio: f64) {
        self.equalize_tree_rec(n, default_ratio, 0);
    }

    fn equalize_tree_rec(&mut self, n: NodeId, default_ratio: f64, depth: usize) {
        if depth > MAX_TREE_DEPTH {
            warn!("depth guard tripped in equalize_tree");
            return;
        }
        let Some(node) = self.get_mut(n) else { return };
        if node.vacant {
            return;
        }
        node.split_ratio = default_ratio;
        if let Some([first, second]) = node.children {
            self.equalize_tree_rec(first, default_ratio, depth + 1);
            self.equalize_tree_rec(second, default_ratio, depth + 1);
        }
    }

    /// Post-order: every internal node's ratio becomes the share of leaves
    /// living under its first child.
    pub fn balance_tree(&mut self, n: NodeId) -> u32 {
        self.balance_tree_rec(n, 0)
    }

    fn balance_tree_rec(&mut self, n: NodeId, depth: usize) -> u32 {
        if depth > MAX_TREE_DEPTH {
            warn!("depth guard tripped in balance_tree");
            return 0;
        }
        let Some(node) = self.get(n) else { return 0 };
        if node.vacant {
            return 0;
        }
        let Some([first, second]) = node.children else {
            return 1;
        };

        let b1 = self.balance_tree_rec(first, depth + 1);
        let b2 = self.balance_tree_rec(second, depth + 1);
        let b = b1 + b2;
        if b1 > 0 && b2 > 0 {
            self[n].split_ratio = b1 as f64 / b as f64;
        }
        b
    }

    /// Re-derives split ratios from the last computed rectangles so that
    /// on-screen proportions survive a rotation of the tree.
    pub fn adjust_ratios(&mut self, n: NodeId, rect: Rect) {
        self.adjust_ratios_rec(n, rect, 0);
    }

    fn adjust_ratios_rec(&mut self, n: NodeId, rect: Rect, depth: usize) {
        if depth > MAX_TREE_DEPTH {
            warn!("depth guard tripped in adjust_ratios");
            return;
        }
        let Some(node) = self.get(n) else { return };
        if node.vacant {
            return;
        }

        let stored = node.rectangle;
        let split_type = node.split_type;
        let ratio = match split_type {
            SplitType::Vertical => {
                let position = stored.x as f64 + node.split_ratio * stored.width as f64;
                if rect.width > 0 {
                    (position - rect.x as f64) / rect.width as f64
                } else {
                    0.5
                }
            }
            SplitType::Horizontal => {
                let position = stored.y as f64 + node.split_ratio * stored.height as f64;
                if rect.height > 0 {
                    (position - rect.y as f64) / rect.height as f64
                } else {
                    0.5
                }
            }
        };
        let ratio = ratio.clamp(0.0, 1.0);
        self[n].split_ratio = ratio;

        let Some([first, second]) = self.children(n) else { return };
        if self[first].vacant {
            self.adjust_ratios_rec(second, rect, depth + 1);
            return;
        }
        if self[second].vacant {
            self.adjust_ratios_rec(first, rect, depth + 1);
            return;
        }

        let (first_rect, second_rect) = match split_type {
            SplitType::Vertical => {
                let fence = (rect.width as f64 * ratio) as u16;
                (
                    Rect::new(rect.x, rect.y, fence, rect.height),
                    Rect::new(
                        rect.x.saturating_add(fence as i16),
                        rect.y,
                        rect.width - fence,
                        rect.height,
                    ),
                )
            }
            SplitType::Horizontal => {
                let fence = (rect.height as f64 * ratio) as u16;
                (
                    Rect::new(rect.x, rect.y, rect.width, fence),
                    Rect::new(
                        rect.x,
                        rect.y.saturating_add(fence as i16),
                        rect.width,
                        rect.height - fence,
                    ),
                )
            }
        };

        self.adjust_ratios_rec(first, first_rect, depth + 1);
        self.adjust_ratios_rec(second, second_rect, depth + 1);
    }

    /// Vertical splits sum widths and max heights; horizontal transposed.
    pub fn update_constraints(&mut self, n: NodeId) {
        let Some(node) = self.get(n) else { return };
        let Some([first, second]) = node.children else { return };
        let split_type = node.split_type;
        let (Some(c1), Some(c2)) = (
            self.get(first).map(|f| f.constraints),
            self.get(second).map(|s| s.constraints),
        ) else {
            return;
        };

        let constraints = match split_type {
            SplitType::Vertical => Constraints {
                min_width: c1.min_width.saturating_add(c2.min_width),
                min_height: c1.min_height.max(c2.min_height),
            },
            SplitType::Horizontal => Constraints {
                min_width: c1.min_width.max(c2.min_width),
                min_height: c1.min_height.saturating_add(c2.min_height),
            },
        };
        self[n].constraints = constraints;
    }

    pub fn rebuild_constraints_from_leaves(&mut self, n: NodeId) {
        self.rebuild_from_leaves_rec(n, 0);
    }

    fn rebuild_from_leaves_rec(&mut self, n: NodeId, depth: usize) {
        if depth > MAX_TREE_DEPTH {
            warn!("depth guard tripped while rebuilding constraints");
            return;
        }
        let Some([first, second]) = self.children(n) else { return };
        self.rebuild_from_leaves_rec(first, depth + 1);
        self.rebuild_from_leaves_rec(second, depth + 1);
        self.update_constraints(n);
    }

    pub fn rebuild_constraints_towards_root(&mut self, n: NodeId) {
        let mut cur = self.parent(n);
        for _ in 0..=MAX_TREE_DEPTH {
            let Some(p) = cur else { return };
            self.update_constraints(p);
            cur = self.parent(p);
        }
        warn!("depth guard tripped while rebuilding constraints towards root");
    }
}

pub struct Leaves<'a> {
    forest: &'a Forest,
    root: NodeId,
    next: Option<NodeId>,
}

impl Iterator for Leaves<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let cur = self.next?;
        self.next = self.forest.next_leaf(cur, self.root);
        Some(cur)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(f: &mut Forest, id: u32) -> NodeId {
        let n = f.make_node(id, 0.5);
        f[n].client = Some(Client::default());
        n
    }

    fn split(f: &mut Forest, st: SplitType, ratio: f64, a: NodeId, b: NodeId) -> NodeId {
        let n = f.make_node(0, ratio);
        f[n].split_type = st;
        f[n].children = Some([a, b]);
        f[a].parent = Some(n);
        f[b].parent = Some(n);
        f.update_constraints(n);
        n
    }

    // ((a | b) / c): a vertical pair stacked above c.
    fn sample_tree(f: &mut Forest) -> (NodeId, NodeId, NodeId, NodeId) {
        let a = leaf(f, 1);
        let b = leaf(f, 2);
        let c = leaf(f, 3);
        let v = split(f, SplitType::Vertical, 0.3, a, b);
        let root = split(f, SplitType::Horizontal, 0.6, v, c);
        (root, a, b, c)
    }

    #[test]
    fn leaf_iteration_is_in_order() {
        let mut f = Forest::new();
        let (root, a, b, c) = sample_tree(&mut f);
        let leaves: Vec<_> = f.leaves(root).collect();
        assert_eq!(leaves, vec![a, b, c]);
        assert_eq!(f.prev_leaf(b, root), Some(a));
        assert_eq!(f.prev_leaf(a, root), None);
        assert_eq!(f.next_leaf(c, root), None);
    }

    #[test]
    fn brother_and_child_order_are_consistent() {
        let mut f = Forest::new();
        let (_, a, b, c) = sample_tree(&mut f);
        assert_eq!(f.brother(a), Some(b));
        assert_eq!(f.brother(b), Some(a));
        assert!(f.is_first_child(a));
        assert!(f.is_second_child(b));
        assert!(f.is_second_child(c));
    }

    #[test]
    fn rotate_90_then_270_is_identity() {
        let mut f = Forest::new();
        let (root, a, b, c) = sample_tree(&mut f);
        f.rotate_tree(root, 90);
        f.rotate_tree(root, 270);
        assert_eq!(f[root].split_type, SplitType::Horizontal);
        assert!((f[root].split_ratio - 0.6).abs() < 1e-9);
        assert_eq!(f.leaves(root).collect::<Vec<_>>(), vec![a, b, c]);
    }

    #[test]
    fn rotate_180_swaps_children_and_keeps_axis() {
        let mut f = Forest::new();
        let (root, a, b, c) = sample_tree(&mut f);
        f.rotate_tree(root, 180);
        assert_eq!(f[root].split_type, SplitType::Horizontal);
        assert!((f[root].split_ratio - 0.4).abs() < 1e-9);
        assert_eq!(f.leaves(root).collect::<Vec<_>>(), vec![c, b, a]);
    }

    #[test]
    fn flip_is_an_involution() {
        let mut f = Forest::new();
        let (root, a, b, c) = sample_tree(&mut f);
        f.flip_tree(root, FlipAxis::Horizontal);
        assert_eq!(f.leaves(root).collect::<Vec<_>>(), vec![c, a, b]);
        f.flip_tree(root, FlipAxis::Horizontal);
        assert_eq!(f.leaves(root).collect::<Vec<_>>(), vec![a, b, c]);
    }

    #[test]
    fn equalize_resets_every_ratio() {
        let mut f = Forest::new();
        let (root, _, _, _) = sample_tree(&mut f);
        f.equalize_tree(root, 0.5);
        for n in f.subtree(root) {
            assert!((f[n].split_ratio - 0.5).abs() < 1e-9);
        }
        // Idempotent.
        f.equalize_tree(root, 0.5);
        assert!((f[root].split_ratio - 0.5).abs() < 1e-9);
    }

    #[test]
    fn balance_sets_leaf_count_ratios() {
        let mut f = Forest::new();
        let (root, a, _, _) = sample_tree(&mut f);
        assert_eq!(f.balance_tree(root), 3);
        let v = f.parent(a).unwrap();
        assert!((f[root].split_ratio - 2.0 / 3.0).abs() < 1e-9);
        assert!((f[v].split_ratio - 0.5).abs() < 1e-9);
        // Idempotent while the leaf count is stable.
        f.balance_tree(root);
        assert!((f[root].split_ratio - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn constraints_aggregate_by_axis() {
        let mut f = Forest::new();
        let (root, a, _, _) = sample_tree(&mut f);
        let v = f.parent(a).unwrap();
        assert_eq!(f[v].constraints.min_width, 2 * MIN_WIDTH);
        assert_eq!(f[v].constraints.min_height, MIN_HEIGHT);
        assert_eq!(f[root].constraints.min_width, 2 * MIN_WIDTH);
        assert_eq!(f[root].constraints.min_height, 2 * MIN_HEIGHT);
    }

    #[test]
    fn constraints_follow_split_type_changes() {
        let mut f = Forest::new();
        let (root, a, _, _) = sample_tree(&mut f);
        let v = f.parent(a).unwrap();
        assert!(f.set_split_type(v, SplitType::Horizontal));
        assert_eq!(f[v].constraints.min_width, MIN_WIDTH);
        assert_eq!(f[v].constraints.min_height, 2 * MIN_HEIGHT);
        // The change propagated to the root.
        assert_eq!(f[root].constraints.min_height, 3 * MIN_HEIGHT);
    }

    #[test]
    fn fence_search_matches_axis_and_extent() {
        let mut f = Forest::new();
        let (root, a, b, c) = sample_tree(&mut f);
        let v = f.parent(a).unwrap();
        f[root].rectangle = Rect::new(0, 0, 100, 100);
        f[v].rectangle = Rect::new(0, 0, 100, 60);
        f[a].rectangle = Rect::new(0, 0, 30, 60);
        f[b].rectangle = Rect::new(30, 0, 70, 60);
        f[c].rectangle = Rect::new(0, 60, 100, 40);

        assert_eq!(f.find_fence(a, Direction::East), Some(v));
        assert_eq!(f.find_fence(a, Direction::South), Some(root));
        assert_eq!(f.find_fence(a, Direction::West), None);
        assert_eq!(f.find_fence(c, Direction::North), Some(root));
    }

    #[test]
    fn tiled_count_skips_hidden_and_optionally_receptacles() {
        let mut f = Forest::new();
        let (root, a, _, _) = sample_tree(&mut f);
        let r = f.make_node(9, 0.5);
        let b2 = split(&mut f, SplitType::Vertical, 0.5, root, r);
        assert_eq!(f.tiled_count(b2, true), 4);
        assert_eq!(f.tiled_count(b2, false), 3);
        f[a].hidden = true;
        assert_eq!(f.tiled_count(b2, false), 2);
    }
}

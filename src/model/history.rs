use crate::model::forest::NodeId;
use crate::model::monitor::{DesktopId, MonitorId};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HistoryEntry {
    pub monitor: MonitorId,
    pub desktop: DesktopId,
    pub node: Option<NodeId>,
}

/// Focus history, most recent at the tail. Used as a fallback focus
/// source and for recency tie-breaks in directional queries.
#[derive(Clone, Debug, Default)]
pub struct FocusHistory {
    entries: Vec<HistoryEntry>,
}

impl FocusHistory {
    pub fn new() -> Self { Self::default() }

    pub fn clear(&mut self) { self.entries.clear(); }

    pub fn entries(&self) -> &[HistoryEntry] { &self.entries }

    pub fn add(
        &mut self,
        monitor: MonitorId,
        desktop: DesktopId,
        node: Option<NodeId>,
        latest: bool,
    ) {
        let entry = HistoryEntry { monitor, desktop, node };
        if latest {
            self.entries.retain(|e| !(e.desktop == desktop && e.node == node));
            self.entries.push(entry);
        } else if self.entries.last() != Some(&entry) {
            self.entries.push(entry);
        }
    }

    pub fn retain(&mut self, keep: impl FnMut(&HistoryEntry) -> bool) {
        self.entries.retain(keep);
    }

    /// Most recent node focused on `desktop`, skipping `exclude` and
    /// anything the caller no longer considers valid.
    pub fn last_node(
        &self,
        desktop: DesktopId,
        exclude: Option<NodeId>,
        valid: impl Fn(NodeId) -> bool,
    ) -> Option<NodeId> {
        self.entries
            .iter()
            .rev()
            .filter(|e| e.desktop == desktop)
            .filter_map(|e| e.node)
            .find(|&n| Some(n) != exclude && valid(n))
    }

    pub fn last_desktop(
        &self,
        monitor: MonitorId,
        exclude: Option<DesktopId>,
        valid: impl Fn(DesktopId) -> bool,
    ) -> Option<DesktopId> {
        self.entries
            .iter()
            .rev()
            .filter(|e| e.monitor == monitor)
            .map(|e| e.desktop)
            .find(|&d| Some(d) != exclude && valid(d))
    }

    pub fn last_monitor(
        &self,
        exclude: Option<MonitorId>,
        valid: impl Fn(MonitorId) -> bool,
    ) -> Option<MonitorId> {
        self.entries
            .iter()
            .rev()
            .map(|e| e.monitor)
            .find(|&m| Some(m) != exclude && valid(m))
    }

    /// Distance from the tail of the most recent entry for `node`;
    /// `u32::MAX` when the node never appears.
    pub fn rank(&self, node: NodeId) -> u32 {
        self.entries
            .iter()
            .rev()
            .position(|e| e.node == Some(node))
            .map(|p| p as u32)
            .unwrap_or(u32::MAX)
    }
}

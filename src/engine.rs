pub mod desktop;
pub mod focus;
pub mod layout;
pub mod monitor;
pub mod query;
pub mod snapshot;
pub mod stack;
pub mod tree;

use slotmap::SlotMap;

use crate::backend::WindowBackend;
use crate::common::config::Settings;
use crate::events::{Event, EventSink, NullSink};
use crate::geometry::Rect;
use crate::model::client::{Client, ClientState};
use crate::model::forest::{Forest, NodeId};
use crate::model::history::FocusHistory;
use crate::model::monitor::{Desktop, DesktopId, Layout, Monitor, MonitorId};

pub use monitor::OutputInfo;
pub use query::AreaPeak;
pub use snapshot::{SnapshotError, WorldSnapshot};

/// The whole world: monitors owning desktops owning binary partition
/// trees, plus the global stacking order and focus history. Every
/// mutation funnels through methods on this type; there is no module
/// level state.
pub struct Engine<B: WindowBackend> {
    pub settings: Settings,
    pub backend: B,
    pub(crate) sink: Box<dyn EventSink>,
    pub(crate) monitors: SlotMap<MonitorId, Monitor>,
    pub(crate) desktops: SlotMap<DesktopId, Desktop>,
    pub(crate) monitor_order: Vec<MonitorId>,
    pub(crate) forest: Forest,
    /// Bottom-to-top Z-order over every managed leaf.
    pub(crate) stacking: Vec<NodeId>,
    pub(crate) history: FocusHistory,
    pub(crate) focused_monitor: Option<MonitorId>,
    pub(crate) primary_monitor: Option<MonitorId>,
    pub(crate) grabbed_node: Option<NodeId>,
    pub(crate) clients_count: u32,
    /// Cleared while sticky leaves are being carried to a new desktop so
    /// the transfer does not hide them in passing.
    pub(crate) sticky_still: bool,
}

impl<B: WindowBackend> Engine<B> {
    pub fn new(backend: B, settings: Settings, sink: Box<dyn EventSink>) -> Self {
        Self {
            settings,
            backend,
            sink,
            monitors: SlotMap::with_key(),
            desktops: SlotMap::with_key(),
            monitor_order: Vec::new(),
            forest: Forest::new(),
            stacking: Vec::new(),
            history: FocusHistory::new(),
            focused_monitor: None,
            primary_monitor: None,
            grabbed_node: None,
            clients_count: 0,
            sticky_still: true,
        }
    }

    pub fn with_defaults(backend: B) -> Self {
        Self::new(backend, Settings::default(), Box::new(NullSink))
    }

    pub fn forest(&self) -> &Forest { &self.forest }

    pub fn monitor(&self, m: MonitorId) -> Option<&Monitor> { self.monitors.get(m) }

    pub fn desktop(&self, d: DesktopId) -> Option<&Desktop> { self.desktops.get(d) }

    pub fn monitor_order(&self) -> &[MonitorId] { &self.monitor_order }

    pub fn stacking(&self) -> &[NodeId] { &self.stacking }

    pub fn history(&self) -> &FocusHistory { &self.history }

    pub fn focused_monitor(&self) -> Option<MonitorId> { self.focused_monitor }

    pub fn primary_monitor(&self) -> Option<MonitorId> { self.primary_monitor }

    pub fn grabbed_node(&self) -> Option<NodeId> { self.grabbed_node }

    pub fn set_grabbed_node(&mut self, n: Option<NodeId>) { self.grabbed_node = n; }

    pub fn clients_count(&self) -> u32 { self.clients_count }

    pub(crate) fn emit(&mut self, event: Event) { self.sink.emit(event); }

    pub(crate) fn mid(&self, m: MonitorId) -> u32 {
        self.monitors.get(m).map(|x| x.id).unwrap_or(0)
    }

    pub(crate) fn did(&self, d: DesktopId) -> u32 {
        self.desktops.get(d).map(|x| x.id).unwrap_or(0)
    }

    pub(crate) fn nid(&self, n: NodeId) -> u32 {
        self.forest.get(n).map(|x| x.id).unwrap_or(0)
    }

    pub fn find_monitor_by_id(&self, id: u32) -> Option<MonitorId> {
        self.monitor_order
            .iter()
            .copied()
            .find(|&m| self.monitors[m].id == id)
    }

    pub fn find_desktop_by_id(&self, id: u32) -> Option<(MonitorId, DesktopId)> {
        for &m in &self.monitor_order {
            for &d in &self.monitors[m].desktops {
                if self.desktops[d].id == id {
                    return Some((m, d));
                }
            }
        }
        None
    }

    /// World-wide lookup of a node by its public id.
    pub fn locate_node_by_id(&self, id: u32) -> Option<(MonitorId, DesktopId, NodeId)> {
        for &m in &self.monitor_order {
            for &d in &self.monitors[m].desktops {
                if let Some(root) = self.desktops[d].root {
                    if let Some(n) = self.forest.find_node_by_id(root, id) {
                        return Some((m, d, n));
                    }
                }
            }
        }
        None
    }

    /// The (monitor, desktop) pair whose tree contains `n`.
    pub fn locate_node(&self, n: NodeId) -> Option<(MonitorId, DesktopId)> {
        if !self.forest.contains(n) {
            return None;
        }
        let root = self.forest.root_of(n);
        for &m in &self.monitor_order {
            for &d in &self.monitors[m].desktops {
                if self.desktops[d].root == Some(root) {
                    return Some((m, d));
                }
            }
        }
        None
    }

    pub(crate) fn node_in_desktop(&self, d: DesktopId, n: NodeId) -> bool {
        match self.desktops.get(d).and_then(|x| x.root) {
            Some(root) => self.forest.contains(n) && self.forest.root_of(n) == root,
            None => false,
        }
    }

    /// Screen-space rectangle of a node: a floating client answers with
    /// its floating rectangle, a tiled one with its last computed tiled
    /// rectangle; client-less nodes fall back to the layout rectangle
    /// less the window gap.
    pub fn get_rectangle(
        &self,
        m: Option<MonitorId>,
        d: Option<DesktopId>,
        n: Option<NodeId>,
    ) -> Rect {
        let Some(n) = n else {
            return m
                .and_then(|m| self.monitors.get(m))
                .map(|m| m.rectangle)
                .unwrap_or_default();
        };
        let Some(node) = self.forest.get(n) else {
            return Rect::default();
        };
        if let Some(client) = &node.client {
            if client.state.is_floating() {
                return client.floating_rectangle;
            }
            return client.tiled_rectangle;
        }
        let gap = match d.and_then(|d| self.desktops.get(d)) {
            Some(desk) if !(self.settings.gapless_monocle && desk.layout == Layout::Monocle) => {
                desk.window_gap
            }
            _ => 0,
        };
        let mut rect = node.rectangle;
        rect.width = rect.width.saturating_sub(gap);
        rect.height = rect.height.saturating_sub(gap);
        rect
    }

    pub(crate) fn border_color(&self, focused: bool, on_focused_monitor: bool) -> u32 {
        if focused && on_focused_monitor {
            self.settings.focused_border_color
        } else if focused {
            self.settings.active_border_color
        } else {
            self.settings.normal_border_color
        }
    }

    pub(crate) fn draw_border(
        &mut self,
        n: Option<NodeId>,
        focused: bool,
        on_focused_monitor: bool,
    ) {
        let Some(n) = n else { return };
        if !self.forest.contains(n) {
            return;
        }
        let color = self.border_color(focused, on_focused_monitor);
        let ids: Vec<u32> = self
            .forest
            .leaves(n)
            .filter(|&f| self.forest[f].client.is_some())
            .map(|f| self.forest[f].id)
            .collect();
        for id in ids {
            self.backend.draw_border(id, color);
        }
    }

    pub(crate) fn set_input_focus(&mut self, n: Option<NodeId>) {
        let target = n
            .and_then(|n| self.forest.get(n))
            .and_then(|node| node.client.as_ref().map(|_| node.id));
        match target {
            Some(id) => self.backend.set_input_focus(Some(id)),
            None => self.backend.clear_input_focus(),
        }
    }

    /// A leaf deserves layout area only while it holds a visible tiled
    /// client; receptacles hold structure but no area.
    pub(crate) fn leaf_should_be_vacant(&self, n: NodeId) -> bool {
        let Some(node) = self.forest.get(n) else { return true };
        match &node.client {
            Some(client) => node.hidden || !client.state.is_tiled(),
            None => true,
        }
    }

    /// Wrap a backend window into a managed leaf next to the desktop's
    /// focus. Returns the new leaf, or `None` when insertion fails.
    pub fn manage_window(
        &mut self,
        m: MonitorId,
        d: DesktopId,
        window_id: u32,
        state: ClientState,
        focus: bool,
    ) -> Option<NodeId> {
        if !self.monitors.contains_key(m) || !self.desktops.contains_key(d) {
            return None;
        }

        let mut client = Client {
            border_width: self.desktops[d].border_width,
            honor_size_hints: self.settings.honor_size_hints,
            state,
            last_state: state,
            ..Client::default()
        };
        self.backend.initialize_client(window_id, &mut client);
        if let Some(rect) = self.backend.window_rectangle(window_id) {
            client.floating_rectangle = rect;
        }

        let n = self.forest.make_node(window_id, self.settings.split_ratio);
        self.forest[n].client = Some(client);

        let target = self.desktops[d].focus;
        let target_id = target.map(|t| self.nid(t)).unwrap_or(0);
        if !self.insert_node(m, d, n, target) {
            self.forest.free(n);
            return None;
        }
        self.clients_count += 1;

        let (mid, did) = (self.mid(m), self.did(d));
        self.emit(Event::NodeAdd {
            monitor: mid,
            desktop: did,
            target: target_id,
            node: window_id,
        });

        if self.settings.single_monocle {
            let root = self.desktops[d].root;
            let tiled = root.map(|r| self.forest.tiled_count(r, true)).unwrap_or(0);
            if self.desktops[d].layout == Layout::Monocle && tiled > 1 {
                let user = self.desktops[d].user_layout;
                self.set_layout(m, d, user, false);
            }
        }

        self.arrange(m, d);
        self.stack(d, n, false);

        if self.monitors[m].desk == Some(d) {
            self.show_node(d, n);
        } else {
            self.hide_node(d, n);
        }

        if focus && self.forest.is_focusable(n) {
            if self.focused_monitor == Some(m) && self.monitors[m].desk == Some(d) {
                self.focus_node(Some(m), Some(d), Some(n));
            } else {
                self.activate_node(m, d, Some(n));
            }
        } else {
            self.draw_border(Some(n), false, true);
        }

        Some(n)
    }

    /// Forget a window that disappeared from the display.
    pub fn unmanage_window(&mut self, window_id: u32) -> bool {
        let Some((m, d, n)) = self.locate_node_by_id(window_id) else {
            return false;
        };
        self.remove_node(m, d, n);
        self.arrange(m, d);
        true
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crossbeam_channel::Receiver;

    use super::*;
    use crate::backend::RecordingBackend;
    use crate::events::ChannelSink;

    pub fn engine() -> Engine<RecordingBackend> {
        Engine::with_defaults(RecordingBackend::new())
    }

    pub fn engine_with_events() -> (Engine<RecordingBackend>, Receiver<Event>) {
        let (sink, rx) = ChannelSink::unbounded();
        let engine = Engine::new(RecordingBackend::new(), Settings::default(), Box::new(sink));
        (engine, rx)
    }

    /// One monitor, one desktop, no padding, no gap.
    pub fn single_monitor(rect: Rect) -> (Engine<RecordingBackend>, MonitorId, DesktopId) {
        let mut engine = engine();
        engine.settings.window_gap = 0;
        engine.settings.border_width = 0;
        let m = engine.add_monitor("test", rect);
        let d = engine.add_desktop(m, "one");
        (engine, m, d)
    }

    pub fn managed(
        engine: &mut Engine<RecordingBackend>,
        m: MonitorId,
        d: DesktopId,
    ) -> NodeId {
        let id = engine.backend.generate_id();
        engine
            .manage_window(m, d, id, ClientState::Tiled, true)
            .expect("window should be managed")
    }

    /// Structural invariants that must hold after every command.
    pub fn assert_invariants(engine: &Engine<RecordingBackend>) {
        for &m in engine.monitor_order() {
            let mon = engine.monitor(m).unwrap();
            let mut sticky = 0;
            for &d in &mon.desktops {
                let desk = engine.desktop(d).unwrap();
                if let Some(root) = desk.root {
                    assert_eq!(engine.forest().parent(root), None);
                    for n in engine.forest().subtree(root) {
                        let node = &engine.forest()[n];
                        if let Some([first, second]) = node.children {
                            assert_eq!(engine.forest().parent(first), Some(n));
                            assert_eq!(engine.forest().parent(second), Some(n));
                        }
                        if node.sticky {
                            sticky += 1;
                        }
                    }
                }
                if let Some(focus) = desk.focus {
                    assert!(engine.forest().is_leaf(focus));
                    assert!(desk.root.is_some());
                    assert!(engine.forest().is_descendant(focus, desk.root.unwrap()));
                }
            }
            assert_eq!(mon.sticky_count, sticky, "sticky count out of sync");
        }

        // Stacking covers each client leaf exactly once, sorted by level.
        let mut expected = 0;
        for &m in engine.monitor_order() {
            for &d in &engine.monitor(m).unwrap().desktops {
                if let Some(root) = engine.desktop(d).unwrap().root {
                    expected += engine.forest().clients_count_in(root);
                }
            }
        }
        assert_eq!(engine.stacking().len() as u32, expected);
        for pair in engine.stacking().windows(2) {
            let c1 = engine.forest()[pair[0]].client.as_ref().unwrap();
            let c2 = engine.forest()[pair[1]].client.as_ref().unwrap();
            assert!(
                crate::model::client::stack_level(c1) <= crate::model::client::stack_level(c2),
                "stacking order violates stack levels"
            );
        }
    }
}

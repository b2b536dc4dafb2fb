use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::geometry::{Direction, Rect};
use crate::model::client::{ClientState, StackLayer};
use crate::model::monitor::Layout;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeFlag {
    Hidden,
    Sticky,
    Private,
    Locked,
    Marked,
    Urgent,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreselChange {
    Dir(Direction),
    Ratio(f64),
    Cancel,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StackRelation {
    Above,
    Below,
}

/// Typed notification emitted at every boundary-crossing state change.
/// Ids are the public 32-bit handles, so a front-end can relay events
/// without holding engine references.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    NodeAdd { monitor: u32, desktop: u32, target: u32, node: u32 },
    NodeRemove { monitor: u32, desktop: u32, node: u32 },
    NodeSwap {
        src_monitor: u32,
        src_desktop: u32,
        src_node: u32,
        dst_monitor: u32,
        dst_desktop: u32,
        dst_node: u32,
    },
    NodeTransfer {
        src_monitor: u32,
        src_desktop: u32,
        src_node: u32,
        dst_monitor: u32,
        dst_desktop: u32,
        dst_node: u32,
    },
    NodeFocus { monitor: u32, desktop: u32, node: u32 },
    NodeActivate { monitor: u32, desktop: u32, node: u32 },
    NodeState { monitor: u32, desktop: u32, node: u32, state: ClientState, active: bool },
    NodeLayer { monitor: u32, desktop: u32, node: u32, layer: StackLayer },
    NodeFlag { monitor: u32, desktop: u32, node: u32, flag: NodeFlag, value: bool },
    NodeGeometry { monitor: u32, desktop: u32, node: u32, rect: Rect },
    NodePresel { monitor: u32, desktop: u32, node: u32, change: PreselChange },
    NodeStack { node: u32, relation: StackRelation, reference: u32 },
    DesktopFocus { monitor: u32, desktop: u32 },
    DesktopActivate { monitor: u32, desktop: u32 },
    DesktopAdd { monitor: u32, desktop: u32, name: String },
    DesktopRemove { monitor: u32, desktop: u32 },
    DesktopRename { monitor: u32, desktop: u32, old_name: String, new_name: String },
    DesktopSwap {
        src_monitor: u32,
        src_desktop: u32,
        dst_monitor: u32,
        dst_desktop: u32,
    },
    DesktopTransfer { src_monitor: u32, desktop: u32, dst_monitor: u32 },
    DesktopLayout { monitor: u32, desktop: u32, layout: Layout },
    MonitorAdd { monitor: u32, name: String, rect: Rect },
    MonitorRemove { monitor: u32 },
    MonitorRename { monitor: u32, old_name: String, new_name: String },
    MonitorSwap { src_monitor: u32, dst_monitor: u32 },
    MonitorFocus { monitor: u32 },
    MonitorGeometry { monitor: u32, rect: Rect },
    /// Coarse "something changed" signal driving status-bar refreshes.
    Report,
}

pub trait EventSink {
    fn emit(&mut self, event: Event);
}

/// Swallows everything; for front-ends that poll state instead.
#[derive(Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&mut self, _event: Event) {}
}

/// Hands events to another thread over a channel. Delivery is lossy under
/// backpressure: a full queue drops the event rather than stalling the
/// engine loop.
pub struct ChannelSink {
    tx: Sender<Event>,
}

impl ChannelSink {
    pub fn bounded(capacity: usize) -> (Self, Receiver<Event>) {
        let (tx, rx) = bounded(capacity);
        (Self { tx }, rx)
    }

    pub fn unbounded() -> (Self, Receiver<Event>) {
        let (tx, rx) = unbounded();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&mut self, event: Event) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!(?event, "event queue full, dropping notification");
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_a_type_tag() {
        let ev = Event::DesktopLayout {
            monitor: 1,
            desktop: 2,
            layout: Layout::Monocle,
        };
        let json = serde_json::to_string(&ev).unwrap();
        assert!(json.contains("\"type\":\"desktop_layout\""));
        assert!(json.contains("\"layout\":\"monocle\""));
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ev);
    }

    #[test]
    fn channel_sink_delivers_in_order() {
        let (mut sink, rx) = ChannelSink::unbounded();
        sink.emit(Event::Report);
        sink.emit(Event::MonitorFocus { monitor: 7 });
        assert_eq!(rx.try_recv().unwrap(), Event::Report);
        assert_eq!(rx.try_recv().unwrap(), Event::MonitorFocus { monitor: 7 });
    }
}

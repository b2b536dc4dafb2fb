use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

use crate::geometry::{Padding, Rect};
use crate::model::forest::NodeId;

pub const DEFAULT_DESK_NAME: &str = "Desktop";
pub const DEFAULT_MON_NAME: &str = "MONITOR";

new_key_type! {
    pub struct MonitorId;
    pub struct DesktopId;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layout {
    #[default]
    Tiled,
    Monocle,
}

#[derive(Clone, Debug)]
pub struct Desktop {
    pub id: u32,
    pub name: String,
    pub root: Option<NodeId>,
    pub focus: Option<NodeId>,
    pub padding: Padding,
    pub window_gap: u16,
    pub border_width: u16,
    pub layout: Layout,
    /// The user's last explicit layout choice; `layout` may diverge from
    /// it while a single-window monocle override is in effect.
    pub user_layout: Layout,
    pub urgent_count: u32,
    pub tile_limit: Option<u32>,
}

impl Desktop {
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id,
            name: if name.is_empty() { DEFAULT_DESK_NAME.to_string() } else { name },
            root: None,
            focus: None,
            padding: Padding::default(),
            window_gap: 0,
            border_width: 0,
            layout: Layout::Tiled,
            user_layout: Layout::Tiled,
            urgent_count: 0,
            tile_limit: None,
        }
    }

    pub fn is_urgent(&self) -> bool { self.urgent_count > 0 }
}

#[derive(Clone, Debug)]
pub struct Monitor {
    pub id: u32,
    pub randr_id: Option<u32>,
    pub name: String,
    pub rectangle: Rect,
    pub padding: Padding,
    pub border_width: u16,
    pub window_gap: u16,
    pub wired: bool,
    pub sticky_count: u32,
    /// Desktops in list order; the head plays the role of the oldest
    /// desktop, the tail of the most recently added one.
    pub desktops: Vec<DesktopId>,
    pub desk: Option<DesktopId>,
}

impl Monitor {
    pub fn new(id: u32, name: impl Into<String>, rectangle: Rect) -> Self {
        let name = name.into();
        Self {
            id,
            randr_id: None,
            name: if name.is_empty() { DEFAULT_MON_NAME.to_string() } else { name },
            rectangle,
            padding: Padding::default(),
            border_width: 0,
            window_gap: 0,
            wired: true,
            sticky_count: 0,
            desktops: Vec::new(),
            desk: None,
        }
    }

    pub fn desk_head(&self) -> Option<DesktopId> { self.desktops.first().copied() }

    pub fn desk_tail(&self) -> Option<DesktopId> { self.desktops.last().copied() }
}

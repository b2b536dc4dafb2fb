pub mod client;
pub mod forest;
pub mod history;
pub mod monitor;

pub use client::{Client, ClientState, IcccmProps, SizeHints, StackLayer, WmFlags};
pub use forest::{Constraints, Forest, Node, NodeId, Presel};
pub use history::FocusHistory;
pub use monitor::{Desktop, DesktopId, Layout, Monitor, MonitorId};

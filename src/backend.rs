use crate::common::collections::HashMap;
use crate::geometry::Rect;
use crate::model::client::{self, Client};

/// The narrow capability set the engine needs from the display layer.
/// Every call is synchronous from the engine's point of view; a backend
/// is free to batch or pipeline underneath.
pub trait WindowBackend {
    fn generate_id(&mut self) -> u32;

    fn move_resize(&mut self, id: u32, rect: Rect);
    fn set_border_width(&mut self, id: u32, width: u16);
    fn draw_border(&mut self, id: u32, color: u32);

    fn show(&mut self, id: u32);
    fn hide(&mut self, id: u32);
    fn set_visibility(&mut self, id: u32, visible: bool);

    fn above(&mut self, id: u32, reference: u32);
    fn below(&mut self, id: u32, reference: u32);

    fn kill(&mut self, id: u32);
    fn send_close_message(&mut self, id: u32);

    fn set_input_focus(&mut self, id: Option<u32>);
    fn clear_input_focus(&mut self);

    fn center_pointer(&mut self, rect: Rect);

    /// Last known geometry of a window, if it still exists.
    fn window_rectangle(&mut self, id: u32) -> Option<Rect>;

    /// Batched query of protocols, state atoms, hints and normal hints.
    /// Implementations may pipeline the four round-trips.
    fn initialize_client(&mut self, id: u32, client: &mut Client);

    fn apply_size_hints(&mut self, client: &Client, width: &mut u16, height: &mut u16) {
        client::apply_size_hints(&client.size_hints, width, height);
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BackendCall {
    MoveResize { id: u32, rect: Rect },
    SetBorderWidth { id: u32, width: u16 },
    DrawBorder { id: u32, color: u32 },
    Show { id: u32 },
    Hide { id: u32 },
    SetVisibility { id: u32, visible: bool },
    Above { id: u32, reference: u32 },
    Below { id: u32, reference: u32 },
    Kill { id: u32 },
    SendCloseMessage { id: u32 },
    SetInputFocus { id: Option<u32> },
    ClearInputFocus,
    CenterPointer { rect: Rect },
}

/// Test double: records every call and answers geometry queries from the
/// rectangles it has been told to move windows to.
#[derive(Default)]
pub struct RecordingBackend {
    next_id: u32,
    pub calls: Vec<BackendCall>,
    pub rectangles: HashMap<u32, Rect>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self {
            next_id: 0x0040_0000,
            calls: Vec::new(),
            rectangles: HashMap::default(),
        }
    }

    pub fn clear_calls(&mut self) { self.calls.clear(); }

    pub fn moves_of(&self, id: u32) -> Vec<Rect> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                BackendCall::MoveResize { id: i, rect } if *i == id => Some(*rect),
                _ => None,
            })
            .collect()
    }
}

impl WindowBackend for RecordingBackend {
    fn generate_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn move_resize(&mut self, id: u32, rect: Rect) {
        self.rectangles.insert(id, rect);
        self.calls.push(BackendCall::MoveResize { id, rect });
    }

    fn set_border_width(&mut self, id: u32, width: u16) {
        self.calls.push(BackendCall::SetBorderWidth { id, width });
    }

    fn draw_border(&mut self, id: u32, color: u32) {
        self.calls.push(BackendCall::DrawBorder { id, color });
    }

    fn show(&mut self, id: u32) { self.calls.push(BackendCall::Show { id }); }

    fn hide(&mut self, id: u32) { self.calls.push(BackendCall::Hide { id }); }

    fn set_visibility(&mut self, id: u32, visible: bool) {
        self.calls.push(BackendCall::SetVisibility { id, visible });
    }

    fn above(&mut self, id: u32, reference: u32) {
        self.calls.push(BackendCall::Above { id, reference });
    }

    fn below(&mut self, id: u32, reference: u32) {
        self.calls.push(BackendCall::Below { id, reference });
    }

    fn kill(&mut self, id: u32) { self.calls.push(BackendCall::Kill { id }); }

    fn send_close_message(&mut self, id: u32) {
        self.calls.push(BackendCall::SendCloseMessage { id });
    }

    fn set_input_focus(&mut self, id: Option<u32>) {
        self.calls.push(BackendCall::SetInputFocus { id });
    }

    fn clear_input_focus(&mut self) { self.calls.push(BackendCall::ClearInputFocus); }

    fn center_pointer(&mut self, rect: Rect) {
        self.calls.push(BackendCall::CenterPointer { rect });
    }

    fn window_rectangle(&mut self, id: u32) -> Option<Rect> {
        self.rectangles.get(&id).copied()
    }

    fn initialize_client(&mut self, _id: u32, _client: &mut Client) {}
}

use serde::{Deserialize, Serialize};

use crate::geometry::Rect;

pub const MISSING_VALUE: &str = "N/A";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientState {
    #[default]
    Tiled,
    PseudoTiled,
    Floating,
    Fullscreen,
}

impl ClientState {
    pub fn is_tiled(self) -> bool {
        matches!(self, ClientState::Tiled | ClientState::PseudoTiled)
    }

    pub fn is_floating(self) -> bool { self == ClientState::Floating }

    pub fn is_fullscreen(self) -> bool { self == ClientState::Fullscreen }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StackLayer {
    Below,
    #[default]
    Normal,
    Above,
}

/// Window-manager state flags mirrored onto the client so the property
/// layer can synchronize them in one pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WmFlags {
    pub modal: bool,
    pub sticky: bool,
    pub maximized_vert: bool,
    pub maximized_horz: bool,
    pub shaded: bool,
    pub skip_taskbar: bool,
    pub skip_pager: bool,
    pub hidden: bool,
    pub fullscreen: bool,
    pub above: bool,
    pub below: bool,
    pub demands_attention: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IcccmProps {
    pub input_hint: bool,
    pub take_focus: bool,
    pub delete_window: bool,
}

impl Default for IcccmProps {
    fn default() -> Self {
        Self {
            input_hint: true,
            take_focus: false,
            delete_window: false,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeHints {
    pub min_width: Option<u16>,
    pub min_height: Option<u16>,
    pub max_width: Option<u16>,
    pub max_height: Option<u16>,
    pub base_width: Option<u16>,
    pub base_height: Option<u16>,
    pub width_increment: Option<u16>,
    pub height_increment: Option<u16>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub class_name: String,
    pub instance_name: String,
    pub state: ClientState,
    pub last_state: ClientState,
    pub layer: StackLayer,
    pub last_layer: StackLayer,
    pub floating_rectangle: Rect,
    pub tiled_rectangle: Rect,
    pub border_width: u16,
    pub urgent: bool,
    pub shown: bool,
    pub wm_flags: WmFlags,
    pub icccm: IcccmProps,
    pub size_hints: SizeHints,
    pub honor_size_hints: bool,
    /// Set by the rule layer to let a window tile past a desktop's
    /// tile limit.
    pub ignore_tile_limits: bool,
}

impl Default for Client {
    fn default() -> Self {
        Self {
            class_name: MISSING_VALUE.to_string(),
            instance_name: MISSING_VALUE.to_string(),
            state: ClientState::Tiled,
            last_state: ClientState::Tiled,
            layer: StackLayer::Normal,
            last_layer: StackLayer::Normal,
            floating_rectangle: Rect::default(),
            tiled_rectangle: Rect::default(),
            border_width: 0,
            urgent: false,
            shown: false,
            wm_flags: WmFlags::default(),
            icccm: IcccmProps::default(),
            size_hints: SizeHints::default(),
            honor_size_hints: false,
            ignore_tile_limits: false,
        }
    }
}

/// Z-order key: tiled states share the lowest class, floating sits above
/// them, fullscreen above everything within the same layer.
pub fn stack_level(c: &Client) -> i32 {
    let state_class = match c.state {
        ClientState::Tiled | ClientState::PseudoTiled => 0,
        ClientState::Floating => 1,
        ClientState::Fullscreen => 2,
    };
    3 * c.layer as i32 + state_class
}

pub fn stack_cmp(c1: &Client, c2: &Client) -> i32 { stack_level(c1) - stack_level(c2) }

/// ICCCM normal-hint adjustment: clamp to min/max, then snap the part
/// above the base size to the resize increments.
pub fn apply_size_hints(hints: &SizeHints, width: &mut u16, height: &mut u16) {
    if let Some(min_w) = hints.min_width {
        *width = (*width).max(min_w);
    }
    if let Some(min_h) = hints.min_height {
        *height = (*height).max(min_h);
    }
    if let Some(max_w) = hints.max_width {
        *width = (*width).min(max_w.max(1));
    }
    if let Some(max_h) = hints.max_height {
        *height = (*height).min(max_h.max(1));
    }

    let base_w = hints.base_width.or(hints.min_width).unwrap_or(0);
    let base_h = hints.base_height.or(hints.min_height).unwrap_or(0);

    if let Some(inc) = hints.width_increment {
        if inc > 0 && *width > base_w {
            *width = base_w + ((*width - base_w) / inc) * inc;
        }
    }
    if let Some(inc) = hints.height_increment {
        if inc > 0 && *height > base_h {
            *height = base_h + ((*height - base_h) / inc) * inc;
        }
    }

    *width = (*width).max(1);
    *height = (*height).max(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_level_orders_state_within_layer() {
        let mut tiled = Client::default();
        tiled.state = ClientState::Tiled;
        let mut floating = Client::default();
        floating.state = ClientState::Floating;
        let mut fullscreen = Client::default();
        fullscreen.state = ClientState::Fullscreen;

        assert!(stack_level(&tiled) < stack_level(&floating));
        assert!(stack_level(&floating) < stack_level(&fullscreen));
    }

    #[test]
    fn stack_level_orders_layer_over_state() {
        let mut below_fullscreen = Client::default();
        below_fullscreen.layer = StackLayer::Below;
        below_fullscreen.state = ClientState::Fullscreen;

        let mut normal_tiled = Client::default();
        normal_tiled.layer = StackLayer::Normal;
        normal_tiled.state = ClientState::Tiled;

        assert!(stack_cmp(&below_fullscreen, &normal_tiled) < 0);
    }

    #[test]
    fn size_hints_snap_to_increments_above_base() {
        let hints = SizeHints {
            base_width: Some(10),
            base_height: Some(20),
            width_increment: Some(7),
            height_increment: Some(13),
            ..Default::default()
        };
        let (mut w, mut h) = (100, 100);
        apply_size_hints(&hints, &mut w, &mut h);
        assert_eq!(w, 94);
        assert_eq!(h, 98);
    }

    #[test]
    fn size_hints_clamp_to_min_and_max() {
        let hints = SizeHints {
            min_width: Some(50),
            max_height: Some(60),
            ..Default::default()
        };
        let (mut w, mut h) = (10, 100);
        apply_size_hints(&hints, &mut w, &mut h);
        assert_eq!(w, 50);
        assert_eq!(h, 60);
    }
}

//! Input domain types.
//!
//! Raw keyboard and mouse event dispatch.

use serde::Serialize;

/// Keyboard event type for Input.dispatchKeyEvent.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum KeyEventType {
    /// Key pressed down.
    KeyDown,
    /// Key released.
    KeyUp,
    /// Key down without text production.
    RawKeyDown,
    /// Character produced.
    Char,
}

/// Parameters for Input.dispatchKeyEvent.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchKeyEventParams {
    /// Event type.
    #[serde(rename = "type")]
    pub event_type: KeyEventType,
    /// Key value per the DOM spec (e.g. "Enter", "a").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Code value per the DOM spec (e.g. "KeyA").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Text produced by the key, for Char events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Bit field of pressed modifiers (Alt=1, Ctrl=2, Meta=4, Shift=8).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modifiers: Option<u8>,
    /// Windows virtual key code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub windows_virtual_key_code: Option<u32>,
}

/// Parameters for Input.insertText.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertTextParams {
    /// Text to insert at the current selection.
    pub text: String,
}

/// Mouse event type for Input.dispatchMouseEvent.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum MouseEventType {
    /// Button pressed.
    MousePressed,
    /// Button released.
    MouseReleased,
    /// Pointer moved.
    MouseMoved,
    /// Wheel scrolled.
    MouseWheel,
}

/// Mouse button identifier.
#[derive(Debug, Clone, Copy, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    /// No button.
    #[default]
    None,
    /// Left button.
    Left,
    /// Middle button.
    Middle,
    /// Right button.
    Right,
}

/// Parameters for Input.dispatchMouseEvent.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchMouseEventParams {
    /// Event type.
    #[serde(rename = "type")]
    pub event_type: MouseEventType,
    /// X coordinate in CSS pixels relative to the viewport.
    pub x: f64,
    /// Y coordinate in CSS pixels relative to the viewport.
    pub y: f64,
    /// Button being pressed or released.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub button: Option<MouseButton>,
    /// Number of clicks (2 for double click).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub click_count: Option<u32>,
    /// Horizontal scroll delta for wheel events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta_x: Option<f64>,
    /// Vertical scroll delta for wheel events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta_y: Option<f64>,
}

impl DispatchMouseEventParams {
    /// A button press at the given position.
    pub fn pressed(x: f64, y: f64, button: MouseButton, click_count: u32) -> Self {
        Self {
            event_type: MouseEventType::MousePressed,
            x,
            y,
            button: Some(button),
            click_count: Some(click_count),
            delta_x: None,
            delta_y: None,
        }
    }

    /// A button release at the given position.
    pub fn released(x: f64, y: f64, button: MouseButton, click_count: u32) -> Self {
        Self {
            event_type: MouseEventType::MouseReleased,
            x,
            y,
            button: Some(button),
            click_count: Some(click_count),
            delta_x: None,
            delta_y: None,
        }
    }

    /// A wheel scroll at the given position.
    pub fn wheel(x: f64, y: f64, delta_x: f64, delta_y: f64) -> Self {
        Self {
            event_type: MouseEventType::MouseWheel,
            x,
            y,
            button: None,
            click_count: None,
            delta_x: Some(delta_x),
            delta_y: Some(delta_y),
        }
    }
}

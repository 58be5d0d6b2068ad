//! Boundary between the coordinator and whatever renders the document.
//!
//! The core never builds or styles a tree itself. It reads rectangles through
//! [`RectSource`] and performs the handful of mutations listed on
//! [`StyleSink`]; everything else belongs to the host.

use serde::Serialize;

use crate::geometry::Rect;

pub mod scene;

pub use scene::{HostInput, SceneHost};

/// Host-side handle for an element.
pub type ElementId = String;

/// Position applied to a pinned member's content element.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PositionStyle {
    pub top: f32,
    pub z_index: i32,
    /// Wrapper width captured when the member became sticky.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<f32>,
}

pub trait RectSource {
    /// Current rectangle of `element` in the reference coordinate space, if it exists.
    fn measure(&self, element: &str) -> Option<Rect>;

    /// Rectangle of the viewport itself, for viewport-referenced groups.
    fn viewport(&self) -> Option<Rect> {
        None
    }
}

pub trait StyleSink {
    fn set_position(&mut self, element: &str, style: PositionStyle);
    fn clear_position(&mut self, element: &str);
    fn set_wrapper_height(&mut self, element: &str, height: f32);
    fn clear_wrapper_height(&mut self, element: &str);
}

/// Everything a recomputation pass needs from the host.
pub trait Host: RectSource + StyleSink {}

impl<T> Host for T where T: RectSource + StyleSink + ?Sized {}

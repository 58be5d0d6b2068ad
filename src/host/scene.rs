//! In-memory document used as a deterministic host.
//!
//! Elements live in document coordinates. Measuring an element shifts it by
//! the current scroll position, except for elements carrying a position
//! style, which report their pinned viewport position instead.

use std::collections::HashMap;

use crate::geometry::{Rect, Size};
use crate::runtime::{RuntimeEvent, ScrollSource};

use super::{ElementId, PositionStyle, RectSource, StyleSink};

/// Input a host can receive from the outside world.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HostInput {
    ScrollBy(f32),
    ScrollTo(f32),
    Resize(Size),
}

#[derive(Debug, Clone)]
pub struct SceneHost {
    viewport: Size,
    scroll_top: f32,
    elements: HashMap<ElementId, Rect>,
    positions: HashMap<ElementId, PositionStyle>,
    wrapper_heights: HashMap<ElementId, f32>,
    mutations: u64,
}

impl SceneHost {
    pub fn new(viewport: Size) -> Self {
        Self {
            viewport,
            scroll_top: 0.0,
            elements: HashMap::new(),
            positions: HashMap::new(),
            wrapper_heights: HashMap::new(),
            mutations: 0,
        }
    }

    /// Place `id` at a document-space rectangle, replacing any previous one.
    pub fn insert(&mut self, id: impl Into<ElementId>, rect: Rect) -> &mut Self {
        self.elements.insert(id.into(), rect);
        self
    }

    pub fn with_element(mut self, id: impl Into<ElementId>, rect: Rect) -> Self {
        self.insert(id, rect);
        self
    }

    /// Remove an element together with any style the core applied to it.
    pub fn remove(&mut self, id: &str) -> Option<Rect> {
        self.positions.remove(id);
        self.wrapper_heights.remove(id);
        self.elements.remove(id)
    }

    /// Resize an element in place, keeping its top edge.
    pub fn set_height(&mut self, id: &str, height: f32) -> bool {
        match self.elements.get_mut(id) {
            Some(rect) => {
                *rect = Rect::new(rect.left, rect.top, rect.width, height);
                true
            }
            None => false,
        }
    }

    pub fn document_rect(&self, id: &str) -> Option<Rect> {
        self.elements.get(id).copied()
    }

    pub fn document_height(&self) -> f32 {
        self.elements
            .values()
            .map(|rect| rect.bottom)
            .fold(0.0, f32::max)
    }

    pub fn max_scroll(&self) -> f32 {
        (self.document_height() - self.viewport.height).max(0.0)
    }

    pub fn scroll_top(&self) -> f32 {
        self.scroll_top
    }

    /// Scroll the viewport, clamped to the document; returns the new position.
    pub fn scroll_to(&mut self, y: f32) -> f32 {
        let target = if y.is_finite() { y } else { 0.0 };
        self.scroll_top = target.clamp(0.0, self.max_scroll());
        self.scroll_top
    }

    pub fn scroll_by(&mut self, dy: f32) -> f32 {
        self.scroll_to(self.scroll_top + dy)
    }

    pub fn viewport_size(&self) -> Size {
        self.viewport
    }

    pub fn resize(&mut self, viewport: Size) {
        self.viewport = viewport;
        self.scroll_top = self.scroll_top.clamp(0.0, self.max_scroll());
    }

    /// Apply an input and return the event the runtime should see for it.
    pub fn apply_input(&mut self, input: HostInput) -> RuntimeEvent {
        match input {
            HostInput::ScrollBy(dy) => {
                self.scroll_by(dy);
                RuntimeEvent::Scroll(ScrollSource::Viewport)
            }
            HostInput::ScrollTo(y) => {
                self.scroll_to(y);
                RuntimeEvent::Scroll(ScrollSource::Viewport)
            }
            HostInput::Resize(size) => {
                self.resize(size);
                RuntimeEvent::Resize(size)
            }
        }
    }

    pub fn position_of(&self, id: &str) -> Option<PositionStyle> {
        self.positions.get(id).copied()
    }

    pub fn wrapper_height_of(&self, id: &str) -> Option<f32> {
        self.wrapper_heights.get(id).copied()
    }

    /// Number of style mutations performed so far.
    pub fn mutations(&self) -> u64 {
        self.mutations
    }
}

impl RectSource for SceneHost {
    fn measure(&self, element: &str) -> Option<Rect> {
        let rect = self.elements.get(element)?;
        match self.positions.get(element) {
            Some(style) => Some(Rect::new(
                rect.left,
                style.top,
                style.width.unwrap_or(rect.width),
                rect.height,
            )),
            None => Some(rect.offset_y(-self.scroll_top)),
        }
    }

    fn viewport(&self) -> Option<Rect> {
        Some(Rect::new(0.0, 0.0, self.viewport.width, self.viewport.height))
    }
}

impl StyleSink for SceneHost {
    fn set_position(&mut self, element: &str, style: PositionStyle) {
        self.mutations += 1;
        self.positions.insert(element.to_string(), style);
    }

    fn clear_position(&mut self, element: &str) {
        self.mutations += 1;
        self.positions.remove(element);
    }

    fn set_wrapper_height(&mut self, element: &str, height: f32) {
        self.mutations += 1;
        self.wrapper_heights.insert(element.to_string(), height);
    }

    fn clear_wrapper_height(&mut self, element: &str) {
        self.mutations += 1;
        self.wrapper_heights.remove(element);
    }
}

use serde::{Deserialize, Serialize};

/// Viewport size in host pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// Screen-space rectangle as reported by a [`RectSource`](crate::host::RectSource).
///
/// `bottom`/`right` are stored rather than derived so that an unbounded
/// rectangle can carry infinite edges without producing `NaN` extents.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub top: f32,
    pub bottom: f32,
    pub left: f32,
    pub right: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(left: f32, top: f32, width: f32, height: f32) -> Self {
        Self {
            top,
            bottom: top + height,
            left,
            right: left + width,
            width,
            height,
        }
    }

    /// Rectangle that never excludes anything on the vertical axis.
    pub const fn unbounded() -> Self {
        Self {
            top: f32::NEG_INFINITY,
            bottom: f32::INFINITY,
            left: f32::NEG_INFINITY,
            right: f32::INFINITY,
            width: f32::INFINITY,
            height: f32::INFINITY,
        }
    }

    /// Same rectangle moved vertically by `dy`.
    pub fn offset_y(&self, dy: f32) -> Self {
        Self {
            top: self.top + dy,
            bottom: self.bottom + dy,
            ..*self
        }
    }

    /// Whether the horizontal line at `y` lies within `[top, bottom]`.
    pub fn straddles(&self, y: f32) -> bool {
        !(self.top > y || self.bottom < y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_derives_edges() {
        let rect = Rect::new(4.0, 10.0, 100.0, 40.0);
        assert_eq!(rect.bottom, 50.0);
        assert_eq!(rect.right, 104.0);
    }

    #[test]
    fn straddles_is_inclusive() {
        let rect = Rect::new(0.0, 10.0, 10.0, 20.0);
        assert!(rect.straddles(10.0));
        assert!(rect.straddles(30.0));
        assert!(!rect.straddles(9.5));
        assert!(!rect.straddles(30.5));
    }

    #[test]
    fn unbounded_straddles_everything() {
        let rect = Rect::unbounded();
        assert!(rect.straddles(-1.0e9));
        assert!(rect.straddles(1.0e9));
        assert_eq!(rect.offset_y(-500.0).top, f32::NEG_INFINITY);
    }
}

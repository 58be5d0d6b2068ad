use crate::config::StickyMode;
use crate::host::{ElementId, Host, PositionStyle, StyleSink};

use super::heights::{HeightAggregator, HeightContribution};

/// Members are keyed by their wrapper element.
pub type MemberId = ElementId;

/// Declaration of a region that may become sticky.
///
/// The wrapper stays in normal flow and is what the group measures for order
/// and current position; the content element is what actually gets pinned.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberSpec {
    pub wrapper: ElementId,
    pub content: ElementId,
    pub mode: Option<StickyMode>,
}

impl MemberSpec {
    pub fn new(wrapper: impl Into<ElementId>, content: impl Into<ElementId>) -> Self {
        Self {
            wrapper: wrapper.into(),
            content: content.into(),
            mode: None,
        }
    }

    pub fn with_mode(mut self, mode: StickyMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn id(&self) -> &str {
        &self.wrapper
    }
}

/// Arguments of one `update` call, in the order the coordinator computes them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateInput {
    /// Group-level permission to stick at all.
    pub can_stick: bool,
    /// Wrapper top taken from the pre-pass snapshot.
    pub current_offset_top: f32,
    /// Cursor this member would pin at, correction already applied.
    pub offset_top: f32,
    /// Snapshot top of the next measurable member, if any.
    pub next_offset_top: Option<f32>,
    pub index: usize,
}

impl UpdateInput {
    /// Input used to force a member out of the sticky state.
    pub const fn suspended() -> Self {
        Self {
            can_stick: false,
            current_offset_top: 0.0,
            offset_top: 0.0,
            next_offset_top: None,
            index: 0,
        }
    }
}

/// Mutable state a member may touch during a pass.
pub struct PassEnv<'a, H: Host + ?Sized> {
    pub host: &'a mut H,
    pub heights: &'a mut HeightAggregator,
    pub base_z_index: i32,
    /// Sticky state flips observed so far in this pass.
    pub transitions: usize,
}

impl<'a, H: Host + ?Sized> PassEnv<'a, H> {
    pub fn new(host: &'a mut H, heights: &'a mut HeightAggregator, base_z_index: i32) -> Self {
        Self {
            host,
            heights,
            base_z_index,
            transitions: 0,
        }
    }
}

#[derive(Debug)]
pub struct Member {
    wrapper: ElementId,
    content: ElementId,
    mode_override: Option<StickyMode>,
    mode: StickyMode,
    is_sticky: bool,
    content_height: f32,
    pinned_width: Option<f32>,
    applied: Option<PositionStyle>,
    wrapper_height: Option<f32>,
    contribution: Option<HeightContribution>,
    serial: u64,
}

impl Member {
    pub fn new(spec: MemberSpec, default_mode: StickyMode) -> Self {
        Self {
            mode: spec.mode.unwrap_or(default_mode),
            mode_override: spec.mode,
            wrapper: spec.wrapper,
            content: spec.content,
            is_sticky: false,
            content_height: 0.0,
            pinned_width: None,
            applied: None,
            wrapper_height: None,
            contribution: None,
            serial: 0,
        }
    }

    pub(crate) fn with_serial(mut self, serial: u64) -> Self {
        self.serial = serial;
        self
    }

    pub(crate) fn serial(&self) -> u64 {
        self.serial
    }

    pub fn id(&self) -> &str {
        &self.wrapper
    }

    pub fn wrapper(&self) -> &str {
        &self.wrapper
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn mode(&self) -> StickyMode {
        self.mode
    }

    pub fn mode_override(&self) -> Option<StickyMode> {
        self.mode_override
    }

    pub fn is_sticky(&self) -> bool {
        self.is_sticky
    }

    pub fn content_height(&self) -> f32 {
        self.content_height
    }

    /// Position style currently applied to the content element.
    pub fn position(&self) -> Option<PositionStyle> {
        self.applied
    }

    /// Height this member currently holds in the group total.
    pub fn contributed_height(&self) -> f32 {
        self.contribution
            .as_ref()
            .map(HeightContribution::height)
            .unwrap_or(0.0)
    }

    pub(crate) fn set_override(&mut self, mode: Option<StickyMode>) {
        self.mode_override = mode;
    }

    /// Re-resolve against the group default. Returns `true` if the mode changed.
    pub(crate) fn resolve_mode(&mut self, default_mode: StickyMode) -> bool {
        let resolved = self.mode_override.unwrap_or(default_mode);
        if resolved == self.mode {
            return false;
        }
        self.mode = resolved;
        true
    }

    /// Decide sticky state for this pass and return the height it occupies.
    pub fn update<H: Host + ?Sized>(&mut self, env: &mut PassEnv<'_, H>, input: UpdateInput) -> f32 {
        if !input.can_stick || input.current_offset_top > input.offset_top {
            if self.release(&mut *env.host, &mut *env.heights) {
                env.transitions += 1;
            }
            return 0.0;
        }

        let Some(content_rect) = env.host.measure(&self.content) else {
            return 0.0;
        };
        let content_height = content_rect.height.max(0.0);
        self.content_height = content_height;

        let mut top = input.offset_top;
        if self.mode == StickyMode::Replace {
            if let Some(next) = input.next_offset_top {
                let diff = next - (input.offset_top + content_height);
                if diff < 0.0 {
                    if diff + content_height < 0.0 {
                        if self.release(&mut *env.host, &mut *env.heights) {
                            env.transitions += 1;
                        }
                        return 0.0;
                    }
                    top = input.offset_top + diff;
                }
            }
        }

        if !self.is_sticky {
            self.is_sticky = true;
            self.pinned_width = env.host.measure(&self.wrapper).map(|rect| rect.width);
            env.transitions += 1;
        }

        let style = PositionStyle {
            top,
            z_index: self.mode.z_index(env.base_z_index, input.index),
            width: self.pinned_width,
        };
        if self.applied != Some(style) {
            env.host.set_position(&self.content, style);
            self.applied = Some(style);
        }
        if self.wrapper_height != Some(content_height) {
            env.host.set_wrapper_height(&self.wrapper, content_height);
            self.wrapper_height = Some(content_height);
        }

        match self.mode {
            StickyMode::Stack => {
                self.hold_height(&mut *env.heights, content_height);
                content_height
            }
            _ => {
                if let Some(previous) = self.contribution.take() {
                    env.heights.rollback(previous);
                }
                0.0
            }
        }
    }

    fn hold_height(&mut self, heights: &mut HeightAggregator, height: f32) {
        match self.contribution.take() {
            Some(current) if current.height() == height => self.contribution = Some(current),
            Some(stale) => {
                heights.rollback(stale);
                self.contribution = Some(heights.contribute(height));
            }
            None => self.contribution = Some(heights.contribute(height)),
        }
    }

    /// Return to normal flow. Returns `true` if the member was sticky.
    pub fn release<S: StyleSink + ?Sized>(
        &mut self,
        host: &mut S,
        heights: &mut HeightAggregator,
    ) -> bool {
        if let Some(contribution) = self.contribution.take() {
            heights.rollback(contribution);
        }
        if !self.is_sticky {
            return false;
        }

        self.is_sticky = false;
        self.pinned_width = None;
        if self.applied.take().is_some() {
            host.clear_position(&self.content);
        }
        if self.wrapper_height.take().is_some() {
            host.clear_wrapper_height(&self.wrapper);
        }
        true
    }
}

use crate::schedule::CoalescingSlot;

/// Totals below this are treated as zero to absorb float residue from
/// long contribute/rollback sequences.
const HEIGHT_EPSILON: f32 = 1e-3;

/// Proof of a height contribution; hand it back to [`HeightAggregator::rollback`].
#[derive(Debug, PartialEq)]
#[must_use = "a contribution that is never rolled back leaks height into the group total"]
pub struct HeightContribution {
    height: f32,
}

impl HeightContribution {
    pub fn height(&self) -> f32 {
        self.height
    }
}

/// Running total of occupied sticky height for one group.
///
/// Changes are queued rather than announced: the owner flushes the latest
/// total on the next tick, so listeners never run inside a pass.
#[derive(Debug, Default)]
pub struct HeightAggregator {
    total: f32,
    queued: CoalescingSlot<f32>,
    last_published: Option<f32>,
}

impl HeightAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total(&self) -> f32 {
        self.total
    }

    pub fn contribute(&mut self, height: f32) -> HeightContribution {
        let height = if height.is_finite() { height.max(0.0) } else { 0.0 };
        self.set_total(self.total + height);
        HeightContribution { height }
    }

    pub fn rollback(&mut self, contribution: HeightContribution) {
        self.set_total(self.total - contribution.height);
    }

    fn set_total(&mut self, total: f32) {
        self.total = if total.abs() < HEIGHT_EPSILON { 0.0 } else { total };
        self.queued.put(self.total);
    }

    pub fn has_pending(&self) -> bool {
        self.queued
            .peek()
            .is_some_and(|value| Some(*value) != self.last_published)
    }

    /// Latest queued total, if it differs from the last one handed out.
    pub fn take_pending(&mut self) -> Option<f32> {
        let value = self.queued.take()?;
        if self.last_published == Some(value) {
            return None;
        }
        self.last_published = Some(value);
        Some(value)
    }

    /// Number of queued totals superseded before a flush.
    pub fn coalesced(&self) -> u64 {
        self.queued.overwritten()
    }
}

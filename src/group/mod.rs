//! Group coordination: one [`StickyGroup`] per scrollable region, the
//! [`Member`]s it positions, and the height total it feeds to nested groups.

mod core;
mod heights;
mod member;

pub use self::core::{
    GroupId, HeightListener, PassOutcome, PassReport, Registration, SkipReason, StickyGroup,
};
pub use heights::{HeightAggregator, HeightContribution};
pub use member::{Member, MemberId, MemberSpec, PassEnv, UpdateInput};

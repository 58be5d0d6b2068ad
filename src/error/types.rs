use thiserror::Error;

use crate::group::{GroupId, MemberId};

/// Unified result type for the sticky_room crate.
pub type Result<T> = std::result::Result<T, StickyError>;

/// Errors surfaced by the runtime and group management API.
///
/// Recomputation passes never fail; these only describe structural misuse
/// (unknown ids, duplicates, cycles) and unreadable configuration.
#[derive(Debug, Error)]
pub enum StickyError {
    #[error("group `{0}` not found")]
    GroupNotFound(GroupId),
    #[error("group `{0}` is already mounted")]
    DuplicateGroup(GroupId),
    #[error("member `{0}` not registered")]
    MemberNotFound(MemberId),
    #[error("member `{0}` is already registered")]
    DuplicateMember(MemberId),
    #[error("nesting `{outer}` -> `{inner}` would form a cycle")]
    NestingCycle { outer: GroupId, inner: GroupId },
    #[error("configuration error: {0}")]
    Config(#[from] serde_json::Error),
}

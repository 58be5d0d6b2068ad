//! Sticky layout coordination engine.
//!
//! A [`StickyGroup`] owns the sticky members of one scrollable region and
//! decides, once per frame, which of them are pinned, where, and at what
//! stacking order. Groups read geometry and write styles only through the
//! [`Host`] traits, so the same engine runs against a browser bridge, a
//! terminal, or the in-memory [`SceneHost`] used throughout the tests.
//! [`StickyRuntime`] wires several groups to one host, nests them through
//! their published sticky heights, and feeds plugins.

pub mod config;
pub mod error;
pub mod geometry;
pub mod group;
pub mod host;
pub mod logging;
pub mod metrics;
pub mod runtime;
pub mod schedule;

pub use config::{
    ConstraintPolicy, DEFAULT_BASE_Z_INDEX, GroupConfig, MIN_BASE_Z_INDEX, ParseConfigError,
    ReferenceContainer, StickyMode,
};
pub use error::{Result, StickyError};
pub use geometry::{Rect, Size};
pub use group::{
    GroupId, HeightAggregator, HeightContribution, Member, MemberId, MemberSpec, PassOutcome,
    PassReport, Registration, SkipReason, StickyGroup, UpdateInput,
};
pub use host::{ElementId, Host, HostInput, PositionStyle, RectSource, SceneHost, StyleSink};
pub use logging::{
    FileSink, LogEvent, LogFields, LogLevel, LogSink, Logger, LoggingError, LoggingResult,
    MemorySink, NullSink,
};
pub use metrics::{MetricSnapshot, StickyMetrics};
pub use runtime::audit::{
    BufferedAudit, NullRuntimeAudit, RuntimeAudit, RuntimeAuditEvent, RuntimeAuditEventBuilder,
    RuntimeAuditStage,
};
pub use runtime::diagnostics::{LifecycleLoggerPlugin, MetricsSnapshotPlugin};
pub use runtime::driver::{DriverError, DriverResult, TerminalDriver, translate_event};
pub use runtime::{
    EventFlow, NestingLink, RuntimeConfig, RuntimeContext, RuntimeEvent, ScrollSource,
    StickyPlugin, StickyRuntime,
};
pub use schedule::{CoalescingSlot, Detach, FrameScheduler};

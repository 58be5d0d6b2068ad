use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::{Value, json};

use crate::config::{GroupConfig, StickyMode};
use crate::error::{Result, StickyError};
use crate::geometry::Size;
use crate::group::{GroupId, MemberSpec, PassOutcome, PassReport, Registration, StickyGroup};
use crate::host::{ElementId, Host, HostInput, SceneHost};
use crate::logging::{LogLevel, Logger, event_with_fields, json_kv};
use crate::metrics::StickyMetrics;

pub mod audit;
pub mod diagnostics;
pub mod driver;

use audit::{NullRuntimeAudit, RuntimeAudit, RuntimeAuditEventBuilder, RuntimeAuditStage};

const LOG_TARGET: &str = "sticky::runtime";

/// Configuration knobs for the runtime loop.
#[derive(Clone)]
pub struct RuntimeConfig {
    /// Optional structured logger, shared with every mounted group.
    pub logger: Option<Logger>,
    /// Metrics accumulator shared with every mounted group.
    pub metrics: Option<Arc<Mutex<StickyMetrics>>>,
    pub audit: Arc<dyn RuntimeAudit>,
    /// Interval between frames when a driver owns the loop.
    pub frame_interval: Duration,
    /// Interval between metrics snapshot emissions. Zero disables snapshots.
    pub metrics_interval: Duration,
    pub metrics_target: String,
    /// Upper bound on frame/tick rounds spent by [`StickyRuntime::settle`].
    pub max_settle_rounds: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            logger: None,
            metrics: None,
            audit: Arc::new(NullRuntimeAudit),
            frame_interval: Duration::from_millis(16),
            metrics_interval: Duration::from_secs(5),
            metrics_target: "sticky::runtime.metrics".to_string(),
            max_settle_rounds: 16,
        }
    }
}

impl RuntimeConfig {
    pub fn enable_metrics(&mut self) {
        if self.metrics.is_none() {
            self.metrics = Some(Arc::new(Mutex::new(StickyMetrics::new())));
        }
    }

    pub fn disable_metrics(&mut self) {
        self.metrics = None;
    }

    pub fn metrics_handle(&self) -> Option<Arc<Mutex<StickyMetrics>>> {
        self.metrics.as_ref().map(Arc::clone)
    }
}

/// Where a scroll notification originated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScrollSource {
    Viewport,
    Element(ElementId),
}

/// Notifications the runtime reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeEvent {
    Scroll(ScrollSource),
    Resize(Size),
    /// Per-frame callback: pending passes run.
    Frame,
    /// Deferred tick: queued height totals are published.
    Tick,
}

impl RuntimeEvent {
    pub fn describe(&self) -> &'static str {
        match self {
            RuntimeEvent::Scroll(_) => "scroll",
            RuntimeEvent::Resize(_) => "resize",
            RuntimeEvent::Frame => "frame",
            RuntimeEvent::Tick => "tick",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFlow {
    Continue,
    /// Stop propagation and skip the runtime's own handling.
    Consumed,
}

/// Context handed to plugins. Changes are queued and applied once the
/// plugin returns.
pub struct RuntimeContext<'a> {
    groups: &'a [StickyGroup],
    offset_updates: Vec<(GroupId, f32)>,
    pass_requests: Vec<GroupId>,
    exit_requested: bool,
}

impl<'a> RuntimeContext<'a> {
    fn new(groups: &'a [StickyGroup]) -> Self {
        Self {
            groups,
            offset_updates: Vec::new(),
            pass_requests: Vec::new(),
            exit_requested: false,
        }
    }

    pub fn group(&self, id: &str) -> Option<&StickyGroup> {
        self.groups.iter().find(|group| group.id() == id)
    }

    pub fn group_ids(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(StickyGroup::id)
    }

    pub fn total_sticky_height(&self, id: &str) -> Option<f32> {
        self.group(id).map(StickyGroup::total_sticky_height)
    }

    pub fn set_fixed_offset_top(&mut self, group: impl Into<GroupId>, offset: f32) {
        self.offset_updates.push((group.into(), offset));
    }

    pub fn request_pass(&mut self, group: impl Into<GroupId>) {
        self.pass_requests.push(group.into());
    }

    pub fn request_exit(&mut self) {
        self.exit_requested = true;
    }

    fn into_outcome(self) -> ContextOutcome {
        ContextOutcome {
            offset_updates: self.offset_updates,
            pass_requests: self.pass_requests,
            exit_requested: self.exit_requested,
        }
    }
}

struct ContextOutcome {
    offset_updates: Vec<(GroupId, f32)>,
    pass_requests: Vec<GroupId>,
    exit_requested: bool,
}

/// Behaviour injection point for the runtime.
pub trait StickyPlugin: Send {
    fn name(&self) -> &str {
        "sticky_plugin"
    }

    fn init(&mut self, _ctx: &mut RuntimeContext<'_>) -> Result<()> {
        Ok(())
    }

    fn on_event(
        &mut self,
        _ctx: &mut RuntimeContext<'_>,
        _event: &RuntimeEvent,
    ) -> Result<EventFlow> {
        Ok(EventFlow::Continue)
    }

    fn after_pass(
        &mut self,
        _ctx: &mut RuntimeContext<'_>,
        _group: &str,
        _report: &PassReport,
    ) -> Result<()> {
        Ok(())
    }

    fn on_height_change(
        &mut self,
        _ctx: &mut RuntimeContext<'_>,
        _group: &str,
        _total: f32,
    ) -> Result<()> {
        Ok(())
    }
}

/// Feeds an outer group's sticky height into an inner group's offset.
#[derive(Debug, Clone, PartialEq)]
pub struct NestingLink {
    pub outer: GroupId,
    pub inner: GroupId,
    /// Constant added to the outer total.
    pub base_offset: f32,
}

/// Owns a host, the groups mounted on it and the wiring between them.
pub struct StickyRuntime<H: Host> {
    host: H,
    groups: Vec<StickyGroup>,
    links: Vec<NestingLink>,
    plugins: Vec<Box<dyn StickyPlugin>>,
    config: RuntimeConfig,
    initialized: bool,
    should_exit: bool,
    start_instant: Option<Instant>,
    last_metrics_emit: Option<Instant>,
}

impl<H: Host> StickyRuntime<H> {
    pub fn new(host: H) -> Self {
        Self::with_config(host, RuntimeConfig::default())
    }

    pub fn with_config(host: H, config: RuntimeConfig) -> Self {
        Self {
            host,
            groups: Vec::new(),
            links: Vec::new(),
            plugins: Vec::new(),
            config,
            initialized: false,
            should_exit: false,
            start_instant: None,
            last_metrics_emit: None,
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Adjust configuration. Groups mounted afterwards pick up the new
    /// logger and metrics handle.
    pub fn config_mut(&mut self) -> &mut RuntimeConfig {
        &mut self.config
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// Mutable host access. Dispatch a `Scroll` or `Resize` afterwards so
    /// groups see the change.
    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn groups(&self) -> &[StickyGroup] {
        &self.groups
    }

    pub fn links(&self) -> &[NestingLink] {
        &self.links
    }

    pub fn should_exit(&self) -> bool {
        self.should_exit
    }

    pub fn register_plugin<P>(&mut self, plugin: P)
    where
        P: StickyPlugin + 'static,
    {
        self.plugins.push(Box::new(plugin));
    }

    pub fn group(&self, id: &str) -> Result<&StickyGroup> {
        self.groups
            .iter()
            .find(|group| group.id() == id)
            .ok_or_else(|| StickyError::GroupNotFound(id.to_string()))
    }

    pub fn group_mut(&mut self, id: &str) -> Result<&mut StickyGroup> {
        find_group_mut(&mut self.groups, id)
    }

    pub fn mount_group(
        &mut self,
        id: impl Into<GroupId>,
        container: impl Into<ElementId>,
        config: GroupConfig,
    ) -> Result<()> {
        let id = id.into();
        if self.groups.iter().any(|group| group.id() == id) {
            return Err(StickyError::DuplicateGroup(id));
        }

        let mut group = StickyGroup::new(id.clone(), container, config);
        group.set_logger(self.config.logger.clone());
        group.set_metrics(self.config.metrics_handle());
        group.request_pass();
        let container = group.container().to_string();
        self.groups.push(group);

        self.audit(
            RuntimeAuditStage::GroupMounted,
            [("group", json!(id)), ("container", json!(container))],
        );
        self.log_runtime_event(
            LogLevel::Info,
            "group_mounted",
            [json_kv("group", json!(id)), json_kv("groups", json!(self.groups.len()))],
        );
        Ok(())
    }

    /// Release every member of the group and drop it. Groups nested inside it
    /// fall back to their base offset.
    pub fn unmount_group(&mut self, id: &str) -> Result<()> {
        let position = self
            .groups
            .iter()
            .position(|group| group.id() == id)
            .ok_or_else(|| StickyError::GroupNotFound(id.to_string()))?;
        let mut group = self.groups.remove(position);
        group.unmount(&mut self.host);

        let (orphaned, kept): (Vec<NestingLink>, Vec<NestingLink>) = self
            .links
            .drain(..)
            .filter(|link| link.inner != id)
            .partition(|link| link.outer == id);
        self.links = kept;
        for link in orphaned {
            if let Ok(inner) = find_group_mut(&mut self.groups, &link.inner) {
                inner.set_fixed_offset_top(link.base_offset);
            }
        }

        self.audit(RuntimeAuditStage::GroupUnmounted, [("group", json!(id))]);
        self.log_runtime_event(
            LogLevel::Info,
            "group_unmounted",
            [json_kv("group", json!(id))],
        );
        Ok(())
    }

    pub fn register_member(&mut self, group: &str, spec: MemberSpec) -> Result<Registration> {
        let target = find_group_mut(&mut self.groups, group)?;
        let registration = target.register(&self.host, spec)?;
        self.audit(
            RuntimeAuditStage::MemberRegistered,
            [("group", json!(group)), ("member", json!(registration.id()))],
        );
        Ok(registration)
    }

    pub fn unregister_member(&mut self, group: &str, member: &str) -> Result<()> {
        let target = find_group_mut(&mut self.groups, group)?;
        target.unregister(&mut self.host, member)?;
        self.audit(
            RuntimeAuditStage::MemberUnregistered,
            [("group", json!(group)), ("member", json!(member))],
        );
        Ok(())
    }

    pub fn set_member_mode(
        &mut self,
        group: &str,
        member: &str,
        mode: Option<StickyMode>,
    ) -> Result<()> {
        find_group_mut(&mut self.groups, group)?.set_member_mode(member, mode)
    }

    /// Drive `inner`'s fixed offset from `outer`'s total sticky height.
    ///
    /// An inner group follows a single outer group; nesting it again replaces
    /// the previous link.
    pub fn nest(&mut self, outer: &str, inner: &str, base_offset: f32) -> Result<()> {
        let outer_total = self.group(outer)?.total_sticky_height();
        self.group(inner)?;

        let mut cursor = Some(outer);
        while let Some(current) = cursor {
            if current == inner {
                return Err(StickyError::NestingCycle {
                    outer: outer.to_string(),
                    inner: inner.to_string(),
                });
            }
            cursor = self
                .links
                .iter()
                .find(|link| link.inner == current)
                .map(|link| link.outer.as_str());
        }

        self.links.retain(|link| link.inner != inner);
        self.links.push(NestingLink {
            outer: outer.to_string(),
            inner: inner.to_string(),
            base_offset,
        });
        find_group_mut(&mut self.groups, inner)?.set_fixed_offset_top(base_offset + outer_total);

        self.audit(
            RuntimeAuditStage::GroupsNested,
            [
                ("outer", json!(outer)),
                ("inner", json!(inner)),
                ("base_offset", json!(base_offset)),
            ],
        );
        Ok(())
    }

    pub fn dispatch(&mut self, event: RuntimeEvent) -> Result<()> {
        self.bootstrap()?;

        let mut consumed = false;
        for idx in 0..self.plugins.len() {
            let (flow, outcome) = {
                let plugin = &mut self.plugins[idx];
                let mut ctx = RuntimeContext::new(&self.groups);
                let flow = plugin.on_event(&mut ctx, &event)?;
                (flow, ctx.into_outcome())
            };
            self.apply_outcome(outcome);
            if matches!(flow, EventFlow::Consumed) {
                consumed = true;
                break;
            }
        }

        if !consumed {
            match &event {
                RuntimeEvent::Scroll(source) => self.request_for_scroll(source),
                RuntimeEvent::Resize(_) => {
                    for group in &self.groups {
                        group.request_pass();
                    }
                }
                RuntimeEvent::Frame => self.run_frame()?,
                RuntimeEvent::Tick => self.run_tick()?,
            }
        }

        if !matches!(event, RuntimeEvent::Frame | RuntimeEvent::Tick) {
            self.log_runtime_event(
                LogLevel::Trace,
                "event_dispatched",
                [
                    json_kv("event", json!(event.describe())),
                    json_kv("consumed", json!(consumed)),
                ],
            );
        }
        self.maybe_emit_metrics();
        Ok(())
    }

    /// Dispatch each event in order, then settle.
    pub fn run_scripted<I>(&mut self, events: I) -> Result<()>
    where
        I: IntoIterator<Item = RuntimeEvent>,
    {
        self.bootstrap()?;
        for event in events {
            self.dispatch(event)?;
            if self.should_exit {
                break;
            }
        }
        self.settle()?;
        self.finalize();
        Ok(())
    }

    /// Alternate frames and ticks until no pass or height notification is
    /// pending. Returns the number of rounds used.
    pub fn settle(&mut self) -> Result<usize> {
        let limit = self.config.max_settle_rounds;
        let mut rounds = 0;
        while self.is_busy() {
            if rounds == limit {
                self.log_runtime_event(
                    LogLevel::Warn,
                    "settle_limit_reached",
                    [json_kv("rounds", json!(rounds))],
                );
                break;
            }
            self.dispatch(RuntimeEvent::Frame)?;
            self.dispatch(RuntimeEvent::Tick)?;
            rounds += 1;
        }
        Ok(rounds)
    }

    pub fn is_busy(&self) -> bool {
        self.groups
            .iter()
            .any(|group| group.has_pending_pass() || group.has_pending_height())
    }

    fn request_for_scroll(&self, source: &ScrollSource) {
        for group in &self.groups {
            let listens = match source {
                ScrollSource::Viewport => true,
                ScrollSource::Element(id) => {
                    group.container() == id.as_str()
                        || group.config().scroll_root.as_deref() == Some(id.as_str())
                }
            };
            if listens {
                group.request_pass();
            }
        }
    }

    fn run_frame(&mut self) -> Result<()> {
        let mut reports = Vec::new();
        for group in self.groups.iter_mut() {
            if let Some(report) = group.run_pending(&mut self.host) {
                reports.push((group.id().to_string(), report));
            }
        }

        for (group, report) in reports {
            let stage = match report.outcome {
                PassOutcome::Committed => RuntimeAuditStage::PassCommitted,
                PassOutcome::Suspended => RuntimeAuditStage::PassSuspended,
                PassOutcome::Skipped(_) => RuntimeAuditStage::PassSkipped,
            };
            self.audit(
                stage,
                [
                    ("group", json!(group)),
                    ("sticky", json!(report.sticky)),
                    ("transitions", json!(report.transitions)),
                    ("total_height", json!(report.total_height)),
                ],
            );

            for idx in 0..self.plugins.len() {
                let outcome = {
                    let plugin = &mut self.plugins[idx];
                    let mut ctx = RuntimeContext::new(&self.groups);
                    plugin.after_pass(&mut ctx, &group, &report)?;
                    ctx.into_outcome()
                };
                self.apply_outcome(outcome);
            }
        }
        Ok(())
    }

    fn run_tick(&mut self) -> Result<()> {
        let published: Vec<(GroupId, f32)> = self
            .groups
            .iter_mut()
            .filter_map(|group| {
                group
                    .flush_height_notification()
                    .map(|total| (group.id().to_string(), total))
            })
            .collect();

        for (group, total) in published {
            self.audit(
                RuntimeAuditStage::HeightPublished,
                [("group", json!(group)), ("total_height", json!(total))],
            );

            let followers: Vec<(GroupId, f32)> = self
                .links
                .iter()
                .filter(|link| link.outer == group)
                .map(|link| (link.inner.clone(), link.base_offset + total))
                .collect();
            for (inner, offset) in followers {
                if let Ok(inner) = find_group_mut(&mut self.groups, &inner) {
                    inner.set_fixed_offset_top(offset);
                }
            }

            for idx in 0..self.plugins.len() {
                let outcome = {
                    let plugin = &mut self.plugins[idx];
                    let mut ctx = RuntimeContext::new(&self.groups);
                    plugin.on_height_change(&mut ctx, &group, total)?;
                    ctx.into_outcome()
                };
                self.apply_outcome(outcome);
            }
        }
        Ok(())
    }

    fn apply_outcome(&mut self, outcome: ContextOutcome) {
        let ContextOutcome {
            offset_updates,
            pass_requests,
            exit_requested,
        } = outcome;

        for (group, offset) in offset_updates {
            if let Ok(target) = find_group_mut(&mut self.groups, &group) {
                target.set_fixed_offset_top(offset);
                continue;
            }
            self.log_unknown_group(&group);
        }
        for group in pass_requests {
            match self.groups.iter().find(|candidate| candidate.id() == group) {
                Some(target) => {
                    target.request_pass();
                }
                None => self.log_unknown_group(&group),
            }
        }

        if exit_requested && !self.should_exit {
            self.should_exit = true;
            self.log_runtime_event(LogLevel::Info, "exit_requested", std::iter::empty());
        }
    }

    fn bootstrap(&mut self) -> Result<()> {
        if self.initialized {
            return Ok(());
        }
        self.initialized = true;
        self.should_exit = false;
        let now = Instant::now();
        self.start_instant = Some(now);
        self.last_metrics_emit = Some(now);
        self.log_runtime_event(
            LogLevel::Info,
            "runtime_started",
            [
                json_kv("plugins", json!(self.plugins.len())),
                json_kv("groups", json!(self.groups.len())),
            ],
        );

        for idx in 0..self.plugins.len() {
            let outcome = {
                let plugin = &mut self.plugins[idx];
                let plugin_name = plugin.name().to_string();
                let mut ctx = RuntimeContext::new(&self.groups);
                plugin.init(&mut ctx)?;
                self.log_runtime_event(
                    LogLevel::Debug,
                    "plugin_initialized",
                    [json_kv("plugin", json!(plugin_name))],
                );
                ctx.into_outcome()
            };
            self.apply_outcome(outcome);
        }
        Ok(())
    }

    fn finalize(&mut self) {
        let uptime_ms = self
            .start_instant
            .map(|start| start.elapsed().as_millis())
            .unwrap_or(0);
        self.log_runtime_event(
            LogLevel::Info,
            "runtime_stopped",
            [json_kv("uptime_ms", json!(uptime_ms))],
        );
    }

    fn maybe_emit_metrics(&mut self) {
        if self.config.metrics_interval == Duration::from_millis(0) {
            return;
        }

        let now = Instant::now();
        match self.last_metrics_emit {
            Some(last) if now.duration_since(last) < self.config.metrics_interval => return,
            _ => self.last_metrics_emit = Some(now),
        }

        let uptime = self
            .start_instant
            .map(|start| now.duration_since(start))
            .unwrap_or_default();

        if let (Some(logger), Some(metrics)) =
            (self.config.logger.as_ref(), self.config.metrics.as_ref())
        {
            if let Ok(guard) = metrics.lock() {
                let event = guard.snapshot(uptime).to_log_event(&self.config.metrics_target);
                let _ = logger.log_event(event);
            }
        }
    }

    fn audit<const N: usize>(&self, stage: RuntimeAuditStage, details: [(&str, Value); N]) {
        let mut builder = RuntimeAuditEventBuilder::new(stage);
        for (key, value) in details {
            builder.detail(key, value);
        }
        self.config.audit.record(builder.finish());
    }

    fn log_unknown_group(&self, group: &str) {
        self.log_runtime_event(
            LogLevel::Warn,
            "unknown_group",
            [json_kv("group", json!(group))],
        );
    }

    fn log_runtime_event<I>(&self, level: LogLevel, message: &str, fields: I)
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        if let Some(logger) = self.config.logger.as_ref() {
            let event = event_with_fields(level, LOG_TARGET, message, fields);
            let _ = logger.log_event(event);
        }
    }
}

impl StickyRuntime<SceneHost> {
    /// Apply outside input to the scene and dispatch the resulting event.
    pub fn apply_input(&mut self, input: HostInput) -> Result<()> {
        let event = self.host.apply_input(input);
        self.dispatch(event)
    }
}

fn find_group_mut<'a>(groups: &'a mut [StickyGroup], id: &str) -> Result<&'a mut StickyGroup> {
    groups
        .iter_mut()
        .find(|group| group.id() == id)
        .ok_or_else(|| StickyError::GroupNotFound(id.to_string()))
}

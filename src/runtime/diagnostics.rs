use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::json;

use crate::Result;
use crate::group::{PassOutcome, PassReport};
use crate::logging::{LogLevel, Logger, event_with_fields, json_kv};
use crate::metrics::StickyMetrics;

use super::{EventFlow, RuntimeContext, RuntimeEvent, ScrollSource, StickyPlugin};

const LIFECYCLE_TARGET: &str = "sticky::runtime.lifecycle";

/// Logs runtime events, pass outcomes and height changes.
pub struct LifecycleLoggerPlugin {
    logger: Logger,
    level: LogLevel,
    log_scrolls: bool,
    log_frames: bool,
    log_idle_passes: bool,
    log_heights: bool,
}

impl LifecycleLoggerPlugin {
    pub fn new(logger: Logger) -> Self {
        Self {
            logger,
            level: LogLevel::Debug,
            log_scrolls: false,
            log_frames: false,
            log_idle_passes: false,
            log_heights: true,
        }
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn log_scrolls(mut self, enabled: bool) -> Self {
        self.log_scrolls = enabled;
        self
    }

    pub fn log_frames(mut self, enabled: bool) -> Self {
        self.log_frames = enabled;
        self
    }

    /// Also log committed passes that changed nothing.
    pub fn log_idle_passes(mut self, enabled: bool) -> Self {
        self.log_idle_passes = enabled;
        self
    }

    pub fn log_heights(mut self, enabled: bool) -> Self {
        self.log_heights = enabled;
        self
    }

    fn emit(&self, message: &str, fields: impl IntoIterator<Item = (String, serde_json::Value)>) {
        let event = event_with_fields(self.level, LIFECYCLE_TARGET, message, fields);
        let _ = self.logger.log_event(event);
    }
}

impl StickyPlugin for LifecycleLoggerPlugin {
    fn name(&self) -> &str {
        "diagnostics.lifecycle_logger"
    }

    fn init(&mut self, ctx: &mut RuntimeContext<'_>) -> Result<()> {
        let groups: Vec<&str> = ctx.group_ids().collect();
        self.emit(
            "plugin_initialized",
            [
                json_kv("logger_level", json!(format!("{:?}", self.level))),
                json_kv("groups", json!(groups)),
            ],
        );
        Ok(())
    }

    fn on_event(
        &mut self,
        _ctx: &mut RuntimeContext<'_>,
        event: &RuntimeEvent,
    ) -> Result<EventFlow> {
        match event {
            RuntimeEvent::Scroll(source) if self.log_scrolls => {
                let source = match source {
                    ScrollSource::Viewport => "viewport",
                    ScrollSource::Element(id) => id.as_str(),
                };
                self.emit("event.scroll", [json_kv("source", json!(source))]);
            }
            RuntimeEvent::Resize(size) => {
                self.emit(
                    "event.resize",
                    [
                        json_kv("width", json!(size.width)),
                        json_kv("height", json!(size.height)),
                    ],
                );
            }
            RuntimeEvent::Frame | RuntimeEvent::Tick if self.log_frames => {
                self.emit(&format!("event.{}", event.describe()), std::iter::empty());
            }
            _ => {}
        }

        Ok(EventFlow::Continue)
    }

    fn after_pass(
        &mut self,
        _ctx: &mut RuntimeContext<'_>,
        group: &str,
        report: &PassReport,
    ) -> Result<()> {
        let outcome = match report.outcome {
            PassOutcome::Committed if report.transitions == 0 && !self.log_idle_passes => {
                return Ok(());
            }
            PassOutcome::Committed => "committed".to_string(),
            PassOutcome::Suspended => "suspended".to_string(),
            PassOutcome::Skipped(reason) => format!("skipped:{reason:?}"),
        };
        self.emit(
            "pass",
            [
                json_kv("group", json!(group)),
                json_kv("outcome", json!(outcome)),
                json_kv("sticky", json!(report.sticky)),
                json_kv("transitions", json!(report.transitions)),
                json_kv("correction", json!(report.correction)),
            ],
        );
        Ok(())
    }

    fn on_height_change(
        &mut self,
        _ctx: &mut RuntimeContext<'_>,
        group: &str,
        total: f32,
    ) -> Result<()> {
        if self.log_heights {
            self.emit(
                "height_changed",
                [json_kv("group", json!(group)), json_kv("total_height", json!(total))],
            );
        }
        Ok(())
    }
}

/// Periodically emits metrics snapshots through the provided logger.
pub struct MetricsSnapshotPlugin {
    logger: Logger,
    metrics: Arc<Mutex<StickyMetrics>>,
    target: String,
    interval: Duration,
    last_emit: Option<Instant>,
    started_at: Instant,
}

impl MetricsSnapshotPlugin {
    pub fn new(logger: Logger, metrics: Arc<Mutex<StickyMetrics>>) -> Self {
        Self {
            logger,
            metrics,
            target: "sticky::runtime.metrics".to_string(),
            interval: Duration::from_secs(5),
            last_emit: None,
            started_at: Instant::now(),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    fn emit_snapshot(&mut self) {
        let now = Instant::now();
        if let Some(last) = self.last_emit {
            if now.duration_since(last) < self.interval {
                return;
            }
        }

        self.last_emit = Some(now);
        let uptime = now.duration_since(self.started_at);

        if let Ok(guard) = self.metrics.lock() {
            let event = guard.snapshot(uptime).to_log_event(&self.target);
            let _ = self.logger.log_event(event);
        }
    }
}

impl StickyPlugin for MetricsSnapshotPlugin {
    fn name(&self) -> &str {
        "diagnostics.metrics_snapshot"
    }

    fn init(&mut self, _ctx: &mut RuntimeContext<'_>) -> Result<()> {
        self.started_at = Instant::now();
        self.last_emit = None;
        Ok(())
    }

    fn on_event(
        &mut self,
        _ctx: &mut RuntimeContext<'_>,
        event: &RuntimeEvent,
    ) -> Result<EventFlow> {
        if matches!(event, RuntimeEvent::Tick) {
            self.emit_snapshot();
        }
        Ok(EventFlow::Continue)
    }
}

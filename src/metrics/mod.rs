use crate::logging::{LogEvent, LogFields, LogLevel};
use serde_json::json;
use std::time::Duration;

#[derive(Debug, Default, Clone)]
pub struct StickyMetrics {
    passes: u64,
    skipped_passes: u64,
    suspended_passes: u64,
    absorbed_requests: u64,
    transitions: u64,
    height_notifications: u64,
    registrations: u64,
}

impl StickyMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_pass(&mut self, transitions: usize) {
        self.passes = self.passes.saturating_add(1);
        self.transitions = self.transitions.saturating_add(transitions as u64);
    }

    pub fn record_skipped(&mut self) {
        self.skipped_passes = self.skipped_passes.saturating_add(1);
    }

    pub fn record_suspended(&mut self, transitions: usize) {
        self.suspended_passes = self.suspended_passes.saturating_add(1);
        self.transitions = self.transitions.saturating_add(transitions as u64);
    }

    pub fn record_absorbed(&mut self, count: u64) {
        self.absorbed_requests = self.absorbed_requests.saturating_add(count);
    }

    pub fn record_height_notification(&mut self) {
        self.height_notifications = self.height_notifications.saturating_add(1);
    }

    pub fn record_registration(&mut self) {
        self.registrations = self.registrations.saturating_add(1);
    }

    pub fn snapshot(&self, uptime: Duration) -> MetricSnapshot {
        MetricSnapshot {
            uptime_ms: uptime.as_millis() as u64,
            passes: self.passes,
            skipped_passes: self.skipped_passes,
            suspended_passes: self.suspended_passes,
            absorbed_requests: self.absorbed_requests,
            transitions: self.transitions,
            height_notifications: self.height_notifications,
            registrations: self.registrations,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricSnapshot {
    pub uptime_ms: u64,
    pub passes: u64,
    pub skipped_passes: u64,
    pub suspended_passes: u64,
    pub absorbed_requests: u64,
    pub transitions: u64,
    pub height_notifications: u64,
    pub registrations: u64,
}

impl MetricSnapshot {
    pub fn to_log_event(&self, target: &str) -> LogEvent {
        LogEvent::with_fields(LogLevel::Info, target, "sticky_metrics", self.as_fields())
    }

    pub fn as_fields(&self) -> LogFields {
        let mut map = LogFields::new();
        map.insert("uptime_ms".to_string(), json!(self.uptime_ms));
        map.insert("passes".to_string(), json!(self.passes));
        map.insert("skipped_passes".to_string(), json!(self.skipped_passes));
        map.insert("suspended_passes".to_string(), json!(self.suspended_passes));
        map.insert("absorbed_requests".to_string(), json!(self.absorbed_requests));
        map.insert("transitions".to_string(), json!(self.transitions));
        map.insert(
            "height_notifications".to_string(),
            json!(self.height_notifications),
        );
        map.insert("registrations".to_string(), json!(self.registrations));
        map
    }
}

use std::sync::{Arc, Mutex};

use serde_json::{Value, json};

use crate::config::{ConstraintPolicy, GroupConfig, ReferenceContainer, StickyMode, coerce_base_z_index};
use crate::error::{Result, StickyError};
use crate::geometry::Rect;
use crate::host::{ElementId, Host, RectSource, StyleSink};
use crate::logging::{LogLevel, Logger, event_with_fields, json_kv};
use crate::metrics::StickyMetrics;
use crate::schedule::{Detach, FrameScheduler};

use super::heights::HeightAggregator;
use super::member::{Member, MemberId, MemberSpec, PassEnv, UpdateInput};

pub type GroupId = String;

/// Callback receiving the group's total sticky height after each flush.
pub type HeightListener = Box<dyn FnMut(f32) + Send>;

const LOG_TARGET: &str = "sticky::group";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The group could not stick last pass and still cannot.
    OutOfRange,
    /// The reference rectangle could not be measured.
    MissingReference,
    /// The group was unmounted.
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// Positions were computed for every measurable member.
    Committed,
    /// The group just lost permission to stick; all members were released.
    Suspended,
    Skipped(SkipReason),
}

/// Summary of one recomputation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct PassReport {
    pub outcome: PassOutcome,
    pub can_stick: bool,
    pub members: usize,
    pub sticky: usize,
    pub transitions: usize,
    pub correction: f32,
    pub total_height: f32,
}

/// Owned registration of one member; dropping it detaches the member on the
/// group's next pass.
#[derive(Debug)]
#[must_use = "dropping a registration detaches the member"]
pub struct Registration {
    member: MemberId,
    serial: u64,
    scheduler: FrameScheduler,
    armed: bool,
}

impl Registration {
    pub fn id(&self) -> &str {
        &self.member
    }

    /// Keep the member registered until it is removed explicitly.
    pub fn keep(mut self) -> MemberId {
        self.armed = false;
        std::mem::take(&mut self.member)
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if self.armed {
            self.scheduler.detach(Detach {
                member: std::mem::take(&mut self.member),
                serial: self.serial,
            });
        }
    }
}

/// Coordinator for the sticky members of one scrollable region.
pub struct StickyGroup {
    id: GroupId,
    container: ElementId,
    config: GroupConfig,
    members: Vec<Member>,
    dormant: Vec<Member>,
    heights: HeightAggregator,
    scheduler: FrameScheduler,
    could_stick: bool,
    modes_dirty: bool,
    next_serial: u64,
    listener: Option<HeightListener>,
    logger: Option<Logger>,
    metrics: Option<Arc<Mutex<StickyMetrics>>>,
}

impl StickyGroup {
    pub fn new(id: impl Into<GroupId>, container: impl Into<ElementId>, config: GroupConfig) -> Self {
        Self {
            id: id.into(),
            container: container.into(),
            config: config.normalized(),
            members: Vec::new(),
            dormant: Vec::new(),
            heights: HeightAggregator::new(),
            scheduler: FrameScheduler::new(),
            could_stick: false,
            modes_dirty: false,
            next_serial: 0,
            listener: None,
            logger: None,
            metrics: None,
        }
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Mutex<StickyMetrics>>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn set_logger(&mut self, logger: Option<Logger>) {
        self.logger = logger;
    }

    pub fn set_metrics(&mut self, metrics: Option<Arc<Mutex<StickyMetrics>>>) {
        self.metrics = metrics;
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn config(&self) -> &GroupConfig {
        &self.config
    }

    /// Active members in processing order.
    pub fn members(&self) -> &[Member] {
        &self.members
    }

    /// Registered members whose resolved mode is `none`.
    pub fn dormant_members(&self) -> &[Member] {
        &self.dormant
    }

    pub fn member(&self, id: &str) -> Option<&Member> {
        self.members
            .iter()
            .chain(self.dormant.iter())
            .find(|member| member.id() == id)
    }

    pub fn total_sticky_height(&self) -> f32 {
        self.heights.total()
    }

    /// Result of the last `can_stick` evaluation.
    pub fn can_stick(&self) -> bool {
        self.could_stick
    }

    pub fn on_height_change<F>(&mut self, listener: F)
    where
        F: FnMut(f32) + Send + 'static,
    {
        self.listener = Some(Box::new(listener));
    }

    pub fn register<R>(&mut self, rects: &R, spec: MemberSpec) -> Result<Registration>
    where
        R: RectSource + ?Sized,
    {
        if self.member(spec.id()).is_some() {
            return Err(StickyError::DuplicateMember(spec.id().to_string()));
        }

        self.next_serial += 1;
        let serial = self.next_serial;
        let member = Member::new(spec, self.config.default_mode).with_serial(serial);
        let id = member.id().to_string();
        let mode = member.mode();

        if mode.is_active() {
            self.members.push(member);
            self.sort_members(rects);
        } else {
            self.dormant.push(member);
        }
        self.scheduler.request();
        self.with_metrics_guard(|metrics| metrics.record_registration());

        self.log(
            LogLevel::Debug,
            "member_registered",
            [json_kv("member", json!(id)), json_kv("mode", json!(mode.as_str()))],
        );
        if mode.is_active() && !self.config.has_z_headroom(self.members.len()) {
            self.log(
                LogLevel::Warn,
                "z_index_headroom_exhausted",
                [
                    json_kv("base_z_index", json!(self.config.base_z_index)),
                    json_kv("members", json!(self.members.len())),
                ],
            );
        }

        Ok(Registration {
            member: id,
            serial,
            scheduler: self.scheduler.clone(),
            armed: true,
        })
    }

    /// Remove a member immediately, restoring its normal-flow styles.
    pub fn unregister<S>(&mut self, styles: &mut S, id: &str) -> Result<()>
    where
        S: StyleSink + ?Sized,
    {
        if !self.remove_member(&mut *styles, id, None) {
            return Err(StickyError::MemberNotFound(id.to_string()));
        }
        self.scheduler.request();
        Ok(())
    }

    /// Override (or with `None`, inherit) the mode of one member.
    pub fn set_member_mode(&mut self, id: &str, mode: Option<StickyMode>) -> Result<()> {
        let member = self
            .members
            .iter_mut()
            .chain(self.dormant.iter_mut())
            .find(|member| member.id() == id)
            .ok_or_else(|| StickyError::MemberNotFound(id.to_string()))?;
        if member.mode_override() != mode {
            member.set_override(mode);
            self.modes_dirty = true;
            self.scheduler.request();
        }
        Ok(())
    }

    pub fn set_fixed_offset_top(&mut self, offset: f32) {
        let offset = if offset.is_finite() { offset } else { 0.0 };
        if offset != self.config.fixed_offset_top {
            self.config.fixed_offset_top = offset;
            self.scheduler.request();
        }
    }

    pub fn set_default_mode(&mut self, mode: StickyMode) {
        if mode != self.config.default_mode {
            self.config.default_mode = mode;
            self.modes_dirty = true;
            self.scheduler.request();
        }
    }

    pub fn set_base_z_index(&mut self, base: f64) {
        let base = coerce_base_z_index(base);
        if base != self.config.base_z_index {
            self.config.base_z_index = base;
            self.scheduler.request();
        }
    }

    pub fn set_constraint(&mut self, constraint: ConstraintPolicy) {
        if constraint != self.config.constraint {
            self.config.constraint = constraint;
            self.scheduler.request();
        }
    }

    pub fn set_reference(&mut self, reference: ReferenceContainer) {
        if reference != self.config.reference {
            self.config.reference = reference;
            self.scheduler.request();
        }
    }

    /// Replace the whole configuration, scheduling a pass if anything changed.
    pub fn set_config(&mut self, config: GroupConfig) {
        let config = config.normalized();
        if config == self.config {
            return;
        }
        if config.default_mode != self.config.default_mode {
            self.modes_dirty = true;
        }
        self.config = config;
        self.scheduler.request();
    }

    /// Ask for a pass on the next frame; `false` if one was already pending.
    pub fn request_pass(&self) -> bool {
        self.scheduler.request()
    }

    pub fn has_pending_pass(&self) -> bool {
        self.scheduler.is_pending()
    }

    pub fn has_pending_height(&self) -> bool {
        self.heights.has_pending()
    }

    /// Run the pending pass, if one was requested since the last frame.
    pub fn run_pending<H>(&mut self, host: &mut H) -> Option<PassReport>
    where
        H: Host + ?Sized,
    {
        let absorbed = self.scheduler.take_absorbed();
        if absorbed > 0 {
            self.with_metrics_guard(|metrics| metrics.record_absorbed(absorbed));
        }
        if !self.scheduler.take() {
            return None;
        }
        Some(self.recompute(&mut *host))
    }

    /// One recomputation pass over every active member.
    pub fn recompute<H>(&mut self, host: &mut H) -> PassReport
    where
        H: Host + ?Sized,
    {
        if self.scheduler.is_cancelled() {
            return self.report(PassOutcome::Skipped(SkipReason::Cancelled), 0, 0.0);
        }

        self.apply_detached(&mut *host);
        self.reconcile_modes(&mut *host);

        let fixed = self.config.fixed_offset_top;
        let Some(reference) = self.constraint_rect(&*host) else {
            self.log(LogLevel::Debug, "reference_missing", std::iter::empty());
            self.with_metrics_guard(StickyMetrics::record_skipped);
            return self.report(PassOutcome::Skipped(SkipReason::MissingReference), 0, 0.0);
        };

        if !reference.straddles(fixed) {
            if !self.could_stick {
                self.with_metrics_guard(StickyMetrics::record_skipped);
                return self.report(PassOutcome::Skipped(SkipReason::OutOfRange), 0, 0.0);
            }
            self.could_stick = false;
            let mut env = PassEnv::new(&mut *host, &mut self.heights, self.config.base_z_index);
            for member in self.members.iter_mut() {
                member.update(&mut env, UpdateInput::suspended());
            }
            let transitions = env.transitions;
            self.with_metrics_guard(|metrics| metrics.record_suspended(transitions));
            self.log(
                LogLevel::Debug,
                "group_suspended",
                [
                    json_kv("reference_top", json!(reference.top)),
                    json_kv("reference_bottom", json!(reference.bottom)),
                    json_kv("transitions", json!(transitions)),
                ],
            );
            return self.report(PassOutcome::Suspended, transitions, 0.0);
        }

        self.could_stick = true;
        let correction = (reference.bottom - (fixed + self.heights.total())).min(0.0);
        let tops: Vec<Option<f32>> = self
            .members
            .iter()
            .map(|member| host.measure(member.wrapper()).map(|rect| rect.top))
            .collect();

        let mut unmeasured = Vec::new();
        let mut env = PassEnv::new(&mut *host, &mut self.heights, self.config.base_z_index);
        let mut cursor = fixed;
        for (index, member) in self.members.iter_mut().enumerate() {
            let Some(current_offset_top) = tops[index] else {
                // Keeps its previous state and the room it already holds.
                cursor += member.contributed_height();
                unmeasured.push(member.id().to_string());
                continue;
            };
            let input = UpdateInput {
                can_stick: true,
                current_offset_top,
                offset_top: cursor + correction,
                next_offset_top: tops[index + 1..].iter().flatten().next().copied(),
                index,
            };
            cursor += member.update(&mut env, input);
        }
        let transitions = env.transitions;

        for member in unmeasured {
            self.log(
                LogLevel::Debug,
                "member_unmeasured",
                [json_kv("member", json!(member))],
            );
        }
        self.with_metrics_guard(|metrics| metrics.record_pass(transitions));
        let report = self.report(PassOutcome::Committed, transitions, correction);
        if transitions > 0 {
            self.log(
                LogLevel::Debug,
                "pass_committed",
                [
                    json_kv("sticky", json!(report.sticky)),
                    json_kv("transitions", json!(transitions)),
                    json_kv("correction", json!(correction)),
                    json_kv("total_height", json!(report.total_height)),
                ],
            );
        }
        report
    }

    /// Deliver the latest queued total to the listener.
    ///
    /// Meant to run one tick after the pass that produced the change.
    pub fn flush_height_notification(&mut self) -> Option<f32> {
        let total = self.heights.take_pending()?;
        if let Some(listener) = self.listener.as_mut() {
            listener(total);
        }
        self.with_metrics_guard(StickyMetrics::record_height_notification);
        self.log(
            LogLevel::Debug,
            "height_published",
            [json_kv("total_height", json!(total))],
        );
        Some(total)
    }

    /// Release every member and stop scheduling. The group is inert afterwards.
    pub fn unmount<S>(&mut self, styles: &mut S)
    where
        S: StyleSink + ?Sized,
    {
        self.scheduler.cancel();
        for member in self.members.iter_mut().chain(self.dormant.iter_mut()) {
            member.release(&mut *styles, &mut self.heights);
        }
        self.members.clear();
        self.dormant.clear();
        self.could_stick = false;
        self.log(LogLevel::Debug, "group_unmounted", std::iter::empty());
    }

    fn constraint_rect<R>(&self, rects: &R) -> Option<Rect>
    where
        R: RectSource + ?Sized,
    {
        match self.config.constraint {
            ConstraintPolicy::Unbounded => Some(Rect::unbounded()),
            ConstraintPolicy::Bounded => match &self.config.reference {
                ReferenceContainer::Group => rects.measure(&self.container),
                ReferenceContainer::Viewport => rects.viewport(),
                ReferenceContainer::Element(id) => rects.measure(id),
            },
        }
    }

    /// Order members by current wrapper top; unmeasurable members go last.
    fn sort_members<R>(&mut self, rects: &R)
    where
        R: RectSource + ?Sized,
    {
        let mut keyed: Vec<(f32, Member)> = self
            .members
            .drain(..)
            .map(|member| {
                let top = rects
                    .measure(member.wrapper())
                    .map(|rect| rect.top)
                    .unwrap_or(f32::INFINITY);
                (top, member)
            })
            .collect();
        keyed.sort_by(|a, b| a.0.total_cmp(&b.0));
        self.members = keyed.into_iter().map(|(_, member)| member).collect();
    }

    fn apply_detached<S>(&mut self, styles: &mut S)
    where
        S: StyleSink + ?Sized,
    {
        for request in self.scheduler.drain_detached() {
            if self.remove_member(&mut *styles, &request.member, Some(request.serial)) {
                self.log(
                    LogLevel::Debug,
                    "member_detached",
                    [json_kv("member", json!(request.member))],
                );
            }
        }
    }

    fn remove_member<S>(&mut self, styles: &mut S, id: &str, serial: Option<u64>) -> bool
    where
        S: StyleSink + ?Sized,
    {
        let matches =
            |member: &Member| member.id() == id && serial.is_none_or(|s| s == member.serial());

        let removed = if let Some(pos) = self.members.iter().position(&matches) {
            Some(self.members.remove(pos))
        } else {
            self.dormant
                .iter()
                .position(&matches)
                .map(|pos| self.dormant.remove(pos))
        };

        match removed {
            Some(mut member) => {
                member.release(&mut *styles, &mut self.heights);
                true
            }
            None => false,
        }
    }

    fn reconcile_modes<H>(&mut self, host: &mut H)
    where
        H: Host + ?Sized,
    {
        if !std::mem::take(&mut self.modes_dirty) {
            return;
        }

        let default_mode = self.config.default_mode;
        let mut active = Vec::with_capacity(self.members.len());
        let mut dormant = Vec::new();
        for mut member in self.members.drain(..).chain(self.dormant.drain(..)) {
            if member.resolve_mode(default_mode) {
                member.release(&mut *host, &mut self.heights);
            }
            if member.mode().is_active() {
                active.push(member);
            } else {
                dormant.push(member);
            }
        }
        self.members = active;
        self.dormant = dormant;
        self.sort_members(&*host);
    }

    fn report(&self, outcome: PassOutcome, transitions: usize, correction: f32) -> PassReport {
        PassReport {
            outcome,
            can_stick: self.could_stick,
            members: self.members.len(),
            sticky: self.members.iter().filter(|member| member.is_sticky()).count(),
            transitions,
            correction,
            total_height: self.heights.total(),
        }
    }

    fn with_metrics_guard(&self, record: impl FnOnce(&mut StickyMetrics)) {
        if let Some(metrics) = self.metrics.as_ref() {
            if let Ok(mut guard) = metrics.lock() {
                record(&mut *guard);
            }
        }
    }

    fn log<I>(&self, level: LogLevel, message: &str, fields: I)
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        if let Some(logger) = self.logger.as_ref() {
            let mut event = event_with_fields(level, LOG_TARGET, message, fields);
            event.fields.insert("group".to_string(), json!(self.id));
            let _ = logger.log_event(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MIN_BASE_Z_INDEX;
    use crate::geometry::Size;
    use crate::host::SceneHost;
    use crate::logging::MemorySink;

    fn scene() -> SceneHost {
        SceneHost::new(Size::new(320.0, 400.0))
            .with_element("page", Rect::new(0.0, 0.0, 320.0, 2000.0))
    }

    fn add_member(host: &mut SceneHost, id: &str, top: f32, height: f32) -> MemberSpec {
        let content = format!("{id}.content");
        host.insert(id, Rect::new(0.0, top, 300.0, height));
        host.insert(content.clone(), Rect::new(0.0, top, 300.0, height));
        MemberSpec::new(id, content)
    }

    fn group(mode: StickyMode) -> StickyGroup {
        StickyGroup::new(
            "main",
            "page",
            GroupConfig::new().with_offset_top(90.0).with_default_mode(mode),
        )
    }

    fn order(group: &StickyGroup) -> Vec<&str> {
        group.members().iter().map(Member::id).collect()
    }

    #[test]
    fn empty_group_pass_is_a_no_op() {
        let mut host = scene();
        let mut group = group(StickyMode::Stack);
        host.scroll_to(500.0);

        let report = group.recompute(&mut host);
        assert_eq!(report.outcome, PassOutcome::Committed);
        assert_eq!(report.members, 0);
        assert_eq!(host.mutations(), 0);
        assert_eq!(group.total_sticky_height(), 0.0);
        assert!(!group.has_pending_height());
    }

    #[test]
    fn stack_members_pin_below_each_other() {
        let mut host = scene();
        let mut group = group(StickyMode::Stack);
        let a = add_member(&mut host, "a", 300.0, 40.0);
        let b = add_member(&mut host, "b", 600.0, 40.0);
        let _a = group.register(&host, a).unwrap().keep();
        let _b = group.register(&host, b).unwrap().keep();

        host.scroll_to(500.0);
        let report = group.recompute(&mut host);
        assert_eq!(report.sticky, 2);
        assert_eq!(report.total_height, 80.0);

        let a = host.position_of("a.content").unwrap();
        let b = host.position_of("b.content").unwrap();
        assert_eq!((a.top, a.z_index), (90.0, 200));
        assert_eq!((b.top, b.z_index), (130.0, 201));
        assert_eq!(host.wrapper_height_of("a"), Some(40.0));
        assert_eq!(group.member("b").unwrap().contributed_height(), 40.0);
    }

    #[test]
    fn replace_members_overlay_at_the_offset() {
        let mut host = scene();
        let mut group = group(StickyMode::Replace);
        let a = add_member(&mut host, "a", 300.0, 40.0);
        let b = add_member(&mut host, "b", 600.0, 40.0);
        let _a = group.register(&host, a).unwrap().keep();
        let _b = group.register(&host, b).unwrap().keep();

        host.scroll_to(300.0);
        group.recompute(&mut host);
        let a_style = host.position_of("a.content").unwrap();
        assert_eq!((a_style.top, a_style.z_index), (90.0, 200));
        assert!(host.position_of("b.content").is_none());

        // b reaches the line; a is pushed up by exactly its own height.
        host.scroll_to(510.0);
        let report = group.recompute(&mut host);
        assert_eq!(report.sticky, 2);
        assert_eq!(report.total_height, 0.0);
        let a_style = host.position_of("a.content").unwrap();
        let b_style = host.position_of("b.content").unwrap();
        assert_eq!(a_style.top, 50.0);
        assert_eq!((b_style.top, b_style.z_index), (90.0, 199));
        assert!(a_style.z_index > b_style.z_index);

        host.scroll_to(530.0);
        group.recompute(&mut host);
        assert!(!group.member("a").unwrap().is_sticky());
        assert!(host.position_of("a.content").is_none());
        assert_eq!(host.position_of("b.content").unwrap().top, 90.0);
    }

    #[test]
    fn members_are_processed_in_ascending_top_order() {
        let mut host = scene();
        let mut group = group(StickyMode::Stack);
        for (id, top) in [("x", 50.0), ("y", 10.0), ("z", 30.0)] {
            let spec = add_member(&mut host, id, top, 5.0);
            group.register(&host, spec).unwrap().keep();
        }
        assert_eq!(order(&group), vec!["y", "z", "x"]);
    }

    #[test]
    fn repeated_pass_is_idempotent() {
        let mut host = scene();
        let mut group = group(StickyMode::Stack);
        let a = add_member(&mut host, "a", 300.0, 40.0);
        let b = add_member(&mut host, "b", 600.0, 40.0);
        group.register(&host, a).unwrap().keep();
        group.register(&host, b).unwrap().keep();
        host.scroll_to(500.0);

        let first = group.recompute(&mut host);
        let styles = (host.position_of("a.content"), host.position_of("b.content"));
        let mutations = host.mutations();

        let second = group.recompute(&mut host);
        assert_eq!(
            (host.position_of("a.content"), host.position_of("b.content")),
            styles
        );
        assert_eq!(host.mutations(), mutations);
        assert_eq!(second.transitions, 0);
        assert_eq!(first.total_height, second.total_height);
    }

    #[test]
    fn bounded_group_scrolled_past_releases_everything() {
        let mut host = scene().with_element("section", Rect::new(0.0, 0.0, 320.0, 600.0));
        let mut group = StickyGroup::new(
            "section",
            "section",
            GroupConfig::new().with_default_mode(StickyMode::Stack),
        );
        let a = add_member(&mut host, "a", 100.0, 40.0);
        group.register(&host, a).unwrap().keep();

        host.scroll_to(200.0);
        group.recompute(&mut host);
        assert_eq!(group.total_sticky_height(), 40.0);
        assert!(group.can_stick());

        host.scroll_to(700.0);
        let report = group.recompute(&mut host);
        assert_eq!(report.outcome, PassOutcome::Suspended);
        assert_eq!(report.transitions, 1);
        assert!(!group.can_stick());
        assert!(host.position_of("a.content").is_none());
        assert!(host.wrapper_height_of("a").is_none());
        assert_eq!(group.total_sticky_height(), 0.0);

        let report = group.recompute(&mut host);
        assert_eq!(report.outcome, PassOutcome::Skipped(SkipReason::OutOfRange));
    }

    #[test]
    fn sticky_stack_retreats_near_group_bottom() {
        let mut host = scene().with_element("section", Rect::new(0.0, 0.0, 320.0, 600.0));
        let mut group = StickyGroup::new(
            "section",
            "section",
            GroupConfig::new().with_default_mode(StickyMode::Stack),
        );
        let a = add_member(&mut host, "a", 100.0, 40.0);
        group.register(&host, a).unwrap().keep();

        host.scroll_to(200.0);
        group.recompute(&mut host);
        assert_eq!(host.position_of("a.content").unwrap().top, 0.0);

        host.scroll_to(580.0);
        let report = group.recompute(&mut host);
        assert_eq!(report.correction, -20.0);
        assert_eq!(host.position_of("a.content").unwrap().top, -20.0);
    }

    #[test]
    fn unbounded_group_always_sticks() {
        let mut host = scene();
        let mut group = StickyGroup::new(
            "loose",
            "not-mounted",
            GroupConfig::new()
                .with_default_mode(StickyMode::Stack)
                .with_constraint(ConstraintPolicy::Unbounded),
        );
        let a = add_member(&mut host, "a", 100.0, 40.0);
        group.register(&host, a).unwrap().keep();

        host.scroll_to(1500.0);
        let report = group.recompute(&mut host);
        assert_eq!(report.outcome, PassOutcome::Committed);
        assert!(report.can_stick);
        assert_eq!(report.correction, 0.0);
        assert_eq!(host.position_of("a.content").unwrap().top, 0.0);
    }

    #[test]
    fn missing_reference_skips_the_pass() {
        let mut host = scene();
        let mut group = StickyGroup::new(
            "g",
            "page",
            GroupConfig::new().with_reference(ReferenceContainer::Element("gone".into())),
        );
        let a = add_member(&mut host, "a", 0.0, 10.0);
        group.register(&host, a).unwrap().keep();

        let report = group.recompute(&mut host);
        assert_eq!(
            report.outcome,
            PassOutcome::Skipped(SkipReason::MissingReference)
        );
        assert_eq!(host.mutations(), 0);
    }

    #[test]
    fn viewport_reference_measures_the_viewport() {
        let mut host = scene();
        let mut group = StickyGroup::new(
            "g",
            "not-mounted",
            GroupConfig::new().with_reference(ReferenceContainer::Viewport),
        );
        let a = add_member(&mut host, "a", 100.0, 10.0);
        group.register(&host, a).unwrap().keep();
        host.scroll_to(150.0);

        let report = group.recompute(&mut host);
        assert_eq!(report.outcome, PassOutcome::Committed);
        assert_eq!(report.sticky, 1);
    }

    #[test]
    fn dropped_registration_detaches_on_next_pass() {
        let mut host = scene();
        let mut group = group(StickyMode::Stack);
        let a = add_member(&mut host, "a", 300.0, 40.0);
        let registration = group.register(&host, a).unwrap();
        host.scroll_to(500.0);
        group.run_pending(&mut host);
        assert_eq!(group.total_sticky_height(), 40.0);

        drop(registration);
        assert_eq!(group.members().len(), 1);
        assert!(group.has_pending_pass());

        group.run_pending(&mut host);
        assert!(group.members().is_empty());
        assert!(host.position_of("a.content").is_none());
        assert_eq!(group.total_sticky_height(), 0.0);
    }

    #[test]
    fn stale_registration_does_not_remove_a_re_registered_member() {
        let mut host = scene();
        let mut group = group(StickyMode::Stack);
        let spec = add_member(&mut host, "a", 300.0, 40.0);
        let first = group.register(&host, spec.clone()).unwrap();
        let id = first.id().to_string();
        group.unregister(&mut host, &id).unwrap();
        let second = group.register(&host, spec).unwrap();

        drop(first);
        group.run_pending(&mut host);
        assert_eq!(order(&group), vec!["a"]);
        assert_eq!(second.keep(), "a");
    }

    #[test]
    fn duplicate_and_unknown_members_are_rejected() {
        let mut host = scene();
        let mut group = group(StickyMode::Stack);
        let spec = add_member(&mut host, "a", 300.0, 40.0);
        group.register(&host, spec.clone()).unwrap().keep();

        assert!(matches!(
            group.register(&host, spec),
            Err(StickyError::DuplicateMember(id)) if id == "a"
        ));
        assert!(matches!(
            group.unregister(&mut host, "nope"),
            Err(StickyError::MemberNotFound(_))
        ));
        assert!(group.set_member_mode("nope", None).is_err());
    }

    #[test]
    fn passes_coalesce_per_frame() {
        let mut host = scene();
        let mut group = group(StickyMode::Stack);
        let metrics = Arc::new(Mutex::new(StickyMetrics::new()));
        group.set_metrics(Some(Arc::clone(&metrics)));

        assert!(group.request_pass());
        assert!(!group.request_pass());
        group.set_fixed_offset_top(10.0);

        assert!(group.run_pending(&mut host).is_some());
        assert!(group.run_pending(&mut host).is_none());
        let snapshot = metrics.lock().unwrap().snapshot(std::time::Duration::ZERO);
        assert_eq!(snapshot.passes, 1);
        assert_eq!(snapshot.absorbed_requests, 2);
    }

    #[test]
    fn directly_built_config_still_honours_the_z_floor() {
        let mut host = scene();
        let config = GroupConfig {
            fixed_offset_top: f32::NAN,
            base_z_index: 0,
            default_mode: StickyMode::Stack,
            ..GroupConfig::default()
        };
        let mut group = StickyGroup::new("main", "page", config);
        assert_eq!(group.config().base_z_index, MIN_BASE_Z_INDEX);
        assert_eq!(group.config().fixed_offset_top, 0.0);

        let a = add_member(&mut host, "a", 300.0, 40.0);
        group.register(&host, a).unwrap().keep();
        host.scroll_to(500.0);
        group.recompute(&mut host);
        let style = host.position_of("a.content").unwrap();
        assert_eq!((style.top, style.z_index), (0.0, MIN_BASE_Z_INDEX));

        let mut config = group.config().clone();
        config.base_z_index = -7;
        group.set_config(config);
        assert_eq!(group.config().base_z_index, MIN_BASE_Z_INDEX);
        group.recompute(&mut host);
        assert_eq!(host.position_of("a.content").unwrap().z_index, MIN_BASE_Z_INDEX);
    }

    #[test]
    fn unmeasured_wrapper_keeps_state_for_the_pass() {
        let mut host = scene();
        let sink = MemorySink::new();
        let mut group = group(StickyMode::Stack).with_logger(Logger::new(sink.clone()));
        let a = add_member(&mut host, "a", 300.0, 40.0);
        let b = add_member(&mut host, "b", 600.0, 40.0);
        group.register(&host, a).unwrap().keep();
        group.register(&host, b).unwrap().keep();
        host.scroll_to(700.0);
        group.recompute(&mut host);
        assert_eq!(host.position_of("b.content").unwrap().top, 130.0);

        host.remove("a");
        host.set_height("b.content", 50.0);
        host.scroll_to(710.0);
        let report = group.recompute(&mut host);
        assert_eq!(report.outcome, PassOutcome::Committed);

        let a = group.member("a").unwrap();
        assert!(a.is_sticky());
        assert_eq!(a.contributed_height(), 40.0);
        assert_eq!(host.position_of("a.content").unwrap().top, 90.0);
        assert_eq!(host.position_of("b.content").unwrap().top, 130.0);
        assert_eq!(host.wrapper_height_of("b"), Some(50.0));
        assert_eq!(group.total_sticky_height(), 90.0);

        let events = sink.events();
        let skipped = events
            .iter()
            .find(|event| event.message == "member_unmeasured")
            .unwrap();
        assert_eq!(skipped.field("member"), Some(&json!("a")));
    }

    #[test]
    fn replace_member_is_pushed_past_an_unmeasured_successor() {
        let mut host = scene();
        let mut group = group(StickyMode::Replace);
        let a = add_member(&mut host, "a", 300.0, 40.0);
        let b = add_member(&mut host, "b", 450.0, 40.0);
        let c = add_member(&mut host, "c", 600.0, 40.0);
        group.register(&host, a).unwrap().keep();
        group.register(&host, b).unwrap().keep();
        group.register(&host, c).unwrap().keep();
        assert_eq!(order(&group), vec!["a", "b", "c"]);

        host.remove("b");
        host.scroll_to(500.0);
        group.recompute(&mut host);
        assert_eq!(host.position_of("a.content").unwrap().top, 60.0);
        assert!(host.position_of("b.content").is_none());
        assert!(host.position_of("c.content").is_none());
    }

    #[test]
    fn height_listener_runs_on_flush_only() {
        let mut host = scene();
        let mut group = group(StickyMode::Stack);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        group.on_height_change(move |total| sink.lock().unwrap().push(total));

        let a = add_member(&mut host, "a", 300.0, 40.0);
        let b = add_member(&mut host, "b", 600.0, 40.0);
        group.register(&host, a).unwrap().keep();
        group.register(&host, b).unwrap().keep();
        host.scroll_to(500.0);
        group.recompute(&mut host);
        assert!(seen.lock().unwrap().is_empty());

        assert_eq!(group.flush_height_notification(), Some(80.0));
        assert_eq!(group.flush_height_notification(), None);

        host.scroll_to(0.0);
        group.recompute(&mut host);
        group.flush_height_notification();
        assert_eq!(*seen.lock().unwrap(), vec![80.0, 0.0]);
    }

    #[test]
    fn switching_member_to_none_parks_it() {
        let mut host = scene();
        let mut group = group(StickyMode::Stack);
        let a = add_member(&mut host, "a", 300.0, 40.0);
        let b = add_member(&mut host, "b", 600.0, 40.0);
        group.register(&host, a).unwrap().keep();
        group.register(&host, b).unwrap().keep();
        host.scroll_to(520.0);
        group.recompute(&mut host);

        group.set_member_mode("a", Some(StickyMode::None)).unwrap();
        group.run_pending(&mut host);
        assert_eq!(order(&group), vec!["b"]);
        assert_eq!(group.dormant_members().len(), 1);
        assert!(host.position_of("a.content").is_none());
        assert_eq!(host.position_of("b.content").unwrap().top, 90.0);
        assert_eq!(group.total_sticky_height(), 40.0);

        group.set_member_mode("a", None).unwrap();
        group.run_pending(&mut host);
        assert_eq!(order(&group), vec!["a", "b"]);
    }

    #[test]
    fn default_mode_change_restyles_members() {
        let mut host = scene();
        let mut group = group(StickyMode::Stack);
        let a = add_member(&mut host, "a", 300.0, 40.0);
        let b = add_member(&mut host, "b", 600.0, 40.0);
        group.register(&host, a).unwrap().keep();
        group.register(&host, b.with_mode(StickyMode::Stack)).unwrap().keep();
        host.scroll_to(300.0);
        group.recompute(&mut host);
        assert_eq!(group.total_sticky_height(), 40.0);

        group.set_default_mode(StickyMode::Replace);
        group.run_pending(&mut host);
        assert_eq!(group.member("a").unwrap().mode(), StickyMode::Replace);
        assert_eq!(group.member("b").unwrap().mode(), StickyMode::Stack);
        assert_eq!(group.total_sticky_height(), 0.0);
        assert_eq!(host.position_of("a.content").unwrap().z_index, 200);
    }

    #[test]
    fn unmount_restores_flow_and_stops_scheduling() {
        let mut host = scene();
        let mut group = group(StickyMode::Stack);
        let a = add_member(&mut host, "a", 300.0, 40.0);
        let registration = group.register(&host, a).unwrap();
        host.scroll_to(500.0);
        group.run_pending(&mut host);

        group.unmount(&mut host);
        drop(registration);
        assert!(host.position_of("a.content").is_none());
        assert!(!group.request_pass());
        assert!(group.run_pending(&mut host).is_none());
        assert_eq!(
            group.recompute(&mut host).outcome,
            PassOutcome::Skipped(SkipReason::Cancelled)
        );
    }

    #[test]
    fn pass_logs_carry_group_id() {
        let mut host = scene();
        let sink = MemorySink::new();
        let mut group = group(StickyMode::Stack).with_logger(Logger::new(sink.clone()));
        let a = add_member(&mut host, "a", 300.0, 40.0);
        group.register(&host, a).unwrap().keep();
        host.scroll_to(500.0);
        group.recompute(&mut host);

        let events = sink.events();
        let committed = events
            .iter()
            .find(|event| event.message == "pass_committed")
            .unwrap();
        assert_eq!(committed.target, LOG_TARGET);
        assert_eq!(committed.field("group"), Some(&json!("main")));
        assert_eq!(committed.field("transitions"), Some(&json!(1)));
    }
}

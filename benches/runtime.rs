use std::time::Duration;

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use sticky_room::{
    GroupConfig, LifecycleLoggerPlugin, Logger, MemberSpec, MetricsSnapshotPlugin, NullSink, Rect,
    Result, RuntimeEvent, SceneHost, ScrollSource, Size, StickyMode, StickyRuntime,
};

const SECTIONS: usize = 12;
const HEADERS_PER_SECTION: usize = 6;
const SECTION_HEIGHT: f32 = 900.0;

fn runtime_scroll_script(c: &mut Criterion) {
    let script = scroll_events(400, 7.5);
    c.bench_function("runtime_scroll_script", |b| {
        b.iter(|| {
            let mut runtime = build_runtime(StickyMode::Stack).expect("runtime");
            replay(&mut runtime, black_box(&script)).expect("scripted run");
        });
    });
}

fn runtime_replace_script(c: &mut Criterion) {
    let script = scroll_events(400, 7.5);
    c.bench_function("runtime_replace_script", |b| {
        b.iter(|| {
            let mut runtime = build_runtime(StickyMode::Replace).expect("runtime");
            replay(&mut runtime, black_box(&script)).expect("scripted run");
        });
    });
}

fn replay(runtime: &mut StickyRuntime<SceneHost>, script: &[f32]) -> Result<()> {
    for &dy in script {
        runtime.host_mut().scroll_by(dy);
        runtime.dispatch(RuntimeEvent::Scroll(ScrollSource::Viewport))?;
        runtime.dispatch(RuntimeEvent::Frame)?;
        runtime.dispatch(RuntimeEvent::Tick)?;
    }
    runtime.settle()?;
    Ok(())
}

fn build_runtime(mode: StickyMode) -> Result<StickyRuntime<SceneHost>> {
    let page_height = SECTIONS as f32 * SECTION_HEIGHT + 60.0;
    let mut host = SceneHost::new(Size::new(800.0, 600.0))
        .with_element("page", Rect::new(0.0, 0.0, 800.0, page_height))
        .with_element("masthead", Rect::new(0.0, 0.0, 800.0, 60.0))
        .with_element("masthead.content", Rect::new(0.0, 0.0, 800.0, 60.0));

    let mut sections = Vec::with_capacity(SECTIONS);
    for section in 0..SECTIONS {
        let top = 60.0 + section as f32 * SECTION_HEIGHT;
        let id = format!("section-{section}");
        host.insert(id.clone(), Rect::new(0.0, top, 800.0, SECTION_HEIGHT));
        let mut members = Vec::with_capacity(HEADERS_PER_SECTION);
        for header in 0..HEADERS_PER_SECTION {
            let header_top = top + header as f32 * 140.0;
            let wrapper = format!("{id}.h{header}");
            let content = format!("{wrapper}.content");
            host.insert(wrapper.clone(), Rect::new(0.0, header_top, 800.0, 24.0));
            host.insert(content.clone(), Rect::new(0.0, header_top, 800.0, 24.0));
            members.push(MemberSpec::new(wrapper, content));
        }
        sections.push((id, members));
    }
    let mut runtime = StickyRuntime::new(host);
    let logger = Logger::new(NullSink);
    let metrics_handle = {
        let config = runtime.config_mut();
        config.logger = Some(logger.clone());
        config.metrics_interval = Duration::from_millis(0);
        config.enable_metrics();
        config.metrics_handle().expect("metrics handle")
    };
    runtime.register_plugin(LifecycleLoggerPlugin::new(logger.clone()).log_heights(false));
    runtime.register_plugin(
        MetricsSnapshotPlugin::new(logger, metrics_handle).with_interval(Duration::from_millis(250)),
    );

    runtime.mount_group(
        "page",
        "page",
        GroupConfig::new().with_default_mode(StickyMode::Stack),
    )?;
    runtime
        .register_member("page", MemberSpec::new("masthead", "masthead.content"))?
        .keep();
    for (id, members) in sections {
        runtime.mount_group(id.clone(), id.clone(), GroupConfig::new().with_default_mode(mode))?;
        runtime.nest("page", &id, 0.0)?;
        for spec in members {
            runtime.register_member(&id, spec)?.keep();
        }
    }
    runtime.settle()?;
    Ok(runtime)
}

fn scroll_events(count: usize, step: f32) -> Vec<f32> {
    (0..count)
        .map(|i| if i % 50 == 49 { -step * 10.0 } else { step * 4.0 })
        .collect()
}

criterion_group!(benches, runtime_scroll_script, runtime_replace_script);
criterion_main!(benches);

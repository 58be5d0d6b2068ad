use std::sync::Arc;

use sticky_room::{
    BufferedAudit, FileSink, GroupConfig, LifecycleLoggerPlugin, Logger, MemberSpec, Rect,
    SceneHost, Size, StickyMode, StickyRuntime, TerminalDriver,
};

const SECTIONS: usize = 4;
const HEADERS_PER_SECTION: usize = 3;
const SECTION_ROWS: f32 = 36.0;
const LOG_PATH: &str = "terminal_sticky.log";

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let page_rows = 1.0 + SECTIONS as f32 * SECTION_ROWS;
    let mut host = SceneHost::new(Size::new(80.0, 24.0))
        .with_element("page", Rect::new(0.0, 0.0, 80.0, page_rows))
        .with_element("masthead", Rect::new(0.0, 0.0, 80.0, 1.0))
        .with_element("masthead.content", Rect::new(0.0, 0.0, 80.0, 1.0));

    let mut sections = Vec::new();
    for section in 0..SECTIONS {
        let top = 1.0 + section as f32 * SECTION_ROWS;
        let id = format!("s{section}");
        host.insert(id.clone(), Rect::new(0.0, top, 80.0, SECTION_ROWS));
        let mut members = Vec::new();
        for header in 0..HEADERS_PER_SECTION {
            let wrapper = format!("{id}h{header}");
            let content = format!("{wrapper}.content");
            let header_top = top + header as f32 * 12.0;
            host.insert(wrapper.clone(), Rect::new(0.0, header_top, 80.0, 1.0));
            host.insert(content.clone(), Rect::new(0.0, header_top, 80.0, 1.0));
            members.push(MemberSpec::new(wrapper, content));
        }
        sections.push((id, members));
    }

    let logger = Logger::new(FileSink::new(LOG_PATH, 1 << 20)?);
    let audit = BufferedAudit::new();
    let mut runtime = StickyRuntime::new(host);
    {
        let config = runtime.config_mut();
        config.logger = Some(logger.clone());
        config.audit = Arc::new(audit.clone());
    }
    runtime.register_plugin(LifecycleLoggerPlugin::new(logger));

    // Status line occupies row 0, so the page pins below it.
    runtime.mount_group(
        "page",
        "page",
        GroupConfig::new()
            .with_offset_top(1.0)
            .with_default_mode(StickyMode::Stack),
    )?;
    runtime
        .register_member("page", MemberSpec::new("masthead", "masthead.content"))?
        .keep();
    for (id, members) in sections {
        runtime.mount_group(id.clone(), id.clone(), GroupConfig::new())?;
        runtime.nest("page", &id, 1.0)?;
        for spec in members {
            runtime.register_member(&id, spec)?.keep();
        }
    }

    let runtime = TerminalDriver::new(runtime).run()?;
    println!(
        "scrolled to {:.0}; {} audit events, log at {LOG_PATH}",
        runtime.host().scroll_top(),
        audit.events().len()
    );
    Ok(())
}

//! Tracing setup for agent binaries.
//!
//! The library itself only emits `tracing` events; binaries that want
//! readable output can install the level-colorized subscriber here.
//! Filtering honors `RUST_LOG` through the env-filter.

use colored::Colorize;
use std::fmt;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

/// Colors each event line by its level, with no timestamp or level
/// prefix; meant for user-facing agent output rather than structured
/// log collection.
pub struct LevelColorFormatter;

impl<S, N> FormatEvent<S, N> for LevelColorFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        // Buffer the fields so the color covers the whole line.
        let mut buffer = String::new();
        let mut buf_writer = Writer::new(&mut buffer);
        ctx.format_fields(buf_writer.by_ref(), event)?;

        let colored = match *event.metadata().level() {
            Level::ERROR => buffer.red(),
            Level::WARN => buffer.yellow(),
            Level::INFO => buffer.white(),
            Level::DEBUG => buffer.blue(),
            Level::TRACE => buffer.purple(),
        };
        writeln!(writer, "{}", colored)
    }
}

/// Install the colorized subscriber with the given default filter
/// (overridable via `RUST_LOG`). Returns an error message when a
/// global subscriber is already set.
pub fn init(default_filter: &str) -> Result<(), String> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .event_format(LevelColorFormatter)
        .try_init()
        .map_err(|e| e.to_string())
}

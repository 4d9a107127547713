use chrono::Local;
use nu_ansi_term::{Color, Style};
use std::fmt;
use tracing::{Event, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{format::Writer, FmtContext, FormatEvent, FormatFields},
    prelude::*,
    registry::LookupSpan,
    EnvFilter, Layer,
};

/// Default console directives; `RUST_LOG` replaces them when set.
const CONSOLE_DIRECTIVES: &str = "error,entity_result=info,batch=info";

pub fn setup_logger() -> Option<WorkerGuard> {
    // Create logs directory
    std::fs::create_dir_all("logs").ok();

    let file_appender = tracing_appender::rolling::hourly("logs", "app");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // File layer: INFO for run/entity results, WARN for others
    let file_filter = tracing_subscriber::filter::Targets::new()
        .with_target("entity_result", tracing::Level::INFO)
        .with_target("batch", tracing::Level::INFO)
        .with_default(tracing::Level::WARN);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .event_format(FileFormatter)
        .with_filter(file_filter);

    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(CONSOLE_DIRECTIVES));

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_ansi(true)
        .event_format(TerminalFormatter)
        .with_filter(console_filter);

    // try_init: a second call (tests, embedded use) keeps the first subscriber
    let installed = tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .is_ok();

    // Guard MUST be kept alive by caller
    installed.then_some(guard)
}

// --- Formatters ---

struct MessageVisitor {
    message: String,
}

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        }
    }
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        }
    }
}

fn event_message(event: &Event<'_>) -> String {
    let mut msg_visitor = MessageVisitor {
        message: String::new(),
    };
    event.record(&mut msg_visitor);
    msg_visitor.message
}

fn colorize(msg: String) -> String {
    let keywords = [
        ("SUCCESS", Color::LightGreen),
        ("SKIPPED", Color::LightYellow),
        ("FAILED", Color::LightRed),
    ];

    for (word, color) in keywords {
        if msg.contains(word) {
            let styled = Style::new().fg(color).bold().paint(word).to_string();
            return msg.replace(word, &styled);
        }
    }
    msg
}

pub struct TerminalFormatter;

impl<S, N> FormatEvent<S, N> for TerminalFormatter
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
        let timestamp = Local::now().format("%H:%M:%S");
        let dimmed = Style::new().dimmed();
        write!(writer, "{} ", dimmed.paint(timestamp.to_string()))?;

        if let Some(span) = ctx.lookup_current() {
            if let Some(fields) = span.extensions().get::<tracing_subscriber::fmt::FormattedFields<N>>() {
                if !fields.is_empty() {
                    write!(writer, "{} ", dimmed.paint(format!("[{}]", fields)))?;
                }
            }
        }

        writeln!(writer, "{}", colorize(event_message(event)))
    }
}

pub struct FileFormatter;

impl<S, N> FormatEvent<S, N> for FileFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        let level = event.metadata().level();

        write!(writer, "{} [{}] ", timestamp, level)?;
        writeln!(writer, "{}", event_message(event))
    }
}

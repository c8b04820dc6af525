use crate::utils::ui::Ui;
use chrono::Local;
use owo_colors::OwoColorize;
use std::fmt::Write;
use std::sync::Arc;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// Tracing layer that writes log lines through the [`Ui`], so they land
/// above the prompt instead of garbling the line being edited.
pub struct UiLayer {
    ui: Arc<Ui>,
}

impl UiLayer {
    pub fn new(ui: Arc<Ui>) -> Self {
        UiLayer { ui }
    }
}

fn colorize_level(level: &Level) -> String {
    match *level {
        Level::ERROR => level.to_string().bright_red().to_string(),
        Level::WARN => level.to_string().yellow().to_string(),
        Level::INFO => level.to_string().green().to_string(),
        Level::DEBUG => level.to_string().bright_blue().to_string(),
        Level::TRACE => level.to_string().dimmed().to_string(),
    }
}

/// `timestamp LEVEL [target] message key=value...`
pub fn format_event(
    level: &Level,
    target: &str,
    message: &str,
    fields: &str,
    colored: bool,
) -> String {
    let timestamp = Local::now().format("%H:%M:%S%.3f").to_string();
    let mut line = if colored {
        format!(
            "{} {} [{}] {}",
            timestamp.dimmed(),
            colorize_level(level),
            target.cyan(),
            message
        )
    } else {
        format!("{timestamp} {level} [{target}] {message}")
    };
    if !fields.is_empty() {
        line.push_str(fields);
    }
    line
}

impl<S> Layer<S> for UiLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = EventVisitor::default();
        event.record(&mut visitor);

        let metadata = event.metadata();
        let line = format_event(
            metadata.level(),
            metadata.target(),
            &visitor.message,
            &visitor.fields,
            self.ui.colored(),
        );

        match *metadata.level() {
            Level::ERROR | Level::WARN => self.ui.eprintln(&line),
            _ => self.ui.println(&line),
        }
    }
}

/// Collects the `message` field and renders the others as ` key=value`.
#[derive(Default)]
struct EventVisitor {
    message: String,
    fields: String,
}

impl EventVisitor {
    fn record(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }
}

impl tracing::field::Visit for EventVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        let debug_str = format!("{value:?}");
        // Plain strings arrive here quoted
        let trimmed = debug_str
            .strip_prefix('"')
            .and_then(|s| s.strip_suffix('"'))
            .unwrap_or(&debug_str);
        self.record(field, trimmed);
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.record(field, value);
    }

    fn record_error(
        &mut self,
        field: &tracing::field::Field,
        value: &(dyn std::error::Error + 'static),
    ) {
        self.record(field, &value.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::prelude::*;

    #[test]
    fn test_events_reach_the_ui() {
        let ui = Arc::new(Ui::capturing());
        let subscriber = tracing_subscriber::registry().with(UiLayer::new(ui.clone()));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(channel = "room1", "Joined channel");
            tracing::warn!("Realtime send failed: {}", "closed");
        });

        let lines = ui.captured();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains(" INFO ["));
        assert!(lines[0].ends_with("Joined channel channel=room1"));
        assert!(lines[1].ends_with("Realtime send failed: closed"));
    }

    #[test]
    fn test_plain_format() {
        let line = format_event(&Level::DEBUG, "supalab::repl", "hello", "", false);
        assert!(line.ends_with(" DEBUG [supalab::repl] hello"));
    }
}

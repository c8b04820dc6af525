//! The read-eval-print loop.
//!
//! reedline blocks while reading, so the editor lives on its own thread and
//! the async side asks it for one line at a time. While a line is being
//! read, everything printed through the [`Ui`](crate::utils::ui::Ui) goes
//! through reedline's external printer and shows up above the prompt.

use anyhow::Result;
use reedline::{
    ExternalPrinter, FileBackedHistory, Prompt, PromptEditMode, PromptHistorySearch,
    PromptHistorySearchStatus, Reedline, Signal,
};
use std::borrow::Cow;
use std::path::PathBuf;
use std::sync::mpsc;
use supalab_core::utils::args::{split_command, substitute_dot_references};
use supalab_core::utils::format::error_line;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::commands::{debug::debug, dev::dev, session};
use crate::context::AppContext;
use crate::utils::ui::PRINTER_CAPACITY;

pub const EDITOR_THREAD: &str = "supalab-editor";
pub const HISTORY_SIZE: usize = 1000;

pub const USAGE: [&str; 4] = ["   login", "   logout", "   exit", "   print [text]"];

#[derive(Debug, Clone, PartialEq)]
pub enum LineEvent {
    Line(String),
    Interrupted,
    Eof,
    Failed(String),
}

struct LabPrompt(String);

impl Prompt for LabPrompt {
    fn render_prompt_left(&self) -> Cow<str> {
        Cow::Borrowed(&self.0)
    }

    fn render_prompt_right(&self) -> Cow<str> {
        Cow::Borrowed("")
    }

    fn render_prompt_indicator(&self, _edit_mode: PromptEditMode) -> Cow<str> {
        Cow::Borrowed("")
    }

    fn render_prompt_multiline_indicator(&self) -> Cow<str> {
        Cow::Borrowed("")
    }

    fn render_prompt_history_search_indicator(
        &self,
        history_search: PromptHistorySearch,
    ) -> Cow<str> {
        let prefix = match history_search.status {
            PromptHistorySearchStatus::Passing => "",
            PromptHistorySearchStatus::Failing => "failing ",
        };
        Cow::Owned(format!(
            "({}reverse-search: {}) ",
            prefix, history_search.term
        ))
    }
}

struct ReadRequest {
    prompt: String,
    reply: oneshot::Sender<LineEvent>,
}

/// Handle to the editor thread. Dropping it ends the thread once the
/// current line is read.
pub struct LineEditor {
    requests: mpsc::Sender<ReadRequest>,
}

impl LineEditor {
    /// Start the editor thread. History is kept in `history_file` when
    /// given, in memory otherwise.
    pub fn spawn(app_context: &AppContext, history_file: Option<PathBuf>) -> Result<Self> {
        let (requests, incoming) = mpsc::channel::<ReadRequest>();
        let printer = ExternalPrinter::new(PRINTER_CAPACITY);
        let ui = app_context.ui().clone();
        ui.attach_printer(printer.clone());

        std::thread::Builder::new()
            .name(EDITOR_THREAD.to_string())
            .spawn(move || {
                let mut editor = Reedline::create().with_external_printer(printer);
                if let Some(path) = history_file {
                    match FileBackedHistory::with_file(HISTORY_SIZE, path.clone()) {
                        Ok(history) => editor = editor.with_history(Box::new(history)),
                        Err(e) => warn!("Cannot use history file {}: {}", path.display(), e),
                    }
                }

                while let Ok(request) = incoming.recv() {
                    let prompt = LabPrompt(request.prompt);
                    ui.set_reading(true);
                    let event = match editor.read_line(&prompt) {
                        Ok(Signal::Success(line)) => LineEvent::Line(line),
                        Ok(Signal::CtrlC) => LineEvent::Interrupted,
                        Ok(Signal::CtrlD) => LineEvent::Eof,
                        Err(e) => LineEvent::Failed(e.to_string()),
                    };
                    ui.set_reading(false);
                    if request.reply.send(event).is_err() {
                        break;
                    }
                }
                ui.detach_printer();
                debug!("Editor thread finished");
            })?;
        app_context.register_thread(EDITOR_THREAD);

        Ok(Self { requests })
    }

    pub async fn read_line(&self, prompt: String) -> LineEvent {
        let (reply, answer) = oneshot::channel();
        if self.requests.send(ReadRequest { prompt, reply }).is_err() {
            return LineEvent::Eof;
        }
        answer.await.unwrap_or(LineEvent::Eof)
    }
}

/// Read and run lines until `exit`, Ctrl-C or Ctrl-D.
pub async fn run(app_context: &AppContext, editor: &LineEditor) {
    while app_context.is_running() {
        match editor.read_line(app_context.prompt()).await {
            LineEvent::Line(line) => process_line(app_context, &line).await,
            LineEvent::Interrupted | LineEvent::Eof => {
                session::exit_completely(app_context, true).await
            }
            LineEvent::Failed(e) => {
                app_context.ui().println(error_line(e));
                session::exit_completely(app_context, true).await;
            }
        }
    }
}

/// Run one input line. Handler errors are printed, never returned.
///
/// The line is split as typed: leading whitespace makes the command empty
/// and trailing whitespace stays in the arguments.
pub async fn process_line(app_context: &AppContext, line: &str) {
    let line = {
        let state = app_context.state();
        substitute_dot_references(line, &state.config)
    };
    let (command, args) = split_command(&line);

    match command {
        "" => {}
        "login" => {
            if let Err(e) = session::login(app_context).await {
                app_context.handle_error("sign_in()", &e, false);
            }
        }
        "exit" => session::exit_completely(app_context, false).await,
        "print" => session::print(app_context, args),
        "logout" => {
            if let Err(e) = session::sign_out(app_context).await {
                app_context.handle_error("sign_out()", &e, false);
            }
        }
        "debug" => {
            if let Err(e) = debug(app_context, args) {
                app_context.handle_error("debug()", &e, false);
            }
        }
        "dev" => {
            if let Err(e) = dev(app_context, args).await {
                app_context.handle_error("dev()", &e, false);
            }
        }
        other => {
            let ui = app_context.ui();
            ui.println(format!("{other}?"));
            ui.print_lines(USAGE);
        }
    }

    session::check_session(app_context).await;
}

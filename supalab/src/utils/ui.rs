use reedline::ExternalPrinter;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};

/// Capacity of the queue feeding lines to the editor while it waits for
/// input.
pub const PRINTER_CAPACITY: usize = 1024;

/// Terminal output shared by the REPL, background tasks and the tracing
/// layer.
///
/// While the line editor is reading, lines go through its external printer
/// so they appear above the prompt instead of inside it. Otherwise they are
/// written directly.
pub struct Ui {
    printer: RwLock<Option<ExternalPrinter<String>>>,
    reading: AtomicBool,
    captured: Option<Mutex<Vec<String>>>,
    colored: bool,
}

impl Default for Ui {
    fn default() -> Self {
        Self::new()
    }
}

impl Ui {
    pub fn new() -> Self {
        Self {
            printer: RwLock::new(None),
            reading: AtomicBool::new(false),
            captured: None,
            colored: true,
        }
    }

    /// Keep every line in memory instead of printing it.
    pub fn capturing() -> Self {
        Self {
            captured: Some(Mutex::new(Vec::new())),
            colored: false,
            ..Self::new()
        }
    }

    pub fn colored(&self) -> bool {
        self.colored
    }

    pub fn attach_printer(&self, printer: ExternalPrinter<String>) {
        *self.printer.write().unwrap_or_else(|e| e.into_inner()) = Some(printer);
    }

    pub fn detach_printer(&self) {
        *self.printer.write().unwrap_or_else(|e| e.into_inner()) = None;
        self.set_reading(false);
    }

    /// Set by the editor thread around each `read_line`.
    pub fn set_reading(&self, reading: bool) {
        self.reading.store(reading, Ordering::SeqCst);
    }

    fn emit(&self, msg: &str, to_stderr: bool) {
        if let Some(captured) = &self.captured {
            let mut lines = captured.lock().unwrap_or_else(|e| e.into_inner());
            lines.extend(msg.split('\n').map(str::to_string));
            return;
        }
        if self.reading.load(Ordering::SeqCst) {
            let printer = self.printer.read().unwrap_or_else(|e| e.into_inner());
            if let Some(printer) = printer.as_ref() {
                if printer.print(msg.to_string()).is_ok() {
                    return;
                }
            }
        }
        if to_stderr {
            eprintln!("{msg}");
        } else {
            println!("{msg}");
        }
    }

    pub fn println(&self, msg: impl AsRef<str>) {
        self.emit(msg.as_ref(), false);
    }

    pub fn eprintln(&self, msg: impl AsRef<str>) {
        self.emit(msg.as_ref(), true);
    }

    pub fn print_lines<I, S>(&self, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for line in lines {
            self.println(line);
        }
    }

    /// Lines captured so far. Empty unless built with [`Ui::capturing`].
    pub fn captured(&self) -> Vec<String> {
        self.captured
            .as_ref()
            .map(|c| c.lock().unwrap_or_else(|e| e.into_inner()).clone())
            .unwrap_or_default()
    }

    /// Return and forget the captured lines.
    pub fn take_captured(&self) -> Vec<String> {
        self.captured
            .as_ref()
            .map(|c| std::mem::take(&mut *c.lock().unwrap_or_else(|e| e.into_inner())))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capturing_splits_lines() {
        let ui = Ui::capturing();
        ui.println("one");
        ui.eprintln("two\nthree");
        assert_eq!(ui.captured(), vec!["one", "two", "three"]);
        assert_eq!(ui.take_captured().len(), 3);
        assert!(ui.captured().is_empty());
    }

    #[test]
    fn test_lines_go_to_printer_while_reading() {
        let ui = Ui::new();
        let printer = ExternalPrinter::new(4);
        ui.attach_printer(printer.clone());
        ui.set_reading(true);
        ui.println("above the prompt");
        assert_eq!(
            printer.receiver().try_recv().ok().as_deref(),
            Some("above the prompt")
        );
    }
}

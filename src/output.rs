// ABOUTME: User-facing output for site commands.
// ABOUTME: Normal prints progress, quiet prints results only, JSON prints one event per line.

use serde::Serialize;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-friendly output with progress messages
    Normal,
    /// Results and errors only
    Quiet,
    /// JSON lines for scripting
    Json,
}

impl OutputMode {
    /// `--json` wins over `--quiet`.
    pub fn from_flags(quiet: bool, json: bool) -> Self {
        match (quiet, json) {
            (_, true) => OutputMode::Json,
            (true, false) => OutputMode::Quiet,
            (false, false) => OutputMode::Normal,
        }
    }
}

pub struct Output {
    mode: OutputMode,
    start_time: Option<Instant>,
}

impl Output {
    pub fn new(mode: OutputMode) -> Self {
        Self {
            mode,
            start_time: None,
        }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    pub fn start_timer(&mut self) {
        self.start_time = Some(Instant::now());
    }

    fn elapsed(&self) -> Option<f64> {
        self.start_time.map(|t| t.elapsed().as_secs_f64())
    }

    /// A step of a longer operation. Normal mode only.
    pub fn progress(&self, message: &str) {
        if self.mode == OutputMode::Normal {
            println!("{message}");
        }
    }

    pub fn success(&self, message: &str) {
        match self.mode {
            OutputMode::Normal => match self.elapsed() {
                Some(secs) => println!("{message} ({secs:.1}s)"),
                None => println!("{message}"),
            },
            OutputMode::Quiet => println!("{message}"),
            OutputMode::Json => self.emit(false, "success", message, None::<()>),
        }
    }

    /// Non-fatal problem; always shown, on stderr.
    pub fn warning(&self, message: &str) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => eprintln!("Warning: {message}"),
            OutputMode::Json => self.emit(true, "warning", message, None::<()>),
        }
    }

    pub fn error(&self, message: &str) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => eprintln!("Error: {message}"),
            OutputMode::Json => self.emit(true, "error", message, None::<()>),
        }
    }

    /// A result value. JSON mode wraps it in an event; other modes print
    /// `text` as is.
    pub fn record<T: Serialize>(&self, message: &str, data: &T, text: &str) {
        match self.mode {
            OutputMode::Json => self.emit(false, "result", message, Some(data)),
            OutputMode::Normal | OutputMode::Quiet => print!("{text}"),
        }
    }

    fn emit<T: Serialize>(&self, stderr: bool, event: &str, message: &str, data: Option<T>) {
        let event = JsonEvent {
            event,
            message,
            duration_secs: self.elapsed(),
            data,
        };
        if let Ok(json) = serde_json::to_string(&event) {
            if stderr {
                eprintln!("{json}");
            } else {
                println!("{json}");
            }
        }
    }
}

#[derive(Serialize)]
struct JsonEvent<'a, T> {
    event: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_secs: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
}

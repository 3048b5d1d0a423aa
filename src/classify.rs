// src/classify.rs

//! Turns single lines of toolchain output into signals for the supervisor.
//!
//! Classification is stateless: it looks at one line, the stream it came
//! from and the configured ignore list, and returns zero or more
//! [`LineSignal`]s. All decisions about what a signal *means* for the build
//! session are made by the session core.

use crate::types::Stream;

/// Marker printed when the app fails to compile or start.
pub const APP_ERROR_MARKER: &str = "Your application has errors";
/// Marker printed when the dev server cannot bind its port.
pub const PORT_CONFLICT_MARKER: &str = "Can't listen on port";
/// Marker printed once the dev server is serving.
pub const SERVER_UP_MARKER: &str = "App running at";

/// Stderr noise the toolchain prints on healthy builds.
const BENIGN_STDERR: &[&str] = &[
    // warning about running with --production
    "--production",
    // bundle size warning
    "Output exceeds ",
    "Node#moveTo",
    "Browserslist",
];

/// Build progress reported on stdout. Percentages are only for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Milestone(u8),
    /// Something is still being built; re-arms the progress message timer.
    Heartbeat,
}

const PROGRESS_MARKERS: &[(&str, Progress)] = &[
    ("Started proxy", Progress::Milestone(10)),
    ("Started MongoDB", Progress::Milestone(60)),
    ("Preparing Cordova project", Progress::Heartbeat),
];

/// What a single output line means to the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineSignal {
    Progress(Progress),
    /// The toolchain reported the application itself as broken.
    AppError,
    /// Unrecognised stderr output.
    GenericError,
    PortConflict,
    ServerUp,
}

/// Marker rule, optionally scoped to one stream. Every matching rule
/// contributes its signal.
struct Rule {
    stream: Option<Stream>,
    test: fn(&str) -> bool,
    signal: LineSignal,
}

const RULES: &[Rule] = &[
    Rule {
        stream: Some(Stream::Stdout),
        test: is_port_conflict,
        signal: LineSignal::PortConflict,
    },
    Rule {
        stream: Some(Stream::Stdout),
        test: is_server_up,
        signal: LineSignal::ServerUp,
    },
    Rule {
        stream: None,
        test: is_app_error,
        signal: LineSignal::AppError,
    },
];

fn is_port_conflict(line: &str) -> bool {
    line.contains(PORT_CONFLICT_MARKER)
}

fn is_server_up(line: &str) -> bool {
    line.contains(SERVER_UP_MARKER)
}

fn is_app_error(line: &str) -> bool {
    line.contains(APP_ERROR_MARKER)
}

#[derive(Debug, Clone, Default)]
pub struct OutputClassifier {
    ignore_stderr: Vec<String>,
}

impl OutputClassifier {
    pub fn new(ignore_stderr: Vec<String>) -> Self {
        Self { ignore_stderr }
    }

    pub fn classify(&self, stream: Stream, line: &str) -> Vec<LineSignal> {
        let mut signals = Vec::new();

        if stream == Stream::Stdout {
            for (marker, progress) in PROGRESS_MARKERS {
                if line.contains(marker) {
                    signals.push(LineSignal::Progress(*progress));
                }
            }
        }

        for rule in RULES {
            if rule.stream.is_none_or(|s| s == stream) && (rule.test)(line) {
                signals.push(rule.signal);
            }
        }

        let already_fatal = signals.contains(&LineSignal::AppError);
        if stream == Stream::Stderr && !already_fatal && self.is_error_line(line) {
            signals.push(LineSignal::GenericError);
        }

        signals
    }

    /// Whether a stderr line counts as an error.
    pub fn is_error_line(&self, line: &str) -> bool {
        if line.trim().is_empty() {
            return false;
        }
        if BENIGN_STDERR.iter().any(|benign| line.contains(benign)) {
            return false;
        }
        !self
            .ignore_stderr
            .iter()
            .any(|ignored| !ignored.is_empty() && line.contains(ignored.as_str()))
    }
}

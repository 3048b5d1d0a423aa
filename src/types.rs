use std::fmt;

/// How the `web.cordova` artifacts are obtained from the toolchain.
///
/// - `FromArtifactDirectory`: poll the toolchain's cordova build directory
///   on disk until a fresh `index.html` + `program.json` pair shows up.
/// - `FromRunningServer`: wait for the dev server to come up and fetch both
///   documents over HTTP from its debug endpoint.
///
/// Chosen once per build and never changed afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    FromArtifactDirectory,
    FromRunningServer,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::FromArtifactDirectory => f.write_str("from-artifact-directory"),
            Strategy::FromRunningServer => f.write_str("from-running-server"),
        }
    }
}

/// The single terminal outcome of a build session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeReason {
    Success,
    Timeout,
    ErrorOutput,
    AppError,
    PortConflict,
    UnexpectedExit,
    CopyFailure,
}

impl OutcomeReason {
    pub fn is_success(self) -> bool {
        matches!(self, OutcomeReason::Success)
    }

    /// Whether the captured toolchain transcript is written to disk when the
    /// session ends with this reason.
    pub fn persists_log(self) -> bool {
        !self.is_success()
    }

    /// Human readable explanation shown to the user when a build fails.
    pub fn describe(self, port: u16) -> String {
        match self {
            OutcomeReason::Success => "the web.cordova build was harvested".to_string(),
            OutcomeReason::Timeout => {
                "the toolchain did not produce a build before the timeout".to_string()
            }
            OutcomeReason::ErrorOutput => {
                "the toolchain printed errors; see the build log for details".to_string()
            }
            OutcomeReason::AppError => {
                "your application has errors; fix them and run the build again".to_string()
            }
            OutcomeReason::PortConflict => format!(
                "the toolchain could not listen on port {port}; free it or choose another port"
            ),
            OutcomeReason::UnexpectedExit => {
                "the toolchain exited before the build was ready".to_string()
            }
            OutcomeReason::CopyFailure => {
                "the build was ready but copying it into the desktop app failed".to_string()
            }
        }
    }
}

impl fmt::Display for OutcomeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OutcomeReason::Success => "success",
            OutcomeReason::Timeout => "timeout",
            OutcomeReason::ErrorOutput => "error-output",
            OutcomeReason::AppError => "app-error",
            OutcomeReason::PortConflict => "port-conflict",
            OutcomeReason::UnexpectedExit => "unexpected-exit",
            OutcomeReason::CopyFailure => "copy-failure",
        };
        f.write_str(s)
    }
}

/// Which output stream of the toolchain a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stream {
    Stdout,
    Stderr,
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stream::Stdout => f.write_str("stdout"),
            Stream::Stderr => f.write_str("stderr"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_failures_persist_the_log() {
        assert!(!OutcomeReason::Success.persists_log());
        assert!(OutcomeReason::CopyFailure.persists_log());
        assert!(OutcomeReason::PortConflict.describe(3080).contains("3080"));
    }
}

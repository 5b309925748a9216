//! Exit status codes for the CLI
//!
//! - 0: curl (or the built-in client) succeeded
//! - 1: resolution, tunnel or request failure, or a non-zero curl exit
//! - 130: interrupted by Ctrl+C

use std::process::{ExitCode, Termination};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitStatus {
    Success = 0,
    Error = 1,
    /// Standard SIGINT code
    Interrupted = 130,
}

impl From<ExitStatus> for ExitCode {
    fn from(status: ExitStatus) -> Self {
        ExitCode::from(status as u8)
    }
}

impl Termination for ExitStatus {
    fn report(self) -> ExitCode {
        ExitCode::from(self)
    }
}

impl ExitStatus {
    /// Map a child process exit code
    ///
    /// curl's own codes are collapsed to 1; 130 is kept so an interrupted
    /// curl is reported as an interrupt.
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => ExitStatus::Success,
            130 => ExitStatus::Interrupted,
            _ => ExitStatus::Error,
        }
    }
}

//! External curl invocation
//!
//! Runs the system curl against the forwarded local URL with the user's
//! original arguments. curl is spawned directly with an argument vector, so
//! no shell is involved; [`CurlCommand::display`] renders a shell-quoted form
//! for verbose output only.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tracing::debug;

use crate::errors::KurlError;
use crate::status::ExitStatus;

/// A curl invocation against a local URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurlCommand {
    program: PathBuf,
    args: Vec<String>,
}

impl CurlCommand {
    /// The original curl arguments followed by the rewritten URL
    pub fn new(program: impl Into<PathBuf>, curl_args: &[String], local_url: &str) -> Self {
        let mut args = curl_args.to_vec();
        args.push(local_url.to_string());
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Shell-quoted command line for display
    pub fn display(&self) -> String {
        let mut parts = vec![shell_escape(&self.program.to_string_lossy())];
        parts.extend(self.args.iter().map(|arg| shell_escape(arg)));
        parts.join(" ")
    }

    /// Run curl with inherited stdio and map its exit code
    pub async fn run(&self) -> Result<ExitStatus, KurlError> {
        debug!(program = %self.program.display(), args = ?self.args, "Executing curl");

        let status = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|e| KurlError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to execute {}: {}", self.program.display(), e),
            )))?;

        debug!(code = ?status.code(), "curl exited");

        Ok(match status.code() {
            Some(0) => ExitStatus::Success,
            Some(code) => ExitStatus::from_code(code),
            // Killed by a signal
            None => ExitStatus::Error,
        })
    }
}

/// Locate the curl binary
///
/// A configured path containing a directory is used as-is; a bare name (or
/// `curl` when nothing is configured) is looked up on `PATH`. Either way the
/// file must be executable.
pub fn find_curl(configured: Option<&Path>) -> Option<PathBuf> {
    find_curl_in(configured, std::env::var_os("PATH"))
}

fn find_curl_in(configured: Option<&Path>, paths: Option<OsString>) -> Option<PathBuf> {
    let wanted = configured.unwrap_or_else(|| Path::new("curl"));
    let cwd = std::env::current_dir().unwrap_or_default();

    match which::which_in(wanted, paths, cwd) {
        Ok(path) => Some(path),
        Err(e) => {
            debug!(curl = %wanted.display(), error = %e, "curl not found");
            None
        }
    }
}

/// Whether a usable curl binary can be found
pub fn curl_available(configured: Option<&Path>) -> bool {
    find_curl(configured).is_some()
}

/// Shell-escape a string for safe inclusion in a command
fn shell_escape(s: &str) -> String {
    // Check if escaping is needed
    let needs_escaping = s.chars().any(|c| {
        matches!(c, ' ' | '\'' | '"' | '\\' | '$' | '`' | '!' | '*' | '?' |
                    '[' | ']' | '{' | '}' | '(' | ')' | '<' | '>' | '|' |
                    '&' | ';' | '#' | '~' | '\n' | '\t')
    });

    if !needs_escaping && !s.is_empty() {
        return s.to_string();
    }

    // Use single quotes and escape any single quotes within
    format!("'{}'", s.replace('\'', "'\"'\"'"))
}

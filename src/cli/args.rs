//! CLI argument definitions using clap
//!
//! kurl's own options use a `--kurl-` prefix so they never shadow a curl
//! option. Everything else, including the URL, is collected verbatim and
//! handed on to curl.

use clap::{ArgAction, Parser, ValueEnum};

/// kurl - curl for Kubernetes services, pods and workloads
#[derive(Parser, Debug, Clone)]
#[command(name = "kurl", version, about, long_about = None)]
#[command(after_help = "Example:\n  kurl -X POST -H 'Content-Type: application/json' -d '{\"key\":\"value\"}' \\\n    http://mysvc.mynamespace.svc:8080/api/resource")]
pub struct Args {
    /// Kubeconfig context to use instead of the current one
    #[arg(long = "kurl-context", value_name = "NAME", env = "KURL_CONTEXT")]
    pub context: Option<String>,

    /// Use the built-in HTTP client even when curl is installed
    #[arg(long = "kurl-builtin", action = ArgAction::SetTrue)]
    pub builtin: bool,

    /// Output format for kurl's own log messages
    #[arg(long = "kurl-log-format", value_name = "FORMAT", value_enum)]
    pub log_format: Option<LogFormat>,

    /// curl options followed by the cluster URL (http[s]://name.namespace.kind[:port]/path)
    #[arg(
        value_name = "CURL_ARGS",
        trailing_var_arg = true,
        allow_hyphen_values = true,
        num_args = 0..
    )]
    pub curl_args: Vec<String>,
}

/// Log format for kurl's diagnostics
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Plain text output (default)
    #[default]
    Text,
    /// JSON Lines format for parsing
    Json,
}

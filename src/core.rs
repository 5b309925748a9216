use std::sync::Arc;

use clap::{CommandFactory, Parser};
use tracing::debug;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cli::{Args, LogFormat, ProcessedArgs, process_args};
use crate::client::{CurlCommand, find_curl, run_fallback};
use crate::config::Config;
use crate::errors::KurlError;
use crate::k8s::{allocate_local_port, resolve_url, KubeCluster, TunnelSession};
use crate::signals;
use crate::status::ExitStatus;

/// Environment variable holding the log filter
pub const LOG_ENV: &str = "KURL_LOG";

/// Main entry point for the CLI.
///
/// Loads configuration, parses arguments and runs the request through a
/// port-forward on a fresh tokio runtime.
pub fn run(args: Vec<String>) -> ExitStatus {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: Failed to load config: {}", e);
            Config::default()
        }
    };

    let parsed = match Args::try_parse_from(&args) {
        Ok(args) => args,
        Err(e) => {
            e.print().ok();
            return if e.kind() == clap::error::ErrorKind::DisplayHelp
                || e.kind() == clap::error::ErrorKind::DisplayVersion {
                ExitStatus::Success
            } else {
                ExitStatus::Error
            };
        }
    };

    if parsed.curl_args.is_empty() {
        Args::command().print_help().ok();
        return ExitStatus::Error;
    }

    let processed = match process_args(&parsed, &config.default_options) {
        Ok(processed) => processed,
        Err(e) => return handle_error(e),
    };

    let log_format = parsed.log_format.or(config.log_format).unwrap_or_default();
    init_logging(log_format, processed.verbose);

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => return handle_error(KurlError::Io(e)),
    };

    let status = match runtime.block_on(program(&parsed, processed, &config)) {
        Ok(status) => status,
        Err(e) => handle_error(e),
    };

    if signals::was_interrupted() {
        return ExitStatus::Interrupted;
    }
    status
}

/// Resolve the URL, forward a local port and run the request through it
pub async fn program(
    args: &Args,
    processed: ProcessedArgs,
    config: &Config,
) -> Result<ExitStatus, KurlError> {
    let context = args.context.as_deref().or(config.context.as_deref());
    let cluster = Arc::new(KubeCluster::from_kubeconfig(context).await?);

    let (cluster_url, target) = resolve_url(cluster.clone(), &processed.url).await?;
    let local_port = allocate_local_port()?;

    let mut session = TunnelSession::open(cluster, target, local_port)?;
    signals::register_tunnel(session.cancel_handle());

    let result = run_request(&mut session, &cluster_url.to_local_url(local_port), &processed, args, config).await;

    session.cancel_handle().cancel();
    signals::clear_tunnel();
    let closed = session.wait().await;
    debug!(local_port, "Tunnel torn down");

    // A request failure takes precedence over a teardown failure
    let status = result?;
    if let Err(e) = closed {
        if status == ExitStatus::Success && !signals::was_interrupted() {
            return Err(e);
        }
    }
    Ok(status)
}

async fn run_request(
    session: &mut TunnelSession,
    local_url: &str,
    processed: &ProcessedArgs,
    args: &Args,
    config: &Config,
) -> Result<ExitStatus, KurlError> {
    session.ready().await?;

    if processed.verbose {
        eprintln!("* kurl: forwarding localhost:{} to {}", session.local_port(), session.target());
    }

    let curl = if args.builtin || config.builtin {
        None
    } else {
        find_curl(config.curl_path.as_deref())
    };

    match curl {
        Some(program) => {
            let command = CurlCommand::new(program, &processed.curl_args, local_url);
            if processed.verbose {
                eprintln!("* kurl: {}", command.display());
            }
            command.run().await
        }
        None => {
            debug!(local_url, "Using built-in HTTP client");
            run_fallback(&processed.curl_args, local_url).await?;
            Ok(ExitStatus::Success)
        }
    }
}

/// Filter used when `KURL_LOG` is unset; kurl's own notices stay visible
fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "warn,kurl=debug"
    } else {
        "warn,kurl=info"
    }
}

fn init_logging(format: LogFormat, verbose: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));

    // A subscriber may already be installed when embedded
    let _ = match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init(),
    };
}

fn handle_error(error: KurlError) -> ExitStatus {
    eprintln!("kurl: {}", error);
    ExitStatus::Error
}

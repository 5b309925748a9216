//! Post-processing argument logic
//!
//! Locates the cluster URL among the curl arguments and pulls out the small
//! set of curl options the built-in client understands.

use crate::cli::args::Args;
use crate::errors::KurlError;
use crate::k8s::is_cluster_url;

/// Processed arguments ready for the request runner
#[derive(Debug, Clone)]
pub struct ProcessedArgs {
    /// The cluster URL as given on the command line
    pub url: String,
    /// Every curl argument except the URL, in original order
    pub curl_args: Vec<String>,
    /// Whether curl was asked to be verbose
    pub verbose: bool,
}

/// Process parsed CLI arguments into a usable form
///
/// `default_options` come from the config file and are placed ahead of the
/// user's own arguments.
pub fn process_args(args: &Args, default_options: &[String]) -> Result<ProcessedArgs, KurlError> {
    // The URL is the last argument that looks like one
    let url_index = args
        .curl_args
        .iter()
        .rposition(|arg| is_cluster_url(arg))
        .ok_or_else(|| KurlError::Argument(
            "No Kubernetes URL found in arguments. URLs should follow the format: \
             http://service.namespace.svc:port".to_string()
        ))?;

    let curl_args: Vec<String> = default_options
        .iter()
        .cloned()
        .chain(
            args.curl_args
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != url_index)
                .map(|(_, arg)| arg.clone()),
        )
        .collect();

    let verbose = contains_flag(&curl_args, 'v', "--verbose");

    Ok(ProcessedArgs {
        url: args.curl_args[url_index].clone(),
        curl_args,
        verbose,
    })
}

/// Check for a boolean flag, including inside combined short flags like `-sv`
pub fn contains_flag(args: &[String], short: char, long: &str) -> bool {
    args.iter().any(|arg| {
        if arg == long || arg.starts_with(&format!("{}=", long)) {
            return true;
        }
        match arg.strip_prefix('-') {
            Some(shorts) if !shorts.starts_with('-') && !shorts.is_empty() => {
                shorts.chars().all(|c| c.is_ascii_alphabetic()) && shorts.contains(short)
            }
            _ => false,
        }
    })
}

/// Every value given for an option, in `-X VALUE`, `-X=VALUE` or `--long=VALUE` form
pub fn option_values(args: &[String], short: &str, long: &str) -> Vec<String> {
    let short_eq = format!("{}=", short);
    let long_eq = format!("{}=", long);
    let mut values = Vec::new();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        if arg == short || arg == long {
            if let Some(value) = iter.next() {
                values.push(value.clone());
            }
        } else if let Some(value) = arg.strip_prefix(&short_eq) {
            values.push(value.to_string());
        } else if let Some(value) = arg.strip_prefix(&long_eq) {
            values.push(value.to_string());
        }
    }
    values
}

/// Last value given for an option
pub fn option_value(args: &[String], short: &str, long: &str) -> Option<String> {
    option_values(args, short, long).pop()
}

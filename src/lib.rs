//! kurl library interface
//!
//! curl for in-cluster URLs: a URL such as `http://api.prod.svc:8080/health`
//! is resolved to a pod, a local port is forwarded to it, and the request is
//! run against `localhost`.
//!
//! # Module Organization
//!
//! - [`k8s`] - URL parsing, pod resolution and the port-forward session
//! - [`client`] - curl runner and built-in fallback client
//! - [`cli`] - Argument definitions and processing
//! - [`config`] - Config file loading
//! - [`signals`] - Interrupt handling
//! - [`errors`] - Error types (KurlError, Result)
//! - [`status`] - Exit status codes (ExitStatus)
//! - [`core`] - Main execution logic

pub mod cli;
pub mod client;
pub mod config;
pub mod core;
pub mod errors;
pub mod k8s;
pub mod signals;
pub mod status;

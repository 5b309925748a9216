//! Request runners for the forwarded local URL

pub mod curl;
pub mod fallback;

// Re-exports
pub use curl::{CurlCommand, curl_available, find_curl};
pub use fallback::{FallbackRequest, FallbackResponse, USER_AGENT_STRING, run_fallback};

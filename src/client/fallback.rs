//! Built-in HTTP client used when curl is not installed
//!
//! Understands a small subset of curl's options; anything else on the
//! command line is ignored.

use std::io::Write;
use std::time::Duration;

use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::{Client, Method, Version};
use tracing::debug;

use crate::cli::process::{contains_flag, option_value, option_values};
use crate::errors::KurlError;

pub const USER_AGENT_STRING: &str = concat!("kurl/", env!("CARGO_PKG_VERSION"));

/// A request assembled from curl-style arguments
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackRequest {
    pub method: Method,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    pub user: Option<(String, Option<String>)>,
    pub timeout: Option<Duration>,
    pub user_agent: Option<String>,
    pub insecure: bool,
    pub follow_redirects: bool,
    pub include_headers: bool,
    pub head_only: bool,
}

/// A fully read response
#[derive(Debug, Clone)]
pub struct FallbackResponse {
    pub version: Version,
    pub status: reqwest::StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl FallbackRequest {
    /// Build a request from curl arguments (URL excluded)
    pub fn from_curl_args(args: &[String]) -> Result<Self, KurlError> {
        let head_only = contains_flag(args, 'I', "--head");
        let explicit_method = option_value(args, "-X", "--request");

        let mut headers: Vec<(String, String)> = option_values(args, "-H", "--header")
            .iter()
            .filter_map(|header| {
                let (name, value) = header.split_once(':')?;
                Some((name.trim().to_string(), value.trim().to_string()))
            })
            .collect();

        // -d wins over --data-ascii, which wins over --data-binary
        let data = option_value(args, "-d", "--data")
            .or_else(|| option_value(args, "--data-ascii", "--data-ascii"))
            .or_else(|| option_value(args, "--data-binary", "--data-binary"));

        let form = option_values(args, "-F", "--form");
        let mut body = data.clone();
        if !form.is_empty() {
            let fields: Vec<(&str, &str)> = form
                .iter()
                .map(|field| field.split_once('=').unwrap_or((field.as_str(), "")))
                .collect();
            body = Some(serde_urlencoded::to_string(&fields).map_err(|e| {
                KurlError::Argument(format!("Invalid form field: {}", e))
            })?);
            headers.push((
                CONTENT_TYPE.as_str().to_string(),
                "application/x-www-form-urlencoded".to_string(),
            ));
        }

        let method = match explicit_method {
            Some(method) => Method::from_bytes(method.to_uppercase().as_bytes())
                .map_err(|_| KurlError::Argument(format!("Invalid request method: {}", method)))?,
            None if !form.is_empty() || data.is_some() => Method::POST,
            None if head_only => Method::HEAD,
            None => Method::GET,
        };
        // Form submission never goes out as GET or HEAD
        let method = if !form.is_empty() && (method == Method::GET || method == Method::HEAD) {
            Method::POST
        } else {
            method
        };

        let user = option_value(args, "-u", "--user").map(|user| match user.split_once(':') {
            Some((name, password)) => (name.to_string(), Some(password.to_string())),
            None => (user, None),
        });

        let timeout = option_value(args, "-m", "--max-time")
            .map(|secs| {
                secs.parse::<f64>()
                    .ok()
                    .filter(|s| s.is_finite() && *s > 0.0)
                    .map(Duration::from_secs_f64)
                    .ok_or_else(|| KurlError::Argument(format!("Invalid --max-time: {}", secs)))
            })
            .transpose()?;

        Ok(Self {
            method,
            headers,
            body,
            user,
            timeout,
            user_agent: option_value(args, "-A", "--user-agent"),
            insecure: contains_flag(args, 'k', "--insecure"),
            follow_redirects: contains_flag(args, 'L', "--location"),
            include_headers: contains_flag(args, 'i', "--include"),
            head_only,
        })
    }

    fn build_client(&self) -> Result<Client, KurlError> {
        let mut builder = Client::builder()
            .user_agent(self.user_agent.as_deref().unwrap_or(USER_AGENT_STRING));

        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        if self.insecure {
            builder = builder.danger_accept_invalid_certs(true);
        }

        // curl only follows redirects with -L
        builder = if self.follow_redirects {
            builder.redirect(reqwest::redirect::Policy::limited(50))
        } else {
            builder.redirect(reqwest::redirect::Policy::none())
        };

        Ok(builder.build()?)
    }

    /// Send the request and read the whole response
    pub async fn execute(&self, url: &str) -> Result<FallbackResponse, KurlError> {
        let client = self.build_client()?;
        let mut request = client.request(self.method.clone(), url);

        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some((name, password)) = &self.user {
            request = request.basic_auth(name, password.as_ref());
        }
        if let Some(body) = &self.body {
            request = request.body(body.clone());
        }

        debug!(method = %self.method, url, headers = ?self.headers, has_body = self.body.is_some(), "Sending request");

        let response = request.send().await?;
        let version = response.version();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        Ok(FallbackResponse { version, status, headers, body })
    }
}

impl FallbackResponse {
    /// Render the response the way curl prints it
    pub fn render(&self, include_headers: bool, head_only: bool) -> Vec<u8> {
        let mut out = Vec::new();

        if include_headers || head_only {
            let version = match self.version {
                Version::HTTP_09 => "HTTP/0.9",
                Version::HTTP_10 => "HTTP/1.0",
                Version::HTTP_2 => "HTTP/2",
                Version::HTTP_3 => "HTTP/3",
                _ => "HTTP/1.1",
            };
            out.extend_from_slice(format!(
                "{} {} {}\r\n",
                version,
                self.status.as_u16(),
                self.status.canonical_reason().unwrap_or("")
            ).trim_end().as_bytes());
            out.extend_from_slice(b"\r\n");
            for (name, value) in &self.headers {
                out.extend_from_slice(name.as_str().as_bytes());
                out.extend_from_slice(b": ");
                out.extend_from_slice(value.as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            out.extend_from_slice(b"\r\n");
        }

        if !head_only {
            out.extend_from_slice(&self.body);
        }
        out
    }
}

/// Run a request with the built-in client and write the result to stdout
pub async fn run_fallback(curl_args: &[String], local_url: &str) -> Result<(), KurlError> {
    let request = FallbackRequest::from_curl_args(curl_args)?;
    let response = request.execute(local_url).await?;

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&response.render(request.include_headers, request.head_only))?;
    stdout.flush()?;
    Ok(())
}

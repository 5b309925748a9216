//! Kubernetes URL parsing
//!
//! Parses in-cluster style URLs into a forwarding target.
//!
//! # URL Format
//! ```text
//! http[s]://name.namespace.kind[.suffix...][:port][/path][?query][#fragment]
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::errors::KurlError;
use super::target::{ResourceKind, TargetDescriptor};

/// DNS-1123 label, as used for resource names and namespaces
static RESOURCE_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("valid resource name regex")
});

/// A parsed cluster URL: the target plus everything needed to rebuild the
/// request URL against a local port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterUrl {
    pub target: TargetDescriptor,
    /// URL scheme (`http` or `https`)
    pub scheme: String,
    /// Path component of the URL
    pub path: String,
    /// Query string (if any)
    pub query: Option<String>,
    /// Fragment (if any)
    pub fragment: Option<String>,
}

impl ClusterUrl {
    /// Convert to a localhost URL with the given local port
    pub fn to_local_url(&self, local_port: u16) -> String {
        let mut url = format!("{}://localhost:{}{}", self.scheme, local_port, self.path);
        if let Some(ref query) = self.query {
            url.push('?');
            url.push_str(query);
        }
        if let Some(ref fragment) = self.fragment {
            url.push('#');
            url.push_str(fragment);
        }
        url
    }
}

/// Parse a cluster URL into a target descriptor
///
/// # Examples
/// ```
/// use kurl::k8s::{parse_target_url, ResourceKind};
///
/// let target = parse_target_url("http://api.default.svc:8080/health").unwrap();
/// assert_eq!(target.name(), "api");
/// assert_eq!(target.namespace(), "default");
/// assert_eq!(target.kind(), ResourceKind::Service);
/// assert_eq!(target.port(), 8080);
/// ```
pub fn parse_target_url(url: &str) -> Result<TargetDescriptor, KurlError> {
    parse_cluster_url(url).map(|parsed| parsed.target)
}

/// Parse a cluster URL, keeping the path, query and fragment
pub fn parse_cluster_url(raw: &str) -> Result<ClusterUrl, KurlError> {
    let parsed = Url::parse(raw).map_err(|e| KurlError::InvalidAddressFormat {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;

    let port = match parsed.port() {
        Some(0) => {
            return Err(KurlError::InvalidAddressFormat {
                url: raw.to_string(),
                reason: "port must be between 1 and 65535".to_string(),
            });
        }
        Some(port) => port,
        None if parsed.scheme() == "https" => 443,
        None => 80,
    };

    // The URL parser lowercases hosts, so names are read from the raw input
    let host = raw_host(raw);
    if parsed.host_str() != Some(host.to_ascii_lowercase().as_str()) {
        return Err(KurlError::InvalidAddressFormat {
            url: raw.to_string(),
            reason: format!("ambiguous host {:?}", host),
        });
    }
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() < 3 {
        return Err(KurlError::InvalidAddressFormat {
            url: raw.to_string(),
            reason: "expected name.namespace.kind as the host".to_string(),
        });
    }

    let (name, namespace, token) = (labels[0], labels[1], labels[2]);

    let kind = ResourceKind::from_token(token).ok_or_else(|| {
        KurlError::UnsupportedResourceKind { token: token.to_string() }
    })?;

    validate_resource_name(name, "resource name")?;
    validate_resource_name(namespace, "namespace")?;

    Ok(ClusterUrl {
        target: TargetDescriptor::new(namespace, name, kind, port),
        scheme: parsed.scheme().to_string(),
        path: parsed.path().to_string(),
        query: parsed.query().map(String::from),
        fragment: parsed.fragment().map(String::from),
    })
}

/// Host portion of a URL exactly as written
fn raw_host(url: &str) -> &str {
    let rest = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    let authority = rest
        .find(['/', '\\', '?', '#'])
        .map(|idx| &rest[..idx])
        .unwrap_or(rest);
    let host_port = authority
        .rsplit_once('@')
        .map(|(_, host)| host)
        .unwrap_or(authority);

    if host_port.starts_with('[') {
        return host_port
            .find(']')
            .map(|idx| &host_port[..=idx])
            .unwrap_or(host_port);
    }

    host_port.split(':').next().unwrap_or(host_port)
}

fn validate_resource_name(value: &str, field: &'static str) -> Result<(), KurlError> {
    if RESOURCE_NAME_RE.is_match(value) {
        Ok(())
    } else {
        Err(KurlError::InvalidResourceName {
            field,
            value: value.to_string(),
        })
    }
}

/// Check if a command-line argument looks like a URL
pub fn is_cluster_url(arg: &str) -> bool {
    arg.starts_with("http://") || arg.starts_with("https://")
}

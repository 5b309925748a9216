//! Label selectors
//!
//! Converts the selectors found on Services and workload specs into the
//! label-selector query the API server understands.

use std::collections::BTreeMap;
use std::fmt;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;

use crate::errors::KurlError;

/// A single label constraint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    Equals { key: String, value: String },
    In { key: String, values: Vec<String> },
    NotIn { key: String, values: Vec<String> },
    Exists { key: String },
    DoesNotExist { key: String },
}

impl Requirement {
    fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        match self {
            Requirement::Equals { key, value } => labels.get(key) == Some(value),
            Requirement::In { key, values } => {
                labels.get(key).is_some_and(|v| values.contains(v))
            }
            Requirement::NotIn { key, values } => {
                labels.get(key).map_or(true, |v| !values.contains(v))
            }
            Requirement::Exists { key } => labels.contains_key(key),
            Requirement::DoesNotExist { key } => !labels.contains_key(key),
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Requirement::Equals { key, value } => write!(f, "{}={}", key, value),
            Requirement::In { key, values } => write!(f, "{} in ({})", key, values.join(",")),
            Requirement::NotIn { key, values } => write!(f, "{} notin ({})", key, values.join(",")),
            Requirement::Exists { key } => write!(f, "{}", key),
            Requirement::DoesNotExist { key } => write!(f, "!{}", key),
        }
    }
}

/// Conjunction of label requirements
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selector {
    requirements: Vec<Requirement>,
}

impl Selector {
    /// Equality selector from a label map (Service `spec.selector`)
    pub fn from_labels(labels: &BTreeMap<String, String>) -> Self {
        let requirements = labels
            .iter()
            .map(|(key, value)| Requirement::Equals {
                key: key.clone(),
                value: value.clone(),
            })
            .collect();
        Self { requirements }
    }

    /// Selector from a workload's `spec.selector`, including match expressions
    pub fn from_label_selector(selector: &LabelSelector) -> Result<Self, KurlError> {
        let mut requirements = match &selector.match_labels {
            Some(labels) => Self::from_labels(labels).requirements,
            None => Vec::new(),
        };

        for expr in selector.match_expressions.iter().flatten() {
            let values = expr.values.clone().unwrap_or_default();
            let key = expr.key.clone();
            let requirement = match expr.operator.as_str() {
                "In" | "NotIn" if values.is_empty() => {
                    return Err(KurlError::ClusterApi(format!(
                        "label selector operator {} on {} requires values",
                        expr.operator, key
                    )));
                }
                "In" => Requirement::In { key, values },
                "NotIn" => Requirement::NotIn { key, values },
                "Exists" => Requirement::Exists { key },
                "DoesNotExist" => Requirement::DoesNotExist { key },
                other => {
                    return Err(KurlError::ClusterApi(format!(
                        "unsupported label selector operator {} on {}",
                        other, key
                    )));
                }
            };
            requirements.push(requirement);
        }

        Ok(Self { requirements })
    }

    pub fn push(&mut self, requirement: Requirement) {
        self.requirements.push(requirement);
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    /// An empty selector would match every pod in the namespace
    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    /// Evaluate the selector against a pod's labels
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements.iter().all(|r| r.matches(labels))
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.requirements.iter().map(|r| r.to_string()).collect();
        f.write_str(&parts.join(","))
    }
}

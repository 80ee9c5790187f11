//! Pure shape checks over a scraped sample sequence.
//!
//! Values are never inspected. Every offending key or sample is reported so a
//! single run shows the full extent of a naming or labelling regression.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use super::MetricSample;

pub const DEFAULT_APPROVED_SUFFIXES: [&str; 5] =
    ["bytes", "seconds", "percentage", "count", "total"];
pub const DEFAULT_REQUIRED_LABELS: [&str; 1] = ["qmgr"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuffixViolation {
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelViolation {
    pub key: String,
    pub labels: BTreeMap<String, String>,
}

pub fn non_empty(samples: &[MetricSample]) -> bool {
    !samples.is_empty()
}

/// One violation per distinct key lacking every approved suffix, in first-seen order.
pub fn suffix_violations<S: AsRef<str>>(
    samples: &[MetricSample],
    approved: &[S],
) -> Vec<SuffixViolation> {
    let mut seen = HashSet::new();
    samples
        .iter()
        .filter(|s| !approved.iter().any(|suffix| s.key.ends_with(suffix.as_ref())))
        .filter(|s| seen.insert(s.key.as_str()))
        .map(|s| SuffixViolation { key: s.key.clone() })
        .collect()
}

/// One violation per sample that carries none of the required labels.
pub fn label_violations<S: AsRef<str>>(
    samples: &[MetricSample],
    required: &[S],
) -> Vec<LabelViolation> {
    samples
        .iter()
        .filter(|s| !required.iter().any(|label| s.labels.contains_key(label.as_ref())))
        .map(|s| LabelViolation {
            key: s.key.clone(),
            labels: s.labels.clone(),
        })
        .collect()
}

/// Which optional validators to run; non-emptiness is always checked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShapeChecks {
    pub suffixes: bool,
    pub labels: bool,
}

impl ShapeChecks {
    pub const NON_EMPTY: ShapeChecks = ShapeChecks {
        suffixes: false,
        labels: false,
    };
    pub const ALL: ShapeChecks = ShapeChecks {
        suffixes: true,
        labels: true,
    };
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShapeRules {
    pub approved_suffixes: Vec<String>,
    pub required_labels: Vec<String>,
}

impl Default for ShapeRules {
    fn default() -> Self {
        Self {
            approved_suffixes: DEFAULT_APPROVED_SUFFIXES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            required_labels: DEFAULT_REQUIRED_LABELS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl ShapeRules {
    pub fn check(&self, samples: &[MetricSample], checks: ShapeChecks) -> ShapeReport {
        ShapeReport {
            sample_count: samples.len(),
            suffix_violations: if checks.suffixes {
                suffix_violations(samples, &self.approved_suffixes)
            } else {
                Vec::new()
            },
            label_violations: if checks.labels {
                label_violations(samples, &self.required_labels)
            } else {
                Vec::new()
            },
            required_labels: self.required_labels.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeReport {
    pub sample_count: usize,
    pub suffix_violations: Vec<SuffixViolation>,
    pub label_violations: Vec<LabelViolation>,
    required_labels: Vec<String>,
}

impl ShapeReport {
    pub fn is_empty_scrape(&self) -> bool {
        self.sample_count == 0
    }

    pub fn is_clean(&self) -> bool {
        !self.is_empty_scrape()
            && self.suffix_violations.is_empty()
            && self.label_violations.is_empty()
    }
}

impl fmt::Display for ShapeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty_scrape() {
            writeln!(f, "Expected some metrics to be returned but had none")?;
        }
        for v in &self.suffix_violations {
            writeln!(f, "Metric '{}' does not have an approved suffix", v.key)?;
        }
        for v in &self.label_violations {
            writeln!(
                f,
                "Metric '{}' with labels {:?} does not have one or more required labels - {:?}",
                v.key, v.labels, self.required_labels
            )?;
        }
        if self.is_clean() {
            writeln!(f, "{} samples, no violations", self.sample_count)?;
        }
        Ok(())
    }
}

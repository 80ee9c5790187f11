pub mod client;
pub mod exposition;
pub mod validate;

use std::collections::BTreeMap;

pub use client::{MetricsClient, MetricsEndpoint};
pub use validate::{ShapeChecks, ShapeReport, ShapeRules};

/// One sample line from a scrape. The value is carried but never asserted on.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub key: String,
    pub labels: BTreeMap<String, String>,
    pub value: f64,
}

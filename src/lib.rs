pub mod error;
pub mod harness;
pub mod metrics;
pub mod poll;
pub mod readiness;

#[cfg(any(test, feature = "test-harness"))]
pub mod test_harness;

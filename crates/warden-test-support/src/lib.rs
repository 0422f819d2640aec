//! Shared test utilities: a test-only tracing initializer, an in-memory
//! `ClusterApi` fake, and Constraint/workload fixture builders.

pub mod fake_cluster;
pub mod fixtures;
pub mod logging;

pub use fake_cluster::FakeClusterApi;
pub use logging::init_tracing_once;

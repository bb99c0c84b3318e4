pub mod metrics;
pub mod proxy;
pub mod query;

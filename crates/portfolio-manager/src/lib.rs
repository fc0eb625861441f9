pub mod benchmark;
pub mod metrics;
pub mod models;
pub mod shared_math;
pub mod valuation;

pub use benchmark::BenchmarkComparer;
pub use metrics::{chart_data, compute_metrics};
pub use models::*;
pub use valuation::{compute_series, positions_view, value_prices};

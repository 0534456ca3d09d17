pub mod data;
pub mod error;
pub mod logging;
pub mod loss;
pub mod metric;
pub mod model;
pub mod pairs;
pub mod training;

pub use error::ExperimentError;
pub use training::{run_experiment, run_on_splits, EpochMetrics, ExperimentConfig, Metrics};

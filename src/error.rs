use burn::config::ConfigError;

/// Failures surfacing at the boundary of an experiment run.
///
/// Numerical and shape errors raised inside the framework are not translated;
/// they abort the run.
#[derive(thiserror::Error, Debug)]
pub enum ExperimentError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Logger error: {0}")]
    Logger(String),
}

use std::path::Path;

use burn::train::{ApplicationLoggerInstaller, FileApplicationLoggerInstaller};

use crate::ExperimentError;

/// Name of the log file written inside the artifact directory.
pub const LOG_FILE: &str = "experiment.log";

/// Creates the artifact directory and routes application logs to a file inside it.
pub fn install_file_logger(artifact_dir: &Path) -> Result<(), ExperimentError> {
    std::fs::create_dir_all(artifact_dir)?;

    FileApplicationLoggerInstaller::new(artifact_dir.join(LOG_FILE))
        .install()
        .map_err(ExperimentError::Logger)
}

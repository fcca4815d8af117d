use thiserror::Error;

/// Top-level error type for pipeline setup and the stdin front end.
///
/// Emission itself never returns errors; these only surface from construction
/// and input paths.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Runtime error: {0}")]
    Runtime(String),
}

use thiserror::Error;

/// Errors raised during formula construction and isotopologue generation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum IsoError {
    #[error("invalid formula: {0}")]
    InvalidFormula(String),

    #[error("invalid element components: {0}")]
    InvalidComponents(String),

    #[error("threshold must be a non-negative number, got {0}")]
    InvalidThreshold(f64),

    #[error("layered delta must be negative, got {0}")]
    InvalidDelta(f64),

    #[error("generator is single-pass and has already been iterated, construct a new one from the same formula")]
    GeneratorConsumed,
}

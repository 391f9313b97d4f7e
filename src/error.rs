use thiserror::Error;

use crate::backend::Elm;

/// Errors surfaced while building models, optimizers and datasets.
///
/// Structural mismatches between a model and its gradient are programming
/// errors and panic instead of appearing here.
#[derive(Debug, Error)]
pub enum NnError {
    #[error("invalid hyperparameter `{name}` = {value}: {reason}")]
    InvalidHyperparameter {
        name: &'static str,
        value: Elm,
        reason: &'static str,
    },
    #[error("invalid shape: {0}")]
    InvalidShape(String),
    #[error("dataset error: {0}")]
    Dataset(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Config(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, NnError>;

/// Rejects values that are NaN, infinite or negative.
pub(crate) fn non_negative(name: &'static str, value: Elm) -> Result<Elm> {
    if !value.is_finite() {
        return Err(NnError::InvalidHyperparameter {
            name,
            value,
            reason: "must be finite",
        });
    }
    if value < 0.0 {
        return Err(NnError::InvalidHyperparameter {
            name,
            value,
            reason: "must be >= 0",
        });
    }
    Ok(value)
}

/// Like [`non_negative`], but zero is rejected too. Used for terms that sit in
/// a denominator.
pub(crate) fn positive(name: &'static str, value: Elm) -> Result<Elm> {
    non_negative(name, value)?;
    if value == 0.0 {
        return Err(NnError::InvalidHyperparameter {
            name,
            value,
            reason: "must be > 0",
        });
    }
    Ok(value)
}

/// Rejects values outside the closed interval `[0, 1]`.
pub(crate) fn unit_interval(name: &'static str, value: Elm) -> Result<Elm> {
    non_negative(name, value)?;
    if value > 1.0 {
        return Err(NnError::InvalidHyperparameter {
            name,
            value,
            reason: "must lie in [0, 1]",
        });
    }
    Ok(value)
}

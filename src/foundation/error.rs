use crate::foundation::core::UnitRef;

/// Convenience result type used across narrsync.
pub type NarrsyncResult<T> = Result<T, NarrsyncError>;

/// Top-level error taxonomy.
///
/// Every phase failure is fatal to the run. The variant tells which phase failed and the payload
/// names the unit, layer or cue that caused it.
#[derive(thiserror::Error, Debug)]
pub enum NarrsyncError {
    /// Invalid user-provided timeline or layer data.
    #[error("validation error: {0}")]
    Validation(String),

    /// Invalid run configuration.
    #[error("config error: {0}")]
    Config(String),

    /// Speech synthesis failed for a unit after all permitted attempts.
    #[error("estimation error: {unit}: {cause}")]
    Estimation {
        unit: UnitRef,
        cause: String,
    },

    /// A visual action or narration pause failed; the capture was aborted.
    #[error("capture error: {unit} (action {action}): {cause}")]
    Capture {
        unit: UnitRef,
        action: String,
        cause: String,
    },

    /// A cue could not be resolved or a timeline invariant was violated while composing.
    #[error("composition error: {target}: {cause}")]
    Composition {
        target: String,
        cause: String,
    },

    /// Muxing or preview rendering failed.
    #[error("assembly error: {0}")]
    Assembly(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl NarrsyncError {
    /// Build a [`NarrsyncError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`NarrsyncError::Config`] value.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Build a [`NarrsyncError::Estimation`] value.
    pub fn estimation(unit: UnitRef, cause: impl Into<String>) -> Self {
        Self::Estimation {
            unit,
            cause: cause.into(),
        }
    }

    /// Build a [`NarrsyncError::Capture`] value.
    pub fn capture(unit: UnitRef, action: impl Into<String>, cause: impl Into<String>) -> Self {
        Self::Capture {
            unit,
            action: action.into(),
            cause: cause.into(),
        }
    }

    /// Build a [`NarrsyncError::Composition`] value.
    pub fn composition(target: impl Into<String>, cause: impl Into<String>) -> Self {
        Self::Composition {
            target: target.into(),
            cause: cause.into(),
        }
    }

    /// Build a [`NarrsyncError::Assembly`] value.
    pub fn assembly(msg: impl Into<String>) -> Self {
        Self::Assembly(msg.into())
    }

    /// The unit this error originated from, when it is tied to one.
    pub fn unit(&self) -> Option<&UnitRef> {
        match self {
            Self::Estimation { unit, .. } | Self::Capture { unit, .. } => Some(unit),
            _ => None,
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;

use crate::failure::AggregatedFailure;
use thiserror::Error;
use uuid::Uuid;

/// Unified error type for the whole team runtime
#[derive(Debug, Error)]
pub enum TeamError {
    /// A required region, block or handler was not supplied
    #[error("Null region: {what} was not provided")]
    NullRegion { what: &'static str },

    /// A team-scoped construct was called by a thread that belongs to no team
    #[error("{construct} called outside of a parallel region")]
    OutsideTeam { construct: &'static str },

    /// Argument validation failed before any team coordination happened
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        message: String,
        field: Option<String>,
    },

    /// One or more workers failed under the propagating exception model
    #[error(transparent)]
    Aggregated(AggregatedFailure),

    /// The OS refused to start a worker thread
    #[error("Failed to spawn worker {logical_id}")]
    Spawn {
        logical_id: usize,
        #[source]
        source: std::io::Error,
    },

    /// A rendezvous was abandoned before every party arrived
    #[error("Team of region {region} was broken before every member arrived")]
    TeamBroken { region: Uuid },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },
}

impl TeamError {
    /// Create a null-region error
    pub fn null_region(what: &'static str) -> Self {
        Self::NullRegion { what }
    }

    /// Create an outside-team error for the named construct
    pub fn outside_team(construct: &'static str) -> Self {
        Self::OutsideTeam { construct }
    }

    /// Create an invalid argument error
    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        Self::InvalidArgument {
            message: message.into(),
            field: None,
        }
    }

    /// Create an invalid argument error naming the offending parameter
    pub fn invalid_argument_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::InvalidArgument {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a spawn error
    pub fn spawn(logical_id: usize, source: std::io::Error) -> Self {
        Self::Spawn { logical_id, source }
    }

    /// Create a broken-team error
    pub fn team_broken(region: Uuid) -> Self {
        Self::TeamBroken { region }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
            field: None,
        }
    }

    /// Create a configuration error naming the offending field
    pub fn configuration_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Configuration {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// The aggregated worker failures, if this is a propagated region failure
    pub fn aggregated(&self) -> Option<&AggregatedFailure> {
        match self {
            Self::Aggregated(failure) => Some(failure),
            _ => None,
        }
    }

    /// Whether the error was raised by argument validation at the call site
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Self::NullRegion { .. } | Self::OutsideTeam { .. } | Self::InvalidArgument { .. }
        )
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::NullRegion { .. } => "null_region",
            Self::OutsideTeam { .. } => "outside_team",
            Self::InvalidArgument { .. } => "invalid_argument",
            Self::Aggregated(_) => "aggregated",
            Self::Spawn { .. } => "spawn",
            Self::TeamBroken { .. } => "team_broken",
            Self::Configuration { .. } => "configuration",
        }
    }
}

impl From<AggregatedFailure> for TeamError {
    fn from(failure: AggregatedFailure) -> Self {
        Self::Aggregated(failure)
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, TeamError>;

/// Macro for creating errors with less ceremony
#[macro_export]
macro_rules! team_error {
    (outside, $construct:expr) => {
        $crate::TeamError::outside_team($construct)
    };
    (invalid, $message:expr) => {
        $crate::TeamError::invalid_argument($message)
    };
    (invalid, $message:expr, $field:expr) => {
        $crate::TeamError::invalid_argument_field($message, $field)
    };
    (config, $message:expr) => {
        $crate::TeamError::configuration($message)
    };
    (config, $message:expr, $field:expr) => {
        $crate::TeamError::configuration_field($message, $field)
    };
}

//! Typed replies from external collaborators.
//!
//! Vendors are never interpreted through their error text. Each backend
//! adapter classifies its own failures into a [`CapabilityReply`] once, at
//! the edge, and everything downstream matches on the variant.

use crate::errors::ToolError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a vendor declined a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclineKind {
    /// Credentials or permissions were rejected.
    Authorization,
    /// The vendor refused the request itself.
    Rejected,
    /// The vendor could not be reached or answered with a server error.
    Unavailable,
}

/// A vendor refusal with the vendor's own message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decline {
    /// Classification of the refusal.
    pub kind: DeclineKind,
    /// The vendor's message, verbatim.
    pub message: String,
}

impl Decline {
    /// Creates a decline.
    #[must_use]
    pub fn new(kind: DeclineKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Whether resubmitting the same call could succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self.kind, DeclineKind::Unavailable)
    }

    /// Converts the decline into a tool error for `operation`.
    #[must_use]
    pub fn into_tool_error(self, operation: &str) -> ToolError {
        match self.kind {
            DeclineKind::Authorization => ToolError::Authorization {
                message: self.message,
            },
            DeclineKind::Rejected => ToolError::Declined {
                message: self.message,
            },
            DeclineKind::Unavailable => ToolError::Unavailable {
                operation: operation.to_string(),
                message: self.message,
            },
        }
    }
}

impl fmt::Display for Decline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Outcome of a capability call on an external collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilityReply<T> {
    /// The call succeeded.
    Ok(T),
    /// The effect had already been applied by an earlier call.
    AlreadyApplied,
    /// The vendor refused.
    Declined(Decline),
    /// The backend does not offer this capability.
    NotImplemented(String),
}

impl<T> CapabilityReply<T> {
    /// Shorthand for an authorization decline.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Declined(Decline::new(DeclineKind::Authorization, message))
    }

    /// Shorthand for a plain rejection.
    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Declined(Decline::new(DeclineKind::Rejected, message))
    }

    /// Shorthand for an unreachable vendor.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Declined(Decline::new(DeclineKind::Unavailable, message))
    }

    /// Shorthand for a missing capability.
    #[must_use]
    pub fn not_implemented(capability: impl Into<String>) -> Self {
        Self::NotImplemented(capability.into())
    }

    /// Returns true for [`CapabilityReply::Ok`].
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }

    /// Maps the success value.
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> CapabilityReply<U> {
        match self {
            Self::Ok(value) => CapabilityReply::Ok(f(value)),
            Self::AlreadyApplied => CapabilityReply::AlreadyApplied,
            Self::Declined(decline) => CapabilityReply::Declined(decline),
            Self::NotImplemented(capability) => CapabilityReply::NotImplemented(capability),
        }
    }

    /// Converts a reply whose `AlreadyApplied` has no meaning into a result.
    ///
    /// Used for read capabilities, where an already-applied answer is a
    /// vendor bug and is reported as a rejection.
    pub fn into_result(self, operation: &str) -> Result<T, ToolError> {
        match self {
            Self::Ok(value) => Ok(value),
            Self::AlreadyApplied => Err(ToolError::Declined {
                message: format!("{operation} returned an already-applied reply"),
            }),
            Self::Declined(decline) => Err(decline.into_tool_error(operation)),
            Self::NotImplemented(capability) => Err(ToolError::not_implemented(capability)),
        }
    }
}

//! The uniform tool result envelope.

use crate::errors::{ErrorCode, ToolError, ToolErrorInfo};
use serde::de::{DeserializeOwned, Error as _};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Outcome of a tool invocation: exactly one of data or error.
///
/// On the wire this is `{"success": true, "data": ...}` or
/// `{"success": false, "error": {"code", "message", "details"?}}`.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolResult<T> {
    /// The tool succeeded.
    Success {
        /// The tool's output.
        data: T,
    },
    /// The tool failed.
    Failure {
        /// The error payload.
        error: ToolErrorInfo,
    },
}

impl<T> ToolResult<T> {
    /// Creates a successful result.
    #[must_use]
    pub const fn success(data: T) -> Self {
        Self::Success { data }
    }

    /// Creates a failed result.
    #[must_use]
    pub const fn failure(error: ToolErrorInfo) -> Self {
        Self::Failure { error }
    }

    /// Creates a failed result from a code and message.
    #[must_use]
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Failure {
            error: ToolErrorInfo::new(code, message),
        }
    }

    /// Whether the tool succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Returns the output, if any.
    #[must_use]
    pub const fn data(&self) -> Option<&T> {
        match self {
            Self::Success { data } => Some(data),
            Self::Failure { .. } => None,
        }
    }

    /// Returns the error payload, if any.
    #[must_use]
    pub const fn error_info(&self) -> Option<&ToolErrorInfo> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { error } => Some(error),
        }
    }

    /// Returns the error code, if the tool failed.
    #[must_use]
    pub fn error_code(&self) -> Option<ErrorCode> {
        self.error_info().map(|e| e.code)
    }

    /// Converts into a standard `Result`.
    pub fn into_result(self) -> Result<T, ToolErrorInfo> {
        match self {
            Self::Success { data } => Ok(data),
            Self::Failure { error } => Err(error),
        }
    }

    /// Maps the output.
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> ToolResult<U> {
        match self {
            Self::Success { data } => ToolResult::Success { data: f(data) },
            Self::Failure { error } => ToolResult::Failure { error },
        }
    }
}

impl<T: Serialize> ToolResult<T> {
    /// Erases the output type into JSON.
    ///
    /// An output that cannot be represented as JSON becomes an
    /// `EXECUTION_ERROR`.
    #[must_use]
    pub fn into_json(self) -> ToolResult<serde_json::Value> {
        match self {
            Self::Success { data } => match serde_json::to_value(data) {
                Ok(value) => ToolResult::Success { data: value },
                Err(err) => ToolResult::error(
                    ErrorCode::ExecutionError,
                    format!("Tool output is not serializable: {err}"),
                ),
            },
            Self::Failure { error } => ToolResult::Failure { error },
        }
    }
}

impl<T> From<Result<T, ToolError>> for ToolResult<T> {
    fn from(result: Result<T, ToolError>) -> Self {
        match result {
            Ok(data) => Self::Success { data },
            Err(err) => Self::Failure {
                error: err.to_info(),
            },
        }
    }
}

impl<T: Serialize> Serialize for ToolResult<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ToolResult", 2)?;
        match self {
            Self::Success { data } => {
                state.serialize_field("success", &true)?;
                state.serialize_field("data", data)?;
            }
            Self::Failure { error } => {
                state.serialize_field("success", &false)?;
                state.serialize_field("error", error)?;
            }
        }
        state.end()
    }
}

#[derive(Deserialize)]
struct RawToolResult {
    success: bool,
    #[serde(default, deserialize_with = "present")]
    data: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<ToolErrorInfo>,
}

/// Distinguishes an explicit `null` from an absent field.
fn present<'de, D: Deserializer<'de>>(d: D) -> Result<Option<serde_json::Value>, D::Error> {
    serde_json::Value::deserialize(d).map(Some)
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for ToolResult<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawToolResult::deserialize(deserializer)?;
        match (raw.success, raw.data, raw.error) {
            (true, Some(data), None) => {
                let data = T::deserialize(data).map_err(D::Error::custom)?;
                Ok(Self::Success { data })
            }
            (false, None, Some(error)) => Ok(Self::Failure { error }),
            (true, _, _) => Err(D::Error::custom(
                "a successful result must carry data and no error",
            )),
            (false, _, _) => Err(D::Error::custom(
                "a failed result must carry an error and no data",
            )),
        }
    }
}

use serde::Serialize;
use serde_json::json;

use crate::connectors::apple_common::parse::ParseError;

/// Stable, machine-readable error codes returned in `{success:false, error}`
/// tool results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidDestination,
    EmptyProjectId,
    EmptyAreaId,
    TodoNotFound,
    ProjectNotFound,
    AreaNotFound,
    TagNotFound,
    InvalidParameter,
    InvalidLimit,
    InvalidDate,
    ExecutionFailed,
    Timeout,
    ThingsNotRunning,
    PermissionDenied,
    ParseError,
    ConfigError,
    ToolNotFound,
    MethodNotFound,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidDestination => "INVALID_DESTINATION",
            ErrorCode::EmptyProjectId => "EMPTY_PROJECT_ID",
            ErrorCode::EmptyAreaId => "EMPTY_AREA_ID",
            ErrorCode::TodoNotFound => "TODO_NOT_FOUND",
            ErrorCode::ProjectNotFound => "PROJECT_NOT_FOUND",
            ErrorCode::AreaNotFound => "AREA_NOT_FOUND",
            ErrorCode::TagNotFound => "TAG_NOT_FOUND",
            ErrorCode::InvalidParameter => "INVALID_PARAMETER",
            ErrorCode::InvalidLimit => "INVALID_LIMIT",
            ErrorCode::InvalidDate => "INVALID_DATE",
            ErrorCode::ExecutionFailed => "EXECUTION_FAILED",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::ThingsNotRunning => "THINGS_NOT_RUNNING",
            ErrorCode::PermissionDenied => "PERMISSION_DENIED",
            ErrorCode::ParseError => "PARSE_ERROR",
            ErrorCode::ConfigError => "CONFIG_ERROR",
            ErrorCode::ToolNotFound => "TOOL_NOT_FOUND",
            ErrorCode::MethodNotFound => "METHOD_NOT_FOUND",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse classification used to decide whether a failure is worth retrying
/// and how it is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Transient,
    Permanent,
    Validation,
    Parse,
}

#[derive(Debug, thiserror::Error)]
pub enum ThingsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{message}")]
    Validation { code: ErrorCode, message: String },

    #[error("{entity} not found: {id}")]
    NotFound {
        code: ErrorCode,
        entity: &'static str,
        id: String,
    },

    #[error("AppleScript execution failed: {message}")]
    Execution { message: String, attempts: u32 },

    #[error("Could not start subprocess: {0}")]
    Spawn(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Things is not running: {0}")]
    ThingsNotRunning(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Tool not found")]
    ToolNotFound,

    #[error("Method not found")]
    MethodNotFound,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ThingsError {
    pub fn validation(code: ErrorCode, message: impl Into<String>) -> Self {
        ThingsError::Validation {
            code,
            message: message.into(),
        }
    }

    pub fn todo_not_found(id: impl Into<String>) -> Self {
        ThingsError::NotFound {
            code: ErrorCode::TodoNotFound,
            entity: "Todo",
            id: id.into(),
        }
    }

    pub fn project_not_found(id: impl Into<String>) -> Self {
        ThingsError::NotFound {
            code: ErrorCode::ProjectNotFound,
            entity: "Project",
            id: id.into(),
        }
    }

    pub fn area_not_found(id: impl Into<String>) -> Self {
        ThingsError::NotFound {
            code: ErrorCode::AreaNotFound,
            entity: "Area",
            id: id.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            ThingsError::Validation { code, .. } | ThingsError::NotFound { code, .. } => *code,
            ThingsError::Config(_) => ErrorCode::ConfigError,
            ThingsError::Execution { .. } | ThingsError::Spawn(_) => ErrorCode::ExecutionFailed,
            ThingsError::Timeout(_) => ErrorCode::Timeout,
            ThingsError::ThingsNotRunning(_) => ErrorCode::ThingsNotRunning,
            ThingsError::PermissionDenied(_) => ErrorCode::PermissionDenied,
            ThingsError::Parse(_) => ErrorCode::ParseError,
            ThingsError::ToolNotFound => ErrorCode::ToolNotFound,
            ThingsError::MethodNotFound => ErrorCode::MethodNotFound,
            ThingsError::Io(_) | ThingsError::SerdeJson(_) | ThingsError::Internal(_) => {
                ErrorCode::InternalError
            }
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ThingsError::Execution { .. } | ThingsError::Timeout(_) => ErrorKind::Transient,
            ThingsError::Validation { .. } | ThingsError::NotFound { .. } => ErrorKind::Validation,
            ThingsError::Parse(_) | ThingsError::SerdeJson(_) => ErrorKind::Parse,
            _ => ErrorKind::Permanent,
        }
    }

    pub fn to_jsonrpc_error(&self) -> serde_json::Value {
        let (code, message) = match self {
            ThingsError::ToolNotFound => (-32602, "Tool not found".to_string()),
            ThingsError::Validation { message, .. } => (-32602, message.to_string()),
            ThingsError::MethodNotFound => (-32601, "Method not found".to_string()),
            ThingsError::SerdeJson(e) => (-32602, format!("Invalid params: {}", e)),
            err => (-32603, err.to_string()),
        };

        json!({
            "code": code,
            "message": message,
        })
    }
}

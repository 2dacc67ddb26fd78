//! Error types for the Mnemograph server.

use mnemograph_memory::MemoryError;
use thiserror::Error;

use crate::mcp::protocol::{JsonRpcError, INTERNAL_ERROR, INVALID_PARAMS, METHOD_NOT_FOUND};

/// Errors that can occur while serving requests.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Memory store not initialized")]
    NotInitialized,

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ServerError {
    pub fn invalid_params(msg: impl Into<String>) -> Self {
        Self::InvalidParams(msg.into())
    }

    /// True if the request itself was at fault
    pub fn is_caller_error(&self) -> bool {
        match self {
            Self::InvalidParams(_) | Self::UnknownTool(_) => true,
            Self::Memory(e) => e.is_caller_error(),
            _ => false,
        }
    }
}

impl From<ServerError> for JsonRpcError {
    fn from(err: ServerError) -> Self {
        let code = match &err {
            ServerError::UnknownTool(_) => METHOD_NOT_FOUND,
            e if e.is_caller_error() => INVALID_PARAMS,
            _ => INTERNAL_ERROR,
        };
        JsonRpcError::new(code, err.to_string())
    }
}

/// Result type alias for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            ServerError::NotInitialized.to_string(),
            "Memory store not initialized"
        );
        assert_eq!(
            ServerError::invalid_params("missing 'query'").to_string(),
            "Invalid params: missing 'query'"
        );
        let err: ServerError = MemoryError::not_found("memory 1").into();
        assert_eq!(err.to_string(), "Not found: memory 1");
    }

    #[test]
    fn test_jsonrpc_codes() {
        let err: JsonRpcError = ServerError::invalid_params("bad").into();
        assert_eq!(err.code, INVALID_PARAMS);

        let err: JsonRpcError = ServerError::UnknownTool("nope".into()).into();
        assert_eq!(err.code, METHOD_NOT_FOUND);
        assert_eq!(err.message, "Unknown tool: nope");

        let err: JsonRpcError =
            ServerError::from(MemoryError::invalid_argument("limit must be greater than 0")).into();
        assert_eq!(err.code, INVALID_PARAMS);

        let err: JsonRpcError = ServerError::NotInitialized.into();
        assert_eq!(err.code, INTERNAL_ERROR);

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: JsonRpcError = ServerError::from(io).into();
        assert_eq!(err.code, INTERNAL_ERROR);
    }
}

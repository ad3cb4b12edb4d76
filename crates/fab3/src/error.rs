use std::fmt;

use fabric_protos::{
    ArtifactError,
    IdentityError,
};
use thiserror::Error;

pub type Result<T, E = Fab3Error> = std::result::Result<T, E>;

/// Failure of a gateway operation. Every variant carries its root cause.
#[derive(Debug, Error)]
pub enum Fab3Error {
    #[error("malformed input: {0}")]
    MalformedInput(String),
    #[error("unsupported block tag {0}: the ledger does not expose in-progress blocks")]
    UnknownBlockTag(String),
    #[error("failed to query the ledger: {0}")]
    LedgerUnavailable(String),
    #[error("evm execution failed: {0}")]
    EvmExecution(String),
    #[error("failed to decode ledger artifact: {0}")]
    DecodeFailure(String),
    #[error("failed to derive address: {0}")]
    IdentityFailure(#[from] IdentityError),
    #[error("filter {0} not found")]
    FilterExpired(String),
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("bind or socket error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP server error: {0}")]
    Hyper(#[from] hyper::Error),
}

impl From<ArtifactError> for Fab3Error {
    fn from(e: ArtifactError) -> Self {
        Self::DecodeFailure(e.to_string())
    }
}

impl Fab3Error {
    pub fn malformed(message: impl fmt::Display) -> Self {
        Self::MalformedInput(message.to_string())
    }

    pub fn code(&self) -> JsonRpcErrorCode {
        match self {
            Self::MalformedInput(_) | Self::UnknownBlockTag(_) | Self::Unsupported(_) => {
                JsonRpcErrorCode::InvalidParams
            }
            Self::FilterExpired(_) => JsonRpcErrorCode::FilterNotFound,
            _ => JsonRpcErrorCode::InternalError,
        }
    }
}

/// JSON-RPC error codes used by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonRpcErrorCode {
    ParseError = -32700,
    InvalidRequest = -32600,
    MethodNotFound = -32601,
    InvalidParams = -32602,
    InternalError = -32603,
    FilterNotFound = -32000,
}

impl fmt::Display for JsonRpcErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", *self as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameter_errors_map_to_invalid_params() {
        assert_eq!(
            Fab3Error::malformed("bad hex").code(),
            JsonRpcErrorCode::InvalidParams
        );
        assert_eq!(
            Fab3Error::UnknownBlockTag("pending".into()).code(),
            JsonRpcErrorCode::InvalidParams
        );
        assert_eq!(
            Fab3Error::FilterExpired("0x1".into()).code() as i32,
            -32000
        );
        assert_eq!(
            Fab3Error::LedgerUnavailable("down".into()).code(),
            JsonRpcErrorCode::InternalError
        );
    }

    #[test]
    fn messages_carry_the_root_cause() {
        let err = Fab3Error::from(ArtifactError::NoActions);
        assert!(err.to_string().starts_with("failed to decode ledger artifact"));
        assert!(err.to_string().contains(&ArtifactError::NoActions.to_string()));
    }
}

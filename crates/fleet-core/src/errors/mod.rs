use thiserror::Error;

use crate::proto::{ErrorCode, RpcError};

#[derive(Debug, Error)]
pub enum FleetError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("server is disabled: {0}")]
    ServerDisabled(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("I/O error while {context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl FleetError {
    pub fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }

    pub fn storage(err: impl std::fmt::Display) -> Self {
        Self::Storage(err.to_string())
    }

    pub fn protocol(err: impl std::fmt::Display) -> Self {
        Self::Protocol(err.to_string())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Configuration(_) => ErrorCode::InvalidConfig,
            Self::SourceUnavailable(_) => ErrorCode::SourceUnavailable,
            Self::InvalidAddress(_) => ErrorCode::InvalidConfig,
            Self::Protocol(_) => ErrorCode::ProtocolError,
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::Storage(_) => ErrorCode::StorageError,
            Self::ServerDisabled(_) => ErrorCode::ServerDisabled,
            Self::InvalidRequest(_) => ErrorCode::BadRequest,
            Self::Io { .. } => ErrorCode::IoError,
        }
    }
}

/// Map internal errors -> stable wire errors.
impl From<FleetError> for RpcError {
    fn from(e: FleetError) -> Self {
        let details = match &e {
            FleetError::Io { context, .. } => {
                [("context".into(), (*context).into())].into_iter().collect()
            }
            _ => Default::default(),
        };
        RpcError {
            code: e.code(),
            message: e.to_string(),
            details,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_keep_their_context_on_the_wire() {
        let err = FleetError::io(
            "writing archive",
            std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        );
        let rpc: RpcError = err.into();
        assert!(matches!(rpc.code, ErrorCode::IoError));
        assert_eq!(rpc.details.get("context").map(String::as_str), Some("writing archive"));
        assert!(rpc.message.contains("disk full"));
    }

    #[test]
    fn not_found_maps_to_not_found_code() {
        let rpc: RpcError = FleetError::NotFound("backup b1".into()).into();
        assert!(matches!(rpc.code, ErrorCode::NotFound));
        assert!(rpc.details.is_empty());
    }
}

use bridge_traits::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportingError {
    #[error("Failed to encode descriptor: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Malformed transport payload: {0}")]
    Decode(String),

    #[error("Transport closed: native worker is no longer running")]
    TransportClosed,

    #[error(transparent)]
    Runtime(#[from] core_runtime::Error),

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

pub type Result<T> = std::result::Result<T, ReportingError>;

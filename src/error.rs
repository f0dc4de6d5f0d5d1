use crate::config::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to bind udp endpoint {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Malformed inbound payload. The datagram is dropped.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid JSON format: {0}")]
    Json(#[from] serde_json::Error),
    #[error("payload is not a JSON object")]
    NotAnObject,
}

/// Outbound failure. Logged, never propagated to ingestion.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to resolve {host}:{port}: {source}")]
    Resolve {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },
    #[error("no address found for {host}:{port}")]
    NoAddress { host: String, port: u16 },
    #[error("failed to create udp socket: {0}")]
    Socket(#[source] std::io::Error),
    #[error("udp send failed: {0}")]
    Send(#[source] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to spawn alert process `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("alert process has no stdin pipe")]
    MissingStdin,
    #[error("alert process input closed")]
    Input,
    #[error("alert process exited abnormally (code: {code:?})")]
    Exited { code: Option<i32> },
}

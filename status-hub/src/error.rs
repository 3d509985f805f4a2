use std::{io, net::SocketAddr};

use thiserror::Error;

use crate::hub::SubscriberId;

/// Failure while decoding frames off an ingestion connection.
///
/// Every variant ends the session that produced it; no partial message is
/// ever submitted to the hub.
#[derive(Debug, Error)]
pub enum FramingError {
    #[error("connection closed before a length prefix was read")]
    Closed,
    #[error("connection closed after {received} of 8 length prefix bytes")]
    TruncatedPrefix { received: usize },
    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: u64, max: u64 },
    #[error("connection closed after {received} of {expected} payload bytes")]
    TruncatedPayload { expected: u64, received: u64 },
    #[error("failed to read from connection: {0}")]
    Io(#[from] io::Error),
}

impl FramingError {
    /// True when the producer hung up cleanly on a frame boundary.
    pub fn is_clean_close(&self) -> bool {
        matches!(self, FramingError::Closed)
    }
}

#[derive(Debug, Error)]
#[error("websocket upgrade failed: {0}")]
pub struct UpgradeError(#[source] pub axum::Error);

#[derive(Debug, Error)]
#[error("failed to deliver message to subscriber {subscriber}: {source}")]
pub struct DeliveryError {
    pub subscriber: SubscriberId,
    #[source]
    pub source: axum::Error,
}

/// Fatal listener failures. The process has no purpose without its listeners.
#[derive(Debug, Error)]
pub enum ListenError {
    #[error("failed to bind {kind} listener on {addr}: {source}")]
    Bind {
        kind: &'static str,
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("failed to accept on {kind} listener: {source}")]
    Accept {
        kind: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("http server stopped: {0}")]
    Serve(#[source] io::Error),
}

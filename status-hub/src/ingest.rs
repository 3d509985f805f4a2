//! TCP ingestion: one session per producer connection, each running a
//! [`FrameReader`] and submitting every decoded message to the hub.

use std::{future::Future, net::SocketAddr};

use tokio::{
    io::AsyncRead,
    net::{TcpListener, TcpStream},
    select,
};
use tracing::{debug, info, warn};

use crate::{
    error::{FramingError, ListenError},
    frame::{DEFAULT_MAX_FRAME_LEN, FrameReader},
    hub::Hub,
};

pub struct Ingestor {
    listener: TcpListener,
    hub: Hub,
    max_frame_len: u64,
}

impl Ingestor {
    pub fn new(listener: TcpListener, hub: Hub) -> Self {
        Self {
            listener,
            hub,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }

    pub async fn bind(addr: SocketAddr, hub: Hub) -> Result<Self, ListenError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ListenError::Bind {
                kind: "tcp",
                addr,
                source,
            })?;
        Ok(Self::new(listener, hub))
    }

    pub fn with_max_frame_len(mut self, max_frame_len: u64) -> Self {
        self.max_frame_len = max_frame_len;
        self
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts producers until `shutdown` resolves. An accept failure is
    /// fatal and returned; a failing session never is.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), ListenError>
    where
        F: Future<Output = ()> + Send,
    {
        let Ingestor {
            listener,
            hub,
            max_frame_len,
        } = self;
        tokio::pin!(shutdown);

        loop {
            select! {
                _ = &mut shutdown => {
                    info!("tcp ingestion shutting down");
                    break;
                }
                accept_result = listener.accept() => {
                    let (stream, peer) = accept_result
                        .map_err(|source| ListenError::Accept { kind: "tcp", source })?;
                    spawn_session(stream, peer, hub.clone(), max_frame_len);
                }
            }
        }

        Ok(())
    }
}

fn spawn_session(stream: TcpStream, peer: SocketAddr, hub: Hub, max_frame_len: u64) {
    tokio::spawn(async move {
        info!(%peer, "producer connected");
        let summary = run_session(stream, &hub, max_frame_len).await;
        if summary.end.is_clean_close() {
            info!(%peer, messages = summary.messages, "producer disconnected");
        } else {
            warn!(
                %peer,
                messages = summary.messages,
                error = %summary.end,
                "closing producer connection"
            );
        }
    });
}

/// How a producer session ended.
#[derive(Debug)]
pub struct SessionSummary {
    pub messages: u64,
    pub end: FramingError,
}

/// Reads frames until the first framing error, submitting each one.
///
/// Dropping `reader` when this returns closes the connection.
pub async fn run_session<R>(reader: R, hub: &Hub, max_frame_len: u64) -> SessionSummary
where
    R: AsyncRead + Unpin,
{
    let mut frames = FrameReader::with_max_frame_len(reader, max_frame_len);
    let mut messages = 0;

    loop {
        match frames.read_frame().await {
            Ok(message) => {
                let len = message.len();
                let outcome = hub.submit(message).await;
                messages += 1;
                debug!(
                    len,
                    delivered = outcome.delivered,
                    dropped = outcome.dropped,
                    "message submitted"
                );
            }
            Err(end) => return SessionSummary { messages, end },
        }
    }
}

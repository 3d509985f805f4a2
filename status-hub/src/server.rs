use std::{future::Future, io, net::SocketAddr, path::PathBuf, time::Duration};

use axum::Router;
use tokio::{net::TcpListener, select, sync::watch};
use tracing::{info, warn};

use crate::{
    error::ListenError,
    frame::DEFAULT_MAX_FRAME_LEN,
    gateway, generator,
    hub::{DEFAULT_QUEUE_CAPACITY, Hub},
    ingest::Ingestor,
};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub tcp_addr: SocketAddr,
    pub http_addr: SocketAddr,
    pub web_root: PathBuf,
    pub queue_capacity: usize,
    pub max_frame_len: u64,
    /// Run the synthetic producer at this interval when set.
    pub generator_interval: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tcp_addr: SocketAddr::from(([0, 0, 0, 0], 1337)),
            http_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            web_root: PathBuf::from("web"),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            generator_interval: None,
        }
    }
}

/// Both listeners bound around one hub, ready to run.
pub struct Server {
    hub: Hub,
    ingestor: Ingestor,
    http_listener: TcpListener,
    router: Router,
    generator_interval: Option<Duration>,
}

impl Server {
    pub async fn bind(config: ServerConfig) -> Result<Self, ListenError> {
        let hub = Hub::with_queue_capacity(config.queue_capacity);

        let ingestor = Ingestor::bind(config.tcp_addr, hub.clone())
            .await?
            .with_max_frame_len(config.max_frame_len);
        let http_listener =
            TcpListener::bind(config.http_addr)
                .await
                .map_err(|source| ListenError::Bind {
                    kind: "http",
                    addr: config.http_addr,
                    source,
                })?;
        let router = gateway::router(hub.clone(), &config.web_root);

        Ok(Self {
            hub,
            ingestor,
            http_listener,
            router,
            generator_interval: config.generator_interval,
        })
    }

    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    pub fn tcp_addr(&self) -> io::Result<SocketAddr> {
        self.ingestor.local_addr()
    }

    pub fn http_addr(&self) -> io::Result<SocketAddr> {
        self.http_listener.local_addr()
    }

    /// Serves until `shutdown` resolves or a listener fails.
    ///
    /// On shutdown both listeners stop accepting and the hub is closed, which
    /// ends every viewer session.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), ListenError>
    where
        F: Future<Output = ()> + Send,
    {
        let Server {
            hub,
            ingestor,
            http_listener,
            router,
            generator_interval,
        } = self;
        let (stop_tx, stop_rx) = watch::channel(false);

        let generator = generator_interval.map(|interval| {
            tokio::spawn(generator::run(hub.clone(), interval, stopped(stop_rx.clone())))
        });

        let ingest = ingestor.run_until(stopped(stop_rx.clone()));
        let http = async move {
            axum::serve(http_listener, router)
                .with_graceful_shutdown(stopped(stop_rx))
                .await
                .map_err(ListenError::Serve)
        };
        let serving = async move { tokio::try_join!(ingest, http).map(|_| ()) };
        tokio::pin!(serving);

        let result = select! {
            result = &mut serving => result,
            _ = shutdown => {
                info!("shutting down");
                let _ = stop_tx.send(true);
                let closed = hub.close().await;
                info!(viewers = closed, "closed viewer sessions");
                serving.await
            }
        };

        drop(stop_tx);
        if let Some(task) = generator {
            if let Err(err) = task.await {
                warn!(error = ?err, "message generator task failed");
            }
        }

        result
    }

    pub async fn run_until_ctrl_c(self) -> Result<(), ListenError> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
            }
        })
        .await
    }
}

/// Resolves once a stop has been requested or the stop sender is gone.
async fn stopped(mut stop: watch::Receiver<bool>) {
    let _ = stop.wait_for(|stop| *stop).await;
}

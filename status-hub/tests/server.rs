use std::{net::SocketAddr, path::PathBuf, time::Duration};

use anyhow::{Result, anyhow};
use futures::{SinkExt, StreamExt};
use status_hub::{
    frame::write_frame,
    hub::Hub,
    server::{Server, ServerConfig},
};
use tokio::{
    net::TcpStream,
    sync::oneshot,
    task::JoinHandle,
    time::{sleep, timeout},
};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message,
};

const READ_TIMEOUT: Duration = Duration::from_secs(3);

type Viewer = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct RunningServer {
    hub: Hub,
    tcp_addr: SocketAddr,
    http_addr: SocketAddr,
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl RunningServer {
    async fn start() -> Result<Self> {
        let config = ServerConfig {
            tcp_addr: "127.0.0.1:0".parse()?,
            http_addr: "127.0.0.1:0".parse()?,
            web_root: PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("web"),
            ..ServerConfig::default()
        };
        let server = Server::bind(config).await?;
        let hub = server.hub().clone();
        let tcp_addr = server.tcp_addr()?;
        let http_addr = server.http_addr()?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let shutdown = async move {
                let _ = shutdown_rx.await;
            };
            let _ = server.run_until(shutdown).await;
        });

        Ok(Self {
            hub,
            tcp_addr,
            http_addr,
            shutdown_tx,
            task,
        })
    }

    async fn connect_viewer(&self) -> Result<Viewer> {
        let before = self.hub.subscriber_count().await;
        let (viewer, _) = connect_async(format!("ws://{}/status", self.http_addr)).await?;
        self.wait_for_subscribers(before + 1).await?;
        Ok(viewer)
    }

    async fn wait_for_subscribers(&self, expected: usize) -> Result<()> {
        timeout(READ_TIMEOUT, async {
            while self.hub.subscriber_count().await != expected {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .map_err(|_| anyhow!("timed out waiting for {expected} subscribers"))
    }

    async fn stop(self) -> Result<()> {
        let _ = self.shutdown_tx.send(());
        timeout(READ_TIMEOUT, self.task).await??;
        Ok(())
    }
}

async fn next_message(viewer: &mut Viewer) -> Result<Message> {
    loop {
        let message = timeout(READ_TIMEOUT, viewer.next())
            .await?
            .ok_or_else(|| anyhow!("viewer stream ended"))??;
        if !matches!(message, Message::Ping(_) | Message::Pong(_)) {
            return Ok(message);
        }
    }
}

#[tokio::test]
async fn producer_frames_reach_every_viewer() -> Result<()> {
    let server = RunningServer::start().await?;
    let mut alice = server.connect_viewer().await?;
    let mut bob = server.connect_viewer().await?;

    let mut producer = TcpStream::connect(server.tcp_addr).await?;
    write_frame(&mut producer, b"hello").await?;
    write_frame(&mut producer, &[0xff, 0x01]).await?;

    for viewer in [&mut alice, &mut bob] {
        assert_eq!(next_message(viewer).await?, Message::Text("hello".into()));
        assert_eq!(next_message(viewer).await?, Message::Binary(vec![0xff, 0x01]));
    }

    server.stop().await
}

#[tokio::test]
async fn closing_a_viewer_unregisters_it() -> Result<()> {
    let server = RunningServer::start().await?;
    let mut leaving = server.connect_viewer().await?;
    let mut staying = server.connect_viewer().await?;

    leaving.close(None).await?;
    server.wait_for_subscribers(1).await?;

    let outcome = server.hub.submit(b"still here".to_vec()).await;
    assert_eq!(outcome.delivered, 1);
    assert_eq!(
        next_message(&mut staying).await?,
        Message::Text("still here".into())
    );

    server.stop().await
}

#[tokio::test]
async fn dropped_viewer_connection_is_evicted_once() -> Result<()> {
    let server = RunningServer::start().await?;
    let mut staying = server.connect_viewer().await?;
    let vanishing = server.connect_viewer().await?;

    // No close handshake: the TCP stream just goes away.
    drop(vanishing);

    timeout(READ_TIMEOUT, async {
        while server.hub.subscriber_count().await != 1 {
            server.hub.submit(b"tick".to_vec()).await;
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .map_err(|_| anyhow!("dropped viewer was never evicted"))?;

    let stats = server.hub.stats().await;
    assert_eq!(stats.registered, 2);
    assert_eq!(stats.unregistered, 1);
    assert_eq!(next_message(&mut staying).await?, Message::Text("tick".into()));

    server.stop().await
}

#[tokio::test]
async fn shutdown_closes_viewer_sockets() -> Result<()> {
    let server = RunningServer::start().await?;
    let mut viewer = server.connect_viewer().await?;
    let hub = server.hub.clone();

    server.stop().await?;

    let ended = timeout(READ_TIMEOUT, async {
        loop {
            match viewer.next().await {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(ended.is_ok(), "viewer socket should close on shutdown");
    assert_eq!(hub.subscriber_count().await, 0);
    Ok(())
}

#[tokio::test]
async fn plain_http_request_to_status_registers_nothing() -> Result<()> {
    let server = RunningServer::start().await?;

    let mut stream = TcpStream::connect(server.http_addr).await?;
    tokio::io::AsyncWriteExt::write_all(
        &mut stream,
        b"GET /status HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    )
    .await?;
    let mut response = Vec::new();
    timeout(
        READ_TIMEOUT,
        tokio::io::AsyncReadExt::read_to_end(&mut stream, &mut response),
    )
    .await??;

    let response = String::from_utf8_lossy(&response);
    assert!(!response.starts_with("HTTP/1.1 101"), "got: {response}");
    assert_eq!(server.hub.subscriber_count().await, 0);

    server.stop().await
}

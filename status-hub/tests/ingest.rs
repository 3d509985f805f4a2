use std::time::Duration;

use anyhow::Result;
use status_hub::{
    frame::{encode_frame, write_frame},
    hub::{Hub, Subscription},
    ingest::Ingestor,
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    sync::oneshot,
    task::JoinHandle,
    time::timeout,
};

const READ_TIMEOUT: Duration = Duration::from_secs(2);

async fn start_ingestor(hub: Hub) -> Result<(std::net::SocketAddr, oneshot::Sender<()>, JoinHandle<()>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let ingestor = Ingestor::new(listener, hub);

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        let shutdown = async move {
            let _ = shutdown_rx.await;
        };
        let _ = ingestor.run_until(shutdown).await;
    });

    Ok((addr, shutdown_tx, server))
}

async fn next_message(subscriber: &mut Subscription) -> Result<Vec<u8>> {
    let message = timeout(READ_TIMEOUT, subscriber.recv())
        .await?
        .expect("subscription should stay open");
    Ok(message.to_vec())
}

#[tokio::test]
async fn truncated_session_does_not_affect_healthy_session() -> Result<()> {
    let hub = Hub::new();
    let mut first = hub.register().await;
    let mut second = hub.register().await;
    let (addr, shutdown_tx, server) = start_ingestor(hub.clone()).await?;

    let mut healthy = TcpStream::connect(addr).await?;
    let mut broken = TcpStream::connect(addr).await?;

    // Declares ten payload bytes, sends three, then hangs up its write side.
    broken.write_all(&10u64.to_be_bytes()).await?;
    broken.write_all(b"abc").await?;
    broken.shutdown().await?;

    write_frame(&mut healthy, b"A").await?;

    assert_eq!(next_message(&mut first).await?, b"A");
    assert_eq!(next_message(&mut second).await?, b"A");

    // The hub closes the broken connection without sending anything back.
    let mut leftover = Vec::new();
    let read = timeout(READ_TIMEOUT, broken.read_to_end(&mut leftover)).await??;
    assert_eq!(read, 0);

    // The healthy producer keeps going after its neighbour was dropped.
    write_frame(&mut healthy, b"B").await?;
    assert_eq!(next_message(&mut first).await?, b"B");
    assert_eq!(next_message(&mut second).await?, b"B");
    assert!(first.try_recv().is_err());

    let _ = shutdown_tx.send(());
    server.await?;
    Ok(())
}

#[tokio::test]
async fn frames_from_one_producer_arrive_in_order() -> Result<()> {
    let hub = Hub::new();
    let mut subscriber = hub.register().await;
    let (addr, shutdown_tx, server) = start_ingestor(hub.clone()).await?;

    let mut producer = TcpStream::connect(addr).await?;
    let mut wire = Vec::new();
    for index in 0..20u32 {
        wire.extend(encode_frame(format!("message {index}").as_bytes()));
    }
    // One write carrying many frames, so frame boundaries fall mid-segment.
    producer.write_all(&wire).await?;
    producer.shutdown().await?;

    for index in 0..20u32 {
        assert_eq!(
            next_message(&mut subscriber).await?,
            format!("message {index}").into_bytes()
        );
    }

    let _ = shutdown_tx.send(());
    server.await?;
    Ok(())
}

#[tokio::test]
async fn oversized_frame_closes_only_that_connection() -> Result<()> {
    let hub = Hub::new();
    let mut subscriber = hub.register().await;
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let ingestor = Ingestor::new(listener, hub.clone()).with_max_frame_len(4);

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        let _ = ingestor
            .run_until(async move {
                let _ = shutdown_rx.await;
            })
            .await;
    });

    let mut hostile = TcpStream::connect(addr).await?;
    hostile.write_all(&u64::MAX.to_be_bytes()).await?;
    let mut leftover = Vec::new();
    let read = timeout(READ_TIMEOUT, hostile.read_to_end(&mut leftover)).await??;
    assert_eq!(read, 0);

    let mut producer = TcpStream::connect(addr).await?;
    write_frame(&mut producer, b"ok").await?;
    assert_eq!(next_message(&mut subscriber).await?, b"ok");

    let _ = shutdown_tx.send(());
    server.await?;
    Ok(())
}

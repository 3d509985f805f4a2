use anyhow::{Context, Result};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    net::TcpStream,
};
use tracing::info;

use crate::{cli::PublishArgs, frame::write_frame};

/// Connects to the ingestion port and sends each stdin line as one frame.
pub async fn run(args: PublishArgs) -> Result<()> {
    let mut stream = TcpStream::connect(args.server)
        .await
        .with_context(|| format!("failed to connect to {}", args.server))?;
    info!(server = %args.server, "publishing stdin lines");

    let stdin = BufReader::new(tokio::io::stdin());
    let sent = publish_lines(stdin, &mut stream).await?;
    stream.shutdown().await?;

    info!(messages = sent, "publisher finished");
    Ok(())
}

/// Frames every non-empty line from `reader` onto `writer`.
pub async fn publish_lines<R, W>(reader: R, writer: &mut W) -> Result<u64>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    let mut sent = 0;

    while let Some(line) = lines.next_line().await.context("failed to read input")? {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        write_frame(writer, line.as_bytes())
            .await
            .context("failed to send frame")?;
        sent += 1;
    }

    Ok(sent)
}

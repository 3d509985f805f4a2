use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use status_hub::{
    cli::{Cli, Command},
    publisher,
    server::Server,
};

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => {
            let server = Server::bind(args.into()).await?;
            info!("tcp listener on {}", server.tcp_addr()?);
            info!("http listener on {}", server.http_addr()?);
            if let Err(err) = server.run_until_ctrl_c().await {
                warn!("hub exited with error: {err}");
                return Err(err.into());
            }
        }
        Command::Publish(args) => publisher::run(args).await?,
    }

    Ok(())
}

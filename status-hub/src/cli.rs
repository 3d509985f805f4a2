use std::{net::SocketAddr, path::PathBuf, time::Duration};

use clap::{Args, Parser, Subcommand, ValueHint};

use crate::{frame::DEFAULT_MAX_FRAME_LEN, hub::DEFAULT_QUEUE_CAPACITY, server::ServerConfig};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the hub: TCP ingestion plus the WebSocket status endpoint.
    Serve(ServeArgs),
    /// Send each line read from stdin to a running hub as one message.
    Publish(PublishArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Address producers connect to. Use port 0 for an ephemeral port.
    #[arg(long, default_value = "0.0.0.0:1337")]
    pub tcp_listen: SocketAddr,

    /// Address serving the viewer page and the /status WebSocket.
    #[arg(long, default_value = "127.0.0.1:8080")]
    pub http_listen: SocketAddr,

    /// Directory of static files served at the root path.
    #[arg(long, default_value = "web", value_hint = ValueHint::DirPath)]
    pub web_root: PathBuf,

    /// Messages each viewer may have pending before new ones are dropped.
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,

    /// Largest accepted frame payload in bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_FRAME_LEN)]
    pub max_frame_len: u64,

    /// Generate random status messages.
    #[arg(long)]
    pub msg_gen: bool,

    /// Milliseconds between generated messages.
    #[arg(long, default_value_t = 1500)]
    pub msg_gen_interval_ms: u64,
}

#[derive(Args, Debug, Clone)]
pub struct PublishArgs {
    /// Ingestion address of the hub.
    #[arg(long, default_value = "127.0.0.1:1337")]
    pub server: SocketAddr,
}

impl From<ServeArgs> for ServerConfig {
    fn from(args: ServeArgs) -> Self {
        ServerConfig {
            tcp_addr: args.tcp_listen,
            http_addr: args.http_listen,
            web_root: args.web_root,
            queue_capacity: args.queue_capacity,
            max_frame_len: args.max_frame_len,
            generator_interval: args
                .msg_gen
                .then(|| Duration::from_millis(args.msg_gen_interval_ms)),
        }
    }
}

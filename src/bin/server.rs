use clap::Parser;
use tracing_subscriber::EnvFilter;
use wust_relay::{RelayConfig, RelayServer, UpgradeError};

#[derive(Parser)]
#[command(author, version, about)]
struct Args {
    /// Address to listen on
    #[arg(short, long, default_value = "localhost")]
    addr: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    /// Send a close frame carrying the status code before disconnecting
    #[arg(long)]
    close_frame: bool,

    /// Message that disconnects its sender
    #[arg(long, default_value = "EXIT")]
    sentinel: String,

    /// Queue depth of the registry task
    #[arg(long, default_value_t = 256)]
    backlog: usize,
}

impl From<Args> for RelayConfig {
    fn from(args: Args) -> Self {
        Self {
            addr: format!("{}:{}", args.addr, args.port),
            close_frame: args.close_frame,
            sentinel: args.sentinel,
            backlog: args.backlog,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), UpgradeError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("wust_relay=info".parse().unwrap()),
        )
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();

    let server = RelayServer::bind(args.into()).await?;
    server.run().await
}

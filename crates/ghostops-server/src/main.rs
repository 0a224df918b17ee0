use clap::Parser;
use ghostops_server::config::Config;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ghostops", about = "Session token gate for GhostOps paid tools")]
struct Args {
    /// Port to listen on.
    #[arg(long, env = "GHOSTOPS_PORT", default_value_t = 8787)]
    port: u16,

    /// Address to bind.
    #[arg(long, env = "GHOSTOPS_BIND", default_value = "0.0.0.0")]
    bind: std::net::IpAddr,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("ghostops_server=info,tower_http=info")),
        )
        .init();

    let args = Args::parse();
    let config = Config::from_env()?;
    let addr = std::net::SocketAddr::new(args.bind, args.port);
    ghostops_server::serve(config, addr).await
}

use clap::Parser;
use log::{error, info};
use server::arena::ArenaLand;
use server::config::{MismatchPolicy, ServerConfig};
use server::error::ServerError;
use server::land::Land;
use server::network::Server;
use shared::schema::ProtocolSchema;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Authoritative state sync server")]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Server port to listen on
    #[clap(short, long, default_value = "8080")]
    port: u16,
    /// Tick rate (sync rounds per second)
    #[clap(short, long, default_value = "30")]
    tick_rate: u32,
    /// Maximum number of connected clients
    #[clap(short, long, default_value = "16")]
    max_clients: usize,
    /// What to do with clients whose schema hash differs
    #[clap(long, value_enum, default_value = "reject")]
    schema_mismatch: MismatchPolicy,
    /// Smoothing factor of the change-rate EMA
    #[clap(long, default_value = "0.2")]
    ema_alpha: f64,
    /// Change rate above which rounds carry full snapshots
    #[clap(long, default_value = "0.5")]
    full_sync_threshold: f64,
    /// Seconds of silence before a client is dropped
    #[clap(long, default_value = "5")]
    client_timeout: u64,
    /// Ticks per arena round
    #[clap(long, default_value = "600")]
    round_ticks: u32,
    /// Write the protocol schema as JSON to this path and exit
    #[clap(long)]
    dump_schema: Option<PathBuf>,
}

impl Args {
    fn config(&self) -> ServerConfig {
        ServerConfig {
            host: self.host.clone(),
            port: self.port,
            tick_rate: self.tick_rate,
            max_clients: self.max_clients,
            schema_mismatch: self.schema_mismatch,
            ema_alpha: self.ema_alpha,
            full_sync_threshold: self.full_sync_threshold,
            client_timeout: Duration::from_secs(self.client_timeout),
        }
    }
}

fn dump_schema(land: &impl Land, path: &Path) -> Result<(), ServerError> {
    let schema = ProtocolSchema::builder().land(land.definition()).build()?;
    std::fs::write(path, schema.to_json_pretty()?)?;
    info!(
        "Wrote schema {} to {}",
        schema.schema_hash,
        path.display()
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let land = ArenaLand::new(rand::random(), args.round_ticks.max(1));

    if let Some(path) = &args.dump_schema {
        dump_schema(&land, path)?;
        return Ok(());
    }

    let mut server = Server::new(&args.config(), land).await?;
    let shutdown = server.shutdown_handle();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down gracefully...");
            shutdown.shutdown();
        }
    });

    if let Err(e) = server.run().await {
        error!("Server stopped: {}", e);
        return Err(e.into());
    }
    Ok(())
}

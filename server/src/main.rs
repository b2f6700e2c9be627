use clap::Parser;
use server::amalgamate::AmalgamateLimits;
use server::loader::{load_dataset, load_groups};
use server::network::{Server, ServerOptions};
use std::path::PathBuf;
use std::sync::Arc;

/// Streams clipped, simplified trajectory polylines to connected
/// viewers; view parameters arrive on separate control connections.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Trajectory dataset file
    datafile: PathBuf,
    /// Address to bind to
    #[clap(short = 'H', long, default_value = "0.0.0.0")]
    host: String,
    /// Port to listen on
    #[clap(short, long, default_value = "3333")]
    port: u16,
    /// Maximum simultaneous connections
    #[clap(short = 'n', long, default_value = "5")]
    max_connections: usize,
    /// Group definition file
    #[clap(short, long)]
    groups: Option<PathBuf>,
    /// Page served at GET /control/html
    #[clap(long)]
    html: Option<PathBuf>,
    /// Trajectories rendered per group
    #[clap(long, default_value = "4")]
    group_cap: usize,
    /// Longest run the record encoder accepts
    #[clap(long, default_value = "10000")]
    max_run_points: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let dataset = Arc::new(load_dataset(&args.datafile)?);
    let groups = Arc::new(load_groups(args.groups.as_deref(), &dataset)?);

    let options = ServerOptions {
        max_connections: args.max_connections,
        html_path: args.html,
        limits: AmalgamateLimits {
            group_cap: args.group_cap,
            max_run_points: args.max_run_points,
        },
        ..ServerOptions::default()
    };

    let address = format!("{}:{}", args.host, args.port);
    let mut server = Server::new(&address, dataset, groups, options).await?;
    server.run().await
}

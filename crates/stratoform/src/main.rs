mod logging;

use clap::Parser;
use std::io::Write;
use std::net::SocketAddr;
use stratoform_provider::Provider;
use stratoform_rpc::{Handshake, Server};
use tracing::info;

/// Exit code for a missing or wrong magic cookie.
const EXIT_HANDSHAKE: i32 = 1;
/// Exit code for environment settings that are malformed before serving.
const EXIT_CONFIG: i32 = 2;

#[derive(Parser)]
#[command(name = "stratoform")]
#[command(
    version,
    about = "Cloud provider plugin; started by the infrastructure engine",
    long_about = None
)]
struct Cli {
    /// Verbose logging and the object storage trace file (also OS_DEBUG)
    #[arg(long)]
    debug: bool,

    /// Address to serve on instead of a free loopback port
    #[arg(long, env = "STRATOFORM_PLUGIN_LISTEN")]
    listen: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let debug = cli.debug || stratoform_config::env::debug_enabled();
    logging::init(debug)?;

    if let Err(e) = stratoform_rpc::check_cookie() {
        eprintln!("{e}");
        std::process::exit(EXIT_HANDSHAKE);
    }
    if let Err(e) = stratoform_config::env::preflight() {
        eprintln!("Error: {e}");
        std::process::exit(EXIT_CONFIG);
    }

    let server = Server::new(Provider::new(debug));
    let listener = stratoform_rpc::bind(cli.listen).await?;
    let addr = listener.local_addr()?;

    // stdout carries nothing but the handshake line.
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", Handshake::new(addr))?;
    stdout.flush()?;
    drop(stdout);

    info!(%addr, version = env!("CARGO_PKG_VERSION"), "Serving plugin RPCs");
    server.serve(listener).await?;
    info!("Shut down");
    Ok(())
}

//! Lotgrid CLI - shared parking grid editor
//!
//! Binary name: `lotgrid`

use std::process;

use lotgrid::cli::{build_cli, handlers::dispatch};

#[tokio::main]
async fn main() {
    // Logs go to stderr; stdout carries command output only.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let matches = build_cli().get_matches();

    if let Err(err) = dispatch(&matches).await {
        #[allow(clippy::print_stderr)]
        {
            eprintln!("Error: {err:#}");
        }
        let code = err
            .downcast_ref::<lotgrid_core::Error>()
            .map_or(1, lotgrid_core::Error::exit_code);
        #[allow(clippy::exit)]
        process::exit(code);
    }
}

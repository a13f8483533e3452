#![warn(clippy::indexing_slicing)]

use browse_pvc_progress::ProgressTracker;
use clap::Parser;
use config::Cli;
use error::CliError;

mod browse;
mod config;
mod error;
mod logging;

fn main() -> miette::Result<()> {
    rustls::crypto::CryptoProvider::install_default(rustls::crypto::aws_lc_rs::default_provider())
        .expect("Failed to install crypto provider");

    let cli = Cli::parse();
    logging::init_tracing_registry();

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(CliError::RuntimeError)?;

    let progress = ProgressTracker::from_env("kubectl browse-pvc");
    let res = rt.block_on(browse::browse(cli.into(), progress));

    // stdin is read on a blocking thread that only returns after the next key press
    rt.shutdown_background();

    res.map_err(Into::into)
}

pub use clap::Parser;

use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ecloud")]
#[command(about = "Run and inspect the ecloud issuer and storage service")]
#[command(version)]
pub struct Args {
    /// Path to the ecloud config directory (defaults to ~/.ecloud)
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: crate::Command,
}

pub use clap::Parser;

use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "dagtar")]
#[command(about = "Store tar archives as content-addressed DAGs")]
pub struct Args {
    /// Path to the dagtar config directory (defaults to ~/.dagtar)
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: crate::Command,
}

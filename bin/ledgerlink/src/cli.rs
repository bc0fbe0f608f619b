use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ledgerlink")]
#[command(about = "Chain-link consensus node", long_about = None)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config.toml", env = "LEDGERLINK_CONFIG")]
    pub config: PathBuf,

    /// Path to the data directory
    #[arg(short, long, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Feed a JSON array of blocks through the consensus engine
    Import {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Print the active tip
    Tip,
    /// Print the blocks from genesis to a hash (the active tip by default)
    Path {
        #[arg(value_name = "HASH")]
        hash: Option<String>,
    },
}

use std::path::PathBuf;

use clap::Parser;

/// Shell for mia disk images.
///
/// Runs a command script when one is given, otherwise reads
/// commands interactively from stdin.
#[derive(Parser)]
pub struct Cli {
    /// Command script to execute
    #[arg(long, short)]
    pub script: Option<PathBuf>,
}

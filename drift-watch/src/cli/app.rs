use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "drift-watch",
    version,
    about = "Drift Watch - fire a command once a directory has changed enough",
    long_about = "Drift Watch periodically scans one or more directories, weighs every added, modified and removed file by its type, and runs a trigger command once the accumulated weighted change crosses a threshold. A cooldown keeps it from firing too often."
)]
pub struct Cli {
    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Monitor the configured roots until interrupted
    #[command(about = "Start the drift monitor and run until Ctrl-C")]
    Run(RunArgs),

    /// Take a one-shot snapshot
    #[command(about = "Scan a directory once and summarize its weighted size")]
    Scan(ScanArgs),

    /// Report drift against the persisted baseline
    #[command(about = "Compare the current tree with the baseline without changing anything")]
    Status(StatusArgs),

    /// Commit the current tree as the baseline
    #[command(about = "Scan and commit the result as the new baseline without firing")]
    Rebaseline,

    /// Write a default configuration file
    #[command(about = "Initialize drift-watch configuration in the current directory")]
    Init(InitArgs),
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Run a single cycle and exit
    #[arg(long, help = "Run one scan/diff/gate cycle and print its outcome")]
    pub once: bool,
}

#[derive(Parser, Debug)]
pub struct ScanArgs {
    /// Directory to scan instead of the configured roots
    #[arg(help = "Directory to scan (defaults to the configured roots)")]
    pub path: Option<PathBuf>,

    /// Print the full snapshot as JSON
    #[arg(long, help = "Emit the snapshot as JSON")]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Print the report as JSON
    #[arg(long, help = "Emit the status report as JSON")]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Overwrite an existing configuration file
    #[arg(long, help = "Replace an existing configuration file")]
    pub force: bool,
}

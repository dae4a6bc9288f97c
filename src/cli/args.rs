//! CLI argument definitions using clap derive

use crate::config::MAX_CONCURRENCY;
use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

/// nodemap - node to package index builder
///
/// Mirrors the node registry into a local cache and derives a ranked
/// mapping from node identifiers to the packages that provide them.
#[derive(Parser, Debug)]
#[command(name = "nodemap")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Only print errors and the final summary
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file path
    #[arg(short, long, global = true, env = "NODEMAP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Data directory (overrides paths.data_dir)
    #[arg(long, global = true, env = "NODEMAP_DATA_DIR")]
    pub data_dir: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch, refresh community data and rebuild the mappings
    Update(UpdateArgs),

    /// Update the registry cache only
    Fetch(FetchArgs),

    /// Refresh the community extension map
    Community(CommunityArgs),

    /// Build the mappings from the local cache
    Build(BuildArgs),

    /// Check the cache and mapping documents
    Validate(ValidateArgs),

    /// Show or initialize configuration
    Config(ConfigArgs),
}

/// Registry fetch flags shared by `update` and `fetch`
#[derive(Args, Debug, Clone, Default)]
pub struct FetchArgs {
    /// Re-fetch every package, ignoring what is cached
    #[arg(long)]
    pub full: bool,

    /// Re-fetch version lists even for packages checked recently
    #[arg(long)]
    pub refresh_metadata: bool,

    /// Number of parallel registry requests (1-64)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=MAX_CONCURRENCY as i64))]
    pub concurrency: Option<u32>,

    /// Stop the listing after this many pages
    #[arg(long)]
    pub pages: Option<u32>,
}

/// Arguments for the update command
#[derive(Args, Debug)]
pub struct UpdateArgs {
    #[command(flatten)]
    pub fetch: FetchArgs,

    /// Skip community augmentation
    #[arg(long)]
    pub no_community: bool,

    /// Download community data even if the local copy is recent
    #[arg(long, conflicts_with = "no_community")]
    pub force_community: bool,
}

/// Arguments for the community command
#[derive(Args, Debug)]
pub struct CommunityArgs {
    /// Download even if the local copy is recent
    #[arg(short, long)]
    pub force: bool,
}

/// Arguments for the build command
#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Cache file to read
    #[arg(long)]
    pub cache: Option<PathBuf>,

    /// Community snapshot to merge
    #[arg(long)]
    pub community: Option<PathBuf>,

    /// Where to write the mapping document
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Output schema (TOML allow-list)
    #[arg(long)]
    pub schema: Option<PathBuf>,

    /// Registry data only
    #[arg(long, conflicts_with = "community")]
    pub no_augment: bool,
}

/// Arguments for the validate command
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Cache file to check
    #[arg(long)]
    pub cache: Option<PathBuf>,

    /// Mapping document to check
    #[arg(long)]
    pub mappings: Option<PathBuf>,

    /// Treat warnings as errors
    #[arg(long)]
    pub strict: bool,
}

/// Arguments for the config command
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Write a default configuration file
    Init {
        /// Overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

use std::path::PathBuf;

use clap::{ArgAction, ArgGroup, Args, Parser, Subcommand};

pub const STASH_HELP_TEMPLATE: &str =
    "{before-help}\nUsage:\n    {usage}\n\nGlobal options:\n{options}\n";

pub const STASH_BEFORE_HELP: &str = concat!(
    "stash ",
    env!("CARGO_PKG_VERSION"),
    " – Asset manifest cache validator\n\n",
    "\x1b[1;36mCommands\x1b[0m\n",
    "  reconcile        Bring the cache in line with a published manifest.\n",
    "  status           Show what a reconcile would fetch and evict (read-only).\n",
    "  verify           Re-hash every cached asset; --repair drops damaged ones.\n",
    "  manifest         Check or re-render a manifest file.\n",
    "  cache            Maintain the local store.\n",
);

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    propagate_version = false,
    disable_help_subcommand = true,
    before_help = STASH_BEFORE_HELP,
    help_template = STASH_HELP_TEMPLATE
)]
#[allow(clippy::struct_excessive_bools)]
pub struct StashCli {
    #[arg(
        short,
        long,
        help = "Suppress human output (errors still print to stderr)",
        global = true
    )]
    pub quiet: bool,
    #[arg(
        short,
        long,
        action = ArgAction::Count,
        help = "Increase logging (-vv reaches trace)",
        global = true
    )]
    pub verbose: u8,
    #[arg(long, help = "Force trace logging regardless of -v/-q", global = true)]
    pub trace: bool,
    #[arg(
        long,
        help = "Emit {status,message,details} JSON envelopes",
        global = true
    )]
    pub json: bool,
    #[arg(long, help = "Disable colored human output", global = true)]
    pub no_color: bool,
    #[command(subcommand)]
    pub command: CommandGroupCli,
}

#[derive(Subcommand, Debug)]
pub enum CommandGroupCli {
    #[command(
        about = "Fetch, verify, and evict until the cache matches the manifest.",
        override_usage = "stash reconcile --manifest <FILE> (--source-dir <DIR> | --base-url <URL>)"
    )]
    Reconcile(ReconcileArgs),
    #[command(about = "Report what a reconcile would change (read-only).")]
    Status(StatusArgs),
    #[command(about = "Re-hash cached payloads against their recorded digests.")]
    Verify(VerifyArgs),
    #[command(
        about = "Inspect manifest files.",
        override_usage = "stash manifest <check|render> <FILE>",
        subcommand
    )]
    Manifest(ManifestCommand),
    #[command(
        about = "Maintain the local store.",
        override_usage = "stash cache clear",
        subcommand
    )]
    Cache(CacheCommand),
}

#[derive(Args, Debug, Clone, Default)]
pub struct StoreArgs {
    #[arg(
        long,
        value_name = "DIR",
        help = "Store directory (defaults to STASH_STORE_PATH or the user cache dir)"
    )]
    pub store: Option<PathBuf>,
}

#[derive(Args, Debug)]
#[command(group(
    ArgGroup::new("source")
        .required(true)
        .args(["source_dir", "base_url"])
))]
pub struct ReconcileArgs {
    #[arg(long, value_name = "FILE", help = "Manifest to reconcile against")]
    pub manifest: PathBuf,
    #[arg(long, value_name = "DIR", help = "Read assets from a local directory")]
    pub source_dir: Option<PathBuf>,
    #[arg(long, value_name = "URL", help = "Fetch assets relative to this URL")]
    pub base_url: Option<String>,
    #[command(flatten)]
    pub store: StoreArgs,
    #[arg(long, value_name = "N", help = "Maximum fetches in flight")]
    pub concurrency: Option<usize>,
    #[arg(long, value_name = "MS", help = "Per-attempt fetch timeout")]
    pub timeout_ms: Option<u64>,
    #[arg(long, value_name = "N", help = "Attempts per asset, including the first")]
    pub attempts: Option<u32>,
    #[arg(long, help = "Re-hash cached payloads before planning")]
    pub deep_verify: bool,
    #[arg(long, help = "Fail instead of waiting when another pass holds the store")]
    pub no_wait: bool,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    #[arg(long, value_name = "FILE", help = "Manifest to compare against")]
    pub manifest: PathBuf,
    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Args, Debug)]
pub struct VerifyArgs {
    #[command(flatten)]
    pub store: StoreArgs,
    #[arg(long, help = "Delete damaged entries so the next reconcile refetches them")]
    pub repair: bool,
}

#[derive(Subcommand, Debug)]
pub enum ManifestCommand {
    #[command(about = "Parse and validate a manifest.")]
    Check(ManifestFileArgs),
    #[command(about = "Print a manifest in its published form (or as JSON).")]
    Render(ManifestRenderArgs),
}

#[derive(Args, Debug)]
pub struct ManifestFileArgs {
    #[arg(value_name = "FILE")]
    pub file: PathBuf,
}

#[derive(Args, Debug)]
pub struct ManifestRenderArgs {
    #[arg(value_name = "FILE")]
    pub file: PathBuf,
    #[arg(long = "as-json", help = "Render plain JSON instead of the published script")]
    pub as_json: bool,
}

#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    #[command(about = "Remove every cached asset and the recorded baseline.")]
    Clear(StoreArgs),
}

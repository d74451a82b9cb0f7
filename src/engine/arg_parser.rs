use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::types::Id;

/// Retrieve items from the HN API and find discussions that are still simmering.
#[derive(Parser)]
#[command(name = "simmer")]
#[command(about = "Browse HN lists and find active discussions.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the item cache database. Default: simmer.db in the user cache dir.
    #[arg(long, global = true)]
    pub cache_path: Option<PathBuf>,

    /// Disable the on-disk item cache.
    #[arg(long, global = true)]
    pub no_cache: bool,

    /// Maximum concurrent connections to the API.
    #[arg(long, global = true)]
    pub max_connections: Option<usize>,

    /// Emit items as JSON lines instead of formatted text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Verbose output (debug logging, scan progress).
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Retrieve items from the top list.
    Top(ListArgs),
    /// Retrieve items from the new list.
    New(ListArgs),
    /// Retrieve items from the best list.
    Best(ListArgs),
    /// Retrieve items from the ask list.
    Ask(ListArgs),
    /// Retrieve items from the show list.
    Show(ListArgs),
    /// Retrieve items from the jobs list.
    Jobs(ListArgs),
    /// Retrieve specific items by id.
    Item {
        #[arg(value_name = "ID", required = true)]
        ids: Vec<Id>,
    },
    /// Retrieve a user's profile or their submitted items.
    User {
        name: String,
        /// Retrieve the user's submitted items instead of the profile.
        #[arg(long, short = 's')]
        submitted: bool,
        /// Limit the number of submitted items.
        #[arg(long, short = 'l')]
        limit: Option<usize>,
    },
    /// Print the current max item id.
    Max,
    /// Find discussions with recent activity from multiple authors.
    ///
    /// Example: simmer active --max-age 8h --window 30m --min-by 3 --limit 3
    Active {
        /// Time window for activity.
        #[arg(long, value_parser = parse_duration, default_value = "30m")]
        window: Duration,
        /// Maximum age for root items.
        #[arg(long, value_parser = parse_duration, default_value = "8h")]
        max_age: Duration,
        /// Minimum count of unique contributors to activity.
        #[arg(long, default_value_t = 3)]
        min_by: usize,
        /// Limit the number of results.
        #[arg(long, short = 'l', default_value_t = 0)]
        limit: usize,
    },
}

/// List subcommand flags shared by top/new/best/ask/show/jobs.
#[derive(Args)]
pub struct ListArgs {
    /// Limit the number of items.
    #[arg(long, short = 'l')]
    pub limit: Option<usize>,

    /// Print only the ids, skipping item retrieval.
    #[arg(long)]
    pub ids: bool,
}

/// Parse durations like `45s`, `30m`, `8h`, or `2d`. A bare number means
/// seconds.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let (value, unit) = match s.find(|c: char| !c.is_ascii_digit()) {
        Some(split) => s.split_at(split),
        None => (s, "s"),
    };

    let n: u64 = value
        .parse()
        .map_err(|_| format!("invalid duration: {s:?}"))?;

    let seconds = match unit {
        "s" => n,
        "m" => n * 60,
        "h" => n * 60 * 60,
        "d" => n * 24 * 60 * 60,
        _ => return Err(format!("invalid duration unit: {unit:?}")),
    };

    Ok(Duration::from_secs(seconds))
}

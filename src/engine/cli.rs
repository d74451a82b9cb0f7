//! CLI command handling: resolve options (file config then flags), build
//! the client, dispatch the subcommand.

use anyhow::{bail, Result};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;

use crate::client::{default_cache_path, Client};
use crate::core::CancelToken;
use crate::engine::arg_parser::{Cli, Commands};
use crate::engine::handlers;
use crate::utils::config_file::{apply_file_to_opts, load_simmer_toml};
use crate::utils::setup_logging;

/// Resolved run options. File config fills these first; CLI flags win.
pub struct Opts {
    pub max_connections: usize,
    /// None disables the on-disk cache.
    pub cache_path: Option<PathBuf>,
    pub json: bool,
    pub verbose: bool,
    pub color: bool,
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            max_connections: 100,
            cache_path: Some(default_cache_path()),
            json: false,
            verbose: false,
            color: true,
        }
    }
}

fn setup_opts(cli: &Cli) -> Result<Opts> {
    if cli.no_cache && cli.cache_path.is_some() {
        bail!("cannot provide both --no-cache and --cache-path");
    }

    let mut opts = Opts::default();
    if let Some(file) = load_simmer_toml() {
        apply_file_to_opts(&file, &mut opts);
    }

    if let Some(n) = cli.max_connections {
        opts.max_connections = n;
    }
    if let Some(ref path) = cli.cache_path {
        opts.cache_path = Some(path.clone());
    }
    if cli.no_cache {
        opts.cache_path = None;
    }
    if cli.json {
        opts.json = true;
    }
    if cli.verbose {
        opts.verbose = true;
    }

    opts.color = !cli.no_color && std::io::stdout().is_terminal();

    setup_logging(opts.verbose);
    Ok(opts)
}

fn build_client(opts: &Opts) -> Result<Client> {
    let mut builder = Client::builder()
        .max_connections(opts.max_connections)
        .on_cache_error(Arc::new(|e| log::warn!("item cache: {e:#}")));

    builder = match &opts.cache_path {
        Some(path) => builder.file_cache_path(path),
        None => builder.no_file_cache(),
    };

    builder.build()
}

/// Run the parsed command. The client is closed before returning so the
/// worker pool and cache writer shut down cleanly even on error.
pub fn handle_run(cli: &Cli) -> Result<()> {
    let opts = setup_opts(cli)?;
    let token = CancelToken::new();
    let client = build_client(&opts)?;

    let result = dispatch(cli, &opts, &client, &token);

    let closed = client.close();
    result?;
    closed
}

fn dispatch(cli: &Cli, opts: &Opts, client: &Client, token: &CancelToken) -> Result<()> {
    match &cli.command {
        Commands::Top(args) => {
            handlers::handle_list(client, token, opts, client.top_stories(token)?, args)
        }
        Commands::New(args) => {
            handlers::handle_list(client, token, opts, client.new_stories(token)?, args)
        }
        Commands::Best(args) => {
            handlers::handle_list(client, token, opts, client.best_stories(token)?, args)
        }
        Commands::Ask(args) => {
            handlers::handle_list(client, token, opts, client.ask_stories(token)?, args)
        }
        Commands::Show(args) => {
            handlers::handle_list(client, token, opts, client.show_stories(token)?, args)
        }
        Commands::Jobs(args) => {
            handlers::handle_list(client, token, opts, client.job_stories(token)?, args)
        }
        Commands::Item { ids } => handlers::handle_items(client, token, opts, ids.clone()),
        Commands::User {
            name,
            submitted,
            limit,
        } => handlers::handle_user(client, token, opts, name, *submitted, *limit),
        Commands::Max => handlers::handle_max(client, token),
        Commands::Active {
            window,
            max_age,
            min_by,
            limit,
        } => handlers::handle_active(client, token, opts, *window, *max_age, *min_by, *limit),
    }
}

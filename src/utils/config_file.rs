//! Load `simmer.toml` from the user config directory (CLI only). Library
//! callers configure the client through [`ClientBuilder`](crate::ClientBuilder).

use serde::Deserialize;
use std::path::PathBuf;

use crate::engine::cli::Opts;

#[derive(Debug, Deserialize)]
pub(crate) struct SimmerToml {
    #[serde(default)]
    settings: Settings,
}

#[derive(Debug, Default, Deserialize)]
struct Settings {
    max_connections: Option<usize>,
    cache_path: Option<String>,
    json: Option<bool>,
    verbose: Option<bool>,
}

/// Path of the config file, if a config directory exists.
pub(crate) fn config_file_path() -> Option<PathBuf> {
    Some(dirs::config_dir()?.join("simmer.toml"))
}

/// Load the config file if present. Returns None when missing or unreadable.
pub(crate) fn load_simmer_toml() -> Option<SimmerToml> {
    let path = config_file_path()?;
    let s = std::fs::read_to_string(&path).ok()?;
    toml::from_str(&s)
        .map_err(|e| log::warn!("{}: {}", path.display(), e))
        .ok()
}

/// Overwrite opts field from file when present.
macro_rules! apply_file_opt {
    ($settings:expr, $opts:expr, $field:ident) => {
        if let Some(v) = $settings.$field {
            $opts.$field = v;
        }
    };
}

/// Apply file config to opts (only fields present in the file). Call before
/// applying CLI flags so flags win.
pub(crate) fn apply_file_to_opts(file: &SimmerToml, opts: &mut Opts) {
    let settings = &file.settings;
    apply_file_opt!(settings, opts, max_connections);
    if let Some(ref p) = settings.cache_path {
        opts.cache_path = Some(PathBuf::from(p));
    }
    apply_file_opt!(settings, opts, json);
    apply_file_opt!(settings, opts, verbose);
}

pub mod config_file;
pub mod logger;
pub mod progress;

pub use logger::setup_logging;
pub use progress::{create_counter, finish_bar, refresh_bar, update_progress_bar, ProgressBar};

pub mod commands;
pub mod handlers;

// Re-export commonly used helpers for convenience
pub use commands::{CLAP_STYLING, DEFAULT_DB_PATH, command_argument_builder};
pub use handlers::{
    apply_run_overrides, db_path, expand_path, install_default_wordlist, log_tail, parse_pins,
    render_report, wordlist_dir,
};

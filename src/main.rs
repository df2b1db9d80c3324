//! Barter trade engine replay CLI
//!
//! Replays a scenario file through the trade engine and prints the final
//! holdings as CSV.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- scenario.csv > holdings.csv
//! cargo run -- --ledger trades.csv scenario.csv > holdings.csv
//! cargo run -- --session-timeout-secs 60 --debounce-ms 250 --workers 4 scenario.csv
//! RUST_LOG=barter_trade_engine=debug cargo run -- scenario.csv
//! ```
//!
//! Logs go to stderr; the holdings report goes to stdout.
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: Error (scenario not found or unreadable, ledger not writable, etc.)

use barter_trade_engine::{cli, replay};
use std::process;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("barter_trade_engine=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = cli::parse_args();
    let options = args.to_replay_options();

    let mut output = std::io::stdout();
    if let Err(e) = replay::replay_file(&args.scenario, &options, &mut output) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

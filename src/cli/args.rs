use crate::config::EngineConfig;
use crate::replay::ReplayOptions;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Replay a trade scenario through the trade engine
#[derive(Parser, Debug)]
#[command(name = "barter-trade-engine")]
#[command(about = "Replay a trade scenario and print the final holdings", long_about = None)]
pub struct CliArgs {
    /// Scenario CSV file path
    #[arg(value_name = "SCENARIO", help = "Path to the scenario CSV file")]
    pub scenario: PathBuf,

    /// Append completed trades to this CSV file
    #[arg(long = "ledger", value_name = "PATH")]
    pub ledger: Option<PathBuf>,

    #[arg(
        long = "session-timeout-secs",
        value_name = "SECS",
        help = "Lifetime of a trade session (default: 300)"
    )]
    pub session_timeout_secs: Option<u64>,

    #[arg(
        long = "debounce-ms",
        value_name = "MILLIS",
        help = "Auto-exchange debounce window (default: 500)"
    )]
    pub debounce_ms: Option<u64>,

    #[arg(
        long = "lock-stripes",
        value_name = "COUNT",
        help = "Ownership lock stripes (default: 64)"
    )]
    pub lock_stripes: Option<usize>,

    #[arg(
        long = "workers",
        value_name = "COUNT",
        help = "Runtime worker threads (default: CPU cores)"
    )]
    pub workers: Option<usize>,
}

impl CliArgs {
    /// Build an EngineConfig from the CLI arguments
    ///
    /// Unset values take the defaults; zero values fall back to the defaults
    /// with a warning.
    pub fn to_engine_config(&self) -> EngineConfig {
        let default = EngineConfig::default();

        EngineConfig::new(
            self.session_timeout_secs
                .map_or(default.session_timeout, Duration::from_secs),
            self.debounce_ms
                .map_or(default.debounce_window, Duration::from_millis),
            self.lock_stripes.unwrap_or(default.lock_stripes),
            default.ledger_max_failures,
            default.ledger_recovery_window,
            default.sweep_interval,
        )
    }

    pub fn to_replay_options(&self) -> ReplayOptions {
        let workers = match self.workers {
            Some(0) => {
                tracing::warn!("Invalid workers (0), using default ({})", num_cpus::get());
                num_cpus::get()
            }
            Some(workers) => workers,
            None => num_cpus::get(),
        };

        ReplayOptions {
            config: self.to_engine_config(),
            workers,
            ledger: self.ledger.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::no_options(&["program", "s.csv"], None, None, None, None)]
    #[case::timeout(&["program", "--session-timeout-secs", "60", "s.csv"], Some(60), None, None, None)]
    #[case::debounce(&["program", "--debounce-ms", "250", "s.csv"], None, Some(250), None, None)]
    #[case::all_options(
        &["program", "--session-timeout-secs", "60", "--debounce-ms", "250", "--lock-stripes", "8", "--workers", "2", "s.csv"],
        Some(60),
        Some(250),
        Some(8),
        Some(2)
    )]
    fn test_options(
        #[case] args: &[&str],
        #[case] timeout: Option<u64>,
        #[case] debounce: Option<u64>,
        #[case] stripes: Option<usize>,
        #[case] workers: Option<usize>,
    ) {
        let parsed = CliArgs::try_parse_from(args).unwrap();
        assert_eq!(parsed.scenario, PathBuf::from("s.csv"));
        assert_eq!(parsed.session_timeout_secs, timeout);
        assert_eq!(parsed.debounce_ms, debounce);
        assert_eq!(parsed.lock_stripes, stripes);
        assert_eq!(parsed.workers, workers);
    }

    #[rstest]
    #[case::defaults(&["program", "s.csv"], 300, 500, 64)]
    #[case::custom(
        &["program", "--session-timeout-secs", "60", "--debounce-ms", "250", "--lock-stripes", "8", "s.csv"],
        60,
        250,
        8
    )]
    #[case::zero_values_fall_back(
        &["program", "--session-timeout-secs", "0", "--debounce-ms", "0", "--lock-stripes", "0", "s.csv"],
        300,
        500,
        64
    )]
    fn test_engine_config_conversion(
        #[case] args: &[&str],
        #[case] timeout_secs: u64,
        #[case] debounce_ms: u64,
        #[case] stripes: usize,
    ) {
        let config = CliArgs::try_parse_from(args).unwrap().to_engine_config();

        assert_eq!(config.session_timeout, Duration::from_secs(timeout_secs));
        assert_eq!(config.debounce_window, Duration::from_millis(debounce_ms));
        assert_eq!(config.lock_stripes, stripes);
    }

    #[rstest]
    #[case::default_workers(&["program", "s.csv"], num_cpus::get())]
    #[case::zero_workers(&["program", "--workers", "0", "s.csv"], num_cpus::get())]
    #[case::custom_workers(&["program", "--workers", "3", "s.csv"], 3)]
    fn test_replay_options(#[case] args: &[&str], #[case] expected_workers: usize) {
        let options = CliArgs::try_parse_from(args).unwrap().to_replay_options();
        assert_eq!(options.workers, expected_workers);
        assert!(options.ledger.is_none());
    }

    #[rstest]
    #[case::missing_scenario(&["program"])]
    #[case::invalid_number(&["program", "--workers", "many", "s.csv"])]
    #[case::negative_timeout(&["program", "--session-timeout-secs", "-1", "s.csv"])]
    fn test_parsing_errors(#[case] args: &[&str]) {
        assert!(CliArgs::try_parse_from(args).is_err());
    }
}

//! End-to-end scenario tests
//!
//! Each fixture directory under tests/fixtures/ holds a scenario
//! (input.csv) and the holdings report it must produce (expected.csv).
//! Fixtures cover:
//! - Dialog, instant and admin trades
//! - Deposit and withdrawal triggers, including debounce and opt-out
//! - Rollback when the container cannot take the payment
//! - Overflow delivery onto the ground
//! - Ownership transfers and offline parties
//! - Malformed scenario rows
//!
//! Every fixture runs with one and with several runtime workers; the
//! report must not depend on the worker count.

#[cfg(test)]
mod tests {
    use barter_trade_engine::replay::{replay_file, ReplayOptions};
    use rstest::rstest;
    use std::fs;
    use std::io::Write;
    use std::path::Path;
    use tempfile::NamedTempFile;

    /// Replay tests/fixtures/{fixture_name}/input.csv and compare the
    /// holdings report with expected.csv
    ///
    /// # Panics
    ///
    /// Panics if a fixture file is missing, the replay fails, or the report
    /// differs from the expected one.
    fn run_test_fixture(fixture_name: &str, workers: usize) {
        let fixture_dir = format!("tests/fixtures/{}", fixture_name);
        let input_path = format!("{}/input.csv", fixture_dir);
        let expected_path = format!("{}/expected.csv", fixture_dir);

        assert!(
            Path::new(&input_path).exists(),
            "Input file not found: {}",
            input_path
        );
        assert!(
            Path::new(&expected_path).exists(),
            "Expected file not found: {}",
            expected_path
        );

        let options = ReplayOptions {
            workers,
            ..ReplayOptions::default()
        };
        let mut temp_output = NamedTempFile::new().expect("Failed to create temp file");

        replay_file(Path::new(&input_path), &options, &mut temp_output)
            .unwrap_or_else(|e| panic!("Failed to replay scenario: {}", e));
        temp_output.flush().expect("Failed to flush temp file");

        let actual_output = fs::read_to_string(temp_output.path())
            .unwrap_or_else(|e| panic!("Failed to read temp output file: {}", e));
        let expected_output = fs::read_to_string(&expected_path)
            .unwrap_or_else(|e| panic!("Failed to read expected file {}: {}", expected_path, e));

        assert_eq!(
            actual_output, expected_output,
            "\n\nOutput mismatch for fixture: {} (workers: {})\n\nActual output:\n{}\n\nExpected output:\n{}\n",
            fixture_name, workers, actual_output, expected_output
        );
    }

    #[rstest]
    #[case("happy_path")]
    #[case("barter_dialog")]
    #[case("barter_deposit")]
    #[case("debounced_deposit")]
    #[case("withdrawal")]
    #[case("storage_full_rollback")]
    #[case("overflow_drop")]
    #[case("ownership_transfer")]
    #[case("offline_party")]
    #[case("malformed_rows")]
    fn test_fixtures(#[case] fixture: &str, #[values(1, 4)] workers: usize) {
        run_test_fixture(fixture, workers);
    }

    #[test]
    fn test_ledger_records_completed_trades() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = dir.path().join("trades.csv");
        let options = ReplayOptions {
            ledger: Some(ledger.clone()),
            ..ReplayOptions::default()
        };

        let mut output = Vec::new();
        let summary = replay_file(
            Path::new("tests/fixtures/barter_dialog/input.csv"),
            &options,
            &mut output,
        )
        .unwrap();

        assert_eq!(summary.trades_completed, 2);
        assert_eq!(summary.trades_failed, 1);

        let contents = fs::read_to_string(&ledger).unwrap();
        let rows: Vec<&str> = contents.lines().skip(1).collect();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|row| row.contains("completed")));
    }
}

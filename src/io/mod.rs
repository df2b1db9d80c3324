//! I/O module
//!
//! Handles scenario parsing and CSV output.
//!
//! # Components
//!
//! - `scenario` - Scenario CSV format and streaming reader
//! - `csv_format` - Holdings report and ledger row formats
//! - `csv_ledger` - Trade ledger appending to a CSV file

pub mod csv_format;
pub mod csv_ledger;
pub mod scenario;

pub use csv_format::{write_holdings_csv, LedgerRow};
pub use csv_ledger::CsvTradeLedger;
pub use scenario::{convert_scenario_record, ScenarioReader, ScenarioRecord, Step};

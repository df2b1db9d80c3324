//! Trade ledger that appends to a CSV file
//!
//! Each record is written and flushed on a blocking worker, so the async
//! caller never waits on disk I/O from a runtime thread.

use crate::core::traits::TradeLedger;
use crate::io::csv_format::LedgerRow;
use crate::types::{LedgerError, TradeRecord};
use csv::WriterBuilder;
use futures::future::BoxFuture;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

const LEDGER_HEADER: [&str; 11] = [
    "transaction_id",
    "location",
    "buyer",
    "seller",
    "item",
    "quantity",
    "currency",
    "price_paid",
    "source",
    "status",
    "completed_at",
];

#[derive(Debug, Clone)]
pub struct CsvTradeLedger {
    path: PathBuf,
    writer: Arc<Mutex<csv::Writer<File>>>,
}

impl CsvTradeLedger {
    /// Create (or truncate) the ledger file and write its header
    ///
    /// # Errors
    ///
    /// `LedgerError::Unavailable` if the file cannot be created.
    pub fn create(path: &Path) -> Result<Self, LedgerError> {
        let file = File::create(path).map_err(|e| {
            LedgerError::Unavailable(format!("cannot create '{}': {}", path.display(), e))
        })?;

        let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);
        writer.write_record(LEDGER_HEADER)?;
        writer.flush()?;

        Ok(CsvTradeLedger {
            path: path.to_path_buf(),
            writer: Arc::new(Mutex::new(writer)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TradeLedger for CsvTradeLedger {
    fn record(&self, record: TradeRecord) -> BoxFuture<'_, Result<(), LedgerError>> {
        let writer = Arc::clone(&self.writer);
        let row = LedgerRow::from(&record);

        Box::pin(async move {
            tokio::task::spawn_blocking(move || -> Result<(), LedgerError> {
                let mut writer = writer
                    .lock()
                    .map_err(|_| LedgerError::Unavailable("ledger writer poisoned".to_string()))?;
                writer.serialize(&row)?;
                writer.flush()?;
                Ok(())
            })
            .await
            .map_err(|e| LedgerError::Write(e.to_string()))?
        })
    }
}

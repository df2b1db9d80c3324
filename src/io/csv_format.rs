//! CSV output formats
//!
//! - Final holdings report: `holder,item,quantity`
//! - Ledger rows: one `LedgerRow` per completed trade
//!
//! Everything here writes to a `Write` and does no file handling itself.

use crate::types::{LocationId, PartyId, TradeRecord};
use crate::world::Holding;
use serde::Serialize;
use std::io::Write;

/// Write holdings in CSV format with columns: holder, item, quantity
///
/// Rows are written in the order given; `InMemoryWorld::holdings` already
/// sorts them by holder, then item.
///
/// # Returns
///
/// * `Ok(())` if writing succeeded
/// * `Err(String)` if a write error occurred
pub fn write_holdings_csv(holdings: &[Holding], output: &mut dyn Write) -> Result<(), String> {
    let mut writer = csv::Writer::from_writer(output);

    writer
        .write_record(["holder", "item", "quantity"])
        .map_err(|e| format!("Failed to write CSV header: {}", e))?;

    for holding in holdings {
        writer
            .write_record(&[
                holding.holder.to_string(),
                holding.item.clone(),
                holding.quantity.to_string(),
            ])
            .map_err(|e| format!("Failed to write holding record: {}", e))?;
    }

    writer
        .flush()
        .map_err(|e| format!("Failed to flush output: {}", e))?;

    Ok(())
}

/// Flat ledger row, one per completed trade
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct LedgerRow {
    pub transaction_id: String,
    pub location: LocationId,
    pub buyer: PartyId,
    pub seller: PartyId,
    pub item: String,
    pub quantity: u32,
    pub currency: String,
    pub price_paid: u32,
    pub source: String,
    pub status: String,
    pub completed_at: String,
}

impl From<&TradeRecord> for LedgerRow {
    fn from(record: &TradeRecord) -> Self {
        LedgerRow {
            transaction_id: record.transaction_id.to_string(),
            location: record.location_id,
            buyer: record.buyer,
            seller: record.seller,
            item: record.item.clone().unwrap_or_default(),
            quantity: record.quantity,
            currency: record.currency.clone().unwrap_or_default(),
            price_paid: record.price_paid,
            source: record.source.to_string(),
            status: format!("{:?}", record.status).to_lowercase(),
            completed_at: record.completed_at.to_rfc3339(),
        }
    }
}

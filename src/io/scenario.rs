//! Scenario CSV format and reader
//!
//! A scenario is a CSV file with the columns
//! `op,party,location,item,qty,price_item,price_qty`. Each row is one step:
//! world setup (`party`, `give`, `shop`, `admin_shop`, `accept`, `stock`),
//! a trade through one of the engine's entry points (`trade`, `instant`,
//! `deposit`, `withdraw`, `admin`), or a host event (`transfer`, `grant`,
//! `logout`, `optout`, `optin`, `wait`).
//!
//! | op           | party     | location | item     | qty       | price_item | price_qty |
//! |--------------|-----------|----------|----------|-----------|------------|-----------|
//! | `party`      | party     |          |          | slots     |            |           |
//! | `give`       | party     |          | item     | amount    |            |           |
//! | `shop`       | owner     | location | offering | base qty  | price item | price qty |
//! | `admin_shop` | owner     | location | offering | base qty  | price item | price qty |
//! | `accept`     |           | location |          |           | item       | base qty  |
//! | `stock`      |           | location | item     | amount    |            |           |
//! | `trade`      | party     | location |          |           | item       | qty       |
//! | `instant`    | party     | location |          |           |            |           |
//! | `deposit`    | party     | location | item     | amount    |            |           |
//! | `withdraw`   | party     | location |          | amount    |            |           |
//! | `admin`      | party     | location |          | amount    |            |           |
//! | `transfer`   | initiator | location |          | new owner |            |           |
//! | `grant`      | party     |          |          |           |            |           |
//! | `logout`     | party     |          |          |           |            |           |
//! | `optout`     | party     |          |          |           |            |           |
//! | `optin`      | party     |          |          |           |            |           |
//! | `wait`       |           |          |          | millis    |            |           |
//!
//! An empty `party` on `transfer` means the console. An empty `slots` on
//! `party` means a default-size inventory.

use crate::core::traits::Initiator;
use crate::types::{ItemStack, LocationId, PartyId};
use csv::{ReaderBuilder, StringRecord, Trim};
use serde::Deserialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Raw scenario row
#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
pub struct ScenarioRecord {
    pub op: String,
    pub party: Option<PartyId>,
    pub location: Option<LocationId>,
    pub item: Option<String>,
    pub qty: Option<u32>,
    pub price_item: Option<String>,
    pub price_qty: Option<u32>,
}

/// One replayable step
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    AddParty {
        party: PartyId,
        slots: Option<usize>,
    },
    Give {
        party: PartyId,
        item: ItemStack,
        quantity: u32,
    },
    OpenShop {
        owner: PartyId,
        location: LocationId,

        /// Offering descriptor; its amount is the base offered quantity
        offering: ItemStack,

        /// Fixed price, if any
        price: Option<(ItemStack, u32)>,

        /// No container, unlimited stock
        infinite: bool,
    },
    Accept {
        location: LocationId,
        item: ItemStack,
        quantity: u32,
    },
    Stock {
        location: LocationId,
        item: ItemStack,
        quantity: u32,
    },
    /// Dialog trade: initiate, confirm, execute
    Trade {
        party: PartyId,
        location: LocationId,

        /// Chosen payment for barter locations
        payment: Option<(ItemStack, u32)>,
    },
    Instant {
        party: PartyId,
        location: LocationId,
    },
    Deposit {
        party: PartyId,
        location: LocationId,
        item: ItemStack,
        quantity: u32,
    },
    Withdraw {
        party: PartyId,
        location: LocationId,
        quantity: u32,
    },
    Admin {
        party: PartyId,
        location: LocationId,
        quantity: u32,
    },
    Transfer {
        initiator: Initiator,
        location: LocationId,
        new_owner: PartyId,
    },
    /// Allow a party to transfer ownership of any location
    Grant {
        party: PartyId,
    },
    Logout {
        party: PartyId,
    },
    SetAutoExchange {
        party: PartyId,
        enabled: bool,
    },
    Wait {
        millis: u64,
    },
}

/// Convert a raw row into a step
///
/// # Returns
///
/// * `Ok(Step)` - The parsed step
/// * `Err(String)` - Unknown op or a missing required column
pub fn convert_scenario_record(record: ScenarioRecord) -> Result<Step, String> {
    let op = record.op.to_lowercase();
    let party = || required(record.party, &op, "party");
    let location = || required(record.location, &op, "location");
    let qty = || required(record.qty, &op, "qty");
    let item = || {
        required(record.item.as_deref(), &op, "item").map(|kind| ItemStack::new(kind, 1))
    };
    let price = || match (&record.price_item, record.price_qty) {
        (Some(kind), Some(quantity)) => Some((ItemStack::new(kind.as_str(), 1), quantity)),
        _ => None,
    };

    let step = match op.as_str() {
        "party" => Step::AddParty {
            party: party()?,
            slots: record.qty.filter(|slots| *slots > 0).map(|slots| slots as usize),
        },
        "give" => Step::Give {
            party: party()?,
            item: item()?,
            quantity: qty()?,
        },
        "shop" | "admin_shop" => Step::OpenShop {
            owner: party()?,
            location: location()?,
            offering: item()?.with_amount(qty()?),
            price: price(),
            infinite: op == "admin_shop",
        },
        "accept" => {
            let (item, quantity) =
                price().ok_or_else(|| format!("'{}' requires price_item and price_qty", op))?;
            Step::Accept {
                location: location()?,
                item,
                quantity,
            }
        }
        "stock" => Step::Stock {
            location: location()?,
            item: item()?,
            quantity: qty()?,
        },
        "trade" => Step::Trade {
            party: party()?,
            location: location()?,
            payment: price(),
        },
        "instant" => Step::Instant {
            party: party()?,
            location: location()?,
        },
        "deposit" => Step::Deposit {
            party: party()?,
            location: location()?,
            item: item()?,
            quantity: qty()?,
        },
        "withdraw" => Step::Withdraw {
            party: party()?,
            location: location()?,
            quantity: qty()?,
        },
        "admin" => Step::Admin {
            party: party()?,
            location: location()?,
            quantity: qty()?,
        },
        "transfer" => Step::Transfer {
            initiator: record.party.map_or(Initiator::Console, Initiator::Party),
            location: location()?,
            new_owner: qty()?,
        },
        "grant" => Step::Grant { party: party()? },
        "logout" => Step::Logout { party: party()? },
        "optout" | "optin" => Step::SetAutoExchange {
            party: party()?,
            enabled: op == "optin",
        },
        "wait" => Step::Wait {
            millis: u64::from(qty()?),
        },
        _ => return Err(format!("Invalid scenario op: '{}'", record.op)),
    };
    Ok(step)
}

fn required<T>(value: Option<T>, op: &str, column: &str) -> Result<T, String> {
    value.ok_or_else(|| format!("'{}' requires a {} value", op, column))
}

/// Streaming scenario reader
///
/// Yields one `Result<Step, String>` per row; errors carry the line number.
/// Lines starting with `#` are comments.
#[derive(Debug)]
pub struct ScenarioReader<R: Read> {
    reader: csv::Reader<R>,
    headers: Option<StringRecord>,
    row: StringRecord,
}

impl ScenarioReader<File> {
    /// Open a scenario file
    pub fn open(path: &Path) -> Result<Self, String> {
        let file = File::open(path)
            .map_err(|e| format!("Failed to open file '{}': {}", path.display(), e))?;
        Ok(Self::from_reader(file))
    }
}

impl<R: Read> ScenarioReader<R> {
    pub fn from_reader(input: R) -> Self {
        let reader = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .comment(Some(b'#'))
            .buffer_capacity(8 * 1024)
            .from_reader(input);

        Self {
            reader,
            headers: None,
            row: StringRecord::new(),
        }
    }

    fn headers(&mut self) -> Result<StringRecord, String> {
        if let Some(headers) = &self.headers {
            return Ok(headers.clone());
        }
        let headers = self
            .reader
            .headers()
            .map_err(|e| format!("Failed to read header: {}", e))?
            .clone();
        self.headers = Some(headers.clone());
        Ok(headers)
    }
}

impl<R: Read> Iterator for ScenarioReader<R> {
    type Item = Result<Step, String>;

    fn next(&mut self) -> Option<Self::Item> {
        let headers = match self.headers() {
            Ok(headers) => headers,
            Err(e) => return Some(Err(e)),
        };

        match self.reader.read_record(&mut self.row) {
            Ok(false) => None,
            Ok(true) => {
                let line = self.row.position().map_or(0, |pos| pos.line());
                Some(
                    self.row
                        .deserialize::<ScenarioRecord>(Some(&headers))
                        .map_err(|e| format!("CSV parse error: {}", e))
                        .and_then(convert_scenario_record)
                        .map_err(|e| format!("Line {}: {}", line, e)),
                )
            }
            // A broken row cannot be skipped reliably
            Err(e) => {
                let line = e.position().map_or(0, |pos| pos.line());
                Some(Err(format!("Line {}: CSV read error: {}", line, e)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const HEADER: &str = "op,party,location,item,qty,price_item,price_qty\n";

    fn steps(body: &str) -> Vec<Result<Step, String>> {
        ScenarioReader::from_reader(format!("{}{}", HEADER, body).as_bytes()).collect()
    }

    #[test]
    fn test_shop_row() {
        let parsed = steps("shop,2,10,DIAMOND,3,EMERALD,5\n");

        assert_eq!(
            parsed,
            vec![Ok(Step::OpenShop {
                owner: 2,
                location: 10,
                offering: ItemStack::new("DIAMOND", 3),
                price: Some((ItemStack::new("EMERALD", 1), 5)),
                infinite: false,
            })]
        );
    }

    #[rstest]
    #[case::console_transfer("transfer,,10,,7,,", Step::Transfer { initiator: Initiator::Console, location: 10, new_owner: 7 })]
    #[case::party_transfer("transfer,9,10,,7,,", Step::Transfer { initiator: Initiator::Party(9), location: 10, new_owner: 7 })]
    #[case::default_slots("party,1,,,,,", Step::AddParty { party: 1, slots: None })]
    #[case::custom_slots("party,1,,,4,,", Step::AddParty { party: 1, slots: Some(4) })]
    #[case::optout("OPTOUT,3,,,,,", Step::SetAutoExchange { party: 3, enabled: false })]
    #[case::wait("wait,,,,1500,,", Step::Wait { millis: 1500 })]
    fn test_row_conversion(#[case] row: &str, #[case] expected: Step) {
        assert_eq!(steps(&format!("{}\n", row)), vec![Ok(expected)]);
    }

    #[rstest]
    #[case::unknown_op("refund,1,10,,,,", "Invalid scenario op")]
    #[case::missing_party("give,,,DIAMOND,3,,", "requires a party value")]
    #[case::missing_price("accept,,10,,,,", "requires price_item and price_qty")]
    #[case::bad_number("give,one,,DIAMOND,3,,", "CSV parse error")]
    fn test_row_errors(#[case] row: &str, #[case] expected: &str) {
        let parsed = steps(&format!("{}\n", row));
        let error = parsed[0].clone().unwrap_err();
        assert!(error.starts_with("Line 2: "), "{}", error);
        assert!(error.contains(expected), "{}", error);
    }

    #[test]
    fn test_comments_and_errors_do_not_stop_iteration() {
        let parsed = steps("# setup\nparty,1,,,,,\nbogus,,,,,,\nlogout,1,,,,,\n");

        assert_eq!(parsed.len(), 3);
        assert!(parsed[0].is_ok());
        assert!(parsed[1].is_err());
        assert_eq!(parsed[2], Ok(Step::Logout { party: 1 }));
    }

    #[test]
    fn test_open_missing_file() {
        let error = ScenarioReader::open(Path::new("nonexistent.csv")).unwrap_err();
        assert!(error.contains("Failed to open file"));
    }

    #[test]
    fn test_open_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{}party,1,,,,,", HEADER).unwrap();
        file.flush().unwrap();

        let parsed: Vec<_> = ScenarioReader::open(file.path()).unwrap().collect();
        assert_eq!(parsed, vec![Ok(Step::AddParty { party: 1, slots: None })]);
    }
}

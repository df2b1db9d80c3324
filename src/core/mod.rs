//! Core trade logic
//!
//! - `engine` - Session registry and the trade pipeline
//! - `exchange` - The atomic exchange, with snapshot rollback
//! - `session` - Session state machine
//! - `validator` - Precondition checks run before any mutation
//! - `snapshot` - Inventory snapshots
//! - `auto_exchange` - Deposit and withdrawal triggers
//! - `ownership` - Serialized ownership transfers
//! - `dispatch` - Marshaling work onto the world-owning main thread
//! - `fallback` - Ledger failure tracking
//! - `sweeper` - Periodic expired-session cleanup
//! - `clock` - Time sources
//! - `traits` - Collaborator seams

pub mod auto_exchange;
pub mod clock;
pub mod dispatch;
pub mod engine;
pub mod exchange;
pub mod fallback;
pub mod ownership;
pub mod session;
pub mod snapshot;
pub mod sweeper;
pub mod traits;
pub mod validator;

pub use auto_exchange::{bundle_increments, AutoExchangeHandler};
pub use clock::{ManualClock, SystemTimeSource, TimeSource, Timestamp};
pub use dispatch::MainThread;
pub use engine::{TradeEngine, TradeRequest};
pub use exchange::{apply_exchange, Delivery, ExchangePlan};
pub use fallback::FallbackTracker;
pub use ownership::{OwnershipChange, OwnershipCoordinator};
pub use session::{SessionId, SessionTerms, TradeSession};
pub use snapshot::InventorySnapshot;
pub use sweeper::spawn_session_sweeper;
pub use traits::{
    AutoExchangePreferences, Initiator, LocationCache, LocationDirectory, LocationRepository,
    PermissionGate, TradeLedger,
};
pub use validator::{TradeValidator, ValidationContext, ValidationResult};

//! Domain types for the prop desk

pub mod account;
pub mod challenge;
pub mod ids;
pub mod instrument;
pub mod records;
pub mod trade;
pub mod wallet;

pub use account::{Account, AccountStatus};
pub use challenge::{Challenge, ChallengeStatus, Settlement};
pub use ids::{new_document_id, AccountKey, ChallengeId, ParticipantId, UserId, WalletId};
pub use instrument::{InstrumentSpec, InstrumentTable};
pub use records::{LiquidationReason, LiquidationRecord, TransactionKind, TransactionRecord};
pub use trade::{OrderKind, Side, Trade, TradeStatus, TriggerFlags};
pub use wallet::{Wallet, WalletError};

//! Ledger minting: the collaborator interface, a local hash-chained ledger,
//! and the minter that records each certificate once.

pub mod local;
pub mod minter;
pub mod types;

pub use local::{verify_chain, LedgerEntry, LocalLedger};
pub use minter::{ChainMinter, MintTask};
pub use types::{LedgerClient, MintOutcome, PendingTx, TxReceipt, TxStatus};

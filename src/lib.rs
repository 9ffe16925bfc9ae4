//! Encrypted multi-layer search core for a private append-only ledger.
//!
//! Each ledger block carries an opaque payload that may be plaintext or
//! password-encrypted, and may reference an encrypted off-chain file.
//! This crate answers keyword queries over that corpus across three
//! access tiers — public metadata, password-gated private metadata, and
//! on-chain/off-chain encrypted content — routing each query to the
//! cheapest strategy that can satisfy it.
//!
//! The [`SearchEngine`] façade is the entry point: build one with an
//! [`EngineConfig`] and the narrow ledger/off-chain capabilities it's
//! allowed to call, then `index_block`/`index_blockchain` and `search`.

pub mod config;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod index;
pub mod ledger;
pub mod metadata;
pub mod password_registry;
pub mod search;
pub mod strategy;
pub mod util;
pub mod wire;

pub use config::{EngineConfig, SecurityLevel};
pub use engine::{EngineStats, SearchEngine, SearchHit, SearchOutcome};
pub use error::{SearchCoreError, SearchCoreResult};
pub use ledger::{Block, BlockId, LedgerHandle, LedgerSource, OffChainHandle, OffChainRef, OffChainStorage};
pub use password_registry::PasswordRegistry;
pub use strategy::{RoutedResult, RoutingResult, Strategy, StrategyRouter};

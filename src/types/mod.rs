//! Primitive types shared by the ledger modules

pub mod address;
pub mod context;

pub use address::{Address, AddressParseError, ConsensusPubKey, ADDRESS_SIZE, CONSENSUS_KEY_SIZE};
pub use context::{BlockContext, Timestamp, TxMode};

//! Block context handed in by the block-processing pipeline

use serde::{Deserialize, Serialize};

/// Unix timestamp in seconds
pub type Timestamp = u64;

/// How the enclosing transaction is being executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxMode {
    /// Mempool admission check; state changes are never committed
    Check,
    /// Block execution; successful state changes are committed
    Deliver,
}

/// Read-only view of the block being processed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockContext {
    /// Current block height
    pub height: u64,
    /// Current block time (unix seconds)
    pub time: Timestamp,
    /// Execution mode
    pub mode: TxMode,
}

impl BlockContext {
    /// Context for delivering a block at `height` and `time`
    pub fn deliver(height: u64, time: Timestamp) -> Self {
        Self { height, time, mode: TxMode::Deliver }
    }

    /// Context for checking a transaction against the state at `height`
    pub fn check(height: u64, time: Timestamp) -> Self {
        Self { height, time, mode: TxMode::Check }
    }

    /// Is this a check-only execution?
    pub fn is_check(&self) -> bool {
        self.mode == TxMode::Check
    }
}

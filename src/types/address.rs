//! Account and consensus key types
//!
//! Operator and delegator accounts share one 32-byte address space. The
//! derived `Ord` is plain byte order, which is the order every node uses
//! when it has to sort addresses for deterministic output.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Size of an account address in bytes
pub const ADDRESS_SIZE: usize = 32;

/// Size of a consensus public key in bytes
pub const CONSENSUS_KEY_SIZE: usize = 32;

/// 32-byte account address (operators and delegators)
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(pub [u8; ADDRESS_SIZE]);

impl Address {
    /// Create from raw bytes
    pub fn new(bytes: [u8; ADDRESS_SIZE]) -> Self {
        Address(bytes)
    }

    /// Create zero address
    pub fn zero() -> Self {
        Address([0u8; ADDRESS_SIZE])
    }

    /// Check if this is the zero address
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ADDRESS_SIZE]
    }

    /// Get as bytes
    pub fn as_bytes(&self) -> &[u8; ADDRESS_SIZE] {
        &self.0
    }

    /// Read an address from a key segment. Returns `None` if the slice is
    /// not exactly `ADDRESS_SIZE` bytes long.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; ADDRESS_SIZE] = bytes.try_into().ok()?;
        Some(Address(arr))
    }

    /// Convert to base58 string
    pub fn to_base58(&self) -> String {
        bs58::encode(&self.0).into_string()
    }

    /// Parse from base58 string
    pub fn from_base58(s: &str) -> Result<Self, AddressParseError> {
        let bytes = bs58::decode(s).into_vec().map_err(AddressParseError::Base58)?;
        Address::from_slice(&bytes).ok_or(AddressParseError::InvalidLength(bytes.len()))
    }
}

impl Default for Address {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({}...)", &self.to_base58()[..8])
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base58())
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Address parsing error
#[derive(Debug, thiserror::Error)]
pub enum AddressParseError {
    #[error("Base58 error: {0}")]
    Base58(bs58::decode::Error),

    #[error("Invalid address length: {0} (expected 32)")]
    InvalidLength(usize),
}

/// Public key a validator signs consensus messages with.
///
/// This core never verifies signatures; the key is only carried through to
/// the validator updates handed to the consensus engine.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConsensusPubKey(pub [u8; CONSENSUS_KEY_SIZE]);

impl ConsensusPubKey {
    /// Create from raw bytes
    pub fn new(bytes: [u8; CONSENSUS_KEY_SIZE]) -> Self {
        ConsensusPubKey(bytes)
    }

    /// Get as bytes
    pub fn as_bytes(&self) -> &[u8; CONSENSUS_KEY_SIZE] {
        &self.0
    }

    /// Consensus address: first 20 bytes of SHA-256 over the key, the form
    /// consensus engines use to name validators in evidence.
    pub fn consensus_address(&self) -> [u8; 20] {
        let digest = Sha256::digest(self.0);
        let mut out = [0u8; 20];
        out.copy_from_slice(&digest[..20]);
        out
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for ConsensusPubKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConsensusPubKey({}...)", &self.to_hex()[..12])
    }
}

impl fmt::Display for ConsensusPubKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

use alloy_primitives::Address;
use thiserror::Error;
use ursa_state::StateError;

/// Errors surfaced while applying a transaction.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    /// The sender account is already past this nonce. The transaction can
    /// never execute and is skipped.
    #[error("nonce too low: account at {expected}, transaction carries {got}")]
    NonceTooLow {
        /// Current account nonce.
        expected: u64,
        /// Nonce carried by the transaction.
        got: u64,
    },
    /// The transaction is ahead of the sender's nonce; it may become
    /// executable later and is retained.
    #[error("nonce too high: account at {expected}, transaction carries {got}")]
    NonceTooHigh {
        /// Current account nonce.
        expected: u64,
        /// Nonce carried by the transaction.
        got: u64,
    },
    /// The gas price is below the admission floor; skipped.
    #[error("transaction underpriced")]
    Underpriced,
    /// The sender cannot cover gas purchase plus value.
    #[error("insufficient balance for {address}")]
    InsufficientBalance {
        /// The underfunded sender.
        address: Address,
    },
    /// The block gas pool cannot admit this transaction.
    #[error("gas limit reached")]
    GasLimitReached,
    /// The gas limit does not cover even the intrinsic cost.
    #[error("intrinsic gas exceeds gas limit")]
    IntrinsicGas,
    /// Gas or balance arithmetic overflowed.
    #[error("arithmetic overflow during execution")]
    Overflow,
    /// A state operation failed; propagated unchanged.
    #[error(transparent)]
    State(#[from] StateError),
}

impl ExecutionError {
    /// Whether the transaction should simply be skipped by a producer
    /// (stale nonce or priced out).
    pub const fn is_skippable(&self) -> bool {
        matches!(self, Self::NonceTooLow { .. } | Self::Underpriced)
    }

    /// Whether the transaction should be retained for a later block.
    pub const fn is_retainable(&self) -> bool {
        matches!(self, Self::NonceTooHigh { .. })
    }

    /// Whether the block gas pool is exhausted.
    pub const fn is_gas_limit_reached(&self) -> bool {
        matches!(self, Self::GasLimitReached)
    }
}

use thiserror::Error;

/// Reasons a transaction is refused admission to the pool.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// The exact transaction is already pooled.
    #[error("already known")]
    AlreadyKnown,
    /// A same-nonce transaction is pooled and the replacement does not bump
    /// the price enough.
    #[error("replacement transaction underpriced")]
    ReplacementUnderpriced,
    /// The sender account nonce is already past this transaction.
    #[error("nonce too low")]
    NonceTooLow,
    /// The sender cannot cover gas price times gas limit plus value.
    #[error("insufficient funds for gas * price + value")]
    InsufficientFunds,
    /// The gas limit does not cover the intrinsic cost of the payload.
    #[error("intrinsic gas too low")]
    IntrinsicGasTooLow,
    /// The pool is full.
    #[error("transaction pool is full")]
    PoolFull,
}

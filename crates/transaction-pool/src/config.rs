/// Pool limits and replacement policy.
#[derive(Clone, Copy, Debug)]
pub struct PoolConfig {
    /// Minimum price increase, in percent, for a transaction to replace one
    /// with the same nonce.
    pub price_bump: u64,
    /// Executable transaction slots guaranteed per account.
    pub account_slots: usize,
    /// Maximum executable transaction slots across all accounts.
    pub global_slots: usize,
    /// Capacity of the new-transactions broadcast channel.
    pub event_buffer: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { price_bump: 10, account_slots: 16, global_slots: 4096, event_buffer: 1024 }
    }
}

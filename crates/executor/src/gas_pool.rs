use crate::ExecutionError;

/// Tracks the gas still available to a block under assembly.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GasPool(u64);

impl GasPool {
    /// A pool holding `limit` gas.
    pub const fn new(limit: u64) -> Self {
        Self(limit)
    }

    /// Returns gas to the pool, saturating at the maximum.
    pub fn add_gas(&mut self, amount: u64) {
        self.0 = self.0.saturating_add(amount);
    }

    /// Takes `amount` gas out of the pool.
    pub fn sub_gas(&mut self, amount: u64) -> Result<(), ExecutionError> {
        self.0 = self.0.checked_sub(amount).ok_or(ExecutionError::GasLimitReached)?;
        Ok(())
    }

    /// Gas remaining in the pool.
    pub const fn gas(&self) -> u64 {
        self.0
    }
}

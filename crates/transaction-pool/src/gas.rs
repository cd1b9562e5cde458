/// Base cost of any transaction.
pub const TX_GAS: u64 = 21_000;
/// Base cost of a contract-creating transaction.
pub(crate) const TX_GAS_CONTRACT_CREATION: u64 = 53_000;
/// Cost per non-zero payload byte.
const TX_DATA_NON_ZERO_GAS: u64 = 68;
/// Cost per zero payload byte.
const TX_DATA_ZERO_GAS: u64 = 4;

/// Computes the intrinsic gas of a transaction: the flat admission cost plus
/// the per-byte payload cost. Saturates at `u64::MAX` rather than wrapping.
pub fn intrinsic_gas(payload: &[u8], contract_creation: bool) -> u64 {
    let mut gas = if contract_creation { TX_GAS_CONTRACT_CREATION } else { TX_GAS };
    let non_zero = payload.iter().filter(|byte| **byte != 0).count() as u64;
    let zero = payload.len() as u64 - non_zero;
    gas = gas.saturating_add(non_zero.saturating_mul(TX_DATA_NON_ZERO_GAS));
    gas.saturating_add(zero.saturating_mul(TX_DATA_ZERO_GAS))
}

use crate::ExecutionError;
use ursa_primitives::{Header, Transaction};
use ursa_state::StateDb;

/// Result of running a transaction payload.
#[derive(Clone, Copy, Debug)]
pub struct VmOutcome {
    /// Gas left after execution.
    pub gas_left: u64,
    /// Whether execution reverted.
    pub failed: bool,
}

/// The seam toward the bytecode interpreter.
///
/// The executor performs the surrounding state transition (nonce, gas
/// purchase, value transfer, refunds); the interpreter only runs the
/// payload. It is handed the state after the transfer and the gas remaining
/// past the intrinsic cost.
pub trait Vm: Send + Sync {
    /// Runs the payload of a binary transaction.
    fn execute(
        &self,
        state: &mut StateDb,
        tx: &Transaction,
        header: &Header,
        gas: u64,
    ) -> Result<VmOutcome, ExecutionError>;
}

/// A [`Vm`] that interprets nothing: transfers succeed, payloads are
/// carried but not executed. The stand-in used when no interpreter is
/// wired in.
#[derive(Clone, Copy, Debug, Default)]
pub struct TransferVm;

impl Vm for TransferVm {
    fn execute(
        &self,
        _state: &mut StateDb,
        _tx: &Transaction,
        _header: &Header,
        gas: u64,
    ) -> Result<VmOutcome, ExecutionError> {
        Ok(VmOutcome { gas_left: gas, failed: false })
    }
}

use alloy_primitives::Address;
use ursa_primitives::{Block, Log};

/// Chain synchronization lifecycle, consumed by the miner to disarm and
/// re-arm itself around sync.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncEvent {
    /// Synchronization started; minting must pause.
    Started,
    /// Synchronization finished.
    Done,
    /// Synchronization aborted.
    Failed,
}

/// A block connected to the chain, with the logs it emitted.
#[derive(Clone, Debug)]
pub struct BlockAndLogsEvent {
    /// The connected block.
    pub block: Block,
    /// Logs emitted by the block.
    pub logs: Vec<Log>,
}

/// A block this node just sealed.
#[derive(Clone, Debug)]
pub struct NewMinedBlockEvent {
    /// The sealed block.
    pub block: Block,
}

/// The miner started producing under the given coinbase.
#[derive(Clone, Copy, Debug)]
pub struct NewMinerEvent {
    /// Address collecting block rewards.
    pub coinbase: Address,
}

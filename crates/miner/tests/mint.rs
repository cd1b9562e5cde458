//! Drives the mint coordinator against an in-memory chain: slot-timed
//! production, start/stop discipline and sync arming.

use alloy_primitives::{Address, B256, U256};
use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::sync::broadcast;
use ursa_chainspec::{ChainSpec, DEV_CANDIDATE};
use ursa_consensus::{build_genesis, dpos::Dpos, ChainReader, MintBackend};
use ursa_db::MemoryKeyValueStore;
use ursa_miner::{Miner, MinerConfig, MinerError, SyncEvent};
use ursa_primitives::{Action, Block, Receipt, Transaction, TxType, NANOS_PER_SEC};
use ursa_state::{StateDb, StateError};
use ursa_transaction_pool::TxPool;
use ursa_trie::TrieDb;

/// A minimal in-memory chain for the miner to drive.
struct DevChain {
    spec: Arc<ChainSpec>,
    db: Arc<TrieDb>,
    pool: Arc<TxPool>,
    head: Mutex<Block>,
    blocks: Mutex<HashMap<B256, Block>>,
}

impl DevChain {
    fn new(spec: Arc<ChainSpec>) -> Arc<Self> {
        let db = Arc::new(TrieDb::new(Arc::new(MemoryKeyValueStore::new())));
        let genesis = build_genesis(&spec, &db).unwrap();
        let mut blocks = HashMap::new();
        blocks.insert(genesis.hash(), genesis.clone());
        Arc::new(Self {
            spec,
            db,
            pool: Arc::new(TxPool::default()),
            head: Mutex::new(genesis),
            blocks: Mutex::new(blocks),
        })
    }
}

impl ChainReader for DevChain {
    fn chain_spec(&self) -> Arc<ChainSpec> {
        self.spec.clone()
    }

    fn current_block(&self) -> Block {
        self.head.lock().clone()
    }

    fn block_by_hash(&self, hash: B256) -> Option<Block> {
        self.blocks.lock().get(&hash).cloned()
    }

    fn state_at(&self, root: B256) -> Result<StateDb, StateError> {
        StateDb::new(root, self.db.clone())
    }

    fn trie_db(&self) -> Arc<TrieDb> {
        self.db.clone()
    }
}

impl MintBackend for DevChain {
    fn current_info(&self) -> Result<(Block, StateDb), StateError> {
        let head = self.current_block();
        let state = self.state_at(head.header.state_root)?;
        Ok((head, state))
    }

    fn pending_transactions(&self) -> HashMap<Address, Vec<Transaction>> {
        self.pool.pending()
    }

    fn ready_actions(&self, now: U256) -> Vec<Action> {
        self.pool.ready_actions(now)
    }

    fn queue_action(&self, action: Action) {
        self.pool.add_action(action);
    }

    fn write_block_with_state(
        &self,
        block: Block,
        _receipts: Vec<Receipt>,
        mut state: StateDb,
    ) -> Result<(), StateError> {
        state.commit(true)?;
        self.pool.remove_included(&block.transactions);
        self.blocks.lock().insert(block.hash(), block.clone());
        *self.head.lock() = block;
        Ok(())
    }
}

fn fast_spec() -> Arc<ChainSpec> {
    let mut spec = ChainSpec::default();
    // 200ms slots keep the tests quick while staying far above timer
    // resolution.
    spec.block_interval = 200_000_000;
    Arc::new(spec)
}

fn miner_for(
    chain: &Arc<DevChain>,
) -> (Miner<Arc<DevChain>, Dpos>, broadcast::Sender<SyncEvent>) {
    let (sync_tx, _) = broadcast::channel(8);
    let config = MinerConfig { coinbase: DEV_CANDIDATE, ..Default::default() };
    let miner = Miner::new(
        config,
        chain.spec.clone(),
        chain.clone(),
        Dpos::new(chain.spec.clone()),
        chain.pool.clone(),
        sync_tx.clone(),
    );
    (miner, sync_tx)
}

#[tokio::test(flavor = "multi_thread")]
async fn mints_blocks_on_slot_boundaries() {
    let chain = DevChain::new(fast_spec());
    let (miner, _sync) = miner_for(&chain);
    let mut mined = miner.subscribe_mined_blocks();

    miner.start().unwrap();
    let event = tokio::time::timeout(Duration::from_secs(3), mined.recv())
        .await
        .expect("a block within a few slots")
        .unwrap();

    assert_eq!(event.block.height(), 1);
    assert_eq!(event.block.header.miner, DEV_CANDIDATE);
    assert_eq!(event.block.timestamp() % chain.spec.block_interval, 0);
    assert_eq!(chain.current_block().hash(), event.block.hash());

    // The committed state carries the producer reward on top of the
    // genesis allocation.
    let mut state = chain.state_at(event.block.header.state_root).unwrap();
    let genesis_balance = chain.spec.genesis.alloc[&DEV_CANDIDATE].balance;
    assert!(state.get_balance(DEV_CANDIDATE) > genesis_balance);

    miner.stop().await;
    assert!(!miner.is_mining());
}

#[tokio::test(flavor = "multi_thread")]
async fn pooled_transactions_are_included() {
    let chain = DevChain::new(fast_spec());
    let (miner, _sync) = miner_for(&chain);

    let recipient = Address::repeat_byte(0x44);
    let tx = Transaction {
        tx_type: TxType::Binary,
        nonce: 0,
        gas_price: U256::from(1),
        gas_limit: 21_000,
        tos: vec![recipient],
        value: U256::from(12_345),
        sender: DEV_CANDIDATE,
        ..Default::default()
    };
    let mut state = chain.current_info().unwrap().1;
    chain.pool.add_transaction(tx, &mut state).unwrap();

    let mut mined = miner.subscribe_mined_blocks();
    miner.start().unwrap();

    // The transaction lands in one of the first few blocks.
    let mut included = None;
    for _ in 0..5 {
        let event = tokio::time::timeout(Duration::from_secs(3), mined.recv())
            .await
            .expect("a block within a few slots")
            .unwrap();
        if !event.block.transactions.is_empty() {
            included = Some(event.block);
            break;
        }
    }
    let block = included.expect("pooled transaction included");
    assert_eq!(block.transactions[0].value, U256::from(12_345));

    let mut state = chain.state_at(block.header.state_root).unwrap();
    assert_eq!(state.get_balance(recipient), U256::from(12_345));
    assert!(chain.pool.is_empty());

    miner.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn start_is_exclusive_and_stop_idempotent() {
    let chain = DevChain::new(fast_spec());
    let (miner, _sync) = miner_for(&chain);

    miner.start().unwrap();
    assert!(matches!(miner.start(), Err(MinerError::Busy)));

    miner.stop().await;
    miner.stop().await;
    assert!(!miner.is_mining());

    miner.start().unwrap();
    miner.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn sync_disarms_and_rearms_the_miner() {
    let chain = DevChain::new(fast_spec());
    let (miner, sync) = miner_for(&chain);

    miner.start().unwrap();
    sync.send(SyncEvent::Started).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!miner.is_mining(), "sync start stops the miner");
    assert!(matches!(miner.start(), Err(MinerError::Syncing)));

    sync.send(SyncEvent::Done).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(miner.is_mining(), "sync done restarts the previously armed miner");

    miner.stop().await;
}

use crate::{
    events::{BlockAndLogsEvent, NewMinedBlockEvent, NewMinerEvent, SyncEvent},
    work::{calc_gas_limit, unix_now_ns, Work},
    MinerError,
};
use alloy_primitives::{Address, Bytes, U256};
use parking_lot::Mutex;
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{sync::broadcast, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use ursa_chainspec::ChainSpec;
use ursa_consensus::{
    dpos::{next_slot, DposContext},
    Engine, MintBackend,
};
use ursa_executor::Executor;
use ursa_primitives::{Block, Header, NANOS_PER_SEC};
use ursa_state::StateError;
use ursa_transaction_pool::{NewTxsEvent, TransactionsByPriceAndNonce, TxPool};

/// Static miner configuration.
#[derive(Clone, Debug)]
pub struct MinerConfig {
    /// Address credited with block rewards.
    pub coinbase: Address,
    /// Bytes carried in the extra-data field of produced headers.
    pub extra_data: Bytes,
    /// Seal worker threads, for engines that use them.
    pub threads: usize,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self { coinbase: Address::ZERO, extra_data: Bytes::new(), threads: 0 }
    }
}

/// The mint coordinator.
///
/// Runs two cooperative tasks while armed: `update`, following mempool and
/// chain-head events, and `mint_loop`, waking at every slot boundary to
/// produce a block when the coinbase owns the slot. A sync watcher disarms
/// the miner while the node synchronizes and re-arms it afterwards.
pub struct Miner<B, E> {
    inner: Arc<MinerInner<B, E>>,
}

impl<B, E> std::fmt::Debug for Miner<B, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(&*self.inner, f)
    }
}

struct MinerInner<B, E> {
    config: MinerConfig,
    spec: Arc<ChainSpec>,
    backend: B,
    engine: E,
    executor: Executor,
    pool: Arc<TxPool>,

    coinbase: Mutex<Address>,
    mining: AtomicBool,
    can_start: AtomicBool,

    /// Cancels the running `update`/`mint_loop` pair.
    stop: Mutex<Option<CancellationToken>>,
    /// Cancels the in-flight mint of the current slot. Replaced, never
    /// reused, so cancellation stays idempotent.
    current_mint: Mutex<Option<CancellationToken>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,

    /// The most recent unsealed assembly, kept for the pending-block view
    /// and for mempool-driven refreshes while the miner is stopped.
    current_work: Mutex<Option<Work>>,

    block_events: broadcast::Sender<BlockAndLogsEvent>,
    mined_events: broadcast::Sender<NewMinedBlockEvent>,
    miner_events: broadcast::Sender<NewMinerEvent>,
}

impl<B, E> std::fmt::Debug for MinerInner<B, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MinerInner")
            .field("coinbase", &*self.coinbase.lock())
            .field("mining", &self.mining.load(Ordering::Relaxed))
            .field("can_start", &self.can_start.load(Ordering::Relaxed))
            .finish()
    }
}

impl<B, E> Miner<B, E>
where
    B: MintBackend + Send + Sync + 'static,
    E: Engine + 'static,
{
    /// Creates the miner and spawns its sync watcher. Must be called from
    /// within a tokio runtime.
    pub fn new(
        config: MinerConfig,
        spec: Arc<ChainSpec>,
        backend: B,
        engine: E,
        pool: Arc<TxPool>,
        sync_events: broadcast::Sender<SyncEvent>,
    ) -> Self {
        let (block_events, _) = broadcast::channel(64);
        let (mined_events, _) = broadcast::channel(64);
        let (miner_events, _) = broadcast::channel(8);
        let inner = Arc::new(MinerInner {
            coinbase: Mutex::new(config.coinbase),
            executor: Executor::new(spec.clone()),
            config,
            spec,
            backend,
            engine,
            pool,
            mining: AtomicBool::new(false),
            can_start: AtomicBool::new(true),
            stop: Mutex::new(None),
            current_mint: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
            current_work: Mutex::new(None),
            block_events,
            mined_events,
            miner_events,
        });
        tokio::spawn(MinerInner::sync_watcher(inner.clone(), sync_events.subscribe()));
        Self { inner }
    }

    /// Arms the miner: fails with [`MinerError::Busy`] when already minting
    /// and [`MinerError::Syncing`] while synchronization is in flight.
    pub fn start(&self) -> Result<(), MinerError> {
        MinerInner::start(&self.inner)
    }

    /// Stops the miner: cancels any in-flight mint and waits for both tasks
    /// to quiesce. Idempotent.
    pub async fn stop(&self) {
        self.inner.stop().await;
    }

    /// Whether the mint loop is currently armed.
    pub fn is_mining(&self) -> bool {
        self.inner.mining.load(Ordering::SeqCst)
    }

    /// Redirects block rewards.
    pub fn set_coinbase(&self, coinbase: Address) {
        *self.inner.coinbase.lock() = coinbase;
    }

    /// The reward address currently in use.
    pub fn coinbase(&self) -> Address {
        *self.inner.coinbase.lock()
    }

    /// The block currently under assembly, if any.
    pub fn pending_block(&self) -> Option<Block> {
        self.inner.current_work.lock().as_ref().map(Work::pending_block)
    }

    /// Blocks this node sealed and connected.
    pub fn subscribe_block_and_logs(&self) -> broadcast::Receiver<BlockAndLogsEvent> {
        self.inner.block_events.subscribe()
    }

    /// Blocks this node sealed.
    pub fn subscribe_mined_blocks(&self) -> broadcast::Receiver<NewMinedBlockEvent> {
        self.inner.mined_events.subscribe()
    }

    /// Miner lifecycle announcements.
    pub fn subscribe_miner_events(&self) -> broadcast::Receiver<NewMinerEvent> {
        self.inner.miner_events.subscribe()
    }
}

impl<B, E> MinerInner<B, E>
where
    B: MintBackend + Send + Sync + 'static,
    E: Engine + 'static,
{
    fn start(this: &Arc<Self>) -> Result<(), MinerError> {
        if !this.can_start.load(Ordering::SeqCst) {
            info!(target: "miner", "cannot start miner while syncing");
            return Err(MinerError::Syncing);
        }
        if this
            .mining
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            info!(target: "miner", "miner is already running");
            return Err(MinerError::Busy);
        }

        let stop = CancellationToken::new();
        *this.stop.lock() = Some(stop.clone());
        let _ = this.miner_events.send(NewMinerEvent { coinbase: *this.coinbase.lock() });

        let update = tokio::spawn(Self::update_loop(this.clone(), stop.clone()));
        let mint = tokio::spawn(Self::mint_loop(this.clone(), stop));
        this.tasks.lock().extend([update, mint]);

        info!(target: "miner", coinbase = %this.coinbase.lock(), "miner started");
        Ok(())
    }

    async fn stop(&self) {
        if self
            .mining
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        if let Some(stop) = self.stop.lock().take() {
            stop.cancel();
        }
        if let Some(mint) = self.current_mint.lock().take() {
            mint.cancel();
        }
        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            let _ = task.await;
        }
        info!(target: "miner", "miner stopped");
    }

    /// Disarms the miner when synchronization starts and re-arms it when
    /// the first sync round finishes.
    async fn sync_watcher(this: Arc<Self>, mut events: broadcast::Receiver<SyncEvent>) {
        let mut was_mining = false;
        loop {
            match events.recv().await {
                Ok(SyncEvent::Started) => {
                    this.can_start.store(false, Ordering::SeqCst);
                    was_mining = this.mining.load(Ordering::SeqCst);
                    if was_mining {
                        warn!(target: "miner", "mining aborted due to sync");
                        this.stop().await;
                    }
                }
                Ok(SyncEvent::Done | SyncEvent::Failed) => {
                    this.can_start.store(true, Ordering::SeqCst);
                    if was_mining {
                        warn!(target: "miner", "restarting mining after sync");
                        if let Err(err) = Self::start(&this) {
                            error!(target: "miner", %err, "failed to restart mining");
                        }
                    }
                    break;
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        debug!(target: "miner", "sync watcher quit");
    }

    /// Follows mempool and chain-head events. While the miner is stopped,
    /// fresh transactions are folded into the lingering pending work so the
    /// pending-block view stays current.
    async fn update_loop(this: Arc<Self>, stop: CancellationToken) {
        let mut txs_rx = this.pool.subscribe_new_txs();
        let mut chain_rx = this.block_events.subscribe();
        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                event = txs_rx.recv() => match event {
                    Ok(event) => {
                        if !this.mining.load(Ordering::SeqCst) {
                            this.extend_pending_work(event);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(target: "miner", skipped, "missed mempool events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                event = chain_rx.recv() => match event {
                    // The next slot rebuilds on the new head; nothing to do.
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
        debug!(target: "miner", "update loop quit");
    }

    /// Applies freshly announced transactions to the lingering work, bounded
    /// by a one-minute wall deadline.
    fn extend_pending_work(&self, event: NewTxsEvent) {
        let mut current = self.current_work.lock();
        let Some(work) = current.as_mut() else { return };

        let mut by_sender: std::collections::HashMap<Address, Vec<_>> =
            std::collections::HashMap::new();
        for tx in event.txs {
            by_sender.entry(tx.sender).or_default().push(tx);
        }
        let mut ordered = TransactionsByPriceAndNonce::new(by_sender);
        let deadline = unix_now_ns().saturating_add(60 * NANOS_PER_SEC);
        if let Err(err) =
            work.apply_transactions(&self.executor, &mut ordered, deadline, &self.backend)
        {
            debug!(target: "miner", %err, "failed to extend pending work");
        }
    }

    async fn mint_loop(this: Arc<Self>, stop: CancellationToken) {
        let interval_ns = this.spec.block_interval;
        // Align to the next slot boundary before ticking.
        let wait = interval_ns - (unix_now_ns() % interval_ns);
        tokio::select! {
            _ = stop.cancelled() => return,
            _ = tokio::time::sleep(Duration::from_nanos(wait)) => {}
        }
        let mut ticker = tokio::time::interval(Duration::from_nanos(interval_ns));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = stop.cancelled() => return,
                _ = ticker.tick() => {}
            }
            // The boundary this tick fired for, tolerant of timer jitter.
            let timestamp =
                next_slot(unix_now_ns().saturating_sub(interval_ns / 10), interval_ns);

            if !this.slot_is_ours(&stop, timestamp).await {
                continue;
            }

            let mint = CancellationToken::new();
            if let Some(previous) = this.current_mint.lock().replace(mint.clone()) {
                previous.cancel();
            }
            tokio::spawn(Self::mint_block(this.clone(), timestamp, mint));
        }
    }

    /// Runs the producer check for the slot, retrying missing-node
    /// conditions at a tenth of the interval until the check settles or the
    /// miner stops.
    async fn slot_is_ours(&self, stop: &CancellationToken, timestamp: u64) -> bool {
        let coinbase = *self.coinbase.lock();
        loop {
            let head = self.backend.current_block();
            match self.engine.check_validator(&self.backend, &head, coinbase, timestamp) {
                Ok(()) => return true,
                Err(err) if err.is_transient() => {
                    debug!(target: "miner", %err, timestamp, "not minting this slot");
                    return false;
                }
                Err(err) if err.is_missing_node() => {
                    debug!(target: "miner", %err, "trie node not arrived, retrying producer check");
                    tokio::select! {
                        _ = stop.cancelled() => return false,
                        _ = tokio::time::sleep(Duration::from_nanos(
                            self.spec.block_interval / 10,
                        )) => {}
                    }
                }
                Err(err) => {
                    error!(target: "miner", %err, "failed to check the slot validator");
                    return false;
                }
            }
        }
    }

    /// Retries block generation on missing-node conditions only, at a tenth
    /// of the interval, until cancelled or done.
    async fn mint_block(this: Arc<Self>, timestamp: u64, cancel: CancellationToken) {
        loop {
            if cancel.is_cancelled() {
                break;
            }
            match this.generate_block(timestamp, &cancel) {
                Ok(()) => break,
                Err(err) if err.is_missing_node() => {
                    debug!(target: "miner", %err, "retrying block generation");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(Duration::from_nanos(
                            this.spec.block_interval / 10,
                        )) => {}
                    }
                }
                Err(err) => {
                    error!(target: "miner", %err, "failed to mint the block");
                    break;
                }
            }
        }
    }

    /// One full block production pass for the slot at `timestamp`.
    fn generate_block(&self, timestamp: u64, cancel: &CancellationToken) -> Result<(), MinerError> {
        let (parent, state) = self.backend.current_info()?;
        let coinbase = *self.coinbase.lock();

        let header = Header {
            parent_hash: parent.hash(),
            miner: coinbase,
            height: parent.height() + 1,
            timestamp,
            difficulty: self.engine.calc_difficulty(timestamp, &parent.header),
            gas_limit: calc_gas_limit(&parent, &self.spec),
            extra_data: self.config.extra_data.clone(),
            ..Default::default()
        };
        let dpos_ctx = DposContext::from_proto(
            self.backend.trie_db(),
            &parent.header.dpos_context,
        )
        .map_err(StateError::from)?;
        let mut work = Work::new(header, state, dpos_ctx);

        // Matured redemptions first, then the pool in price-nonce order
        // under the slot's admission deadline.
        let now_secs = U256::from(timestamp / NANOS_PER_SEC);
        work.actions = self.backend.ready_actions(now_secs);
        self.executor.apply_actions(&mut work.state, &work.actions)?;

        let mut ordered = TransactionsByPriceAndNonce::new(self.backend.pending_transactions());
        let interval = self.spec.block_interval;
        let deadline = timestamp + interval - interval / 10;
        work.apply_transactions(&self.executor, &mut ordered, deadline, &self.backend)?;

        if !self.mining.load(Ordering::SeqCst) {
            // Stopped mid-assembly; keep the work for the pending view.
            *self.current_work.lock() = Some(work);
            return Ok(());
        }

        let block = self.engine.finalize(
            &self.backend,
            work.header.clone(),
            &mut work.state,
            work.txs.clone(),
            work.actions.clone(),
            &work.receipts,
            &mut work.dpos_ctx,
        )?;

        let Some(sealed) =
            self.engine
                .seal(&self.backend, block, cancel, self.config.threads, None)?
        else {
            debug!(target: "miner", timestamp, "mint cancelled during seal");
            return Ok(());
        };

        let logs = work.state.logs();
        self.backend.write_block_with_state(sealed.clone(), work.receipts, work.state)?;

        info!(
            target: "miner",
            height = sealed.height(),
            hash = %sealed.hash(),
            difficulty = %sealed.header.difficulty,
            txs = sealed.transactions.len(),
            "successfully sealed new block"
        );
        metrics::counter!("miner.sealed_blocks").increment(1);

        *self.current_work.lock() = None;
        let _ = self.block_events.send(BlockAndLogsEvent { block: sealed.clone(), logs });
        let _ = self.mined_events.send(NewMinedBlockEvent { block: sealed });
        Ok(())
    }
}

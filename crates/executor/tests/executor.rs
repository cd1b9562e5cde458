//! End-to-end behavior of the transaction executor: the binary state
//! transition and the DPoS delegation lifecycle.

use alloy_primitives::{Address, B256, U256};
use std::sync::Arc;
use ursa_chainspec::ChainSpec;
use ursa_consensus::dpos::DposContext;
use ursa_db::MemoryKeyValueStore;
use ursa_executor::{ApplyOutcome, ExecutionError, Executor, GasPool};
use ursa_primitives::{create_address, Header, Transaction, TxType, NANOS_PER_SEC};
use ursa_state::StateDb;
use ursa_trie::TrieDb;

struct Harness {
    spec: Arc<ChainSpec>,
    executor: Executor,
    state: StateDb,
    ctx: DposContext,
}

impl Harness {
    fn new() -> Self {
        let spec = Arc::new(ChainSpec::default());
        let db = Arc::new(TrieDb::new(Arc::new(MemoryKeyValueStore::new())));
        Self {
            executor: Executor::new(spec.clone()),
            state: StateDb::new(B256::ZERO, db.clone()).unwrap(),
            ctx: DposContext::new(db),
            spec,
        }
    }

    fn header_at(&self, secs: u64) -> Header {
        Header {
            miner: Address::repeat_byte(0xfe),
            timestamp: secs * NANOS_PER_SEC,
            gas_limit: 8_000_000,
            ..Default::default()
        }
    }

    fn apply(&mut self, tx: &Transaction, secs: u64) -> Result<ApplyOutcome, ExecutionError> {
        let header = self.header_at(secs);
        let mut gas_pool = GasPool::new(header.gas_limit);
        let mut cumulative = 0;
        self.executor.apply_transaction(
            &mut self.ctx,
            &mut gas_pool,
            &mut self.state,
            &header,
            tx,
            &mut cumulative,
        )
    }
}

fn sender() -> Address {
    Address::repeat_byte(0x01)
}

fn dpos_tx(tx_type: TxType, nonce: u64, value: u64, tos: Vec<Address>) -> Transaction {
    Transaction {
        tx_type,
        nonce,
        value: U256::from(value),
        tos,
        sender: sender(),
        ..Default::default()
    }
}

#[test]
fn delegate_locks_value_and_stamps_timestamp() {
    let mut h = Harness::new();
    h.state.set_balance(sender(), U256::from(1_000)).unwrap();

    let candidate = Address::repeat_byte(0xc1);
    let outcome = h
        .apply(&dpos_tx(TxType::Delegate, 0, 400, vec![candidate]), 1_000)
        .unwrap();
    assert!(!outcome.receipt.failed);
    assert!(outcome.action.is_none());

    assert_eq!(h.state.get_balance(sender()), U256::from(600));
    assert_eq!(h.state.get_locked_balance(sender()), U256::from(400));
    assert_eq!(h.state.get_delegate_timestamp(sender()), U256::from(1_000));
    assert_eq!(h.state.get_delegate_addresses(sender()), vec![candidate]);
    assert_eq!(h.ctx.delegation(sender()).unwrap(), vec![candidate]);
}

#[test]
fn delegate_beyond_balance_fails_cleanly() {
    let mut h = Harness::new();
    h.state.set_balance(sender(), U256::from(100)).unwrap();

    let outcome = h
        .apply(&dpos_tx(TxType::Delegate, 0, 400, vec![Address::repeat_byte(0xc1)]), 1_000)
        .unwrap();
    assert!(outcome.receipt.failed);
    assert_eq!(h.state.get_balance(sender()), U256::from(100));
    assert_eq!(h.state.get_locked_balance(sender()), U256::ZERO);
}

#[test]
fn redeem_respects_the_delay_window() {
    let mut h = Harness::new();
    let delay = h.spec.delay_duration;
    h.state.set_balance(sender(), U256::from(1_000)).unwrap();
    let candidate = Address::repeat_byte(0xc1);

    h.apply(&dpos_tx(TxType::Delegate, 0, 400, vec![candidate]), 1_000).unwrap();

    // Undelegation re-stamps the clock and queues the delayed redemption.
    let undelegate = h
        .apply(&dpos_tx(TxType::UnDelegate, 1, 0, vec![candidate]), 2_000)
        .unwrap();
    let action = undelegate.action.expect("undelegation queues an action");
    assert_eq!(action.sender, sender());
    assert_eq!(action.released_at(), U256::from(2_000 + delay));
    assert_eq!(h.state.get_delegate_timestamp(sender()), U256::from(2_000));
    assert!(h.ctx.delegation(sender()).unwrap().is_empty());

    // Too early: the receipt is failed and balances are untouched.
    let early = h
        .apply(&dpos_tx(TxType::Redeem, 2, 0, vec![]), 2_000 + delay - 1)
        .unwrap();
    assert!(early.receipt.failed);
    assert_eq!(h.state.get_balance(sender()), U256::from(600));
    assert_eq!(h.state.get_locked_balance(sender()), U256::from(400));

    // At maturity the locked balance moves back.
    let redeemed = h
        .apply(&dpos_tx(TxType::Redeem, 3, 0, vec![]), 2_000 + delay)
        .unwrap();
    assert!(!redeemed.receipt.failed);
    assert_eq!(h.state.get_balance(sender()), U256::from(1_000));
    assert_eq!(h.state.get_locked_balance(sender()), U256::ZERO);
}

#[test]
fn matured_actions_release_locked_balances() {
    let mut h = Harness::new();
    h.state.set_balance(sender(), U256::from(1_000)).unwrap();
    h.apply(&dpos_tx(TxType::Delegate, 0, 250, vec![Address::repeat_byte(0xc1)]), 1_000)
        .unwrap();
    let outcome = h
        .apply(&dpos_tx(TxType::UnDelegate, 1, 0, vec![]), 1_500)
        .unwrap();
    let action = outcome.action.unwrap();

    h.executor.apply_actions(&mut h.state, &[action]).unwrap();
    assert_eq!(h.state.get_balance(sender()), U256::from(1_000));
    assert_eq!(h.state.get_locked_balance(sender()), U256::ZERO);
}

#[test]
fn candidate_registration_roundtrip() {
    let mut h = Harness::new();
    h.state.set_balance(sender(), U256::from(1_000)).unwrap();

    h.apply(&dpos_tx(TxType::LoginCandidate, 0, 0, vec![]), 1_000).unwrap();
    assert!(h.ctx.is_candidate(sender()).unwrap());

    h.apply(&dpos_tx(TxType::LogoutCandidate, 1, 0, vec![]), 1_010).unwrap();
    assert!(!h.ctx.is_candidate(sender()).unwrap());
}

#[test]
fn binary_transfer_settles_gas_and_value() {
    let mut h = Harness::new();
    let recipient = Address::repeat_byte(0x02);
    let miner = Address::repeat_byte(0xfe);
    h.state.set_balance(sender(), U256::from(10_000_000)).unwrap();

    let tx = Transaction {
        tx_type: TxType::Binary,
        nonce: 0,
        gas_price: U256::from(2),
        gas_limit: 30_000,
        tos: vec![recipient],
        value: U256::from(1_000),
        sender: sender(),
        ..Default::default()
    };
    let outcome = h.apply(&tx, 1_000).unwrap();

    // Only the intrinsic 21000 is spent; the rest returns to the sender.
    assert_eq!(outcome.gas_used, 21_000);
    assert!(!outcome.receipt.failed);
    assert_eq!(outcome.receipt.cumulative_gas_used, 21_000);
    assert_eq!(outcome.receipt.contract_address, None);

    assert_eq!(h.state.get_balance(recipient), U256::from(1_000));
    assert_eq!(
        h.state.get_balance(sender()),
        U256::from(10_000_000 - 1_000 - 21_000 * 2)
    );
    assert_eq!(h.state.get_balance(miner), U256::from(21_000 * 2));
    assert_eq!(h.state.get_nonce(sender()), 1);
}

#[test]
fn contract_creation_derives_the_address() {
    let mut h = Harness::new();
    h.state.set_balance(sender(), U256::from(10_000_000)).unwrap();

    let tx = Transaction {
        tx_type: TxType::Binary,
        nonce: 0,
        gas_price: U256::from(1),
        gas_limit: 60_000,
        tos: vec![],
        value: U256::from(5),
        sender: sender(),
        ..Default::default()
    };
    let outcome = h.apply(&tx, 1_000).unwrap();
    let created = create_address(sender(), 0);
    assert_eq!(outcome.receipt.contract_address, Some(created));
    assert_eq!(h.state.get_balance(created), U256::from(5));
}

#[test]
fn nonce_errors_classify_for_the_producer() {
    let mut h = Harness::new();
    h.state.set_balance(sender(), U256::from(10_000_000)).unwrap();
    h.state.set_nonce(sender(), 5).unwrap();

    let mut tx = Transaction {
        tx_type: TxType::Binary,
        nonce: 4,
        gas_price: U256::from(1),
        gas_limit: 21_000,
        tos: vec![Address::repeat_byte(0x02)],
        sender: sender(),
        ..Default::default()
    };
    let err = h.apply(&tx, 1_000).unwrap_err();
    assert!(matches!(err, ExecutionError::NonceTooLow { expected: 5, got: 4 }));
    assert!(err.is_skippable());

    tx.nonce = 9;
    let err = h.apply(&tx, 1_000).unwrap_err();
    assert!(matches!(err, ExecutionError::NonceTooHigh { expected: 5, got: 9 }));
    assert!(err.is_retainable());
}

#[test]
fn exhausted_gas_pool_rejects_admission() {
    let spec = Arc::new(ChainSpec::default());
    let db = Arc::new(TrieDb::new(Arc::new(MemoryKeyValueStore::new())));
    let executor = Executor::new(spec);
    let mut state = StateDb::new(B256::ZERO, db.clone()).unwrap();
    let mut ctx = DposContext::new(db);
    state.set_balance(sender(), U256::from(10_000_000)).unwrap();

    let header = Header { gas_limit: 8_000_000, ..Default::default() };
    let mut gas_pool = GasPool::new(20_000);
    let mut cumulative = 0;
    let tx = Transaction {
        tx_type: TxType::Binary,
        gas_price: U256::from(1),
        gas_limit: 21_000,
        tos: vec![Address::repeat_byte(0x02)],
        sender: sender(),
        ..Default::default()
    };
    let err = executor
        .apply_transaction(&mut ctx, &mut gas_pool, &mut state, &header, &tx, &mut cumulative)
        .unwrap_err();
    assert!(err.is_gas_limit_reached());
}

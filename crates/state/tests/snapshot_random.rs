//! Randomized snapshot/revert equivalence: a reverted state must be
//! observationally identical to a fresh state that replayed only the
//! mutations preceding the snapshot.

use alloy_primitives::{Address, Bytes, B256, U256};
use proptest::prelude::*;
use std::{collections::BTreeMap, sync::Arc};
use ursa_db::MemoryKeyValueStore;
use ursa_primitives::Log;
use ursa_state::StateDb;
use ursa_trie::TrieDb;

#[derive(Clone, Debug)]
enum Action {
    SetBalance { addr: u8, value: u64 },
    AddBalance { addr: u8, value: u64 },
    SetNonce { addr: u8, value: u64 },
    SetLockedBalance { addr: u8, value: u64 },
    SetDelegateAddresses { addr: u8, target: u8 },
    SetDelegateTimestamp { addr: u8, value: u64 },
    SetState { addr: u8, key: u8, value: u8 },
    SetCode { addr: u8, value: u8 },
    CreateAccount { addr: u8 },
    Suicide { addr: u8 },
    AddRefund { value: u64 },
    AddLog { addr: u8, data: u8 },
}

fn action_strategy() -> impl Strategy<Value = Action> {
    let addr = 0u8..8;
    prop_oneof![
        (addr.clone(), 0u64..100).prop_map(|(addr, value)| Action::SetBalance { addr, value }),
        (addr.clone(), 0u64..100).prop_map(|(addr, value)| Action::AddBalance { addr, value }),
        (addr.clone(), 0u64..100).prop_map(|(addr, value)| Action::SetNonce { addr, value }),
        (addr.clone(), 0u64..100)
            .prop_map(|(addr, value)| Action::SetLockedBalance { addr, value }),
        (addr.clone(), 0u8..8)
            .prop_map(|(addr, target)| Action::SetDelegateAddresses { addr, target }),
        (addr.clone(), 0u64..100)
            .prop_map(|(addr, value)| Action::SetDelegateTimestamp { addr, value }),
        (addr.clone(), 0u8..4, 0u8..100)
            .prop_map(|(addr, key, value)| Action::SetState { addr, key, value }),
        (addr.clone(), 0u8..100).prop_map(|(addr, value)| Action::SetCode { addr, value }),
        addr.clone().prop_map(|addr| Action::CreateAccount { addr }),
        addr.clone().prop_map(|addr| Action::Suicide { addr }),
        (0u64..100).prop_map(|value| Action::AddRefund { value }),
        (addr, 0u8..100).prop_map(|(addr, data)| Action::AddLog { addr, data }),
    ]
}

fn address(byte: u8) -> Address {
    Address::with_last_byte(byte)
}

fn apply(state: &mut StateDb, action: &Action) {
    match *action {
        Action::SetBalance { addr, value } => {
            state.set_balance(address(addr), U256::from(value)).unwrap()
        }
        Action::AddBalance { addr, value } => {
            state.add_balance(address(addr), U256::from(value)).unwrap()
        }
        Action::SetNonce { addr, value } => state.set_nonce(address(addr), value).unwrap(),
        Action::SetLockedBalance { addr, value } => {
            state.set_locked_balance(address(addr), U256::from(value)).unwrap()
        }
        Action::SetDelegateAddresses { addr, target } => state
            .set_delegate_addresses(address(addr), vec![address(target)])
            .unwrap(),
        Action::SetDelegateTimestamp { addr, value } => {
            state.set_delegate_timestamp(address(addr), U256::from(value)).unwrap()
        }
        Action::SetState { addr, key, value } => state
            .set_state(
                address(addr),
                B256::with_last_byte(key),
                B256::with_last_byte(value),
            )
            .unwrap(),
        Action::SetCode { addr, value } => {
            state.set_code(address(addr), Bytes::from(vec![value; 4])).unwrap()
        }
        Action::CreateAccount { addr } => state.create_account(address(addr)).unwrap(),
        Action::Suicide { addr } => {
            let _ = state.suicide(address(addr)).unwrap();
        }
        Action::AddRefund { value } => state.add_refund(value),
        Action::AddLog { addr, data } => state.add_log(Log {
            address: address(addr),
            data: Bytes::from(vec![data]),
            ..Default::default()
        }),
    }
}

fn assert_observationally_equal(reverted: &mut StateDb, replayed: &mut StateDb) {
    for byte in 0u8..8 {
        let addr = address(byte);
        assert_eq!(reverted.exist(addr), replayed.exist(addr), "exist({addr})");
        assert_eq!(
            reverted.has_suicided(addr),
            replayed.has_suicided(addr),
            "has_suicided({addr})"
        );
        assert_eq!(
            reverted.get_balance(addr),
            replayed.get_balance(addr),
            "balance({addr})"
        );
        assert_eq!(reverted.get_nonce(addr), replayed.get_nonce(addr), "nonce({addr})");
        assert_eq!(
            reverted.get_locked_balance(addr),
            replayed.get_locked_balance(addr),
            "locked_balance({addr})"
        );
        assert_eq!(
            reverted.get_delegate_timestamp(addr),
            replayed.get_delegate_timestamp(addr),
            "delegate_timestamp({addr})"
        );
        assert_eq!(
            reverted.get_delegate_addresses(addr),
            replayed.get_delegate_addresses(addr),
            "delegate_addresses({addr})"
        );
        assert_eq!(reverted.get_code(addr), replayed.get_code(addr), "code({addr})");
        assert_eq!(
            reverted.get_code_hash(addr),
            replayed.get_code_hash(addr),
            "code_hash({addr})"
        );

        let mut left = BTreeMap::new();
        reverted
            .for_each_storage(addr, &mut |key, value| {
                left.insert(key, value);
                true
            })
            .unwrap();
        let mut right = BTreeMap::new();
        replayed
            .for_each_storage(addr, &mut |key, value| {
                right.insert(key, value);
                true
            })
            .unwrap();
        assert_eq!(left, right, "storage({addr})");
    }
    assert_eq!(reverted.get_refund(), replayed.get_refund(), "refund");
    assert_eq!(reverted.get_logs(B256::ZERO), replayed.get_logs(B256::ZERO), "logs");
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn revert_matches_prefix_replay(
        actions in proptest::collection::vec(action_strategy(), 1..32),
        cut in any::<proptest::sample::Index>(),
    ) {
        let cut = cut.index(actions.len() + 1);

        let store = Arc::new(MemoryKeyValueStore::new());
        let db = Arc::new(TrieDb::new(store));
        let mut state = StateDb::new(B256::ZERO, db.clone()).unwrap();

        for action in &actions[..cut] {
            apply(&mut state, action);
        }
        let snapshot = state.snapshot();
        for action in &actions[cut..] {
            apply(&mut state, action);
        }
        state.revert_to_snapshot(snapshot).unwrap();

        let mut replayed = StateDb::new(B256::ZERO, db).unwrap();
        for action in &actions[..cut] {
            apply(&mut replayed, action);
        }

        assert_observationally_equal(&mut state, &mut replayed);
    }
}

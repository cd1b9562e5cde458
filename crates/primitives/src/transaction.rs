use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_rlp::{Encodable, RlpDecodable, RlpEncodable};

/// The kind of a transaction.
///
/// `Binary` transactions are ordinary value transfers / contract calls; the
/// remaining kinds drive the DPoS delegation lifecycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TxType {
    /// Plain value transfer or contract call/creation.
    #[default]
    Binary = 0,
    /// Register the sender as a block-producer candidate.
    LoginCandidate = 1,
    /// Remove the sender from the candidate set.
    LogoutCandidate = 2,
    /// Lock `value` behind a delegation to the listed candidates.
    Delegate = 3,
    /// Start unbonding; enqueues a delayed redemption action.
    UnDelegate = 4,
    /// Manually redeem the locked balance once the delay has matured.
    Redeem = 5,
}

impl TxType {
    /// Whether this kind is one of the DPoS bookkeeping transactions.
    pub const fn is_dpos(&self) -> bool {
        !matches!(self, Self::Binary)
    }
}

impl Encodable for TxType {
    fn encode(&self, out: &mut dyn alloy_rlp::BufMut) {
        (*self as u8).encode(out);
    }

    fn length(&self) -> usize {
        1
    }
}

impl alloy_rlp::Decodable for TxType {
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        let kind = match u8::decode(buf)? {
            0 => Self::Binary,
            1 => Self::LoginCandidate,
            2 => Self::LogoutCandidate,
            3 => Self::Delegate,
            4 => Self::UnDelegate,
            5 => Self::Redeem,
            _ => return Err(alloy_rlp::Error::Custom("unknown transaction type")),
        };
        Ok(kind)
    }
}

/// A transaction.
///
/// Signature handling is an ingress concern: by the time a transaction
/// reaches the pool or the executor its sender has been recovered and rides
/// along with the payload.
#[derive(Clone, Debug, Default, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct Transaction {
    /// Transaction kind.
    pub tx_type: TxType,
    /// Sender account nonce.
    pub nonce: u64,
    /// Price per unit of gas.
    pub gas_price: U256,
    /// Gas limit of this transaction.
    pub gas_limit: u64,
    /// Recipients. Empty for contract creation; DPoS transactions use it for
    /// the delegated-to candidates.
    pub tos: Vec<Address>,
    /// Transferred (or delegated) value.
    pub value: U256,
    /// Call data.
    pub payload: Bytes,
    /// Recovered sender.
    pub sender: Address,
}

impl Transaction {
    /// The first recipient, if any.
    pub fn to(&self) -> Option<&Address> {
        self.tos.first()
    }

    /// A binary transaction with no recipient creates a contract.
    pub fn is_contract_creation(&self) -> bool {
        self.tx_type == TxType::Binary && self.tos.is_empty()
    }

    /// Hash of the RLP encoding of this transaction.
    ///
    /// Computed on every call; callers that need it repeatedly should cache
    /// it on their side.
    pub fn hash_slow(&self) -> B256 {
        let mut buf = Vec::new();
        self.encode(&mut buf);
        keccak256(&buf)
    }

    /// Total cost to admit this transaction: `gas_price * gas_limit + value`.
    ///
    /// Returns `None` on arithmetic overflow.
    pub fn cost(&self) -> Option<U256> {
        self.gas_price
            .checked_mul(U256::from(self.gas_limit))
            .and_then(|fee| fee.checked_add(self.value))
    }
}

/// Computes the address of a contract created by `sender` at `nonce`:
/// the trailing 20 bytes of `keccak256(rlp([sender, nonce]))`.
pub fn create_address(sender: Address, nonce: u64) -> Address {
    #[derive(RlpEncodable)]
    struct CreateInput {
        sender: Address,
        nonce: u64,
    }
    let mut buf = Vec::new();
    CreateInput { sender, nonce }.encode(&mut buf);
    Address::from_slice(&keccak256(&buf)[12..])
}

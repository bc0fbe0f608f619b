use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;

pub const HASH_LENGTH: usize = 32;

// --- NewTypes ---

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Hash(pub [u8; HASH_LENGTH]);

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", hex::encode(self.0))
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl Serialize for Hash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Hash::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

impl Hash {
    /// The "no parent" marker carried by a genesis block.
    pub const ZERO: Hash = Hash([0u8; HASH_LENGTH]);

    pub fn from_slice(bytes: &[u8]) -> Self {
        let mut arr = [0u8; HASH_LENGTH];
        let len = bytes.len().min(HASH_LENGTH);
        arr[..len].copy_from_slice(&bytes[..len]);
        Hash(arr)
    }

    pub fn from_hex(s: &str) -> Result<Self, String> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s).map_err(|e| format!("Invalid hex: {}", e))?;
        if bytes.len() != HASH_LENGTH {
            return Err(format!(
                "Invalid hash length: expected {} bytes, got {}",
                HASH_LENGTH,
                bytes.len()
            ));
        }
        Ok(Hash::from_slice(&bytes))
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }

    /// SHA-256 applied twice.
    pub fn double_sha256(data: &[u8]) -> Self {
        let first = Sha256::digest(data);
        let second = Sha256::digest(first);
        Hash::from_slice(&second)
    }
}

// --- Domain Structs ---

/// Reference to one output of a prior transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct OutPoint {
    pub tx_hash: Hash,
    pub index: u32,
}

impl OutPoint {
    pub fn new(tx_hash: Hash, index: u32) -> Self {
        Self { tx_hash, index }
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tx_hash, self.index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TxInput {
    /// The output this input spends.
    pub claimed: OutPoint,
    #[serde(with = "hex_serde")]
    pub script_sig: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TxOutput {
    pub value: u64,
    #[serde(with = "hex_serde")]
    pub script_pubkey: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Transaction {
    pub version: u32,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    pub lock_time: u32,
}

impl Transaction {
    pub fn hash(&self) -> Hash {
        let mut enc = Encoder::default();
        enc.u32(self.version);
        enc.u32(self.inputs.len() as u32);
        for input in &self.inputs {
            enc.hash(&input.claimed.tx_hash);
            enc.u32(input.claimed.index);
            enc.bytes(&input.script_sig);
        }
        enc.u32(self.outputs.len() as u32);
        for output in &self.outputs {
            enc.u64(output.value);
            enc.bytes(&output.script_pubkey);
        }
        enc.u32(self.lock_time);
        Hash::double_sha256(&enc.finish())
    }

    /// A transaction without inputs mints new value.
    pub fn is_coinbase(&self) -> bool {
        self.inputs.is_empty()
    }

    /// Returns the input claiming `outpoint`, if any.
    pub fn claimer_of(&self, outpoint: &OutPoint) -> Option<&TxInput> {
        self.inputs.iter().find(|input| input.claimed == *outpoint)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BlockHeader {
    pub version: u32,
    pub prev_block_hash: Hash,
    pub merkle_root: Hash,
    pub timestamp: i64,
    /// Compact difficulty target.
    pub bits: u32,
    pub nonce: u32,
}

impl BlockHeader {
    /// Double SHA-256 over the canonical header encoding.
    pub fn hash(&self) -> Hash {
        let mut enc = Encoder::default();
        enc.u32(self.version);
        enc.hash(&self.prev_block_hash);
        enc.hash(&self.merkle_root);
        enc.i64(self.timestamp);
        enc.u32(self.bits);
        enc.u32(self.nonce);
        Hash::double_sha256(&enc.finish())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    pub fn prev_hash(&self) -> Hash {
        self.header.prev_block_hash
    }

    pub fn find_transaction(&self, tx_hash: &Hash) -> Option<&Transaction> {
        self.transactions.iter().find(|tx| tx.hash() == *tx_hash)
    }

    pub fn contains_transaction(&self, tx_hash: &Hash) -> bool {
        self.find_transaction(tx_hash).is_some()
    }

    /// Returns the first input in this block claiming `outpoint`.
    pub fn claimer_of(&self, outpoint: &OutPoint) -> Option<&TxInput> {
        self.transactions.iter().find_map(|tx| tx.claimer_of(outpoint))
    }
}

/// Little-endian canonical encoder used for content hashing.
#[derive(Default)]
struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn hash(&mut self, h: &Hash) {
        self.buf.extend_from_slice(&h.0);
    }

    fn bytes(&mut self, b: &[u8]) {
        self.u32(b.len() as u32);
        self.buf.extend_from_slice(b);
    }

    fn finish(self) -> Vec<u8> {
        self.buf
    }
}

// --- Helper Modules for Serde ---

mod hex_serde {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coinbase(tag: u8) -> Transaction {
        Transaction {
            outputs: vec![TxOutput { value: 50, script_pubkey: vec![tag] }],
            ..Default::default()
        }
    }

    #[test]
    fn test_header_hash_depends_on_nonce() {
        let mut header = BlockHeader::default();
        let h1 = header.hash();
        header.nonce = 1;
        assert_ne!(h1, header.hash());
    }

    #[test]
    fn test_tx_hash_distinguishes_outputs() {
        assert_ne!(coinbase(1).hash(), coinbase(2).hash());
        assert_eq!(coinbase(1).hash(), coinbase(1).hash());
    }

    #[test]
    fn test_hash_hex_roundtrip() {
        let h = Hash::double_sha256(b"ledgerlink");
        let json = serde_json::to_string(&h).unwrap();
        let back: Hash = serde_json::from_str(&json).unwrap();
        assert_eq!(h, back);
        assert!(Hash::from_hex("abcd").is_err());
    }

    #[test]
    fn test_block_claimer_lookup() {
        let funding = coinbase(7);
        let spend = Transaction {
            inputs: vec![TxInput { claimed: OutPoint::new(funding.hash(), 0), script_sig: vec![] }],
            outputs: vec![TxOutput { value: 10, script_pubkey: vec![] }],
            ..Default::default()
        };
        let block = Block { header: BlockHeader::default(), transactions: vec![funding.clone(), spend] };

        assert!(block.contains_transaction(&funding.hash()));
        assert!(block.claimer_of(&OutPoint::new(funding.hash(), 0)).is_some());
        assert!(block.claimer_of(&OutPoint::new(funding.hash(), 1)).is_none());
        assert!(funding.is_coinbase());
    }
}

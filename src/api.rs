//! Serde shapes for the subset of dogecoind's verbose JSON-RPC results the
//! crate consumes. Fields not read anywhere are left out; unknown fields are
//! ignored on deserialization.

use super::*;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptSig {
  pub asm: String,
  pub hex: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vin {
  #[serde(default)]
  pub txid: Option<Txid>,
  #[serde(default)]
  pub vout: Option<u32>,
  #[serde(rename = "scriptSig", default)]
  pub script_sig: Option<ScriptSig>,
  #[serde(default)]
  pub coinbase: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptPubKey {
  pub hex: String,
  #[serde(default)]
  pub addresses: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vout {
  pub value: f64,
  pub n: u32,
  #[serde(rename = "scriptPubKey")]
  pub script_pub_key: ScriptPubKey,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTransaction {
  pub txid: Txid,
  #[serde(default)]
  pub vin: Vec<Vin>,
  #[serde(default)]
  pub vout: Vec<Vout>,
  #[serde(default)]
  pub blockhash: Option<BlockHash>,
  #[serde(default)]
  pub confirmations: Option<i64>,
}

impl RawTransaction {
  pub fn is_coinbase(&self) -> bool {
    self.vin.iter().any(|vin| vin.coinbase.is_some())
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
  pub hash: BlockHash,
  pub height: u64,
  pub tx: Vec<RawTransaction>,
  #[serde(default)]
  pub nextblockhash: Option<BlockHash>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unspent {
  pub txid: Txid,
  pub vout: u32,
  #[serde(default)]
  pub address: Option<String>,
  #[serde(rename = "scriptPubKey")]
  pub script_pub_key: String,
  pub amount: f64,
  pub confirmations: i64,
}

impl Unspent {
  pub fn satoshis(&self) -> u64 {
    (self.amount * COIN_VALUE as f64).round() as u64
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletTransaction {
  pub txid: Txid,
  pub confirmations: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListTransactionsEntry {
  #[serde(default)]
  pub address: Option<String>,
  pub category: String,
  pub confirmations: i64,
  #[serde(default)]
  pub label: Option<String>,
  #[serde(default)]
  pub account: Option<String>,
  #[serde(default)]
  pub txid: Option<Txid>,
  #[serde(default)]
  pub time: Option<u64>,
}

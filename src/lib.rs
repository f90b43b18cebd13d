#![allow(clippy::too_many_arguments)]

use {
  self::{envelope::Envelope, walker::ChainWalker},
  anyhow::{anyhow, bail, ensure, Context, Error},
  bitcoin::{
    blockdata::{
      opcodes,
      script::{self, PushBytes},
    },
    consensus,
    hashes::{hash160, Hash},
    secp256k1::{self, Message, Secp256k1, SecretKey},
    BlockHash, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness,
  },
  chrono::{DateTime, Utc},
  lazy_static::lazy_static,
  log::{debug, info, warn},
  regex::Regex,
  serde::{Deserialize, Serialize},
  serde_with::{DeserializeFromStr, SerializeDisplay},
  std::{
    collections::{BTreeMap, HashSet, VecDeque},
    env,
    fmt::{self, Display, Formatter},
    fs,
    path::{Path, PathBuf},
    str::FromStr,
    sync::{mpsc, Mutex},
    thread,
    time::Duration,
  },
};

pub use self::{
  address::Address,
  broadcast::Broadcaster,
  chain::Chain,
  inscription_id::InscriptionId,
  materializer::Materializer,
  media::Media,
  mint::Minter,
  progress::{ProgressSnapshot, ProgressTracker},
  rpc::{Client, Rpc, RpcError},
  run_log::RunRecord,
  settings::Settings,
  store::{ContentStore, MasterEntry},
  wallet::{Utxo, Wallet},
};

pub mod address;
pub mod api;
pub mod broadcast;
pub mod chain;
pub mod envelope;
pub mod inscribe;
pub mod inscription_id;
pub mod materializer;
pub mod media;
pub mod mint;
pub mod progress;
pub mod resolver;
pub mod rpc;
pub mod run_log;
pub mod settings;
pub mod store;
pub mod walker;
pub mod wallet;

pub type Result<T = (), E = Error> = std::result::Result<T, E>;

fn default<T: Default>() -> T {
  Default::default()
}

/// Dogecoin base units per coin.
pub const COIN_VALUE: u64 = 100_000_000;

#[cfg(test)]
mod test_node;

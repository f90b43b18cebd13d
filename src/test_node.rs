use {
  super::*,
  bitcoin::{blockdata::script::Instruction, Script},
  std::collections::HashMap,
};

/// Renders a script the way the node's `asm` field does: small data pushes
/// and pushnums as decimal script numbers, larger pushes as hex.
pub(crate) fn script_asm(script: &Script) -> String {
  let mut tokens = Vec::new();

  for instruction in script.instructions() {
    match instruction.unwrap() {
      Instruction::PushBytes(push) => {
        let bytes = push.as_bytes();
        if bytes.len() <= 4 {
          tokens.push(script_num(bytes).to_string());
        } else {
          tokens.push(hex::encode(bytes));
        }
      }
      Instruction::Op(op) => {
        let value = op.to_u8();
        if (0x51..=0x60).contains(&value) {
          tokens.push((value - 0x50).to_string());
        } else if value == 0x4f {
          tokens.push("-1".into());
        } else {
          tokens.push(format!("{op:?}"));
        }
      }
    }
  }

  tokens.join(" ")
}

fn script_num(bytes: &[u8]) -> i64 {
  let mut n = 0i64;

  for (i, byte) in bytes.iter().enumerate() {
    n |= i64::from(*byte) << (8 * i);
  }

  if let Some(last) = bytes.last() {
    if last & 0x80 != 0 {
      n &= !(0x80i64 << (8 * (bytes.len() - 1)));
      n = -n;
    }
  }

  n
}

/// A distinct, decodable transaction for broadcast tests.
pub(crate) fn dummy_tx(n: u64) -> Transaction {
  Transaction {
    version: 1,
    lock_time: bitcoin::absolute::LockTime::ZERO,
    input: vec![TxIn {
      previous_output: OutPoint {
        txid: txid(n),
        vout: 0,
      },
      script_sig: ScriptBuf::new(),
      sequence: Sequence::MAX,
      witness: Witness::new(),
    }],
    output: vec![TxOut {
      value: 100_000,
      script_pubkey: script::Builder::new()
        .push_opcode(opcodes::OP_TRUE)
        .into_script(),
    }],
  }
}

pub(crate) fn txid(n: u64) -> Txid {
  let mut bytes = [0; 32];
  bytes[..8].copy_from_slice(&n.to_le_bytes());
  Txid::from_byte_array(bytes)
}

pub(crate) fn block_hash(height: u64) -> BlockHash {
  let mut bytes = [0xbb; 32];
  bytes[..8].copy_from_slice(&height.to_le_bytes());
  BlockHash::from_byte_array(bytes)
}

#[derive(Default)]
pub(crate) struct State {
  pub(crate) transactions: HashMap<Txid, api::RawTransaction>,
  pub(crate) blocks: Vec<api::Block>,
  pub(crate) unspent: Vec<api::Unspent>,
  pub(crate) wallet_transactions: HashMap<Txid, api::WalletTransaction>,
  pub(crate) entries: Vec<api::ListTransactionsEntry>,
  pub(crate) mempool: Vec<Txid>,
  pub(crate) broadcast: Vec<Transaction>,
  pub(crate) send_scripts: VecDeque<Result<(), RpcError>>,
  pub(crate) list_unspent_failures: u32,
}

/// In-memory dogecoind stand-in for unit tests.
#[derive(Default)]
pub(crate) struct TestNode {
  pub(crate) state: Mutex<State>,
}

impl TestNode {
  pub(crate) fn new() -> Self {
    let node = Self::default();
    node.mine_empty_block();
    node
  }

  pub(crate) fn mine_empty_block(&self) -> u64 {
    let mut state = self.state.lock().unwrap();
    let height = state.blocks.len() as u64;
    state.blocks.push(api::Block {
      hash: block_hash(height),
      height,
      tx: Vec::new(),
      nextblockhash: None,
    });
    if height > 0 {
      state.blocks[height as usize - 1].nextblockhash = Some(block_hash(height));
    }
    height
  }

  /// Inserts a transaction whose first input carries `asm`, confirmed at
  /// `height` (or in the mempool when `None`), optionally spending a prior
  /// outpoint so the walker can find it.
  pub(crate) fn insert_envelope_tx(
    &self,
    txid: Txid,
    height: Option<u64>,
    asm: &str,
    spends: Option<(Txid, u32)>,
  ) {
    let tx = api::RawTransaction {
      txid,
      vin: vec![api::Vin {
        txid: spends.map(|(txid, _)| txid),
        vout: spends.map(|(_, vout)| vout),
        script_sig: Some(api::ScriptSig {
          asm: asm.into(),
          hex: String::new(),
        }),
        coinbase: None,
      }],
      vout: vec![api::Vout {
        value: 0.001,
        n: 0,
        script_pub_key: api::ScriptPubKey {
          hex: String::new(),
          addresses: Vec::new(),
        },
      }],
      blockhash: height.map(block_hash),
      confirmations: height.map(|_| 1),
    };

    let mut state = self.state.lock().unwrap();
    if let Some(height) = height {
      assert!((height as usize) < state.blocks.len(), "mine blocks first");
      state.blocks[height as usize].tx.push(tx.clone());
    } else {
      state.mempool.push(txid);
    }
    state.transactions.insert(txid, tx);
  }

  pub(crate) fn insert_raw_transaction(&self, tx: api::RawTransaction) {
    self.state.lock().unwrap().transactions.insert(tx.txid, tx);
  }

  /// Confirms a real transaction at `height`, rendering its input scripts
  /// the way the node's verbose output would.
  pub(crate) fn insert_transaction(&self, tx: &Transaction, height: u64) {
    let raw = api::RawTransaction {
      txid: tx.txid(),
      vin: tx
        .input
        .iter()
        .map(|input| api::Vin {
          txid: Some(input.previous_output.txid),
          vout: Some(input.previous_output.vout),
          script_sig: Some(api::ScriptSig {
            asm: script_asm(&input.script_sig),
            hex: hex::encode(input.script_sig.as_bytes()),
          }),
          coinbase: None,
        })
        .collect(),
      vout: tx
        .output
        .iter()
        .enumerate()
        .map(|(n, output)| api::Vout {
          value: output.value as f64 / COIN_VALUE as f64,
          n: n as u32,
          script_pub_key: api::ScriptPubKey {
            hex: hex::encode(output.script_pubkey.as_bytes()),
            addresses: Vec::new(),
          },
        })
        .collect(),
      blockhash: Some(block_hash(height)),
      confirmations: Some(1),
    };

    let mut state = self.state.lock().unwrap();
    assert!((height as usize) < state.blocks.len(), "mine blocks first");
    state.blocks[height as usize].tx.push(raw.clone());
    state.transactions.insert(raw.txid, raw);
  }

  pub(crate) fn script_send_error(&self, error: RpcError) {
    self
      .state
      .lock()
      .unwrap()
      .send_scripts
      .push_back(Err(error));
  }

  pub(crate) fn script_send_success(&self) {
    self.state.lock().unwrap().send_scripts.push_back(Ok(()));
  }

  pub(crate) fn broadcast_count(&self) -> usize {
    self.state.lock().unwrap().broadcast.len()
  }
}

impl Rpc for TestNode {
  fn get_raw_transaction(&self, txid: Txid) -> Result<api::RawTransaction> {
    self
      .state
      .lock()
      .unwrap()
      .transactions
      .get(&txid)
      .cloned()
      .ok_or_else(|| {
        RpcError::Node {
          code: -5,
          message: format!("No such mempool or blockchain transaction {txid}"),
        }
        .into()
      })
  }

  fn get_block_hash(&self, height: u64) -> Result<BlockHash> {
    let state = self.state.lock().unwrap();
    state
      .blocks
      .get(height as usize)
      .map(|block| block.hash)
      .ok_or_else(|| {
        RpcError::Node {
          code: -8,
          message: "Block height out of range".into(),
        }
        .into()
      })
  }

  fn get_block(&self, hash: BlockHash) -> Result<api::Block> {
    let state = self.state.lock().unwrap();
    state
      .blocks
      .iter()
      .find(|block| block.hash == hash)
      .cloned()
      .ok_or_else(|| {
        RpcError::Node {
          code: -5,
          message: "Block not found".into(),
        }
        .into()
      })
  }

  fn get_block_count(&self) -> Result<u64> {
    Ok(self.state.lock().unwrap().blocks.len() as u64 - 1)
  }

  fn list_unspent(&self, _: u32, _: u32, addresses: &[&str]) -> Result<Vec<api::Unspent>> {
    let mut state = self.state.lock().unwrap();

    if state.list_unspent_failures > 0 {
      state.list_unspent_failures -= 1;
      return Err(
        RpcError::Node {
          code: -28,
          message: "Loading wallet...".into(),
        }
        .into(),
      );
    }

    Ok(
      state
        .unspent
        .iter()
        .filter(|unspent| {
          addresses.is_empty()
            || unspent
              .address
              .as_deref()
              .map_or(false, |address| addresses.contains(&address))
        })
        .cloned()
        .collect(),
    )
  }

  fn send_raw_transaction(&self, hex: &str) -> Result<Txid> {
    let transaction = consensus::encode::deserialize::<Transaction>(&hex::decode(hex)?)?;
    let txid = transaction.txid();

    let mut state = self.state.lock().unwrap();

    if let Some(script) = state.send_scripts.pop_front() {
      script?;
    }

    state.broadcast.push(transaction);
    state.mempool.push(txid);

    Ok(txid)
  }

  fn get_transaction(&self, txid: Txid) -> Result<api::WalletTransaction> {
    self
      .state
      .lock()
      .unwrap()
      .wallet_transactions
      .get(&txid)
      .cloned()
      .ok_or_else(|| {
        RpcError::Node {
          code: -5,
          message: "Invalid or non-wallet transaction id".into(),
        }
        .into()
      })
  }

  fn get_raw_mempool(&self) -> Result<Vec<Txid>> {
    Ok(self.state.lock().unwrap().mempool.clone())
  }

  fn list_transactions(
    &self,
    count: usize,
    skip: usize,
  ) -> Result<Vec<api::ListTransactionsEntry>> {
    let state = self.state.lock().unwrap();
    let end = state.entries.len().saturating_sub(skip);
    let start = end.saturating_sub(count);
    Ok(state.entries[start..end].to_vec())
  }
}

use {
  super::*,
  bitcoin::{
    absolute::LockTime,
    sighash::{EcdsaSighashType, SighashCache},
  },
};

pub(crate) const MAX_SCRIPT_ELEMENT_SIZE: usize = 520;
const MAX_CHUNK_LEN: usize = 240;
const MAX_PAYLOAD_LEN: usize = 1500;

/// Value carried by each commit output and paid to the destination by the
/// reveal.
pub const REVEAL_VALUE: u64 = 100_000;

/// Base units per serialized kilobyte.
pub const DEFAULT_FEE_PER_KB: u64 = 100_000_000;

const DUST_LIMIT: u64 = 1_000_000;

const P2PKH_UNLOCK_ESTIMATE: usize = 107;
const CHANGE_OUTPUT_ESTIMATE: usize = 34;

#[derive(Debug, thiserror::Error)]
#[error("insufficient funds: need {needed} koinu, wallet holds {available}")]
pub struct InsufficientFunds {
  pub needed: u64,
  pub available: u64,
}

#[derive(Debug, Clone)]
enum Push {
  Bytes(Vec<u8>),
  Int(i64),
}

/// A pending spend of the previous transaction's commit output.
struct CommitSpend {
  outpoint: OutPoint,
  lock: ScriptBuf,
  partial: Vec<Push>,
  value: u64,
}

/// Fragments `body` into script chunks and plans the commit-then-reveal
/// transaction chain. Every produced transaction is funded from (and its
/// change returned to) `wallet`, whose file is rewritten after each
/// transaction so an interrupted broadcast can resume against an accurate
/// UTXO view.
///
/// The first envelope-bearing transaction is the second in the chain; its
/// txid (suffixed `i0`) is the inscription's identity.
pub fn build_inscription_chain(
  wallet: &mut Wallet,
  wallet_path: &Path,
  chain: Chain,
  destination: &Address,
  content_type: &str,
  body: &[u8],
  fee_per_kb: u64,
) -> Result<Vec<Transaction>> {
  ensure!(
    content_type.len() <= MAX_SCRIPT_ELEMENT_SIZE,
    "content type longer than {MAX_SCRIPT_ELEMENT_SIZE} bytes"
  );
  ensure!(!body.is_empty(), "cannot inscribe an empty payload");

  let secp = Secp256k1::new();
  let secret_key = wallet.secret_key(chain)?;
  let public_key = wallet.public_key(chain)?;
  let wallet_address = Address::from_base58(&wallet.address, chain)?;

  let partials = pack_partials(content_type.as_bytes(), body);

  let mut transactions = Vec::new();
  let mut pending: Option<CommitSpend> = None;

  for partial in partials {
    let lock = lock_script(&public_key, partial.len());

    let commit_output = TxOut {
      value: REVEAL_VALUE,
      script_pubkey: ScriptBuf::new_p2sh(&lock.script_hash()),
    };

    let tx = build_transaction(
      wallet,
      fee_per_kb,
      &secp,
      &secret_key,
      &public_key,
      pending.take(),
      vec![commit_output],
      &wallet_address,
    )?;

    wallet.process_transaction(&tx, chain)?;
    wallet.save(wallet_path)?;

    pending = Some(CommitSpend {
      outpoint: OutPoint {
        txid: tx.txid(),
        vout: 0,
      },
      lock,
      partial,
      value: REVEAL_VALUE,
    });

    transactions.push(tx);
  }

  let reveal_output = TxOut {
    value: REVEAL_VALUE,
    script_pubkey: destination.script_pubkey(),
  };

  let reveal = build_transaction(
    wallet,
    fee_per_kb,
    &secp,
    &secret_key,
    &public_key,
    pending.take(),
    vec![reveal_output],
    &wallet_address,
  )?;

  wallet.process_transaction(&reveal, chain)?;
  wallet.save(wallet_path)?;

  transactions.push(reveal);

  info!(
    "planned inscription chain of {} transactions, identity {}",
    transactions.len(),
    InscriptionId::from_txid(transactions[1.min(transactions.len() - 1)].txid()),
  );

  Ok(transactions)
}

/// Lays the envelope pushes out as `"ord" <numParts> <contentType>
/// (<remainingAfterThis> <chunk>)*`, then packs them into partial scripts of
/// at most `MAX_PAYLOAD_LEN` serialized bytes. Packing is greedy by pairs;
/// an overflowing pair is pushed back for the next partial.
fn pack_partials(content_type: &[u8], body: &[u8]) -> Vec<Vec<Push>> {
  let parts = body.chunks(MAX_CHUNK_LEN).collect::<Vec<&[u8]>>();

  let mut queue = VecDeque::new();
  queue.push_back(Push::Bytes(b"ord".to_vec()));
  queue.push_back(Push::Int(parts.len() as i64));
  queue.push_back(Push::Bytes(content_type.to_vec()));

  for (n, part) in parts.iter().enumerate() {
    queue.push_back(Push::Int((parts.len() - n - 1) as i64));
    queue.push_back(Push::Bytes(part.to_vec()));
  }

  let mut partials = Vec::new();
  let mut first = true;

  while !queue.is_empty() {
    let mut partial = Vec::new();

    if first {
      partial.push(queue.pop_front().unwrap());
      first = false;
    }

    while to_script(&partial).len() <= MAX_PAYLOAD_LEN && !queue.is_empty() {
      partial.push(queue.pop_front().unwrap());
      partial.push(queue.pop_front().unwrap());
    }

    if to_script(&partial).len() > MAX_PAYLOAD_LEN {
      let chunk = partial.pop().unwrap();
      let marker = partial.pop().unwrap();
      queue.push_front(chunk);
      queue.push_front(marker);
    }

    partials.push(partial);
  }

  partials
}

/// `<pubkey> OP_CHECKSIGVERIFY OP_DROP{n} OP_TRUE`
fn lock_script(public_key: &bitcoin::PublicKey, pushes: usize) -> ScriptBuf {
  let mut builder = script::Builder::new()
    .push_key(public_key)
    .push_opcode(opcodes::all::OP_CHECKSIGVERIFY);

  for _ in 0..pushes {
    builder = builder.push_opcode(opcodes::all::OP_DROP);
  }

  builder.push_opcode(opcodes::OP_TRUE).into_script()
}

fn to_script(pushes: &[Push]) -> ScriptBuf {
  let mut builder = script::Builder::new();

  for push in pushes {
    builder = match push {
      Push::Bytes(bytes) => {
        let bytes: &PushBytes = bytes.as_slice().try_into().unwrap();
        builder.push_slice(bytes)
      }
      Push::Int(n) => builder.push_int(*n),
    };
  }

  builder.into_script()
}

/// Builds and signs one transaction of the chain: the optional commit spend
/// first, then wallet UTXOs selected greedily until outputs and fee are
/// covered, change above dust returned to the wallet.
fn build_transaction(
  wallet: &Wallet,
  fee_per_kb: u64,
  secp: &Secp256k1<secp256k1::All>,
  secret_key: &SecretKey,
  public_key: &bitcoin::PublicKey,
  commit_spend: Option<CommitSpend>,
  outputs: Vec<TxOut>,
  change_address: &Address,
) -> Result<Transaction> {
  let mut tx = Transaction {
    version: 1,
    lock_time: LockTime::ZERO,
    input: Vec::new(),
    output: outputs,
  };

  let mut input_value = 0;
  let mut unlock_estimate = 0;
  let mut prev_scripts = Vec::new();

  if let Some(spend) = &commit_spend {
    tx.input.push(TxIn {
      previous_output: spend.outpoint,
      script_sig: ScriptBuf::new(),
      sequence: Sequence::MAX,
      witness: Witness::new(),
    });
    input_value += spend.value;
    unlock_estimate += commit_unlock_estimate(spend);
    prev_scripts.push(spend.lock.clone());
  }

  let output_value = tx.output.iter().map(|output| output.value).sum::<u64>();

  let mut utxos = wallet.utxos.iter();
  let fee = loop {
    let size =
      consensus::encode::serialize(&tx).len() + unlock_estimate + CHANGE_OUTPUT_ESTIMATE;
    let fee = fee_for_size(size, fee_per_kb);

    if input_value >= output_value + fee {
      break fee;
    }

    let Some(utxo) = utxos.next() else {
      return Err(
        InsufficientFunds {
          needed: output_value + fee,
          available: wallet.balance(),
        }
        .into(),
      );
    };

    tx.input.push(TxIn {
      previous_output: utxo.outpoint(),
      script_sig: ScriptBuf::new(),
      sequence: Sequence::MAX,
      witness: Witness::new(),
    });
    input_value += utxo.satoshis;
    unlock_estimate += P2PKH_UNLOCK_ESTIMATE;
    prev_scripts.push(ScriptBuf::from_bytes(hex::decode(&utxo.script)?));
  };

  let change = input_value - output_value - fee;
  if change >= DUST_LIMIT {
    tx.output.push(TxOut {
      value: change,
      script_pubkey: change_address.script_pubkey(),
    });
  }

  let sighash_type = EcdsaSighashType::All;
  let mut script_sigs = Vec::new();

  for (index, prev_script) in prev_scripts.iter().enumerate() {
    let sighash = SighashCache::new(&tx).legacy_signature_hash(
      index,
      prev_script,
      sighash_type.to_u32(),
    )?;

    let message = Message::from_slice(&sighash.to_byte_array())?;
    let mut signature = secp.sign_ecdsa(&message, secret_key).serialize_der().to_vec();
    signature.push(sighash_type.to_u32() as u8);

    let script_sig = match (&commit_spend, index) {
      (Some(spend), 0) => {
        let mut pushes = spend.partial.clone();
        pushes.push(Push::Bytes(signature));
        pushes.push(Push::Bytes(spend.lock.as_bytes().to_vec()));
        to_script(&pushes)
      }
      _ => {
        let signature: &PushBytes = signature.as_slice().try_into().unwrap();
        script::Builder::new()
          .push_slice(signature)
          .push_key(public_key)
          .into_script()
      }
    };

    script_sigs.push(script_sig);
  }

  for (input, script_sig) in tx.input.iter_mut().zip(script_sigs) {
    input.script_sig = script_sig;
  }

  Ok(tx)
}

fn commit_unlock_estimate(spend: &CommitSpend) -> usize {
  to_script(&spend.partial).len() + 74 + push_overhead(spend.lock.len()) + spend.lock.len()
}

fn push_overhead(len: usize) -> usize {
  if len < 76 {
    1
  } else if len < 256 {
    2
  } else {
    3
  }
}

fn fee_for_size(size: usize, fee_per_kb: u64) -> u64 {
  (size as u64 * fee_per_kb + 999) / 1000
}

#[cfg(test)]
mod tests {
  use {super::*, crate::test_node::script_asm, tempfile::TempDir};

  fn funded_wallet(satoshis: &[u64]) -> Wallet {
    let mut wallet = Wallet::generate(Chain::Regtest);
    let script = hex::encode(
      Address::from_base58(&wallet.address, Chain::Regtest)
        .unwrap()
        .script_pubkey()
        .as_bytes(),
    );

    for (n, satoshis) in satoshis.iter().enumerate() {
      wallet.utxos.push(Utxo {
        txid: crate::test_node::txid(1000 + n as u64),
        vout: 0,
        script: script.clone(),
        satoshis: *satoshis,
      });
    }

    wallet
  }

  fn destination() -> Address {
    let wallet = Wallet::generate(Chain::Regtest);
    Address::from_base58(&wallet.address, Chain::Regtest).unwrap()
  }

  fn build(wallet: &mut Wallet, body: &[u8]) -> Result<Vec<Transaction>> {
    let tempdir = TempDir::new().unwrap();
    build_inscription_chain(
      wallet,
      &tempdir.path().join(".wallet.json"),
      Chain::Regtest,
      &destination(),
      "text/plain",
      body,
      DEFAULT_FEE_PER_KB,
    )
  }

  fn decode_chain(transactions: &[Transaction]) -> (String, Vec<u8>) {
    let mut hex = String::new();
    let mut content_type = None;

    for (n, tx) in transactions.iter().skip(1).enumerate() {
      let tokens_string = script_asm(&tx.input[0].script_sig);
      let tokens = tokens_string.split_whitespace().collect::<Vec<&str>>();

      let envelope = if n == 0 {
        Envelope::parse_genesis(&tokens).unwrap()
      } else {
        Envelope::parse_subsequent(&tokens).unwrap()
      };

      hex.push_str(&envelope.hex);
      if content_type.is_none() {
        content_type = envelope.content_type;
      }
    }

    (content_type.unwrap(), hex::decode(hex).unwrap())
  }

  #[test]
  fn single_partial_round_trip() {
    let mut wallet = funded_wallet(&[50 * COIN_VALUE]);
    let body = b"such inscription, very permanent".to_vec();

    let transactions = build(&mut wallet, &body).unwrap();

    // one commit, one reveal
    assert_eq!(transactions.len(), 2);
    assert_eq!(
      transactions[1].input[0].previous_output,
      OutPoint {
        txid: transactions[0].txid(),
        vout: 0,
      }
    );
    assert_eq!(transactions[1].output[0].value, REVEAL_VALUE);

    let (content_type, bytes) = decode_chain(&transactions);
    assert_eq!(content_type, "text/plain");
    assert_eq!(bytes, body);
  }

  #[test]
  fn multi_partial_round_trip() {
    let mut wallet = funded_wallet(&[500 * COIN_VALUE]);
    let body = vec![0xab; 3000];

    let transactions = build(&mut wallet, &body).unwrap();

    assert!(transactions.len() > 2, "expected a multi-partial chain");

    for pair in transactions.windows(2) {
      assert_eq!(
        pair[1].input[0].previous_output,
        OutPoint {
          txid: pair[0].txid(),
          vout: 0,
        }
      );
    }

    let reveal = transactions.last().unwrap();
    assert_eq!(reveal.output[0].value, REVEAL_VALUE);

    let (content_type, bytes) = decode_chain(&transactions);
    assert_eq!(content_type, "text/plain");
    assert_eq!(bytes, body);
  }

  #[test]
  fn every_transaction_pays_its_fee() {
    let mut wallet = funded_wallet(&[500 * COIN_VALUE]);
    let original = wallet.clone();
    let body = vec![0xcd; 2500];

    let transactions = build(&mut wallet, &body).unwrap();

    // reconstruct spendable values: original utxos plus produced outputs
    let mut values = BTreeMap::new();
    for utxo in &original.utxos {
      values.insert(utxo.outpoint(), utxo.satoshis);
    }
    for tx in &transactions {
      for (vout, output) in tx.output.iter().enumerate() {
        values.insert(
          OutPoint {
            txid: tx.txid(),
            vout: vout as u32,
          },
          output.value,
        );
      }
    }

    for tx in &transactions {
      let in_value = tx
        .input
        .iter()
        .map(|input| values[&input.previous_output])
        .sum::<u64>();
      let out_value = tx.output.iter().map(|output| output.value).sum::<u64>();
      assert!(in_value > out_value, "transaction must pay a positive fee");
    }
  }

  #[test]
  fn wallet_utxos_rotate_through_the_chain() {
    let mut wallet = funded_wallet(&[500 * COIN_VALUE]);
    let body = vec![0xef; 100];

    let transactions = build(&mut wallet, &body).unwrap();

    // the original utxo is gone; change from the reveal remains
    assert!(!wallet.utxos.is_empty());
    let reveal = transactions.last().unwrap();
    assert!(wallet
      .utxos
      .iter()
      .all(|utxo| utxo.txid == reveal.txid()));
  }

  #[test]
  fn built_chain_decodes_through_the_walker() {
    let node = crate::test_node::TestNode::new();
    let mut wallet = funded_wallet(&[500 * COIN_VALUE]);
    let body = vec![0x5a; 3000];

    let transactions = build(&mut wallet, &body).unwrap();
    assert!(transactions.len() > 2);

    for _ in 1..transactions.len() {
      node.mine_empty_block();
    }
    for (height, tx) in transactions.iter().enumerate() {
      node.insert_transaction(tx, height as u64);
    }

    let start = transactions[1].txid();
    let tracker = ProgressTracker::default();
    tracker.begin(start, &start.to_string());

    let payload = ChainWalker::new(&node)
      .walk(start, &tracker, start)
      .unwrap();

    assert!(!payload.truncated);
    assert_eq!(payload.content_type, Some("text/plain".into()));
    assert_eq!(
      crate::walker::decode_payload_hex(&payload.hex, true).unwrap(),
      body
    );
  }

  #[test]
  fn insufficient_funds_is_typed() {
    let mut wallet = funded_wallet(&[1000]);

    let err = build(&mut wallet, b"hello").unwrap_err();
    assert!(err.downcast_ref::<InsufficientFunds>().is_some());
  }

  #[test]
  fn oversized_content_type_is_rejected() {
    let mut wallet = funded_wallet(&[50 * COIN_VALUE]);
    let tempdir = TempDir::new().unwrap();

    let result = build_inscription_chain(
      &mut wallet,
      &tempdir.path().join(".wallet.json"),
      Chain::Regtest,
      &destination(),
      &"x".repeat(MAX_SCRIPT_ELEMENT_SIZE + 1),
      b"hello",
      DEFAULT_FEE_PER_KB,
    );

    assert!(result.is_err());
  }

  #[test]
  fn partials_respect_the_payload_limit() {
    let partials = pack_partials(b"text/plain", &vec![0x11; 10_000]);

    assert!(partials.len() > 1);

    for partial in &partials {
      assert!(to_script(partial).len() <= MAX_PAYLOAD_LEN);
    }

    // chunk pushes stay within the script element limit
    for partial in &partials {
      for push in partial {
        if let Push::Bytes(bytes) = push {
          assert!(bytes.len() <= MAX_SCRIPT_ELEMENT_SIZE);
        }
      }
    }
  }

  #[test]
  fn lock_script_drops_every_push() {
    let wallet = Wallet::generate(Chain::Regtest);
    let public_key = wallet.public_key(Chain::Regtest).unwrap();

    let lock = lock_script(&public_key, 4);
    let asm = lock.to_asm_string();

    assert_eq!(asm.matches("OP_DROP").count(), 4);
    assert!(asm.contains("OP_CHECKSIGVERIFY"));
  }
}

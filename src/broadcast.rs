use super::*;

const CHAIN_LIMIT_BACKOFF: Duration = Duration::from_secs(1);

/// Sends a built transaction chain in order. Anything that cannot be sent is
/// journaled to disk, this transaction and everything after it, so a restart
/// can resume the broadcast instead of stranding a half-spent chain.
pub struct Broadcaster<'a> {
  client: &'a dyn Rpc,
  journal_path: PathBuf,
  retry_chain_limit: bool,
}

impl<'a> Broadcaster<'a> {
  pub fn new(client: &'a dyn Rpc, journal_path: &Path) -> Self {
    Self {
      client,
      journal_path: journal_path.into(),
      retry_chain_limit: false,
    }
  }

  /// When enabled, `too-long-mempool-chain` refusals back off for a second
  /// and retry instead of surfacing.
  pub fn retry_chain_limit(mut self, retry: bool) -> Self {
    self.retry_chain_limit = retry;
    self
  }

  pub fn has_pending(&self) -> bool {
    self.journal_path.exists()
  }

  /// Broadcasts the chain in order and reports the inscription txid: the
  /// second transaction's hash when more than one was produced, else the
  /// first's.
  pub fn broadcast(&self, transactions: &[Transaction]) -> Result<Txid> {
    ensure!(!transactions.is_empty(), "nothing to broadcast");

    for (index, tx) in transactions.iter().enumerate() {
      if let Err(err) = self.send_one(tx) {
        let residue = &transactions[index..];
        self.write_journal(residue)?;
        return Err(err.context(format!(
          "broadcast failed; journaled {} unsent transactions",
          residue.len()
        )));
      }
    }

    self.clear_journal()?;

    Ok(reported_txid(transactions))
  }

  /// Rebroadcasts a journal left by an earlier failure. Call this before
  /// anything else on startup; the journal is removed on clean completion.
  pub fn resume(&self) -> Result {
    if !self.has_pending() {
      return Ok(());
    }

    let transactions = self.load_journal()?;
    info!(
      "resuming broadcast of {} journaled transactions",
      transactions.len()
    );

    self.broadcast(&transactions)?;

    Ok(())
  }

  pub fn clear_journal(&self) -> Result {
    if self.journal_path.exists() {
      fs::remove_file(&self.journal_path)
        .with_context(|| format!("failed to remove {}", self.journal_path.display()))?;
    }
    Ok(())
  }

  fn send_one(&self, tx: &Transaction) -> Result {
    let hex = hex::encode(consensus::encode::serialize(tx));

    loop {
      match self.client.send_raw_transaction(&hex) {
        Ok(txid) => {
          info!("broadcast {txid}");
          return Ok(());
        }
        Err(err) => {
          let Some(rpc) = err.downcast_ref::<RpcError>() else {
            return Err(err);
          };

          if rpc.is_mempool_chain_limit() && self.retry_chain_limit {
            warn!("{}: backing off and retrying", rpc);
            thread::sleep(CHAIN_LIMIT_BACKOFF);
            continue;
          }

          if rpc.is_inputs_spent() || rpc.is_already_in_chain() {
            // the full response is logged so an idempotent re-send can be
            // told apart from a skewed UTXO view after the fact
            warn!("treating {} as already accepted, node said: {rpc}", tx.txid());
            return Ok(());
          }

          return Err(err);
        }
      }
    }
  }

  fn write_journal(&self, transactions: &[Transaction]) -> Result {
    let hexes = transactions
      .iter()
      .map(|tx| hex::encode(consensus::encode::serialize(tx)))
      .collect::<Vec<String>>();

    store::atomic_write(
      &self.journal_path,
      serde_json::to_string_pretty(&hexes)?.as_bytes(),
    )
  }

  fn load_journal(&self) -> Result<Vec<Transaction>> {
    let json = fs::read_to_string(&self.journal_path)
      .with_context(|| format!("failed to read {}", self.journal_path.display()))?;

    let hexes = serde_json::from_str::<Vec<String>>(&json)
      .with_context(|| format!("failed to parse {}", self.journal_path.display()))?;

    hexes
      .iter()
      .map(|hex| Ok(consensus::encode::deserialize(&hex::decode(hex)?)?))
      .collect()
  }
}

fn reported_txid(transactions: &[Transaction]) -> Txid {
  if transactions.len() > 1 {
    transactions[1].txid()
  } else {
    transactions[0].txid()
  }
}

use {
  super::*,
  crate::run_log::{MintMode, RunResult},
};

/// Inscriptions issued per wave before yielding to the mempool.
pub const WAVE_WIDTH: usize = 12;

const CONFIRMATION_POLL: Duration = Duration::from_secs(30);
const SYNC_RETRIES: u32 = 5;
const SYNC_BACKOFF: Duration = Duration::from_secs(30);

pub const DRC20_CONTENT_TYPE: &str = "text/plain;charset=utf8";

pub fn drc20_mint_payload(tick: &str, amount: &str) -> Vec<u8> {
  serde_json::json!({
    "p": "drc-20",
    "op": "mint",
    "tick": tick,
    "amt": amount,
  })
  .to_string()
  .into_bytes()
}

#[derive(Debug, thiserror::Error)]
#[error("wallet view could not be refreshed after {0} attempts")]
pub struct SyncFailed(u32);

#[derive(Debug, Clone)]
pub struct MintJob {
  pub destination: String,
  pub count: usize,
}

/// One inscription job handed to a file-inscribe run.
#[derive(Debug, Clone)]
pub struct FileJob {
  pub file: String,
  pub content_type: String,
  pub body: Vec<u8>,
}

/// What one wave produced. Successes survive a terminal error so the
/// controller can count them before deciding how to recover.
pub struct WaveOutcome {
  pub inscriptions: Vec<InscriptionId>,
  pub error: Option<Error>,
}

/// Issues inscriptions in waves, copes with the node's unconfirmed-ancestor
/// limit by waiting on wallet-scoped confirmations, and keeps the wallet's
/// UTXO view honest between waves.
pub struct Minter<'a> {
  client: &'a dyn Rpc,
  settings: &'a Settings,
  wallet_label: Option<String>,
  confirmation_poll: Duration,
  sync_backoff: Duration,
}

impl<'a> Minter<'a> {
  pub fn new(client: &'a dyn Rpc, settings: &'a Settings) -> Self {
    Self {
      client,
      settings,
      wallet_label: None,
      confirmation_poll: CONFIRMATION_POLL,
      sync_backoff: SYNC_BACKOFF,
    }
  }

  /// Label used as a fallback when `listtransactions` entries carry no
  /// address.
  pub fn wallet_label(mut self, label: &str) -> Self {
    self.wallet_label = Some(label.into());
    self
  }

  #[cfg(test)]
  pub(crate) fn with_intervals(mut self, poll: Duration, backoff: Duration) -> Self {
    self.confirmation_poll = poll;
    self.sync_backoff = backoff;
    self
  }

  /// Rebroadcasts any pending journal left by an interrupted run. Must be
  /// called before new work on startup; while a journal exists, minting
  /// refuses to start.
  pub fn resume_pending(&self) -> Result {
    Broadcaster::new(self.client, &self.settings.pending_path()).resume()
  }

  /// Builds and broadcasts a single inscription chain.
  pub fn inscribe(
    &self,
    wallet: &mut Wallet,
    destination: &Address,
    content_type: &str,
    body: &[u8],
  ) -> Result<InscriptionId> {
    let broadcaster = Broadcaster::new(self.client, &self.settings.pending_path());

    ensure!(
      !broadcaster.has_pending(),
      "a pending journal exists; resume it before minting"
    );

    let transactions = inscribe::build_inscription_chain(
      wallet,
      &self.settings.wallet_path(),
      self.settings.chain(),
      destination,
      content_type,
      body,
      self.settings.fee_per_kb(),
    )?;

    Ok(InscriptionId::from_txid(broadcaster.broadcast(&transactions)?))
  }

  /// Issues up to `count` identical inscriptions, stopping at the first
  /// failure but keeping what succeeded.
  fn wave(
    &self,
    wallet: &mut Wallet,
    destination: &Address,
    content_type: &str,
    body: &[u8],
    count: usize,
  ) -> WaveOutcome {
    let mut inscriptions = Vec::new();

    for _ in 0..count {
      match self.inscribe(wallet, destination, content_type, body) {
        Ok(id) => inscriptions.push(id),
        Err(error) => {
          return WaveOutcome {
            inscriptions,
            error: Some(error),
          }
        }
      }
    }

    WaveOutcome {
      inscriptions,
      error: None,
    }
  }

  /// Mints `jobs` sequentially, `WAVE_WIDTH` at a time, reporting progress
  /// against the grand total across all recipients.
  pub fn bulk_mint(
    &self,
    wallet: &mut Wallet,
    jobs: &[MintJob],
    content_type: &str,
    body: &[u8],
  ) -> Result<Vec<InscriptionId>> {
    let grand_total = jobs.iter().map(|job| job.count).sum::<usize>();
    let mut minted = Vec::new();

    for job in jobs {
      let destination = Address::from_base58(&job.destination, self.settings.chain())?;

      let ids = self.run_waves(wallet, job.count, &mut |wallet, width| {
        self.wave(wallet, &destination, content_type, body, width)
      })?;

      minted.extend(ids);
      info!("minted {}/{grand_total}", minted.len());
    }

    Ok(minted)
  }

  /// The wave state machine. Normal flow is wave, wait for the wallet's
  /// last send to confirm, sync, wave again. A chain-limited wave waits,
  /// drops the pending journal the interrupted broadcast left behind,
  /// syncs, and probes with a test wave that decides whether to continue
  /// or wait out another confirmation.
  fn run_waves(
    &self,
    wallet: &mut Wallet,
    count: usize,
    wave: &mut dyn FnMut(&mut Wallet, usize) -> WaveOutcome,
  ) -> Result<Vec<InscriptionId>> {
    let mut minted = Vec::new();
    let mut remaining = count;

    while remaining > 0 {
      let outcome = wave(wallet, remaining.min(WAVE_WIDTH));
      remaining = remaining.saturating_sub(outcome.inscriptions.len());
      minted.extend(outcome.inscriptions);

      match outcome.error {
        None => {
          if remaining > 0 {
            self.wait_for_wallet_tip(wallet)?;
            self.sync_wallet(wallet)?;
          }
        }
        Some(error) if is_chain_limit(&error) => {
          warn!("wave hit the mempool chain limit, recovering");

          self.wait_for_wallet_tip(wallet)?;
          self.clear_pending()?;
          self.sync_wallet(wallet)?;

          if remaining == 0 {
            continue;
          }

          let test = wave(wallet, remaining.min(WAVE_WIDTH));
          remaining = remaining.saturating_sub(test.inscriptions.len());
          minted.extend(test.inscriptions);

          match test.error {
            None => {}
            Some(error) if is_chain_limit(&error) => {
              self.clear_pending()?;
              self.wait_for_wallet_tip(wallet)?;
              self.sync_wallet(wallet)?;
            }
            Some(error) => return Err(error),
          }
        }
        Some(error) => return Err(error),
      }
    }

    Ok(minted)
  }

  /// Inscribes a list of files for one recipient, journaling progress to an
  /// atomically-written run record. A chain-limited mint is recovered by
  /// waiting out the wallet tip and resolving the true reveal txid from
  /// transaction history.
  pub fn inscribe_files(
    &self,
    wallet: &mut Wallet,
    recipient: &str,
    files: &[FileJob],
    label: &str,
  ) -> Result<RunRecord> {
    let destination = Address::from_base58(recipient, self.settings.chain())?;
    let dir = self.settings.run_log_dir();

    let mut record = RunRecord::new(label, recipient, files.len() as u64);
    record.start_balance = Some(wallet.balance());
    record.save(&dir)?;

    for job in files {
      let result = self.inscribe_file(wallet, &destination, job);

      match result {
        Ok(result) => {
          record.record(result);
          record.save(&dir)?;
        }
        Err(error) => {
          record.fail(&error.to_string());
          record.save(&dir)?;
          return Err(error);
        }
      }
    }

    record.finish(wallet.balance());
    record.save(&dir)?;

    Ok(record)
  }

  fn inscribe_file(
    &self,
    wallet: &mut Wallet,
    destination: &Address,
    job: &FileJob,
  ) -> Result<RunResult> {
    match self.inscribe(wallet, destination, &job.content_type, &job.body) {
      Ok(id) => Ok(RunResult {
        file: job.file.clone(),
        inscription_id: id,
        mode: MintMode::Normal,
        txid: id.txid,
      }),
      Err(error) if is_chain_limit(&error) => {
        warn!("{}: mint interrupted by the mempool chain limit", job.file);

        // the newest accepted send anchors the ancestry walk
        let known_good = self
          .wallet_tip(wallet)?
          .ok_or_else(|| anyhow!("chain limit hit but no unconfirmed wallet send found"))?;

        self.wait_for_wallet_tip(wallet)?;
        self.clear_pending()?;
        self.sync_wallet(wallet)?;

        let reveal = self.recover_reveal(known_good)?;
        info!("{}: recovered reveal {reveal}", job.file);

        Ok(RunResult {
          file: job.file.clone(),
          inscription_id: InscriptionId::from_txid(reveal),
          mode: MintMode::MempoolRecovery,
          txid: reveal,
        })
      }
      Err(error) => Err(error),
    }
  }

  /// Blocks until the wallet's newest unconfirmed send has at least one
  /// confirmation. The transaction to watch is selected once; the wait
  /// never jumps to a different transaction.
  fn wait_for_wallet_tip(&self, wallet: &Wallet) -> Result {
    let Some(txid) = self.wallet_tip(wallet)? else {
      return Ok(());
    };

    info!("waiting for {txid} to confirm");

    loop {
      if self.client.get_transaction(txid)?.confirmations >= 1 {
        return Ok(());
      }
      thread::sleep(self.confirmation_poll);
    }
  }

  /// The wallet-scoped tip: newest `listtransactions` entry that is an
  /// unconfirmed send attributable to this wallet by address, falling back
  /// to the wallet label.
  fn wallet_tip(&self, wallet: &Wallet) -> Result<Option<Txid>> {
    let entries = self.client.list_transactions(1000, 0)?;

    for entry in entries.iter().rev() {
      if entry.confirmations != 0 || entry.category != "send" {
        continue;
      }

      let ours = match entry.address.as_deref() {
        Some(address) => address == wallet.address,
        None => match (&self.wallet_label, &entry.label, &entry.account) {
          (Some(label), Some(entry_label), _) => label == entry_label,
          (Some(label), None, Some(account)) => label == account,
          _ => false,
        },
      };

      if ours {
        if let Some(txid) = entry.txid {
          return Ok(Some(txid));
        }
      }
    }

    Ok(None)
  }

  fn sync_wallet(&self, wallet: &mut Wallet) -> Result {
    for attempt in 1..=SYNC_RETRIES {
      match wallet.sync(self.client) {
        Ok(()) => {
          wallet.save(&self.settings.wallet_path())?;
          return Ok(());
        }
        Err(err) => {
          warn!("wallet sync attempt {attempt} failed: {err}");
          if attempt < SYNC_RETRIES {
            thread::sleep(self.sync_backoff);
          }
        }
      }
    }

    Err(SyncFailed(SYNC_RETRIES).into())
  }

  fn clear_pending(&self) -> Result {
    Broadcaster::new(self.client, &self.settings.pending_path()).clear_journal()
  }

  /// Locates the reveal of a chain-limited mint: walk input ancestry from a
  /// known-good transaction to the genesis-shaped ancestor (one input, two
  /// outputs, not coinbase), then find the recent wallet transaction
  /// spending it.
  fn recover_reveal(&self, known_good: Txid) -> Result<Txid> {
    let mut current = known_good;

    loop {
      let tx = self.client.get_raw_transaction(current)?;

      if tx.vin.len() == 1 && tx.vout.len() == 2 && !tx.is_coinbase() {
        break;
      }

      current = tx
        .vin
        .first()
        .and_then(|vin| vin.txid)
        .ok_or_else(|| anyhow!("ancestry walk reached a coinbase before a genesis-shaped transaction"))?;
    }

    for entry in self.client.list_transactions(1000, 0)?.iter().rev() {
      let Some(txid) = entry.txid else {
        continue;
      };

      if txid == current {
        continue;
      }

      let Ok(tx) = self.client.get_raw_transaction(txid) else {
        continue;
      };

      if tx.vin.iter().any(|vin| vin.txid == Some(current)) {
        return Ok(txid);
      }
    }

    bail!("no wallet transaction spends the recovered ancestor {current}")
  }
}

fn is_chain_limit(error: &Error) -> bool {
  error
    .downcast_ref::<RpcError>()
    .map_or(false, RpcError::is_mempool_chain_limit)
}

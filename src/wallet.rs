use super::*;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
  pub txid: Txid,
  pub vout: u32,
  pub script: String,
  pub satoshis: u64,
}

impl Utxo {
  pub fn outpoint(&self) -> OutPoint {
    OutPoint {
      txid: self.txid,
      vout: self.vout,
    }
  }
}

/// Funding wallet for the inscriber: a WIF private key, its derived
/// address, and the spendable outputs the builder draws on. The file is
/// owned by one mint operation at a time and rewritten after every built
/// transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
  pub privkey: String,
  pub address: String,
  pub utxos: Vec<Utxo>,
}

impl Wallet {
  pub fn generate(chain: Chain) -> Self {
    let secp = Secp256k1::new();
    let (secret_key, public_key) = secp.generate_keypair(&mut secp256k1::rand::thread_rng());

    let public_key = bitcoin::PublicKey {
      compressed: true,
      inner: public_key,
    };

    Self {
      privkey: address::wif_encode(&secret_key, chain),
      address: Address::p2pkh(&public_key, chain).to_string(),
      utxos: Vec::new(),
    }
  }

  pub fn load(path: &Path) -> Result<Self> {
    let json = fs::read_to_string(path)
      .with_context(|| format!("failed to read wallet {}", path.display()))?;

    let mut wallet = serde_json::from_str::<Self>(&json)
      .with_context(|| format!("failed to parse wallet {}", path.display()))?;

    // stale tooling occasionally wrote the same outpoint twice
    let mut seen = HashSet::new();
    wallet.utxos.retain(|utxo| seen.insert(utxo.outpoint()));

    Ok(wallet)
  }

  pub fn save(&self, path: &Path) -> Result {
    store::atomic_write(path, serde_json::to_string_pretty(self)?.as_bytes())
  }

  pub fn balance(&self) -> u64 {
    self.utxos.iter().map(|utxo| utxo.satoshis).sum()
  }

  pub fn secret_key(&self, chain: Chain) -> Result<SecretKey> {
    address::wif_decode(&self.privkey, chain)
  }

  pub fn public_key(&self, chain: Chain) -> Result<bitcoin::PublicKey> {
    Ok(bitcoin::PublicKey {
      compressed: true,
      inner: secp256k1::PublicKey::from_secret_key(&Secp256k1::new(), &self.secret_key(chain)?),
    })
  }

  /// Replaces the UTXO view with the node's, scoped to this wallet's
  /// address.
  pub fn sync(&mut self, client: &dyn Rpc) -> Result {
    let unspent = client.list_unspent(1, 9_999_999, &[self.address.as_str()])?;

    self.utxos = unspent
      .iter()
      .map(|unspent| Utxo {
        txid: unspent.txid,
        vout: unspent.vout,
        script: unspent.script_pub_key.clone(),
        satoshis: unspent.satoshis(),
      })
      .collect();

    info!(
      "wallet {} synced: {} utxos, {} koinu",
      self.address,
      self.utxos.len(),
      self.balance()
    );

    Ok(())
  }

  /// Removes the outputs `tx` spends and re-appends any output paying this
  /// wallet, keeping the view usable for the next transaction in a chain
  /// before anything confirms.
  pub(crate) fn process_transaction(&mut self, tx: &Transaction, chain: Chain) -> Result {
    let spent = tx
      .input
      .iter()
      .map(|input| input.previous_output)
      .collect::<HashSet<OutPoint>>();

    self.utxos.retain(|utxo| !spent.contains(&utxo.outpoint()));

    let own_script = Address::from_base58(&self.address, chain)?.script_pubkey();

    for (vout, output) in tx.output.iter().enumerate() {
      if output.script_pubkey == own_script {
        self.utxos.push(Utxo {
          txid: tx.txid(),
          vout: vout as u32,
          script: hex::encode(output.script_pubkey.as_bytes()),
          satoshis: output.value,
        });
      }
    }

    Ok(())
  }
}

use super::*;

/// Runtime configuration. Explicit values win; anything unset falls back to
/// the environment, then to chain defaults.
///
/// Environment: `DOGECOIN_RPC_URL`, `DOGECOIN_RPC_USER`, `DOGECOIN_RPC_PASS`,
/// `DOGINALS_FEE_PER_KB`, `DOGINALS_CHAIN`, `DOGINALS_DATA_DIR`.
#[derive(Debug, Clone)]
pub struct Settings {
  chain: Chain,
  rpc_url: String,
  rpc_user: String,
  rpc_pass: String,
  fee_per_kb: u64,
  data_dir: PathBuf,
}

impl Settings {
  pub fn new(data_dir: &Path, chain: Chain) -> Self {
    Self {
      chain,
      rpc_url: format!("http://127.0.0.1:{}", chain.default_rpc_port()),
      rpc_user: String::new(),
      rpc_pass: String::new(),
      fee_per_kb: inscribe::DEFAULT_FEE_PER_KB,
      data_dir: data_dir.into(),
    }
  }

  pub fn from_env() -> Result<Self> {
    let chain = match env::var("DOGINALS_CHAIN") {
      Ok(chain) => chain.parse()?,
      Err(_) => Chain::Mainnet,
    };

    let mut settings = Self::new(
      &env::var("DOGINALS_DATA_DIR").map(PathBuf::from).unwrap_or_else(|_| ".".into()),
      chain,
    );

    if let Ok(url) = env::var("DOGECOIN_RPC_URL") {
      settings.rpc_url = url;
    }
    if let Ok(user) = env::var("DOGECOIN_RPC_USER") {
      settings.rpc_user = user;
    }
    if let Ok(pass) = env::var("DOGECOIN_RPC_PASS") {
      settings.rpc_pass = pass;
    }
    if let Ok(fee) = env::var("DOGINALS_FEE_PER_KB") {
      settings.fee_per_kb = fee
        .parse()
        .context("DOGINALS_FEE_PER_KB is not an integer")?;
    }

    Ok(settings)
  }

  pub fn rpc_url(mut self, url: &str) -> Self {
    self.rpc_url = url.into();
    self
  }

  pub fn rpc_auth(mut self, user: &str, pass: &str) -> Self {
    self.rpc_user = user.into();
    self.rpc_pass = pass.into();
    self
  }

  pub fn fee_rate(mut self, fee_per_kb: u64) -> Self {
    self.fee_per_kb = fee_per_kb;
    self
  }

  pub fn chain(&self) -> Chain {
    self.chain
  }

  pub fn fee_per_kb(&self) -> u64 {
    self.fee_per_kb
  }

  pub fn client(&self) -> Result<Client> {
    Client::new(&self.rpc_url, &self.rpc_user, &self.rpc_pass)
  }

  pub fn content_dir(&self) -> PathBuf {
    self.data_dir.join("content")
  }

  pub fn wallet_path(&self) -> PathBuf {
    self.data_dir.join(".wallet.json")
  }

  pub fn pending_path(&self) -> PathBuf {
    self.data_dir.join("pending-txs.json")
  }

  pub fn run_log_dir(&self) -> PathBuf {
    self.data_dir.join("json")
  }
}

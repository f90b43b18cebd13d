use {
  super::*,
  base64::Engine,
  reqwest::header,
  serde::de::DeserializeOwned,
  serde_json::{json, Value},
  std::sync::atomic::{AtomicU64, Ordering},
};

const RPC_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
  #[error("dogecoind transport error: {0}")]
  Transport(#[from] reqwest::Error),
  #[error("dogecoind error {code}: {message}")]
  Node { code: i64, message: String },
}

impl RpcError {
  pub fn is_mempool_chain_limit(&self) -> bool {
    matches!(self, Self::Node { message, .. } if message.contains("too-long-mempool-chain"))
  }

  pub fn is_inputs_spent(&self) -> bool {
    matches!(self, Self::Node { message, .. } if message.contains("bad-txns-inputs-spent"))
  }

  pub fn is_already_in_chain(&self) -> bool {
    matches!(
      self,
      Self::Node { message, .. }
        if message.contains("already in block chain") || message.contains("txn-already-known")
    )
  }
}

/// The node RPC surface the crate consumes. The production implementation is
/// [`Client`]; tests drive the chain-dependent components with an in-memory
/// node implementing the same trait.
pub trait Rpc {
  fn get_raw_transaction(&self, txid: Txid) -> Result<api::RawTransaction>;
  fn get_block_hash(&self, height: u64) -> Result<BlockHash>;
  fn get_block(&self, hash: BlockHash) -> Result<api::Block>;
  fn get_block_count(&self) -> Result<u64>;
  fn list_unspent(&self, minconf: u32, maxconf: u32, addresses: &[&str])
    -> Result<Vec<api::Unspent>>;
  fn send_raw_transaction(&self, hex: &str) -> Result<Txid>;
  fn get_transaction(&self, txid: Txid) -> Result<api::WalletTransaction>;
  fn get_raw_mempool(&self) -> Result<Vec<Txid>>;
  fn list_transactions(&self, count: usize, skip: usize)
    -> Result<Vec<api::ListTransactionsEntry>>;
}

#[derive(Deserialize)]
struct JsonRpcError {
  code: i64,
  message: String,
}

#[derive(Deserialize)]
struct JsonRpcResponse<T> {
  result: Option<T>,
  error: Option<JsonRpcError>,
}

pub struct Client {
  http: reqwest::blocking::Client,
  url: String,
  auth: String,
  next_id: AtomicU64,
}

impl Client {
  pub fn new(url: &str, user: &str, pass: &str) -> Result<Self> {
    Ok(Self {
      http: reqwest::blocking::Client::builder()
        .timeout(RPC_TIMEOUT)
        .build()?,
      url: url.into(),
      auth: format!(
        "Basic {}",
        base64::engine::general_purpose::STANDARD.encode(format!("{user}:{pass}"))
      ),
      next_id: AtomicU64::new(0),
    })
  }

  fn call<T: DeserializeOwned>(&self, method: &str, params: Vec<Value>) -> Result<T> {
    let response = self
      .http
      .post(&self.url)
      .header(header::AUTHORIZATION, &self.auth)
      .json(&json!({
        "jsonrpc": "1.0",
        "id": self.next_id.fetch_add(1, Ordering::Relaxed),
        "method": method,
        "params": params,
      }))
      .send()
      .map_err(RpcError::Transport)?;

    let response = response
      .json::<JsonRpcResponse<T>>()
      .map_err(RpcError::Transport)?;

    if let Some(JsonRpcError { code, message }) = response.error {
      return Err(RpcError::Node { code, message }.into());
    }

    response
      .result
      .ok_or_else(|| anyhow!("dogecoind returned neither result nor error for `{method}`"))
  }
}

impl Rpc for Client {
  fn get_raw_transaction(&self, txid: Txid) -> Result<api::RawTransaction> {
    self.call("getrawtransaction", vec![json!(txid), json!(true)])
  }

  fn get_block_hash(&self, height: u64) -> Result<BlockHash> {
    self.call("getblockhash", vec![json!(height)])
  }

  fn get_block(&self, hash: BlockHash) -> Result<api::Block> {
    self.call("getblock", vec![json!(hash), json!(2)])
  }

  fn get_block_count(&self) -> Result<u64> {
    self.call("getblockcount", Vec::new())
  }

  fn list_unspent(
    &self,
    minconf: u32,
    maxconf: u32,
    addresses: &[&str],
  ) -> Result<Vec<api::Unspent>> {
    self.call(
      "listunspent",
      vec![json!(minconf), json!(maxconf), json!(addresses)],
    )
  }

  fn send_raw_transaction(&self, hex: &str) -> Result<Txid> {
    self.call("sendrawtransaction", vec![json!(hex)])
  }

  fn get_transaction(&self, txid: Txid) -> Result<api::WalletTransaction> {
    self.call("gettransaction", vec![json!(txid), json!(true)])
  }

  fn get_raw_mempool(&self) -> Result<Vec<Txid>> {
    self.call("getrawmempool", Vec::new())
  }

  fn list_transactions(
    &self,
    count: usize,
    skip: usize,
  ) -> Result<Vec<api::ListTransactionsEntry>> {
    self.call(
      "listtransactions",
      vec![json!("*"), json!(count), json!(skip), json!(true)],
    )
  }
}

use super::*;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
  Running,
  Done,
  Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MintMode {
  #[serde(rename = "normal")]
  Normal,
  #[serde(rename = "mempool-recovery")]
  MempoolRecovery,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
  pub file: String,
  pub inscription_id: InscriptionId,
  pub mode: MintMode,
  pub txid: Txid,
}

/// Incrementally-written record of one bulk file-inscribe run. Every save is
/// atomic, so a crash mid-run leaves the last consistent state on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
  pub label: String,
  pub recipient: String,
  pub started_at: DateTime<Utc>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub finished_at: Option<DateTime<Utc>>,
  pub status: RunStatus,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub start_balance: Option<u64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub end_balance: Option<u64>,
  pub total_files: u64,
  pub completed: u64,
  pub results: Vec<RunResult>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

impl RunRecord {
  pub fn new(label: &str, recipient: &str, total_files: u64) -> Self {
    Self {
      label: label.into(),
      recipient: recipient.into(),
      started_at: Utc::now(),
      finished_at: None,
      status: RunStatus::Running,
      start_balance: None,
      end_balance: None,
      total_files,
      completed: 0,
      results: Vec::new(),
      error: None,
    }
  }

  pub fn filename(&self) -> String {
    let label = self
      .label
      .chars()
      .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
      .collect::<String>();

    format!(
      "inscriptions_{label}_{}.json",
      self.started_at.format("%Y-%m-%dT%H-%M-%SZ")
    )
  }

  pub fn save(&self, dir: &Path) -> Result {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    store::atomic_write(
      &dir.join(self.filename()),
      serde_json::to_string_pretty(self)?.as_bytes(),
    )
  }

  pub fn record(&mut self, result: RunResult) {
    self.results.push(result);
    self.completed += 1;
  }

  pub fn finish(&mut self, end_balance: u64) {
    self.status = RunStatus::Done;
    self.end_balance = Some(end_balance);
    self.finished_at = Some(Utc::now());
  }

  pub fn fail(&mut self, error: &str) {
    self.status = RunStatus::Error;
    self.error = Some(error.into());
    self.finished_at = Some(Utc::now());
  }
}

#[cfg(test)]
mod tests {
  use {super::*, tempfile::TempDir};

  fn result(n: u64) -> RunResult {
    RunResult {
      file: format!("file{n}.png"),
      inscription_id: InscriptionId::from_txid(crate::test_node::txid(n)),
      mode: MintMode::Normal,
      txid: crate::test_node::txid(n),
    }
  }

  #[test]
  fn round_trip() {
    let tempdir = TempDir::new().unwrap();

    let mut record = RunRecord::new("drop one", "DTestRecipient", 2);
    record.start_balance = Some(500);
    record.record(result(1));
    record.save(tempdir.path()).unwrap();

    let json = fs::read_to_string(tempdir.path().join(record.filename())).unwrap();
    let loaded = serde_json::from_str::<RunRecord>(&json).unwrap();

    assert_eq!(loaded, record);
    assert_eq!(loaded.status, RunStatus::Running);
    assert_eq!(loaded.completed, 1);
  }

  #[test]
  fn filename_is_stable_across_saves() {
    let record = RunRecord::new("drop/one", "D...", 1);
    assert_eq!(record.filename(), record.filename());
    assert!(!record.filename().contains('/'));
  }

  #[test]
  fn modes_serialize_to_the_wire_names() {
    assert_eq!(
      serde_json::to_string(&MintMode::MempoolRecovery).unwrap(),
      "\"mempool-recovery\""
    );
    assert_eq!(serde_json::to_string(&MintMode::Normal).unwrap(), "\"normal\"");
    assert_eq!(serde_json::to_string(&RunStatus::Done).unwrap(), "\"done\"");
  }

  #[test]
  fn finish_and_fail_stamp_the_record() {
    let mut record = RunRecord::new("x", "y", 1);

    record.finish(42);
    assert_eq!(record.status, RunStatus::Done);
    assert_eq!(record.end_balance, Some(42));
    assert!(record.finished_at.is_some());

    let mut record = RunRecord::new("x", "y", 1);
    record.fail("node went away");
    assert_eq!(record.status, RunStatus::Error);
    assert_eq!(record.error.as_deref(), Some("node went away"));
  }
}

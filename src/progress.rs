use {super::*, std::collections::HashMap};

/// A stable read-only view of one decode's counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSnapshot {
  pub label: String,
  pub chunks_found: u64,
  pub estimated_total: Option<u64>,
  pub dep_total: Option<u64>,
  pub dep_done: u64,
  pub active: bool,
  pub started_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

struct Entry {
  snapshot: ProgressSnapshot,
  subscribers: Vec<mpsc::Sender<ProgressSnapshot>>,
}

/// Live per-decode counters, keyed by the base txid of the top-level
/// request. The tracker is the sole mutator; consumers either poll
/// [`snapshot`](ProgressTracker::snapshot) or take a push-style subscription.
///
/// Invariants: `chunks_found` and `dep_done` never decrease,
/// `estimated_total` only grows, and an entry stops mutating once
/// `active` is false.
#[derive(Default)]
pub struct ProgressTracker {
  entries: Mutex<HashMap<Txid, Entry>>,
}

impl ProgressTracker {
  pub fn begin(&self, key: Txid, label: &str) {
    let now = Utc::now();

    self
      .entries
      .lock()
      .unwrap()
      .entry(key)
      .or_insert_with(|| Entry {
        snapshot: ProgressSnapshot {
          label: label.into(),
          chunks_found: 0,
          estimated_total: None,
          dep_total: None,
          dep_done: 0,
          active: true,
          started_at: now,
          updated_at: now,
        },
        subscribers: Vec::new(),
      });
  }

  pub fn update(&self, key: Txid, label: &str, chunks_delta: u64, last_remaining: Option<u64>) {
    self.mutate(key, |snapshot| {
      snapshot.label = label.into();
      snapshot.chunks_found += chunks_delta;

      if let Some(remaining) = last_remaining {
        let candidate = snapshot.chunks_found + remaining;
        if snapshot.estimated_total.map_or(true, |total| candidate > total) {
          snapshot.estimated_total = Some(candidate);
        }
      }
    });
  }

  pub fn set_dependency_plan(&self, key: Txid, total: u64) {
    self.mutate(key, |snapshot| {
      snapshot.dep_total = Some(total);
    });
  }

  pub fn increment_dependency_done(&self, key: Txid) {
    self.mutate(key, |snapshot| {
      snapshot.dep_done += 1;
    });
  }

  /// Marks the entry inactive. Counters are preserved so late readers see
  /// the final state.
  pub fn complete(&self, key: Txid) {
    let mut entries = self.entries.lock().unwrap();

    if let Some(entry) = entries.get_mut(&key) {
      if entry.snapshot.active {
        entry.snapshot.active = false;
        entry.snapshot.updated_at = Utc::now();
        entry
          .subscribers
          .retain(|subscriber| subscriber.send(entry.snapshot.clone()).is_ok());
        entry.subscribers.clear();
      }
    }
  }

  pub fn snapshot(&self, key: Txid) -> Option<ProgressSnapshot> {
    self
      .entries
      .lock()
      .unwrap()
      .get(&key)
      .map(|entry| entry.snapshot.clone())
  }

  /// Registers a push subscription. Every subsequent mutation of the entry
  /// delivers a snapshot; the channel closes after the completion snapshot.
  pub fn subscribe(&self, key: Txid) -> mpsc::Receiver<ProgressSnapshot> {
    let (sender, receiver) = mpsc::channel();

    let mut entries = self.entries.lock().unwrap();

    if let Some(entry) = entries.get_mut(&key) {
      let _ = sender.send(entry.snapshot.clone());
      if entry.snapshot.active {
        entry.subscribers.push(sender);
      }
    }

    receiver
  }

  fn mutate(&self, key: Txid, f: impl FnOnce(&mut ProgressSnapshot)) {
    let mut entries = self.entries.lock().unwrap();

    let Some(entry) = entries.get_mut(&key) else {
      return;
    };

    if !entry.snapshot.active {
      return;
    }

    f(&mut entry.snapshot);
    entry.snapshot.updated_at = Utc::now();

    entry
      .subscribers
      .retain(|subscriber| subscriber.send(entry.snapshot.clone()).is_ok());
  }
}

use super::*;

/// One row of the master index. Field names match the on-disk JSON produced
/// by earlier tooling, so existing `master.json` files load unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasterEntry {
  pub txid: String,
  pub filename: String,
  pub mime_type: String,
  pub ext: String,
  pub size: u64,
  pub created_at: DateTime<Utc>,
}

/// Content-addressed cache of decoded payloads. Files live directly under
/// the content root as `<inscriptionId>.<ext>`; the master index under
/// `master/master.json` is the sole source of truth about what has been
/// decoded, and the filesystem must agree with it.
pub struct ContentStore {
  content_dir: PathBuf,
  master_path: PathBuf,
  lock: Mutex<()>,
}

impl ContentStore {
  pub fn open(content_dir: &Path) -> Result<Self> {
    let master_dir = content_dir.join("master");
    fs::create_dir_all(&master_dir)
      .with_context(|| format!("failed to create {}", master_dir.display()))?;

    Ok(Self {
      content_dir: content_dir.into(),
      master_path: master_dir.join("master.json"),
      lock: Mutex::new(()),
    })
  }

  pub fn content_path(&self, filename: &str) -> PathBuf {
    self.content_dir.join(filename)
  }

  pub fn load_master(&self) -> Result<BTreeMap<String, MasterEntry>> {
    if !self.master_path.exists() {
      return Ok(BTreeMap::new());
    }

    let json = fs::read_to_string(&self.master_path)
      .with_context(|| format!("failed to read {}", self.master_path.display()))?;

    serde_json::from_str(&json)
      .with_context(|| format!("failed to parse {}", self.master_path.display()))
  }

  fn save_master(&self, master: &BTreeMap<String, MasterEntry>) -> Result {
    atomic_write(
      &self.master_path,
      serde_json::to_string_pretty(master)?.as_bytes(),
    )
  }

  /// Inserts or updates a master row, preserving `createdAt` across
  /// updates.
  pub fn upsert(
    &self,
    id: InscriptionId,
    filename: &str,
    mime_type: &str,
    ext: &str,
    size: u64,
  ) -> Result<MasterEntry> {
    let _guard = self.lock.lock().unwrap();

    let mut master = self.load_master()?;

    let created_at = master
      .get(&id.to_string())
      .map(|existing| existing.created_at)
      .unwrap_or_else(Utc::now);

    let entry = MasterEntry {
      txid: id.txid.to_string(),
      filename: filename.into(),
      mime_type: mime_type.into(),
      ext: ext.into(),
      size,
      created_at,
    };

    master.insert(id.to_string(), entry.clone());
    self.save_master(&master)?;

    Ok(entry)
  }

  /// Cache probe. Returns the stored file and its row if the id has been
  /// materialized and the recorded file is still present; a missing file
  /// marks the row stale and forces a re-decode. Weakly-classified rows are
  /// re-sniffed on the way out and renamed if the bytes identify themselves.
  pub fn cached(&self, id: InscriptionId) -> Result<Option<(PathBuf, MasterEntry)>> {
    let master = self.load_master()?;

    let Some(entry) = master.get(&id.to_string()) else {
      return Ok(None);
    };

    let path = self.content_path(&entry.filename);

    if !path.is_file() {
      warn!("master entry {id} points at missing file {}", path.display());
      return Ok(None);
    }

    if Media::is_weak(&entry.mime_type, &entry.ext) {
      let bytes = fs::read(&path)?;

      if let Some(sniffed) = Media::sniff(&bytes) {
        let filename = format!("{id}.{}", sniffed.extension());
        let renamed = self.content_path(&filename);
        fs::rename(&path, &renamed)?;
        info!("resniffed {id} as {}", sniffed.mime());

        let entry = self.upsert(
          id,
          &filename,
          sniffed.mime(),
          sniffed.extension(),
          bytes.len() as u64,
        )?;

        return Ok(Some((renamed, entry)));
      }
    }

    Ok(Some((path, entry.clone())))
  }

  /// First materialization of a payload: write the bytes under the declared
  /// classification, sniff-and-rename if that classification is weak, then
  /// record the final name in the master.
  ///
  /// `model_viewer` marks a dependency referenced by a `<model-viewer src>`
  /// attribute: a weak one is written extensionless and renamed `.glb`
  /// without consulting the sniffer.
  pub fn write_payload(
    &self,
    id: InscriptionId,
    bytes: &[u8],
    declared_mime: &str,
    model_viewer: bool,
  ) -> Result<MasterEntry> {
    let media = Media::from_mime(declared_mime);
    let mut mime = declared_mime.to_string();
    let mut ext = media.extension().to_string();
    let weak = Media::is_weak(declared_mime, &ext);

    let filename = if model_viewer && weak {
      let bare = self.content_path(&id.to_string());
      atomic_write(&bare, bytes)?;

      let filename = format!("{id}.glb");
      fs::rename(&bare, self.content_path(&filename))?;

      mime = "model/gltf-binary".into();
      ext = "glb".into();
      filename
    } else {
      let mut filename = format!("{id}.{ext}");
      atomic_write(&self.content_path(&filename), bytes)?;

      if weak {
        if let Some(sniffed) = Media::sniff(bytes) {
          let renamed = format!("{id}.{}", sniffed.extension());
          fs::rename(self.content_path(&filename), self.content_path(&renamed))?;

          mime = sniffed.mime().into();
          ext = sniffed.extension().into();
          filename = renamed;
        }
      }

      filename
    };

    self.upsert(id, &filename, &mime, &ext, bytes.len() as u64)
  }

  /// Looks a query up in the master, tolerating both `<txid>` and
  /// `<txid>i<N>` forms.
  pub fn find(&self, query: &str) -> Result<Option<MasterEntry>> {
    let Ok(id) = query.parse::<InscriptionId>() else {
      return Ok(None);
    };

    let master = self.load_master()?;

    if let Some(entry) = master.get(&id.to_string()) {
      return Ok(Some(entry.clone()));
    }

    let base = id.txid.to_string();

    Ok(
      master
        .values()
        .find(|entry| entry.txid == base)
        .cloned(),
    )
  }
}

/// Write-to-temp then rename, so readers never observe a torn file.
pub(crate) fn atomic_write(path: &Path, bytes: &[u8]) -> Result {
  let file_name = path
    .file_name()
    .and_then(|name| name.to_str())
    .ok_or_else(|| anyhow!("invalid path {}", path.display()))?;

  let tmp = path.with_file_name(format!("{file_name}.tmp"));

  fs::write(&tmp, bytes).with_context(|| format!("failed to write {}", tmp.display()))?;
  fs::rename(&tmp, path).with_context(|| format!("failed to rename {}", tmp.display()))?;

  Ok(())
}

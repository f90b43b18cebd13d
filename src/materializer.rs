use super::*;

/// Orchestrates a decode request: cache probe, chain walk, byte
/// materialization, then recursive materialization of any sibling
/// inscriptions the payload references, so a self-contained local mirror
/// exists for display.
pub struct Materializer<'a> {
  client: &'a dyn Rpc,
  store: &'a ContentStore,
  tracker: &'a ProgressTracker,
}

impl<'a> Materializer<'a> {
  pub fn new(client: &'a dyn Rpc, store: &'a ContentStore, tracker: &'a ProgressTracker) -> Self {
    Self {
      client,
      store,
      tracker,
    }
  }

  /// Materializes `id` and everything it references. The progress entry for
  /// the request lives under `id.txid` and is completed (but not cleared)
  /// before returning, on success and failure alike.
  pub fn materialize(&self, id: InscriptionId) -> Result<MasterEntry> {
    // reference bookkeeping is scoped to this request
    let mut visited = HashSet::new();
    let mut model_viewer = HashSet::new();

    self.tracker.begin(id.txid, &id.to_string());

    let result = self.materialize_inner(id, id.txid, &mut visited, &mut model_viewer);

    self.tracker.complete(id.txid);

    result
  }

  fn materialize_inner(
    &self,
    id: InscriptionId,
    key: Txid,
    visited: &mut HashSet<Txid>,
    model_viewer: &mut HashSet<Txid>,
  ) -> Result<MasterEntry> {
    visited.insert(id.txid);

    if let Some((path, entry)) = self.store.cached(id)? {
      debug!("{id}: serving {} from cache", path.display());
      return Ok(entry);
    }

    let walked = ChainWalker::new(self.client).walk(id.txid, self.tracker, key)?;

    let bytes = walker::decode_payload_hex(&walked.hex, !model_viewer.contains(&id.txid))?;

    let declared = Media::normalize(walked.content_type.as_deref().unwrap_or_default());

    let entry =
      self
        .store
        .write_payload(id, &bytes, &declared, model_viewer.contains(&id.txid))?;

    info!(
      "{id}: materialized {} ({} bytes, {})",
      entry.filename, entry.size, entry.mime_type
    );

    let media = Media::from_mime(&entry.mime_type);

    if media.is_text_like() {
      self.resolve_dependencies(id, key, media, &bytes, visited, model_viewer)?;
    }

    Ok(entry)
  }

  fn resolve_dependencies(
    &self,
    parent: InscriptionId,
    key: Txid,
    media: Media,
    bytes: &[u8],
    visited: &mut HashSet<Txid>,
    model_viewer: &mut HashSet<Txid>,
  ) -> Result {
    let report = resolver::scan(media, bytes);
    model_viewer.extend(&report.model_viewer);

    let dependencies = report
      .dependencies
      .into_iter()
      .filter(|dependency| !visited.contains(&dependency.txid))
      .collect::<Vec<InscriptionId>>();

    if dependencies.is_empty() {
      return Ok(());
    }

    self
      .tracker
      .set_dependency_plan(key, dependencies.len() as u64);

    for dependency in dependencies {
      // a cyclic reference can get marked visited by a sibling's recursion
      if visited.contains(&dependency.txid) {
        self.tracker.increment_dependency_done(key);
        continue;
      }

      debug!("{parent}: materializing dependency {dependency}");

      if let Err(err) = self.materialize_inner(dependency, key, visited, model_viewer) {
        warn!("{parent}: dependency {dependency} failed: {err}");
      }

      self.tracker.increment_dependency_done(key);
    }

    Ok(())
  }
}

use super::*;

lazy_static! {
  static ref CONTENT_REF: Regex = Regex::new(r"/content/([0-9a-fA-F]{64})(i(\d+))?").unwrap();
  static ref BARE_REF: Regex =
    Regex::new(r"(^|[^0-9a-fA-F])([0-9a-fA-F]{64})i(\d+)").unwrap();
  static ref MODEL_VIEWER_SRC: Regex =
    Regex::new(r#"<model-viewer[^>]*\bsrc\s*=\s*["']([^"']+)["']"#).unwrap();
}

/// References discovered in one payload. `model_viewer` holds the base txids
/// of dependencies named by a `<model-viewer src>` attribute; those get the
/// GLB handling in the content store and the walker.
#[derive(Debug, Default, PartialEq)]
pub struct ScanReport {
  pub dependencies: Vec<InscriptionId>,
  pub model_viewer: HashSet<Txid>,
}

/// Scans a decoded payload for references to sibling inscriptions.
///
/// Only text-like payloads are scanned, and GLTF-JSON gets a strict
/// structural scan: hex-looking asset names elsewhere in the document must
/// not surface as dependencies.
pub fn scan(media: Media, bytes: &[u8]) -> ScanReport {
  if !media.is_text_like() {
    return default();
  }

  if media == Media::GltfJson {
    return scan_gltf(bytes);
  }

  let text = String::from_utf8_lossy(bytes);
  let mut report = ScanReport::default();
  let mut seen = HashSet::new();

  for captures in CONTENT_REF.captures_iter(&text) {
    if let Some(id) = reference(&captures[1], captures.get(3).map(|m| m.as_str())) {
      if seen.insert(id) {
        report.dependencies.push(id);
      }
    }
  }

  for captures in BARE_REF.captures_iter(&text) {
    if let Some(id) = reference(&captures[2], Some(&captures[3])) {
      if seen.insert(id) {
        report.dependencies.push(id);
      }
    }
  }

  if matches!(media, Media::Html | Media::Svg) {
    for captures in MODEL_VIEWER_SRC.captures_iter(&text) {
      for dependency in scan_value(&captures[1]) {
        report.model_viewer.insert(dependency.txid);
        if seen.insert(dependency) {
          report.dependencies.push(dependency);
        }
      }
    }
  }

  report
}

/// Strict scanner for GLTF-JSON: only `buffers[].uri` and `images[].uri`
/// count as references.
fn scan_gltf(bytes: &[u8]) -> ScanReport {
  #[derive(Deserialize, Default)]
  struct Slot {
    uri: Option<String>,
  }

  #[derive(Deserialize, Default)]
  struct Gltf {
    #[serde(default)]
    buffers: Vec<Slot>,
    #[serde(default)]
    images: Vec<Slot>,
  }

  let Ok(gltf) = serde_json::from_slice::<Gltf>(bytes) else {
    return default();
  };

  let mut report = ScanReport::default();
  let mut seen = HashSet::new();

  for slot in gltf.buffers.into_iter().chain(gltf.images) {
    let Some(uri) = slot.uri else {
      continue;
    };

    for dependency in scan_value(&uri) {
      if seen.insert(dependency) {
        report.dependencies.push(dependency);
      }
    }
  }

  report
}

/// Extracts inscription references from a single attribute or uri value.
fn scan_value(value: &str) -> Vec<InscriptionId> {
  let mut found = Vec::new();

  for captures in CONTENT_REF.captures_iter(value) {
    if let Some(id) = reference(&captures[1], captures.get(3).map(|m| m.as_str())) {
      found.push(id);
    }
  }

  for captures in BARE_REF.captures_iter(value) {
    if let Some(id) = reference(&captures[2], Some(&captures[3])) {
      found.push(id);
    }
  }

  found
}

fn reference(txid: &str, index: Option<&str>) -> Option<InscriptionId> {
  Some(InscriptionId {
    txid: txid.to_lowercase().parse().ok()?,
    index: index.unwrap_or("0").parse().ok()?,
  })
}

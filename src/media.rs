use super::*;

/// Closed classification used for decode-time decisions. The original
/// declared string rides alongside in the master index for display, so an
/// exotic mime type loses nothing by collapsing to a tag here.
#[derive(Debug, PartialEq, Eq, Copy, Clone, Serialize, Deserialize)]
pub enum Media {
  Gif,
  Glb,
  GltfJson,
  Html,
  Javascript,
  Jpeg,
  Json,
  OctetStream,
  Png,
  Svg,
  Text,
  Webp,
}

impl Media {
  #[rustfmt::skip]
  const TABLE: &'static [(&'static str, Media, &'static str)] = &[
    ("application/javascript",   Media::Javascript,  "js"),
    ("application/json",         Media::Json,        "json"),
    ("application/octet-stream", Media::OctetStream, "bin"),
    ("application/x-javascript", Media::Javascript,  "js"),
    ("application/xml",          Media::Text,        "xml"),
    ("image/gif",                Media::Gif,         "gif"),
    ("image/jpeg",               Media::Jpeg,        "jpg"),
    ("image/png",                Media::Png,         "png"),
    ("image/svg+xml",            Media::Svg,         "svg"),
    ("image/webp",               Media::Webp,        "webp"),
    ("model/gltf+json",          Media::GltfJson,    "gltf"),
    ("model/gltf-binary",        Media::Glb,         "glb"),
    ("text/html",                Media::Html,        "html"),
    ("text/javascript",          Media::Javascript,  "js"),
    ("text/plain",               Media::Text,        "txt"),
  ];

  /// Lowercases, strips parameters, and defaults empty input to
  /// `application/octet-stream`.
  pub fn normalize(mime: &str) -> String {
    let mime = mime
      .split(';')
      .next()
      .unwrap_or_default()
      .trim()
      .to_lowercase();

    if mime.is_empty() {
      "application/octet-stream".into()
    } else {
      mime
    }
  }

  pub fn from_mime(normalized: &str) -> Self {
    for (mime, media, _) in Self::TABLE {
      if *mime == normalized {
        return *media;
      }
    }

    if normalized.starts_with("text/") {
      Media::Text
    } else {
      Media::OctetStream
    }
  }

  pub fn mime(self) -> &'static str {
    for (mime, media, _) in Self::TABLE {
      if *media == self {
        return mime;
      }
    }
    "application/octet-stream"
  }

  pub fn extension(self) -> &'static str {
    for (_, media, extension) in Self::TABLE {
      if *media == self {
        return extension;
      }
    }
    "bin"
  }

  /// Payloads eligible for dependency scanning.
  pub fn is_text_like(self) -> bool {
    matches!(
      self,
      Media::Text | Media::Html | Media::Svg | Media::Javascript | Media::Json | Media::GltfJson
    )
  }

  /// A classification too vague to pick a filename extension from.
  pub fn is_weak(normalized_mime: &str, extension: &str) -> bool {
    extension.is_empty() || extension == "bin" || normalized_mime == "application/octet-stream"
  }

  /// Identifies a payload by its leading bytes. Magic-number checks look at
  /// no more than the first 256 bytes; the GLTF-JSON check parses the
  /// document, since `asset.version` can sit anywhere in the root object.
  pub fn sniff(bytes: &[u8]) -> Option<Media> {
    let prefix = &bytes[..bytes.len().min(256)];

    if prefix.starts_with(&[0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a]) {
      return Some(Media::Png);
    }

    if prefix.starts_with(&[0xff, 0xd8, 0xff]) {
      return Some(Media::Jpeg);
    }

    if prefix.starts_with(b"GIF87a") || prefix.starts_with(b"GIF89a") {
      return Some(Media::Gif);
    }

    if prefix.starts_with(b"RIFF") && prefix.len() >= 12 && &prefix[8..12] == b"WEBP" {
      return Some(Media::Webp);
    }

    if prefix.starts_with(b"glTF") {
      return Some(Media::Glb);
    }

    #[derive(Deserialize)]
    struct Asset {
      version: Option<String>,
    }

    #[derive(Deserialize)]
    struct Gltf {
      asset: Option<Asset>,
    }

    if let Ok(Gltf {
      asset: Some(Asset { version: Some(_) }),
    }) = serde_json::from_slice(bytes)
    {
      return Some(Media::GltfJson);
    }

    None
  }
}

use super::*;

/// `"ord"` interpreted as a little-endian script number, which is how the
/// node's assembly rendering shows the protocol push.
pub(crate) const PROTOCOL_SENTINEL: &str = "6582895";

/// The data recovered from one transaction's worth of inscription envelope.
///
/// `hex` accumulates chunk payloads in push order. `remaining` is the
/// last-seen remaining-chunks marker and serves as a completion estimate for
/// progress reporting; it is not trusted for termination, which is signaled
/// exclusively by a zero marker (`end_of_data`).
#[derive(Debug, Default, PartialEq)]
pub struct Envelope {
  pub hex: String,
  pub content_type: Option<String>,
  pub end_of_data: bool,
  pub chunks: u64,
  pub remaining: Option<u64>,
}

impl Envelope {
  /// Parses a genesis input: `[sentinel, numChunks, contentTypeHex,
  /// (remainingAfterThis, chunkHex)*]`.
  pub fn parse_genesis(tokens: &[&str]) -> Result<Self> {
    ensure!(
      tokens.len() >= 3,
      "genesis envelope too short: {} tokens",
      tokens.len()
    );

    ensure!(
      tokens[0] == PROTOCOL_SENTINEL,
      "genesis envelope does not begin with the inscription sentinel"
    );

    let declared = parse_marker(tokens[1])?;

    let content_type = String::from_utf8(
      hex::decode(tokens[2]).context("content type is not hex")?,
    )
    .context("content type is not UTF-8")?;

    let mut envelope = Self {
      content_type: Some(content_type),
      remaining: Some(declared),
      ..default()
    };

    envelope.consume_pairs(&tokens[3..])?;

    Ok(envelope)
  }

  /// Parses a continuation input: `[(remainingAfterThis, chunkHex)*]`.
  pub fn parse_subsequent(tokens: &[&str]) -> Result<Self> {
    let mut envelope = Self::default();
    envelope.consume_pairs(tokens)?;
    Ok(envelope)
  }

  fn consume_pairs(&mut self, tokens: &[&str]) -> Result {
    let mut tokens = tokens.iter();

    while let Some(marker) = tokens.next() {
      if !is_marker(marker) {
        // the unlock script trails the spender's signature and redeem
        // script after the envelope pairs
        ensure!(
          self.chunks > 0,
          "expected integer marker, found `{marker}`"
        );
        break;
      }

      let marker = parse_marker(marker)?;

      let chunk = tokens
        .next()
        .ok_or_else(|| anyhow!("envelope ends with a marker but no chunk"))?;

      ensure!(
        chunk.chars().all(|c| c.is_ascii_hexdigit()),
        "envelope chunk is not hex"
      );

      self.hex.push_str(chunk);
      self.chunks += 1;
      self.remaining = Some(marker);

      if marker == 0 {
        self.end_of_data = true;
        break;
      }
    }

    Ok(())
  }
}

pub(crate) fn is_marker(token: &str) -> bool {
  let digits = token.strip_prefix('-').unwrap_or(token);
  !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

fn parse_marker(token: &str) -> Result<u64> {
  ensure!(is_marker(token), "expected integer marker, found `{token}`");

  // negative markers collapse to zero rather than failing the decode
  if token.starts_with('-') {
    return Ok(0);
  }

  token
    .parse()
    .with_context(|| format!("integer marker `{token}` out of range"))
}

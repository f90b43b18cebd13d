use super::*;

pub(crate) const DEFAULT_DEPTH_BLOCKS: u64 = 5000;
pub(crate) const DEFAULT_MAX_HOPS: u64 = 20000;

const SCAN_BREATHER_INTERVAL: u64 = 100;
const SCAN_BREATHER: Duration = Duration::from_millis(50);

#[derive(Debug, thiserror::Error)]
#[error("transaction {0} carries no inscription envelope")]
pub struct NotDoginal(pub Txid);

#[derive(Debug, thiserror::Error)]
#[error("inscription {0} is truncated: the chain ended before end-of-data")]
pub struct Truncated(pub Txid);

#[derive(Debug, PartialEq)]
pub struct WalkedPayload {
  pub hex: String,
  pub content_type: Option<String>,
  pub chunks_found: u64,
  pub estimated_total: Option<u64>,
  pub truncated: bool,
}

struct NextHop {
  txid: Txid,
  height: u64,
}

/// Follows an inscription envelope across transactions, driving the envelope
/// parser on each hop and the spend scanner between hops.
pub struct ChainWalker<'a> {
  client: &'a dyn Rpc,
  depth_blocks: u64,
  max_hops: u64,
}

impl<'a> ChainWalker<'a> {
  pub fn new(client: &'a dyn Rpc) -> Self {
    Self {
      client,
      depth_blocks: DEFAULT_DEPTH_BLOCKS,
      max_hops: DEFAULT_MAX_HOPS,
    }
  }

  #[cfg(test)]
  pub(crate) fn with_limits(client: &'a dyn Rpc, depth_blocks: u64, max_hops: u64) -> Self {
    Self {
      client,
      depth_blocks,
      max_hops,
    }
  }

  /// Walks the chain starting at `start`, reporting per-hop progress to
  /// `tracker` under `key`.
  pub fn walk(&self, start: Txid, tracker: &ProgressTracker, key: Txid) -> Result<WalkedPayload> {
    let label = start.to_string();

    let mut payload = WalkedPayload {
      hex: String::new(),
      content_type: None,
      chunks_found: 0,
      estimated_total: None,
      truncated: false,
    };

    let mut visited = HashSet::new();
    let mut current = start;
    let mut genesis = true;
    let mut hops = 0;

    loop {
      hops += 1;
      if hops > self.max_hops {
        warn!("{start}: hop cap reached after {} chunks", payload.chunks_found);
        payload.truncated = true;
        break;
      }

      let tx = self.client.get_raw_transaction(current)?;
      visited.insert(current);

      let mut end_of_data = false;
      let mut parsed_any = false;

      for vin in &tx.vin {
        let Some(script_sig) = &vin.script_sig else {
          continue;
        };

        let tokens = script_sig.asm.split_whitespace().collect::<Vec<&str>>();

        let parsed = if genesis {
          if tokens.first() != Some(&envelope::PROTOCOL_SENTINEL) {
            continue;
          }
          Envelope::parse_genesis(&tokens)
        } else {
          if tokens
            .first()
            .map_or(true, |token| !envelope::is_marker(token))
          {
            continue;
          }
          Envelope::parse_subsequent(&tokens)
        };

        let envelope = match parsed {
          Ok(envelope) => envelope,
          Err(err) => {
            if payload.hex.is_empty() {
              return Err(err);
            }
            warn!("{start}: envelope broke mid-chain at {current}: {err}");
            payload.truncated = true;
            end_of_data = true;
            break;
          }
        };

        payload.hex.push_str(&envelope.hex);
        payload.chunks_found += envelope.chunks;
        parsed_any = true;

        if payload.content_type.is_none() {
          payload.content_type = envelope.content_type.clone();
        }

        if let Some(remaining) = envelope.remaining {
          let candidate = payload.chunks_found + remaining;
          if payload.estimated_total.map_or(true, |total| candidate > total) {
            payload.estimated_total = Some(candidate);
          }
        }

        tracker.update(key, &label, envelope.chunks, envelope.remaining);

        if envelope.end_of_data {
          end_of_data = true;
          break;
        }
      }

      if genesis && !parsed_any {
        return Err(NotDoginal(start).into());
      }

      genesis = false;

      if end_of_data {
        break;
      }

      // an unconfirmed ancestor cannot be scanned past
      let Some(blockhash) = tx.blockhash else {
        debug!("{start}: chain continues into the mempool at {current}");
        payload.truncated = true;
        break;
      };

      let Some(next) = self.find_next_hop(current, 0, blockhash)? else {
        payload.truncated = true;
        break;
      };

      if visited.contains(&next.txid) {
        // probe once past the repeated transaction before giving up
        let hash = self.client.get_block_hash(next.height)?;
        match self.find_next_hop(next.txid, 0, hash)? {
          Some(past) if !visited.contains(&past.txid) => current = past.txid,
          _ => {
            warn!("{start}: inscription chain cycles at {}", next.txid);
            payload.truncated = true;
            break;
          }
        }
      } else {
        current = next.txid;
      }
    }

    if payload.truncated {
      if payload.hex.is_empty() {
        return Err(Truncated(start).into());
      }
      warn!("{start}: returning {} truncated chunks", payload.chunks_found);
    }

    Ok(payload)
  }

  /// Scans forward from the block containing `txid` for the transaction
  /// spending `txid:vout`, giving up once `depth_blocks` blocks or the tip
  /// have been searched.
  fn find_next_hop(&self, txid: Txid, vout: u32, blockhash: BlockHash) -> Result<Option<NextHop>> {
    let tip = self.client.get_block_count()?;
    let mut block = self.client.get_block(blockhash)?;
    let mut scanned = 0;

    loop {
      for tx in &block.tx {
        for vin in &tx.vin {
          if vin.txid == Some(txid) && vin.vout == Some(vout) {
            return Ok(Some(NextHop {
              txid: tx.txid,
              height: block.height,
            }));
          }
        }
      }

      scanned += 1;
      let height = block.height + 1;

      if scanned > self.depth_blocks || height > tip {
        return Ok(None);
      }

      if scanned % SCAN_BREATHER_INTERVAL == 0 {
        thread::sleep(SCAN_BREATHER);
      }

      let hash = self.client.get_block_hash(height)?;
      block = self.client.get_block(hash)?;
    }
  }
}

/// Decodes accumulated chunk hex into payload bytes.
///
/// Historical decoders padded odd-length hex with five `"0"` characters
/// before decoding, so cached artifacts may end in stray zero bytes; that
/// behavior is kept for compatibility. `pad_odd` is false only for
/// model-viewer source dependencies, where the trailing nibble is dropped
/// instead to keep the GLB container intact.
pub(crate) fn decode_payload_hex(hex: &str, pad_odd: bool) -> Result<Vec<u8>> {
  if hex.len() % 2 == 0 {
    Ok(hex::decode(hex)?)
  } else if pad_odd {
    let mut padded = String::with_capacity(hex.len() + 5);
    padded.push_str(hex);
    padded.push_str("00000");
    Ok(hex::decode(padded)?)
  } else {
    Ok(hex::decode(&hex[..hex.len() - 1])?)
  }
}

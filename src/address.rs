use {super::*, bitcoin::base58};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Kind {
  P2pkh,
  P2sh,
}

/// A base58check Dogecoin address. The version byte is carried by the chain,
/// so an address parsed for one chain will not verify on another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
  chain: Chain,
  kind: Kind,
  hash: [u8; 20],
}

impl Address {
  pub fn p2pkh(public_key: &bitcoin::PublicKey, chain: Chain) -> Self {
    Self {
      chain,
      kind: Kind::P2pkh,
      hash: hash160::Hash::hash(&public_key.to_bytes()).to_byte_array(),
    }
  }

  pub fn p2sh(redeem_script: &ScriptBuf, chain: Chain) -> Self {
    Self {
      chain,
      kind: Kind::P2sh,
      hash: hash160::Hash::hash(redeem_script.as_bytes()).to_byte_array(),
    }
  }

  pub fn from_base58(s: &str, chain: Chain) -> Result<Self> {
    let payload = base58::decode_check(s).context("invalid base58 address")?;

    ensure!(
      payload.len() == 21,
      "invalid address payload length {}",
      payload.len()
    );

    let kind = if payload[0] == chain.p2pkh_version() {
      Kind::P2pkh
    } else if payload[0] == chain.p2sh_version() {
      Kind::P2sh
    } else {
      bail!(
        "address version byte {:#04x} does not match {chain}",
        payload[0]
      );
    };

    let mut hash = [0; 20];
    hash.copy_from_slice(&payload[1..]);

    Ok(Self { chain, kind, hash })
  }

  pub fn script_pubkey(&self) -> ScriptBuf {
    match self.kind {
      Kind::P2pkh => ScriptBuf::new_p2pkh(&bitcoin::PubkeyHash::from_byte_array(self.hash)),
      Kind::P2sh => ScriptBuf::new_p2sh(&bitcoin::ScriptHash::from_byte_array(self.hash)),
    }
  }
}

impl Display for Address {
  fn fmt(&self, f: &mut Formatter) -> fmt::Result {
    let version = match self.kind {
      Kind::P2pkh => self.chain.p2pkh_version(),
      Kind::P2sh => self.chain.p2sh_version(),
    };

    let mut payload = vec![version];
    payload.extend_from_slice(&self.hash);

    base58::encode_check(&payload).fmt(f)
  }
}

pub(crate) fn wif_encode(secret_key: &SecretKey, chain: Chain) -> String {
  let mut payload = vec![chain.wif_prefix()];
  payload.extend_from_slice(&secret_key.secret_bytes());
  payload.push(0x01);
  base58::encode_check(&payload)
}

pub(crate) fn wif_decode(wif: &str, chain: Chain) -> Result<SecretKey> {
  let payload = base58::decode_check(wif).context("invalid base58 private key")?;

  ensure!(
    payload.len() == 34 || payload.len() == 33,
    "invalid private key payload length {}",
    payload.len()
  );

  ensure!(
    payload[0] == chain.wif_prefix(),
    "private key prefix {:#04x} does not match {chain}",
    payload[0]
  );

  if payload.len() == 34 {
    ensure!(
      payload[33] == 0x01,
      "invalid compressed private key marker {:#04x}",
      payload[33]
    );
  }

  Ok(SecretKey::from_slice(&payload[1..33])?)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn secret_key() -> SecretKey {
    SecretKey::from_slice(&[0x11; 32]).unwrap()
  }

  fn public_key() -> bitcoin::PublicKey {
    bitcoin::PublicKey {
      compressed: true,
      inner: secp256k1::PublicKey::from_secret_key(&Secp256k1::new(), &secret_key()),
    }
  }

  #[test]
  fn p2pkh_round_trip() {
    let address = Address::p2pkh(&public_key(), Chain::Mainnet);
    assert!(address.to_string().starts_with('D'));
    assert_eq!(
      Address::from_base58(&address.to_string(), Chain::Mainnet).unwrap(),
      address
    );
  }

  #[test]
  fn p2sh_round_trip() {
    let redeem = script::Builder::new()
      .push_opcode(opcodes::OP_TRUE)
      .into_script();
    let address = Address::p2sh(&redeem, Chain::Mainnet);
    assert_eq!(
      Address::from_base58(&address.to_string(), Chain::Mainnet).unwrap(),
      address
    );
  }

  #[test]
  fn chain_mismatch_is_rejected() {
    let address = Address::p2pkh(&public_key(), Chain::Mainnet);
    assert!(Address::from_base58(&address.to_string(), Chain::Testnet).is_err());
  }

  #[test]
  fn script_pubkey_shape() {
    let script = Address::p2pkh(&public_key(), Chain::Mainnet).script_pubkey();
    assert!(script.is_p2pkh());

    let redeem = script::Builder::new()
      .push_opcode(opcodes::OP_TRUE)
      .into_script();
    let script = Address::p2sh(&redeem, Chain::Mainnet).script_pubkey();
    assert!(script.is_p2sh());
  }

  #[test]
  fn wif_round_trip() {
    let wif = wif_encode(&secret_key(), Chain::Mainnet);
    assert!(wif.starts_with('Q'));
    assert_eq!(wif_decode(&wif, Chain::Mainnet).unwrap(), secret_key());
    assert!(wif_decode(&wif, Chain::Testnet).is_err());
  }
}

use super::*;

#[derive(
  Debug, PartialEq, Eq, PartialOrd, Ord, Copy, Clone, Hash, DeserializeFromStr, SerializeDisplay,
)]
pub struct InscriptionId {
  pub txid: Txid,
  pub index: u32,
}

impl InscriptionId {
  pub fn from_txid(txid: Txid) -> Self {
    Self { txid, index: 0 }
  }
}

impl Display for InscriptionId {
  fn fmt(&self, f: &mut Formatter) -> fmt::Result {
    write!(f, "{}i{}", self.txid, self.index)
  }
}

#[derive(Debug, PartialEq)]
pub enum ParseError {
  Character(char),
  Length(usize),
  Txid(bitcoin::hashes::hex::Error),
  Index(std::num::ParseIntError),
}

impl Display for ParseError {
  fn fmt(&self, f: &mut Formatter) -> fmt::Result {
    match self {
      Self::Character(c) => write!(f, "invalid character: {c}"),
      Self::Length(len) => write!(f, "invalid length: {len}"),
      Self::Txid(err) => write!(f, "invalid txid: {err}"),
      Self::Index(err) => write!(f, "invalid index: {err}"),
    }
  }
}

impl std::error::Error for ParseError {}

impl FromStr for InscriptionId {
  type Err = ParseError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    if let Some(char) = s.chars().find(|char| !char.is_ascii()) {
      return Err(ParseError::Character(char));
    }

    // a bare txid names inscription zero
    let (txid, index) = match s.split_once('i') {
      Some((txid, index)) => (txid, index),
      None => (s, "0"),
    };

    if txid.len() != 64 {
      return Err(ParseError::Length(s.len()));
    }

    Ok(Self {
      txid: txid.parse().map_err(ParseError::Txid)?,
      index: index.parse().map_err(ParseError::Index)?,
    })
  }
}

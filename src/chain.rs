use super::*;

#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
  #[default]
  Mainnet,
  Testnet,
  Regtest,
}

impl Chain {
  pub(crate) fn p2pkh_version(self) -> u8 {
    match self {
      Self::Mainnet => 0x1e,
      Self::Testnet => 0x71,
      Self::Regtest => 0x6f,
    }
  }

  pub(crate) fn p2sh_version(self) -> u8 {
    match self {
      Self::Mainnet => 0x16,
      Self::Testnet | Self::Regtest => 0xc4,
    }
  }

  pub(crate) fn wif_prefix(self) -> u8 {
    match self {
      Self::Mainnet => 0x9e,
      Self::Testnet => 0xf1,
      Self::Regtest => 0xef,
    }
  }

  pub fn default_rpc_port(self) -> u16 {
    match self {
      Self::Mainnet => 22555,
      Self::Testnet => 44555,
      Self::Regtest => 18332,
    }
  }
}

impl Display for Chain {
  fn fmt(&self, f: &mut Formatter) -> fmt::Result {
    match self {
      Self::Mainnet => "mainnet",
      Self::Testnet => "testnet",
      Self::Regtest => "regtest",
    }
    .fmt(f)
  }
}

impl FromStr for Chain {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "mainnet" => Ok(Self::Mainnet),
      "testnet" => Ok(Self::Testnet),
      "regtest" => Ok(Self::Regtest),
      _ => bail!("invalid chain `{s}`"),
    }
  }
}

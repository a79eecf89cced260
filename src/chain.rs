use super::*;

#[derive(Default, ValueEnum, Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Chain {
    #[default]
    #[value(alias("main"))]
    Mainnet,
    #[value(alias("test"))]
    Testnet,
    Regtest,
}

impl Chain {
    pub fn magic(self) -> [u8; 4] {
        match self {
            Self::Mainnet => *b"RAVN",
            Self::Testnet => *b"RVNT",
            Self::Regtest => *b"CROW",
        }
    }

    pub fn default_p2p_port(self) -> u16 {
        match self {
            Self::Mainnet => 8767,
            Self::Testnet => 18770,
            Self::Regtest => 18444,
        }
    }

    pub fn default_rpc_port(self) -> u16 {
        match self {
            Self::Mainnet => 8766,
            Self::Testnet => 18766,
            Self::Regtest => 18443,
        }
    }
}

impl Display for Chain {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Mainnet => "mainnet",
                Self::Testnet => "testnet",
                Self::Regtest => "regtest",
            }
        )
    }
}

impl FromStr for Chain {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mainnet" | "main" => Ok(Self::Mainnet),
            "testnet" | "test" => Ok(Self::Testnet),
            "regtest" => Ok(Self::Regtest),
            _ => bail!("invalid chain `{s}`"),
        }
    }
}

//! Marketplaces the business sells or sources through

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Ebay,
    Amazon,
    Bricklink,
    Brickowl,
    Bricqer,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Ebay => "ebay",
            Platform::Amazon => "amazon",
            Platform::Bricklink => "bricklink",
            Platform::Brickowl => "brickowl",
            Platform::Bricqer => "bricqer",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ebay" => Ok(Platform::Ebay),
            "amazon" => Ok(Platform::Amazon),
            "bricklink" => Ok(Platform::Bricklink),
            "brickowl" => Ok(Platform::Brickowl),
            "bricqer" => Ok(Platform::Bricqer),
            other => Err(format!("unknown platform '{}'", other)),
        }
    }
}

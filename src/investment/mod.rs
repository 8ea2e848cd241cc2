//! LEGO set investment pipeline: training data, trajectory features, scoring, RRP backfill

pub mod features;
pub mod rrp;
pub mod scoring;
mod stats;
pub mod training;

use serde::{Deserialize, Serialize};

/// Tag written with every prediction
pub const MODEL_VERSION: &str = "v2.1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Horizon {
    #[serde(rename = "6m")]
    SixMonths,
    #[serde(rename = "1yr")]
    OneYear,
    #[serde(rename = "2yr")]
    TwoYears,
    #[serde(rename = "3yr")]
    ThreeYears,
}

impl Horizon {
    pub const ALL: [Horizon; 4] = [
        Horizon::SixMonths,
        Horizon::OneYear,
        Horizon::TwoYears,
        Horizon::ThreeYears,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Horizon::SixMonths => "6m",
            Horizon::OneYear => "1yr",
            Horizon::TwoYears => "2yr",
            Horizon::ThreeYears => "3yr",
        }
    }

    /// Days after the exit date the horizon is centred on
    pub fn days(&self) -> i64 {
        match self {
            Horizon::SixMonths => 180,
            Horizon::OneYear => 365,
            Horizon::TwoYears => 730,
            Horizon::ThreeYears => 1095,
        }
    }
}

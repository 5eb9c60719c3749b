use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status value that marks a deal as won; every other status counts as open.
pub const CLOSED_STATUS: &str = "Closed";

/// One sales deal as stored in `FCT_SALES`. `sale_date` is `None` for rows the
/// warehouse holds without a date; they still count toward every total.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactRecord {
    pub product: String,
    pub region: String,
    pub amount: Decimal,
    pub status: String,
    pub sale_date: Option<NaiveDate>,
}

impl FactRecord {
    pub fn is_closed(&self) -> bool {
        self.status == CLOSED_STATUS
    }
}

/// The two published aggregation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResultSet {
    ByRegion,
    ByProduct,
}

impl ResultSet {
    pub const ALL: [ResultSet; 2] = [ResultSet::ByRegion, ResultSet::ByProduct];

    pub fn id(self) -> &'static str {
        match self {
            ResultSet::ByRegion => "by-region",
            ResultSet::ByProduct => "by-product",
        }
    }

    /// Fixed object key the snapshot for this kind lives under.
    pub fn object_key(self) -> String {
        format!("pipeline/{}/data.json", self.id())
    }
}

impl fmt::Display for ResultSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl std::str::FromStr for ResultSet {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "by-region" => Ok(ResultSet::ByRegion),
            "by-product" => Ok(ResultSet::ByProduct),
            other => anyhow::bail!("unknown result set {other:?}"),
        }
    }
}

//! Database row types. Monetary columns are integral minor currency units;
//! timestamps are unix seconds.

use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct TeamRow {
    pub id: String,
    pub name: String,
    pub valuation: i64,
    pub total_shares: i64,
    pub available_shares: i64,
}

impl TeamRow {
    /// Current per-share price, derived from valuation. Integer division is
    /// deliberate: prices are quoted in whole minor units.
    pub fn price_per_share(&self) -> i64 {
        self.valuation / self.total_shares
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct FixtureRow {
    pub id: String,
    pub external_ref: String,
    pub home_team_id: String,
    pub away_team_id: String,
    pub kickoff: i64,
    pub buy_close: i64,
    pub status: String,
    pub result: Option<String>,
    pub home_score: Option<i64>,
    pub away_score: Option<i64>,
    pub home_snapshot_cap: Option<i64>,
    pub away_snapshot_cap: Option<i64>,
}

impl FixtureRow {
    pub fn has_snapshot(&self) -> bool {
        self.home_snapshot_cap.is_some() && self.away_snapshot_cap.is_some()
    }
}

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Fixture lifecycle
// ---------------------------------------------------------------------------

/// Fixture lifecycle. Monotonic: scheduled → closed → applied, or
/// scheduled → postponed. Never regresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FixtureStatus {
    Scheduled,
    Closed,
    Applied,
    Postponed,
}

impl FixtureStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(FixtureStatus::Scheduled),
            "closed" => Some(FixtureStatus::Closed),
            "applied" => Some(FixtureStatus::Applied),
            "postponed" => Some(FixtureStatus::Postponed),
            _ => None,
        }
    }
}

impl std::fmt::Display for FixtureStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FixtureStatus::Scheduled => "scheduled",
            FixtureStatus::Closed => "closed",
            FixtureStatus::Applied => "applied",
            FixtureStatus::Postponed => "postponed",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Match result
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchResult {
    HomeWin,
    AwayWin,
    Draw,
}

impl MatchResult {
    /// Derive a result from full-time scores. A missing score is
    /// indeterminate — the fixture stays pending.
    pub fn from_scores(home: Option<i64>, away: Option<i64>) -> Option<Self> {
        match (home, away) {
            (Some(h), Some(a)) if h > a => Some(MatchResult::HomeWin),
            (Some(h), Some(a)) if a > h => Some(MatchResult::AwayWin),
            (Some(_), Some(_)) => Some(MatchResult::Draw),
            _ => None,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "home_win" => Some(MatchResult::HomeWin),
            "away_win" => Some(MatchResult::AwayWin),
            "draw" => Some(MatchResult::Draw),
            _ => None,
        }
    }
}

impl std::fmt::Display for MatchResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MatchResult::HomeWin => "home_win",
            MatchResult::AwayWin => "away_win",
            MatchResult::Draw => "draw",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Trading gate decision
// ---------------------------------------------------------------------------

/// Evaluated fresh at order time; never cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GateDecision {
    pub open: bool,
    pub reason: GateReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateReason {
    Open,
    MatchInProgress,
    WindowClosedPendingKickoff,
    /// Fail-safe: a lookup failure closes trading.
    LookupFailed,
}

impl GateDecision {
    pub fn open() -> Self {
        Self { open: true, reason: GateReason::Open }
    }

    pub fn closed(reason: GateReason) -> Self {
        Self { open: false, reason }
    }
}

impl std::fmt::Display for GateReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            GateReason::Open => "open",
            GateReason::MatchInProgress => "match in progress",
            GateReason::WindowClosedPendingKickoff => "window closed pending kickoff",
            GateReason::LookupFailed => "lookup failed",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Outbound engine events — sent over mpsc after the owning commit
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum EngineEvent {
    PurchaseCompleted {
        account_id: String,
        team_id: String,
        quantity: i64,
        amount: i64,
    },
    SettlementApplied {
        fixture_id: String,
        result: MatchResult,
        transfer_amount: i64,
    },
}

// ---------------------------------------------------------------------------
// Tracker batch summary
// ---------------------------------------------------------------------------

/// Per-cycle accounting. One item's failure increments `errors` and never
/// aborts the remaining items.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TrackerSummary {
    pub processed: usize,
    pub snapshots_taken: usize,
    pub closed: usize,
    pub settled: usize,
    pub postponed: usize,
    pub pending: usize,
    pub errors: usize,
}

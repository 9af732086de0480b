//! Named simulation scenarios.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// Fixes arrive slower than the animation; every leg runs alone
    ChainedLegs,

    /// A burst of fixes lands while a leg is in flight
    BurstDuringAnimation,

    /// One bulk backfill, then live single fixes
    BulkBackfill,

    /// Garbage interleaved with valid fixes on both channels
    MalformedPayloads,

    /// Replay pressed halfway through a leg
    ReplayMidLeg,

    /// Replay pressed twice; both playbacks must match
    DoubleReplay,

    /// First connect refused, second accepted; then a broker that never answers
    ConnectRetry,

    /// Broker drops the connection mid-animation
    ConnectionLost,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::ChainedLegs,
            ScenarioId::BurstDuringAnimation,
            ScenarioId::BulkBackfill,
            ScenarioId::MalformedPayloads,
            ScenarioId::ReplayMidLeg,
            ScenarioId::DoubleReplay,
            ScenarioId::ConnectRetry,
            ScenarioId::ConnectionLost,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::ChainedLegs => "chained_legs",
            ScenarioId::BurstDuringAnimation => "burst_during_animation",
            ScenarioId::BulkBackfill => "bulk_backfill",
            ScenarioId::MalformedPayloads => "malformed_payloads",
            ScenarioId::ReplayMidLeg => "replay_mid_leg",
            ScenarioId::DoubleReplay => "double_replay",
            ScenarioId::ConnectRetry => "connect_retry",
            ScenarioId::ConnectionLost => "connection_lost",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::ChainedLegs => "Single fixes every 2.5s, legs never overlap and end on the last fix",
            ScenarioId::BurstDuringAnimation => "Fixes queued mid-leg play back in arrival order, one leg at a time",
            ScenarioId::BulkBackfill => "Bulk array then singles, route log keeps arrival order",
            ScenarioId::MalformedPayloads => "Undecodable payloads leave no trace but diagnostics",
            ScenarioId::ReplayMidLeg => "Replay restarts from the first point, old leg never completes",
            ScenarioId::DoubleReplay => "Two replays yield identical leg sequences and final state",
            ScenarioId::ConnectRetry => "One retry after a refused connect, offline tracker records diagnostics",
            ScenarioId::ConnectionLost => "Connection loss is reported, queued animation still completes",
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "chained_legs" | "chained" => Ok(ScenarioId::ChainedLegs),
            "burst_during_animation" | "burst" => Ok(ScenarioId::BurstDuringAnimation),
            "bulk_backfill" | "bulk" => Ok(ScenarioId::BulkBackfill),
            "malformed_payloads" | "malformed" => Ok(ScenarioId::MalformedPayloads),
            "replay_mid_leg" | "replay" => Ok(ScenarioId::ReplayMidLeg),
            "double_replay" => Ok(ScenarioId::DoubleReplay),
            "connect_retry" | "retry" => Ok(ScenarioId::ConnectRetry),
            "connection_lost" | "lost" => Ok(ScenarioId::ConnectionLost),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

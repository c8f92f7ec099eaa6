//! Device-link scenarios.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// SIM-001: gyro and servos at nominal rates, slider input
    Steady,

    /// SIM-002: gyro publishing in dense bursts
    Burst,

    /// SIM-003: servos reporting far less often than the history window
    Sparse,

    /// SIM-004: corrupt frames and invalid samples mixed into the stream
    Malformed,

    /// SIM-005: periodic command loop with a stop signal
    Sweep,

    /// SIM-006: device closes the link mid-session
    Dropout,

    /// SIM-007: device refuses the link
    Rejected,

    /// SIM-008: device never answers the connect
    Stalled,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::Steady,
            ScenarioId::Burst,
            ScenarioId::Sparse,
            ScenarioId::Malformed,
            ScenarioId::Sweep,
            ScenarioId::Dropout,
            ScenarioId::Rejected,
            ScenarioId::Stalled,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::Steady => "steady",
            ScenarioId::Burst => "burst",
            ScenarioId::Sparse => "sparse",
            ScenarioId::Malformed => "malformed",
            ScenarioId::Sweep => "sweep",
            ScenarioId::Dropout => "dropout",
            ScenarioId::Rejected => "rejected",
            ScenarioId::Stalled => "stalled",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::Steady => "100 Hz gyro, 1 Hz servo reports, throttled slider drags",
            ScenarioId::Burst => "1 kHz gyro in bursts, verify coalescing keeps the window bounded",
            ScenarioId::Sparse => "Servo reports every 7s against a 10s history, verify lines span the window",
            ScenarioId::Malformed => "10% corrupt frames, verify they are dropped and counted",
            ScenarioId::Sweep => "Fixed-interval command loop stopped halfway, verify no late commands",
            ScenarioId::Dropout => "Link closed halfway, verify the session ends and stays ended",
            ScenarioId::Rejected => "Connect refused, verify the router fails instead of hanging",
            ScenarioId::Stalled => "Connect never answered, verify the timeout ends the session",
        }
    }

    /// Returns true if the device link never opens in this scenario.
    pub fn is_link_failure(&self) -> bool {
        matches!(self, ScenarioId::Rejected | ScenarioId::Stalled)
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "steady" | "sim-001" => Ok(ScenarioId::Steady),
            "burst" | "sim-002" => Ok(ScenarioId::Burst),
            "sparse" | "sim-003" => Ok(ScenarioId::Sparse),
            "malformed" | "sim-004" => Ok(ScenarioId::Malformed),
            "sweep" | "sim-005" => Ok(ScenarioId::Sweep),
            "dropout" | "sim-006" => Ok(ScenarioId::Dropout),
            "rejected" | "sim-007" => Ok(ScenarioId::Rejected),
            "stalled" | "sim-008" => Ok(ScenarioId::Stalled),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

//! Tunable execution bounds and budgets.

/// Bounds and budgets for one orchestrated execution.
///
/// Defaults come from the environment when set (`.env` files are honored via
/// `dotenvy`), falling back to the documented constants:
///
/// | Field | Env var | Default |
/// |---|---|---|
/// | `max_validation_attempts` | `PFLOW_MAX_VALIDATION_ATTEMPTS` | 3 |
/// | `max_runtime_loops` | `PFLOW_MAX_RUNTIME_LOOPS` | 3 |
/// | `max_inner_repairs` | `PFLOW_MAX_INNER_REPAIRS` | 3 |
/// | `raw_response_budget` | `PFLOW_RAW_RESPONSE_BUDGET` | 16384 |
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Phase-1 bound: repair attempts against validation errors.
    pub max_validation_attempts: usize,
    /// Phase-2 outer bound: execute/repair cycles.
    pub max_runtime_loops: usize,
    /// Phase-2 inner bound: repair attempts for one runtime failure.
    pub max_inner_repairs: usize,
    /// Byte cap for `raw_response` payloads in error records.
    pub raw_response_budget: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        dotenvy::dotenv().ok();
        Self {
            max_validation_attempts: env_or("PFLOW_MAX_VALIDATION_ATTEMPTS", 3),
            max_runtime_loops: env_or("PFLOW_MAX_RUNTIME_LOOPS", 3),
            max_inner_repairs: env_or("PFLOW_MAX_INNER_REPAIRS", 3),
            raw_response_budget: env_or("PFLOW_RAW_RESPONSE_BUDGET", 16 * 1024),
        }
    }
}

impl RuntimeConfig {
    #[must_use]
    pub fn with_max_validation_attempts(mut self, n: usize) -> Self {
        self.max_validation_attempts = n;
        self
    }

    #[must_use]
    pub fn with_max_runtime_loops(mut self, n: usize) -> Self {
        self.max_runtime_loops = n;
        self
    }

    #[must_use]
    pub fn with_max_inner_repairs(mut self, n: usize) -> Self {
        self.max_inner_repairs = n;
        self
    }

    #[must_use]
    pub fn with_raw_response_budget(mut self, bytes: usize) -> Self {
        self.raw_response_budget = bytes;
        self
    }
}

fn env_or(var: &str, fallback: usize) -> usize {
    std::env::var(var)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(fallback)
}

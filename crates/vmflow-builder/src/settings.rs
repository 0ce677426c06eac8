//! Timing knobs of a build

use std::time::Duration;

/// Settle windows allowed before flapping addresses fail the build
pub const SETTLE_BUDGET_WINDOWS: u32 = 4;

/// Every interval and deadline used by the lifecycle
///
/// Defaults follow the control plane's observed behaviour. Tests shrink them
/// and run under a paused clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSettings {
    pub power_poll_interval: Duration,
    pub power_on_timeout: Duration,
    pub guest_agent_poll_interval: Duration,
    /// Budget for address discovery; the settle phase is bounded separately
    pub ip_wait_timeout: Duration,
    pub ip_settle_poll_interval: Duration,
    pub ip_settle_window: Duration,
    pub shutdown_timeout: Duration,
    /// Pause after a successful shutdown command before verification
    pub shutdown_drain: Duration,
    /// Pause before the first import status check
    pub import_settle_delay: Duration,
    pub import_poll_interval: Duration,
    pub import_max_retries: u32,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            power_poll_interval: Duration::from_secs(5),
            power_on_timeout: Duration::from_secs(2 * 60),
            guest_agent_poll_interval: Duration::from_secs(15),
            ip_wait_timeout: Duration::from_secs(10 * 60),
            ip_settle_poll_interval: Duration::from_secs(5),
            ip_settle_window: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(5 * 60),
            shutdown_drain: Duration::from_secs(30),
            import_settle_delay: Duration::from_secs(5),
            import_poll_interval: Duration::from_secs(5),
            import_max_retries: 20,
        }
    }
}

impl BuildSettings {
    /// Consecutive unchanged polls needed to call an address set stable
    pub fn settle_ticks(&self) -> u32 {
        let interval = self.ip_settle_poll_interval.as_millis().max(1);
        let window = self.ip_settle_window.as_millis();
        (window.div_ceil(interval) as u32).max(1)
    }

    /// Longest the settle phase may run, measured from first discovery
    pub fn settle_budget(&self) -> Duration {
        self.ip_settle_window.max(self.ip_settle_poll_interval) * SETTLE_BUDGET_WINDOWS
    }
}

//! Health evaluation for the scan pipeline.
//!
//! Turns the raw counters in [`HealthStats`] into `ok` / `warn` /
//! `critical` verdicts. The main signal is how long ago the last scan cycle
//! succeeded, measured in scan intervals.
//!
//! # Usage
//!
//! ```rust
//! use std::time::Duration;
//! use herakles_port_manager::{evaluate_health, HealthStats, HealthThresholds};
//!
//! let stats = HealthStats::new();
//! stats.record_scan(3, 1, 0.012);
//!
//! let response = evaluate_health(&stats, Duration::from_secs(2), &HealthThresholds::default());
//! assert_eq!(response.overall_status.as_str(), "ok");
//! ```

use serde::Serialize;
use std::fmt;
use std::time::Duration;

use crate::health_stats::HealthStats;

/// Verdict of a single check; ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Warn,
    Critical,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Ok => "ok",
            HealthStatus::Warn => "warn",
            HealthStatus::Critical => "critical",
        }
    }

    /// Whether the service should still answer 200 on /health.
    pub fn is_serving(&self) -> bool {
        matches!(self, HealthStatus::Ok | HealthStatus::Warn)
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Thresholds in multiples of the scan interval, plus success-rate floors.
#[derive(Debug, Clone, Copy)]
pub struct HealthThresholds {
    pub warn_intervals: u32,
    pub critical_intervals: u32,
    pub warn_success_rate: f64,
    pub critical_success_rate: f64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            warn_intervals: 3,
            critical_intervals: 10,
            warn_success_rate: 90.0,
            critical_success_rate: 50.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HealthCheck {
    pub name: &'static str,
    pub status: HealthStatus,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub checks: Vec<HealthCheck>,
    /// Worst status among all checks.
    pub overall_status: HealthStatus,
}

/// Evaluates freshness and success rate of the scan loop.
pub fn evaluate_health(
    stats: &HealthStats,
    scan_interval: Duration,
    thresholds: &HealthThresholds,
) -> HealthResponse {
    let checks = vec![
        freshness_check(stats.last_success_age(), scan_interval, thresholds),
        success_rate_check(stats.get_scan_success_rate(), thresholds),
    ];

    let overall_status = checks
        .iter()
        .map(|c| c.status)
        .max()
        .unwrap_or(HealthStatus::Ok);

    HealthResponse {
        checks,
        overall_status,
    }
}

fn freshness_check(
    age: Option<Duration>,
    scan_interval: Duration,
    thresholds: &HealthThresholds,
) -> HealthCheck {
    let Some(age) = age else {
        return HealthCheck {
            name: "scan_freshness",
            status: HealthStatus::Critical,
            detail: "no successful scan yet".to_string(),
        };
    };

    let status = if age > scan_interval * thresholds.critical_intervals {
        HealthStatus::Critical
    } else if age > scan_interval * thresholds.warn_intervals {
        HealthStatus::Warn
    } else {
        HealthStatus::Ok
    };

    HealthCheck {
        name: "scan_freshness",
        status,
        detail: format!("last success {:.1}s ago", age.as_secs_f64()),
    }
}

fn success_rate_check(rate: f64, thresholds: &HealthThresholds) -> HealthCheck {
    let status = if rate < thresholds.critical_success_rate {
        HealthStatus::Critical
    } else if rate < thresholds.warn_success_rate {
        HealthStatus::Warn
    } else {
        HealthStatus::Ok
    };

    HealthCheck {
        name: "scan_success_rate",
        status,
        detail: format!("{:.1}%", rate),
    }
}

//! Simulated-delay specification and calculation.
//!
//! A delay spec is a small operator-facing string choosing how the pipeline
//! paces responses to imitate a rate-limited API:
//!
//! - `"min-max"` — uniform-random delay in `[min, max]` ms ("realistic jitter")
//! - `"max"` — match the just-measured upstream latency ("worst case")
//! - `"avg"` — match the endpoint's rolling average ("typical case")
//! - `"750"` — a fixed delay in ms
//! - empty / unparsable — no delay ("off")

use std::time::Duration;

use rand::Rng;

/// Parsed delay specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelaySpec {
    /// Uniform-random delay in `[min, max]` milliseconds.
    Range(u64, u64),
    /// Repeat the measured latency of the call just made.
    MatchMeasured,
    /// Use the endpoint's rolling average latency.
    MatchAverage,
    /// A fixed delay in milliseconds.
    Fixed(u64),
}

impl DelaySpec {
    /// Parse a delay specification string.
    ///
    /// Returns `None` for empty or unparsable input, which disables the
    /// simulated delay rather than erroring — a bad operator value should
    /// never take the mock down.
    pub fn parse(spec: &str) -> Option<Self> {
        let spec = spec.trim();
        match spec {
            "" => None,
            "max" => Some(Self::MatchMeasured),
            "avg" => Some(Self::MatchAverage),
            _ => {
                if let Some((min, max)) = spec.split_once('-') {
                    let min: u64 = min.trim().parse().ok()?;
                    let max: u64 = max.trim().parse().ok()?;
                    if min > max {
                        return None;
                    }
                    Some(Self::Range(min, max))
                } else {
                    spec.parse().ok().map(Self::Fixed)
                }
            }
        }
    }
}

/// Compute a simulated wait for one served completion.
///
/// `measured_ms` is the latency of the upstream call just made;
/// `average_ms` is the endpoint's rolling average, if any samples exist.
/// `MatchAverage` falls back to the measured latency until stats arrive.
///
/// Returns `None` when no delay should be applied.
pub fn calculate(
    spec: Option<DelaySpec>,
    measured_ms: u64,
    average_ms: Option<u64>,
) -> Option<Duration> {
    let ms = match spec? {
        DelaySpec::Range(min, max) => rand::rng().random_range(min..=max),
        DelaySpec::MatchMeasured => measured_ms,
        DelaySpec::MatchAverage => average_ms.unwrap_or(measured_ms),
        DelaySpec::Fixed(ms) => ms,
    };
    Some(Duration::from_millis(ms))
}

//! Counters and latency tracking for risk assessments.

use crate::types::RiskTier;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

const LATENCY_WINDOW: usize = 10_000;

/// Metrics collector for the risk service
pub struct RiskMetrics {
    /// Assessments that returned a result
    pub assessments: AtomicU64,
    /// Clients answered without consulting the model
    pub no_history: AtomicU64,
    /// Requests for unknown or non-client ids
    pub not_found: AtomicU64,
    /// Requests that failed because no usable model was installed
    pub unavailable: AtomicU64,
    /// Labels outside the known set
    pub anomalous_labels: AtomicU64,
    /// Successful model reloads
    pub reloads: AtomicU64,
    by_tier: RwLock<HashMap<RiskTier, u64>>,
    /// Assessment latency (in microseconds)
    latencies: RwLock<Vec<u64>>,
    start_time: Instant,
}

impl RiskMetrics {
    pub fn new() -> Self {
        Self {
            assessments: AtomicU64::new(0),
            no_history: AtomicU64::new(0),
            not_found: AtomicU64::new(0),
            unavailable: AtomicU64::new(0),
            anomalous_labels: AtomicU64::new(0),
            reloads: AtomicU64::new(0),
            by_tier: RwLock::new(HashMap::new()),
            latencies: RwLock::new(Vec::with_capacity(1000)),
            start_time: Instant::now(),
        }
    }

    /// Record a completed assessment
    pub fn record_assessment(&self, tier: RiskTier, elapsed: Duration) {
        self.assessments.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut by_tier) = self.by_tier.write() {
            *by_tier.entry(tier).or_insert(0) += 1;
        }

        if let Ok(mut times) = self.latencies.write() {
            times.push(elapsed.as_micros() as u64);
            if times.len() > LATENCY_WINDOW {
                times.drain(0..LATENCY_WINDOW / 2);
            }
        }
    }

    pub fn record_no_history(&self) {
        self.no_history.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_not_found(&self) {
        self.not_found.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unavailable(&self) {
        self.unavailable.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_anomaly(&self) {
        self.anomalous_labels.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reload(&self) {
        self.reloads.fetch_add(1, Ordering::Relaxed);
    }

    /// Count per tier
    pub fn tier_count(&self, tier: RiskTier) -> u64 {
        self.by_tier
            .read()
            .map(|by_tier| by_tier.get(&tier).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Latency statistics over the retained window
    pub fn latency_stats(&self) -> LatencyStats {
        let mut sorted = match self.latencies.read() {
            Ok(times) if !times.is_empty() => times.clone(),
            _ => return LatencyStats::default(),
        };
        sorted.sort_unstable();

        let count = sorted.len();
        let sum: u64 = sorted.iter().sum();
        let pct = |p: f64| sorted[((count as f64 * p) as usize).min(count - 1)];

        LatencyStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: pct(0.50),
            p95_us: pct(0.95),
            p99_us: pct(0.99),
            max_us: sorted[count - 1],
        }
    }

    /// Assessments per second since start
    pub fn throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.assessments.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn print_summary(&self) {
        let latency = self.latency_stats();

        info!(
            assessments = self.assessments.load(Ordering::Relaxed),
            no_history = self.no_history.load(Ordering::Relaxed),
            not_found = self.not_found.load(Ordering::Relaxed),
            unavailable = self.unavailable.load(Ordering::Relaxed),
            anomalous_labels = self.anomalous_labels.load(Ordering::Relaxed),
            reloads = self.reloads.load(Ordering::Relaxed),
            throughput = format!("{:.1}/s", self.throughput()),
            "Risk service summary"
        );
        info!(
            low = self.tier_count(RiskTier::Low),
            moderate = self.tier_count(RiskTier::Moderate),
            high = self.tier_count(RiskTier::High),
            "Assessments by tier"
        );
        info!(
            mean_us = latency.mean_us,
            p50_us = latency.p50_us,
            p95_us = latency.p95_us,
            p99_us = latency.p99_us,
            max_us = latency.max_us,
            "Assessment latency"
        );
    }
}

impl Default for RiskMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Latency statistics
#[derive(Debug, Default, Clone, PartialEq)]
pub struct LatencyStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Prints a summary every `interval_secs`
pub struct MetricsReporter {
    metrics: Arc<RiskMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<RiskMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs: interval_secs.max(1),
        }
    }

    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));
        // First tick fires immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_recording() {
        let metrics = RiskMetrics::new();

        metrics.record_assessment(RiskTier::Low, Duration::from_micros(100));
        metrics.record_assessment(RiskTier::High, Duration::from_micros(300));
        metrics.record_assessment(RiskTier::High, Duration::from_micros(200));
        metrics.record_anomaly();

        assert_eq!(metrics.assessments.load(Ordering::Relaxed), 3);
        assert_eq!(metrics.tier_count(RiskTier::High), 2);
        assert_eq!(metrics.tier_count(RiskTier::Moderate), 0);
        assert_eq!(metrics.anomalous_labels.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_latency_stats() {
        let metrics = RiskMetrics::new();
        assert_eq!(metrics.latency_stats(), LatencyStats::default());

        for us in [100, 200, 300, 400] {
            metrics.record_assessment(RiskTier::Low, Duration::from_micros(us));
        }

        let stats = metrics.latency_stats();
        assert_eq!(stats.count, 4);
        assert_eq!(stats.mean_us, 250);
        assert_eq!(stats.p50_us, 300);
        assert_eq!(stats.max_us, 400);
    }
}

// ABOUTME: Per-service consecutive failure counters for one monitoring session.
// ABOUTME: Any healthy probe resets the service's counter to zero.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

use crate::types::ServiceName;

/// One probe result, held in memory only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthSample {
    pub service: ServiceName,
    pub timestamp: DateTime<Utc>,
    pub healthy: bool,
    pub consecutive_failures: u32,
}

#[derive(Debug, Default)]
pub struct FailureCounters {
    counts: HashMap<ServiceName, u32>,
}

impl FailureCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, service: &ServiceName, healthy: bool) -> HealthSample {
        let count = self.counts.entry(service.clone()).or_insert(0);
        if healthy {
            *count = 0;
        } else {
            *count = count.saturating_add(1);
        }
        HealthSample {
            service: service.clone(),
            timestamp: Utc::now(),
            healthy,
            consecutive_failures: *count,
        }
    }

    pub fn get(&self, service: &ServiceName) -> u32 {
        self.counts.get(service).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_resets_counter() {
        let vault = ServiceName::new("vault").unwrap();
        let mut counters = FailureCounters::new();

        counters.record(&vault, false);
        let sample = counters.record(&vault, false);
        assert_eq!(sample.consecutive_failures, 2);

        let sample = counters.record(&vault, true);
        assert!(sample.healthy);
        assert_eq!(counters.get(&vault), 0);
    }
}

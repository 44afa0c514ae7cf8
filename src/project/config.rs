/// Media pool and warmup tuning.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PoolConfig {
    pub capacity: usize,
    /// Seconds of upcoming timeline considered for warmup.
    pub look_ahead: f64,
    /// Seconds of recent timeline kept warm for scrub-back.
    pub look_behind: f64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            capacity: 6,
            look_ahead: 3.0,
            look_behind: 1.0,
        }
    }
}

/// History engine tuning.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct HistoryConfig {
    pub max_stack_size: usize,
    pub merge_window_ms: u64,
    pub enable_grouping: bool,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_stack_size: 100,
            merge_window_ms: 300,
            enable_grouping: true,
        }
    }
}

/// Storage quota thresholds for the material store.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct QuotaConfig {
    pub warning_threshold: f64,
    pub critical_threshold: f64,
    /// Fraction of capacity an LRU sweep tries to leave free.
    pub target_free_percent: f64,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            warning_threshold: 0.8,
            critical_threshold: 0.9,
            target_free_percent: 0.3,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EngineConfig {
    pub pool: PoolConfig,
    pub history: HistoryConfig,
    pub quota: QuotaConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = EngineConfig::default();
        assert_eq!(c.pool.capacity, 6);
        assert_eq!(c.pool.look_ahead, 3.0);
        assert_eq!(c.pool.look_behind, 1.0);
        assert_eq!(c.history.max_stack_size, 100);
        assert_eq!(c.history.merge_window_ms, 300);
        assert!(c.history.enable_grouping);
        assert_eq!(c.quota.warning_threshold, 0.8);
        assert_eq!(c.quota.critical_threshold, 0.9);
        assert_eq!(c.quota.target_free_percent, 0.3);
    }

    #[test]
    fn config_roundtrips_through_json() {
        let c = EngineConfig::default();
        let s = serde_json::to_string(&c).unwrap();
        let back: EngineConfig = serde_json::from_str(&s).unwrap();
        assert_eq!(back, c);
    }
}

use std::{fs, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{layout::NodeWeights, metrics::Thresholds, PulseError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FmpConfig {
    /// Delay after `load` before the estimate is finalized.
    pub settle_delay_ms: u64,
    pub thresholds: Thresholds,
    pub weights: NodeWeights,
}

impl Default for FmpConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: 4_000,
            thresholds: Thresholds::new(3_000.0, 6_000.0),
            weights: NodeWeights::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtiConfig {
    pub settle_delay_ms: u64,
    pub quiet_window_ms: f64,
    pub search_step_ms: f64,
    pub max_active_requests: usize,
    pub thresholds: Thresholds,
}

impl Default for TtiConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: 8_000,
            quiet_window_ms: 5_000.0,
            search_step_ms: 50.0,
            max_active_requests: 2,
            thresholds: Thresholds::new(2_500.0, 3_200.0),
        }
    }
}

/// Thresholds-only section for pass-through metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatedConfig {
    pub thresholds: Thresholds,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelayedConfig {
    pub settle_delay_ms: u64,
    pub thresholds: Thresholds,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FstConfig {
    /// Quiet period without DOM mutations that marks the first screen as stable.
    pub stable_window_ms: u64,
    pub thresholds: Thresholds,
}

impl Default for FstConfig {
    fn default() -> Self {
        Self {
            stable_window_ms: 1_000,
            thresholds: Thresholds::new(3_000.0, 6_000.0),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpsConfig {
    pub log_level: String,
    pub report_dir: String,
}

impl Default for OpsConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            report_dir: "reports".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PulseConfig {
    pub fmp: FmpConfig,
    pub tti: TtiConfig,
    pub fcp: RatedConfig,
    pub lcp: RatedConfig,
    pub inp: RatedConfig,
    pub plt: DelayedConfig,
    pub resource: DelayedConfig,
    pub fst: FstConfig,
    pub ops: OpsConfig,
}

impl Default for PulseConfig {
    fn default() -> Self {
        Self {
            fmp: FmpConfig::default(),
            tti: TtiConfig::default(),
            fcp: RatedConfig {
                thresholds: Thresholds::new(1_800.0, 3_000.0),
            },
            lcp: RatedConfig {
                thresholds: Thresholds::new(2_500.0, 4_000.0),
            },
            inp: RatedConfig {
                thresholds: Thresholds::new(200.0, 500.0),
            },
            plt: DelayedConfig {
                settle_delay_ms: 5_000,
                thresholds: Thresholds::new(3_000.0, 6_000.0),
            },
            resource: DelayedConfig {
                settle_delay_ms: 5_000,
                thresholds: Thresholds::new(1_000.0, 3_000.0),
            },
            fst: FstConfig::default(),
            ops: OpsConfig::default(),
        }
    }
}

impl PulseConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref).map_err(|err| {
            PulseError::Configuration(format!(
                "unable to read config file {}: {err}",
                path_ref.display()
            ))
        })?;
        toml::from_str(&contents).map_err(|err| {
            PulseError::Configuration(format!(
                "failed to parse config file {}: {err}",
                path_ref.display()
            ))
        })
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.tti.search_step_ms > 0.0) {
            return Err(PulseError::Configuration(
                "tti.search_step_ms must be greater than zero".into(),
            ));
        }
        if !(self.tti.quiet_window_ms > 0.0) {
            return Err(PulseError::Configuration(
                "tti.quiet_window_ms must be greater than zero".into(),
            ));
        }
        if self.fst.stable_window_ms == 0 {
            return Err(PulseError::Configuration(
                "fst.stable_window_ms must be greater than zero".into(),
            ));
        }
        let rated = [
            ("fmp", self.fmp.thresholds),
            ("tti", self.tti.thresholds),
            ("fcp", self.fcp.thresholds),
            ("lcp", self.lcp.thresholds),
            ("inp", self.inp.thresholds),
            ("plt", self.plt.thresholds),
            ("resource", self.resource.thresholds),
            ("fst", self.fst.thresholds),
        ];
        for (section, thresholds) in rated {
            if thresholds.good > thresholds.poor {
                return Err(PulseError::Configuration(format!(
                    "{section}.thresholds: good ({}) must not exceed poor ({})",
                    thresholds.good, thresholds.poor
                )));
            }
        }
        Ok(())
    }
}

impl FmpConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

impl TtiConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

impl DelayedConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

impl FstConfig {
    pub fn stable_window(&self) -> Duration {
        Duration::from_millis(self.stable_window_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn load_pulse_config_from_file() {
        let temp_path = std::env::temp_dir().join("pagepulse-config-test.toml");
        let mut config = PulseConfig::default();
        config.fmp.settle_delay_ms = 1_500;
        config.tti.quiet_window_ms = 2_000.0;
        config.ops.log_level = "debug".into();

        let doc = toml::to_string(&config).expect("serialize config");
        fs::write(&temp_path, doc).expect("write temp config");

        let loaded = PulseConfig::from_file(&temp_path).expect("load config");
        assert_eq!(loaded.fmp.settle_delay_ms, 1_500);
        assert_eq!(loaded.tti.quiet_window_ms, 2_000.0);
        assert_eq!(loaded.fmp.weights, config.fmp.weights);
        assert_eq!(loaded.ops.log_level, "debug");
        fs::remove_file(&temp_path).expect("cleanup temp config");
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config: PulseConfig = toml::from_str(
            r#"
            [tti]
            settle_delay_ms = 100
            "#,
        )
        .expect("parse partial config");
        assert_eq!(config.tti.settle_delay_ms, 100);
        assert_eq!(config.tti.quiet_window_ms, 5_000.0);
        assert_eq!(config.fmp.settle_delay_ms, 4_000);
        assert_eq!(config.fmp.weights.weight_for("img", false), 10.0);
    }

    #[test]
    fn validate_configuration_rules() {
        let mut config = PulseConfig::default();
        assert!(config.validate().is_ok());

        config.tti.search_step_ms = 0.0;
        assert!(config.validate().is_err());
        config.tti.search_step_ms = 50.0;

        config.tti.quiet_window_ms = -1.0;
        assert!(config.validate().is_err());
        config.tti.quiet_window_ms = 5_000.0;

        config.fst.stable_window_ms = 0;
        assert!(config.validate().is_err());
        config.fst.stable_window_ms = 1_000;

        config.inp.thresholds = Thresholds::new(600.0, 500.0);
        assert!(config.validate().is_err());
        config.inp.thresholds = Thresholds::new(200.0, 500.0);
        assert!(config.validate().is_ok());
    }
}

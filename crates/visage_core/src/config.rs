use crate::channel::Channel;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

// ============================================================================
// Top-level config
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VisageConfig {
    pub engine: EngineConfig,
    pub flags: FeatureFlags,
    pub arousal: ArousalConfig,
    pub tick: TickConfig,
}

impl VisageConfig {
    /// Load config from a TOML file, falling back to defaults for missing fields.
    /// After loading, env var overrides are applied.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let mut config: VisageConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML config")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Try to load from path; if file doesn't exist, return defaults with env overrides.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::info!("Config file not found or invalid ({}), using defaults", e);
                let mut cfg = Self::default();
                cfg.apply_env_overrides();
                cfg
            }
        }
    }

    /// Apply environment variable overrides on top of file-based config.
    fn apply_env_overrides(&mut self) {
        if let Some(v) = env_bool("VISAGE_AMBIENT") {
            self.flags.ambient = v;
        }
        if let Some(v) = env_bool("VISAGE_NAMED") {
            self.flags.named = v;
        }
        if let Ok(v) = std::env::var("VISAGE_TICK_MS") {
            if let Ok(n) = v.parse() {
                self.tick.interval_ms = n;
            }
        }
        if let Ok(v) = std::env::var("VISAGE_MANUAL_PRIORITY") {
            if let Ok(n) = v.parse() {
                self.engine.manual_priority = n;
            }
        }
    }
}

fn env_bool(key: &str) -> Option<bool> {
    let v = std::env::var(key).ok()?;
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        other => {
            tracing::warn!("Ignoring {}={:?}: not a boolean", key, other);
            None
        }
    }
}

// ============================================================================
// Sub-configs
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Priority given to explicit "set now" overrides. At equal priority
    /// they still beat automatic events.
    pub manual_priority: i32,
    /// Window given to timed kinds (named, external, post-climax) that
    /// arrive without a duration.
    pub timed_default_ms: u64,
    /// Length of the one-shot clearing pulse used by reset and by ambient
    /// expiry while the ambient flag is off.
    pub clear_pulse_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            manual_priority: 0,
            timed_default_ms: 5_000,
            clear_pulse_ms: 500,
        }
    }
}

/// Host-supplied switches for the gated event classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FeatureFlags {
    /// Arousal-driven ambient expressions (ambient and post-climax kinds).
    pub ambient: bool,
    /// Canned named animations.
    pub named: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            ambient: true,
            named: true,
        }
    }
}

impl FeatureFlags {
    pub fn all_off() -> Self {
        Self {
            ambient: false,
            named: false,
        }
    }

    /// The engine ticks while any gated class is enabled.
    pub fn any(self) -> bool {
        self.ambient || self.named
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArousalConfig {
    /// Threshold shift applied while arousal is decreasing.
    pub hysteresis: f32,
    /// Allowed excess above 100 for boosted states.
    pub headroom: f32,
    /// Boost added right after a climax, decaying linearly to zero.
    pub max_boost: f32,
    /// Recovery window per counted climax.
    pub recovery_per_climax_ms: u64,
    /// Climax count above which the recovery window stops growing.
    pub climax_count_cap: u32,
    pub dimensions: Vec<DimensionConfig>,
}

impl Default for ArousalConfig {
    fn default() -> Self {
        Self {
            hysteresis: 5.0,
            headroom: 5.0,
            max_boost: 30.0,
            recovery_per_climax_ms: 20_000,
            climax_count_cap: 10,
            dimensions: default_dimensions(),
        }
    }
}

/// Tier table for one expressive dimension.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DimensionConfig {
    pub channel: Channel,
    pub tiers: Vec<TierConfig>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TierConfig {
    pub threshold: f32,
    #[serde(default)]
    pub expression: Option<String>,
}

fn tier(threshold: f32, expression: Option<&str>) -> TierConfig {
    TierConfig {
        threshold,
        expression: expression.map(str::to_string),
    }
}

fn default_dimensions() -> Vec<DimensionConfig> {
    let eyes = vec![
        tier(95.0, Some("Closed")),
        tier(65.0, Some("Horny")),
        tier(0.0, None),
    ];
    vec![
        DimensionConfig {
            channel: Channel::Blush,
            tiers: vec![
                tier(90.0, Some("High")),
                tier(65.0, Some("Medium")),
                tier(30.0, Some("Low")),
                tier(0.0, None),
            ],
        },
        DimensionConfig {
            channel: Channel::Eyebrows,
            tiers: vec![
                tier(80.0, Some("Soft")),
                tier(50.0, Some("Lowered")),
                tier(0.0, None),
            ],
        },
        DimensionConfig {
            channel: Channel::Eyes,
            tiers: eyes.clone(),
        },
        DimensionConfig {
            channel: Channel::Eyes2,
            tiers: eyes,
        },
        DimensionConfig {
            channel: Channel::Fluids,
            tiers: vec![
                tier(100.0, Some("DroolSides")),
                tier(75.0, Some("DroolLow")),
                tier(0.0, None),
            ],
        },
    ]
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TickConfig {
    /// Interval between ticks when the engine is driven in real time.
    pub interval_ms: u64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self { interval_ms: 100 }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = VisageConfig::default();
        assert_eq!(cfg.engine.manual_priority, 0);
        assert_eq!(cfg.engine.timed_default_ms, 5_000);
        assert!(cfg.flags.ambient && cfg.flags.named);
        assert_eq!(cfg.tick.interval_ms, 100);
        assert_eq!(cfg.arousal.dimensions.len(), 5);
    }

    #[test]
    fn test_parse_minimal_toml() {
        let toml_str = r#"
[flags]
named = false
"#;
        let cfg: VisageConfig = toml::from_str(toml_str).unwrap();
        assert!(!cfg.flags.named);
        // Defaults for unspecified fields
        assert!(cfg.flags.ambient);
        assert_eq!(cfg.arousal.hysteresis, 5.0);
    }

    #[test]
    fn test_parse_full_toml() {
        let toml_str = r#"
[engine]
manual_priority = 50
timed_default_ms = 2000
clear_pulse_ms = 100

[flags]
ambient = false
named = true

[arousal]
hysteresis = 3.0
headroom = 10.0
max_boost = 20.0
recovery_per_climax_ms = 1000
climax_count_cap = 4

[[arousal.dimensions]]
channel = "blush"
tiers = [{ threshold = 50.0, expression = "Medium" }, { threshold = 0.0 }]

[tick]
interval_ms = 16
"#;
        let cfg: VisageConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.engine.manual_priority, 50);
        assert_eq!(cfg.engine.clear_pulse_ms, 100);
        assert!(!cfg.flags.ambient);
        assert_eq!(cfg.arousal.climax_count_cap, 4);
        assert_eq!(cfg.arousal.dimensions.len(), 1);
        assert_eq!(cfg.arousal.dimensions[0].channel, Channel::Blush);
        assert_eq!(cfg.arousal.dimensions[0].tiers[1].expression, None);
        assert_eq!(cfg.tick.interval_ms, 16);
    }

    #[test]
    fn test_env_overrides_and_defaults() {
        // Part 1: env overrides
        std::env::set_var("VISAGE_AMBIENT", "off");
        std::env::set_var("VISAGE_TICK_MS", "33");

        let mut cfg = VisageConfig::default();
        cfg.apply_env_overrides();

        assert!(!cfg.flags.ambient);
        assert_eq!(cfg.tick.interval_ms, 33);

        // Clean up env vars before testing defaults
        std::env::remove_var("VISAGE_AMBIENT");
        std::env::remove_var("VISAGE_TICK_MS");

        // Part 2: nonexistent path returns defaults (no env interference)
        let cfg = VisageConfig::load_or_default("/nonexistent/path.toml");
        assert!(cfg.flags.ambient);
        assert_eq!(cfg.tick.interval_ms, 100);
    }
}

use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::game::constants::{layout, marbles, sim};
use crate::game::layout::ArenaLayout;
use crate::game::round::{EndCondition, RoundRules};
use crate::game::systems::spawning::SpawnPolicy;
use crate::lobby::registry::RoundDefaults;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to
    pub bind_address: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Simulation tick rate (Hz)
    pub tick_rate: u32,
    /// Port of the metrics/health endpoint
    pub metrics_port: u16,
    /// Maximum concurrently attached arena displays
    pub max_displays: usize,
    /// Path to TLS certificate file (if not using certs/)
    pub tls_cert_path: Option<String>,
    /// Path to TLS key file (if not using certs/)
    pub tls_key_path: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 4433,
            tick_rate: sim::TICK_RATE,
            metrics_port: 9090,
            max_displays: 16,
            tls_cert_path: None,
            tls_key_path: None,
        }
    }
}

/// Read and parse an env var. Invalid values are logged and ignored.
fn env_parse<T: FromStr>(name: &str, accept: impl Fn(&T) -> bool, expected: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) if accept(&value) => Some(value),
        Ok(_) => {
            tracing::warn!("{} must be {}, using default", name, expected);
            None
        }
        Err(_) => {
            tracing::warn!("Invalid {} '{}', using default", name, raw);
            None
        }
    }
}

impl ServerConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        if let Some(addr) = env_parse::<IpAddr>("BIND_ADDRESS", |_| true, "an IP address") {
            config.bind_address = addr;
        }
        if let Some(port) = env_parse::<u16>("PORT", |p| *p > 0, "> 0") {
            config.port = port;
        }
        if let Some(rate) = env_parse::<u32>("TICK_RATE", |r| (1..=240).contains(r), "1-240") {
            config.tick_rate = rate;
        }
        if let Some(port) = env_parse::<u16>("METRICS_PORT", |p| *p > 0, "> 0") {
            config.metrics_port = port;
        }
        if let Some(max) = env_parse::<usize>("MAX_DISPLAYS", |m| (1..=256).contains(m), "1-256") {
            config.max_displays = max;
        }

        if let Ok(cert_path) = std::env::var("TLS_CERT_PATH") {
            config.tls_cert_path = Some(cert_path);
        }
        if let Ok(key_path) = std::env::var("TLS_KEY_PATH") {
            config.tls_key_path = Some(key_path);
        }

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        if self.port == 0 {
            return Err("Port cannot be 0".to_string());
        }
        if self.tick_rate == 0 {
            return Err("tick_rate must be at least 1".to_string());
        }
        if self.metrics_port == self.port {
            return Err("metrics_port must differ from port".to_string());
        }
        if self.max_displays == 0 {
            return Err("max_displays must be at least 1".to_string());
        }
        if self.tls_cert_path.is_some() != self.tls_key_path.is_some() {
            return Err("TLS_CERT_PATH and TLS_KEY_PATH must be set together".to_string());
        }
        Ok(())
    }

    /// Simulation step length in milliseconds
    pub fn tick_duration_ms(&self) -> u64 {
        (1000 / self.tick_rate.max(1)) as u64
    }
}

/// Which arena the server runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArenaVariant {
    Pachinko,
    Spinners,
    Triangles,
    Custom,
}

impl FromStr for ArenaVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pachinko" => Ok(ArenaVariant::Pachinko),
            "spinners" => Ok(ArenaVariant::Spinners),
            "triangles" => Ok(ArenaVariant::Triangles),
            "custom" => Ok(ArenaVariant::Custom),
            other => Err(format!("unknown arena variant '{}'", other)),
        }
    }
}

/// What happens to a marble that falls into a dead zone
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeadZoneBehavior {
    Destroy,
    /// Back to the spawn line at rest
    #[default]
    Recycle,
}

/// Game rules and geometry of one arena
#[derive(Debug, Clone)]
pub struct ArenaConfig {
    pub variant: ArenaVariant,
    pub marble_budget: u32,
    pub spawn_policy: SpawnPolicy,
    pub win_threshold: Option<u32>,
    pub end_condition: EndCondition,
    pub dead_zone: DeadZoneBehavior,
    /// Marbles that land on a score zone are removed
    pub consume_scored_marbles: bool,
    pub layout: ArenaLayout,
    /// Seed for spawn positions
    pub seed: u64,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self::preset(
            ArenaVariant::Spinners,
            layout::DEFAULT_WIDTH,
            layout::DEFAULT_HEIGHT,
            0,
        )
    }
}

impl ArenaConfig {
    /// Built-in arena. `Custom` starts from an empty layout.
    pub fn preset(variant: ArenaVariant, width: f32, height: f32, seed: u64) -> Self {
        let goal_arena = |layout: ArenaLayout, end_condition: EndCondition| Self {
            variant,
            marble_budget: marbles::BUDGET,
            spawn_policy: SpawnPolicy::default(),
            win_threshold: Some(marbles::BUDGET),
            end_condition,
            dead_zone: DeadZoneBehavior::Recycle,
            consume_scored_marbles: true,
            layout,
            seed,
        };

        match variant {
            ArenaVariant::Pachinko => Self {
                variant,
                marble_budget: marbles::BUDGET,
                spawn_policy: SpawnPolicy::pachinko(),
                win_threshold: None,
                end_condition: EndCondition::Manual,
                dead_zone: DeadZoneBehavior::Recycle,
                consume_scored_marbles: true,
                layout: ArenaLayout::pachinko(width, height, seed),
                seed,
            },
            ArenaVariant::Spinners => goal_arena(
                ArenaLayout::spinners(width, height, seed),
                EndCondition::LastStanding,
            ),
            ArenaVariant::Triangles => goal_arena(
                ArenaLayout::triangles(width, height, seed),
                EndCondition::LastStandingOrAllFinished,
            ),
            ArenaVariant::Custom => goal_arena(ArenaLayout::empty(width, height), EndCondition::LastStanding),
        }
    }

    /// Load the arena from environment or use defaults
    pub fn load_or_default() -> Self {
        let variant = env_parse::<ArenaVariant>("ARENA_VARIANT", |_| true, "an arena variant")
            .unwrap_or(ArenaVariant::Spinners);
        let width = env_parse::<f32>("ARENA_WIDTH", |w| *w >= 200.0 && w.is_finite(), ">= 200")
            .unwrap_or(layout::DEFAULT_WIDTH);
        let height = env_parse::<f32>("ARENA_HEIGHT", |h| *h >= 200.0 && h.is_finite(), ">= 200")
            .unwrap_or(layout::DEFAULT_HEIGHT);
        let seed = env_parse::<u64>("ARENA_SEED", |_| true, "an integer").unwrap_or_else(rand::random);

        let mut config = Self::preset(variant, width, height, seed);

        if variant == ArenaVariant::Custom {
            match std::env::var("ARENA_LAYOUT_PATH") {
                Ok(path) => match ArenaLayout::load(&path) {
                    Ok(layout) => config.layout = layout,
                    Err(e) => tracing::warn!("Failed to load custom layout: {}", e),
                },
                Err(_) => tracing::warn!("ARENA_VARIANT=custom without ARENA_LAYOUT_PATH, arena is empty"),
            }
        }

        if let Some(budget) = env_parse::<u32>("MARBLE_BUDGET", |b| (1..=10_000).contains(b), "1-10000") {
            config.marble_budget = budget;
        }

        // 0 disables the threshold
        if let Some(threshold) = env_parse::<u32>("WIN_THRESHOLD", |_| true, "an integer") {
            if threshold == 0 {
                config.win_threshold = None;
                config.end_condition = EndCondition::Manual;
            } else {
                config.win_threshold = Some(threshold);
            }
        }

        config
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.marble_budget == 0 {
            return Err("marble_budget must be at least 1".to_string());
        }
        if self.win_threshold == Some(0) {
            return Err("win_threshold must be at least 1".to_string());
        }
        if self.win_threshold.is_none() && self.end_condition != EndCondition::Manual {
            return Err("automatic end conditions need a win threshold".to_string());
        }
        self.spawn_policy.validate()?;
        self.layout.validate().map_err(|e| e.to_string())?;
        Ok(())
    }

    pub fn rules(&self) -> RoundRules {
        RoundRules {
            win_threshold: self.win_threshold,
            end_condition: self.end_condition,
            points_per_goal: marbles::POINTS_PER_GOAL,
        }
    }

    pub fn round_defaults(&self) -> RoundDefaults {
        RoundDefaults {
            marble_budget: self.marble_budget,
            spawn_interval_ms: self.spawn_policy.initial_interval(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::physics::BodyLabel;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 4433);
        assert_eq!(config.tick_rate, 60);
        assert_eq!(config.metrics_port, 9090);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_or_default() {
        let config = ServerConfig::load_or_default();
        assert!(config.port > 0);
        assert!(config.tick_rate > 0);
    }

    #[test]
    fn test_validate_rejects_half_tls() {
        let config = ServerConfig {
            tls_cert_path: Some("cert.pem".to_string()),
            ..ServerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tick_duration() {
        let config = ServerConfig::default();
        assert_eq!(config.tick_duration_ms(), 16);
    }

    #[test]
    fn test_variant_parse() {
        assert_eq!("Pachinko".parse::<ArenaVariant>(), Ok(ArenaVariant::Pachinko));
        assert_eq!(" triangles ".parse::<ArenaVariant>(), Ok(ArenaVariant::Triangles));
        assert!("plinko".parse::<ArenaVariant>().is_err());
    }

    #[test]
    fn test_pachinko_preset() {
        let config = ArenaConfig::preset(ArenaVariant::Pachinko, 1920.0, 1080.0, 1);
        assert_eq!(config.win_threshold, None);
        assert_eq!(config.end_condition, EndCondition::Manual);
        assert_eq!(config.spawn_policy, SpawnPolicy::pachinko());
        assert_eq!(config.round_defaults().spawn_interval_ms, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_goal_presets() {
        let spinners = ArenaConfig::preset(ArenaVariant::Spinners, 1920.0, 1080.0, 1);
        assert_eq!(spinners.win_threshold, Some(50));
        assert_eq!(spinners.end_condition, EndCondition::LastStanding);
        assert!(spinners.validate().is_ok());

        let triangles = ArenaConfig::preset(ArenaVariant::Triangles, 1920.0, 1080.0, 1);
        assert_eq!(triangles.end_condition, EndCondition::LastStandingOrAllFinished);
        assert!(triangles
            .layout
            .fixtures
            .iter()
            .any(|f| f.label == BodyLabel::ScoreZone));
        assert!(triangles.validate().is_ok());
    }

    #[test]
    fn test_validate_threshold_rules() {
        let mut config = ArenaConfig::default();
        config.win_threshold = None;
        assert!(config.validate().is_err());

        config.end_condition = EndCondition::Manual;
        assert!(config.validate().is_ok());

        config.marble_budget = 0;
        assert!(config.validate().is_err());
    }
}

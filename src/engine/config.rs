use crate::{engine::Engine, rule::Rule};

pub const DEFAULT_MAX_LOOKUP_DEPTH: usize = 64;

/// Limits applied to recursive attribute lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Nested lookups allowed before `DepthExceeded` is raised.
    pub max_lookup_depth: usize,
    /// Fail with `Cycle` when a lookup re-enters an attribute being resolved.
    pub detect_cycles: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_lookup_depth: DEFAULT_MAX_LOOKUP_DEPTH,
            detect_cycles: true,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `RULEBOOK_MAX_LOOKUP_DEPTH` and
    /// `RULEBOOK_DETECT_CYCLES`. Unparseable values are ignored with a warning.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(raw) = std::env::var("RULEBOOK_MAX_LOOKUP_DEPTH") {
            match raw.trim().parse::<usize>() {
                Ok(depth) if depth > 0 => config.max_lookup_depth = depth,
                _ => log::warn!("rulebook: ignoring RULEBOOK_MAX_LOOKUP_DEPTH={raw:?}"),
            }
        }

        if let Ok(raw) = std::env::var("RULEBOOK_DETECT_CYCLES") {
            match parse_flag(&raw) {
                Some(flag) => config.detect_cycles = flag,
                None => log::warn!("rulebook: ignoring RULEBOOK_DETECT_CYCLES={raw:?}"),
            }
        }

        config
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub struct EngineBuilder {
    config: EngineConfig,
    rules: Vec<Rule>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::from_env(),
            rules: Vec::new(),
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn max_lookup_depth(mut self, depth: usize) -> Self {
        self.config.max_lookup_depth = depth;
        self
    }

    pub fn detect_cycles(mut self, enabled: bool) -> Self {
        self.config.detect_cycles = enabled;
        self
    }

    pub fn rules(mut self, rules: impl IntoIterator<Item = Rule>) -> Self {
        self.rules.extend(rules);
        self
    }

    pub fn build(self) -> Engine {
        let mut engine = Engine::with_config(self.config);
        engine.load(self.rules);
        engine
    }
}

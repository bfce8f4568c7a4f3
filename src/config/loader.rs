//! Layered configuration loading: defaults, then the first config file
//! found by searching a fixed list of candidate names across cwd, cwd's
//! parent, and the user's config directory, then a fixed set of named
//! environment variables applied imperatively — matching the precedence
//! order of the teacher's `ConfigLoader::load`, with files searched by
//! name/location instead of merged by a single fixed path.

use std::path::{Path, PathBuf};

use figment::providers::{Format, Json, Serialized};
use figment::Figment;

use super::schema::{ConfigError, SystemConfig};

const CANDIDATE_FILENAMES: &[&str] =
    &["claude-flow.config.json", "claude-flow.config.js", "claude-flow.json", ".claude-flow.json"];

/// Loads and validates [`SystemConfig`] from its layered sources.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Search `cwd`, `cwd`'s parent, and the user's config directory (via
    /// the `dirs` crate) for the first matching candidate filename.
    #[must_use]
    pub fn find_config_file(cwd: &Path) -> Option<PathBuf> {
        let mut search_dirs = vec![cwd.to_path_buf()];
        if let Some(parent) = cwd.parent() {
            search_dirs.push(parent.to_path_buf());
        }
        if let Some(home_config) = dirs::config_dir() {
            search_dirs.push(home_config.join("claude-flow"));
        }

        for dir in &search_dirs {
            for name in CANDIDATE_FILENAMES {
                let candidate = dir.join(name);
                if candidate.is_file() {
                    return Some(candidate);
                }
            }
        }
        None
    }

    /// Load the full layered configuration starting the file search from
    /// `cwd`. Environment variables are applied after file extraction so
    /// their precedence is unconditional regardless of what figment's own
    /// env provider would otherwise merge.
    pub fn load(cwd: &Path) -> anyhow::Result<(SystemConfig, Vec<ConfigError>)> {
        let mut figment = Figment::new().merge(Serialized::defaults(SystemConfig::default()));

        if let Some(path) = Self::find_config_file(cwd) {
            let json = Self::read_as_json(&path)?;
            figment = figment.merge(Json::string(&json));
        }

        let mut config: SystemConfig = figment.extract()?;
        Self::apply_env_overrides(&mut config);

        let errors = Self::validate(&config);
        Ok((config, errors))
    }

    /// A `.js` candidate is expected to contain a trailing
    /// `module.exports = { ... };` assignment; the object literal is
    /// extracted and treated as JSON. This is a deliberate simplification —
    /// it does not evaluate JavaScript, so computed keys or expressions in
    /// the literal are not supported.
    fn read_as_json(path: &Path) -> anyhow::Result<String> {
        let raw = std::fs::read_to_string(path)?;
        if path.extension().and_then(|e| e.to_str()) != Some("js") {
            return Ok(raw);
        }
        let start = raw.find('{').ok_or_else(|| anyhow::anyhow!("no object literal found in {}", path.display()))?;
        let end = raw.rfind('}').ok_or_else(|| anyhow::anyhow!("unterminated object literal in {}", path.display()))?;
        Ok(raw[start..=end].to_string())
    }

    fn apply_env_overrides(config: &mut SystemConfig) {
        if let Ok(v) = std::env::var("CLAUDE_FLOW_MAX_AGENTS") {
            if let Ok(parsed) = v.parse() {
                config.agents.max_agents = parsed;
            }
        }
        if let Ok(v) = std::env::var("CLAUDE_FLOW_DATA_DIR") {
            config.memory.data_dir = v;
        }
        if let Ok(v) = std::env::var("CLAUDE_FLOW_MEMORY_TYPE") {
            config.memory.backend = v;
        }
        if let Ok(v) = std::env::var("CLAUDE_FLOW_MCP_TRANSPORT") {
            if let Some(server) = config.mcp_servers.first_mut() {
                server.transport = v;
            }
        }
        if let Ok(v) = std::env::var("CLAUDE_FLOW_MCP_PORT") {
            if let (Ok(parsed), Some(server)) = (v.parse(), config.mcp_servers.first_mut()) {
                server.port = Some(parsed);
            }
        }
        if let Ok(v) = std::env::var("CLAUDE_FLOW_SWARM_TOPOLOGY") {
            config.swarm.topology = v;
        }
    }

    /// Validate every layer's extracted value, accumulating every failure
    /// rather than stopping at the first — unlike the teacher's
    /// single-error `validate`, callers need the full list to report a
    /// complete diagnostic.
    #[must_use]
    pub fn validate(config: &SystemConfig) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if config.agents.max_agents == 0 || config.agents.max_agents > 1000 {
            errors.push(ConfigError::new(
                "agents.max_agents",
                "out_of_range",
                format!("must be between 1 and 1000, got {}", config.agents.max_agents),
            ));
        }

        if super::schema::MemoryType::parse_str(&config.memory.backend).is_none() {
            errors.push(ConfigError::new(
                "memory.backend",
                "invalid_enum",
                format!("'{}' is not one of sqlite, agentdb, hybrid, redis, memory", config.memory.backend),
            ));
        }

        if crate::swarm::TopologyKind::parse_str(&config.swarm.topology).is_none() {
            errors.push(ConfigError::new(
                "swarm.topology",
                "invalid_enum",
                format!("'{}' is not a known topology kind", config.swarm.topology),
            ));
        }

        if !(0.0..=1.0).contains(&config.swarm.consensus_threshold) {
            errors.push(ConfigError::new(
                "swarm.consensus_threshold",
                "out_of_range",
                format!("must be within [0, 1], got {}", config.swarm.consensus_threshold),
            ));
        }

        for (idx, server) in config.mcp_servers.iter().enumerate() {
            let path = format!("mcp_servers[{idx}]");
            if server.name.is_empty() {
                errors.push(ConfigError::new(format!("{path}.name"), "empty", "MCP server name cannot be empty"));
            }
            if super::schema::McpTransport::parse_str(&server.transport).is_none() {
                errors.push(ConfigError::new(
                    format!("{path}.transport"),
                    "invalid_enum",
                    format!("'{}' is not one of stdio, http, websocket", server.transport),
                ));
            }
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn default_config_validates_cleanly() {
        let config = SystemConfig::default();
        assert!(ConfigLoader::validate(&config).is_empty());
    }

    #[test]
    fn invalid_memory_backend_is_reported() {
        let mut config = SystemConfig::default();
        config.memory.backend = "carrier-pigeon".to_string();
        let errors = ConfigLoader::validate(&config);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, "memory.backend");
        assert_eq!(errors[0].code, "invalid_enum");
    }

    #[test]
    fn validation_accumulates_every_failure_not_just_the_first() {
        let mut config = SystemConfig::default();
        config.agents.max_agents = 0;
        config.memory.backend = "bogus".to_string();
        config.swarm.topology = "bogus".to_string();
        let errors = ConfigLoader::validate(&config);
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn finds_config_file_in_cwd() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("claude-flow.json");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, r#"{{"agents": {{"max_agents": 42}}}}"#).unwrap();

        let found = ConfigLoader::find_config_file(dir.path());
        assert_eq!(found, Some(path));
    }

    #[test]
    fn search_prefers_earlier_candidate_filenames() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("claude-flow.config.json"), "{}").unwrap();
        std::fs::write(dir.path().join("claude-flow.json"), "{}").unwrap();

        let found = ConfigLoader::find_config_file(dir.path()).unwrap();
        assert_eq!(found.file_name().unwrap(), "claude-flow.config.json");
    }

    #[test]
    fn load_merges_file_over_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("claude-flow.json"), r#"{"agents": {"max_agents": 42}}"#).unwrap();

        let (config, errors) = ConfigLoader::load(dir.path()).unwrap();
        assert_eq!(config.agents.max_agents, 42);
        assert!(errors.is_empty());
    }

    #[test]
    fn env_override_beats_file_value() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("claude-flow.json"), r#"{"agents": {"max_agents": 42}}"#).unwrap();

        std::env::set_var("CLAUDE_FLOW_MAX_AGENTS", "7");
        let (config, _) = ConfigLoader::load(dir.path()).unwrap();
        std::env::remove_var("CLAUDE_FLOW_MAX_AGENTS");
        assert_eq!(config.agents.max_agents, 7);
    }

    #[test]
    fn js_candidate_extracts_the_trailing_object_literal() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("claude-flow.config.js"),
            "// generated\nmodule.exports = {\"agents\": {\"max_agents\": 5}};\n",
        )
        .unwrap();

        let (config, _) = ConfigLoader::load(dir.path()).unwrap();
        assert_eq!(config.agents.max_agents, 5);
    }
}

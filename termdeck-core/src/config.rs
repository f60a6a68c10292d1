use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::content::{DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_EVICT};
use crate::drag::{DEFAULT_EDGE_ZONE_RATIO, DEFAULT_TAB_BAR_HEIGHT};
use crate::handle::{ProcessKind, TerminalHandle};
use crate::layout::DEFAULT_MIN_PANE_WIDTH;
use crate::registry::DEFAULT_LOG_CAPACITY;
use crate::supervisor::StartRequest;

/// Tuning knobs of the engine. Every field is optional in the file.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Log entries kept per process
    pub log_capacity: usize,
    /// Rendered chunks kept in the content cache
    pub render_cache_capacity: usize,
    /// Entries dropped at once when the cache is full
    pub render_cache_evict: usize,
    /// Narrowest a pane may be resized to, in percent
    pub min_pane_width: f64,
    /// Fraction of a pane's width on each side that acts as a split zone
    pub edge_zone_ratio: f64,
    /// Height of the tab strip, in the hit test's units
    pub tab_bar_height: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_capacity: DEFAULT_LOG_CAPACITY,
            render_cache_capacity: DEFAULT_CACHE_CAPACITY,
            render_cache_evict: DEFAULT_CACHE_EVICT,
            min_pane_width: DEFAULT_MIN_PANE_WIDTH,
            edge_zone_ratio: DEFAULT_EDGE_ZONE_RATIO,
            tab_bar_height: DEFAULT_TAB_BAR_HEIGHT,
        }
    }
}

/// Service definition in the config file
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ServiceConfig {
    /// Display name (defaults to service id)
    #[serde(default)]
    pub name: Option<String>,

    /// Shell command line
    pub command: String,

    #[serde(default)]
    pub cwd: Option<PathBuf>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Alternative command lines by mode name (`dev`, `prod`, ...)
    #[serde(default)]
    pub modes: BTreeMap<String, String>,

    #[serde(default)]
    pub default_mode: Option<String>,

    /// Appended to whichever command runs
    #[serde(default)]
    pub extra_args: Option<String>,

    /// Named argument sets appended after `extra_args`
    #[serde(default)]
    pub arg_presets: BTreeMap<String, String>,

    #[serde(default)]
    pub default_arg_preset: Option<String>,

    /// Start when the TUI launches
    #[serde(default)]
    pub autostart: bool,

    #[serde(default)]
    pub description: Option<String>,
}

/// Project script or global script
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ScriptConfig {
    #[serde(default)]
    pub name: Option<String>,

    pub command: String,

    #[serde(default)]
    pub cwd: Option<PathBuf>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,

    #[serde(default)]
    pub description: Option<String>,
}

/// Command line a service resolves to, with the variant that produced it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedCommand {
    pub command: String,
    pub mode: Option<String>,
    pub arg_preset: Option<String>,
}

impl ServiceConfig {
    /// Effective mode is the explicit one, else `default_mode`. Its command (or
    /// `command` when there is no mode) is followed by `extra_args` and then by
    /// the effective arg preset's arguments.
    pub fn resolve_command(
        &self,
        service: &str,
        mode: Option<&str>,
        arg_preset: Option<&str>,
    ) -> Result<ResolvedCommand, ConfigError> {
        let mode = mode.or(self.default_mode.as_deref());
        let base = match mode {
            Some(m) => self.modes.get(m).ok_or_else(|| ConfigError::UnknownMode {
                service: service.to_string(),
                mode: m.to_string(),
            })?,
            None => &self.command,
        };

        let mut parts = vec![base.trim().to_string()];
        if let Some(extra) = self.extra_args.as_deref().map(str::trim) {
            if !extra.is_empty() {
                parts.push(extra.to_string());
            }
        }

        let arg_preset = arg_preset.or(self.default_arg_preset.as_deref());
        if let Some(p) = arg_preset {
            let args = self
                .arg_presets
                .get(p)
                .ok_or_else(|| ConfigError::UnknownArgPreset {
                    service: service.to_string(),
                    preset: p.to_string(),
                })?;
            if !args.trim().is_empty() {
                parts.push(args.trim().to_string());
            }
        }

        Ok(ResolvedCommand {
            command: parts.join(" "),
            mode: mode.map(str::to_string),
            arg_preset: arg_preset.map(str::to_string),
        })
    }
}

/// Root configuration file structure
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct WorkspaceConfig {
    #[serde(default = "default_version")]
    pub version: String,

    /// Project name
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub services: BTreeMap<String, ServiceConfig>,

    #[serde(default)]
    pub scripts: BTreeMap<String, ScriptConfig>,

    #[serde(default)]
    pub global_scripts: BTreeMap<String, ScriptConfig>,

    /// Directory relative `cwd`s are resolved against
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

fn default_version() -> String {
    "1".into()
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            name: None,
            engine: EngineConfig::default(),
            services: BTreeMap::new(),
            scripts: BTreeMap::new(),
            global_scripts: BTreeMap::new(),
            base_dir: None,
        }
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("{kind} '{id}' has no command specified")]
    MissingCommand { kind: ProcessKind, id: String },
    #[error("service '{service}' has no mode '{mode}'")]
    UnknownMode { service: String, mode: String },
    #[error("service '{service}' has no arg preset '{preset}'")]
    UnknownArgPreset { service: String, preset: String },
    #[error("invalid engine.{field}: {reason}")]
    InvalidEngine { field: &'static str, reason: String },
    #[error("{0} is not defined in the config")]
    UnknownProcess(TerminalHandle),
    #[error("no config file found, searched: {searched:?}")]
    NotFound { searched: Vec<PathBuf> },
}

impl WorkspaceConfig {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_str(&content)?;
        config.base_dir = path.parent().map(Path::to_path_buf);
        Ok(config)
    }

    /// Load configuration from a string (useful for testing)
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: WorkspaceConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Search for config file in standard locations
    pub fn discover(start_dir: &Path) -> Result<(PathBuf, Self), ConfigError> {
        let names = ["termdeck.yaml", "termdeck.yml", ".termdeck.yaml", ".termdeck.yml"];
        let mut searched = Vec::new();

        // Check environment variable first
        if let Ok(env_path) = std::env::var("TERMDECK_CONFIG") {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Ok((path.clone(), Self::load(&path)?));
            }
            searched.push(path);
        }

        // Search current directory and parents
        let mut dir = Some(start_dir);
        while let Some(current) = dir {
            for name in &names {
                let path = current.join(name);
                if path.exists() {
                    return Ok((path.clone(), Self::load(&path)?));
                }
                searched.push(path);
            }
            dir = current.parent();
        }

        Err(ConfigError::NotFound { searched })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError> {
        self.validate_engine()?;

        for (id, svc) in &self.services {
            if svc.command.trim().is_empty() && svc.modes.is_empty() {
                return Err(ConfigError::MissingCommand {
                    kind: ProcessKind::Service,
                    id: id.clone(),
                });
            }
            // default mode and preset must resolve
            let resolved = svc.resolve_command(id, None, None)?;
            if resolved.command.trim().is_empty() {
                return Err(ConfigError::MissingCommand {
                    kind: ProcessKind::Service,
                    id: id.clone(),
                });
            }
        }

        let scripts = self
            .scripts
            .iter()
            .map(|(id, s)| (ProcessKind::Script, id, s))
            .chain(self.global_scripts.iter().map(|(id, s)| (ProcessKind::GlobalScript, id, s)));
        for (kind, id, script) in scripts {
            if script.command.trim().is_empty() {
                return Err(ConfigError::MissingCommand {
                    kind,
                    id: id.clone(),
                });
            }
        }

        Ok(())
    }

    fn validate_engine(&self) -> Result<(), ConfigError> {
        let e = &self.engine;
        let invalid = |field, reason: &str| {
            Err(ConfigError::InvalidEngine {
                field,
                reason: reason.to_string(),
            })
        };

        if e.log_capacity == 0 {
            return invalid("log_capacity", "must be at least 1");
        }
        if e.render_cache_capacity == 0 {
            return invalid("render_cache_capacity", "must be at least 1");
        }
        if e.render_cache_evict == 0 || e.render_cache_evict > e.render_cache_capacity {
            return invalid("render_cache_evict", "must be between 1 and render_cache_capacity");
        }
        if !(e.min_pane_width > 0.0 && e.min_pane_width <= 50.0) {
            return invalid("min_pane_width", "must be in (0, 50]");
        }
        if !(0.0..0.5).contains(&e.edge_zone_ratio) {
            return invalid("edge_zone_ratio", "must be in [0, 0.5)");
        }
        if !(e.tab_bar_height >= 0.0) {
            return invalid("tab_bar_height", "must not be negative");
        }
        Ok(())
    }

    /// Every configured process, services first
    pub fn handles(&self) -> Vec<TerminalHandle> {
        self.services
            .keys()
            .map(TerminalHandle::service)
            .chain(self.scripts.keys().map(TerminalHandle::script))
            .chain(self.global_scripts.keys().map(TerminalHandle::global_script))
            .collect()
    }

    pub fn autostart(&self) -> Vec<TerminalHandle> {
        self.services
            .iter()
            .filter(|(_, svc)| svc.autostart)
            .map(|(id, _)| TerminalHandle::service(id))
            .collect()
    }

    /// Human-readable name for a handle
    pub fn display_name(&self, handle: &TerminalHandle) -> String {
        let name = match handle.kind {
            ProcessKind::Service => self.services.get(&handle.raw_id).and_then(|s| s.name.clone()),
            ProcessKind::Script => self.scripts.get(&handle.raw_id).and_then(|s| s.name.clone()),
            ProcessKind::GlobalScript => self
                .global_scripts
                .get(&handle.raw_id)
                .and_then(|s| s.name.clone()),
        };
        name.unwrap_or_else(|| handle.raw_id.clone())
    }

    fn resolve_cwd(&self, cwd: Option<&Path>) -> Option<PathBuf> {
        match (cwd, &self.base_dir) {
            (Some(cwd), Some(base)) if cwd.is_relative() => Some(base.join(cwd)),
            (Some(cwd), _) => Some(cwd.to_path_buf()),
            (None, base) => base.clone(),
        }
    }

    /// Build the launch request for a configured process. Mode and preset only
    /// apply to services.
    pub fn start_request(
        &self,
        handle: &TerminalHandle,
        mode: Option<&str>,
        arg_preset: Option<&str>,
    ) -> Result<StartRequest, ConfigError> {
        let unknown = || ConfigError::UnknownProcess(handle.clone());
        let request = match handle.kind {
            ProcessKind::Service => {
                let svc = self.services.get(&handle.raw_id).ok_or_else(unknown)?;
                let resolved = svc.resolve_command(&handle.raw_id, mode, arg_preset)?;
                StartRequest::new(handle.clone(), resolved.command)
                    .with_env(svc.env.clone())
                    .with_mode(resolved.mode, resolved.arg_preset)
                    .with_cwd_opt(self.resolve_cwd(svc.cwd.as_deref()))
            }
            ProcessKind::Script | ProcessKind::GlobalScript => {
                let scripts = if handle.kind == ProcessKind::Script {
                    &self.scripts
                } else {
                    &self.global_scripts
                };
                let script = scripts.get(&handle.raw_id).ok_or_else(unknown)?;
                StartRequest::new(handle.clone(), script.command.trim())
                    .with_env(script.env.clone())
                    .with_cwd_opt(self.resolve_cwd(script.cwd.as_deref()))
            }
        };
        Ok(request)
    }
}

impl StartRequest {
    fn with_cwd_opt(mut self, cwd: Option<PathBuf>) -> Self {
        self.cwd = cwd;
        self
    }
}

//! Warden configuration (`warden.toml`).
//!
//! Every external touch point (jail name, client binary, escalation prefix, jail config path,
//! activation command) is configuration handed to the components at construction time.

use crate::errors::WardenError;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/f2b-warden/warden.toml";
pub const CONFIG_PATH_ENV: &str = "F2B_WARDEN_CONFIG";
pub const SCRIPT_PATH_ENV: &str = "FAIL2BAN_SYNC_SCRIPT_PATH";

const DEFAULT_JAIL: &str = "opensips-brute-force";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WardenConfig {
    pub jail: JailConfig,
    pub privilege: PrivilegeConfig,
    pub cache: CacheConfig,
    pub whitelist: WhitelistConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JailConfig {
    pub name: String,
    pub client: String,
    pub systemctl: String,
    pub service: String,
    pub status_timeout_secs: u64,
    pub command_timeout_secs: u64,
}

impl Default for JailConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_JAIL.to_string(),
            client: "fail2ban-client".to_string(),
            systemctl: "systemctl".to_string(),
            service: "fail2ban".to_string(),
            status_timeout_secs: 5,
            command_timeout_secs: 15,
        }
    }
}

impl JailConfig {
    pub fn status_timeout(&self) -> Duration {
        Duration::from_secs(self.status_timeout_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PrivilegeConfig {
    /// Escalation prefix for every fail2ban/systemctl call. Empty runs commands directly.
    pub escalate: Vec<String>,
    /// Drop the prefix when already running as root.
    pub skip_when_root: bool,
}

impl Default for PrivilegeConfig {
    fn default() -> Self {
        Self {
            escalate: vec!["sudo".to_string(), "-n".to_string()],
            skip_when_root: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    pub status_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { status_ttl_secs: 5 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncStrategy {
    /// Rewrite the `ignoreip` directive in-process, then activate.
    ConfigPatch,
    /// Delegate to the external whitelist sync script.
    Script,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActivationMode {
    /// `systemctl restart <service>`
    Restart,
    /// `fail2ban-client reload <jail>`
    Reload,
    /// `fail2ban-client set <jail> addignoreip/delignoreip` for the difference.
    LiveSet,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WhitelistConfig {
    pub database: PathBuf,
    pub strategy: SyncStrategy,
    /// Defaults to `/etc/fail2ban/jail.d/<jail>.conf`.
    pub jail_config: Option<PathBuf>,
    /// Line after which `ignoreip` is inserted when absent. Defaults to `[<jail>]`.
    pub anchor: Option<String>,
    /// Emit one `# whitelist:` comment per entry below the directive.
    pub annotate: bool,
    pub activation: ActivationMode,
    pub activation_timeout_secs: u64,
    /// Cross-process lock taken around every sync. See [`WhitelistConfig::sync_lock_path`].
    pub lock_file: Option<PathBuf>,
    pub script: ScriptConfig,
}

impl Default for WhitelistConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("/var/lib/f2b-warden/whitelist.db"),
            strategy: SyncStrategy::ConfigPatch,
            jail_config: None,
            anchor: None,
            annotate: true,
            activation: ActivationMode::Restart,
            activation_timeout_secs: 60,
            lock_file: None,
            script: ScriptConfig::default(),
        }
    }
}

impl WhitelistConfig {
    pub fn jail_config_path(&self, jail: &str) -> PathBuf {
        self.jail_config
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("/etc/fail2ban/jail.d/{}.conf", jail)))
    }

    pub fn anchor_line(&self, jail: &str) -> String {
        self.anchor.clone().unwrap_or_else(|| format!("[{}]", jail))
    }

    pub fn activation_timeout(&self) -> Duration {
        Duration::from_secs(self.activation_timeout_secs)
    }

    /// Lock serializing syncs across processes. Without `lock_file`, config-patch locks a hidden
    /// file beside the jail config it rewrites and the script strategy locks one beside the
    /// database.
    pub fn sync_lock_path(&self, jail: &str) -> PathBuf {
        if let Some(path) = &self.lock_file {
            return path.clone();
        }
        match self.strategy {
            SyncStrategy::ConfigPatch => {
                let target = self.jail_config_path(jail);
                let name = target
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| format!("{}.conf", jail));
                target.with_file_name(format!(".{}.f2b-warden.lock", name))
            }
            SyncStrategy::Script => self.database.with_extension("sync.lock"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScriptConfig {
    pub path: Option<PathBuf>,
    pub search_paths: Vec<PathBuf>,
    pub timeout_secs: u64,
    /// `DB_NAME` is always the whitelist database path; only the credentials are configurable.
    pub db_user: String,
    pub db_pass: String,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            path: None,
            search_paths: vec![
                PathBuf::from("/home/ubuntu/pbx3sbc/scripts/sync-fail2ban-whitelist.sh"),
                PathBuf::from("/opt/pbx3sbc/scripts/sync-fail2ban-whitelist.sh"),
                PathBuf::from("/usr/local/pbx3sbc/scripts/sync-fail2ban-whitelist.sh"),
            ],
            timeout_secs: 60,
            db_user: String::new(),
            db_pass: String::new(),
        }
    }
}

impl ScriptConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: Some(PathBuf::from("/var/log/f2b-warden/warden.log")),
        }
    }
}

impl WardenConfig {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let cfg: WardenConfig = toml::from_str(input).context("Failed to parse warden TOML")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Resolve the config path (`--config`, then `F2B_WARDEN_CONFIG`, then the default path)
    /// and load it. A missing file at the default location yields built-in defaults.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        if let Some(path) = std::env::var_os(CONFIG_PATH_ENV) {
            return Self::load(Path::new(&path));
        }
        let default = Path::new(DEFAULT_CONFIG_PATH);
        if default.exists() {
            return Self::load(default);
        }
        log::debug!("no config at {}, using defaults", DEFAULT_CONFIG_PATH);
        let cfg = Self::default();
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        let name = self.jail.name.as_str();
        if name.is_empty() {
            return Err(WardenError::Config("jail.name must not be empty".into()).into());
        }
        if name.contains(|c: char| c.is_whitespace() || c == '/') {
            return Err(WardenError::Config(format!(
                "jail.name {:?} must not contain whitespace or '/'",
                name
            ))
            .into());
        }
        let timeouts = [
            ("jail.status_timeout_secs", self.jail.status_timeout_secs),
            ("jail.command_timeout_secs", self.jail.command_timeout_secs),
            (
                "whitelist.activation_timeout_secs",
                self.whitelist.activation_timeout_secs,
            ),
            ("whitelist.script.timeout_secs", self.whitelist.script.timeout_secs),
        ];
        for (key, secs) in timeouts {
            if secs == 0 {
                return Err(WardenError::Config(format!("{} must be > 0", key)).into());
            }
        }
        Ok(())
    }

    /// Jail config path after applying the per-jail default.
    pub fn jail_config_path(&self) -> PathBuf {
        self.whitelist.jail_config_path(&self.jail.name)
    }

    /// Sync script override: env `FAIL2BAN_SYNC_SCRIPT_PATH` beats `whitelist.script.path`.
    pub fn script_override(&self) -> Option<PathBuf> {
        std::env::var_os(SCRIPT_PATH_ENV)
            .map(PathBuf::from)
            .or_else(|| self.whitelist.script.path.clone())
    }
}

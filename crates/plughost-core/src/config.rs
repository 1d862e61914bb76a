use std::collections::BTreeMap;
use std::path::PathBuf;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

pub const DEFAULT_CONFIG_FILE: &str = "plughost.toml";
pub const CONFIG_PATH_ENV: &str = "PLUGHOST_CONFIG";
pub const ENV_PREFIX: &str = "PLUGHOST_";
pub const DEFAULT_HOST_NAME: &str = "plughost";

/// Top-level config (plughost.toml + PLUGHOST_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlugHostConfig {
    #[serde(default)]
    pub host: HostConfig,
    #[serde(default)]
    pub modules: ModulesConfig,
    /// Worker entries keyed by their config table name. Kept sorted so the
    /// orchestrator processes them in a stable order.
    #[serde(default)]
    pub workers: BTreeMap<String, WorkerConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    #[serde(default = "default_host_name")]
    pub name: String,
    /// Directory that relative module paths resolve against.
    /// Defaults to the process working directory.
    #[serde(default)]
    pub base_dir: Option<String>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            name: default_host_name(),
            base_dir: None,
        }
    }
}

impl HostConfig {
    pub fn base_dir(&self) -> PathBuf {
        match &self.base_dir {
            Some(dir) => PathBuf::from(dir),
            None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModulesConfig {
    /// Extra module roots, searched before the worker module directories.
    #[serde(default)]
    pub roots: Vec<String>,
}

/// One `[workers.<key>]` table.
///
/// Every field is optional here; required fields are checked when the entry
/// is turned into a worker descriptor, so a single bad entry can be reported
/// without rejecting the whole file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    /// Raw schedule table, read as a [`ScheduleConfig`] by
    /// [`schedule_config`](Self::schedule_config).
    #[serde(default)]
    pub schedule: Option<serde_json::Value>,
    #[serde(default)]
    pub module_path: Option<String>,
    #[serde(default)]
    pub module_version: Option<String>,
    #[serde(default)]
    pub factory_type: Option<String>,
    #[serde(default)]
    pub service_injector_type: Option<String>,
    /// Free-form table handed to the worker's injector and factory.
    #[serde(default)]
    pub settings: serde_json::Map<String, serde_json::Value>,
}

impl WorkerConfig {
    /// The typed schedule, `None` when the entry has no `schedule` key.
    pub fn schedule_config(&self) -> Result<Option<ScheduleConfig>> {
        self.schedule
            .clone()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| CoreError::Config(format!("invalid schedule: {e}")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScheduleConfig {
    #[serde(alias = "OneShot", alias = "oneshot")]
    OneShot,
    #[serde(alias = "Recurring")]
    Recurring {
        #[serde(default)]
        interval_ms: Option<u64>,
        /// RFC 3339 timestamp; the first due instant and the interval anchor.
        #[serde(default)]
        start: Option<String>,
        /// RFC 3339 timestamp after which the schedule completes.
        #[serde(default)]
        stop: Option<String>,
    },
}

/// Identity of the running host, registered as a service so modules can
/// read it while building their workers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostInfo {
    pub name: String,
    pub base_dir: PathBuf,
}

impl HostInfo {
    pub fn from_config(config: &HostConfig) -> Self {
        Self {
            name: config.name.clone(),
            base_dir: config.base_dir(),
        }
    }
}

impl PlugHostConfig {
    /// Load config from the TOML file (if present) merged with env vars.
    ///
    /// Path precedence: `config_path` argument, then `PLUGHOST_CONFIG`,
    /// then `./plughost.toml`. A missing file is not an error; the env
    /// layer and defaults still apply.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed(ENV_PREFIX).ignore(&["CONFIG"]).split("__"))
            .extract()
            .map_err(|e| CoreError::Config(e.to_string()))
    }

    /// Parse config from an in-memory TOML document, without env overrides.
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        Figment::new()
            .merge(Toml::string(toml))
            .extract()
            .map_err(|e| CoreError::Config(e.to_string()))
    }
}

fn default_config_path() -> String {
    std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string())
}

fn default_host_name() -> String {
    DEFAULT_HOST_NAME.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
        [host]
        name = "sample-service"
        base_dir = "/srv/sample"

        [modules]
        roots = ["plugins", "/opt/shared"]

        [workers.ping]
        id = "5f0c7a9e-2d7b-4a8e-9a51-0d7a4c1e9b11"
        name = "Ping worker"
        schedule = { type = "recurring", interval_ms = 1000 }
        module_path = "plugins/samples.module.toml"
        module_version = "1.0.0"
        factory_type = "samples::PingWorkerFactory"
        service_injector_type = "samples::PingServiceInjector"

        [workers.ping.settings]
        retry_count = 3

        [workers.once]
        name = "Once"
        schedule = { type = "one_shot" }
    "#;

    #[test]
    fn parses_full_document() {
        let config = PlugHostConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.host.name, "sample-service");
        assert_eq!(config.host.base_dir(), PathBuf::from("/srv/sample"));
        assert_eq!(config.modules.roots, vec!["plugins", "/opt/shared"]);

        let ping = &config.workers["ping"];
        assert_eq!(
            ping.schedule_config().unwrap(),
            Some(ScheduleConfig::Recurring {
                interval_ms: Some(1000),
                start: None,
                stop: None,
            })
        );
        assert_eq!(ping.module_version.as_deref(), Some("1.0.0"));
        assert_eq!(ping.settings["retry_count"], serde_json::json!(3));

        assert_eq!(
            config.workers["once"].schedule_config().unwrap(),
            Some(ScheduleConfig::OneShot)
        );
    }

    #[test]
    fn workers_iterate_in_key_order() {
        let config = PlugHostConfig::from_toml_str(SAMPLE).unwrap();
        let keys: Vec<_> = config.workers.keys().cloned().collect();
        assert_eq!(keys, vec!["once", "ping"]);
    }

    #[test]
    fn empty_document_uses_defaults() {
        let config = PlugHostConfig::from_toml_str("").unwrap();
        assert_eq!(config.host.name, DEFAULT_HOST_NAME);
        assert!(config.modules.roots.is_empty());
        assert!(config.workers.is_empty());
    }

    #[test]
    fn accepts_pascal_case_schedule_tags() {
        let config = PlugHostConfig::from_toml_str(
            r#"
            [workers.a]
            schedule = { type = "OneShot" }
            [workers.b]
            schedule = { type = "Recurring", interval_ms = 5 }
            "#,
        )
        .unwrap();
        assert_eq!(
            config.workers["a"].schedule_config().unwrap(),
            Some(ScheduleConfig::OneShot)
        );
        assert!(matches!(
            config.workers["b"].schedule_config().unwrap(),
            Some(ScheduleConfig::Recurring { interval_ms: Some(5), .. })
        ));
    }

    #[test]
    fn bad_schedule_fails_only_its_own_entry() {
        let config = PlugHostConfig::from_toml_str(
            r#"
            [workers.good]
            schedule = { type = "one_shot" }
            [workers.typo]
            schedule = { type = "hourly" }
            [workers.quoted]
            schedule = { type = "recurring", interval_ms = "100" }
            "#,
        )
        .unwrap();
        assert_eq!(config.workers.len(), 3);
        assert_eq!(
            config.workers["good"].schedule_config().unwrap(),
            Some(ScheduleConfig::OneShot)
        );

        for key in ["typo", "quoted"] {
            let err = config.workers[key].schedule_config().unwrap_err();
            assert_eq!(err.code(), "CONFIG_ERROR");
            assert!(err.to_string().contains("invalid schedule"), "{key}: {err}");
        }
    }

    #[test]
    fn missing_schedule_is_none() {
        let config = PlugHostConfig::from_toml_str("[workers.a]\nname = \"A\"\n").unwrap();
        assert_eq!(config.workers["a"].schedule_config().unwrap(), None);
    }

    #[test]
    fn load_reads_file_from_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = PlugHostConfig::load(file.path().to_str()).unwrap();
        assert_eq!(config.workers.len(), 2);
    }

    #[test]
    fn host_info_mirrors_host_section() {
        let config = PlugHostConfig::from_toml_str(SAMPLE).unwrap();
        let info = HostInfo::from_config(&config.host);
        assert_eq!(info.name, "sample-service");
        assert_eq!(info.base_dir, PathBuf::from("/srv/sample"));
    }
}

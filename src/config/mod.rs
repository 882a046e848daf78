use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use crate::pomodoro::TimerDurations;

pub mod themes;

const APP_DOMAIN: &str = "io";
const APP_ORG: &str = "Notey";
const APP_NAME: &str = "notey";
const CONFIG_FILE_NAME: &str = "config.toml";

pub const DEFAULT_RECORD_NAME: &str = "notey-storage";
pub const DEFAULT_NOTE_EXTENSION: &str = "ntfy";

pub struct ConfigLoader {
    paths: ConfigPaths,
}

impl ConfigLoader {
    pub fn discover() -> Result<Self> {
        let paths = ConfigPaths::discover()?;
        Ok(Self { paths })
    }

    pub fn with_paths(paths: ConfigPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &ConfigPaths {
        &self.paths
    }

    /// Reads the config file, writing a commented default first if none exists.
    pub fn load_or_init(&self) -> Result<AppConfig> {
        self.paths.ensure_directories()?;
        if self.paths.config_file.exists() {
            return self.load();
        }
        let mut config = AppConfig::default();
        config.post_load(&self.paths)?;
        self.persist_defaults(&config)?;
        tracing::info!(path = %self.paths.config_file.display(), "wrote default config");
        Ok(config)
    }

    pub fn load(&self) -> Result<AppConfig> {
        let path = &self.paths.config_file;
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let mut config: AppConfig = toml::from_str(&raw)
            .with_context(|| format!("{} is not a valid notey config", path.display()))?;
        config.post_load(&self.paths)?;
        Ok(config)
    }

    fn persist_defaults(&self, config: &AppConfig) -> Result<()> {
        let body = toml::to_string_pretty(config).context("rendering default config")?;
        let path = &self.paths.config_file;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        let mut file =
            fs::File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
        writeln!(file, "# notey configuration; delete this file to regenerate it")
            .and_then(|_| file.write_all(body.as_bytes()))
            .with_context(|| format!("failed to write {}", path.display()))
    }
}

#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub config_dir: PathBuf,
    pub config_file: PathBuf,
    pub data_dir: PathBuf,
    pub database_path: PathBuf,
    pub export_dir: PathBuf,
}

impl ConfigPaths {
    /// Platform directories, overridden by `NOTEY_CONFIG` (a file or a
    /// directory) and `NOTEY_DATA`.
    pub fn discover() -> Result<Self> {
        let dirs = ProjectDirs::from(APP_DOMAIN, APP_ORG, APP_NAME)
            .context("no home directory to place notey files in")?;

        let (config_dir, config_file) = match env::var_os("NOTEY_CONFIG").map(PathBuf::from) {
            Some(path) if path.is_dir() => {
                let file = path.join(CONFIG_FILE_NAME);
                (path, file)
            }
            Some(path) => {
                let dir = path
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| PathBuf::from("."));
                (dir, path)
            }
            None => {
                let dir = dirs.config_dir().to_path_buf();
                let file = dir.join(CONFIG_FILE_NAME);
                (dir, file)
            }
        };

        let data_dir = env::var_os("NOTEY_DATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| dirs.data_dir().to_path_buf());
        Ok(Self::rooted(config_dir, config_file, data_dir))
    }

    /// Lays out every derived path under the given config and data roots.
    pub fn rooted(config_dir: PathBuf, config_file: PathBuf, data_dir: PathBuf) -> Self {
        let database_path = data_dir.join("notey.db");
        let export_dir = data_dir.join("exports");
        Self {
            config_dir,
            config_file,
            data_dir,
            database_path,
            export_dir,
        }
    }

    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [&self.config_dir, &self.data_dir, &self.export_dir] {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating application directory {}", dir.display()))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub autosave: AutoSaveConfig,
    pub pomodoro: PomodoroConfig,
    pub storage: StorageOptions,
    pub export: ExportOptions,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            autosave: AutoSaveConfig::default(),
            pomodoro: PomodoroConfig::default(),
            storage: StorageOptions::default(),
            export: ExportOptions::default(),
        }
    }
}

impl AppConfig {
    fn post_load(&mut self, paths: &ConfigPaths) -> Result<()> {
        self.storage
            .resolve(paths)
            .context("resolving storage paths")?;
        self.pomodoro.sanitize();
        if self.storage.record_name.trim().is_empty() {
            tracing::warn!("empty storage.record_name in config, using default");
            self.storage.record_name = DEFAULT_RECORD_NAME.to_string();
        }
        let extension = self.export.extension.trim().trim_start_matches('.');
        if extension.is_empty() {
            tracing::warn!("empty export.extension in config, using default");
            self.export.extension = DEFAULT_NOTE_EXTENSION.to_string();
        } else {
            self.export.extension = extension.to_string();
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoSaveConfig {
    /// Quiet period after the last edit before the coalesced write happens
    pub debounce_ms: u64,
}

impl Default for AutoSaveConfig {
    fn default() -> Self {
        Self { debounce_ms: 1000 }
    }
}

impl AutoSaveConfig {
    pub fn debounce_duration(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PomodoroConfig {
    pub work_minutes: u32,
    pub short_minutes: u32,
    pub long_minutes: u32,
    /// How often the terminal countdown polls the ticker
    pub tick_ms: u64,
}

impl Default for PomodoroConfig {
    fn default() -> Self {
        let durations = TimerDurations::default();
        Self {
            work_minutes: durations.work,
            short_minutes: durations.short,
            long_minutes: durations.long,
            tick_ms: 250,
        }
    }
}

impl PomodoroConfig {
    pub fn durations(&self) -> TimerDurations {
        TimerDurations {
            work: self.work_minutes,
            short: self.short_minutes,
            long: self.long_minutes,
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(10))
    }

    fn sanitize(&mut self) {
        let defaults = TimerDurations::default();
        for (value, fallback, name) in [
            (&mut self.work_minutes, defaults.work, "work_minutes"),
            (&mut self.short_minutes, defaults.short, "short_minutes"),
            (&mut self.long_minutes, defaults.long, "long_minutes"),
        ] {
            if *value == 0 {
                tracing::warn!(field = name, "non-positive pomodoro duration in config, using default");
                *value = fallback;
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageOptions {
    #[serde(skip)]
    pub database_path: PathBuf,
    /// Name of the single durable record holding the state snapshot
    pub record_name: String,
    pub wal_autocheckpoint: u32,
    pub busy_timeout_ms: u64,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            database_path: PathBuf::new(),
            record_name: DEFAULT_RECORD_NAME.to_string(),
            wal_autocheckpoint: 1000,
            busy_timeout_ms: 2000,
        }
    }
}

impl StorageOptions {
    fn resolve(&mut self, paths: &ConfigPaths) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            self.database_path = paths.database_path.clone();
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    /// File extension used for note entries inside export archives
    pub extension: String,
    pub archive_name: String,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            extension: DEFAULT_NOTE_EXTENSION.to_string(),
            archive_name: "notes.zip".to_string(),
        }
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    std::hash::Hash,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum ThemeName {
    Light,
    Dark,
    Nord,
    Dracula,
    Monokai,
    Solarized,
}

impl Default for ThemeName {
    fn default() -> Self {
        ThemeName::Light
    }
}

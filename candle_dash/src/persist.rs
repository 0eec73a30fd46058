use crate::feed::DataSourceKind;
use crate::scheduler::SchedulerConfig;
use crate::timeframe::Timeframe;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

/// Bump when you change config schema.
const CONFIG_VERSION: u32 = 1;

pub const BASE_URL_ENV: &str = "CANDLE_DASH_BASE_URL";
pub const SOURCE_ENV: &str = "CANDLE_DASH_SOURCE";
pub const BOT_ID_ENV: &str = "CANDLE_DASH_BOT_ID";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub version: u32,

    // --- backend ---
    pub base_url: String,
    pub data_source: DataSourceKind,
    pub request_timeout_ms: u64,

    // --- selection ---
    pub symbol: String,
    pub timeframe: Timeframe,
    pub candle_limit: u32,
    pub bot_id: Option<String>,

    // polling
    pub historical_interval_ms: u64,
    pub realtime_interval_ms: u64,
    pub signal_interval_ms: u64,
    pub realtime_on_start: bool,

    // realtime health
    pub not_ready_log_threshold: u32,
    pub error_ceiling_multiplier: u32,

    // markers
    pub clear_markers_on_bot_change: bool,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,

            base_url: "http://127.0.0.1:5000".to_string(),
            data_source: DataSourceKind::TwelveData,
            request_timeout_ms: 10_000,

            symbol: "EURUSD".to_string(),
            timeframe: Timeframe::M5,
            candle_limit: 40,
            bot_id: None,

            historical_interval_ms: 2_000,
            realtime_interval_ms: 1_000,
            signal_interval_ms: 3_000,
            realtime_on_start: false,

            not_ready_log_threshold: 5,
            error_ceiling_multiplier: 3,

            clear_markers_on_bot_change: false,
        }
    }
}

impl DashboardConfig {
    /// Environment wins over the file. Bad values are logged and ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(BASE_URL_ENV) {
            let url = url.trim();
            if !url.is_empty() {
                self.base_url = url.to_string();
            }
        }
        if let Ok(src) = std::env::var(SOURCE_ENV) {
            match src.parse::<DataSourceKind>() {
                Ok(kind) => self.data_source = kind,
                Err(err) => tracing::warn!("{SOURCE_ENV} ignored: {err}"),
            }
        }
        if let Ok(bot) = std::env::var(BOT_ID_ENV) {
            let bot = bot.trim();
            self.bot_id = match bot {
                "" | "off" | "none" => None,
                id => Some(id.to_string()),
            };
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms.max(1))
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            historical_interval: Duration::from_millis(self.historical_interval_ms.max(1)),
            realtime_interval: Duration::from_millis(self.realtime_interval_ms.max(1)),
            signal_interval: Duration::from_millis(self.signal_interval_ms.max(1)),
            not_ready_log_threshold: self.not_ready_log_threshold.max(1),
            error_ceiling_multiplier: self.error_ceiling_multiplier.max(1),
            clear_markers_on_bot_change: self.clear_markers_on_bot_change,
            candle_limit: self.candle_limit.max(1),
        }
    }
}

struct Inner {
    path: PathBuf,
    last_saved_json: Mutex<String>,
}

#[derive(Clone)]
pub struct Persistence {
    inner: Arc<Inner>,
}

impl Persistence {
    pub fn new() -> Result<Self> {
        Ok(Self::with_path(default_config_path()?))
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(Inner {
                path: path.into(),
                last_saved_json: Mutex::new(String::new()),
            }),
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.inner.path
    }

    /// Missing file -> defaults. Unreadable file -> archived, then defaults.
    pub fn load(&self) -> DashboardConfig {
        if !self.inner.path.exists() {
            return DashboardConfig::default();
        }
        match read_json::<DashboardConfig>(&self.inner.path) {
            Ok(mut cfg) => {
                // simple migration hook
                if cfg.version == 0 {
                    cfg.version = CONFIG_VERSION;
                }
                cfg
            }
            Err(err) => {
                archive_corrupt(&self.inner.path, &err);
                DashboardConfig::default()
            }
        }
    }

    /// Save if content changed (prevents hammering disk)
    pub fn save_now(&self, cfg: &DashboardConfig) -> Result<()> {
        let path = &self.inner.path;

        let parent = path.parent().context("config path has no parent")?;
        fs::create_dir_all(parent).with_context(|| format!("create config dir {:?}", parent))?;

        let json = serde_json::to_string_pretty(cfg)?;

        {
            let mut last = self
                .inner
                .last_saved_json
                .lock()
                .map_err(|_| anyhow::anyhow!("config save lock poisoned"))?;
            if *last == json {
                return Ok(());
            }
            *last = json.clone();
        }

        // backup previous
        if path.exists() {
            let backup = path.with_extension("json.bak");
            let _ = fs::copy(path, backup);
        }

        atomic_write(path, json.as_bytes())?;
        Ok(())
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "candle_dash", "candle_dash")
}

fn default_config_path() -> Result<PathBuf> {
    let proj = project_dirs().context("ProjectDirs::from returned None")?;
    Ok(proj.config_dir().join("config.json"))
}

/// Where the debug hook log goes.
pub fn data_dir() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("data"))
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let bytes = fs::read(path).with_context(|| format!("read {:?}", path))?;
    let value = serde_json::from_slice::<T>(&bytes).with_context(|| "parse json")?;
    Ok(value)
}

fn archive_corrupt(path: &Path, err: &anyhow::Error) {
    if !path.exists() {
        return;
    }
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let archived = path.with_extension(format!("corrupt.{ts}.json"));
    let _ = fs::rename(path, &archived);
    tracing::warn!("config corrupt; archived to {:?}. error: {err:?}", archived);
}

fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path.parent().context("no parent dir for config path")?;
    let tmp = dir.join(format!(
        ".{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy()
    ));

    {
        let mut f = fs::File::create(&tmp).with_context(|| format!("create tmp {:?}", tmp))?;
        f.write_all(bytes).with_context(|| "write tmp")?;
        let _ = f.sync_all();
    }

    fs::rename(&tmp, path).with_context(|| format!("rename {:?} -> {:?}", tmp, path))?;
    Ok(())
}

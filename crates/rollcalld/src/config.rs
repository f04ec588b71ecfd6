use anyhow::{bail, Context, Result};
use rollcall_core::{FallbackPolicy, Settings};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG_PATH: &str = "/etc/rollcall/rollcalld.toml";

/// Daemon configuration: defaults, then an optional TOML file, then `ROLLCALL_*` variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Directory holding the store and the journal unless their paths are set.
    pub data_dir: PathBuf,
    /// Path to the embedding store JSON file.
    pub store_path: PathBuf,
    /// JSON-lines attendance journal, used when no ledger URL is set.
    pub journal_path: PathBuf,
    /// Base URL of the attendance ledger service. `None` selects the journal.
    pub ledger_url: Option<String>,
    pub ledger_timeout_secs: u64,
    /// Cosine similarity threshold for a positive match.
    pub similarity_threshold: f32,
    /// Matched frames required before presence is confirmed.
    pub presence_frames: usize,
    /// Detection score an enrollment sample must exceed.
    pub quality_threshold: f32,
    pub fallback_policy: FallbackPolicy,
    /// Serve on the session bus instead of the system bus.
    pub session_bus: bool,
}

/// On-disk form. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    data_dir: Option<PathBuf>,
    store_path: Option<PathBuf>,
    journal_path: Option<PathBuf>,
    ledger_url: Option<String>,
    ledger_timeout_secs: Option<u64>,
    similarity_threshold: Option<f32>,
    presence_frames: Option<usize>,
    quality_threshold: Option<f32>,
    fallback_strategies: Option<String>,
    session_bus: Option<bool>,
}

impl Config {
    /// Load from the process environment.
    pub fn load() -> Result<Self> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Load with an injectable variable lookup.
    pub fn load_with(env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let explicit = env("ROLLCALL_CONFIG").map(PathBuf::from);
        let file = match &explicit {
            Some(path) => Some(read_file(path)?),
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Some(read_file(Path::new(DEFAULT_CONFIG_PATH))?)
            }
            None => None,
        }
        .unwrap_or_default();

        let data_dir = env("ROLLCALL_DATA_DIR")
            .map(PathBuf::from)
            .or(file.data_dir)
            .unwrap_or_else(|| default_data_dir(&env));

        let store_path = env("ROLLCALL_STORE_PATH")
            .map(PathBuf::from)
            .or(file.store_path)
            .unwrap_or_else(|| data_dir.join("identities.json"));
        let journal_path = env("ROLLCALL_JOURNAL_PATH")
            .map(PathBuf::from)
            .or(file.journal_path)
            .unwrap_or_else(|| data_dir.join("attendance.jsonl"));

        let ledger_url = env("ROLLCALL_LEDGER_URL")
            .or(file.ledger_url)
            .map(|u| u.trim().trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty());

        let strategies = env("ROLLCALL_FALLBACK_STRATEGIES")
            .or(file.fallback_strategies)
            .unwrap_or_else(|| "classifier,correlation,lenient".to_string());
        let fallback_policy = FallbackPolicy::parse(&strategies)
            .with_context(|| format!("invalid fallback_strategies {strategies:?}"))?;

        let config = Self {
            data_dir,
            store_path,
            journal_path,
            ledger_url,
            ledger_timeout_secs: env_parse(&env, "ROLLCALL_LEDGER_TIMEOUT_SECS")?
                .or(file.ledger_timeout_secs)
                .unwrap_or(5),
            similarity_threshold: env_parse(&env, "ROLLCALL_SIMILARITY_THRESHOLD")?
                .or(file.similarity_threshold)
                .unwrap_or(0.40),
            presence_frames: env_parse(&env, "ROLLCALL_PRESENCE_FRAMES")?
                .or(file.presence_frames)
                .unwrap_or(3),
            quality_threshold: env_parse(&env, "ROLLCALL_QUALITY_THRESHOLD")?
                .or(file.quality_threshold)
                .unwrap_or(0.5),
            fallback_policy,
            session_bus: env("ROLLCALL_SESSION_BUS")
                .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
                .or(file.session_bus)
                .unwrap_or(false),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn settings(&self) -> Settings {
        Settings {
            similarity_threshold: self.similarity_threshold,
            presence_frames: self.presence_frames,
        }
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            bail!("similarity_threshold must be within [0, 1], got {}", self.similarity_threshold);
        }
        if !(0.0..=1.0).contains(&self.quality_threshold) {
            bail!("quality_threshold must be within [0, 1], got {}", self.quality_threshold);
        }
        if self.presence_frames == 0 {
            bail!("presence_frames must be greater than zero");
        }
        if self.ledger_timeout_secs == 0 {
            bail!("ledger_timeout_secs must be greater than zero");
        }
        if let Some(url) = &self.ledger_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                bail!("ledger_url must be an http(s) URL, got {url:?}");
            }
        }
        Ok(())
    }
}

fn read_file(path: &Path) -> Result<FileConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parsing config file {}", path.display()))
}

fn default_data_dir(env: &impl Fn(&str) -> Option<String>) -> PathBuf {
    env("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            let home = env("HOME").unwrap_or_else(|| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("rollcall")
}

fn env_parse<T>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    env(key)
        .map(|v| {
            v.trim()
                .parse()
                .map_err(|e| anyhow::anyhow!("{key}={v:?} is invalid: {e}"))
        })
        .transpose()
}

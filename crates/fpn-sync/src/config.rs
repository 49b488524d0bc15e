//! Immutable runtime configuration, assembled once at startup.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use fpn_adapters::feed::DEFAULT_FEED_ENDPOINT;
use fpn_adapters::messenger::DEFAULT_TELEGRAM_API_BASE;
use fpn_adapters::FeedQuery;
use serde::Deserialize;

use crate::filter::QualificationFilter;
use crate::format::{NotificationFormatter, MAX_MESSAGE_CHARS};

pub const DEFAULT_SKILL_IDS: &[u32] = &[
    3, 9, 13, 30, 31, 36, 51, 72, 95, 116, 152, 158, 199, 215, 292, 301, 305, 323, 335, 355, 420,
    454, 500, 564, 598, 619, 728, 741, 759, 775, 901, 913, 962, 1002, 1031, 1040, 1041, 1051, 1075,
    1087, 1088, 1092, 1093, 1097, 1112, 1239, 1240, 1254, 1277, 1623, 1679, 1684, 1685, 1709, 1827,
];

pub const DEFAULT_DATABASE_URL: &str = "sqlite://fpn.sqlite?mode=rwc";
pub const DEFAULT_CONFIG_FILE: &str = "fpn.yaml";

/// Deployment constants. Optional YAML file; anything omitted keeps its default.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub feed_endpoint: String,
    pub skill_ids: Vec<u32>,
    pub languages: Vec<String>,
    pub limit: u32,
    pub min_avg_price: u32,
    pub max_skills: usize,
    pub excluded_currency: String,
    pub project_url_base: String,
    pub user_url_base: String,
    pub cycle_delay_secs: u64,
    pub message_delay_ms: u64,
    pub http_timeout_secs: u64,
    pub store_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            feed_endpoint: DEFAULT_FEED_ENDPOINT.to_string(),
            skill_ids: DEFAULT_SKILL_IDS.to_vec(),
            languages: vec!["en".to_string(), "hi".to_string()],
            limit: 300,
            min_avg_price: 500,
            max_skills: 3,
            excluded_currency: "INR".to_string(),
            project_url_base: "https://freelancer.com/projects".to_string(),
            user_url_base: "https://freelancer.com/u".to_string(),
            cycle_delay_secs: 60,
            message_delay_ms: 2_000,
            http_timeout_secs: 20,
            store_timeout_secs: 10,
            user_agent: "fpn-bot/0.1".to_string(),
        }
    }
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }
}

#[derive(Clone)]
pub struct SyncConfig {
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
    pub database_url: String,
    pub telegram_api_base: String,
    pub user_agent: String,
    pub feed: FeedQuery,
    pub filter: QualificationFilter,
    pub formatter: NotificationFormatter,
    pub cycle_delay: Duration,
    pub message_delay: Duration,
    pub http_timeout: Duration,
    pub store_timeout: Duration,
}

impl fmt::Debug for SyncConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncConfig")
            .field("bot_token", &self.bot_token.as_deref().map(redact))
            .field("chat_id", &self.chat_id)
            .field("database_url", &redact_url(&self.database_url))
            .field("telegram_api_base", &self.telegram_api_base)
            .field("feed", &self.feed)
            .field("filter", &self.filter)
            .field("cycle_delay", &self.cycle_delay)
            .field("message_delay", &self.message_delay)
            .field("http_timeout", &self.http_timeout)
            .field("store_timeout", &self.store_timeout)
            .finish_non_exhaustive()
    }
}

impl SyncConfig {
    /// Load `.env.local` then `.env` (neither overrides the real environment), the optional
    /// YAML file, then environment overrides.
    pub fn from_env() -> Result<Self> {
        load_dotenv(Path::new("."))?;

        let file = match std::env::var("FPN_CONFIG") {
            Ok(path) => FileConfig::load(Path::new(&path))?,
            Err(_) => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    FileConfig::load(&default_path)?
                } else {
                    FileConfig::default()
                }
            }
        };

        Self::resolve(file, |key| std::env::var(key).ok())
    }

    pub fn resolve(file: FileConfig, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let non_empty = |key: &str| env(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let max_skills = parse_or(&env, "SKILLS_MAX", file.max_skills)?;
        let min_avg_price = parse_or(&env, "FPN_MIN_AVG_PRICE", file.min_avg_price)?;
        let limit = parse_or(&env, "FPN_LIMIT", file.limit)?;
        let cycle_delay_secs = parse_or(&env, "FPN_CYCLE_DELAY_SECS", file.cycle_delay_secs)?;
        let message_delay_ms = parse_or(&env, "FPN_MESSAGE_DELAY_MS", file.message_delay_ms)?;
        let http_timeout_secs = parse_or(&env, "FPN_HTTP_TIMEOUT_SECS", file.http_timeout_secs)?;
        let store_timeout_secs = parse_or(&env, "FPN_STORE_TIMEOUT_SECS", file.store_timeout_secs)?;

        if http_timeout_secs == 0 || store_timeout_secs == 0 {
            bail!("network and store timeouts must be non-zero");
        }
        if cycle_delay_secs.saturating_mul(1_000) <= message_delay_ms {
            bail!(
                "FPN_CYCLE_DELAY_SECS ({cycle_delay_secs}s) must be longer than \
                 FPN_MESSAGE_DELAY_MS ({message_delay_ms}ms)"
            );
        }

        Ok(Self {
            bot_token: non_empty("BOT_TOKEN"),
            chat_id: non_empty("CHAT_ID"),
            database_url: non_empty("DATABASE_URL")
                .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            telegram_api_base: non_empty("TELEGRAM_API_BASE")
                .unwrap_or_else(|| DEFAULT_TELEGRAM_API_BASE.to_string()),
            user_agent: non_empty("FPN_USER_AGENT").unwrap_or(file.user_agent),
            feed: FeedQuery {
                endpoint: file.feed_endpoint,
                skill_ids: file.skill_ids,
                languages: file.languages,
                limit,
                min_avg_price,
            },
            filter: QualificationFilter {
                max_skills,
                excluded_currency: file.excluded_currency,
            },
            formatter: NotificationFormatter {
                project_url_base: file.project_url_base,
                user_url_base: file.user_url_base,
                max_chars: MAX_MESSAGE_CHARS,
            },
            cycle_delay: Duration::from_secs(cycle_delay_secs),
            message_delay: Duration::from_millis(message_delay_ms),
            http_timeout: Duration::from_secs(http_timeout_secs),
            store_timeout: Duration::from_secs(store_timeout_secs),
        })
    }

    /// Bot token and chat id, both required before anything is sent.
    pub fn credentials(&self) -> Result<(&str, &str)> {
        let token = self
            .bot_token
            .as_deref()
            .context("BOT_TOKEN is not set")?;
        let chat_id = self.chat_id.as_deref().context("CHAT_ID is not set")?;
        Ok((token, chat_id))
    }

    pub fn log_redacted(&self) {
        tracing::info!(
            bot_token = %self.bot_token.as_deref().map(redact).unwrap_or_else(|| "<not set>".into()),
            chat_id = %self.chat_id.as_deref().unwrap_or("<not set>"),
            database = %redact_url(&self.database_url),
            skills = self.feed.skill_ids.len(),
            limit = self.feed.limit,
            min_avg_price = self.feed.min_avg_price,
            max_skills = self.filter.max_skills,
            excluded_currency = %self.filter.excluded_currency,
            cycle_delay = ?self.cycle_delay,
            message_delay = ?self.message_delay,
            "config loaded"
        );
    }
}

fn load_dotenv(root: &Path) -> Result<()> {
    // dotenvy never overwrites a variable that is already set, so the
    // more specific file goes first.
    for name in [".env.local", ".env"] {
        let path = root.join(name);
        match dotenvy::from_path(&path) {
            Ok(()) => {}
            Err(dotenvy::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err).with_context(|| format!("loading {}", path.display())),
        }
    }
    Ok(())
}

fn parse_or<T>(env: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match env(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        Some(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid {key}={raw:?}: {e}")),
        None => Ok(default),
    }
}

fn redact(secret: &str) -> String {
    let n = secret.chars().take(5).collect::<String>();
    format!("{n}...({} chars)", secret.chars().count())
}

fn redact_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***{}", &url[..scheme_end], &url[at..])
        }
        _ => url.to_string(),
    }
}

use crate::registration::StepOrder;
use std::{path::PathBuf, time::Duration};
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),
    #[error("{name} has invalid value {value:?}: {reason}")]
    Invalid { name: &'static str, value: String, reason: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    pub store_path: PathBuf,
    /// Публичный адрес (со слешем на конце). Есть — webhook, нет — long polling.
    pub public_url: Option<Url>,
    pub port: u16,
    pub admin_ids: Vec<u64>,
    pub session_idle: Duration,
    pub inline_limit: usize,
    pub inline_cache_secs: u32,
    /// Запрет пересылки для фото и видео.
    pub protect_content: bool,
    pub order: StepOrder,
    pub allow_edit: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| get(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bot_token = var("BOT_TOKEN")
            .or_else(|| var("TELOXIDE_TOKEN"))
            .ok_or(ConfigError::Missing("BOT_TOKEN"))?;

        let public_url = match var("PUBLIC_URL").or_else(|| var("RENDER_EXTERNAL_URL")) {
            Some(raw) => Some(parse_base_url(&raw)?),
            None => None,
        };

        let admin_ids = match var("ADMIN_IDS") {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| s.parse::<u64>().map_err(|e| invalid("ADMIN_IDS", &raw, e)))
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };

        let order = match var("REGISTRATION_ORDER").as_deref() {
            None | Some("video-first") => StepOrder::VideoFirst,
            Some("poster-first") => StepOrder::PosterFirst,
            Some(other) => {
                return Err(invalid("REGISTRATION_ORDER", other, "expected video-first or poster-first"))
            }
        };

        let idle_minutes: u64 = parse_or(&var, "SESSION_IDLE_MINUTES", 30)?;
        let inline_limit: usize = parse_or(&var, "INLINE_RESULT_LIMIT", 10)?;

        Ok(Self {
            bot_token,
            store_path: var("STORE_PATH").unwrap_or_else(|| "anime_catalog.json".to_string()).into(),
            public_url,
            port: parse_or(&var, "PORT", 3000)?,
            admin_ids,
            session_idle: Duration::from_secs(idle_minutes.max(1) * 60),
            // Telegram принимает не больше 50 результатов
            inline_limit: inline_limit.clamp(1, 50),
            inline_cache_secs: parse_or(&var, "INLINE_CACHE_SECONDS", 10)?,
            protect_content: parse_or(&var, "PROTECT_CONTENT", true)?,
            order,
            allow_edit: parse_or(&var, "ALLOW_EDIT", true)?,
        })
    }

    /// Куда Telegram шлёт апдейты: `{public_url}webhook/{token}`.
    pub fn webhook_url(&self) -> Option<Url> {
        let base = self.public_url.as_ref()?;
        base.join(&format!("webhook/{}", self.bot_token)).ok()
    }
}

fn parse_or<T>(var: &impl Fn(&str) -> Option<String>, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match var(name) {
        Some(raw) => raw.parse().map_err(|e| invalid(name, &raw, e)),
        None => Ok(default),
    }
}

fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let with_slash = if raw.ends_with('/') { raw.to_string() } else { format!("{raw}/") };
    Url::parse(&with_slash).map_err(|e| invalid("PUBLIC_URL", raw, e))
}

fn invalid(name: &'static str, value: &str, reason: impl std::fmt::Display) -> ConfigError {
    ConfigError::Invalid { name, value: value.to_string(), reason: reason.to_string() }
}

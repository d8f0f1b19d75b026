use std::{collections::HashSet, net::SocketAddr, str::FromStr, time::Duration};

use thiserror::Error;
use url::Url;

use crate::{drainer::DrainSettings, parser::ParserSettings, upload::UploadSettings};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{key} has an invalid value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminSet(HashSet<u64>);

impl AdminSet {
    pub fn contains(&self, user_id: u64) -> bool {
        self.0.contains(&user_id)
    }
}

impl FromStr for AdminSet {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ids = s
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|part| !part.is_empty())
            .map(|part| part.parse::<u64>().map_err(|e| format!("'{}': {}", part, e)))
            .collect::<Result<HashSet<_>, _>>()?;

        if ids.is_empty() {
            return Err("no admin id given".to_owned());
        }
        Ok(Self(ids))
    }
}

#[derive(Debug, Clone)]
pub struct WebhookSettings {
    pub url: Url,
    pub addr: SocketAddr,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub token: String,
    pub admins: AdminSet,
    pub database_url: Option<String>,
    pub parser: ParserSettings,
    pub drain: DrainSettings,
    pub upload: UploadSettings,
    pub log_level: String,
    pub webhook: Option<WebhookSettings>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(&lookup);

        let token = env
            .first(&["BOT_TOKEN", "TELOXIDE_TOKEN"])
            .ok_or(ConfigError::Missing("BOT_TOKEN"))?;
        let admins = match env.first(&["ADMIN_ID", "ADMIN_IDS"]) {
            Some(raw) => raw.parse::<AdminSet>().map_err(|reason| ConfigError::Invalid {
                key: "ADMIN_ID",
                value: raw,
                reason,
            })?,
            None => return Err(ConfigError::Missing("ADMIN_ID")),
        };

        let parser_defaults = ParserSettings::default();
        let parser = ParserSettings {
            separator: env
                .get("BLOCK_SEPARATOR")
                .unwrap_or(parser_defaults.separator),
            max_question_len: env
                .parse("MAX_QUESTION_LENGTH")?
                .unwrap_or(parser_defaults.max_question_len),
            max_option_len: env
                .parse("MAX_OPTION_LENGTH")?
                .unwrap_or(parser_defaults.max_option_len),
            max_explanation_len: env
                .parse("MAX_EXPLANATION_LENGTH")?
                .unwrap_or(parser_defaults.max_explanation_len),
            max_options: env
                .parse("MAX_OPTIONS")?
                .unwrap_or(parser_defaults.max_options),
        };

        let drain_defaults = DrainSettings::default();
        let drain = DrainSettings {
            pause: env
                .seconds("SEND_DELAY_SECS")?
                .unwrap_or(drain_defaults.pause),
            long_pause_every: env
                .parse("LONG_PAUSE_EVERY")?
                .unwrap_or(drain_defaults.long_pause_every),
            long_pause: env
                .seconds("LONG_PAUSE_SECS")?
                .unwrap_or(drain_defaults.long_pause),
            max_per_run: env
                .parse::<usize>("MAX_SEND_PER_RUN")?
                .filter(|cap| *cap > 0),
            progress_every: env
                .parse("PROGRESS_EVERY")?
                .unwrap_or(drain_defaults.progress_every),
            anonymous: env
                .flag("QUIZ_ANONYMOUS")?
                .unwrap_or(drain_defaults.anonymous),
            poll_retention: env
                .parse("POLL_RETENTION")?
                .unwrap_or(drain_defaults.poll_retention),
        };

        let upload = match env.get("ALLOWED_EXTENSIONS") {
            Some(raw) => UploadSettings::from_list(&raw),
            None => UploadSettings::default(),
        };

        let webhook = match (env.get("WEBHOOK_URL"), env.get("WEBHOOK_ADDR")) {
            (Some(url), Some(addr)) => Some(WebhookSettings {
                url: parse_value("WEBHOOK_URL", url)?,
                addr: parse_value("WEBHOOK_ADDR", addr)?,
            }),
            _ => None,
        };

        Ok(Self {
            token,
            admins,
            database_url: env.get("DATABASE_URL"),
            parser,
            drain,
            upload,
            log_level: env.get("LOG_LEVEL").unwrap_or_else(|| "info".to_owned()),
            webhook,
        })
    }

    pub fn is_admin(&self, user_id: u64) -> bool {
        self.admins.contains(user_id)
    }
}

struct Env<'a, F>(&'a F);

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    /// Unset and blank values are treated the same.
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
    }

    fn first(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|key| self.get(key))
    }

    fn parse<T>(&self, key: &'static str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.get(key).map(|raw| parse_value(key, raw)).transpose()
    }

    fn seconds(&self, key: &'static str) -> Result<Option<Duration>, ConfigError> {
        match self.parse::<f64>(key)? {
            Some(secs) => Duration::try_from_secs_f64(secs)
                .map(Some)
                .map_err(|e| ConfigError::Invalid {
                    key,
                    value: secs.to_string(),
                    reason: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    fn flag(&self, key: &'static str) -> Result<Option<bool>, ConfigError> {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => match raw.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(Some(true)),
                "0" | "false" | "no" | "off" => Ok(Some(false)),
                _ => Err(ConfigError::Invalid {
                    key,
                    value: raw,
                    reason: "expected true or false".to_owned(),
                }),
            },
        }
    }
}

fn parse_value<T>(key: &'static str, raw: String) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>().map_err(|e| ConfigError::Invalid {
        key,
        reason: e.to_string(),
        value: raw,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn token_and_admin_are_required() {
        assert!(matches!(
            load(&[("ADMIN_ID", "1")]),
            Err(ConfigError::Missing("BOT_TOKEN"))
        ));
        assert!(matches!(
            load(&[("BOT_TOKEN", "t")]),
            Err(ConfigError::Missing("ADMIN_ID"))
        ));
        assert!(matches!(
            load(&[("BOT_TOKEN", "t"), ("ADMIN_ID", "  ")]),
            Err(ConfigError::Missing("ADMIN_ID"))
        ));
    }

    #[test]
    fn defaults_apply() {
        let config = load(&[("BOT_TOKEN", "t"), ("ADMIN_ID", "42")]).unwrap();

        assert!(config.is_admin(42));
        assert!(!config.is_admin(43));
        assert_eq!(config.database_url, None);
        assert_eq!(config.parser.separator, "---");
        assert_eq!(config.drain.pause, Duration::from_secs(3));
        assert_eq!(config.drain.max_per_run, None);
        assert!(config.drain.anonymous);
        assert!(config.upload.accepts("questions.TXT"));
        assert!(config.webhook.is_none());
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn admin_set_and_overrides() {
        let config = load(&[
            ("TELOXIDE_TOKEN", "t"),
            ("ADMIN_IDS", "1, 2 3"),
            ("QUIZ_ANONYMOUS", "no"),
            ("MAX_SEND_PER_RUN", "25"),
            ("SEND_DELAY_SECS", "2.5"),
            ("BLOCK_SEPARATOR", "==="),
            ("ALLOWED_EXTENSIONS", "txt, md"),
        ])
        .unwrap();

        assert_eq!(config.token, "t");
        assert!(config.is_admin(1) && config.is_admin(2) && config.is_admin(3));
        assert!(!config.drain.anonymous);
        assert_eq!(config.drain.max_per_run, Some(25));
        assert_eq!(config.drain.pause, Duration::from_millis(2500));
        assert_eq!(config.parser.separator, "===");
        assert!(config.upload.accepts("notes.md"));
    }

    #[test]
    fn zero_cap_means_unlimited() {
        let config = load(&[("BOT_TOKEN", "t"), ("ADMIN_ID", "1"), ("MAX_SEND_PER_RUN", "0")]).unwrap();
        assert_eq!(config.drain.max_per_run, None);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = load(&[("BOT_TOKEN", "t"), ("ADMIN_ID", "abc")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "ADMIN_ID", .. }));

        let err = load(&[("BOT_TOKEN", "t"), ("ADMIN_ID", "1"), ("SEND_DELAY_SECS", "-1")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "SEND_DELAY_SECS", .. }));

        let err = load(&[("BOT_TOKEN", "t"), ("ADMIN_ID", "1"), ("QUIZ_ANONYMOUS", "maybe")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "QUIZ_ANONYMOUS", .. }));
    }
}

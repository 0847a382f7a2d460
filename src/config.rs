//! Runtime configuration: defaults, then `spacecrawl.toml`, then the environment.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDate;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Deserializer};

use crate::portal::{AccountCategory, Credentials, Endpoints, PortalError};

/// Optional config file read from the working directory.
pub const CONFIG_FILE: &str = "spacecrawl.toml";

/// Environment variables read verbatim, in increasing precedence, with the
/// config key each one fills. `Env::raw()` would parse `0012345` as a number
/// and `[pw]` as an array, so these never go through it.
const VERBATIM_ENV: [(&str, &str); 6] = [
    ("YONSEI_ID", "account_id"),
    ("YONSEI_PW", "account_password"),
    ("YONSEI_GOPT", "account_category"),
    ("ACCOUNT_ID", "account_id"),
    ("ACCOUNT_PASSWORD", "account_password"),
    ("ACCOUNT_CATEGORY", "account_category"),
];

#[derive(Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_auth_url")]
    pub auth_url: String,
    #[serde(default, deserialize_with = "string_like")]
    pub account_id: String,
    #[serde(default, deserialize_with = "string_like")]
    pub account_password: String,
    #[serde(default = "default_account_category", deserialize_with = "string_like")]
    pub account_category: String,
    #[serde(default = "default_campuses", deserialize_with = "string_or_list")]
    pub campuses: Vec<String>,
    #[serde(default = "default_weeks")]
    pub weeks: u32,
    /// Anchor date (KST). `None` means today.
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default = "default_output_path")]
    pub output_path: PathBuf,
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
}

impl Config {
    pub fn load() -> Result<Self, figment::Error> {
        Self::figment().extract()
    }

    pub fn figment() -> Figment {
        let ignored = VERBATIM_ENV.map(|(name, _)| name);
        let mut figment = Figment::new()
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::raw().ignore(&ignored));

        for (name, key) in VERBATIM_ENV {
            if let Ok(value) = dotenvy::var(name) {
                figment = figment.merge(Serialized::default(key, value));
            }
        }
        figment
    }

    /// Fails before any network activity when the identifier or secret is blank.
    pub fn credentials(&self) -> Result<Credentials, PortalError> {
        Credentials::new(&self.account_id, &self.account_password)
    }

    pub fn category(&self) -> Result<AccountCategory, PortalError> {
        self.account_category.parse()
    }

    pub fn endpoints(&self) -> Result<Endpoints, PortalError> {
        Endpoints::new(&self.base_url, &self.auth_url)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("log_level", &self.log_level)
            .field("base_url", &self.base_url)
            .field("auth_url", &self.auth_url)
            .field("account_id", &crate::utils::mask_identifier(&self.account_id))
            .field("account_category", &self.account_category)
            .field("campuses", &self.campuses)
            .field("weeks", &self.weeks)
            .field("start_date", &self.start_date)
            .field("output_path", &self.output_path)
            .field("request_delay_ms", &self.request_delay_ms)
            .finish_non_exhaustive()
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_base_url() -> String {
    "https://space.yonsei.ac.kr".to_string()
}

fn default_auth_url() -> String {
    "https://infra.yonsei.ac.kr/lauth/YLLOGIN.do".to_string()
}

fn default_account_category() -> String {
    "A".to_string()
}

fn default_campuses() -> Vec<String> {
    vec!["SC".to_string()]
}

fn default_weeks() -> u32 {
    1
}

fn default_output_path() -> PathBuf {
    PathBuf::from("../frontend/data/schedule.jsonl")
}

fn default_request_delay_ms() -> u64 {
    100
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Str(String),
    Int(i64),
    Uint(u64),
    Float(f64),
    Bool(bool),
}

impl Scalar {
    fn into_string(self) -> String {
        match self {
            Scalar::Str(s) => s,
            Scalar::Int(n) => n.to_string(),
            Scalar::Uint(n) => n.to_string(),
            Scalar::Float(n) => n.to_string(),
            Scalar::Bool(b) => b.to_string(),
        }
    }
}

/// TOML values written without quotes (student IDs, PINs) arrive as numbers.
fn string_like<'de, D: Deserializer<'de>>(de: D) -> Result<String, D::Error> {
    Ok(Scalar::deserialize(de)?.into_string())
}

/// Accepts `["SC", "SW"]` or `"SC,SW"`.
fn string_or_list<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        Many(Vec<Scalar>),
        One(Scalar),
    }

    let items = match OneOrMany::deserialize(de)? {
        OneOrMany::Many(items) => items.into_iter().map(Scalar::into_string).collect(),
        OneOrMany::One(item) => item
            .into_string()
            .split(',')
            .map(str::to_owned)
            .collect::<Vec<_>>(),
    };
    Ok(items
        .into_iter()
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
        .collect())
}

use std::str::FromStr;

use anyhow::{Context, Result};
use dotenvy::dotenv;
use serde::Deserialize;

pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_POLL_TIMEOUT: u32 = 60;
pub const DEFAULT_GEO_URL: &str = "https://geoapi.qweather.com";
pub const DEFAULT_API_URL: &str = "https://devapi.qweather.com";

/// API tokens and keys, loaded once and never mutated.
#[derive(Clone)]
pub struct Credentials {
    pub cloud_access_key_id: String,
    pub cloud_secret_key: String,
    pub bot_token: String,
    pub weather_api_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("cloud_access_key_id", &self.cloud_access_key_id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct Settings {
    pub credentials: Credentials,
    pub geo_url: String,
    pub api_url: String,
    pub workers: usize,
    pub poll_timeout: u32,
}

impl Settings {
    pub fn from_yaml(data: &str) -> Result<Self> {
        let file: ConfigFile = serde_yaml::from_str(data).context("Failed to parse config file")?;

        let workers = file.workers.unwrap_or(DEFAULT_WORKERS);
        anyhow::ensure!(workers > 0, "worker count must be greater than zero");

        Ok(Self {
            credentials: Credentials {
                cloud_access_key_id: file.aws.aws_access_key_id,
                cloud_secret_key: file.aws.aws_secret_access_key,
                bot_token: file.tg.token,
                weather_api_key: file.hf.api_key,
            },
            geo_url: file.hf.geo_url.unwrap_or_else(|| DEFAULT_GEO_URL.to_owned()),
            api_url: file.hf.api_url.unwrap_or_else(|| DEFAULT_API_URL.to_owned()),
            workers,
            poll_timeout: file.poll_timeout.unwrap_or(DEFAULT_POLL_TIMEOUT),
        })
    }
}

pub fn load_settings() -> Result<Settings> {
    dotenv().ok();

    let path = get_env::<String>("CONFIG").unwrap_or_else(|_| "config.yaml".to_owned());
    let data = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file `{path}`"))?;

    let mut settings = Settings::from_yaml(&data)?;
    if std::env::var_os(format!("{PREFIX}_WORKERS")).is_some() {
        let workers = get_env::<usize>("WORKERS")?;
        anyhow::ensure!(workers > 0, "{PREFIX}_WORKERS must be greater than zero");
        settings.workers = workers;
    }

    Ok(settings)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    aws: AwsSection,
    tg: TgSection,
    hf: HfSection,
    #[serde(default)]
    workers: Option<usize>,
    #[serde(default)]
    poll_timeout: Option<u32>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AwsSection {
    aws_access_key_id: String,
    aws_secret_access_key: String,
}

#[derive(Deserialize)]
struct TgSection {
    token: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HfSection {
    api_key: String,
    #[serde(default)]
    geo_url: Option<String>,
    #[serde(default)]
    api_url: Option<String>,
}

fn get_env<T: FromStr<Err: Into<anyhow::Error>>>(name: &str) -> Result<T> {
    let key = format!("{PREFIX}_{name}");
    let value = std::env::var(&key).with_context(|| format!("{key} not set"))?;
    value
        .parse()
        .map_err(Into::into)
        .with_context(|| format!("Failed to parse {key}"))
}

const PREFIX: &str = "OPSBOT";

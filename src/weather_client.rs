use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::DateTime;
use reqwest::Url;
use reqwest_middleware::ClientWithMiddleware;
use reqwest_retry::policies::ExponentialBackoff;
use reqwest_retry::RetryTransientMiddleware;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::services::{ServiceError, WeatherReport, WeatherService};

const USER_AGENT: &str = concat!("opsbot/", env!("CARGO_PKG_VERSION"));

const OBS_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M%:z";
const DISPLAY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

#[derive(Clone)]
#[repr(transparent)]
pub struct WeatherClient {
    inner: Arc<Inner>,
}

impl WeatherClient {
    pub fn new(api_key: &str, geo_url: &str, api_url: &str) -> Result<Self> {
        let lookup_url = parse_base_url(geo_url)
            .and_then(|url| url.join("v2/city/lookup").map_err(Into::into))
            .context("invalid geo url")?;
        let now_url = parse_base_url(api_url)
            .and_then(|url| url.join("v7/weather/now").map_err(Into::into))
            .context("invalid weather api url")?;

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static(USER_AGENT),
        );

        let client = reqwest::ClientBuilder::new()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build weather client")?;

        let retry_policy = ExponentialBackoff::builder()
            .retry_bounds(Duration::from_millis(100), Duration::from_secs(2))
            .build_with_max_retries(3);

        let client = reqwest_middleware::ClientBuilder::new(client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            inner: Arc::new(Inner {
                client,
                api_key: api_key.to_owned(),
                lookup_url,
                now_url,
            }),
        })
    }

    pub async fn lookup_city(&self, city_name: &str) -> Result<Location, ServiceError> {
        let this = &self.inner;

        this.get::<GeoResponse>(this.lookup_url.clone(), city_name)
            .await?
            .into_location()
    }

    pub async fn get_conditions(&self, location_id: &str) -> Result<Conditions, ServiceError> {
        let this = &self.inner;

        this.get::<NowResponse>(this.now_url.clone(), location_id)
            .await?
            .into_conditions()
    }
}

#[async_trait]
impl WeatherService for WeatherClient {
    async fn get_weather_report(&self, city_name: &str) -> Result<WeatherReport, ServiceError> {
        let location = self.lookup_city(city_name).await?;
        tracing::debug!(city = %location.name, id = %location.id, "resolved city");

        let conditions = self.get_conditions(&location.id).await?;

        Ok(WeatherReport {
            city_name: location.name,
            temperature: conditions.temp,
            observed_at: format_obs_time(&conditions.obs_time),
        })
    }
}

struct Inner {
    client: ClientWithMiddleware,
    api_key: String,
    lookup_url: Url,
    now_url: Url,
}

impl Inner {
    async fn get<R: DeserializeOwned>(&self, url: Url, location: &str) -> Result<R, ServiceError> {
        let response = self
            .client
            .get(url)
            .query(&[("location", location), ("key", self.api_key.as_str())])
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json().await?)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Location {
    pub name: String,
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conditions {
    pub temp: String,
    pub obs_time: String,
}

#[derive(Deserialize)]
struct GeoResponse {
    code: String,
    #[serde(default)]
    location: Vec<Location>,
}

impl GeoResponse {
    fn into_location(self) -> Result<Location, ServiceError> {
        check_code(self.code)?;
        self.location.into_iter().next().ok_or(ServiceError::NotFound)
    }
}

#[derive(Deserialize)]
struct NowResponse {
    code: String,
    #[serde(default)]
    now: Option<Conditions>,
}

impl NowResponse {
    fn into_conditions(self) -> Result<Conditions, ServiceError> {
        check_code(self.code)?;
        self.now.ok_or(ServiceError::NotFound)
    }
}

fn check_code(code: String) -> Result<(), ServiceError> {
    match code.as_str() {
        "200" => Ok(()),
        "404" => Err(ServiceError::NotFound),
        _ => Err(ServiceError::Lookup { code }),
    }
}

/// Converts `2024-05-01T10:00+08:00` into `2024-05-01 10:00`, keeping the
/// provider's offset. Unknown formats are returned as is.
pub fn format_obs_time(obs_time: &str) -> String {
    match DateTime::parse_from_str(obs_time, OBS_TIME_FORMAT)
        .or_else(|_| DateTime::parse_from_rfc3339(obs_time))
    {
        Ok(time) => time.format(DISPLAY_TIME_FORMAT).to_string(),
        Err(e) => {
            tracing::warn!(obs_time, "unexpected observation time format: {e}");
            obs_time.to_owned()
        }
    }
}

// `Url::join` drops the last path segment unless the base ends with a slash.
fn parse_base_url(url: &str) -> Result<Url> {
    let mut url = url.parse::<Url>()?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

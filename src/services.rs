use async_trait::async_trait;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("not found")]
    NotFound,
    #[error("lookup failed with code {code}")]
    Lookup { code: String },
    #[error("request failed: {0}")]
    Request(#[from] reqwest_middleware::Error),
    #[error("bad response: {0}")]
    Http(#[from] reqwest::Error),
    #[error("no instances found")]
    NoInstances,
    #[error("cloud request failed: {0}")]
    Cloud(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct UsageReport {
    pub instance_name: String,
    pub bytes_in: f64,
    pub bytes_out: f64,
    pub total_formatted: String,
}

impl UsageReport {
    pub fn new(instance_name: String, bytes_in: f64, bytes_out: f64) -> Self {
        Self {
            instance_name,
            bytes_in,
            bytes_out,
            total_formatted: format_total(bytes_in, bytes_out),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeatherReport {
    pub city_name: String,
    pub temperature: String,
    pub observed_at: String,
}

/// Month-to-date network transfer of the managed VPS.
#[async_trait]
pub trait UsageService: Send + Sync {
    async fn get_usage_report(&self) -> Result<UsageReport, ServiceError>;
}

/// Current conditions for a city looked up by name.
#[async_trait]
pub trait WeatherService: Send + Sync {
    async fn get_weather_report(&self, city_name: &str) -> Result<WeatherReport, ServiceError>;
}

pub fn format_total(bytes_in: f64, bytes_out: f64) -> String {
    format!("{:.1}G", (bytes_in + bytes_out) / GIB)
}

use async_trait::async_trait;
use aws_sdk_lightsail::config::retry::RetryConfig;
use aws_sdk_lightsail::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_lightsail::error::DisplayErrorContext;
use aws_sdk_lightsail::primitives::DateTime as AwsDateTime;
use aws_sdk_lightsail::types::{
    Instance, InstanceMetricName, MetricDatapoint, MetricStatistic, MetricUnit,
};
use chrono::{DateTime, Datelike, Local, NaiveTime, TimeZone};

use crate::services::{ServiceError, UsageReport, UsageService};

const REGION: &str = "ap-southeast-1";
const CREDENTIALS_SOURCE: &str = "opsbot-config";
const MAX_ATTEMPTS: u32 = 3;
// Lightsail caps the metric period at one day.
const METRIC_PERIOD_SECS: i32 = 24 * 60 * 60;

#[derive(Clone)]
pub struct LightsailClient {
    client: aws_sdk_lightsail::Client,
}

impl LightsailClient {
    pub fn new(access_key_id: &str, secret_access_key: &str) -> Self {
        let credentials = Credentials::new(
            access_key_id,
            secret_access_key,
            None,
            None,
            CREDENTIALS_SOURCE,
        );

        let config = aws_sdk_lightsail::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(REGION))
            .credentials_provider(credentials)
            .retry_config(RetryConfig::standard().with_max_attempts(MAX_ATTEMPTS))
            .build();

        Self {
            client: aws_sdk_lightsail::Client::from_conf(config),
        }
    }

    pub async fn list_instances(&self) -> Result<Vec<Instance>, ServiceError> {
        let output = self
            .client
            .get_instances()
            .send()
            .await
            .map_err(|e| ServiceError::Cloud(DisplayErrorContext(&e).to_string()))?;

        Ok(output.instances().to_vec())
    }

    /// Sum of all datapoints of the metric over the window, in bytes.
    pub async fn get_transfer(
        &self,
        instance_name: &str,
        metric: InstanceMetricName,
        start: i64,
        end: i64,
    ) -> Result<f64, ServiceError> {
        let output = self
            .client
            .get_instance_metric_data()
            .instance_name(instance_name)
            .metric_name(metric)
            .period(METRIC_PERIOD_SECS)
            .start_time(AwsDateTime::from_secs(start))
            .end_time(AwsDateTime::from_secs(end))
            .statistics(MetricStatistic::Sum)
            .unit(MetricUnit::Bytes)
            .send()
            .await
            .map_err(|e| ServiceError::Cloud(DisplayErrorContext(&e).to_string()))?;

        Ok(sum_datapoints(output.metric_data()))
    }
}

#[async_trait]
impl UsageService for LightsailClient {
    async fn get_usage_report(&self) -> Result<UsageReport, ServiceError> {
        let instances = self.list_instances().await?;
        let instance_name = first_instance_name(&instances)?;
        let (start, end) = usage_window(&Local::now());

        let bytes_in = self
            .get_transfer(&instance_name, InstanceMetricName::NetworkIn, start, end)
            .await?;
        let bytes_out = self
            .get_transfer(&instance_name, InstanceMetricName::NetworkOut, start, end)
            .await?;

        tracing::debug!(%instance_name, bytes_in, bytes_out, "fetched network usage");

        Ok(UsageReport::new(instance_name, bytes_in, bytes_out))
    }
}

// Only single-VPS accounts are supported for now.
fn first_instance_name(instances: &[Instance]) -> Result<String, ServiceError> {
    instances
        .iter()
        .find_map(|instance| instance.name())
        .map(str::to_owned)
        .ok_or(ServiceError::NoInstances)
}

fn sum_datapoints(datapoints: &[MetricDatapoint]) -> f64 {
    datapoints.iter().filter_map(|datapoint| datapoint.sum()).sum()
}

/// Month-to-date window as unix timestamps `(start, end)`.
fn usage_window<Tz: TimeZone>(now: &DateTime<Tz>) -> (i64, i64) {
    (month_start(now).timestamp(), now.timestamp())
}

/// First instant of the calendar month containing `now`, in the same zone.
pub fn month_start<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Tz> {
    let tz = now.timezone();
    let first_day = now
        .date_naive()
        .with_day(1)
        .unwrap_or_else(|| now.date_naive())
        .and_time(NaiveTime::MIN);

    tz.from_local_datetime(&first_day)
        .earliest()
        .unwrap_or_else(|| tz.from_utc_datetime(&first_day))
}

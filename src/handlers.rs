use std::sync::Arc;

use teloxide::utils::command::BotCommands;

use crate::commands::{parse_command, Command};
use crate::services::{ServiceError, UsageReport, UsageService, WeatherReport, WeatherService};

pub struct Handler {
    usage: Arc<dyn UsageService>,
    weather: Arc<dyn WeatherService>,
}

impl Handler {
    pub fn new(usage: Arc<dyn UsageService>, weather: Arc<dyn WeatherService>) -> Self {
        Self { usage, weather }
    }

    pub async fn handle_command(&self, text: &str) -> Reply {
        let (command, args) = parse_command(text);

        match command {
            "help" if !args.is_empty() => Reply::UnexpectedArgs,
            "help" => Reply::Menu,
            "sayhi" if !args.is_empty() => Reply::UnexpectedArgs,
            "sayhi" => Reply::Greeting,
            "weather" if args.is_empty() => Reply::WeatherUsage,
            "weather" => match self.weather.get_weather_report(args).await {
                Ok(report) => Reply::Weather(report),
                Err(err) => {
                    tracing::warn!(city = args, "weather lookup failed: {err}");
                    Reply::Failed(err)
                }
            },
            "usage" if !args.is_empty() => Reply::UnexpectedArgs,
            "usage" => match self.usage.get_usage_report().await {
                Ok(report) => Reply::Usage(report),
                Err(err) => {
                    tracing::warn!("usage lookup failed: {err}");
                    Reply::Failed(err)
                }
            },
            _ => Reply::UnknownCommand,
        }
    }
}

#[derive(Debug)]
pub enum Reply {
    Menu,
    Greeting,
    WeatherUsage,
    Weather(WeatherReport),
    Usage(UsageReport),
    UnexpectedArgs,
    UnknownCommand,
    Failed(ServiceError),
}

impl std::fmt::Display for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Menu => write!(f, "{}", Command::descriptions()),
            Self::Greeting => write!(f, "Hi :) Nice to meet you!"),
            Self::WeatherUsage => {
                write!(f, "Please specify a city name, example: /weather shenzhen")
            }
            Self::Weather(report) => write!(
                f,
                "City: {}\nTemperature: {}\nObserved: {}",
                report.city_name, report.temperature, report.observed_at
            ),
            Self::Usage(report) => write!(
                f,
                "Name: {}\nNetworkIn: {:.1}\nNetworkOut: {:.1}\nTotal: {}",
                report.instance_name, report.bytes_in, report.bytes_out, report.total_formatted
            ),
            Self::UnexpectedArgs => write!(f, "I don't know that command with args"),
            Self::UnknownCommand => write!(f, "I don't know that command"),
            Self::Failed(err) => write!(f, "Failed to handle command: {err}"),
        }
    }
}

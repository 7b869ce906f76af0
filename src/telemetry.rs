//! Logging and metrics setup for processes embedding the topology subsystem.
//!
//! The coordinator only emits `tracing` events and OTel counters, so this
//! installs a fmt subscriber and, when enabled, a meter provider that owns
//! those counters.

use crate::{Error, Result};

use opentelemetry::global;
use opentelemetry::KeyValue;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::Resource;
use std::collections::HashMap;
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Output format of log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Text,
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,
    /// Install a meter provider for the coordinator counters
    pub metrics_enabled: bool,
    pub log_format: LogFormat,
    pub log_level: Level,
}

impl TelemetryConfig {
    /// Read `OTEL_SERVICE_NAME` and the `GALERA_TOPOLOGY_*` variables
    pub fn from_env(default_service_name: &str) -> Result<Self> {
        let vars: HashMap<String, String> = std::env::vars()
            .filter(|(k, _)| k == "OTEL_SERVICE_NAME" || k.starts_with("GALERA_TOPOLOGY_"))
            .collect();
        Self::from_vars(&vars, default_service_name)
    }

    /// - OTEL_SERVICE_NAME: overrides `default_service_name`
    /// - GALERA_TOPOLOGY_METRICS_ENABLED: true (default) or false
    /// - GALERA_TOPOLOGY_LOG_FORMAT: json (default) or text
    /// - GALERA_TOPOLOGY_LOG_LEVEL: info (default)
    pub fn from_vars(vars: &HashMap<String, String>, default_service_name: &str) -> Result<Self> {
        let service_name = vars
            .get("OTEL_SERVICE_NAME")
            .map(String::as_str)
            .unwrap_or(default_service_name)
            .trim()
            .to_string();
        if service_name.is_empty() {
            return Err(Error::Config("service name cannot be empty".to_string()));
        }

        let metrics_enabled = match vars.get("GALERA_TOPOLOGY_METRICS_ENABLED") {
            Some(raw) => parse_flag("GALERA_TOPOLOGY_METRICS_ENABLED", raw)?,
            None => true,
        };
        let log_format = match vars.get("GALERA_TOPOLOGY_LOG_FORMAT") {
            Some(raw) => parse_log_format(raw)?,
            None => LogFormat::Json,
        };
        let log_level = match vars.get("GALERA_TOPOLOGY_LOG_LEVEL") {
            Some(raw) => parse_log_level(raw)?,
            None => Level::INFO,
        };

        Ok(Self {
            service_name,
            metrics_enabled,
            log_format,
            log_level,
        })
    }
}

/// Holds the meter provider until the embedding process shuts down
pub struct Telemetry {
    service_name: String,
    meter_provider: Option<SdkMeterProvider>,
}

impl Telemetry {
    pub fn init_for_component(default_service_name: &str) -> Result<Self> {
        Self::init(TelemetryConfig::from_env(default_service_name)?)
    }

    /// Install the log subscriber unless the host already has one, then the
    /// meter provider when metrics are enabled.
    pub fn init(config: TelemetryConfig) -> Result<Self> {
        let installed = match config.log_format {
            LogFormat::Json => FmtSubscriber::builder()
                .with_max_level(config.log_level)
                .json()
                .try_init(),
            LogFormat::Text => FmtSubscriber::builder()
                .with_max_level(config.log_level)
                .try_init(),
        };
        if installed.is_err() {
            debug!("Log subscriber already installed by the host");
        }

        let meter_provider = config.metrics_enabled.then(|| {
            let resource = Resource::default().merge(&Resource::new(vec![KeyValue::new(
                "service.name",
                config.service_name.clone(),
            )]));
            let provider = SdkMeterProvider::builder().with_resource(resource).build();
            global::set_meter_provider(provider.clone());
            provider
        });

        info!(
            service_name = %config.service_name,
            metrics = config.metrics_enabled,
            log_level = %config.log_level,
            "Telemetry initialized"
        );

        Ok(Self {
            service_name: config.service_name,
            meter_provider,
        })
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn is_enabled(&self) -> bool {
        self.meter_provider.is_some()
    }
}

impl Drop for Telemetry {
    fn drop(&mut self) {
        if let Some(provider) = self.meter_provider.take() {
            if let Err(e) = provider.shutdown() {
                debug!(error = %e, "Meter provider shutdown failed");
            }
        }
    }
}

fn parse_log_level(raw: &str) -> Result<Level> {
    raw.trim()
        .parse::<Level>()
        .map_err(|_| Error::Config(format!("invalid log level '{raw}'")))
}

fn parse_log_format(raw: &str) -> Result<LogFormat> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "json" => Ok(LogFormat::Json),
        "text" => Ok(LogFormat::Text),
        other => Err(Error::Config(format!(
            "GALERA_TOPOLOGY_LOG_FORMAT must be json or text, got '{other}'"
        ))),
    }
}

fn parse_flag(name: &str, raw: &str) -> Result<bool> {
    match raw.trim() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(Error::Config(format!("{name} must be true or false, got '{raw}'"))),
    }
}

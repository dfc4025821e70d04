//! Admin configuration

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use uuid::Uuid;

use crate::endpoint::{scope_or_default, Properties, STATIC_CONNECT_URLS};
use crate::matching::MatchScores;
use crate::protocol::{DEFAULT_CONNECT_RETRY_INTERVAL, DEFAULT_FIRST_SEND_DELAY};
use crate::server::ServerConfig;

pub const QOS_SAMPLE_SCORE_KEY: &str = "PSA_SOCKET_QOS_SAMPLE_SCORE";
pub const QOS_CONTROL_SCORE_KEY: &str = "PSA_SOCKET_QOS_CONTROL_SCORE";
pub const DEFAULT_SCORE_KEY: &str = "PSA_SOCKET_DEFAULT_SCORE";
pub const METRICS_ENABLED_KEY: &str = "PSA_SOCKET_METRICS_ENABLED";
pub const VERBOSE_KEY: &str = "PSA_SOCKET_VERBOSE";
pub const BIND_ADDRESS_KEY: &str = "PSA_SOCKET_BIND_ADDRESS";
pub const PORT_KEY: &str = "PSA_SOCKET_PORT";
pub const ADVERTISED_ADDRESS_KEY: &str = "PSA_SOCKET_ADVERTISED_ADDRESS";
pub const STATIC_CONNECT_URLS_KEY: &str = "PSA_SOCKET_STATIC_CONNECT_URLS";
/// Followed by `<scope>_<topic>`
pub const STATIC_CONNECT_URLS_FOR_PREFIX: &str = "PSA_SOCKET_STATIC_CONNECT_URLS_FOR_";
pub const CONTAINER_NAME_KEY: &str = "CELIX_CONTAINER_NAME";
pub const FIRST_SEND_DELAY_KEY: &str = "PSA_SOCKET_FIRST_SEND_DELAY_MS";
pub const CONNECT_RETRY_INTERVAL_KEY: &str = "PSA_SOCKET_CONNECT_RETRY_INTERVAL_MS";

/// Transport admin configuration
#[derive(Debug, Clone)]
pub struct AdminConfig {
    /// Match weights
    pub scores: MatchScores,

    /// Collect send/receive metrics
    pub metrics_enabled: bool,

    /// Log discovery events at info level
    pub verbose: bool,

    /// Side-channel server options
    pub server: ServerConfig,

    /// Static `host:port` list applied to every receiver
    pub static_connect_urls: Option<String>,

    /// Static lists per `<scope>_<topic>`
    pub scoped_static_connect_urls: HashMap<String, String>,

    /// Echoed into endpoints as `container_name`
    pub container_name: Option<String>,

    /// One-shot delay before the first send
    pub first_send_delay: Duration,

    /// Receiver reconnect tick
    pub connect_retry_interval: Duration,

    /// Origin id stamped into every sent frame (random when unset)
    pub framework_uuid: Option<Uuid>,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            scores: MatchScores::default(),
            metrics_enabled: true,
            verbose: false,
            server: ServerConfig::default(),
            static_connect_urls: None,
            scoped_static_connect_urls: HashMap::new(),
            container_name: None,
            first_send_delay: DEFAULT_FIRST_SEND_DELAY,
            connect_retry_interval: DEFAULT_CONNECT_RETRY_INTERVAL,
            framework_uuid: None,
        }
    }
}

impl AdminConfig {
    /// Read the configuration from framework properties
    ///
    /// Missing or malformed values keep their defaults.
    pub fn from_properties(props: &Properties) -> Self {
        let mut config = Self::default();

        if let Some(score) = props.get_as_f64(QOS_SAMPLE_SCORE_KEY) {
            config.scores.qos_sample = score;
        }
        if let Some(score) = props.get_as_f64(QOS_CONTROL_SCORE_KEY) {
            config.scores.qos_control = score;
        }
        if let Some(score) = props.get_as_f64(DEFAULT_SCORE_KEY) {
            config.scores.default = score;
        }
        if let Some(enabled) = props.get_as_bool(METRICS_ENABLED_KEY) {
            config.metrics_enabled = enabled;
        }
        if let Some(verbose) = props.get_as_bool(VERBOSE_KEY) {
            config.verbose = verbose;
        }

        let ip = props
            .get(BIND_ADDRESS_KEY)
            .and_then(|ip| ip.trim().parse::<IpAddr>().ok())
            .unwrap_or(config.server.bind_addr.ip());
        let port = props
            .get_as_i64(PORT_KEY)
            .and_then(|p| u16::try_from(p).ok())
            .unwrap_or(config.server.bind_addr.port());
        config.server.bind_addr = SocketAddr::new(ip, port);
        if let Some(address) = props.get(ADVERTISED_ADDRESS_KEY) {
            config.server.advertised_address = Some(address.to_string());
        }

        config.static_connect_urls = props.get(STATIC_CONNECT_URLS_KEY).map(str::to_string);
        for (key, value) in props.iter() {
            if let Some(scope_topic) = key.strip_prefix(STATIC_CONNECT_URLS_FOR_PREFIX) {
                config
                    .scoped_static_connect_urls
                    .insert(scope_topic.to_string(), value.to_string());
            }
        }

        config.container_name = props.get(CONTAINER_NAME_KEY).map(str::to_string);

        if let Some(ms) = props.get_as_i64(FIRST_SEND_DELAY_KEY).filter(|ms| *ms >= 0) {
            config.first_send_delay = Duration::from_millis(ms as u64);
        }
        if let Some(ms) = props.get_as_i64(CONNECT_RETRY_INTERVAL_KEY).filter(|ms| *ms > 0) {
            config.connect_retry_interval = Duration::from_millis(ms as u64);
        }

        config
    }

    pub fn scores(mut self, scores: MatchScores) -> Self {
        self.scores = scores;
        self
    }

    pub fn metrics_enabled(mut self, enabled: bool) -> Self {
        self.metrics_enabled = enabled;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn server(mut self, server: ServerConfig) -> Self {
        self.server = server;
        self
    }

    pub fn static_connect_urls(mut self, urls: impl Into<String>) -> Self {
        self.static_connect_urls = Some(urls.into());
        self
    }

    pub fn scoped_static_connect_urls(
        mut self,
        scope: Option<&str>,
        topic: &str,
        urls: impl Into<String>,
    ) -> Self {
        self.scoped_static_connect_urls
            .insert(format!("{}_{}", scope_or_default(scope), topic), urls.into());
        self
    }

    pub fn container_name(mut self, name: impl Into<String>) -> Self {
        self.container_name = Some(name.into());
        self
    }

    pub fn first_send_delay(mut self, delay: Duration) -> Self {
        self.first_send_delay = delay;
        self
    }

    pub fn connect_retry_interval(mut self, interval: Duration) -> Self {
        self.connect_retry_interval = interval;
        self
    }

    pub fn framework_uuid(mut self, uuid: Uuid) -> Self {
        self.framework_uuid = Some(uuid);
        self
    }

    /// Static remote list for a receiver
    ///
    /// Scope/topic specific configuration wins over the topic properties,
    /// which win over the global list.
    pub fn static_urls_for(
        &self,
        scope: Option<&str>,
        topic: &str,
        topic_properties: &Properties,
    ) -> Option<String> {
        let scoped_key = format!("{}_{}", scope_or_default(scope), topic);
        self.scoped_static_connect_urls
            .get(&scoped_key)
            .cloned()
            .or_else(|| topic_properties.get(STATIC_CONNECT_URLS).map(str::to_string))
            .or_else(|| self.static_connect_urls.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{DEFAULT_QOS_SAMPLE_SCORE, DEFAULT_SCORE};

    #[test]
    fn test_default_config() {
        let config = AdminConfig::default();

        assert_eq!(config.scores.qos_sample, DEFAULT_QOS_SAMPLE_SCORE);
        assert!(config.metrics_enabled);
        assert!(!config.verbose);
        assert_eq!(config.first_send_delay, Duration::from_secs(2));
        assert!(config.container_name.is_none());
    }

    #[test]
    fn test_from_properties() {
        let props = Properties::new()
            .with(QOS_SAMPLE_SCORE_KEY, "90")
            .with(DEFAULT_SCORE_KEY, "not a number")
            .with(METRICS_ENABLED_KEY, "false")
            .with(VERBOSE_KEY, "true")
            .with(BIND_ADDRESS_KEY, "0.0.0.0")
            .with(PORT_KEY, "7100")
            .with(CONTAINER_NAME_KEY, "node-a")
            .with(FIRST_SEND_DELAY_KEY, "0")
            .with(STATIC_CONNECT_URLS_KEY, "10.0.0.1:1")
            .with(format!("{STATIC_CONNECT_URLS_FOR_PREFIX}s_t"), "10.0.0.2:2");

        let config = AdminConfig::from_properties(&props);

        assert_eq!(config.scores.qos_sample, 90.0);
        assert_eq!(config.scores.default, DEFAULT_SCORE);
        assert!(!config.metrics_enabled);
        assert!(config.verbose);
        assert_eq!(config.server.bind_addr, "0.0.0.0:7100".parse().unwrap());
        assert_eq!(config.container_name.as_deref(), Some("node-a"));
        assert_eq!(config.first_send_delay, Duration::ZERO);
        assert_eq!(config.scoped_static_connect_urls.get("s_t").map(String::as_str), Some("10.0.0.2:2"));
    }

    #[test]
    fn test_static_urls_precedence() {
        let config = AdminConfig::default()
            .static_connect_urls("global:1")
            .scoped_static_connect_urls(Some("s"), "t", "scoped:2");
        let topic_props = Properties::new().with(STATIC_CONNECT_URLS, "topic:3");

        assert_eq!(config.static_urls_for(Some("s"), "t", &topic_props).as_deref(), Some("scoped:2"));
        assert_eq!(config.static_urls_for(Some("s"), "u", &topic_props).as_deref(), Some("topic:3"));
        assert_eq!(
            config.static_urls_for(None, "t", &Properties::new()).as_deref(),
            Some("global:1")
        );
        assert_eq!(
            AdminConfig::default().static_urls_for(None, "t", &Properties::new()),
            None
        );
    }
}

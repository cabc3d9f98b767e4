use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use market_data::backpressure::{BackpressureConfig, DropPolicy};
use market_data::bus::DEFAULT_BUS_CAPACITY;
use market_data::history::DEFAULT_HISTORY_CAPACITY;
use market_data::query::HistoryServiceConfig;
use market_data::registry::{DEFAULT_UPSTREAM_TOPIC, WsConfig};

/// Gateway configuration derived from environment variables.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub bind: String,
    pub port: u16,
    /// Base URL of the time-series service. `None` ⇒ in-memory backend.
    pub timeseries_url: Option<String>,
    pub upstream_topic: String,
    pub query_timeout: Duration,
    pub history_capacity: usize,
    pub client_queue_capacity: usize,
    pub drop_policy: DropPolicy,
    pub bus_capacity: usize,
    pub max_subscriptions: usize,
    pub backend_retries: u32,
}

/// Typed reads over a variable lookup. Blank values count as unset.
struct Vars<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Vars<F> {
    fn opt(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    fn str(&self, name: &str, default: &str) -> String {
        self.opt(name).unwrap_or_else(|| default.to_string())
    }

    fn parse<T: FromStr>(&self, name: &str, default: T) -> T {
        self.opt(name)
            .and_then(|s| s.parse().ok())
            .unwrap_or(default)
    }
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Self {
        let vars = Vars { lookup };
        Self {
            bind: vars.str("BIND", "0.0.0.0"),
            port: vars.parse("PORT", 8000),
            timeseries_url: vars.opt("TIMESERIES_URL"),
            upstream_topic: vars.str("UPSTREAM_TOPIC", DEFAULT_UPSTREAM_TOPIC),
            query_timeout: Duration::from_millis(vars.parse("QUERY_TIMEOUT_MS", 5_000)),
            history_capacity: vars.parse("HISTORY_CAPACITY", DEFAULT_HISTORY_CAPACITY),
            client_queue_capacity: vars.parse("CLIENT_QUEUE_CAPACITY", 256),
            drop_policy: vars
                .opt("CLIENT_DROP_POLICY")
                .and_then(|s| DropPolicy::parse(&s))
                .unwrap_or(DropPolicy::DropMessage),
            bus_capacity: vars.parse("BUS_CAPACITY", DEFAULT_BUS_CAPACITY),
            max_subscriptions: vars.parse("MAX_SUBSCRIPTIONS", 50),
            backend_retries: vars.parse("BACKEND_RETRIES", 3),
        }
    }

    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.bind, self.port).parse()?)
    }

    pub fn ws_config(&self) -> WsConfig {
        WsConfig {
            max_subscriptions_per_client: self.max_subscriptions,
            upstream_topic: self.upstream_topic.clone(),
            backpressure: BackpressureConfig {
                queue_capacity: self.client_queue_capacity,
                drop_policy: self.drop_policy,
            },
        }
    }

    pub fn history_config(&self) -> HistoryServiceConfig {
        HistoryServiceConfig {
            query_timeout: self.query_timeout,
            ..HistoryServiceConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> GatewayConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        GatewayConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[]);
        assert_eq!(cfg.port, 8000);
        assert_eq!(cfg.upstream_topic, "orders_and_prices");
        assert_eq!(cfg.history_capacity, 10);
        assert_eq!(cfg.query_timeout, Duration::from_secs(5));
        assert_eq!(cfg.drop_policy, DropPolicy::DropMessage);
        assert!(cfg.timeseries_url.is_none());
        assert_eq!(cfg.socket_addr().unwrap().port(), 8000);
    }

    #[test]
    fn test_overrides_and_bad_values() {
        let cfg = config(&[
            ("PORT", "9001"),
            ("TIMESERIES_URL", " http://ts:8081 "),
            ("QUERY_TIMEOUT_MS", "250"),
            ("CLIENT_DROP_POLICY", "disconnect"),
            ("HISTORY_CAPACITY", "lots"),
            ("UPSTREAM_TOPIC", "  "),
        ]);
        assert_eq!(cfg.port, 9001);
        assert_eq!(cfg.timeseries_url.as_deref(), Some("http://ts:8081"));
        assert_eq!(cfg.query_timeout, Duration::from_millis(250));
        assert_eq!(cfg.drop_policy, DropPolicy::Disconnect);
        assert_eq!(cfg.history_capacity, 10);
        assert_eq!(cfg.upstream_topic, "orders_and_prices");
    }

    #[test]
    fn test_component_configs() {
        let cfg = config(&[("CLIENT_QUEUE_CAPACITY", "8"), ("MAX_SUBSCRIPTIONS", "3")]);
        let ws = cfg.ws_config();
        assert_eq!(ws.backpressure.queue_capacity, 8);
        assert_eq!(ws.max_subscriptions_per_client, 3);
        assert_eq!(cfg.history_config().query_timeout, cfg.query_timeout);
    }
}

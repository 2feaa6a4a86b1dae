//! Group configuration
//!
//! Options the hub consumes. Loading them from disk is up to the embedding
//! server; every struct deserializes with defaults for missing fields.

use std::time::Duration;

use serde::Deserialize;

/// Per-protocol output options
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Whether this output format is served (gates its GOP cache)
    pub enabled: bool,

    /// Number of GOPs kept for late joiners (0 = sequence headers only)
    pub gop_num: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            gop_num: 2,
        }
    }
}

/// HLS muxer options
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HlsConfig {
    /// Start a muxer for every inbound epoch
    pub enabled: bool,
}

/// Relay pull (origin fetch) options
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RelayPullConfig {
    pub enabled: bool,

    /// Origin `host:port`
    pub addr: String,
}

/// Relay push (forward) options
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RelayPushConfig {
    pub enabled: bool,

    /// Target `host:port` list, one relay target per entry
    pub addr_list: Vec<String>,
}

/// Timeouts handed to relay sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RelayTimeouts {
    pub connect_timeout_ms: u64,
    pub push_timeout_ms: u64,
    pub write_timeout_ms: u64,
}

impl Default for RelayTimeouts {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5000,
            push_timeout_ms: 5000,
            write_timeout_ms: 5000,
        }
    }
}

impl RelayTimeouts {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn push_timeout(&self) -> Duration {
        Duration::from_millis(self.push_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

/// Hub configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GroupConfig {
    pub rtmp: ProtocolConfig,

    pub httpflv: ProtocolConfig,

    pub hls: HlsConfig,

    pub relay_pull: RelayPullConfig,

    pub relay_push: RelayPushConfig,

    pub relay_timeouts: RelayTimeouts,

    /// Outbound RTMP chunk size
    pub chunk_size: u32,

    /// How often the manager re-evaluates relays
    pub relay_check_interval_ms: u64,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            rtmp: ProtocolConfig::default(),
            httpflv: ProtocolConfig::default(),
            hls: HlsConfig::default(),
            relay_pull: RelayPullConfig::default(),
            relay_push: RelayPushConfig::default(),
            relay_timeouts: RelayTimeouts::default(),
            chunk_size: crate::protocol::DEFAULT_CHUNK_SIZE,
            relay_check_interval_ms: 1000,
        }
    }
}

impl GroupConfig {
    /// Enable relay pull from `addr`
    pub fn relay_pull(mut self, addr: impl Into<String>) -> Self {
        self.relay_pull = RelayPullConfig {
            enabled: true,
            addr: addr.into(),
        };
        self
    }

    /// Enable relay push to every address in `addrs`
    pub fn relay_push<I, S>(mut self, addrs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.relay_push = RelayPushConfig {
            enabled: true,
            addr_list: addrs.into_iter().map(Into::into).collect(),
        };
        self
    }

    /// Set the GOP count for both output formats
    pub fn gop_num(mut self, n: usize) -> Self {
        self.rtmp.gop_num = n;
        self.httpflv.gop_num = n;
        self
    }

    /// Enable the HLS muxer
    pub fn enable_hls(mut self) -> Self {
        self.hls.enabled = true;
        self
    }

    /// Stop feeding the HTTP-FLV cache
    pub fn disable_httpflv(mut self) -> Self {
        self.httpflv.enabled = false;
        self
    }

    /// Stop feeding the RTMP cache
    pub fn disable_rtmp(mut self) -> Self {
        self.rtmp.enabled = false;
        self
    }

    /// Relay re-evaluation interval
    pub fn relay_check_interval(&self) -> Duration {
        Duration::from_millis(self.relay_check_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GroupConfig::default();

        assert!(config.rtmp.enabled);
        assert!(config.httpflv.enabled);
        assert_eq!(config.rtmp.gop_num, 2);
        assert!(!config.hls.enabled);
        assert!(!config.relay_pull.enabled);
        assert!(!config.relay_push.enabled);
        assert_eq!(config.relay_timeouts.connect_timeout(), Duration::from_secs(5));
        assert_eq!(config.relay_check_interval(), Duration::from_secs(1));
        assert_eq!(config.chunk_size, 4096);
    }

    #[test]
    fn test_builder_chaining() {
        let config = GroupConfig::default()
            .relay_pull("origin:1935")
            .relay_push(["edge1:1935", "edge2:1935"])
            .gop_num(0)
            .enable_hls()
            .disable_httpflv();

        assert!(config.relay_pull.enabled);
        assert_eq!(config.relay_pull.addr, "origin:1935");
        assert_eq!(config.relay_push.addr_list.len(), 2);
        assert_eq!(config.rtmp.gop_num, 0);
        assert_eq!(config.httpflv.gop_num, 0);
        assert!(config.hls.enabled);
        assert!(!config.httpflv.enabled);
        assert!(config.rtmp.enabled);
    }

    #[test]
    fn test_parse_toml() {
        let config: GroupConfig = toml::from_str(
            r#"
            chunk_size = 8192

            [rtmp]
            gop_num = 4

            [httpflv]
            enabled = false

            [relay_push]
            enabled = true
            addr_list = ["127.0.0.1:19350"]

            [relay_timeouts]
            connect_timeout_ms = 1500
            "#,
        )
        .unwrap();

        assert_eq!(config.chunk_size, 8192);
        assert_eq!(config.rtmp, ProtocolConfig { enabled: true, gop_num: 4 });
        assert!(!config.httpflv.enabled);
        assert_eq!(config.httpflv.gop_num, 2);
        assert_eq!(config.relay_push.addr_list, vec!["127.0.0.1:19350"]);
        assert_eq!(config.relay_timeouts.connect_timeout_ms, 1500);
        assert_eq!(config.relay_timeouts.write_timeout_ms, 5000);
        assert!(!config.relay_pull.enabled);
    }

    #[test]
    fn test_parse_empty() {
        let config: GroupConfig = toml::from_str("").unwrap();
        assert_eq!(config, GroupConfig::default());
    }
}

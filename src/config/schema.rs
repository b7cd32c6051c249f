//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct PortmuxConfig {
    /// Port range and connection limits.
    pub listener: ListenerConfig,

    /// Which layers the sniffer may install.
    pub sniff: SniffConfig,

    /// Certificate material. TLS detection stays off without it.
    pub tls: Option<TlsConfig>,

    pub http: HttpConfig,

    pub json: JsonConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Host to bind on.
    pub host: String,

    /// First port tried.
    pub first_port: u16,

    /// Number of consecutive ports tried, starting at `first_port`.
    pub port_count: u16,

    /// Fall back to an OS-assigned port when the whole range is taken.
    pub try_any_port: bool,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            first_port: 63342,
            port_count: 20,
            try_any_port: true,
            max_connections: 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct SniffConfig {
    pub detect_tls: bool,
    pub detect_gzip: bool,
}

impl Default for SniffConfig {
    fn default() -> Self {
        Self {
            detect_tls: true,
            detect_gzip: true,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// HTTP chain limits.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct HttpConfig {
    /// Largest accepted request body in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Origins allowed by CORS; `"*"` allows any.
    pub cors_allowed_origins: Vec<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 1024 * 1024,
            request_timeout_secs: 30,
            cors_allowed_origins: vec!["http://localhost".to_string()],
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct JsonConfig {
    /// Accept the relaxed JSON dialect in request bodies.
    pub lenient: bool,
}

use crate::{HelloError, Result};
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

/// Port used when `PORT` is absent or empty
pub const DEFAULT_PORT: u16 = 8080;

/// Environment variable holding the listen port
pub const PORT_VAR: &str = "PORT";

/// Environment variable selecting the [`BindFailurePolicy`]
pub const BIND_FAILURE_VAR: &str = "HELLOSRV_ON_BIND_FAILURE";

/// Which fixture flavor is running.
///
/// The variants serve identical responses; only the startup line differs so a
/// harness can tell them apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Variant {
    #[default]
    Vendored,
    NotVendored,
}

impl Variant {
    /// The startup line printed once the listener is bound
    pub fn startup_line(&self, port: u16) -> String {
        match self {
            Variant::Vendored => format!("server is listening on {port}"),
            Variant::NotVendored => format!("NOT vendored server is listening on {port}"),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::Vendored => "vendored",
            Variant::NotVendored => "not-vendored",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Variant {
    type Err = HelloError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vendored" => Ok(Variant::Vendored),
            "not-vendored" | "not_vendored" => Ok(Variant::NotVendored),
            other => Err(HelloError::Config(format!("unknown variant '{other}'"))),
        }
    }
}

/// What `run` does after logging a bind failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BindFailurePolicy {
    /// Return the bind error to the caller
    Exit,
    /// Stay alive without serving until the shutdown signal fires
    #[default]
    Linger,
}

impl FromStr for BindFailurePolicy {
    type Err = HelloError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exit" => Ok(BindFailurePolicy::Exit),
            "linger" => Ok(BindFailurePolicy::Linger),
            other => Err(HelloError::Config(format!(
                "unknown bind failure policy '{other}', expected 'exit' or 'linger'"
            ))),
        }
    }
}

/// Configuration for the fixture server
///
/// # Examples
///
/// ```
/// use hellosrv::common::{ServerConfig, Variant};
/// use std::time::Duration;
///
/// let config = ServerConfig {
///     bind_addr: "127.0.0.1:0".parse().unwrap(),
///     variant: Variant::NotVendored,
///     ..ServerConfig::default()
/// };
/// assert_eq!(config.idle_timeout, Duration::from_secs(5));
/// ```
///
/// Reading the port from a custom lookup instead of the process environment:
///
/// ```
/// use hellosrv::common::{ServerConfig, Variant};
///
/// let config = ServerConfig::from_lookup(Variant::Vendored, |key| {
///     (key == "PORT").then(|| "9191".to_string())
/// })
/// .unwrap();
/// assert_eq!(config.bind_addr.port(), 9191);
/// ```
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Fixture flavor, visible only in the startup line
    pub variant: Variant,
    /// Behavior after a failed bind
    pub on_bind_failure: BindFailurePolicy,
    /// How long a keep-alive connection may sit without a new request
    pub idle_timeout: Duration,
    /// Write timeout for responses
    pub write_timeout: Duration,
    /// Largest accepted request head (request line plus headers)
    pub max_head_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            variant: Variant::default(),
            on_bind_failure: BindFailurePolicy::default(),
            idle_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(30),
            max_head_size: 16 * 1024,
        }
    }
}

impl ServerConfig {
    /// Builds the configuration from the process environment
    pub fn from_env(variant: Variant) -> Result<Self> {
        Self::from_lookup(variant, |key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    ///
    /// Missing or blank values fall back to the defaults.
    pub fn from_lookup<F>(variant: Variant, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = match non_blank(PORT_VAR) {
            Some(raw) => parse_port(&raw)?,
            None => DEFAULT_PORT,
        };

        let on_bind_failure = match non_blank(BIND_FAILURE_VAR) {
            Some(raw) => raw.parse()?,
            None => BindFailurePolicy::default(),
        };

        Ok(Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)),
            variant,
            on_bind_failure,
            ..Self::default()
        })
    }
}

fn parse_port(raw: &str) -> Result<u16> {
    raw.trim()
        .parse::<u16>()
        .map_err(|e| HelloError::Config(format!("invalid {PORT_VAR} '{}': {e}", raw.trim())))
}

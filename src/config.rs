//! Configuration
//!
//! Resolves the server settings from `config.toml` layered with
//! `VIGIL_FTP_*` environment overrides, then validates them once at
//! startup. All values have defaults so the server comes up on a bare
//! filesystem.

use std::net::Ipv4Addr;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address the control listener binds.
    pub bind_address: String,

    /// Control-connection port. Zero asks the OS for an ephemeral port.
    pub control_port: u16,

    /// Advertised address for PASV replies. When unset, the address the
    /// control connection arrived on is advertised.
    pub pasv_address: Option<String>,

    /// Fixed data port for PASV. When unset each channel gets an
    /// OS-assigned ephemeral port.
    pub pasv_port: Option<u16>,

    /// Directory backing the flat file namespace.
    pub storage_root: String,

    /// Path form accepted by CWD besides `/` and the empty string.
    pub mount_path: String,

    pub username: String,
    pub password: String,

    /// Files guarded by the integrity gate.
    pub protected_paths: Vec<String>,

    /// Cadence of the background integrity sweep.
    pub watchdog_interval_secs: u64,

    /// Upper bound on waiting for a client's data connection.
    pub data_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            control_port: 2121,
            pasv_address: None,
            pasv_port: None,
            storage_root: "./ftp_root".to_string(),
            mount_path: "/".to_string(),
            username: "device".to_string(),
            password: "changeme".to_string(),
            protected_paths: vec!["document.txt".to_string()],
            watchdog_interval_secs: 2,
            data_timeout_secs: 10,
        }
    }
}

impl ServerConfig {
    /// Loads `config.toml` (optional) with environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let defaults = ServerConfig::default();
        let settings = Config::builder()
            .set_default("bind_address", defaults.bind_address)?
            .set_default("control_port", i64::from(defaults.control_port))?
            .set_default("storage_root", defaults.storage_root)?
            .set_default("mount_path", defaults.mount_path)?
            .set_default("username", defaults.username)?
            .set_default("password", defaults.password)?
            .set_default("protected_paths", defaults.protected_paths)?
            .set_default(
                "watchdog_interval_secs",
                i64::try_from(defaults.watchdog_interval_secs).unwrap_or(2),
            )?
            .set_default(
                "data_timeout_secs",
                i64::try_from(defaults.data_timeout_secs).unwrap_or(10),
            )?
            .add_source(File::with_name("config").required(false))
            .add_source(Environment::with_prefix("VIGIL_FTP"))
            .build()?;

        let config: ServerConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.username.is_empty() || self.password.is_empty() {
            return Err(ConfigError::Message(
                "username and password must be set".into(),
            ));
        }
        if self.storage_root.is_empty() {
            return Err(ConfigError::Message("storage_root cannot be empty".into()));
        }
        if self.data_timeout_secs == 0 {
            return Err(ConfigError::Message(
                "data_timeout_secs must be at least 1".into(),
            ));
        }
        if self.watchdog_interval_secs == 0 {
            return Err(ConfigError::Message(
                "watchdog_interval_secs must be at least 1".into(),
            ));
        }
        if let Some(addr) = &self.pasv_address {
            addr.parse::<Ipv4Addr>().map_err(|_| {
                ConfigError::Message(format!("pasv_address {addr:?} is not an IPv4 address"))
            })?;
        }
        Ok(())
    }

    /// Bind target for the control listener.
    pub fn control_socket(&self) -> String {
        format!("{}:{}", self.bind_address, self.control_port)
    }

    /// The configured PASV address, if any. Validated at load time.
    pub fn pasv_ip(&self) -> Option<Ipv4Addr> {
        self.pasv_address.as_ref().and_then(|a| a.parse().ok())
    }

    pub fn data_timeout(&self) -> Duration {
        Duration::from_secs(self.data_timeout_secs)
    }

    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_secs(self.watchdog_interval_secs)
    }

    /// Whether a stored name falls under integrity protection.
    pub fn is_protected(&self, name: &str) -> bool {
        let name = name.trim_start_matches('/');
        self.protected_paths
            .iter()
            .any(|p| p.trim_start_matches('/') == name)
    }

    /// Whether a CWD argument denotes the (only) root directory.
    pub fn is_root_path(&self, path: &str) -> bool {
        path.is_empty() || path == "/" || path == self.mount_path
    }
}

//! Server configuration.
//!
//! Loaded from an optional YAML file; command-line flags override it.
//!
//! ```yaml
//! mongo:
//!   host: localhost
//!   port: 27017
//!   user: admin
//!   password: secret
//!   database: mcp
//! server:
//!   call_timeout_secs: 30
//!   counters_collection: counters
//!   transport: sse        # or stdio (default)
//!   address: 0.0.0.0:8080
//!   base_url: http://mcp.example.com:8080
//! ```

use std::path::Path;
use std::time::Duration;

use mongodb::options::{ClientOptions, Credential, ServerAddress};
use serde::Deserialize;

use crate::error::{McpError, Result};
use crate::sequence::DEFAULT_COUNTERS_COLLECTION;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Database connection
    pub mongo: MongoConfig,
    /// Tool-call behaviour
    pub server: ServerConfig,
}

/// MongoDB connection settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MongoConfig {
    /// Full connection string; takes precedence over host/port/credentials
    pub uri: Option<String>,
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// User name
    pub user: Option<String>,
    /// Password
    pub password: Option<String>,
    /// Database the tools operate on
    pub database: String,
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            uri: None,
            host: "localhost".to_string(),
            port: 27017,
            user: None,
            password: None,
            database: "mcp".to_string(),
        }
    }
}

/// How clients reach the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// JSON-RPC lines on stdin/stdout
    #[default]
    Stdio,
    /// HTTP with server-sent events
    Sse,
}

/// Tool-call and transport settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Deadline for a single tool call, in seconds
    pub call_timeout_secs: u64,
    /// Collection holding identifier counters
    pub counters_collection: String,
    /// Transport to serve on
    pub transport: Transport,
    /// Listen address for the SSE transport
    pub address: String,
    /// Public URL announced to SSE clients; defaults to `http://{address}`
    pub base_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            call_timeout_secs: 30,
            counters_collection: DEFAULT_COUNTERS_COLLECTION.to_string(),
            transport: Transport::Stdio,
            address: "127.0.0.1:8080".to_string(),
            base_url: None,
        }
    }
}

impl ServerConfig {
    /// The per-call deadline.
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    /// URL prefix of the message endpoint announced to SSE clients.
    pub fn base_url(&self) -> String {
        match &self.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://{}", self.address),
        }
    }
}

impl Config {
    /// Parse configuration from YAML text.
    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: Config =
            serde_yaml::from_str(text).map_err(|e| McpError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| McpError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_yaml(&text)
    }

    /// Load `path` if given, else `config.yaml` in the working directory if
    /// present, else defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let local = Path::new("config.yaml");
                if local.is_file() {
                    Self::load(local)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Reject settings the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.mongo.database.trim().is_empty() {
            return Err(McpError::Config("mongo.database must not be empty".to_string()));
        }
        if self.server.counters_collection.trim().is_empty() {
            return Err(McpError::Config(
                "server.counters_collection must not be empty".to_string(),
            ));
        }
        if self.server.transport == Transport::Sse && self.server.address.trim().is_empty() {
            return Err(McpError::Config(
                "server.address is required for the sse transport".to_string(),
            ));
        }
        if self.server.call_timeout_secs == 0 {
            return Err(McpError::Config(
                "server.call_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl MongoConfig {
    /// Driver options for this configuration.
    ///
    /// Credentials go through the driver's credential options rather than
    /// being spliced into a URI.
    pub async fn client_options(&self, app_name: &str) -> Result<ClientOptions> {
        let mut options = match &self.uri {
            Some(uri) => ClientOptions::parse(uri).await?,
            None => {
                let mut options = ClientOptions::default();
                options.hosts = vec![ServerAddress::Tcp {
                    host: self.host.clone(),
                    port: Some(self.port),
                }];
                options
            }
        };

        if self.uri.is_none() && self.user.is_some() {
            let mut credential = Credential::default();
            credential.username = self.user.clone();
            credential.password = self.password.clone();
            options.credential = Some(credential);
        }
        options.app_name = Some(app_name.to_string());
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.mongo.host, "localhost");
        assert_eq!(config.mongo.port, 27017);
        assert_eq!(config.mongo.database, "mcp");
        assert_eq!(config.server.counters_collection, "counters");
        assert_eq!(config.server.call_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = Config::from_yaml("mongo:\n  host: db.internal\n  user: admin\n").unwrap();
        assert_eq!(config.mongo.host, "db.internal");
        assert_eq!(config.mongo.user.as_deref(), Some("admin"));
        assert_eq!(config.mongo.port, 27017);
        assert_eq!(config.server.call_timeout_secs, 30);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(Config::from_yaml("server:\n  call_timeout_secs: 0\n").is_err());
        assert!(Config::from_yaml("mongo:\n  database: ''\n").is_err());
        assert!(Config::from_yaml("mongo: [").is_err());
    }

    #[test]
    fn test_sse_transport_settings() {
        let config = Config::default();
        assert_eq!(config.server.transport, Transport::Stdio);
        assert_eq!(config.server.base_url(), "http://127.0.0.1:8080");

        let config = Config::from_yaml(
            "server:\n  transport: sse\n  address: 0.0.0.0:9000\n  base_url: https://mcp.example.com/\n",
        )
        .unwrap();
        assert_eq!(config.server.transport, Transport::Sse);
        assert_eq!(config.server.address, "0.0.0.0:9000");
        assert_eq!(config.server.base_url(), "https://mcp.example.com");

        assert!(Config::from_yaml("server:\n  transport: sse\n  address: ''\n").is_err());
        assert!(Config::from_yaml("server:\n  transport: websocket\n").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "server:\n  counters_collection: seq").unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.server.counters_collection, "seq");

        assert!(Config::load(Path::new("/nonexistent/config.yaml")).is_err());
    }

    #[tokio::test]
    async fn test_client_options_from_host_and_credentials() {
        let mongo = MongoConfig {
            host: "db.internal".to_string(),
            port: 27018,
            user: Some("admin".to_string()),
            password: Some("p@ss:word".to_string()),
            ..MongoConfig::default()
        };
        let options = mongo.client_options("mongo-mcp").await.unwrap();
        assert_eq!(
            options.hosts,
            vec![ServerAddress::Tcp {
                host: "db.internal".to_string(),
                port: Some(27018)
            }]
        );
        let credential = options.credential.unwrap();
        assert_eq!(credential.username.as_deref(), Some("admin"));
        assert_eq!(credential.password.as_deref(), Some("p@ss:word"));
        assert_eq!(options.app_name.as_deref(), Some("mongo-mcp"));
    }
}

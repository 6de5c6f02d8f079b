//! Server configuration.
//!
//! Loads configuration from a TOML file with support for environment variable
//! expansion in string values. Variables use `$VAR` or `${VAR}` syntax.
//!
//! # Example Configuration
//!
//! ```toml
//! host = "0.0.0.0"
//! port = 8402
//!
//! [invoice]
//! price = 10
//! memo = "ping"
//! timeout_secs = 15
//!
//! [oracle]
//! kind = "lnd"
//! url = "https://localhost:8080"
//! macaroon_file = "$LND_DIR/invoice.macaroon"
//! tls_cert_file = "$LND_DIR/tls.cert"
//!
//! [storage]
//! kind = "sqlite"
//! path = "ln402.db"
//! ```
//!
//! # Environment Variables
//!
//! - `CONFIG` - Path to configuration file (default: `config.toml`)
//! - `HOST` - Override server bind address
//! - `PORT` - Override server port
//! - Secrets referenced by `$VAR` in the config file

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ln402::store::DEFAULT_DB_PATH;
use ln402::invoice::{DEFAULT_MEMO, DEFAULT_PRICE};
use ln402::{AnyStore, InvoiceOptions, MemoryStore, SqliteStore, StoreError};
use ln402_http::constants::{DEFAULT_CHARGE_URL, DEFAULT_LND_URL};
use ln402_http::oracle::{ChargeClient, LightningOracle, LndClient, OracleClientError};
use serde::{Deserialize, Serialize};

/// Errors raised while loading the configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        /// The configuration file.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The file is not valid TOML for [`ServerConfig`].
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address (default: `0.0.0.0`).
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Server port (default: `8402`).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Invoice price, memo and backend timeout.
    #[serde(default)]
    pub invoice: InvoiceConfig,

    /// Lightning backend.
    #[serde(default)]
    pub oracle: OracleConfig,

    /// Where invoice records are kept.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// The `[invoice]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceConfig {
    /// Price in satoshis. Values `<= 0` are raised to the default of 1.
    #[serde(default = "default_price")]
    pub price: i64,

    /// Invoice description.
    #[serde(default = "default_memo")]
    pub memo: String,

    /// Upper bound for each call to the node or the store, in seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for InvoiceConfig {
    fn default() -> Self {
        Self {
            price: default_price(),
            memo: default_memo(),
            timeout_secs: None,
        }
    }
}

impl InvoiceConfig {
    /// Price and memo for the gate, with the price normalized.
    #[must_use]
    pub fn options(&self) -> InvoiceOptions {
        InvoiceOptions::default()
            .with_signed_price(self.price)
            .with_memo(self.memo.as_str())
    }

    /// The configured backend timeout, if any.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// The `[oracle]` section, tagged by `kind`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum OracleConfig {
    /// lnd's REST gateway.
    Lnd {
        /// Gateway URL.
        #[serde(default = "default_lnd_url")]
        url: String,
        /// Macaroon authorizing invoice creation and lookup.
        #[serde(default = "default_macaroon_file")]
        macaroon_file: Option<PathBuf>,
        /// Certificate to trust, usually lnd's self-signed `tls.cert`.
        #[serde(default = "default_tls_cert_file")]
        tls_cert_file: Option<PathBuf>,
    },
    /// Lightning Charge.
    Charge {
        /// Server URL.
        #[serde(default = "default_charge_url")]
        url: String,
        /// API token configured when Charge was started.
        api_token: String,
    },
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self::Lnd {
            url: default_lnd_url(),
            macaroon_file: default_macaroon_file(),
            tls_cert_file: default_tls_cert_file(),
        }
    }
}

impl OracleConfig {
    /// Builds the configured client.
    ///
    /// # Errors
    ///
    /// Returns [`OracleClientError`] if the URL is invalid or a credential
    /// file cannot be read.
    pub fn connect(&self) -> Result<LightningOracle, OracleClientError> {
        match self {
            Self::Lnd {
                url,
                macaroon_file,
                tls_cert_file,
            } => {
                let mut client = LndClient::try_from(url.as_str())?;
                if let Some(path) = tls_cert_file {
                    client = client.with_tls_cert_file(path)?;
                }
                if let Some(path) = macaroon_file {
                    client = client.with_macaroon_file(path)?;
                }
                Ok(client.into())
            }
            Self::Charge { url, api_token } => {
                Ok(ChargeClient::from_url_str(url, api_token.as_str())?.into())
            }
        }
    }
}

/// The `[storage]` section, tagged by `kind`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Records live in process memory and are lost on restart.
    #[default]
    Memory,
    /// Records live in an SQLite database file.
    Sqlite {
        /// Database file.
        #[serde(default = "default_db_path")]
        path: PathBuf,
    },
}

impl StorageConfig {
    /// Opens the configured store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the database cannot be opened.
    pub fn open(&self) -> Result<AnyStore, StoreError> {
        match self {
            Self::Memory => Ok(MemoryStore::new().into()),
            Self::Sqlite { path } => Ok(SqliteStore::open(path)?.into()),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(std::net::Ipv4Addr::new(0, 0, 0, 0))
}

const fn default_port() -> u16 {
    8402
}

fn default_price() -> i64 {
    i64::try_from(DEFAULT_PRICE).unwrap_or(1)
}

fn default_memo() -> String {
    DEFAULT_MEMO.to_owned()
}

fn default_lnd_url() -> String {
    DEFAULT_LND_URL.to_owned()
}

fn default_charge_url() -> String {
    DEFAULT_CHARGE_URL.to_owned()
}

#[allow(clippy::unnecessary_wraps)]
fn default_macaroon_file() -> Option<PathBuf> {
    Some(PathBuf::from("invoice.macaroon"))
}

#[allow(clippy::unnecessary_wraps)]
fn default_tls_cert_file() -> Option<PathBuf> {
    Some(PathBuf::from("tls.cert"))
}

fn default_db_path() -> PathBuf {
    PathBuf::from(DEFAULT_DB_PATH)
}

impl ServerConfig {
    /// Loads configuration from a specific file path.
    ///
    /// A missing file yields the defaults. `HOST` and `PORT` env vars
    /// override the file values.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = if path.exists() {
            std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_owned(),
                source,
            })?
        } else {
            tracing::warn!(path = %path.display(), "Config file not found, using defaults");
            String::new()
        };

        let mut config = Self::from_toml(&content)?;

        // Allow HOST / PORT env overrides
        if let Ok(host) = std::env::var("HOST") {
            if let Ok(addr) = host.parse() {
                config.host = addr;
            }
        }
        if let Ok(port) = std::env::var("PORT") {
            if let Ok(p) = port.parse() {
                config.port = p;
            }
        }

        Ok(config)
    }

    /// Parses configuration from TOML, expanding environment variables first.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the document is invalid.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(&expand_env_vars(content))?)
    }
}

/// Expands `$VAR` and `${VAR}` patterns in a string from environment variables.
///
/// Unresolved variables are left as-is.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' {
            result.push(ch);
            continue;
        }

        let braced = chars.next_if_eq(&'{').is_some();
        let mut var_name = String::new();
        let mut closed = false;
        while let Some(&c) = chars.peek() {
            if braced {
                if c == '}' {
                    chars.next();
                    closed = true;
                    break;
                }
            } else if !c.is_ascii_alphanumeric() && c != '_' {
                break;
            }
            var_name.push(c);
            chars.next();
        }

        match std::env::var(&var_name) {
            Ok(val) if !var_name.is_empty() => result.push_str(&val),
            _ => {
                result.push('$');
                if braced {
                    result.push('{');
                }
                result.push_str(&var_name);
                if closed {
                    result.push('}');
                }
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = ServerConfig::from_toml("").unwrap();
        assert_eq!(config.port, 8402);
        assert_eq!(config.invoice.options(), InvoiceOptions::default());
        assert_eq!(config.invoice.timeout(), None);
        assert!(matches!(config.storage, StorageConfig::Memory));
        match config.oracle {
            OracleConfig::Lnd {
                url, macaroon_file, ..
            } => {
                assert_eq!(url, DEFAULT_LND_URL);
                assert_eq!(macaroon_file, Some(PathBuf::from("invoice.macaroon")));
            }
            OracleConfig::Charge { .. } => panic!("expected lnd"),
        }
    }

    #[test]
    fn test_full_config() {
        let config = ServerConfig::from_toml(
            r#"
            host = "127.0.0.1"
            port = 9000

            [invoice]
            price = 25
            memo = "weather"
            timeout_secs = 3

            [oracle]
            kind = "charge"
            url = "http://charge:9112"
            api_token = "tok"

            [storage]
            kind = "sqlite"
            path = "/var/lib/ln402/records.db"
            "#,
        )
        .unwrap();

        assert_eq!(config.host.to_string(), "127.0.0.1");
        assert_eq!(config.port, 9000);
        assert_eq!(config.invoice.options(), InvoiceOptions::new(25, "weather"));
        assert_eq!(config.invoice.timeout(), Some(Duration::from_secs(3)));
        assert!(matches!(
            config.oracle,
            OracleConfig::Charge { ref url, ref api_token } if url == "http://charge:9112" && api_token == "tok"
        ));
        assert!(matches!(
            config.storage,
            StorageConfig::Sqlite { ref path } if path == Path::new("/var/lib/ln402/records.db")
        ));
    }

    #[test]
    fn test_non_positive_price_is_raised() {
        for price in ["-5", "0"] {
            let config = ServerConfig::from_toml(&format!("[invoice]\nprice = {price}\n")).unwrap();
            assert_eq!(config.invoice.options().price, 1, "price {price}");
            assert_eq!(config.invoice.options().memo, "API call");
        }
    }

    #[test]
    fn test_charge_requires_token() {
        assert!(ServerConfig::from_toml("[oracle]\nkind = \"charge\"\n").is_err());
        assert!(ServerConfig::from_toml("[oracle]\nkind = \"eclair\"\n").is_err());
    }

    #[test]
    fn test_expand_env_vars() {
        let path = std::env::var("PATH").unwrap();
        assert_eq!(expand_env_vars("a=$PATH;"), format!("a={path};"));
        assert_eq!(expand_env_vars("${PATH}x"), format!("{path}x"));
        assert_eq!(
            expand_env_vars("$LN402_TEST_SURELY_UNSET ${LN402_TEST_SURELY_UNSET}"),
            "$LN402_TEST_SURELY_UNSET ${LN402_TEST_SURELY_UNSET}"
        );
        assert_eq!(expand_env_vars("cost: 5$"), "cost: 5$");
        assert_eq!(expand_env_vars("${"), "${");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::load_from(&dir.path().join("absent.toml")).unwrap();
        assert!(matches!(config.storage, StorageConfig::Memory));
    }

    #[test]
    fn test_open_sqlite_storage() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageConfig::Sqlite {
            path: dir.path().join("records.db"),
        };
        assert!(matches!(storage.open().unwrap(), AnyStore::Sqlite(_)));
        assert!(matches!(StorageConfig::Memory.open().unwrap(), AnyStore::Memory(_)));
    }

    #[test]
    fn test_connect_charge() {
        let oracle = OracleConfig::Charge {
            url: DEFAULT_CHARGE_URL.to_owned(),
            api_token: "tok".to_owned(),
        }
        .connect()
        .unwrap();
        assert!(matches!(oracle, LightningOracle::Charge(_)));
    }

    #[test]
    fn test_connect_lnd_missing_macaroon() {
        let oracle = OracleConfig::Lnd {
            url: DEFAULT_LND_URL.to_owned(),
            macaroon_file: Some(PathBuf::from("/nonexistent/invoice.macaroon")),
            tls_cert_file: None,
        };
        assert!(matches!(oracle.connect(), Err(OracleClientError::Io { .. })));
    }
}

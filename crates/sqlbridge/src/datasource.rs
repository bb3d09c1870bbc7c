//! Data source descriptors and credentials.
//!
//! A [`DataSource`] is the caller's free-form connection info. Resolving it
//! against a driver validates the info and computes the connection string,
//! producing a [`ResolvedDataSource`] that can no longer change. The resolved
//! descriptor's [`key`](ResolvedDataSource::key) is what the registry
//! deduplicates services by.

use crate::driver::{self, Driver};
use crate::error::{BridgeError, BridgeResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

/// Username and password for the database user.
#[derive(Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Credentials {
    name: Option<String>,
    password: Option<String>,
}

impl Credentials {
    pub fn new(name: Option<String>, password: Option<String>) -> Self {
        Self { name, password }
    }

    /// Shared instance for this name/password pair.
    ///
    /// Identical pairs return the same `Arc` for the lifetime of the process.
    pub fn interned(name: Option<&str>, password: Option<&str>) -> Arc<Credentials> {
        type Table = HashMap<(Option<String>, Option<String>), Arc<Credentials>>;
        static TABLE: OnceLock<Mutex<Table>> = OnceLock::new();

        let key = (name.map(str::to_string), password.map(str::to_string));
        let mut table = TABLE
            .get_or_init(|| Mutex::new(HashMap::new()))
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        Arc::clone(
            table
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Credentials::new(key.0, key.1))),
        )
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("name", &self.name)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Unresolved connection info.
#[derive(Debug, Clone)]
pub struct DataSource {
    info: BTreeMap<String, String>,
    credentials: Option<Arc<Credentials>>,
}

impl DataSource {
    pub fn new(info: BTreeMap<String, String>, credentials: Option<Arc<Credentials>>) -> Self {
        Self { info, credentials }
    }

    /// Build from any iterator of key/value pairs.
    pub fn from_pairs<K, V>(
        pairs: impl IntoIterator<Item = (K, V)>,
        credentials: Option<Arc<Credentials>>,
    ) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let info = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self { info, credentials }
    }

    pub fn info(&self) -> &BTreeMap<String, String> {
        &self.info
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_deref()
    }

    /// Validate the info for `driver` and compute the connection string.
    ///
    /// `supported` is the set of drivers the runtime can actually open.
    pub fn resolve(self, driver: Driver, supported: &[Driver]) -> BridgeResult<ResolvedDataSource> {
        if !supported.contains(&driver) {
            return Err(BridgeError::config(format!(
                "Invalid driver or driver not supported: '{driver}'. Supported drivers: {}",
                driver::join_tags(supported)
            )));
        }

        let target = match driver {
            Driver::MySql => MySqlTarget::from_info(&self.info)?,
        };
        let dsn = target.dsn_string();

        Ok(ResolvedDataSource {
            info: self.info,
            credentials: self.credentials,
            driver,
            dsn,
            target,
        })
    }

    /// Like [`resolve`](Self::resolve), with the driver given by tag.
    pub fn resolve_tag(self, tag: &str, supported: &[Driver]) -> BridgeResult<ResolvedDataSource> {
        let driver = Driver::from_tag(tag)?;
        self.resolve(driver, supported)
    }
}

/// Where a MySQL server is reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Socket(String),
    Tcp { host: String, port: Option<u16> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct MySqlTarget {
    endpoint: Endpoint,
    database: String,
    charset: String,
}

const DEFAULT_CHARSET: &str = "utf8mb4";

impl MySqlTarget {
    fn from_info(info: &BTreeMap<String, String>) -> BridgeResult<Self> {
        let get = |k: &str| info.get(k).filter(|v| !v.is_empty());

        let database = get("database")
            .ok_or_else(|| BridgeError::config("No database name specified."))?
            .clone();

        let (socket, host, port) = (get("socket"), get("host"), get("port"));

        if socket.is_none() && host.is_none() {
            return Err(BridgeError::config(
                "Neither the MySQL Unix socket nor the hostname for the database server defined.",
            ));
        }
        if port.is_some() && host.is_none() {
            return Err(BridgeError::config(
                "Can't specify database server port number without defining a hostname for the database server.",
            ));
        }
        if socket.is_some() && (host.is_some() || port.is_some()) {
            return Err(BridgeError::config(
                "The MySQL Unix socket shouldn't be defined at the same time as a hostname or a port number for the server.",
            ));
        }

        let endpoint = match (socket, host) {
            (Some(socket), _) => Endpoint::Socket(socket.clone()),
            (None, Some(host)) => {
                let port = port
                    .map(|p| {
                        p.parse::<u16>().map_err(|_| {
                            BridgeError::config(format!("Invalid port number '{p}'."))
                        })
                    })
                    .transpose()?;
                Endpoint::Tcp {
                    host: host.clone(),
                    port,
                }
            }
            (None, None) => unreachable!("checked above"),
        };

        let charset = get("charset")
            .cloned()
            .unwrap_or_else(|| DEFAULT_CHARSET.to_string());

        Ok(Self {
            endpoint,
            database,
            charset,
        })
    }

    fn dsn_string(&self) -> String {
        let mut dsn = String::from("mysql:");
        match &self.endpoint {
            Endpoint::Socket(socket) => dsn.push_str(&format!("unix_socket={socket};")),
            Endpoint::Tcp { host, port } => {
                dsn.push_str(&format!("host={host};"));
                if let Some(port) = port {
                    dsn.push_str(&format!("port={port};"));
                }
            }
        }
        dsn.push_str(&format!("dbname={};charset={}", self.database, self.charset));
        dsn
    }
}

/// Opaque identity of a resolved data source.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DataSourceKey(String);

impl fmt::Debug for DataSourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The key embeds credentials.
        f.write_str("DataSourceKey(..)")
    }
}

/// A validated descriptor with its connection string.
#[derive(Debug, Clone)]
pub struct ResolvedDataSource {
    info: BTreeMap<String, String>,
    credentials: Option<Arc<Credentials>>,
    driver: Driver,
    dsn: String,
    target: MySqlTarget,
}

impl ResolvedDataSource {
    pub fn driver(&self) -> Driver {
        self.driver
    }

    /// Driver-qualified connection string, e.g. `mysql:host=db;dbname=app;charset=utf8mb4`.
    pub fn dsn(&self) -> &str {
        &self.dsn
    }

    pub fn info(&self) -> &BTreeMap<String, String> {
        &self.info
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_deref()
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.target.endpoint
    }

    pub fn database(&self) -> &str {
        &self.target.database
    }

    pub fn charset(&self) -> &str {
        &self.target.charset
    }

    /// Identity used to deduplicate connections.
    ///
    /// Serialization of the sorted info map plus credentials, so two
    /// descriptors built from the same entries in any order share a key.
    pub fn key(&self) -> DataSourceKey {
        #[derive(Serialize)]
        struct Identity<'a> {
            info: &'a BTreeMap<String, String>,
            credentials: Option<&'a Credentials>,
        }

        let identity = Identity {
            info: &self.info,
            credentials: self.credentials.as_deref(),
        };
        // A map of strings always serializes.
        let json = serde_json::to_string(&identity).unwrap_or_default();
        DataSourceKey(json)
    }

    /// Short description safe for logs (no credentials).
    pub fn describe(&self) -> String {
        match &self.target.endpoint {
            Endpoint::Socket(socket) => format!("{}:{}@{}", self.driver, socket, self.database()),
            Endpoint::Tcp { host, port } => match port {
                Some(port) => format!("{}://{}:{}/{}", self.driver, host, port, self.database()),
                None => format!("{}://{}/{}", self.driver, host, self.database()),
            },
        }
    }
}

/// Connection settings as they appear in an application config file.
///
/// ```ignore
/// let cfg: DataSourceConfig = serde_json::from_str(r#"{
///     "host": "127.0.0.1", "port": 3306, "database": "app",
///     "username": "app", "password": "secret"
/// }"#)?;
/// let dsn = cfg.into_data_source();
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DataSourceConfig {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub socket: Option<String>,
    pub database: String,
    #[serde(default)]
    pub charset: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Additional driver-specific keys, carried verbatim.
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl DataSourceConfig {
    pub fn into_data_source(self) -> DataSource {
        let mut info = self.extra;
        info.insert("database".to_string(), self.database);
        if let Some(host) = self.host {
            info.insert("host".to_string(), host);
        }
        if let Some(port) = self.port {
            info.insert("port".to_string(), port.to_string());
        }
        if let Some(socket) = self.socket {
            info.insert("socket".to_string(), socket);
        }
        if let Some(charset) = self.charset {
            info.insert("charset".to_string(), charset);
        }

        let credentials = (self.username.is_some() || self.password.is_some()).then(|| {
            Credentials::interned(self.username.as_deref(), self.password.as_deref())
        });

        DataSource::new(info, credentials)
    }
}

//! Configuration type definitions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ExportError;

/// Source database engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Microsoft SQL Server, read via ODBC.
    #[serde(alias = "mssql")]
    SqlServer,
    /// PostgreSQL, read via the native postgres scanner.
    #[serde(alias = "postgresql")]
    Postgres,
    /// Oracle, read via ODBC.
    Oracle,
}

impl EngineKind {
    /// Default port for the engine.
    pub fn default_port(self) -> u16 {
        match self {
            EngineKind::SqlServer => 1433,
            EngineKind::Postgres => 5432,
            EngineKind::Oracle => 1521,
        }
    }

    /// Whether the engine is read through the ODBC scanner.
    pub fn is_odbc(self) -> bool {
        matches!(self, EngineKind::SqlServer | EngineKind::Oracle)
    }

    /// Canonical lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            EngineKind::SqlServer => "sqlserver",
            EngineKind::Postgres => "postgres",
            EngineKind::Oracle => "oracle",
        }
    }
}

impl FromStr for EngineKind {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sqlserver" | "mssql" => Ok(EngineKind::SqlServer),
            "postgres" | "postgresql" => Ok(EngineKind::Postgres),
            "oracle" => Ok(EngineKind::Oracle),
            other => Err(ExportError::UnsupportedEngine(other.to_string())),
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source authentication mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Username/password authentication.
    #[default]
    Password,
    /// Windows-integrated authentication (SQL Server only).
    Windows,
}

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source database configuration.
    pub source: SourceConfig,

    /// Object storage (S3) configuration.
    pub storage: StorageConfig,

    /// Export behavior configuration.
    #[serde(default)]
    pub export: ExportConfig,
}

/// Source database configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Engine kind.
    pub engine: EngineKind,

    /// Database host.
    pub host: String,

    /// Database port. Defaults to the engine's standard port.
    #[serde(default)]
    pub port: Option<u16>,

    /// Database name (service name for Oracle).
    pub database: String,

    /// Authentication mode (default: password).
    #[serde(default)]
    pub auth: AuthMode,

    /// Username. Optional under windows-integrated auth.
    #[serde(default)]
    pub user: String,

    /// Password. Optional under windows-integrated auth.
    #[serde(default, skip_serializing)]
    pub password: String,
}

impl SourceConfig {
    /// Effective port, falling back to the engine default.
    pub fn port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.engine.default_port())
    }

    /// ODBC connection string for the DuckDB nanodbc scanner.
    ///
    /// Only meaningful for SQL Server and Oracle; PostgreSQL sources use
    /// [`native_connection_string`](Self::native_connection_string).
    pub fn odbc_connection_string(&self) -> String {
        match self.engine {
            EngineKind::SqlServer => match self.auth {
                AuthMode::Windows => format!(
                    "Driver={{ODBC Driver 17 for SQL Server}};Server={},{};Database={};Trusted_Connection=yes;",
                    self.host,
                    self.port(),
                    self.database
                ),
                AuthMode::Password => format!(
                    "Driver={{ODBC Driver 17 for SQL Server}};Server={},{};Database={};Uid={};Pwd={};",
                    self.host,
                    self.port(),
                    self.database,
                    self.user,
                    self.password
                ),
            },
            EngineKind::Oracle => format!(
                "Driver={{Oracle in OraClient19Home1}};DBQ={}:{}/{};Uid={};Pwd={};",
                self.host,
                self.port(),
                self.database,
                self.user,
                self.password
            ),
            EngineKind::Postgres => self.native_connection_string(),
        }
    }

    /// Key/value connection string for the native postgres scanner and
    /// the tokio-postgres catalog connection.
    pub fn native_connection_string(&self) -> String {
        format!(
            "host={} port={} dbname={} user={} password={}",
            self.host,
            self.port(),
            self.database,
            self.user,
            self.password
        )
    }
}

impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("engine", &self.engine)
            .field("host", &self.host)
            .field("port", &self.port())
            .field("database", &self.database)
            .field("auth", &self.auth)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Object storage configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root path for all artifacts, e.g. `s3://bucket/prefix`.
    /// A trailing slash is stripped on load.
    pub bucket_root: String,

    /// AWS region (default: us-east-1).
    #[serde(default = "default_region")]
    pub region: String,

    /// Static access key id. Ignored when `aws_profile` is set.
    #[serde(default)]
    pub access_key_id: Option<String>,

    /// Static secret access key.
    #[serde(default, skip_serializing)]
    pub secret_access_key: Option<String>,

    /// Session token for temporary credentials.
    #[serde(default, skip_serializing)]
    pub session_token: Option<String>,

    /// AWS profile name. When set, the credential chain is used instead
    /// of static keys.
    #[serde(default)]
    pub aws_profile: Option<String>,
}

impl fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageConfig")
            .field("bucket_root", &self.bucket_root)
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .field("session_token", &"[REDACTED]")
            .field("aws_profile", &self.aws_profile)
            .finish()
    }
}

/// Export behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// On remote write failure, retry the write under a local directory
    /// with the storage scheme prefix stripped (default: true).
    #[serde(default = "default_true")]
    pub local_fallback: bool,

    /// Directory for fallback writes (default: `local_export`).
    #[serde(default = "default_fallback_dir")]
    pub local_fallback_dir: String,

    /// Parquet compression codec (default: zstd).
    #[serde(default = "default_compression")]
    pub compression: String,

    /// Parquet row group size (default: 100000).
    #[serde(default = "default_row_group_size")]
    pub row_group_size: usize,

    /// Statement timeout for source and storage calls, in seconds.
    /// Zero leaves the drivers at their defaults. The upstream design
    /// left this unspecified, so it is exposed here as configuration.
    #[serde(default)]
    pub statement_timeout_secs: u64,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            local_fallback: default_true(),
            local_fallback_dir: default_fallback_dir(),
            compression: default_compression(),
            row_group_size: default_row_group_size(),
            statement_timeout_secs: 0,
        }
    }
}

// Default value functions for serde

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_true() -> bool {
    true
}

fn default_fallback_dir() -> String {
    "local_export".to_string()
}

fn default_compression() -> String {
    "zstd".to_string()
}

fn default_row_group_size() -> usize {
    100_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_kind_from_str() {
        assert_eq!("sqlserver".parse::<EngineKind>().unwrap(), EngineKind::SqlServer);
        assert_eq!("mssql".parse::<EngineKind>().unwrap(), EngineKind::SqlServer);
        assert_eq!("postgresql".parse::<EngineKind>().unwrap(), EngineKind::Postgres);
        assert_eq!("Oracle".parse::<EngineKind>().unwrap(), EngineKind::Oracle);
        assert!(matches!(
            "db2".parse::<EngineKind>(),
            Err(crate::error::ExportError::UnsupportedEngine(_))
        ));
    }

    #[test]
    fn test_default_ports() {
        assert_eq!(EngineKind::SqlServer.default_port(), 1433);
        assert_eq!(EngineKind::Postgres.default_port(), 5432);
        assert_eq!(EngineKind::Oracle.default_port(), 1521);
    }

    #[test]
    fn test_source_config_debug_redacts_password() {
        let config = SourceConfig {
            engine: EngineKind::SqlServer,
            host: "localhost".into(),
            port: None,
            database: "db".into(),
            auth: AuthMode::Password,
            user: "sa".into(),
            password: "super_secret_password_123".into(),
        };
        let debug_output = format!("{:?}", config);
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_password_123"));
    }

    #[test]
    fn test_source_config_password_not_serialized() {
        let config = SourceConfig {
            engine: EngineKind::Postgres,
            host: "localhost".into(),
            port: Some(5432),
            database: "db".into(),
            auth: AuthMode::Password,
            user: "postgres".into(),
            password: "secret_password".into(),
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret_password"), "password serialized: {}", json);
    }

    #[test]
    fn test_odbc_connection_string_windows_auth() {
        let config = SourceConfig {
            engine: EngineKind::SqlServer,
            host: "sqlhost".into(),
            port: None,
            database: "Northwind".into(),
            auth: AuthMode::Windows,
            user: String::new(),
            password: String::new(),
        };
        assert_eq!(
            config.odbc_connection_string(),
            "Driver={ODBC Driver 17 for SQL Server};Server=sqlhost,1433;Database=Northwind;Trusted_Connection=yes;"
        );
    }

    #[test]
    fn test_odbc_connection_string_oracle() {
        let config = SourceConfig {
            engine: EngineKind::Oracle,
            host: "orahost".into(),
            port: Some(1521),
            database: "ORCLPDB1".into(),
            auth: AuthMode::Password,
            user: "scott".into(),
            password: "tiger".into(),
        };
        assert_eq!(
            config.odbc_connection_string(),
            "Driver={Oracle in OraClient19Home1};DBQ=orahost:1521/ORCLPDB1;Uid=scott;Pwd=tiger;"
        );
    }

    #[test]
    fn test_native_connection_string() {
        let config = SourceConfig {
            engine: EngineKind::Postgres,
            host: "pghost".into(),
            port: None,
            database: "appdb".into(),
            auth: AuthMode::Password,
            user: "app".into(),
            password: "pw".into(),
        };
        assert_eq!(
            config.native_connection_string(),
            "host=pghost port=5432 dbname=appdb user=app password=pw"
        );
    }

    #[test]
    fn test_storage_config_debug_redacts_secrets() {
        let config = StorageConfig {
            bucket_root: "s3://bucket".into(),
            region: "us-east-1".into(),
            access_key_id: Some("AKIA123".into()),
            secret_access_key: Some("very_secret_key".into()),
            session_token: None,
            aws_profile: None,
        };
        let debug_output = format!("{:?}", config);
        assert!(!debug_output.contains("very_secret_key"));
    }
}

//! Configuration validation.

use tracing::warn;

use super::types::{AuthMode, Config, EngineKind};
use crate::error::{ExportError, Result};

/// Validate a loaded configuration.
///
/// Catches the mistakes that would otherwise surface mid-run: missing
/// credentials, an unusable auth mode for the engine, a storage root
/// without a scheme.
pub fn validate_config(config: &Config) -> Result<()> {
    validate_source(config)?;
    validate_storage(config)?;
    validate_export(config)?;
    Ok(())
}

fn validate_source(config: &Config) -> Result<()> {
    let source = &config.source;

    if source.host.is_empty() {
        return Err(ExportError::Config("source.host must not be empty".into()));
    }
    if source.database.is_empty() {
        return Err(ExportError::Config(
            "source.database must not be empty".into(),
        ));
    }

    match source.auth {
        AuthMode::Windows => {
            if source.engine != EngineKind::SqlServer {
                return Err(ExportError::Config(format!(
                    "windows auth is only supported for sqlserver sources, not {}",
                    source.engine
                )));
            }
        }
        AuthMode::Password => {
            if source.user.is_empty() {
                return Err(ExportError::Config(
                    "source.user is required for password auth".into(),
                ));
            }
            if source.password.is_empty() {
                warn!(
                    engine = %source.engine,
                    "source.password is empty; the source may reject the connection"
                );
            }
        }
    }

    Ok(())
}

fn validate_storage(config: &Config) -> Result<()> {
    let storage = &config.storage;

    if storage.bucket_root.is_empty() {
        return Err(ExportError::Config(
            "storage.bucket_root must not be empty".into(),
        ));
    }
    if !storage.bucket_root.starts_with("s3://") {
        return Err(ExportError::Config(format!(
            "storage.bucket_root must start with s3://, got '{}'",
            storage.bucket_root
        )));
    }

    let has_static_keys =
        storage.access_key_id.is_some() || storage.secret_access_key.is_some();
    if has_static_keys
        && (storage.access_key_id.is_none() || storage.secret_access_key.is_none())
    {
        return Err(ExportError::Config(
            "storage.access_key_id and storage.secret_access_key must be set together".into(),
        ));
    }
    if has_static_keys && storage.aws_profile.is_some() {
        warn!("both static keys and aws_profile are set; aws_profile takes precedence");
    }

    Ok(())
}

fn validate_export(config: &Config) -> Result<()> {
    let export = &config.export;

    if export.row_group_size == 0 {
        return Err(ExportError::Config(
            "export.row_group_size must be greater than zero".into(),
        ));
    }
    if export.local_fallback && export.local_fallback_dir.is_empty() {
        return Err(ExportError::Config(
            "export.local_fallback_dir must not be empty when local_fallback is enabled".into(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::{ExportConfig, SourceConfig, StorageConfig};

    fn valid_config() -> Config {
        Config {
            source: SourceConfig {
                engine: EngineKind::Postgres,
                host: "localhost".into(),
                port: None,
                database: "appdb".into(),
                auth: AuthMode::Password,
                user: "app".into(),
                password: "pw".into(),
            },
            storage: StorageConfig {
                bucket_root: "s3://bucket/exports".into(),
                region: "us-east-1".into(),
                access_key_id: None,
                secret_access_key: None,
                session_token: None,
                aws_profile: None,
            },
            export: ExportConfig::default(),
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(validate_config(&valid_config()).is_ok());
    }

    #[test]
    fn test_empty_host_rejected() {
        let mut config = valid_config();
        config.source.host = String::new();
        assert!(matches!(
            validate_config(&config),
            Err(ExportError::Config(_))
        ));
    }

    #[test]
    fn test_windows_auth_rejected_for_postgres() {
        let mut config = valid_config();
        config.source.auth = AuthMode::Windows;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("windows auth"));
    }

    #[test]
    fn test_windows_auth_accepted_for_sqlserver() {
        let mut config = valid_config();
        config.source.engine = EngineKind::SqlServer;
        config.source.auth = AuthMode::Windows;
        config.source.user = String::new();
        config.source.password = String::new();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_missing_user_for_password_auth() {
        let mut config = valid_config();
        config.source.user = String::new();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_bucket_root_requires_scheme() {
        let mut config = valid_config();
        config.storage.bucket_root = "bucket/exports".into();
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("s3://"));
    }

    #[test]
    fn test_partial_static_keys_rejected() {
        let mut config = valid_config();
        config.storage.access_key_id = Some("AKIA123".into());
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_zero_row_group_size_rejected() {
        let mut config = valid_config();
        config.export.row_group_size = 0;
        assert!(validate_config(&config).is_err());
    }
}

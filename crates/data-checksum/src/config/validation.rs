//! Configuration validation.

use regex::Regex;

use super::{Config, ConnectionConfig, TrackingBackend};
use crate::core::TableRef;
use crate::error::{ChecksumError, Result};

fn validate_connection(side: &str, conn: &ConnectionConfig) -> Result<()> {
    if conn.host.is_empty() {
        return Err(ChecksumError::Config(format!("{}.host is required", side)));
    }
    if conn.user.is_empty() {
        return Err(ChecksumError::Config(format!("{}.user is required", side)));
    }
    if conn.r#type != "mysql" {
        return Err(ChecksumError::Config(format!(
            "{}.type must be 'mysql', got '{}'",
            side, conn.r#type
        )));
    }
    if let Some(0) = conn.max_connections {
        return Err(ChecksumError::Config(format!(
            "{}.max_connections must be at least 1",
            side
        )));
    }
    Ok(())
}

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    validate_connection("source", &config.source)?;
    validate_connection("target", &config.target)?;

    // Table selection
    let tables = &config.tables;
    if tables.pairs.is_empty() && tables.source_databases.is_empty() {
        return Err(ChecksumError::Config(
            "tables.pairs or tables.source_databases is required".into(),
        ));
    }
    for pair in &tables.pairs {
        for name in std::iter::once(&pair.source).chain(pair.target.iter()) {
            if TableRef::parse(name).is_none() {
                return Err(ChecksumError::Config(format!(
                    "tables.pairs entry '{}' must be written as database.table",
                    name
                )));
            }
        }
    }
    if !tables.target_databases.is_empty()
        && tables.target_databases.len() != tables.source_databases.len()
    {
        return Err(ChecksumError::Config(format!(
            "tables.target_databases has {} entries but tables.source_databases has {}",
            tables.target_databases.len(),
            tables.source_databases.len()
        )));
    }
    if let Some(pattern) = &tables.source_table_regex {
        Regex::new(pattern)?;
    }

    // Checksum config validation - only check if explicitly set
    if let Some(0) = config.checksum.workers {
        return Err(ChecksumError::Config(
            "checksum.workers must be at least 1".into(),
        ));
    }
    if let Some(0) = config.checksum.chunk_size {
        return Err(ChecksumError::Config(
            "checksum.chunk_size must be at least 1".into(),
        ));
    }
    if let Some(time_range) = &config.checksum.time_range {
        time_range.parse()?;
    }

    if let Some(tracking) = &config.tracking {
        match tracking.backend {
            TrackingBackend::Mysql => {
                if tracking.host.is_empty() {
                    return Err(ChecksumError::Config(
                        "tracking.host is required for the mysql backend".into(),
                    ));
                }
                if tracking.database.is_empty() {
                    return Err(ChecksumError::Config(
                        "tracking.database must not be empty".into(),
                    ));
                }
            }
            TrackingBackend::File => {
                if tracking.path.is_none() {
                    return Err(ChecksumError::Config(
                        "tracking.path is required for the file backend".into(),
                    ));
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        ChecksumConfig, TablePairConfig, TablesConfig, TimeRangeConfig, TrackingConfig,
    };

    fn connection(host: &str) -> ConnectionConfig {
        ConnectionConfig {
            r#type: "mysql".to_string(),
            host: host.to_string(),
            port: 3306,
            user: "checker".to_string(),
            password: "password".to_string(),
            database: String::new(),
            timeout_secs: 30,
            max_connections: None,
        }
    }

    fn valid_config() -> Config {
        Config {
            source: connection("source.local"),
            target: connection("target.local"),
            tables: TablesConfig {
                pairs: vec![TablePairConfig {
                    source: "shop.orders".to_string(),
                    target: Some("shop_copy.orders".to_string()),
                }],
                ..Default::default()
            },
            checksum: ChecksumConfig::default(),
            tracking: None,
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_missing_source_host() {
        let mut config = valid_config();
        config.source.host = "".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_wrong_target_type() {
        let mut config = valid_config();
        config.target.r#type = "postgres".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_workers() {
        let mut config = valid_config();
        config.checksum.workers = Some(0);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_no_tables_selected() {
        let mut config = valid_config();
        config.tables = TablesConfig::default();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_malformed_pair() {
        let mut config = valid_config();
        config.tables.pairs[0].source = "orders".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_bad_table_regex() {
        let mut config = valid_config();
        config.tables.source_table_regex = Some("(unclosed".to_string());
        assert!(matches!(validate(&config), Err(ChecksumError::Regex(_))));
    }

    #[test]
    fn test_time_range_end_before_begin() {
        let mut config = valid_config();
        config.checksum.time_range = Some(TimeRangeConfig {
            column: "updated_at".into(),
            begin: "2024-02-01 00:00:00".into(),
            end: "2024-01-01 00:00:00".into(),
            step_secs: 3600,
        });
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_file_tracking_requires_path() {
        let mut config = valid_config();
        config.tracking = Some(TrackingConfig {
            backend: TrackingBackend::File,
            host: String::new(),
            port: 3306,
            user: String::new(),
            password: String::new(),
            database: "_data_checksum".into(),
            path: None,
        });
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_source_config_debug_redacts_password() {
        let mut config = valid_config();
        config.source.password = "super_secret_password_123".to_string();
        let debug_output = format!("{:?}", config.source);
        assert!(
            debug_output.contains("[REDACTED]"),
            "Debug output should contain [REDACTED]"
        );
        assert!(
            !debug_output.contains("super_secret_password_123"),
            "Debug output should not contain actual password value"
        );
    }
}

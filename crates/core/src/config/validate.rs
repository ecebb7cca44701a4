use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - At least one resolver and a non-empty queue
/// - Non-zero resolve timeout, and a suppression window longer than it
/// - Server port is not 0 when the status server is enabled
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let crawler = &config.crawler;

    if crawler.num_resolvers == 0 {
        return Err(ConfigError::ValidationError(
            "crawler.num_resolvers must be at least 1".to_string(),
        ));
    }

    if crawler.hash_queue_length == 0 {
        return Err(ConfigError::ValidationError(
            "crawler.hash_queue_length must be at least 1".to_string(),
        ));
    }

    if crawler.resolve_timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "crawler.resolve_timeout_secs cannot be 0".to_string(),
        ));
    }

    if crawler.resolve_window_secs <= crawler.resolve_timeout_secs {
        return Err(ConfigError::ValidationError(format!(
            "crawler.resolve_window_secs ({}) must be longer than crawler.resolve_timeout_secs ({})",
            crawler.resolve_window_secs, crawler.resolve_timeout_secs
        )));
    }

    if config.server.enabled && config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CrawlerConfig, ServerConfig};

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_zero_resolvers_fails() {
        let config = Config {
            crawler: CrawlerConfig {
                num_resolvers: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_validate_zero_queue_fails() {
        let config = Config {
            crawler: CrawlerConfig {
                hash_queue_length: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_window_must_exceed_timeout() {
        let config = Config {
            crawler: CrawlerConfig {
                resolve_timeout_secs: 30,
                resolve_window_secs: 30,
                ..Default::default()
            },
            ..Default::default()
        };
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("resolve_window_secs"));
    }

    #[test]
    fn test_validate_zero_timeout_fails() {
        let config = Config {
            crawler: CrawlerConfig {
                resolve_timeout_secs: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_port_zero_only_matters_when_enabled() {
        let mut config = Config {
            server: ServerConfig {
                port: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(validate_config(&config).is_err());

        config.server.enabled = false;
        assert!(validate_config(&config).is_ok());
    }
}

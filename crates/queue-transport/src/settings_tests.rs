//! Tests for transport settings.

use super::*;
use serial_test::serial;
use std::io::Write;

fn clear_env() {
    for key in [
        "QT__PEEK_INTERVAL_MS",
        "QT__MAXIMUM_WAIT_TIME_WHEN_IDLE_MS",
        "QT__PURGE_ON_STARTUP",
        "QT__MESSAGE_INVISIBLE_TIME_MS",
        "QT__BATCH_SIZE",
    ] {
        std::env::remove_var(key);
    }
}

mod defaults {
    use super::*;

    #[test]
    fn test_default_values() {
        let settings = TransportSettings::default();

        assert_eq!(settings.peek_interval(), Duration::from_millis(50));
        assert_eq!(settings.maximum_wait_time_when_idle(), Duration::from_millis(1000));
        assert!(!settings.purge_on_startup);
        assert_eq!(settings.message_invisible_time(), Duration::from_secs(30));
        assert_eq!(settings.batch_size, 10);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_batch_lease_multiplies_by_batch_size() {
        let settings = TransportSettings::default();
        assert_eq!(settings.batch_lease_duration(), Duration::from_millis(300_000));

        let single = TransportSettings {
            batch_size: 1,
            message_invisible_time_ms: 5_000,
            ..Default::default()
        };
        assert_eq!(single.batch_lease_duration(), Duration::from_secs(5));
    }

    #[test]
    fn test_batch_lease_saturates() {
        let settings = TransportSettings {
            message_invisible_time_ms: u64::MAX,
            batch_size: 32,
            ..Default::default()
        };
        assert_eq!(settings.batch_lease_duration(), Duration::from_millis(u64::MAX));
    }
}

mod validation {
    use super::*;

    #[test]
    fn test_rejects_zero_batch_size() {
        let settings = TransportSettings {
            batch_size: 0,
            ..Default::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(ConfigurationError::Invalid { .. })
        ));
    }

    #[test]
    fn test_rejects_zero_invisible_time() {
        let settings = TransportSettings {
            message_invisible_time_ms: 0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_rejects_ceiling_below_increment() {
        let settings = TransportSettings {
            peek_interval_ms: 500,
            maximum_wait_time_when_idle_ms: 100,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_accepts_zero_peek_interval() {
        let settings = TransportSettings {
            peek_interval_ms: 0,
            maximum_wait_time_when_idle_ms: 0,
            ..Default::default()
        };
        assert!(settings.validate().is_ok());
    }
}

mod loading {
    use super::*;

    #[test]
    #[serial]
    fn test_load_without_sources_uses_defaults() {
        clear_env();

        let settings = TransportSettings::load(None).unwrap();

        assert_eq!(settings, TransportSettings::default());
    }

    #[test]
    #[serial]
    fn test_load_from_yaml_file() {
        clear_env();
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "batch_size: 16").unwrap();
        writeln!(file, "purge_on_startup: true").unwrap();
        writeln!(file, "message_invisible_time_ms: 2000").unwrap();

        let settings = TransportSettings::load(Some(file.path())).unwrap();

        assert_eq!(settings.batch_size, 16);
        assert!(settings.purge_on_startup);
        assert_eq!(settings.message_invisible_time_ms, 2000);
        assert_eq!(settings.peek_interval_ms, 50);
    }

    #[test]
    #[serial]
    fn test_environment_overrides_file() {
        clear_env();
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        writeln!(file, r#"{{ "batch_size": 16 }}"#).unwrap();
        std::env::set_var("QT__BATCH_SIZE", "4");

        let result = TransportSettings::load(Some(file.path()));
        clear_env();

        assert_eq!(result.unwrap().batch_size, 4);
    }

    #[test]
    #[serial]
    fn test_missing_file_is_an_error() {
        clear_env();

        let result = TransportSettings::load(Some(Path::new("/nonexistent/transport.yaml")));

        assert!(matches!(result, Err(ConfigurationError::Parsing { .. })));
    }

    #[test]
    #[serial]
    fn test_invalid_loaded_values_fail_validation() {
        clear_env();
        std::env::set_var("QT__BATCH_SIZE", "0");

        let result = TransportSettings::load(None);
        clear_env();

        assert!(matches!(result, Err(ConfigurationError::Invalid { .. })));
    }
}

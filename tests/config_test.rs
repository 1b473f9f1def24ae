use apm_queue::config::{Compression, SaslMechanism};
use apm_queue::kafka::ProducerConfig;
use apm_queue::Config;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_minimal_config_with_defaults() {
    let file = write_config(
        r#"
[kafka]
brokers = ["localhost:9092"]
"#,
    );

    let config = Config::from_file(file.path()).unwrap();
    assert_eq!(config.kafka.brokers, vec!["localhost:9092"]);
    assert!(config.kafka.compression.is_empty());
    assert!(!config.kafka.sync);
    assert_eq!(config.kafka.flush_timeout(), Duration::from_secs(5));
    assert_eq!(config.kafka.probe_timeout(), Duration::from_secs(5));
    assert!(config.kafka.tls.is_none());
    assert!(config.kafka.sasl.is_none());
}

#[test]
fn test_load_full_config() {
    let file = write_config(
        r#"
[kafka]
brokers = ["kafka-1:9093", "kafka-2:9093"]
client_id = "apm-server"
compression = ["zstd", "lz4"]
sync = true
flush_timeout_ms = 1000
probe_timeout_ms = 250

[kafka.tls]
ca_location = "/etc/ssl/ca.pem"

[kafka.sasl]
mechanism = "scram-sha-512"
username = "apm"
password = "secret"
"#,
    );

    let config = Config::from_file(file.path()).unwrap();
    let kafka = &config.kafka;
    assert_eq!(kafka.brokers.len(), 2);
    assert_eq!(kafka.compression, vec![Compression::Zstd, Compression::Lz4]);
    assert!(kafka.sync);
    assert_eq!(kafka.probe_timeout(), Duration::from_millis(250));

    let tls = kafka.tls.as_ref().unwrap();
    assert!(tls.verify_hostname);
    assert_eq!(tls.ca_location.as_deref(), Some(std::path::Path::new("/etc/ssl/ca.pem")));

    let sasl = kafka.sasl.as_ref().unwrap();
    assert_eq!(sasl.mechanism, SaslMechanism::ScramSha512);
    assert_eq!(sasl.username, "apm");

    let cfg = ProducerConfig::<serde_json::Value>::from_settings(kafka);
    assert_eq!(cfg.brokers, kafka.brokers);
    assert!(cfg.sync);
    assert_eq!(cfg.flush_timeout, Duration::from_millis(1000));
}

#[test]
fn test_environment_overrides_file() {
    let file = write_config(
        r#"
[kafka]
brokers = ["localhost:9092"]
version = "from-file"
"#,
    );

    std::env::set_var("APM_QUEUE_KAFKA__VERSION", "from-env");
    let config = Config::from_file(file.path());
    std::env::remove_var("APM_QUEUE_KAFKA__VERSION");

    assert_eq!(config.unwrap().kafka.version.as_deref(), Some("from-env"));
}

#[test]
fn test_missing_brokers_is_rejected() {
    let file = write_config(
        r#"
[kafka]
sync = true
"#,
    );

    assert!(Config::from_file(file.path()).is_err());
}

//! Layered configuration loading

use std::io::Write;

use tracking_core::config::{BrokerKind, ConfigManager, ConfigurationError};
use tracking_core::messaging::BrokerTopology;

#[test]
fn test_file_and_environment_layers() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(
        file,
        r#"
[broker]
provider = "in_memory"

[dlq]
max_retry_attempts = 4
retry_delay_seconds = 60

[topology]
dlq = "custom.dlq"
"#
    )
    .unwrap();

    // environment wins over the file
    std::env::set_var("TRACKING__DLQ__MAX_RETRY_ATTEMPTS", "6");
    let loaded = ConfigManager::load_from_file(file.path());
    std::env::remove_var("TRACKING__DLQ__MAX_RETRY_ATTEMPTS");

    let manager = loaded.unwrap();
    let config = manager.config();
    assert_eq!(config.broker.provider, BrokerKind::InMemory);
    assert_eq!(config.dlq.max_retry_attempts, 6);
    assert_eq!(config.dlq.retry_delay_seconds, 60);

    let topology = BrokerTopology::from_config(&config.topology, config.dlq.retry_delay());
    assert_eq!(topology.dlq.name, "custom.dlq");
    assert_eq!(topology.retry_delay().as_secs(), 60);
    assert_eq!(
        topology.dlq_retry_queue.dead_letter_routing_key.as_deref(),
        Some(topology.dlq_routing_key())
    );
}

#[test]
fn test_duplicate_queue_names_rejected() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(
        file,
        "[topology]\ndlq = \"tracking.events.queue\"\n"
    )
    .unwrap();

    let err = ConfigManager::load_from_file(file.path()).unwrap_err();
    assert!(matches!(err, ConfigurationError::InvalidValue { .. }));
}

#[test]
fn test_malformed_file_is_load_error() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(file, "[dlq\nmax_retry_attempts = ").unwrap();

    let err = ConfigManager::load_from_file(file.path()).unwrap_err();
    assert!(matches!(err, ConfigurationError::Load { .. }));
}

//! Tests for queue addresses.

use super::*;

#[test]
fn test_parse_queue_only() {
    let address = QueueAddress::parse("orders").unwrap();

    assert_eq!(address.queue().as_str(), "orders");
    assert_eq!(address.machine(), None);
    assert_eq!(address.to_string(), "orders");
}

#[test]
fn test_parse_queue_and_machine() {
    let address = QueueAddress::parse("orders@myaccount").unwrap();

    assert_eq!(address.queue().as_str(), "orders");
    assert_eq!(address.machine(), Some("myaccount"));
    assert_eq!(address.to_string(), "orders@myaccount");
}

#[test]
fn test_parse_lowercases_queue_segment() {
    let address = QueueAddress::parse("  Orders@MyAccount ").unwrap();

    assert_eq!(address.queue().as_str(), "orders");
    assert_eq!(address.machine(), Some("MyAccount"));
}

#[test]
fn test_empty_machine_is_unqualified() {
    let address = QueueAddress::parse("orders@").unwrap();
    assert_eq!(address.machine(), None);
}

#[test]
fn test_parse_errors() {
    assert!(matches!(
        QueueAddress::parse("   "),
        Err(ValidationError::Required { .. })
    ));
    assert!(matches!(
        QueueAddress::parse("orders@a@b"),
        Err(ValidationError::InvalidFormat { .. })
    ));
    assert!(QueueAddress::parse("or").is_err());
    assert!(QueueAddress::parse("bad_name@host").is_err());
}

#[test]
fn test_serde_as_string() {
    let address = QueueAddress::parse("replies@host").unwrap();
    let json = serde_json::to_string(&address).unwrap();
    assert_eq!(json, "\"replies@host\"");

    let parsed: QueueAddress = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, address);
}

#[test]
fn test_from_queue_name() {
    let name = QueueName::new("orders".to_string()).unwrap();
    let address = QueueAddress::from(name.clone());

    assert_eq!(address.queue(), &name);
    assert_eq!("orders".parse::<QueueAddress>().unwrap(), address);
}

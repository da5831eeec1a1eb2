// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! End to end flow of a signed request and its reply across the bus:
//! a client signs and wraps a request, a broker records its hop and fans the
//! envelope out, a server verifies it and answers, and the client checks the
//! reply.

use std::path::Path;
use std::sync::Arc;

use aegis_trust::domain::config::FileProviderConfig;
use aegis_trust::{
    create_security_provider, ProtocolError, SecureReply, SecureRequest, SecurityConfig,
    SecurityProvider, TransportMessage,
};
use tempfile::TempDir;

const FIXTURES: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures");

fn provider(cache: &TempDir, cert: &str, key: &str) -> Arc<dyn SecurityProvider> {
    let config = SecurityConfig {
        ca_file: Path::new(FIXTURES).join("ca.pem"),
        cert_cache_dir: cache.path().to_path_buf(),
        privileged_users: vec!["/^admin-.*$/".to_string()],
        allow_list: vec!["\\.fleet\\.example$".to_string()],
        file: Some(FileProviderConfig {
            certificate: Path::new(FIXTURES).join(cert),
            key: Path::new(FIXTURES).join(key),
        }),
        ..SecurityConfig::default()
    };
    create_security_provider(&config).unwrap()
}

#[test]
fn test_request_reply_round_trip() {
    let client_cache = TempDir::new().unwrap();
    let server_cache = TempDir::new().unwrap();
    let client = provider(&client_cache, "node1.pem", "node1-key.pem");
    let server = provider(&server_cache, "admin-01.pem", "admin-01-key.pem");

    // client
    let request =
        SecureRequest::sign(r#"{"agent":"rpcutil","action":"ping"}"#, client.as_ref()).unwrap();
    let outgoing = TransportMessage::from_request(&request, client.identity().unwrap()).unwrap();
    outgoing.set_reply_to("_reply.node1.fleet.example.1");
    let wire = outgoing.to_json().unwrap();

    // broker
    let relayed = TransportMessage::from_json(&wire).unwrap();
    relayed.record_network_hop("nats://client:4222", "broker-1", "nats://server:4222");
    relayed.set_federation_request_id("fed-1");
    relayed.set_federation_targets(vec!["aegis.broadcast.agent.rpcutil".to_string()]);
    let wire = relayed.to_json().unwrap();

    // server
    let incoming = TransportMessage::from_json(&wire).unwrap();
    assert_eq!(incoming.sender_id(), "node1.fleet.example");
    assert_eq!(incoming.seen_by().len(), 1);
    assert_eq!(incoming.federation_request_id().as_deref(), Some("fed-1"));

    let received = incoming.secure_request().unwrap();
    let caller = received.verify(server.as_ref(), None).unwrap();
    assert_eq!(caller, "node1.fleet.example");

    let reply = SecureReply::sign(r#"{"pong":1}"#, server.as_ref()).unwrap();
    let answer = TransportMessage::from_reply(&reply, server.identity().unwrap()).unwrap();
    let wire = answer.to_json().unwrap();

    // client
    let response = TransportMessage::from_json(&wire).unwrap();
    let received = response.secure_reply().unwrap();
    client
        .cache_public_data(server.public_cert_pem().unwrap().as_bytes(), "admin-01")
        .unwrap();
    received.verify(client.as_ref(), Some(&response.sender_id())).unwrap();
    assert_eq!(received.message, r#"{"pong":1}"#);
}

#[test]
fn test_envelope_tampered_in_transit() {
    let client_cache = TempDir::new().unwrap();
    let server_cache = TempDir::new().unwrap();
    let client = provider(&client_cache, "node1.pem", "node1-key.pem");
    let server = provider(&server_cache, "admin-01.pem", "admin-01-key.pem");

    let mut request = SecureRequest::sign("restart", client.as_ref()).unwrap();
    request.message = "shutdown".to_string();
    let envelope = TransportMessage::from_request(&request, "node1.fleet.example").unwrap();

    let incoming = TransportMessage::from_json(&envelope.to_json().unwrap()).unwrap();
    let result = incoming.secure_request().unwrap().verify(server.as_ref(), None);

    assert!(matches!(result, Err(ProtocolError::Untrusted(_))));
}

#[test]
fn test_privileged_client_acts_for_another_identity() {
    let admin_cache = TempDir::new().unwrap();
    let server_cache = TempDir::new().unwrap();
    let admin = provider(&admin_cache, "admin-02.pem", "admin-02-key.pem");
    let server = provider(&server_cache, "node1.pem", "node1-key.pem");

    let request = SecureRequest::sign("inventory", admin.as_ref()).unwrap();
    let wire = TransportMessage::from_request(&request, "node7.fleet.example")
        .unwrap()
        .to_json()
        .unwrap();

    let incoming = TransportMessage::from_json(&wire).unwrap();
    let caller = incoming
        .secure_request()
        .unwrap()
        .verify(server.as_ref(), Some(&incoming.sender_id()))
        .unwrap();

    assert_eq!(caller, "node7.fleet.example");
    assert!(server.trust_store().cached_cert_exists("admin-02"));
    assert!(!server.trust_store().cached_cert_exists("node7.fleet.example"));
}

#[test]
fn test_shared_envelope_across_workers() {
    let cache = TempDir::new().unwrap();
    let client = provider(&cache, "node1.pem", "node1-key.pem");
    let request = SecureRequest::sign("ping", client.as_ref()).unwrap();
    let envelope =
        Arc::new(TransportMessage::from_request(&request, "node1.fleet.example").unwrap());

    let handles: Vec<_> = ["broker-1", "broker-2", "broker-3"]
        .into_iter()
        .map(|broker| {
            let envelope = Arc::clone(&envelope);
            std::thread::spawn(move || {
                envelope.record_network_hop("in", broker, "out");
                envelope.to_json().unwrap()
            })
        })
        .collect();
    for handle in handles {
        TransportMessage::from_json(&handle.join().unwrap()).unwrap();
    }

    let mut processors: Vec<_> = envelope.seen_by().into_iter().map(|hop| hop.processor).collect();
    processors.sort();
    assert_eq!(processors, vec!["broker-1", "broker-2", "broker-3"]);
}

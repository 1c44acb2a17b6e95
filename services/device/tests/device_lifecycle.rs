//! End-to-end device lifecycle: provisioning against a mock pairing
//! service, session bootstrap, publishing, and inbound dispatch — wired
//! through the production collaborators wherever one exists.

use std::sync::Arc;

use device_service::test_utils::{valid_certificate_pem, RecordingTransport};
use device_service::{
    CredentialState, DispatchOutcome, Envelope, PublishRequest, Qos, Session, WireValue,
};
use config::load_config;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();
}

fn write_interface_schemas(dir: &std::path::Path) {
    std::fs::write(
        dir.join("telemetry.json"),
        r#"{
            "interface_name": "org.lattice.Telemetry",
            "version_major": 1,
            "version_minor": 0,
            "type": "datastream",
            "ownership": "device",
            "mappings": [
                { "endpoint": "/count", "type": "integer" },
                { "endpoint": "/room/%{name}/value", "type": "double" }
            ]
        }"#,
    )
    .unwrap();
    std::fs::write(
        dir.join("server_settings.json"),
        r#"{
            "interface_name": "org.lattice.ServerSettings",
            "version_major": 1,
            "version_minor": 1,
            "type": "properties",
            "ownership": "server",
            "mappings": [
                { "endpoint": "/limits/%{name}", "type": "longinteger" }
            ]
        }"#,
    )
    .unwrap();
}

#[tokio::test]
async fn full_lifecycle_from_cold_store_to_inbound_data() {
    init_tracing();

    let mut pairing_server = mockito::Server::new_async().await;
    let issued_certificate = valid_certificate_pem(30);
    let credentials_mock = pairing_server
        .mock("POST", "/v1/factory7/devices/press-line-3/credentials")
        .match_header("authorization", "Bearer s3cret")
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(
            serde_json::json!({ "data": { "certificate": issued_certificate } }).to_string(),
        )
        .create_async()
        .await;
    let info_mock = pairing_server
        .mock("GET", "/v1/factory7/devices/press-line-3")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"data":{"protocols":{"lattice_mqtt_v1":{"broker_url":"mqtts://broker.example.com:8883"}}}}"#,
        )
        .create_async()
        .await;

    let workdir = tempfile::tempdir().unwrap();
    let store_dir = workdir.path().join("credentials");
    let interfaces_dir = workdir.path().join("interfaces");
    std::fs::create_dir_all(&interfaces_dir).unwrap();
    write_interface_schemas(&interfaces_dir);

    let config_path = workdir.path().join("device.toml");
    std::fs::write(
        &config_path,
        format!(
            r#"
            realm = "factory7"
            device_id = "press-line-3"
            credentials_secret = "s3cret"
            pairing_url = "{}"
            store_dir = "{}"
            interfaces_dir = "{}"
            "#,
            pairing_server.url(),
            store_dir.display(),
            interfaces_dir.display(),
        ),
    )
    .unwrap();
    let device_config = load_config(&config_path).unwrap();

    let transport = Arc::new(RecordingTransport::new());
    let (session, mut inbound) =
        Session::with_production_defaults(&device_config, transport.clone()).unwrap();

    // Provisioning: drive the credential state machine to Ready.
    assert_eq!(session.credential_state(), CredentialState::NoKeypair);
    let session = session.generate_keypair().unwrap();
    assert_eq!(session.credential_state(), CredentialState::NoCertificate);
    let session = session.request_certificate().await.unwrap();
    assert_eq!(session.credential_state(), CredentialState::Ready);
    credentials_mock.assert_async().await;

    // Bootstrap: broker URL, then the session itself.
    let session = session.request_info().await.unwrap();
    assert_eq!(
        session.broker_url().unwrap().as_str(),
        "mqtts://broker.example.com:8883"
    );
    info_mock.assert_async().await;

    let session = session.connect().await.unwrap();
    assert!(session.is_connected());
    let params = transport.last_connect().unwrap();
    assert_eq!(
        params
            .subscriptions
            .iter()
            .map(|s| s.topic_filter.as_str())
            .collect::<Vec<_>>(),
        [
            "factory7/press-line-3/control/#",
            "factory7/press-line-3/org.lattice.ServerSettings",
            "factory7/press-line-3/org.lattice.ServerSettings/#",
        ]
    );

    // Session announcement.
    session.send_introspection().await.unwrap();
    session.send_empty_cache().await.unwrap();
    let published = transport.published();
    assert_eq!(
        published[0].payload,
        b"org.lattice.ServerSettings:1:1;org.lattice.Telemetry:1:0"
    );
    assert_eq!(published[1].topic, "factory7/press-line-3/control/emptyCache");

    // Outbound data.
    session
        .publish(
            PublishRequest::datastream("org.lattice.Telemetry", "/room/kitchen/value", 21.5f64)
                .with_qos(Qos::AtLeastOnce),
        )
        .await
        .unwrap();
    let published = transport.published();
    let message = published.last().unwrap();
    assert_eq!(
        message.topic,
        "factory7/press-line-3/org.lattice.Telemetry/room/kitchen/value"
    );
    assert_eq!(message.qos, Qos::AtLeastOnce);

    // Inbound data: server-owned property update reaches the consumer.
    let payload =
        codec::encode_envelope(&Envelope::new(WireValue::from(86_400i64))).unwrap();
    let outcome = session
        .handle_message(
            &["factory7", "press-line-3", "org.lattice.ServerSettings", "limits", "daily"],
            &payload,
        )
        .unwrap();
    assert_eq!(outcome, DispatchOutcome::Forwarded);

    let data = inbound.recv().await.unwrap();
    assert_eq!(data.interface, "org.lattice.ServerSettings");
    assert_eq!(data.path, "/limits/daily");
    assert_eq!(data.value, WireValue::Long(86_400));

    // The broker echoing our own empty-cache announcement is silently
    // acknowledged.
    let outcome = session
        .handle_message(
            &["factory7", "press-line-3", "control", "emptyCache"],
            b"1",
        )
        .unwrap();
    assert_eq!(outcome, DispatchOutcome::SelfEcho);
}

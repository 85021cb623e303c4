// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Integration tests for the HTTP command protocol using wiremock.

#![cfg(feature = "http")]

use std::time::Duration;

use psucontrol_outlet::protocol::PowerSwitch;
use psucontrol_outlet::protocol::http::{EchoPolicy, HttpCommandClient, HttpConfig};
use psucontrol_outlet::types::{DeviceEndpoint, ProtocolParams};
use psucontrol_outlet::{Device, DeviceController, Error, ProtocolError, ProtocolKind};
use wiremock::matchers::{basic_auth, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_status(server: &MockServer, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/cm"))
        .and(query_param("cmnd", "Status 0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

async fn mount_command(server: &MockServer, command: &str, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/cm"))
        .and(query_param("cmnd", command))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

async fn outlet() -> MockServer {
    let server = MockServer::start().await;
    mount_status(
        &server,
        serde_json::json!({ "Status": { "DeviceName": "Printer PSU", "Power": 0 } }),
    )
    .await;
    server
}

// ============================================================================
// Liveness probe
// ============================================================================

mod probe {
    use super::*;

    #[tokio::test]
    async fn connect_records_device_name() {
        let server = outlet().await;

        let client = HttpCommandClient::connect(HttpConfig::new(server.uri()), tracing::Span::none())
            .await
            .unwrap();
        assert_eq!(client.device_name(), "Printer PSU");
    }

    #[tokio::test]
    async fn missing_device_name_is_unknown() {
        let server = MockServer::start().await;
        mount_status(&server, serde_json::json!({ "Status": {} })).await;

        let client = HttpCommandClient::connect(HttpConfig::new(server.uri()), tracing::Span::none())
            .await
            .unwrap();
        assert_eq!(client.device_name(), "Unknown");
    }

    #[tokio::test]
    async fn unreachable_probe_is_a_connect_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = HttpCommandClient::connect(HttpConfig::new(server.uri()), tracing::Span::none())
            .await
            .unwrap_err();
        match err {
            Error::Connect { source, .. } => {
                assert!(matches!(*source, Error::Protocol(ProtocolError::HttpStatus(500))));
            }
            other => panic!("expected connect error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_json_probe_is_a_connect_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>login</html>"))
            .mount(&server)
            .await;

        let err = HttpCommandClient::connect(HttpConfig::new(server.uri()), tracing::Span::none())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Connect { .. }));
    }
}

// ============================================================================
// Status parsing
// ============================================================================

mod status {
    use super::*;

    async fn status_for(body: serde_json::Value) -> bool {
        let server = outlet().await;
        mount_command(&server, "Power", body).await;

        let mut client = HttpCommandClient::connect(HttpConfig::new(server.uri()), tracing::Span::none())
            .await
            .unwrap();
        client.get_status().await.unwrap()
    }

    #[tokio::test]
    async fn power_key() {
        assert!(status_for(serde_json::json!({ "POWER": "ON" })).await);
    }

    #[tokio::test]
    async fn numbered_power_key() {
        assert!(!status_for(serde_json::json!({ "POWER1": "OFF" })).await);
        assert!(status_for(serde_json::json!({ "POWER1": "ON" })).await);
    }

    #[tokio::test]
    async fn value_is_case_insensitive() {
        assert!(status_for(serde_json::json!({ "POWER": "on" })).await);
    }

    #[tokio::test]
    async fn missing_power_key_is_off() {
        assert!(!status_for(serde_json::json!({ "Dimmer": 40 })).await);
    }
}

// ============================================================================
// Commands
// ============================================================================

mod commands {
    use super::*;

    #[tokio::test]
    async fn set_status_sends_power_on_and_off() {
        let server = outlet().await;
        Mock::given(method("GET"))
            .and(query_param("cmnd", "Power ON"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "POWER": "ON" })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("cmnd", "Power OFF"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "POWER": "OFF" })))
            .expect(1)
            .mount(&server)
            .await;

        let mut client = HttpCommandClient::connect(HttpConfig::new(server.uri()), tracing::Span::none())
            .await
            .unwrap();
        client.turn_on().await.unwrap();
        client.turn_off().await.unwrap();
    }

    #[tokio::test]
    async fn echo_mismatch_is_lenient_by_default() {
        let server = outlet().await;
        mount_command(&server, "Power ON", serde_json::json!({ "POWER": "OFF" })).await;

        let mut client = HttpCommandClient::connect(HttpConfig::new(server.uri()), tracing::Span::none())
            .await
            .unwrap();
        client.set_status(true).await.unwrap();
    }

    #[tokio::test]
    async fn echo_mismatch_fails_when_strict() {
        let server = outlet().await;
        mount_command(&server, "Power ON", serde_json::json!({ "POWER": "OFF" })).await;

        let config = HttpConfig::new(server.uri()).with_echo_policy(EchoPolicy::Strict);
        let mut client = HttpCommandClient::connect(config, tracing::Span::none())
            .await
            .unwrap();
        let err = client.set_status(true).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::EchoMismatch { ref expected, ref actual })
                if expected == "ON" && actual == "OFF"
        ));
    }

    #[tokio::test]
    async fn native_toggle_returns_new_state() {
        let server = outlet().await;
        mount_command(&server, "Power TOGGLE", serde_json::json!({ "POWER": "ON" })).await;

        let mut client = HttpCommandClient::connect(HttpConfig::new(server.uri()), tracing::Span::none())
            .await
            .unwrap();
        assert!(client.toggle().await.unwrap());
    }
}

// ============================================================================
// Authentication and failures
// ============================================================================

mod auth_and_errors {
    use super::*;

    #[tokio::test]
    async fn basic_auth_is_sent_when_configured() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(basic_auth("admin", "secret"))
            .and(query_param("cmnd", "Status 0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "Status": {} })))
            .expect(1)
            .mount(&server)
            .await;

        let config = HttpConfig::new(server.uri()).with_credentials("admin", "secret");
        HttpCommandClient::connect(config, tracing::Span::none())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn unauthorized_is_an_authentication_failure() {
        let server = outlet().await;
        Mock::given(method("GET"))
            .and(query_param("cmnd", "Power"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let mut client = HttpCommandClient::connect(HttpConfig::new(server.uri()), tracing::Span::none())
            .await
            .unwrap();
        let err = client.get_status().await.unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::AuthenticationFailed)
        ));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn slow_device_times_out() {
        let server = outlet().await;
        Mock::given(method("GET"))
            .and(query_param("cmnd", "Power"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "POWER": "ON" }))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let config = HttpConfig::new(server.uri()).with_timeout(Duration::from_millis(200));
        let mut client = HttpCommandClient::connect(config, tracing::Span::none())
            .await
            .unwrap();
        let err = client.get_status().await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert!(err.is_transient());
    }
}

// ============================================================================
// Device facade and controller
// ============================================================================

mod facade {
    use super::*;

    #[tokio::test]
    async fn construct_tasmota_device() {
        let server = outlet().await;
        mount_command(&server, "Power", serde_json::json!({ "POWER": "OFF" })).await;

        let params = ProtocolParams {
            username: "admin".to_string(),
            password: "secret".to_string(),
            ..ProtocolParams::default()
        };
        let mut device = Device::construct("tasmota", &server.uri(), &params)
            .await
            .unwrap();
        assert_eq!(device.protocol(), ProtocolKind::HttpCommand);
        assert!(!device.get_status().await.unwrap());
    }

    #[tokio::test]
    async fn controller_reconnects_after_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("cmnd", "Status 0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "Status": {} })))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("cmnd", "Power"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        mount_command(&server, "Power", serde_json::json!({ "POWER": "ON" })).await;

        let mut controller = DeviceController::for_endpoint(
            DeviceEndpoint::http(server.uri()),
            tracing::Span::none(),
        );
        assert!(controller.get_status().await.is_err());
        assert!(!controller.state().is_connected());
        assert!(controller.get_status().await.unwrap());
        assert!(controller.state().is_connected());
    }
}

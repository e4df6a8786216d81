//! Drives the supervisor against a local REST mock and a local WebSocket
//! server using the production transports.

#![allow(missing_docs)]

use std::sync::Arc;
use std::time::Duration;

use aci_client::transport::{ReqwestTransport, TungsteniteDialer};
use aci_client::{
    AttemptState, ChannelSink, Supervisor, SupervisorConfig, TransportFactory, Transports,
};
use aci_core::Result;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct LocalFactory {
    base_url: String,
    socket_prefix: String,
}

impl TransportFactory for LocalFactory {
    fn build(&self) -> Result<Transports> {
        Ok(Transports {
            http: Arc::new(ReqwestTransport::new(&self.base_url, Duration::from_secs(5))?),
            dialer: Box::new(TungsteniteDialer::new(self.socket_prefix.clone())?),
        })
    }
}

async fn mock_controller() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/aaaLogin.json"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "APIC-cookie=T1; Path=/")
                .set_body_string(r#"{"totalCount":"1","imdata":[{"aaaLogin":{"attributes":{"token":"T1"}}}]}"#),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/class/faultInst.json"))
        .and(query_param("subscription", "yes"))
        .and(query_param("page", "0"))
        .and(query_param("page-size", "1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"{"totalCount":"0","subscriptionId":"72057594037927937","imdata":[]}"#),
        )
        .mount(&server)
        .await;
    server
}

/// Accept one WebSocket, report its path, push `messages`, then hold the
/// connection open until the client goes away.
async fn event_server(messages: Vec<&'static str>) -> (String, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (path_tx, path_rx) = mpsc::unbounded_channel();

    drop(tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_hdr_async(
            tcp,
            move |req: &tokio_tungstenite::tungstenite::handshake::server::Request,
                  resp: tokio_tungstenite::tungstenite::handshake::server::Response|
                  -> std::result::Result<
                tokio_tungstenite::tungstenite::handshake::server::Response,
                tokio_tungstenite::tungstenite::handshake::server::ErrorResponse,
            > {
                let _ = path_tx.send(req.uri().path().to_string());
                Ok(resp)
            },
        )
        .await
        .unwrap();
        for message in messages {
            ws.send(Message::Text(message.to_string().into())).await.unwrap();
        }
        while let Some(Ok(_)) = ws.next().await {}
    }));

    (format!("ws://{addr}/socket"), path_rx)
}

#[tokio::test]
async fn streams_events_from_controller() {
    let controller = mock_controller().await;
    let (socket_prefix, mut paths) = event_server(vec![
        "not json",
        r#"{"subscriptionId":["72057594037927937"],"imdata":[{"faultInst":{"attributes":{"code":"F1543","status":"created"}}}]}"#,
    ])
    .await;

    let factory = LocalFactory {
        base_url: controller.uri(),
        socket_prefix,
    };
    let (sink, mut events) = ChannelSink::new();
    let supervisor = Supervisor::new(
        SupervisorConfig::default(),
        Arc::new(factory),
        Arc::new(sink),
    );
    let mut status = supervisor.status();
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(supervisor.run(shutdown.clone()));

    let event = tokio::time::timeout(Duration::from_secs(10), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        event["imdata"][0]["faultInst"]["attributes"]["code"],
        "F1543"
    );
    assert_eq!(paths.recv().await.unwrap(), "/socketT1");

    let _ = tokio::time::timeout(
        Duration::from_secs(10),
        status.wait_for(|s| s.generation == 1 && s.state == AttemptState::Running),
    )
    .await
    .unwrap()
    .unwrap();

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(10), task)
        .await
        .unwrap()
        .unwrap();
}

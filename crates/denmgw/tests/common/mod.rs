use async_trait::async_trait;
use denmgw::amqp::link::{ReceiverTransport, SenderTransport};
use denmgw::amqp::{AmqpMessage, InboundBody, LinkError, ReceiverLink, SenderLink, CREDIT_WINDOW};
use denmgw::bus::EventBus;
use denmgw::http::{self, HttpState, WsRegistry};
use denmgw::interchange::{InterchangeConfig, InterchangeService};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

/// Sender transport that records every dispatched message.
pub struct CapturingSender {
    pub messages: Arc<Mutex<Vec<AmqpMessage>>>,
}

#[async_trait]
impl SenderTransport for CapturingSender {
    async fn dispatch(&mut self, message: AmqpMessage) -> Result<(), LinkError> {
        self.messages.lock().unwrap().push(message);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), LinkError> {
        Ok(())
    }
}

/// Receiver transport fed through a channel; dropping the sender side
/// closes the link.
pub struct ChannelReceiver {
    pub deliveries: mpsc::UnboundedReceiver<InboundBody>,
}

#[async_trait]
impl ReceiverTransport for ChannelReceiver {
    async fn replenish(&mut self, _credit: u32) -> Result<(), LinkError> {
        Ok(())
    }

    async fn next(&mut self) -> Result<InboundBody, LinkError> {
        self.deliveries.recv().await.ok_or(LinkError::Closed)
    }

    async fn close(&mut self) -> Result<(), LinkError> {
        Ok(())
    }
}

/// A gateway wired to mock transports, served on an ephemeral port.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub sent: Arc<Mutex<Vec<AmqpMessage>>>,
    pub deliveries: mpsc::UnboundedSender<InboundBody>,
    pub registry: Arc<WsRegistry>,
    pub service: InterchangeService,
}

impl TestGateway {
    pub async fn start() -> Self {
        let bus = Arc::new(EventBus::new());
        let registry = Arc::new(WsRegistry::new());
        http::subscribe_fanout(&bus, registry.clone());

        let sent = Arc::new(Mutex::new(Vec::new()));
        let sender = SenderLink::spawn(
            CapturingSender {
                messages: sent.clone(),
            },
            CREDIT_WINDOW,
        );

        let (delivery_tx, delivery_rx) = mpsc::unbounded_channel();
        let receiver = ReceiverLink::spawn(
            ChannelReceiver {
                deliveries: delivery_rx,
            },
            CREDIT_WINDOW,
        );

        let service = InterchangeService::start(
            &bus,
            InterchangeConfig {
                username: "NO00001".to_string(),
                send_address: "examples".to_string(),
                protocol_version: "DENM:1.2.2".to_string(),
            },
            Some(sender),
            Some(receiver),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(http::serve(
            listener,
            HttpState {
                bus,
                ws: registry.clone(),
            },
        ));

        Self {
            addr,
            sent,
            deliveries: delivery_tx,
            registry,
            service,
        }
    }

    /// Waits until `count` WebSocket observers are registered; the upgrade
    /// callback runs after the handshake response, so a fresh connection
    /// may not be tracked yet.
    pub async fn wait_for_observers(&self, count: usize) {
        for _ in 0..200 {
            if self.registry.len() >= count {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        panic!(
            "expected {count} observers, have {}",
            self.registry.len()
        );
    }

    /// POSTs a raw body to a path; returns (status, response body).
    pub async fn post(&self, path: &str, body: &str) -> (u16, String) {
        let request = format!(
            "POST {path} HTTP/1.1\r\nHost: {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            self.addr,
            body.len(),
        );
        self.request(&request).await
    }

    /// GETs a path; returns (status, response body).
    pub async fn get(&self, path: &str) -> (u16, String) {
        let request = format!(
            "GET {path} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
            self.addr
        );
        self.request(&request).await
    }

    async fn request(&self, request: &str) -> (u16, String) {
        let mut stream = TcpStream::connect(self.addr).await.unwrap();
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        let response = String::from_utf8(response).unwrap();

        let status: u16 = response
            .split_whitespace()
            .nth(1)
            .and_then(|s| s.parse().ok())
            .expect("malformed status line");
        let body = response
            .split_once("\r\n\r\n")
            .map(|(_, b)| b.to_string())
            .unwrap_or_default();
        (status, body)
    }

    /// Opens a WebSocket observer on `/denm`.
    pub async fn ws_connect(&self) -> WsObserver {
        let url = format!("ws://{}/denm", self.addr);
        let (ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();
        WsObserver { ws }
    }
}

pub struct WsObserver {
    ws: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
}

impl WsObserver {
    /// Waits for the next text frame, parsed as JSON.
    pub async fn recv_json(&mut self) -> Value {
        loop {
            match self.ws.next().await.expect("connection closed").unwrap() {
                Message::Text(text) => return serde_json::from_str(&text).unwrap(),
                Message::Ping(data) => {
                    self.ws.send(Message::Pong(data)).await.unwrap();
                }
                _ => {}
            }
        }
    }

    /// Asserts that no frame arrives within the given window.
    pub async fn expect_silence(&mut self, window: std::time::Duration) {
        let next = tokio::time::timeout(window, self.ws.next()).await;
        assert!(next.is_err(), "unexpected frame: {next:?}");
    }
}

/// The accident event fixture in its submission form.
pub fn sample_submission() -> Value {
    json!({
        "publisherId": "NO00001",
        "originatingCountry": "NO",
        "latitude": 57.779017,
        "longitude": 12.774981,
        "data": sample_denm_json(),
    })
}

/// The accident event DENM in its JSON projection.
pub fn sample_denm_json() -> Value {
    json!({
        "header": { "stationId": 1234567 },
        "management": {
            "actionId": 1234567,
            "sequenceNumber": 20,
            "stationType": 3,
            "eventPosition": {
                "latitude": 57.779017,
                "longitude": 12.774981,
                "altitude": 190.0,
            },
            "validityDuration": 600,
        },
        "situation": {
            "informationQuality": 0,
            "causeCode": 2,
            "subCauseCode": 0,
        },
    })
}

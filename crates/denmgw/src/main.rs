#![forbid(unsafe_code)]

use anyhow::Result;
use clap::Parser;
use denmgw::amqp::AmqpEngine;
use denmgw::bus::EventBus;
use denmgw::config::{Args, GatewayConfig};
use denmgw::http::{self, HttpState, WsRegistry};
use denmgw::interchange::{InterchangeConfig, InterchangeService};
use denmgw::metrics::{serve_metrics, Readiness};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing(args: &Args) {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(args.log_level.directive())
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args);

    let config: GatewayConfig = args.into();
    if let Err(e) = config.validate() {
        anyhow::bail!("configuration error: {}", e);
    }

    let bus = Arc::new(EventBus::new());
    let ws_registry = Arc::new(WsRegistry::new());
    http::subscribe_fanout(&bus, Arc::clone(&ws_registry));

    let readiness = Readiness::new();
    tokio::spawn({
        let readiness = readiness.clone();
        let metrics_addr = config.metrics_addr;
        async move {
            if let Err(e) = serve_metrics(metrics_addr, readiness).await {
                warn!("metrics server error: {}", e);
            }
        }
    });

    // Broker side: connect, attach the enabled links, wire them to the bus.
    let mut engine = AmqpEngine::connect(&config).await?;
    let sender = if config.sender {
        Some(engine.open_sender(&config).await?)
    } else {
        info!("sender direction disabled");
        None
    };
    let receiver = if config.receiver {
        Some(engine.open_receiver(&config).await?)
    } else {
        info!("receiver direction disabled");
        None
    };
    let mut interchange = InterchangeService::start(
        &bus,
        InterchangeConfig {
            username: config.amqp_user.clone(),
            send_address: config.amqp_send.clone(),
            protocol_version: config.protocol_version.clone(),
        },
        sender,
        receiver,
    );

    // HTTP side: one router, served on the HTTP port and, when configured
    // differently, on the WebSocket port as well.
    let state = HttpState {
        bus: Arc::clone(&bus),
        ws: Arc::clone(&ws_registry),
    };
    let listener =
        tokio::net::TcpListener::bind((config.http_host.as_str(), config.http_port)).await?;
    tokio::spawn({
        let state = state.clone();
        async move {
            if let Err(e) = http::serve(listener, state).await {
                error!("HTTP server error: {}", e);
            }
        }
    });
    if let Some(ws_port) = config.ws_port {
        let listener =
            tokio::net::TcpListener::bind((config.http_host.as_str(), ws_port)).await?;
        tokio::spawn({
            let state = state.clone();
            async move {
                if let Err(e) = http::serve(listener, state).await {
                    error!("WebSocket server error: {}", e);
                }
            }
        });
    }

    readiness.mark(true);
    info!("DENM gateway started");

    wait_for_shutdown().await;
    info!("received shutdown signal");

    readiness.mark(false);
    interchange.stop().await;
    engine.close().await;

    Ok(())
}

async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                warn!("cannot install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

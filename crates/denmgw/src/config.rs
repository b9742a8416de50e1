use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

/// CLI arguments for the DENM gateway.
#[derive(Parser, Debug, Clone)]
#[command(name = "denmgw")]
#[command(about = "DENM gateway between HTTP/WebSocket clients and an AMQP interchange")]
#[command(version)]
pub struct Args {
    /// AMQP broker URL.
    #[arg(long, default_value = "amqp://localhost:5672", env = "AMQP_URL")]
    pub amqp_url: String,
    /// AMQP target address for outbound DENM.
    #[arg(long, default_value = "examples", env = "AMQP_SEND")]
    pub amqp_send: String,
    /// AMQP source address for inbound DENM.
    #[arg(long, default_value = "examples", env = "AMQP_RECEIVE")]
    pub amqp_receive: String,
    /// Interchange username; also names the link pair and certificate files.
    #[arg(long, default_value = "guest", env = "AMQP_USER")]
    pub amqp_user: String,
    /// SASL PLAIN password, when the broker requires one.
    #[arg(long, default_value = "", env = "AMQP_PASSWORD", hide_env_values = true)]
    pub amqp_password: String,
    /// HTTP listen host.
    #[arg(long, default_value = "0.0.0.0", env = "HTTP_HOST")]
    pub http_host: String,
    /// HTTP listen port (REST and WebSocket).
    #[arg(long, default_value = "8080", env = "HTTP_PORT")]
    pub http_port: u16,
    /// Extra WebSocket listen port; defaults to the HTTP port.
    #[arg(long, env = "WS_PORT")]
    pub ws_port: Option<u16>,
    /// Directory holding `<user>.crt`, `<user>.key` and `truststore.pem`.
    #[arg(long, env = "CERT_DIR")]
    pub cert_dir: Option<PathBuf>,
    /// Log verbosity (`RUST_LOG` overrides).
    #[arg(long, value_enum, default_value = "info", env = "LOG_LEVEL")]
    pub log_level: LogLevel,
    /// Envelope `protocolVersion` property when the request omits one.
    #[arg(long, default_value = "DENM:1.2.2", env = "PROTOCOL_VERSION")]
    pub protocol_version: String,
    /// Socket address for the metrics endpoint.
    #[arg(long, default_value = "127.0.0.1:9090", env = "METRICS_ADDR")]
    pub metrics_addr: SocketAddr,
    /// Whether to open the receiver link and the WebSocket fan-out path.
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set, env = "RECEIVER")]
    pub receiver: bool,
    /// Whether to open the sender link and the HTTP publish path.
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set, env = "SENDER")]
    pub sender: bool,
}

/// Log verbosity levels accepted by `--log-level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    /// Per-message detail.
    Debug,
    /// Lifecycle events.
    Info,
    /// Recoverable faults only.
    Warn,
    /// Fatal faults only.
    Error,
}

impl LogLevel {
    /// The `tracing` filter directive for this level.
    #[must_use]
    pub const fn directive(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Runtime configuration derived from [`Args`].
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// AMQP broker URL.
    pub amqp_url: String,
    /// AMQP target address for outbound DENM.
    pub amqp_send: String,
    /// AMQP source address for inbound DENM.
    pub amqp_receive: String,
    /// Interchange username.
    pub amqp_user: String,
    /// SASL PLAIN password.
    pub amqp_password: String,
    /// HTTP listen host.
    pub http_host: String,
    /// HTTP listen port.
    pub http_port: u16,
    /// Extra WebSocket listen port, when distinct from the HTTP port.
    pub ws_port: Option<u16>,
    /// Certificate directory, when TLS client auth is configured.
    pub cert_dir: Option<PathBuf>,
    /// Default envelope `protocolVersion` property.
    pub protocol_version: String,
    /// Socket address for the metrics endpoint.
    pub metrics_addr: SocketAddr,
    /// Whether the receiver direction is enabled.
    pub receiver: bool,
    /// Whether the sender direction is enabled.
    pub sender: bool,
}

impl GatewayConfig {
    /// Validates the configuration values are within acceptable bounds.
    /// Returns Ok(()) if valid, Err with description otherwise.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.amqp_url.starts_with("amqp://") || self.amqp_url.starts_with("amqps://")) {
            return Err(format!(
                "amqp_url must start with amqp:// or amqps://, got: {}",
                self.amqp_url
            ));
        }

        if self.amqp_user.is_empty() {
            return Err("amqp_user must not be empty".to_string());
        }

        if self.sender && self.amqp_send.is_empty() {
            return Err("amqp_send must not be empty when the sender is enabled".to_string());
        }
        if self.receiver && self.amqp_receive.is_empty() {
            return Err("amqp_receive must not be empty when the receiver is enabled".to_string());
        }
        if !self.sender && !self.receiver {
            return Err("at least one of sender and receiver must be enabled".to_string());
        }

        if self.http_host.is_empty() {
            return Err("http_host must not be empty".to_string());
        }
        if self.http_port == 0 {
            return Err("http_port must be greater than 0".to_string());
        }
        if self.ws_port == Some(0) {
            return Err("ws_port must be greater than 0".to_string());
        }

        if self.amqp_url.starts_with("amqps://") && self.cert_dir.is_none() {
            return Err("cert_dir is required for amqps:// URLs".to_string());
        }
        if let Some(dir) = &self.cert_dir {
            if dir.as_os_str().is_empty() {
                return Err("cert_dir must not be empty when set".to_string());
            }
        }

        if self.protocol_version.is_empty() {
            return Err("protocol_version must not be empty".to_string());
        }

        Ok(())
    }
}

impl From<Args> for GatewayConfig {
    fn from(args: Args) -> Self {
        Self {
            amqp_url: args.amqp_url,
            amqp_send: args.amqp_send,
            amqp_receive: args.amqp_receive,
            amqp_user: args.amqp_user,
            amqp_password: args.amqp_password,
            http_host: args.http_host,
            http_port: args.http_port,
            ws_port: args.ws_port.filter(|p| *p != args.http_port),
            cert_dir: args.cert_dir,
            protocol_version: args.protocol_version,
            metrics_addr: args.metrics_addr,
            receiver: args.receiver,
            sender: args.sender,
        }
    }
}

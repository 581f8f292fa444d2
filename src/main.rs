//! Transport connectivity check.
//!
//! Connects to an endpoint under the configured timeouts (negotiation
//! included), optionally sends one request, and reports the outcome kind.
//!
//! ```text
//! smb-transport --config transport.toml 10.0.0.5:445 \
//!     --connect-timeout-ms 100 --response-timeout-ms 100 --negotiate hello --request ping
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::Parser;
use serde_json::json;

use smb_transport::config::loader::load_config;
use smb_transport::observability::logging::init_logging;
use smb_transport::{Endpoint, TimeoutOverrides, TransportConfig, TransportManager, WORKER_NAME_PREFIX};

#[derive(Parser)]
#[command(name = "smb-transport")]
#[command(about = "Check a server endpoint through the timeout-governed transport", long_about = None)]
struct Cli {
    /// Endpoint as host:port.
    endpoint: Endpoint,

    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the connect timeout (ms).
    #[arg(long)]
    connect_timeout_ms: Option<u64>,

    /// Override the response timeout (ms).
    #[arg(long)]
    response_timeout_ms: Option<u64>,

    /// Override the socket read timeout (ms).
    #[arg(long)]
    socket_timeout_ms: Option<u64>,

    /// Negotiation payload sent during connect (overrides the configured one).
    #[arg(long)]
    negotiate: Option<String>,

    /// Request payload sent after connecting.
    #[arg(long)]
    request: Option<String>,

    /// Print the outcome as JSON.
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn overrides(&self) -> TimeoutOverrides {
        let mut overrides = TimeoutOverrides::new();
        if let Some(ms) = self.connect_timeout_ms {
            overrides = overrides.connect(Duration::from_millis(ms));
        }
        if let Some(ms) = self.response_timeout_ms {
            overrides = overrides.response(Duration::from_millis(ms));
        }
        if let Some(ms) = self.socket_timeout_ms {
            overrides = overrides.socket(Duration::from_millis(ms));
        }
        overrides
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match load_config(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error: {e}");
                return ExitCode::from(2);
            }
        },
        None => TransportConfig::default(),
    };

    init_logging(&config.observability.log_level);

    let mut manager = TransportManager::new(&config);
    if let Some(payload) = &cli.negotiate {
        manager = manager.with_negotiation(payload.as_bytes());
    }
    let manager = manager.with_overrides(cli.overrides());
    let timeouts = manager.timeouts();

    tracing::info!(
        endpoint = %cli.endpoint,
        connect_ms = timeouts.connect.as_millis() as u64,
        response_ms = timeouts.response.as_millis() as u64,
        socket_ms = timeouts.socket.as_millis() as u64,
        "Probing endpoint"
    );

    let started = Instant::now();
    let transport = manager.acquire(&cli.endpoint);
    let mut result = manager.connect(&transport).await.map(|()| None);
    if let (true, Some(request)) = (result.is_ok(), &cli.request) {
        result = manager.send(&transport, request.as_bytes()).await.map(Some);
    }
    let elapsed_ms = started.elapsed().as_millis() as u64;

    manager.shutdown().await;
    let leaked = manager.supervisor().live_workers_with_prefix(WORKER_NAME_PREFIX);

    let (outcome, detail) = match &result {
        Ok(_) => ("success".to_string(), None),
        Err(e) => (e.kind().to_string(), Some(e.to_string())),
    };
    let reply = match &result {
        Ok(Some(bytes)) => Some(String::from_utf8_lossy(bytes).into_owned()),
        _ => None,
    };

    if cli.json {
        let report = json!({
            "endpoint": cli.endpoint.to_string(),
            "outcome": outcome,
            "error": detail,
            "reply": reply,
            "negotiated": transport.negotiated().map(|b| String::from_utf8_lossy(&b).into_owned()),
            "elapsed_ms": elapsed_ms,
            "leaked_workers": &leaked,
        });
        println!("{report:#}");
    } else {
        println!("{} -> {} in {}ms", cli.endpoint, outcome, elapsed_ms);
        if let Some(detail) = detail {
            println!("  error: {detail}");
        }
        if let Some(reply) = reply {
            println!("  reply: {reply}");
        }
        if !leaked.is_empty() {
            println!("  leaked workers: {}", leaked.join(", "));
        }
    }

    if result.is_ok() && leaked.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

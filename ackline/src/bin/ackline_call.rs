//! Issue one call against a service and print the reply.
//!
//! # Usage
//!
//! ```bash
//! ackline-call --host 10.0.0.5 --user admin --pass secret stock count '{"sku":"A-1"}'
//! ```
//!
//! Logs go to stderr and are controlled by `RUST_LOG`; the reply payload is
//! printed to stdout as JSON.

use std::process::ExitCode;

use clap::Parser;
use serde_json::Value;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ackline::{ConnectOptions, Credentials, Payload, RejectingHandler, SessionBuilder, TcpConnector};

/// CLI arguments
#[derive(Parser, Debug)]
#[command(name = "ackline-call")]
#[command(about = "Log in to a service and issue a single call", long_about = None)]
struct Args {
    /// Service host
    #[arg(long)]
    host: String,

    /// Service port (defaults to 9010, or 9011 with --secure)
    #[arg(long)]
    port: Option<u16>,

    /// Request the secure transport
    #[arg(long)]
    secure: bool,

    /// Login user
    #[arg(long)]
    user: String,

    /// Login password
    #[arg(long)]
    pass: String,

    /// Service class of the call
    class: String,

    /// Command within the class
    command: String,

    /// Call arguments as a JSON object
    data: Option<String>,
}

fn parse_payload(data: Option<&str>) -> Result<Payload, String> {
    let Some(text) = data else {
        return Ok(Payload::new());
    };
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(format!("call data must be a JSON object, got {other}")),
        Err(e) => Err(format!("call data is not valid JSON: {e}")),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,ackline=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let payload = match parse_payload(args.data.as_deref()) {
        Ok(payload) => payload,
        Err(message) => {
            eprintln!("{message}");
            return ExitCode::from(2);
        }
    };

    let mut options = ConnectOptions::default();
    if args.secure {
        options = options.secure();
    }
    if let Some(port) = args.port {
        options = options.with_port(port);
    }

    let credentials = Credentials::new(args.user, args.pass);
    let (session, session_id) = match SessionBuilder::new("ackline-call", RejectingHandler)
        .start(&TcpConnector, &args.host, &options, &credentials)
        .await
    {
        Ok(started) => started,
        Err(e) => {
            eprintln!("login to {} failed: {e}", args.host);
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(%session_id, remote = session.remote_address(), "session established");

    let result = session.call(args.class, args.command, payload).await;
    session.stop();
    session.closed().await;

    match result {
        Ok(reply) => match serde_json::to_string_pretty(&Value::Object(reply)) {
            Ok(text) => {
                println!("{text}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("reply could not be rendered: {e}");
                ExitCode::FAILURE
            }
        },
        Err(e) => {
            eprintln!("call failed: {e}");
            ExitCode::FAILURE
        }
    }
}

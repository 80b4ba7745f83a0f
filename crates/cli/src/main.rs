#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! durable-cli — a minimal reference host for `durable-comm`.
//!
//! Not a framework adapter: just a bare `tokio` TCP accept loop wiring a
//! [`durable_comm::CommHandler`] to raw HTTP/1.1, the way the teacher's
//! `ojd` binary wires `oj-daemon` + `oj-engine` together. Exists so the
//! crate family is runnable end-to-end in local dev and integration
//! tests, not as a product surface in its own right.

mod adapter;
mod demo;
mod http;

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use durable_comm::{CommHandler, Options};
use durable_core::SystemClock;
use durable_middleware::MiddlewarePipeline;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::adapter::RawAdapter;

#[derive(Parser)]
#[command(name = "durable-cli", version, about = "Reference host for the durable-comm protocol")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP listener serving registered functions.
    Serve {
        /// Address to bind, e.g. 127.0.0.1:3000.
        #[arg(long, default_value = "127.0.0.1:3000")]
        addr: String,

        /// App id reported during registration and introspection.
        #[arg(long, default_value = "durable-demo")]
        app_id: String,

        /// Treat the process as running in production (cloud mode)
        /// unless INNGEST_DEV overrides it.
        #[arg(long)]
        production: bool,
    },
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_env("INNGEST_LOG_LEVEL").unwrap_or_else(|_| "info".into()))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            addr,
            app_id,
            production,
        } => serve(&addr, &app_id, production).await,
    }
}

async fn serve(addr: &str, app_id: &str, production: bool) -> Result<()> {
    let mut options = Options::default();
    options.upsert_from_env(&std::env::vars().collect());

    let handler = Arc::new(CommHandler::new(
        SystemClock,
        MiddlewarePipeline::new(),
        vec![demo::hello_function()],
        options,
        app_id,
        app_id,
    ));

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "durable-cli listening");

    loop {
        let (mut stream, peer) = listener.accept().await.context("accepting connection")?;
        let handler = handler.clone();
        let serve_url = format!("http://{addr}");
        tokio::spawn(async move {
            if let Err(err) = handle_connection(&mut stream, &handler, &serve_url, production).await {
                error!(%peer, %err, "connection error");
            }
        });
    }
}

async fn handle_connection(
    stream: &mut tokio::net::TcpStream,
    handler: &CommHandler<SystemClock>,
    serve_url: &str,
    production: bool,
) -> Result<()> {
    let request = http::read_request(stream).await?;
    let adapter = RawAdapter::new(request, serve_url, production);
    let now_secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    let response = handler.handle(&adapter, now_secs).await;
    http::write_response(stream, &response).await?;
    Ok(())
}

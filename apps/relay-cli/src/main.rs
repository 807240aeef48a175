mod args;
mod session;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use args::CliArgs;
use session::AppSession;

fn init_logging(default_filter: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    // stdout may carry the record stream
    let console_layer = fmt::layer().with_writer(std::io::stderr).with_target(true).with_thread_names(true);
    tracing_subscriber::registry().with(env_filter).with(console_layer).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_logging(&args.log_level);

    let session = Arc::new(AppSession::build(&args)?);
    let req = args.lobby_request();

    let streaming = {
        let session = session.clone();
        let req = req.clone();
        tokio::task::spawn_blocking(move || session.stream(&req))
    };
    tokio::pin!(streaming);
    let token = tokio::select! {
        joined = &mut streaming => joined?.context("starting the stream")?,
        r = tokio::signal::ctrl_c() => {
            r.context("listening for ctrl-c")?;
            info!("Interrupted while waiting for the simulator");
            session.controller.abort_connect();
            let _ = streaming.await?;
            return Ok(());
        }
    };
    info!("Streaming lobby '{}' with token {token}", req.lobby_name);

    if req.wants_commands() {
        session.pump_stdin()?;
    }

    tokio::select! {
        r = tokio::signal::ctrl_c() => {
            r.context("listening for ctrl-c")?;
            info!("Interrupted");
        }
        _ = session.wait_for_exit(Duration::from_millis(500)) => {
            warn!("Streaming threads stopped, shutting down");
        }
    }

    let stopping = session.clone();
    tokio::task::spawn_blocking(move || stopping.controller.stop()).await?;
    Ok(())
}

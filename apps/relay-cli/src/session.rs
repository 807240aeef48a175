use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use iox::{default_settings_path, load_settings, LineSubscriber, NdjsonPublisher, ReplaySource};
use relay_core::{DataSettings, LobbyRequest, MemoryControlPlane, Publisher, RelayError};
use relay_engine::{ConnectionController, ControllerConfig, SystemClock};
use tracing::{error, info};

use crate::args::CliArgs;

pub struct AppSession {
    pub controller: ConnectionController,
    subscriber: Arc<LineSubscriber>,
}

fn settings_for(args: &CliArgs) -> DataSettings {
    match args.settings.clone().or_else(default_settings_path) {
        Some(path) => load_settings(&path),
        None => DataSettings::default(),
    }
}

impl AppSession {
    pub fn build(args: &CliArgs) -> Result<Self> {
        let publisher: Arc<dyn Publisher> = match &args.out {
            Some(path) => Arc::new(NdjsonPublisher::create(path).context("opening the record output")?),
            None => Arc::new(NdjsonPublisher::stdout()),
        };
        let source = Arc::new(ReplaySource::new(None, Some(Duration::from_millis(args.frame_ms))));
        let subscriber = Arc::new(LineSubscriber::new());
        let config = ControllerConfig { replay: Some(args.replay.clone()), ..Default::default() };

        let controller = ConnectionController::new(
            source,
            publisher,
            Arc::new(MemoryControlPlane::new()),
            subscriber.clone(),
            Arc::new(SystemClock),
            config,
            settings_for(args),
        );
        Ok(Self { controller, subscriber })
    }

    /// Blocks until the simulator is up and the jobs are running.
    pub fn stream(&self, req: &LobbyRequest) -> Result<String, RelayError> {
        self.controller.create_lobby_and_stream(req)
    }

    /// Feeds stdin lines to the command channel on a background thread.
    pub fn pump_stdin(&self) -> Result<()> {
        let subscriber = self.subscriber.clone();
        std::thread::Builder::new()
            .name("stdin-commands".into())
            .spawn(move || match subscriber.pump(std::io::stdin().lock()) {
                Ok(n) => info!("stdin closed after {n} command(s)"),
                Err(e) => error!("reading commands from stdin: {e:#}"),
            })
            .context("spawning the stdin reader")?;
        Ok(())
    }

    pub async fn wait_for_exit(&self, every: Duration) {
        while self.controller.are_threads_running() {
            tokio::time::sleep(every).await;
        }
    }
}

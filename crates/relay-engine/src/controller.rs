//! Start/stop of a streaming run: waits for the simulator, validates the
//! stream token, owns the job-runner and heartbeat threads and tears all of
//! it down again.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use parking_lot::{Mutex, RwLock};
use relay_core::{
    CommandSubscriber, ControlPlane, DataSettings, DataSource, LobbyRequest, LobbyResponse, Publisher, RelayError,
};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::command::CommandDispatcher;
use crate::config::ControllerConfig;
use crate::context::{schedule_data_ingestion, EngineContext, SharedContext};
use crate::emitter::{Emitter, TokenCell};
use crate::scheduler::Scheduler;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Stopped,
    Connecting,
    Running,
    Stopping,
}

struct Worker {
    name: &'static str,
    handle: JoinHandle<()>,
    /// disconnects when the thread body returns or unwinds
    done: Receiver<()>,
}

impl Worker {
    fn spawn<F>(name: &'static str, body: F) -> Result<Self, RelayError>
    where
        F: FnOnce() + Send + 'static,
    {
        let (tx, done) = crossbeam_channel::bounded::<()>(0);
        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let _tx = tx;
                body();
            })
            .map_err(anyhow::Error::from)?;
        Ok(Self { name, handle, done })
    }

    fn is_alive(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Waits at most `timeout`; a thread that does not finish is left behind.
    fn join(self, timeout: Duration) {
        match self.done.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => {
                warn!("{} thread did not terminate within {:?}", self.name, timeout);
            }
            _ => {
                if self.handle.join().is_err() {
                    error!("{} thread panicked", self.name);
                }
            }
        }
    }
}

struct Workers {
    stop: Arc<AtomicBool>,
    runner: Worker,
    heartbeat: Worker,
}

/// Connect-or-disconnect step shared by the start-up wait and the heartbeat.
/// Returns whether the simulator is connected after the check.
fn check_simulator(source: &dyn DataSource, connected: &AtomicBool, replay: Option<&Path>) -> bool {
    if connected.load(Ordering::SeqCst) {
        if source.is_initialized() && source.is_connected() {
            return true;
        }
        connected.store(false, Ordering::SeqCst);
        source.shutdown();
        return false;
    }
    if source.startup(replay) && source.is_initialized() && source.is_connected() {
        connected.store(true, Ordering::SeqCst);
        return true;
    }
    false
}

pub struct ConnectionController {
    source: Arc<dyn DataSource>,
    control: Arc<dyn ControlPlane>,
    subscriber: Arc<dyn CommandSubscriber>,
    emitter: Emitter,
    dispatcher: Arc<CommandDispatcher>,
    scheduler: Arc<Scheduler>,
    ctx: SharedContext,
    clock: Arc<dyn Clock>,
    config: ControllerConfig,
    settings: RwLock<DataSettings>,
    phase: Mutex<Phase>,
    workers: Mutex<Option<Workers>>,
    abort: AtomicBool,
    subscribed: AtomicBool,
    sim_connected: Arc<AtomicBool>,
}

impl ConnectionController {
    pub fn new(
        source: Arc<dyn DataSource>,
        publisher: Arc<dyn Publisher>,
        control: Arc<dyn ControlPlane>,
        subscriber: Arc<dyn CommandSubscriber>,
        clock: Arc<dyn Clock>,
        config: ControllerConfig,
        settings: DataSettings,
    ) -> Self {
        let emitter = Emitter::new(publisher, TokenCell::default());
        let scheduler = Arc::new(Scheduler::new(clock.clone(), config.quantum));
        let ctx = EngineContext::new(source.clone(), emitter.clone(), scheduler.handle(), config.engine.clone()).shared();
        let dispatcher = Arc::new(CommandDispatcher::new(source.clone(), emitter.clone()));
        Self {
            source,
            control,
            subscriber,
            emitter,
            dispatcher,
            scheduler,
            ctx,
            clock,
            config,
            settings: RwLock::new(settings),
            phase: Mutex::new(Phase::Stopped),
            workers: Mutex::new(None),
            abort: AtomicBool::new(false),
            subscribed: AtomicBool::new(false),
            sim_connected: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn phase(&self) -> Phase {
        *self.phase.lock()
    }

    pub fn context(&self) -> &SharedContext {
        &self.ctx
    }

    pub fn dispatcher(&self) -> &Arc<CommandDispatcher> {
        &self.dispatcher
    }

    /// Takes effect on the next `start`.
    pub fn set_settings(&self, settings: DataSettings) {
        *self.settings.write() = settings;
    }

    /// Both the job runner and the heartbeat are alive. Turns false once the
    /// heartbeat gives up on a lost simulator.
    pub fn are_threads_running(&self) -> bool {
        match self.workers.lock().as_ref() {
            Some(w) => w.runner.is_alive() && w.heartbeat.is_alive(),
            None => false,
        }
    }

    /// Makes a blocked `start` give up waiting for the simulator.
    pub fn abort_connect(&self) {
        self.abort.store(true, Ordering::SeqCst);
    }

    /// Blocks until the simulator is reachable, then validates `token` and
    /// starts streaming. `RelayError::Conflict` means another client already
    /// streams to the lobby.
    pub fn start(&self, token: &str) -> Result<(), RelayError> {
        {
            let mut phase = self.phase.lock();
            if *phase != Phase::Stopped {
                return Err(RelayError::Msg(format!("cannot start while {:?}", *phase)));
            }
            // cleared before Connecting is visible, so an abort is never lost
            self.abort.store(false, Ordering::SeqCst);
            *phase = Phase::Connecting;
        }

        match self.try_start(token) {
            Ok(()) => {
                *self.phase.lock() = Phase::Running;
                info!("Data streaming started");
                Ok(())
            }
            Err(e) => {
                warn!("Streaming did not start: {e}");
                self.release_remote();
                *self.phase.lock() = Phase::Stopped;
                Err(e)
            }
        }
    }

    fn try_start(&self, token: &str) -> Result<(), RelayError> {
        let settings = self.settings.read().clone();
        settings.validate()?;

        info!("Waiting for the simulator...");
        self.wait_for_simulator()?;
        info!("Simulator connected");

        self.control.validate_streaming(token)?;

        self.scheduler.clear();
        self.ctx.lock().reset();
        schedule_data_ingestion(&self.ctx, &self.scheduler, token, &settings)?;
        self.spawn_workers()
    }

    fn wait_for_simulator(&self) -> Result<(), RelayError> {
        let replay = self.config.replay.as_deref();
        loop {
            if check_simulator(self.source.as_ref(), &self.sim_connected, replay) {
                return Ok(());
            }
            if self.abort.load(Ordering::SeqCst) {
                return Err(RelayError::Aborted);
            }
            self.clock.sleep(self.config.connect_poll);
        }
    }

    fn spawn_workers(&self) -> Result<(), RelayError> {
        let stop = Arc::new(AtomicBool::new(false));

        let runner = {
            let stop = stop.clone();
            let scheduler = self.scheduler.clone();
            Worker::spawn("job-runner", move || {
                while !stop.load(Ordering::SeqCst) {
                    scheduler.tick();
                }
            })?
        };

        let heartbeat = {
            let hb_stop = stop.clone();
            let source = self.source.clone();
            let connected = self.sim_connected.clone();
            let clock = self.clock.clone();
            let replay = self.config.replay.clone();
            let every = self.config.heartbeat_interval;
            let spawned = Worker::spawn("heartbeat", move || {
                while !hb_stop.load(Ordering::SeqCst) && check_simulator(source.as_ref(), &connected, replay.as_deref()) {
                    clock.sleep(every);
                }
                info!("Simulator heartbeat stopped");
            });
            match spawned {
                Ok(w) => w,
                Err(e) => {
                    stop.store(true, Ordering::SeqCst);
                    runner.join(self.config.join_timeout);
                    return Err(e);
                }
            }
        };

        *self.workers.lock() = Some(Workers { stop, runner, heartbeat });
        Ok(())
    }

    /// Stops streaming and releases the remote session. Safe to call at any
    /// time, repeated calls release nothing twice.
    pub fn stop(&self) {
        info!("Stopping streaming...");
        self.abort.store(true, Ordering::SeqCst);
        *self.phase.lock() = Phase::Stopping;

        let workers = self.workers.lock().take();
        self.scheduler.clear();
        if let Some(w) = workers {
            w.stop.store(true, Ordering::SeqCst);
            w.runner.join(self.config.join_timeout);
            w.heartbeat.join(self.config.join_timeout);
        }

        if self.sim_connected.swap(false, Ordering::SeqCst) && self.source.is_connected() {
            self.source.shutdown();
        }
        self.release_remote();

        // a runner that outlived the join may still hold the context
        match self.ctx.try_lock_for(self.config.join_timeout) {
            Some(mut ctx) => ctx.reset(),
            None => warn!("engine context still busy, state not reset"),
        }
        *self.phase.lock() = Phase::Stopped;
        info!("Streaming stopped");
    }

    /// Unsubscribes and hands the token back, each only if held.
    fn release_remote(&self) {
        if self.subscribed.swap(false, Ordering::SeqCst) {
            let n = self.subscriber.unsubscribe_all();
            info!("Unsubscribed from {n} command topic(s)");
        }
        if let Some(token) = self.emitter.token().take() {
            if let Err(e) = self.control.release_session(&token) {
                warn!("Failed to release the streaming session: {e}");
            }
        }
    }

    pub fn create_lobby_and_stream(&self, req: &LobbyRequest) -> Result<String, RelayError> {
        info!("Creating lobby: {}", req.lobby_name);
        let resp = self.control.create_session(req)?;
        let token = self.stream_lobby(req, resp)?;
        info!("Lobby '{}' created successfully", req.lobby_name);
        Ok(token)
    }

    pub fn join_lobby_and_stream(&self, req: &LobbyRequest) -> Result<String, RelayError> {
        info!("Joining lobby: {}", req.lobby_name);
        let resp = self.control.join_session(req)?;
        let token = self.stream_lobby(req, resp)?;
        info!("Joined lobby '{}' successfully", req.lobby_name);
        Ok(token)
    }

    fn stream_lobby(&self, req: &LobbyRequest, resp: LobbyResponse) -> Result<String, RelayError> {
        let token = match resp.token {
            Some(t) => t,
            None => {
                let reason = resp.error.unwrap_or_else(|| "no token received".into());
                error!("Lobby {} refused: {reason}", req.lobby_name);
                return Err(RelayError::Validation(reason));
            }
        };
        if req.wants_commands() {
            let client_id = format!("iremoteengineer_{}", &Uuid::new_v4().simple().to_string()[..8]);
            let topic = format!("{}/commands", req.lobby_name);
            self.subscriber.subscribe(&topic, &client_id, self.dispatcher.handler())?;
            self.subscribed.store(true, Ordering::SeqCst);
            info!("Subscribed to {topic} as {client_id}");
        }
        self.start(&token)?;
        Ok(token)
    }
}

//! Runs the engine on a dedicated thread.
//!
//! The engine is single-threaded (`!Send`), so it is built and driven inside
//! a worker thread with a current-thread tokio runtime. The UI talks to it
//! through [`HostCommand`]s.

use std::{
    future::Future,
    pin::Pin,
    thread::{self, JoinHandle},
};

use anyhow::Context as _;
use grove_core::{
    Bounds, Engine, EngineConfig, RunOutcome, error::Result as EngineResult,
    surface::RenderSurface,
};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::surface::SharedSurface;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum HostCommand {
    Restart,
    Resize(Bounds),
    Shutdown,
}

type RunFuture = Pin<Box<dyn Future<Output = EngineResult<RunOutcome>>>>;

/// Handle to the engine thread. Dropping it shuts the thread down.
pub struct EngineHost {
    tx: mpsc::UnboundedSender<HostCommand>,
    thread: Option<JoinHandle<()>>,
}

impl EngineHost {
    /// Spawns the engine thread and starts the first run right away.
    pub fn spawn(config: EngineConfig, surface: SharedSurface) -> anyhow::Result<Self> {
        config.validate()?;
        let (tx, rx) = mpsc::unbounded_channel();

        let thread = thread::Builder::new()
            .name("grove-engine".into())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(err) => {
                        error!(error = %err, "failed to build the engine runtime");
                        return;
                    }
                };
                let engine = match Engine::from_config(config, surface) {
                    Ok(engine) => engine,
                    Err(err) => {
                        error!(error = %err, "failed to build the engine");
                        return;
                    }
                };
                runtime.block_on(serve(engine, rx));
            })
            .context("failed to spawn the engine thread")?;

        Ok(Self {
            tx,
            thread: Some(thread),
        })
    }

    /// Queues a command; ignored once the engine thread is gone.
    pub fn send(&self, command: HostCommand) {
        if self.tx.send(command).is_err() {
            warn!(?command, "engine thread is gone");
        }
    }
}

impl Drop for EngineHost {
    fn drop(&mut self) {
        let _ = self.tx.send(HostCommand::Shutdown);
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            error!("engine thread panicked");
        }
    }
}

/// Drives `engine` until [`HostCommand::Shutdown`] or until every sender is
/// dropped.
///
/// The first run starts immediately. A restart replaces the pending run
/// future; `Engine::restart` has already moved the epoch on, so the dropped
/// run could not have mutated the scene again anyway.
pub async fn serve<S: RenderSurface + 'static>(
    engine: Engine<S>,
    mut rx: mpsc::UnboundedReceiver<HostCommand>,
) {
    let mut run: RunFuture = Box::pin(engine.start(engine.config().max_cycles));
    let mut finished = false;

    loop {
        tokio::select! {
            outcome = &mut run, if !finished => {
                finished = true;
                match outcome {
                    Ok(RunOutcome::Completed) => {
                        info!(cycles = engine.completed_cycles(), "run completed");
                    }
                    Ok(RunOutcome::Cancelled) => info!("run superseded"),
                    Err(err) => error!(error = %err, "run failed"),
                }
            }
            command = rx.recv() => match command {
                Some(HostCommand::Restart) => {
                    run = Box::pin(engine.restart());
                    finished = false;
                }
                Some(HostCommand::Resize(bounds)) => {
                    if let Err(err) = engine.resize(bounds) {
                        warn!(error = %err, "resize rejected");
                    }
                }
                Some(HostCommand::Shutdown) | None => break,
            },
        }
    }
    info!("engine host stopped");
}

use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use tracing::info;

use crate::config::AppConfig;
use crate::engine::{Command, Engine, EngineSnapshot};

/// Upper bound on one wait so command latency stays low even when no timer
/// is pending (suspended engine).
const MAX_WAIT_SEC: f64 = 0.25;

/// Handle held by the caller: enqueue commands, receive snapshots, join on
/// shutdown. Dropping without `shutdown` detaches the thread.
pub struct EngineHandle {
    commands: Sender<Command>,
    snapshots: Receiver<EngineSnapshot>,
    join: Option<thread::JoinHandle<()>>,
}

impl EngineHandle {
    pub fn send(&self, command: Command) -> bool {
        self.commands.send(command).is_ok()
    }

    pub fn snapshots(&self) -> &Receiver<EngineSnapshot> {
        &self.snapshots
    }

    pub fn shutdown(mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

/// Spawn the engine on its own thread. All engine state lives inside the
/// thread; the handle only owns channel endpoints.
pub fn spawn(config: AppConfig, seed: Option<u64>, snapshot_period_sec: f64) -> EngineHandle {
    let (command_tx, command_rx) = bounded::<Command>(64);
    let (snapshot_tx, snapshot_rx) = bounded::<EngineSnapshot>(8);
    let join = thread::Builder::new()
        .name("engine".into())
        .spawn(move || {
            run_loop(config, seed, snapshot_period_sec, command_rx, snapshot_tx)
        })
        .expect("spawn engine thread");
    EngineHandle {
        commands: command_tx,
        snapshots: snapshot_rx,
        join: Some(join),
    }
}

fn run_loop(
    config: AppConfig,
    seed: Option<u64>,
    snapshot_period_sec: f64,
    commands: Receiver<Command>,
    snapshots: Sender<EngineSnapshot>,
) {
    let started = Instant::now();
    let mut engine = Engine::new(&config, seed);
    engine.start(0.0);
    let mut next_snapshot_at = snapshot_period_sec;

    loop {
        let now = started.elapsed().as_secs_f64();
        engine.advance_to(now);

        if snapshot_period_sec > 0.0 && now >= next_snapshot_at {
            // Drop the frame if the consumer is behind; state keeps moving.
            let _ = snapshots.try_send(engine.snapshot(now));
            next_snapshot_at = now + snapshot_period_sec;
        }

        let wake = engine
            .next_wake()
            .map(|at| (at - now).max(0.0))
            .unwrap_or(MAX_WAIT_SEC)
            .min(MAX_WAIT_SEC);
        match commands.recv_timeout(Duration::from_secs_f64(wake)) {
            Ok(Command::Shutdown) => break,
            Ok(command) => {
                let now = started.elapsed().as_secs_f64();
                engine.handle(command, now);
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    info!("engine thread exiting");
}

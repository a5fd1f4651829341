pub mod runner;

use rand::Rng;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::core::scale::{FREQ_MAX_HZ, FREQ_MIN_HZ, Scale, ScalePreset, quantize};
use crate::core::smooth::Smoothed;
use crate::core::timebase::Timebase;
use crate::life::krell::{KrellActor, KrellWorld};
use crate::life::listener::{DriftListener, ListenerPolicy};
use crate::patch::catalog::BuiltinCatalog;
use crate::patch::registry::{CELL_COUNT, CellRegistry, GESTURE_CELLS, is_gesture_cell};
use crate::patch::routing::{Edge, rewire};
use crate::patch::unit::UnitCategory;
use crate::phrase::generator::Influences;
use crate::phrase::scheduler::{PhraseScheduler, TriggerInfo};
use crate::phrase::tintinnabuli::TintinMode;

/// Deferred-release sweep cadence.
const SWEEP_PERIOD_SEC: f64 = 0.25;
/// Listening feedback cadence; deliberately slow.
const LISTEN_PERIOD_SEC: f64 = 2.0;

/// External surface of the engine. Callers enqueue these instead of touching
/// state; the engine thread applies them between timer callbacks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Toggle(usize),
    /// Toggle on ordinary cells, gesture on the reserved corners.
    Touch(usize),
    NudgeMelodic,
    NudgeRhythmic,
    EvolveConsonance,
    RandomizeAll,
    SetScale(ScalePreset),
    SetRoot(f32),
    SetDrone(bool),
    SetTintinnabuli(Option<TintinMode>),
    Suspend,
    Resume,
    Shutdown,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineSnapshot {
    pub at: f64,
    pub tempo_bpm: f32,
    pub scale: &'static str,
    pub root_hz: f32,
    pub density: f32,
    pub active_cells: Vec<CellInfo>,
    pub connections: Vec<Edge>,
    pub phrase_position: f64,
    pub triggers: Vec<TriggerInfo>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct CellInfo {
    pub index: usize,
    pub category: UnitCategory,
    pub kind: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Deadline {
    PhraseTick,
    Krell,
    Sweep,
    Listen,
}

/// The single owner of all mutable engine state. Time is explicit: the
/// runner (or a test) drives `advance_to` with a monotonic clock and applies
/// commands in between, so every mutation happens on one logical timeline.
pub struct Engine {
    registry: CellRegistry,
    timebase: Timebase,
    scheduler: PhraseScheduler,
    krell: KrellActor,
    listener: DriftListener,
    scale: Scale,
    root_hz: f32,
    master_gain: Smoothed,
    edges: Vec<Edge>,
    routed_epoch: u64,
    rng: SmallRng,
    last_advance: f64,
    next_phrase_tick: Option<f64>,
    next_sweep_at: Option<f64>,
    next_listen_at: Option<f64>,
    suspended: bool,
}

impl Engine {
    pub fn new(config: &AppConfig, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_os_rng(),
        };
        let mut registry = CellRegistry::new(Box::new(BuiltinCatalog));
        registry.set_drone(config.engine.drone);
        let mut scheduler = PhraseScheduler::new(Influences {
            harmony: config.phrase.harmony,
            minimalism: config.phrase.minimalism,
        });
        scheduler.set_tintinnabuli(config.engine.tintinnabuli.as_mode());
        Self {
            registry,
            timebase: Timebase::new(config.engine.tempo_bpm),
            scheduler,
            krell: KrellActor::new(config.krell.density, config.krell.base_interval_sec),
            listener: DriftListener::new(ListenerPolicy {
                target_level: config.listener.target_level,
                smoothing: config.listener.smoothing,
                ..ListenerPolicy::default()
            }),
            scale: Scale::from_preset(config.engine.scale),
            root_hz: config.engine.root_hz.clamp(FREQ_MIN_HZ, FREQ_MAX_HZ),
            master_gain: Smoothed::new(0.8, 0.5),
            edges: Vec::new(),
            routed_epoch: 0,
            rng,
            last_advance: 0.0,
            next_phrase_tick: None,
            next_sweep_at: None,
            next_listen_at: None,
            suspended: true,
        }
    }

    /// Arm all timers from `now`.
    pub fn start(&mut self, now: f64) {
        self.suspended = false;
        self.last_advance = now;
        self.next_phrase_tick = Some(now);
        self.next_sweep_at = Some(now + SWEEP_PERIOD_SEC);
        self.next_listen_at = Some(now + LISTEN_PERIOD_SEC);
        self.krell.schedule_from(now, &mut self.rng);
        info!(
            "engine started: {} @ {:.1} Hz, {:.0} bpm",
            self.scale.name,
            self.root_hz,
            self.timebase.tempo_bpm()
        );
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// Cancel every pending timer. Resume re-arms from scratch; no interval
    /// carries over a suspension.
    pub fn suspend(&mut self) {
        self.suspended = true;
        self.next_phrase_tick = None;
        self.next_sweep_at = None;
        self.next_listen_at = None;
        self.krell.cancel();
        info!("engine suspended");
    }

    /// Earliest pending deadline, for the runner's wait computation.
    pub fn next_wake(&self) -> Option<f64> {
        [
            self.next_phrase_tick,
            self.next_sweep_at,
            self.next_listen_at,
            self.krell.next_fire_at(),
        ]
        .into_iter()
        .flatten()
        .min_by(f64::total_cmp)
    }

    fn next_deadline(&self) -> Option<(Deadline, f64)> {
        [
            (Deadline::PhraseTick, self.next_phrase_tick),
            (Deadline::Sweep, self.next_sweep_at),
            (Deadline::Listen, self.next_listen_at),
            (Deadline::Krell, self.krell.next_fire_at()),
        ]
        .into_iter()
        .filter_map(|(kind, at)| at.map(|at| (kind, at)))
        .min_by(|a, b| a.1.total_cmp(&b.1))
    }

    /// Run every timer callback due up to `now`, in order.
    pub fn advance_to(&mut self, now: f64) {
        while let Some((kind, at)) = self.next_deadline() {
            if at > now {
                break;
            }
            self.advance_ramps(at);
            match kind {
                Deadline::PhraseTick => {
                    self.scheduler
                        .tick(at, &self.timebase, &self.scale, self.root_hz, &mut self.rng);
                    self.next_phrase_tick = Some(at + self.timebase.step_sec());
                }
                Deadline::Krell => {
                    let mut world = KrellWorld {
                        registry: &mut self.registry,
                        timebase: &mut self.timebase,
                        scheduler: &mut self.scheduler,
                        scale: &self.scale,
                        root_hz: self.root_hz,
                    };
                    self.krell.fire(at, &mut world, &mut self.rng);
                }
                Deadline::Sweep => {
                    self.registry.sweep(at);
                    self.next_sweep_at = Some(at + SWEEP_PERIOD_SEC);
                }
                Deadline::Listen => {
                    let measured = self.measured_level(at);
                    let trim = self.listener.observe(measured);
                    let gain = (self.master_gain.target() + trim.gain_delta).clamp(0.1, 1.0);
                    self.master_gain.set_target(gain);
                    self.krell.nudge_density(trim.density_delta);
                    self.next_listen_at = Some(at + LISTEN_PERIOD_SEC);
                }
            }
            self.maybe_rewire();
        }
        self.advance_ramps(now);
    }

    fn advance_ramps(&mut self, to: f64) {
        let dt = (to - self.last_advance) as f32;
        if dt <= 0.0 {
            return;
        }
        self.registry.advance(dt);
        self.scheduler.advance(dt);
        self.master_gain.advance(dt);
        self.last_advance = to;
    }

    fn measured_level(&self, now: f64) -> f32 {
        (self.registry.gain_sum() + self.scheduler.gain_sum(now)) * self.master_gain.value()
    }

    fn maybe_rewire(&mut self) {
        if self.registry.epoch() != self.routed_epoch {
            self.edges = rewire(&self.registry, &mut self.rng);
            self.routed_epoch = self.registry.epoch();
            debug!(
                "rewired: {} cells, {} edges",
                self.registry.active_count(),
                self.edges.len()
            );
        }
    }

    pub fn handle(&mut self, command: Command, now: f64) {
        match command {
            Command::Toggle(index) => {
                let active = self.registry.toggle(index, now, &mut self.rng);
                debug!("toggle {index} -> {active}");
            }
            Command::Touch(index) => self.touch(index, now),
            Command::NudgeMelodic => self.nudge_melodic(),
            Command::NudgeRhythmic => self.nudge_rhythmic(),
            Command::EvolveConsonance => self.evolve_consonance(),
            Command::RandomizeAll => self.randomize_all(now),
            Command::SetScale(preset) => {
                self.scale = Scale::from_preset(preset);
                info!("scale: {}", self.scale.name);
            }
            Command::SetRoot(root_hz) => {
                self.root_hz = root_hz.clamp(FREQ_MIN_HZ, FREQ_MAX_HZ);
            }
            Command::SetDrone(drone) => self.registry.set_drone(drone),
            Command::SetTintinnabuli(mode) => self.scheduler.set_tintinnabuli(mode),
            Command::Suspend => self.suspend(),
            Command::Resume => {
                if self.suspended {
                    self.start(now);
                }
            }
            Command::Shutdown => {}
        }
        self.maybe_rewire();
    }

    pub fn touch(&mut self, index: usize, now: f64) {
        if !is_gesture_cell(index) {
            self.handle(Command::Toggle(index), now);
            return;
        }
        match index {
            i if i == GESTURE_CELLS[0] => self.nudge_melodic(),
            i if i == GESTURE_CELLS[1] => self.evolve_consonance(),
            i if i == GESTURE_CELLS[2] => self.nudge_rhythmic(),
            _ => self.randomize_all(now),
        }
    }

    /// Shift the melodic register and start a fresh phrase.
    fn nudge_melodic(&mut self) {
        let shift: i32 = self.rng.random_range(-2..=2);
        let generator = self.scheduler.generator_mut();
        generator.register_shift = (generator.register_shift + shift).clamp(-7, 7);
        self.scheduler.request_reset();
        info!("gesture: melodic nudge ({shift:+})");
    }

    /// Pull every oscillator back onto the scale and lean harmonic.
    fn evolve_consonance(&mut self) {
        let indices = self.registry.active_indices();
        for index in indices {
            if let Some(port) = self
                .registry
                .unit_mut(index)
                .and_then(|u| u.port_mut("frequency"))
            {
                let snapped = quantize(port.target(), &self.scale, self.root_hz);
                port.glide(snapped);
            }
        }
        let influences = &mut self.scheduler.generator_mut().influences;
        influences.harmony = (influences.harmony + 0.1).min(1.0);
        info!("gesture: consonance evolve");
    }

    /// Kick the tempo and let the next phrase bring a new rhythm.
    fn nudge_rhythmic(&mut self) {
        let delta: f32 = self.rng.random_range(-8.0..8.0);
        self.timebase
            .set_tempo_bpm(self.timebase.tempo_bpm() + delta);
        let influences = &mut self.scheduler.generator_mut().influences;
        influences.minimalism = (influences.minimalism + 0.05).min(1.0);
        self.scheduler.request_reset();
        info!("gesture: rhythmic nudge ({delta:+.1} bpm)");
    }

    /// Tear the patch down and reseed it: new cells, new scale, new phrase.
    fn randomize_all(&mut self, now: f64) {
        for index in self.registry.active_indices() {
            self.registry.deactivate(index, now);
        }
        let preset = ScalePreset::ALL[self.rng.random_range(0..ScalePreset::ALL.len())];
        self.scale = Scale::from_preset(preset);
        let count = self.rng.random_range(4..=10);
        let mut planted = 0;
        while planted < count {
            let index = self.rng.random_range(0..CELL_COUNT);
            if self.registry.activate(index, &mut self.rng) {
                planted += 1;
            }
        }
        let generator = self.scheduler.generator_mut();
        generator.influences.harmony = self.rng.random_range(0.0..1.0);
        generator.influences.minimalism = self.rng.random_range(0.0..1.0);
        generator.register_shift = 0;
        self.scheduler.request_reset();
        info!("gesture: randomize ({count} cells, {})", self.scale.name);
    }

    pub fn is_cell_active(&self, index: usize) -> bool {
        self.registry.is_active(index)
    }

    pub fn cell_category(&self, index: usize) -> Option<UnitCategory> {
        self.registry.category(index)
    }

    /// Advisory edge list for visualization; rebuilt on every mutation.
    pub fn active_connections(&self) -> &[Edge] {
        &self.edges
    }

    pub fn tempo_bpm(&self) -> f32 {
        self.timebase.tempo_bpm()
    }

    pub fn scale(&self) -> &Scale {
        &self.scale
    }

    pub fn root_hz(&self) -> f32 {
        self.root_hz
    }

    pub fn krell_density(&self) -> f32 {
        self.krell.density()
    }

    pub fn snapshot(&mut self, now: f64) -> EngineSnapshot {
        let active_cells = self
            .registry
            .active_indices()
            .into_iter()
            .filter_map(|index| {
                self.registry.unit(index).map(|unit| CellInfo {
                    index,
                    category: unit.category,
                    kind: unit.kind,
                })
            })
            .collect();
        EngineSnapshot {
            at: now,
            tempo_bpm: self.timebase.tempo_bpm(),
            scale: self.scale.name,
            root_hz: self.root_hz,
            density: self.krell.density(),
            active_cells,
            connections: self.edges.clone(),
            phrase_position: self.scheduler.position_beats(),
            triggers: self.scheduler.drain_triggers(),
        }
    }
}

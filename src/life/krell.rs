use rand::Rng;
use rand::rngs::SmallRng;
use tracing::debug;

use crate::core::sampler::WeightedTable;
use crate::core::scale::Scale;
use crate::core::timebase::Timebase;
use crate::patch::registry::{CELL_COUNT, CellRegistry, is_gesture_cell};
use crate::phrase::scheduler::PhraseScheduler;

/// Oscillator drift, detune and jump stay inside this band.
pub const KRELL_FREQ_MIN_HZ: f32 = 55.0;
pub const KRELL_FREQ_MAX_HZ: f32 = 1_760.0;

/// Gain floor below which a decaying cell is resolved one way or the other.
const DECAY_FLOOR: f32 = 0.02;
/// Chance the resolved cell comes back with fresh gain instead of dying.
const DECAY_RESTORE_PROB: f64 = 0.7;

/// Harmonic jump intervals: octave, fifth, third, fourth, both directions.
const JUMP_RATIOS: [f32; 8] = [
    2.0,
    0.5,
    3.0 / 2.0,
    2.0 / 3.0,
    5.0 / 4.0,
    4.0 / 5.0,
    4.0 / 3.0,
    3.0 / 4.0,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    DriftParam,
    ToggleCell,
    MicroDetune,
    BeatingPair,
    GainDecay,
    HarmonicJump,
    MutatePhrase,
    NudgeTempo,
}

/// Everything one actor firing may touch.
pub struct KrellWorld<'a> {
    pub registry: &'a mut CellRegistry,
    pub timebase: &'a mut Timebase,
    pub scheduler: &'a mut PhraseScheduler,
    pub scale: &'a Scale,
    pub root_hz: f32,
}

/// The self-playing half of the patch: a self-rescheduling timer that, with
/// probability `density`, applies one weighted random perturbation per
/// firing. Intervals are jittered so the pacing never turns metronomic.
pub struct KrellActor {
    density: f32,
    base_interval_sec: f64,
    actions: WeightedTable<Action>,
    next_fire_at: Option<f64>,
}

impl KrellActor {
    pub fn new(density: f32, base_interval_sec: f64) -> Self {
        Self {
            density: density.clamp(0.0, 1.0),
            base_interval_sec: base_interval_sec.max(0.05),
            actions: WeightedTable::new(&[
                (Action::DriftParam, 0.22),
                (Action::ToggleCell, 0.18),
                (Action::MicroDetune, 0.14),
                (Action::BeatingPair, 0.10),
                (Action::GainDecay, 0.12),
                (Action::HarmonicJump, 0.10),
                (Action::MutatePhrase, 0.08),
                (Action::NudgeTempo, 0.06),
            ]),
            next_fire_at: None,
        }
    }

    pub fn density(&self) -> f32 {
        self.density
    }

    pub fn set_density(&mut self, density: f32) {
        self.density = density.clamp(0.0, 1.0);
    }

    pub fn nudge_density(&mut self, delta: f32) {
        self.set_density(self.density + delta);
    }

    pub fn next_fire_at(&self) -> Option<f64> {
        self.next_fire_at
    }

    /// Arm the timer from `now`. Also used on resume after suspension.
    pub fn schedule_from(&mut self, now: f64, rng: &mut SmallRng) {
        let jitter: f64 = rng.random_range(0.3..1.7);
        self.next_fire_at = Some(now + self.base_interval_sec * jitter);
    }

    /// Drop the pending timer entirely.
    pub fn cancel(&mut self) {
        self.next_fire_at = None;
    }

    pub fn is_due(&self, now: f64) -> bool {
        matches!(self.next_fire_at, Some(at) if at <= now)
    }

    /// One firing: maybe act, always reschedule.
    pub fn fire(&mut self, now: f64, world: &mut KrellWorld<'_>, rng: &mut SmallRng) {
        if rng.random_range(0.0..1.0f32) < self.density
            && let Some(action) = self.actions.pick(rng)
        {
            debug!("krell: {action:?}");
            self.apply(action, now, world, rng);
        }
        self.schedule_from(now, rng);
    }

    fn apply(&mut self, action: Action, now: f64, world: &mut KrellWorld<'_>, rng: &mut SmallRng) {
        match action {
            Action::DriftParam => drift_param(world, rng),
            Action::ToggleCell => toggle_cell(now, world, rng),
            Action::MicroDetune => micro_detune(world, rng),
            Action::BeatingPair => beating_pair(world, rng),
            Action::GainDecay => gain_decay(now, world, rng),
            Action::HarmonicJump => harmonic_jump(world, rng),
            Action::MutatePhrase => {
                world
                    .scheduler
                    .mutate_upcoming(world.scale, world.root_hz, rng)
            }
            Action::NudgeTempo => nudge_tempo(world, rng),
        }
    }
}

fn pick_active(registry: &CellRegistry, rng: &mut SmallRng) -> Option<usize> {
    let active = registry.active_indices();
    if active.is_empty() {
        return None;
    }
    Some(active[rng.random_range(0..active.len())])
}

fn oscillator_cells(registry: &CellRegistry) -> Vec<usize> {
    registry
        .active_indices()
        .into_iter()
        .filter(|&i| registry.unit(i).is_some_and(|u| u.is_oscillator_like()))
        .collect()
}

/// Gently approach a ±5% retarget of one random port on one random cell.
fn drift_param(world: &mut KrellWorld<'_>, rng: &mut SmallRng) {
    let Some(index) = pick_active(world.registry, rng) else {
        return;
    };
    let Some(unit) = world.registry.unit_mut(index) else {
        return;
    };
    let names: Vec<_> = unit.port_names().collect();
    if names.is_empty() {
        return;
    }
    let name = names[rng.random_range(0..names.len())];
    let scale: f32 = rng.random_range(0.95..1.05);
    if let Some(port) = unit.port_mut(name) {
        let mut target = port.value() * scale;
        if name == "frequency" {
            target = target.clamp(KRELL_FREQ_MIN_HZ, KRELL_FREQ_MAX_HZ);
        }
        port.glide(target);
    }
}

/// Toggle one non-reserved cell, biased toward activation so the texture
/// thickens over a long sit.
fn toggle_cell(now: f64, world: &mut KrellWorld<'_>, rng: &mut SmallRng) {
    let index = rng.random_range(0..CELL_COUNT);
    if is_gesture_cell(index) {
        return;
    }
    if world.registry.is_active(index) {
        if rng.random_bool(0.3) {
            world.registry.deactivate(index, now);
        }
    } else {
        world.registry.activate(index, rng);
    }
}

/// Sub-cent drift across every oscillator-like cell.
fn micro_detune(world: &mut KrellWorld<'_>, rng: &mut SmallRng) {
    for index in oscillator_cells(world.registry) {
        let cents: f32 = rng.random_range(-1.0..1.0);
        let factor = 2f32.powf(cents / 1200.0);
        if let Some(port) = world
            .registry
            .unit_mut(index)
            .and_then(|u| u.port_mut("frequency"))
        {
            let target = (port.value() * factor).clamp(KRELL_FREQ_MIN_HZ, KRELL_FREQ_MAX_HZ);
            port.glide(target);
        }
    }
}

/// Tune one oscillator a just interval away from another, offset by a few
/// cents so the pair beats slowly.
fn beating_pair(world: &mut KrellWorld<'_>, rng: &mut SmallRng) {
    let oscillators = oscillator_cells(world.registry);
    if oscillators.len() < 2 {
        return;
    }
    let a = oscillators[rng.random_range(0..oscillators.len())];
    let b = loop {
        let cand = oscillators[rng.random_range(0..oscillators.len())];
        if cand != a {
            break cand;
        }
    };
    let anchor = match world.registry.unit(a).and_then(|u| u.port("frequency")) {
        Some(port) => port.target(),
        None => return,
    };
    let ratio = [1.0f32, 3.0 / 2.0, 5.0 / 4.0, 4.0 / 3.0][rng.random_range(0..4)];
    let cents: f32 = rng.random_range(2.0..8.0) * if rng.random_bool(0.5) { 1.0 } else { -1.0 };
    let target =
        (anchor * ratio * 2f32.powf(cents / 1200.0)).clamp(KRELL_FREQ_MIN_HZ, KRELL_FREQ_MAX_HZ);
    if let Some(port) = world
        .registry
        .unit_mut(b)
        .and_then(|u| u.port_mut("frequency"))
    {
        port.glide(target);
    }
}

/// Decay one cell's gain; once it hits the floor, mostly bring it back with
/// fresh gain, occasionally let it die.
fn gain_decay(now: f64, world: &mut KrellWorld<'_>, rng: &mut SmallRng) {
    let Some(index) = pick_active(world.registry, rng) else {
        return;
    };
    let decayed = {
        let Some(port) = world
            .registry
            .unit_mut(index)
            .and_then(|u| u.port_mut("gain"))
        else {
            return;
        };
        let target = port.target() * 0.6;
        port.glide(target);
        target
    };
    if decayed < DECAY_FLOOR {
        if rng.random_bool(DECAY_RESTORE_PROB) {
            let fresh: f32 = rng.random_range(0.2..0.8);
            if let Some(port) = world
                .registry
                .unit_mut(index)
                .and_then(|u| u.port_mut("gain"))
            {
                port.glide(fresh);
            }
            debug!("krell: cell {index} restored at gain {fresh:.2}");
        } else {
            world.registry.deactivate(index, now);
        }
    }
}

/// Jump one oscillator to a harmonically related frequency, folded back
/// into the actor band by octaves.
fn harmonic_jump(world: &mut KrellWorld<'_>, rng: &mut SmallRng) {
    let oscillators = oscillator_cells(world.registry);
    if oscillators.is_empty() {
        return;
    }
    let index = oscillators[rng.random_range(0..oscillators.len())];
    let ratio = JUMP_RATIOS[rng.random_range(0..JUMP_RATIOS.len())];
    if let Some(port) = world
        .registry
        .unit_mut(index)
        .and_then(|u| u.port_mut("frequency"))
    {
        let mut target = port.target() * ratio;
        while target > KRELL_FREQ_MAX_HZ {
            target /= 2.0;
        }
        while target < KRELL_FREQ_MIN_HZ {
            target *= 2.0;
        }
        port.glide(target);
    }
}

fn nudge_tempo(world: &mut KrellWorld<'_>, rng: &mut SmallRng) {
    let delta: f32 = rng.random_range(-4.0..4.0);
    let bpm = world.timebase.tempo_bpm() + delta;
    world.timebase.set_tempo_bpm(bpm);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::scale::{Scale, ScalePreset};
    use crate::patch::catalog::BuiltinCatalog;
    use crate::phrase::generator::Influences;
    use rand::SeedableRng;

    struct Fixture {
        registry: CellRegistry,
        timebase: Timebase,
        scheduler: PhraseScheduler,
        scale: Scale,
    }

    impl Fixture {
        fn new(seed: u64, cells: &[usize]) -> (Self, SmallRng) {
            let mut rng = SmallRng::seed_from_u64(seed);
            let mut registry = CellRegistry::new(Box::new(BuiltinCatalog));
            for &c in cells {
                registry.activate(c, &mut rng);
            }
            (
                Self {
                    registry,
                    timebase: Timebase::new(96.0),
                    scheduler: PhraseScheduler::new(Influences::default()),
                    scale: Scale::from_preset(ScalePreset::JustDiatonic),
                },
                rng,
            )
        }

        fn world(&mut self) -> KrellWorld<'_> {
            KrellWorld {
                registry: &mut self.registry,
                timebase: &mut self.timebase,
                scheduler: &mut self.scheduler,
                scale: &self.scale,
                root_hz: 110.0,
            }
        }
    }

    #[test]
    fn firing_always_reschedules() {
        let (mut fx, mut rng) = Fixture::new(1, &[5, 12, 30]);
        let mut actor = KrellActor::new(1.0, 2.0);
        actor.schedule_from(0.0, &mut rng);
        let first = actor.next_fire_at().unwrap();
        assert!(first >= 0.6 && first <= 3.4);
        actor.fire(first, &mut fx.world(), &mut rng);
        let second = actor.next_fire_at().unwrap();
        assert!(second > first);
        assert!(second - first >= 0.6 && second - first <= 3.4);
    }

    #[test]
    fn zero_density_never_mutates_state() {
        let (mut fx, mut rng) = Fixture::new(2, &[5, 12, 30]);
        let mut actor = KrellActor::new(0.0, 1.0);
        let epoch = fx.registry.epoch();
        let tempo = fx.timebase.tempo_bpm();
        for i in 0..200 {
            actor.fire(i as f64, &mut fx.world(), &mut rng);
        }
        assert_eq!(fx.registry.epoch(), epoch);
        assert_eq!(fx.timebase.tempo_bpm(), tempo);
    }

    #[test]
    fn cancel_clears_the_timer() {
        let mut actor = KrellActor::new(0.5, 1.0);
        let mut rng = SmallRng::seed_from_u64(3);
        actor.schedule_from(10.0, &mut rng);
        assert!(actor.next_fire_at().is_some());
        actor.cancel();
        assert!(actor.next_fire_at().is_none());
        assert!(!actor.is_due(1e9));
    }

    #[test]
    fn frequencies_stay_in_the_actor_band() {
        let (mut fx, mut rng) = Fixture::new(4, &[1, 2, 3, 5, 9, 12, 30, 40]);
        let mut actor = KrellActor::new(1.0, 0.5);
        for i in 0..500 {
            actor.fire(i as f64 * 0.5, &mut fx.world(), &mut rng);
        }
        for idx in fx.registry.active_indices() {
            if let Some(port) = fx.registry.unit(idx).and_then(|u| u.port("frequency")) {
                assert!(port.target() >= KRELL_FREQ_MIN_HZ * 0.999);
                assert!(port.target() <= KRELL_FREQ_MAX_HZ * 1.001);
            }
        }
    }

    #[test]
    fn gesture_cells_stay_untouched() {
        let (mut fx, mut rng) = Fixture::new(5, &[10, 11]);
        let mut actor = KrellActor::new(1.0, 0.5);
        for i in 0..1_000 {
            actor.fire(i as f64 * 0.5, &mut fx.world(), &mut rng);
        }
        for index in crate::patch::registry::GESTURE_CELLS {
            assert!(!fx.registry.is_active(index));
        }
    }
}

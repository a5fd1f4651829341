use rand::rngs::SmallRng;
use tracing::{debug, warn};

use crate::core::sampler::WeightedTable;
use crate::patch::catalog::UnitCatalog;
use crate::patch::unit::{Unit, UnitCategory};

pub const CELL_COUNT: usize = 64;
pub const GRID_SIDE: usize = 8;

/// Corner slots of the 8x8 layout; they trigger gestures, never modules.
pub const GESTURE_CELLS: [usize; 4] = [0, 7, 56, 63];

/// Gain fade applied on deactivation.
pub const FADE_OUT_SEC: f32 = 0.35;

/// Resource release happens this long after deactivation, past the fade, so
/// teardown never lands inside an audible tail.
pub const RELEASE_DELAY_SEC: f64 = 0.5;

pub fn is_gesture_cell(index: usize) -> bool {
    GESTURE_CELLS.contains(&index)
}

#[derive(Debug, Default)]
enum SlotState {
    #[default]
    Free,
    Live(Unit),
    Fading {
        unit: Unit,
        release_at: f64,
    },
}

pub struct CellRegistry {
    slots: Vec<SlotState>,
    drone: bool,
    category_draw: WeightedTable<UnitCategory>,
    catalog: Box<dyn UnitCatalog + Send>,
    /// Bumped on every activation/deactivation; the engine rewires when it
    /// observes a change.
    epoch: u64,
}

impl CellRegistry {
    pub fn new(catalog: Box<dyn UnitCatalog + Send>) -> Self {
        let mut slots = Vec::with_capacity(CELL_COUNT);
        slots.resize_with(CELL_COUNT, SlotState::default);
        Self {
            slots,
            drone: true,
            // Oscillator-heavy draw: texture grows around sound sources.
            category_draw: WeightedTable::new(&[
                (UnitCategory::Source, 0.40),
                (UnitCategory::Processor, 0.22),
                (UnitCategory::Modulator, 0.18),
                (UnitCategory::Logic, 0.12),
                (UnitCategory::Utility, 0.08),
            ]),
            catalog,
            epoch: 0,
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn drone(&self) -> bool {
        self.drone
    }

    pub fn set_drone(&mut self, drone: bool) {
        self.drone = drone;
    }

    pub fn is_active(&self, index: usize) -> bool {
        matches!(self.slots.get(index), Some(SlotState::Live(_)))
    }

    pub fn category(&self, index: usize) -> Option<UnitCategory> {
        match self.slots.get(index) {
            Some(SlotState::Live(unit)) => Some(unit.category),
            _ => None,
        }
    }

    pub fn unit(&self, index: usize) -> Option<&Unit> {
        match self.slots.get(index) {
            Some(SlotState::Live(unit)) => Some(unit),
            _ => None,
        }
    }

    pub fn unit_mut(&mut self, index: usize) -> Option<&mut Unit> {
        match self.slots.get_mut(index) {
            Some(SlotState::Live(unit)) => Some(unit),
            _ => None,
        }
    }

    pub fn active_indices(&self) -> Vec<usize> {
        (0..CELL_COUNT).filter(|&i| self.is_active(i)).collect()
    }

    pub fn active_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| matches!(s, SlotState::Live(_)))
            .count()
    }

    pub fn live_cells_mut(&mut self) -> impl Iterator<Item = (usize, &mut Unit)> {
        self.slots.iter_mut().enumerate().filter_map(|(i, s)| {
            if let SlotState::Live(unit) = s {
                Some((i, unit))
            } else {
                None
            }
        })
    }

    /// Activate a slot. No-op when already live or reserved. Returns whether
    /// the slot is newly live.
    pub fn activate(&mut self, index: usize, rng: &mut SmallRng) -> bool {
        if index >= CELL_COUNT || is_gesture_cell(index) {
            return false;
        }
        if matches!(self.slots[index], SlotState::Live(_)) {
            return false;
        }

        let category = self
            .category_draw
            .pick(rng)
            .unwrap_or(UnitCategory::Source);
        let mut unit = match self.catalog.build(category, rng) {
            Ok(unit) => unit,
            Err(e) => {
                warn!("cell {index}: {category:?} construction failed ({e}), using default unit");
                self.catalog.default_unit()
            }
        };

        // Drone off: the unit joins the graph silent instead of being
        // omitted, so topology is independent of the flag.
        if !self.drone
            && let Some(gain) = unit.port_mut("gain")
        {
            gain.set(0.0);
        }

        // A slot still fading releases early when reoccupied.
        if let SlotState::Fading { unit: mut old, .. } =
            std::mem::replace(&mut self.slots[index], SlotState::Free)
            && let Err(e) = old.release()
        {
            warn!("cell {index}: early release failed: {e}");
        }

        debug!("cell {index}: + {} ({:?})", unit.kind, unit.category);
        self.slots[index] = SlotState::Live(unit);
        self.epoch += 1;
        true
    }

    /// Deactivate a slot: fade the gain, clear the registry entry at once,
    /// release resources on a later sweep. Returns whether a live cell was
    /// cleared.
    pub fn deactivate(&mut self, index: usize, now: f64) -> bool {
        if index >= CELL_COUNT {
            return false;
        }
        let state = std::mem::replace(&mut self.slots[index], SlotState::Free);
        match state {
            SlotState::Live(mut unit) => {
                if let Some(gain) = unit.port_mut("gain") {
                    gain.glide_with_tau(0.0, FADE_OUT_SEC);
                }
                debug!("cell {index}: - {}", unit.kind);
                self.slots[index] = SlotState::Fading {
                    unit,
                    release_at: now + RELEASE_DELAY_SEC,
                };
                self.epoch += 1;
                true
            }
            other => {
                self.slots[index] = other;
                false
            }
        }
    }

    /// Activate XOR deactivate; returns the resulting active state.
    pub fn toggle(&mut self, index: usize, now: f64, rng: &mut SmallRng) -> bool {
        if self.is_active(index) {
            self.deactivate(index, now);
            false
        } else {
            self.activate(index, rng)
        }
    }

    /// Free any slot whose deferred release has come due. Teardown is
    /// best-effort; failures are logged and swallowed.
    pub fn sweep(&mut self, now: f64) {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let SlotState::Fading { release_at, .. } = slot
                && *release_at <= now
            {
                if let SlotState::Fading { mut unit, .. } =
                    std::mem::replace(slot, SlotState::Free)
                    && let Err(e) = unit.release()
                {
                    warn!("cell {index}: teardown error ignored: {e}");
                }
            }
        }
    }

    /// True while any slot is still awaiting its deferred release.
    pub fn has_fading(&self) -> bool {
        self.slots
            .iter()
            .any(|s| matches!(s, SlotState::Fading { .. }))
    }

    /// Ramp all ports (live and fading) forward.
    pub fn advance(&mut self, dt_sec: f32) {
        for slot in &mut self.slots {
            match slot {
                SlotState::Live(unit) | SlotState::Fading { unit, .. } => unit.advance(dt_sec),
                SlotState::Free => {}
            }
        }
    }

    /// Summed live gain targets: the loudness proxy when the host does not
    /// report measured output level.
    pub fn gain_sum(&self) -> f32 {
        self.slots
            .iter()
            .filter_map(|s| match s {
                SlotState::Live(unit) => unit.port("gain").map(|p| p.target()),
                _ => None,
            })
            .sum()
    }
}

use std::fmt;

use rand::{Rng, RngCore};

use crate::core::scale::{FREQ_MAX_HZ, FREQ_MIN_HZ};
use crate::patch::unit::{ControlPort, SubUnit, Unit, UnitCategory};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    Unbuildable { kind: String },
    Exhausted,
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogError::Unbuildable { kind } => write!(f, "unit kind {kind} not constructible"),
            CatalogError::Exhausted => write!(f, "host unit resources exhausted"),
        }
    }
}

impl std::error::Error for CatalogError {}

/// Host-side constructor contract. The registry only ever asks for a
/// category and receives an opaque unit; on failure it falls back to
/// `default_unit`, which must always construct.
pub trait UnitCatalog {
    fn build(&self, category: UnitCategory, rng: &mut dyn RngCore) -> Result<Unit, CatalogError>;
    fn default_unit(&self) -> Unit;
}

struct PortSpec {
    name: &'static str,
    default: f32,
    min: f32,
    max: f32,
}

struct Recipe {
    kind: &'static str,
    category: UnitCategory,
    has_mod_input: bool,
    ports: &'static [PortSpec],
    extras: &'static [&'static str],
}

const fn port(name: &'static str, default: f32, min: f32, max: f32) -> PortSpec {
    PortSpec {
        name,
        default,
        min,
        max,
    }
}

/// Compact stand-in for the host's full recipe table. Each entry is a fixed
/// wiring of host primitives; the core only sees the port shapes.
const RECIPES: &[Recipe] = &[
    Recipe {
        kind: "drone_osc",
        category: UnitCategory::Source,
        has_mod_input: true,
        ports: &[
            port("frequency", 220.0, FREQ_MIN_HZ, FREQ_MAX_HZ),
            port("gain", 0.4, 0.0, 1.0),
            port("pan", 0.0, -1.0, 1.0),
        ],
        extras: &["sub_osc"],
    },
    Recipe {
        kind: "pulse_train",
        category: UnitCategory::Source,
        has_mod_input: true,
        ports: &[
            port("frequency", 110.0, FREQ_MIN_HZ, FREQ_MAX_HZ),
            port("gain", 0.35, 0.0, 1.0),
            port("depth", 0.5, 0.0, 1.0),
        ],
        extras: &[],
    },
    Recipe {
        kind: "grain_cloud",
        category: UnitCategory::Source,
        has_mod_input: true,
        ports: &[
            port("frequency", 440.0, FREQ_MIN_HZ, FREQ_MAX_HZ),
            port("gain", 0.3, 0.0, 1.0),
            port("depth", 0.4, 0.0, 1.0),
            port("pan", 0.0, -1.0, 1.0),
        ],
        extras: &["partial_bank", "grain_env"],
    },
    Recipe {
        kind: "step_sequencer",
        category: UnitCategory::Source,
        has_mod_input: false,
        ports: &[
            port("rate", 2.0, 0.05, 32.0),
            port("gain", 0.4, 0.0, 1.0),
            port("depth", 0.6, 0.0, 1.0),
        ],
        extras: &[],
    },
    Recipe {
        kind: "lowpass_gate",
        category: UnitCategory::Processor,
        has_mod_input: true,
        ports: &[
            port("depth", 0.5, 0.0, 1.0),
            port("gain", 0.8, 0.0, 1.0),
            port("time", 0.2, 0.01, 2.0),
        ],
        extras: &[],
    },
    Recipe {
        kind: "tape_delay",
        category: UnitCategory::Processor,
        has_mod_input: false,
        ports: &[
            port("time", 0.45, 0.02, 2.0),
            port("feedback", 0.35, 0.0, 0.95),
            port("gain", 0.7, 0.0, 1.0),
        ],
        extras: &["wow_lfo"],
    },
    Recipe {
        kind: "chorus_swirl",
        category: UnitCategory::Processor,
        has_mod_input: false,
        ports: &[
            port("rate", 0.3, 0.01, 8.0),
            port("depth", 0.4, 0.0, 1.0),
            port("gain", 0.8, 0.0, 1.0),
        ],
        extras: &[],
    },
    Recipe {
        kind: "slow_lfo",
        category: UnitCategory::Modulator,
        has_mod_input: false,
        ports: &[
            port("rate", 0.1, 0.005, 20.0),
            port("depth", 0.5, 0.0, 1.0),
        ],
        extras: &[],
    },
    Recipe {
        kind: "chaos_clock",
        category: UnitCategory::Modulator,
        has_mod_input: false,
        ports: &[
            port("rate", 1.5, 0.05, 40.0),
            port("depth", 0.7, 0.0, 1.0),
        ],
        extras: &[],
    },
    Recipe {
        kind: "sample_hold",
        category: UnitCategory::Modulator,
        has_mod_input: false,
        ports: &[
            port("rate", 4.0, 0.05, 40.0),
            port("depth", 0.6, 0.0, 1.0),
        ],
        extras: &[],
    },
    Recipe {
        kind: "bus_mixer",
        category: UnitCategory::Logic,
        has_mod_input: false,
        ports: &[
            port("gain", 0.8, 0.0, 1.0),
            port("pan", 0.0, -1.0, 1.0),
        ],
        extras: &[],
    },
    Recipe {
        kind: "crossfader",
        category: UnitCategory::Logic,
        has_mod_input: false,
        ports: &[
            port("gain", 0.8, 0.0, 1.0),
            port("depth", 0.5, 0.0, 1.0),
        ],
        extras: &[],
    },
    Recipe {
        kind: "vca",
        category: UnitCategory::Utility,
        has_mod_input: false,
        ports: &[port("gain", 0.7, 0.0, 1.0)],
        extras: &[],
    },
    Recipe {
        kind: "tilt_eq",
        category: UnitCategory::Utility,
        has_mod_input: false,
        ports: &[
            port("depth", 0.5, 0.0, 1.0),
            port("gain", 0.8, 0.0, 1.0),
        ],
        extras: &[],
    },
];

fn build_from_recipe(recipe: &Recipe) -> Unit {
    let ports = recipe
        .ports
        .iter()
        .map(|p| (p.name, ControlPort::new(p.default, p.min, p.max)))
        .collect();
    let extras = recipe
        .extras
        .iter()
        .map(|kind| SubUnit { kind })
        .collect();
    Unit::new(
        recipe.kind,
        recipe.category,
        recipe.has_mod_input,
        ports,
        extras,
    )
}

/// Built-in catalog over the compact recipe table above.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinCatalog;

impl UnitCatalog for BuiltinCatalog {
    fn build(&self, category: UnitCategory, rng: &mut dyn RngCore) -> Result<Unit, CatalogError> {
        let candidates: Vec<&Recipe> = RECIPES.iter().filter(|r| r.category == category).collect();
        if candidates.is_empty() {
            return Err(CatalogError::Unbuildable {
                kind: format!("{category:?}"),
            });
        }
        let idx = rng.random_range(0..candidates.len());
        Ok(build_from_recipe(candidates[idx]))
    }

    fn default_unit(&self) -> Unit {
        build_from_recipe(&RECIPES[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    #[test]
    fn every_category_is_buildable() {
        let catalog = BuiltinCatalog;
        let mut rng = SmallRng::seed_from_u64(1);
        for category in [
            UnitCategory::Source,
            UnitCategory::Processor,
            UnitCategory::Modulator,
            UnitCategory::Logic,
            UnitCategory::Utility,
        ] {
            let unit = catalog.build(category, &mut rng).expect("buildable");
            assert_eq!(unit.category, category);
            assert!(unit.port_count() > 0);
        }
    }

    #[test]
    fn default_unit_is_a_sound_source() {
        let unit = BuiltinCatalog.default_unit();
        assert_eq!(unit.category, UnitCategory::Source);
        assert!(unit.is_oscillator_like());
        assert!(unit.has_port("gain"));
    }

    #[test]
    fn recipes_only_expose_known_mod_ports_or_frequency() {
        use crate::patch::unit::MOD_SAFE_PORTS;
        for recipe in RECIPES {
            for p in recipe.ports {
                assert!(
                    p.name == "frequency" || MOD_SAFE_PORTS.contains(&p.name),
                    "unexpected port {} on {}",
                    p.name,
                    recipe.kind
                );
            }
        }
    }
}

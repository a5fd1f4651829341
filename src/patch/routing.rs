use rand::Rng;
use rand::seq::SliceRandom;
use serde::Serialize;
use tracing::debug;

use crate::patch::registry::CellRegistry;
use crate::patch::unit::{MOD_ATTENUATION, MOD_SAFE_PORTS, PortName, UnitCategory};

/// Probability that a modulator lands on a target's dedicated modulation
/// input instead of a control port.
pub const MOD_INPUT_PROB: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RouteTarget {
    Bus,
    Audio { cell: usize },
    ModInput { cell: usize },
    Param { cell: usize, port: PortName },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Edge {
    pub source: usize,
    pub target: RouteTarget,
    pub gain: f32,
}

impl Edge {
    fn full(source: usize, target: RouteTarget) -> Self {
        Self {
            source,
            target,
            gain: 1.0,
        }
    }

    pub fn touches(&self, index: usize) -> bool {
        if self.source == index {
            return true;
        }
        match self.target {
            RouteTarget::Bus => false,
            RouteTarget::Audio { cell }
            | RouteTarget::ModInput { cell }
            | RouteTarget::Param { cell, .. } => cell == index,
        }
    }
}

/// Derive the signal graph for the current active set, from scratch.
///
/// Random draws make successive rewires of the same set differ; what must
/// hold is that every active cell ends up on at least one edge and every
/// chain terminates at the output bus.
pub fn rewire<R: Rng + ?Sized>(registry: &CellRegistry, rng: &mut R) -> Vec<Edge> {
    let active = registry.active_indices();
    if active.is_empty() {
        return Vec::new();
    }

    let mut sources = Vec::new();
    let mut processors = Vec::new();
    let mut modulators = Vec::new();
    let mut logic = Vec::new();
    for &index in &active {
        match registry.category(index) {
            Some(UnitCategory::Source) => sources.push(index),
            Some(UnitCategory::Processor) | Some(UnitCategory::Utility) => {
                processors.push(index)
            }
            Some(UnitCategory::Modulator) => modulators.push(index),
            Some(UnitCategory::Logic) => logic.push(index),
            None => {}
        }
    }

    // Without a single generator nothing would sound: promote about half of
    // the active set to source duty, whatever their categories.
    if sources.is_empty() {
        let mut shuffled = active.clone();
        shuffled.shuffle(rng);
        let promoted = shuffled.len().div_ceil(2);
        for &index in &shuffled[..promoted] {
            processors.retain(|&i| i != index);
            modulators.retain(|&i| i != index);
            logic.retain(|&i| i != index);
            sources.push(index);
        }
        debug!("no sources active, promoted {promoted} cells");
    }

    let mut edges = Vec::new();

    for &source in &sources {
        let mut pool = processors.clone();
        pool.retain(|&i| i != source);
        pool.shuffle(rng);
        let chain_len = rng.random_range(0..=2usize).min(pool.len());
        let mut upstream = source;
        for &processor in &pool[..chain_len] {
            edges.push(Edge::full(upstream, RouteTarget::Audio { cell: processor }));
            upstream = processor;
        }
        edges.push(Edge::full(upstream, RouteTarget::Bus));
    }

    // Processors left out of every chain still need a path to the bus.
    for &processor in &processors {
        if !edges.iter().any(|e| e.touches(processor)) {
            edges.push(Edge::full(processor, RouteTarget::Bus));
        }
    }

    let mut mod_targets: Vec<usize> = sources.iter().chain(processors.iter()).copied().collect();
    mod_targets.sort_unstable();
    for &modulator in &modulators {
        let Some(edge) = route_modulator(registry, modulator, &mod_targets, rng) else {
            // No routable port anywhere: park the modulator on the bus so it
            // stays wired.
            edges.push(Edge::full(modulator, RouteTarget::Bus));
            continue;
        };
        edges.push(edge);
    }

    for &cell in &logic {
        edges.push(Edge::full(cell, RouteTarget::Bus));
    }

    edges
}

fn route_modulator<R: Rng + ?Sized>(
    registry: &CellRegistry,
    modulator: usize,
    targets: &[usize],
    rng: &mut R,
) -> Option<Edge> {
    if targets.is_empty() {
        return None;
    }
    let target = targets[rng.random_range(0..targets.len())];
    let unit = registry.unit(target)?;

    if unit.has_mod_input && rng.random_bool(MOD_INPUT_PROB) {
        return Some(Edge::full(modulator, RouteTarget::ModInput { cell: target }));
    }

    // Only ports on the allow-list may be modulated; anything else on the
    // unit is skipped as if the port did not exist.
    let mut allowed: Vec<PortName> = unit
        .port_names()
        .filter(|name| MOD_SAFE_PORTS.contains(name))
        .collect();
    if allowed.is_empty() {
        if unit.has_mod_input {
            return Some(Edge::full(modulator, RouteTarget::ModInput { cell: target }));
        }
        debug!("modulator {modulator}: no routable port on cell {target}");
        return None;
    }
    allowed.shuffle(rng);
    Some(Edge {
        source: modulator,
        target: RouteTarget::Param {
            cell: target,
            port: allowed[0],
        },
        gain: MOD_ATTENUATION,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::catalog::BuiltinCatalog;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn populated(indices: &[usize], seed: u64) -> (CellRegistry, SmallRng) {
        let mut reg = CellRegistry::new(Box::new(BuiltinCatalog));
        let mut rng = SmallRng::seed_from_u64(seed);
        for &i in indices {
            reg.activate(i, &mut rng);
        }
        (reg, rng)
    }

    #[test]
    fn every_active_cell_is_wired() {
        for seed in 0..32 {
            let (reg, mut rng) = populated(&[1, 2, 3, 9, 17, 33, 42, 55], seed);
            let edges = rewire(&reg, &mut rng);
            for index in reg.active_indices() {
                assert!(
                    edges.iter().any(|e| e.touches(index)),
                    "seed {seed}: cell {index} orphaned"
                );
            }
        }
    }

    #[test]
    fn empty_active_set_yields_no_edges() {
        let (reg, mut rng) = populated(&[], 0);
        assert!(rewire(&reg, &mut rng).is_empty());
    }

    #[test]
    fn single_cell_reaches_the_bus() {
        for seed in 0..16 {
            let (reg, mut rng) = populated(&[30], seed);
            let edges = rewire(&reg, &mut rng);
            assert!(
                edges
                    .iter()
                    .any(|e| e.source == 30 || e.target == RouteTarget::Bus),
                "seed {seed}"
            );
            assert!(edges.iter().any(|e| e.touches(30)));
        }
    }

    #[test]
    fn param_routes_stay_on_the_allow_list_and_attenuated() {
        for seed in 0..64 {
            let (reg, mut rng) = populated(&[1, 2, 3, 4, 5, 6, 8, 9, 10], seed);
            let edges = rewire(&reg, &mut rng);
            for edge in &edges {
                if let RouteTarget::Param { port, .. } = edge.target {
                    assert!(MOD_SAFE_PORTS.contains(&port), "illegal port {port}");
                    assert_ne!(port, "frequency");
                    assert_eq!(edge.gain, MOD_ATTENUATION);
                }
            }
        }
    }

    #[test]
    fn sources_always_terminate_at_bus() {
        for seed in 0..16 {
            let (reg, mut rng) = populated(&[11, 12, 13, 14], seed);
            let edges = rewire(&reg, &mut rng);
            assert!(edges.iter().any(|e| e.target == RouteTarget::Bus));
        }
    }
}

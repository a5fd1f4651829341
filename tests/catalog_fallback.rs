use rand::RngCore;
use rand::SeedableRng;
use rand::rngs::SmallRng;

use cellarium::patch::catalog::{BuiltinCatalog, CatalogError, UnitCatalog};
use cellarium::patch::registry::CellRegistry;
use cellarium::patch::unit::{Unit, UnitCategory};

/// A host that refuses every build, as if its resources were exhausted.
struct ExhaustedHost;

impl UnitCatalog for ExhaustedHost {
    fn build(&self, _category: UnitCategory, _rng: &mut dyn RngCore) -> Result<Unit, CatalogError> {
        Err(CatalogError::Exhausted)
    }

    fn default_unit(&self) -> Unit {
        BuiltinCatalog.default_unit()
    }
}

#[test]
fn construction_failure_falls_back_to_the_default_unit() {
    let mut reg = CellRegistry::new(Box::new(ExhaustedHost));
    let mut rng = SmallRng::seed_from_u64(1);
    assert!(reg.activate(10, &mut rng));

    // The slot is fully live with the guaranteed sound source, never
    // half-initialized.
    let unit = reg.unit(10).expect("slot must be live");
    assert_eq!(unit.category, UnitCategory::Source);
    assert!(unit.is_oscillator_like());
}

#[test]
fn fallback_cells_participate_in_routing() {
    use cellarium::patch::routing::rewire;
    let mut reg = CellRegistry::new(Box::new(ExhaustedHost));
    let mut rng = SmallRng::seed_from_u64(2);
    for i in [3, 11, 29] {
        reg.activate(i, &mut rng);
    }
    let edges = rewire(&reg, &mut rng);
    for index in reg.active_indices() {
        assert!(edges.iter().any(|e| e.touches(index)));
    }
}

use rand::SeedableRng;
use rand::rngs::SmallRng;

use cellarium::patch::catalog::BuiltinCatalog;
use cellarium::patch::registry::{CellRegistry, GESTURE_CELLS, RELEASE_DELAY_SEC};

fn registry() -> (CellRegistry, SmallRng) {
    (
        CellRegistry::new(Box::new(BuiltinCatalog)),
        SmallRng::seed_from_u64(42),
    )
}

#[test]
fn double_toggle_returns_to_the_original_state() {
    let (mut reg, mut rng) = registry();
    let first = reg.toggle(23, 0.0, &mut rng);
    let second = reg.toggle(23, 0.1, &mut rng);
    assert!(first);
    assert!(!second);
    assert!(!reg.is_active(23));

    // And the inverse order from an active slot.
    reg.activate(31, &mut rng);
    assert!(!reg.toggle(31, 0.2, &mut rng));
    assert!(reg.toggle(31, 0.3, &mut rng));
    assert!(reg.is_active(31));
}

#[test]
fn activate_is_idempotent_on_live_slots() {
    let (mut reg, mut rng) = registry();
    assert!(reg.activate(8, &mut rng));
    let kind = reg.unit(8).map(|u| u.kind);
    assert!(!reg.activate(8, &mut rng));
    assert_eq!(reg.unit(8).map(|u| u.kind), kind);
}

#[test]
fn teardown_is_deferred_past_the_fade() {
    let (mut reg, mut rng) = registry();
    reg.activate(40, &mut rng);
    let t0 = 10.0;
    reg.deactivate(40, t0);

    // Logically empty at once.
    assert!(!reg.is_active(40));
    assert_eq!(reg.category(40), None);

    // Resources pending until the release delay elapses.
    assert!(reg.has_fading());
    reg.sweep(t0 + RELEASE_DELAY_SEC * 0.9);
    assert!(reg.has_fading());
    reg.sweep(t0 + RELEASE_DELAY_SEC + 0.01);
    assert!(!reg.has_fading());
}

#[test]
fn reserved_corners_reject_modules() {
    let (mut reg, mut rng) = registry();
    for index in GESTURE_CELLS {
        assert!(!reg.toggle(index, 0.0, &mut rng));
        assert_eq!(reg.category(index), None);
    }
    assert_eq!(reg.active_count(), 0);
}

#[test]
fn fading_gain_ramps_toward_silence() {
    let (mut reg, mut rng) = registry();
    reg.activate(15, &mut rng);
    // Make sure the unit is audible before the fade.
    if let Some(gain) = reg.unit_mut(15).and_then(|u| u.port_mut("gain")) {
        gain.set(0.6);
    }
    reg.deactivate(15, 0.0);
    for _ in 0..100 {
        reg.advance(0.05);
    }
    // The fading unit is no longer reachable through the live view, but the
    // slot must still be pending release, silent.
    assert!(reg.has_fading());
    assert_eq!(reg.unit(15).map(|u| u.kind), None);
}

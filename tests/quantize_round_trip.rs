use cellarium::core::scale::{Scale, ScalePreset, frequency_for_degree, quantize};

#[test]
fn already_quantized_frequencies_are_fixed_points() {
    for preset in ScalePreset::ALL {
        let scale = Scale::from_preset(preset);
        for root in [55.0f32, 110.0, 261.63] {
            for degree in -21..28 {
                let f = frequency_for_degree(degree, &scale, root);
                let q = quantize(f, &scale, root);
                assert!(
                    (q / f - 1.0).abs() < 1e-4,
                    "{} root {root}: degree {degree}: {f} != {q}",
                    scale.name
                );
            }
        }
    }
}

#[test]
fn nearest_neighbor_wins_across_the_octave_boundary() {
    let scale = Scale::from_preset(ScalePreset::JustDiatonic);
    let root = 110.0;

    // A hair above the octave's last degree: stays on it.
    let last = root * 15.0 / 8.0;
    assert!((quantize(last * 1.004, &scale, root) / last - 1.0).abs() < 1e-4);

    // A hair below the next octave: snaps up to 2/1, not back down.
    let nearly_octave = root * 1.99;
    assert!((quantize(nearly_octave, &scale, root) / (root * 2.0) - 1.0).abs() < 1e-4);

    // Just under the root: snaps to the previous octave's last degree.
    let below_root = root * 0.95;
    let expected = root * 15.0 / 8.0 / 2.0;
    assert!((quantize(below_root, &scale, root) / expected - 1.0).abs() < 1e-4);
}

#[test]
fn quantize_is_idempotent() {
    let scale = Scale::from_preset(ScalePreset::Pythagorean);
    for i in 0..200 {
        let f = 30.0 + i as f32 * 17.3;
        let once = quantize(f, &scale, 110.0);
        let twice = quantize(once, &scale, 110.0);
        assert!((twice / once - 1.0).abs() < 1e-5, "{f}: {once} vs {twice}");
    }
}

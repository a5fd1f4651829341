use serde::{Deserialize, Serialize};

/// Frequencies handed to control ports stay inside this window.
pub const FREQ_MIN_HZ: f32 = 20.0;
pub const FREQ_MAX_HZ: f32 = 8_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalePreset {
    JustDiatonic,
    JustMinor,
    Pentatonic,
    Harmonics,
    Pythagorean,
    StackedFifths,
    WholeTone,
    EqualTempered12,
}

impl ScalePreset {
    pub const ALL: [ScalePreset; 8] = [
        ScalePreset::JustDiatonic,
        ScalePreset::JustMinor,
        ScalePreset::Pentatonic,
        ScalePreset::Harmonics,
        ScalePreset::Pythagorean,
        ScalePreset::StackedFifths,
        ScalePreset::WholeTone,
        ScalePreset::EqualTempered12,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ScalePreset::JustDiatonic => "just_diatonic",
            ScalePreset::JustMinor => "just_minor",
            ScalePreset::Pentatonic => "pentatonic",
            ScalePreset::Harmonics => "harmonics",
            ScalePreset::Pythagorean => "pythagorean",
            ScalePreset::StackedFifths => "stacked_fifths",
            ScalePreset::WholeTone => "whole_tone",
            ScalePreset::EqualTempered12 => "equal_tempered_12",
        }
    }

    pub fn ratios(self) -> Vec<f32> {
        match self {
            ScalePreset::JustDiatonic => vec![
                1.0,
                9.0 / 8.0,
                5.0 / 4.0,
                4.0 / 3.0,
                3.0 / 2.0,
                5.0 / 3.0,
                15.0 / 8.0,
            ],
            ScalePreset::JustMinor => vec![
                1.0,
                9.0 / 8.0,
                6.0 / 5.0,
                4.0 / 3.0,
                3.0 / 2.0,
                8.0 / 5.0,
                9.0 / 5.0,
            ],
            ScalePreset::Pentatonic => vec![1.0, 9.0 / 8.0, 5.0 / 4.0, 3.0 / 2.0, 5.0 / 3.0],
            ScalePreset::Harmonics => vec![
                1.0,
                9.0 / 8.0,
                5.0 / 4.0,
                11.0 / 8.0,
                3.0 / 2.0,
                13.0 / 8.0,
                7.0 / 4.0,
                15.0 / 8.0,
            ],
            ScalePreset::Pythagorean => vec![
                1.0,
                9.0 / 8.0,
                81.0 / 64.0,
                4.0 / 3.0,
                3.0 / 2.0,
                27.0 / 16.0,
                243.0 / 128.0,
            ],
            // Stacked untempered fifths; later entries exceed the octave and
            // rely on fold-back during nearest-degree search.
            ScalePreset::StackedFifths => vec![1.0, 3.0 / 2.0, 9.0 / 4.0],
            ScalePreset::WholeTone => equal_division(6),
            ScalePreset::EqualTempered12 => equal_division(12),
        }
    }
}

fn equal_division(steps: u32) -> Vec<f32> {
    (0..steps).map(|k| 2f32.powf(k as f32 / steps as f32)).collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scale {
    pub name: &'static str,
    pub ratios: Vec<f32>,
}

impl Scale {
    pub fn from_preset(preset: ScalePreset) -> Self {
        Self {
            name: preset.name(),
            ratios: preset.ratios(),
        }
    }

    pub fn len(&self) -> usize {
        self.ratios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ratios.is_empty()
    }
}

/// Fold a ratio into [1, 2).
fn fold_octave(ratio: f32) -> f32 {
    if ratio <= 0.0 || !ratio.is_finite() {
        return 1.0;
    }
    ratio * 2f32.powi(-ratio.log2().floor() as i32)
}

/// Frequency of an arbitrary integer scale degree. Degrees outside one
/// octave wrap with Euclidean index / octave split.
pub fn frequency_for_degree(degree: i32, scale: &Scale, root_hz: f32) -> f32 {
    if scale.is_empty() {
        return root_hz;
    }
    let len = scale.len() as i32;
    let octave = degree.div_euclid(len);
    let idx = degree.rem_euclid(len) as usize;
    root_hz * scale.ratios[idx] * 2f32.powi(octave)
}

/// Snap an arbitrary frequency to the nearest scale degree.
///
/// The candidate set is the octave-folded scale plus the next octave's first
/// degree (ratio 2.0) and the previous octave's last degree; without those
/// two, a frequency near an octave boundary can snap to a farther degree
/// inside its own octave. Distance is measured in log2 space, ties keep the
/// first candidate in scale order.
pub fn quantize(freq_hz: f32, scale: &Scale, root_hz: f32) -> f32 {
    if !freq_hz.is_finite() || freq_hz <= 0.0 {
        return FREQ_MIN_HZ;
    }
    if scale.is_empty() || root_hz <= 0.0 {
        return freq_hz.clamp(FREQ_MIN_HZ, FREQ_MAX_HZ);
    }

    let ratio = freq_hz / root_hz;
    let octave = ratio.log2().floor();
    let base = 2f32.powf(octave);
    let within_log2 = (ratio / base).log2();

    let mut best_ratio = 1.0f32;
    let mut best_dist = f32::INFINITY;
    let mut consider = |cand: f32| {
        let d = (within_log2 - cand.log2()).abs();
        if d < best_dist {
            best_dist = d;
            best_ratio = cand;
        }
    };

    for &r in &scale.ratios {
        consider(fold_octave(r));
    }
    consider(2.0);
    let last = fold_octave(*scale.ratios.last().expect("non-empty scale"));
    consider(last / 2.0);

    root_hz * best_ratio * base
}

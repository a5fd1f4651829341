use rand::Rng;
use rand::rngs::SmallRng;
use tracing::debug;

use crate::core::sampler::WeightedTable;
use crate::phrase::note::{ChordEvent, NoteEvent, Phrase};
use crate::phrase::tintinnabuli::{self, TintinMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Archetype {
    Melodic,
    Chordal,
    Minimalist,
    Ambient,
    Song,
}

/// Continuous levers the gestures and actor push on; both in 0..1.
#[derive(Debug, Clone, Copy)]
pub struct Influences {
    pub harmony: f32,
    pub minimalism: f32,
}

impl Default for Influences {
    fn default() -> Self {
        Self {
            harmony: 0.5,
            minimalism: 0.3,
        }
    }
}

/// Probability of entering song mode at regeneration time.
pub const SONG_MODE_PROB: f64 = 0.15;

/// Half-beat onset masks, one bar (4 beats) each, LSB first.
const RHYTHM_MASKS: [u8; 6] = [
    0b0101_0101,
    0b1001_1001,
    0b0100_1011,
    0b0010_0101,
    0b1101_0110,
    0b0001_0001,
];

/// Diatonic root progressions, one chord per entry.
const PROGRESSIONS: [[i32; 4]; 5] = [
    [0, 3, 4, 0],
    [0, 5, 3, 4],
    [0, 4, 5, 3],
    [0, 5, 1, 4],
    [0, 2, 3, 4],
];

/// Singable contour templates in scale degrees around the register center.
const CONTOURS: [[i32; 8]; 4] = [
    [0, 1, 2, 4, 4, 2, 1, 0],
    [4, 3, 2, 1, 2, 1, 0, 0],
    [0, 2, 1, 3, 2, 4, 3, 5],
    [0, -1, 0, 2, 1, 0, -1, 0],
];

pub struct PhraseGenerator {
    pub influences: Influences,
    /// Gesture-applied transposition, in scale degrees.
    pub register_shift: i32,
    last_archetype: Option<Archetype>,
}

impl PhraseGenerator {
    pub fn new(influences: Influences) -> Self {
        Self {
            influences,
            register_shift: 0,
            last_archetype: None,
        }
    }

    pub fn last_archetype(&self) -> Option<Archetype> {
        self.last_archetype
    }

    pub fn generate(
        &mut self,
        scale_len: usize,
        tintinnabuli: Option<TintinMode>,
        rng: &mut SmallRng,
    ) -> Phrase {
        let scale_len = scale_len.max(1);
        let archetype = self.choose_archetype(rng);
        self.last_archetype = Some(archetype);
        let mut phrase = match archetype {
            Archetype::Melodic => self.melodic(scale_len, rng),
            Archetype::Chordal => self.chordal(scale_len, rng),
            Archetype::Minimalist => self.minimalist(scale_len, rng),
            Archetype::Ambient => self.ambient(scale_len, rng),
            Archetype::Song => self.song(scale_len, rng),
        };
        if let Some(mode) = tintinnabuli {
            phrase.counterpoint = tintinnabuli::derive(&phrase.melody, mode, scale_len);
        }
        debug!(
            "phrase: {archetype:?}, {} beats, {} notes, {} chords",
            phrase.length_beats,
            phrase.melody.len(),
            phrase.chords.len()
        );
        phrase
    }

    fn choose_archetype(&self, rng: &mut SmallRng) -> Archetype {
        if rng.random_bool(SONG_MODE_PROB) {
            return Archetype::Song;
        }
        let h = self.influences.harmony.clamp(0.0, 1.0);
        let m = self.influences.minimalism.clamp(0.0, 1.0);
        let table = WeightedTable::new(&[
            (Archetype::Melodic, 0.30 * (1.2 - 0.6 * m)),
            (Archetype::Chordal, 0.20 * (0.5 + h)),
            (Archetype::Minimalist, 0.15 * (0.4 + 1.6 * m)),
            (Archetype::Ambient, 0.20 * (0.6 + 0.8 * h)),
        ]);
        table.pick(rng).unwrap_or(Archetype::Melodic)
    }

    fn center_degree(&self, scale_len: usize, rng: &mut SmallRng) -> i32 {
        let len = scale_len as i32;
        rng.random_range(0..len) + len + self.register_shift
    }

    /// Short motif cycled over a rhythmic mask.
    fn melodic(&self, scale_len: usize, rng: &mut SmallRng) -> Phrase {
        let length_beats = if rng.random_bool(0.5) { 8.0 } else { 16.0 };
        let mask = RHYTHM_MASKS[rng.random_range(0..RHYTHM_MASKS.len())];
        let motif_len = rng.random_range(3..=6);
        let mut degree = self.center_degree(scale_len, rng);
        let mut motif = Vec::with_capacity(motif_len);
        for _ in 0..motif_len {
            motif.push(degree);
            degree += rng.random_range(-2..=2);
        }

        let bars = (length_beats / 4.0) as usize;
        let mut melody = Vec::new();
        let mut k = 0usize;
        for bar in 0..bars {
            for slot in 0..8u8 {
                if mask & (1 << slot) == 0 {
                    continue;
                }
                melody.push(NoteEvent {
                    beat: bar as f64 * 4.0 + slot as f64 * 0.5,
                    degree: motif[k % motif.len()],
                    duration_beats: 0.5,
                    velocity: 0.55 + rng.random_range(0.0..0.3),
                });
                k += 1;
            }
        }
        Phrase {
            length_beats,
            melody,
            chords: Vec::new(),
            counterpoint: Vec::new(),
        }
    }

    /// Arpeggiated progression with sustained block chords underneath.
    fn chordal(&self, scale_len: usize, rng: &mut SmallRng) -> Phrase {
        let progression = PROGRESSIONS[rng.random_range(0..PROGRESSIONS.len())];
        let base = scale_len as i32 + self.register_shift;
        let chord_beats = 2.0;
        let mut chords = Vec::new();
        let mut melody = Vec::new();
        for (i, &root) in progression.iter().enumerate() {
            let beat = i as f64 * chord_beats;
            let tones = [base + root, base + root + 2, base + root + 4];
            chords.push(ChordEvent {
                beat,
                degrees: tones.to_vec(),
                duration_beats: chord_beats,
                velocity: 0.45,
            });
            for s in 0..4 {
                melody.push(NoteEvent {
                    beat: beat + s as f64 * 0.5,
                    degree: tones[s % tones.len()],
                    duration_beats: 0.5,
                    velocity: 0.5 + rng.random_range(0.0..0.2),
                });
            }
        }
        Phrase {
            length_beats: progression.len() as f64 * chord_beats,
            melody,
            chords,
            counterpoint: Vec::new(),
        }
    }

    /// Strict repeating cell, fixed dynamics.
    fn minimalist(&self, scale_len: usize, rng: &mut SmallRng) -> Phrase {
        let cell_len = rng.random_range(4..=8);
        let center = self.center_degree(scale_len, rng);
        let palette = [center, center + 2, center + rng.random_range(3..=4)];
        let cell: Vec<i32> = (0..cell_len)
            .map(|_| palette[rng.random_range(0..palette.len())])
            .collect();

        let cell_beats = cell_len as f64 * 0.5;
        let repeats = ((12.0 / cell_beats).ceil() as usize).max(1);
        let mut melody = Vec::new();
        for r in 0..repeats {
            for (i, &deg) in cell.iter().enumerate() {
                melody.push(NoteEvent {
                    beat: r as f64 * cell_beats + i as f64 * 0.5,
                    degree: deg,
                    duration_beats: 0.5,
                    velocity: 0.6,
                });
            }
        }
        Phrase {
            length_beats: repeats as f64 * cell_beats,
            melody,
            chords: Vec::new(),
            counterpoint: Vec::new(),
        }
    }

    /// Slow contour over a single sustained chord.
    fn ambient(&self, scale_len: usize, rng: &mut SmallRng) -> Phrase {
        let length_beats = 16.0;
        let base = scale_len as i32 + self.register_shift;
        let chords = vec![ChordEvent {
            beat: 0.0,
            degrees: vec![base, base + 2, base + 4],
            duration_beats: length_beats,
            velocity: 0.35,
        }];

        let note_count = rng.random_range(4..=6);
        let spacing = length_beats / note_count as f64;
        let mut degree = self.center_degree(scale_len, rng) + scale_len as i32;
        let mut melody = Vec::new();
        for i in 0..note_count {
            degree += rng.random_range(-1..=1);
            melody.push(NoteEvent {
                beat: (i as f64 * spacing * 2.0).round() / 2.0,
                degree,
                duration_beats: rng.random_range(2.0..3.0),
                velocity: 0.4 + rng.random_range(0.0..0.15),
            });
        }
        Phrase {
            length_beats,
            melody,
            chords,
            counterpoint: Vec::new(),
        }
    }

    /// Contour-shaped singable melody aligned to a progression, with
    /// optional passing tones between wider steps.
    fn song(&self, scale_len: usize, rng: &mut SmallRng) -> Phrase {
        let progression = PROGRESSIONS[rng.random_range(0..PROGRESSIONS.len())];
        let contour = CONTOURS[rng.random_range(0..CONTOURS.len())];
        let base = scale_len as i32 + self.register_shift;
        let chord_beats = 4.0;
        let length_beats = progression.len() as f64 * chord_beats;

        let mut chords = Vec::new();
        for (i, &root) in progression.iter().enumerate() {
            chords.push(ChordEvent {
                beat: i as f64 * chord_beats,
                degrees: vec![base + root, base + root + 2, base + root + 4],
                duration_beats: chord_beats,
                velocity: 0.45,
            });
        }

        let mut melody: Vec<NoteEvent> = Vec::new();
        for beat in 0..length_beats as usize {
            let chord_root = progression[beat / chord_beats as usize];
            let mut degree = base + contour[beat % contour.len()];
            // Strong beats sit on the underlying chord.
            if beat % 2 == 0 {
                degree = nearest_chord_tone(degree, base + chord_root, scale_len);
            }
            if let Some(prev) = melody.last().copied()
                && (degree - prev.degree).abs() >= 2
                && prev.beat + 0.5 < beat as f64
                && rng.random_bool(0.35)
            {
                // Passing tone halfway between the two chord notes.
                melody.push(NoteEvent {
                    beat: prev.beat + 0.5,
                    degree: (prev.degree + degree) / 2,
                    duration_beats: 0.5,
                    velocity: prev.velocity * 0.8,
                });
            }
            melody.push(NoteEvent {
                beat: beat as f64,
                degree,
                duration_beats: 1.0,
                velocity: 0.55 + rng.random_range(0.0..0.25),
            });
        }
        Phrase {
            length_beats,
            melody,
            chords,
            counterpoint: Vec::new(),
        }
    }
}

/// Closest chord tone (root/third/fifth of `root`, any octave) to `degree`.
fn nearest_chord_tone(degree: i32, root: i32, scale_len: usize) -> i32 {
    let len = scale_len as i32;
    let mut best = degree;
    let mut best_dist = i32::MAX;
    for octave in -1..=1 {
        for t in [0, 2, 4] {
            let cand = root + t + octave * len;
            let dist = (cand - degree).abs();
            if dist < best_dist {
                best_dist = dist;
                best = cand;
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn generator() -> PhraseGenerator {
        PhraseGenerator::new(Influences::default())
    }

    #[test]
    fn phrases_are_nonempty_and_bounded() {
        let mut g = generator();
        let mut rng = SmallRng::seed_from_u64(11);
        for _ in 0..50 {
            let p = g.generate(7, None, &mut rng);
            assert!(!p.is_empty());
            assert!(p.length_beats > 0.0);
            for n in &p.melody {
                assert!(n.beat >= 0.0 && n.beat < p.length_beats);
                assert!(n.duration_beats > 0.0);
                assert!(n.velocity > 0.0 && n.velocity <= 1.0);
            }
            for c in &p.chords {
                assert!(c.beat >= 0.0 && c.beat < p.length_beats);
                assert!(!c.degrees.is_empty());
            }
        }
    }

    #[test]
    fn tintinnabuli_voice_matches_melody_length() {
        let mut g = generator();
        let mut rng = SmallRng::seed_from_u64(5);
        let p = g.generate(7, Some(TintinMode::Above), &mut rng);
        assert_eq!(p.counterpoint.len(), p.melody.len());
        for (m, t) in p.melody.iter().zip(&p.counterpoint) {
            assert!(t.degree > m.degree);
            assert_eq!(t.beat, m.beat);
        }
    }

    #[test]
    fn minimalism_influence_biases_archetype() {
        let mut g = generator();
        g.influences.minimalism = 1.0;
        g.influences.harmony = 0.0;
        let mut rng = SmallRng::seed_from_u64(21);
        let mut minimalist = 0;
        for _ in 0..200 {
            g.generate(7, None, &mut rng);
            if g.last_archetype() == Some(Archetype::Minimalist) {
                minimalist += 1;
            }
        }
        assert!(minimalist > 40, "only {minimalist} minimalist draws");
    }

    #[test]
    fn song_melodies_land_on_chord_tones_at_strong_beats() {
        let scale_len = 7;
        let base = scale_len as i32;
        for degree in 0..20 {
            let tone = nearest_chord_tone(degree, base, scale_len);
            let rel = (tone - base).rem_euclid(scale_len as i32);
            assert!([0, 2, 4].contains(&rel));
        }
    }
}

use serde::{Deserialize, Serialize};

use crate::phrase::note::NoteEvent;

/// Scale indices forming the tintinnabuli triad (root, third, fifth).
pub const TRIAD_INDICES: [i32; 3] = [0, 2, 4];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TintinMode {
    Above,
    Below,
    Alternating,
}

/// Nearest triad tone strictly above the melody degree, wrapping to the next
/// octave's root when the current octave is exhausted.
pub fn triad_above(degree: i32, scale_len: usize) -> i32 {
    let len = scale_len as i32;
    if len == 0 {
        return degree;
    }
    let octave = degree.div_euclid(len);
    let idx = degree.rem_euclid(len);
    for t in TRIAD_INDICES {
        if t > idx {
            return octave * len + t;
        }
    }
    (octave + 1) * len + TRIAD_INDICES[0]
}

/// Nearest triad tone strictly below. The current octave's root is not a
/// below-candidate (it doubles the octave anchor); when only the root would
/// remain, the voice drops to the previous octave's fifth.
pub fn triad_below(degree: i32, scale_len: usize) -> i32 {
    let len = scale_len as i32;
    if len == 0 {
        return degree;
    }
    let octave = degree.div_euclid(len);
    let idx = degree.rem_euclid(len);
    for t in TRIAD_INDICES.iter().rev() {
        if *t > 0 && *t < idx {
            return octave * len + t;
        }
    }
    (octave - 1) * len + TRIAD_INDICES[TRIAD_INDICES.len() - 1]
}

/// Derive the counterpoint voice for a melody: one triad tone per melody
/// note, above / below / alternating by note index.
pub fn derive(melody: &[NoteEvent], mode: TintinMode, scale_len: usize) -> Vec<NoteEvent> {
    melody
        .iter()
        .enumerate()
        .map(|(i, note)| {
            let above = match mode {
                TintinMode::Above => true,
                TintinMode::Below => false,
                TintinMode::Alternating => i % 2 == 0,
            };
            let degree = if above {
                triad_above(note.degree, scale_len)
            } else {
                triad_below(note.degree, scale_len)
            };
            NoteEvent {
                degree,
                velocity: note.velocity * 0.8,
                ..*note
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_across_the_octave_as_specified() {
        // Seven-degree scale, melody degree 8 = index 1 in octave 1.
        assert_eq!(triad_above(8, 7), 9);
        assert_eq!(triad_below(8, 7), 4);
    }

    #[test]
    fn above_wraps_past_the_fifth() {
        // Index 5 and 6 have no higher triad index in the octave.
        assert_eq!(triad_above(5, 7), 7);
        assert_eq!(triad_above(6, 7), 7);
        assert_eq!(triad_above(12, 7), 14);
    }

    #[test]
    fn triad_tones_map_strictly_off_themselves() {
        assert_eq!(triad_above(0, 7), 2);
        assert_eq!(triad_above(2, 7), 4);
        assert_eq!(triad_above(4, 7), 7);
        assert_eq!(triad_below(3, 7), 2);
        assert_eq!(triad_below(10, 7), 9);
    }

    #[test]
    fn below_never_lands_on_the_octave_root() {
        for degree in -10..20 {
            let t = triad_below(degree, 7);
            assert!(t < degree);
            assert_ne!(t.rem_euclid(7), 0, "degree {degree} resolved to a root");
        }
    }

    #[test]
    fn alternating_mode_flips_per_note_index() {
        let melody: Vec<NoteEvent> = (0..4)
            .map(|i| NoteEvent {
                beat: i as f64,
                degree: 8,
                duration_beats: 1.0,
                velocity: 0.5,
            })
            .collect();
        let voice = derive(&melody, TintinMode::Alternating, 7);
        assert_eq!(voice[0].degree, 9);
        assert_eq!(voice[1].degree, 4);
        assert_eq!(voice[2].degree, 9);
        assert_eq!(voice[3].degree, 4);
    }
}

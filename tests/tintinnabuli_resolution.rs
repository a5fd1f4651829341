use cellarium::phrase::note::NoteEvent;
use cellarium::phrase::tintinnabuli::{TintinMode, derive, triad_above, triad_below};

fn note(degree: i32) -> NoteEvent {
    NoteEvent {
        beat: 0.0,
        degree,
        duration_beats: 1.0,
        velocity: 0.6,
    }
}

#[test]
fn degree_eight_resolves_to_nine_above_and_four_below() {
    // Seven-degree scale, triad indices {0, 2, 4}: melody degree 8 is
    // index 1 in octave 1.
    assert_eq!(triad_above(8, 7), 9);
    assert_eq!(triad_below(8, 7), 4);
}

#[test]
fn counterpoint_is_always_strictly_on_the_requested_side() {
    for degree in -14..21 {
        let above = derive(&[note(degree)], TintinMode::Above, 7);
        assert!(above[0].degree > degree);
        let below = derive(&[note(degree)], TintinMode::Below, 7);
        assert!(below[0].degree < degree);
    }
}

#[test]
fn counterpoint_degrees_are_triad_tones() {
    for degree in -14..21 {
        for mode in [TintinMode::Above, TintinMode::Below] {
            let voice = derive(&[note(degree)], mode, 7);
            let idx = voice[0].degree.rem_euclid(7);
            assert!(
                [0, 2, 4].contains(&idx),
                "degree {degree} {mode:?} gave non-triad index {idx}"
            );
        }
    }
}

#[test]
fn alternating_mode_interleaves_sides() {
    let melody: Vec<NoteEvent> = (0..6).map(|_| note(10)).collect();
    let voice = derive(&melody, TintinMode::Alternating, 7);
    for (i, v) in voice.iter().enumerate() {
        if i % 2 == 0 {
            assert!(v.degree > 10);
        } else {
            assert!(v.degree < 10);
        }
    }
}

#[test]
fn timing_and_length_mirror_the_melody() {
    let melody = vec![
        NoteEvent {
            beat: 0.0,
            degree: 7,
            duration_beats: 0.5,
            velocity: 0.7,
        },
        NoteEvent {
            beat: 1.5,
            degree: 11,
            duration_beats: 2.0,
            velocity: 0.5,
        },
    ];
    let voice = derive(&melody, TintinMode::Above, 7);
    assert_eq!(voice.len(), 2);
    assert_eq!(voice[0].beat, 0.0);
    assert_eq!(voice[1].beat, 1.5);
    assert_eq!(voice[1].duration_beats, 2.0);
}

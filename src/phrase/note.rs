/// One melodic event, in beats relative to phrase start.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteEvent {
    pub beat: f64,
    pub degree: i32,
    pub duration_beats: f64,
    pub velocity: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChordEvent {
    pub beat: f64,
    pub degrees: Vec<i32>,
    pub duration_beats: f64,
    pub velocity: f32,
}

/// A fully generated phrase. Immutable during playback except for the
/// actor's slight upcoming-note mutations; regenerated wholesale when the
/// playback position reaches `length_beats`.
#[derive(Debug, Clone, PartialEq)]
pub struct Phrase {
    pub length_beats: f64,
    pub melody: Vec<NoteEvent>,
    pub chords: Vec<ChordEvent>,
    pub counterpoint: Vec<NoteEvent>,
}

impl Phrase {
    pub fn empty() -> Self {
        Self {
            length_beats: 0.0,
            melody: Vec::new(),
            chords: Vec::new(),
            counterpoint: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.melody.is_empty() && self.chords.is_empty()
    }
}

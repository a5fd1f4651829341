use rand::Rng;
use rand::rngs::SmallRng;
use serde::Serialize;
use tracing::debug;

use crate::core::scale::{Scale, frequency_for_degree};
use crate::core::timebase::Timebase;
use crate::phrase::generator::{Influences, PhraseGenerator};
use crate::phrase::note::Phrase;
use crate::phrase::tintinnabuli::TintinMode;
use crate::phrase::voice::VoicePool;

pub const MELODY_VOICES: usize = 4;
pub const COUNTERPOINT_VOICES: usize = 4;
pub const CHORD_VOICES: usize = 6;

/// Events within this distance of the playback cursor dispatch on the
/// current tick: half a subdivision step.
pub const DISPATCH_TOL_BEATS: f64 = 0.125;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct TriggerInfo {
    pub pool: &'static str,
    pub voice: usize,
    pub freq_hz: f32,
    pub velocity: f32,
    pub at: f64,
}

/// Owns the live phrase and the three playback pools; runs on the
/// subdivision clock and converts scale degrees to frequencies at dispatch
/// time, so scale or root changes take effect mid-phrase.
pub struct PhraseScheduler {
    generator: PhraseGenerator,
    phrase: Phrase,
    position_beats: f64,
    melody_idx: usize,
    chord_idx: usize,
    counterpoint_idx: usize,
    melody_pool: VoicePool,
    counterpoint_pool: VoicePool,
    chord_pool: VoicePool,
    tintinnabuli: Option<TintinMode>,
    pending_reset: bool,
    triggers: Vec<TriggerInfo>,
}

impl PhraseScheduler {
    pub fn new(influences: Influences) -> Self {
        Self {
            generator: PhraseGenerator::new(influences),
            phrase: Phrase::empty(),
            position_beats: 0.0,
            melody_idx: 0,
            chord_idx: 0,
            counterpoint_idx: 0,
            melody_pool: VoicePool::new("melody", MELODY_VOICES),
            counterpoint_pool: VoicePool::new("counterpoint", COUNTERPOINT_VOICES),
            chord_pool: VoicePool::new("chord", CHORD_VOICES),
            tintinnabuli: None,
            pending_reset: false,
            triggers: Vec::new(),
        }
    }

    pub fn generator_mut(&mut self) -> &mut PhraseGenerator {
        &mut self.generator
    }

    pub fn phrase(&self) -> &Phrase {
        &self.phrase
    }

    pub fn position_beats(&self) -> f64 {
        self.position_beats
    }

    pub fn tintinnabuli(&self) -> Option<TintinMode> {
        self.tintinnabuli
    }

    pub fn set_tintinnabuli(&mut self, mode: Option<TintinMode>) {
        self.tintinnabuli = mode;
    }

    /// Throw the current phrase away at the next tick.
    pub fn request_reset(&mut self) {
        self.pending_reset = true;
    }

    pub fn pools(&self) -> [&VoicePool; 3] {
        [&self.melody_pool, &self.counterpoint_pool, &self.chord_pool]
    }

    /// One subdivision tick: regenerate if the phrase is spent, dispatch
    /// everything due, advance the cursor one step.
    pub fn tick(
        &mut self,
        now: f64,
        timebase: &Timebase,
        scale: &Scale,
        root_hz: f32,
        rng: &mut SmallRng,
    ) {
        if self.pending_reset || self.position_beats >= self.phrase.length_beats {
            self.regenerate(scale, rng);
        }

        let tol = self.position_beats + DISPATCH_TOL_BEATS;
        while let Some(note) = self.phrase.melody.get(self.melody_idx).copied() {
            if note.beat > tol {
                break;
            }
            self.melody_idx += 1;
            let freq = frequency_for_degree(note.degree, scale, root_hz);
            let id = self.melody_pool.trigger(
                now,
                freq,
                note.velocity,
                timebase.beats_to_sec(note.duration_beats),
            );
            self.triggers.push(TriggerInfo {
                pool: "melody",
                voice: id,
                freq_hz: freq,
                velocity: note.velocity,
                at: now,
            });
        }

        while let Some(note) = self.phrase.counterpoint.get(self.counterpoint_idx).copied() {
            if note.beat > tol {
                break;
            }
            self.counterpoint_idx += 1;
            let freq = frequency_for_degree(note.degree, scale, root_hz);
            let id = self.counterpoint_pool.trigger(
                now,
                freq,
                note.velocity,
                timebase.beats_to_sec(note.duration_beats),
            );
            self.triggers.push(TriggerInfo {
                pool: "counterpoint",
                voice: id,
                freq_hz: freq,
                velocity: note.velocity,
                at: now,
            });
        }

        while self.chord_idx < self.phrase.chords.len() {
            if self.phrase.chords[self.chord_idx].beat > tol {
                break;
            }
            let chord = self.phrase.chords[self.chord_idx].clone();
            self.chord_idx += 1;
            for &degree in &chord.degrees {
                let freq = frequency_for_degree(degree, scale, root_hz);
                let id = self.chord_pool.trigger(
                    now,
                    freq,
                    chord.velocity,
                    timebase.beats_to_sec(chord.duration_beats),
                );
                self.triggers.push(TriggerInfo {
                    pool: "chord",
                    voice: id,
                    freq_hz: freq,
                    velocity: chord.velocity,
                    at: now,
                });
            }
        }

        self.position_beats += 1.0 / crate::core::timebase::STEPS_PER_BEAT;
    }

    fn regenerate(&mut self, scale: &Scale, rng: &mut SmallRng) {
        self.phrase = self
            .generator
            .generate(scale.len(), self.tintinnabuli, rng);
        self.position_beats = 0.0;
        self.melody_idx = 0;
        self.chord_idx = 0;
        self.counterpoint_idx = 0;
        self.pending_reset = false;
        debug!(
            "phrase reset: {:?}, {} beats",
            self.generator.last_archetype(),
            self.phrase.length_beats
        );
    }

    /// Slightly bend the next note still ahead of the cursor: a one-degree
    /// shift or a velocity nudge.
    pub fn mutate_upcoming(&mut self, scale: &Scale, root_hz: f32, rng: &mut SmallRng) {
        let pos = self.position_beats;
        let Some(note) = self
            .phrase
            .melody
            .iter_mut()
            .find(|n| n.beat >= pos)
        else {
            return;
        };
        if rng.random_bool(0.5) {
            note.degree += if rng.random_bool(0.5) { 1 } else { -1 };
            let freq = frequency_for_degree(note.degree, scale, root_hz);
            debug!("phrase mutate: degree {} ({freq} Hz)", note.degree);
        } else {
            let jitter: f32 = rng.random_range(-0.1..0.1);
            note.velocity = (note.velocity + jitter).clamp(0.05, 1.0);
        }
    }

    /// Advance pitch ramps on all pools.
    pub fn advance(&mut self, dt_sec: f32) {
        self.melody_pool.advance(dt_sec);
        self.counterpoint_pool.advance(dt_sec);
        self.chord_pool.advance(dt_sec);
    }

    /// Summed pool envelopes, part of the loudness proxy.
    pub fn gain_sum(&self, now: f64) -> f32 {
        self.melody_pool.gain_sum(now)
            + self.counterpoint_pool.gain_sum(now)
            + self.chord_pool.gain_sum(now)
    }

    /// Hand out and clear the dispatch log since the last call.
    pub fn drain_triggers(&mut self) -> Vec<TriggerInfo> {
        std::mem::take(&mut self.triggers)
    }
}

use tracing::debug;

use crate::core::scale::{FREQ_MAX_HZ, FREQ_MIN_HZ};
use crate::core::smooth::Smoothed;

/// Envelope attack as a fraction of the note, capped in absolute seconds.
const ATTACK_FRACTION: f64 = 0.15;
const ATTACK_MAX_SEC: f64 = 0.08;
/// Release tail appended after the sustained portion.
const RELEASE_FRACTION: f64 = 0.4;
const RELEASE_MIN_SEC: f64 = 0.06;

/// One pooled playback resource: an oscillator handle, a gain envelope and a
/// filter, all host-owned. Borrowed by a trigger, returned implicitly when
/// `free_at` passes; there is no explicit release call.
#[derive(Debug, Clone)]
pub struct Voice {
    pub id: usize,
    pitch_hz: Smoothed,
    velocity: f32,
    triggered_at: f64,
    free_at: f64,
    attack_sec: f64,
    release_sec: f64,
}

impl Voice {
    fn new(id: usize) -> Self {
        Self {
            id,
            pitch_hz: Smoothed::new(220.0, 0.005),
            velocity: 0.0,
            triggered_at: 0.0,
            free_at: 0.0,
            attack_sec: 0.0,
            release_sec: 0.0,
        }
    }

    pub fn is_busy(&self, now: f64) -> bool {
        now < self.free_at
    }

    pub fn free_at(&self) -> f64 {
        self.free_at
    }

    pub fn pitch_hz(&self) -> f32 {
        self.pitch_hz.target()
    }

    pub fn velocity(&self) -> f32 {
        self.velocity
    }

    /// Envelope gain at `now`; attack-sustain-release over the scheduled
    /// window. Only used for level estimation, the host renders the real
    /// envelope.
    pub fn gain_at(&self, now: f64) -> f32 {
        if now < self.triggered_at || now >= self.free_at {
            return 0.0;
        }
        let t = now - self.triggered_at;
        let attack = if self.attack_sec > 0.0 {
            (t / self.attack_sec).min(1.0)
        } else {
            1.0
        };
        let release_start = self.free_at - self.release_sec;
        let release = if now >= release_start && self.release_sec > 0.0 {
            ((self.free_at - now) / self.release_sec).clamp(0.0, 1.0)
        } else {
            1.0
        };
        self.velocity * (attack * release) as f32
    }

    fn trigger(&mut self, now: f64, freq_hz: f32, velocity: f32, duration_sec: f64) {
        let duration_sec = duration_sec.max(0.01);
        self.pitch_hz
            .set_target(freq_hz.clamp(FREQ_MIN_HZ, FREQ_MAX_HZ));
        self.velocity = velocity.clamp(0.0, 1.0);
        self.triggered_at = now;
        self.attack_sec = (duration_sec * ATTACK_FRACTION).min(ATTACK_MAX_SEC);
        self.release_sec = (duration_sec * RELEASE_FRACTION).max(RELEASE_MIN_SEC);
        self.free_at = now + duration_sec + self.release_sec;
    }
}

/// Fixed-capacity pool. Acquisition never blocks: a free voice if any,
/// otherwise the one closest to freeing (unconditional stealing).
#[derive(Debug)]
pub struct VoicePool {
    label: &'static str,
    voices: Vec<Voice>,
}

impl VoicePool {
    pub fn new(label: &'static str, capacity: usize) -> Self {
        Self {
            label,
            voices: (0..capacity).map(Voice::new).collect(),
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn capacity(&self) -> usize {
        self.voices.len()
    }

    pub fn busy_count(&self, now: f64) -> usize {
        self.voices.iter().filter(|v| v.is_busy(now)).count()
    }

    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    /// First free voice, else the busy voice with the smallest `free_at`.
    pub fn available_voice(&mut self, now: f64) -> &mut Voice {
        let idx = self
            .voices
            .iter()
            .position(|v| !v.is_busy(now))
            .unwrap_or_else(|| {
                let stolen = self
                    .voices
                    .iter()
                    .enumerate()
                    .min_by(|(_, a), (_, b)| a.free_at.total_cmp(&b.free_at))
                    .map(|(i, _)| i)
                    .unwrap_or(0);
                debug!("{}: stealing voice {stolen}", self.label);
                stolen
            });
        &mut self.voices[idx]
    }

    /// Borrow a voice, pitch it, and schedule its envelope. Returns the
    /// voice id for observability.
    pub fn trigger(&mut self, now: f64, freq_hz: f32, velocity: f32, duration_sec: f64) -> usize {
        let voice = self.available_voice(now);
        voice.trigger(now, freq_hz, velocity, duration_sec);
        voice.id
    }

    pub fn advance(&mut self, dt_sec: f32) {
        for voice in &mut self.voices {
            voice.pitch_hz.advance(dt_sec);
        }
    }

    /// Summed envelope gain across the pool, for the loudness proxy.
    pub fn gain_sum(&self, now: f64) -> f32 {
        self.voices.iter().map(|v| v.gain_at(now)).sum()
    }
}

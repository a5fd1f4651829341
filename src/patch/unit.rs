use serde::Serialize;

use crate::core::smooth::Smoothed;

pub type PortName = &'static str;

/// Control ports a modulator may be routed into. Frequency is deliberately
/// absent: modulating it directly produces runaway pitch. "depth" stays on
/// the list even where a unit reads it as a frequency-scale gain.
pub const MOD_SAFE_PORTS: [PortName; 6] = ["depth", "gain", "pan", "rate", "feedback", "time"];

/// Fixed strong attenuation applied to control-port modulation routes.
pub const MOD_ATTENUATION: f32 = 0.12;

/// Default ramp constant for audible parameter moves.
pub const PORT_TAU_SEC: f32 = 0.08;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitCategory {
    Source,
    Processor,
    Modulator,
    Logic,
    Utility,
}

#[derive(Debug, Clone)]
pub struct ControlPort {
    min: f32,
    max: f32,
    level: Smoothed,
}

impl ControlPort {
    pub fn new(value: f32, min: f32, max: f32) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        Self {
            min,
            max,
            level: Smoothed::new(value.clamp(min, max), PORT_TAU_SEC),
        }
    }

    pub fn value(&self) -> f32 {
        self.level.value()
    }

    pub fn target(&self) -> f32 {
        self.level.target()
    }

    pub fn bounds(&self) -> (f32, f32) {
        (self.min, self.max)
    }

    /// Instantaneous set. Clamped; reserved for inaudible moments
    /// (construction, muting a unit that has not sounded yet).
    pub fn set(&mut self, value: f32) {
        if value.is_finite() {
            self.level.snap(value.clamp(self.min, self.max));
        }
    }

    /// Smoothed approach to a clamped target.
    pub fn glide(&mut self, target: f32) {
        if target.is_finite() {
            self.level.set_target(target.clamp(self.min, self.max));
        }
    }

    pub fn glide_with_tau(&mut self, target: f32, tau_sec: f32) {
        self.level.set_tau_sec(tau_sec);
        self.glide(target);
    }

    pub fn advance(&mut self, dt_sec: f32) -> f32 {
        self.level.advance(dt_sec)
    }
}

/// Secondary handle owned by the same cell (sub-oscillator, partial bank,
/// envelope LFO). Opaque to the core beyond release.
#[derive(Debug, Clone)]
pub struct SubUnit {
    pub kind: &'static str,
}

impl SubUnit {
    pub fn release(&mut self) -> Result<(), String> {
        // Host-side handle release; nothing can fail in the built-in host.
        Ok(())
    }
}

/// One host-constructed unit: an output, named float control ports, an
/// optional dedicated modulation input, and optional owned sub-handles.
/// Routing and actor code depend only on this shape, never on the kind.
#[derive(Debug, Clone)]
pub struct Unit {
    pub kind: &'static str,
    pub category: UnitCategory,
    pub has_mod_input: bool,
    ports: Vec<(PortName, ControlPort)>,
    extras: Vec<SubUnit>,
}

impl Unit {
    pub fn new(
        kind: &'static str,
        category: UnitCategory,
        has_mod_input: bool,
        ports: Vec<(PortName, ControlPort)>,
        extras: Vec<SubUnit>,
    ) -> Self {
        Self {
            kind,
            category,
            has_mod_input,
            ports,
            extras,
        }
    }

    pub fn port(&self, name: &str) -> Option<&ControlPort> {
        self.ports
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, p)| p)
    }

    pub fn port_mut(&mut self, name: &str) -> Option<&mut ControlPort> {
        self.ports
            .iter_mut()
            .find(|(n, _)| *n == name)
            .map(|(_, p)| p)
    }

    pub fn has_port(&self, name: &str) -> bool {
        self.port(name).is_some()
    }

    pub fn port_names(&self) -> impl Iterator<Item = PortName> + '_ {
        self.ports.iter().map(|(n, _)| *n)
    }

    pub fn port_count(&self) -> usize {
        self.ports.len()
    }

    /// Set a port target with the standard ramp. Missing ports are reported,
    /// not fatal.
    pub fn glide(&mut self, name: &str, target: f32) -> bool {
        match self.port_mut(name) {
            Some(port) => {
                port.glide(target);
                true
            }
            None => false,
        }
    }

    /// Cells that expose a frequency port count as oscillator-like for
    /// drift, detune and harmonic-jump behavior.
    pub fn is_oscillator_like(&self) -> bool {
        self.has_port("frequency")
    }

    pub fn advance(&mut self, dt_sec: f32) {
        for (_, port) in &mut self.ports {
            port.advance(dt_sec);
        }
    }

    /// Best-effort resource release, including owned sub-handles.
    pub fn release(&mut self) -> Result<(), String> {
        let mut first_err = None;
        for extra in &mut self.extras {
            if let Err(e) = extra.release()
                && first_err.is_none()
            {
                first_err = Some(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn extras_len(&self) -> usize {
        self.extras.len()
    }
}

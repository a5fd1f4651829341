/// Homeostatic trim derived from measured output level.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Trim {
    pub gain_delta: f32,
    pub density_delta: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct ListenerPolicy {
    /// Level the loop settles toward.
    pub target_level: f32,
    /// Per-observation smoothing factor, 0..1.
    pub smoothing: f32,
    pub max_gain_step: f32,
    pub max_density_step: f32,
}

impl Default for ListenerPolicy {
    fn default() -> Self {
        Self {
            target_level: 1.4,
            smoothing: 0.1,
            max_gain_step: 0.02,
            max_density_step: 0.01,
        }
    }
}

/// Slow feedback loop: listens to output loudness and trims master gain and
/// actor density back toward equilibrium. Runs at a far lower rate than the
/// actor so it shapes, never fights, the foreground behavior.
#[derive(Debug, Clone, Copy)]
pub struct DriftListener {
    policy: ListenerPolicy,
    level: f32,
}

impl DriftListener {
    pub fn new(policy: ListenerPolicy) -> Self {
        Self { policy, level: policy.target_level }
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    /// Fold in one loudness measurement and return the correction to apply.
    pub fn observe(&mut self, measured: f32) -> Trim {
        if measured.is_finite() && measured >= 0.0 {
            let k = self.policy.smoothing.clamp(0.0, 1.0);
            self.level += (measured - self.level) * k;
        }
        let err = self.level - self.policy.target_level;
        Trim {
            gain_delta: (-err * self.policy.max_gain_step)
                .clamp(-self.policy.max_gain_step, self.policy.max_gain_step),
            density_delta: (-err * self.policy.max_density_step)
                .clamp(-self.policy.max_density_step, self.policy.max_density_step),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loud_output_trims_gain_and_density_down() {
        let mut listener = DriftListener::new(ListenerPolicy::default());
        let mut trim = Trim::default();
        for _ in 0..50 {
            trim = listener.observe(4.0);
        }
        assert!(trim.gain_delta < 0.0);
        assert!(trim.density_delta < 0.0);
    }

    #[test]
    fn quiet_output_trims_upward() {
        let mut listener = DriftListener::new(ListenerPolicy::default());
        let mut trim = Trim::default();
        for _ in 0..50 {
            trim = listener.observe(0.0);
        }
        assert!(trim.gain_delta > 0.0);
        assert!(trim.density_delta > 0.0);
    }

    #[test]
    fn at_setpoint_the_trim_vanishes() {
        let mut listener = DriftListener::new(ListenerPolicy::default());
        let trim = listener.observe(ListenerPolicy::default().target_level);
        assert!(trim.gain_delta.abs() < 1e-6);
        assert!(trim.density_delta.abs() < 1e-6);
    }

    #[test]
    fn non_finite_measurements_are_ignored() {
        let mut listener = DriftListener::new(ListenerPolicy::default());
        let before = listener.level();
        listener.observe(f32::NAN);
        assert_eq!(listener.level(), before);
    }

    #[test]
    fn steps_stay_bounded() {
        let policy = ListenerPolicy::default();
        let mut listener = DriftListener::new(policy);
        for _ in 0..100 {
            listener.observe(100.0);
        }
        let trim = listener.observe(100.0);
        assert!(trim.gain_delta >= -policy.max_gain_step);
        assert!(trim.density_delta >= -policy.max_density_step);
    }
}

//! Per-frame target sources.
//!
//! A [`TargetSource`] produces world-space targets by chain name. The rig
//! validates every target on write, so a source may hand back non-finite
//! values and the affected chains simply keep their previous target.

use nalgebra::Vector3;

use marionette_core::error::ConfigError;

use crate::rig::IkRig;

/// Anything that can drive chain targets once per frame.
pub trait TargetSource: Send + Sync + 'static {
    /// Targets for this frame. Chains not listed keep their current target.
    fn targets(&mut self) -> Vec<(&str, Vector3<f32>)>;
}

/// Pull one frame of targets from `source` into `rig`.
///
/// Returns how many targets were rejected (unknown chain or non-finite).
pub fn apply_targets(source: &mut dyn TargetSource, rig: &mut IkRig) -> usize {
    source
        .targets()
        .into_iter()
        .filter(|(name, target)| !rig.set_target(name, *target))
        .count()
}

// ---------------------------------------------------------------------------
// StaticTargets
// ---------------------------------------------------------------------------

/// Fixed targets, edited from outside (e.g. by a UI or a script).
#[derive(Debug, Clone, Default)]
pub struct StaticTargets {
    targets: Vec<(String, Vector3<f32>)>,
}

impl StaticTargets {
    /// Empty source. Chains keep their targets until one is set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with every chain's current target.
    pub fn from_rig(rig: &IkRig) -> Self {
        Self {
            targets: rig
                .chains()
                .iter()
                .map(|c| (c.name().to_owned(), c.target_position()))
                .collect(),
        }
    }

    /// Set or replace the target for `chain`.
    pub fn set(&mut self, chain: &str, target: Vector3<f32>) {
        match self.targets.iter_mut().find(|(name, _)| name == chain) {
            Some((_, t)) => *t = target,
            None => self.targets.push((chain.to_owned(), target)),
        }
    }

    /// Current target for `chain`, if one was set.
    pub fn get(&self, chain: &str) -> Option<Vector3<f32>> {
        self.targets
            .iter()
            .find(|(name, _)| name == chain)
            .map(|(_, t)| *t)
    }
}

impl TargetSource for StaticTargets {
    fn targets(&mut self) -> Vec<(&str, Vector3<f32>)> {
        self.targets.iter().map(|(n, t)| (n.as_str(), *t)).collect()
    }
}

// ---------------------------------------------------------------------------
// WaveformTargets
// ---------------------------------------------------------------------------

/// Sample index per target component: chain `k` reads x, y, z from
/// `mapping[3k..3k + 3]`.
pub const DEFAULT_MAPPING: [usize; 12] = [1, 3, 5, 7, 9, 11, 13, 15, 17, 19, 20, 21];

/// Byte value that maps to a zero offset.
const SAMPLE_CENTER: f32 = 100.0;
const SAMPLE_SCALE: f32 = 255.0;

/// Drives targets from a time-domain byte buffer (e.g. an audio analyser).
///
/// Each component is `anchor + (sample − 100) / 255`. A sample index past
/// the end of the buffer yields NaN, so a stalled or short buffer leaves
/// the affected chains on their previous target.
#[derive(Debug, Clone)]
pub struct WaveformTargets {
    anchors: Vec<(String, Vector3<f32>)>,
    mapping: Vec<usize>,
    buffer: Vec<u8>,
}

impl WaveformTargets {
    /// `mapping` needs three indices per anchor.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if `mapping` has fewer than
    /// three indices per anchor.
    pub fn new(
        anchors: Vec<(String, Vector3<f32>)>,
        mapping: Vec<usize>,
    ) -> Result<Self, ConfigError> {
        if mapping.len() < anchors.len() * 3 {
            return Err(ConfigError::InvalidValue {
                field: "mapping".into(),
                message: format!(
                    "{} indices for {} chains (need {})",
                    mapping.len(),
                    anchors.len(),
                    anchors.len() * 3
                ),
            });
        }
        Ok(Self {
            anchors,
            mapping,
            buffer: Vec::new(),
        })
    }

    /// Anchor every chain at its current target, using [`DEFAULT_MAPPING`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if the rig has more chains than
    /// [`DEFAULT_MAPPING`] covers.
    pub fn from_rig(rig: &IkRig) -> Result<Self, ConfigError> {
        let anchors = rig
            .chains()
            .iter()
            .map(|c| (c.name().to_owned(), c.target_position()))
            .collect();
        Self::new(anchors, DEFAULT_MAPPING.to_vec())
    }

    /// Replace the sample buffer with the latest analyser frame.
    pub fn push_samples(&mut self, samples: &[u8]) {
        self.buffer.clear();
        self.buffer.extend_from_slice(samples);
    }

    fn offset(&self, slot: usize) -> f32 {
        self.buffer
            .get(self.mapping[slot])
            .map_or(f32::NAN, |&b| (f32::from(b) - SAMPLE_CENTER) / SAMPLE_SCALE)
    }
}

impl TargetSource for WaveformTargets {
    fn targets(&mut self) -> Vec<(&str, Vector3<f32>)> {
        self.anchors
            .iter()
            .enumerate()
            .map(|(k, (name, anchor))| {
                let offset = Vector3::new(
                    self.offset(3 * k),
                    self.offset(3 * k + 1),
                    self.offset(3 * k + 2),
                );
                (name.as_str(), anchor + offset)
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use marionette_core::presets::{humanoid_rig, humanoid_skeleton};

    fn humanoid() -> IkRig {
        IkRig::from_config(humanoid_skeleton().unwrap(), &humanoid_rig()).unwrap()
    }

    #[test]
    fn static_targets_apply() {
        let mut rig = humanoid();
        let mut source = StaticTargets::from_rig(&rig);
        let target = Vector3::new(-0.6, 1.3, 0.2);
        source.set("right hand", target);
        assert_eq!(source.get("right hand"), Some(target));

        assert_eq!(apply_targets(&mut source, &mut rig), 0);
        assert_relative_eq!(rig.chain("right hand").unwrap().target_position(), target);
    }

    #[test]
    fn static_unknown_chain_counts_as_rejected() {
        let mut rig = humanoid();
        let mut source = StaticTargets::new();
        source.set("tail", Vector3::zeros());
        assert_eq!(apply_targets(&mut source, &mut rig), 1);
    }

    #[test]
    fn waveform_maps_samples_to_offsets() {
        let anchors = vec![("a".to_owned(), Vector3::new(1.0, 2.0, 3.0))];
        let mut source = WaveformTargets::new(anchors, vec![0, 1, 2]).unwrap();
        source.push_samples(&[100, 227, 0]);

        let targets = source.targets();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].0, "a");
        assert_relative_eq!(
            targets[0].1,
            Vector3::new(1.0, 2.0 + 127.0 / 255.0, 3.0 - 100.0 / 255.0),
            epsilon = 1e-6
        );
    }

    #[test]
    fn waveform_default_mapping_covers_humanoid() {
        let rig = humanoid();
        let mut source = WaveformTargets::from_rig(&rig).unwrap();
        source.push_samples(&[100; 32]);
        for ((name, target), chain) in source.targets().into_iter().zip(rig.chains()) {
            assert_eq!(name, chain.name());
            assert_relative_eq!(target, chain.target_position(), epsilon = 1e-6);
        }
    }

    #[test]
    fn stalled_buffer_keeps_previous_targets() {
        let mut rig = humanoid();
        let before: Vec<_> = rig.chains().iter().map(|c| c.target_position()).collect();
        let mut source = WaveformTargets::from_rig(&rig).unwrap();

        // Nothing pushed yet: every component is NaN.
        assert_eq!(apply_targets(&mut source, &mut rig), 4);
        for (chain, prev) in rig.chains().iter().zip(&before) {
            assert_relative_eq!(chain.target_position(), *prev);
        }
    }

    #[test]
    fn short_mapping_rejected() {
        let anchors = vec![
            ("a".to_owned(), Vector3::zeros()),
            ("b".to_owned(), Vector3::zeros()),
        ];
        assert!(matches!(
            WaveformTargets::new(anchors, vec![0, 1, 2, 3]),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}

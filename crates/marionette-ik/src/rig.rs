//! [`IkRig`]: a skeleton, its chains and the solve configuration.

use bevy::log::{debug, info};
use bevy::prelude::Resource;
use nalgebra::Vector3;

use marionette_core::config::{IkConfig, RigConfig};
use marionette_core::error::{ChainError, ConfigError, MarionetteError};
use marionette_core::skeleton::Skeleton;

use crate::chain::KinematicChain;
use crate::controller::{ChainReport, relax_chain};

/// A skeleton plus every chain that drives it.
///
/// Chains never share a writable joint, so each one can be relaxed on its
/// own. [`IkRig::solve_frame`] relaxes every chain in insertion order and
/// then refreshes the skeleton's cached world matrices once.
#[derive(Resource, Debug, Clone)]
pub struct IkRig {
    skeleton: Skeleton,
    chains: Vec<KinematicChain>,
    config: IkConfig,
    /// One per chain, from the last [`IkRig::solve_frame`].
    reports: Vec<ChainReport>,
}

impl IkRig {
    /// Empty rig over `skeleton`.
    ///
    /// # Errors
    ///
    /// Returns any error from [`IkConfig::validate`].
    pub fn new(mut skeleton: Skeleton, config: IkConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        skeleton.update_world_matrices();
        Ok(Self {
            skeleton,
            chains: Vec::new(),
            config,
            reports: Vec::new(),
        })
    }

    /// Build every chain described by `rig` over `skeleton`.
    ///
    /// Any chain failure aborts the whole load.
    ///
    /// # Errors
    ///
    /// Returns [`MarionetteError::Config`] for an invalid or unresolvable
    /// config and [`MarionetteError::Chain`] for the first chain that fails
    /// to build or to join the rig.
    pub fn from_config(skeleton: Skeleton, rig: &RigConfig) -> Result<Self, MarionetteError> {
        rig.validate()?;
        let mut out = Self::new(skeleton, rig.ik)?;
        for config in &rig.chains {
            let chain = KinematicChain::from_config(&out.skeleton, config, rig.max_chain_depth)?;
            out.add_chain(chain)?;
        }
        info!(
            "marionette-ik: loaded {} chains over {} bones ({} solver)",
            out.chains.len(),
            out.skeleton.len(),
            out.config.method
        );
        Ok(out)
    }

    /// Add a chain. Returns its index.
    ///
    /// The chain must have been built over this rig's skeleton (or one with
    /// the same bone ids and parent links).
    ///
    /// # Errors
    ///
    /// - [`ChainError::UnknownBone`] if a joint's bone is outside the
    ///   skeleton.
    /// - [`ChainError::NotDescendant`] if the joints do not follow this
    ///   skeleton's parent links from end effector to base.
    /// - [`ConfigError::DuplicateChain`] if a chain with the same name exists.
    /// - [`ChainError::SharedJoint`] if the chain would write a bone another
    ///   chain already writes.
    pub fn add_chain(&mut self, chain: KinematicChain) -> Result<usize, MarionetteError> {
        if let Some(joint) = chain.joints().iter().find(|j| j.bone >= self.skeleton.len()) {
            return Err(ChainError::UnknownBone(joint.bone).into());
        }
        let (end, base) = (chain.end_effector(), chain.base());
        let follows_parents = self
            .skeleton
            .path_to_ancestor(end, base, chain.dof())
            .is_some_and(|path| path.into_iter().eq(chain.joints().iter().map(|j| j.bone)));
        if !follows_parents {
            return Err(ChainError::NotDescendant {
                base,
                end,
                max_depth: chain.dof(),
            }
            .into());
        }
        if self.chains.iter().any(|c| c.name() == chain.name()) {
            return Err(ConfigError::DuplicateChain(chain.name().to_owned()).into());
        }
        for bone in chain.driven_bones() {
            if let Some(owner) = self
                .chains
                .iter()
                .find(|c| c.driven_bones().any(|b| b == bone))
            {
                return Err(ChainError::SharedJoint {
                    bone,
                    chain: owner.name().to_owned(),
                }
                .into());
            }
        }
        debug!(
            "marionette-ik: chain '{}' added with {} joints",
            chain.name(),
            chain.dof()
        );
        self.chains.push(chain);
        self.reports.push(ChainReport::default());
        Ok(self.chains.len() - 1)
    }

    /// Replace the solve configuration. Takes effect on the next frame.
    ///
    /// # Errors
    ///
    /// Returns any error from [`IkConfig::validate`]; the old config is kept.
    pub fn reconfigure(&mut self, config: IkConfig) -> Result<(), ConfigError> {
        config.validate()?;
        info!(
            "marionette-ik: reconfigured: {} λ={} α={} K={}",
            config.method, config.damping, config.step_gain, config.sub_iterations
        );
        self.config = config;
        Ok(())
    }

    /// Replace the skeleton and every chain. On error the rig is unchanged.
    ///
    /// # Errors
    ///
    /// Returns any error from [`IkRig::from_config`].
    pub fn swap_model(
        &mut self,
        skeleton: Skeleton,
        rig: &RigConfig,
    ) -> Result<(), MarionetteError> {
        *self = Self::from_config(skeleton, rig)?;
        Ok(())
    }

    /// Set the target of the named chain. Returns `false` if no such chain
    /// exists or the target was rejected as non-finite.
    pub fn set_target(&mut self, name: &str, target: Vector3<f32>) -> bool {
        self.chains
            .iter_mut()
            .find(|c| c.name() == name)
            .is_some_and(|c| c.set_target_position(target))
    }

    /// Set the target of the chain at `index`. Same return as
    /// [`IkRig::set_target`].
    pub fn set_target_at(&mut self, index: usize, target: Vector3<f32>) -> bool {
        self.chains
            .get_mut(index)
            .is_some_and(|c| c.set_target_position(target))
    }

    /// Relax every chain toward its target, then refresh world matrices.
    pub fn solve_frame(&mut self) {
        for (chain, report) in self.chains.iter().zip(self.reports.iter_mut()) {
            *report = relax_chain(chain, &mut self.skeleton, &self.config);
        }
        self.skeleton.update_world_matrices();
    }

    /// Per-chain residuals from the last frame, in chain order.
    pub fn residuals(&self) -> impl Iterator<Item = (&str, Vector3<f32>)> + '_ {
        self.chains
            .iter()
            .zip(&self.reports)
            .map(|(c, r)| (c.name(), r.residual))
    }

    /// Per-chain reports from the last frame, in chain order.
    pub fn reports(&self) -> &[ChainReport] {
        &self.reports
    }

    /// Report of the named chain from the last frame.
    pub fn report(&self, name: &str) -> Option<&ChainReport> {
        self.index_of(name).map(|i| &self.reports[i])
    }

    /// Every chain, in insertion order.
    pub fn chains(&self) -> &[KinematicChain] {
        &self.chains
    }

    /// The named chain.
    pub fn chain(&self, name: &str) -> Option<&KinematicChain> {
        self.index_of(name).map(|i| &self.chains[i])
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.chains.iter().position(|c| c.name() == name)
    }

    /// The driven skeleton.
    pub fn skeleton(&self) -> &Skeleton {
        &self.skeleton
    }

    /// Mutable skeleton access. Callers that edit rotations should expect
    /// the cached world matrices to lag until the next frame.
    pub fn skeleton_mut(&mut self) -> &mut Skeleton {
        &mut self.skeleton
    }

    /// The active solve configuration.
    pub fn config(&self) -> &IkConfig {
        &self.config
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

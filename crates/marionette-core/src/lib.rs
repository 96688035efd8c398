//! marionette-core: skeleton arena, configuration, errors and system ordering
//! for Marionette IK rigs.

pub mod config;
pub mod error;
pub mod presets;
pub mod skeleton;

use bevy::prelude::*;

// ---------------------------------------------------------------------------
// MarionetteSet
// ---------------------------------------------------------------------------

/// Per-frame system ordering.
///
/// Targets are written first, then every chain is solved and the skeleton's
/// world matrices refreshed.
#[derive(SystemSet, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarionetteSet {
    /// Target sources write chain targets.
    Target,
    /// Chains relax toward their targets.
    Solve,
}

// ---------------------------------------------------------------------------
// MarionetteCorePlugin
// ---------------------------------------------------------------------------

/// Configures [`MarionetteSet`] ordering in `Update`.
pub struct MarionetteCorePlugin;

impl Plugin for MarionetteCorePlugin {
    fn build(&self, app: &mut App) {
        app.configure_sets(
            Update,
            (MarionetteSet::Target, MarionetteSet::Solve).chain(),
        );
    }
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

pub mod prelude {
    pub use crate::{
        MarionetteCorePlugin, MarionetteSet,
        config::{ChainConfig, IkConfig, JointLimitConfig, RigConfig, SolveMethod},
        error::{ChainError, ConfigError, MarionetteError, SkeletonError},
        skeleton::{Bone, BoneId, Skeleton},
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plugin_builds_without_panic() {
        let mut app = App::new();
        app.add_plugins(MarionetteCorePlugin);
        app.finish();
        app.cleanup();
        app.update();
        // The solver plugin owns the config resource.
        assert!(app.world().get_resource::<config::IkConfig>().is_none());
    }
}

//! Bevy ECS integration for the IK rig.
//!
//! Provides [`MarionetteIkPlugin`], which pulls targets from an optional
//! [`IkTargetSource`] and relaxes the [`IkRig`] resource once per frame.
//!
//! # Usage
//!
//! 1. Add [`MarionetteCorePlugin`](marionette_core::MarionetteCorePlugin) and
//!    [`MarionetteIkPlugin`] to your app.
//! 2. Insert an [`IkRig`] resource, e.g. from [`IkRig::from_config`].
//! 3. Optionally insert an [`IkTargetSource`], or set targets on the rig
//!    directly before [`MarionetteSet::Solve`] runs.
//!
//! The [`IkConfig`] resource mirrors the rig's active configuration. Editing
//! it reconfigures the rig on the next frame; an invalid edit is reverted.

use bevy::log::{debug, warn};
use bevy::prelude::*;

use marionette_core::MarionetteSet;
use marionette_core::config::IkConfig;

use crate::rig::IkRig;
use crate::targets::{TargetSource, apply_targets};

/// Bevy plugin that adds target and solve systems and owns the [`IkConfig`]
/// resource.
///
/// Targets are written in [`MarionetteSet::Target`], chains are relaxed in
/// [`MarionetteSet::Solve`].
pub struct MarionetteIkPlugin;

impl Plugin for MarionetteIkPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<IkConfig>()
            .add_systems(Update, target_update_system.in_set(MarionetteSet::Target))
            .add_systems(Update, ik_solve_system.in_set(MarionetteSet::Solve));
    }
}

/// Resource wrapping the active target source.
#[derive(Resource)]
pub struct IkTargetSource(pub Box<dyn TargetSource>);

impl IkTargetSource {
    /// Box `source` for insertion as a resource.
    pub fn new(source: impl TargetSource) -> Self {
        Self(Box::new(source))
    }
}

/// Pull this frame's targets into the rig.
#[allow(clippy::needless_pass_by_value)]
pub fn target_update_system(rig: Option<ResMut<IkRig>>, source: Option<ResMut<IkTargetSource>>) {
    let (Some(mut rig), Some(mut source)) = (rig, source) else {
        return;
    };
    let rejected = apply_targets(source.0.as_mut(), &mut rig);
    if rejected > 0 {
        debug!("marionette-ik: {rejected} targets rejected this frame");
    }
}

/// Relax every chain of the rig and refresh its world matrices.
///
/// Edits to the [`IkConfig`] resource made since the last frame are
/// forwarded to the rig. A freshly inserted rig keeps its own config. The
/// resource is then overwritten with whatever the rig runs, so later
/// single-field edits start from the rig's values.
#[allow(clippy::needless_pass_by_value)]
pub fn ik_solve_system(rig: Option<ResMut<IkRig>>, mut config: ResMut<IkConfig>) {
    let Some(mut rig) = rig else {
        return;
    };
    let edited = config.is_changed() && !config.is_added() && !rig.is_added();
    if edited && *config != *rig.config() {
        if let Err(e) = rig.reconfigure(*config) {
            warn!("marionette-ik: ignoring invalid IkConfig: {e}");
        }
    }
    if *config != *rig.config() {
        *config.bypass_change_detection() = *rig.config();
    }
    rig.solve_frame();
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Jacobian inverse kinematics for Marionette skeleton rigs.
//!
//! Drives the local rotations of bones in a [`Skeleton`](marionette_core::skeleton::Skeleton)
//! arena so that each chain's end effector follows a world-space target.
//! Every frame, every chain is relaxed for a fixed number of sub-iterations
//! of Jacobian → angle update → sanitize → apply and clamp.
//!
//! # Architecture
//!
//! ```text
//! RigConfig ──► KinematicChain ──► compute_jacobian ──► solve ──► relax_chain
//!                     │                                              │
//!                     └──────────────── IkRig ◄──────────────────────┘
//! ```
//!
//! [`IkRig`] owns the skeleton and its chains; [`MarionetteIkPlugin`] runs
//! it inside a Bevy app.

pub mod chain;
pub mod constraint;
pub mod controller;
pub mod jacobian;
pub mod plugin;
pub mod rig;
pub mod solver;
pub mod targets;

pub use chain::{ChainJoint, KinematicChain};
pub use constraint::{AngleRange, JointConstraint};
pub use controller::{ChainReport, relax_chain};
pub use jacobian::{Jacobian, compute_jacobian};
pub use plugin::{IkTargetSource, MarionetteIkPlugin};
pub use rig::IkRig;
pub use solver::{IkStep, angle_update, sanitize_deltas, solve};
pub use targets::{StaticTargets, TargetSource, WaveformTargets};

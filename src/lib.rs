//! Tier-bounded rig embedding for GLB avatars.
//!
//! Given a GLB 2.0 container and a subscription tier, [`rig::RigPipeline`]
//! synthesizes a bone hierarchy, per-vertex skin weights and morph-target
//! deltas sized to the tier budget and writes them into a new container as
//! appended binary data plus one document extension. The input document is
//! carried over unchanged.

pub mod error;
pub mod glb;
pub mod rig;
pub mod settings;
pub mod tier;

#[cfg(test)]
mod fixtures;

pub use error::RigError;

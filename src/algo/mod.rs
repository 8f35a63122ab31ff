//! Geometric algorithms on spherical meshes.
//!
//! This module contains the antimeridian remesh engine, which repairs
//! meshes whose cells straddle the ±180° seam. Downstream projection and
//! texturing require a true topological seam (duplicated boundary points,
//! disconnected east/west halves) rather than cells whose vertices jump
//! from +179° to −179°.

pub mod remesh;

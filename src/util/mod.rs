//! Shared utilities for the precompute passes.
//!
//! Low-discrepancy sampling, GGX importance sampling and the Smith geometry
//! term used by both the specular prefilter and the BRDF integration.

pub mod sampling;

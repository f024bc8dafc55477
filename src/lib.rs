// -- Lint policy ---------------------------------------------------------
// This is the single source of truth for crate-wide lints.

// Broad lint groups
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::nursery)]
// Documentation
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]
#![deny(rustdoc::bare_urls)]
// No panicking in library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
// No debug/print artifacts
#![deny(clippy::dbg_macro)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]
// Import hygiene
#![deny(clippy::wildcard_imports)]
// Complexity limits (thresholds in clippy.toml)
#![deny(clippy::cognitive_complexity)]
#![deny(clippy::too_many_lines)]
#![deny(clippy::excessive_nesting)]
// Function signature hygiene
#![deny(clippy::too_many_arguments)]
#![deny(clippy::fn_params_excessive_bools)]
// Clone / pass-by-value hygiene
#![deny(clippy::needless_pass_by_value)]
#![deny(clippy::implicit_clone)]
// String hygiene
#![deny(clippy::inefficient_to_string)]
#![deny(clippy::redundant_closure_for_method_calls)]
#![deny(clippy::manual_string_new)]
#![deny(clippy::str_to_string)]
// Cargo lints (warn, not deny since cargo lints can be noisy)
#![warn(clippy::cargo)]
// Unused / redundant code
#![deny(unused_results)]
#![deny(unused_qualifications)]
// Cast hygiene
#![deny(trivial_casts)]
#![deny(trivial_numeric_casts)]

//! Image-based lighting precomputation for physically based renderers.
//!
//! Turns one equirectangular HDR panorama into the four inputs of split-sum
//! IBL shading: an environment cubemap, a diffuse irradiance map, a
//! roughness-indexed prefiltered specular map and a BRDF lookup table.
//!
//! # Key entry points
//!
//! - [`dataset::IblDataset`] - owns the maps and their lifecycle
//! - [`panorama::Panorama`] - validated input panorama
//! - [`options::Options`] - resolutions, mip counts and sample budgets
//! - [`passes`] - the individual precompute passes
//! - [`gpu`] - wgpu upload and bind group for the shading stage
//!
//! # Architecture
//!
//! Every pass is a per-texel program dispatched through a
//! [`passes::PassExecutor`] into a reusable [`passes::CaptureTarget`]; the
//! default [`passes::HostExecutor`] spreads texels over the rayon pool. The
//! BRDF LUT has no environment dependency, runs concurrently with the
//! environment passes, is retained across environment swaps and can be
//! cached on disk ([`cache`]).

pub mod cache;
pub mod cube;
pub mod dataset;
pub mod error;
pub mod gpu;
pub mod options;
pub mod panorama;
pub mod passes;
pub mod util;

pub use dataset::{DatasetState, IblBindings, IblDataset, ShadingInputs};
pub use error::IblError;
pub use options::Options;
pub use panorama::Panorama;

use std::path::PathBuf;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Split-sum BRDF lookup table settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[schemars(title = "BRDF LUT", inline)]
#[serde(default)]
pub struct BrdfOptions {
    /// Edge length of the LUT (NdotV along x, roughness along y).
    #[schemars(title = "LUT Size", range(min = 1, max = 4096))]
    pub size: u32,
    /// GGX samples integrated per texel.
    #[schemars(title = "Samples", range(min = 1, max = 65536))]
    pub sample_count: u32,
    /// Where the LUT is cached between runs; `None` disables caching.
    #[schemars(skip)]
    pub cache_path: Option<PathBuf>,
}

impl Default for BrdfOptions {
    fn default() -> Self {
        Self {
            size: 512,
            sample_count: 1024,
            cache_path: None,
        }
    }
}

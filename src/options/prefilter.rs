use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Largest accepted per-texel sample count of any pass.
pub const MAX_SAMPLE_COUNT: u32 = 65536;

/// Per-mip GGX sample count for the specular prefilter.
///
/// Rougher mips widen the reflection lobe and need more samples to
/// converge, so the count grows geometrically from `min_samples` at
/// roughness 0 to `max_samples` at roughness 1.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[schemars(title = "Sample Budget", inline)]
#[serde(default)]
pub struct SampleBudget {
    /// Samples at roughness 0.
    #[schemars(title = "Min Samples", range(min = 1, max = 65536))]
    pub min_samples: u32,
    /// Samples at roughness 1.
    #[schemars(title = "Max Samples", range(min = 1, max = 65536))]
    pub max_samples: u32,
}

impl Default for SampleBudget {
    fn default() -> Self {
        Self {
            min_samples: 32,
            max_samples: 1024,
        }
    }
}

impl SampleBudget {
    /// A budget that uses `samples` at every roughness.
    #[must_use]
    pub const fn fixed(samples: u32) -> Self {
        Self {
            min_samples: samples,
            max_samples: samples,
        }
    }

    /// Sample count for `roughness` (clamped to `[0, 1]`). Never decreases
    /// as roughness grows.
    #[must_use]
    pub fn samples_for(&self, roughness: f32) -> u32 {
        let r = roughness.clamp(0.0, 1.0);
        let min = self.min_samples.max(1) as f32;
        let max = self.max_samples.max(self.min_samples).max(1) as f32;
        let samples = (min * (max / min).powf(r)).round() as u32;
        samples.clamp(self.min_samples.max(1), self.max_samples.max(1))
    }
}

/// Specular prefilter settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[schemars(title = "Specular Prefilter", inline)]
#[serde(default)]
pub struct PrefilterOptions {
    /// Edge length of mip 0.
    #[schemars(title = "Base Size", range(min = 1, max = 2048))]
    pub base_size: u32,
    /// Number of roughness levels; mip `m` holds roughness `m / (N - 1)`.
    #[schemars(title = "Mip Count", range(min = 1, max = 12))]
    pub mip_count: u32,
    /// GGX samples per texel as a function of roughness.
    pub samples: SampleBudget,
}

impl Default for PrefilterOptions {
    fn default() -> Self {
        Self {
            base_size: 128,
            mip_count: 5,
            samples: SampleBudget::default(),
        }
    }
}

impl PrefilterOptions {
    /// Roughness encoded by mip `mip`.
    #[must_use]
    pub fn roughness_for_mip(&self, mip: u32) -> f32 {
        if self.mip_count <= 1 {
            0.0
        } else {
            mip as f32 / (self.mip_count - 1) as f32
        }
    }
}

//! Centralized precompute options with TOML preset support.
//!
//! Resolutions, mip counts and sample budgets of every pass are
//! consolidated here. All of them are tunable: the defaults trade quality
//! for precompute time on a typical desktop.

mod brdf;
mod cubemap;
mod irradiance;
mod prefilter;

use std::path::Path;

pub use brdf::BrdfOptions;
pub use cubemap::CubemapOptions;
pub use irradiance::{IrradianceOptions, MIN_SAMPLE_DELTA};
pub use prefilter::{PrefilterOptions, SampleBudget, MAX_SAMPLE_COUNT};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::cube::full_mip_count;
use crate::error::IblError;

/// Top-level options container. All sub-structs use `#[serde(default)]` so
/// partial TOML files (e.g. only overriding `[prefilter]`) work correctly.
#[derive(
    Debug, Clone, Serialize, Deserialize, PartialEq, Default, JsonSchema,
)]
#[serde(default)]
pub struct Options {
    /// Environment cubemap capture.
    pub cubemap: CubemapOptions,
    /// Diffuse irradiance convolution.
    pub irradiance: IrradianceOptions,
    /// Specular prefilter mip chain.
    pub prefilter: PrefilterOptions,
    /// BRDF lookup table.
    pub brdf: BrdfOptions,
}

impl Options {
    /// Generate JSON Schema describing the options.
    #[must_use]
    pub fn json_schema() -> schemars::Schema {
        schemars::schema_for!(Options)
    }

    /// Load options from a TOML file. Missing fields use defaults.
    ///
    /// # Errors
    ///
    /// Returns [`IblError::Io`] if the file cannot be read and
    /// [`IblError::OptionsParse`] if it is not valid TOML for `Options`.
    pub fn load(path: &Path) -> Result<Self, IblError> {
        let content = std::fs::read_to_string(path).map_err(IblError::Io)?;
        toml::from_str(&content)
            .map_err(|e| IblError::OptionsParse(e.to_string()))
    }

    /// Save options to a TOML file (pretty-printed).
    ///
    /// # Errors
    ///
    /// Returns [`IblError::OptionsParse`] if serialization fails and
    /// [`IblError::Io`] if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), IblError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| IblError::OptionsParse(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(IblError::Io)?;
        }
        std::fs::write(path, content).map_err(IblError::Io)
    }

    /// Check that the options describe a runnable pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`IblError::InvalidOptions`] describing the first problem
    /// found.
    pub fn validate(&self) -> Result<(), IblError> {
        let invalid = |msg: String| Err(IblError::InvalidOptions(msg));

        if self.cubemap.face_size == 0 {
            return invalid("cubemap.face_size must be non-zero".to_owned());
        }
        if self.irradiance.size == 0 {
            return invalid("irradiance.size must be non-zero".to_owned());
        }
        let delta = self.irradiance.sample_delta;
        if !(delta.is_finite() && delta >= MIN_SAMPLE_DELTA) {
            return invalid(format!(
                "irradiance.sample_delta must be at least {MIN_SAMPLE_DELTA}, \
                 got {delta}"
            ));
        }
        let prefilter = &self.prefilter;
        if prefilter.base_size == 0 || prefilter.mip_count == 0 {
            return invalid(
                "prefilter.base_size and prefilter.mip_count must be non-zero"
                    .to_owned(),
            );
        }
        if prefilter.mip_count > full_mip_count(prefilter.base_size) {
            return invalid(format!(
                "prefilter.mip_count {} exceeds the {} levels of a {}² face",
                prefilter.mip_count,
                full_mip_count(prefilter.base_size),
                prefilter.base_size
            ));
        }
        let budget = prefilter.samples;
        if budget.min_samples == 0
            || budget.min_samples > budget.max_samples
            || budget.max_samples > MAX_SAMPLE_COUNT
        {
            return invalid(format!(
                "prefilter.samples must satisfy 0 < min <= max <= \
                 {MAX_SAMPLE_COUNT}, got {}..{}",
                budget.min_samples, budget.max_samples
            ));
        }
        if self.brdf.size == 0 || self.brdf.sample_count == 0 {
            return invalid(
                "brdf.size and brdf.sample_count must be non-zero".to_owned(),
            );
        }
        if self.brdf.sample_count > MAX_SAMPLE_COUNT {
            return invalid(format!(
                "brdf.sample_count must be at most {MAX_SAMPLE_COUNT}, got {}",
                self.brdf.sample_count
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_round_trips_through_toml() {
        let opts = Options::default();
        let toml_str = toml::to_string_pretty(&opts).unwrap();
        let parsed: Options = toml::from_str(&toml_str).unwrap();
        assert_eq!(opts, parsed);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let toml_str = r"
[prefilter]
mip_count = 6

[prefilter.samples]
max_samples = 2048
";
        let opts: Options = toml::from_str(toml_str).unwrap();
        assert_eq!(opts.prefilter.mip_count, 6);
        assert_eq!(opts.prefilter.samples.max_samples, 2048);
        // Everything else should be default
        assert_eq!(opts.prefilter.samples.min_samples, 32);
        assert_eq!(opts.prefilter.base_size, 128);
        assert_eq!(opts.cubemap.face_size, 1024);
        assert_eq!(opts.irradiance.size, 32);
        assert_eq!(opts.brdf.size, 512);
        assert!(opts.brdf.cache_path.is_none());
    }

    #[test]
    fn defaults_validate() {
        Options::default().validate().unwrap();
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut opts = Options::default();
        opts.prefilter.mip_count = 9; // 128² only has 8 levels
        assert!(matches!(opts.validate(), Err(IblError::InvalidOptions(_))));

        let mut opts = Options::default();
        opts.irradiance.sample_delta = 0.0;
        assert!(matches!(opts.validate(), Err(IblError::InvalidOptions(_))));

        let mut opts = Options::default();
        opts.prefilter.samples = SampleBudget {
            min_samples: 64,
            max_samples: 16,
        };
        assert!(matches!(opts.validate(), Err(IblError::InvalidOptions(_))));

        let mut opts = Options::default();
        opts.cubemap.face_size = 0;
        assert!(matches!(opts.validate(), Err(IblError::InvalidOptions(_))));
    }

    #[test]
    fn validate_rejects_unbounded_sample_work() {
        let mut opts = Options::default();
        opts.irradiance.sample_delta = 1e-5;
        assert!(matches!(opts.validate(), Err(IblError::InvalidOptions(_))));

        let mut opts = Options::default();
        opts.irradiance.sample_delta = MIN_SAMPLE_DELTA;
        opts.validate().unwrap();

        let mut opts = Options::default();
        opts.prefilter.samples.max_samples = MAX_SAMPLE_COUNT + 1;
        assert!(matches!(opts.validate(), Err(IblError::InvalidOptions(_))));

        let mut opts = Options::default();
        opts.brdf.sample_count = u32::MAX;
        assert!(matches!(opts.validate(), Err(IblError::InvalidOptions(_))));
    }

    #[test]
    fn sample_budget_grows_with_roughness() {
        let budget = SampleBudget::default();
        assert_eq!(budget.samples_for(0.0), 32);
        assert_eq!(budget.samples_for(1.0), 1024);
        let mut previous = 0;
        for step in 0..=20 {
            let samples = budget.samples_for(step as f32 / 20.0);
            assert!(samples >= previous);
            previous = samples;
        }
        assert_eq!(SampleBudget::fixed(7).samples_for(0.5), 7);
    }

    #[test]
    fn roughness_for_mip_spans_unit_range() {
        let prefilter = PrefilterOptions::default();
        assert_eq!(prefilter.roughness_for_mip(0), 0.0);
        assert_eq!(prefilter.roughness_for_mip(4), 1.0);
        assert_eq!(prefilter.roughness_for_mip(2), 0.5);
    }

    #[test]
    fn schema_has_expected_properties() {
        let schema_value =
            serde_json::to_value(Options::json_schema()).unwrap();
        let props = schema_value["properties"].as_object().unwrap();

        assert!(props.contains_key("cubemap"));
        assert!(props.contains_key("irradiance"));
        assert!(props.contains_key("prefilter"));
        assert!(props.contains_key("brdf"));

        // The cache location is a deployment detail, not a tunable.
        let brdf = &props["brdf"]["properties"];
        assert!(brdf.get("size").is_some());
        assert!(brdf.get("cache_path").is_none());
    }

    #[test]
    fn save_and_load_preset() {
        let dir = std::env::temp_dir()
            .join(format!("ibl-bake-options-{}", std::process::id()));
        let path = dir.join("preset.toml");
        let mut opts = Options::default();
        opts.irradiance.size = 16;
        opts.save(&path).unwrap();
        let loaded = Options::load(&path).unwrap();
        assert_eq!(loaded, opts);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}

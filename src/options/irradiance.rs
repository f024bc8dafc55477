use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Smallest accepted hemisphere integration step, in radians.
pub const MIN_SAMPLE_DELTA: f32 = 0.001;

/// Diffuse irradiance convolution settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[schemars(title = "Irradiance", inline)]
#[serde(default)]
pub struct IrradianceOptions {
    /// Edge length of each irradiance face. Irradiance varies slowly with
    /// direction, so this stays small.
    #[schemars(title = "Face Size", range(min = 1, max = 256))]
    pub size: u32,
    /// Angular step (radians) of the hemisphere integration, in both
    /// azimuth and elevation.
    #[schemars(title = "Sample Step", range(min = 0.001, max = 0.5))]
    pub sample_delta: f32,
}

impl Default for IrradianceOptions {
    fn default() -> Self {
        Self {
            size: 32,
            sample_delta: 0.025,
        }
    }
}

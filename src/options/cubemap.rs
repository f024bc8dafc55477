use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Environment cubemap capture settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[schemars(title = "Environment Cubemap", inline)]
#[serde(default)]
pub struct CubemapOptions {
    /// Edge length of each face of the captured environment, in texels.
    #[schemars(title = "Face Size", range(min = 1, max = 8192))]
    pub face_size: u32,
}

impl Default for CubemapOptions {
    fn default() -> Self {
        Self { face_size: 1024 }
    }
}

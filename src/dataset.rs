//! The IBL dataset: lifecycle, ownership and binding of precomputed maps.
//!
//! ```text
//! Empty ──begin_loading──▶ Loading ──precompute──▶ Precomputing ──▶ Ready
//!   ▲                                                   │             │
//!   └──────────────── failure / abort ◀─────────────────┘             │
//!   └──────────── Releasing ◀── release / replace environment ◀───────┘
//! ```
//!
//! The dataset exclusively owns the environment cubemap, irradiance map and
//! prefiltered map of the current environment. They are released together
//! whenever the environment is replaced, released, or a precompute fails,
//! so a `Ready` dataset never mixes maps of different environments. The
//! BRDF LUT does not depend on the environment and survives all of these.

use std::fmt;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use glam::{Vec2, Vec3};

use crate::cache;
use crate::error::IblError;
use crate::gpu::{GpuIblTextures, RenderContext};
use crate::options::{BrdfOptions, Options};
use crate::panorama::Panorama;
use crate::passes::brdf::{self, BrdfLut};
use crate::passes::equirect::{self, EnvironmentCubemap};
use crate::passes::irradiance::{self, IrradianceMap};
use crate::passes::prefilter::{self, PrefilteredSpecularMap};
use crate::passes::{CancelToken, HostExecutor, PassContext, PassExecutor};

/// Lifecycle state of an [`IblDataset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatasetState {
    /// No environment loaded.
    Empty,
    /// Panorama decode in flight.
    Loading,
    /// Passes running; nothing is bindable.
    Precomputing,
    /// All four maps valid and bindable.
    Ready,
    /// Environment resources being dropped.
    Releasing,
}

impl fmt::Display for DatasetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Empty => "empty",
            Self::Loading => "loading",
            Self::Precomputing => "precomputing",
            Self::Ready => "ready",
            Self::Releasing => "releasing",
        };
        f.write_str(name)
    }
}

/// Per-environment maps, created and released as a unit.
pub struct EnvironmentResources {
    /// Source radiance with a full mip chain.
    pub environment: EnvironmentCubemap,
    /// Diffuse irradiance.
    pub irradiance: IrradianceMap,
    /// Roughness-indexed specular.
    pub prefiltered: PrefilteredSpecularMap,
}

/// Read-only view of a `Ready` dataset for the shading stage.
#[derive(Clone, Copy)]
pub struct IblBindings<'a> {
    resources: &'a EnvironmentResources,
    brdf: &'a BrdfLut,
    gpu: Option<&'a GpuIblTextures>,
}

impl<'a> IblBindings<'a> {
    /// Diffuse irradiance map.
    #[must_use]
    pub fn irradiance_map(&self) -> &'a IrradianceMap {
        &self.resources.irradiance
    }

    /// Prefiltered specular map.
    #[must_use]
    pub fn prefiltered_map(&self) -> &'a PrefilteredSpecularMap {
        &self.resources.prefiltered
    }

    /// Environment radiance (for skybox rendering).
    #[must_use]
    pub fn environment(&self) -> &'a EnvironmentCubemap {
        &self.resources.environment
    }

    /// Split-sum BRDF LUT.
    #[must_use]
    pub fn brdf_lut(&self) -> &'a BrdfLut {
        self.brdf
    }

    /// Uploaded GPU textures, if [`IblDataset::upload`] succeeded.
    #[must_use]
    pub fn gpu(&self) -> Option<&'a GpuIblTextures> {
        self.gpu
    }

    /// Number of roughness levels in the prefiltered map.
    #[must_use]
    pub fn mip_count(&self) -> u32 {
        self.resources.prefiltered.mip_count()
    }

    /// `roughness * (mip_count - 1)`.
    #[must_use]
    pub fn prefilter_lod(&self, roughness: f32) -> f32 {
        self.resources.prefiltered.lod_for_roughness(roughness)
    }

    /// Irradiance for surface normal `n`.
    #[must_use]
    pub fn irradiance(&self, n: Vec3) -> Vec3 {
        self.resources.irradiance.sample(n)
    }

    /// Prefiltered radiance along reflection vector `r`.
    #[must_use]
    pub fn prefiltered(&self, r: Vec3, roughness: f32) -> Vec3 {
        self.resources.prefiltered.sample(r, roughness)
    }

    /// `(scale, bias)` from the BRDF LUT.
    #[must_use]
    pub fn brdf(&self, n_dot_v: f32, roughness: f32) -> Vec2 {
        self.brdf.sample(n_dot_v, roughness)
    }
}

/// What the shading stage should use for ambient lighting.
#[derive(Clone, Copy)]
pub enum ShadingInputs<'a> {
    /// The dataset is `Ready`.
    Ibl(IblBindings<'a>),
    /// Fallback while no environment is ready.
    FlatAmbient(Vec3),
}

impl ShadingInputs<'_> {
    /// Diffuse ambient term for normal `n`.
    #[must_use]
    pub fn ambient_diffuse(&self, n: Vec3) -> Vec3 {
        match self {
            Self::Ibl(bindings) => bindings.irradiance(n),
            Self::FlatAmbient(color) => *color,
        }
    }

    /// Whether image-based lighting is available.
    #[must_use]
    pub fn is_ibl(&self) -> bool {
        matches!(self, Self::Ibl(_))
    }
}

/// Result of one pipeline run: the LUT may survive an environment failure.
struct PipelineOutput {
    brdf: Option<Arc<BrdfLut>>,
    environment: Result<EnvironmentResources, IblError>,
}

/// Inputs of one pipeline run, owned so the run can move to a worker.
struct PipelineJob {
    options: Options,
    executor: Arc<dyn PassExecutor>,
    cancel: CancelToken,
    brdf: Option<Arc<BrdfLut>>,
}

impl PipelineJob {
    fn run(&self, panorama: &Panorama) -> PipelineOutput {
        let start = Instant::now();
        let ctx = PassContext {
            executor: self.executor.as_ref(),
            cancel: &self.cancel,
        };
        if let Err(e) = self.options.validate() {
            return PipelineOutput {
                brdf: self.brdf.clone(),
                environment: Err(e),
            };
        }

        let (environment, brdf) = rayon::join(
            || build_environment(panorama, &self.options, &ctx),
            || match &self.brdf {
                Some(lut) => Ok(Arc::clone(lut)),
                None => obtain_brdf(&self.options.brdf, &ctx).map(Arc::new),
            },
        );

        let (brdf, environment) = match (brdf, environment) {
            (Ok(lut), env) => (Some(lut), env),
            (Err(e), Ok(_)) => (None, Err(e)),
            (Err(brdf_err), Err(env_err)) => {
                log::warn!("BRDF integration also failed: {brdf_err}");
                (None, Err(env_err))
            }
        };
        if environment.is_ok() {
            log::info!("IBL precompute finished in {:.1?}", start.elapsed());
        }
        PipelineOutput { brdf, environment }
    }
}

fn build_environment(
    panorama: &Panorama,
    options: &Options,
    ctx: &PassContext<'_>,
) -> Result<EnvironmentResources, IblError> {
    let environment = equirect::convert(panorama, options.cubemap.face_size, ctx)?;
    let (irradiance, prefiltered) = rayon::join(
        || {
            irradiance::convolve(
                &environment,
                options.irradiance.size,
                options.irradiance.sample_delta,
                ctx,
            )
        },
        || prefilter::prefilter(&environment, &options.prefilter, ctx),
    );
    Ok(EnvironmentResources {
        irradiance: irradiance?,
        prefiltered: prefiltered?,
        environment,
    })
}

/// Load the LUT from the cache when configured, otherwise integrate it
/// (and refresh the cache).
fn obtain_brdf(
    options: &BrdfOptions,
    ctx: &PassContext<'_>,
) -> Result<BrdfLut, IblError> {
    if let Some(path) = &options.cache_path {
        match cache::load(path, options.size, options.sample_count) {
            Ok(Some(lut)) => return Ok(lut),
            Ok(None) => {}
            Err(e) => log::warn!(
                "ignoring BRDF cache {}: {e}",
                path.display()
            ),
        }
    }
    let lut = brdf::integrate(options.size, options.sample_count, ctx)?;
    if let Some(path) = &options.cache_path {
        if let Err(e) = cache::save(path, &lut) {
            log::warn!("could not write BRDF cache {}: {e}", path.display());
        }
    }
    Ok(lut)
}

/// Owner of all IBL resources for one renderer.
pub struct IblDataset {
    options: Options,
    executor: Arc<dyn PassExecutor>,
    cancel: CancelToken,
    state: DatasetState,
    environment: Option<EnvironmentResources>,
    brdf: Option<Arc<BrdfLut>>,
    gpu: Option<GpuIblTextures>,
    worker: Option<JoinHandle<PipelineOutput>>,
}

impl IblDataset {
    /// An empty dataset that runs its passes on the host thread pool.
    #[must_use]
    pub fn new(options: Options) -> Self {
        Self::with_executor(options, Arc::new(HostExecutor))
    }

    /// An empty dataset dispatching passes through `executor`.
    #[must_use]
    pub fn with_executor(
        options: Options,
        executor: Arc<dyn PassExecutor>,
    ) -> Self {
        Self {
            options,
            executor,
            cancel: CancelToken::new(),
            state: DatasetState::Empty,
            environment: None,
            brdf: None,
            gpu: None,
            worker: None,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> DatasetState {
        self.state
    }

    /// Options the dataset precomputes with.
    #[must_use]
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Token that aborts the running precompute from another thread.
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// The retained BRDF LUT, if one has been computed or loaded.
    #[must_use]
    pub fn brdf_lut(&self) -> Option<&BrdfLut> {
        self.brdf.as_deref()
    }

    /// Mark a panorama decode as in flight. Only `Empty` moves to
    /// `Loading`; a `Ready` dataset stays bindable until its replacement
    /// starts precomputing.
    pub fn begin_loading(&mut self) {
        self.settle();
        if self.state == DatasetState::Empty {
            self.state = DatasetState::Loading;
        }
    }

    /// Run `decode` (typically an HDR file decoder) as the `Loading` step,
    /// then precompute the decoded panorama.
    ///
    /// # Errors
    ///
    /// Propagates the decode error (leaving a previously `Loading` dataset
    /// `Empty`) or any [`IblDataset::precompute`] error.
    pub fn load<F>(&mut self, decode: F) -> Result<(), IblError>
    where
        F: FnOnce() -> Result<Panorama, IblError>,
    {
        self.begin_loading();
        match decode() {
            Ok(panorama) => self.precompute(&panorama),
            Err(e) => {
                log::warn!("panorama decode failed: {e}");
                if self.state == DatasetState::Loading {
                    self.state = DatasetState::Empty;
                }
                Err(e)
            }
        }
    }

    /// Precompute all maps for `panorama`, blocking until done.
    ///
    /// Waits for any background precompute first and releases the previous
    /// environment before starting.
    ///
    /// # Errors
    ///
    /// Returns [`IblError::InvalidOptions`], [`IblError::PrecomputeFailed`]
    /// naming the failing stage, [`IblError::ResourceAllocationFailed`] or
    /// [`IblError::Aborted`]. In every case the dataset ends up `Empty`.
    pub fn precompute(&mut self, panorama: &Panorama) -> Result<(), IblError> {
        let job = self.prepare();
        let output = job.run(panorama);
        self.install(output)
    }

    /// Start precomputing `panorama` on a background thread. The dataset is
    /// `Precomputing` until [`IblDataset::poll`] or [`IblDataset::wait`]
    /// collects the result.
    ///
    /// # Errors
    ///
    /// Returns [`IblError::ThreadSpawn`] if the worker thread could not be
    /// started; the dataset is then `Empty`.
    pub fn start_precompute(&mut self, panorama: Panorama) -> Result<(), IblError> {
        let job = self.prepare();
        let spawned = std::thread::Builder::new()
            .name("ibl-precompute".into())
            .spawn(move || job.run(&panorama));
        match spawned {
            Ok(handle) => {
                self.worker = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.state = DatasetState::Empty;
                Err(IblError::ThreadSpawn(e))
            }
        }
    }

    /// Collect a finished background precompute without blocking. Returns
    /// `None` if none is in flight or it is still running.
    pub fn poll(&mut self) -> Option<Result<(), IblError>> {
        if self.worker.as_ref().is_some_and(JoinHandle::is_finished) {
            self.join_worker()
        } else {
            None
        }
    }

    /// Block until the background precompute (if any) finishes and install
    /// its result.
    ///
    /// # Errors
    ///
    /// Returns the error the background precompute failed with.
    pub fn wait(&mut self) -> Result<(), IblError> {
        self.join_worker().unwrap_or(Ok(()))
    }

    /// Cancel the running precompute. In-flight passes finish, later ones
    /// are never dispatched, and the dataset ends up `Empty` (keeping the
    /// BRDF LUT if it completed). A `Ready` dataset is unaffected.
    pub fn abort(&mut self) {
        if self.state != DatasetState::Precomputing {
            return;
        }
        self.cancel.cancel();
        if let Some(handle) = self.worker.take() {
            if let Ok(output) = handle.join() {
                if output.brdf.is_some() {
                    self.brdf = output.brdf;
                }
            }
        }
        log::info!("IBL precompute aborted");
        self.state = DatasetState::Empty;
    }

    /// Drop the environment maps and their GPU textures. The BRDF LUT is
    /// kept.
    pub fn release(&mut self) {
        self.abort();
        self.settle();
        self.release_environment();
        self.state = DatasetState::Empty;
    }

    /// Shading-stage view of the maps.
    ///
    /// # Errors
    ///
    /// Returns [`IblError::NotReady`] with the current state unless the
    /// dataset is `Ready`.
    pub fn bind(&self) -> Result<IblBindings<'_>, IblError> {
        match (self.state, &self.environment, &self.brdf) {
            (DatasetState::Ready, Some(resources), Some(brdf)) => {
                Ok(IblBindings {
                    resources,
                    brdf,
                    gpu: self.gpu.as_ref(),
                })
            }
            (state, ..) => Err(IblError::NotReady(state)),
        }
    }

    /// IBL bindings when `Ready`, otherwise the flat ambient fallback.
    #[must_use]
    pub fn shading_inputs(&self, flat_ambient: Vec3) -> ShadingInputs<'_> {
        self.bind()
            .map_or(ShadingInputs::FlatAmbient(flat_ambient), ShadingInputs::Ibl)
    }

    /// Upload the maps of a `Ready` dataset to the GPU, replacing any
    /// previous upload. A failed upload leaves the host maps `Ready`.
    ///
    /// # Errors
    ///
    /// Returns [`IblError::NotReady`] unless `Ready` and
    /// [`IblError::ResourceAllocationFailed`] if texture creation fails.
    pub fn upload(
        &mut self,
        ctx: &RenderContext,
    ) -> Result<&GpuIblTextures, IblError> {
        let (resources, brdf) = match (self.state, &self.environment, &self.brdf)
        {
            (DatasetState::Ready, Some(resources), Some(brdf)) => {
                (resources, brdf)
            }
            (state, ..) => return Err(IblError::NotReady(state)),
        };
        self.gpu = None;
        let textures = GpuIblTextures::new(
            ctx,
            &resources.environment,
            &resources.irradiance,
            &resources.prefiltered,
            brdf,
        )?;
        let textures: &GpuIblTextures = self.gpu.insert(textures);
        Ok(textures)
    }

    /// Uploaded textures, if any.
    #[must_use]
    pub fn gpu_textures(&self) -> Option<&GpuIblTextures> {
        self.gpu.as_ref()
    }

    /// Common preamble of both precompute flavours.
    fn prepare(&mut self) -> PipelineJob {
        self.settle();
        self.release_environment();
        self.cancel.reset();
        self.state = DatasetState::Precomputing;
        log::debug!("IBL dataset precomputing");
        PipelineJob {
            options: self.options.clone(),
            executor: Arc::clone(&self.executor),
            cancel: self.cancel.clone(),
            brdf: self.brdf.clone(),
        }
    }

    fn install(&mut self, output: PipelineOutput) -> Result<(), IblError> {
        if output.brdf.is_some() {
            self.brdf = output.brdf;
        }
        match output.environment {
            Ok(resources) => {
                self.environment = Some(resources);
                self.state = DatasetState::Ready;
                log::debug!("IBL dataset ready");
                Ok(())
            }
            Err(e) => {
                log::warn!("IBL precompute failed: {e}");
                self.environment = None;
                self.state = DatasetState::Empty;
                Err(e)
            }
        }
    }

    fn join_worker(&mut self) -> Option<Result<(), IblError>> {
        let handle = self.worker.take()?;
        Some(match handle.join() {
            Ok(output) => self.install(output),
            Err(_) => {
                self.state = DatasetState::Empty;
                Err(IblError::WorkerLost)
            }
        })
    }

    /// Finish any background precompute before changing state. Its
    /// outcome was superseded by the caller, so a failure is only logged.
    fn settle(&mut self) {
        if let Some(Err(e)) = self.join_worker() {
            log::warn!("superseded background precompute failed: {e}");
        }
    }

    fn release_environment(&mut self) {
        if self.environment.is_none() && self.gpu.is_none() {
            return;
        }
        let previous = self.state;
        self.state = DatasetState::Releasing;
        self.gpu = None;
        self.environment = None;
        log::debug!("released IBL environment (was {previous})");
        self.state = DatasetState::Empty;
    }
}

impl Drop for IblDataset {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

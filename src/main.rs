use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use ibl_bake::cube::CubeFace;
use ibl_bake::gpu::RenderContext;
use ibl_bake::passes::{brdf, CancelToken, HostExecutor, PassContext};
use ibl_bake::{cache, IblDataset, IblError, Options, Panorama};

/// Precompute image-based lighting maps from an HDR panorama
#[derive(Parser)]
#[command(name = "ibl-bake", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full pipeline on an equirectangular HDR/EXR panorama
    Bake {
        /// Panorama to bake
        panorama: PathBuf,
        /// TOML options preset
        #[arg(long)]
        options: Option<PathBuf>,
        /// Read/write the BRDF LUT cache at this path
        #[arg(long)]
        brdf_cache: Option<PathBuf>,
        /// Also upload the maps to a headless GPU device
        #[arg(long)]
        gpu: bool,
    },
    /// Compute the BRDF LUT and write it as a cache file
    Brdf {
        /// Output cache file
        out: PathBuf,
        /// TOML options preset (only `[brdf]` is used)
        #[arg(long)]
        options: Option<PathBuf>,
    },
    /// Write the default options as a TOML preset
    Preset {
        /// Output TOML file
        out: PathBuf,
    },
    /// Print the JSON schema of the options file
    Schema,
}

fn load_options(path: Option<&Path>) -> Result<Options, IblError> {
    let options = match path {
        Some(path) => Options::load(path)?,
        None => Options::default(),
    };
    options.validate()?;
    Ok(options)
}

fn decode_panorama(path: &Path) -> Result<Panorama, IblError> {
    let img = image::open(path).map_err(|e| {
        IblError::InvalidInput(format!("{}: {e}", path.display()))
    })?;
    let rgb = img.to_rgb32f();
    log::info!(
        "decoded {} ({}x{})",
        path.display(),
        rgb.width(),
        rgb.height()
    );
    Panorama::new(rgb.width(), rgb.height(), 3, rgb.as_raw())
}

fn bake(
    panorama: &Path,
    options: Option<&Path>,
    brdf_cache: Option<PathBuf>,
    gpu: bool,
) -> Result<(), IblError> {
    let mut options = load_options(options)?;
    if brdf_cache.is_some() {
        options.brdf.cache_path = brdf_cache;
    }

    let mut dataset = IblDataset::new(options);
    dataset.load(|| decode_panorama(panorama))?;

    let bindings = dataset.bind()?;
    for face in CubeFace::ALL {
        let avg = bindings.irradiance_map().face_average(face);
        log::info!(
            "irradiance {face}: ({:.4}, {:.4}, {:.4})",
            avg.x,
            avg.y,
            avg.z
        );
    }
    let corner = bindings.brdf(1.0, 0.0);
    log::info!(
        "BRDF LUT (NdotV=1, roughness=0): scale {:.4}, bias {:.4}",
        corner.x,
        corner.y
    );

    if gpu {
        let ctx = pollster::block_on(RenderContext::headless())?;
        let textures = dataset.upload(&ctx)?;
        log::info!(
            "GPU bind group ready ({} prefilter mips)",
            textures.mip_count()
        );
    }
    dataset.release();
    Ok(())
}

fn bake_brdf(out: &Path, options: Option<&Path>) -> Result<(), IblError> {
    let options = load_options(options)?;
    let cancel = CancelToken::new();
    let ctx = PassContext {
        executor: &HostExecutor,
        cancel: &cancel,
    };
    let lut = brdf::integrate(options.brdf.size, options.brdf.sample_count, &ctx)?;
    cache::save(out, &lut)
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
    .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Bake {
            panorama,
            options,
            brdf_cache,
            gpu,
        } => bake(&panorama, options.as_deref(), brdf_cache, gpu),
        Command::Brdf { out, options } => bake_brdf(&out, options.as_deref()),
        Command::Preset { out } => Options::default().save(&out),
        Command::Schema => serde_json::to_string_pretty(&Options::json_schema())
            .map(|schema| println!("{schema}"))
            .map_err(|e| IblError::OptionsParse(e.to_string())),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

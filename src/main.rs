//! Interactive Surface Touch
//!
//! Command line front end for projector calibration.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use surface_touch::calibration::{CalibrationEngine, CameraMatrix};
use surface_touch::config::SurfaceConfig;
use surface_touch::export::{CalibrationExporter, CalibrationReport};

#[derive(Parser)]
#[command(name = "surface-touch")]
#[command(about = "Projector calibration for depth-sensor touch surfaces")]
#[command(version)]
struct Cli {
    /// Configuration file (JSON or XML). Defaults to the user config directory.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Calibrate from a display points file and a world points file
    Calibrate {
        /// Display points, one `x, y` per line (default from config)
        #[arg(long)]
        image: Option<PathBuf>,

        /// World points, one `x, y, z` per line (default from config)
        #[arg(long)]
        world: Option<PathBuf>,

        /// Known intrinsics `fx,fy,px,py`; only the pose is solved
        #[arg(long, value_parser = parse_intrinsics)]
        intrinsics: Option<CameraMatrix>,

        /// Write the calibration report here (.json or .xml)
        #[arg(short, long)]
        export: Option<PathBuf>,
    },

    /// Calibrate from a finger-point calibration document
    CalibrateXml {
        /// Document with CALIB_READ records
        #[arg(short, long)]
        file: PathBuf,

        /// Exchange world Y and Z on load
        #[arg(long)]
        swap_yz: bool,

        /// Known intrinsics `fx,fy,px,py`; only the pose is solved
        #[arg(long, value_parser = parse_intrinsics)]
        intrinsics: Option<CameraMatrix>,

        /// Write the calibration report here (.json or .xml)
        #[arg(short, long)]
        export: Option<PathBuf>,
    },
}

fn parse_intrinsics(s: &str) -> Result<CameraMatrix, String> {
    let values: Vec<f64> = s
        .split(',')
        .map(|v| v.trim().parse::<f64>().map_err(|e| format!("'{}': {}", v.trim(), e)))
        .collect::<Result<_, _>>()?;
    match values.as_slice() {
        [fx, fy, px, py] => Ok(CameraMatrix::new(*fx, *fy, *px, *py)),
        _ => Err(format!("expected fx,fy,px,py, got {} values", values.len())),
    }
}

fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> surface_touch::Result<()> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Calibrate {
            image,
            world,
            intrinsics,
            export,
        } => {
            let image = image.unwrap_or_else(|| config.image_points_path.clone());
            let world = world.unwrap_or_else(|| config.world_points_path.clone());

            let mut engine = CalibrationEngine::new(config.projector_width, config.projector_height)
                .with_swap_yz(config.swap_yz);
            let count = engine.load_points(&image, &world)?;
            log::info!("Loaded {} correspondences", count);
            solve_and_report(&mut engine, intrinsics.as_ref(), export.as_deref())
        }
        Commands::CalibrateXml {
            file,
            swap_yz,
            intrinsics,
            export,
        } => {
            let mut engine = CalibrationEngine::new(config.projector_width, config.projector_height)
                .with_swap_yz(swap_yz || config.swap_yz);
            engine.load_finger_tip_points(&file)?;
            solve_and_report(&mut engine, intrinsics.as_ref(), export.as_deref())
        }
    }
}

fn load_config(path: Option<&Path>) -> surface_touch::Result<SurfaceConfig> {
    match path {
        Some(path) => SurfaceConfig::load(path),
        None => match SurfaceConfig::default_path().filter(|p| p.exists()) {
            Some(path) => SurfaceConfig::load(&path),
            None => Ok(SurfaceConfig::default()),
        },
    }
}

fn solve_and_report(
    engine: &mut CalibrationEngine,
    intrinsics: Option<&CameraMatrix>,
    export: Option<&Path>,
) -> surface_touch::Result<()> {
    match intrinsics {
        Some(camera) => engine.correct_camera_pnp(camera)?,
        None => engine.correct_camera()?,
    };

    let report = CalibrationReport::from_engine(engine)?;
    let p = &report.params;
    println!("throw ratio   {:.4} x {:.4}", p.throw_ratio_x, p.throw_ratio_y);
    println!("lens offset   {:.4}, {:.4}", p.lens_offset_x, p.lens_offset_y);
    println!(
        "translation   {:.2}, {:.2}, {:.2}",
        p.translation_x, p.translation_y, p.translation_z
    );
    println!(
        "rotation      {:.3}, {:.3}, {:.3} deg",
        p.rotation_x, p.rotation_y, p.rotation_z
    );
    println!("rms error     {:.3} px", report.rms_error);

    let reprojection = engine.reprojection()?;
    if let Some((worst, err)) = reprojection
        .errors
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
    {
        println!("worst point   #{} ({:.3} px)", worst, err);
    }

    if let Some(path) = export {
        CalibrationExporter::export(&report, path)?;
    }
    Ok(())
}

//! Raytrace entrypoint: loads a scene file, runs the job, writes the image.
use anyhow::{Context, Result};
use clap::Parser;
use core_config::load_scene;
use core_runtime::run_job;
use core_shading::reference_shader;
use std::path::{Path, PathBuf};
use std::sync::Once;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "raytrace", version, about = "Distributed scene raytracing coordinator")]
struct Args {
    /// Path to the scene configuration file (TOML).
    pub scene: PathBuf,
    /// Directory rendered images are written under.
    #[arg(long = "out", default_value = "renders")]
    pub out_dir: PathBuf,
    /// Number of cooperating ranks (rank 0 coordinates, the rest are workers).
    #[arg(long = "procs", default_value_t = 1)]
    pub procs: u32,
}

struct AppStartup {
    log_guard: Option<WorkerGuard>,
}

impl AppStartup {
    fn new() -> Self {
        Self { log_guard: None }
    }

    fn configure_logging(&mut self) {
        let log_dir = Path::new(".");
        let log_path = log_dir.join("raytrace.log");
        if log_path.exists() {
            let _ = std::fs::remove_file(&log_path);
        }

        let file_appender = tracing_appender::rolling::never(log_dir, "raytrace.log");
        let (nb_writer, guard) = tracing_appender::non_blocking(file_appender);
        match tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_writer(nb_writer)
            .try_init()
        {
            Ok(_) => self.log_guard = Some(guard),
            Err(_err) => {
                // Global subscriber already installed (e.g. under a test harness); drop guard.
            }
        }
    }

    fn install_panic_hook() {
        static HOOK: Once = Once::new();
        HOOK.call_once(|| {
            let default_panic = std::panic::take_hook();
            std::panic::set_hook(Box::new(move |info| {
                tracing::error!(target: "runtime.panic", ?info, "panic");
                default_panic(info);
            }));
        });
    }
}

fn main() -> Result<()> {
    let mut startup = AppStartup::new();
    startup.configure_logging();
    AppStartup::install_panic_hook();

    let args = Args::parse();
    info!(target: "runtime", scene = %args.scene.display(), out_dir = %args.out_dir.display(), "startup");

    let mut config = load_scene(&args.scene)
        .with_context(|| format!("failed to load scene {}", args.scene.display()))?;
    config.proc_count = args.procs;

    let output_path = run_job(&config, &args.out_dir, reference_shader)
        .with_context(|| format!("job failed for scene {}", args.scene.display()))?;

    info!(target: "runtime", path = %output_path.display(), "job_complete");
    println!("wrote {}", output_path.display());
    Ok(())
}

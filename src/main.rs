use clap::{ArgGroup, Parser};
use recon::sfm::ReusePolicy;
use recon::{InputSource, Pipeline, PipelineConfig, PipelineResult};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "recon")]
#[command(about = "Reconstruct a normalized GLB mesh from photos or a video", long_about = None)]
#[command(group(ArgGroup::new("source").required(true).args(["images", "video"])))]
struct Cli {
    /// Folder of input photographs
    #[arg(long)]
    images: Option<PathBuf>,

    /// Video file to sample frames from
    #[arg(long)]
    video: Option<PathBuf>,

    /// Frames per second sampled from the video
    #[arg(long, default_value_t = 2.0)]
    fps: f64,

    /// Longest side of extracted frames, in pixels
    #[arg(long, default_value_t = 2048)]
    max_size: u32,

    /// Run workspace (default: <outputs-dir>/run-<timestamp>)
    #[arg(long)]
    workspace: Option<PathBuf>,

    #[arg(long, default_value = "outputs")]
    outputs_dir: PathBuf,

    #[arg(long, default_value = "colmap")]
    colmap_bin: String,

    #[arg(long, default_value = "ffmpeg")]
    ffmpeg_bin: String,

    /// Octree depth of the surface reconstruction
    #[arg(long, default_value_t = 10)]
    poisson_depth: usize,

    /// Triangle budget after decimation
    #[arg(long, default_value_t = 50_000)]
    target_triangles: usize,

    /// File name of the mesh written under meshes/
    #[arg(long, default_value = "model.glb")]
    glb_name: String,

    /// Skip SfM/MVS when dense/fused.ply already exists
    #[arg(long)]
    reuse: bool,

    /// Only reuse when the stored input fingerprint still matches
    #[arg(long, requires = "reuse")]
    strict_reuse: bool,

    /// Copy the mesh into the web viewer's public folder
    #[arg(long)]
    export_public: bool,

    #[arg(long, default_value = "public/models/generated.glb")]
    public_path: PathBuf,

    /// Package the built viewer and the mesh into this folder
    #[arg(long)]
    page_output: Option<PathBuf>,

    /// Built viewer assets
    #[arg(long, default_value = "dist")]
    dist_dir: PathBuf,

    /// CPU threads for the geometry stages
    #[arg(long)]
    threads: Option<usize>,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn reuse_policy(&self) -> ReusePolicy {
        match (self.reuse, self.strict_reuse) {
            (false, _) => ReusePolicy::Off,
            (true, false) => ReusePolicy::Presence,
            (true, true) => ReusePolicy::Fingerprint,
        }
    }

    fn into_config(self) -> PipelineConfig {
        let reuse = self.reuse_policy();
        // clap guarantees exactly one of the two is set
        let input = match self.video {
            Some(video) => InputSource::Video(video),
            None => InputSource::Images(self.images.unwrap_or_default()),
        };
        PipelineConfig {
            input,
            workspace: self.workspace,
            outputs_dir: self.outputs_dir,
            fps: self.fps,
            max_size: self.max_size,
            colmap_bin: self.colmap_bin,
            ffmpeg_bin: self.ffmpeg_bin,
            poisson_depth: self.poisson_depth,
            target_triangles: self.target_triangles,
            glb_name: self.glb_name,
            reuse,
            export_public: self.export_public,
            public_path: self.public_path,
            page_output: self.page_output,
            dist_dir: self.dist_dir,
        }
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn print_summary(result: &PipelineResult) {
    println!("Workspace: {}", result.workspace.display());
    println!("GLB: {}", result.glb_path.display());
    if let Some(public) = &result.public_path {
        println!("Public copy: {}", public.display());
    }
    if let Some(viewer) = &result.viewer {
        println!("Viewer package: {}", viewer.dir.display());
        println!("Viewer hint: {}", viewer.hint_file.display());
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match recon::init_thread_pool(cli.threads) {
        Ok(size) => tracing::debug!(?size, threads = recon::core::current_cpu_threads(), "CPU pool ready"),
        Err(e) => tracing::warn!("thread pool: {}", e),
    }

    match Pipeline::new(cli.into_config()).run() {
        Ok(result) => {
            print_summary(&result);
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("Error: {}", err);
            ExitCode::from(err.exit_code())
        }
    }
}

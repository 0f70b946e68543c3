//! roadtwin: road-scan chunk fusion from the command line.
//!
//! # Commands
//!
//! - `roadtwin run` - clean every chunk of a job and fuse the survivors
//! - `roadtwin clean <MESH> <OUTPUT>` - clean a single chunk
//! - `roadtwin stitch <FIXED> <MOVING> <OUTPUT>` - merge two meshes
//! - `roadtwin inspect <FILES>...` - print what a mesh file contains
//!
//! Logging goes to stderr. `RUST_LOG` takes precedence over `-v`.

mod commands;
mod inspect;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use road_io::MeshFormat;
use tracing_subscriber::EnvFilter;

/// Road-scan digital twin pipeline
#[derive(Parser)]
#[command(name = "roadtwin")]
#[command(about = "Clean and fuse photogrammetry road chunks", long_about = None)]
#[command(version)]
struct Cli {
    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clean every chunk of a job, stitch the survivors, export the result
    Run(RunArgs),

    /// Clean one chunk file
    Clean {
        /// Raw chunk mesh
        mesh: PathBuf,
        /// Where to write the cleaned mesh (.ply or .obj)
        output: PathBuf,
        /// Truth-mask point cloud bounding the trusted region
        #[arg(long)]
        mask: Option<PathBuf>,
        /// Pipeline configuration (JSON)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Skip pruning and flattening
        #[arg(long)]
        fast: bool,
    },

    /// Align MOVING onto FIXED and merge them
    Stitch {
        /// Mesh that stays put
        fixed: PathBuf,
        /// Mesh that is aligned and appended
        moving: PathBuf,
        /// Where to write the merged mesh
        output: PathBuf,
        /// Pipeline configuration (JSON)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Coarse feature alignment before ICP
        #[arg(long)]
        full: bool,
    },

    /// Print vertex and face counts, bounds and colors of mesh files
    Inspect {
        /// Files to inspect
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

#[derive(Args)]
pub(crate) struct RunArgs {
    /// Chunk manifest (JSON) listing meshes and truth masks in order
    #[arg(long, conflicts_with = "meshes")]
    manifest: Option<PathBuf>,

    /// Chunk meshes in stitching order, paired with masks by file prefix
    #[arg(long = "mesh", num_args = 1.., required_unless_present = "manifest")]
    meshes: Vec<PathBuf>,

    /// Truth-mask clouds for --mesh pairing
    #[arg(long = "mask", num_args = 1..)]
    masks: Vec<PathBuf>,

    /// Pipeline configuration (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Job id, also the output subdirectory
    #[arg(long, default_value = "job_001")]
    job_id: String,

    /// Output directory (overrides the configuration)
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Final artifact format (overrides the configuration)
    #[arg(long, value_enum)]
    format: Option<FormatArg>,

    /// Coarse feature alignment before ICP for every fold
    #[arg(long)]
    full: bool,

    /// Keep the job's work directory
    #[arg(long)]
    keep_intermediates: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FormatArg {
    Ply,
    Obj,
}

impl From<FormatArg> for MeshFormat {
    fn from(format: FormatArg) -> Self {
        match format {
            FormatArg::Ply => Self::Ply,
            FormatArg::Obj => Self::Obj,
        }
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Run(args) => commands::run(args),
        Commands::Clean {
            mesh,
            output,
            mask,
            config,
            fast,
        } => commands::clean(&mesh, &output, mask.as_deref(), config.as_deref(), fast),
        Commands::Stitch {
            fixed,
            moving,
            output,
            config,
            full,
        } => commands::stitch(&fixed, &moving, &output, config.as_deref(), full),
        Commands::Inspect { files } => inspect::run(&files),
    }
}

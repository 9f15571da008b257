use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "stagebridge")]
#[command(version)]
#[command(about = "Expands scene documents into a renderer node graph")]
pub struct CliArgs {
    /// Scene documents, strongest first, separated like the entries of PATH.
    #[arg(long, env = "STAGEBRIDGE_SCENE")]
    pub scene: String,

    #[arg(long, default_value = "/")]
    pub object_path: String,

    /// Override documents in the order session, variants, state, visibility, purpose.
    #[arg(long = "override", num_args = 1, value_name = "FILE")]
    pub overrides: Vec<PathBuf>,

    /// Motion sample times, the first frame only if none are given.
    #[arg(long = "frame", num_args = 1)]
    pub frames: Vec<f32>,

    #[arg(long)]
    pub motion_start: Option<f32>,

    #[arg(long)]
    pub motion_end: Option<f32>,

    #[arg(long, default_value_t = default_threads())]
    pub threads: usize,

    #[command(subcommand)]
    pub operation_mode: OperationMode,
}

pub fn default_threads() -> usize {
    std::thread::available_parallelism()
        .map(|threads| threads.get())
        .unwrap_or(1)
}

#[derive(Subcommand, Debug)]
pub enum OperationMode {
    /// Expands the object path recursively and prints what has been created.
    Expand {
        /// Print every node instead of a count per node type.
        #[arg(long)]
        list: bool,
    },
    /// Prints the shader or material assigned to each object.
    Assignments {
        objects: Vec<String>,
        #[arg(long, default_value = "defaultRenderLayer")]
        layer: String,
        #[arg(long, default_value = "shader")]
        target: String,
    },
}

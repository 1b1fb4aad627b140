use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

use imgest::{FrameErrorPolicy, ImageFormat, ReadMode, StreamMode};

#[derive(Parser, Debug)]
#[command(name = "imgest")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Decode images from files, buffers and byte streams", long_about = None)]
pub struct Cli {
    /// JSON options file; flags given here override it
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Number of decode workers
    #[arg(short, long, global = true)]
    pub workers: Option<usize>,

    /// Raise log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Decode each input as a single image
    Decode {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// unchanged, grayscale, color, any-depth, any-color, reduced-color-2, ...
        #[arg(short, long)]
        mode: Option<ReadMode>,

        /// Decode as this format instead of sniffing
        #[arg(short, long)]
        format: Option<ImageFormat>,

        #[arg(long)]
        json: bool,
    },

    /// Decode every frame of a TIFF, GIF or APNG file
    Demux {
        input: PathBuf,

        #[arg(short, long)]
        mode: Option<ReadMode>,

        #[arg(long)]
        json: bool,
    },

    /// Decode a concatenated image stream from a file or stdin
    Stream {
        /// File to read; `-` or absent reads stdin
        input: Option<PathBuf>,

        /// framed, whole or per-write
        #[arg(long)]
        stream_mode: Option<StreamMode>,

        /// continue or abort
        #[arg(long)]
        on_error: Option<FrameErrorPolicy>,

        #[arg(long)]
        chunk_size: Option<usize>,

        #[arg(long)]
        json: bool,
    },
}

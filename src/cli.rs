use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "livedash")]
#[command(author, version, about = "Live DASH packager")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Package elementary stream files into DASH segments and a manifest
    Package {
        /// ADTS AAC input file
        #[arg(long)]
        audio: Option<PathBuf>,

        /// Annex-B video input file
        #[arg(long)]
        video: Option<PathBuf>,

        /// Video codec of the Annex-B input
        #[arg(long, default_value = "h264", value_parser = ["h264", "h265"])]
        codec: String,

        /// Video width advertised in the manifest
        #[arg(long, default_value = "1280")]
        width: u32,

        /// Video height advertised in the manifest
        #[arg(long, default_value = "720")]
        height: u32,

        /// Video frame rate used to timestamp access units
        #[arg(long, default_value = "30")]
        fps: u32,

        /// Bitrate advertised for every track, in bits per second
        #[arg(long)]
        bitrate: Option<u64>,

        /// Output folder (overrides the config file)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}

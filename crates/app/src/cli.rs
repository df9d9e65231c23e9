use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "tethercast")]
#[command(version)]
#[command(about = "Stream a tethered camera into a virtual video device")]
pub struct Cli {
    /// V4L2 loopback device to write frames into
    #[arg(short = 'd', long, value_name = "PATH")]
    pub output_device: Option<PathBuf>,

    /// Output width in pixels
    #[arg(long)]
    pub width: Option<u32>,

    /// Output height in pixels
    #[arg(long)]
    pub height: Option<u32>,

    /// Pad or crop so the capture aspect ratio survives scaling
    #[arg(long, value_name = "BOOL")]
    pub preserve_aspect: Option<bool>,

    /// Keep polling until a camera shows up instead of failing fast
    #[arg(short = 'w', long)]
    pub wait_for_device: bool,

    /// Exit once nothing has read the output device for this many minutes
    #[arg(long, value_name = "MINUTES")]
    pub idle_timeout: Option<u64>,

    /// Configuration file
    #[arg(short = 'c', long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

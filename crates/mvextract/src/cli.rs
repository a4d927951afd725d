use std::path::PathBuf;

use clap::{Parser, Subcommand};

use mvextract_core::RtspTransport;

#[derive(Parser)]
#[command(name = "mvextract", about = "H.264 frame and motion-vector extractor")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Decode video files or RTSP streams and extract motion vectors.
    Extract {
        /// Video files or RTSP URLs. Several inputs are read in parallel.
        #[arg(required = true)]
        urls: Vec<String>,

        /// Dump frames, motion vectors and timestamps into this directory
        /// (default: out-<unix seconds>).
        #[arg(long)]
        dump: Option<Option<PathBuf>>,

        /// Stop after this many frames per input.
        #[arg(short, long)]
        max_frames: Option<u64>,

        /// RTSP transport: tcp, udp, udp_multicast or http.
        #[arg(short, long, default_value_t = RtspTransport::Tcp)]
        transport: RtspTransport,

        /// Connect and read timeout for network inputs, in milliseconds.
        #[arg(long, default_value_t = 5000)]
        timeout_ms: u64,

        /// Decoder threads (default: one per CPU core).
        #[arg(long)]
        threads: Option<usize>,

        /// TrueType font for the text header of dumped frames.
        #[arg(long)]
        font: Option<PathBuf>,

        /// Do not draw motion vectors onto dumped frames.
        #[arg(long)]
        no_arrows: bool,
    },
    /// Convert a raw 64-bit NTP timestamp to Unix time and back.
    Ntp {
        /// Raw timestamp, decimal or 0x-prefixed hex.
        #[arg(value_parser = parse_raw_ntp)]
        raw: u64,
    },
}

fn parse_raw_ntp(s: &str) -> Result<u64, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid NTP timestamp '{s}': {e}"))
}

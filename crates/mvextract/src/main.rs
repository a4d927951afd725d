mod cli;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::Parser;
use tracing::{error, info};

use mvextract_core::ntp::{NtpTimestamp, WallClock};
use mvextract_core::pipeline::{ExtractConfig, ExtractionSummary};
use mvextract_core::CaptureConfig;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = cli::Cli::parse();

    match cli.command {
        cli::Command::Extract {
            urls,
            dump,
            max_frames,
            transport,
            timeout_ms,
            threads,
            font,
            no_arrows,
        } => {
            let config = ExtractConfig {
                capture: CaptureConfig {
                    transport,
                    connect_timeout: Duration::from_millis(timeout_ms),
                    thread_count: threads,
                    ..CaptureConfig::default()
                },
                max_frames,
                dump_dir: dump.map(|dir| dir.unwrap_or_else(default_dump_dir)),
                font_path: font,
                draw_arrows: !no_arrows,
            };
            info!(streams = urls.len(), dump_dir = ?config.dump_dir, "starting extraction");

            let results = extract(&urls, &config)?;

            let mut failed = 0;
            for (url, result) in urls.iter().zip(results) {
                match result {
                    Ok(summary) => report(&summary),
                    Err(e) => {
                        failed += 1;
                        error!(url = %url, error = %format!("{e:#}"), "extraction failed");
                    }
                }
            }
            if failed > 0 {
                bail!("{failed} of {} inputs failed", urls.len());
            }
            Ok(())
        }
        cli::Command::Ntp { raw } => {
            let ntp = NtpTimestamp::from_raw(raw);
            let wall = ntp.to_wall_clock();
            let back = NtpTimestamp::from_wall_clock(wall);
            println!("ntp        {ntp}");
            println!("unix       {wall}");
            println!("round trip {back}");
            Ok(())
        }
    }
}

fn default_dump_dir() -> PathBuf {
    PathBuf::from(format!("out-{}", WallClock::now().seconds))
}

#[cfg(feature = "ffmpeg")]
fn extract(urls: &[String], config: &ExtractConfig) -> Result<Vec<Result<ExtractionSummary>>> {
    use mvextract_core::pipeline;
    use mvextract_core::video::FfmpegBackend;

    if let [url] = urls {
        let backend = FfmpegBackend::new()?;
        return Ok(vec![pipeline::run_extraction(backend, url, config)]);
    }
    Ok(pipeline::run_parallel(urls, config, || {
        Ok(FfmpegBackend::new()?)
    }))
}

#[cfg(not(feature = "ffmpeg"))]
fn extract(_urls: &[String], _config: &ExtractConfig) -> Result<Vec<Result<ExtractionSummary>>> {
    bail!("mvextract was built without the `ffmpeg` feature; rebuild with `--features ffmpeg`")
}

fn report(summary: &ExtractionSummary) {
    let types: Vec<String> = summary
        .frame_types
        .iter()
        .map(|(kind, count)| format!("{kind}:{count}"))
        .collect();
    info!(
        url = %summary.url,
        frames = summary.frames,
        frame_types = %types.join(" "),
        motion_vectors = summary.motion_vectors,
        mean_read_latency = ?summary.mean_read_latency,
        stop_reason = ?summary.stop_reason,
        "extraction summary"
    );
}

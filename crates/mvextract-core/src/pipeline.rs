use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use prost::Message;
use tracing::{debug, info, warn};

use mvextract_proto::proto::FrameRecord;

use crate::config::CaptureConfig;
use crate::debug::DebugRenderer;
use crate::error::CaptureError;
use crate::video::{Backend, Retrieved, VideoCap};

const FRAMES_DIR: &str = "frames";
const RECORDS_FILE: &str = "motion_vectors.pb";
const TIMESTAMPS_FILE: &str = "timestamps.txt";
const FRAME_TYPES_FILE: &str = "frame_types.txt";

/// Parameters for an extraction run.
#[derive(Debug, Clone)]
pub struct ExtractConfig {
    pub capture: CaptureConfig,
    /// Stop after this many frames, or None to read until the input ends.
    pub max_frames: Option<u64>,
    /// Directory to dump frames, motion vectors and timestamps into, or None
    /// to only collect statistics.
    pub dump_dir: Option<PathBuf>,
    /// TrueType font for the text header of dumped frames.
    pub font_path: Option<PathBuf>,
    /// Draw motion vectors onto dumped frames.
    pub draw_arrows: bool,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            capture: CaptureConfig::default(),
            max_frames: None,
            dump_dir: None,
            font_path: None,
            draw_arrows: true,
        }
    }
}

/// Statistics of one extraction run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractionSummary {
    pub url: String,
    pub frames: u64,
    /// Frame count per picture type character.
    pub frame_types: BTreeMap<char, u64>,
    pub motion_vectors: u64,
    pub mean_read_latency: Duration,
    /// Why reading stopped, None if the frame limit was reached.
    pub stop_reason: Option<String>,
}

/// Open `url` and read frames until the input ends or `max_frames` is reached.
pub fn run_extraction<B: Backend>(
    backend: B,
    url: &str,
    config: &ExtractConfig,
) -> Result<ExtractionSummary> {
    info!(
        url,
        max_frames = ?config.max_frames,
        dump_dir = ?config.dump_dir,
        transport = %config.capture.transport,
        "extraction starting"
    );

    let mut dumper = config
        .dump_dir
        .as_deref()
        .map(|dir| Dumper::create(dir, url, config))
        .transpose()?;

    let mut cap = VideoCap::new(backend, config.capture.clone());
    cap.open(url)
        .with_context(|| format!("failed to open capture for {url}"))?;

    let mut summary = ExtractionSummary {
        url: url.to_string(),
        ..ExtractionSummary::default()
    };
    let mut read_time = Duration::ZERO;

    loop {
        if let Some(max) = config.max_frames {
            if summary.frames >= max {
                info!(max, "frame limit reached");
                break;
            }
        }

        let started = Instant::now();
        let retrieved = match cap.read() {
            Ok(retrieved) => retrieved,
            Err(e) => {
                log_stop(&e, summary.frames);
                summary.stop_reason = Some(e.to_string());
                break;
            }
        };
        read_time += started.elapsed();

        summary.frames += 1;
        summary.motion_vectors += retrieved.motion_vectors.len() as u64;
        *summary
            .frame_types
            .entry(retrieved.frame_type.as_char())
            .or_default() += 1;

        debug!(
            frame_number = summary.frames,
            frame_type = %retrieved.frame_type,
            timestamp = retrieved.timestamp,
            motion_vectors = retrieved.motion_vectors.len(),
            "frame read"
        );

        if let Some(dumper) = dumper.as_mut() {
            dumper
                .write(&retrieved, summary.frames)
                .context("failed to dump frame")?;
        }
    }

    cap.release();
    if let Some(dumper) = dumper {
        dumper.finish()?;
    }

    if summary.frames > 0 {
        summary.mean_read_latency = read_time / summary.frames as u32;
    }
    info!(
        url,
        frames = summary.frames,
        motion_vectors = summary.motion_vectors,
        mean_read_latency = ?summary.mean_read_latency,
        "extraction complete"
    );
    Ok(summary)
}

/// Run one extraction per URL, each on its own thread with its own backend.
///
/// With a dump directory, stream `i` dumps into `<dir>/stream-<i>/`. Results
/// are returned in the order of `urls`.
pub fn run_parallel<B, F>(
    urls: &[String],
    config: &ExtractConfig,
    make_backend: F,
) -> Vec<Result<ExtractionSummary>>
where
    B: Backend,
    F: Fn() -> Result<B> + Sync,
{
    info!(streams = urls.len(), "starting parallel extraction");
    let make_backend = &make_backend;

    std::thread::scope(|scope| {
        let handles: Vec<_> = urls
            .iter()
            .enumerate()
            .map(|(i, url)| {
                let mut stream_config = config.clone();
                stream_config.dump_dir = config
                    .dump_dir
                    .as_ref()
                    .map(|dir| dir.join(format!("stream-{i}")));
                scope.spawn(move || {
                    let backend = make_backend()?;
                    run_extraction(backend, url, &stream_config)
                })
            })
            .collect();

        handles
            .into_iter()
            .enumerate()
            .map(|(i, handle)| {
                handle
                    .join()
                    .unwrap_or_else(|_| Err(anyhow!("extraction thread for stream {i} panicked")))
            })
            .collect()
    })
}

fn log_stop(error: &CaptureError, frames: u64) {
    match error {
        CaptureError::EndOfStream { .. } | CaptureError::RetryLimit { .. } => {
            info!(frames, reason = %error, "no more frames")
        }
        _ => warn!(frames, error = %error, "reading stopped on error"),
    }
}

/// Writes the per-frame outputs of one stream.
struct Dumper {
    url: String,
    frames_dir: PathBuf,
    renderer: DebugRenderer,
    records: BufWriter<File>,
    timestamps: BufWriter<File>,
    frame_types: BufWriter<File>,
}

impl Dumper {
    fn create(dir: &Path, url: &str, config: &ExtractConfig) -> Result<Self> {
        let frames_dir = dir.join(FRAMES_DIR);
        std::fs::create_dir_all(&frames_dir)
            .with_context(|| format!("failed to create {}", frames_dir.display()))?;
        info!(?dir, "dump directory ready");

        Ok(Self {
            url: url.to_string(),
            renderer: DebugRenderer::new(config.font_path.as_deref(), config.draw_arrows),
            frames_dir,
            records: create_file(&dir.join(RECORDS_FILE))?,
            timestamps: create_file(&dir.join(TIMESTAMPS_FILE))?,
            frame_types: create_file(&dir.join(FRAME_TYPES_FILE))?,
        })
    }

    fn write(&mut self, retrieved: &Retrieved<'_>, frame_number: u64) -> Result<()> {
        self.renderer
            .save_frame(retrieved, frame_number, &self.frames_dir)?;

        let record = FrameRecord {
            frame_number,
            frame_type: retrieved.frame_type.to_string(),
            timestamp: retrieved.timestamp,
            width: retrieved.frame.width(),
            height: retrieved.frame.height(),
            motion_vectors: retrieved.motion_vectors.iter().map(Into::into).collect(),
            source_url: self.url.clone(),
        };
        let mut buf = Vec::with_capacity(record.encoded_len() + 10);
        record
            .encode_length_delimited(&mut buf)
            .context("failed to encode FrameRecord")?;
        self.records.write_all(&buf)?;

        writeln!(self.timestamps, "{:.6}", retrieved.timestamp)?;
        writeln!(self.frame_types, "{}", retrieved.frame_type)?;
        Ok(())
    }

    fn finish(mut self) -> Result<()> {
        self.records.flush()?;
        self.timestamps.flush()?;
        self.frame_types.flush()?;
        debug!(url = %self.url, "dump files flushed");
        Ok(())
    }
}

fn create_file(path: &Path) -> Result<BufWriter<File>> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    Ok(BufWriter::new(file))
}

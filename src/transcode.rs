//! Video transcode step.
//!
//! Level 0 hard-links the source into the workspace unchanged. Levels 1-10
//! re-encode it with an external encoder, where a higher level means a smaller
//! file at lower quality.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{Result, SessionError};

pub const MIN_QUALITY_LEVEL: u8 = 0;
pub const MAX_QUALITY_LEVEL: u8 = 10;

/// CRF used for level 1; each further level adds ~3.667.
const BASE_CRF: f64 = 18.0;
const CRF_STEP: f64 = 3.6667;

/// A validated request to place `input` at `output` at a quality level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressionRequest {
    input: PathBuf,
    output: PathBuf,
    level: u8,
}

impl CompressionRequest {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>, level: i64) -> Result<Self> {
        let level = validate_level(level)?;
        Ok(Self {
            input: input.into(),
            output: output.into(),
            level,
        })
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    /// Whether this request re-encodes rather than links.
    pub fn compresses(&self) -> bool {
        self.level != 0
    }
}

/// Check that a quality level is within 0..=10.
pub fn validate_level(level: i64) -> Result<u8> {
    if (i64::from(MIN_QUALITY_LEVEL)..=i64::from(MAX_QUALITY_LEVEL)).contains(&level) {
        Ok(level as u8)
    } else {
        Err(SessionError::invalid(format!(
            "compression level must be between {} and {}, got {}",
            MIN_QUALITY_LEVEL, MAX_QUALITY_LEVEL, level
        )))
    }
}

/// Encoder quality parameter (x264 CRF) for levels 1-10: 18 at level 1, 51 at level 10.
pub fn quality_parameter(level: u8) -> u8 {
    let level = level.clamp(1, MAX_QUALITY_LEVEL);
    (BASE_CRF + (f64::from(level - 1) * CRF_STEP).round()) as u8
}

/// Something that can re-encode a video at a quality level.
#[async_trait]
pub trait Encoder: Send + Sync {
    /// Re-encode `request.input()` into `request.output()`, overwriting it.
    async fn transcode(&self, request: &CompressionRequest) -> Result<()>;
}

/// Encoder backed by the ffmpeg binary and libx264.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    binary: PathBuf,
    preset: String,
}

impl FfmpegEncoder {
    pub fn new(binary: impl Into<PathBuf>, preset: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            preset: preset.into(),
        }
    }

    /// Find ffmpeg at an explicit path or in PATH.
    pub fn find_binary(explicit: Option<&Path>) -> Option<PathBuf> {
        find_tool(explicit, "ffmpeg")
    }

    fn args(&self, request: &CompressionRequest) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-i".to_string(),
            request.input().to_string_lossy().to_string(),
            "-vcodec".to_string(),
            "libx264".to_string(),
            "-crf".to_string(),
            quality_parameter(request.level()).to_string(),
            "-preset".to_string(),
            self.preset.clone(),
            "-c:a".to_string(),
            "copy".to_string(),
            request.output().to_string_lossy().to_string(),
        ]
    }
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    async fn transcode(&self, request: &CompressionRequest) -> Result<()> {
        let args = self.args(request);
        debug!("Running {} {}", self.binary.display(), args.join(" "));

        let output = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| SessionError::tool("ffmpeg", format!("failed to execute: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("ffmpeg stderr: {}", stderr);
            return Err(SessionError::tool(
                "ffmpeg",
                format!("{}: {}", output.status, last_lines(&stderr, 5)),
            ));
        }

        Ok(())
    }
}

/// Place the source video into the workspace according to `request`.
///
/// Level 0 creates a hard link and never falls back to copying; a cross-device
/// link fails with a resource error instead.
pub async fn transcode<E: Encoder + ?Sized>(encoder: &E, request: &CompressionRequest) -> Result<()> {
    if !request.compresses() {
        info!(
            "Linking {} -> {}",
            request.input().display(),
            request.output().display()
        );
        return fs::hard_link(request.input(), request.output()).map_err(|e| {
            SessionError::resource(
                format!(
                    "Error linking {} into workspace (must be on the same filesystem)",
                    request.input().display()
                ),
                e,
            )
        });
    }

    info!(
        "Encoding {} at level {} (crf {})",
        request.input().display(),
        request.level(),
        quality_parameter(request.level())
    );
    encoder.transcode(request).await
}

/// Source and output sizes of a compression run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeReport {
    pub original: u64,
    pub compressed: u64,
}

impl SizeReport {
    pub fn measure(request: &CompressionRequest) -> Result<Self> {
        let size_of = |path: &Path| {
            fs::metadata(path).map(|m| m.len()).map_err(|e| {
                SessionError::resource(format!("Error reading size of {}", path.display()), e)
            })
        };
        Ok(Self {
            original: size_of(request.input())?,
            compressed: size_of(request.output())?,
        })
    }
}

/// Resolve a tool from an explicit path or by name in PATH.
pub(crate) fn find_tool(explicit: Option<&Path>, name: &str) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.is_file().then(|| path.to_path_buf());
    }
    which::which(name).ok()
}

fn last_lines(text: &str, count: usize) -> String {
    let lines: Vec<&str> = text.trim().lines().collect();
    let start = lines.len().saturating_sub(count);
    lines[start..].join("\n")
}

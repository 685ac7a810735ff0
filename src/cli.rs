//! Command-line interface for torshare.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use clap::error::ErrorKind;
use clap::Parser;
use console::style;
use tracing::{debug, info};

use crate::config::Settings;
use crate::error::{Result, SessionError};
use crate::privacy::CTorNetwork;
use crate::session::{Announcer, SessionController, SessionRequest, StopSignal};
use crate::transcode::{validate_level, FfmpegEncoder};
use crate::utils::parse_duration;

const USAGE: &str = "Usage:\ntorshare [filename] [timeout] [compression (0-10)]";

#[derive(Parser, Debug)]
#[command(name = "torshare")]
#[command(about = "Share a video once over a temporary Tor onion service")]
#[command(version)]
#[command(allow_negative_numbers = true)]
pub struct Cli {
    /// Video file to share (.mp4)
    pub source: Option<String>,

    /// How long to keep sharing, e.g. "30s", "5m", "1h30m"
    pub timeout: Option<String>,

    /// Compression level 0-10 (0 = share the file unchanged)
    pub quality: Option<String>,

    /// TOML settings file
    #[arg(short, long, env = "TORSHARE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

/// External programs a real session needs.
#[derive(Debug, Clone)]
pub struct Tools {
    pub ffmpeg: PathBuf,
    pub tor: PathBuf,
}

/// Parse arguments, run one session, and return the process exit code.
pub async fn run() -> i32 {
    run_from(std::env::args_os()).await
}

/// Like [`run`], with an explicit argument list (program name first).
pub async fn run_from<I, T>(args: I) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    match Cli::try_parse_from(args) {
        Ok(cli) => run_with(cli).await,
        Err(e) => usage_error(&e),
    }
}

/// Help and version exit 0; every other parse failure is a usage error.
fn usage_error(error: &clap::Error) -> i32 {
    let _ = error.print();
    match error.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
        _ => {
            println!("{}", USAGE);
            1
        }
    }
}

pub async fn run_with(cli: Cli) -> i32 {
    let (Some(source), Some(timeout), Some(quality)) = (
        non_empty(&cli.source),
        non_empty(&cli.timeout),
        non_empty(&cli.quality),
    ) else {
        println!("{}", USAGE);
        return 1;
    };

    let settings = match Settings::load(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => return fail(&e),
    };

    let request = match parse_request(source, timeout, quality) {
        Ok(request) => request,
        Err(e) => return fail(&e),
    };

    let tools = match resolve_tools(&settings) {
        Ok(tools) => tools,
        Err(e) => return fail(&e),
    };
    debug!("Using ffmpeg {} and tor {}", tools.ffmpeg.display(), tools.tor.display());

    let encoder = FfmpegEncoder::new(tools.ffmpeg, settings.encoder_preset.clone());
    let network = CTorNetwork::new(tools.tor);
    let stop = StopSignal::stdin(settings.stop_keyword.clone());
    let announcer = Announcer::new(settings.copy_to_clipboard);

    let mut controller = SessionController::new(encoder, network, settings, announcer);
    let report = controller.run(request, stop).await;
    info!(
        "Session finished: {:?}, exit code {}",
        report.stop_reason(),
        report.exit_code()
    );
    report.exit_code()
}

/// Validate the three positional arguments. No resources are touched.
pub fn parse_request(source: &str, timeout: &str, quality: &str) -> Result<SessionRequest> {
    let source_path = Path::new(source);
    if !source_path.exists() {
        return Err(SessionError::invalid(format!(
            "File '{}' does not exist.",
            source
        )));
    }
    if !source_path.is_file() {
        return Err(SessionError::invalid(format!("'{}' is not a file.", source)));
    }
    if !has_mp4_extension(source_path) {
        return Err(SessionError::invalid("File is not an mp4."));
    }

    let timeout = parse_duration(timeout).map_err(|e| {
        SessionError::invalid(format!("Failed to parse timeout duration: {}", e))
    })?;

    let level: i64 = quality.trim().parse().map_err(|e| {
        SessionError::invalid(format!(
            "Failed to parse compression level \"{}\": {}",
            quality, e
        ))
    })?;
    let quality_level = validate_level(level)?;

    Ok(SessionRequest {
        source: source_path.to_path_buf(),
        timeout,
        quality_level,
    })
}

/// `.mp4` in any letter case.
pub fn has_mp4_extension(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("mp4"))
        .unwrap_or(false)
}

/// Locate ffmpeg and tor, honoring explicit paths from settings.
pub fn resolve_tools(settings: &Settings) -> Result<Tools> {
    let ffmpeg = FfmpegEncoder::find_binary(settings.ffmpeg_binary.as_deref()).ok_or_else(|| {
        SessionError::tool("ffmpeg", "`ffmpeg` not found in PATH. Install ffmpeg or set ffmpeg_binary.")
    })?;
    let tor = CTorNetwork::find_tor_binary(settings.tor_binary.as_deref()).ok_or_else(|| {
        SessionError::tool("tor", "`tor` not found in PATH. Install tor or set tor_binary.")
    })?;
    Ok(Tools { ffmpeg, tor })
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

fn fail(error: &SessionError) -> i32 {
    println!("{} {}", style("Error:").red().bold(), error);
    error.exit_code()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    fn cli(source: &str, timeout: &str, quality: &str) -> Cli {
        Cli {
            source: Some(source.to_string()),
            timeout: Some(timeout.to_string()),
            quality: Some(quality.to_string()),
            config: None,
            verbose: false,
        }
    }

    fn video(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"mp4").unwrap();
        path
    }

    #[test]
    fn test_parse_request_valid() {
        let dir = tempdir().unwrap();
        let path = video(dir.path(), "clip.mp4");
        let request = parse_request(path.to_str().unwrap(), "90s", "3").unwrap();

        assert_eq!(request.source, path);
        assert_eq!(request.timeout, Duration::from_secs(90));
        assert_eq!(request.quality_level, 3);
    }

    #[test]
    fn test_parse_request_rejects_bad_input() {
        let dir = tempdir().unwrap();
        let mp4 = video(dir.path(), "clip.mp4");
        let mp4 = mp4.to_str().unwrap();
        let avi = video(dir.path(), "clip.avi");

        let cases = [
            (mp4, "1s", "11"),
            (mp4, "1s", "-1"),
            (mp4, "1s", "high"),
            (mp4, "soon", "0"),
            (avi.to_str().unwrap(), "1s", "0"),
            ("/nonexistent/clip.mp4", "1s", "0"),
            (dir.path().to_str().unwrap(), "1s", "0"),
        ];
        for (source, timeout, quality) in cases {
            let err = parse_request(source, timeout, quality).unwrap_err();
            assert!(
                matches!(err, SessionError::InvalidArgument(_)),
                "{:?} should be rejected",
                (source, timeout, quality)
            );
        }
    }

    #[test]
    fn test_uppercase_extension_accepted() {
        assert!(has_mp4_extension(Path::new("holiday.MP4")));
        assert!(has_mp4_extension(Path::new("a/b/c.mp4")));
        assert!(!has_mp4_extension(Path::new("mp4")));
        assert!(!has_mp4_extension(Path::new("clip.mp4.part")));
    }

    #[test]
    fn test_resolve_tools_explicit_missing_path() {
        let settings = Settings {
            ffmpeg_binary: Some(PathBuf::from("/nonexistent/ffmpeg")),
            ..Default::default()
        };
        let err = resolve_tools(&settings).unwrap_err();
        assert!(matches!(err, SessionError::ExternalTool { .. }));
    }

    #[tokio::test]
    async fn test_missing_arguments_exit_one() {
        let mut args = cli("a.mp4", "1s", "0");
        args.quality = None;
        assert_eq!(run_with(args).await, 1);

        let args = cli("", "1s", "0");
        assert_eq!(run_with(args).await, 1);
    }

    #[test]
    fn test_negative_quality_reaches_validation() {
        let cli = Cli::try_parse_from(["torshare", "clip.mp4", "1s", "-1"]).unwrap();
        assert_eq!(cli.quality.as_deref(), Some("-1"));

        let cli = Cli::try_parse_from(["torshare", "-v", "clip.mp4", "1s", "-3"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.quality.as_deref(), Some("-3"));
    }

    #[tokio::test]
    async fn test_hyphenated_arguments_exit_one() {
        let dir = tempdir().unwrap();
        let temp_root = tempdir().unwrap();
        let mp4 = video(dir.path(), "clip.mp4");
        let mp4 = mp4.to_str().unwrap();

        let config = dir.path().join("torshare.toml");
        std::fs::write(
            &config,
            format!("temp_root = {:?}\ncopy_to_clipboard = false\n", temp_root.path()),
        )
        .unwrap();
        let config = config.to_str().unwrap();

        let cases: [&[&str]; 4] = [
            &["torshare", "-c", config, mp4, "1s", "-1"],
            &["torshare", "-c", config, mp4, "-5s", "0"],
            &["torshare", "-c", config, mp4, "1s", "0", "extra"],
            &["torshare", "--no-such-flag"],
        ];
        for args in cases {
            assert_eq!(run_from(args.iter().copied()).await, 1, "{:?}", args);
        }
        assert_eq!(std::fs::read_dir(temp_root.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_help_exits_zero() {
        assert_eq!(run_from(["torshare", "--help"]).await, 0);
    }

    #[tokio::test]
    async fn test_invalid_input_exits_before_workspace() {
        let dir = tempdir().unwrap();
        let temp_root = tempdir().unwrap();
        let mp4 = video(dir.path(), "clip.mp4");

        let config = dir.path().join("torshare.toml");
        std::fs::write(
            &config,
            format!("temp_root = {:?}\ncopy_to_clipboard = false\n", temp_root.path()),
        )
        .unwrap();

        let mut quality_too_high = cli(mp4.to_str().unwrap(), "1s", "11");
        quality_too_high.config = Some(config.clone());
        assert_eq!(run_with(quality_too_high).await, 1);

        let mut missing_source = cli("/nonexistent/clip.mp4", "1s", "0");
        missing_source.config = Some(config);
        assert_eq!(run_with(missing_source).await, 1);

        assert_eq!(std::fs::read_dir(temp_root.path()).unwrap().count(), 0);
    }
}

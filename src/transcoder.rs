//! The fixed ffmpeg invocation used to push a file to an RTMP ingest.

use std::path::Path;

use tracing::debug;

/// Encoding profile applied to every stream. Not configurable.
pub const VIDEO_SIZE: &str = "1920x1080";
pub const FRAME_RATE: &str = "30";
pub const VIDEO_CODEC: &str = "libx264";
pub const VIDEO_PRESET: &str = "veryfast";
pub const VIDEO_BITRATE: &str = "4500k";
pub const VIDEO_MAXRATE: &str = "5000k";
pub const VIDEO_BUFSIZE: &str = "10000k";
pub const PIXEL_FORMAT: &str = "yuv420p";
pub const GOP_SIZE: &str = "60";
pub const AUDIO_CODEC: &str = "aac";
pub const AUDIO_BITRATE: &str = "192k";
pub const AUDIO_CHANNELS: &str = "2";
pub const AUDIO_SAMPLE_RATE: &str = "44100";
pub const OUTPUT_FORMAT: &str = "flv";

/// Joins the ingest base and the stream key with a single `/`.
pub fn ingest_url(destination_base_url: &str, stream_key: &str) -> String {
    format!("{}/{}", destination_base_url.trim_end_matches('/'), stream_key)
}

/// Same as [`ingest_url`] with the key hidden, for logs.
pub fn masked_ingest_url(destination_base_url: &str) -> String {
    ingest_url(destination_base_url, "****")
}

pub fn build_args(source: &Path, output_url: &str) -> Vec<String> {
    let mut args: Vec<String> = Vec::with_capacity(36);

    // Read at native frame rate so the ingest sees real-time input.
    args.extend(["-re", "-i"].map(String::from));
    args.push(source.to_string_lossy().into_owned());

    args.extend(
        [
            "-s", VIDEO_SIZE,
            "-r", FRAME_RATE,
            "-c:v", VIDEO_CODEC,
            "-preset", VIDEO_PRESET,
            "-b:v", VIDEO_BITRATE,
            "-maxrate", VIDEO_MAXRATE,
            "-bufsize", VIDEO_BUFSIZE,
            "-pix_fmt", PIXEL_FORMAT,
            "-g", GOP_SIZE,
            "-c:a", AUDIO_CODEC,
            "-b:a", AUDIO_BITRATE,
            "-ac", AUDIO_CHANNELS,
            "-ar", AUDIO_SAMPLE_RATE,
            "-f", OUTPUT_FORMAT,
        ]
        .map(String::from),
    );

    args.push(output_url.to_string());
    args
}

/// Whether `program` resolves to an executable, either as a path or on `PATH`.
pub fn preflight_check(program: &str) -> bool {
    match which::which(program) {
        Ok(path) => {
            debug!("Found {} at {}", program, path.display());
            true
        }
        Err(e) => {
            debug!("{} not found: {}", program, e);
            false
        }
    }
}

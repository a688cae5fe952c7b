//! FFprobe-based stream probing. Answers "has a video stream?" and
//! "has an audio stream?" for containers whose MIME alone is ambiguous.

use std::path::Path;

use serde::Deserialize;

use super::{Tool, ToolInvocation, ToolRunner};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

/// Which streams a probe asks about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// Video streams, excluding attached pictures such as embedded cover art.
    Video,
    Audio,
}

impl StreamKind {
    fn selector(self) -> &'static str {
        match self {
            StreamKind::Video => "V",
            StreamKind::Audio => "a",
        }
    }

    fn codec_type(self) -> &'static str {
        match self {
            StreamKind::Video => "video",
            StreamKind::Audio => "audio",
        }
    }
}

/// Result of one probe. `Unavailable` means the probe tool could not run at
/// all, which is different from a file that simply has no such stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeAnswer {
    Present,
    Absent,
    Unavailable,
}

impl ProbeAnswer {
    pub fn is_present(self) -> bool {
        self == ProbeAnswer::Present
    }
}

/// Which probes the sniffed evidence calls for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbePlan {
    None,
    VideoOnly,
    AudioOnly,
    VideoAndAudio,
}

/// Stream evidence for one file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamProfile {
    pub has_video_stream: bool,
    pub has_audio_stream: bool,
    /// At least one requested probe could not be run.
    pub probe_unavailable: bool,
}

impl StreamProfile {
    fn record(&mut self, kind: StreamKind, answer: ProbeAnswer) {
        match kind {
            StreamKind::Video => self.has_video_stream = answer.is_present(),
            StreamKind::Audio => self.has_audio_stream = answer.is_present(),
        }
        if answer == ProbeAnswer::Unavailable {
            self.probe_unavailable = true;
        }
    }
}

pub fn probe_invocation(path: &Path, kind: StreamKind) -> ToolInvocation {
    ToolInvocation::new(Tool::Ffprobe)
        .args([
            "-v",
            "error",
            "-select_streams",
            kind.selector(),
            "-show_entries",
            "stream=codec_type",
            "-of",
            "json",
        ])
        .arg(path)
}

/// Parse ffprobe JSON output; true when a stream of `kind` is listed.
pub fn parse_streams_json(json: &[u8], kind: StreamKind) -> Result<bool, AppError> {
    let output: FfprobeOutput = serde_json::from_slice(json)
        .map_err(|e| AppError::from(format!("Failed to parse ffprobe JSON: {}", e)))?;
    Ok(output
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some(kind.codec_type())))
}

/// Run one probe. Malformed input, non-zero exit or unparsable output all
/// answer `Absent`; only a missing or unspawnable ffprobe answers `Unavailable`.
pub async fn probe_stream(runner: &dyn ToolRunner, path: &Path, kind: StreamKind) -> ProbeAnswer {
    let invocation = probe_invocation(path, kind);
    match runner.run(&invocation).await {
        Ok(output) => match parse_streams_json(&output.stdout, kind) {
            Ok(true) => ProbeAnswer::Present,
            Ok(false) => ProbeAnswer::Absent,
            Err(e) => {
                log::debug!(
                    target: "nimbus_preview::tools::ffprobe",
                    "probe {:?} on {}: {}",
                    kind,
                    path.display(),
                    e
                );
                ProbeAnswer::Absent
            }
        },
        Err(AppError::ToolFailed { code, .. }) => {
            log::debug!(
                target: "nimbus_preview::tools::ffprobe",
                "probe {:?} on {} exited with {}; treating as absent",
                kind,
                path.display(),
                code
            );
            ProbeAnswer::Absent
        }
        Err(e) => {
            log::warn!(
                target: "nimbus_preview::tools::ffprobe",
                "probe {:?} on {} could not run: {}",
                kind,
                path.display(),
                e
            );
            ProbeAnswer::Unavailable
        }
    }
}

/// Execute a probe plan. Video and audio probes run concurrently.
pub async fn probe_profile(runner: &dyn ToolRunner, path: &Path, plan: ProbePlan) -> StreamProfile {
    let mut profile = StreamProfile::default();
    match plan {
        ProbePlan::None => {}
        ProbePlan::VideoOnly => {
            let video = probe_stream(runner, path, StreamKind::Video).await;
            profile.record(StreamKind::Video, video);
        }
        ProbePlan::AudioOnly => {
            let audio = probe_stream(runner, path, StreamKind::Audio).await;
            profile.record(StreamKind::Audio, audio);
        }
        ProbePlan::VideoAndAudio => {
            let (video, audio) = tokio::join!(
                probe_stream(runner, path, StreamKind::Video),
                probe_stream(runner, path, StreamKind::Audio),
            );
            profile.record(StreamKind::Video, video);
            profile.record(StreamKind::Audio, audio);
        }
    }
    profile
}

//! Maps a classification and its stream evidence to one rendering strategy.

use std::fmt;

use crate::classify::{Classification, ContentCategory};
use crate::error::AppError;
use crate::tools::ffprobe::StreamProfile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    VideoFrame,
    ImageFrame,
    Pdf,
    Html,
    Font,
    Waveform,
}

impl Strategy {
    pub fn name(self) -> &'static str {
        match self {
            Strategy::VideoFrame => "video-frame",
            Strategy::ImageFrame => "image-frame",
            Strategy::Pdf => "pdf",
            Strategy::Html => "html",
            Strategy::Font => "font",
            Strategy::Waveform => "waveform",
        }
    }

    /// Strategies driven through the headless browser.
    pub fn uses_browser(self) -> bool {
        matches!(self, Strategy::Html | Strategy::Font)
    }

    /// Artifacts written by the browser path get their permissions normalized.
    pub fn needs_permission_fix(self) -> bool {
        self.uses_browser()
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// First applicable rule wins; nothing applicable is `Unsupported`.
pub fn select(
    classification: &Classification,
    profile: &StreamProfile,
) -> Result<Strategy, AppError> {
    let strategy = match classification.category {
        ContentCategory::Html => Some(Strategy::Html),
        ContentCategory::Video if profile.has_video_stream => Some(Strategy::VideoFrame),
        ContentCategory::Image if profile.has_video_stream => Some(Strategy::ImageFrame),
        ContentCategory::Pdf => Some(Strategy::Pdf),
        ContentCategory::Font => Some(Strategy::Font),
        _ if profile.has_audio_stream => Some(Strategy::Waveform),
        _ => None,
    };
    strategy.ok_or(AppError::Unsupported {
        mime: classification.mime,
    })
}

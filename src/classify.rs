//! Content classification.
//!
//! Sniffs a MIME type from the leading bytes of an upload, then combines it
//! with the filename and the stream profile into a [`ContentCategory`].
//! Classification never fails: no confident match is a valid answer.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tokio::io::AsyncReadExt;

use crate::tools::ffprobe::{ProbePlan, StreamProfile};

/// Bytes read from the head of a file for sniffing.
pub const SNIFF_LEN: usize = 4100;

static HTML_EXTENSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.html?$").expect("invalid html extension regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentCategory {
    Image,
    Video,
    Pdf,
    Html,
    Font,
    Audio,
    Unknown,
}

/// Fixed-offset magic bytes.
struct Signature {
    offset: usize,
    bytes: &'static [u8],
    mime: &'static str,
}

impl Signature {
    fn matches(&self, head: &[u8]) -> bool {
        has_at(head, self.offset, self.bytes)
    }
}

const fn sig(offset: usize, bytes: &'static [u8], mime: &'static str) -> Signature {
    Signature {
        offset,
        bytes,
        mime,
    }
}

/// Checked in order after [`sniff_container`] and before [`sniff_sync`].
static SIGNATURES: &[Signature] = &[
    // images
    sig(0, b"\x89PNG\r\n\x1a\n", "image/png"),
    sig(0, b"\xFF\xD8\xFF", "image/jpeg"),
    sig(0, b"GIF87a", "image/gif"),
    sig(0, b"GIF89a", "image/gif"),
    sig(0, b"II*\x00", "image/tiff"),
    sig(0, b"MM\x00*", "image/tiff"),
    sig(0, b"8BPS", "image/vnd.adobe.photoshop"),
    sig(0, b"\x00\x00\x00\x0CJXL \r\n\x87\n", "image/jxl"),
    sig(0, b"\xFF\x0A", "image/jxl"),
    sig(0, b"\x00\x00\x01\x00", "image/x-icon"),
    sig(0, b"BM", "image/bmp"),
    // video
    sig(0, b"FLV\x01", "video/x-flv"),
    sig(0, b"\x00\x00\x01\xBA", "video/mpeg"),
    sig(0, b"\x00\x00\x01\xB3", "video/mpeg"),
    sig(
        0,
        b"\x30\x26\xB2\x75\x8E\x66\xCF\x11\xA6\xD9",
        "video/x-ms-asf",
    ),
    sig(4, b"moov", "video/quicktime"),
    sig(4, b"mdat", "video/quicktime"),
    sig(4, b"wide", "video/quicktime"),
    // audio
    sig(0, b"ID3", "audio/mpeg"),
    sig(0, b"fLaC", "audio/x-flac"),
    sig(0, b"MThd", "audio/midi"),
    sig(0, b"#!AMR", "audio/amr"),
    sig(0, b"wvpk", "audio/wavpack"),
    sig(0, b"MAC ", "audio/ape"),
    // documents
    sig(0, b"%PDF", "application/pdf"),
    // fonts
    sig(0, b"wOFF", "font/woff"),
    sig(0, b"wOF2", "font/woff2"),
    sig(0, b"OTTO", "font/otf"),
    sig(0, b"\x00\x01\x00\x00\x00", "font/ttf"),
    sig(0, b"true\x00", "font/ttf"),
    // archives and binaries: recognized, but only an audio stream can save them
    sig(0, b"PK\x03\x04", "application/zip"),
    sig(0, b"PK\x05\x06", "application/zip"),
    sig(0, b"\x1F\x8B\x08", "application/gzip"),
    sig(0, b"7z\xBC\xAF\x27\x1C", "application/x-7z-compressed"),
    sig(0, b"Rar!\x1A\x07", "application/x-rar-compressed"),
    sig(0, b"BZh", "application/x-bzip2"),
    sig(0, b"\xFD7zXZ\x00", "application/x-xz"),
    sig(257, b"ustar", "application/x-tar"),
    sig(0, b"\x7FELF", "application/x-elf"),
    sig(0, b"SQLite format 3\x00", "application/x-sqlite3"),
    sig(0, b"MZ", "application/x-msdownload"),
];

fn ftyp_mime(brand: &[u8]) -> &'static str {
    match brand {
        b"avif" | b"avis" => "image/avif",
        b"heic" | b"heix" | b"hevc" | b"hevx" => "image/heic",
        b"mif1" | b"msf1" => "image/heif",
        b"qt  " => "video/quicktime",
        b"M4A " => "audio/x-m4a",
        b"M4B " | b"M4P " => "audio/mp4",
        b"3g2a" | b"3g2b" | b"3g2c" => "video/3gpp2",
        b"crx " => "image/x-canon-cr3",
        _ if brand.starts_with(b"3g") => "video/3gpp",
        // isom, iso2, mp41, mp42, avc1, dash, M4V, f4v and unknown brands
        _ => "video/mp4",
    }
}

fn has_at(head: &[u8], offset: usize, bytes: &[u8]) -> bool {
    head.get(offset..offset + bytes.len()) == Some(bytes)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

const TS_PACKET_LEN: usize = 188;

/// Formats that need more than a fixed prefix to name.
fn sniff_container(head: &[u8]) -> Option<&'static str> {
    // ISO base media: size(4) "ftyp" brand(4)
    if has_at(head, 4, b"ftyp") {
        return head.get(8..12).map(ftyp_mime);
    }

    if has_at(head, 0, b"RIFF") {
        return match head.get(8..12) {
            Some(b"WEBP") => Some("image/webp"),
            Some(b"AVI ") => Some("video/vnd.avi"),
            Some(b"WAVE") => Some("audio/wav"),
            Some(b"QLCM") => Some("audio/qcelp"),
            _ => None,
        };
    }

    if has_at(head, 0, b"FORM") {
        return match head.get(8..12) {
            Some(b"AIFF") | Some(b"AIFC") => Some("audio/aiff"),
            _ => None,
        };
    }

    // EBML: Matroska or WebM, told apart by DocType
    if has_at(head, 0, b"\x1A\x45\xDF\xA3") {
        let window = &head[..head.len().min(64)];
        return Some(if contains(window, b"webm") {
            "video/webm"
        } else {
            "video/x-matroska"
        });
    }

    if has_at(head, 0, b"OggS") {
        let window = &head[..head.len().min(64)];
        return Some(if contains(window, b"\x80theora") {
            "video/ogg"
        } else if contains(window, b"OpusHead") {
            "audio/opus"
        } else {
            "audio/ogg"
        });
    }

    None
}

/// Packet and frame sync patterns. Only consulted once no fixed magic matched.
fn sniff_sync(head: &[u8]) -> Option<&'static str> {
    // MPEG transport stream: sync byte every 188 bytes
    if [0, TS_PACKET_LEN, 2 * TS_PACKET_LEN]
        .iter()
        .all(|&i| head.get(i) == Some(&0x47))
    {
        return Some("video/mp2t");
    }

    // MPEG audio / ADTS frame sync
    if let [0xFF, b1, ..] = head {
        if b1 & 0xF6 == 0xF0 {
            return Some("audio/aac");
        }
        if b1 & 0xE0 == 0xE0 && b1 & 0x06 != 0 {
            return Some("audio/mpeg");
        }
    }

    None
}

/// MIME type from magic bytes, or `None` when nothing matches confidently.
pub fn sniff_mime(head: &[u8]) -> Option<&'static str> {
    sniff_container(head)
        .or_else(|| {
            SIGNATURES
                .iter()
                .find(|s| s.matches(head))
                .map(|s| s.mime)
        })
        .or_else(|| sniff_sync(head))
}

pub fn has_html_extension(file_id: &str) -> bool {
    HTML_EXTENSION_RE.is_match(file_id)
}

/// Evidence gathered before any stream probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sniffed {
    pub mime: Option<&'static str>,
    pub html_extension: bool,
}

impl Sniffed {
    pub fn from_bytes(head: &[u8], file_id: &str) -> Self {
        Self {
            mime: sniff_mime(head),
            html_extension: has_html_extension(file_id),
        }
    }

    /// Which stream probes the sniffed evidence calls for.
    pub fn probe_plan(&self) -> ProbePlan {
        if self.html_extension {
            return ProbePlan::None;
        }
        match self.mime {
            None => ProbePlan::None,
            Some(m) if m.starts_with("video/") => ProbePlan::VideoAndAudio,
            Some(m) if m.starts_with("image/") => ProbePlan::VideoOnly,
            Some("application/pdf") => ProbePlan::None,
            Some(m) if m.starts_with("font/") => ProbePlan::None,
            Some(_) => ProbePlan::AudioOnly,
        }
    }
}

/// Read the head of `path` and sniff it. An unreadable file sniffs as no match.
pub async fn sniff_file(path: &Path, file_id: &str) -> Sniffed {
    let head = match read_head(path).await {
        Ok(head) => head,
        Err(e) => {
            log::debug!(
                target: "nimbus_preview::classify",
                "cannot read {}: {}",
                path.display(),
                e
            );
            Vec::new()
        }
    };
    Sniffed::from_bytes(&head, file_id)
}

async fn read_head(path: &Path) -> std::io::Result<Vec<u8>> {
    let file = tokio::fs::File::open(path).await?;
    let mut head = Vec::with_capacity(SNIFF_LEN);
    file.take(SNIFF_LEN as u64).read_to_end(&mut head).await?;
    Ok(head)
}

/// Final classification of one upload. Fixed once built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub category: ContentCategory,
    pub mime: Option<&'static str>,
}

impl Classification {
    pub fn from_evidence(sniffed: &Sniffed, profile: &StreamProfile) -> Self {
        let category = if sniffed.html_extension {
            ContentCategory::Html
        } else {
            match sniffed.mime {
                None => ContentCategory::Unknown,
                Some(m) if m.starts_with("video/") => {
                    if !profile.has_video_stream && profile.has_audio_stream {
                        ContentCategory::Audio
                    } else {
                        ContentCategory::Video
                    }
                }
                Some(m) if m.starts_with("image/") => ContentCategory::Image,
                Some("application/pdf") => ContentCategory::Pdf,
                Some(m) if m.starts_with("font/") => ContentCategory::Font,
                Some(_) if profile.has_audio_stream => ContentCategory::Audio,
                Some(_) => ContentCategory::Unknown,
            }
        };
        Self {
            category,
            mime: sniffed.mime,
        }
    }
}

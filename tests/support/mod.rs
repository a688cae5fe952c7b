#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use nimbus_preview_core::cache::PreviewCache;
use nimbus_preview_core::config::PreviewConfig;
use nimbus_preview_core::error::AppError;
use nimbus_preview_core::job::{JobRunner, PreviewRequest};
use nimbus_preview_core::logging::RecordingSink;
use nimbus_preview_core::outcome::JobOutcome;
use nimbus_preview_core::tools::{Tool, ToolFuture, ToolInvocation, ToolOutput, ToolRunner};

/// Bytes the fake tools write as their "image".
pub const FAKE_WEBP: &[u8] = b"RIFF\x10\x00\x00\x00WEBPVP8L fake";

pub mod fixtures {
    pub const MP4: &[u8] = b"\x00\x00\x00\x20ftypisom\x00\x00\x02\x00isomiso2avc1mp41";
    pub const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR\x00\x00\x00\x10";
    pub const GIF: &[u8] = b"GIF89a\x40\x01\xF0\x00\xF7\x00\x00";
    pub const PDF: &[u8] = b"%PDF-1.4\n1 0 obj\n<< /Type /Catalog >>\nendobj\n";
    pub const ZIP: &[u8] = b"PK\x03\x04\x14\x00\x00\x00\x08\x00notes.txt";
    pub const MP3: &[u8] = b"ID3\x04\x00\x00\x00\x00\x00\x0f\xff\xfb\x90\x00";
    pub const WOFF2: &[u8] = b"wOF2\x00\x01\x00\x00\x00\x00\x10\x00";
    pub const HTML_FRAGMENT: &[u8] = b"<div class=\"card\">hello</div>";
    pub const TEXT: &[u8] = b"meeting notes, nothing to see\n";
}

/// How a fake tool answers.
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Exit 0 and write the tool's output file.
    Produce,
    /// Like `Produce`, after a delay.
    ProduceAfter(Duration),
    /// Like `Produce`, then swap the directory for a plain file so nothing
    /// that lived beneath it can be removed any more.
    ProduceThenClobber(PathBuf),
    /// Exit 0 without writing anything.
    Silent,
    /// ffprobe: list the streams asked about that are present.
    Probe { video: bool, audio: bool },
    Fail { code: i32, stderr: &'static str },
    NotFound,
    Hang,
    Panic,
}

/// Scripted [`ToolRunner`] that records every invocation.
pub struct FakeRunner {
    behaviors: Mutex<HashMap<Tool, Behavior>>,
    calls: Mutex<Vec<ToolInvocation>>,
}

impl Default for FakeRunner {
    fn default() -> Self {
        let mut behaviors = HashMap::new();
        behaviors.insert(
            Tool::Ffprobe,
            Behavior::Probe {
                video: false,
                audio: false,
            },
        );
        behaviors.insert(Tool::Ffmpeg, Behavior::Produce);
        behaviors.insert(Tool::Pdftoppm, Behavior::Produce);
        behaviors.insert(Tool::Chromium, Behavior::Produce);
        Self {
            behaviors: Mutex::new(behaviors),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl FakeRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set(&self, tool: Tool, behavior: Behavior) {
        self.behaviors.lock().insert(tool, behavior);
    }

    pub fn probe(&self, video: bool, audio: bool) {
        self.set(Tool::Ffprobe, Behavior::Probe { video, audio });
    }

    pub fn calls(&self) -> Vec<ToolInvocation> {
        self.calls.lock().clone()
    }

    pub fn calls_to(&self, tool: Tool) -> Vec<Vec<String>> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.tool == tool)
            .map(|c| c.args_lossy())
            .collect()
    }
}

/// Where a real tool would have written its output.
fn output_of(invocation: &ToolInvocation) -> Option<PathBuf> {
    let args = invocation.args_lossy();
    match invocation.tool {
        Tool::Ffmpeg => args.last().map(PathBuf::from),
        Tool::Pdftoppm => args.last().map(|prefix| PathBuf::from(format!("{}.png", prefix))),
        Tool::Chromium => args
            .iter()
            .find_map(|a| a.strip_prefix("--screenshot="))
            .map(PathBuf::from),
        Tool::Ffprobe => None,
    }
}

fn probe_output(invocation: &ToolInvocation, video: bool, audio: bool) -> ToolOutput {
    let args = invocation.args_lossy();
    let selector = args
        .iter()
        .position(|a| a == "-select_streams")
        .and_then(|i| args.get(i + 1))
        .cloned()
        .unwrap_or_default();
    let json = match selector.as_str() {
        "V" if video => r#"{"streams":[{"codec_type":"video"}]}"#,
        "a" if audio => r#"{"streams":[{"codec_type":"audio"}]}"#,
        _ => r#"{"streams":[]}"#,
    };
    ToolOutput {
        stdout: json.as_bytes().to_vec(),
        stderr: String::new(),
    }
}

impl ToolRunner for FakeRunner {
    fn run<'a>(&'a self, invocation: &'a ToolInvocation) -> ToolFuture<'a> {
        self.calls.lock().push(invocation.clone());
        let behavior = self
            .behaviors
            .lock()
            .get(&invocation.tool)
            .cloned()
            .unwrap_or(Behavior::Produce);
        Box::pin(async move {
            match behavior {
                Behavior::Produce | Behavior::ProduceAfter(_) => {
                    if let Behavior::ProduceAfter(delay) = behavior {
                        tokio::time::sleep(delay).await;
                    }
                    if let Some(out) = output_of(invocation) {
                        fs::write(&out, FAKE_WEBP)?;
                    }
                    Ok(ToolOutput::default())
                }
                Behavior::ProduceThenClobber(dir) => {
                    if let Some(out) = output_of(invocation) {
                        fs::write(&out, FAKE_WEBP)?;
                    }
                    fs::remove_dir_all(&dir)?;
                    fs::write(&dir, b"")?;
                    Ok(ToolOutput::default())
                }
                Behavior::Silent => Ok(ToolOutput::default()),
                Behavior::Probe { video, audio } => Ok(probe_output(invocation, video, audio)),
                Behavior::Fail { code, stderr } => {
                    Err(AppError::tool_failed(invocation.tool, code, stderr))
                }
                Behavior::NotFound => Err(AppError::ToolNotFound(invocation.tool)),
                Behavior::Hang => std::future::pending().await,
                Behavior::Panic => panic!("scripted {} panic", invocation.tool),
            }
        })
    }
}

/// Upload, output and temp roots in one temp dir, plus a fake tool layer.
pub struct TestEnv {
    dir: tempfile::TempDir,
    pub tools: Arc<FakeRunner>,
    pub sink: Arc<RecordingSink>,
    pub config: PreviewConfig,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_deadline(Duration::from_secs(15))
    }

    pub fn with_deadline(deadline: Duration) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        for sub in ["uploads", "out", "tmp"] {
            fs::create_dir_all(dir.path().join(sub)).expect("create test dirs");
        }
        let config = PreviewConfig {
            upload_root: dir.path().join("uploads"),
            output_root: dir.path().join("out"),
            temp_root: dir.path().join("tmp"),
            deadline,
            font_harness: dir.path().join("font-harness.html"),
            ..PreviewConfig::default()
        };
        Self {
            dir,
            tools: FakeRunner::new(),
            sink: RecordingSink::new(),
            config,
        }
    }

    pub fn upload(&self, file_id: &str, bytes: &[u8]) -> PathBuf {
        let path = self.config.upload_path(file_id);
        fs::write(&path, bytes).expect("write upload");
        path
    }

    pub fn runner(&self) -> JobRunner {
        JobRunner::new(
            &self.config,
            PreviewCache::new(&self.config.output_root),
            self.tools.clone(),
            self.sink.clone(),
        )
    }

    pub async fn run(&self, runner: &JobRunner, file_id: &str) -> JobOutcome {
        runner
            .run(PreviewRequest::new(file_id, self.config.upload_path(file_id)))
            .await
    }

    pub fn artifact(&self, file_id: &str) -> PathBuf {
        self.config.output_root.join(format!("{}.webp", file_id))
    }

    /// File names in a directory, sorted.
    pub fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .map(|rd| {
                rd.flatten()
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }

    pub fn output_entries(&self) -> Vec<String> {
        Self::entries(&self.config.output_root)
    }

    pub fn temp_entries(&self) -> Vec<String> {
        Self::entries(&self.config.temp_root)
    }
}

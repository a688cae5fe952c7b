//! Job runner: one isolated task per preview request.
//!
//! The runner answers cache hits directly. On a miss it takes the identifier's
//! in-flight claim, spawns the pipeline on its own task under a watchdog and
//! maps whatever happens (including a panic) to a [`JobOutcome`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{PreviewCache, normalize_permissions};
use crate::classify::{self, Classification};
use crate::config::PreviewConfig;
use crate::dispatch::{self, Strategy};
use crate::error::AppError;
use crate::logging::{JobLogger, LogSink};
use crate::outcome::{JobOutcome, ResultCode};
use crate::render::{self, RenderContext, RenderSettings, RenderTarget};
use crate::tools::ffprobe::{StreamProfile, probe_profile};
use crate::tools::{TempCleanup, TempFileManager, ToolRunner};
use crate::watchdog::{Expired, Watchdog};

#[derive(Debug, Clone)]
pub struct PreviewRequest {
    pub file_id: String,
    pub upload_path: PathBuf,
}

impl PreviewRequest {
    pub fn new(file_id: impl Into<String>, upload_path: impl Into<PathBuf>) -> Self {
        Self {
            file_id: file_id.into(),
            upload_path: upload_path.into(),
        }
    }
}

/// Everything known about one job once a strategy has been chosen.
#[derive(Debug, Clone)]
pub struct RenderJob {
    pub file_id: String,
    pub upload_path: PathBuf,
    pub staging_path: PathBuf,
    pub classification: Classification,
    pub profile: StreamProfile,
    pub strategy: Strategy,
    /// Liveness deadline of the job's watchdog.
    pub deadline: Duration,
}

impl RenderJob {
    fn target(&self) -> RenderTarget<'_> {
        RenderTarget {
            file_id: &self.file_id,
            upload: &self.upload_path,
            staging: &self.staging_path,
        }
    }
}

#[derive(Clone)]
pub struct JobRunner {
    inner: Arc<RunnerInner>,
}

struct RunnerInner {
    settings: RenderSettings,
    deadline: Duration,
    cache: PreviewCache,
    tools: Arc<dyn ToolRunner>,
    sink: Arc<dyn LogSink>,
    temp: TempFileManager,
}

impl JobRunner {
    pub fn new(
        config: &PreviewConfig,
        cache: PreviewCache,
        tools: Arc<dyn ToolRunner>,
        sink: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            inner: Arc::new(RunnerInner {
                settings: RenderSettings::from_config(config),
                deadline: config.deadline,
                cache,
                tools,
                sink,
                temp: TempFileManager::new(&config.temp_root),
            }),
        }
    }

    pub fn cache(&self) -> &PreviewCache {
        &self.inner.cache
    }

    /// Produce (or find) the preview for one request. Never panics and never
    /// returns early without a terminal code.
    pub async fn run(&self, request: PreviewRequest) -> JobOutcome {
        let log = JobLogger::new(self.inner.sink.clone(), &request.file_id);
        if let Some(path) = self.inner.cache.lookup(&request.file_id).await {
            log.debug("Cache hit");
            return JobOutcome::success(path);
        }

        let claim = self.inner.cache.claim(&request.file_id).await;
        // another job may have finished while we waited
        if let Some(path) = self.inner.cache.lookup(&request.file_id).await {
            log.debug("Cache hit after waiting for in-flight job");
            return JobOutcome::success(path);
        }

        let runner = self.clone();
        let task_log = log.clone();
        // the claim lives with the job, not with the caller, who may go away
        let handle = tokio::spawn(async move {
            let _claim = claim;
            runner.execute(request, task_log).await
        });
        let outcome = match handle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                let err = if e.is_panic() {
                    AppError::JobPanicked(panic_message(e.into_panic()))
                } else {
                    AppError::from(e.to_string())
                };
                log.error(err.log_summary());
                JobOutcome::failed(err.result_code())
            }
        };
        outcome
    }

    async fn execute(&self, request: PreviewRequest, log: JobLogger) -> JobOutcome {
        let cache = &self.inner.cache;
        let watchdog = Watchdog::start(self.inner.deadline);
        let staging = cache.staging_path();
        let mut staging_cleanup = TempCleanup::new();
        staging_cleanup.add(staging.clone());

        let result = watchdog
            .supervise(self.pipeline(&request, &staging, &watchdog, &log))
            .await;

        let outcome = match result {
            Ok(Ok(strategy)) => self.publish(&request.file_id, &staging, strategy, &log).await,
            Ok(Err(e)) => {
                match e.result_code() {
                    ResultCode::UnsupportedType => log.info(e.to_string()),
                    _ => log.error(e.log_summary()),
                }
                JobOutcome::failed(e.result_code())
            }
            Err(Expired { browser_active }) => {
                if browser_active {
                    log.warn("Force-closing browser instance");
                }
                log.error(format!(
                    "No progress for {}s, giving up",
                    watchdog.timeout().as_secs_f32()
                ));
                JobOutcome::failed(AppError::TimedOut.result_code())
            }
        };

        for (path, e) in staging_cleanup.finish() {
            log.warn(format!("Failed to remove staging {}: {}", path.display(), e));
        }
        log.info(format!("Finished with {:?}", outcome.code));
        outcome
    }

    async fn pipeline(
        &self,
        request: &PreviewRequest,
        staging: &Path,
        watchdog: &Watchdog,
        log: &JobLogger,
    ) -> Result<Strategy, AppError> {
        let inner = &self.inner;
        let sniffed = classify::sniff_file(&request.upload_path, &request.file_id).await;
        let plan = sniffed.probe_plan();
        log.debug(format!("Sniffed {:?}, probe plan {:?}", sniffed.mime, plan));

        watchdog.kick();
        let profile = probe_profile(inner.tools.as_ref(), &request.upload_path, plan).await;
        watchdog.kick();

        let classification = Classification::from_evidence(&sniffed, &profile);
        let strategy = match dispatch::select(&classification, &profile) {
            Ok(strategy) => strategy,
            Err(AppError::Unsupported { .. }) if profile.probe_unavailable => {
                return Err(AppError::from(
                    "No strategy applies and the stream probe could not run",
                ));
            }
            Err(e) => return Err(e),
        };

        let job = RenderJob {
            file_id: request.file_id.clone(),
            upload_path: request.upload_path.clone(),
            staging_path: staging.to_path_buf(),
            classification,
            profile,
            strategy,
            deadline: watchdog.timeout(),
        };
        log.info(format!(
            "Rendering {:?} ({}) with {}, deadline {}s",
            job.classification.category,
            job.classification.mime.unwrap_or("no signature"),
            job.strategy,
            job.deadline.as_secs_f32()
        ));

        let ctx = RenderContext {
            tools: inner.tools.as_ref(),
            watchdog,
            log,
            settings: &inner.settings,
            temp: &inner.temp,
        };
        render::render(job.strategy, &ctx, job.target()).await?;
        Ok(job.strategy)
    }

    async fn publish(
        &self,
        file_id: &str,
        staging: &Path,
        strategy: Strategy,
        log: &JobLogger,
    ) -> JobOutcome {
        let artifact = match self.inner.cache.promote(staging, file_id).await {
            Ok(path) => path,
            Err(e) => {
                log.error(format!("Failed to promote artifact: {}", e));
                return JobOutcome::failed(ResultCode::RenderFailure);
            }
        };
        if strategy.needs_permission_fix()
            && let Err(e) = normalize_permissions(&artifact).await
        {
            log.warn(format!(
                "Failed to set permissions on {}: {}",
                artifact.display(),
                e
            ));
        }
        JobOutcome::success(artifact)
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_message_reads_common_payloads() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new(String::from("bang"))), "bang");
        assert_eq!(panic_message(Box::new(42u8)), "unknown panic");
    }
}

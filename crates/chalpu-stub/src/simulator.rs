//! In-memory job store: every status read moves a job one stage forward.

use chalpu_types::{ExtractionJob, ExtractionStatus};
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

pub const QUEUED_STEP: &str = "대기중";
pub const COMPLETED_STEP: &str = "완료";
pub const UNREADABLE_IMAGE_MESSAGE: &str = "이미지를 인식할 수 없습니다";
pub const DEFAULT_RETAINED_JOBS: usize = 1024;

/// One intermediate `PROCESSING` snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub progress: u8,
    pub step: String,
}

impl Stage {
    pub fn new(progress: u8, step: impl Into<String>) -> Self {
        Self {
            progress,
            step: step.into(),
        }
    }
}

/// Stored job plus bookkeeping.
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub store_id: String,
    pub image_bytes: usize,
    pub job: ExtractionJob,
    pub reads: u32,
    pub created_at: String,
    pub updated_at: String,
}

struct SimulatedJob {
    seq: u64,
    record: JobRecord,
    remaining: VecDeque<ExtractionJob>,
}

/// Simulated extraction service.
///
/// A job walks through the configured stages, one per status read, then reports
/// `COMPLETED`. An empty image fails on its second read with
/// [`UNREADABLE_IMAGE_MESSAGE`].
///
/// At most `retain_limit` jobs are kept: a submission that would exceed it evicts the
/// oldest settled jobs first. Jobs still processing are never evicted.
pub struct SimulatedExtractor {
    jobs: RwLock<HashMap<String, SimulatedJob>>,
    stages: Vec<Stage>,
    retain_limit: usize,
    next_seq: AtomicU64,
}

impl SimulatedExtractor {
    pub fn new(stages: Vec<Stage>) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            stages,
            retain_limit: DEFAULT_RETAINED_JOBS,
            next_seq: AtomicU64::new(0),
        }
    }

    pub fn with_retain_limit(mut self, limit: usize) -> Self {
        self.retain_limit = limit.max(1);
        self
    }

    pub async fn submit(&self, store_id: &str, image_bytes: usize) -> String {
        let request_id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let remaining = self.script(image_bytes, &request_id);
        let job = ExtractionJob::processing(0, QUEUED_STEP).with_request_id(&request_id);
        let record = JobRecord {
            store_id: store_id.to_string(),
            image_bytes,
            job,
            reads: 0,
            created_at: now.clone(),
            updated_at: now,
        };
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let mut guard = self.jobs.write().await;
        if guard.len() >= self.retain_limit {
            let excess = guard.len() + 1 - self.retain_limit;
            evict_settled(&mut guard, excess);
        }
        guard.insert(
            request_id.clone(),
            SimulatedJob {
                seq,
                record,
                remaining,
            },
        );
        request_id
    }

    fn script(&self, image_bytes: usize, request_id: &str) -> VecDeque<ExtractionJob> {
        let mut script: VecDeque<ExtractionJob> = if image_bytes == 0 {
            let first = self
                .stages
                .first()
                .cloned()
                .unwrap_or_else(|| Stage::new(10, "분석중"));
            VecDeque::from([
                ExtractionJob::processing(first.progress, first.step),
                ExtractionJob::failed(UNREADABLE_IMAGE_MESSAGE),
            ])
        } else {
            self.stages
                .iter()
                .map(|s| ExtractionJob::processing(s.progress, s.step.clone()))
                .chain(std::iter::once(ExtractionJob {
                    current_step: COMPLETED_STEP.to_string(),
                    ..ExtractionJob::completed()
                }))
                .collect()
        };
        for job in script.iter_mut() {
            job.request_id = request_id.to_string();
        }
        script
    }

    /// Status read: advance one stage and return the new snapshot.
    /// Terminal jobs stay where they are. `None` for unknown ids.
    pub async fn advance(&self, request_id: &str) -> Option<ExtractionJob> {
        let mut guard = self.jobs.write().await;
        let sim = guard.get_mut(request_id)?;
        sim.record.reads += 1;
        if !sim.record.job.status.is_terminal() {
            if let Some(next) = sim.remaining.pop_front() {
                sim.record.job = next;
                sim.record.updated_at = Utc::now().to_rfc3339();
                if sim.record.job.status == ExtractionStatus::Completed {
                    tracing::info!(request_id = %request_id, "simulated extraction completed");
                }
            }
        }
        Some(sim.record.job.clone())
    }

    /// Current record without advancing.
    pub async fn record(&self, request_id: &str) -> Option<JobRecord> {
        let guard = self.jobs.read().await;
        guard.get(request_id).map(|s| s.record.clone())
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Remove up to `count` terminal jobs, oldest submission first.
fn evict_settled(jobs: &mut HashMap<String, SimulatedJob>, count: usize) {
    let mut settled: Vec<(u64, String)> = jobs
        .iter()
        .filter(|(_, j)| j.record.job.status.is_terminal())
        .map(|(id, j)| (j.seq, id.clone()))
        .collect();
    settled.sort_unstable();
    for (_, id) in settled.into_iter().take(count) {
        jobs.remove(&id);
        tracing::debug!(request_id = %id, "evicted settled simulated job");
    }
}

impl Default for SimulatedExtractor {
    fn default() -> Self {
        Self::new(vec![
            Stage::new(10, "분석중"),
            Stage::new(45, "분석중"),
            Stage::new(80, "저장중"),
        ])
    }
}

//! Bounded parallel conversion pool
//!
//! A fixed set of worker lanes pulls page jobs from a shared FIFO queue,
//! runs the processing pipeline and the page codec, and reports back on a
//! completion channel. Completion arrives out of order; results land in a
//! pre-sized slot array indexed by source position, so reassembly needs
//! no locks.
//!
//! Failure policy is sticky: the first lane fault tears the parallel pool
//! down for the rest of the batch and every remaining job (queued and
//! new) runs sequentially on the gathering thread with the exact same
//! job logic.

use std::collections::{HashMap, VecDeque};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use flume::{Receiver, Sender};
use log::{debug, error, warn};

use crate::codec::{EncodedPage, encode_page};
use crate::error::ConvertError;
use crate::options::ConversionOptions;
use crate::preview::render_preview;
use crate::processor;
use crate::source::SourcePage;

/// Lane count bounds; the heuristic never exceeds these.
pub const MIN_LANES: usize = 1;
pub const MAX_LANES: usize = 6;

/// Unique identifier for submitted jobs
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct JobId(pub u64);

/// One unit of work: convert a single source page
#[derive(Clone)]
pub struct ConvertJob {
    pub id: JobId,
    /// 0-based slot in the results array
    pub source_index: usize,
    pub page: Arc<SourcePage>,
    pub options: Arc<ConversionOptions>,
    pub wants_preview: bool,
}

/// Everything one job produces. A page that failed to decode yields an
/// empty page list, which downstream bookkeeping records as zero outputs.
#[derive(Debug, Default)]
pub struct JobOutput {
    pub pages: Vec<EncodedPage>,
    pub preview: Option<Vec<u8>>,
}

/// The job logic shared by parallel lanes and the sequential fallback.
/// An `Err` is a lane fault (the batch degrades to sequential); per-page
/// decode failures are handled inside and are not faults.
pub type JobRunner = Arc<dyn Fn(&ConvertJob) -> Result<JobOutput, String> + Send + Sync>;

enum LaneResponse {
    Done { id: JobId, output: JobOutput },
    Rejected { id: JobId },
    Fault { id: JobId, detail: String },
}

/// Lane count heuristic: leave one core for the coordinator, stay within
/// the `MIN_LANES..=MAX_LANES` bounds.
#[must_use]
pub fn default_lane_count() -> usize {
    std::thread::available_parallelism()
        .map_or(1, |n| n.get().saturating_sub(1))
        .clamp(MIN_LANES, MAX_LANES)
}

/// Worker pool for one conversion batch.
pub struct ConversionPool {
    request_tx: Option<Sender<ConvertJob>>,
    response_rx: Receiver<LaneResponse>,
    poisoned: Arc<AtomicBool>,
    pending: HashMap<JobId, ConvertJob>,
    fallback_queue: VecDeque<ConvertJob>,
    results: Vec<Option<JobOutput>>,
    fallback_active: bool,
    destroyed: bool,
    next_job_id: u64,
    lanes: usize,
    runner: JobRunner,
}

impl ConversionPool {
    /// Pool with the default lane heuristic, pre-sized for `page_count`
    /// source pages.
    #[must_use]
    pub fn new(page_count: usize) -> Self {
        Self::with_config(page_count, default_lane_count())
    }

    #[must_use]
    pub fn with_config(page_count: usize, lanes: usize) -> Self {
        Self::with_runner(page_count, lanes, Arc::new(run_conversion_job))
    }

    /// Pool with injected job logic. Production code uses the default
    /// runner; tests inject failing or instrumented runners.
    #[must_use]
    pub fn with_runner(page_count: usize, lanes: usize, runner: JobRunner) -> Self {
        let lanes = lanes.clamp(MIN_LANES, MAX_LANES);
        let poisoned = Arc::new(AtomicBool::new(false));

        // flume gives us MPMC channels: every lane clones the request
        // receiver and pulls from the shared queue, which mpsc cannot do.
        let (request_tx, request_rx) = flume::unbounded::<ConvertJob>();
        let (response_tx, response_rx) = flume::unbounded();

        for lane in 0..lanes {
            let rx = request_rx.clone();
            let tx = response_tx.clone();
            let flag = Arc::clone(&poisoned);
            let job_runner = Arc::clone(&runner);

            std::thread::spawn(move || {
                conversion_lane(lane, &rx, &tx, &flag, &job_runner);
            });
        }

        let mut results = Vec::with_capacity(page_count);
        results.resize_with(page_count, || None);

        Self {
            request_tx: Some(request_tx),
            response_rx,
            poisoned,
            pending: HashMap::new(),
            fallback_queue: VecDeque::new(),
            results,
            fallback_active: false,
            destroyed: false,
            next_job_id: 1,
            lanes,
            runner,
        }
    }

    #[must_use]
    pub fn lanes(&self) -> usize {
        self.lanes
    }

    /// Whether the batch has degraded to the sequential fallback lane.
    #[must_use]
    pub fn is_fallback(&self) -> bool {
        self.fallback_active
    }

    /// Queue one page for conversion. Non-blocking; completion is
    /// collected by [`ConversionPool::gather`].
    pub fn submit(
        &mut self,
        source_index: usize,
        page: Arc<SourcePage>,
        options: Arc<ConversionOptions>,
        wants_preview: bool,
    ) -> Result<JobId, ConvertError> {
        if self.destroyed {
            return Err(ConvertError::PoolDestroyed);
        }
        debug_assert!(source_index < self.results.len(), "slot out of range");

        let id = JobId(self.next_job_id);
        self.next_job_id += 1;

        let job = ConvertJob {
            id,
            source_index,
            page,
            options,
            wants_preview,
        };

        if self.fallback_active {
            self.fallback_queue.push_back(job);
        } else {
            self.pending.insert(id, job.clone());
            if let Some(tx) = &self.request_tx {
                let _ = tx.send(job);
            }
        }

        Ok(id)
    }

    /// Wait for every submitted job, running fallback jobs sequentially
    /// if a lane faulted. `on_complete` fires once per finished source
    /// page with its slot index and output; the returned array holds the
    /// same outputs indexed by slot. Slots stay `None` only when the pool
    /// was destroyed before their job could run.
    pub fn gather(&mut self, mut on_complete: impl FnMut(usize, &JobOutput)) -> Vec<Option<JobOutput>> {
        while !self.pending.is_empty() {
            match self.response_rx.recv() {
                Ok(LaneResponse::Done { id, output }) => {
                    // Match by job id; a response for an unknown id is
                    // stale and dropped.
                    if let Some(job) = self.pending.remove(&id) {
                        // Destruction rejects in-flight jobs too, even
                        // ones whose lane finished before noticing.
                        if self.destroyed {
                            continue;
                        }
                        on_complete(job.source_index, &output);
                        self.results[job.source_index] = Some(output);
                    } else {
                        warn!("dropping stale completion for job {id:?}");
                    }
                }

                Ok(LaneResponse::Rejected { id }) => {
                    if let Some(job) = self.pending.remove(&id) {
                        if !self.destroyed {
                            self.fallback_queue.push_back(job);
                        }
                    }
                }

                Ok(LaneResponse::Fault { id, detail }) => {
                    error!("worker lane fault: {detail}; batch continues sequentially");
                    self.enter_fallback();
                    // The faulted job was never completed; retry it on
                    // the fallback lane.
                    if let Some(job) = self.pending.remove(&id) {
                        self.fallback_queue.push_back(job);
                    }
                }

                Err(_) => break, // every lane exited
            }
        }

        // Jobs whose queue messages died with the lanes still need to run.
        if !self.pending.is_empty() && !self.destroyed {
            let mut orphans: Vec<ConvertJob> = self.pending.drain().map(|(_, job)| job).collect();
            orphans.sort_by_key(|job| job.id.0);
            self.fallback_queue.extend(orphans);
        }
        self.pending.clear();

        self.run_fallback_queue(&mut on_complete);

        let slots = self.results.len();
        let taken = std::mem::take(&mut self.results);
        self.results.resize_with(slots, || None);
        taken
    }

    fn run_fallback_queue(&mut self, on_complete: &mut impl FnMut(usize, &JobOutput)) {
        if self.destroyed {
            self.fallback_queue.clear();
            return;
        }

        while let Some(job) = self.fallback_queue.pop_front() {
            let runner = Arc::clone(&self.runner);
            match catch_unwind(AssertUnwindSafe(|| runner(&job))) {
                Ok(Ok(output)) => {
                    on_complete(job.source_index, &output);
                    self.results[job.source_index] = Some(output);
                }
                Ok(Err(detail)) => {
                    error!(
                        "fallback lane failed on page {}: {detail}",
                        job.page.number
                    );
                    on_complete(job.source_index, &JobOutput::default());
                    self.results[job.source_index] = Some(JobOutput::default());
                }
                Err(payload) => {
                    error!(
                        "fallback lane panicked on page {}: {}",
                        job.page.number,
                        panic_detail(payload.as_ref())
                    );
                    on_complete(job.source_index, &JobOutput::default());
                    self.results[job.source_index] = Some(JobOutput::default());
                }
            }
        }
    }

    fn enter_fallback(&mut self) {
        if self.fallback_active {
            return;
        }
        self.fallback_active = true;
        self.poisoned.store(true, Ordering::Release);
        // Dropping the sender disconnects the queue: lanes drain and
        // reject whatever is left, then exit.
        self.request_tx = None;
    }

    /// Tear the pool down: every queued and in-flight job is rejected and
    /// all lanes terminate. Safe to call more than once.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        self.poisoned.store(true, Ordering::Release);
        self.request_tx = None;
        self.fallback_queue.clear();
        debug!("conversion pool destroyed");
    }
}

impl Drop for ConversionPool {
    fn drop(&mut self) {
        self.destroy();
    }
}

fn conversion_lane(
    lane: usize,
    requests: &Receiver<ConvertJob>,
    responses: &Sender<LaneResponse>,
    poisoned: &AtomicBool,
    runner: &JobRunner,
) {
    for job in requests.iter() {
        if poisoned.load(Ordering::Acquire) {
            let _ = responses.send(LaneResponse::Rejected { id: job.id });
            continue;
        }

        match catch_unwind(AssertUnwindSafe(|| runner(&job))) {
            Ok(Ok(output)) => {
                let _ = responses.send(LaneResponse::Done { id: job.id, output });
            }
            Ok(Err(detail)) => {
                let _ = responses.send(LaneResponse::Fault { id: job.id, detail });
                break;
            }
            Err(payload) => {
                let _ = responses.send(LaneResponse::Fault {
                    id: job.id,
                    detail: panic_detail(payload.as_ref()),
                });
                break;
            }
        }
    }
    debug!("conversion lane {lane} exited");
}

fn panic_detail(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker lane panicked".to_string()
    }
}

/// Default job logic: decode, run the pipeline, encode every output page,
/// render the preview for the first one when asked.
fn run_conversion_job(job: &ConvertJob) -> Result<JobOutput, String> {
    let image = match image::load_from_memory(&job.page.data) {
        Ok(image) => image,
        Err(e) => {
            warn!(
                "page {} ({}): decode failed, skipping: {e}",
                job.page.number, job.page.path
            );
            return Ok(JobOutput::default());
        }
    };

    let processed =
        processor::process(&image, &job.options, job.page.number).map_err(|e| e.to_string())?;
    let depth = job.options.device.bit_depth();

    let mut pages = Vec::with_capacity(processed.len());
    let mut preview = None;
    for (i, page) in processed.iter().enumerate() {
        if i == 0 && job.wants_preview {
            preview = render_preview(&page.image).ok();
        }
        let (w, h) = page.image.dimensions();
        let data = encode_page(&page.image, depth).map_err(|e| e.to_string())?;
        pages.push(EncodedPage {
            name: page.name.clone(),
            width: w as u16,
            height: h as u16,
            data,
        });
    }

    Ok(JobOutput { pages, preview })
}

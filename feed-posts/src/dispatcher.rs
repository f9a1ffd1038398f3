use crate::pipeline::FeedPipeline;
use crate::rate_limit::RateLimiter;
use crate::types::{FeedIdentifier, FeedReport, IngestConfig, IngestError, RunSummary};
use futures::future::join_all;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

type WorkQueue = Arc<Mutex<mpsc::Receiver<FeedIdentifier>>>;

#[derive(Default)]
struct WorkerOutcome {
    reports: Vec<FeedReport>,
    panicked: Vec<FeedIdentifier>,
}

/// Feeds identifiers to a fixed pool of workers at a bounded rate.
pub struct Dispatcher {
    pipeline: Arc<FeedPipeline>,
    config: IngestConfig,
    cancel: CancellationToken,
}

impl Dispatcher {
    pub fn new(pipeline: FeedPipeline, config: IngestConfig, cancel: CancellationToken) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            config,
            cancel,
        }
    }

    /// Dispatch every identifier (until cancelled), wait for the pool to go
    /// idle, then drain the error channel.
    pub async fn run(&self, identifiers: Vec<FeedIdentifier>) -> RunSummary {
        let total = identifiers.len();
        let (queue_tx, queue_rx) = mpsc::channel::<FeedIdentifier>(self.config.queue_capacity.max(1));
        let queue: WorkQueue = Arc::new(Mutex::new(queue_rx));
        let (error_tx, mut error_rx) = mpsc::unbounded_channel::<IngestError>();

        info!(
            "Starting {} workers for {} feeds at {}/s",
            self.config.workers, total, self.config.rate_per_second
        );

        let workers: Vec<_> = (0..self.config.workers)
            .map(|id| {
                let pipeline = self.pipeline.clone();
                let queue = queue.clone();
                let errors = error_tx.clone();
                tokio::spawn(run_worker(id, pipeline, queue, errors).instrument(info_span!("worker", id)))
            })
            .collect();
        drop(error_tx);

        let mut summary = RunSummary::default();
        let mut limiter = RateLimiter::per_second(self.config.rate_per_second);

        for identifier in identifiers {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    summary.cancelled = true;
                    break;
                }
                _ = limiter.wait() => {}
            }

            debug!("Sending feed to worker: {}", identifier);
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    summary.cancelled = true;
                    break;
                }
                sent = queue_tx.send(identifier) => {
                    if let Err(mpsc::error::SendError(identifier)) = sent {
                        error!("Work queue closed before {} could be dispatched", identifier);
                        break;
                    }
                    summary.dispatched += 1;
                }
            }
        }

        if summary.cancelled {
            warn!("Dispatch cancelled after {}/{} feeds", summary.dispatched, total);
        } else {
            info!("Dispatched {} feeds, waiting for workers", summary.dispatched);
        }
        drop(queue_tx);

        for joined in join_all(workers).await {
            match joined {
                Ok(outcome) => {
                    for report in &outcome.reports {
                        summary.record_report(report);
                    }
                    for identifier in outcome.panicked {
                        summary.record_panic(identifier);
                    }
                }
                Err(e) => {
                    error!("Worker task failed: {}", e);
                    summary.failed += 1;
                    summary.lost_workers += 1;
                }
            }
        }

        // Every sender is gone once the workers have returned.
        while let Some(err) = error_rx.recv().await {
            error!("Worker error: {}", err);
            summary.failed += 1;
            summary.record_error(&err);
        }

        summary
    }
}

async fn run_worker(
    id: usize,
    pipeline: Arc<FeedPipeline>,
    queue: WorkQueue,
    errors: mpsc::UnboundedSender<IngestError>,
) -> WorkerOutcome {
    let mut outcome = WorkerOutcome::default();

    loop {
        let next = queue.lock().await.recv().await;
        let Some(identifier) = next else {
            break;
        };

        let span = info_span!("feed", identifier = %identifier);
        let processed = AssertUnwindSafe(pipeline.process(&identifier).instrument(span))
            .catch_unwind()
            .await;
        match processed {
            Ok(Ok(report)) => outcome.reports.push(report),
            Ok(Err(e)) => {
                if errors.send(IngestError::for_feed(identifier, e)).is_err() {
                    warn!("Error channel closed, dropping error");
                }
            }
            Err(_) => {
                error!("Processing panicked for feed: {}", identifier);
                outcome.panicked.push(identifier);
            }
        }
    }

    debug!("Worker {} done after {} feeds", id, outcome.reports.len());
    outcome
}

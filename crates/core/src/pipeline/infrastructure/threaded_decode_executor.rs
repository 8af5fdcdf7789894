use std::any::Any;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::ScopedJoinHandle;

use crossbeam_channel::{Receiver, Sender};

use crate::features::domain::feature_source::{FeatureSource, Utterance};
use crate::pipeline::decode_executor::{
    decode_entry, DecodeExecutor, OutcomeHandler, RunEnd, SessionControl, UtteranceOutcome,
};
use crate::pipeline::utterance_decoder::UtteranceDecoder;
use crate::shared::decode_error::DecodeError;

const QUEUED_PER_WORKER: usize = 2;

type Entry = (usize, Result<Utterance, DecodeError>);
type Outcome = (usize, UtteranceOutcome);

/// Decodes utterances on a pool of worker threads.
///
/// Layout: `reader → workers (N) → calling thread [reorder/report]`
///
/// The reader prefetches entries from the source while workers decode.
/// Outcomes are tagged with their source position and reported in source
/// order, so sinks see the same sequence as with sequential execution.
/// Stop conditions are checked by the reader before each read and by
/// workers before each decode; entries prefetched but not yet decoded when
/// a stop is seen are dropped unreported.
pub struct ThreadedDecodeExecutor {
    num_workers: usize,
    channel_capacity: usize,
}

impl ThreadedDecodeExecutor {
    pub fn new(num_workers: usize) -> Self {
        let num_workers = num_workers.max(1);
        Self {
            num_workers,
            channel_capacity: num_workers * QUEUED_PER_WORKER,
        }
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }
}

impl DecodeExecutor for ThreadedDecodeExecutor {
    fn execute(
        &self,
        source: Box<dyn FeatureSource>,
        decoder: &UtteranceDecoder,
        control: &SessionControl,
        on_outcome: &mut OutcomeHandler<'_>,
    ) -> Result<RunEnd, DecodeError> {
        let cap = self.channel_capacity;
        let aborted = AtomicBool::new(false);
        let aborted = &aborted;

        let (entry_tx, entry_rx) = crossbeam_channel::bounded::<Entry>(cap);
        let (outcome_tx, outcome_rx) = crossbeam_channel::bounded::<Outcome>(cap);

        std::thread::scope(|scope| {
            let reader_handle =
                scope.spawn(move || run_reader(source, entry_tx, control, aborted));

            let worker_handles: Vec<_> = (0..self.num_workers)
                .map(|_| {
                    let entry_rx = entry_rx.clone();
                    let outcome_tx = outcome_tx.clone();
                    scope.spawn(move || run_worker(decoder, entry_rx, outcome_tx, control, aborted))
                })
                .collect();
            drop(entry_rx);
            drop(outcome_tx);

            let delivered = deliver_in_order(outcome_rx, on_outcome);
            if delivered.is_err() {
                aborted.store(true, Ordering::Relaxed);
            }

            let joined = join_threads(reader_handle, worker_handles);
            delivered?;
            joined
        })
    }
}

fn run_reader(
    mut source: Box<dyn FeatureSource>,
    entry_tx: Sender<Entry>,
    control: &SessionControl,
    aborted: &AtomicBool,
) -> RunEnd {
    for seq in 0.. {
        if aborted.load(Ordering::Relaxed) {
            break;
        }
        if let Some(end) = control.stop_reason() {
            return end;
        }
        let Some(entry) = source.next_utterance() else {
            break;
        };
        if entry_tx.send((seq, entry)).is_err() {
            break;
        }
    }
    RunEnd::Exhausted
}

/// Returns the stop reason if the worker dropped entries because of it.
fn run_worker(
    decoder: &UtteranceDecoder,
    entry_rx: Receiver<Entry>,
    outcome_tx: Sender<Outcome>,
    control: &SessionControl,
    aborted: &AtomicBool,
) -> Option<RunEnd> {
    for (seq, entry) in entry_rx {
        if aborted.load(Ordering::Relaxed) {
            return None;
        }
        if let Some(end) = control.stop_reason() {
            return Some(end);
        }
        if outcome_tx.send((seq, decode_entry(decoder, entry))).is_err() {
            return None;
        }
    }
    None
}

/// Reports outcomes in source order. Consumes the receiver so that workers
/// see a closed channel as soon as reporting stops.
fn deliver_in_order(
    outcome_rx: Receiver<Outcome>,
    on_outcome: &mut OutcomeHandler<'_>,
) -> Result<(), DecodeError> {
    let mut pending: BTreeMap<usize, UtteranceOutcome> = BTreeMap::new();
    let mut next = 0;
    for (seq, outcome) in outcome_rx {
        pending.insert(seq, outcome);
        while let Some(outcome) = pending.remove(&next) {
            on_outcome(outcome)?;
            next += 1;
        }
    }
    // Gaps remain only when entries were dropped on stop or a worker died.
    for outcome in pending.into_values() {
        on_outcome(outcome)?;
    }
    Ok(())
}

fn join_threads(
    reader_handle: ScopedJoinHandle<'_, RunEnd>,
    worker_handles: Vec<ScopedJoinHandle<'_, Option<RunEnd>>>,
) -> Result<RunEnd, DecodeError> {
    let mut first_error = None;
    let mut end = match reader_handle.join() {
        Ok(end) => end,
        Err(panic) => {
            first_error = Some(worker_panic("reader", panic));
            RunEnd::Exhausted
        }
    };

    for handle in worker_handles {
        match handle.join() {
            Ok(Some(stopped)) if end == RunEnd::Exhausted => end = stopped,
            Ok(_) => {}
            Err(panic) => {
                if first_error.is_none() {
                    first_error = Some(worker_panic("decode worker", panic));
                }
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(end),
    }
}

fn worker_panic(thread: &str, panic: Box<dyn Any + Send>) -> DecodeError {
    let message = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    DecodeError::WorkerPanic(format!("{thread} thread panicked: {message}"))
}

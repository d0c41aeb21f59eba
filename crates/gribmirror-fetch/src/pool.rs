//! Dispatcher that turns queued intents into fetch tasks.
//!
//! # Design
//! - A single dispatcher consumes the queue and spawns one task per intent.
//!   Admission is bounded by the semaphore in [`FetchContext`], not by the
//!   number of spawned tasks.
//! - Two intents for the same local path never run together. The second is
//!   deferred until the first releases its [`PathClaim`](crate::PathClaim),
//!   preserving arrival order per path.
//! - On shutdown the dispatcher drains the queue and its deferred intents,
//!   counting them as abandoned.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::inflight::InFlightPaths;
use crate::queue::{FetchReceiver, QueuedIntent};
use crate::task::{FetchContext, run_fetch};

type Deferred = HashMap<PathBuf, VecDeque<QueuedIntent>>;

/// Handle to the running dispatcher.
pub struct FetchPool {
    dispatcher: JoinHandle<()>,
    shutdown: CancellationToken,
}

impl FetchPool {
    /// Start dispatching intents from `receiver`.
    #[must_use]
    pub fn spawn(ctx: Arc<FetchContext>, receiver: FetchReceiver) -> Self {
        let shutdown = ctx.shutdown.clone();
        let dispatcher = tokio::spawn(dispatch_loop(ctx, receiver));
        Self {
            dispatcher,
            shutdown,
        }
    }

    /// Cancel outstanding work and wait for the dispatcher to exit.
    ///
    /// Running tasks observe the same token and settle on their own; callers
    /// wait on the tracker for them.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(err) = self.dispatcher.await {
            warn!(error = %err, "fetch dispatcher did not exit cleanly");
        }
    }
}

async fn dispatch_loop(ctx: Arc<FetchContext>, mut receiver: FetchReceiver) {
    let (released_tx, mut released_rx) = mpsc::unbounded_channel();
    let in_flight = InFlightPaths::new(released_tx);
    let mut deferred = Deferred::new();

    loop {
        tokio::select! {
            biased;
            () = ctx.shutdown.cancelled() => break,
            Some(path) = released_rx.recv() => {
                if let Some(next) = take_deferred(&mut deferred, &path) {
                    dispatch(&ctx, &in_flight, &mut deferred, next, Slot::Front);
                }
            }
            queued = receiver.recv() => match queued {
                Some(queued) => dispatch(&ctx, &in_flight, &mut deferred, queued, Slot::Back),
                None => break,
            },
        }
    }

    let buffered = receiver.close().len();
    let waiting: usize = deferred.values().map(VecDeque::len).sum();
    let abandoned = u64::try_from(buffered + waiting).unwrap_or(u64::MAX);
    drop(deferred);
    if abandoned > 0 {
        ctx.stats.abandoned(abandoned);
        info!(abandoned, "dispatcher stopped with queued work");
    } else {
        debug!("dispatcher stopped");
    }
}

#[derive(Clone, Copy)]
enum Slot {
    Front,
    Back,
}

fn take_deferred(deferred: &mut Deferred, path: &Path) -> Option<QueuedIntent> {
    let waiting = deferred.get_mut(path)?;
    let next = waiting.pop_front();
    if waiting.is_empty() {
        deferred.remove(path);
    }
    next
}

fn dispatch(
    ctx: &Arc<FetchContext>,
    in_flight: &InFlightPaths,
    deferred: &mut Deferred,
    queued: QueuedIntent,
    slot: Slot,
) {
    let path = queued.intent.local_path();
    // A fresh arrival must not overtake intents already waiting on this path.
    let claim = match slot {
        Slot::Back if deferred.contains_key(&path) => None,
        _ => in_flight.try_claim(&path),
    };
    match claim {
        Some(claim) => {
            tokio::spawn(run_fetch(Arc::clone(ctx), queued, claim));
        }
        None => {
            debug!(local_path = %path.display(), "target busy; deferring");
            let waiting = deferred.entry(path).or_default();
            match slot {
                Slot::Front => waiting.push_front(queued),
                Slot::Back => waiting.push_back(queued),
            }
        }
    }
}

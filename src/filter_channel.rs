// THEORY:
// The `FilterChannel` is the transport between producers (one per image being
// shown) and the `GreenFilter`. It has no knowledge of what the filter does;
// it moves rasters in, runs the filter off the caller's task, and routes each
// result back to the producer that asked for it.
//
// Key architectural principles:
// 1.  **Worker pool**: each installed generation owns a dispatcher task and a
//     fixed set of worker tasks. The dispatcher hands tasks to workers round
//     robin; a worker runs the filter on a blocking thread so CPU-heavy rasters
//     never stall the async runtime.
// 2.  **Correlation**: every request carries a `RequestId` and the reply sender
//     of its producer's inbox. Responses go to that inbox only, never to other
//     producers, and completion order between requests is not guaranteed.
// 3.  **Generations**: `install` spawns a new pool and `activate` makes it the
//     only one allowed to deliver results. A task belonging to a superseded
//     generation is answered with `Cancelled`, either before it starts or right
//     after it finishes, so nothing is ever silently dropped.
// 4.  **Failure isolation**: a filter error or panic becomes an error response
//     for that one request. The worker keeps serving the next task.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ChannelConfig;
use crate::core_modules::green_filter::GreenFilter;
use crate::core_modules::raster::Raster;
use crate::errors::MaskError;
use crate::message::{FilterResponse, InboundMessage, ProducerId, RequestId};

type ReplySender = mpsc::UnboundedSender<FilterResponse>;

/// Lifecycle of a channel. Requests are accepted only while `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Uninstalled,
    Installing,
    Active,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChannelState::Uninstalled => "uninstalled",
            ChannelState::Installing => "installing",
            ChannelState::Active => "active",
        };
        f.write_str(name)
    }
}

struct FilterTask {
    request_id: RequestId,
    producer: ProducerId,
    raster: Raster,
    generation: u64,
    reply: ReplySender,
}

fn deliver(reply: &ReplySender, producer: ProducerId, response: FilterResponse) {
    let request_id = response.request_id;
    if reply.send(response).is_err() {
        debug!(%producer, %request_id, "producer gone, response discarded");
    }
}

struct WorkerPool {
    generation: u64,
    task_sender: mpsc::UnboundedSender<FilterTask>,
    dispatcher: JoinHandle<()>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    fn spawn(generation: u64, config: &ChannelConfig, active_generation: Arc<AtomicU64>) -> Self {
        let worker_count = config.worker_count.max(1);
        let (task_sender, mut task_receiver) = mpsc::unbounded_channel::<FilterTask>();

        let (worker_senders, worker_receivers): (Vec<_>, Vec<_>) = (0..worker_count)
            .map(|_| mpsc::unbounded_channel::<FilterTask>())
            .unzip();

        // Round-robin dispatcher; ends once the pool's sender is dropped and
        // the queue is drained.
        let dispatcher = tokio::spawn(async move {
            let mut worker_idx = 0;
            while let Some(task) = task_receiver.recv().await {
                if let Err(mpsc::error::SendError(task)) = worker_senders[worker_idx].send(task) {
                    warn!(generation, request_id = %task.request_id, "worker unavailable");
                    let response = FilterResponse {
                        request_id: task.request_id,
                        outcome: Err(MaskError::WorkerFailed(task.request_id)),
                    };
                    deliver(&task.reply, task.producer, response);
                }
                worker_idx = (worker_idx + 1) % worker_count;
            }
        });

        let filter = GreenFilter::new(config.filter);
        let workers = worker_receivers
            .into_iter()
            .map(|mut worker_receiver| {
                let active_generation = Arc::clone(&active_generation);
                tokio::spawn(async move {
                    while let Some(task) = worker_receiver.recv().await {
                        Self::process_task(filter, &active_generation, task).await;
                    }
                })
            })
            .collect();

        Self {
            generation,
            task_sender,
            dispatcher,
            workers,
        }
    }

    async fn process_task(filter: GreenFilter, active_generation: &AtomicU64, task: FilterTask) {
        let FilterTask {
            request_id,
            producer,
            raster,
            generation,
            reply,
        } = task;
        let is_current = || active_generation.load(Ordering::Acquire) == generation;

        if !is_current() {
            debug!(%producer, %request_id, generation, "stale generation, request cancelled");
            let response = FilterResponse {
                request_id,
                outcome: Err(MaskError::Cancelled(request_id)),
            };
            deliver(&reply, producer, response);
            return;
        }

        let outcome = match tokio::task::spawn_blocking(move || filter.apply(raster)).await {
            Ok(outcome) => outcome,
            Err(join_error) => {
                warn!(%producer, %request_id, error = %join_error, "filter worker failed");
                Err(MaskError::WorkerFailed(request_id))
            }
        };

        // Superseded while filtering: the new generation owns delivery now.
        let outcome = if is_current() {
            outcome
        } else {
            Err(MaskError::Cancelled(request_id))
        };

        debug!(%producer, %request_id, generation, ok = outcome.is_ok(), "request finished");
        deliver(&reply, producer, FilterResponse { request_id, outcome });
    }

    fn submit(&self, task: FilterTask) -> Result<(), MaskError> {
        self.task_sender
            .send(task)
            .map_err(|_| MaskError::ChannelClosed)
    }

    /// Closes the queue and waits for every queued task to be answered.
    async fn drain(self) {
        drop(self.task_sender);
        let _ = self.dispatcher.await;
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

struct ChannelInner {
    state: ChannelState,
    /// Last generation number handed out.
    generation: u64,
    active: Option<WorkerPool>,
    waiting: Option<WorkerPool>,
}

struct ChannelShared {
    config: ChannelConfig,
    inner: Mutex<ChannelInner>,
    active_generation: Arc<AtomicU64>,
    next_producer: AtomicU64,
}

/// Background filter service shared by any number of producers.
///
/// Cloning is cheap; every clone addresses the same channel. `install` and
/// `activate` spawn Tokio tasks and must be called from within a runtime.
#[derive(Clone)]
pub struct FilterChannel {
    shared: Arc<ChannelShared>,
}

impl FilterChannel {
    pub fn new(config: ChannelConfig) -> Self {
        Self {
            shared: Arc::new(ChannelShared {
                config,
                inner: Mutex::new(ChannelInner {
                    state: ChannelState::Uninstalled,
                    generation: 0,
                    active: None,
                    waiting: None,
                }),
                active_generation: Arc::new(AtomicU64::new(0)),
                next_producer: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.shared.config
    }

    pub fn state(&self) -> ChannelState {
        self.lock().state
    }

    /// Generation of the pool currently serving requests.
    pub fn active_generation(&self) -> Option<u64> {
        self.lock().active.as_ref().map(|pool| pool.generation)
    }

    fn lock(&self) -> MutexGuard<'_, ChannelInner> {
        self.shared
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawns a new worker generation and enters `Installing`.
    ///
    /// With `skip_waiting` set the new generation is activated immediately,
    /// superseding whatever was active before. Returns the new generation.
    pub fn install(&self) -> u64 {
        let mut inner = self.lock();
        inner.generation += 1;
        let generation = inner.generation;

        let pool = WorkerPool::spawn(
            generation,
            &self.shared.config,
            Arc::clone(&self.shared.active_generation),
        );
        if let Some(previous) = inner.waiting.replace(pool) {
            debug!(superseded = previous.generation, "discarding waiting generation");
        }
        inner.state = ChannelState::Installing;
        info!(
            generation,
            workers = self.shared.config.worker_count.max(1),
            "filter channel installing"
        );

        if self.shared.config.skip_waiting {
            self.promote(&mut inner);
        }
        generation
    }

    /// Makes the installed generation the only one allowed to deliver results.
    ///
    /// Producers address the channel rather than a pool, so every existing
    /// producer is served by the new generation from its next request on.
    /// Activating an already active channel is a no-op.
    pub fn activate(&self) -> Result<u64, MaskError> {
        let mut inner = self.lock();
        if inner.waiting.is_some() {
            return Ok(self.promote(&mut inner));
        }
        match (inner.state, inner.active.as_ref()) {
            (ChannelState::Active, Some(pool)) => Ok(pool.generation),
            (state, _) => Err(MaskError::ChannelInactive(state)),
        }
    }

    fn promote(&self, inner: &mut ChannelInner) -> u64 {
        let Some(pool) = inner.waiting.take() else {
            return self.shared.active_generation.load(Ordering::Acquire);
        };
        let generation = pool.generation;
        self.shared
            .active_generation
            .store(generation, Ordering::Release);

        // Dropping the old pool closes its queue; whatever it still holds is
        // answered with `Cancelled` by its own workers.
        if let Some(previous) = inner.active.replace(pool) {
            info!(superseded = previous.generation, "previous generation retired");
        }
        inner.state = ChannelState::Active;
        info!(generation, "filter channel active");
        generation
    }

    /// Returns to `Uninstalled`, cancels queued work and waits for the workers
    /// to exit.
    pub async fn shutdown(&self) {
        let pools = {
            let mut inner = self.lock();
            inner.state = ChannelState::Uninstalled;
            // A generation no pool owns, so every queued task reads as stale.
            inner.generation += 1;
            self.shared
                .active_generation
                .store(inner.generation, Ordering::Release);
            [inner.active.take(), inner.waiting.take()]
        };
        for pool in pools.into_iter().flatten() {
            pool.drain().await;
        }
        info!("filter channel shut down");
    }

    /// A new producer with its own inbox.
    pub fn producer(&self) -> Producer {
        let id = ProducerId(self.shared.next_producer.fetch_add(1, Ordering::Relaxed));
        let (inbox_sender, inbox) = mpsc::unbounded_channel();
        Producer {
            id,
            channel: self.clone(),
            next_request: 0,
            inbox_sender,
            inbox,
            in_flight: HashSet::new(),
            parked: HashMap::new(),
            abandoned: HashSet::new(),
        }
    }

    /// Handles one inbound message. Unknown message types are ignored.
    fn dispatch(
        &self,
        producer: ProducerId,
        message: InboundMessage,
        reply: &ReplySender,
    ) -> Result<Option<RequestId>, MaskError> {
        match message {
            InboundMessage::ImageData {
                request_id,
                image_data,
            } => {
                self.submit(producer, request_id, image_data, reply.clone())?;
                Ok(Some(request_id))
            }
            InboundMessage::Unknown => {
                debug!(%producer, "ignoring unknown message type");
                Ok(None)
            }
        }
    }

    fn submit(
        &self,
        producer: ProducerId,
        request_id: RequestId,
        raster: Raster,
        reply: ReplySender,
    ) -> Result<(), MaskError> {
        let inner = self.lock();
        let pool = match (inner.state, inner.active.as_ref()) {
            (ChannelState::Active, Some(pool)) => pool,
            (state, _) => {
                debug!(%producer, %request_id, %state, "request rejected");
                return Err(MaskError::ChannelInactive(state));
            }
        };
        debug!(%producer, %request_id, generation = pool.generation, "request queued");
        pool.submit(FilterTask {
            request_id,
            producer,
            raster,
            generation: pool.generation,
            reply,
        })
    }
}

/// One requester attached to a `FilterChannel`, typically one per image.
///
/// Responses land in the producer's own inbox. Responses that arrive while
/// waiting for a different request are parked and handed out later; responses
/// to discarded requests are dropped on arrival. Once nothing is in flight and
/// nothing is parked, `recv` returns `None` instead of waiting.
pub struct Producer {
    id: ProducerId,
    channel: FilterChannel,
    next_request: u64,
    inbox_sender: ReplySender,
    inbox: mpsc::UnboundedReceiver<FilterResponse>,
    /// Requests sent whose responses have not come out of the inbox yet.
    in_flight: HashSet<RequestId>,
    parked: HashMap<RequestId, FilterResponse>,
    /// Subset of `in_flight` whose responses are dropped on arrival.
    abandoned: HashSet<RequestId>,
}

impl Producer {
    pub fn id(&self) -> ProducerId {
        self.id
    }

    pub fn channel(&self) -> &FilterChannel {
        &self.channel
    }

    /// Number of requests still waiting for a response from the channel.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    fn is_outstanding(&self, request_id: RequestId) -> bool {
        self.in_flight.contains(&request_id) || self.parked.contains_key(&request_id)
    }

    fn next_request_id(&mut self) -> RequestId {
        loop {
            let request_id = RequestId(self.next_request);
            self.next_request = self.next_request.wrapping_add(1);
            if !self.is_outstanding(request_id) {
                return request_id;
            }
        }
    }

    /// Sends `raster` for filtering without waiting. The returned id pairs it
    /// with its eventual response.
    pub fn post(&mut self, raster: Raster) -> Result<RequestId, MaskError> {
        let request_id = self.next_request_id();
        self.channel
            .submit(self.id, request_id, raster, self.inbox_sender.clone())?;
        self.in_flight.insert(request_id);
        Ok(request_id)
    }

    /// Sends a raw protocol message with a caller-chosen request id.
    ///
    /// An id that is still outstanding is rejected with `DuplicateRequest`.
    /// Ids handed out by `post` afterwards start past the accepted one.
    pub fn post_message(
        &mut self,
        message: InboundMessage,
    ) -> Result<Option<RequestId>, MaskError> {
        if let InboundMessage::ImageData { request_id, .. } = &message {
            if self.is_outstanding(*request_id) {
                return Err(MaskError::DuplicateRequest(*request_id));
            }
        }
        let accepted = self.channel.dispatch(self.id, message, &self.inbox_sender)?;
        if let Some(request_id) = accepted {
            self.in_flight.insert(request_id);
            self.next_request = self.next_request.max(request_id.0.saturating_add(1));
        }
        Ok(accepted)
    }

    /// Next response for any request, parked responses first. `None` once
    /// nothing is outstanding.
    pub async fn recv(&mut self) -> Option<FilterResponse> {
        if let Some(request_id) = self.parked.keys().next().copied() {
            return self.parked.remove(&request_id);
        }
        self.next_from_inbox().await
    }

    async fn next_from_inbox(&mut self) -> Option<FilterResponse> {
        while !self.in_flight.is_empty() {
            let response = self.inbox.recv().await?;
            self.in_flight.remove(&response.request_id);
            if self.abandoned.remove(&response.request_id) {
                debug!(producer = %self.id, request_id = %response.request_id, "discarding abandoned response");
                continue;
            }
            return Some(response);
        }
        None
    }

    /// Suspends until the response for `request_id` arrives.
    ///
    /// Fails with `UnknownRequest` when the id was never sent, or when its
    /// response has already been handed out.
    pub async fn wait_for(&mut self, request_id: RequestId) -> Result<Raster, MaskError> {
        if let Some(response) = self.parked.remove(&request_id) {
            return response.outcome;
        }
        if !self.in_flight.contains(&request_id) {
            return Err(MaskError::UnknownRequest(request_id));
        }
        // Waiting on a discarded request takes it back.
        self.abandoned.remove(&request_id);
        loop {
            let response = self
                .next_from_inbox()
                .await
                .ok_or(MaskError::ChannelClosed)?;
            if response.request_id == request_id {
                return response.outcome;
            }
            self.parked.insert(response.request_id, response);
        }
    }

    /// Gives up on `request_id`; its response is dropped when it arrives.
    /// Ids that are not outstanding are ignored.
    pub fn discard(&mut self, request_id: RequestId) {
        if self.parked.remove(&request_id).is_some() {
            return;
        }
        if self.in_flight.contains(&request_id) {
            self.abandoned.insert(request_id);
        }
    }

    /// Posts `raster` and waits for its mask, bounded by the channel's
    /// `response_timeout`.
    pub async fn filter(&mut self, raster: Raster) -> Result<Raster, MaskError> {
        let request_id = self.post(raster)?;
        let Some(limit) = self.channel.config().response_timeout else {
            return self.wait_for(request_id).await;
        };

        let waited = tokio::time::timeout(limit, self.wait_for(request_id)).await;
        match waited {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(producer = %self.id, %request_id, "timed out waiting for filter response");
                self.discard(request_id);
                Err(MaskError::TimedOut(request_id))
            }
        }
    }
}

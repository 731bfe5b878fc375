//! Dispatcher wiring both directions to their event sources.
//!
//! One pump task per watch stream decodes events into an [`EventChannel`];
//! one consumer task per channel hands each change to its handler in an
//! isolated tokio task with:
//! - a bound on concurrently running handlers
//! - optional in-order serialization per record identity
//! - timeout protection
//! - panic recovery

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use duplex_core::{Attributes, RecordKey, SharedRegistry};
use duplex_storage::{DynConnector, DynStore, WatchEvent, WatchStream};
use futures_util::{FutureExt, StreamExt};
use tokio::sync::{Semaphore, oneshot};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::channel::{Change, ChangeReceiver, ChangeSender, ChannelMessage, EventChannel};
use crate::clusters::ClusterSet;
use crate::error::SyncError;
use crate::fanin;
use crate::handler::ChangeHandler;
use crate::north::NorthPropagator;
use crate::render;
use crate::south::SouthIngestor;

/// Default timeout for one handler call.
const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(30);

/// Source name used for changes coming from the authoritative store.
pub const STORE_SOURCE: &str = "store";

/// Dispatcher tuning.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Store database holding the records and cluster registrations.
    pub database: String,
    /// Record kind reconciled by this service.
    pub kind: String,
    /// Per-channel queue capacity. Zero is raised to one.
    pub channel_capacity: usize,
    pub handler_timeout: Duration,
    /// Upper bound on concurrently running handler calls per channel.
    pub max_in_flight: usize,
    /// Serialize handler calls that touch the same record.
    pub serialize_per_record: bool,
    /// Replay existing store records to North on start.
    pub resync_on_start: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            database: "duplex".to_string(),
            kind: "SecurityGroup".to_string(),
            channel_capacity: 128,
            handler_timeout: DEFAULT_HANDLER_TIMEOUT,
            max_in_flight: 64,
            serialize_per_record: true,
            resync_on_start: true,
        }
    }
}

/// Per-record FIFO: each change waits for the previous change to the same
/// record to finish before its handler runs.
#[derive(Default)]
struct RecordQueues {
    tails: DashMap<RecordKey, (u64, oneshot::Receiver<()>)>,
    next_ticket: AtomicU64,
}

/// A change's place in its record queue.
struct Turn {
    key: RecordKey,
    ticket: u64,
    previous: Option<oneshot::Receiver<()>>,
    done: oneshot::Sender<()>,
}

impl RecordQueues {
    /// Must be called in arrival order.
    fn enqueue(&self, key: &RecordKey) -> Turn {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let (done, tail) = oneshot::channel();
        let previous = self
            .tails
            .insert(key.clone(), (ticket, tail))
            .map(|(_, previous)| previous);
        Turn {
            key: key.clone(),
            ticket,
            previous,
            done,
        }
    }

    /// Hands the record over to the next queued change, if any.
    fn finish(&self, turn: Turn) {
        let _ = turn.done.send(());
        self.tails
            .remove_if(&turn.key, |_, (ticket, _)| *ticket == turn.ticket);
    }
}

impl Turn {
    async fn wait(&mut self) {
        if let Some(previous) = self.previous.take() {
            // A dropped predecessor releases the record too.
            let _ = previous.await;
        }
    }
}

/// Runs one handler for every change arriving on a channel.
struct Dispatcher {
    handler: Arc<dyn ChangeHandler>,
    timeout: Duration,
    permits: Arc<Semaphore>,
    queues: Option<Arc<RecordQueues>>,
}

impl Dispatcher {
    async fn run(self, mut receiver: ChangeReceiver) {
        let name = self.handler.name().to_string();
        info!(handler = %name, "Starting dispatcher");

        loop {
            match receiver.recv().await {
                ChannelMessage::Change(change) => {
                    let Ok(permit) = self.permits.clone().acquire_owned().await else {
                        break;
                    };
                    let handler = self.handler.clone();
                    let queues = self.queues.clone();
                    let turn = queues.as_ref().map(|q| q.enqueue(&change.object.key()));
                    let timeout = self.timeout;
                    tokio::spawn(async move {
                        let mut turn = turn;
                        if let Some(turn) = turn.as_mut() {
                            turn.wait().await;
                        }
                        dispatch_one(handler.as_ref(), timeout, &change).await;
                        if let (Some(queues), Some(turn)) = (queues, turn) {
                            queues.finish(turn);
                        }
                        drop(permit);
                    });
                }
                ChannelMessage::Failed(e) => {
                    error!(handler = %name, error = %e, "Event source failed, stopping dispatcher");
                    break;
                }
                ChannelMessage::Closed => {
                    info!(handler = %name, "Event channel closed, stopping dispatcher");
                    break;
                }
            }
        }
    }
}

async fn dispatch_one(handler: &dyn ChangeHandler, timeout: Duration, change: &Change) {
    let key = change.object.key();
    let result = tokio::time::timeout(timeout, async {
        AssertUnwindSafe(handler.handle(change)).catch_unwind().await
    })
    .await;

    let handler_name = handler.name();
    match result {
        Ok(Ok(Ok(action))) => {
            debug!(
                handler = handler_name,
                key = %key,
                event_type = %change.event_type,
                source = %change.source,
                action = %action,
                "Change handled"
            );
        }
        Ok(Ok(Err(e))) if e.is_conflict() || e.is_decode() => {
            warn!(
                handler = handler_name,
                key = %key,
                event_type = %change.event_type,
                source = %change.source,
                error = %e,
                "Change rejected"
            );
        }
        Ok(Ok(Err(e))) => {
            error!(
                handler = handler_name,
                key = %key,
                event_type = %change.event_type,
                source = %change.source,
                error = %e,
                "Change handling failed"
            );
        }
        Ok(Err(panic)) => {
            let panic_msg = if let Some(s) = panic.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = panic.downcast_ref::<String>() {
                s.clone()
            } else {
                "Unknown panic".to_string()
            };
            error!(
                handler = handler_name,
                key = %key,
                panic = %panic_msg,
                "Handler panicked!"
            );
        }
        Err(_) => {
            error!(
                handler = handler_name,
                key = %key,
                timeout_secs = timeout.as_secs(),
                "Handler timed out"
            );
        }
    }
}

/// Turns a raw watch event into store attributes for the channel decoder.
type Translate = Arc<dyn Fn(&WatchEvent) -> Result<Attributes, SyncError> + Send + Sync>;

/// Feeds one watch stream into a channel until the stream ends, fails or
/// `cancel` fires.
async fn pump(
    mut stream: WatchStream,
    sender: ChangeSender,
    translate: Translate,
    cancel: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = stream.next() => next,
        };

        match next {
            Some(Ok(event)) => {
                let handled = match translate(&event) {
                    Ok(attributes) => sender.handle(event.event_type, &attributes).await,
                    Err(e) => Err(e),
                };
                match handled {
                    Ok(()) => {}
                    Err(SyncError::Channel(_)) => break,
                    Err(e) => {
                        warn!(
                            source = sender.source(),
                            kind = sender.kind(),
                            event_type = %event.event_type,
                            error = %e,
                            "Dropping undecodable event"
                        );
                    }
                }
            }
            Some(Err(e)) => {
                sender.fail(SyncError::external(sender.source(), e));
                return;
            }
            None => {
                info!(source = sender.source(), "Watch stream ended");
                break;
            }
        }
    }
    sender.close();
}

fn store_attributes(event: &WatchEvent) -> Result<Attributes, SyncError> {
    event.attributes().cloned().ok_or_else(|| {
        SyncError::Decode(duplex_core::DecodeError::Encoding(
            "store event payload is not an object".to_string(),
        ))
    })
}

/// Runs North and South for one record kind until cancelled.
///
/// # Example
///
/// ```ignore
/// let service = SyncService::new(store, connector, registry, SyncOptions::default());
/// let cancel = CancellationToken::new();
/// tokio::spawn({
///     let cancel = cancel.clone();
///     async move { tokio::signal::ctrl_c().await.ok(); cancel.cancel(); }
/// });
/// service.run(cancel).await?;
/// ```
pub struct SyncService {
    store: DynStore,
    connector: DynConnector,
    registry: SharedRegistry,
    clusters: Arc<ClusterSet>,
    options: SyncOptions,
}

impl SyncService {
    pub fn new(
        store: DynStore,
        connector: DynConnector,
        registry: SharedRegistry,
        options: SyncOptions,
    ) -> Self {
        Self {
            store,
            connector,
            registry,
            clusters: Arc::new(ClusterSet::new()),
            options,
        }
    }

    /// Clusters connected by the running fan-in; empty while stopped.
    pub fn clusters(&self) -> &Arc<ClusterSet> {
        &self.clusters
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    fn dispatcher(
        &self,
        handler: Arc<dyn ChangeHandler>,
        queues: Option<Arc<RecordQueues>>,
    ) -> Dispatcher {
        Dispatcher {
            handler,
            timeout: self.options.handler_timeout,
            permits: Arc::new(Semaphore::new(self.options.max_in_flight.max(1))),
            queues,
        }
    }

    /// Fans in, then pumps store and cluster events to their handlers until
    /// `cancel` fires or every event source has ended.
    ///
    /// # Errors
    ///
    /// Returns an error if the store watch or the cluster fan-in cannot be
    /// set up, or if the kind has no registered decoder. Handler failures are
    /// logged, never returned.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), SyncError> {
        let SyncOptions {
            database,
            kind,
            channel_capacity,
            ..
        } = &self.options;

        let watches =
            fanin::watch_clusters(&*self.store, &*self.connector, database, kind, &cancel).await?;
        let resume_from = self.options.resync_on_start.then_some(0);
        let store_stream = self.store.watch(database, kind, resume_from).await?;

        let queues = self
            .options
            .serialize_per_record
            .then(|| Arc::new(RecordQueues::default()));
        let north: Arc<dyn ChangeHandler> = Arc::new(NorthPropagator::new(self.clusters.clone()));
        let south: Arc<dyn ChangeHandler> = Arc::new(SouthIngestor::new(self.store.clone()));

        let (sender, receiver) =
            EventChannel::bind(&self.registry, kind, STORE_SOURCE, *channel_capacity)?;

        // North must see this fan-in's clusters before the first replayed record.
        self.clusters
            .replace(watches.iter().map(|watch| watch.client.clone()));

        let mut tasks = JoinSet::new();
        tasks.spawn(self.dispatcher(north, queues.clone()).run(receiver));
        tasks.spawn(pump(
            store_stream,
            sender,
            Arc::new(store_attributes),
            cancel.child_token(),
        ));

        for watch in watches {
            let cluster_name = watch.cluster.name().to_string();

            let (sender, receiver) = EventChannel::bind(
                &self.registry,
                kind,
                cluster_name.as_str(),
                *channel_capacity,
            )?;

            let database = database.clone();
            let translate: Translate = Arc::new(move |event: &WatchEvent| {
                render::decode_external(&event.object, &database).map_err(SyncError::from)
            });
            tasks.spawn(self.dispatcher(south.clone(), queues.clone()).run(receiver));
            tasks.spawn(pump(watch.stream, sender, translate, cancel.child_token()));
        }

        info!(
            database = %database,
            kind = %kind,
            clusters = self.clusters.len(),
            "Sync service running"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                joined = tasks.join_next() => match joined {
                    Some(Ok(())) => {}
                    Some(Err(e)) => error!(error = %e, "Sync task aborted"),
                    None => break,
                },
            }
        }

        // Pumps see the cancellation and close their channels; dispatchers
        // drain what is queued and stop.
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Sync task aborted");
            }
        }
        self.clusters.clear();
        info!("Sync service stopped");
        Ok(())
    }
}

impl std::fmt::Debug for SyncService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncService")
            .field("store", &self.store.backend_name())
            .field("clusters", &self.clusters)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

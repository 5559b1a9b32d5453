//! Per-worker decoding context
//!
//! A [`WorkerContext`] is the [`RecordSink`] of one trace. It runs every record through the
//! consumer hooks and the decoding stages, then delivers the resulting event.
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{SyncSender, TrySendError};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crate::consumer::{ConsumerError, Flow, HookError};
use crate::event::Event;
use crate::filter::EventFilter;
use crate::helper::EventRecordHelper;
use crate::record::EventRecord;
use crate::schema_locator::SchemaLocator;
use crate::tdh::Tdh;
use crate::trace::RecordSink;

pub(crate) type RecordHook = Box<dyn Fn(&EventRecord<'_>) -> Flow + Send + Sync>;
pub(crate) type HelperHook =
    Box<dyn Fn(&mut EventRecordHelper<'_, '_>) -> Result<Flow, HookError> + Send + Sync>;
pub(crate) type EventHook = Box<dyn Fn(Event) -> Result<(), HookError> + Send + Sync>;

/// User hooks, run in this order for every record
#[derive(Default)]
pub(crate) struct Hooks {
    pub on_record: Option<RecordHook>,
    pub on_helper: Option<HelperHook>,
    pub on_prepared: Option<HelperHook>,
    pub on_event: Option<EventHook>,
}

/// State shared by the consumer and all its workers
#[derive(Default)]
pub(crate) struct SharedState {
    pub filter: EventFilter,
    pub hooks: Hooks,
    pub computer_name: Option<String>,
    pub cancelled: AtomicBool,
    /// Upper bound of one wait for room in a full queue
    pub delivery_retry: Duration,
    pub wake_lock: Mutex<()>,
    pub wake: Condvar,
    pub skipped: AtomicU64,
    pub lost_events: AtomicU64,
    pub records_handled: AtomicU64,
    pub last_error: Mutex<Option<Arc<ConsumerError>>>,
}

impl SharedState {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        let _guard = match self.wake_lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        self.wake.notify_all();
    }

    /// Sleep for at most `delivery_retry`, returning early once cancelled
    fn wait_for_room(&self) {
        let guard = match self.wake_lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if self.is_cancelled() {
            return;
        }
        // a spurious wakeup only means an early retry
        let _ = self.wake.wait_timeout(guard, self.delivery_retry);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn set_last_error(&self, err: ConsumerError) {
        let err = Some(Arc::new(err));
        match self.last_error.lock() {
            Ok(mut last) => *last = err,
            Err(poisoned) => *poisoned.into_inner() = err,
        }
    }

    pub fn last_error(&self) -> Option<Arc<ConsumerError>> {
        match self.last_error.lock() {
            Ok(last) => last.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

fn apply(flow: Flow, helper: &mut EventRecordHelper) {
    if flow == Flow::Skip {
        helper.skip();
    }
}

pub(crate) struct WorkerContext {
    shared: Arc<SharedState>,
    tdh: Arc<dyn Tdh>,
    locator: SchemaLocator,
    sender: SyncSender<Event>,
}

impl WorkerContext {
    pub fn new(
        shared: Arc<SharedState>,
        tdh: Arc<dyn Tdh>,
        sender: SyncSender<Event>,
        cache_schemas: bool,
    ) -> Self {
        WorkerContext {
            shared,
            tdh,
            locator: SchemaLocator::new(cache_schemas),
            sender,
        }
    }

    fn decode(&mut self, record: &EventRecord) -> Result<(), ConsumerError> {
        let hooks = &self.shared.hooks;

        if let Some(on_record) = &hooks.on_record {
            if on_record(record) == Flow::Skip {
                return Ok(());
            }
        }

        let schema = self.locator.event_schema(record, self.tdh.as_ref())?;
        let mut helper = EventRecordHelper::new(record, schema, self.tdh.as_ref());
        if let Some(name) = &self.shared.computer_name {
            helper.set_computer_name(name);
        }

        if !self.shared.filter.matches_subject(&helper) {
            helper.skip();
        }
        if let Some(on_helper) = &hooks.on_helper {
            apply(on_helper(&mut helper).map_err(ConsumerError::Hook)?, &mut helper);
        }
        if helper.is_skipped() {
            return Ok(());
        }

        helper.initialize()?;
        helper.prepare_properties()?;

        if let Some(on_prepared) = &hooks.on_prepared {
            apply(on_prepared(&mut helper).map_err(ConsumerError::Hook)?, &mut helper);
        }
        if helper.is_skipped() {
            return Ok(());
        }

        let event = helper.build_event()?;
        match &hooks.on_event {
            Some(on_event) => on_event(event).map_err(ConsumerError::Hook),
            None => {
                self.deliver(event);
                Ok(())
            }
        }
    }

    /// Queue `event`, unless the consumer is stopping
    ///
    /// Skippable events are dropped when the queue is full, other events wait for room, polling
    /// the queue every `delivery_retry` until a slot frees up or the consumer is stopped.
    fn deliver(&self, event: Event) {
        if self.shared.is_cancelled() {
            return;
        }

        if event.skippable {
            match self.sender.try_send(event) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    self.shared.skipped.fetch_add(1, Ordering::Relaxed);
                }
                Err(TrySendError::Disconnected(_)) => log::debug!("event queue is closed"),
            }
            return;
        }

        let mut event = event;
        loop {
            match self.sender.try_send(event) {
                Ok(()) => return,
                Err(TrySendError::Full(pending)) => {
                    if self.shared.is_cancelled() {
                        return;
                    }
                    event = pending;
                    self.shared.wait_for_room();
                }
                Err(TrySendError::Disconnected(_)) => {
                    log::debug!("event queue is closed");
                    return;
                }
            }
        }
    }
}

impl RecordSink for WorkerContext {
    fn on_record(&mut self, record: &EventRecord) {
        self.shared.records_handled.fetch_add(1, Ordering::Relaxed);
        if record.is_lost_event() {
            self.shared.lost_events.fetch_add(1, Ordering::Relaxed);
        }

        if let Err(err) = self.decode(record) {
            log::debug!(
                "dropping event {} of provider {}: {}",
                record.event_id(),
                record.provider_id(),
                err
            );
            self.shared.set_last_error(err);
        }
    }

    fn on_buffer(&mut self) -> bool {
        !self.shared.is_cancelled()
    }
}

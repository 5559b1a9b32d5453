//! Real-time consumer
//!
//! A [`Consumer`] processes one or several named traces, each on its own worker thread, and
//! decodes their records into [`Event`]s sent to a bounded queue.
//!
//! Records go through the following stages, each of which may drop them:
//! 1. the `on_record` hook, given the raw record
//! 2. schema resolution and the [`EventFilter`]
//! 3. the `on_helper` hook, before the payload is walked
//! 4. property preparation, then the `on_prepared` hook
//! 5. event building, then the `on_event` hook or delivery to the queue
//!
//! Decoding errors only drop the record they concern; the last one is available from [`Consumer::err`].
//!
//! ```no_run
//! # #[cfg(windows)]
//! # fn main() {
//! use etw_consumer::consumer::Consumer;
//! use etw_consumer::native::{SystemTdh, SystemTraceSource};
//!
//! let mut consumer = Consumer::builder(SystemTraceSource, SystemTdh)
//!     .trace_name("MySession")
//!     .build();
//! let events = consumer.events().unwrap();
//! consumer.start().unwrap();
//!
//! for event in events.iter().take(10) {
//!     println!("{:?}", event.system.provider.name);
//! }
//! consumer.stop().unwrap();
//! # }
//! # #[cfg(not(windows))]
//! # fn main() {}
//! ```
use std::collections::BTreeSet;
use std::sync::atomic::Ordering;
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::event::Event;
use crate::filter::EventFilter;
use crate::helper::{DecodeError, EventRecordHelper};
use crate::provider::Provider;
use crate::record::EventRecord;
use crate::schema::SchemaError;
use crate::tdh::Tdh;
use crate::trace::callback_data::{Hooks, SharedState, WorkerContext};
use crate::trace::{CloseStatus, TraceCloser, TraceError, TraceSource};

/// Errors returned by user hooks
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// Consumer module errors
#[derive(Debug)]
pub enum ConsumerError {
    /// A record could not be decoded
    Decode(DecodeError),
    /// A hook failed on a record
    Hook(HookError),
    /// Opening a trace failed
    Open { name: String, source: TraceError },
    /// Processing a trace failed
    Trace(TraceError),
    /// Closing a trace failed
    Close(TraceError),
    Spawn(std::io::Error),
    AlreadyStarted,
    /// The consumer has been stopped, it cannot be started again
    Stopped,
}

impl From<DecodeError> for ConsumerError {
    fn from(err: DecodeError) -> Self {
        ConsumerError::Decode(err)
    }
}

impl From<SchemaError> for ConsumerError {
    fn from(err: SchemaError) -> Self {
        ConsumerError::Decode(DecodeError::Schema(err))
    }
}

impl std::fmt::Display for ConsumerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Decode(e) => write!(f, "decode error: {}", e),
            Self::Hook(e) => write!(f, "hook error: {}", e),
            Self::Open { name, source } => write!(f, "failed to open trace {}: {}", name, source),
            Self::Trace(e) => write!(f, "trace error: {}", e),
            Self::Close(e) => write!(f, "failed to close trace: {}", e),
            Self::Spawn(e) => write!(f, "failed to spawn worker: {}", e),
            Self::AlreadyStarted => write!(f, "consumer already started"),
            Self::Stopped => write!(f, "consumer stopped"),
        }
    }
}

impl std::error::Error for ConsumerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Decode(e) => Some(e),
            Self::Hook(e) => Some(e.as_ref()),
            Self::Open { source: e, .. } | Self::Trace(e) | Self::Close(e) => Some(e),
            Self::Spawn(e) => Some(e),
            _ => None,
        }
    }
}

pub type ConsumerResult<T> = Result<T, ConsumerError>;

/// What to do with a record after a hook
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Drop the record, without decoding it any further
    Skip,
}

/// Consumer settings
#[derive(Debug, Clone)]
pub struct ConsumerOptions {
    /// Capacity of the event queue
    pub queue_capacity: usize,
    /// Cache schemas per worker (TraceLogging schemas are never cached)
    pub cache_schemas: bool,
    /// `Computer` field of the events, the name of the local machine when `None`
    pub computer_name: Option<String>,
    /// How long a worker waits before retrying to queue a regular event that found the queue full
    ///
    /// The receiving end gives no notice when room frees up, so a full queue is polled at this
    /// interval: it bounds the extra latency of a slow reader. Stopping the consumer interrupts the
    /// wait at once.
    pub delivery_retry: Duration,
}

impl Default for ConsumerOptions {
    fn default() -> Self {
        ConsumerOptions {
            queue_capacity: 4096,
            cache_schemas: true,
            computer_name: None,
            delivery_retry: Duration::from_millis(1),
        }
    }
}

/// Builds a [`Consumer`]
pub struct ConsumerBuilder {
    source: Arc<dyn TraceSource>,
    tdh: Arc<dyn Tdh>,
    traces: BTreeSet<String>,
    providers: Vec<Provider>,
    options: ConsumerOptions,
    hooks: Hooks,
}

impl ConsumerBuilder {
    /// Consume an existing trace
    pub fn trace_name(mut self, name: &str) -> Self {
        self.traces.insert(name.to_string());
        self
    }

    /// Consume the trace of a session, restricted to the events of its providers
    pub fn session(mut self, name: &str, providers: &[Provider]) -> Self {
        self.traces.insert(name.to_string());
        self.providers(providers)
    }

    /// Restrict decoding to the events of `providers`
    pub fn providers(mut self, providers: &[Provider]) -> Self {
        self.providers.extend_from_slice(providers);
        self
    }

    pub fn options(mut self, options: ConsumerOptions) -> Self {
        self.options = options;
        self
    }

    /// Run `hook` on every raw record. Returning [`Flow::Skip`] is the cheapest way to drop records.
    pub fn on_record<F>(mut self, hook: F) -> Self
    where
        F: Fn(&EventRecord<'_>) -> Flow + Send + Sync + 'static,
    {
        self.hooks.on_record = Some(Box::new(hook));
        self
    }

    /// Run `hook` once the schema of a record is known, before its properties are located
    pub fn on_helper<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut EventRecordHelper<'_, '_>) -> Result<Flow, HookError> + Send + Sync + 'static,
    {
        self.hooks.on_helper = Some(Box::new(hook));
        self
    }

    /// Run `hook` once the properties of a record are located, before they are formatted
    pub fn on_prepared<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut EventRecordHelper<'_, '_>) -> Result<Flow, HookError> + Send + Sync + 'static,
    {
        self.hooks.on_prepared = Some(Box::new(hook));
        self
    }

    /// Hand events to `hook` instead of the queue
    pub fn on_event<F>(mut self, hook: F) -> Self
    where
        F: Fn(Event) -> Result<(), HookError> + Send + Sync + 'static,
    {
        self.hooks.on_event = Some(Box::new(hook));
        self
    }

    pub fn build(self) -> Consumer {
        let filter = EventFilter::new();
        for provider in &self.providers {
            filter.update_from_provider(provider);
        }

        let shared = SharedState {
            filter,
            hooks: self.hooks,
            computer_name: self.options.computer_name.clone(),
            delivery_retry: self.options.delivery_retry,
            ..Default::default()
        };
        let (sender, receiver) = mpsc::sync_channel(self.options.queue_capacity);

        Consumer {
            source: self.source,
            tdh: self.tdh,
            traces: self.traces.into_iter().collect(),
            options: self.options,
            shared: Arc::new(shared),
            sender: Some(sender),
            receiver: Some(receiver),
            closers: Vec::new(),
            workers: Vec::new(),
            started: false,
            stopped: false,
        }
    }
}

/// Decodes the records of real-time traces
pub struct Consumer {
    source: Arc<dyn TraceSource>,
    tdh: Arc<dyn Tdh>,
    traces: Vec<String>,
    options: ConsumerOptions,
    shared: Arc<SharedState>,
    sender: Option<SyncSender<Event>>,
    receiver: Option<Receiver<Event>>,
    closers: Vec<Box<dyn TraceCloser>>,
    workers: Vec<JoinHandle<()>>,
    started: bool,
    stopped: bool,
}

impl Consumer {
    pub fn builder<S, T>(source: S, tdh: T) -> ConsumerBuilder
    where
        S: TraceSource + 'static,
        T: Tdh + 'static,
    {
        Self::builder_shared(Arc::new(source), Arc::new(tdh))
    }

    /// Same as [`Consumer::builder`], with a source and a schema-resolution backend shared with other users
    pub fn builder_shared(source: Arc<dyn TraceSource>, tdh: Arc<dyn Tdh>) -> ConsumerBuilder {
        ConsumerBuilder {
            source,
            tdh,
            traces: BTreeSet::new(),
            providers: Vec::new(),
            options: ConsumerOptions::default(),
            hooks: Hooks::default(),
        }
    }

    /// Open every trace, then process each of them on its own worker thread
    pub fn start(&mut self) -> ConsumerResult<()> {
        if self.stopped {
            return Err(ConsumerError::Stopped);
        }
        if self.started {
            return Err(ConsumerError::AlreadyStarted);
        }
        let sender = self.sender.as_ref().ok_or(ConsumerError::Stopped)?;

        let mut traces = Vec::with_capacity(self.traces.len());
        for name in &self.traces {
            let sink = WorkerContext::new(
                Arc::clone(&self.shared),
                Arc::clone(&self.tdh),
                sender.clone(),
                self.options.cache_schemas,
            );
            let trace = self
                .source
                .open(name, Box::new(sink))
                .map_err(|source| ConsumerError::Open {
                    name: name.clone(),
                    source,
                })?;
            traces.push(trace);
        }

        self.started = true;
        for mut trace in traces {
            self.closers.push(trace.closer());

            let shared = Arc::clone(&self.shared);
            let name = trace.name().to_string();
            let worker = std::thread::Builder::new()
                .name(format!("etw-consumer-{}", name))
                .spawn(move || {
                    match trace.process() {
                        Ok(()) => (),
                        Err(err) if shared.is_cancelled() => {
                            log::debug!("trace {} ended while stopping: {}", name, err);
                        }
                        Err(err) => {
                            log::warn!("failed to process trace {}: {}", name, err);
                            shared.set_last_error(ConsumerError::Trace(err));
                        }
                    }
                });

            match worker {
                Ok(worker) => self.workers.push(worker),
                Err(err) => {
                    log::warn!("failed to spawn a consumer worker: {}", err);
                    return Err(ConsumerError::Spawn(err));
                }
            }
        }

        Ok(())
    }

    /// Stop processing and close the event queue
    ///
    /// Cancels the workers, closes every trace, waits for the workers to return, then closes the
    /// queue. Calling it again has no effect.
    pub fn stop(&mut self) -> ConsumerResult<()> {
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;
        self.shared.cancel();

        let mut result = Ok(());
        for closer in self.closers.drain(..) {
            match closer.close() {
                Ok(CloseStatus::Closed) | Ok(CloseStatus::Pending) => {}
                Err(err) => {
                    log::warn!("failed to close trace: {}", err);
                    result = Err(ConsumerError::Close(err));
                }
            }
        }

        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                log::error!("a consumer worker panicked");
            }
        }

        self.sender = None;
        result
    }

    /// The receiving end of the event queue. Only the first call returns it.
    pub fn events(&mut self) -> Option<Receiver<Event>> {
        self.receiver.take()
    }

    /// Number of skippable events dropped because the queue was full
    pub fn skipped(&self) -> u64 {
        self.shared.skipped.load(Ordering::Relaxed)
    }

    /// Number of records reporting lost real-time buffers
    pub fn lost_events(&self) -> u64 {
        self.shared.lost_events.load(Ordering::Relaxed)
    }

    pub fn records_handled(&self) -> u64 {
        self.shared.records_handled.load(Ordering::Relaxed)
    }

    /// The last error met while decoding or processing
    pub fn err(&self) -> Option<Arc<ConsumerError>> {
        self.shared.last_error()
    }

    /// The filter applied to records, which may be updated while the consumer runs
    pub fn filter(&self) -> &EventFilter {
        &self.shared.filter
    }

    pub fn trace_names(&self) -> &[String] {
        &self.traces
    }

    pub fn options(&self) -> &ConsumerOptions {
        &self.options
    }
}

impl Drop for Consumer {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            log::warn!("failed to stop consumer: {}", err);
        }
    }
}

impl std::fmt::Debug for Consumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consumer")
            .field("traces", &self.traces)
            .field("options", &self.options)
            .field("started", &self.started)
            .field("stopped", &self.stopped)
            .field("workers", &self.workers.len())
            .finish()
    }
}

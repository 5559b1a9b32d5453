//! In-memory record pump
//!
//! A [`ReplaySource`] hands previously captured (or synthetic) records to consumers, the way a
//! real-time session would. Records are grouped in buffers of `records_per_buffer` records, the
//! sink being asked whether to go on after each of them.
use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use crate::record::{EventHeader, EventRecord, ExtendedDataItem};
use crate::trace::{
    CloseStatus, RealTimeTrace, RecordSink, TraceCloser, TraceError, TraceResult, TraceSource,
};

/// A record owning its payload
#[derive(Debug, Clone, Default)]
pub struct OwnedRecord {
    pub header: EventHeader,
    pub user_data: Vec<u8>,
    pub extended_data: Vec<ExtendedDataItem>,
}

impl OwnedRecord {
    pub fn new(header: EventHeader, user_data: Vec<u8>) -> Self {
        OwnedRecord {
            header,
            user_data,
            extended_data: Vec::new(),
        }
    }

    pub fn with_extended_data(mut self, items: Vec<ExtendedDataItem>) -> Self {
        self.extended_data = items;
        self
    }

    pub fn as_record(&self) -> EventRecord<'_> {
        EventRecord::new(self.header, &self.user_data)
            .with_extended_data(self.extended_data.clone())
    }
}

/// Replays named lists of records
#[derive(Debug, Clone)]
pub struct ReplaySource {
    traces: HashMap<String, Arc<Vec<OwnedRecord>>>,
    records_per_buffer: usize,
    live: bool,
}

impl Default for ReplaySource {
    fn default() -> Self {
        ReplaySource {
            traces: HashMap::new(),
            records_per_buffer: 1,
            live: false,
        }
    }
}

impl ReplaySource {
    pub fn new() -> Self {
        Default::default()
    }

    /// Make `records` available as the trace `name`
    pub fn trace(mut self, name: &str, records: Vec<OwnedRecord>) -> Self {
        self.traces.insert(name.to_string(), Arc::new(records));
        self
    }

    pub fn records_per_buffer(mut self, count: usize) -> Self {
        self.records_per_buffer = count.max(1);
        self
    }

    /// Keep processing (idle) once all the records have been replayed, until the trace is closed
    pub fn live(mut self, live: bool) -> Self {
        self.live = live;
        self
    }
}

impl TraceSource for ReplaySource {
    fn open(&self, name: &str, sink: Box<dyn RecordSink>) -> TraceResult<Box<dyn RealTimeTrace>> {
        let records = self
            .traces
            .get(name)
            .ok_or_else(|| TraceError::UnknownTrace(name.to_string()))?;

        Ok(Box::new(ReplayTrace {
            name: name.to_string(),
            records: Arc::clone(records),
            sink,
            records_per_buffer: self.records_per_buffer,
            live: self.live,
            state: Arc::new(ReplayState::default()),
        }))
    }
}

#[derive(Debug, Default)]
struct Phase {
    closed: bool,
    started: bool,
    finished: bool,
}

#[derive(Debug, Default)]
struct ReplayState {
    phase: Mutex<Phase>,
    wake: Condvar,
}

impl ReplayState {
    fn lock(&self) -> MutexGuard<'_, Phase> {
        match self.phase.lock() {
            Ok(phase) => phase,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn wait_closed(&self) {
        let mut phase = self.lock();
        while !phase.closed {
            phase = match self.wake.wait(phase) {
                Ok(phase) => phase,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
    }
}

struct ReplayTrace {
    name: String,
    records: Arc<Vec<OwnedRecord>>,
    sink: Box<dyn RecordSink>,
    records_per_buffer: usize,
    live: bool,
    state: Arc<ReplayState>,
}

impl ReplayTrace {
    fn replay(&mut self) {
        let records = Arc::clone(&self.records);
        for buffer in records.chunks(self.records_per_buffer) {
            for owned in buffer {
                if self.state.is_closed() {
                    return;
                }
                self.sink.on_record(&owned.as_record());
            }
            if !self.sink.on_buffer() {
                log::debug!("sink stopped the processing of {}", self.name);
                return;
            }
        }

        if self.live {
            self.state.wait_closed();
        }
    }
}

impl RealTimeTrace for ReplayTrace {
    fn name(&self) -> &str {
        &self.name
    }

    fn closer(&self) -> Box<dyn TraceCloser> {
        Box::new(ReplayCloser {
            state: Arc::clone(&self.state),
        })
    }

    fn process(&mut self) -> TraceResult<()> {
        {
            let mut phase = self.state.lock();
            if phase.started {
                return Err(TraceError::Closed(self.name.clone()));
            }
            phase.started = true;
            // closed before the worker got here: nothing left to deliver
            if phase.closed {
                phase.finished = true;
                return Ok(());
            }
        }

        self.replay();
        self.state.lock().finished = true;
        Ok(())
    }
}

struct ReplayCloser {
    state: Arc<ReplayState>,
}

impl TraceCloser for ReplayCloser {
    fn close(&self) -> TraceResult<CloseStatus> {
        let status = {
            let mut phase = self.state.lock();
            let status = if phase.started && !phase.finished {
                CloseStatus::Pending
            } else {
                CloseStatus::Closed
            };
            phase.closed = true;
            status
        };
        self.state.wake.notify_all();
        Ok(status)
    }
}

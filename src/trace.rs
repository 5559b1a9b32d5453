//! Record pump abstraction
//!
//! A [`TraceSource`] opens real-time traces by name. Each opened [`RealTimeTrace`] blocks in
//! [`RealTimeTrace::process`], handing every record it receives to its [`RecordSink`], until it
//! is closed through its [`TraceCloser`] or its sink asks it to stop.
//!
//! On Windows, [`SystemTraceSource`](crate::native::SystemTraceSource) consumes ETW sessions.
//! [`ReplaySource`](replay::ReplaySource) replays records kept in memory.
#[cfg(windows)]
use crate::native::evntrace::EvntraceNativeError;
use crate::record::EventRecord;

pub(crate) mod callback_data;
pub mod replay;

/// Trace module errors
#[derive(Debug)]
pub enum TraceError {
    /// The source has no trace with this name
    UnknownTrace(String),
    /// The trace has already been processed
    Closed(String),
    /// Wrapper over an internal [EvntraceNativeError]
    ///
    /// [EvntraceNativeError]: crate::native::evntrace::EvntraceNativeError
    #[cfg(windows)]
    EtwNativeError(EvntraceNativeError),
    /// Wrapper over an standard IO Error
    IoError(std::io::Error),
}

impl From<std::io::Error> for TraceError {
    fn from(err: std::io::Error) -> Self {
        TraceError::IoError(err)
    }
}

#[cfg(windows)]
impl From<EvntraceNativeError> for TraceError {
    fn from(err: EvntraceNativeError) -> Self {
        TraceError::EtwNativeError(err)
    }
}

impl std::fmt::Display for TraceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownTrace(name) => write!(f, "unknown trace {}", name),
            Self::Closed(name) => write!(f, "trace {} is closed", name),
            #[cfg(windows)]
            Self::EtwNativeError(e) => write!(f, "native error: {:?}", e),
            Self::IoError(e) => write!(f, "io error: {}", e),
        }
    }
}

impl std::error::Error for TraceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::IoError(e) => Some(e),
            _ => None,
        }
    }
}

pub type TraceResult<T> = Result<T, TraceError>;

/// Outcome of closing a trace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseStatus {
    Closed,
    /// The trace is closing, records already received are still being handed to the sink
    Pending,
}

/// Receives the records of a trace, on the thread processing it
pub trait RecordSink: Send {
    fn on_record(&mut self, record: &EventRecord);

    /// Called once per buffer of records. Returning `false` stops the processing of the trace.
    fn on_buffer(&mut self) -> bool {
        true
    }
}

/// Closes a trace from any thread, while it is being processed
pub trait TraceCloser: Send + Sync {
    fn close(&self) -> TraceResult<CloseStatus>;
}

/// An opened trace
pub trait RealTimeTrace: Send {
    fn name(&self) -> &str;

    fn closer(&self) -> Box<dyn TraceCloser>;

    /// Process the trace, handing its records to the sink
    ///
    /// A trace closed before this is called returns `Ok(())` without delivering anything.
    ///
    /// # Note
    /// This function blocks the current thread until the trace is closed. You will usually want to
    /// call this on a separate worker thread.
    fn process(&mut self) -> TraceResult<()>;
}

/// Opens traces by name
pub trait TraceSource: Send + Sync {
    fn open(&self, name: &str, sink: Box<dyn RecordSink>) -> TraceResult<Box<dyn RealTimeTrace>>;
}

//! Native API - Event Tracing evntrace header
//!
//! The `evntrace` module is an abstraction layer for the Windows evntrace library. This module act as a
//! internal API that holds all `unsafe` calls to functions exported by the `evntrace` Windows library.
//!
//! [`SystemTraceSource`] opens existing real-time sessions with `OpenTraceW`, processes them with
//! `ProcessTrace` and closes them with `CloseTrace`.
use std::ffi::c_void;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use windows::core::PWSTR;
use windows::Win32::Foundation::{ERROR_CANCELLED, ERROR_CTX_CLOSE_PENDING, ERROR_INVALID_HANDLE};
use windows::Win32::System::Diagnostics::Etw;

use super::etw_types;
use crate::trace::{CloseStatus, RealTimeTrace, RecordSink, TraceCloser, TraceResult, TraceSource};
use crate::traits::*;

/// Evntrace native module errors
#[derive(Debug)]
pub enum EvntraceNativeError {
    /// Represents an standard IO Error
    IoError(std::io::Error),
}

impl LastOsError<EvntraceNativeError> for EvntraceNativeError {}

impl From<std::io::Error> for EvntraceNativeError {
    fn from(err: std::io::Error) -> Self {
        EvntraceNativeError::IoError(err)
    }
}

pub(crate) type EvntraceNativeResult<T> = Result<T, EvntraceNativeError>;

const INVALID_PROCESSTRACE_HANDLE: u64 = u64::MAX;

/// What the native callbacks receive as their context
struct SinkContext {
    sink: Box<dyn RecordSink>,
}

extern "system" fn record_callback_thunk(p_record: *mut Etw::EVENT_RECORD) {
    let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
        let native = unsafe {
            // Safety: the record is valid until the end of the callback
            p_record.as_ref()
        };
        let Some(native) = native else { return };

        let context = unsafe {
            // Safety:
            //  * `UserContext` is the `Context` given to `OpenTraceW`, a `SinkContext` owned by the `SystemTrace` being processed
            //  * both callbacks run on the thread processing the trace, one at a time
            (native.UserContext as *mut SinkContext).as_mut()
        };
        let Some(context) = context else { return };

        let record = unsafe {
            // Safety: the record and its buffers are valid until the end of the callback
            etw_types::record_from_native(native)
        };
        context.sink.on_record(&record);
    }));

    if result.is_err() {
        log::error!("panic while handling a record");
    }
}

extern "system" fn buffer_callback_thunk(p_logfile: *mut Etw::EVENT_TRACE_LOGFILEW) -> u32 {
    let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
        let logfile = unsafe {
            // Safety: the logfile is valid until the end of the callback
            p_logfile.as_ref()
        }?;
        let context = unsafe {
            // Safety: see `record_callback_thunk`
            (logfile.Context as *mut SinkContext).as_mut()
        }?;
        Some(context.sink.on_buffer())
    }));

    match result {
        Ok(Some(false)) => 0,
        Ok(_) => 1,
        Err(_) => {
            log::error!("panic while handling a buffer");
            0
        }
    }
}

fn close_trace(handle: Etw::PROCESSTRACE_HANDLE) -> EvntraceNativeResult<CloseStatus> {
    let status = unsafe {
        // Safety: the handle was returned by `OpenTraceW` and is closed at most once
        Etw::CloseTrace(handle)
    };
    match status {
        0 => Ok(CloseStatus::Closed),
        s if s == ERROR_CTX_CLOSE_PENDING.0 => Ok(CloseStatus::Pending),
        s => Err(EvntraceNativeError::IoError(
            std::io::Error::from_raw_os_error(s as i32),
        )),
    }
}

#[derive(Debug)]
struct TraceHandle {
    handle: Etw::PROCESSTRACE_HANDLE,
    closed: AtomicBool,
}

impl TraceHandle {
    fn close(&self) -> EvntraceNativeResult<CloseStatus> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(CloseStatus::Closed);
        }
        close_trace(self.handle)
    }
}

/// Opens the real-time ETW sessions of the system
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTraceSource;

impl TraceSource for SystemTraceSource {
    fn open(&self, name: &str, sink: Box<dyn RecordSink>) -> TraceResult<Box<dyn RealTimeTrace>> {
        let mut context = Box::new(SinkContext { sink });
        let mut logger_name = name.into_utf16();

        let mut logfile = Etw::EVENT_TRACE_LOGFILEW::default();
        logfile.LoggerName = PWSTR(logger_name.as_mut_ptr());
        logfile.Anonymous1.ProcessTraceMode =
            Etw::PROCESS_TRACE_MODE_REAL_TIME | Etw::PROCESS_TRACE_MODE_EVENT_RECORD;
        logfile.Anonymous2.EventRecordCallback = Some(record_callback_thunk);
        logfile.BufferCallback = Some(buffer_callback_thunk);
        logfile.Context = context.as_mut() as *mut SinkContext as *mut c_void;

        let handle = unsafe {
            // Safety:
            //  * `logfile` is only used by this call, which may modify it
            //  * the context outlives the handle, see `SystemTrace`
            Etw::OpenTraceW(&mut logfile)
        };
        if handle.Value == INVALID_PROCESSTRACE_HANDLE {
            return Err(EvntraceNativeError::last_error().into());
        }

        Ok(Box::new(SystemTrace {
            name: name.to_string(),
            handle: Arc::new(TraceHandle {
                handle,
                closed: AtomicBool::new(false),
            }),
            _context: context,
        }))
    }
}

/// An opened session
///
/// Owns the context of the native callbacks, and closes its handle when dropped so that no
/// callback can outlive it.
struct SystemTrace {
    name: String,
    handle: Arc<TraceHandle>,
    _context: Box<SinkContext>,
}

impl RealTimeTrace for SystemTrace {
    fn name(&self) -> &str {
        &self.name
    }

    fn closer(&self) -> Box<dyn TraceCloser> {
        Box::new(SystemTraceCloser {
            handle: Arc::clone(&self.handle),
        })
    }

    fn process(&mut self) -> TraceResult<()> {
        // closed before the worker got here: nothing left to deliver
        if self.handle.closed.load(Ordering::SeqCst) {
            log::debug!("trace {} closed before processing", self.name);
            return Ok(());
        }

        let status = unsafe {
            // Safety: the handle is open, and the callback context is owned by `self`
            Etw::ProcessTrace(&[self.handle.handle], None, None)
        };
        if status == ERROR_INVALID_HANDLE.0 && self.handle.closed.load(Ordering::SeqCst) {
            return Ok(());
        }
        if status != 0 && status != ERROR_CANCELLED.0 {
            return Err(EvntraceNativeError::IoError(std::io::Error::from_raw_os_error(
                status as i32,
            ))
            .into());
        }
        Ok(())
    }
}

impl Drop for SystemTrace {
    fn drop(&mut self) {
        if let Err(err) = self.handle.close() {
            log::warn!("failed to close trace {}: {:?}", self.name, err);
        }
    }
}

struct SystemTraceCloser {
    handle: Arc<TraceHandle>,
}

impl TraceCloser for SystemTraceCloser {
    fn close(&self) -> TraceResult<CloseStatus> {
        Ok(self.handle.close()?)
    }
}

//! Record emission
//!
//! An [`EventFile`] binds one registered event to one log channel and holds
//! the event's reference count for as long as it lives. Records are written
//! through it in one of three ways:
//!
//! - [`EventFile::trace_event`]: one value per field from an iterator
//! - [`EventFile::trace_event_array`] (and [`synth_trace!`]): a value slice
//! - [`EventFile::trace_start`]: a [`PiecewiseTrace`] filled one field at a
//!   time, either by position or by name but never both
//!
//! Every path goes through [`EventFile::open`], which short-circuits when
//! the file is disabled, raises the channel's nesting marker and reserves
//! the record. Closing the returned [`WriteHandle`] (or dropping it)
//! commits the record and lowers the marker.
//!
//! [`synth_trace!`]: crate::synth_trace

use crate::channel::{LogChannel, NestGuard, Reservation};
use crate::error::{EmissionError, RegistryError};
use crate::record::{self, RecordHeader, Value};
use crate::registry::{EventRef, EventRegistry};
use crate::schema::EventSchema;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of an emission that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum TraceStatus {
    Committed,
    /// The file was disabled; nothing was reserved or written
    Disabled,
}

/// Subscription of one event to one channel
#[derive(Debug)]
pub struct EventFile {
    event: EventRef,
    channel: Arc<LogChannel>,
    enabled: AtomicBool,
    soft_disabled: AtomicBool,
}

impl EventFile {
    /// Bind an already acquired event to `channel`, enabled
    pub fn new(event: EventRef, channel: Arc<LogChannel>) -> Self {
        debug!(
            event = event.name(),
            channel = channel.id(),
            refs = event.ref_count(),
            "event file attached"
        );
        Self {
            event,
            channel,
            enabled: AtomicBool::new(true),
            soft_disabled: AtomicBool::new(false),
        }
    }

    /// Look `name` up in `registry` and bind it to `channel`
    pub fn attach(
        registry: &EventRegistry,
        name: &str,
        channel: Arc<LogChannel>,
    ) -> Result<Self, RegistryError> {
        Ok(Self::new(registry.acquire(name)?, channel))
    }

    pub fn schema(&self) -> &EventSchema {
        &self.event
    }

    pub fn channel(&self) -> &Arc<LogChannel> {
        &self.channel
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn set_soft_disabled(&self, soft_disabled: bool) {
        self.soft_disabled.store(soft_disabled, Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn is_soft_disabled(&self) -> bool {
        self.soft_disabled.load(Ordering::Acquire)
    }

    /// True when writes are currently skipped
    pub fn is_disabled(&self) -> bool {
        !self.is_enabled() || self.is_soft_disabled()
    }

    /// Open a record write on the bound channel
    ///
    /// `Ok(None)` means the file is disabled. A failed reservation leaves
    /// the nesting marker where it was.
    pub fn open(&self) -> Result<Option<WriteHandle<'_>>, EmissionError> {
        if self.is_disabled() {
            return Ok(None);
        }

        let nest = self.channel.nest();
        let reservation = self
            .channel
            .reserve(self.event.id(), self.event.layout().payload_size())?;
        Ok(Some(WriteHandle { reservation, nest }))
    }

    /// Emit one record from an iterator of values, in field order
    pub fn trace_event<'v, I, V>(&self, values: I) -> Result<TraceStatus, EmissionError>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value<'v>>,
    {
        let values: Vec<Value<'v>> = values.into_iter().map(Into::into).collect();
        self.trace_event_array(&values)
    }

    /// Emit one record from a slice holding exactly one value per field
    ///
    /// Arity and value kinds are checked before anything is reserved, so a
    /// rejected call leaves the channel untouched.
    pub fn trace_event_array(&self, values: &[Value<'_>]) -> Result<TraceStatus, EmissionError> {
        let schema = self.schema();
        if values.len() != schema.n_fields() {
            return Err(EmissionError::ArityMismatch {
                expected: schema.n_fields(),
                got: values.len(),
            });
        }
        for (field, value) in schema.fields().iter().zip(values) {
            record::check_kind(field, value)?;
        }

        let Some(mut handle) = self.open()? else {
            return Ok(TraceStatus::Disabled);
        };
        let payload = handle.payload_mut();
        for (field, value) in schema.fields().iter().zip(values) {
            record::encode_field(payload, field, *value)?;
        }
        handle.close();
        Ok(TraceStatus::Committed)
    }

    /// Begin a field-by-field trace
    ///
    /// A disabled file still yields a trace; its adds succeed without
    /// writing anything.
    pub fn trace_start(&self) -> Result<PiecewiseTrace<'_>, EmissionError> {
        let handle = self.open()?;
        Ok(PiecewiseTrace {
            file: self,
            disabled: handle.is_none(),
            handle,
            cursor: 0,
            mode: TraceMode::Unset,
            ended: false,
        })
    }
}

/// An open write against a channel: reservation plus nesting marker
///
/// Dropping the handle commits the record, then lowers the marker.
pub struct WriteHandle<'a> {
    // drop order: the record commits before the marker is released
    reservation: Reservation<'a>,
    nest: NestGuard<'a>,
}

impl WriteHandle<'_> {
    pub fn payload_mut(&mut self) -> &mut [u8] {
        self.reservation.payload_mut()
    }

    pub fn header(&self) -> Option<RecordHeader> {
        self.reservation.header()
    }

    /// Commit the record and release the nesting marker
    pub fn close(self) {
        let Self { reservation, nest } = self;
        reservation.commit();
        drop(nest);
    }
}

impl std::fmt::Debug for WriteHandle<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteHandle")
            .field("header", &self.header())
            .finish()
    }
}

/// Which discipline a piecewise trace committed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceMode {
    Unset,
    ByPosition,
    ByName,
}

/// In-flight record built across several calls
///
/// The first add fixes the [`TraceMode`]. [`PiecewiseTrace::end`] commits
/// whatever was written; a trace dropped without `end` is committed all
/// the same, with a warning.
pub struct PiecewiseTrace<'a> {
    file: &'a EventFile,
    handle: Option<WriteHandle<'a>>,
    cursor: usize,
    mode: TraceMode,
    disabled: bool,
    ended: bool,
}

impl PiecewiseTrace<'_> {
    pub fn mode(&self) -> TraceMode {
        self.mode
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Fields written so far by position
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    fn enter(&mut self, mode: TraceMode) -> Result<(), EmissionError> {
        match self.mode {
            TraceMode::Unset => {
                self.mode = mode;
                Ok(())
            }
            current if current == mode => Ok(()),
            _ => Err(EmissionError::ModeConflict),
        }
    }

    /// Write the next field in declaration order
    pub fn add_next_value<'v>(&mut self, value: impl Into<Value<'v>>) -> Result<(), EmissionError> {
        self.enter(TraceMode::ByPosition)?;
        let Some(handle) = self.handle.as_mut() else {
            return Ok(());
        };

        let schema = self.file.schema();
        let field = schema
            .fields()
            .get(self.cursor)
            .ok_or(EmissionError::TooManyValues(schema.n_fields()))?;
        record::encode_field(handle.payload_mut(), field, value.into())?;
        self.cursor += 1;
        Ok(())
    }

    /// Write the field called `name`
    pub fn add_named_value<'v>(
        &mut self,
        name: &str,
        value: impl Into<Value<'v>>,
    ) -> Result<(), EmissionError> {
        self.enter(TraceMode::ByName)?;
        let Some(handle) = self.handle.as_mut() else {
            return Ok(());
        };

        let field = self
            .file
            .schema()
            .field(name)
            .ok_or_else(|| EmissionError::NoSuchField(name.to_string()))?;
        record::encode_field(handle.payload_mut(), field, value.into())
    }

    /// Commit the record
    pub fn end(mut self) -> TraceStatus {
        self.ended = true;
        match self.handle.take() {
            Some(handle) => {
                handle.close();
                TraceStatus::Committed
            }
            None => TraceStatus::Disabled,
        }
    }
}

impl Drop for PiecewiseTrace<'_> {
    fn drop(&mut self) {
        if self.ended {
            return;
        }
        if let Some(handle) = self.handle.take() {
            warn!(
                event = self.file.schema().name(),
                "piecewise trace dropped without end - committing partial record"
            );
            handle.close();
        }
    }
}

impl std::fmt::Debug for PiecewiseTrace<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PiecewiseTrace")
            .field("event", &self.file.schema().name())
            .field("cursor", &self.cursor)
            .field("mode", &self.mode)
            .field("disabled", &self.disabled)
            .finish()
    }
}

/// Emit one record through an [`EventFile`] from a list of values
///
/// ```
/// use std::sync::Arc;
/// use synthtrace::{channel::LogChannel, emit::EventFile, registry::EventRegistry, synth_trace};
///
/// let registry = EventRegistry::default();
/// registry.run_command("wakeup u64 lat; char comm[16]")?;
/// let file = EventFile::attach(&registry, "wakeup", Arc::new(LogChannel::default()))?;
/// let status = synth_trace!(file, 1500u64, "kworker/0:1")?;
/// assert_eq!(status, synthtrace::emit::TraceStatus::Committed);
/// assert_eq!(file.channel().len(), 1);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[macro_export]
macro_rules! synth_trace {
    ($file:expr $(, $value:expr)* $(,)?) => {
        $file.trace_event_array(&[$($crate::record::Value::from($value)),*])
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChannelConfig, OverflowPolicy};
    use crate::error::ChannelError;
    use crate::format::RecordFormat;
    use crate::record::FieldValue;

    fn setup(command: &str) -> (EventRegistry, Arc<LogChannel>) {
        let registry = EventRegistry::default();
        registry.run_command(command).unwrap();
        (registry, Arc::new(LogChannel::new(&ChannelConfig::new(64))))
    }

    fn decode_one(file: &EventFile) -> Vec<FieldValue> {
        let record = file.channel().pop().unwrap();
        file.schema().decode(&record).unwrap()
    }

    #[test]
    fn test_trace_event_bulk() {
        let (reg, ch) = setup("wakeup u64 lat; pid_t pid; char comm[8]");
        let file = EventFile::attach(&reg, "wakeup", ch).unwrap();

        let status = file
            .trace_event_array(&[Value::from(1500u64), Value::from(-1i32), Value::from("kworker/0")])
            .unwrap();
        assert_eq!(status, TraceStatus::Committed);

        let values = decode_one(&file);
        assert_eq!(values[0], FieldValue::Unsigned(1500));
        assert_eq!(values[1], FieldValue::Signed(-1));
        assert_eq!(values[2], FieldValue::Str("kworker".to_string()));
    }

    #[test]
    fn test_trace_event_iterator() {
        let (reg, ch) = setup("counts u32 a; u32 b; u32 c");
        let file = EventFile::attach(&reg, "counts", ch).unwrap();
        assert_eq!(file.trace_event([1u32, 2, 3]).unwrap(), TraceStatus::Committed);
        let values: Vec<u64> = decode_one(&file).iter().filter_map(FieldValue::as_u64).collect();
        assert_eq!(values, [1, 2, 3]);
    }

    #[test]
    fn test_macro() {
        let (reg, ch) = setup("irq unsigned int vec; char name[8]");
        let file = EventFile::attach(&reg, "irq", ch).unwrap();
        assert_eq!(synth_trace!(file, 7u32, "timer").unwrap(), TraceStatus::Committed);
        assert_eq!(decode_one(&file)[1].as_str(), Some("timer"));
    }

    #[test]
    fn test_arity_mismatch_reserves_nothing() {
        let (reg, ch) = setup("pair int a; int b");
        let file = EventFile::attach(&reg, "pair", ch).unwrap();
        assert_eq!(
            file.trace_event([1i32]),
            Err(EmissionError::ArityMismatch { expected: 2, got: 1 })
        );
        assert_eq!(file.channel().stats().total_reserved, 0);
        assert!(file.channel().is_empty());
    }

    #[test]
    fn test_value_kind_checked_before_reserve() {
        let (reg, ch) = setup("pair int a; char s[8]");
        let file = EventFile::attach(&reg, "pair", ch).unwrap();
        assert!(matches!(
            file.trace_event_array(&[Value::from(1i32), Value::from(2i32)]),
            Err(EmissionError::ValueKind { .. })
        ));
        assert_eq!(file.channel().stats().total_reserved, 0);
    }

    #[test]
    fn test_disabled_is_noop() {
        let (reg, ch) = setup("pair int a; int b");
        let file = EventFile::attach(&reg, "pair", ch).unwrap();

        file.set_soft_disabled(true);
        assert_eq!(file.trace_event([1i32, 2]).unwrap(), TraceStatus::Disabled);
        file.set_soft_disabled(false);
        file.set_enabled(false);
        assert_eq!(file.trace_event([1i32, 2]).unwrap(), TraceStatus::Disabled);

        assert_eq!(file.channel().stats().total_reserved, 0);
    }

    #[test]
    fn test_reserve_failure_surfaces() {
        let registry = EventRegistry::default();
        registry.run_command("one int a").unwrap();
        let ch = Arc::new(LogChannel::new(
            &ChannelConfig::new(1).with_overflow(OverflowPolicy::Discard),
        ));
        let file = EventFile::attach(&registry, "one", ch).unwrap();

        assert!(file.trace_event([1i32]).is_ok());
        assert!(matches!(
            file.trace_event([2i32]),
            Err(EmissionError::ReserveFailed(ChannelError::Full(_)))
        ));
        assert_eq!(file.channel().len(), 1);
    }

    #[test]
    fn test_piecewise_by_position() {
        let (reg, ch) = setup("pair int a; char s[8]");
        let file = EventFile::attach(&reg, "pair", ch).unwrap();

        let mut trace = file.trace_start().unwrap();
        trace.add_next_value(42i32).unwrap();
        trace.add_next_value("hi").unwrap();
        assert_eq!(trace.mode(), TraceMode::ByPosition);
        assert_eq!(trace.add_next_value(1i32), Err(EmissionError::TooManyValues(2)));
        assert_eq!(trace.end(), TraceStatus::Committed);

        let values = decode_one(&file);
        assert_eq!(values, [FieldValue::Signed(42), FieldValue::Str("hi".to_string())]);
    }

    #[test]
    fn test_piecewise_mode_conflict_keeps_named_fields() {
        let (reg, ch) = setup("xy int x; int y");
        let file = EventFile::attach(&reg, "xy", ch).unwrap();

        let mut trace = file.trace_start().unwrap();
        trace.add_named_value("x", 5i32).unwrap();
        assert_eq!(trace.add_next_value(7i32), Err(EmissionError::ModeConflict));
        assert_eq!(trace.end(), TraceStatus::Committed);

        assert_eq!(decode_one(&file), [FieldValue::Signed(5), FieldValue::Signed(0)]);
    }

    #[test]
    fn test_piecewise_unknown_name() {
        let (reg, ch) = setup("xy int x; int y");
        let file = EventFile::attach(&reg, "xy", ch).unwrap();

        let mut trace = file.trace_start().unwrap();
        assert_eq!(
            trace.add_named_value("z", 1i32),
            Err(EmissionError::NoSuchField("z".to_string()))
        );
        assert_eq!(trace.end(), TraceStatus::Committed);
    }

    #[test]
    fn test_piecewise_disabled_checks_mode_first() {
        let (reg, ch) = setup("xy int x; int y");
        let file = EventFile::attach(&reg, "xy", ch).unwrap();
        file.set_soft_disabled(true);

        let mut trace = file.trace_start().unwrap();
        assert!(trace.is_disabled());
        trace.add_named_value("nonexistent", 1i32).unwrap();
        assert_eq!(trace.add_next_value(1i32), Err(EmissionError::ModeConflict));
        assert_eq!(trace.end(), TraceStatus::Disabled);
        assert!(file.channel().is_empty());
    }

    #[test]
    fn test_piecewise_drop_commits() {
        let (reg, ch) = setup("xy int x; int y");
        let file = EventFile::attach(&reg, "xy", ch).unwrap();
        {
            let mut trace = file.trace_start().unwrap();
            trace.add_next_value(3i32).unwrap();
        }
        assert_eq!(decode_one(&file)[0], FieldValue::Signed(3));
    }

    #[test]
    fn test_nested_emission_from_open_handle() {
        let (reg, ch) = setup("outer int a");
        reg.run_command("inner int b").unwrap();
        let outer = EventFile::attach(&reg, "outer", Arc::clone(&ch)).unwrap();
        let inner = EventFile::attach(&reg, "inner", ch).unwrap();

        let handle = outer.open().unwrap().unwrap();
        assert_eq!(inner.trace_event([1i32]).unwrap(), TraceStatus::Committed);
        handle.close();

        let records = outer.channel().drain();
        let inner_header = records[0].header().unwrap();
        assert_eq!(inner_header.event_id, inner.schema().id());
        assert!(inner_header.is_nested());
        assert!(!records[1].header().unwrap().is_nested());
    }

    #[test]
    fn test_attached_event_is_busy() {
        let (reg, ch) = setup("held int a");
        let file = EventFile::attach(&reg, "held", ch).unwrap();
        assert!(matches!(reg.delete("held"), Err(RegistryError::Busy(_, 1))));
        drop(file);
        assert!(reg.delete("held").is_ok());
    }
}

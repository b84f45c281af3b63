//! Synthetic event registry
//!
//! Holds every defined schema behind one `parking_lot::RwLock` and hands
//! out reference-counted [`EventRef`] handles that block deletion.

use crate::command::SynthEventCmd;
use crate::config::TraceConfig;
use crate::error::{DefinitionError, RegistryError, SynthError};
use crate::field::{self, FieldDesc, FieldSchema};
use crate::format::RecordFormat;
use crate::record::Record;
use crate::schema::{EventSchema, ModuleHandle};
use parking_lot::RwLock;
use serde::Serialize;
use std::ops::Deref;
use std::sync::Arc;
use tracing::{debug, warn};

/// Name-keyed store of synthetic event schemas
///
/// Definition and deletion serialize on one exclusive lock; lookups share
/// it. The emission hot path never touches the lock: it works through an
/// [`EventRef`] acquired once up front.
///
/// # Example Usage
/// ```
/// use synthtrace::registry::EventRegistry;
///
/// let registry = EventRegistry::default();
/// registry.create_from_args("wakeup", &["u64", "lat;", "pid_t", "pid"], None)?;
/// let schema = registry.lookup("wakeup")?;
/// assert_eq!(schema.n_fields(), 2);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct EventRegistry {
    config: TraceConfig,
    inner: RwLock<Inner>,
}

#[derive(Debug)]
struct Inner {
    /// Definition order is listing order
    events: Vec<Arc<EventSchema>>,
    next_id: u32,
}

impl Inner {
    fn position(&self, name: &str) -> Option<usize> {
        self.events.iter().position(|e| e.name() == name)
    }

    /// Next unused id; ids are consumed only by successful definitions
    fn peek_id(&self) -> Result<u16, DefinitionError> {
        u16::try_from(self.next_id).map_err(|_| DefinitionError::IdsExhausted)
    }
}

/// One line of the event listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventListing {
    pub name: String,
    pub fields: Vec<FieldDesc>,
}

impl EventRegistry {
    pub fn new(config: TraceConfig) -> Self {
        Self {
            config,
            inner: RwLock::new(Inner {
                events: Vec::new(),
                next_id: 1,
            }),
        }
    }

    pub fn config(&self) -> &TraceConfig {
        &self.config
    }

    /// Register an event from already parsed fields
    ///
    /// Either the whole schema is published or nothing is.
    pub fn define(
        &self,
        name: &str,
        fields: Vec<FieldSchema>,
        owner: Option<ModuleHandle>,
    ) -> Result<Arc<EventSchema>, DefinitionError> {
        let mut inner = self.inner.write();
        Self::define_locked(&mut inner, &self.config, name, || Ok(fields), owner)
    }

    /// Register an event from a flat field-description token stream
    pub fn create_from_args(
        &self,
        name: &str,
        args: &[&str],
        owner: Option<ModuleHandle>,
    ) -> Result<Arc<EventSchema>, DefinitionError> {
        let mut inner = self.inner.write();
        let config = &self.config;
        Self::define_locked(
            &mut inner,
            config,
            name,
            || field::parse_fields(args, config.max_fields, config.string_capacity_ceiling),
            owner,
        )
    }

    /// Register an event from type/name pairs
    pub fn create(
        &self,
        name: &str,
        fields: &[FieldDesc],
        owner: Option<ModuleHandle>,
    ) -> Result<Arc<EventSchema>, DefinitionError> {
        let mut cmd = SynthEventCmd::new(name, &self.config);
        if let Some(owner) = owner {
            cmd = cmd.module(owner);
        }
        cmd.add_fields(fields)?.create(self)
    }

    fn define_locked(
        inner: &mut Inner,
        config: &TraceConfig,
        name: &str,
        fields: impl FnOnce() -> Result<Vec<FieldSchema>, DefinitionError>,
        owner: Option<ModuleHandle>,
    ) -> Result<Arc<EventSchema>, DefinitionError> {
        if name.is_empty() {
            return Err(DefinitionError::BadEventName(name.to_string()));
        }
        if inner.position(name).is_some() {
            return Err(DefinitionError::DuplicateName(name.to_string()));
        }

        let fields = fields()?;
        let id = inner.peek_id()?;
        let schema = Arc::new(EventSchema::compile(
            id,
            name,
            fields,
            owner,
            config.max_fields,
        )?);
        inner.next_id += 1;
        inner.events.push(Arc::clone(&schema));

        debug!(
            event = name,
            id,
            fields = schema.n_fields(),
            record_size = schema.layout().record_size(),
            "synthetic event defined"
        );
        Ok(schema)
    }

    /// Remove an event that has no live references
    pub fn delete(&self, name: &str) -> Result<Arc<EventSchema>, RegistryError> {
        let mut inner = self.inner.write();
        let idx = inner
            .position(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;

        let refs = inner.events[idx].ref_count();
        if refs != 0 {
            return Err(RegistryError::Busy(name.to_string(), refs));
        }

        let schema = inner.events.remove(idx);
        match schema.owner() {
            Some(owner) => debug!(event = name, %owner, "module-owned synthetic event deleted"),
            None => debug!(event = name, "synthetic event deleted"),
        }
        Ok(schema)
    }

    /// Delete every event, or none of them if any is busy
    pub fn release_all(&self) -> Result<usize, RegistryError> {
        let mut inner = self.inner.write();
        if let Some(busy) = inner.events.iter().find(|e| e.is_busy()) {
            return Err(RegistryError::Busy(busy.name().to_string(), busy.ref_count()));
        }
        let count = inner.events.len();
        inner.events.clear();
        debug!(count, "all synthetic events released");
        Ok(count)
    }

    /// Tear the registry down, refusing while any event is referenced
    pub fn shutdown(self) -> Result<(), RegistryError> {
        self.release_all().map(|_| ())
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<EventSchema>, RegistryError> {
        let inner = self.inner.read();
        inner
            .position(name)
            .map(|idx| Arc::clone(&inner.events[idx]))
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    pub fn lookup_id(&self, id: u16) -> Option<Arc<EventSchema>> {
        self.inner
            .read()
            .events
            .iter()
            .find(|e| e.id() == id)
            .cloned()
    }

    /// Look up by `[group/]name` as written in a dynamic-event command
    pub fn find_match(&self, system: Option<&str>, event: &str) -> Option<Arc<EventSchema>> {
        self.inner
            .read()
            .events
            .iter()
            .find(|e| e.matches(system, event))
            .cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.read().position(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.inner.read().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().events.is_empty()
    }

    /// Take a counted reference that blocks deletion until dropped
    pub fn acquire(&self, name: &str) -> Result<EventRef, RegistryError> {
        let inner = self.inner.read();
        let idx = inner
            .position(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        Ok(EventRef::new(Arc::clone(&inner.events[idx])))
    }

    /// Iterate over a snapshot of the defined events
    ///
    /// Each call starts a fresh pass; events defined or deleted afterwards
    /// do not affect an iteration already in progress.
    pub fn iter(&self) -> impl Iterator<Item = Arc<EventSchema>> {
        self.inner.read().events.clone().into_iter()
    }

    pub fn list(&self) -> Vec<EventListing> {
        self.iter()
            .map(|e| EventListing {
                name: e.name().to_string(),
                fields: e.field_descs(),
            })
            .collect()
    }

    /// Render a committed record using whichever event wrote it
    pub fn render(&self, record: &Record, verbose: bool) -> String {
        let Some(id) = record.event_id() else {
            return "<truncated record>".to_string();
        };
        match self.lookup_id(id) {
            Some(schema) => schema
                .render(record, verbose)
                .unwrap_or_else(|err| format!("{}: <{err}>", schema.name())),
            None => {
                warn!(id, "record from unknown synthetic event");
                format!("<unknown synthetic event id {id}>")
            }
        }
    }

    /// Run one definition command line
    pub fn run_command(&self, line: &str) -> Result<(), SynthError> {
        crate::command::run_command(self, line)
    }
}

impl Default for EventRegistry {
    fn default() -> Self {
        Self::new(TraceConfig::default())
    }
}

/// Counted reference to a registered schema
///
/// While any `EventRef` to an event is alive the event cannot be deleted.
#[derive(Debug)]
pub struct EventRef {
    schema: Arc<EventSchema>,
}

impl EventRef {
    fn new(schema: Arc<EventSchema>) -> Self {
        schema.get();
        Self { schema }
    }

    pub fn schema(&self) -> &Arc<EventSchema> {
        &self.schema
    }
}

impl Clone for EventRef {
    fn clone(&self) -> Self {
        Self::new(Arc::clone(&self.schema))
    }
}

impl Deref for EventRef {
    type Target = EventSchema;

    fn deref(&self) -> &EventSchema {
        &self.schema
    }
}

impl Drop for EventRef {
    fn drop(&mut self) {
        self.schema.put();
    }
}

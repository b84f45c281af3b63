//! Compiled event schemas
//!
//! An [`EventSchema`] is immutable once registered except for its reference
//! count, which tracks live subscriptions (event files) and blocks deletion
//! while non-zero.

use crate::error::DefinitionError;
use crate::field::{FieldDesc, FieldSchema};
use crate::layout::Layout;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

/// Group qualifier accepted in front of event names (`synthetic/<name>`)
pub const SYNTH_SYSTEM: &str = "synthetic";

/// Opaque identity of the component that created an event
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleHandle(String);

impl ModuleHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compiled description of one synthetic event
#[derive(Debug)]
pub struct EventSchema {
    id: u16,
    name: String,
    fields: Vec<FieldSchema>,
    layout: Layout,
    owner: Option<ModuleHandle>,
    refs: AtomicU32,
}

impl EventSchema {
    /// Validate `fields` and compile their layout
    ///
    /// Field names must be unique and the count must not exceed
    /// `max_fields`. Nothing is registered here; the registry decides
    /// whether the compiled schema is published.
    pub fn compile(
        id: u16,
        name: impl Into<String>,
        mut fields: Vec<FieldSchema>,
        owner: Option<ModuleHandle>,
        max_fields: usize,
    ) -> Result<Self, DefinitionError> {
        let name = name.into();
        if name.is_empty() {
            return Err(DefinitionError::BadEventName(name));
        }
        if fields.is_empty() {
            return Err(DefinitionError::BadFieldSyntax(format!("event '{name}' has no fields")));
        }
        if fields.len() > max_fields {
            return Err(DefinitionError::FieldLimitExceeded {
                count: fields.len(),
                max: max_fields,
            });
        }

        let mut seen = HashSet::with_capacity(fields.len());
        for field in &fields {
            if !seen.insert(field.name.as_str()) {
                return Err(DefinitionError::DuplicateField {
                    event: name,
                    field: field.name.clone(),
                });
            }
        }

        let layout = Layout::compile(&mut fields);
        Ok(Self {
            id,
            name,
            fields,
            layout,
            owner,
            refs: AtomicU32::new(0),
        })
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldSchema] {
        &self.fields
    }

    pub fn n_fields(&self) -> usize {
        self.fields.len()
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn owner(&self) -> Option<&ModuleHandle> {
        self.owner.as_ref()
    }

    /// Linear scan by field name
    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_descs(&self) -> Vec<FieldDesc> {
        self.fields.iter().map(FieldSchema::desc).collect()
    }

    pub fn ref_count(&self) -> u32 {
        self.refs.load(Ordering::Acquire)
    }

    pub fn is_busy(&self) -> bool {
        self.ref_count() != 0
    }

    /// Callers must hold the registry read lock so the increment cannot
    /// race a deletion.
    pub(crate) fn get(&self) {
        self.refs.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn put(&self) {
        self.refs.fetch_sub(1, Ordering::AcqRel);
    }

    /// Does this event answer to `system`/`event`?
    ///
    /// The group, when given, must be the synthetic group.
    pub fn matches(&self, system: Option<&str>, event: &str) -> bool {
        self.name == event && system.map_or(true, |s| s == SYNTH_SYSTEM)
    }

    /// Listing line: `name\ttype name; type name`
    pub fn show(&self) -> String {
        let fields: Vec<String> = self
            .fields
            .iter()
            .map(|f| format!("{} {}", f.ty.name, f.name))
            .collect();
        format!("{}\t{}", self.name, fields.join("; "))
    }

    /// Dynamic-event listing line: `s:synthetic/name\t...`
    pub fn show_dynevent(&self) -> String {
        format!("s:{}/{}", SYNTH_SYSTEM, self.show())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::parse_field;
    use crate::record::HEADER_SIZE;
    use crate::types::STR_VAR_LEN_MAX;

    fn fields(specs: &[&[&str]]) -> Vec<FieldSchema> {
        specs
            .iter()
            .map(|t| parse_field(t, STR_VAR_LEN_MAX).unwrap().0)
            .collect()
    }

    #[test]
    fn test_compile_assigns_layout() {
        let schema = EventSchema::compile(
            1,
            "wakeup_latency",
            fields(&[&["u64", "lat"], &["pid_t", "pid"], &["char", "comm[16]"]]),
            None,
            32,
        )
        .unwrap();

        assert_eq!(schema.n_fields(), 3);
        assert_eq!(schema.field("pid").unwrap().offset, 8);
        assert_eq!(schema.field("comm").unwrap().offset, 16);
        assert_eq!(schema.layout().record_size(), HEADER_SIZE + 32);
    }

    #[test]
    fn test_compile_rejects_too_many_fields() {
        let many: Vec<FieldSchema> = (0..5)
            .map(|i| {
                let name = format!("f{i}");
                parse_field(&["int", name.as_str()], STR_VAR_LEN_MAX).unwrap().0
            })
            .collect();
        assert!(matches!(
            EventSchema::compile(1, "many", many, None, 4),
            Err(DefinitionError::FieldLimitExceeded { count: 5, max: 4 })
        ));
    }

    #[test]
    fn test_compile_rejects_duplicate_field() {
        let result = EventSchema::compile(
            1,
            "dup",
            fields(&[&["int", "a"], &["u64", "a"]]),
            None,
            32,
        );
        assert!(matches!(result, Err(DefinitionError::DuplicateField { .. })));
    }

    #[test]
    fn test_show_lines() {
        let schema = EventSchema::compile(
            3,
            "irq",
            fields(&[&["unsigned", "int", "vec"], &["char", "name[8]"]]),
            Some(ModuleHandle::new("irqmod")),
            32,
        )
        .unwrap();

        assert_eq!(schema.show(), "irq\tunsigned int vec; char[8] name");
        assert_eq!(
            schema.show_dynevent(),
            "s:synthetic/irq\tunsigned int vec; char[8] name"
        );
        assert_eq!(schema.owner().map(ModuleHandle::name), Some("irqmod"));
    }

    #[test]
    fn test_matches_group() {
        let schema = EventSchema::compile(1, "foo", fields(&[&["int", "x"]]), None, 32).unwrap();
        assert!(schema.matches(None, "foo"));
        assert!(schema.matches(Some("synthetic"), "foo"));
        assert!(!schema.matches(Some("kprobes"), "foo"));
        assert!(!schema.matches(None, "bar"));
    }

    #[test]
    fn test_refcount() {
        let schema = EventSchema::compile(1, "foo", fields(&[&["int", "x"]]), None, 32).unwrap();
        assert!(!schema.is_busy());
        schema.get();
        assert_eq!(schema.ref_count(), 1);
        schema.put();
        assert!(!schema.is_busy());
    }
}

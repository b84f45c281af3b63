//! Definition commands
//!
//! Two textual front ends feed the registry:
//!
//! - the synthetic-events form: `name type field[; type field]...`, with
//!   `!name` deleting the event;
//! - the dynamic-events form: `s:[synthetic/]name type field...` to create
//!   and `-:[group/]name` to delete. A delete naming any group other than
//!   `synthetic` matches nothing.
//!
//! [`SynthEventCmd`] builds the same command text programmatically.

use crate::config::TraceConfig;
use crate::error::{DefinitionError, RegistryError, SynthError};
use crate::field::FieldDesc;
use crate::registry::EventRegistry;
use crate::schema::{EventSchema, ModuleHandle, SYNTH_SYSTEM};
use crate::types;
use std::sync::Arc;
use tracing::debug;

/// Strip an optional `synthetic/` qualifier; any other group is rejected
pub fn normalize_name(name: &str) -> Result<&str, DefinitionError> {
    let bare = match name.split_once('/') {
        Some((group, bare)) if group == SYNTH_SYSTEM => bare,
        Some(_) => return Err(DefinitionError::BadEventName(name.to_string())),
        None => name,
    };
    if bare.is_empty() || bare.contains('/') {
        return Err(DefinitionError::BadEventName(name.to_string()));
    }
    Ok(bare)
}

/// Run one synthetic-events command line; blank lines are a no-op
pub fn run_command(registry: &EventRegistry, line: &str) -> Result<(), SynthError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let Some((&name, args)) = tokens.split_first() else {
        return Ok(());
    };

    if let Some(target) = name.strip_prefix('!') {
        registry.delete(normalize_name(target)?)?;
        return Ok(());
    }

    registry.create_from_args(normalize_name(name)?, args, None)?;
    Ok(())
}

/// Run one dynamic-events command line (`s:` create, `-:` delete)
pub fn run_dynevent_command(registry: &EventRegistry, line: &str) -> Result<(), SynthError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let Some((&head, args)) = tokens.split_first() else {
        return Ok(());
    };

    if let Some(target) = head.strip_prefix("-:") {
        let (system, event) = match target.split_once('/') {
            Some((system, event)) => (Some(system), event),
            None => (None, target),
        };
        let schema = registry
            .find_match(system, event)
            .ok_or_else(|| RegistryError::NotFound(target.to_string()))?;
        registry.delete(schema.name())?;
        return Ok(());
    }

    let name = head
        .strip_prefix("s:")
        .ok_or_else(|| DefinitionError::BadEventName(head.to_string()))?;
    registry.create_from_args(normalize_name(name)?, args, None)?;
    Ok(())
}

/// Incrementally built event definition command
///
/// # Example
/// ```
/// use synthtrace::command::SynthEventCmd;
/// use synthtrace::config::TraceConfig;
/// use synthtrace::registry::EventRegistry;
///
/// let registry = EventRegistry::default();
/// let schema = SynthEventCmd::new("sched_lat", registry.config())
///     .add_field("pid_t", "pid")?
///     .add_field("char", "comm[16]")?
///     .add_field_str("u64 lat")?
///     .create(&registry)?;
/// assert_eq!(schema.n_fields(), 3);
/// # Ok::<(), synthtrace::error::DefinitionError>(())
/// ```
#[derive(Debug, Clone)]
pub struct SynthEventCmd {
    name: String,
    owner: Option<ModuleHandle>,
    fields: Vec<String>,
    max_fields: usize,
    string_ceiling: usize,
}

impl SynthEventCmd {
    pub fn new(name: impl Into<String>, config: &TraceConfig) -> Self {
        Self {
            name: name.into(),
            owner: None,
            fields: Vec::new(),
            max_fields: config.max_fields,
            string_ceiling: config.string_capacity_ceiling,
        }
    }

    /// Record the module creating the event
    pub fn module(mut self, owner: ModuleHandle) -> Self {
        self.owner = Some(owner);
        self
    }

    /// Append a field; the type is checked against the catalog right away
    pub fn add_field(mut self, ty: &str, name: &str) -> Result<Self, DefinitionError> {
        if ty.is_empty() || name.is_empty() {
            return Err(DefinitionError::BadFieldSyntax(format!("{ty} {name}")));
        }
        types::resolve(ty, self.string_ceiling)?;
        self.push(format!("{ty} {name};"))?;
        Ok(self)
    }

    /// Append a field written as one `"type name"` string, unchecked until
    /// the command runs
    pub fn add_field_str(mut self, type_name: &str) -> Result<Self, DefinitionError> {
        if type_name.trim().is_empty() {
            return Err(DefinitionError::BadFieldSyntax(type_name.to_string()));
        }
        self.push(format!("{type_name};"))?;
        Ok(self)
    }

    pub fn add_fields(mut self, fields: &[FieldDesc]) -> Result<Self, DefinitionError> {
        for field in fields {
            self = self.add_field(&field.ty, &field.name)?;
        }
        Ok(self)
    }

    fn push(&mut self, field: String) -> Result<(), DefinitionError> {
        if self.fields.len() >= self.max_fields {
            return Err(DefinitionError::FieldLimitExceeded {
                count: self.fields.len() + 1,
                max: self.max_fields,
            });
        }
        self.fields.push(field);
        Ok(())
    }

    pub fn n_fields(&self) -> usize {
        self.fields.len()
    }

    /// Command text as it would be written to the synthetic-events front end
    pub fn command(&self) -> String {
        if self.fields.is_empty() {
            return self.name.clone();
        }
        format!("{} {}", self.name, self.fields.join(" "))
    }

    /// Execute the command against `registry`
    pub fn create(self, registry: &EventRegistry) -> Result<Arc<EventSchema>, DefinitionError> {
        let name = normalize_name(&self.name)?;
        if name.chars().any(char::is_whitespace) {
            return Err(DefinitionError::BadEventName(self.name.clone()));
        }

        let text = self.fields.join(" ");
        let args: Vec<&str> = text.split_whitespace().collect();
        debug!(command = %self.command(), "running synthetic event command");
        registry.create_from_args(name, &args, self.owner.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("foo"), Ok("foo"));
        assert_eq!(normalize_name("synthetic/foo"), Ok("foo"));
        assert!(normalize_name("kprobes/foo").is_err());
        assert!(normalize_name("synthetic/").is_err());
        assert!(normalize_name("").is_err());
    }

    #[test]
    fn test_run_command_create_and_delete() {
        let reg = EventRegistry::default();
        run_command(&reg, "wakeup_latency u64 lat; pid_t pid; char comm[16]").unwrap();
        let schema = reg.lookup("wakeup_latency").unwrap();
        assert_eq!(schema.n_fields(), 3);
        assert!(schema.field("comm").unwrap().is_string());

        run_command(&reg, "!wakeup_latency").unwrap();
        assert!(reg.is_empty());
    }

    #[test]
    fn test_qualified_names_collide() {
        let reg = EventRegistry::default();
        run_command(&reg, "foo int x").unwrap();
        assert_eq!(
            run_command(&reg, "synthetic/foo u64 y"),
            Err(SynthError::Definition(DefinitionError::DuplicateName(
                "foo".to_string()
            )))
        );
        run_dynevent_command(&reg, "-:synthetic/foo").unwrap();
        assert!(reg.is_empty());
    }

    #[test]
    fn test_run_command_delete_missing() {
        let reg = EventRegistry::default();
        assert!(matches!(
            run_command(&reg, "!nothing"),
            Err(SynthError::Registry(RegistryError::NotFound(_)))
        ));
    }

    #[test]
    fn test_blank_line_is_noop() {
        let reg = EventRegistry::default();
        assert!(run_command(&reg, "   ").is_ok());
        assert!(reg.is_empty());
    }

    #[test]
    fn test_dynevent_create() {
        let reg = EventRegistry::default();
        run_dynevent_command(&reg, "s:synthetic/irq unsigned int vec").unwrap();
        run_dynevent_command(&reg, "s:softirq unsigned int vec").unwrap();
        assert_eq!(reg.len(), 2);
        assert!(run_dynevent_command(&reg, "p:kprobe do_sys_open").is_err());
        assert!(run_dynevent_command(&reg, "s:kprobes/x int a").is_err());
    }

    #[test]
    fn test_dynevent_delete_matches_group() {
        let reg = EventRegistry::default();
        run_command(&reg, "foo int x").unwrap();
        run_command(&reg, "bar int x").unwrap();

        assert_eq!(
            run_dynevent_command(&reg, "-:kprobes/foo"),
            Err(SynthError::Registry(RegistryError::NotFound(
                "kprobes/foo".to_string()
            )))
        );
        assert!(reg.contains("foo"));

        run_dynevent_command(&reg, "-:synthetic/foo").unwrap();
        run_dynevent_command(&reg, "-:bar").unwrap();
        assert!(reg.is_empty());
        assert!(matches!(
            run_dynevent_command(&reg, "-:bar"),
            Err(SynthError::Registry(RegistryError::NotFound(_)))
        ));
    }

    #[test]
    fn test_cmd_builder_checks_types_eagerly() {
        let config = TraceConfig::default();
        let err = SynthEventCmd::new("x", &config)
            .add_field("float", "f")
            .unwrap_err();
        assert_eq!(err, DefinitionError::UnknownType("float".to_string()));
    }

    #[test]
    fn test_cmd_builder_field_limit() {
        let config = TraceConfig {
            max_fields: 2,
            ..TraceConfig::default()
        };
        let cmd = SynthEventCmd::new("x", &config)
            .add_field("int", "a")
            .unwrap()
            .add_field("int", "b")
            .unwrap();
        assert!(matches!(
            cmd.add_field("int", "c"),
            Err(DefinitionError::FieldLimitExceeded { count: 3, max: 2 })
        ));
    }

    #[test]
    fn test_cmd_builder_command_text_and_module() {
        let reg = EventRegistry::default();
        let cmd = SynthEventCmd::new("gen", reg.config())
            .module(ModuleHandle::new("synth_test"))
            .add_fields(&[
                FieldDesc::new("pid_t", "next_pid_field"),
                FieldDesc::new("char[16]", "next_comm_field"),
            ])
            .unwrap();
        assert_eq!(
            cmd.command(),
            "gen pid_t next_pid_field; char[16] next_comm_field;"
        );

        let schema = cmd.create(&reg).unwrap();
        assert_eq!(schema.owner().map(ModuleHandle::name), Some("synth_test"));
        assert_eq!(schema.field("next_comm_field").unwrap().ty.size, 16);
    }

    #[test]
    fn test_cmd_builder_rejects_bad_name() {
        let reg = EventRegistry::default();
        let cmd = SynthEventCmd::new("two words", reg.config())
            .add_field("int", "a")
            .unwrap();
        assert!(matches!(cmd.create(&reg), Err(DefinitionError::BadEventName(_))));
    }
}

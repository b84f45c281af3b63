//! Format derivation and record rendering
//!
//! Rendering is implemented once, generically over field types, through the
//! [`RecordFormat`] trait on [`EventSchema`]; no event carries hand-written
//! print logic.

use crate::error::DecodeError;
use crate::flags;
use crate::record::{decode_field, FieldValue, Record};
use crate::schema::EventSchema;
use crate::types::TypeKind;
use std::fmt::Write;

/// Decoding and printing of committed records for one event
pub trait RecordFormat {
    /// Template such as `lat=%llu pid=%d comm=%s`
    fn format_template(&self) -> String;

    /// Kernel-style print format: quoted template plus `REC->field` args
    fn print_fmt(&self) -> String;

    /// Decode every field of `record` in declaration order
    fn decode(&self, record: &Record) -> Result<Vec<FieldValue>, DecodeError>;

    /// One readout line; `verbose` prefixes each value with its conversion
    fn render(&self, record: &Record, verbose: bool) -> Result<String, DecodeError>;
}

impl RecordFormat for EventSchema {
    fn format_template(&self) -> String {
        self.fields()
            .iter()
            .map(|f| format!("{}={}", f.name, f.ty.fmt()))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn print_fmt(&self) -> String {
        let quoted = self
            .fields()
            .iter()
            .map(|f| format!("{}={}", f.name, f.ty.fmt()))
            .collect::<Vec<_>>()
            .join(", ");

        let mut out = format!("\"{quoted}\"");
        for field in self.fields() {
            let _ = write!(out, ", REC->{}", field.name);
        }
        out
    }

    fn decode(&self, record: &Record) -> Result<Vec<FieldValue>, DecodeError> {
        let header = record.header()?;
        if header.event_id != self.id() {
            return Err(DecodeError::WrongEvent {
                expected: self.id(),
                found: header.event_id,
            });
        }

        let payload = record.payload();
        let expected = self.layout().payload_size();
        if payload.len() < expected {
            return Err(DecodeError::Truncated {
                expected,
                got: payload.len(),
            });
        }

        self.fields()
            .iter()
            .map(|f| decode_field(payload, f))
            .collect()
    }

    fn render(&self, record: &Record, verbose: bool) -> Result<String, DecodeError> {
        let values = self.decode(record)?;
        let mut out = format!("{}: ", self.name());

        for (i, (field, value)) in self.fields().iter().zip(&values).enumerate() {
            if i > 0 {
                out.push(' ');
            }
            if verbose {
                let _ = write!(out, "{} ", field.ty.fmt());
            }
            let _ = write!(out, "{}=", field.name);

            match (field.ty.kind, value) {
                (TypeKind::Flags, FieldValue::Unsigned(v)) => {
                    let _ = write!(out, "{v:x} ({})", flags::render(*v));
                }
                _ => {
                    let _ = write!(out, "{value}");
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::parse_field;
    use crate::record::{encode_field, RecordHeader, Value, HEADER_SIZE};
    use crate::types::STR_VAR_LEN_MAX;

    fn schema() -> EventSchema {
        let fields = [
            &["u64", "lat;"][..],
            &["pid_t", "pid;"][..],
            &["char", "comm[16];"][..],
            &["gfp_t", "gfp"][..],
        ]
        .iter()
        .map(|t| parse_field(t, STR_VAR_LEN_MAX).unwrap().0)
        .collect();
        EventSchema::compile(9, "alloc_lat", fields, None, 32).unwrap()
    }

    fn record(schema: &EventSchema, values: &[Value<'_>]) -> Record {
        let mut bytes = vec![0u8; schema.layout().record_size()];
        RecordHeader {
            event_id: schema.id(),
            flags: 0,
            depth: 1,
            pid: 1,
        }
        .write(&mut bytes);
        for (field, value) in schema.fields().iter().zip(values) {
            encode_field(&mut bytes[HEADER_SIZE..], field, *value).unwrap();
        }
        Record::from_bytes(bytes.into_boxed_slice())
    }

    #[test]
    fn test_format_template() {
        assert_eq!(
            schema().format_template(),
            "lat=%llu pid=%d comm=%s gfp=%x"
        );
    }

    #[test]
    fn test_print_fmt() {
        assert_eq!(
            schema().print_fmt(),
            "\"lat=%llu, pid=%d, comm=%s, gfp=%x\", REC->lat, REC->pid, REC->comm, REC->gfp"
        );
    }

    #[test]
    fn test_render_with_flags() {
        let s = schema();
        let r = record(
            &s,
            &[
                Value::Int(1500),
                Value::from(-1i32),
                Value::from("kworker/0:1"),
                Value::Int(0x14c0),
            ],
        );
        assert_eq!(
            s.render(&r, false).unwrap(),
            "alloc_lat: lat=1500 pid=-1 comm=kworker/0:1 gfp=14c0 (GFP_KERNEL)"
        );
    }

    #[test]
    fn test_render_verbose() {
        let s = schema();
        let r = record(
            &s,
            &[Value::Int(1), Value::Int(2), Value::from("x"), Value::Int(0)],
        );
        let line = s.render(&r, true).unwrap();
        assert!(line.starts_with("alloc_lat: %llu lat=1 %d pid=2 %s comm=x"));
    }

    #[test]
    fn test_decode_wrong_event() {
        let s = schema();
        let mut r = record(&s, &[Value::Int(1), Value::Int(2), Value::from("x"), Value::Int(0)]);
        let mut bytes = r.as_bytes().to_vec();
        bytes[0] = 0xee;
        r = Record::from_bytes(bytes.into_boxed_slice());
        assert!(matches!(s.decode(&r), Err(DecodeError::WrongEvent { .. })));
    }
}

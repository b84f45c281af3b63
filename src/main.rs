use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use synthtrace::channel::LogChannel;
use synthtrace::cli::{Cli, OutputFormat};
use synthtrace::command;
use synthtrace::config::TraceConfig;
use synthtrace::emit::EventFile;
use synthtrace::format::RecordFormat;
use synthtrace::record::Value;
use synthtrace::registry::{EventListing, EventRegistry};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

#[derive(Debug, Serialize)]
struct PrintFormat {
    name: String,
    print_fmt: String,
}

#[derive(Debug, Serialize)]
struct Report {
    events: Vec<EventListing>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    formats: Vec<PrintFormat>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    samples: Vec<String>,
}

fn read_commands(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read commands file: {}", path.display())),
        _ => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read commands from stdin")?;
            Ok(text)
        }
    }
}

/// Apply definition commands line by line; `#` starts a comment line
fn apply_commands(registry: &EventRegistry, text: &str) -> Result<()> {
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let result = if line.starts_with("s:") || line.starts_with("-:") {
            command::run_dynevent_command(registry, line)
        } else {
            command::run_command(registry, line)
        };
        result.with_context(|| format!("line {}: {}", lineno + 1, line))?;
    }
    Ok(())
}

/// Write one zero-valued record per event and render what was committed
fn sample_records(registry: &EventRegistry, config: &TraceConfig, verbose: bool) -> Result<Vec<String>> {
    let channel = Arc::new(LogChannel::new(&config.channel));

    for schema in registry.iter() {
        let file = EventFile::attach(registry, schema.name(), Arc::clone(&channel))?;
        let values: Vec<Value<'_>> = schema
            .fields()
            .iter()
            .map(|f| if f.is_string() { Value::Str(b"") } else { Value::Int(0) })
            .collect();
        let status = file
            .trace_event_array(&values)
            .with_context(|| format!("Failed to emit sample for '{}'", schema.name()))?;
        debug!(event = schema.name(), ?status, "sample emitted");
    }

    let stats = channel.stats();
    debug!(
        committed = stats.total_committed,
        dropped = stats.total_dropped,
        overwritten = stats.total_overwritten,
        "sample channel statistics"
    );

    Ok(channel
        .drain()
        .iter()
        .map(|record| registry.render(record, verbose))
        .collect())
}

fn main() -> Result<()> {
    let args = Cli::parse();

    // Initialize tracing if --debug flag is set
    init_tracing(args.debug);

    let config = match &args.config {
        Some(path) => TraceConfig::from_toml(path)?,
        None => TraceConfig::default(),
    };

    let registry = EventRegistry::new(config.clone());
    let text = read_commands(args.commands.as_deref())?;
    apply_commands(&registry, &text)?;

    let formats: Vec<PrintFormat> = if args.show_formats {
        registry
            .iter()
            .map(|e| PrintFormat {
                name: e.name().to_string(),
                print_fmt: e.print_fmt(),
            })
            .collect()
    } else {
        Vec::new()
    };

    let samples = if args.sample {
        sample_records(&registry, &config, args.verbose)?
    } else {
        Vec::new()
    };

    match args.format {
        OutputFormat::Json => {
            let report = Report {
                events: registry.list(),
                formats,
                samples,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Text => {
            for schema in registry.iter() {
                println!("{}", schema.show());
            }
            for format in &formats {
                println!("{}: print fmt: {}", format.name, format.print_fmt);
            }
            for sample in &samples {
                println!("{sample}");
            }
        }
    }

    registry.shutdown()?;
    Ok(())
}

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use pixconv_core::config::{ConfigOverlay, resolve_config};
use pixconv_core::convert::{ConversionReport, Role};
use pixconv_core::store::WriteMode;

use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// Create the output store directory if it does not exist.
    Create,
    /// Add to an existing output store.
    Append,
}

impl From<ModeArg> for WriteMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Create => Self::Create,
            ModeArg::Append => Self::Append,
        }
    }
}

/// Arguments for `pixconv convert`.
#[derive(Args, Debug, Default)]
#[allow(clippy::struct_excessive_bools)]
pub struct ConvertArgs {
    /// Hit table to convert (JSON Lines, one chunk per line).
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Output store directory.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Plane namespace inside the store [default: Plane0].
    #[arg(long)]
    pub plane: Option<String>,

    /// How to open the output store [default: create].
    #[arg(long, value_enum)]
    pub mode: Option<ModeArg>,

    /// Verify against the store's existing event table instead of writing it.
    #[arg(long, overrides_with = "author")]
    pub verify: bool,

    /// Write the store's event table (undoes a config file's verify setting).
    #[arg(long, overrides_with = "verify")]
    pub author: bool,

    /// Stop after this many events (0 = no limit).
    #[arg(long, value_name = "N")]
    pub max_events: Option<u64>,

    /// Check trigger clock drift against the event table (with --verify).
    #[arg(long, overrides_with = "no_check_timestamp")]
    pub check_timestamp: bool,

    /// Skip the trigger clock drift check.
    #[arg(long, overrides_with = "check_timestamp")]
    pub no_check_timestamp: bool,

    /// Accepted deviation of the clock drift ratio from 1.0 [default: 0.01].
    #[arg(long, value_name = "F")]
    pub tolerance: Option<f64>,

    /// Do not require event numbers to increase.
    #[arg(long, overrides_with = "require_monotonic")]
    pub allow_unordered: bool,

    /// Fail when event numbers do not increase.
    #[arg(long, overrides_with = "allow_unordered")]
    pub require_monotonic: bool,

    /// Also write the readout diagnostic columns.
    #[arg(long, overrides_with = "no_diagnostics")]
    pub diagnostics: bool,

    /// Leave the readout diagnostic columns out.
    #[arg(long, overrides_with = "diagnostics")]
    pub no_diagnostics: bool,

    /// Milliseconds to wait for another writer to release the store.
    #[arg(long, value_name = "MS")]
    pub lock_timeout_ms: Option<u64>,

    /// Settings file (TOML) applied below the command-line flags.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

impl ConvertArgs {
    /// The command-line settings layer. Each setting has a pair of
    /// switches; when neither is given, lower layers decide.
    pub fn overlay(&self) -> ConfigOverlay {
        ConfigOverlay {
            input: self.input.clone(),
            output: self.output.clone(),
            plane: self.plane.clone(),
            write_mode: self.mode.map(WriteMode::from),
            author_mode: switch(self.author, self.verify),
            max_events: self.max_events,
            check_timestamp: switch(self.check_timestamp, self.no_check_timestamp),
            timestamp_tolerance: self.tolerance,
            require_monotonic: switch(self.require_monotonic, self.allow_unordered),
            diagnostics: switch(self.diagnostics, self.no_diagnostics),
            lock_timeout_ms: self.lock_timeout_ms,
        }
    }
}

const fn switch(on: bool, off: bool) -> Option<bool> {
    match (on, off) {
        (true, _) => Some(true),
        (false, true) => Some(false),
        (false, false) => None,
    }
}

/// Run a conversion and report it.
///
/// # Errors
///
/// Returns an error if settings cannot be resolved or the conversion fails.
pub fn run_convert(args: &ConvertArgs, output: OutputMode, quiet: bool) -> Result<()> {
    let config = resolve_config(args.config.as_deref(), args.overlay())
        .context("resolving conversion settings")?;
    let report = pixconv_core::convert(&config).with_context(|| {
        format!(
            "converting {} into plane {} of {}",
            config.input.display(),
            config.plane,
            config.output.display()
        )
    })?;

    if quiet && !output.is_json() {
        return Ok(());
    }
    render_mode(output, &report, render_text, render_pretty)
}

const fn role_name(role: Role) -> &'static str {
    match role {
        Role::Author => "author",
        Role::Verify => "verify",
    }
}

fn render_text(report: &ConversionReport, w: &mut dyn Write) -> io::Result<()> {
    let s = &report.summary;
    writeln!(
        w,
        "role={} plane={} events={} hits={} ignored_rows={} chunks={} invalid_events={} stopped_by_cap={}",
        role_name(report.role),
        report.plane,
        s.events,
        s.hits,
        s.ignored_rows,
        s.chunks,
        s.invalid_events,
        s.stopped_by_cap
    )
}

fn render_pretty(report: &ConversionReport, w: &mut dyn Write) -> io::Result<()> {
    let s = &report.summary;
    pretty_section(
        w,
        &format!("Converted plane {} into {}", report.plane, report.output.display()),
    )?;
    pretty_kv(w, "role", role_name(report.role))?;
    pretty_kv(w, "mode", report.write_mode.as_str())?;
    pretty_kv(w, "events", s.events.to_string())?;
    pretty_kv(w, "hits", s.hits.to_string())?;
    pretty_kv(w, "empty rows", s.ignored_rows.to_string())?;
    pretty_kv(w, "chunks", s.chunks.to_string())?;
    if s.invalid_events > 0 {
        pretty_kv(w, "invalid events", s.invalid_events.to_string())?;
    }
    if s.stopped_by_cap {
        pretty_kv(w, "stopped", "event limit reached")?;
    }
    pretty_kv(w, "elapsed", format!("{} ms", report.elapsed_ms))
}

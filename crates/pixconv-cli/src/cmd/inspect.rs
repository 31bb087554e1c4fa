use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use pixconv_core::segment::SegmentSummary;
use serde::Serialize;

use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

/// Arguments for `pixconv inspect`.
#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Hit table to segment.
    pub input: PathBuf,

    /// Do not require event numbers to increase.
    #[arg(long)]
    pub allow_unordered: bool,
}

#[derive(Debug, Serialize)]
struct InspectReport {
    input: PathBuf,
    #[serde(flatten)]
    summary: SegmentSummary,
}

/// Segment a hit table without writing anything and report the counts.
///
/// # Errors
///
/// Returns an error if the input is unreadable or would fail conversion.
pub fn run_inspect(args: &InspectArgs, output: OutputMode, quiet: bool) -> Result<()> {
    let summary = pixconv_core::inspect(&args.input, !args.allow_unordered)
        .with_context(|| format!("inspecting {}", args.input.display()))?;
    if quiet && !output.is_json() {
        return Ok(());
    }
    let report = InspectReport {
        input: args.input.clone(),
        summary,
    };
    render_mode(output, &report, render_text, render_pretty)
}

fn render_text(report: &InspectReport, w: &mut dyn Write) -> io::Result<()> {
    let s = &report.summary;
    writeln!(
        w,
        "events={} hits={} rows={} ignored_rows={} chunks={} invalid_events={}",
        s.events, s.hits, s.rows, s.ignored_rows, s.chunks, s.invalid_events
    )
}

fn render_pretty(report: &InspectReport, w: &mut dyn Write) -> io::Result<()> {
    let s = &report.summary;
    pretty_section(w, &report.input.display().to_string())?;
    pretty_kv(w, "events", s.events.to_string())?;
    pretty_kv(w, "hits", s.hits.to_string())?;
    pretty_kv(w, "rows", s.rows.to_string())?;
    pretty_kv(w, "empty rows", s.ignored_rows.to_string())?;
    pretty_kv(w, "chunks", s.chunks.to_string())?;
    pretty_kv(w, "invalid events", s.invalid_events.to_string())
}

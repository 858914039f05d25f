use colored::*;
use indicatif::ProgressStyle;
use tracing::{Span, info_span};
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::terminal::colors;

const TICKS: &[&str] = &[
    "▁▁▁▁▁",
    "▁▂▂▂▁",
    "▁▄▂▄▁",
    "▂▄▆▄▂",
    "▄▆█▆▄",
    "▂▄▆▄▂",
    "▁▄▂▄▁",
    "▁▂▂▂▁",
];

fn style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.blue} {msg} {elapsed:.dim}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(TICKS)
}

/// Shows a spinner until the returned span is dropped. Log lines print above it.
pub fn start(name: &str, message: &str) -> Span {
    let span = info_span!("progress", indicatif.pb_show = true, task = name);
    span.pb_set_style(&style());
    span.pb_set_message(&format!("{}", message.color(colors::TEXT_DEFAULT)));
    span.pb_start();
    span
}

pub fn hint(span: &Span, tip: &str) {
    span.pb_set_message(&format!("{}", tip.italic().white()));
}

//! Caption escaping and `drawtext` filter graph construction.
//!
//! A filter graph is unescaped twice: once when the graph is split into
//! filters and again when each filter's options are split on `:`. Values go
//! through [`escape_text`] for the option level and [`escape_graph`] for the
//! graph level, in that order, and are emitted unquoted. Nothing else in the
//! crate splices raw text into a filter.

use std::path::Path;

use crate::config::CaptionStyle;
use crate::timing::TimedSegment;

/// Fades shorter than this are dropped rather than emitted as a near-zero divisor.
const MIN_FADE: f64 = 0.001;

/// Characters the graph parser treats as structure outside quotes.
const GRAPH_SPECIAL: &[char] = &['\\', '\'', '[', ']', ',', ';'];

/// Escapes text for use as a filter option value.
///
/// Backslash goes first so the escapes added for the other characters are
/// not escaped again. Not idempotent: call it exactly once per value.
pub fn escape_text(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('\'', "\\'")
        .replace(':', "\\:")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

/// Escapes an option value, already passed through [`escape_text`], so it
/// survives the graph-level split intact.
pub fn escape_graph(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 8);
    for c in value.chars() {
        if GRAPH_SPECIAL.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Both escaping levels for a raw value spliced into any filter graph.
pub fn escape_value(raw: &str) -> String {
    escape_graph(&escape_text(raw))
}

/// Builds the comma-separated `drawtext` chain, one directive per segment.
///
/// The fade is clamped to half of each segment so the in and out ramps never
/// overlap. An empty segment list yields the `null` pass-through filter.
pub fn build_filter_graph(
    segments: &[TimedSegment<'_>],
    font_path: &Path,
    style: &CaptionStyle,
    fade_duration: f64,
) -> String {
    if segments.is_empty() {
        return "null".to_string();
    }
    let font = escape_value(&font_path.to_string_lossy().replace('\\', "/"));
    segments
        .iter()
        .map(|seg| drawtext(seg, &font, style, fade_duration))
        .collect::<Vec<_>>()
        .join(",")
}

fn drawtext(seg: &TimedSegment<'_>, font: &str, style: &CaptionStyle, fade_duration: f64) -> String {
    let (start, end) = (seg.start, seg.end);
    let mut directive = format!(
        "drawtext=fontfile={font}:text={text}:expansion=none:\
         fontsize={size}:fontcolor={color}:\
         x=(w-text_w)/2:y=(h-text_h)/2:\
         box=1:boxcolor={box_color}:boxborderw={border}:\
         enable='gte(t,{s})*lt(t,{e})'",
        text = escape_graph(&seg.chunk.sanitized),
        size = style.font_size,
        color = escape_value(&style.font_color),
        box_color = escape_value(&style.box_color),
        border = style.box_border,
        s = secs(start),
        e = secs(end),
    );

    let fade = effective_fade(fade_duration, seg.duration());
    if fade >= MIN_FADE {
        directive.push_str(&format!(
            ":alpha='if(lt(t,{fade_in_end}),(t-{s})/{f},if(gt(t,{fade_out_start}),({e}-t)/{f},1))'",
            fade_in_end = secs(start + fade),
            fade_out_start = secs(end - fade),
            s = secs(start),
            e = secs(end),
            f = secs(fade),
        ));
    }
    directive
}

pub fn effective_fade(requested: f64, segment_duration: f64) -> f64 {
    requested.max(0.0).min(segment_duration / 2.0)
}

fn secs(v: f64) -> String {
    format!("{v:.6}")
}

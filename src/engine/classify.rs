//! Maps raw ffmpeg diagnostics onto short, stable, user-facing messages.

use regex::{Captures, Regex};
use serde::Serialize;
use std::sync::OnceLock;

/// Upper bound for messages that fall through every rule
pub const MAX_FALLBACK_CHARS: usize = 300;

const EMPTY_DIAGNOSTIC: &str = "FFmpeg exited with an error but produced no diagnostic output";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    FilterOption,
    NoiseReduction,
    InvalidEncoderOrFormat,
    MissingInput,
    PermissionDenied,
    MissingEncoder,
    OutputOpen,
    InvalidOption,
    QualityOutOfRange,
    NonMonotonicTimestamps,
    ContainerMismatch,
    OutOfMemory,
    /// First line carrying an error keyword
    Generic,
    /// Truncated raw text
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub message: String,
}

struct Rule {
    kind: ErrorKind,
    pattern: Regex,
    render: fn(&Captures) -> String,
}

fn cap<'a>(caps: &'a Captures, idx: usize) -> &'a str {
    caps.get(idx).map(|m| m.as_str().trim()).unwrap_or("?")
}

// Patterns are literals; a failure here is caught by the unit tests
fn rule(kind: ErrorKind, pattern: &str, render: fn(&Captures) -> String) -> Option<Rule> {
    Regex::new(pattern).ok().map(|pattern| Rule {
        kind,
        pattern,
        render,
    })
}

fn rules() -> &'static [Rule] {
    static RULES: OnceLock<Vec<Rule>> = OnceLock::new();
    RULES.get_or_init(|| {
        [
            rule(
                ErrorKind::FilterOption,
                r"Error (?:applying|setting) option '?([^' ]+)'? to filter '?([^' ]+)'?",
                |c| {
                    format!(
                        "Filter '{}' rejected option '{}'. Check the filter settings.",
                        cap(c, 2),
                        cap(c, 1)
                    )
                },
            ),
            rule(
                ErrorKind::FilterOption,
                r"Error (?:initializing|reinitializing|configuring) (?:the )?filter '?([^'\s]+)'?",
                |c| {
                    format!(
                        "Filter '{}' could not be initialized with these settings.",
                        cap(c, 1)
                    )
                },
            ),
            rule(
                ErrorKind::NoiseReduction,
                r"(?i)afftdn.*(?:out of range|too large|invalid)",
                |_| {
                    "Noise reduction level is out of range. Lower the noise reduction setting."
                        .to_string()
                },
            ),
            rule(
                ErrorKind::InvalidEncoderOrFormat,
                r"Unknown encoder '([^']+)'",
                |c| {
                    format!(
                        "Encoder '{}' is not available in this FFmpeg build.",
                        cap(c, 1)
                    )
                },
            ),
            rule(
                ErrorKind::InvalidEncoderOrFormat,
                r"(?:Unable to find a suitable output format for '([^']+)'|Requested output format '([^']+)' is not)",
                |c| {
                    let target = c.get(1).or_else(|| c.get(2)).map(|m| m.as_str()).unwrap_or("?");
                    format!("Output format for '{}' is not supported.", target)
                },
            ),
            // The runner's own spawn error, before any ffmpeg output exists
            rule(
                ErrorKind::MissingEncoder,
                r"Failed to spawn ([^\r\n]+?): No such file or directory",
                |c| {
                    format!(
                        "FFmpeg executable not found at '{}'. Install FFmpeg or set [paths] ffmpeg in the config.",
                        cap(c, 1)
                    )
                },
            ),
            rule(
                ErrorKind::PermissionDenied,
                r"(?m)^(?:\[[^\]\r\n]*\]\s*)?(?:Failed to spawn\s+|Error opening (?:input|output)(?: file)?\s+)?([^\r\n]+?): Permission denied",
                |c| format!("Permission denied: {}", cap(c, 1)),
            ),
            rule(
                ErrorKind::OutputOpen,
                r"(?:Could not open file|Error opening output(?: files?)?|Could not write header for output file)\s*'?([^'\r\n:]*)",
                |c| {
                    let target = cap(c, 1);
                    if target.is_empty() || target == "?" {
                        "Could not open the output file for writing.".to_string()
                    } else {
                        format!(
                            "Could not open output file '{}' for writing. Check that the directory exists.",
                            target
                        )
                    }
                },
            ),
            // ffmpeg 6.1+ logs the reason and the path on separate lines
            rule(
                ErrorKind::MissingInput,
                r"Error opening input: No such file or directory[\s\S]*?Error opening input file ([^\r\n]+?)\.?(?:\r?\n|$)",
                |c| format!("Input file not found: {}", cap(c, 1)),
            ),
            rule(
                ErrorKind::MissingInput,
                r"Error opening input(?: files?)?: No such file or directory",
                |_| "Input file not found.".to_string(),
            ),
            // Older releases print `<path>: No such file or directory`
            rule(
                ErrorKind::MissingInput,
                r"(?m)^([^\[\r\n][^\r\n]*?): No such file or directory",
                |c| format!("Input file not found: {}", cap(c, 1)),
            ),
            rule(
                ErrorKind::MissingEncoder,
                r"(?i)Encoder(?: \(codec ([\w-]+)\))? not found",
                |c| match c.get(1) {
                    Some(codec) => format!("No encoder found for codec '{}'.", codec.as_str()),
                    None => "No suitable encoder found for the output stream.".to_string(),
                },
            ),
            rule(
                ErrorKind::InvalidOption,
                r"(?:Unrecognized option '([^']+)'|Option ([\w:-]+) not found)",
                |c| {
                    let option = c.get(1).or_else(|| c.get(2)).map(|m| m.as_str()).unwrap_or("?");
                    format!("FFmpeg does not recognize option '{}'.", option)
                },
            ),
            rule(
                ErrorKind::QualityOutOfRange,
                r"Value ([\d.eE+-]+) for parameter '(crf|cq|qp|global_quality|qmin|qmax)' out of range(?: \[([^\]]+)\])?",
                |c| match c.get(3) {
                    Some(range) => format!(
                        "Quality value {} for '{}' is out of range (allowed {}).",
                        cap(c, 1),
                        cap(c, 2),
                        range.as_str()
                    ),
                    None => format!(
                        "Quality value {} for '{}' is out of range.",
                        cap(c, 1),
                        cap(c, 2)
                    ),
                },
            ),
            rule(
                ErrorKind::NonMonotonicTimestamps,
                r"(?i)non[- ]monoton(?:ous|ically increasing) dts",
                |_| {
                    "Source has non-monotonic timestamps. Try re-encoding instead of copying."
                        .to_string()
                },
            ),
            rule(
                ErrorKind::ContainerMismatch,
                r"Could not find tag for codec (\S+) in stream #(\d+)",
                |c| {
                    format!(
                        "Codec '{}' (stream #{}) is not supported by the output container.",
                        cap(c, 1),
                        cap(c, 2)
                    )
                },
            ),
            rule(
                ErrorKind::OutOfMemory,
                r"(?i)(?:Cannot allocate memory|out of memory|ENOMEM)",
                |_| {
                    "Out of memory while encoding. Close other applications or lower the resolution."
                        .to_string()
                },
            ),
        ]
        .into_iter()
        .flatten()
        .collect()
    })
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

fn first_error_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).find(|line| {
        let lower = line.to_ascii_lowercase();
        ["error", "invalid", "failed", "cannot"]
            .iter()
            .any(|kw| lower.contains(kw))
    })
}

/// Classify raw diagnostic text. Never panics and never returns an empty message.
pub fn classify(raw: &str) -> ClassifiedError {
    for rule in rules() {
        if let Some(caps) = rule.pattern.captures(raw) {
            return ClassifiedError {
                kind: rule.kind,
                message: (rule.render)(&caps),
            };
        }
    }

    if let Some(line) = first_error_line(raw) {
        return ClassifiedError {
            kind: ErrorKind::Generic,
            message: truncate_chars(line, MAX_FALLBACK_CHARS),
        };
    }

    let trimmed = raw.trim();
    let message = if trimmed.is_empty() {
        EMPTY_DIAGNOSTIC.to_string()
    } else {
        truncate_chars(trimmed, MAX_FALLBACK_CHARS)
    };
    ClassifiedError {
        kind: ErrorKind::Unknown,
        message,
    }
}

pub fn classify_message(raw: &str) -> String {
    classify(raw).message
}

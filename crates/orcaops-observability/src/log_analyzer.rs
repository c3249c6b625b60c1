//! Deterministic regex-based error/warning/stack-trace extraction and
//! summary synthesis (§4.7). Invoked by the Job Runner once step execution
//! has finished; it never changes a job's status, only enriches the record.

use orcaops_base::{JobStatus, LogAnalysis, StepResult};
use regex::Regex;
use std::sync::OnceLock;

const MAX_ERROR_LINES: usize = 20;
const MAX_STACK_TRACES: usize = 5;
const ERROR_LINE_TRUNCATE: usize = 200;

fn error_patterns() -> &'static [Regex] {
    static RE: OnceLock<Vec<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        vec![
            Regex::new(r"(?i)\b(error|exception|fatal)\b[:\s]").unwrap(),
            Regex::new(r"(?i)\btraceback\b").unwrap(),
            Regex::new(r"(?i)\bfailed\b[:\s]").unwrap(),
            Regex::new(r"exit code [1-9]\d*").unwrap(),
            Regex::new(r"(?i)\bpanic\b[:\s]").unwrap(),
        ]
    })
}

fn warning_patterns() -> &'static [Regex] {
    static RE: OnceLock<Vec<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        vec![
            Regex::new(r"(?i)\b(warning|warn)\b[:\s]").unwrap(),
            Regex::new(r"(?i)\bdeprecated\b").unwrap(),
        ]
    })
}

fn stack_start_patterns() -> &'static [Regex] {
    static RE: OnceLock<Vec<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        vec![
            Regex::new(r"^Traceback \(most recent call last\):").unwrap(),
            Regex::new(r"^\s{4}at \S").unwrap(),
            Regex::new(r"^goroutine \d+ \[").unwrap(),
            Regex::new(r"^\tat .+\(.+\.java:\d+\)").unwrap(),
        ]
    })
}

/// Byte-length-safe truncation: walks back from `max` to the nearest char
/// boundary so a line with a multi-byte character straddling the cutoff
/// doesn't panic.
fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

fn is_error_line(line: &str) -> bool {
    error_patterns().iter().any(|re| re.is_match(line))
}

fn is_warning_line(line: &str) -> bool {
    warning_patterns().iter().any(|re| re.is_match(line))
}

fn is_stack_start(line: &str) -> bool {
    stack_start_patterns().iter().any(|re| re.is_match(line))
}

fn is_continuation(line: &str) -> bool {
    line.starts_with("  ") || line.starts_with('\t') || line.starts_with("Caused by") || line.starts_with("...")
}

fn all_lines(steps: &[StepResult]) -> Vec<String> {
    let mut lines = Vec::new();
    for step in steps {
        lines.extend(step.stdout.lines().map(str::to_string));
        lines.extend(step.stderr.lines().map(str::to_string));
    }
    lines
}

fn extract_error_lines(lines: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    for line in lines {
        if out.len() >= MAX_ERROR_LINES {
            break;
        }
        if is_error_line(line) {
            out.push(truncate(line, ERROR_LINE_TRUNCATE));
        }
    }
    out
}

fn count_warnings(lines: &[String]) -> u32 {
    lines
        .iter()
        .filter(|line| is_warning_line(line) && !is_error_line(line))
        .count() as u32
}

fn extract_stack_traces(lines: &[String]) -> Vec<String> {
    let mut traces = Vec::new();
    let mut i = 0;
    while i < lines.len() && traces.len() < MAX_STACK_TRACES {
        if is_stack_start(&lines[i]) {
            let mut block = vec![lines[i].clone()];
            let mut j = i + 1;
            while j < lines.len() && is_continuation(&lines[j]) {
                block.push(lines[j].clone());
                j += 1;
            }
            if j < lines.len() && lines[j].contains(':') {
                block.push(lines[j].clone());
                j += 1;
            }
            traces.push(block.join("\n"));
            i = j;
        } else {
            i += 1;
        }
    }
    traces
}

fn build_summary(status: JobStatus, steps: &[StepResult], error_lines: &[String]) -> String {
    match status {
        JobStatus::Success => {
            let total: f64 = steps.iter().map(|s| s.duration_seconds).sum();
            format!("{} step(s) passed in {total:.1}s", steps.len())
        }
        JobStatus::Failed => match error_lines.first() {
            Some(first) => format!("Failed: {}", truncate(first, 80)),
            None => match steps.iter().find(|s| s.exit_code != 0) {
                Some(step) => format!("Failed: step exited with code {}", step.exit_code),
                None => "Failed".to_string(),
            },
        },
        JobStatus::TimedOut => {
            let dur = steps.last().map(|s| s.duration_seconds).unwrap_or(0.0);
            format!("Timed out after {dur:.1}s")
        }
        JobStatus::Cancelled => "Cancelled".to_string(),
        JobStatus::Queued | JobStatus::Running => "In progress".to_string(),
    }
}

fn build_suggestions(status: JobStatus, error_lines: &[String], stack_traces: &[String], warning_count: u32) -> Vec<String> {
    let mut suggestions = Vec::new();
    if !stack_traces.is_empty() {
        suggestions.push("Review the stack trace for the failing frame.".to_string());
    }
    if status == JobStatus::Failed && error_lines.is_empty() {
        suggestions.push("No error pattern matched stderr; check stderr manually.".to_string());
    }
    if warning_count > 10 {
        suggestions.push(format!("{warning_count} warnings were emitted; consider addressing them."));
    }
    suggestions
}

pub struct LogAnalyzer;

impl LogAnalyzer {
    pub fn analyze(status: JobStatus, steps: &[StepResult]) -> LogAnalysis {
        let lines = all_lines(steps);
        let error_lines = extract_error_lines(&lines);
        let warning_count = count_warnings(&lines);
        let stack_traces = extract_stack_traces(&lines);
        let summary = build_summary(status, steps, &error_lines);
        let suggestions = build_suggestions(status, &error_lines, &stack_traces, warning_count);
        LogAnalysis {
            error_lines,
            warning_count,
            stack_traces,
            summary,
            suggestions,
        }
    }
}

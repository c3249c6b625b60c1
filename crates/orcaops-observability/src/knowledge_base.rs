//! Static + user-editable pattern library mapping a failure's text to a
//! likely root cause and fix (§4.10).

use crate::run_store::{RunFilter, RunStore};
use orcaops_base::{DebugAnalysis, MatchedCause, RunRecord};
use orcaops_util::Config;
use regex::Regex;
use serde::Deserialize;

const MAX_SIBLING_FAILURES: usize = 5;

struct FailurePattern {
    regex: Regex,
    category: &'static str,
    title: &'static str,
    solutions: Vec<String>,
}

fn builtin_patterns() -> Vec<FailurePattern> {
    vec![
        FailurePattern {
            regex: Regex::new(r"(?i)(modulenotfounderror|cannot find module|no module named)").unwrap(),
            category: "module-not-found",
            title: "A required module could not be found",
            solutions: vec![
                "Verify the dependency is declared and installed in the image.".into(),
                "Check for a typo in the import/require path.".into(),
            ],
        },
        FailurePattern {
            regex: Regex::new(r"(?i)(npm err!|command not found: npm|enoent.*package\.json)").unwrap(),
            category: "npm-missing",
            title: "npm could not resolve a dependency",
            solutions: vec![
                "Run npm install before the build step.".into(),
                "Confirm package.json/package-lock.json are present in the working directory.".into(),
            ],
        },
        FailurePattern {
            regex: Regex::new(r"(?i)(out of memory|oom|killed process|cannot allocate memory)").unwrap(),
            category: "oom",
            title: "The sandbox ran out of memory",
            solutions: vec![
                "Raise sandbox.resources.memory_bytes.".into(),
                "Reduce the workload's peak memory footprint.".into(),
            ],
        },
        FailurePattern {
            regex: Regex::new(r"(?i)connection refused").unwrap(),
            category: "connection-refused",
            title: "A network connection was refused",
            solutions: vec![
                "Confirm the target service is started and healthy before this step runs.".into(),
                "Check the service's network alias and port.".into(),
            ],
        },
        FailurePattern {
            regex: Regex::new(r"(?i)permission denied").unwrap(),
            category: "permission-denied",
            title: "A filesystem or process permission was denied",
            solutions: vec![
                "Check file ownership and the user the sandbox runs as.".into(),
                "Verify the path is writable inside the container.".into(),
            ],
        },
        FailurePattern {
            regex: Regex::new(r"(?i)(syntaxerror|unexpected token|parse error)").unwrap(),
            category: "syntax",
            title: "A syntax error was encountered",
            solutions: vec!["Review the reported file and line for a syntax mistake.".into()],
        },
        FailurePattern {
            regex: Regex::new(r"(?i)(timed out|timeout exceeded|deadline exceeded)").unwrap(),
            category: "timeout",
            title: "A step exceeded its timeout",
            solutions: vec![
                "Raise the step's timeout_seconds if the work is expected to take longer.".into(),
                "Investigate whether the command is hanging rather than progressing.".into(),
            ],
        },
    ]
}

#[derive(Deserialize)]
struct UserPatternDef {
    pattern: String,
    category: String,
    title: String,
    solutions: Vec<String>,
}

pub struct KnowledgeBase {
    builtins: Vec<FailurePattern>,
    user_patterns: Vec<(Regex, String, String, Vec<String>)>,
}

impl KnowledgeBase {
    pub fn load(config: &Config) -> Self {
        let user_patterns = orcaops_util::Fs::new()
            .read_to_string(config.failure_patterns_path())
            .ok()
            .and_then(|contents| serde_json::from_str::<Vec<UserPatternDef>>(&contents).ok())
            .unwrap_or_default()
            .into_iter()
            .filter_map(|def| {
                Regex::new(&def.pattern)
                    .ok()
                    .map(|re| (re, def.category, def.title, def.solutions))
            })
            .collect();

        Self { builtins: builtin_patterns(), user_patterns }
    }

    fn matches(&self, text: &str) -> Vec<MatchedCause> {
        let mut causes = Vec::new();
        for pattern in &self.builtins {
            if pattern.regex.is_match(text) {
                causes.push(MatchedCause {
                    category: pattern.category.to_string(),
                    title: pattern.title.to_string(),
                    solutions: pattern.solutions.clone(),
                });
            }
        }
        for (regex, category, title, solutions) in &self.user_patterns {
            if regex.is_match(text) {
                causes.push(MatchedCause {
                    category: category.clone(),
                    title: title.clone(),
                    solutions: solutions.clone(),
                });
            }
        }
        causes
    }

    /// Scans `record.error` plus stderr/stdout of failed steps; optionally
    /// looks up up to 5 sibling failed runs for the same image via the Run
    /// Store (§4.10).
    pub fn analyze_failure(&self, record: &RunRecord, run_store: Option<&RunStore<'_>>) -> DebugAnalysis {
        let mut text = record.error.clone().unwrap_or_default();
        for step in record.steps.iter().filter(|s| s.exit_code != 0) {
            text.push('\n');
            text.push_str(&step.stderr);
            text.push('\n');
            text.push_str(&step.stdout);
        }

        let mut causes = self.matches(&text);
        causes.dedup_by(|a, b| a.category == b.category);

        let sibling_failures = match (run_store, &record.image_ref) {
            (Some(store), Some(image)) => store
                .query(
                    &RunFilter { status: Some("failed".into()), image_contains: Some(image.clone()), ..Default::default() },
                    0,
                    MAX_SIBLING_FAILURES + 1,
                )
                .records
                .into_iter()
                .map(|r| r.job_id)
                .filter(|id| id != &record.job_id)
                .take(MAX_SIBLING_FAILURES)
                .collect(),
            _ => Vec::new(),
        };

        DebugAnalysis { job_id: record.job_id.clone(), causes, sibling_failures }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orcaops_base::{CleanupStatus, JobStatus, StepResult};
    use chrono::Utc;

    fn failed_record(stderr: &str) -> RunRecord {
        let now = Utc::now();
        let mut r = RunRecord::new("j1", "fp", now);
        r.status = JobStatus::Failed;
        r.started_at = Some(now);
        r.finished_at = Some(now);
        r.cleanup_status = CleanupStatus::Destroyed;
        r.steps = vec![StepResult {
            command: "run".into(),
            exit_code: 1,
            stdout: String::new(),
            stderr: stderr.into(),
            duration_seconds: 0.1,
            timestamp: now,
        }];
        r
    }

    #[test]
    fn matches_module_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_root(dir.path());
        let kb = KnowledgeBase::load(&config);
        let analysis = kb.analyze_failure(&failed_record("ModuleNotFoundError: no module named 'foo'"), None);
        assert!(analysis.causes.iter().any(|c| c.category == "module-not-found"));
    }

    #[test]
    fn no_match_yields_empty_causes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_root(dir.path());
        let kb = KnowledgeBase::load(&config);
        let analysis = kb.analyze_failure(&failed_record("all good actually"), None);
        assert!(analysis.causes.is_empty());
    }

    #[test]
    fn user_patterns_are_merged_in() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_root(dir.path());
        std::fs::write(
            config.failure_patterns_path(),
            r#"[{"pattern": "flaky-widget-error", "category": "flaky-widget", "title": "Flaky widget", "solutions": ["retry"]}]"#,
        )
        .unwrap();
        let kb = KnowledgeBase::load(&config);
        let analysis = kb.analyze_failure(&failed_record("flaky-widget-error: boom"), None);
        assert!(analysis.causes.iter().any(|c| c.category == "flaky-widget"));
    }
}

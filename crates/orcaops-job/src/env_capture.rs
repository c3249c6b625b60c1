//! Captures image/runtime metadata and a redacted environment snapshot from
//! a finished sandbox (§4.2 step 5).

use orcaops_base::EnvironmentCapture;
use orcaops_runtime::ContainerInspect;

/// Env var names containing any of these (case-insensitive) are redacted
/// rather than persisted verbatim. The exact `sensitive_patterns` stem list
/// from `original_source/orcaops/job_runner.py` — not widened, so a value
/// like `API_KEY_LABEL` still redacts on `KEY` but an unrelated name like
/// `MONKEY` does not trip `KEY` as a substring of a real secret name by
/// accident any more than the original did.
const REDACTED_KEYWORDS: &[&str] = &["PASSWORD", "SECRET", "TOKEN", "KEY"];
const REDACTED_PLACEHOLDER: &str = "***REDACTED***";

fn is_sensitive(name: &str) -> bool {
    let upper = name.to_ascii_uppercase();
    REDACTED_KEYWORDS.iter().any(|kw| upper.contains(kw))
}

pub fn capture_environment(inspect: &ContainerInspect) -> EnvironmentCapture {
    let env = inspect
        .env_list
        .iter()
        .filter_map(|entry| entry.split_once('='))
        .map(|(k, v)| {
            let value = if is_sensitive(k) { REDACTED_PLACEHOLDER.to_string() } else { v.to_string() };
            (k.to_string(), value)
        })
        .collect();

    EnvironmentCapture {
        image_digest: inspect.image_digest.clone(),
        resource_limits: inspect.resource_limits.clone(),
        // No Runtime Adapter call surfaces the engine's own version; left
        // unset until a production backend supplies it via `Inspect`.
        runtime_version: None,
        env,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inspect_with(env: &[&str]) -> ContainerInspect {
        ContainerInspect {
            image_digest: Some("sha256:deadbeef".into()),
            env_list: env.iter().map(|s| s.to_string()).collect(),
            resource_limits: Default::default(),
            state: Default::default(),
        }
    }

    #[test]
    fn redacts_sensitive_keys() {
        let captured = capture_environment(&inspect_with(&["API_KEY=abc123", "HOME=/root"]));
        assert_eq!(captured.env.get("API_KEY").unwrap(), REDACTED_PLACEHOLDER);
        assert_eq!(captured.env.get("HOME").unwrap(), "/root");
    }

    #[test]
    fn carries_image_digest_through() {
        let captured = capture_environment(&inspect_with(&[]));
        assert_eq!(captured.image_digest.as_deref(), Some("sha256:deadbeef"));
    }
}

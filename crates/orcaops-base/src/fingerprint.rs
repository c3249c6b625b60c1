//! Deterministic identity for "the same work": `SHA256(canonical_json(image,
//! commands, env, artifacts))`. Two specs that would run the same commands
//! against the same image with the same environment and artifact list get the
//! same fingerprint regardless of `job_id`, context, or field ordering.

use crate::job_spec::JobSpec;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Canonicalizes a JSON value by recursively sorting object keys. Arrays keep
/// their order since command order is significant.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> = map
                .iter()
                .map(|(k, v)| (k.clone(), canonicalize(v)))
                .collect();
            let mut out = serde_json::Map::new();
            for (k, v) in sorted {
                out.insert(k, v);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

pub fn canonical_json_for_fingerprint(
    image: &str,
    commands: &[String],
    env: &BTreeMap<String, String>,
    artifacts: &[String],
) -> String {
    let value = json!({
        "image": image,
        "commands": commands,
        "env": env,
        "artifacts": artifacts,
    });
    serde_json::to_string(&canonicalize(&value)).expect("canonical json never fails")
}

/// Computes the fingerprint for a [`JobSpec`]: `commands` contributes only
/// the literal command strings (not `cwd`/`timeout_seconds`), matching the
/// "same work" notion in the glossary.
pub fn fingerprint(spec: &JobSpec) -> String {
    let commands: Vec<String> = spec.commands.iter().map(|c| c.command.clone()).collect();
    let env: BTreeMap<String, String> = spec.sandbox.env.clone().into_iter().collect();
    let canonical = canonical_json_for_fingerprint(&spec.sandbox.image, &commands, &env, &spec.artifacts);
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

/// The fingerprint key used by the Baseline Tracker / Anomaly Detector:
/// `image_ref ‖ "::" ‖ join(command, "|")`. Distinct from [`fingerprint`],
/// which also folds in env and artifacts — the baseline key intentionally
/// ignores those so that, e.g., a different `API_KEY` value doesn't fragment
/// the performance history for "the same command against the same image".
pub fn baseline_key(image: &str, commands: &[String]) -> String {
    format!("{image}::{}", commands.join("|"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job_spec::{CommandSpec, JobContext, SandboxSpec};

    fn spec_with_env(pairs: &[(&str, &str)]) -> JobSpec {
        JobSpec {
            job_id: "j1".into(),
            sandbox: SandboxSpec {
                image: "alpine:3".into(),
                env: pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
                ..Default::default()
            },
            commands: vec![CommandSpec::new("echo hello")],
            artifacts: vec!["/tmp/out.txt".into()],
            ttl_seconds: 60,
            context: JobContext::default(),
        }
    }

    #[test]
    fn deterministic_regardless_of_env_insertion_order() {
        let a = spec_with_env(&[("A", "1"), ("B", "2")]);
        let b = spec_with_env(&[("B", "2"), ("A", "1")]);
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn different_job_id_does_not_change_fingerprint() {
        let mut a = spec_with_env(&[("A", "1")]);
        let mut b = a.clone();
        a.job_id = "j1".into();
        b.job_id = "j2".into();
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn different_commands_change_fingerprint() {
        let a = spec_with_env(&[]);
        let mut b = a.clone();
        b.commands = vec![CommandSpec::new("echo bye")];
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn baseline_key_ignores_env() {
        let commands = vec!["pytest".to_string()];
        assert_eq!(baseline_key("python:3.11", &commands), "python:3.11::pytest");
    }
}

//! YAML parsing, shorthand expansion, and matrix expansion (§4.4).

use crate::dag::validate_acyclic;
use orcaops_base::{MatrixSpec, OrcaError, ServiceDefinition, WorkflowSpec};
use serde_yaml::Value;
use std::collections::HashMap;

/// Parses raw YAML and applies the pre-validation shorthands before handing
/// back a strict `WorkflowSpec`:
///
/// - `services: ["postgres:15"]` expands to `{postgres: {image: "postgres:15"}}`.
/// - `matrix: {python: [...], exclude: [...], include: [...]}` normalizes to
///   `matrix.parameters + exclude/include`.
pub fn parse(yaml: &str) -> Result<WorkflowSpec, OrcaError> {
    let mut doc: Value = serde_yaml::from_str(yaml)
        .map_err(|e| OrcaError::validation(format!("invalid workflow yaml: {e}")))?;

    if let Some(jobs) = doc.get_mut("jobs").and_then(Value::as_mapping_mut) {
        for (_, job) in jobs.iter_mut() {
            expand_services_shorthand(job);
            expand_matrix_shorthand(job);
        }
    }

    let spec: WorkflowSpec = serde_yaml::from_value(doc)
        .map_err(|e| OrcaError::validation(format!("invalid workflow schema: {e}")))?;
    validate(&spec)?;
    Ok(spec)
}

fn expand_services_shorthand(job: &mut Value) {
    let Some(mapping) = job.as_mapping_mut() else { return };
    let key = Value::String("services".to_string());
    let Some(services) = mapping.get(&key) else { return };
    let Some(list) = services.as_sequence() else { return };

    let mut expanded = serde_yaml::Mapping::new();
    for entry in list {
        if let Some(image) = entry.as_str() {
            let name = image.split(':').next().unwrap_or(image).to_string();
            let mut def = serde_yaml::Mapping::new();
            def.insert(Value::String("image".to_string()), Value::String(image.to_string()));
            expanded.insert(Value::String(name), Value::Mapping(def));
        }
    }
    mapping.insert(key, Value::Mapping(expanded));
}

fn expand_matrix_shorthand(job: &mut Value) {
    let Some(mapping) = job.as_mapping_mut() else { return };
    let key = Value::String("matrix".to_string());
    let Some(matrix) = mapping.get(&key).cloned() else { return };
    let Some(matrix_map) = matrix.as_mapping() else { return };

    let exclude_key = Value::String("exclude".to_string());
    let include_key = Value::String("include".to_string());

    let mut parameters = serde_yaml::Mapping::new();
    for (k, v) in matrix_map {
        if *k != exclude_key && *k != include_key {
            parameters.insert(k.clone(), v.clone());
        }
    }

    let mut normalized = serde_yaml::Mapping::new();
    normalized.insert(Value::String("parameters".to_string()), Value::Mapping(parameters));
    if let Some(exclude) = matrix_map.get(&exclude_key) {
        normalized.insert(exclude_key, exclude.clone());
    }
    if let Some(include) = matrix_map.get(&include_key) {
        normalized.insert(include_key, include.clone());
    }
    mapping.insert(key, Value::Mapping(normalized));
}

/// `requires` existence plus cycle detection (§4.4). Condition-grammar
/// validity is checked lazily by `crate::condition::parse` when a job's
/// `should_run` is actually evaluated, since a malformed condition is itself
/// a validation error the caller surfaces the same way.
pub fn validate(spec: &WorkflowSpec) -> Result<(), OrcaError> {
    spec.validate_requires()?;
    validate_acyclic(spec)?;
    for job in spec.jobs.values() {
        if let Some(condition) = &job.if_condition {
            crate::condition::parse(condition)
                .map_err(|e| OrcaError::validation(format!("invalid condition {condition:?}: {e}")))?;
        }
    }
    Ok(())
}

/// One fully-expanded matrix combination: its variable assignments plus the
/// `k1=v1,k2=v2` suffix (sorted by key, §4.4) used to build a distinct
/// `job_id`.
#[derive(Clone, Debug, PartialEq)]
pub struct MatrixCombination {
    pub vars: HashMap<String, String>,
    pub suffix: String,
}

/// Cartesian product of `parameters`, minus any combination equal to an
/// `exclude` row on all its keys, plus any `include` row not already present.
pub fn expand_matrix(matrix: &MatrixSpec) -> Vec<MatrixCombination> {
    if matrix.parameters.is_empty() {
        return Vec::new();
    }

    let mut keys: Vec<&String> = matrix.parameters.keys().collect();
    keys.sort();

    let mut combos: Vec<HashMap<String, String>> = vec![HashMap::new()];
    for key in &keys {
        let values = &matrix.parameters[*key];
        let mut next = Vec::with_capacity(combos.len() * values.len());
        for combo in &combos {
            for value in values {
                let mut extended = combo.clone();
                extended.insert((*key).clone(), value.clone());
                next.push(extended);
            }
        }
        combos = next;
    }

    combos.retain(|combo| !matrix.exclude.iter().any(|row| rows_equal(combo, row)));

    for include in &matrix.include {
        if !combos.iter().any(|combo| rows_equal(combo, include)) {
            combos.push(include.clone());
        }
    }

    combos.into_iter().map(|vars| MatrixCombination { suffix: combination_suffix(&vars), vars }).collect()
}

fn rows_equal(combo: &HashMap<String, String>, row: &HashMap<String, String>) -> bool {
    !row.is_empty() && row.iter().all(|(k, v)| combo.get(k) == Some(v))
}

fn combination_suffix(vars: &HashMap<String, String>) -> String {
    let mut keys: Vec<&String> = vars.keys().collect();
    keys.sort();
    keys.into_iter().map(|k| format!("{k}={}", vars[k])).collect::<Vec<_>>().join(",")
}

/// `ServiceDefinition` lookup is trivial enough that no dedicated helper is
/// needed beyond what `WorkflowJob.services` already exposes; kept here only
/// as the landing spot other modules reach for service-shaped data through.
pub fn services_for(job: &orcaops_base::WorkflowJob) -> &HashMap<String, ServiceDefinition> {
    &job.services
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn services_shorthand_expands_to_map() {
        let yaml = r#"
name: wf
jobs:
  test:
    image: "python:3.11"
    commands: []
    services: ["postgres:15"]
"#;
        let spec = parse(yaml).unwrap();
        let job = &spec.jobs["test"];
        assert_eq!(job.services["postgres"].image, "postgres:15");
    }

    #[test]
    fn matrix_shorthand_normalizes_to_parameters() {
        let yaml = r#"
name: wf
jobs:
  test:
    image: "python:${{ matrix.python }}"
    commands: []
    matrix:
      python: ["3.10", "3.11"]
"#;
        let spec = parse(yaml).unwrap();
        let job = &spec.jobs["test"];
        let matrix = job.matrix.as_ref().unwrap();
        assert_eq!(matrix.parameters["python"], vec!["3.10".to_string(), "3.11".to_string()]);
    }

    #[test]
    fn undefined_requires_is_rejected_at_parse_time() {
        let yaml = r#"
name: wf
jobs:
  b:
    image: "alpine:3"
    commands: []
    requires: ["a"]
"#;
        assert!(parse(yaml).is_err());
    }

    #[test]
    fn matrix_excludes_matching_combination() {
        let mut parameters = HashMap::new();
        parameters.insert("python".to_string(), vec!["3.10".to_string(), "3.11".to_string()]);
        parameters.insert("os".to_string(), vec!["linux".to_string(), "mac".to_string()]);
        let mut exclude_row = HashMap::new();
        exclude_row.insert("python".to_string(), "3.10".to_string());
        exclude_row.insert("os".to_string(), "mac".to_string());
        let matrix = MatrixSpec { parameters, exclude: vec![exclude_row], include: vec![] };

        let combos = expand_matrix(&matrix);
        assert_eq!(combos.len(), 3);
        assert!(!combos.iter().any(|c| c.vars["python"] == "3.10" && c.vars["os"] == "mac"));
    }

    #[test]
    fn matrix_include_appends_new_row() {
        let mut parameters = HashMap::new();
        parameters.insert("python".to_string(), vec!["3.10".to_string()]);
        let mut include_row = HashMap::new();
        include_row.insert("python".to_string(), "3.12".to_string());
        let matrix = MatrixSpec { parameters, exclude: vec![], include: vec![include_row] };

        let combos = expand_matrix(&matrix);
        assert_eq!(combos.len(), 2);
        assert!(combos.iter().any(|c| c.vars["python"] == "3.12"));
    }
}

//! Dependency-graph validation and level computation for a `WorkflowSpec`
//! (§4.4): `requires` existence is checked by `WorkflowSpec::validate_requires`
//! itself; cycle detection and `GetLevels` need graph traversal, so they live
//! here.

use orcaops_base::{OrcaError, WorkflowSpec};
use std::collections::{HashMap, HashSet};

/// Kahn's algorithm: repeatedly peels off the maximal set of ready nodes
/// (every dependency already emitted), sorted lexicographically within each
/// level for determinism (§4.4 "levels are sorted lexicographically").
/// A non-empty remainder after no more nodes can be peeled means a cycle.
pub fn validate_acyclic(spec: &WorkflowSpec) -> Result<(), OrcaError> {
    get_levels(spec).map(|_| ())
}

pub fn get_levels(spec: &WorkflowSpec) -> Result<Vec<Vec<String>>, OrcaError> {
    let mut remaining_requires: HashMap<&str, HashSet<&str>> = spec
        .jobs
        .iter()
        .map(|(name, job)| (name.as_str(), job.requires.iter().map(String::as_str).collect()))
        .collect();

    let mut levels = Vec::new();
    let mut emitted: HashSet<&str> = HashSet::new();

    while !remaining_requires.is_empty() {
        let mut ready: Vec<&str> = remaining_requires
            .iter()
            .filter(|(_, deps)| deps.iter().all(|d| emitted.contains(d)))
            .map(|(name, _)| *name)
            .collect();

        if ready.is_empty() {
            return Err(OrcaError::validation("workflow job graph contains a cycle"));
        }
        ready.sort_unstable();

        for name in &ready {
            remaining_requires.remove(name);
            emitted.insert(name);
        }
        levels.push(ready.into_iter().map(str::to_string).collect());
    }

    Ok(levels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use orcaops_base::WorkflowJob;

    fn spec_with(jobs: &[(&str, &[&str])]) -> WorkflowSpec {
        let mut map = HashMap::new();
        for (name, requires) in jobs {
            map.insert(
                name.to_string(),
                WorkflowJob {
                    requires: requires.iter().map(|s| s.to_string()).collect(),
                    ..Default::default()
                },
            );
        }
        WorkflowSpec { name: "wf".into(), jobs: map, ..Default::default() }
    }

    #[test]
    fn linear_chain_produces_one_job_per_level() {
        let spec = spec_with(&[("a", &[]), ("b", &["a"]), ("c", &["b"])]);
        let levels = get_levels(&spec).unwrap();
        assert_eq!(levels, vec![vec!["a".to_string()], vec!["b".to_string()], vec!["c".to_string()]]);
    }

    #[test]
    fn independent_jobs_share_a_level_sorted_lexicographically() {
        let spec = spec_with(&[("b", &[]), ("a", &[])]);
        let levels = get_levels(&spec).unwrap();
        assert_eq!(levels, vec![vec!["a".to_string(), "b".to_string()]]);
    }

    #[test]
    fn cycle_is_rejected() {
        let spec = spec_with(&[("a", &["b"]), ("b", &["a"])]);
        assert!(get_levels(&spec).is_err());
    }
}

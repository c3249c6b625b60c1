//! Service Manager (§4.6): stands up a workflow's declared sidecar
//! containers on a dedicated network before the workflow's jobs run, and
//! tears them back down afterward.

use orcaops_base::{OrcaError, ServiceDefinition};
use orcaops_runtime::{labels, RunOpts, RuntimeAdapter};
use orcaops_util::duration::parse_duration;
use std::collections::HashMap;
use std::time::Instant;
use tokio::time::sleep;

/// `image → default port` table consulted when injecting `<NAME>_PORT`
/// (§4.6 step 2).
const WELL_KNOWN_PORTS: &[(&str, &str)] = &[
    ("postgres", "5432"),
    ("redis", "6379"),
    ("mysql", "3306"),
    ("mongo", "27017"),
    ("rabbitmq", "5672"),
    ("elasticsearch", "9200"),
    ("memcached", "11211"),
    ("nginx", "80"),
];

fn well_known_port(image: &str) -> Option<&'static str> {
    let base = image.split(':').next().unwrap_or(image);
    WELL_KNOWN_PORTS.iter().find(|(name, _)| *name == base).map(|(_, port)| *port)
}

fn env_var_name(service_name: &str) -> String {
    service_name.to_ascii_uppercase().replace('-', "_")
}

pub struct StartedServices {
    pub network_id: String,
    pub container_ids: HashMap<String, String>,
    pub env_vars: HashMap<String, String>,
}

/// Starts every declared service and waits out its health check, if any. On
/// any failure, whatever was already started is torn down and the error
/// propagates (§4.6 step 4).
pub async fn start_services(
    runtime: &dyn RuntimeAdapter,
    services: &HashMap<String, ServiceDefinition>,
    workflow_id: &str,
) -> Result<StartedServices, OrcaError> {
    let network_name = format!("orcaops-wf-{workflow_id}");
    let mut network_labels = HashMap::new();
    network_labels.insert(labels::WORKFLOW_ID.to_string(), workflow_id.to_string());

    let network_id = runtime
        .create_network(&network_name, network_labels)
        .await
        .map_err(|e| OrcaError::new(orcaops_base::ErrorKind::RuntimeUnavailable, e.to_string()))?;

    let mut container_ids = HashMap::new();
    let mut env_vars = HashMap::new();

    for (name, def) in services {
        match start_one(runtime, &network_name, &network_id, workflow_id, name, def).await {
            Ok((cid, vars)) => {
                container_ids.insert(name.clone(), cid);
                env_vars.extend(vars);
            }
            Err(e) => {
                stop_services(runtime, &container_ids, &network_name).await;
                return Err(e);
            }
        }
    }

    Ok(StartedServices { network_id, container_ids, env_vars })
}

async fn start_one(
    runtime: &dyn RuntimeAdapter,
    network_name: &str,
    network_id: &str,
    workflow_id: &str,
    name: &str,
    def: &ServiceDefinition,
) -> Result<(String, HashMap<String, String>), OrcaError> {
    let container_name = format!("{workflow_id}-{name}");
    let mut container_labels = HashMap::new();
    container_labels.insert(labels::WORKFLOW_ID.to_string(), workflow_id.to_string());
    container_labels.insert(labels::SERVICE.to_string(), name.to_string());

    let opts = RunOpts {
        detach: true,
        command_override: None,
        environment: def.env.clone(),
        labels: container_labels,
        network_name: Some(network_name.to_string()),
        name: Some(container_name.clone()),
        resource_limits: Default::default(),
    };
    let cid = runtime
        .run(&def.image, opts)
        .await
        .map_err(|e| OrcaError::new(orcaops_base::ErrorKind::RuntimeUnavailable, e.to_string()))?;

    let aliases = vec![name.to_string(), container_name.clone()];
    runtime
        .connect_to_network(&cid, network_id, &aliases)
        .await
        .map_err(|e| OrcaError::new(orcaops_base::ErrorKind::RuntimeUnavailable, e.to_string()))?;

    let env_name = env_var_name(name);
    let mut vars = HashMap::new();
    vars.insert(format!("{env_name}_HOST"), name.to_string());
    if let Some(port) = well_known_port(&def.image) {
        vars.insert(format!("{env_name}_PORT"), port.to_string());
    }

    if let Some(health_check) = &def.health_check {
        wait_healthy(runtime, &cid, health_check).await?;
    }

    Ok((cid, vars))
}

async fn wait_healthy(runtime: &dyn RuntimeAdapter, cid: &str, health_check: &orcaops_base::HealthCheck) -> Result<(), OrcaError> {
    let interval = parse_duration(&health_check.interval).map_err(|e| OrcaError::validation(e.to_string()))?;
    let timeout = parse_duration(&health_check.timeout).map_err(|e| OrcaError::validation(e.to_string()))?;
    let deadline = Instant::now() + timeout;

    loop {
        let inspect = runtime
            .inspect_container(cid)
            .await
            .map_err(|e| OrcaError::new(orcaops_base::ErrorKind::RuntimeUnavailable, e.to_string()))?;
        let healthy = match inspect.state.health.as_deref() {
            Some("healthy") => true,
            Some("none") => inspect.state.running,
            _ => false,
        };
        if healthy {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(OrcaError::new(orcaops_base::ErrorKind::Timeout, format!("service {cid} never became healthy")));
        }
        sleep(interval).await;
    }
}

pub async fn stop_services(runtime: &dyn RuntimeAdapter, container_ids: &HashMap<String, String>, network_name: &str) {
    for cid in container_ids.values() {
        let _ = runtime.remove(cid, true).await;
    }
    let _ = runtime.remove_network(network_name).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use orcaops_runtime::LocalRuntime;

    fn service(image: &str) -> ServiceDefinition {
        ServiceDefinition { image: image.to_string(), env: HashMap::new(), health_check: None }
    }

    #[tokio::test]
    async fn starts_and_injects_well_known_port() {
        let runtime = LocalRuntime::new();
        let mut services = HashMap::new();
        services.insert("postgres".to_string(), service("postgres:15"));

        let started = start_services(&runtime, &services, "wf1").await.unwrap();
        assert_eq!(started.container_ids.len(), 1);
        assert_eq!(started.env_vars.get("POSTGRES_HOST").unwrap(), "postgres");
        assert_eq!(started.env_vars.get("POSTGRES_PORT").unwrap(), "5432");
    }

    #[tokio::test]
    async fn unknown_image_without_port_table_entry_omits_port_var() {
        let runtime = LocalRuntime::new();
        let mut services = HashMap::new();
        services.insert("custom".to_string(), service("custom-app:latest"));

        let started = start_services(&runtime, &services, "wf2").await.unwrap();
        assert!(started.env_vars.contains_key("CUSTOM_HOST"));
        assert!(!started.env_vars.contains_key("CUSTOM_PORT"));
    }

    #[tokio::test]
    async fn failure_tears_down_already_started_services() {
        let runtime = LocalRuntime::new();
        let mut services = HashMap::new();
        services.insert("ok".to_string(), service("redis:7"));
        services.insert("bad".to_string(), service("does-not-exist:1"));

        let err = start_services(&runtime, &services, "wf3").await.unwrap_err();
        assert_eq!(err.kind(), orcaops_base::ErrorKind::RuntimeUnavailable);
    }
}

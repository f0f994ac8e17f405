//! In-memory runtime for testing without a container engine.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use secure_exec_core::{
    ContainerConfig, ContainerStatus, Error, ExecOptions, ExecOutput, Result, RuntimeType,
};

use crate::runtime::ContainerRuntime;

/// Recording runtime with scripted behaviour.
///
/// Exec answers come from a queue (default: exit 0, empty output). The mock
/// does not enforce exec timeouts itself.
pub struct MockRuntime {
    runtime_type: RuntimeType,
    containers: Mutex<HashMap<String, ContainerConfig>>,
    created: Mutex<Vec<ContainerConfig>>,
    execs: Mutex<Vec<(String, Vec<String>, ExecOptions)>>,
    stopped: Mutex<Vec<String>>,
    removed: Mutex<Vec<String>>,
    exec_responses: Mutex<VecDeque<ExecOutput>>,
    exec_delay: Mutex<Option<Duration>>,
    create_failure: Mutex<Option<String>>,
    exec_failure: Mutex<Option<String>>,
    remove_failures: Mutex<HashSet<String>>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::with_type(RuntimeType::Docker)
    }

    pub fn with_type(runtime_type: RuntimeType) -> Self {
        Self {
            runtime_type,
            containers: Mutex::new(HashMap::new()),
            created: Mutex::new(Vec::new()),
            execs: Mutex::new(Vec::new()),
            stopped: Mutex::new(Vec::new()),
            removed: Mutex::new(Vec::new()),
            exec_responses: Mutex::new(VecDeque::new()),
            exec_delay: Mutex::new(None),
            create_failure: Mutex::new(None),
            exec_failure: Mutex::new(None),
            remove_failures: Mutex::new(HashSet::new()),
        }
    }

    /// Queue the output of the next exec.
    pub fn push_exec_output(&self, output: ExecOutput) {
        self.exec_responses.lock().unwrap().push_back(output);
    }

    /// Make every exec take `delay`.
    pub fn set_exec_delay(&self, delay: Duration) {
        *self.exec_delay.lock().unwrap() = Some(delay);
    }

    /// Make every create fail with `message`.
    pub fn fail_create(&self, message: impl Into<String>) {
        *self.create_failure.lock().unwrap() = Some(message.into());
    }

    /// Make every exec return an error.
    pub fn fail_exec(&self, message: impl Into<String>) {
        *self.exec_failure.lock().unwrap() = Some(message.into());
    }

    /// Make removing `container_id` fail.
    pub fn fail_remove(&self, container_id: impl Into<String>) {
        self.remove_failures
            .lock()
            .unwrap()
            .insert(container_id.into());
    }

    /// Configs of every create call.
    pub fn created(&self) -> Vec<ContainerConfig> {
        self.created.lock().unwrap().clone()
    }

    /// `(container_id, command, options)` of every exec call.
    pub fn execs(&self) -> Vec<(String, Vec<String>, ExecOptions)> {
        self.execs.lock().unwrap().clone()
    }

    pub fn stopped(&self) -> Vec<String> {
        self.stopped.lock().unwrap().clone()
    }

    pub fn removed(&self) -> Vec<String> {
        self.removed.lock().unwrap().clone()
    }

    /// Containers created and not yet removed.
    pub fn live_containers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.containers.lock().unwrap().keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl Default for MockRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    fn runtime_type(&self) -> RuntimeType {
        self.runtime_type
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn create_container(&self, config: &ContainerConfig) -> Result<ContainerStatus> {
        self.created.lock().unwrap().push(config.clone());
        if let Some(message) = self.create_failure.lock().unwrap().clone() {
            return Err(Error::container_create(message));
        }
        self.containers
            .lock()
            .unwrap()
            .insert(config.container_id.clone(), config.clone());
        Ok(ContainerStatus::running(&config.container_id))
    }

    async fn exec_in_container(
        &self,
        container_id: &str,
        command: &[String],
        options: &ExecOptions,
    ) -> Result<ExecOutput> {
        self.execs.lock().unwrap().push((
            container_id.to_string(),
            command.to_vec(),
            options.clone(),
        ));

        let delay = *self.exec_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(message) = self.exec_failure.lock().unwrap().clone() {
            return Err(Error::process(message));
        }

        let queued = self.exec_responses.lock().unwrap().pop_front();
        Ok(queued.unwrap_or(ExecOutput {
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
            execution_time: Duration::ZERO,
            timed_out: false,
        }))
    }

    async fn stop_container(&self, container_id: &str, _grace: Duration) -> Result<()> {
        self.stopped.lock().unwrap().push(container_id.to_string());
        Ok(())
    }

    async fn remove_container(&self, container_id: &str, _force: bool) -> Result<()> {
        self.removed.lock().unwrap().push(container_id.to_string());
        if self.remove_failures.lock().unwrap().contains(container_id) {
            return Err(Error::container_operation(format!(
                "Failed to remove {}: device or resource busy",
                container_id
            )));
        }
        self.containers.lock().unwrap().remove(container_id);
        Ok(())
    }

    async fn get_container_status(&self, container_id: &str) -> Result<ContainerStatus> {
        if self.containers.lock().unwrap().contains_key(container_id) {
            return Ok(ContainerStatus::running(container_id));
        }
        Ok(ContainerStatus::error(
            container_id,
            format!("Container not found: {}", container_id),
        ))
    }

    async fn get_container_logs(&self, container_id: &str, _tail: Option<usize>) -> Result<String> {
        if self.containers.lock().unwrap().contains_key(container_id) {
            Ok(String::new())
        } else {
            Err(Error::ContainerNotFound(container_id.to_string()))
        }
    }

    async fn list_containers(
        &self,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<ContainerStatus>> {
        let containers = self.containers.lock().unwrap();
        let mut ids: Vec<String> = containers
            .values()
            .filter(|config| {
                labels.iter().all(|(key, value)| match key.as_str() {
                    crate::runtime::LABEL_SESSION => &config.session_id == value,
                    crate::runtime::LABEL_AGENT => &config.agent_id == value,
                    _ => false,
                })
            })
            .map(|config| config.container_id.clone())
            .collect();
        ids.sort();
        Ok(ids.into_iter().map(ContainerStatus::running).collect())
    }
}

use std::time::Duration;

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_ecs::client::Waiters;
use aws_sdk_ecs::operation::describe_tasks::DescribeTasksOutput;
use aws_sdk_ecs::operation::run_task::RunTaskOutput;
use aws_sdk_ecs::types::TaskDefinition;
use aws_sdk_ecs::Client;
use tracing::debug;

use crate::cmd::TaskLaunch;
use crate::error::{Error, Result};
use crate::taskdef::TaskDefinitionFile;

const AWSLOGS_GROUP: &str = "awslogs-group";
const AWSLOGS_STREAM_PREFIX: &str = "awslogs-stream-prefix";

/// What RunTask reports about the task it started
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedTask {
    pub task_arn: String,
    pub container_name: String,
}

/// The awslogs options of one container definition
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogSettings {
    pub group: Option<String>,
    pub stream_prefix: Option<String>,
}

/// How a stopped task ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitResult {
    pub exit_code: i32,
    pub stopped_reason: String,
}

/// The orchestration calls the run workflow needs
#[async_trait]
pub trait Orchestrator: Send + Sync {
    /// Register a task definition document, returning the new revision's ARN
    async fn register_task_definition(&self, definition: TaskDefinitionFile) -> Result<String>;

    async fn run_task(&self, launch: &TaskLaunch) -> Result<StartedTask>;

    /// Read the log options of `container_name` from a registered task definition
    async fn log_settings(&self, task_definition: &str, container_name: &str)
        -> Result<LogSettings>;

    /// Block until the task reaches STOPPED or `max_wait` runs out
    async fn wait_until_stopped(
        &self,
        cluster: &str,
        task_arn: &str,
        max_wait: Duration,
    ) -> Result<()>;

    async fn exit_result(&self, cluster: &str, task_arn: &str) -> Result<ExitResult>;
}

/// Orchestrator backed by the ECS API
#[derive(Debug, Clone)]
pub struct EcsCluster {
    client: Client,
}

impl EcsCluster {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }
}

#[async_trait]
impl Orchestrator for EcsCluster {
    async fn register_task_definition(&self, definition: TaskDefinitionFile) -> Result<String> {
        let output = definition
            .apply(self.client.register_task_definition())?
            .send()
            .await
            .map_err(|e| Error::api("RegisterTaskDefinition", e))?;

        output
            .task_definition()
            .and_then(|def| def.task_definition_arn())
            .map(String::from)
            .ok_or(Error::MissingField("task definition ARN"))
    }

    async fn run_task(&self, launch: &TaskLaunch) -> Result<StartedTask> {
        let output = launch
            .apply(self.client.run_task())?
            .send()
            .await
            .map_err(|e| Error::api("RunTask", e))?;

        started_task(&output)
    }

    async fn log_settings(
        &self,
        task_definition: &str,
        container_name: &str,
    ) -> Result<LogSettings> {
        let output = self
            .client
            .describe_task_definition()
            .task_definition(task_definition)
            .send()
            .await
            .map_err(|e| Error::api("DescribeTaskDefinition", e))?;

        let definition = output
            .task_definition()
            .ok_or(Error::MissingField("task definition"))?;

        log_settings(definition, container_name)
    }

    async fn wait_until_stopped(
        &self,
        cluster: &str,
        task_arn: &str,
        max_wait: Duration,
    ) -> Result<()> {
        self.client
            .wait_until_tasks_stopped()
            .cluster(cluster)
            .tasks(task_arn)
            .wait(max_wait)
            .await
            .map_err(|e| Error::api("WaitUntilTasksStopped", e))?;
        Ok(())
    }

    async fn exit_result(&self, cluster: &str, task_arn: &str) -> Result<ExitResult> {
        let output = self
            .client
            .describe_tasks()
            .cluster(cluster)
            .tasks(task_arn)
            .send()
            .await
            .map_err(|e| Error::api("DescribeTasks", e))?;

        exit_result(&output)
    }
}

/// Pick the single launched task out of a RunTask response.
fn started_task(output: &RunTaskOutput) -> Result<StartedTask> {
    let Some(task) = output.tasks().first() else {
        let reasons = output
            .failures()
            .iter()
            .map(|f| {
                format!(
                    "{}: {}{}",
                    f.arn().unwrap_or("unknown"),
                    f.reason().unwrap_or("no reason given"),
                    f.detail().map(|d| format!(" ({d})")).unwrap_or_default(),
                )
            })
            .collect::<Vec<_>>();
        return Err(Error::LaunchRejected(if reasons.is_empty() {
            "no task and no failure reported".to_string()
        } else {
            reasons.join("; ")
        }));
    };

    let task_arn = task.task_arn().ok_or(Error::MissingField("task ARN"))?;
    let container_name = task
        .containers()
        .first()
        .and_then(|c| c.name())
        .ok_or(Error::MissingField("container name"))?;

    Ok(StartedTask {
        task_arn: task_arn.to_string(),
        container_name: container_name.to_string(),
    })
}

/// Find the awslogs options for a container, by name or else the first one.
fn log_settings(definition: &TaskDefinition, container_name: &str) -> Result<LogSettings> {
    let containers = definition.container_definitions();
    let container = containers
        .iter()
        .find(|c| c.name() == Some(container_name))
        .or_else(|| containers.first())
        .ok_or(Error::MissingField("container definitions"))?;

    debug!(
        container = container.name().unwrap_or_default(),
        "reading log configuration"
    );

    let options = container
        .log_configuration()
        .ok_or(Error::MissingField("log configuration"))?
        .options();

    Ok(LogSettings {
        group: options.and_then(|o| o.get(AWSLOGS_GROUP)).cloned(),
        stream_prefix: options.and_then(|o| o.get(AWSLOGS_STREAM_PREFIX)).cloned(),
    })
}

/// Read the first container's exit code and the task's stop reason.
fn exit_result(output: &DescribeTasksOutput) -> Result<ExitResult> {
    let task = output
        .tasks()
        .first()
        .ok_or(Error::MissingField("described task"))?;
    let stopped_reason = task.stopped_reason().unwrap_or_default().to_string();

    match task.containers().first().and_then(|c| c.exit_code()) {
        Some(exit_code) => Ok(ExitResult {
            exit_code,
            stopped_reason,
        }),
        None => Err(Error::NoExitCode(stopped_reason)),
    }
}

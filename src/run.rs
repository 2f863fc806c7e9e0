use std::io::Write;

use tracing::{debug, info};
use uuid::Uuid;

use crate::cluster::Orchestrator;
use crate::cmd::TaskLaunchBuilder;
use crate::config::{RunConfig, TaskDefinitionSource};
use crate::error::{Error, Result};
use crate::logs::{fetch_events, LogEvent, LogSource};
use crate::taskdef::TaskDefinitionFile;

/// A task that has been launched and has stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchedTask {
    pub task_arn: String,
    /// last segment of the task ARN
    pub task_id: String,
    pub container_name: String,
    pub log_group: String,
    pub log_stream: String,
}

/// The awslogs driver names a task's stream `<prefix>/<container>/<task id>`.
pub fn log_stream_name(prefix: &str, container_name: &str, task_id: &str) -> String {
    format!("{}/{}/{}", prefix, container_name, task_id)
}

pub fn task_id(task_arn: &str) -> &str {
    task_arn.rsplit('/').next().unwrap_or(task_arn)
}

/// Run the task described by `config` to completion.
///
/// The task's log lines and its stop reason are written to `out`. Returns the
/// exit code of the task's first container.
pub async fn run(
    config: RunConfig,
    cluster: &dyn Orchestrator,
    logs: &dyn LogSource,
    out: &mut dyn Write,
) -> Result<i32> {
    let task_definition = resolve_task_definition(&config, cluster).await?;

    let task = launch(&config, task_definition, cluster).await?;

    let events = fetch_events(logs, &task.log_group, &task.log_stream, config.all_logs).await?;
    print_events(out, &events)?;

    let exit = cluster.exit_result(&config.cluster, &task.task_arn).await?;
    info!(
        task = %task.task_id,
        container = %task.container_name,
        exit_code = exit.exit_code,
        "task finished"
    );
    writeln!(out, "Exit reason: {}", exit.stopped_reason)?;

    Ok(exit.exit_code)
}

async fn resolve_task_definition(
    config: &RunConfig,
    cluster: &dyn Orchestrator,
) -> Result<String> {
    match &config.task_definition {
        TaskDefinitionSource::Registered(id) => Ok(id.clone()),
        TaskDefinitionSource::File(path) => {
            let definition = TaskDefinitionFile::load(path)?;
            info!(
                path = %path.display(),
                family = %definition.family,
                "registering task definition"
            );
            let arn = cluster.register_task_definition(definition).await?;
            info!(task_definition = %arn, "registered task definition");
            Ok(arn)
        }
    }
}

/// Start one task, work out where its logs go, and wait for it to stop.
async fn launch(
    config: &RunConfig,
    task_definition: String,
    cluster: &dyn Orchestrator,
) -> Result<LaunchedTask> {
    let run_id = Uuid::new_v4();
    let request = TaskLaunchBuilder::from_config(config)
        .task_definition(task_definition)
        .run_id(run_id)
        .build()?;

    info!(
        task_definition = request.task_definition(),
        cluster = request.cluster(),
        launch_type = request.launch_type().as_str(),
        run_id = %run_id,
        "launching task"
    );
    let started = cluster.run_task(&request).await?;
    let task_id = task_id(&started.task_arn).to_string();

    let settings = cluster
        .log_settings(request.task_definition(), &started.container_name)
        .await?;
    let prefix = settings
        .stream_prefix
        .ok_or(Error::MissingField("awslogs-stream-prefix option"))?;
    let log_group = config
        .log_group
        .clone()
        .or(settings.group)
        .ok_or(Error::MissingField("awslogs-group option"))?;
    let log_stream = log_stream_name(&prefix, &started.container_name, &task_id);
    debug!(%log_group, %log_stream, "resolved log stream");

    info!(task = %task_id, "waiting for task to stop");
    cluster
        .wait_until_stopped(&config.cluster, &started.task_arn, config.max_wait)
        .await?;

    Ok(LaunchedTask {
        task_arn: started.task_arn,
        task_id,
        container_name: started.container_name,
        log_group,
        log_stream,
    })
}

fn print_events(out: &mut dyn Write, events: &[LogEvent]) -> Result<()> {
    writeln!(out, "Logs:")?;
    for event in events {
        writeln!(out, "   {}", event.message)?;
    }
    Ok(())
}

use aws_sdk_ecs::operation::run_task::builders::RunTaskFluentBuilder;
use aws_sdk_ecs::types::{AwsVpcConfiguration, LaunchType as EcsLaunchType, NetworkConfiguration};
use uuid::Uuid;

use crate::config::{LaunchType, NetworkPlacement, RunConfig};
use crate::error::{Error, Result};

/// Every launch asks for exactly one copy of the task
const DEFAULT_TASK_COUNT: i32 = 1;

/// Prefix of the startedBy marker, followed by the run id
const STARTED_BY_PREFIX: &str = "ecs-run-task";

#[derive(Debug, Default)]
pub struct TaskLaunchBuilder {
    /// The cluster to launch into
    cluster: Option<String>,
    /// Family, family:revision or ARN of a registered task definition
    task_definition: Option<String>,
    /// The capacity the task is placed on
    launch_type: Option<LaunchType>,
    /// Subnets and security groups for awsvpc tasks
    network: Option<NetworkPlacement>,
    /// Identifies this run in the ECS console
    run_id: Option<Uuid>,
}

impl TaskLaunchBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a builder with everything a `RunConfig` says about the launch.
    ///
    /// The task definition is left unset when the config points at a file,
    /// since the identifier is only known after registration.
    pub fn from_config(config: &RunConfig) -> Self {
        let mut builder = Self::new()
            .cluster(config.cluster.clone())
            .launch_type(config.launch_type);
        if let Some(network) = &config.network {
            builder = builder.network(network.clone());
        }
        builder
    }

    pub fn cluster(mut self, cluster: String) -> Self {
        self.cluster = Some(cluster);
        self
    }

    pub fn task_definition(mut self, task_definition: String) -> Self {
        self.task_definition = Some(task_definition);
        self
    }

    pub fn launch_type(mut self, launch_type: LaunchType) -> Self {
        self.launch_type = Some(launch_type);
        self
    }

    pub fn network(mut self, network: NetworkPlacement) -> Self {
        self.network = Some(network);
        self
    }

    pub fn run_id(mut self, run_id: Uuid) -> Self {
        self.run_id = Some(run_id);
        self
    }

    pub fn build(self) -> Result<TaskLaunch> {
        let cluster = self
            .cluster
            .ok_or_else(|| Error::InvalidConfig("no cluster given".into()))?;
        let task_definition = self
            .task_definition
            .ok_or_else(|| Error::InvalidConfig("no task definition given".into()))?;

        Ok(TaskLaunch {
            cluster,
            task_definition,
            launch_type: self.launch_type.unwrap_or(LaunchType::Fargate),
            network: self.network,
            run_id: self.run_id.unwrap_or_else(Uuid::new_v4),
        })
    }
}

/// A fully specified request to run one copy of a task definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskLaunch {
    cluster: String,
    task_definition: String,
    launch_type: LaunchType,
    network: Option<NetworkPlacement>,
    run_id: Uuid,
}

impl TaskLaunch {
    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    pub fn task_definition(&self) -> &str {
        &self.task_definition
    }

    pub fn launch_type(&self) -> LaunchType {
        self.launch_type
    }

    pub fn network(&self) -> Option<&NetworkPlacement> {
        self.network.as_ref()
    }

    pub fn started_by(&self) -> String {
        format!("{}-{}", STARTED_BY_PREFIX, self.run_id)
    }

    /// Fill a RunTask call with this launch.
    pub fn apply(&self, request: RunTaskFluentBuilder) -> Result<RunTaskFluentBuilder> {
        let mut request = request
            .cluster(&self.cluster)
            .count(DEFAULT_TASK_COUNT)
            .launch_type(EcsLaunchType::from(self.launch_type.as_str()))
            .task_definition(&self.task_definition)
            .started_by(self.started_by());

        if let Some(network) = &self.network {
            let awsvpc = AwsVpcConfiguration::builder()
                .set_subnets(Some(network.subnets.clone()))
                .set_security_groups(Some(network.security_groups.clone()))
                .build()
                .map_err(|e| Error::InvalidConfig(e.to_string()))?;
            request = request.network_configuration(
                NetworkConfiguration::builder()
                    .awsvpc_configuration(awsvpc)
                    .build(),
            );
        }

        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::config::TaskDefinitionSource;

    fn config(network: Option<NetworkPlacement>) -> RunConfig {
        RunConfig {
            cluster: "jobs".into(),
            task_definition: TaskDefinitionSource::Registered("migrate:3".into()),
            launch_type: LaunchType::Ec2,
            network,
            log_group: None,
            max_wait: Duration::from_secs(600),
            all_logs: false,
        }
    }

    #[test]
    fn build_requires_task_definition() {
        let err = TaskLaunchBuilder::from_config(&config(None))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn build_carries_config() {
        let placement = NetworkPlacement {
            subnets: vec!["subnet-1".into()],
            security_groups: vec![],
        };
        let launch = TaskLaunchBuilder::from_config(&config(Some(placement.clone())))
            .task_definition("migrate:3".into())
            .build()
            .unwrap();
        assert_eq!(launch.cluster(), "jobs");
        assert_eq!(launch.task_definition(), "migrate:3");
        assert_eq!(launch.launch_type(), LaunchType::Ec2);
        assert_eq!(launch.network(), Some(&placement));
    }

    #[test]
    fn launch_type_defaults_to_fargate() {
        let launch = TaskLaunchBuilder::new()
            .cluster("jobs".into())
            .task_definition("smoke".into())
            .build()
            .unwrap();
        assert_eq!(launch.launch_type(), LaunchType::Fargate);
    }

    #[test]
    fn started_by_embeds_run_id() {
        let id = Uuid::nil();
        let launch = TaskLaunchBuilder::new()
            .cluster("jobs".into())
            .task_definition("smoke".into())
            .run_id(id)
            .build()
            .unwrap();
        assert_eq!(
            launch.started_by(),
            "ecs-run-task-00000000-0000-0000-0000-000000000000"
        );
    }
}

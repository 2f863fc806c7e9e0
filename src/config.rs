use std::path::PathBuf;
use std::time::Duration;

use clap::ValueEnum;

use crate::error::{Error, Result};

/// The budget of the ECS tasks-stopped waiter: 100 attempts, 6 seconds apart
pub const DEFAULT_MAX_WAIT_SECS: u64 = 600;

/// At most this many log events are requested per call
pub const LOG_PAGE_LIMIT: i32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LaunchType {
    /// run on self-managed EC2 capacity
    #[value(name = "EC2")]
    Ec2,
    /// run on serverless capacity
    #[value(name = "FARGATE")]
    Fargate,
}

impl LaunchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LaunchType::Ec2 => "EC2",
            LaunchType::Fargate => "FARGATE",
        }
    }
}

/// Where the task's network interface lands, for the awsvpc network mode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkPlacement {
    pub subnets: Vec<String>,
    pub security_groups: Vec<String>,
}

/// How the task definition is named on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskDefinitionSource {
    /// family, family:revision or full ARN, already registered
    Registered(String),
    /// a local JSON document to register before launching
    File(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub cluster: String,
    pub task_definition: TaskDefinitionSource,
    pub launch_type: LaunchType,
    pub network: Option<NetworkPlacement>,
    /// overrides the awslogs-group of the task definition
    pub log_group: Option<String>,
    pub max_wait: Duration,
    /// page through the whole stream instead of stopping at the first page
    pub all_logs: bool,
}

/// Raw flag values, before validation.
#[derive(Debug, Clone)]
pub struct RawRunConfig {
    pub cluster: String,
    pub task_definition: String,
    pub from_file: bool,
    pub launch_type: LaunchType,
    pub subnets: String,
    pub security_groups: String,
    pub log_group: Option<String>,
    pub max_wait_secs: u64,
    pub all_logs: bool,
}

impl TryFrom<RawRunConfig> for RunConfig {
    type Error = Error;

    fn try_from(raw: RawRunConfig) -> Result<Self> {
        if raw.cluster.is_empty() {
            return Err(Error::InvalidConfig("cluster must not be empty".into()));
        }
        if raw.task_definition.is_empty() {
            return Err(Error::InvalidConfig(
                "task definition must not be empty".into(),
            ));
        }

        let task_definition = if raw.from_file {
            TaskDefinitionSource::File(PathBuf::from(raw.task_definition))
        } else {
            TaskDefinitionSource::Registered(raw.task_definition)
        };

        let network = network_placement(
            split_list(&raw.subnets),
            split_list(&raw.security_groups),
        )?;

        Ok(RunConfig {
            cluster: raw.cluster,
            task_definition,
            launch_type: raw.launch_type,
            network,
            log_group: raw.log_group.filter(|g| !g.is_empty()),
            max_wait: Duration::from_secs(raw.max_wait_secs),
            all_logs: raw.all_logs,
        })
    }
}

/// Split a comma-separated flag value into its ordered parts.
///
/// An empty value is an empty list; otherwise every substring between commas
/// is kept verbatim.
pub fn split_list(value: &str) -> Vec<String> {
    if value.is_empty() {
        return vec![];
    }
    value.split(',').map(String::from).collect()
}

fn network_placement(
    subnets: Vec<String>,
    security_groups: Vec<String>,
) -> Result<Option<NetworkPlacement>> {
    if subnets.is_empty() {
        if !security_groups.is_empty() {
            return Err(Error::InvalidConfig(
                "security groups need at least one subnet".into(),
            ));
        }
        return Ok(None);
    }
    Ok(Some(NetworkPlacement {
        subnets,
        security_groups,
    }))
}

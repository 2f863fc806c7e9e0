mod cluster;
mod cmd;
mod config;
mod error;
mod logs;
mod run;
mod taskdef;

use anyhow::{Context, Result};
use aws_config::{BehaviorVersion, Region, SdkConfig};
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::cluster::EcsCluster;
use crate::config::{LaunchType, RawRunConfig, RunConfig, DEFAULT_MAX_WAIT_SECS};
use crate::logs::CloudWatchLogSource;

/// Launches one copy of an ECS task definition, waits for it to stop, prints
/// its CloudWatch logs and exits with the exit code of its first container.
///
/// Any failure before the task's own exit code is known exits with 1.
#[derive(Parser, Debug)]
#[command(name = "ecs-run-task", author, version, about, long_about = None)]
struct Args {
    /// the name of the cluster
    #[arg(short, long, env = "ECS_RUN_TASK_CLUSTER")]
    cluster: String,

    /// the task definition to run, a JSON file if used with --file
    #[arg(short, long, env = "ECS_RUN_TASK_DEFINITION")]
    task_definition: String,

    /// read the task definition from a file and register it before running
    #[arg(short, long, default_value_t = false)]
    file: bool,

    /// the launch type, EC2 or FARGATE
    #[arg(short, long, value_enum, ignore_case = true, default_value_t = LaunchType::Fargate)]
    launch_type: LaunchType,

    /// security groups to attach, separated by comma
    #[arg(long, default_value_t = String::from(""))]
    security_groups: String,

    /// subnets where to deploy the task, separated by comma
    #[arg(long, default_value_t = String::from(""))]
    subnets: String,

    /// the log group used by the task, instead of its awslogs-group option
    #[arg(long)]
    log_group: Option<String>,

    /// the AWS region, otherwise taken from the environment or profile
    #[arg(long)]
    region: Option<String>,

    /// the AWS profile to load credentials from
    #[arg(long)]
    profile: Option<String>,

    /// how long to wait for the task to stop, in seconds
    #[arg(long, default_value_t = DEFAULT_MAX_WAIT_SECS)]
    max_wait: u64,

    /// print every log event instead of only the first 100
    #[arg(long, default_value_t = false)]
    all_logs: bool,
}

impl From<Args> for RawRunConfig {
    fn from(args: Args) -> Self {
        RawRunConfig {
            cluster: args.cluster,
            task_definition: args.task_definition,
            from_file: args.file,
            launch_type: args.launch_type,
            subnets: args.subnets,
            security_groups: args.security_groups,
            log_group: args.log_group,
            max_wait_secs: args.max_wait,
            all_logs: args.all_logs,
        }
    }
}

#[tokio::main]
async fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let _ = err.print();
            std::process::exit(if err.use_stderr() { 1 } else { 0 });
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    std::process::exit(exit_code(try_main(args).await));
}

/// The process exit code: the container's own code, or 1 for any failure.
fn exit_code(result: Result<i32>) -> i32 {
    match result {
        Ok(code) => code,
        Err(err) => {
            error!("{:#}", err);
            1
        }
    }
}

async fn try_main(args: Args) -> Result<i32> {
    let (region, profile) = (args.region.clone(), args.profile.clone());
    let config = RunConfig::try_from(RawRunConfig::from(args)).context("bad arguments")?;
    let sdk_config = load_sdk_config(region, profile).await;

    let cluster = EcsCluster::new(&sdk_config);
    let logs = CloudWatchLogSource::new(&sdk_config);

    let mut stdout = std::io::stdout().lock();
    let code = run::run(config, &cluster, &logs, &mut stdout).await?;
    Ok(code)
}

async fn load_sdk_config(region: Option<String>, profile: Option<String>) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(region) = region {
        loader = loader.region(Region::new(region));
    }
    if let Some(profile) = profile {
        loader = loader.profile_name(profile);
    }
    loader.load().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TaskDefinitionSource;

    fn parse(argv: &[&str]) -> std::result::Result<Args, clap::Error> {
        Args::try_parse_from(std::iter::once("ecs-run-task").chain(argv.iter().copied()))
    }

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }

    #[test]
    fn parses_short_flags() {
        let args = parse(&["-c", "jobs", "-t", "migrate:3", "-l", "EC2"]).unwrap();
        let config = RunConfig::try_from(RawRunConfig::from(args)).unwrap();

        assert_eq!(config.cluster, "jobs");
        assert_eq!(
            config.task_definition,
            TaskDefinitionSource::Registered("migrate:3".into())
        );
        assert_eq!(config.launch_type, LaunchType::Ec2);
        assert_eq!(config.network, None);
        assert!(!config.all_logs);
    }

    #[test]
    fn launch_type_defaults_to_fargate_and_ignores_case() {
        let args = parse(&["-c", "jobs", "-t", "smoke"]).unwrap();
        assert_eq!(args.launch_type, LaunchType::Fargate);

        let args = parse(&["-c", "jobs", "-t", "smoke", "--launch-type", "ec2"]).unwrap();
        assert_eq!(args.launch_type, LaunchType::Ec2);
    }

    #[test]
    fn rejects_unknown_launch_type() {
        assert!(parse(&["-c", "jobs", "-t", "smoke", "-l", "EXTERNAL"]).is_err());
    }

    #[test]
    fn network_flags_split_on_comma() {
        let args = parse(&[
            "--cluster",
            "jobs",
            "--task-definition",
            "smoke",
            "--subnets",
            "subnet-a,subnet-b",
            "--security-groups",
            "sg-1,sg-2",
        ])
        .unwrap();
        let config = RunConfig::try_from(RawRunConfig::from(args)).unwrap();
        let network = config.network.unwrap();

        assert_eq!(network.subnets, vec!["subnet-a", "subnet-b"]);
        assert_eq!(network.security_groups, vec!["sg-1", "sg-2"]);
    }

    #[test]
    fn file_flag_reads_task_definition_as_path() {
        let args = parse(&["-c", "jobs", "-f", "-t", "deploy/task.json", "--all-logs"]).unwrap();
        let config = RunConfig::try_from(RawRunConfig::from(args)).unwrap();

        assert!(matches!(config.task_definition, TaskDefinitionSource::File(_)));
        assert!(config.all_logs);
    }

    #[test]
    fn exit_code_passes_container_code_through() {
        assert_eq!(exit_code(Ok(0)), 0);
        assert_eq!(exit_code(Ok(137)), 137);
    }

    #[test]
    fn exit_code_is_one_on_error() {
        let err = anyhow::Error::new(crate::error::Error::Api {
            operation: "RunTask",
            message: "AccessDeniedException".into(),
        })
        .context("launching task");
        assert_eq!(exit_code(Err(err)), 1);
    }

    #[tokio::test]
    async fn bad_arguments_fail_before_aws_setup() {
        let args = parse(&["-c", "", "-t", "smoke", "--profile", "no-such-profile"]).unwrap();

        let err = try_main(args).await.unwrap_err();

        assert_eq!(err.to_string(), "bad arguments");
        assert!(format!("{:#}", err).contains("invalid configuration"));
    }
}

use std::collections::HashMap;
use std::path::Path;

use aws_sdk_ecs::error::BuildError;
use aws_sdk_ecs::operation::register_task_definition::builders::RegisterTaskDefinitionFluentBuilder;
use aws_sdk_ecs::types::{
    ApplicationProtocol, Compatibility, ContainerCondition, ContainerDefinition,
    ContainerDependency, CpuArchitecture, DockerVolumeConfiguration, EfsTransitEncryption,
    EfsVolumeConfiguration, EnvironmentFile, EnvironmentFileType, EphemeralStorage, HealthCheck,
    HostVolumeProperties, IpcMode, KernelCapabilities, KeyValuePair, LinuxParameters,
    LogConfiguration, LogDriver, MountPoint, NetworkMode, OsFamily, PidMode, PortMapping,
    RepositoryCredentials, ResourceRequirement, ResourceType, RuntimePlatform, Scope, Secret, Tag,
    TaskDefinitionPlacementConstraint, TaskDefinitionPlacementConstraintType, TransportProtocol,
    Ulimit, UlimitName, Volume, VolumeFrom,
};
use serde::Deserialize;

use crate::error::{Error, Result};

/// A task definition document in the RegisterTaskDefinition JSON shape.
///
/// Every key of the document is either sent on registration or rejected
/// with a parse error, so nothing in the file is silently left out.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TaskDefinitionFile {
    pub family: String,
    pub task_role_arn: Option<String>,
    pub execution_role_arn: Option<String>,
    pub network_mode: Option<String>,
    #[serde(default)]
    pub requires_compatibilities: Vec<String>,
    pub cpu: Option<StringOrNumber>,
    pub memory: Option<StringOrNumber>,
    pub pid_mode: Option<String>,
    pub ipc_mode: Option<String>,
    pub container_definitions: Vec<ContainerSpec>,
    #[serde(default)]
    pub volumes: Vec<VolumeSpec>,
    #[serde(default)]
    pub placement_constraints: Vec<PlacementConstraintSpec>,
    pub runtime_platform: Option<RuntimePlatformSpec>,
    pub ephemeral_storage: Option<EphemeralStorageSpec>,
    #[serde(default)]
    pub tags: Vec<TagSpec>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub cpu: Option<i32>,
    pub memory: Option<i32>,
    pub memory_reservation: Option<i32>,
    pub essential: Option<bool>,
    pub command: Option<Vec<String>>,
    pub entry_point: Option<Vec<String>>,
    #[serde(default)]
    pub environment: Vec<EnvVar>,
    #[serde(default)]
    pub environment_files: Vec<EnvironmentFileSpec>,
    #[serde(default)]
    pub secrets: Vec<SecretRef>,
    #[serde(default)]
    pub port_mappings: Vec<PortSpec>,
    pub working_directory: Option<String>,
    pub user: Option<String>,
    pub hostname: Option<String>,
    pub privileged: Option<bool>,
    pub readonly_root_filesystem: Option<bool>,
    pub start_timeout: Option<i32>,
    pub stop_timeout: Option<i32>,
    #[serde(default)]
    pub mount_points: Vec<MountPointSpec>,
    #[serde(default)]
    pub volumes_from: Vec<VolumeFromSpec>,
    #[serde(default)]
    pub depends_on: Vec<DependencySpec>,
    pub health_check: Option<HealthCheckSpec>,
    #[serde(default)]
    pub ulimits: Vec<UlimitSpec>,
    pub docker_labels: Option<HashMap<String, String>>,
    pub linux_parameters: Option<LinuxParametersSpec>,
    #[serde(default)]
    pub resource_requirements: Vec<ResourceRequirementSpec>,
    pub repository_credentials: Option<RepositoryCredentialsSpec>,
    pub log_configuration: Option<LogSpec>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentFileSpec {
    pub value: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SecretRef {
    pub name: String,
    pub value_from: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PortSpec {
    pub name: Option<String>,
    pub container_port: Option<i32>,
    pub host_port: Option<i32>,
    pub protocol: Option<String>,
    pub app_protocol: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LogSpec {
    pub log_driver: String,
    #[serde(default)]
    pub options: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MountPointSpec {
    pub source_volume: Option<String>,
    pub container_path: Option<String>,
    pub read_only: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VolumeFromSpec {
    pub source_container: Option<String>,
    pub read_only: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DependencySpec {
    pub container_name: String,
    /// START, COMPLETE, SUCCESS or HEALTHY
    pub condition: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct HealthCheckSpec {
    pub command: Vec<String>,
    pub interval: Option<i32>,
    pub timeout: Option<i32>,
    pub retries: Option<i32>,
    pub start_period: Option<i32>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UlimitSpec {
    pub name: String,
    pub soft_limit: i32,
    pub hard_limit: i32,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LinuxParametersSpec {
    pub capabilities: Option<CapabilitiesSpec>,
    pub init_process_enabled: Option<bool>,
    pub shared_memory_size: Option<i32>,
    pub max_swap: Option<i32>,
    pub swappiness: Option<i32>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CapabilitiesSpec {
    pub add: Option<Vec<String>>,
    pub drop: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ResourceRequirementSpec {
    pub value: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RepositoryCredentialsSpec {
    pub credentials_parameter: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VolumeSpec {
    pub name: Option<String>,
    pub host: Option<HostVolumeSpec>,
    pub docker_volume_configuration: Option<DockerVolumeSpec>,
    pub efs_volume_configuration: Option<EfsVolumeSpec>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct HostVolumeSpec {
    pub source_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DockerVolumeSpec {
    /// task or shared
    pub scope: Option<String>,
    pub autoprovision: Option<bool>,
    pub driver: Option<String>,
    pub driver_opts: Option<HashMap<String, String>>,
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EfsVolumeSpec {
    pub file_system_id: String,
    pub root_directory: Option<String>,
    pub transit_encryption: Option<String>,
    pub transit_encryption_port: Option<i32>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PlacementConstraintSpec {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub expression: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RuntimePlatformSpec {
    pub cpu_architecture: Option<String>,
    pub operating_system_family: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct EphemeralStorageSpec {
    #[serde(rename = "sizeInGiB")]
    pub size_in_gib: i32,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TagSpec {
    pub key: String,
    pub value: Option<String>,
}

/// Task-level cpu and memory are strings in the API, but documents often
/// carry plain numbers.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum StringOrNumber {
    String(String),
    Number(i64),
}

impl StringOrNumber {
    fn into_string(self) -> String {
        match self {
            StringOrNumber::String(s) => s,
            StringOrNumber::Number(n) => n.to_string(),
        }
    }
}

/// Lists are left unset rather than sent empty.
fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}

fn rejected(what: &str, err: BuildError) -> Error {
    Error::InvalidConfig(format!("{what}: {err}"))
}

impl TaskDefinitionFile {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| Error::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Fill a RegisterTaskDefinition call with this document.
    pub fn apply(
        self,
        request: RegisterTaskDefinitionFluentBuilder,
    ) -> Result<RegisterTaskDefinitionFluentBuilder> {
        let containers = self
            .container_definitions
            .into_iter()
            .map(ContainerSpec::into_sdk)
            .collect::<Result<Vec<_>>>()?;

        let volumes = self
            .volumes
            .into_iter()
            .map(VolumeSpec::into_sdk)
            .collect::<Result<Vec<_>>>()?;

        let compatibilities = self
            .requires_compatibilities
            .iter()
            .map(|c| Compatibility::from(c.as_str()))
            .collect();

        let placement_constraints = self
            .placement_constraints
            .into_iter()
            .map(|c| {
                TaskDefinitionPlacementConstraint::builder()
                    .set_type(
                        c.kind
                            .as_deref()
                            .map(TaskDefinitionPlacementConstraintType::from),
                    )
                    .set_expression(c.expression)
                    .build()
            })
            .collect();

        let runtime_platform = self.runtime_platform.map(|p| {
            RuntimePlatform::builder()
                .set_cpu_architecture(p.cpu_architecture.as_deref().map(CpuArchitecture::from))
                .set_operating_system_family(
                    p.operating_system_family.as_deref().map(OsFamily::from),
                )
                .build()
        });

        let ephemeral_storage = self.ephemeral_storage.map(|storage| {
            EphemeralStorage::builder()
                .size_in_gib(storage.size_in_gib)
                .build()
        });

        let tags = self
            .tags
            .into_iter()
            .map(|t| Tag::builder().key(t.key).set_value(t.value).build())
            .collect();

        Ok(request
            .family(self.family)
            .set_task_role_arn(self.task_role_arn)
            .set_execution_role_arn(self.execution_role_arn)
            .set_network_mode(self.network_mode.as_deref().map(NetworkMode::from))
            .set_requires_compatibilities(non_empty(compatibilities))
            .set_cpu(self.cpu.map(StringOrNumber::into_string))
            .set_memory(self.memory.map(StringOrNumber::into_string))
            .set_pid_mode(self.pid_mode.as_deref().map(PidMode::from))
            .set_ipc_mode(self.ipc_mode.as_deref().map(IpcMode::from))
            .set_container_definitions(Some(containers))
            .set_volumes(non_empty(volumes))
            .set_placement_constraints(non_empty(placement_constraints))
            .set_runtime_platform(runtime_platform)
            .set_ephemeral_storage(ephemeral_storage)
            .set_tags(non_empty(tags)))
    }
}

impl VolumeSpec {
    fn into_sdk(self) -> Result<Volume> {
        let what = format!("volume {}", self.name.as_deref().unwrap_or_default());

        let host = self.host.map(|h| {
            HostVolumeProperties::builder()
                .set_source_path(h.source_path)
                .build()
        });

        let docker = self.docker_volume_configuration.map(|d| {
            DockerVolumeConfiguration::builder()
                .set_scope(d.scope.as_deref().map(Scope::from))
                .set_autoprovision(d.autoprovision)
                .set_driver(d.driver)
                .set_driver_opts(d.driver_opts)
                .set_labels(d.labels)
                .build()
        });

        let efs = match self.efs_volume_configuration {
            Some(efs) => Some(
                EfsVolumeConfiguration::builder()
                    .file_system_id(efs.file_system_id)
                    .set_root_directory(efs.root_directory)
                    .set_transit_encryption(
                        efs.transit_encryption
                            .as_deref()
                            .map(EfsTransitEncryption::from),
                    )
                    .set_transit_encryption_port(efs.transit_encryption_port)
                    .build()
                    .map_err(|e| rejected(&what, e))?,
            ),
            None => None,
        };

        Ok(Volume::builder()
            .set_name(self.name)
            .set_host(host)
            .set_docker_volume_configuration(docker)
            .set_efs_volume_configuration(efs)
            .build())
    }
}

impl ContainerSpec {
    fn into_sdk(self) -> Result<ContainerDefinition> {
        let what = format!("container {}", self.name);
        let rejected = |e| rejected(&what, e);

        let environment = self
            .environment
            .into_iter()
            .map(|e| KeyValuePair::builder().name(e.name).value(e.value).build())
            .collect();

        let environment_files = self
            .environment_files
            .into_iter()
            .map(|f| {
                EnvironmentFile::builder()
                    .value(f.value)
                    .r#type(EnvironmentFileType::from(f.kind.as_str()))
                    .build()
            })
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(rejected)?;

        let secrets = self
            .secrets
            .into_iter()
            .map(|s| Secret::builder().name(s.name).value_from(s.value_from).build())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(rejected)?;

        let port_mappings = self
            .port_mappings
            .into_iter()
            .map(|p| {
                PortMapping::builder()
                    .set_name(p.name)
                    .set_container_port(p.container_port)
                    .set_host_port(p.host_port)
                    .set_protocol(p.protocol.as_deref().map(TransportProtocol::from))
                    .set_app_protocol(p.app_protocol.as_deref().map(ApplicationProtocol::from))
                    .build()
            })
            .collect();

        let mount_points = self
            .mount_points
            .into_iter()
            .map(|m| {
                MountPoint::builder()
                    .set_source_volume(m.source_volume)
                    .set_container_path(m.container_path)
                    .set_read_only(m.read_only)
                    .build()
            })
            .collect();

        let volumes_from = self
            .volumes_from
            .into_iter()
            .map(|v| {
                VolumeFrom::builder()
                    .set_source_container(v.source_container)
                    .set_read_only(v.read_only)
                    .build()
            })
            .collect();

        let depends_on = self
            .depends_on
            .into_iter()
            .map(|d| {
                ContainerDependency::builder()
                    .container_name(d.container_name)
                    .condition(ContainerCondition::from(d.condition.as_str()))
                    .build()
            })
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(rejected)?;

        let health_check = match self.health_check {
            Some(check) => Some(
                HealthCheck::builder()
                    .set_command(Some(check.command))
                    .set_interval(check.interval)
                    .set_timeout(check.timeout)
                    .set_retries(check.retries)
                    .set_start_period(check.start_period)
                    .build()
                    .map_err(rejected)?,
            ),
            None => None,
        };

        let ulimits = self
            .ulimits
            .into_iter()
            .map(|u| {
                Ulimit::builder()
                    .name(UlimitName::from(u.name.as_str()))
                    .soft_limit(u.soft_limit)
                    .hard_limit(u.hard_limit)
                    .build()
            })
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(rejected)?;

        let linux_parameters = self.linux_parameters.map(|l| {
            let capabilities = l.capabilities.map(|c| {
                KernelCapabilities::builder()
                    .set_add(c.add)
                    .set_drop(c.drop)
                    .build()
            });
            LinuxParameters::builder()
                .set_capabilities(capabilities)
                .set_init_process_enabled(l.init_process_enabled)
                .set_shared_memory_size(l.shared_memory_size)
                .set_max_swap(l.max_swap)
                .set_swappiness(l.swappiness)
                .build()
        });

        let resource_requirements = self
            .resource_requirements
            .into_iter()
            .map(|r| {
                ResourceRequirement::builder()
                    .value(r.value)
                    .r#type(ResourceType::from(r.kind.as_str()))
                    .build()
            })
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(rejected)?;

        let repository_credentials = match self.repository_credentials {
            Some(creds) => Some(
                RepositoryCredentials::builder()
                    .credentials_parameter(creds.credentials_parameter)
                    .build()
                    .map_err(rejected)?,
            ),
            None => None,
        };

        let log_configuration = match self.log_configuration {
            Some(log) => Some(
                LogConfiguration::builder()
                    .log_driver(LogDriver::from(log.log_driver.as_str()))
                    .set_options(Some(log.options))
                    .build()
                    .map_err(rejected)?,
            ),
            None => None,
        };

        Ok(ContainerDefinition::builder()
            .name(self.name)
            .image(self.image)
            .set_cpu(self.cpu)
            .set_memory(self.memory)
            .set_memory_reservation(self.memory_reservation)
            .set_essential(self.essential)
            .set_command(self.command)
            .set_entry_point(self.entry_point)
            .set_environment(non_empty(environment))
            .set_environment_files(non_empty(environment_files))
            .set_secrets(non_empty(secrets))
            .set_port_mappings(non_empty(port_mappings))
            .set_working_directory(self.working_directory)
            .set_user(self.user)
            .set_hostname(self.hostname)
            .set_privileged(self.privileged)
            .set_readonly_root_filesystem(self.readonly_root_filesystem)
            .set_start_timeout(self.start_timeout)
            .set_stop_timeout(self.stop_timeout)
            .set_mount_points(non_empty(mount_points))
            .set_volumes_from(non_empty(volumes_from))
            .set_depends_on(non_empty(depends_on))
            .set_health_check(health_check)
            .set_ulimits(non_empty(ulimits))
            .set_docker_labels(self.docker_labels)
            .set_linux_parameters(linux_parameters)
            .set_resource_requirements(non_empty(resource_requirements))
            .set_repository_credentials(repository_credentials)
            .set_log_configuration(log_configuration)
            .build())
    }
}

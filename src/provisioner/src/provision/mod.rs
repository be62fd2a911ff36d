//! TaskProvisioner: plans tasks, bootstraps secrets and drives the phased
//! cluster build-out.
//!
//! Phases: optional pre-provision, then masters behind the quorum latch,
//! then nodes, then the cluster check. Master failures beyond the quorum
//! fail the cluster; node failures are logged and the build continues.

mod latch;
mod monitor;
mod rate_limit;
mod settings;

pub use latch::CountdownLatch;
pub use rate_limit::RateLimiter;
pub use settings::{load_cloud_specific_data, update_cloud_specific_data};

use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use cluster::pki::{new_admin_pair, new_bootstrap_key_pair, new_ca_pair, CertPair};
use cluster::{
    make_name, Auth, ClusterService, CloudProvider, Error, Kube, KubeState, Machine,
    MachineState, Networking, NodeProfile, Profile, Result, Role, Storage,
};

use crate::config::{Config, ConfigChannels};
use crate::workflow::{self, Status, Task, WorkflowSet};

use monitor::monitor_cluster_state;

const RESTART_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Phase a planned task belongs to. Used as the key of the persisted
/// task-id index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskRole {
    PreProvision,
    Master,
    Node,
    Cluster,
}

impl fmt::Display for TaskRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let role = match self {
            TaskRole::PreProvision => "preprovision",
            TaskRole::Master => "master",
            TaskRole::Node => "node",
            TaskRole::Cluster => "cluster",
        };
        f.write_str(role)
    }
}

impl FromStr for TaskRole {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "preprovision" => Ok(TaskRole::PreProvision),
            "master" => Ok(TaskRole::Master),
            "node" => Ok(TaskRole::Node),
            "cluster" => Ok(TaskRole::Cluster),
            other => Err(Error::InvalidArguments(format!(
                "unknown task role {}",
                other
            ))),
        }
    }
}

/// What `provision_cluster` hands back while the build continues in the
/// background.
pub struct ProvisionStarted {
    pub cluster_id: String,
    pub tasks: HashMap<TaskRole, Vec<String>>,
}

pub type WriterFactory =
    Arc<dyn Fn(&str) -> std::io::Result<Box<dyn Write + Send>> + Send + Sync>;

fn file_writer_factory(log_dir: PathBuf) -> WriterFactory {
    Arc::new(move |task_id| {
        std::fs::create_dir_all(&log_dir)?;
        let file = std::fs::File::create(log_dir.join(format!("{}.log", task_id)))?;
        Ok(Box::new(file) as Box<dyn Write + Send>)
    })
}

pub struct TaskProvisioner {
    repository: Arc<dyn Storage>,
    kube_service: Arc<dyn ClusterService>,
    provision_map: HashMap<CloudProvider, WorkflowSet>,
    // One limiter shared across all users and in-flight clusters; cloud
    // quotas are tenant wide.
    rate_limiter: RateLimiter,
    cancel_map: Mutex<HashMap<String, CancellationToken>>,
    get_writer: WriterFactory,
}

fn default_provision_map() -> HashMap<CloudProvider, WorkflowSet> {
    let mut map = HashMap::new();
    map.insert(
        CloudProvider::DigitalOcean,
        WorkflowSet {
            pre_provision: None,
            provision_master: workflow::DIGITALOCEAN_MASTER,
            provision_node: workflow::DIGITALOCEAN_NODE,
        },
    );
    map.insert(
        CloudProvider::Aws,
        WorkflowSet {
            pre_provision: Some(workflow::AWS_PRE_PROVISION),
            provision_master: workflow::AWS_MASTER,
            provision_node: workflow::AWS_NODE,
        },
    );
    map.insert(
        CloudProvider::Gce,
        WorkflowSet {
            pre_provision: None,
            provision_master: workflow::GCE_MASTER,
            provision_node: workflow::GCE_NODE,
        },
    );
    map
}

impl TaskProvisioner {
    pub fn new(
        repository: Arc<dyn Storage>,
        kube_service: Arc<dyn ClusterService>,
        spawn_interval: Duration,
        log_dir: PathBuf,
    ) -> Self {
        TaskProvisioner {
            repository,
            kube_service,
            provision_map: default_provision_map(),
            rate_limiter: RateLimiter::new(spawn_interval),
            cancel_map: Mutex::new(HashMap::new()),
            get_writer: file_writer_factory(log_dir),
        }
    }

    /// Replace the per-task output sink factory. Test hook.
    pub fn with_writer_factory(mut self, get_writer: WriterFactory) -> Self {
        self.get_writer = get_writer;
        self
    }

    /// Replace the provider workflow sets. Test hook.
    pub fn with_provision_map(mut self, map: HashMap<CloudProvider, WorkflowSet>) -> Self {
        self.provision_map = map;
        self
    }

    /// Plan the whole build and launch it in the background. Returns as
    /// soon as planning succeeded; progress lands on the cluster record.
    pub async fn provision_cluster(
        self: Arc<Self>,
        parent: &CancellationToken,
        profile: &Profile,
        mut config: Config,
    ) -> Result<ProvisionStarted> {
        let task_map = self
            .prepare(
                profile.provider,
                profile.master_profiles.len(),
                profile.nodes_profiles.len(),
            )
            .await?;

        // The cluster id is the cluster task id prefix.
        let cluster_task_id = task_map
            .get(&TaskRole::Cluster)
            .and_then(|tasks| tasks.first())
            .map(|task| task.id.clone())
            .ok_or_else(|| Error::Internal("no cluster task planned".to_string()))?;
        if cluster_task_id.len() < 8 {
            return Err(Error::Internal(format!(
                "wrong value of cluster task id {}",
                cluster_task_id
            )));
        }
        config.cluster_id = cluster_task_id[..8].to_string();

        let ctx = parent.child_token();
        self.store_cancel(&config.cluster_id, ctx.clone())?;

        bootstrap_keys(&mut config)?;
        bootstrap_certs(&mut config)?;

        let (masters, nodes) = planned_machines(&config, profile, &task_map);
        let task_ids = grab_task_ids(&task_map);
        self.build_initial_cluster(profile, masters, nodes, &config, &task_ids)
            .await?;

        let receivers = config
            .take_receivers()
            .ok_or_else(|| Error::Internal("monitor channels already taken".to_string()))?;
        tokio::spawn(monitor_cluster_state(
            ctx.clone(),
            config.cluster_id.clone(),
            receivers,
            self.kube_service.clone(),
        ));

        let this = Arc::clone(&self);
        let profile = profile.clone();
        let cluster_id = config.cluster_id.clone();
        tokio::spawn(async move {
            this.provision(ctx, task_map, profile, config, false).await;
        });

        Ok(ProvisionStarted {
            cluster_id,
            tasks: task_ids,
        })
    }

    /// Add nodes to an existing cluster. Task ids are returned
    /// immediately; the runners continue in the background. The quorum
    /// latch is not involved here, the cluster is assumed healthy.
    pub async fn provision_nodes(
        self: Arc<Self>,
        parent: &CancellationToken,
        node_profiles: &[NodeProfile],
        kube: &Kube,
        mut config: Config,
    ) -> Result<Vec<String>> {
        if kube.masters.is_empty() {
            return Err(Error::NotFound("master node".to_string()));
        }
        for machine in kube.masters.values() {
            config.add_master(machine);
        }
        config.cluster_id = kube.id.clone();
        config.cluster_name = kube.name.clone();

        let ctx = parent.child_token();
        self.store_cancel(&config.cluster_id, ctx.clone())?;

        let record = self.kube_service.get(&config.cluster_id).await?;
        load_cloud_specific_data(&record, &mut config);

        let node_workflow = self
            .provision_map
            .get(&config.provider)
            .ok_or_else(|| Error::NotFound("provider workflow".to_string()))?
            .provision_node;

        if config.channels().is_none() {
            config.attach_channels(ConfigChannels::new());
        }
        let receivers = config
            .take_receivers()
            .ok_or_else(|| Error::Internal("monitor channels already taken".to_string()))?;
        tokio::spawn(monitor_cluster_state(
            ctx.clone(),
            config.cluster_id.clone(),
            receivers,
            self.kube_service.clone(),
        ));

        config.is_master = false;
        if let Some(master) = config.get_master() {
            config.flannel.etcd_host = master.private_ip.clone();
        }

        let mut task_ids = Vec::with_capacity(node_profiles.len());
        for node_profile in node_profiles {
            self.rate_limiter.take().await;

            let mut task = Task::new(node_workflow, self.repository.clone()).await?;
            task_ids.push(task.id.clone());

            let mut out = (self.get_writer)(&task.id)
                .map_err(|err| Error::Internal(format!("get writer: {}", err)))?;
            config.fill_node_profile(node_profile);

            let mut cfg = config.clone();
            cfg.task_id = task.id.clone();
            let ctx_task = ctx.clone();
            let cluster_id = config.cluster_id.clone();
            tokio::spawn(async move {
                if let Err(err) = task.run(ctx_task, cfg, out.as_mut()).await {
                    tracing::error!(
                        "[TaskProvisioner] add node to cluster {} caused {}",
                        cluster_id,
                        err
                    );
                }
            });
        }

        Ok(task_ids)
    }

    /// Rerun a half-finished build from its persisted task-id index.
    /// Every workflow resumes from its first non-success step; the whole
    /// rerun is capped at thirty minutes.
    pub async fn restart_cluster_provisioning(
        self: Arc<Self>,
        profile: &Profile,
        mut config: Config,
        task_ids: &HashMap<String, Vec<String>>,
    ) -> Result<()> {
        let ctx = CancellationToken::new();
        {
            let deadline = ctx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(RESTART_TIMEOUT).await;
                deadline.cancel();
            });
        }
        self.store_cancel(&config.cluster_id, ctx.clone())?;

        tracing::debug!("[TaskProvisioner] deserialize tasks");
        let mut task_map = self.deserialize_cluster_tasks(task_ids).await?;

        if config.channels().is_none() {
            config.attach_channels(ConfigChannels::new());
        }
        let chans = config
            .channels()
            .ok_or_else(|| Error::Internal("no monitor channels".to_string()))?;
        for tasks in task_map.values_mut() {
            for task in tasks.iter_mut() {
                task.config.attach_channels(chans.clone());
                // Masters that finished before the crash feed the node
                // and cluster phases.
                if task.config.is_master && task.config.node.is_ready() {
                    config.add_master(&task.config.node);
                }
            }
        }

        let receivers = config
            .take_receivers()
            .ok_or_else(|| Error::Internal("monitor channels already taken".to_string()))?;
        tokio::spawn(monitor_cluster_state(
            ctx.clone(),
            config.cluster_id.clone(),
            receivers,
            self.kube_service.clone(),
        ));

        let this = Arc::clone(&self);
        let profile = profile.clone();
        tokio::spawn(async move {
            this.provision(ctx, task_map, profile, config, true).await;
        });
        Ok(())
    }

    /// Cancel an in-flight build. The persisted state is left as is;
    /// only the in-memory handle goes away.
    pub fn cancel(&self, cluster_id: &str) -> Result<()> {
        let mut map = self
            .cancel_map
            .lock()
            .map_err(|_| Error::Internal("cancel map poisoned".to_string()))?;
        match map.remove(cluster_id) {
            Some(token) => {
                token.cancel();
                Ok(())
            }
            None => Err(Error::NotFound(format!(
                "cancel handle for cluster {}",
                cluster_id
            ))),
        }
    }

    fn store_cancel(&self, cluster_id: &str, token: CancellationToken) -> Result<()> {
        self.cancel_map
            .lock()
            .map_err(|_| Error::Internal("cancel map poisoned".to_string()))?
            .insert(cluster_id.to_string(), token);
        Ok(())
    }

    /// Create all tasks for the build. Nothing is started here; master
    /// and node task ids later become the machine name suffixes.
    async fn prepare(
        &self,
        provider: CloudProvider,
        master_count: usize,
        node_count: usize,
    ) -> Result<HashMap<TaskRole, Vec<Task>>> {
        let set = self
            .provision_map
            .get(&provider)
            .ok_or_else(|| Error::NotFound(format!("workflow set for provider {}", provider)))?;

        let mut map = HashMap::new();

        if let Some(pre_provision) = set.pre_provision {
            map.insert(
                TaskRole::PreProvision,
                vec![Task::new(pre_provision, self.repository.clone()).await?],
            );
        }

        let mut masters = Vec::with_capacity(master_count);
        for _ in 0..master_count {
            masters.push(Task::new(set.provision_master, self.repository.clone()).await?);
        }
        map.insert(TaskRole::Master, masters);

        let mut nodes = Vec::with_capacity(node_count);
        for _ in 0..node_count {
            nodes.push(Task::new(set.provision_node, self.repository.clone()).await?);
        }
        map.insert(TaskRole::Node, nodes);

        map.insert(
            TaskRole::Cluster,
            vec![Task::new(workflow::CLUSTER, self.repository.clone()).await?],
        );

        Ok(map)
    }

    async fn provision(
        self: Arc<Self>,
        ctx: CancellationToken,
        mut task_map: HashMap<TaskRole, Vec<Task>>,
        profile: Profile,
        mut config: Config,
        resume: bool,
    ) {
        if let Some(mut pre_tasks) = task_map.remove(&TaskRole::PreProvision) {
            if let Some(mut task) = pre_tasks.pop() {
                match self.pre_provision(&ctx, &mut task, &config, resume).await {
                    Ok(updated) => config = updated,
                    Err(err) => {
                        tracing::error!("[TaskProvisioner] pre provisioning cluster: {}", err);
                        return;
                    }
                }
            }
        }

        let master_tasks = task_map.remove(&TaskRole::Master).unwrap_or_default();
        if !master_tasks.is_empty() {
            config.is_master = true;

            // The quorum of masters gates the node phase; the same
            // quorum of failures fails the whole build.
            let quorum = master_tasks.len() / 2 + 1;
            let done = CountdownLatch::new(quorum);
            let fail = CountdownLatch::new(quorum);

            for (index, mut task) in master_tasks.into_iter().enumerate() {
                self.rate_limiter.take().await;

                if let Some(node_profile) = profile.master_profiles.get(index) {
                    config.fill_node_profile(node_profile);
                }
                let mut out = match (self.get_writer)(&task.id) {
                    Ok(out) => out,
                    Err(err) => {
                        tracing::error!("[TaskProvisioner] get writer for {}: {}", task.id, err);
                        fail.count_down();
                        continue;
                    }
                };

                let cfg = config.clone();
                let ctx_task = ctx.clone();
                let done = done.clone();
                let fail = fail.clone();
                tokio::spawn(async move {
                    match run_task(&mut task, ctx_task, cfg, out.as_mut(), resume).await {
                        Ok(()) => {
                            tracing::info!(
                                "[TaskProvisioner] master task {} has finished",
                                task.id
                            );
                            done.count_down();
                        }
                        Err(err) => {
                            tracing::error!(
                                "[TaskProvisioner] master task {} has finished with {}",
                                task.id,
                                err
                            );
                            fail.count_down();
                        }
                    }
                });
            }

            tokio::select! {
                biased;
                _ = ctx.cancelled() => {
                    tracing::error!("[TaskProvisioner] master cluster has not been created: cancelled");
                    return;
                }
                _ = done.wait(&ctx) => {
                    tracing::info!(
                        "[TaskProvisioner] master provisioning for cluster {} has finished successfully",
                        config.cluster_id
                    );
                }
                _ = fail.wait(&ctx) => {
                    config.push_state(KubeState::Failed).await;
                    tracing::error!("[TaskProvisioner] master cluster deployment has been failed");
                    return;
                }
            }
        }

        let node_tasks = task_map.remove(&TaskRole::Node).unwrap_or_default();
        self.run_node_tasks(&ctx, &profile, &mut config, node_tasks, resume)
            .await;

        if let Some(mut cluster_tasks) = task_map.remove(&TaskRole::Cluster) {
            if let Some(task) = cluster_tasks.pop() {
                self.wait_cluster(&ctx, task, &config, resume).await;
            }
        }

        tracing::info!(
            "[TaskProvisioner] cluster {} deployment has finished",
            config.cluster_id
        );
    }

    /// Run the single pre-provision task and hand its mutated config
    /// back through the config channel so the monitor records the cloud
    /// specific settings.
    async fn pre_provision(
        &self,
        ctx: &CancellationToken,
        task: &mut Task,
        config: &Config,
        resume: bool,
    ) -> Result<Config> {
        let mut out = (self.get_writer)(&task.id)
            .map_err(|err| Error::Internal(format!("get writer: {}", err)))?;

        let result = run_task(task, ctx.clone(), config.clone(), out.as_mut(), resume).await;
        match result {
            Ok(()) => {
                tracing::info!("[TaskProvisioner] pre provision {} has finished", task.id);
                config.push_state(KubeState::Provisioning).await;
                task.config.push_config().await;
                Ok(task.config.clone())
            }
            Err(err) => {
                tracing::error!(
                    "[TaskProvisioner] pre provision task {} has finished with {}",
                    task.id,
                    err
                );
                config.push_state(KubeState::Failed).await;
                task.config.push_config().await;
                Err(err)
            }
        }
    }

    async fn run_node_tasks(
        &self,
        ctx: &CancellationToken,
        profile: &Profile,
        config: &mut Config,
        tasks: Vec<Task>,
        resume: bool,
    ) {
        if tasks.is_empty() {
            return;
        }

        config.is_master = false;
        // Node traffic goes through the private network of any ready
        // master.
        let Some(master) = config.get_master() else {
            tracing::error!("[TaskProvisioner] no master available for node provisioning");
            return;
        };
        config.flannel.etcd_host = master.private_ip.clone();

        for (index, mut task) in tasks.into_iter().enumerate() {
            self.rate_limiter.take().await;

            if let Some(node_profile) = profile.nodes_profiles.get(index) {
                config.fill_node_profile(node_profile);
            }
            let mut out = match (self.get_writer)(&task.id) {
                Ok(out) => out,
                Err(err) => {
                    tracing::error!("[TaskProvisioner] get writer for {}: {}", task.id, err);
                    continue;
                }
            };

            let cfg = config.clone();
            let ctx_task = ctx.clone();
            tokio::spawn(async move {
                match run_task(&mut task, ctx_task, cfg, out.as_mut(), resume).await {
                    Ok(()) => {
                        tracing::info!("[TaskProvisioner] node task {} has finished", task.id)
                    }
                    Err(err) => {
                        // Node failures do not abort the cluster.
                        tracing::error!(
                            "[TaskProvisioner] node task {} has finished with {}",
                            task.id,
                            err
                        );
                    }
                }
            });
        }
    }

    /// Run the cluster task against a ready master and settle the final
    /// cluster state.
    async fn wait_cluster(
        &self,
        ctx: &CancellationToken,
        mut task: Task,
        config: &Config,
        resume: bool,
    ) {
        let Some(master) = config.get_master() else {
            config.push_state(KubeState::Failed).await;
            tracing::error!("[TaskProvisioner] no master found, cluster deployment failed");
            return;
        };

        let mut out = match (self.get_writer)(&task.id) {
            Ok(out) => out,
            Err(err) => {
                tracing::error!("[TaskProvisioner] get writer for {}: {}", task.id, err);
                return;
            }
        };

        let mut cfg = config.clone();
        cfg.node = master;
        match run_task(&mut task, ctx.clone(), cfg, out.as_mut(), resume).await {
            Ok(()) => {
                config.push_state(KubeState::Operational).await;
                tracing::info!("[TaskProvisioner] cluster task {} has finished", task.id);
            }
            Err(err) => {
                config.push_state(KubeState::Failed).await;
                tracing::error!(
                    "[TaskProvisioner] cluster task {} has finished with {}",
                    task.id,
                    err
                );
            }
        }
    }

    async fn build_initial_cluster(
        &self,
        profile: &Profile,
        masters: HashMap<String, Machine>,
        nodes: HashMap<String, Machine>,
        config: &Config,
        task_ids: &HashMap<TaskRole, Vec<String>>,
    ) -> Result<()> {
        let tasks = task_ids
            .iter()
            .map(|(role, ids)| (role.to_string(), ids.clone()))
            .collect();

        let kube = Kube {
            id: config.cluster_id.clone(),
            state: KubeState::Prepare,
            name: config.cluster_name.clone(),
            provider: profile.provider,
            account_name: config.cloud_account_name.clone(),
            rbac_enabled: profile.rbac_enabled,
            services_cidr: profile.k8s_services_cidr.clone(),
            region: profile.region.clone(),
            zone: profile.zone.clone(),
            arch: profile.arch.clone(),
            operating_system: profile.operating_system.clone(),
            operating_system_version: profile.ubuntu_version.clone(),
            k8s_version: profile.k8s_version.clone(),
            docker_version: profile.docker_version.clone(),
            helm_version: profile.helm_version.clone(),
            ssh_user: config.ssh.user.clone(),
            ssh_public_key: config.ssh.public_key.clone(),
            bootstrap_public_key: config.ssh.bootstrap_public_key.clone(),
            bootstrap_private_key: String::new(),
            profile_id: profile.id.clone(),
            user: profile.user.clone(),
            password: profile.password.clone(),
            auth: Auth {
                username: config.certificates.username.clone(),
                password: config.certificates.password.clone(),
                ca_cert: config.certificates.ca_cert.clone(),
                ca_key: config.certificates.ca_key.clone(),
                admin_cert: config.certificates.admin_cert.clone(),
                admin_key: config.certificates.admin_key.clone(),
            },
            networking: Networking {
                manager: profile.flannel_version.clone(),
                version: profile.flannel_version.clone(),
                network_type: profile.network_type.clone(),
                cidr: profile.cidr.clone(),
            },
            cloud_spec: profile.cloud_specific_settings.clone(),
            subnets: HashMap::new(),
            masters,
            nodes,
            tasks,
        };

        self.kube_service.create(&kube).await
    }

    async fn deserialize_cluster_tasks(
        &self,
        task_ids: &HashMap<String, Vec<String>>,
    ) -> Result<HashMap<TaskRole, Vec<Task>>> {
        let mut map: HashMap<TaskRole, Vec<Task>> = HashMap::new();
        for (role, ids) in task_ids {
            let role: TaskRole = role.parse()?;
            for id in ids {
                let task = Task::load(id, self.repository.clone()).await?;
                map.entry(role).or_default().push(task);
            }
        }
        Ok(map)
    }
}

/// Fresh runs take the caller's config snapshot; resumed tasks that
/// already made progress keep their persisted config so completed machine
/// state and the reattached runner survive.
async fn run_task(
    task: &mut Task,
    ctx: CancellationToken,
    config: Config,
    out: &mut (dyn Write + Send),
    resume: bool,
) -> Result<()> {
    let started = task
        .step_statuses
        .iter()
        .any(|status| status.status != Status::Todo);
    if resume && started {
        task.rerun(ctx, out).await
    } else {
        let mut config = config;
        config.task_id = task.id.clone();
        task.run(ctx, config, out).await
    }
}

/// Generate the bootstrap key pair and store it on the config.
fn bootstrap_keys(config: &mut Config) -> Result<()> {
    let pair = new_bootstrap_key_pair()?;
    config.ssh.bootstrap_private_key = pair.private;
    config.ssh.bootstrap_public_key = pair.public;
    Ok(())
}

/// Generate the CA (optionally parented) and the admin client pair.
fn bootstrap_certs(config: &mut Config) -> Result<()> {
    let parent = if config.certificates.parent_cert.is_empty() {
        None
    } else {
        Some(CertPair {
            cert: config.certificates.parent_cert.clone(),
            key: config.certificates.parent_key.clone(),
        })
    };

    let ca = new_ca_pair(parent.as_ref())?;
    config.certificates.ca_cert = ca.cert.clone();
    config.certificates.ca_key = ca.key.clone();

    let admin = new_admin_pair(&ca)?;
    config.certificates.admin_cert = admin.cert;
    config.certificates.admin_key = admin.key;
    Ok(())
}

/// Pre-populate planned machines named from the task ids, so the cluster
/// record shows the full topology before any instance exists.
fn planned_machines(
    config: &Config,
    profile: &Profile,
    task_map: &HashMap<TaskRole, Vec<Task>>,
) -> (HashMap<String, Machine>, HashMap<String, Machine>) {
    let mut masters = HashMap::new();
    let mut nodes = HashMap::new();

    for (role, is_master, out) in [
        (TaskRole::Master, true, &mut masters),
        (TaskRole::Node, false, &mut nodes),
    ] {
        for task in task_map.get(&role).map(|t| t.as_slice()).unwrap_or(&[]) {
            let name = make_name(&config.cluster_name, &task.id, is_master);
            out.insert(
                name.clone(),
                Machine {
                    id: String::new(),
                    name,
                    role: if is_master { Role::Master } else { Role::Node },
                    created_at: chrono::Utc::now(),
                    provider: profile.provider,
                    region: profile.region.clone(),
                    size: String::new(),
                    public_ip: String::new(),
                    private_ip: String::new(),
                    state: MachineState::Planned,
                },
            );
        }
    }

    (masters, nodes)
}

fn grab_task_ids(task_map: &HashMap<TaskRole, Vec<Task>>) -> HashMap<TaskRole, Vec<String>> {
    task_map
        .iter()
        .map(|(role, tasks)| (*role, tasks.iter().map(|task| task.id.clone()).collect()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_role_round_trips() {
        for role in [
            TaskRole::PreProvision,
            TaskRole::Master,
            TaskRole::Node,
            TaskRole::Cluster,
        ] {
            let parsed: TaskRole = role.to_string().parse().unwrap();
            assert_eq!(parsed, role);
        }
    }

    #[test]
    fn bootstrap_fills_keys_and_certs() {
        let mut config = Config::default();
        bootstrap_keys(&mut config).unwrap();
        bootstrap_certs(&mut config).unwrap();

        assert!(config.ssh.bootstrap_private_key.contains("PRIVATE KEY"));
        assert!(config.ssh.bootstrap_public_key.contains("PUBLIC KEY"));
        assert!(config.certificates.ca_cert.contains("BEGIN CERTIFICATE"));
        assert!(config.certificates.admin_cert.contains("BEGIN CERTIFICATE"));
    }
}

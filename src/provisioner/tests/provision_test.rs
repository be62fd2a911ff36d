//! Provisioning scenarios against mock cloud clients: happy path,
//! pre-provision failure, master quorum failure and mid-build cancel.

use async_trait::async_trait;
use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use cluster::{
    make_name, ClusterService, CloudProvider, Error, Kube, KubeService, KubeState, Machine,
    MachineState, MemoryStorage, NodeProfile, Profile, Result, Role, Storage,
};
use provisioner::steps::amazon::{AwsInstance, Ec2Api, RunInstanceRequest};
use provisioner::steps::digitalocean::{
    Droplet, DropletCreateRequest, DropletService, GetDropletFn, Networks, NetworkV4, SshKey,
};
use provisioner::steps::gce;
use provisioner::workflow::{register_step, register_workflow, DIGITALOCEAN_MASTER};
use provisioner::{
    Config, ProviderClients, Status, Step, Task, TaskProvisioner, TaskRole, TemplateManager,
    WorkflowSet, WriterFactory,
};

static DO_IDS: AtomicU64 = AtomicU64::new(1);
static DO_FLAKY_CREATES: AtomicUsize = AtomicUsize::new(0);
static AWS_RUN_INSTANCE_CALLS: AtomicUsize = AtomicUsize::new(0);
static BLOCK_CALLS: AtomicUsize = AtomicUsize::new(0);

/// Droplet fake whose behavior is selected through the access token.
struct ScriptedDroplets {
    behavior: String,
}

#[async_trait]
impl DropletService for ScriptedDroplets {
    async fn create(&self, req: &DropletCreateRequest) -> Result<Droplet> {
        if self.behavior == "flaky" && DO_FLAKY_CREATES.fetch_add(1, Ordering::SeqCst) > 0 {
            return Err(Error::TimeoutExceeded);
        }
        Ok(Droplet {
            id: DO_IDS.fetch_add(1, Ordering::SeqCst),
            name: req.name.clone(),
            status: "new".to_string(),
            networks: Networks::default(),
        })
    }

    async fn get(&self, id: u64) -> Result<Droplet> {
        Ok(Droplet {
            id,
            name: "ignored".to_string(),
            status: "active".to_string(),
            networks: Networks {
                v4: vec![
                    NetworkV4 {
                        ip_address: format!("203.0.113.{}", id % 250),
                        kind: "public".to_string(),
                    },
                    NetworkV4 {
                        ip_address: format!("10.0.0.{}", id % 250),
                        kind: "private".to_string(),
                    },
                ],
            },
        })
    }

    async fn list_by_tag(&self, _tag: &str) -> Result<Vec<Droplet>> {
        Ok(Vec::new())
    }

    async fn delete(&self, _id: u64) -> Result<()> {
        Ok(())
    }

    async fn delete_by_tag(&self, _tag: &str) -> Result<()> {
        Ok(())
    }

    async fn register_key(&self, _name: &str, public_key: &str) -> Result<SshKey> {
        Ok(SshKey {
            id: 1,
            fingerprint: "aa:bb:cc:dd".to_string(),
            public_key: public_key.to_string(),
        })
    }
}

/// EC2 fake whose behavior is selected through the access key id.
struct ScriptedEc2 {
    behavior: String,
}

#[async_trait]
impl Ec2Api for ScriptedEc2 {
    async fn create_vpc(&self, _cidr: &str) -> Result<String> {
        if self.behavior == "quota" {
            return Err(Error::provider("aws", "vpc: quota"));
        }
        Ok("vpc-1".to_string())
    }

    async fn describe_availability_zones(&self) -> Result<Vec<String>> {
        Ok(vec!["us-east-1a".to_string()])
    }

    async fn create_subnet(&self, _vpc: &str, az: &str, _cidr: &str) -> Result<String> {
        Ok(format!("subnet-{}", az))
    }

    async fn create_internet_gateway(&self) -> Result<String> {
        Ok("igw-1".to_string())
    }

    async fn attach_internet_gateway(&self, _igw: &str, _vpc: &str) -> Result<()> {
        Ok(())
    }

    async fn create_route_table(&self, _vpc: &str) -> Result<String> {
        Ok("rtb-1".to_string())
    }

    async fn create_default_route(&self, _rt: &str, _igw: &str) -> Result<()> {
        Ok(())
    }

    async fn associate_route_table(&self, _rt: &str, _subnet: &str) -> Result<()> {
        Ok(())
    }

    async fn create_security_group(&self, _vpc: &str, name: &str) -> Result<String> {
        Ok(format!("sg-{}", name))
    }

    async fn authorize_ingress(
        &self,
        _group: &str,
        _from: u16,
        _to: u16,
        _cidr: &str,
    ) -> Result<()> {
        Ok(())
    }

    async fn create_instance_profile(&self, name: &str) -> Result<String> {
        Ok(name.to_string())
    }

    async fn find_image(&self, _owner: &str, _filter: &str) -> Result<String> {
        Ok("ami-1".to_string())
    }

    async fn import_key_pair(&self, name: &str, _public_key: &str) -> Result<String> {
        Ok(name.to_string())
    }

    async fn run_instance(&self, req: &RunInstanceRequest) -> Result<AwsInstance> {
        AWS_RUN_INSTANCE_CALLS.fetch_add(1, Ordering::SeqCst);
        Ok(AwsInstance {
            id: format!("i-{}", req.name),
            state: "pending".to_string(),
            public_ip: None,
            private_ip: None,
        })
    }

    async fn describe_instance(&self, instance_id: &str) -> Result<Option<AwsInstance>> {
        Ok(Some(AwsInstance {
            id: instance_id.to_string(),
            state: "running".to_string(),
            public_ip: Some("203.0.113.99".to_string()),
            private_ip: Some("10.2.1.99".to_string()),
        }))
    }

    async fn describe_instances_by_tag(
        &self,
        _key: &str,
        _value: &str,
    ) -> Result<Vec<AwsInstance>> {
        Ok(Vec::new())
    }

    async fn terminate_instances(&self, ids: &[String]) -> Result<Vec<String>> {
        Ok(ids.to_vec())
    }

    async fn create_tags(&self, _resource: &str, _tags: &[(String, String)]) -> Result<()> {
        Ok(())
    }
}

/// Node step for the cancellation scenario: the first two invocations
/// succeed, the rest park until their context is cancelled.
struct BlockStep;

#[async_trait]
impl Step for BlockStep {
    async fn run(
        &self,
        ctx: &CancellationToken,
        _out: &mut (dyn Write + Send),
        _config: &mut Config,
    ) -> Result<()> {
        let seen = BLOCK_CALLS.fetch_add(1, Ordering::SeqCst);
        if seen < 2 {
            return Ok(());
        }
        ctx.cancelled().await;
        Err(Error::Cancelled)
    }

    fn name(&self) -> &'static str {
        "test_block_step"
    }
}

fn ensure_init() {
    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        let templates = Arc::new(TemplateManager::from_embedded().unwrap());
        let droplets: GetDropletFn = Arc::new(|cfg| {
            Ok(Arc::new(ScriptedDroplets {
                behavior: cfg.access_token.clone(),
            }) as Arc<dyn DropletService>)
        });
        let ec2: provisioner::steps::amazon::GetEc2Fn = Arc::new(|cfg| {
            Ok(Arc::new(ScriptedEc2 {
                behavior: cfg.access_key_id.clone(),
            }) as Arc<dyn Ec2Api>)
        });
        provisioner::steps::init(
            ProviderClients {
                droplets,
                ec2,
                compute: gce::unconfigured_compute_fn(),
            },
            templates,
        );

        register_step(Arc::new(BlockStep));
        register_workflow("test_block_node", &["test_block_step"]);
    });
}

fn discard_writer() -> WriterFactory {
    Arc::new(|_| Ok(Box::new(std::io::sink()) as Box<dyn Write + Send>))
}

fn node_profile() -> NodeProfile {
    let mut profile = NodeProfile::new();
    profile.insert("size".to_string(), "s-2vcpu-4gb".to_string());
    profile.insert("image".to_string(), "ubuntu-16-04-x64".to_string());
    profile
}

fn do_profile(masters: usize, nodes: usize) -> Profile {
    Profile {
        provider: CloudProvider::DigitalOcean,
        region: "fra1".to_string(),
        k8s_version: "1.11.5".to_string(),
        master_profiles: (0..masters).map(|_| node_profile()).collect(),
        nodes_profiles: (0..nodes).map(|_| node_profile()).collect(),
        ..Profile::default()
    }
}

fn new_provisioner(
    repo: Arc<dyn Storage>,
    service: Arc<KubeService>,
) -> Arc<TaskProvisioner> {
    Arc::new(
        TaskProvisioner::new(
            repo,
            service,
            Duration::from_millis(10),
            std::env::temp_dir().join("provision-test-logs"),
        )
        .with_writer_factory(discard_writer()),
    )
}

fn do_credentials(token: &str) -> HashMap<String, String> {
    let mut creds = HashMap::new();
    creds.insert("accessToken".to_string(), token.to_string());
    creds
}

async fn wait_for_state(service: &KubeService, id: &str, state: KubeState) -> Kube {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(300);
    loop {
        if let Ok(kube) = service.get(id).await {
            if kube.state == state {
                return kube;
            }
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for cluster state {}",
            state
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test(start_paused = true)]
async fn digitalocean_happy_path_reaches_operational() {
    ensure_init();
    let repo: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    let service = Arc::new(KubeService::new(repo.clone()));
    let provisioner = new_provisioner(repo.clone(), service.clone());

    let profile = do_profile(1, 1);
    let mut config = Config::new("prod", "acc", &profile);
    config.set_credentials(&do_credentials("tok")).unwrap();
    config.dry_run = true;

    let ctx = CancellationToken::new();
    let started = provisioner
        .clone()
        .provision_cluster(&ctx, &profile, config)
        .await
        .unwrap();

    assert_eq!(started.cluster_id.len(), 8);
    assert_eq!(started.tasks[&TaskRole::Master].len(), 1);
    assert_eq!(started.tasks[&TaskRole::Node].len(), 1);
    assert_eq!(started.tasks[&TaskRole::Cluster].len(), 1);
    assert!(!started.tasks.contains_key(&TaskRole::PreProvision));

    // The initial record carries planned machines named from task ids.
    let initial = service.get(&started.cluster_id).await.unwrap();
    let master_task_id = &started.tasks[&TaskRole::Master][0];
    assert!(initial
        .masters
        .contains_key(&make_name("prod", master_task_id, true)));

    let mut kube = wait_for_state(&service, &started.cluster_id, KubeState::Operational).await;
    // The cluster task settles while node runners may still be
    // finishing; wait until both roles report a ready machine.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(300);
    while !(kube.masters.values().any(|m| m.is_ready())
        && kube.nodes.values().any(|m| m.is_ready()))
    {
        assert!(
            tokio::time::Instant::now() < deadline,
            "machines never became ready"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
        kube = service.get(&started.cluster_id).await.unwrap();
    }

    // Restart of a finished build resumes every task past its completed
    // steps and settles operational again.
    let mut seeded = kube.clone();
    seeded.state = KubeState::Provisioning;
    service.create(&seeded).await.unwrap();

    let mut restart_config = Config::new("prod", "acc", &profile);
    restart_config.set_credentials(&do_credentials("tok")).unwrap();
    restart_config.dry_run = true;
    restart_config.cluster_id = started.cluster_id.clone();
    provisioner
        .clone()
        .restart_cluster_provisioning(&profile, restart_config, &kube.tasks)
        .await
        .unwrap();

    wait_for_state(&service, &started.cluster_id, KubeState::Operational).await;
}

#[tokio::test(start_paused = true)]
async fn aws_pre_provision_failure_aborts_before_masters() {
    ensure_init();
    let repo: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    let service = Arc::new(KubeService::new(repo.clone()));
    let provisioner = new_provisioner(repo.clone(), service.clone());

    let mut profile = do_profile(2, 1);
    profile.provider = CloudProvider::Aws;

    let mut config = Config::new("prod", "acc", &profile);
    let mut creds = HashMap::new();
    creds.insert("access_key_id".to_string(), "quota".to_string());
    creds.insert("secret_access_key".to_string(), "secret".to_string());
    config.set_credentials(&creds).unwrap();
    config.dry_run = true;

    let ctx = CancellationToken::new();
    let started = provisioner
        .clone()
        .provision_cluster(&ctx, &profile, config)
        .await
        .unwrap();
    assert_eq!(started.tasks[&TaskRole::PreProvision].len(), 1);

    wait_for_state(&service, &started.cluster_id, KubeState::Failed).await;

    // No machine was launched and no master task got to run.
    assert_eq!(AWS_RUN_INSTANCE_CALLS.load(Ordering::SeqCst), 0);
    for id in &started.tasks[&TaskRole::Master] {
        let task = Task::load(id, repo.clone()).await.unwrap();
        assert!(task
            .step_statuses
            .iter()
            .all(|status| status.status == Status::Todo));
    }
}

#[tokio::test(start_paused = true)]
async fn master_quorum_failure_fails_cluster_without_nodes() {
    ensure_init();
    let repo: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    let service = Arc::new(KubeService::new(repo.clone()));
    let provisioner = new_provisioner(repo.clone(), service.clone());

    DO_FLAKY_CREATES.store(0, Ordering::SeqCst);
    let profile = do_profile(3, 2);
    let mut config = Config::new("prod", "acc", &profile);
    config.set_credentials(&do_credentials("flaky")).unwrap();
    config.dry_run = true;

    let ctx = CancellationToken::new();
    let started = provisioner
        .clone()
        .provision_cluster(&ctx, &profile, config)
        .await
        .unwrap();

    wait_for_state(&service, &started.cluster_id, KubeState::Failed).await;

    // One master came up, two failed, which is past the quorum of two.
    // The surviving master may still be finishing its install steps when
    // the state flips, so poll until every master task settled.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(300);
    loop {
        let mut fully_successful = 0;
        let mut errored = 0;
        for id in &started.tasks[&TaskRole::Master] {
            let task = Task::load(id, repo.clone()).await.unwrap();
            if task
                .step_statuses
                .iter()
                .all(|status| status.status == Status::Success)
            {
                fully_successful += 1;
            } else if task
                .step_statuses
                .iter()
                .any(|status| status.status == Status::Error)
            {
                errored += 1;
            }
        }
        if fully_successful == 1 && errored == 2 {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "master tasks never settled: {} successful {} errored",
            fully_successful,
            errored
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    // Node tasks never started.
    for id in &started.tasks[&TaskRole::Node] {
        let task = Task::load(id, repo.clone()).await.unwrap();
        assert!(task
            .step_statuses
            .iter()
            .all(|status| status.status == Status::Todo));
    }
}

#[tokio::test]
async fn cancel_mid_node_build_stops_remaining_tasks() {
    ensure_init();
    let repo: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    let service = Arc::new(KubeService::new(repo.clone()));

    BLOCK_CALLS.store(0, Ordering::SeqCst);
    let mut provision_map = HashMap::new();
    provision_map.insert(
        CloudProvider::DigitalOcean,
        WorkflowSet {
            pre_provision: None,
            provision_master: DIGITALOCEAN_MASTER,
            provision_node: "test_block_node",
        },
    );
    let provisioner = Arc::new(
        TaskProvisioner::new(
            repo.clone(),
            service.clone(),
            Duration::from_millis(10),
            std::env::temp_dir().join("provision-test-logs"),
        )
        .with_writer_factory(discard_writer())
        .with_provision_map(provision_map),
    );

    // An operational cluster with one ready master.
    let master = Machine {
        name: "prod-master-aaaa".to_string(),
        role: Role::Master,
        state: MachineState::Active,
        public_ip: "203.0.113.4".to_string(),
        private_ip: "10.0.0.4".to_string(),
        ..Machine::default()
    };
    let mut kube = Kube {
        id: "s5clustr".to_string(),
        name: "prod".to_string(),
        state: KubeState::Operational,
        provider: CloudProvider::DigitalOcean,
        ..Kube::default()
    };
    kube.masters.insert(master.name.clone(), master);
    service.create(&kube).await.unwrap();

    let mut config = Config::new("prod", "acc", &do_profile(0, 0));
    config.set_credentials(&do_credentials("tok")).unwrap();
    config.dry_run = true;

    let node_profiles: Vec<NodeProfile> = (0..5).map(|_| node_profile()).collect();
    let ctx = CancellationToken::new();
    let task_ids = provisioner
        .clone()
        .provision_nodes(&ctx, &node_profiles, &kube, config)
        .await
        .unwrap();
    assert_eq!(task_ids.len(), 5);

    // Wait until the first two finished and a third runner is parked.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while BLOCK_CALLS.load(Ordering::SeqCst) < 3 {
        assert!(
            tokio::time::Instant::now() < deadline,
            "node runners never started"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    provisioner.cancel("s5clustr").unwrap();
    // The handle is removed with the cancellation.
    assert!(matches!(
        provisioner.cancel("s5clustr"),
        Err(Error::NotFound(_))
    ));

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let mut successful = 0;
        let mut cancelled = 0;
        for id in &task_ids {
            let task = Task::load(id, repo.clone()).await.unwrap();
            if task
                .step_statuses
                .iter()
                .all(|status| status.status == Status::Success)
            {
                successful += 1;
            } else if task
                .step_statuses
                .iter()
                .any(|status| status.status == Status::Cancelled)
            {
                cancelled += 1;
            }
        }
        if successful == 2 && cancelled == 3 {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "tasks never settled, {} successful {} cancelled",
            successful,
            cancelled
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    // The cluster state is left as last written, not forced to failed.
    assert_eq!(
        service.get("s5clustr").await.unwrap().state,
        KubeState::Operational
    );
}

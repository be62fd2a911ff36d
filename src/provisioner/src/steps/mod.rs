//! Concrete steps and their process-wide registration.
//!
//! `init` wires every step against the supplied cloud client factories and
//! templates, then assembles the named workflows. It runs once per
//! process; calling it twice is a startup bug and panics.

pub mod amazon;
pub mod digitalocean;
pub mod gce;
pub mod kube;
pub mod ssh;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::template::TemplateManager;
use crate::workflow::{self, register_step, register_workflow};

/// Cloud client factories the steps resolve per call from the provider
/// section of the config. The concrete AWS and GCE clients live outside
/// the core; production wiring supplies them, tests supply mocks.
pub struct ProviderClients {
    pub droplets: digitalocean::GetDropletFn,
    pub ec2: amazon::GetEc2Fn,
    pub compute: gce::GetComputeFn,
}

impl Default for ProviderClients {
    fn default() -> Self {
        ProviderClients {
            droplets: digitalocean::default_droplet_fn(),
            ec2: amazon::unconfigured_ec2_fn(),
            compute: gce::unconfigured_compute_fn(),
        }
    }
}

static INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Step create/poll timing defaults.
const MACHINE_CHECK_PERIOD: Duration = Duration::from_secs(5);
const MACHINE_TIMEOUT: Duration = Duration::from_secs(300);

/// Register every step and workflow. Fatal when called twice.
pub fn init(clients: ProviderClients, templates: Arc<TemplateManager>) {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        panic!("steps already registered");
    }

    for name in [
        kube::DOWNLOAD_K8S_BINARY,
        kube::WRITE_CERTIFICATES,
        kube::ADD_AUTHORIZED_KEYS,
        kube::CNI_TOOLS,
        kube::KUBELET,
        kube::KUBEPROXY,
        kube::MANIFEST,
        kube::KUBEADM,
        kube::DRAIN,
        kube::CONFIGMAP,
        kube::post_start::STEP_NAME,
        kube::cluster_check::STEP_NAME,
    ] {
        if templates.get(name).is_err() {
            panic!("template {} not found", name);
        }
    }

    // Machine lifecycle first, the install family depends on it.
    register_step(Arc::new(digitalocean::register_key::RegisterKeyStep::new(
        clients.droplets.clone(),
    )));
    register_step(Arc::new(digitalocean::create_machine::CreateMachineStep::new(
        clients.droplets.clone(),
        MACHINE_CHECK_PERIOD,
        MACHINE_TIMEOUT,
    )));
    register_step(Arc::new(digitalocean::delete_machine::DeleteMachineStep::new(
        clients.droplets.clone(),
    )));
    register_step(Arc::new(
        digitalocean::delete_cluster::DeleteClusterMachinesStep::new(clients.droplets.clone()),
    ));

    register_step(Arc::new(amazon::create_vpc::CreateVpcStep::new(
        clients.ec2.clone(),
    )));
    register_step(Arc::new(amazon::create_subnets::CreateSubnetsStep::new(
        clients.ec2.clone(),
    )));
    register_step(Arc::new(
        amazon::create_internet_gateway::CreateInternetGatewayStep::new(clients.ec2.clone()),
    ));
    register_step(Arc::new(amazon::create_route_table::CreateRouteTableStep::new(
        clients.ec2.clone(),
    )));
    register_step(Arc::new(
        amazon::create_security_groups::CreateSecurityGroupsStep::new(clients.ec2.clone()),
    ));
    register_step(Arc::new(
        amazon::create_instance_profiles::CreateInstanceProfilesStep::new(clients.ec2.clone()),
    ));
    register_step(Arc::new(amazon::find_image::FindImageStep::new(
        clients.ec2.clone(),
    )));
    register_step(Arc::new(amazon::import_key_pair::ImportKeyPairStep::new(
        clients.ec2.clone(),
    )));
    register_step(Arc::new(amazon::create_machine::CreateMachineStep::new(
        clients.ec2.clone(),
        MACHINE_CHECK_PERIOD,
        MACHINE_TIMEOUT,
    )));
    register_step(Arc::new(amazon::delete_machine::DeleteMachineStep::new(
        clients.ec2.clone(),
    )));
    register_step(Arc::new(
        amazon::delete_cluster_machines::DeleteClusterMachinesStep::new(clients.ec2.clone()),
    ));

    register_step(Arc::new(gce::create_instance::CreateInstanceStep::new(
        clients.compute.clone(),
        MACHINE_CHECK_PERIOD,
        MACHINE_TIMEOUT,
    )));
    register_step(Arc::new(gce::delete_node::DeleteNodeStep::new(
        clients.compute.clone(),
    )));
    register_step(Arc::new(gce::delete_cluster::DeleteClusterStep::new(
        clients.compute.clone(),
    )));

    register_step(Arc::new(ssh::SshStep::new()));

    for step in kube::template_steps(&templates) {
        register_step(step);
    }
    register_step(Arc::new(kube::post_start::PostStartStep::new(
        templates.clone(),
    )));
    register_step(Arc::new(kube::cluster_check::ClusterCheckStep::new(
        templates.clone(),
    )));

    register_workflows();
}

fn register_workflows() {
    let master_install = [
        ssh::STEP_NAME,
        kube::DOWNLOAD_K8S_BINARY,
        kube::WRITE_CERTIFICATES,
        kube::ADD_AUTHORIZED_KEYS,
        kube::CNI_TOOLS,
        kube::KUBELET,
        kube::MANIFEST,
        kube::KUBEADM,
        kube::post_start::STEP_NAME,
    ];
    let node_install = [
        ssh::STEP_NAME,
        kube::DOWNLOAD_K8S_BINARY,
        kube::WRITE_CERTIFICATES,
        kube::ADD_AUTHORIZED_KEYS,
        kube::CNI_TOOLS,
        kube::KUBELET,
        kube::KUBEPROXY,
        kube::post_start::STEP_NAME,
    ];

    // DigitalOcean machines reference an account SSH key, so the key is
    // registered before the droplet exists.
    let mut do_master = vec![
        digitalocean::register_key::STEP_NAME,
        digitalocean::create_machine::STEP_NAME,
    ];
    do_master.extend_from_slice(&master_install);
    let mut do_node = vec![
        digitalocean::register_key::STEP_NAME,
        digitalocean::create_machine::STEP_NAME,
    ];
    do_node.extend_from_slice(&node_install);

    register_workflow(workflow::DIGITALOCEAN_MASTER, &do_master);
    register_workflow(workflow::DIGITALOCEAN_NODE, &do_node);
    register_workflow(
        workflow::DIGITALOCEAN_DELETE_NODE,
        &[kube::DRAIN, digitalocean::delete_machine::STEP_NAME],
    );
    register_workflow(
        workflow::DIGITALOCEAN_DELETE_CLUSTER,
        &[digitalocean::delete_cluster::STEP_NAME],
    );

    let mut aws_master = vec![amazon::create_machine::STEP_NAME];
    aws_master.extend_from_slice(&master_install);
    let mut aws_node = vec![amazon::create_machine::STEP_NAME];
    aws_node.extend_from_slice(&node_install);

    register_workflow(workflow::AWS_MASTER, &aws_master);
    register_workflow(workflow::AWS_NODE, &aws_node);
    register_workflow(
        workflow::AWS_PRE_PROVISION,
        &[
            amazon::create_vpc::STEP_NAME,
            amazon::create_subnets::STEP_NAME,
            amazon::create_internet_gateway::STEP_NAME,
            amazon::create_route_table::STEP_NAME,
            amazon::create_security_groups::STEP_NAME,
            amazon::create_instance_profiles::STEP_NAME,
            amazon::find_image::STEP_NAME,
            amazon::import_key_pair::STEP_NAME,
        ],
    );
    register_workflow(
        workflow::AWS_DELETE_NODE,
        &[kube::DRAIN, amazon::delete_machine::STEP_NAME],
    );
    register_workflow(
        workflow::AWS_DELETE_CLUSTER,
        &[amazon::delete_cluster_machines::STEP_NAME],
    );

    let mut gce_master = vec![gce::create_instance::STEP_NAME];
    gce_master.extend_from_slice(&master_install);
    let mut gce_node = vec![gce::create_instance::STEP_NAME];
    gce_node.extend_from_slice(&node_install);

    register_workflow(workflow::GCE_MASTER, &gce_master);
    register_workflow(workflow::GCE_NODE, &gce_node);
    register_workflow(
        workflow::GCE_DELETE_NODE,
        &[kube::DRAIN, gce::delete_node::STEP_NAME],
    );
    register_workflow(
        workflow::GCE_DELETE_CLUSTER,
        &[gce::delete_cluster::STEP_NAME],
    );

    register_workflow(
        workflow::CLUSTER,
        &[
            ssh::STEP_NAME,
            kube::cluster_check::STEP_NAME,
            kube::CONFIGMAP,
        ],
    );
}

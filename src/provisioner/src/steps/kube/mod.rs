//! Kubernetes install steps.
//!
//! Each one renders a shell template with a projection of the config and
//! runs it on the target machine through the attached runner. The polling
//! steps (post-start, cluster-check) live in their own modules.

pub mod cluster_check;
pub mod post_start;

use async_trait::async_trait;
use serde_json::{json, Value};
use std::io::Write;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use cluster::{Error, Result};

use crate::config::Config;
use crate::runner::Runner;
use crate::template::{run_template, TemplateManager};
use crate::workflow::Step;

pub const DOWNLOAD_K8S_BINARY: &str = "download_kubernetes_binary";
pub const WRITE_CERTIFICATES: &str = "write_certificates";
pub const ADD_AUTHORIZED_KEYS: &str = "add_authorized_keys";
pub const CNI_TOOLS: &str = "cni_tools";
pub const KUBELET: &str = "kubelet";
pub const KUBEPROXY: &str = "kubeproxy";
pub const MANIFEST: &str = "manifest";
pub const KUBEADM: &str = "kubeadm";
pub const DRAIN: &str = "drain";
pub const CONFIGMAP: &str = "configmap";

/// A step whose body is a shell template plus a projection of the config
/// into template data. The shared scaffolding for the whole install
/// family.
pub struct TemplateStep {
    name: &'static str,
    description: &'static str,
    depends: &'static [&'static str],
    templates: Arc<TemplateManager>,
    project: fn(&Config) -> Value,
}

impl TemplateStep {
    pub fn new(
        name: &'static str,
        description: &'static str,
        depends: &'static [&'static str],
        templates: Arc<TemplateManager>,
        project: fn(&Config) -> Value,
    ) -> Self {
        TemplateStep {
            name,
            description,
            depends,
            templates,
            project,
        }
    }
}

pub(crate) fn require_runner(config: &Config) -> Result<Arc<dyn Runner>> {
    config.runner.clone().ok_or_else(|| {
        Error::InvalidArguments("no runner attached, the ssh step must run first".to_string())
    })
}

#[async_trait]
impl Step for TemplateStep {
    async fn run(
        &self,
        ctx: &CancellationToken,
        out: &mut (dyn Write + Send),
        config: &mut Config,
    ) -> Result<()> {
        let runner = require_runner(config)?;
        let data = (self.project)(config);
        run_template(ctx, &self.templates, self.name, runner.as_ref(), out, &data).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn description(&self) -> &'static str {
        self.description
    }

    fn depends(&self) -> Vec<&'static str> {
        self.depends.to_vec()
    }
}

/// All plain template steps, in registration order. Dependencies only
/// reference steps earlier in the list or the machine/ssh steps.
pub fn template_steps(templates: &Arc<TemplateManager>) -> Vec<Arc<dyn Step>> {
    vec![
        Arc::new(TemplateStep::new(
            DOWNLOAD_K8S_BINARY,
            "downloads kubelet, kube-proxy and kubectl",
            &["ssh"],
            templates.clone(),
            project_download,
        )),
        Arc::new(TemplateStep::new(
            WRITE_CERTIFICATES,
            "writes the CA and admin certificates to the machine",
            &["ssh"],
            templates.clone(),
            project_certificates,
        )),
        Arc::new(TemplateStep::new(
            ADD_AUTHORIZED_KEYS,
            "adds operator and bootstrap public keys to authorized_keys",
            &["ssh"],
            templates.clone(),
            project_authorized_keys,
        )),
        Arc::new(TemplateStep::new(
            CNI_TOOLS,
            "installs the CNI plugins",
            &["ssh"],
            templates.clone(),
            project_cni,
        )),
        Arc::new(TemplateStep::new(
            KUBELET,
            "configures and starts the kubelet",
            &[DOWNLOAD_K8S_BINARY],
            templates.clone(),
            project_kubelet,
        )),
        Arc::new(TemplateStep::new(
            KUBEPROXY,
            "configures and starts kube-proxy",
            &[DOWNLOAD_K8S_BINARY],
            templates.clone(),
            project_kubeproxy,
        )),
        Arc::new(TemplateStep::new(
            MANIFEST,
            "writes control plane static pod manifests",
            &[KUBELET],
            templates.clone(),
            project_manifest,
        )),
        Arc::new(TemplateStep::new(
            KUBEADM,
            "runs kubeadm init or join",
            &[KUBELET],
            templates.clone(),
            project_kubeadm,
        )),
        Arc::new(TemplateStep::new(
            DRAIN,
            "drains a machine before removal",
            &[],
            templates.clone(),
            project_drain,
        )),
        Arc::new(TemplateStep::new(
            CONFIGMAP,
            "publishes cluster metadata as a config map",
            &[],
            templates.clone(),
            project_configmap,
        )),
    ]
}

fn project_download(config: &Config) -> Value {
    json!({
        "k8s_version": config.k8s_version,
        "arch": config.arch,
        "operating_system": config.operating_system,
    })
}

fn project_certificates(config: &Config) -> Value {
    json!({
        "ca_cert": config.certificates.ca_cert,
        "ca_key": config.certificates.ca_key,
        "admin_cert": config.certificates.admin_cert,
        "admin_key": config.certificates.admin_key,
    })
}

fn project_authorized_keys(config: &Config) -> Value {
    json!({
        "user_name": config.ssh.user,
        "public_key": config.ssh.public_key,
        "bootstrap_public_key": config.ssh.bootstrap_public_key,
    })
}

fn project_cni(config: &Config) -> Value {
    json!({ "arch": config.arch })
}

fn project_kubelet(config: &Config) -> Value {
    json!({
        "private_ip": config.node.private_ip,
        "node_name": config.node.name,
    })
}

fn project_kubeproxy(config: &Config) -> Value {
    json!({
        "master_private_ip": config.flannel.etcd_host,
        "api_port": config.post_start.port,
    })
}

fn project_manifest(config: &Config) -> Value {
    json!({
        "is_master": config.is_master,
        "k8s_version": config.k8s_version,
        "private_ip": config.node.private_ip,
        "services_cidr": config.services_cidr,
        "rbac_enabled": config.rbac_enabled,
        "api_port": config.post_start.port,
    })
}

fn project_kubeadm(config: &Config) -> Value {
    json!({
        "is_master": config.is_master,
        "private_ip": config.node.private_ip,
        "pod_cidr": config.flannel.network,
        "services_cidr": config.services_cidr,
        "k8s_version": config.k8s_version,
        "master_private_ip": config.flannel.etcd_host,
        "api_port": config.post_start.port,
    })
}

fn project_drain(config: &Config) -> Value {
    json!({ "node_name": config.node.name })
}

fn project_configmap(config: &Config) -> Value {
    json!({
        "cluster_id": config.cluster_id,
        "cluster_name": config.cluster_name,
        "provider": config.provider.to_string(),
        "k8s_version": config.k8s_version,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::DryRunner;

    fn manager() -> Arc<TemplateManager> {
        Arc::new(TemplateManager::from_embedded().unwrap())
    }

    #[tokio::test]
    async fn template_step_renders_config_projection() {
        let templates = manager();
        let step = TemplateStep::new(
            KUBELET,
            "",
            &[],
            templates.clone(),
            project_kubelet,
        );

        let runner = Arc::new(DryRunner::new());
        let mut config = Config::default();
        config.node.private_ip = "10.0.0.9".to_string();
        config.node.name = "prod-node-abcd".to_string();
        config.runner = Some(runner.clone());

        let ctx = CancellationToken::new();
        let mut sink = Vec::new();
        step.run(&ctx, &mut sink, &mut config).await.unwrap();

        let scripts = runner.scripts();
        assert_eq!(scripts.len(), 1);
        assert!(scripts[0].contains("10.0.0.9"));
        assert!(scripts[0].contains("prod-node-abcd"));
    }

    #[tokio::test]
    async fn missing_runner_is_invalid_arguments() {
        let step = TemplateStep::new(KUBELET, "", &[], manager(), project_kubelet);
        let ctx = CancellationToken::new();
        let mut sink = Vec::new();
        let mut config = Config::default();

        let err = step.run(&ctx, &mut sink, &mut config).await.unwrap_err();
        assert!(matches!(err, Error::InvalidArguments(_)));
    }
}

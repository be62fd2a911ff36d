//! Cloud specific settings round-trip between config and cluster record.

use cluster::{clouds, CloudProvider, Kube};

use crate::config::Config;

/// Copy provider artifacts and bootstrap key material from the config
/// onto the cluster record. Called by the monitor when the pre-provision
/// phase hands its mutated config back.
pub fn update_cloud_specific_data(kube: &mut Kube, config: &Config) {
    tracing::debug!(
        "[Monitor] update cloud specific data for kube {}",
        config.cluster_id
    );

    kube.bootstrap_private_key = config.ssh.bootstrap_private_key.clone();
    kube.ssh_public_key = config.ssh.public_key.clone();

    let mut settings = std::collections::HashMap::new();
    settings.insert(
        clouds::SSH_BOOTSTRAP_PRIVATE_KEY.to_string(),
        config.ssh.bootstrap_private_key.clone(),
    );
    settings.insert(
        clouds::SSH_USER_PROVIDED_PUBLIC_KEY.to_string(),
        config.ssh.public_key.clone(),
    );

    match config.provider {
        CloudProvider::Aws => {
            kube.subnets = config.aws.subnets.clone();
            settings.insert(
                clouds::AWS_AZ.to_string(),
                config.aws.availability_zone.clone(),
            );
            settings.insert(clouds::AWS_VPC_CIDR.to_string(), config.aws.vpc_cidr.clone());
            settings.insert(clouds::AWS_VPC_ID.to_string(), config.aws.vpc_id.clone());
            settings.insert(
                clouds::AWS_SUBNET_ID.to_string(),
                config.aws.subnet_id.clone(),
            );
            settings.insert(
                clouds::AWS_KEYPAIR_NAME.to_string(),
                config.aws.keypair_name.clone(),
            );
            settings.insert(
                clouds::AWS_MASTERS_SECGROUP_ID.to_string(),
                config.aws.masters_security_group_id.clone(),
            );
            settings.insert(
                clouds::AWS_NODES_SECGROUP_ID.to_string(),
                config.aws.nodes_security_group_id.clone(),
            );
            settings.insert(
                clouds::AWS_ROUTE_TABLE_ID.to_string(),
                config.aws.route_table_id.clone(),
            );
            settings.insert(
                clouds::AWS_INTERNET_GATEWAY_ID.to_string(),
                config.aws.internet_gateway_id.clone(),
            );
            settings.insert(
                clouds::AWS_MASTER_INSTANCE_PROFILE.to_string(),
                config.aws.masters_instance_profile.clone(),
            );
            settings.insert(
                clouds::AWS_NODE_INSTANCE_PROFILE.to_string(),
                config.aws.nodes_instance_profile.clone(),
            );
            settings.insert(clouds::AWS_IMAGE_ID.to_string(), config.aws.image_id.clone());
        }
        CloudProvider::DigitalOcean => {
            // Droplet keys are deleted by fingerprint later, the record
            // keeps the public half and the fingerprint for that.
            kube.bootstrap_public_key = config.ssh.bootstrap_public_key.clone();
            settings.insert(
                clouds::DO_KEY_FINGERPRINT.to_string(),
                config.digitalocean.key_fingerprint.clone(),
            );
        }
        _ => {}
    }

    kube.cloud_spec = settings;
}

/// Re-hydrate a config from the settings persisted on the cluster
/// record. The add-nodes and restart flows go through this before any
/// task runs.
pub fn load_cloud_specific_data(kube: &Kube, config: &mut Config) {
    if let Some(key) = kube.cloud_spec.get(clouds::SSH_BOOTSTRAP_PRIVATE_KEY) {
        config.ssh.bootstrap_private_key = key.clone();
    } else if !kube.bootstrap_private_key.is_empty() {
        config.ssh.bootstrap_private_key = kube.bootstrap_private_key.clone();
    }
    if let Some(key) = kube.cloud_spec.get(clouds::SSH_USER_PROVIDED_PUBLIC_KEY) {
        config.ssh.public_key = key.clone();
    }
    if !kube.bootstrap_public_key.is_empty() {
        config.ssh.bootstrap_public_key = kube.bootstrap_public_key.clone();
    }

    if config.provider == CloudProvider::DigitalOcean {
        if let Some(fingerprint) = kube.cloud_spec.get(clouds::DO_KEY_FINGERPRINT) {
            config.digitalocean.key_fingerprint = fingerprint.clone();
        }
    }

    if config.provider == CloudProvider::Aws {
        config.aws.subnets = kube.subnets.clone();
        let aws = &mut config.aws;
        let spec = &kube.cloud_spec;
        for (field, key) in [
            (&mut aws.availability_zone, clouds::AWS_AZ),
            (&mut aws.vpc_cidr, clouds::AWS_VPC_CIDR),
            (&mut aws.vpc_id, clouds::AWS_VPC_ID),
            (&mut aws.subnet_id, clouds::AWS_SUBNET_ID),
            (&mut aws.keypair_name, clouds::AWS_KEYPAIR_NAME),
            (
                &mut aws.masters_security_group_id,
                clouds::AWS_MASTERS_SECGROUP_ID,
            ),
            (
                &mut aws.nodes_security_group_id,
                clouds::AWS_NODES_SECGROUP_ID,
            ),
            (&mut aws.route_table_id, clouds::AWS_ROUTE_TABLE_ID),
            (
                &mut aws.internet_gateway_id,
                clouds::AWS_INTERNET_GATEWAY_ID,
            ),
            (
                &mut aws.masters_instance_profile,
                clouds::AWS_MASTER_INSTANCE_PROFILE,
            ),
            (
                &mut aws.nodes_instance_profile,
                clouds::AWS_NODE_INSTANCE_PROFILE,
            ),
            (&mut aws.image_id, clouds::AWS_IMAGE_ID),
        ] {
            if let Some(value) = spec.get(key) {
                *field = value.clone();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aws_settings_round_trip() {
        let mut config = Config::default();
        config.provider = CloudProvider::Aws;
        config.cluster_id = "abcd1234".to_string();
        config.aws.vpc_id = "vpc-1".to_string();
        config.aws.vpc_cidr = "10.2.0.0/16".to_string();
        config.aws.keypair_name = "prod-key".to_string();
        config.ssh.bootstrap_private_key = "private-pem".to_string();
        config
            .aws
            .subnets
            .insert("us-east-1a".to_string(), "subnet-a".to_string());

        let mut kube = Kube::default();
        update_cloud_specific_data(&mut kube, &config);
        assert_eq!(kube.cloud_spec.get(clouds::AWS_VPC_ID).unwrap(), "vpc-1");
        assert_eq!(kube.subnets.len(), 1);

        let mut restored = Config::default();
        restored.provider = CloudProvider::Aws;
        load_cloud_specific_data(&kube, &mut restored);
        assert_eq!(restored.aws.vpc_id, "vpc-1");
        assert_eq!(restored.aws.vpc_cidr, "10.2.0.0/16");
        assert_eq!(restored.aws.keypair_name, "prod-key");
        assert_eq!(restored.ssh.bootstrap_private_key, "private-pem");
        assert_eq!(restored.aws.subnets.len(), 1);
    }

    #[test]
    fn digitalocean_keeps_bootstrap_key_and_fingerprint() {
        let mut config = Config::default();
        config.provider = CloudProvider::DigitalOcean;
        config.ssh.bootstrap_public_key = "public-pem".to_string();
        config.digitalocean.key_fingerprint = "aa:bb:cc".to_string();

        let mut kube = Kube::default();
        update_cloud_specific_data(&mut kube, &config);
        assert_eq!(kube.bootstrap_public_key, "public-pem");
        assert_eq!(
            kube.cloud_spec.get(clouds::DO_KEY_FINGERPRINT).unwrap(),
            "aa:bb:cc"
        );

        let mut restored = Config::default();
        restored.provider = CloudProvider::DigitalOcean;
        load_cloud_specific_data(&kube, &mut restored);
        assert_eq!(restored.ssh.bootstrap_public_key, "public-pem");
        assert_eq!(restored.digitalocean.key_fingerprint, "aa:bb:cc");
    }
}

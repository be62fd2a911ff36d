//! Imports the bootstrap public key as an EC2 key pair.

use async_trait::async_trait;
use std::io::Write;
use tokio_util::sync::CancellationToken;

use cluster::{Error, Result};

use crate::config::Config;
use crate::workflow::Step;

use super::GetEc2Fn;

pub const STEP_NAME: &str = "aws_import_key_pair";

pub struct ImportKeyPairStep {
    get_ec2: GetEc2Fn,
}

impl ImportKeyPairStep {
    pub fn new(get_ec2: GetEc2Fn) -> Self {
        ImportKeyPairStep { get_ec2 }
    }
}

#[async_trait]
impl Step for ImportKeyPairStep {
    async fn run(
        &self,
        _ctx: &CancellationToken,
        out: &mut (dyn Write + Send),
        config: &mut Config,
    ) -> Result<()> {
        if !config.aws.keypair_name.is_empty() {
            tracing::info!(
                "[{}] key pair {} already imported, skipping",
                STEP_NAME,
                config.aws.keypair_name
            );
            return Ok(());
        }
        if config.ssh.bootstrap_public_key.is_empty() {
            return Err(Error::InvalidArguments(
                "aws_import_key_pair needs the bootstrap public key".to_string(),
            ));
        }

        let ec2 = (self.get_ec2)(&config.aws)?;
        let name = format!("{}-{}-key", config.cluster_name, config.cluster_id);
        config.aws.keypair_name = ec2
            .import_key_pair(&name, &config.ssh.bootstrap_public_key)
            .await?;
        let _ = writeln!(out, "key pair {} imported", config.aws.keypair_name);
        Ok(())
    }

    fn name(&self) -> &'static str {
        STEP_NAME
    }

    fn description(&self) -> &'static str {
        "imports the bootstrap public key for machine access"
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests_support::MockEc2;
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn imports_with_cluster_scoped_name() {
        let mock = Arc::new(MockEc2::default());
        let ec2 = mock.clone();
        let step = ImportKeyPairStep::new(Arc::new(move |_| Ok(ec2.clone())));

        let mut config = Config::default();
        config.cluster_name = "prod".to_string();
        config.cluster_id = "abcd1234".to_string();
        config.ssh.bootstrap_public_key = "ssh-key".to_string();

        let ctx = CancellationToken::new();
        let mut sink = Vec::new();
        step.run(&ctx, &mut sink, &mut config).await.unwrap();

        assert_eq!(config.aws.keypair_name, "prod-abcd1234-key");
        assert_eq!(mock.calls("import_key_pair"), 1);
    }

    #[tokio::test]
    async fn missing_bootstrap_key_is_invalid_arguments() {
        let mock = Arc::new(MockEc2::default());
        let ec2 = mock.clone();
        let step = ImportKeyPairStep::new(Arc::new(move |_| Ok(ec2.clone())));

        let mut config = Config::default();
        let ctx = CancellationToken::new();
        let mut sink = Vec::new();
        let err = step.run(&ctx, &mut sink, &mut config).await.unwrap_err();
        assert!(matches!(err, Error::InvalidArguments(_)));
    }
}

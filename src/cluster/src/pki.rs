//! Bootstrap PKI helpers.
//!
//! Generates the CA pair, the admin client pair and the bootstrap key pair
//! stored on the config before any machine exists. Everything is carried
//! around as PEM; the transport that uses the key material lives outside
//! the core.

use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose,
    IsCa, KeyPair,
};
use rsa::pkcs1::{EncodeRsaPrivateKey, EncodeRsaPublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};

use crate::error::{Error, Result};

const CA_COMMON_NAME: &str = "kubernetes-ca";
const ADMIN_COMMON_NAME: &str = "admin";
const ADMIN_ORGANIZATION: &str = "system:masters";
const BOOTSTRAP_KEY_BITS: usize = 4096;

/// PEM encoded certificate and its private key.
#[derive(Debug, Clone, Default)]
pub struct CertPair {
    pub cert: String,
    pub key: String,
}

/// PEM encoded key pair used for machine bootstrap access.
#[derive(Debug, Clone, Default)]
pub struct KeyPairPem {
    pub private: String,
    pub public: String,
}

fn pki_err(context: &str, err: rcgen::Error) -> Error {
    Error::Internal(format!("pki: {}: {}", context, err))
}

fn ca_params() -> Result<CertificateParams> {
    let mut params =
        CertificateParams::new(Vec::new()).map_err(|e| pki_err("ca params", e))?;
    params.distinguished_name = DistinguishedName::new();
    params
        .distinguished_name
        .push(DnType::CommonName, CA_COMMON_NAME);
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    Ok(params)
}

/// Generate a CA pair. When a parent pair is supplied the new CA is signed
/// by it, otherwise it is self-signed.
pub fn new_ca_pair(parent: Option<&CertPair>) -> Result<CertPair> {
    let params = ca_params()?;
    let key = KeyPair::generate().map_err(|e| pki_err("generate ca key", e))?;

    let cert = match parent {
        Some(parent) => {
            // The signing certificate is recreated from the parent key,
            // rcgen cannot sign with a PEM certificate alone.
            let parent_key =
                KeyPair::from_pem(&parent.key).map_err(|e| pki_err("parse parent key", e))?;
            let parent_cert = ca_params()?
                .self_signed(&parent_key)
                .map_err(|e| pki_err("recreate parent cert", e))?;
            params
                .signed_by(&key, &parent_cert, &parent_key)
                .map_err(|e| pki_err("sign ca cert", e))?
        }
        None => params
            .self_signed(&key)
            .map_err(|e| pki_err("self sign ca cert", e))?,
    };

    Ok(CertPair {
        cert: cert.pem(),
        key: key.serialize_pem(),
    })
}

/// Generate the admin client pair signed by the given CA.
pub fn new_admin_pair(ca: &CertPair) -> Result<CertPair> {
    let ca_key = KeyPair::from_pem(&ca.key).map_err(|e| pki_err("parse ca key", e))?;
    let ca_cert = ca_params()?
        .self_signed(&ca_key)
        .map_err(|e| pki_err("recreate ca cert", e))?;

    let mut params =
        CertificateParams::new(Vec::new()).map_err(|e| pki_err("admin params", e))?;
    params.distinguished_name = DistinguishedName::new();
    params
        .distinguished_name
        .push(DnType::CommonName, ADMIN_COMMON_NAME);
    params
        .distinguished_name
        .push(DnType::OrganizationName, ADMIN_ORGANIZATION);
    params
        .extended_key_usages
        .push(ExtendedKeyUsagePurpose::ClientAuth);

    let key = KeyPair::generate().map_err(|e| pki_err("generate admin key", e))?;
    let cert = params
        .signed_by(&key, &ca_cert, &ca_key)
        .map_err(|e| pki_err("sign admin cert", e))?;

    Ok(CertPair {
        cert: cert.pem(),
        key: key.serialize_pem(),
    })
}

/// Generate the 4096-bit RSA bootstrap key pair injected into created
/// machines.
pub fn new_bootstrap_key_pair() -> Result<KeyPairPem> {
    let mut rng = rand::thread_rng();
    let private = RsaPrivateKey::new(&mut rng, BOOTSTRAP_KEY_BITS)
        .map_err(|e| Error::Internal(format!("pki: generate bootstrap key: {}", e)))?;
    let public = RsaPublicKey::from(&private);

    let private_pem = private
        .to_pkcs1_pem(LineEnding::LF)
        .map_err(|e| Error::Internal(format!("pki: encode bootstrap private key: {}", e)))?;
    let public_pem = public
        .to_pkcs1_pem(LineEnding::LF)
        .map_err(|e| Error::Internal(format!("pki: encode bootstrap public key: {}", e)))?;

    Ok(KeyPairPem {
        private: private_pem.to_string(),
        public: public_pem,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_signed_ca_pair() {
        let ca = new_ca_pair(None).unwrap();
        assert!(ca.cert.contains("BEGIN CERTIFICATE"));
        assert!(ca.key.contains("PRIVATE KEY"));
    }

    #[test]
    fn parented_ca_pair() {
        let root = new_ca_pair(None).unwrap();
        let intermediate = new_ca_pair(Some(&root)).unwrap();
        assert!(intermediate.cert.contains("BEGIN CERTIFICATE"));
        assert_ne!(intermediate.key, root.key);
    }

    #[test]
    fn admin_pair_signed_by_ca() {
        let ca = new_ca_pair(None).unwrap();
        let admin = new_admin_pair(&ca).unwrap();
        assert!(admin.cert.contains("BEGIN CERTIFICATE"));
        assert_ne!(admin.key, ca.key);
    }

    #[test]
    fn bootstrap_key_pair_is_rsa() {
        let pair = new_bootstrap_key_pair().unwrap();
        assert!(pair.private.contains("BEGIN RSA PRIVATE KEY"));
        assert!(pair.public.contains("BEGIN RSA PUBLIC KEY"));
    }
}

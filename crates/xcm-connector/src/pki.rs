//! Bootstrap PKI for a freshly deployed control plane
//!
//! A control plane needs two independent trust roots:
//!
//! - the client CA, which signs the `system:admin` certificate the operator
//!   (and later the spoke agent's bootstrap kubeconfig) authenticates with
//! - the serving CA, which signs the API server certificate bound to the
//!   externally visible load balancer host
//!
//! Plus a standalone key the control plane uses to sign service account
//! tokens. Everything is RSA 2048 and handed back as PEM.

use rcgen::{
    string::Ia5String, BasicConstraints, CertificateParams, DistinguishedName, DnType, DnValue,
    ExtendedKeyUsagePurpose, IsCa, Issuer, KeyPair, KeyUsagePurpose, RsaKeySize, SanType,
    PKCS_RSA_SHA256,
};
use thiserror::Error;
use x509_parser::prelude::*;

/// Validity period for CA certificates (10 years)
pub const CA_VALIDITY_YEARS: i64 = 10;

/// Validity period for leaf certificates (1 year)
pub const CERT_VALIDITY_YEARS: i64 = 1;

/// How far leaf `NotBefore` is backdated to absorb clock skew
pub const CLOCK_SKEW_BACKDATE: ::time::Duration = ::time::Duration::hours(1);

/// Common name of the client-auth CA
pub const CLIENT_CA_NAME: &str = "xCMClientCA";

/// Common name of the server-auth CA
pub const SERVING_CA_NAME: &str = "xCMServingCA";

/// Identity the admin client certificate is bound to
pub const ADMIN_USER: &str = "system:admin";

/// Group granting cluster-admin on the control plane
pub const ADMIN_GROUP: &str = "system:masters";

/// Common name of the serving certificate
pub const SERVING_COMMON_NAME: &str = "kubernetes.default";

/// DNS aliases every serving certificate carries besides the external host
pub const SERVING_ALIASES: [&str; 2] = ["kubernetes.default.svc", "localhost"];

fn compute_validity(
    years: i64,
    backdate: ::time::Duration,
) -> (::time::OffsetDateTime, ::time::OffsetDateTime) {
    let now = ::time::OffsetDateTime::now_utc();
    (now - backdate, now + ::time::Duration::days(years * 365))
}

/// PKI errors
#[derive(Debug, Error)]
pub enum PkiError {
    /// Certificate generation or signing failed
    #[error("certificate generation failed: {0}")]
    CertificateGenerationFailed(String),

    /// Key generation failed
    #[error("key generation failed: {0}")]
    KeyGenerationFailed(String),

    /// Certificate parsing error
    #[error("certificate parsing error: {0}")]
    ParseError(String),
}

/// Result type for PKI operations
pub type Result<T> = std::result::Result<T, PkiError>;

/// Parse PEM-encoded data and return the DER bytes
pub fn parse_pem(pem_data: &str) -> Result<Vec<u8>> {
    let pem_obj = ::pem::parse(pem_data.as_bytes())
        .map_err(|e| PkiError::ParseError(format!("failed to parse PEM: {}", e)))?;
    Ok(pem_obj.contents().to_vec())
}

fn generate_rsa_key(purpose: &str) -> Result<KeyPair> {
    KeyPair::generate_rsa_for(&PKCS_RSA_SHA256, RsaKeySize::_2048).map_err(|e| {
        PkiError::KeyGenerationFailed(format!("failed to generate {} key: {}", purpose, e))
    })
}

fn dns_san(name: &str) -> Result<SanType> {
    Ia5String::try_from(name.to_string())
        .map(SanType::DnsName)
        .map_err(|e| {
            PkiError::CertificateGenerationFailed(format!("invalid DNS name '{}': {}", name, e))
        })
}

/// A self-signed certificate authority held as PEM
#[derive(Clone)]
pub struct CertificateAuthority {
    ca_key_pem: String,
    ca_cert_pem: String,
}

impl CertificateAuthority {
    /// Create a new self-signed CA valid for [`CA_VALIDITY_YEARS`]
    pub fn new(common_name: &str) -> Result<Self> {
        let mut params = CertificateParams::default();

        let mut dn = DistinguishedName::new();
        dn.push(
            DnType::CommonName,
            DnValue::Utf8String(common_name.to_string()),
        );
        params.distinguished_name = dn;

        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];

        let (not_before, not_after) = compute_validity(CA_VALIDITY_YEARS, ::time::Duration::ZERO);
        params.not_before = not_before;
        params.not_after = not_after;

        let key_pair = generate_rsa_key("CA")?;
        let cert = params.self_signed(&key_pair).map_err(|e| {
            PkiError::CertificateGenerationFailed(format!("failed to create CA cert: {}", e))
        })?;

        Ok(Self {
            ca_key_pem: key_pair.serialize_pem(),
            ca_cert_pem: cert.pem(),
        })
    }

    /// PEM-encoded CA certificate
    pub fn ca_cert_pem(&self) -> &str {
        &self.ca_cert_pem
    }

    /// PEM-encoded CA private key
    pub fn ca_key_pem(&self) -> &str {
        &self.ca_key_pem
    }

    /// Issue a client-auth certificate for `user` in `groups`
    pub fn issue_client_cert(&self, user: &str, groups: &[&str]) -> Result<IssuedCertificate> {
        let mut params = leaf_params(user);
        for group in groups {
            params
                .distinguished_name
                .push(DnType::OrganizationName, DnValue::Utf8String(group.to_string()));
        }
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];
        self.sign(params, "client")
    }

    /// Issue a server-auth certificate for `common_name` covering `sans`
    ///
    /// SANs that parse as IP addresses are added both as IP and DNS entries
    /// so name-based clients still match.
    pub fn issue_serving_cert(&self, common_name: &str, sans: &[&str]) -> Result<IssuedCertificate> {
        let mut params = leaf_params(common_name);
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];

        let mut names = Vec::with_capacity(sans.len() + 1);
        for san in sans {
            if let Ok(ip) = san.parse::<std::net::IpAddr>() {
                names.push(SanType::IpAddress(ip));
            }
            names.push(dns_san(san)?);
        }
        params.subject_alt_names = names;

        self.sign(params, "serving")
    }

    fn sign(&self, params: CertificateParams, purpose: &str) -> Result<IssuedCertificate> {
        let leaf_key = generate_rsa_key(purpose)?;

        let ca_key = KeyPair::from_pem(&self.ca_key_pem)
            .map_err(|e| PkiError::ParseError(format!("failed to load CA key: {}", e)))?;
        let issuer = Issuer::from_ca_cert_pem(&self.ca_cert_pem, &ca_key)
            .map_err(|e| PkiError::ParseError(format!("failed to create issuer: {}", e)))?;

        let cert = params.signed_by(&leaf_key, &issuer).map_err(|e| {
            PkiError::CertificateGenerationFailed(format!(
                "failed to sign {} cert: {}",
                purpose, e
            ))
        })?;

        Ok(IssuedCertificate {
            cert_pem: cert.pem(),
            key_pem: leaf_key.serialize_pem(),
        })
    }
}

fn leaf_params(common_name: &str) -> CertificateParams {
    let mut params = CertificateParams::default();
    let mut dn = DistinguishedName::new();
    dn.push(
        DnType::CommonName,
        DnValue::Utf8String(common_name.to_string()),
    );
    params.distinguished_name = dn;
    params.is_ca = IsCa::NoCa;
    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyEncipherment,
    ];
    let (not_before, not_after) = compute_validity(CERT_VALIDITY_YEARS, CLOCK_SKEW_BACKDATE);
    params.not_before = not_before;
    params.not_after = not_after;
    params
}

/// A signed leaf certificate and its private key
#[derive(Clone)]
pub struct IssuedCertificate {
    /// PEM-encoded certificate
    pub cert_pem: String,
    /// PEM-encoded private key
    pub key_pem: String,
}

/// Everything a control plane needs to come up with mutual TLS
///
/// The nine blobs are independent: the CA cert, CA key, leaf cert and leaf
/// key for each authority are stored and mounted separately.
#[derive(Clone)]
pub struct BootstrapCertificates {
    /// Service account token signing key
    pub service_account_key: String,
    /// Client-auth CA certificate
    pub client_ca: String,
    /// Client-auth CA key
    pub client_ca_key: String,
    /// Admin client certificate
    pub client_cert: String,
    /// Admin client key
    pub client_key: String,
    /// Server-auth CA certificate
    pub serving_ca: String,
    /// Server-auth CA key
    pub serving_ca_key: String,
    /// API server certificate
    pub serving_cert: String,
    /// API server key
    pub serving_key: String,
}

impl std::fmt::Debug for BootstrapCertificates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootstrapCertificates")
            .field("client_ca", &"<pem>")
            .field("serving_ca", &"<pem>")
            .finish_non_exhaustive()
    }
}

/// Generate the full certificate set for a control plane reachable at `hostname`
pub fn generate_bootstrap_certificates(hostname: &str) -> Result<BootstrapCertificates> {
    let service_account_key = generate_rsa_key("service account")?.serialize_pem();

    let client_ca = CertificateAuthority::new(CLIENT_CA_NAME)?;
    let client = client_ca.issue_client_cert(ADMIN_USER, &[ADMIN_GROUP])?;

    let serving_ca = CertificateAuthority::new(SERVING_CA_NAME)?;
    let mut sans: Vec<&str> = SERVING_ALIASES.to_vec();
    sans.push(hostname);
    let serving = serving_ca.issue_serving_cert(SERVING_COMMON_NAME, &sans)?;

    Ok(BootstrapCertificates {
        service_account_key,
        client_ca: client_ca.ca_cert_pem,
        client_ca_key: client_ca.ca_key_pem,
        client_cert: client.cert_pem,
        client_key: client.key_pem,
        serving_ca: serving_ca.ca_cert_pem,
        serving_ca_key: serving_ca.ca_key_pem,
        serving_cert: serving.cert_pem,
        serving_key: serving.key_pem,
    })
}

/// Verify `cert_pem` carries a valid signature from `ca_cert_pem`
pub fn verify_signed_by(cert_pem: &str, ca_cert_pem: &str) -> Result<()> {
    let cert_der = parse_pem(cert_pem)?;
    let (_, cert) = X509Certificate::from_der(&cert_der)
        .map_err(|e| PkiError::ParseError(format!("failed to parse certificate: {}", e)))?;

    let ca_der = parse_pem(ca_cert_pem)?;
    let (_, ca_cert) = X509Certificate::from_der(&ca_der)
        .map_err(|e| PkiError::ParseError(format!("failed to parse CA cert: {}", e)))?;

    cert.verify_signature(Some(ca_cert.public_key()))
        .map_err(|e| PkiError::ParseError(format!("signature verification failed: {}", e)))
}

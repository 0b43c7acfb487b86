pub mod extensions;
pub mod params;

use der::{Decode, Encode};
use extensions::{ExtendedKeyUsage, ExtendedKeyUsageOption, ToAndFromX509Extension};
use params::{CertificationRequestInfo, DistinguishedName, ExtensionParam, Validity};
use time::OffsetDateTime;
use x509_cert::certificate::CertificateInner;

use crate::error::{Error, Result};
use crate::issuer::Issuer;
use crate::key::{KeyPair, PublicKey};
use crate::pem_utils;

/// Represents the supported signature algorithms for certificates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    /// SHA-256 with RSA encryption (PKCS#1 v1.5).
    Sha256WithRSA,
}

impl From<SignatureAlgorithm> for x509_cert::spki::AlgorithmIdentifierOwned {
    /// Converts a `SignatureAlgorithm` into an `AlgorithmIdentifierOwned`.
    ///
    /// RFC 4055 requires an explicit NULL parameter for the RSA algorithms.
    fn from(value: SignatureAlgorithm) -> Self {
        match value {
            SignatureAlgorithm::Sha256WithRSA => x509_cert::spki::AlgorithmIdentifierOwned {
                oid: const_oid::db::rfc5912::SHA_256_WITH_RSA_ENCRYPTION,
                parameters: Some(der::asn1::AnyRef::NULL.into()),
            },
        }
    }
}

/// Represents an X.509 certificate.
///
/// This struct provides methods to encode the certificate into DER or PEM
/// formats, to parse it back, and to answer the questions the signing
/// pipeline asks of a certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    /// The inner representation of the certificate.
    pub inner: CertificateInner,
}

impl Certificate {
    /// Encodes the certificate into DER format.
    pub fn to_der(&self) -> Result<Vec<u8>> {
        self.inner
            .to_der()
            .map_err(|e| Error::EncodingError(e.to_string()))
    }

    /// Encodes the certificate into PEM format.
    pub fn to_pem(&self) -> Result<String> {
        Ok(pem_utils::der_to_pem(&self.to_der()?, "CERTIFICATE"))
    }

    pub fn from_der(der: &[u8]) -> Result<Self> {
        let inner = CertificateInner::from_der(der)
            .map_err(|e| Error::CertificateError(format!("malformed certificate: {e}")))?;
        Ok(Self { inner })
    }

    /// Parses the first `CERTIFICATE` block of a PEM document.
    pub fn from_pem(pem: &str) -> Result<Self> {
        let (_, der) = pem_utils::pem_to_der_expecting(pem, &["CERTIFICATE"])?;
        Self::from_der(&der)
    }

    pub fn subject(&self) -> DistinguishedName {
        DistinguishedName::from_x509_name(&self.inner.tbs_certificate.subject)
    }

    pub fn issuer(&self) -> DistinguishedName {
        DistinguishedName::from_x509_name(&self.inner.tbs_certificate.issuer)
    }

    /// RFC 4514 rendering of the subject, e.g. `CN=LocalSign-SelfSigned`.
    pub fn subject_string(&self) -> String {
        self.inner.tbs_certificate.subject.to_string()
    }

    /// RFC 4514 rendering of the issuer.
    pub fn issuer_string(&self) -> String {
        self.inner.tbs_certificate.issuer.to_string()
    }

    pub fn serial_number(&self) -> Vec<u8> {
        self.inner
            .tbs_certificate
            .serial_number
            .as_bytes()
            .to_vec()
    }

    pub fn public_key(&self) -> Result<PublicKey> {
        PublicKey::from_x509spki(&self.inner.tbs_certificate.subject_public_key_info)
    }

    pub fn validity(&self) -> Validity {
        let validity = &self.inner.tbs_certificate.validity;
        Validity {
            not_before: OffsetDateTime::from(validity.not_before.to_system_time()),
            not_after: OffsetDateTime::from(validity.not_after.to_system_time()),
        }
    }

    /// True when the issuer name equals the subject name.
    pub fn is_self_issued(&self) -> bool {
        self.inner.tbs_certificate.issuer == self.inner.tbs_certificate.subject
    }

    /// Checks this certificate's signature against its own public key.
    pub fn verify_self_signature(&self) -> Result<()> {
        let tbs = self.inner.tbs_certificate.to_der()?;
        let signature = self.inner.signature.as_bytes().ok_or_else(|| {
            Error::CertificateError("signature has unused bits".to_string())
        })?;
        self.public_key()?.verify(&tbs, signature)
    }

    pub fn extensions(&self) -> Vec<ExtensionParam> {
        self.inner
            .tbs_certificate
            .extensions
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|ext| ExtensionParam {
                oid: ext.extn_id,
                critical: ext.critical,
                value: ext.extn_value.as_bytes().to_vec(),
            })
            .collect()
    }

    pub fn extended_key_usage(&self) -> ExtendedKeyUsage {
        self.extensions()
            .iter()
            .find(|ext| ext.oid == ExtendedKeyUsage::OID)
            .and_then(|ext| ext.to_extension::<ExtendedKeyUsage>().ok())
            .unwrap_or_default()
    }

    pub fn has_code_signing_usage(&self) -> bool {
        self.extended_key_usage()
            .contains(ExtendedKeyUsageOption::CodeSigning)
    }

    /// Creates a new self-signed certificate.
    ///
    /// # Arguments
    /// * `cert_info` - The certification request information.
    /// * `key` - The key pair used to sign the certificate.
    /// * `validity` - The validity window.
    pub fn new_self_signed(
        cert_info: &CertificationRequestInfo,
        key: &KeyPair,
        validity: Validity,
    ) -> Result<Self> {
        // For self-signed certificates, the issuer is the same as the subject
        let self_issuer = SelfIssuer {
            name: cert_info.subject.clone(),
            key,
        };
        self_issuer.issue(cert_info, validity)
    }
}

// Helper struct for self-signed certificates
struct SelfIssuer<'a> {
    name: DistinguishedName,
    key: &'a KeyPair,
}

impl Issuer for SelfIssuer<'_> {
    fn issuer_name(&self) -> DistinguishedName {
        self.name.clone()
    }

    fn signing_key(&self) -> &KeyPair {
        self.key
    }
}

/// One signing identity: a certificate, its private key and the subject name
/// used both as common name and as on-disk file stem.
#[derive(Debug)]
pub struct SigningCertificate {
    pub subject: String,
    pub cert: Certificate,
    pub key: KeyPair,
}

impl SigningCertificate {
    /// Pairs a certificate with its key, rejecting keys that do not belong
    /// to the certificate.
    pub fn new(cert: Certificate, key: KeyPair) -> Result<Self> {
        if cert.public_key()? != key.public_key() {
            return Err(Error::CertificateError(
                "private key does not match certificate public key".to_string(),
            ));
        }
        Ok(Self {
            subject: cert.subject().common_name,
            cert,
            key,
        })
    }
}

impl Issuer for SigningCertificate {
    fn issuer_name(&self) -> DistinguishedName {
        self.cert.subject()
    }

    fn signing_key(&self) -> &KeyPair {
        &self.key
    }
}

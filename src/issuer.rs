use der::Encode;
use der::flagset::FlagSet;
use rand::RngCore;
use sha1::Sha1;
use x509_cert::certificate::CertificateInner;

use crate::cert::Certificate;
use crate::cert::SignatureAlgorithm;
use crate::cert::extensions::AuthorityKeyIdentifier;
use crate::cert::extensions::BasicConstraints;
use crate::cert::extensions::ExtendedKeyUsage;
use crate::cert::extensions::ExtendedKeyUsageOption;
use crate::cert::extensions::KeyUsage;
use crate::cert::extensions::KeyUsages;
use crate::cert::extensions::SubjectKeyIdentifier;
use crate::cert::params::Validity;
use crate::cert::params::{CertificationRequestInfo, DistinguishedName, ExtensionParam};
use crate::error::{Error, Result};
use crate::key::KeyPair;
use crate::tbs_certificate::TbsCertificate;

/// Length in bytes of generated serial numbers.
const SERIAL_NUMBER_LEN: usize = 16;

/// Represents an entity capable of issuing certificates.
pub trait Issuer {
    /// Returns the distinguished name of the issuer.
    fn issuer_name(&self) -> DistinguishedName;

    /// Returns the signing key of the issuer.
    fn signing_key(&self) -> &KeyPair;

    /// Issues a certificate based on the provided certification request information.
    ///
    /// The serial number is random, so two certificates issued for the same
    /// subject are always distinguishable.
    fn issue(&self, cert_request: &CertificationRequestInfo, validity: Validity) -> Result<Certificate> {
        let signature_algo = SignatureAlgorithm::Sha256WithRSA;

        let issuer_spki = self.signing_key().public_key().to_spki()?;
        let issuer_key_id =
            <Sha1 as sha1::Digest>::digest(issuer_spki.subject_public_key.raw_bytes());
        let subject_spki = cert_request.subject_public_key.to_spki()?;
        let subject_key_id =
            <Sha1 as sha1::Digest>::digest(subject_spki.subject_public_key.raw_bytes());

        let basic_constraints = BasicConstraints {
            is_ca: cert_request.is_ca,
            max_path_length: None,
        };

        let mut extensions: Vec<ExtensionParam> = vec![
            ExtensionParam::from_extension(basic_constraints, true)?,
            ExtensionParam::from_extension(SubjectKeyIdentifier(subject_key_id.to_vec()), false)?,
            ExtensionParam::from_extension(
                AuthorityKeyIdentifier {
                    key_identifier: issuer_key_id.to_vec(),
                },
                false,
            )?,
        ];

        let mut key_usage_flags: FlagSet<KeyUsages> = FlagSet::empty();

        if cert_request.is_ca {
            key_usage_flags |= KeyUsages::KeyCertSign;
            key_usage_flags |= KeyUsages::CRLSign;
        }

        for usage in &cert_request.usages {
            match usage {
                ExtendedKeyUsageOption::ClientAuth
                | ExtendedKeyUsageOption::ServerAuth
                | ExtendedKeyUsageOption::EmailProtection => {
                    key_usage_flags |= KeyUsages::KeyEncipherment;
                }
                ExtendedKeyUsageOption::CodeSigning
                | ExtendedKeyUsageOption::TimeStamping
                | ExtendedKeyUsageOption::OcspSigning
                | ExtendedKeyUsageOption::Other(_) => {
                    key_usage_flags |= KeyUsages::DigitalSignature;
                }
            }
        }

        if !key_usage_flags.is_empty() {
            let key_usage = KeyUsage(key_usage_flags);
            extensions.push(ExtensionParam::from_extension(key_usage, true)?);
        }

        if !cert_request.usages.is_empty() {
            let extended_key_usage = ExtendedKeyUsage {
                usage: cert_request.usages.clone(),
            };
            extensions.push(ExtensionParam::from_extension(extended_key_usage, false)?);
        }

        let combined_extensions = cert_request
            .extensions
            .iter()
            .cloned()
            .chain(extensions)
            .collect();

        let tbs_cert = TbsCertificate {
            serial_number: random_serial_number(),
            signature_algorithm: signature_algo.clone(),
            issuer: self.issuer_name(),
            validity,
            subject: cert_request.subject.clone(),
            subject_public_key: cert_request.subject_public_key.clone(),
            extensions: combined_extensions,
        };

        let tbs_cert_inner = tbs_cert.to_tbs_certificate_inner()?;

        let signature = self.signing_key().sign_data(&tbs_cert_inner.to_der()?)?;

        let cert_inner = CertificateInner {
            tbs_certificate: tbs_cert_inner,
            signature_algorithm: signature_algo.into(),
            signature: der::asn1::BitString::from_bytes(&signature)
                .map_err(|e| Error::EncodingError(e.to_string()))?,
        };

        Ok(Certificate { inner: cert_inner })
    }
}

/// A positive serial number with no leading zero octet.
fn random_serial_number() -> Vec<u8> {
    let mut serial = vec![0u8; SERIAL_NUMBER_LEN];
    rand::rng().fill_bytes(&mut serial);
    serial[0] = (serial[0] & 0x7f) | 0x40;
    serial
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_numbers_are_positive_and_minimal() {
        for _ in 0..32 {
            let serial = random_serial_number();
            assert_eq!(serial.len(), SERIAL_NUMBER_LEN);
            assert_eq!(serial[0] & 0x80, 0);
            assert_ne!(serial[0], 0);
        }
    }
}

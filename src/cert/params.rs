use bon::Builder;
use const_oid::ObjectIdentifier;
use der::Tag;
use der::Tagged;
use time::Duration;
use time::OffsetDateTime;
use x509_cert::name::RdnSequence;

use super::extensions::ToAndFromX509Extension;
pub use crate::cert::extensions::ExtendedKeyUsage;
pub use crate::cert::extensions::ExtendedKeyUsageOption;
use crate::error::Error;
use crate::key::PublicKey;

/// Parameters for building an X.509 certificate.
///
/// # Fields
/// * `subject` - The distinguished name of the certificate subject.
/// * `subject_public_key` - The public key of the certificate subject.
/// * `usages` - A list of extended key usage options.
/// * `is_ca` - Indicates if the certificate is a CA.
/// * `extensions` - Additional X.509 extensions.
#[derive(Clone, Debug, Builder)]
pub struct CertificationRequestInfo {
    pub subject: DistinguishedName,
    pub subject_public_key: PublicKey,
    #[builder(default)]
    pub usages: Vec<ExtendedKeyUsageOption>,
    #[builder(default)]
    pub is_ca: bool,
    #[builder(default)]
    pub extensions: Vec<ExtensionParam>,
}

impl CertificationRequestInfo {
    /// Request info for a code signing identity named `common_name`.
    pub fn code_signing(common_name: &str, subject_public_key: PublicKey) -> Self {
        let subject = DistinguishedName::builder()
            .common_name(common_name.to_string())
            .build();
        Self::builder()
            .subject(subject)
            .subject_public_key(subject_public_key)
            .usages(vec![ExtendedKeyUsageOption::CodeSigning])
            .build()
    }
}

/// Distinguished name parameters for building an X.509 certificate.
///
/// # Fields
/// * `common_name` - The common name (CN).
/// * `country` - The country (C).
/// * `state` - The state or province (ST).
/// * `locality` - The locality or city (L).
/// * `organization` - The organization (O).
/// * `organization_unit` - The organizational unit (OU).
#[derive(Clone, Debug, Builder, Default, PartialEq, Eq)]
pub struct DistinguishedName {
    pub common_name: String,
    pub country: Option<String>,
    pub state: Option<String>,
    pub locality: Option<String>,
    pub organization: Option<String>,
    pub organization_unit: Option<String>,
}

impl DistinguishedName {
    /// Converts the distinguished name to an X.509-compatible format.
    ///
    /// Only attributes that are set are emitted, most significant first in
    /// the RFC 4514 string (which reverses into C, ST, L, O, OU, CN order
    /// in the encoded sequence).
    pub fn as_x509_name(&self) -> Result<x509_cert::name::DistinguishedName, Error> {
        use core::str::FromStr;
        let mut parts = vec![format!("CN={}", escape_rdn_value(&self.common_name))];
        let optional = [
            ("OU", &self.organization_unit),
            ("O", &self.organization),
            ("L", &self.locality),
            ("ST", &self.state),
            ("C", &self.country),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                parts.push(format!("{key}={}", escape_rdn_value(value)));
            }
        }
        RdnSequence::from_str(&parts.join(","))
            .map_err(|e| Error::InvalidInput(format!("invalid distinguished name: {e}")))
    }

    /// Creates a `DistinguishedName` from an X.509-compatible format.
    ///
    /// Directory strings are accepted in any of the encodings commonly used
    /// for names; attributes this type does not model are ignored.
    pub fn from_x509_name(x509dn: &x509_cert::name::DistinguishedName) -> Self {
        let mut dn = DistinguishedName::default();

        for rdn in x509dn.0.iter() {
            for attr in rdn.0.iter() {
                let Some(value) = directory_string(&attr.value) else {
                    continue;
                };
                match attr.oid {
                    const_oid::db::rfc4519::CN => dn.common_name = value,
                    const_oid::db::rfc4519::C => dn.country = Some(value),
                    const_oid::db::rfc4519::ST => dn.state = Some(value),
                    const_oid::db::rfc4519::L => dn.locality = Some(value),
                    const_oid::db::rfc4519::O => dn.organization = Some(value),
                    const_oid::db::rfc4519::OU => dn.organization_unit = Some(value),
                    _ => {}
                }
            }
        }

        dn
    }
}

fn directory_string(value: &der::Any) -> Option<String> {
    match value.tag() {
        Tag::Utf8String | Tag::PrintableString | Tag::Ia5String | Tag::TeletexString => {
            std::str::from_utf8(value.value()).ok().map(str::to_string)
        }
        _ => None,
    }
}

/// Backslash-escape the characters RFC 4514 reserves inside attribute values.
fn escape_rdn_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for (i, c) in value.chars().enumerate() {
        let leading = i == 0 && (c == ' ' || c == '#');
        let trailing = i + 1 == value.chars().count() && c == ' ';
        if matches!(c, ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=') || leading || trailing {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Certificate validity period.
///
/// # Fields
/// * `not_before` - The start of the validity period.
/// * `not_after` - The end of the validity period.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Validity {
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
}

impl Validity {
    /// Creates a validity period starting now for the given number of days.
    pub fn for_days(days: i64) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            not_before: now,
            not_after: now + Duration::days(days),
        }
    }

    /// Creates a validity period starting now and ending on the same calendar
    /// day `years` later. A start on February 29 ends on March 1.
    pub fn for_years(years: i32) -> Self {
        let now = OffsetDateTime::now_utc();
        let not_after = now
            .replace_year(now.year() + years)
            .unwrap_or_else(|_| now + Duration::days(365 * i64::from(years) + 1));
        Self {
            not_before: now,
            not_after,
        }
    }

    pub fn contains(&self, instant: OffsetDateTime) -> bool {
        self.not_before <= instant && instant <= self.not_after
    }
}

/// Represents an X.509 extension.
///
/// # Fields
/// * `oid` - The object identifier of the extension.
/// * `critical` - Indicates if the extension is critical.
/// * `value` - The DER-encoded value of the extension.
#[derive(Clone, Debug)]
pub struct ExtensionParam {
    pub oid: ObjectIdentifier,
    pub critical: bool,
    /// DER-encoded extension value
    pub value: Vec<u8>,
}

impl ExtensionParam {
    /// Creates an `ExtensionParam` from a specific extension.
    pub fn from_extension<E: ToAndFromX509Extension>(
        extension: E,
        critical: bool,
    ) -> Result<Self, Error> {
        Ok(Self {
            oid: E::OID,
            critical,
            value: extension.to_x509_extension_value()?,
        })
    }

    /// Decodes an `ExtensionParam` into a specific extension.
    pub fn to_extension<E: ToAndFromX509Extension>(&self) -> Result<E, Error> {
        E::from_x509_extension_value(&self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip_through_x509() {
        let dn = DistinguishedName::builder()
            .common_name("My, \"Custom\" Cert".to_string())
            .organization("Example Corp".to_string())
            .country("US".to_string())
            .build();
        let x509 = dn.as_x509_name().unwrap();
        assert_eq!(DistinguishedName::from_x509_name(&x509), dn);
    }

    #[test]
    fn unset_attributes_are_not_emitted() {
        let dn = DistinguishedName::builder()
            .common_name("LocalSign-SelfSigned".to_string())
            .build();
        let x509 = dn.as_x509_name().unwrap();
        assert_eq!(x509.0.len(), 1);
        assert_eq!(x509.to_string(), "CN=LocalSign-SelfSigned");
    }

    #[test]
    fn three_year_validity() {
        let validity = Validity::for_years(3);
        let span = validity.not_after - validity.not_before;
        assert!(span >= Duration::days(365 * 3));
        assert!(span <= Duration::days(365 * 3 + 1));
        assert!(validity.contains(OffsetDateTime::now_utc()));
    }
}

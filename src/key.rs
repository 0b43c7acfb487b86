use rsa::{
    BigUint, RsaPrivateKey, RsaPublicKey,
    pkcs1::DecodeRsaPrivateKey,
    pkcs1v15::{Signature, SigningKey, VerifyingKey},
    pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding},
    signature::{SignatureEncoding, Signer, Verifier},
    traits::{PrivateKeyParts, PublicKeyParts},
};
use sha2::Sha256;
use x509_cert::spki::SubjectPublicKeyInfoOwned;
use zeroize::{Zeroize, Zeroizing};

use crate::error::{Error, Result};
use crate::pem_utils;

/// Smallest RSA modulus accepted for generated keys.
pub const DEFAULT_KEY_BITS: usize = 2048;

const PKCS1_LABEL: &str = "RSA PRIVATE KEY";
const PKCS8_LABEL: &str = "PRIVATE KEY";

/// An RSA signing key pair.
///
/// The secret numeric components (private exponent and prime factors) are
/// held in owned big-endian buffers rather than inside an `RsaPrivateKey`, so
/// that [`KeyPair::zeroize`] can overwrite exactly the bytes this process
/// holds. An `RsaPrivateKey` is rebuilt on demand for each signing or export
/// operation and dropped (and wiped by `rsa`) right after.
pub struct KeyPair {
    public: RsaPublicKey,
    d: Vec<u8>,
    primes: Vec<Vec<u8>>,
    erased: bool,
}

impl KeyPair {
    /// Generate an RSA key pair with the specified number of bits.
    pub fn generate_rsa(bits: usize) -> Result<Self> {
        if bits < DEFAULT_KEY_BITS {
            return Err(Error::KeyGenerationError(format!(
                "RSA keys must be at least {DEFAULT_KEY_BITS} bits, got {bits}"
            )));
        }
        let mut rng = rand_core::OsRng;
        let private = RsaPrivateKey::new(&mut rng, bits)
            .map_err(|e| Error::KeyGenerationError(e.to_string()))?;
        Ok(Self::from_private(&private))
    }

    fn from_private(private: &RsaPrivateKey) -> Self {
        Self {
            public: RsaPublicKey::from(private),
            d: private.d().to_bytes_be(),
            primes: private.primes().iter().map(BigUint::to_bytes_be).collect(),
            erased: false,
        }
    }

    /// Import a PEM private key in either PKCS#1 (`RSA PRIVATE KEY`) or
    /// PKCS#8 (`PRIVATE KEY`) encoding.
    pub fn import_from_pem(pem: &str) -> Result<Self> {
        let (label, der) = pem_utils::pem_to_der_expecting(pem, &[PKCS1_LABEL, PKCS8_LABEL])?;
        let der = Zeroizing::new(der);
        let private = if label == PKCS1_LABEL {
            RsaPrivateKey::from_pkcs1_der(&der)?
        } else {
            RsaPrivateKey::from_pkcs8_der(&der)
                .map_err(|e| Error::DecodingError(format!("not a usable RSA private key: {e}")))?
        };
        Ok(Self::from_private(&private))
    }

    /// Export the private key as PKCS#8 PEM.
    pub fn export_pkcs8_pem(&self) -> Result<Zeroizing<String>> {
        let private = self.private_key()?;
        private
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| Error::EncodingError(e.to_string()))
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.public.clone())
    }

    /// Modulus size in bits.
    pub fn bits(&self) -> usize {
        self.public.n().bits()
    }

    /// Sign `data` with RSASSA-PKCS1-v1_5 over SHA-256.
    pub fn sign_data(&self, data: &[u8]) -> Result<Vec<u8>> {
        let signing_key = SigningKey::<Sha256>::new(self.private_key()?);
        let signature = signing_key
            .try_sign(data)
            .map_err(|e| Error::RsaError(e.to_string()))?;
        Ok(signature.to_vec())
    }

    /// The secret numeric components: the private exponent followed by each
    /// prime factor, big-endian.
    pub fn private_components(&self) -> impl Iterator<Item = &[u8]> {
        std::iter::once(self.d.as_slice()).chain(self.primes.iter().map(Vec::as_slice))
    }

    pub fn is_erased(&self) -> bool {
        self.erased
    }

    /// Overwrite every secret component with zeros, keeping each buffer's
    /// length. The key cannot sign or be exported afterwards.
    pub fn zeroize(&mut self) {
        self.d.as_mut_slice().zeroize();
        for prime in &mut self.primes {
            prime.as_mut_slice().zeroize();
        }
        self.erased = true;
    }

    fn private_key(&self) -> Result<RsaPrivateKey> {
        if self.erased {
            return Err(Error::InvalidInput(
                "private key material has been erased".to_string(),
            ));
        }
        let private = RsaPrivateKey::from_components(
            self.public.n().clone(),
            self.public.e().clone(),
            BigUint::from_bytes_be(&self.d),
            self.primes.iter().map(|p| BigUint::from_bytes_be(p)).collect(),
        )?;
        Ok(private)
    }
}

impl Drop for KeyPair {
    fn drop(&mut self) {
        if !self.erased {
            self.zeroize();
        }
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("bits", &self.bits())
            .field("erased", &self.erased)
            .finish_non_exhaustive()
    }
}

/// The public half of a [`KeyPair`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicKey(RsaPublicKey);

impl PublicKey {
    pub fn from_key_pair(key_pair: &KeyPair) -> Self {
        key_pair.public_key()
    }

    /// Decode an RSA public key from a certificate's SubjectPublicKeyInfo.
    pub fn from_x509spki(spki: &SubjectPublicKeyInfoOwned) -> Result<Self> {
        use der::Encode;
        let der = spki.to_der()?;
        let public = RsaPublicKey::from_public_key_der(&der)
            .map_err(|e| Error::DecodingError(format!("unsupported public key: {e}")))?;
        Ok(Self(public))
    }

    pub fn to_spki(&self) -> Result<SubjectPublicKeyInfoOwned> {
        use der::Decode;
        let der = self.0.to_public_key_der()?;
        Ok(SubjectPublicKeyInfoOwned::from_der(der.as_bytes())?)
    }

    /// Check an RSASSA-PKCS1-v1_5/SHA-256 signature over `data`.
    pub fn verify(&self, data: &[u8], signature: &[u8]) -> Result<()> {
        let verifying_key = VerifyingKey::<Sha256>::new(self.0.clone());
        let signature = Signature::try_from(signature)
            .map_err(|e| Error::DecodingError(format!("malformed signature: {e}")))?;
        verifying_key
            .verify(data, &signature)
            .map_err(|e| Error::RsaError(format!("signature does not verify: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_keys_are_refused() {
        assert!(matches!(
            KeyPair::generate_rsa(1024),
            Err(Error::KeyGenerationError(_))
        ));
    }

    #[test]
    fn pkcs8_and_pkcs1_imports_agree() {
        let key = KeyPair::generate_rsa(DEFAULT_KEY_BITS).unwrap();
        let pkcs8 = key.export_pkcs8_pem().unwrap();
        let from_pkcs8 = KeyPair::import_from_pem(&pkcs8).unwrap();

        use rsa::pkcs1::EncodeRsaPrivateKey;
        let pkcs1 = key
            .private_key()
            .unwrap()
            .to_pkcs1_pem(LineEnding::LF)
            .unwrap();
        let from_pkcs1 = KeyPair::import_from_pem(&pkcs1).unwrap();

        assert_eq!(from_pkcs8.public_key(), key.public_key());
        assert_eq!(from_pkcs1.public_key(), key.public_key());
    }

    #[test]
    fn signatures_verify_against_public_half() {
        let key = KeyPair::generate_rsa(DEFAULT_KEY_BITS).unwrap();
        let signature = key.sign_data(b"payload").unwrap();
        key.public_key().verify(b"payload", &signature).unwrap();
        assert!(key.public_key().verify(b"tampered", &signature).is_err());
    }

    #[test]
    fn zeroize_clears_components_and_disables_signing() {
        let mut key = KeyPair::generate_rsa(DEFAULT_KEY_BITS).unwrap();
        let lengths: Vec<usize> = key.private_components().map(<[u8]>::len).collect();

        key.zeroize();

        let after: Vec<&[u8]> = key.private_components().collect();
        assert_eq!(after.iter().map(|c| c.len()).collect::<Vec<_>>(), lengths);
        assert!(after.iter().all(|c| c.iter().all(|b| *b == 0)));
        assert!(key.sign_data(b"x").is_err());
        assert!(key.export_pkcs8_pem().is_err());
    }
}

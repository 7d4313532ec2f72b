use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::pkcs1v15::SigningKey as RsaSigningKey;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;
use sha2::Sha256;
use x509_cert::spki::SubjectPublicKeyInfoOwned;

use crate::error::{PkiError, Result};

/// Smallest RSA modulus the generator will produce.
pub const MIN_RSA_BITS: usize = 2048;

/// Largest RSA modulus the generator accepts.
pub const MAX_RSA_BITS: usize = 16384;

/// Default RSA modulus size.
pub const DEFAULT_RSA_BITS: usize = 2048;

/// An RSA key pair owned by a single certificate subject.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyPair {
    private: Box<RsaPrivateKey>,
    public: RsaPublicKey,
}

impl KeyPair {
    /// Wraps an existing private key.
    pub fn from_private_key(private: RsaPrivateKey) -> Self {
        let public = RsaPublicKey::from(&private);
        KeyPair {
            private: Box::new(private),
            public,
        }
    }

    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.private
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public
    }

    /// Returns the subject public key info for embedding into a certificate.
    pub fn as_spki(&self) -> Result<SubjectPublicKeyInfoOwned> {
        SubjectPublicKeyInfoOwned::from_key(self.public.clone())
            .map_err(|e| PkiError::EncodingError(e.to_string()))
    }

    /// SHA-1 over the public key bits, as used for subject/authority key identifiers.
    pub fn key_identifier(&self) -> Result<Vec<u8>> {
        let spki = self.as_spki()?;
        Ok(<Sha1 as sha1::Digest>::digest(spki.subject_public_key.raw_bytes()).to_vec())
    }

    /// PKCS#1 DER encoding of the private key.
    pub fn to_pkcs1_der(&self) -> Result<Vec<u8>> {
        let document = self
            .private
            .to_pkcs1_der()
            .map_err(|e| PkiError::EncodingError(e.to_string()))?;
        Ok(document.as_bytes().to_vec())
    }

    /// Signs `data` with RSASSA-PKCS1-v1_5 over SHA-256.
    pub fn sign_data(&self, data: &[u8]) -> Result<Vec<u8>> {
        let signing_key = RsaSigningKey::<Sha256>::new((*self.private).clone());
        let signature = signing_key
            .try_sign(data)
            .map_err(|e| PkiError::IssuanceError(e.to_string()))?;
        Ok(signature.to_vec())
    }

    /// Number of bits in the RSA modulus.
    pub fn bits(&self) -> usize {
        use rsa::traits::PublicKeyParts;
        self.public.size() * 8
    }
}

/// Produces fresh key pairs from the operating system's CSPRNG.
#[derive(Clone, Copy, Debug)]
pub struct KeyPairGenerator {
    bits: usize,
}

impl Default for KeyPairGenerator {
    fn default() -> Self {
        KeyPairGenerator {
            bits: DEFAULT_RSA_BITS,
        }
    }
}

impl KeyPairGenerator {
    /// Creates a generator for RSA keys of `bits` size.
    ///
    /// Sizes below [`MIN_RSA_BITS`] are refused rather than weakened.
    pub fn rsa(bits: usize) -> Result<Self> {
        if bits < MIN_RSA_BITS {
            return Err(PkiError::KeyGenerationError(format!(
                "RSA key size {bits} is below the minimum of {MIN_RSA_BITS} bits"
            )));
        }
        if bits > MAX_RSA_BITS {
            return Err(PkiError::KeyGenerationError(format!(
                "RSA key size {bits} exceeds the maximum of {MAX_RSA_BITS} bits"
            )));
        }
        Ok(KeyPairGenerator { bits })
    }

    /// Generate an RSA key pair.
    pub fn generate(&self) -> Result<KeyPair> {
        let mut rng = rand_core::OsRng;
        let private = RsaPrivateKey::new(&mut rng, self.bits)
            .map_err(|e| PkiError::KeyGenerationError(e.to_string()))?;
        Ok(KeyPair::from_private_key(private))
    }
}

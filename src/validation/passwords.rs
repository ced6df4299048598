use argon2::{
    Algorithm, Argon2, Params, ParamsBuilder, PasswordHash, PasswordHasher, PasswordVerifier,
    Version, password_hash::SaltString,
};
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::models::OrgAddress;

const SALT_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("argon2 parameter error: {0}")]
    Argon2(String),
    #[error("password hashing error: {0}")]
    PasswordHash(String),
}

impl From<argon2::Error> for PasswordError {
    fn from(err: argon2::Error) -> Self {
        PasswordError::Argon2(err.to_string())
    }
}

impl From<argon2::password_hash::Error> for PasswordError {
    fn from(err: argon2::password_hash::Error) -> Self {
        PasswordError::PasswordHash(err.to_string())
    }
}

/// One-way password hashing used by the record validator.
pub trait PasswordHashing: Send + Sync {
    fn hash_password(&self, org: &OrgAddress, password: &str) -> Result<String, PasswordError>;
}

/// Argon2id hashing keyed per organization.
///
/// The argon2 secret is `SHA-256(pepper || org)`, so a hash minted for one
/// organization never verifies under another, and the optional global pepper
/// never lives next to the hashes.
#[derive(Clone)]
pub struct PasswordService {
    params: Params,
    pepper: Vec<u8>,
}

impl PasswordService {
    pub fn with_costs(
        m_cost_kib: u32,
        t_cost: u32,
        p_cost: u32,
        pepper: Option<&str>,
    ) -> Result<Self, PasswordError> {
        let mut builder = ParamsBuilder::new();
        builder.m_cost(m_cost_kib);
        builder.t_cost(t_cost);
        builder.p_cost(p_cost);
        let params = builder.build()?;
        Ok(Self {
            params,
            pepper: pepper.map(|p| p.as_bytes().to_vec()).unwrap_or_default(),
        })
    }

    fn org_key(&self, org: &OrgAddress) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(&self.pepper);
        hasher.update([0u8]);
        hasher.update(org.as_str().as_bytes());
        hasher.finalize().into()
    }

    pub fn verify_password(
        &self,
        org: &OrgAddress,
        password: &str,
        encoded: &str,
    ) -> Result<bool, PasswordError> {
        let key = self.org_key(org);
        let argon2 =
            Argon2::new_with_secret(&key, Algorithm::Argon2id, Version::V0x13, self.params.clone())?;
        let parsed = PasswordHash::new(encoded)?;
        match argon2.verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(err) => Err(PasswordError::from(err)),
        }
    }
}

impl PasswordHashing for PasswordService {
    fn hash_password(&self, org: &OrgAddress, password: &str) -> Result<String, PasswordError> {
        let key = self.org_key(org);
        let argon2 =
            Argon2::new_with_secret(&key, Algorithm::Argon2id, Version::V0x13, self.params.clone())?;

        let mut salt_bytes = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt_bytes);
        let salt = SaltString::encode_b64(&salt_bytes)?;
        let hash = argon2
            .hash_password(password.as_bytes(), &salt)?
            .to_string();
        Ok(hash)
    }
}

use argon2::{
    Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version,
    password_hash::{self, SaltString, rand_core::OsRng},
};

use crate::DbError;

/// Argon2id cost parameters. Raising any of them makes each hash (and each
/// login) proportionally more expensive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkFactor {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for WorkFactor {
    fn default() -> Self {
        Self {
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
            parallelism: Params::DEFAULT_P_COST,
        }
    }
}

/// Password hasher configured with a fixed work factor.
#[derive(Clone)]
pub struct Hasher {
    argon2: Argon2<'static>,
}

impl Hasher {
    pub fn new(work: WorkFactor) -> Result<Self, DbError> {
        let params = Params::new(work.memory_kib, work.iterations, work.parallelism, None)
            .map_err(|e| DbError::Hash(e.to_string()))?;

        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// PHC-format hash with a fresh random salt.
    pub fn hash(&self, password: &str) -> Result<String, DbError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| DbError::Hash(e.to_string()))?;
        Ok(hash.to_string())
    }

    /// `Ok(false)` on mismatch; `Err` only when the stored hash is unreadable.
    /// Verification uses the parameters embedded in `stored`, so hashes made
    /// under an older work factor keep working.
    pub fn verify(&self, password: &str, stored: &str) -> Result<bool, DbError> {
        let parsed = PasswordHash::new(stored).map_err(|e| DbError::Hash(e.to_string()))?;

        match self.argon2.verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(e) => Err(DbError::Hash(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::cheap_hasher;

    #[test]
    fn hash_never_contains_plaintext() {
        let hasher = cheap_hasher();
        let hash = hasher.hash("hunter22").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(!hash.contains("hunter22"));
    }

    #[test]
    fn verify_accepts_only_the_right_password() {
        let hasher = cheap_hasher();
        let hash = hasher.hash("secret").unwrap();
        assert!(hasher.verify("secret", &hash).unwrap());
        assert!(!hasher.verify("wrong", &hash).unwrap());
    }

    #[test]
    fn salts_differ_between_hashes() {
        let hasher = cheap_hasher();
        assert_ne!(hasher.hash("same").unwrap(), hasher.hash("same").unwrap());
    }

    #[test]
    fn verify_reads_params_from_the_stored_hash() {
        let old = cheap_hasher();
        let hash = old.hash("secret").unwrap();

        let stronger = Hasher::new(WorkFactor {
            memory_kib: 16,
            iterations: 2,
            parallelism: 1,
        })
        .unwrap();
        assert!(stronger.verify("secret", &hash).unwrap());
    }

    #[test]
    fn garbage_hash_is_an_error() {
        let hasher = cheap_hasher();
        assert!(matches!(hasher.verify("x", "not-a-phc-string"), Err(DbError::Hash(_))));
    }

    #[test]
    fn invalid_work_factor_is_rejected() {
        let res = Hasher::new(WorkFactor {
            memory_kib: 1,
            iterations: 0,
            parallelism: 1,
        });
        assert!(res.is_err());
    }
}

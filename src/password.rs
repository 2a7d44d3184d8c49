use argon2::{
    Argon2,
    password_hash::{PasswordHasher, SaltString, rand_core::OsRng},
};

use crate::error::PasswordError;

/// Hashes a password with Argon2id (default parameters) and a fresh random salt.
/// The result is a self-describing PHC string (algorithm, parameters, salt and hash)
/// and is stored as-is in `users.password_hash`.
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PasswordError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use argon2::password_hash::{PasswordHash, PasswordVerifier};

    fn verifies(password: &str, hash: &str) -> bool {
        let parsed = PasswordHash::new(hash).expect("hash must be a PHC string");
        Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok()
    }

    #[test]
    fn hash_is_phc_argon2() {
        let hash = hash_password("s3cret-pass").expect("hashing failed");
        assert!(hash.starts_with("$argon2"));
    }

    #[test]
    fn hash_verifies_only_the_original_password() {
        let hash = hash_password("s3cret-pass").expect("hashing failed");
        assert!(verifies("s3cret-pass", &hash));
        assert!(!verifies("wrong", &hash));
    }

    #[test]
    fn salts_differ() {
        let a = hash_password("same").unwrap();
        let b = hash_password("same").unwrap();
        assert_ne!(a, b);
    }
}

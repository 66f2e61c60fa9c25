use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use crate::error::AppError;

/// Hashes an exam admission code so only the digest is ever stored.
pub fn hash_admission_code(code: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);

    let argon2 = Argon2::default();

    let code_hash = argon2
        .hash_password(code.as_bytes(), &salt)
        .map_err(|e| AppError::InternalServerError(e.to_string()))?
        .to_string();

    Ok(code_hash)
}

pub fn verify_admission_code(code: &str, code_hash: &str) -> Result<bool, AppError> {
    let parsed_hash = PasswordHash::new(code_hash)
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    let result = Argon2::default().verify_password(code.as_bytes(), &parsed_hash);

    match result {
        Ok(_) => Ok(true),
        Err(_) => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admission_code_verifies() {
        let hash = hash_admission_code("open-sesame").unwrap();
        assert_ne!(hash, "open-sesame");
        assert!(verify_admission_code("open-sesame", &hash).unwrap());
        assert!(!verify_admission_code("open-sesame ", &hash).unwrap());
    }
}

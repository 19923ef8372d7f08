use argon2::{
    Argon2,
    password_hash::{
        Error, PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng,
    },
};

pub fn hash_password(password: &str) -> Result<String, Error> {
    let argon2 = Argon2::default();
    let salt = SaltString::generate(&mut OsRng);

    Ok(argon2.hash_password(password.as_bytes(), &salt)?.to_string())
}

/// Fails on a mismatch and on a stored hash that does not parse.
pub fn verify_password(password: &str, hashed: &str) -> Result<(), Error> {
    let argon2 = Argon2::default();
    let parsed = PasswordHash::new(hashed)?;

    argon2.verify_password(password.as_bytes(), &parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let hashed = hash_password("hunter2").unwrap();
        assert!(verify_password("hunter2", &hashed).is_ok());
        assert!(verify_password("hunter3", &hashed).is_err());
    }

    #[test]
    fn garbage_hash_does_not_panic() {
        assert!(verify_password("hunter2", "not-a-phc-string").is_err());
    }
}

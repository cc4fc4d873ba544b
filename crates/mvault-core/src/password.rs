//! Master password policy and generation

use rand::{rngs::OsRng, Rng};

use crate::error::{Result, VaultError};

/// Minimum master password length, in characters
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Default length of generated passwords
pub const DEFAULT_GENERATED_LENGTH: usize = 16;

const CHARSET: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789!@#$%^&*()_+~`|}{[]:;?><,./-=";

/// Validate a new master password chosen at setup or migration
pub fn validate_new_password(password: &str, confirmation: &str) -> Result<()> {
    validate_password_strength(password)?;
    if password != confirmation {
        return Err(VaultError::Validation("Passwords do not match".to_string()));
    }
    Ok(())
}

/// Enforce the minimum length policy
pub fn validate_password_strength(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(VaultError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    Ok(())
}

/// Generate a random password from the OS RNG
pub fn generate_strong_password(length: usize) -> String {
    let mut rng = OsRng;
    (0..length)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}

use garde::Validate;

use crate::error::{AppError, Result};

/// Validates a username.
///
/// # Arguments
///
/// * `username` - The username to validate.
///
/// # Returns
///
/// A `Result<()>` indicating whether the username is valid.
pub fn validate_username(username: &str) -> Result<()> {
    if username.is_empty() || username.len() < 3 {
        return Err(AppError::Validation(
            "Username must be at least 3 characters long".to_string(),
        ));
    }

    if username.len() > 255 {
        return Err(AppError::Validation(
            "Username must be at most 255 characters".to_string(),
        ));
    }

    if !username.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '.') {
        return Err(AppError::Validation(
            "Username can only contain letters, numbers, dots, underscores, and hyphens".to_string(),
        ));
    }

    Ok(())
}

/// Validates a password before it is hashed.
///
/// # Arguments
///
/// * `password` - The password to validate.
///
/// # Returns
///
/// A `Result<()>` indicating whether the password is valid.
pub fn validate_password(password: &str) -> Result<()> {
    if password.len() < 8 {
        return Err(AppError::Validation(
            "Password must be at least 8 characters long".to_string(),
        ));
    }

    if password.len() > 128 {
        return Err(AppError::Validation(
            "Password must be at most 128 characters".to_string(),
        ));
    }

    Ok(())
}

/// `garde` rule wrapping [`validate_username`].
pub fn username_rule(value: &str, _: &()) -> garde::Result {
    validate_username(value).map_err(|e| match e {
        AppError::Validation(msg) => garde::Error::new(msg),
        other => garde::Error::new(other.to_string()),
    })
}

/// Runs a payload's `garde` rules, turning a report into a validation error.
pub fn validate_payload<T>(payload: T) -> Result<T>
where
    T: Validate<Context = ()>,
{
    payload
        .validate()
        .map_err(|report| AppError::Validation(report.to_string()))?;
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usernames_follow_the_character_policy() {
        assert!(validate_username("m.santos").is_ok());
        assert!(validate_username("ab").is_err());
        assert!(validate_username("drop table;").is_err());
    }

    #[test]
    fn short_passwords_are_rejected() {
        assert!(validate_password("hunter2").is_err());
        assert!(validate_password("correct horse").is_ok());
    }
}

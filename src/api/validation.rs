//! Input validation for API requests.
//!
//! Field validators return `Err(message)`; controllers collect failures
//! through the `ValidationErrorBuilder` from the `error` module and fail
//! with one aggregated 400 response.

use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Regex for validating user names (alphanumeric with dashes/underscores)
    static ref USER_NAME_REGEX: Regex = Regex::new(
        r"^[a-zA-Z0-9]([a-zA-Z0-9_-]*[a-zA-Z0-9])?$"
    ).unwrap();

    /// Regex for a pragmatic email format check
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[^@\s]+@[^@\s]+\.[^@\s]+$"
    ).unwrap();
}

/// Validate a user name
pub fn validate_user_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("user name is required".to_string());
    }

    if name.len() < 2 {
        return Err("user name is too short (min 2 characters)".to_string());
    }

    if name.len() > 64 {
        return Err("user name is too long (max 64 characters)".to_string());
    }

    if !USER_NAME_REGEX.is_match(name) {
        return Err(
            "user name must be alphanumeric with dashes or underscores, starting and ending with alphanumeric".to_string()
        );
    }

    Ok(())
}

/// Validate an email address
pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("email is required".to_string());
    }

    if email.len() > 254 {
        return Err("email is too long (max 254 characters)".to_string());
    }

    if !EMAIL_REGEX.is_match(email) {
        return Err("invalid email format".to_string());
    }

    Ok(())
}

/// Validate a password
pub fn validate_password(password: &str) -> Result<(), String> {
    if password.is_empty() {
        return Err("password is required".to_string());
    }

    if password.len() < 6 {
        return Err("password is too short (min 6 characters)".to_string());
    }

    if password.len() > 128 {
        return Err("password is too long (max 128 characters)".to_string());
    }

    Ok(())
}

/// Validate a cat name
pub fn validate_cat_name(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("name is required".to_string());
    }

    if name.len() > 100 {
        return Err("name is too long (max 100 characters)".to_string());
    }

    Ok(())
}

/// Validate a cat weight in kilograms
pub fn validate_weight(weight: f64) -> Result<(), String> {
    if !weight.is_finite() || weight <= 0.0 {
        return Err("weight must be a positive number".to_string());
    }

    if weight > 50.0 {
        return Err("weight is implausibly high (max 50)".to_string());
    }

    Ok(())
}

/// Validate and parse a birthdate in ISO format (YYYY-MM-DD)
pub fn validate_birthdate(birthdate: &str) -> Result<NaiveDate, String> {
    if birthdate.is_empty() {
        return Err("birthdate is required".to_string());
    }

    NaiveDate::parse_from_str(birthdate, "%Y-%m-%d")
        .map_err(|_| "birthdate must be a valid date in YYYY-MM-DD format".to_string())
}

/// Validate a free-form address before it is handed to the geocoder
pub fn validate_address(address: &str) -> Result<(), String> {
    if address.trim().is_empty() {
        return Err("address is required".to_string());
    }

    if address.len() > 512 {
        return Err("address is too long (max 512 characters)".to_string());
    }

    Ok(())
}

/// Validate a UUID string
pub fn validate_uuid(id: &str, field_name: &str) -> Result<(), String> {
    if id.is_empty() {
        return Err(format!("{} is required", field_name));
    }

    if uuid::Uuid::parse_str(id).is_err() {
        return Err(format!("invalid {} format", field_name));
    }

    Ok(())
}

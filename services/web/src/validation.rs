//! Input validation utilities

use regex::Regex;
use std::{collections::HashMap, sync::OnceLock};

/// Field errors in the order the fields were checked
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationErrors {
    errors: Vec<(&'static str, String)>,
}

impl ValidationErrors {
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.errors
            .iter()
            .find(|(name, _)| *name == field)
            .map(|(_, message)| message.as_str())
    }

    /// All messages joined for a flash banner
    pub fn summary(&self) -> String {
        self.errors
            .iter()
            .map(|(_, message)| message.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn check(&mut self, field: &'static str, result: Result<(), String>) {
        if let Err(message) = result {
            self.errors.push((field, message));
        }
    }
}

fn field<'a>(form: &'a HashMap<String, String>, name: &str) -> &'a str {
    form.get(name).map(String::as_str).unwrap_or_default()
}

/// Validate that a value is present
pub fn validate_required(value: &str, label: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{} is required", label));
    }

    Ok(())
}

/// Validate email
pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("Email is required".to_string());
    }

    if email.len() > 254 {
        return Err("Email must be at most 254 characters long".to_string());
    }

    static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = EMAIL_REGEX.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
            .expect("Failed to compile email regex")
    });

    if !regex.is_match(email) {
        return Err("Invalid email format".to_string());
    }

    Ok(())
}

/// Validate a Malagasy phone number: `+261`, `261` or `0`, an operator
/// digit other than 0 or 1, then eight digits
pub fn validate_phone(phone: &str) -> Result<(), String> {
    if phone.is_empty() {
        return Err("Phone number is required".to_string());
    }

    static PHONE_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = PHONE_REGEX.get_or_init(|| {
        Regex::new(r"^(\+261|261|0)[23-9]\d{8}$").expect("Failed to compile phone regex")
    });

    if !regex.is_match(phone) {
        return Err("Invalid phone number format (e.g. 0321234567)".to_string());
    }

    Ok(())
}

/// Validate password
pub fn validate_password(password: &str) -> Result<(), String> {
    if password.is_empty() {
        return Err("Password is required".to_string());
    }

    if password.chars().count() < 6 {
        return Err("Password must be at least 6 characters long".to_string());
    }

    if password.len() > 128 {
        return Err("Password must be at most 128 characters long".to_string());
    }

    Ok(())
}

/// Validate address
pub fn validate_address(address: &str) -> Result<(), String> {
    validate_required(address, "Address")?;

    if address.trim().chars().count() < 10 {
        return Err("Address must be at least 10 characters long".to_string());
    }

    Ok(())
}

/// Validate a submitted registration form
pub fn validate_registration(form: &HashMap<String, String>) -> ValidationErrors {
    let mut errors = ValidationErrors::default();

    let password = field(form, "password");
    errors.check("first_name", validate_required(field(form, "first_name"), "First name"));
    errors.check("last_name", validate_required(field(form, "last_name"), "Last name"));
    errors.check("email", validate_email(field(form, "email").trim()));
    errors.check("phone", validate_phone(field(form, "phone").trim()));
    errors.check("password", validate_password(password));
    errors.check(
        "password_confirm",
        match field(form, "password_confirm") {
            "" => Err("Password confirmation is required".to_string()),
            confirmation if confirmation != password => {
                Err("Passwords do not match".to_string())
            }
            _ => Ok(()),
        },
    );
    errors.check("address", validate_address(field(form, "address")));
    errors.check("quartier", validate_required(field(form, "quartier"), "Quartier"));

    errors
}

/// Validate a submitted login form; `email` holds an email or a phone number
pub fn validate_login(form: &HashMap<String, String>) -> ValidationErrors {
    let mut errors = ValidationErrors::default();
    errors.check(
        "email",
        validate_required(field(form, "email"), "Email or phone number"),
    );
    errors.check("password", validate_required(field(form, "password"), "Password"));
    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ana() -> HashMap<String, String> {
        [
            ("first_name", "Ana"),
            ("last_name", "R"),
            ("email", "a@b.mg"),
            ("phone", "0321234567"),
            ("password", "secret1"),
            ("password_confirm", "secret1"),
            ("address", "Lot 12 Analamanga"),
            ("quartier", "Ambohipo"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("a@b.mg").is_ok());
        assert!(validate_email("").is_err());
        assert!(validate_email("not-an-email").is_err());
        assert!(validate_email("a@b").is_err());
    }

    #[test]
    fn test_validate_phone() {
        assert!(validate_phone("0321234567").is_ok());
        assert!(validate_phone("+261341234567").is_ok());
        assert!(validate_phone("261331234567").is_ok());
        assert!(validate_phone("0121234567").is_err());
        assert!(validate_phone("032123456").is_err());
        assert!(validate_phone("+33612345678").is_err());
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("secret1").is_ok());
        assert!(validate_password("short").is_err());
        assert!(validate_password("").is_err());
    }

    #[test]
    fn test_valid_registration() {
        assert!(validate_registration(&ana()).is_empty());
    }

    #[test]
    fn test_registration_errors_per_field() {
        let mut form = ana();
        form.insert("password_confirm".to_string(), "secret2".to_string());
        form.insert("address".to_string(), "Lot 1".to_string());
        form.remove("quartier");

        let errors = validate_registration(&form);
        assert_eq!(errors.get("password_confirm"), Some("Passwords do not match"));
        assert_eq!(
            errors.get("address"),
            Some("Address must be at least 10 characters long")
        );
        assert_eq!(errors.get("quartier"), Some("Quartier is required"));
        assert_eq!(errors.get("email"), None);
        assert!(errors.summary().starts_with("Passwords do not match"));
    }

    #[test]
    fn test_validate_login() {
        let mut form = HashMap::new();
        form.insert("email".to_string(), "0321234567".to_string());
        assert_eq!(validate_login(&form).get("password"), Some("Password is required"));

        form.insert("password".to_string(), "x".to_string());
        assert!(validate_login(&form).is_empty());
    }
}

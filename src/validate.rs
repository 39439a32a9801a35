use validator::ValidationError;

/// Product categories accepted by the catalog. The source schema had an abandoned
/// categories table; the final shape is a validated value on the product itself.
pub const CATEGORIES: &[&str] = &[
    "electronics",
    "fashion",
    "food",
    "home",
    "beauty",
    "sports",
    "other",
];

const SPECIALS: &str = "!@#$%^&*(),.?\":{}|<>";

pub fn password_strength(password: &str) -> Result<(), ValidationError> {
    if password.len() <= 8 {
        return Err(error(
            "password_length",
            "Password must be longer than 8 characters",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(error(
            "password_uppercase",
            "Password should contain at least one uppercase letter",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err(error(
            "password_lowercase",
            "Password should contain at least one lowercase letter",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(error(
            "password_digit",
            "Password should contain at least one digit",
        ));
    }
    if !password.chars().any(|c| SPECIALS.contains(c)) {
        return Err(error(
            "password_special",
            "Password should contain at least one special character",
        ));
    }
    Ok(())
}

pub fn category(value: &str) -> Result<(), ValidationError> {
    if CATEGORIES.contains(&value) {
        Ok(())
    } else {
        Err(error("category", "Unknown product category"))
    }
}

fn error(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    err
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strong_password_passes() {
        assert!(password_strength("Str0ng!pass").is_ok());
    }

    #[test]
    fn weak_passwords_are_rejected() {
        assert!(password_strength("short1!A").is_err());
        assert!(password_strength("nouppercase1!").is_err());
        assert!(password_strength("NOLOWERCASE1!").is_err());
        assert!(password_strength("NoDigitsHere!").is_err());
        assert!(password_strength("NoSpecials123").is_err());
    }

    #[test]
    fn category_whitelist() {
        assert!(category("electronics").is_ok());
        assert!(category("weapons").is_err());
    }
}

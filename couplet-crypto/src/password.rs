//! Random password generation for export and archive encryption.

use rand::Rng;
use rand::rngs::OsRng;

/// Fixed charset: unambiguous ASCII letters, digits, and a few symbols.
const CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz23456789!@#$%^&*-_=+";

/// Generates a cryptographically random password of the given length.
pub fn generate_password(length: usize) -> String {
    let mut rng = OsRng;
    (0..length)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}

/// Coarse, non-secret description of a password's shape — safe to persist
/// as a hint. Never reveals the password itself.
pub fn shape_hint(password: &str) -> String {
    let mut classes = Vec::new();
    if password.chars().any(|c| c.is_ascii_uppercase()) {
        classes.push("upper");
    }
    if password.chars().any(|c| c.is_ascii_lowercase()) {
        classes.push("lower");
    }
    if password.chars().any(|c| c.is_ascii_digit()) {
        classes.push("digit");
    }
    if password.chars().any(|c| !c.is_ascii_alphanumeric()) {
        classes.push("symbol");
    }
    format!("{} chars, {}", password.chars().count(), classes.join("+"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_password_has_requested_length() {
        assert_eq!(generate_password(32).len(), 32);
    }

    #[test]
    fn generated_password_stays_in_charset() {
        let pw = generate_password(256);
        assert!(pw.bytes().all(|b| CHARSET.contains(&b)));
    }

    #[test]
    fn two_passwords_differ() {
        assert_ne!(generate_password(32), generate_password(32));
    }

    #[test]
    fn shape_hint_never_contains_password() {
        let pw = generate_password(24);
        let hint = shape_hint(&pw);
        assert!(!hint.contains(&pw));
        assert!(hint.starts_with("24 chars"));
    }
}

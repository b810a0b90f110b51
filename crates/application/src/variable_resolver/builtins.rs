//! Built-in dynamic variables
//!
//! These variables are prefixed with $ and generate new values on each resolution.

use chrono::Utc;
use rand::Rng;
use uuid::Uuid;

/// Generates values for built-in dynamic variables.
pub struct BuiltinVariables;

impl BuiltinVariables {
    /// Resolves a built-in variable name to its value.
    /// Returns None if the name is not a recognized built-in.
    #[must_use]
    pub fn resolve(name: &str) -> Option<String> {
        match name {
            "$guid" | "$uuid" | "$randomUUID" => Some(Uuid::new_v4().to_string()),
            "$timestamp" => Some(Utc::now().timestamp().to_string()),
            "$isoTimestamp" => Some(Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)),
            "$randomInt" => Some(rand::rng().random_range(0..=1000).to_string()),
            "$randomAlphaNumeric" => Some(Self::random_alphanumeric(1)),
            "$randomBoolean" => Some(rand::rng().random_bool(0.5).to_string()),
            "$randomEmail" => Some(format!(
                "{}@example.com",
                Self::random_alphanumeric(8).to_lowercase()
            )),
            "$randomFirstName" => Some(Self::pick(FIRST_NAMES)),
            "$randomLastName" => Some(Self::pick(LAST_NAMES)),
            "$randomHexColor" => Some(format!("#{:06x}", rand::rng().random_range(0..=0xFF_FFFF))),
            _ => None,
        }
    }

    /// Returns whether the name is a known built-in.
    #[must_use]
    pub fn is_builtin(name: &str) -> bool {
        Self::resolve(name).is_some()
    }

    fn random_alphanumeric(len: usize) -> String {
        const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
        let mut rng = rand::rng();
        (0..len)
            .map(|_| CHARSET[rng.random_range(0..CHARSET.len())] as char)
            .collect()
    }

    fn pick(names: &[&str]) -> String {
        names[rand::rng().random_range(0..names.len())].to_string()
    }
}

const FIRST_NAMES: &[&str] = &[
    "James", "Mary", "John", "Patricia", "Robert", "Jennifer", "Michael", "Linda", "Emma",
    "Olivia", "Liam", "Noah", "Ava",
];

const LAST_NAMES: &[&str] = &[
    "Smith", "Johnson", "Williams", "Brown", "Jones", "Garcia", "Miller", "Davis", "Wilson",
    "Anderson", "Taylor", "Moore", "Lee",
];

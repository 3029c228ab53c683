//! Input validation for identifiers, slugs, capability names and record fields.
//!
//! ## Character Whitelists
//!
//! - Natural ids: `[a-z]{5}`, legacy ids `[0-9]+`.
//! - Slugs: ``[a-zA-Z0-9!@$()`.+,_"-]``, 1-64 bytes (URL path safe).
//! - Capability names: `[a-z][a-z_]{0,31}`.
//! - Record field names: `[a-z0-9_]`, 1-64 bytes.

use std::fmt;

use rand::Rng;

/// Length of a natural id.
pub const NATURAL_ID_LEN: usize = 5;

/// Maximum slug length in bytes.
pub const MAX_SLUG_BYTES: usize = 64;

/// Maximum capability name length in bytes.
pub const MAX_CAPABILITY_BYTES: usize = 32;

/// Maximum record field name length in bytes.
pub const MAX_FIELD_NAME_BYTES: usize = 64;

const NATURAL_ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz";

/// Validation error with structured context.
///
/// Contains the specific constraint that was violated and the field name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// The field that failed validation.
    pub field: String,
    /// Description of the violated constraint.
    pub constraint: String,
}

impl ValidationError {
    fn new(field: &str, constraint: impl Into<String>) -> Self {
        Self { field: field.to_string(), constraint: constraint.into() }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.constraint)
    }
}

impl std::error::Error for ValidationError {}

/// Returns true if `id` is a natural id (`[a-z]{5}`).
pub fn is_natural_id(id: &str) -> bool {
    id.len() == NATURAL_ID_LEN && id.bytes().all(|b| b.is_ascii_lowercase())
}

/// Returns true if `id` is a pre-natural-id numeric account id.
pub fn is_legacy_id(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit())
}

/// Generates a random natural id.
pub fn generate_natural_id<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..NATURAL_ID_LEN)
        .map(|_| char::from(NATURAL_ID_ALPHABET[rng.random_range(0..NATURAL_ID_ALPHABET.len())]))
        .collect()
}

/// Validates an account id: a natural id or a legacy numeric id.
///
/// # Errors
///
/// Returns [`ValidationError`] if `id` matches neither form.
pub fn validate_account_id(id: &str) -> Result<(), ValidationError> {
    if is_natural_id(id) || is_legacy_id(id) {
        return Ok(());
    }
    Err(ValidationError::new(
        "account_id",
        format!("{id:?} is not a natural id ([a-z]{{5}}) or a legacy numeric id"),
    ))
}

/// Validates a URL-safe slug.
///
/// # Errors
///
/// Returns [`ValidationError`] if the slug is empty, longer than
/// [`MAX_SLUG_BYTES`], or contains characters outside the slug whitelist.
pub fn validate_slug(slug: &str) -> Result<(), ValidationError> {
    if slug.is_empty() {
        return Err(ValidationError::new("slug", "must not be empty"));
    }
    if slug.len() > MAX_SLUG_BYTES {
        return Err(ValidationError::new(
            "slug",
            format!("length {} bytes exceeds maximum {} bytes", slug.len(), MAX_SLUG_BYTES),
        ));
    }
    if let Some(pos) = slug.find(|c: char| !is_slug_char(c)) {
        return Err(ValidationError::new(
            "slug",
            format!(
                "contains invalid character {:?} at byte offset {}",
                slug[pos..].chars().next().unwrap_or('\0'),
                pos
            ),
        ));
    }
    Ok(())
}

/// Validates a capability name.
///
/// # Errors
///
/// Returns [`ValidationError`] if the name is empty, too long, does not start
/// with a lowercase letter, or contains characters outside `[a-z_]`.
pub fn validate_capability_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::new("capability", "must not be empty"));
    }
    if name.len() > MAX_CAPABILITY_BYTES {
        return Err(ValidationError::new(
            "capability",
            format!("length {} bytes exceeds maximum {} bytes", name.len(), MAX_CAPABILITY_BYTES),
        ));
    }
    if !name.starts_with(|c: char| c.is_ascii_lowercase()) {
        return Err(ValidationError::new("capability", "must start with a lowercase letter"));
    }
    if name.contains(|c: char| !(c.is_ascii_lowercase() || c == '_')) {
        return Err(ValidationError::new("capability", format!("{name:?} allows only [a-z_]")));
    }
    Ok(())
}

/// Validates a record field name.
///
/// # Errors
///
/// Returns [`ValidationError`] if the name is empty, too long, or contains
/// characters outside `[a-z0-9_]`.
pub fn validate_field_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::new("field", "must not be empty"));
    }
    if name.len() > MAX_FIELD_NAME_BYTES {
        return Err(ValidationError::new(
            "field",
            format!("length {} bytes exceeds maximum {} bytes", name.len(), MAX_FIELD_NAME_BYTES),
        ));
    }
    if name.contains(|c: char| !(c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')) {
        return Err(ValidationError::new("field", format!("{name:?} allows only [a-z0-9_]")));
    }
    Ok(())
}

fn is_slug_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "!@$()`.+,_\"-".contains(c)
}

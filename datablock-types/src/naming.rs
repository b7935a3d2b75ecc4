//! Deterministic name disambiguation.
//!
//! Names collide per `(kind, library)` namespace. A colliding name is never
//! overwritten: the newcomer receives the lowest free numeric suffix
//! (`Cube`, `Cube.001`, `Cube.002`, ...). The functions here are pure so the
//! policy can be tested without a store.

/// Default maximum length of an entity name, in bytes.
pub const DEFAULT_MAX_NAME_LEN: usize = 63;

/// Smallest name limit [`unique_name`] honours. Smaller limits are raised to
/// this so a base character and a `.NNN` suffix always fit.
pub const MIN_NAME_LEN: usize = 8;

const SUFFIX_SEPARATOR: char = '.';

/// Splits a trailing `.NNN` numeric suffix off a name.
///
/// `"Cube.012"` yields `("Cube", Some(12))`; names without an all-digit suffix
/// are returned unchanged with `None`.
pub fn split_numeric_suffix(name: &str) -> (&str, Option<u32>) {
    if let Some(dot) = name.rfind(SUFFIX_SEPARATOR) {
        let digits = &name[dot + 1..];
        if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(number) = digits.parse::<u32>() {
                return (&name[..dot], Some(number));
            }
        }
    }
    (name, None)
}

/// Truncates `name` to at most `max_len` bytes without splitting a character.
pub fn truncate_name(name: &str, max_len: usize) -> &str {
    if name.len() <= max_len {
        return name;
    }
    let mut end = max_len;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

/// Returns `requested` if it is free, otherwise the lowest free `base.NNN`.
///
/// `is_taken` reports whether a candidate already exists in the namespace.
/// The result never exceeds `max_len` bytes (at least [`MIN_NAME_LEN`]); the
/// base is shortened to make room for the suffix when necessary.
pub fn unique_name(requested: &str, max_len: usize, is_taken: impl Fn(&str) -> bool) -> String {
    let max_len = max_len.max(MIN_NAME_LEN);
    let requested = truncate_name(requested, max_len);
    if !is_taken(requested) {
        return requested.to_string();
    }

    let (base, _) = split_numeric_suffix(requested);
    let mut number: u32 = 1;
    loop {
        let suffix = format!("{SUFFIX_SEPARATOR}{number:03}");
        let room = max_len.saturating_sub(suffix.len());
        let candidate = format!("{}{}", truncate_name(base, room), suffix);
        if !is_taken(&candidate) {
            return candidate;
        }
        number += 1;
    }
}

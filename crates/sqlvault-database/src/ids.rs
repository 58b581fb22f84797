//! Random identifiers.

use crate::models::{
    ENTRY_ID_PREFIX, ENTRY_ID_SUFFIX, RANDOM_ID_LENGTH, USER_ID_LENGTH, USER_PASSWORD_LENGTH,
};
use crate::value::Value;
use rand::distributions::Alphanumeric;
use rand::Rng;

/// Random alphanumeric string of `len` characters.
pub fn random_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// New `sys_eid` value: `eid::<32 random chars>::eid`.
pub fn new_entry_id() -> String {
    format!(
        "{}{}{}",
        ENTRY_ID_PREFIX,
        random_string(RANDOM_ID_LENGTH),
        ENTRY_ID_SUFFIX
    )
}

/// Whether `value` has the shape of an entry id.
pub fn is_entry_id(value: &str) -> bool {
    value.len() > ENTRY_ID_PREFIX.len() + ENTRY_ID_SUFFIX.len()
        && value.starts_with(ENTRY_ID_PREFIX)
        && value.ends_with(ENTRY_ID_SUFFIX)
}

/// Random string that the codec keeps as a string (never re-typed to a number).
fn random_text(len: usize) -> String {
    loop {
        let candidate = random_string(len);
        if matches!(Value::infer_str(&candidate), Value::Str(_)) {
            return candidate;
        }
    }
}

pub fn new_user_id() -> String {
    random_text(USER_ID_LENGTH)
}

pub fn new_user_password() -> String {
    random_text(USER_PASSWORD_LENGTH)
}

/// Placeholder record id for CREATE statements without one.
pub fn create_record_id(table: &str) -> String {
    format!("create-{}-{}", table, random_string(RANDOM_ID_LENGTH))
}

/// Placeholder record id for system-table statements without one.
pub fn system_record_id(action: &str) -> String {
    format!(
        "system-{}-{}",
        action.to_lowercase(),
        random_string(RANDOM_ID_LENGTH)
    )
}

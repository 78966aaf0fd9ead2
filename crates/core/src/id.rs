use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidId {
    #[error("{0} ID is required")]
    Missing(&'static str),
    #[error("Invalid {0} ID format")]
    Malformed(&'static str),
}

const MAX_USER_ID_LEN: usize = 128;

/// Resource ids minted by this service are hyphenated UUIDs.
pub fn validate_id(kind: &'static str, id: &str) -> Result<(), InvalidId> {
    if id.trim().is_empty() {
        return Err(InvalidId::Missing(kind));
    }
    Uuid::parse_str(id)
        .map(|_| ())
        .map_err(|_| InvalidId::Malformed(kind))
}

/// User ids come from the identity provider, which is free to pick its own
/// format (UUIDs, 24-hex object ids, ...). They only have to be usable as a
/// single URL path segment.
pub fn validate_user_id(kind: &'static str, id: &str) -> Result<(), InvalidId> {
    if id.trim().is_empty() {
        return Err(InvalidId::Missing(kind));
    }
    let usable = id.len() <= MAX_USER_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':' | '|'));
    if usable {
        Ok(())
    } else {
        Err(InvalidId::Malformed(kind))
    }
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

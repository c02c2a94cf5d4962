use ulid::Ulid;

/// Generates a new ULID-based ID with the given prefix.
///
/// # Examples
/// ```
/// let id = parley_common::id::prefixed_ulid("conn");
/// assert!(id.starts_with("conn_"));
/// ```
pub fn prefixed_ulid(prefix: &str) -> String {
    format!("{}_{}", prefix, Ulid::new())
}

/// Marker trait for types that represent a prefixed ID.
pub trait PrefixedId {
    const PREFIX: &'static str;

    fn generate() -> String {
        prefixed_ulid(Self::PREFIX)
    }
}

/// Well-known ID prefixes.
pub mod prefix {
    /// Live transport session.
    pub const CONNECTION: &str = "conn";
}

/// Returns true when `id` carries `prefix` followed by a well-formed ULID.
pub fn has_prefix(id: &str, prefix: &str) -> bool {
    id.strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('_'))
        .is_some_and(|ulid| Ulid::from_string(ulid).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixed_ulid_format() {
        let id = prefixed_ulid("conn");
        assert!(id.starts_with("conn_"));
        // ULID is 26 chars, plus prefix + underscore
        assert_eq!(id.len(), 5 + 26);
    }

    #[test]
    fn test_uniqueness() {
        let a = prefixed_ulid(prefix::CONNECTION);
        let b = prefixed_ulid(prefix::CONNECTION);
        assert_ne!(a, b);
    }

    #[test]
    fn test_has_prefix() {
        let id = prefixed_ulid(prefix::CONNECTION);
        assert!(has_prefix(&id, prefix::CONNECTION));
        assert!(!has_prefix(&id, "room"));
        assert!(!has_prefix("conn_not-a-ulid", prefix::CONNECTION));
    }
}

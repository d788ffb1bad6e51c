use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidAnnotationKey {
    #[error("annotation key must not be empty")]
    Empty,

    #[error("annotation key must contain at most one '/' separator")]
    TooManySeparators,

    #[error("annotation key prefix {0:?} is not a valid DNS subdomain")]
    InvalidPrefix(String),

    #[error(
        "annotation key name {0:?} must be at most 63 characters of alphanumerics, \
         '-', '_' or '.', starting and ending with an alphanumeric"
    )]
    InvalidName(String),
}

/// Checks a key against the rules the cluster API applies to annotation
/// keys: an optional DNS subdomain prefix separated by '/' from a
/// qualified name part.
pub fn validate_annotation_key(key: &str) -> Result<(), InvalidAnnotationKey> {
    use InvalidAnnotationKey::*;

    if key.is_empty() {
        return Err(Empty);
    }

    let mut parts = key.splitn(3, '/');

    let (prefix, name) = match (parts.next(), parts.next(), parts.next()) {
        (Some(name), None, _) => (None, name),
        (Some(prefix), Some(name), None) => (Some(prefix), name),
        _ => return Err(TooManySeparators),
    };

    if let Some(prefix) = prefix {
        if !is_dns_subdomain(prefix) {
            return Err(InvalidPrefix(prefix.to_string()));
        }
    }

    if !is_qualified_name(name) {
        return Err(InvalidName(name.to_string()));
    }

    Ok(())
}

fn is_qualified_name(name: &str) -> bool {
    if name.is_empty() || name.len() > 63 {
        return false;
    }

    let bytes = name.as_bytes();

    bytes[0].is_ascii_alphanumeric()
        && bytes[bytes.len() - 1].is_ascii_alphanumeric()
        && bytes
            .iter()
            .all(|&b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b'.')
}

fn is_dns_subdomain(s: &str) -> bool {
    !s.is_empty() && s.len() <= 253 && s.split('.').all(is_dns_label)
}

fn is_dns_label(label: &str) -> bool {
    if label.is_empty() || label.len() > 63 {
        return false;
    }

    let bytes = label.as_bytes();
    let lower_alnum = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();

    lower_alnum(bytes[0])
        && lower_alnum(bytes[bytes.len() - 1])
        && bytes.iter().all(|&b| lower_alnum(b) || b == b'-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_well_formed_keys() {
        assert_eq!(validate_annotation_key("valid-key"), Ok(()));
        assert_eq!(validate_annotation_key("test"), Ok(()));
        assert_eq!(validate_annotation_key("a_b.c-d"), Ok(()));
        assert_eq!(validate_annotation_key("svc-exposer.sidero.dev/port"), Ok(()));
    }

    #[test]
    fn rejects_malformed_keys() {
        assert_eq!(validate_annotation_key(""), Err(InvalidAnnotationKey::Empty));
        assert!(validate_annotation_key("invalid key 1").is_err());
        assert!(validate_annotation_key("-leading").is_err());
        assert!(validate_annotation_key("trailing-").is_err());
        assert!(validate_annotation_key("a/b/c").is_err());
        assert!(validate_annotation_key("/no-prefix").is_err());
        assert!(validate_annotation_key("prefix/").is_err());
        assert!(validate_annotation_key("UpperCase.Domain/port").is_err());
        assert!(validate_annotation_key(&"x".repeat(64)).is_err());
    }
}

use serde::{Serialize, Serializer};
use std::fmt;

/// Wraps personal data (attendee emails, names) so it never reaches log output verbatim.
///
/// `Debug` and `Display` render a mask that keeps only the first character and, for
/// email-shaped values, the domain. Serialization passes the real value through, since
/// API responses need it.
#[derive(Clone, PartialEq, Eq)]
pub struct Masked<T>(pub T);

impl<T: AsRef<str>> Masked<T> {
    fn redacted(&self) -> String {
        let value = self.0.as_ref();
        let first = value.chars().next().map(String::from).unwrap_or_default();
        match value.rsplit_once('@') {
            Some((_, domain)) => format!("{first}***@{domain}"),
            None if value.is_empty() => String::new(),
            None => format!("{first}***"),
        }
    }
}

impl<T: AsRef<str>> fmt::Debug for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.redacted())
    }
}

impl<T: AsRef<str>> fmt::Display for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

impl<T: Serialize> Serialize for Masked<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_keeps_domain_only() {
        let email = Masked("jane.doe@example.com");
        assert_eq!(email.to_string(), "j***@example.com");
        assert_eq!(format!("{:?}", email), "\"j***@example.com\"");
    }

    #[test]
    fn test_plain_value_is_masked() {
        assert_eq!(Masked("Jane").to_string(), "J***");
        assert_eq!(Masked("").to_string(), "");
    }

    #[test]
    fn test_serialization_is_transparent() {
        let json = serde_json::to_string(&Masked("a@example.com".to_string())).unwrap();
        assert_eq!(json, "\"a@example.com\"");
    }
}

use std::{
    fmt,
    fmt::{Debug, Display},
};

const REDACTED: &str = "*redacted*";

/// Wrapper for values that must never reach a log line: webhook signing secrets, token keys,
/// at-rest key material.
///
/// Both `Debug` and `Display` render [`REDACTED`], so a `Secret` buried inside a logged config
/// struct stays unreadable. Call [`Secret::reveal`] at the point of use.
#[derive(Clone, Default)]
pub struct Secret<T>
where T: Clone + Default
{
    value: T,
}

impl<T: Clone + Default> Secret<T> {
    pub fn new(value: T) -> Self {
        Self { value }
    }

    pub fn reveal(&self) -> &T {
        &self.value
    }
}

impl<T: Clone + Default> Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl<T: Clone + Default> Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn secrets_redact_in_debug_and_display() {
        let secret = Secret::new("whsec_123".to_string());
        assert_eq!(format!("{secret}"), REDACTED);
        assert_eq!(format!("{secret:?}"), REDACTED);
        assert_eq!(secret.reveal(), "whsec_123");
    }
}

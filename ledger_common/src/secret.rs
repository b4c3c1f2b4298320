use std::{
    fmt,
    fmt::{Debug, Display},
};

/// Wraps a sensitive value (webhook signing secret, API key) so that it never ends up in logs by accident.
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

impl Secret<String> {
    /// True if the wrapped string is non-empty. An empty secret means "not configured".
    pub fn is_set(&self) -> bool {
        !self.value.trim().is_empty()
    }
}

impl<T: Clone + Default> Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("****")
    }
}

impl<T: Clone + Default> Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("****")
    }
}

#[cfg(test)]
mod test {
    use super::Secret;

    #[test]
    fn never_prints_value() {
        let s = Secret::new("whsec_abc".to_string());
        assert_eq!(format!("{s}"), "****");
        assert_eq!(format!("{s:?}"), "****");
        assert_eq!(s.reveal(), "whsec_abc");
        assert!(s.is_set());
        assert!(!Secret::new("  ".to_string()).is_set());
    }
}

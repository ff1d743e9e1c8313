//! Construction-time configuration for [`PosixStore`](crate::PosixStore).

/// Admission limits for a store.
///
/// `None` means unlimited. A store refuses to hand out more than the
/// configured number of live handles (or directory streams); the refused
/// call fails with a resource-exhaustion error after releasing whatever it
/// had already opened.
///
/// ```rust
/// use iostore::StoreConfig;
///
/// let config = StoreConfig::default().with_handle_limit(256);
/// assert_eq!(config.handle_limit, Some(256));
/// assert_eq!(config.dir_limit, None);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct StoreConfig {
    /// Maximum number of open file handles.
    pub handle_limit: Option<usize>,
    /// Maximum number of open directory streams.
    pub dir_limit: Option<usize>,
}

impl StoreConfig {
    /// Limit the number of open file handles.
    pub fn with_handle_limit(mut self, limit: usize) -> Self {
        self.handle_limit = Some(limit);
        self
    }

    /// Limit the number of open directory streams.
    pub fn with_dir_limit(mut self, limit: usize) -> Self {
        self.dir_limit = Some(limit);
        self
    }

    /// Parse a configuration from JSON. Missing fields take their defaults.
    ///
    /// ```rust
    /// # #[cfg(feature = "serde")]
    /// # {
    /// use iostore::StoreConfig;
    ///
    /// let config = StoreConfig::from_json(r#"{ "dir_limit": 8 }"#).unwrap();
    /// assert_eq!(config.dir_limit, Some(8));
    /// assert_eq!(config.handle_limit, None);
    /// # }
    /// ```
    #[cfg(feature = "serde")]
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_unlimited() {
        let config = StoreConfig::default();
        assert!(config.handle_limit.is_none());
        assert!(config.dir_limit.is_none());
    }

    #[test]
    fn builders_set_limits() {
        let config = StoreConfig::default()
            .with_handle_limit(4)
            .with_dir_limit(2);
        assert_eq!(config.handle_limit, Some(4));
        assert_eq!(config.dir_limit, Some(2));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn json_round_trip() {
        let config = StoreConfig::default().with_handle_limit(16);
        let text = serde_json::to_string(&config).unwrap();
        assert_eq!(StoreConfig::from_json(&text).unwrap(), config);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn json_rejects_wrong_types() {
        assert!(StoreConfig::from_json(r#"{ "handle_limit": "many" }"#).is_err());
    }
}

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Localized text: `locale -> text`, e.g. `{"en": "Intro", "ru": "Введение"}`.
///
/// Backed by a `BTreeMap` so serialization order is stable, which keeps
/// published playbook checksums reproducible.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Localized(pub BTreeMap<String, String>);

impl Localized {
    pub fn single(locale: &str, text: &str) -> Self {
        let mut map = BTreeMap::new();
        map.insert(locale.to_string(), text.to_string());
        Self(map)
    }

    /// True when `locale` has non-blank text.
    pub fn has(&self, locale: &str) -> bool {
        self.0.get(locale).is_some_and(|t| !t.trim().is_empty())
    }

    /// Text for `locale`, falling back to `default_locale`.
    pub fn resolve<'a>(&'a self, locale: &str, default_locale: &str) -> Option<&'a str> {
        self.0
            .get(locale)
            .or_else(|| self.0.get(default_locale))
            .map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_text_does_not_count() {
        let l = Localized::single("en", "  ");
        assert!(!l.has("en"));
    }

    #[test]
    fn resolve_falls_back_to_default() {
        let l = Localized::single("en", "Intro");
        assert_eq!(l.resolve("ru", "en"), Some("Intro"));
        assert_eq!(l.resolve("ru", "kk"), None);
    }

    #[test]
    fn deserializes_from_plain_object() {
        let l: Localized = serde_json::from_str(r#"{"en":"A","ru":"Б"}"#).unwrap();
        assert!(l.has("ru"));
    }
}

//! Synthesis voice catalog and automatic voice selection

use serde::{Deserialize, Serialize};

/// A text-to-speech voice reported by the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Voice {
    pub voice_uri: String,
    pub name: String,
    /// BCP 47 tag, e.g. "es-MX"
    pub lang: String,
    /// Synthesised on device rather than by a remote service
    pub local_service: bool,
    /// Platform default for its language
    pub default: bool,
}

/// Pick a voice for `lang` when the caller did not choose one
///
/// Preference order: exact language served locally, exact language, language
/// prefix marked default, language prefix served locally, any language prefix
/// match. `None` means the platform default voice should be used.
pub fn select_voice<'a>(voices: &'a [Voice], lang: &str) -> Option<&'a Voice> {
    let prefix: String = lang.chars().take(2).collect();
    let same_prefix = |v: &Voice| v.lang.starts_with(&prefix);

    voices
        .iter()
        .find(|v| v.lang == lang && v.local_service)
        .or_else(|| voices.iter().find(|v| v.lang == lang))
        .or_else(|| voices.iter().find(|v| same_prefix(v) && v.default))
        .or_else(|| voices.iter().find(|v| same_prefix(v) && v.local_service))
        .or_else(|| voices.iter().find(|v| same_prefix(v)))
}

/// Voices known so far
///
/// Platforms publish their voice list asynchronously, often empty at first.
#[derive(Debug, Clone, Default)]
pub struct VoiceCatalog {
    voices: Vec<Voice>,
}

impl VoiceCatalog {
    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    /// Take in a freshly read platform list
    ///
    /// An empty read keeps what we had. A `selected` voice missing from the
    /// fresh list stays in the catalog so the choice is not lost. Returns true
    /// when the catalog changed.
    pub fn merge(&mut self, fresh: Vec<Voice>, selected: Option<&Voice>) -> bool {
        if fresh.is_empty() {
            return false;
        }

        let mut merged = fresh;
        if let Some(selected) = selected {
            if !merged.iter().any(|v| v.voice_uri == selected.voice_uri) {
                log::debug!("Keeping selected voice '{}' missing from platform list", selected.name);
                merged.push(selected.clone());
            }
        }

        if merged == self.voices {
            return false;
        }

        log::info!("Voice catalog updated: {} voices", merged.len());
        self.voices = merged;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voice(name: &str, lang: &str, local: bool, default: bool) -> Voice {
        Voice {
            voice_uri: format!("uri:{}", name),
            name: name.to_string(),
            lang: lang.to_string(),
            local_service: local,
            default,
        }
    }

    fn picked(voices: &[Voice], lang: &str) -> Option<String> {
        select_voice(voices, lang).map(|v| v.name.clone())
    }

    #[test]
    fn test_exact_local_wins() {
        let voices = vec![
            voice("remote-mx", "es-MX", false, true),
            voice("local-mx", "es-MX", true, false),
        ];
        assert_eq!(picked(&voices, "es-MX").as_deref(), Some("local-mx"));
    }

    #[test]
    fn test_exact_any_before_prefix() {
        let voices = vec![
            voice("es-default", "es-ES", true, true),
            voice("remote-mx", "es-MX", false, false),
        ];
        assert_eq!(picked(&voices, "es-MX").as_deref(), Some("remote-mx"));
    }

    #[test]
    fn test_prefix_chain() {
        let voices = vec![
            voice("es-any", "es-AR", false, false),
            voice("es-local", "es-CO", true, false),
            voice("es-default", "es-ES", false, true),
        ];
        assert_eq!(picked(&voices, "es-MX").as_deref(), Some("es-default"));
        assert_eq!(picked(&voices[..2], "es-MX").as_deref(), Some("es-local"));
        assert_eq!(picked(&voices[..1], "es-MX").as_deref(), Some("es-any"));
    }

    #[test]
    fn test_no_match_uses_platform_default() {
        let voices = vec![voice("english", "en-US", true, true)];
        assert!(select_voice(&voices, "es-MX").is_none());
        assert!(select_voice(&[], "es-MX").is_none());
    }

    #[test]
    fn test_merge_keeps_selected_voice() {
        let mut catalog = VoiceCatalog::default();
        let chosen = voice("chosen", "es-MX", true, false);

        assert!(catalog.merge(vec![chosen.clone()], None));
        assert!(catalog.merge(vec![voice("other", "en-US", true, true)], Some(&chosen)));

        let names: Vec<&str> = catalog.voices().iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["other", "chosen"]);
    }

    #[test]
    fn test_merge_ignores_empty_reads() {
        let mut catalog = VoiceCatalog::default();
        catalog.merge(vec![voice("a", "es-MX", true, true)], None);

        assert!(!catalog.merge(Vec::new(), None));
        assert_eq!(catalog.voices().len(), 1);
        assert!(!catalog.merge(vec![voice("a", "es-MX", true, true)], None));
    }
}

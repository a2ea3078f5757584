//! Wake word matching
//!
//! Decides whether a final transcript contains the wake phrase. Matching is a
//! lowercase substring test by default, which also fires on the phrase inside a
//! longer word ("hola" in "holanda"). Strict mode requires word boundaries.

/// Matches transcripts against the configured wake phrase
#[derive(Debug, Clone)]
pub struct WakeWordMatcher {
    wake_word: String,
    strict: bool,
}

impl WakeWordMatcher {
    /// Create a matcher for `wake_word`
    #[must_use]
    pub fn new(wake_word: &str, strict: bool) -> Self {
        let normalized = wake_word.trim().to_lowercase();
        tracing::debug!(wake_word = %normalized, strict, "wake word matcher initialized");

        Self {
            wake_word: normalized,
            strict,
        }
    }

    /// Check if transcribed text contains the wake phrase
    #[must_use]
    pub fn matches(&self, transcript: &str) -> bool {
        if self.wake_word.is_empty() {
            return false;
        }

        let normalized = transcript.to_lowercase();
        if self.strict {
            contains_words(&normalized, &self.wake_word)
        } else {
            normalized.contains(&self.wake_word)
        }
    }

    /// Get the configured wake phrase
    #[must_use]
    pub fn wake_word(&self) -> &str {
        &self.wake_word
    }

    /// Whether whole-word matching is enabled
    #[must_use]
    pub const fn is_strict(&self) -> bool {
        self.strict
    }
}

/// Phrase occurs in text aligned on word boundaries
fn contains_words(text: &str, phrase: &str) -> bool {
    let text_words: Vec<&str> = words(text).collect();
    let phrase_words: Vec<&str> = words(phrase).collect();

    if phrase_words.is_empty() || phrase_words.len() > text_words.len() {
        return false;
    }

    text_words
        .windows(phrase_words.len())
        .any(|window| window == phrase_words.as_slice())
}

fn words(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wake_word_detection() {
        let matcher = WakeWordMatcher::new("hola", false);

        assert!(!matcher.matches("buenos días"));
        assert!(matcher.matches("Hola, ¿qué tal?"));
        assert!(matcher.matches("HOLA"));
    }

    #[test]
    fn test_substring_match_is_permissive() {
        let matcher = WakeWordMatcher::new("hola", false);
        assert!(matcher.matches("me voy a holanda"));
    }

    #[test]
    fn test_strict_requires_word_boundaries() {
        let matcher = WakeWordMatcher::new("Oye Kubic", true);

        assert!(matcher.matches("bueno, oye kubic, qué hora es"));
        assert!(!matcher.matches("oye kubica"));
        assert!(!matcher.matches("kubic oye"));
    }

    #[test]
    fn test_normalization() {
        let matcher = WakeWordMatcher::new("  HOLA  ", false);
        assert_eq!(matcher.wake_word(), "hola");
    }
}

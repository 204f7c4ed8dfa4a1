// Transcript suppression policy
//
// Whisper-family models hallucinate short acknowledgement phrases on
// near-silent audio ("thank you", "okay"). The filter drops those, plus
// empty results, before they reach the message sink. Suppression is policy,
// not an error: a suppressed utterance is simply never delivered.

use serde::Deserialize;

/// Configuration for transcript suppression.
#[derive(Debug, Clone, Deserialize)]
pub struct FilterConfig {
    /// Transcripts exactly matching one of these (case-insensitive, trailing
    /// punctuation ignored) are suppressed.
    #[serde(default = "FilterConfig::default_filler_phrases")]
    pub filler_phrases: Vec<String>,

    /// Enable the gibberish heuristic below.
    #[serde(default)]
    pub gibberish: bool,

    /// Transcripts with fewer words than this are considered too short to
    /// be meaningful (gibberish heuristic).
    #[serde(default = "FilterConfig::default_gibberish_min_words")]
    pub gibberish_min_words: usize,

    /// Maximum tolerated ratio of non-alphabetic words (gibberish
    /// heuristic).
    #[serde(default = "FilterConfig::default_gibberish_max_ratio")]
    pub gibberish_max_ratio: f32,
}

impl FilterConfig {
    fn default_filler_phrases() -> Vec<String> {
        [
            "thank you",
            "thanks",
            "okay",
            "sorry",
            "hello",
            "goodbye",
            "alright",
            "got it",
            "understood",
            "excuse me",
            "you're welcome",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    fn default_gibberish_min_words() -> usize {
        5
    }

    fn default_gibberish_max_ratio() -> f32 {
        0.6
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            filler_phrases: Self::default_filler_phrases(),
            gibberish: false,
            gibberish_min_words: Self::default_gibberish_min_words(),
            gibberish_max_ratio: Self::default_gibberish_max_ratio(),
        }
    }
}

/// Applies the suppression policy to finished transcripts.
#[derive(Debug, Clone)]
pub struct TranscriptFilter {
    config: FilterConfig,
    normalized_fillers: Vec<String>,
}

impl TranscriptFilter {
    pub fn new(config: FilterConfig) -> Self {
        let normalized_fillers = config
            .filler_phrases
            .iter()
            .map(|p| normalize(p))
            .collect();

        Self {
            config,
            normalized_fillers,
        }
    }

    /// True when the transcript should never reach the message sink.
    pub fn should_suppress(&self, text: &str) -> bool {
        let normalized = normalize(text);

        if normalized.is_empty() {
            return true;
        }

        if self.normalized_fillers.iter().any(|f| *f == normalized) {
            return true;
        }

        if self.config.gibberish && self.is_gibberish(&normalized) {
            return true;
        }

        false
    }

    fn is_gibberish(&self, normalized: &str) -> bool {
        let words: Vec<&str> = normalized.split_whitespace().collect();
        if words.len() < self.config.gibberish_min_words {
            return true;
        }

        let non_alpha = words
            .iter()
            .filter(|w| !w.chars().all(|c| c.is_alphabetic()))
            .count();

        non_alpha as f32 / words.len() as f32 > self.config.gibberish_max_ratio
    }
}

impl Default for TranscriptFilter {
    fn default() -> Self {
        Self::new(FilterConfig::default())
    }
}

fn normalize(text: &str) -> String {
    text.trim()
        .trim_end_matches(['.', '!', '?', ','])
        .trim()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_and_whitespace_are_suppressed() {
        let filter = TranscriptFilter::default();
        assert!(filter.should_suppress(""));
        assert!(filter.should_suppress("   "));
        assert!(filter.should_suppress("\n\t"));
        assert!(filter.should_suppress("."));
    }

    #[test]
    fn test_filler_phrases_are_suppressed() {
        let filter = TranscriptFilter::default();
        assert!(filter.should_suppress("Thank you."));
        assert!(filter.should_suppress("  okay "));
        assert!(filter.should_suppress("THANKS!"));
    }

    #[test]
    fn test_real_sentences_pass() {
        let filter = TranscriptFilter::default();
        assert!(!filter.should_suppress("Tell me about your experience with Rust."));
        // A filler phrase inside a longer sentence is not a filler.
        assert!(!filter.should_suppress("Thank you for explaining the architecture."));
    }

    #[test]
    fn test_gibberish_heuristic_when_enabled() {
        let filter = TranscriptFilter::new(FilterConfig {
            gibberish: true,
            ..FilterConfig::default()
        });

        // Too short.
        assert!(filter.should_suppress("one two three four"));
        // Mostly non-alphabetic tokens.
        assert!(filter.should_suppress("a1 b2 c3 d4 e5 f6 g7"));
        // Normal speech passes.
        assert!(!filter.should_suppress("could you walk me through the design"));
    }

    #[test]
    fn test_gibberish_heuristic_off_by_default() {
        let filter = TranscriptFilter::default();
        assert!(!filter.should_suppress("one two three"));
    }

    #[test]
    fn test_custom_filler_list() {
        let filter = TranscriptFilter::new(FilterConfig {
            filler_phrases: vec!["mhm".to_string()],
            ..FilterConfig::default()
        });
        assert!(filter.should_suppress("Mhm."));
        assert!(!filter.should_suppress("thank you"));
    }
}

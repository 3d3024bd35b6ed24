//! Text features
//!
//! Pipeline: lowercase → strip URLs → strip hashtags → drop everything that
//! is not a letter or whitespace → collapse whitespace → drop stop words and
//! one-letter tokens.
//!
//! Sentiment is lexicon based: each opinion word scores ±1, a negator
//! directly before it flips the sign, and the polarity is the mean score of
//! the opinion words found (0 when there are none).

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl Sentiment {
    pub fn from_polarity(polarity: f64) -> Self {
        if polarity > 0.0 {
            Sentiment::Positive
        } else if polarity < 0.0 {
            Sentiment::Negative
        } else {
            Sentiment::Neutral
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextFeatures {
    pub tokens: Vec<String>,
    pub has_link: bool,
    /// Hashtags without `#`, lowercase, in order of appearance.
    pub hashtags: Vec<String>,
    pub polarity: f64,
    pub sentiment: Sentiment,
}

impl TextFeatures {
    pub fn has_hashtag(&self) -> bool {
        !self.hashtags.is_empty()
    }
}

fn url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?:https?://|www\.)\S+").expect("url pattern compiles"))
}

fn hashtag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"#(\w+)").expect("hashtag pattern compiles"))
}

const STOP_WORDS: &[&str] = &[
    "about", "above", "after", "again", "against", "all", "am", "an", "and", "any", "are", "as",
    "at", "be", "because", "been", "before", "being", "below", "between", "both", "but", "by",
    "can", "could", "did", "do", "does", "doing", "down", "during", "each", "few", "for", "from",
    "further", "had", "has", "have", "having", "he", "her", "here", "hers", "herself", "him",
    "himself", "his", "how", "if", "in", "into", "is", "it", "its", "itself", "just", "me",
    "more", "most", "my", "myself", "now", "of", "off", "on", "once", "only", "or", "other",
    "our", "ours", "ourselves", "out", "over", "own", "rt", "same", "she", "should", "so",
    "some", "such", "than", "that", "the", "their", "theirs", "them", "themselves", "then",
    "there", "these", "they", "this", "those", "through", "to", "too", "under", "until", "up",
    "very", "via", "was", "we", "were", "what", "when", "where", "which", "while", "who",
    "whom", "why", "will", "with", "would", "you", "your", "yours", "yourself", "yourselves",
];

const NEGATORS: &[&str] = &[
    "not", "no", "never", "nothing", "nobody", "none", "neither", "nor", "dont", "doesnt",
    "didnt", "isnt", "arent", "wasnt", "werent", "cant", "cannot", "couldnt", "wont",
    "wouldnt", "shouldnt", "aint",
];

const POSITIVE: &[&str] = &[
    "amazing", "awesome", "best", "better", "brave", "calm", "confirmed", "excellent", "fantastic",
    "fine", "free", "glad", "good", "great", "happy", "heroes", "hero", "hope", "hopefully",
    "love", "lucky", "nice", "peace", "positive", "proud", "relief", "relieved", "rescued",
    "safe", "safely", "support", "thank", "thanks", "true", "well", "wonderful",
];

const NEGATIVE: &[&str] = &[
    "afraid", "angry", "attack", "awful", "bad", "crisis", "dead", "death", "disgusting",
    "evil", "fake", "false", "fear", "hate", "horrible", "horrific", "hostage", "injured",
    "kill", "killed", "killing", "panic", "sad", "scared", "shocking", "shot", "terrible",
    "terror", "terrorist", "tragedy", "tragic", "victims", "violence", "worst", "wrong",
];

/// Run the whole text pipeline over one message text.
pub fn analyze_text(text: &str) -> TextFeatures {
    let lower = text.to_lowercase();

    let has_link = url_pattern().is_match(&lower);
    let without_links = url_pattern().replace_all(&lower, " ");

    let hashtags: Vec<String> = hashtag_pattern()
        .captures_iter(&without_links)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .collect();
    let without_tags = hashtag_pattern().replace_all(&without_links, " ");

    let letters: String = without_tags
        .chars()
        .filter(|c| c.is_alphabetic() || c.is_whitespace())
        .collect();
    let words: Vec<&str> = letters.split_whitespace().collect();

    let polarity = polarity(&words);
    let tokens = words
        .iter()
        .filter(|w| w.chars().count() > 1 && !STOP_WORDS.contains(*w))
        .map(|w| w.to_string())
        .collect();

    TextFeatures {
        tokens,
        has_link,
        hashtags,
        polarity,
        sentiment: Sentiment::from_polarity(polarity),
    }
}

/// Mean opinion score of a cleaned word sequence, in `[-1, 1]`.
pub fn polarity(words: &[&str]) -> f64 {
    let mut total = 0.0;
    let mut opinions = 0usize;
    let mut negated = false;

    for word in words {
        let score = if POSITIVE.contains(word) {
            1.0
        } else if NEGATIVE.contains(word) {
            -1.0
        } else {
            negated = NEGATORS.contains(word);
            continue;
        };
        total += if negated { -score } else { score };
        opinions += 1;
        negated = false;
    }

    if opinions == 0 {
        0.0
    } else {
        total / opinions as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_links_and_hashtags_are_flagged_and_stripped() {
        let f = analyze_text("Gunman at #Ottawa #ParliamentHill http://t.co/abc123 details");
        assert!(f.has_link);
        assert!(f.has_hashtag());
        assert_eq!(f.hashtags, vec!["ottawa", "parliamenthill"]);
        assert_eq!(f.tokens, vec!["gunman", "details"]);
    }

    #[test]
    fn test_digits_punctuation_and_stop_words_are_dropped() {
        let f = analyze_text("BREAKING: 3 people at the   scene, a witness says!!");
        assert!(!f.has_link);
        assert!(f.hashtags.is_empty());
        assert_eq!(f.tokens, vec!["breaking", "people", "scene", "witness", "says"]);
    }

    #[test]
    fn test_www_links_count_as_links() {
        let f = analyze_text("story at www.example.com/live");
        assert!(f.has_link);
        assert_eq!(f.tokens, vec!["story"]);
    }

    #[test]
    fn test_sentiment_labels() {
        assert_eq!(analyze_text("So glad everyone is safe").sentiment, Sentiment::Positive);
        assert_eq!(analyze_text("Horrible attack, many injured").sentiment, Sentiment::Negative);
        assert_eq!(analyze_text("Police are at the scene").sentiment, Sentiment::Neutral);
        assert_eq!(analyze_text("").sentiment, Sentiment::Neutral);
    }

    #[test]
    fn test_negator_flips_next_opinion_word() {
        assert_eq!(polarity(&["this", "is", "not", "true"]), -1.0);
        assert_eq!(polarity(&["not", "a", "good", "day"]), 1.0);
        assert_eq!(polarity(&["good", "bad"]), 0.0);
    }

    #[test]
    fn test_mixed_polarity_is_mean() {
        let p = polarity(&["great", "great", "great", "sad"]);
        assert!((p - 0.5).abs() < 1e-9);
    }
}

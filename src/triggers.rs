use serde::Deserialize;

const DEFAULT_TRIGGER_WORDS: &[&str] = &["@スパイシーババア", "スパイシーババア", "ババア", "BBA"];

/// Ordered, never-empty list of words that address the bot in plain text.
///
/// Order matters when stripping: longer entries such as `@スパイシーババア`
/// come first so they are removed whole before their substrings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "Vec<String>")]
pub struct TriggerSet {
    words: Vec<String>,
}

impl Default for TriggerSet {
    fn default() -> Self {
        Self {
            words: DEFAULT_TRIGGER_WORDS.iter().map(|w| w.to_string()).collect(),
        }
    }
}

impl From<Vec<String>> for TriggerSet {
    fn from(words: Vec<String>) -> Self {
        let words: Vec<String> = words
            .into_iter()
            .map(|w| w.trim().to_string())
            .filter(|w| !w.is_empty())
            .collect();
        if words.is_empty() {
            Self::default()
        } else {
            Self { words }
        }
    }
}

impl TriggerSet {
    /// Parse a comma-separated override such as `"ババア,BBA"`.
    pub fn parse_list(csv: &str) -> Self {
        Self::from(csv.split(',').map(str::to_string).collect::<Vec<_>>())
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    pub fn contains_any(&self, text: &str) -> bool {
        self.words.iter().any(|w| text.contains(w.as_str()))
    }

    /// Turn an addressed message into the prompt sent to the model.
    ///
    /// Every occurrence of every trigger is removed, then a single leading
    /// `@name` token (plus the whitespace after it) if the text starts with
    /// `@`, then surrounding whitespace. Never returns an empty string.
    pub fn strip(&self, text: &str, fallback: &str) -> String {
        let mut s = text.to_string();
        for w in &self.words {
            s = s.replace(w.as_str(), "");
        }

        let stripped = strip_leading_mention(&s).trim();
        if stripped.is_empty() {
            fallback.to_string()
        } else {
            stripped.to_string()
        }
    }
}

/// Drop `@<non-whitespace run><whitespace run>` at the very start of `s`.
fn strip_leading_mention(s: &str) -> &str {
    let Some(rest) = s.strip_prefix('@') else {
        return s;
    };
    let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
    if end == 0 {
        return s;
    }
    rest[end..].trim_start()
}

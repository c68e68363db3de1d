//! Word-level sentence helpers and timestamp formatting.

use chrono::{DateTime, SecondsFormat, Utc};

/// A sentence split into words with trailing punctuation removed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Sentence {
    parts: Vec<String>,
}

fn split(text: &str) -> Vec<String> {
    text.split(char::is_whitespace)
        .map(|word| word.trim_end_matches(|c: char| !c.is_ascii_alphanumeric()))
        .filter(|word| !word.is_empty())
        .map(str::to_string)
        .collect()
}

impl Sentence {
    pub fn new(text: &str) -> Self {
        Self { parts: split(text) }
    }

    pub fn from_parts(parts: Vec<String>) -> Self {
        let parts = parts.into_iter().filter(|part| !part.is_empty()).collect();
        Self { parts }
    }

    pub fn parts(&self) -> &[String] {
        &self.parts
    }

    /// Remove every occurrence of each phrase in `phrases` and return the
    /// removed words, in sentence order, as a new sentence.
    ///
    /// Phrases match whole consecutive words. At each position the first
    /// matching phrase wins.
    pub fn extract(&mut self, phrases: &[&str]) -> Sentence {
        let phrases: Vec<Vec<String>> = phrases
            .iter()
            .map(|phrase| split(phrase))
            .filter(|words| !words.is_empty())
            .collect();

        let mut kept = Vec::with_capacity(self.parts.len());
        let mut extracted = Vec::new();
        let mut index = 0;
        while index < self.parts.len() {
            let rest = &self.parts[index..];
            match phrases.iter().find(|words| rest.starts_with(words)) {
                Some(words) => {
                    extracted.extend(words.iter().cloned());
                    index += words.len();
                }
                None => {
                    kept.push(self.parts[index].clone());
                    index += 1;
                }
            }
        }
        self.parts = kept;
        Sentence { parts: extracted }
    }

    /// Join with `separator`, a single space when `None`.
    pub fn join(&self, separator: Option<&str>) -> String {
        self.parts.join(separator.unwrap_or(" "))
    }

    pub fn first(&self) -> Option<&str> {
        self.parts.first().map(String::as_str)
    }

    pub fn last(&self) -> Option<&str> {
        self.parts.last().map(String::as_str)
    }
}

/// ISO-8601 UTC timestamp with millisecond precision, e.g. `2024-01-02T03:04:05.678Z`.
pub fn timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn timestamp_now() -> String {
    timestamp(Utc::now())
}

use std::collections::BTreeSet;

/// Case-insensitive keyword phrases for one monitoring session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeywordSet {
    phrases: BTreeSet<String>,
}

impl KeywordSet {
    pub fn new<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let phrases = phrases
            .into_iter()
            .map(|p| p.as_ref().to_lowercase())
            // An empty phrase would match every message
            .filter(|p| !p.is_empty())
            .collect();
        Self { phrases }
    }

    pub fn len(&self) -> usize {
        self.phrases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.phrases.iter().map(String::as_str)
    }
}

/// True if any phrase occurs anywhere in the lowercased, trimmed text.
///
/// Plain substring containment: `cat` matches `concatenate`.
pub fn is_relevant(text: &str, keywords: &KeywordSet) -> bool {
    let text = text.trim().to_lowercase();
    keywords.iter().any(|phrase| text.contains(phrase))
}

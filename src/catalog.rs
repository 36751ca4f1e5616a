use crate::api::VoiceDescriptor;

/// Language facet of the voice list
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LanguageFilter {
    #[default]
    All,
    /// Voices whose language label matches (name or ISO code)
    Only(String),
    /// Voices whose language label does not match
    Except(String),
}

impl LanguageFilter {
    /// Parse `all`, `<language>` or `!<language>`
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() || raw.eq_ignore_ascii_case("all") {
            LanguageFilter::All
        } else if let Some(rest) = raw.strip_prefix('!') {
            LanguageFilter::Except(rest.trim().to_string())
        } else {
            LanguageFilter::Only(raw.to_string())
        }
    }

    fn accepts(&self, voice: &VoiceDescriptor) -> bool {
        match self {
            LanguageFilter::All => true,
            LanguageFilter::Only(lang) => language_matches(&voice.language_label, lang),
            LanguageFilter::Except(lang) => !language_matches(&voice.language_label, lang),
        }
    }
}

/// Known names and codes that refer to the same language
const LANGUAGE_ALIASES: &[&[&str]] = &[
    &["arabic", "ar"],
    &["english", "en"],
    &["french", "fr"],
    &["german", "de"],
    &["spanish", "es"],
    &["italian", "it"],
    &["portuguese", "pt"],
    &["hindi", "hi"],
    &["turkish", "tr"],
];

fn language_matches(label: &str, wanted: &str) -> bool {
    let label = label.trim().to_lowercase();
    let wanted = wanted.trim().to_lowercase();
    if label == wanted {
        return true;
    }
    LANGUAGE_ALIASES
        .iter()
        .any(|group| group.contains(&label.as_str()) && group.contains(&wanted.as_str()))
}

/// Language facet plus free-text search over the catalog
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoiceFilter {
    pub language: LanguageFilter,
    pub query: String,
}

impl VoiceFilter {
    pub fn new(language: LanguageFilter, query: impl Into<String>) -> Self {
        Self {
            language,
            query: query.into(),
        }
    }

    /// Case-insensitive search over name, description, language and accent
    fn matches_query(&self, voice: &VoiceDescriptor) -> bool {
        let query = self.query.trim().to_lowercase();
        if query.is_empty() {
            return true;
        }

        voice.display_name.to_lowercase().contains(&query)
            || voice
                .description
                .as_deref()
                .map(|d| d.to_lowercase().contains(&query))
                .unwrap_or(false)
            || voice.language_label.to_lowercase().contains(&query)
            || voice.accent_label.to_lowercase().contains(&query)
    }

    pub fn matches(&self, voice: &VoiceDescriptor) -> bool {
        self.language.accepts(voice) && self.matches_query(voice)
    }

    /// Filter preserving catalog order
    pub fn apply<'a>(&self, voices: &'a [VoiceDescriptor]) -> Vec<&'a VoiceDescriptor> {
        voices.iter().filter(|v| self.matches(v)).collect()
    }
}

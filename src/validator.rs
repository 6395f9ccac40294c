/// Admission gate for drafts. A draft is accepted only if its title and
/// content satisfy the length bounds and at least one keyword appears in
/// either of them (case-insensitive). Lengths are counted in characters.
#[derive(Debug, Clone)]
pub struct Validator {
    keywords: Vec<String>,
    min_title_chars: usize,
    max_title_chars: usize,
    min_content_chars: usize,
}

impl Validator {
    /// Thresholds for text articles: title 10..=200, content at least 100.
    pub fn article(keywords: &[String]) -> Self {
        Self::with_bounds(keywords, 10, 200, 100)
    }

    /// Video listings carry short descriptions: title 5..=200, content at
    /// least 20.
    pub fn video(keywords: &[String]) -> Self {
        Self::with_bounds(keywords, 5, 200, 20)
    }

    pub fn with_bounds(
        keywords: &[String],
        min_title_chars: usize,
        max_title_chars: usize,
        min_content_chars: usize,
    ) -> Self {
        Self {
            keywords: keywords
                .iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
            min_title_chars,
            max_title_chars,
            min_content_chars,
        }
    }

    pub fn is_valid(&self, title: &str, content: &str) -> bool {
        if title.is_empty() || content.is_empty() {
            return false;
        }

        let title_len = title.chars().count();
        if title_len < self.min_title_chars || title_len > self.max_title_chars {
            return false;
        }

        if content.chars().count() < self.min_content_chars {
            return false;
        }

        let text = format!("{title} {content}").to_lowercase();
        self.keywords.iter().any(|k| text.contains(k.as_str()))
    }
}

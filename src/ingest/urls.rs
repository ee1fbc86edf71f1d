use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

static SCHEMED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https?://github\.com/[\w.-]+/[\w.-]+").expect("valid regex")
});

static BARE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"github\.com/[\w.-]+/[\w.-]+").expect("valid regex"));

/// GitHub repository URLs mentioned in `text`, normalized and de-duplicated
/// in first-seen order. Schemed matches are collected before bare ones.
pub fn detect_repository_urls(text: Option<&str>) -> Vec<String> {
    let text = match text {
        Some(text) if !text.is_empty() => text,
        _ => return Vec::new(),
    };

    let mut seen = HashSet::new();
    let mut urls = Vec::new();
    for pattern in [&*SCHEMED_RE, &*BARE_RE] {
        for found in pattern.find_iter(text) {
            let url = normalize_repository_url(found.as_str());
            if seen.insert(url.clone()) {
                urls.push(url);
            }
        }
    }
    urls
}

pub fn normalize_repository_url(raw: &str) -> String {
    let mut url = if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else {
        format!("https://{raw}")
    };

    // Sentence punctuation ("see github.com/a/b.") is swallowed by the repo pattern.
    let trimmed_len = url.trim_end_matches(['/', '.']).len();
    url.truncate(trimmed_len);

    if let Some(stripped) = url.strip_suffix(".git") {
        url = stripped.to_string();
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_or_absent_text_yields_nothing() {
        assert!(detect_repository_urls(None).is_empty());
        assert!(detect_repository_urls(Some("")).is_empty());
        assert!(detect_repository_urls(Some("no links here, see gitlab.com/a/b")).is_empty());
    }

    #[test]
    fn schemed_and_bare_forms_dedupe() {
        let text = "compare https://github.com/acme/widgets with github.com/acme/widgets.git please";
        assert_eq!(
            detect_repository_urls(Some(text)),
            ["https://github.com/acme/widgets"]
        );
    }

    #[test]
    fn trailing_slash_variant_is_same_repo() {
        let text = "github.com/a/b and later github.com/a/b/";
        assert_eq!(detect_repository_urls(Some(text)), ["https://github.com/a/b"]);
    }

    #[test]
    fn schemed_matches_come_first() {
        let text = "github.com/first/one then https://github.com/second/two";
        assert_eq!(
            detect_repository_urls(Some(text)),
            ["https://github.com/second/two", "https://github.com/first/one"]
        );
    }

    #[test]
    fn dedup_is_case_sensitive() {
        let text = "github.com/Acme/Widgets github.com/acme/widgets";
        assert_eq!(detect_repository_urls(Some(text)).len(), 2);
    }

    #[test]
    fn sentence_punctuation_is_trimmed() {
        assert_eq!(
            normalize_repository_url("github.com/org/tool.git."),
            "https://github.com/org/tool"
        );
        assert_eq!(
            normalize_repository_url("https://github.com/org/site.github.io"),
            "https://github.com/org/site.github.io"
        );
    }
}

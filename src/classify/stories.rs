use serde::Serialize;

const REQUIREMENT_KEYWORDS: &[&str] = &[
    "feature",
    "requirement",
    "user should",
    "system should",
    "must",
    "shall",
];

const FALLBACK_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Story {
    pub id: String,
    pub title: String,
    pub description: String,
}

fn truncate_chars(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fn is_heading(line: &str) -> bool {
    line.starts_with('#')
}

/// Turn a product requirements document into user stories.
///
/// Paragraphs (blank-line separated) that mention a requirement keyword
/// yield one story per non-heading line. If that finds nothing, the first
/// ten non-heading paragraphs each become a generic story.
pub fn generate_stories(prd: &str) -> Vec<Story> {
    let mut stories = Vec::new();

    for section in prd.split("\n\n").filter(|s| !s.trim().is_empty()) {
        let lowered = section.to_lowercase();
        if !REQUIREMENT_KEYWORDS.iter().any(|kw| lowered.contains(kw)) {
            continue;
        }
        for line in section.lines().map(str::trim) {
            if line.is_empty() || is_heading(line) {
                continue;
            }
            let lower = line.to_lowercase();
            let description = if lower.starts_with("as a") {
                line.to_string()
            } else {
                format!("As a user, I want to {lower}")
            };
            stories.push(Story {
                id: format!("story_{}", stories.len() + 1),
                title: format!("User Story: {}...", truncate_chars(line, 50)),
                description,
            });
        }
    }

    if stories.is_empty() {
        stories = prd
            .split("\n\n")
            .map(str::trim)
            .filter(|p| !p.is_empty() && !is_heading(p))
            .take(FALLBACK_LIMIT)
            .enumerate()
            .map(|(i, paragraph)| Story {
                id: format!("story_{}", i + 1),
                title: format!("User Story {}", i + 1),
                description: format!(
                    "As a user, I want to implement: {}...",
                    truncate_chars(paragraph, 200)
                ),
            })
            .collect();
    }

    stories
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requirement_lines_become_stories() {
        let prd = "# Checkout\n\nThe system must:\nAccept card payments\nAs a buyer I can save my card\n\nBackground paragraph.";
        let stories = generate_stories(prd);
        assert_eq!(stories.len(), 3);
        assert_eq!(stories[0].id, "story_1");
        assert_eq!(stories[0].description, "As a user, I want to the system must:");
        assert_eq!(stories[1].description, "As a user, I want to accept card payments");
        assert_eq!(stories[2].description, "As a buyer I can save my card");
        assert_eq!(stories[2].title, "User Story: As a buyer I can save my card...");
    }

    #[test]
    fn test_headings_inside_sections_are_skipped() {
        let prd = "## Requirements\nUsers shall export reports";
        let stories = generate_stories(prd);
        assert_eq!(stories.len(), 1);
        assert_eq!(stories[0].description, "As a user, I want to users shall export reports");
    }

    #[test]
    fn test_fallback_paragraphs() {
        let prd = "# Title\n\nA dashboard for sales.\n\nShows weekly numbers.";
        let stories = generate_stories(prd);
        assert_eq!(stories.len(), 2);
        assert_eq!(stories[0].title, "User Story 1");
        assert_eq!(
            stories[0].description,
            "As a user, I want to implement: A dashboard for sales...."
        );
    }

    #[test]
    fn test_fallback_is_capped() {
        let prd: Vec<String> = (0..15).map(|i| format!("Paragraph {i}")).collect();
        assert_eq!(generate_stories(&prd.join("\n\n")).len(), 10);
    }

    #[test]
    fn test_title_truncation_is_char_safe() {
        let line = "é".repeat(60);
        let stories = generate_stories(&format!("Feature\n{line}"));
        assert_eq!(stories[1].title, format!("User Story: {}...", "é".repeat(50)));
    }

    #[test]
    fn test_empty_input() {
        assert!(generate_stories("").is_empty());
        assert!(generate_stories("# Only a heading").is_empty());
    }
}

//! Passage formatting for generation context.
//!
//! Passages become labeled blocks with normalized whitespace, bounded
//! by a per-passage character cap and a total context budget. Later
//! passages are trimmed (or dropped) first when the budget runs out,
//! keeping the most relevant context intact.

use mediq_shared::{ContextBudget, Passage};

/// Fixed allowance per block for the `Passage i (…):` header line.
const HEADER_OVERHEAD: usize = 64;

/// Format passages into a single labeled context block:
///
/// ```text
/// Passage 1 (section: Precautions; url: https://…):
/// <snippet>
/// ```
///
/// Returns an empty string when no passage has usable text.
pub fn format_passages(passages: &[Passage], budget: &ContextBudget) -> String {
    let total_budget = if budget.total_budget == 0 {
        usize::MAX
    } else {
        budget.total_budget
    };

    let mut chunks: Vec<String> = Vec::new();
    let mut used = 0usize;

    for (idx, passage) in passages.iter().enumerate() {
        let snippet = normalize_whitespace(&passage.text);
        if snippet.is_empty() {
            continue;
        }

        let remaining = total_budget.saturating_sub(used + HEADER_OVERHEAD);
        if remaining == 0 {
            break;
        }

        let per_limit = if budget.per_passage_limit == 0 {
            remaining
        } else {
            budget.per_passage_limit.min(remaining)
        };
        let snippet = truncate_chars(&snippet, per_limit);

        let mut meta: Vec<String> = Vec::new();
        if let Some(section) = passage.section.as_deref().filter(|s| !s.is_empty()) {
            meta.push(format!("section: {section}"));
        }
        if let Some(url) = passage.source_url.as_deref().filter(|u| !u.is_empty()) {
            meta.push(format!("url: {url}"));
        }
        let meta_suffix = if meta.is_empty() {
            String::new()
        } else {
            format!(" ({})", meta.join("; "))
        };

        let chunk = format!("Passage {}{meta_suffix}:\n{snippet}", idx + 1);
        used += chunk.len();
        chunks.push(chunk);
    }

    chunks.join("\n\n")
}

/// Collapse all whitespace runs to single spaces.
fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncate on a character boundary.
fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        text.chars().take(max).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passage(text: &str, section: Option<&str>, url: Option<&str>) -> Passage {
        Passage {
            text: text.into(),
            source_url: url.map(String::from),
            section: section.map(String::from),
            score: 0.9,
            drug_name: None,
            active_ingredients: None,
        }
    }

    #[test]
    fn blocks_are_labeled_with_metadata() {
        let passages = vec![
            passage("Take  with\nfood.", Some("Dosage"), Some("https://x/1")),
            passage("May cause drowsiness.", None, None),
        ];
        let out = format_passages(&passages, &ContextBudget::default());

        assert!(out.starts_with("Passage 1 (section: Dosage; url: https://x/1):\nTake with food."));
        assert!(out.contains("\n\nPassage 2:\nMay cause drowsiness."));
    }

    #[test]
    fn empty_passages_are_skipped() {
        let passages = vec![passage("   \n ", None, None), passage("text", None, None)];
        let out = format_passages(&passages, &ContextBudget::default());
        // The blank passage is dropped; numbering follows input position.
        assert!(out.starts_with("Passage 2:\ntext"));
        assert!(!out.contains("Passage 1"));
    }

    #[test]
    fn per_passage_cap_applies() {
        let passages = vec![passage(&"a".repeat(100), None, None)];
        let budget = ContextBudget {
            per_passage_limit: 10,
            total_budget: 0,
        };
        let out = format_passages(&passages, &budget);
        assert!(out.ends_with(&"a".repeat(10)));
        assert!(!out.contains(&"a".repeat(11)));
    }

    #[test]
    fn total_budget_trims_later_passages_first() {
        let passages = vec![
            passage(&"a".repeat(200), None, None),
            passage(&"b".repeat(200), None, None),
            passage(&"c".repeat(200), None, None),
        ];
        let budget = ContextBudget {
            per_passage_limit: 0,
            total_budget: 400,
        };
        let out = format_passages(&passages, &budget);
        assert!(out.contains(&"a".repeat(200)));
        assert!(!out.contains(&"c".repeat(10)));
    }

    #[test]
    fn zero_budgets_mean_unbounded() {
        let passages = vec![passage(&"a".repeat(5000), None, None)];
        let budget = ContextBudget {
            per_passage_limit: 0,
            total_budget: 0,
        };
        let out = format_passages(&passages, &budget);
        assert!(out.contains(&"a".repeat(5000)));
    }
}

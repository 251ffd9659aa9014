//! Response assembly: passages + summary → UI-ready [`Answer`].
//!
//! Pure functions, no I/O.

use mediq_shared::{Answer, Bullet, Citation, Passage, messages};

/// Cap on bullets and citations in one answer.
const MAX_ITEMS: usize = 5;

/// Maximum characters kept from a passage's first line for a bullet.
const BULLET_SNIPPET_CHARS: usize = 800;

/// Build the answer payload from retrieved passages and the final
/// summary. Empty passages produce the fixed "not found" answer.
pub fn assemble(passages: &[Passage], summary_text: Option<String>) -> Answer {
    if passages.is_empty() {
        return not_found();
    }

    let mut bullets: Vec<Bullet> = Vec::new();
    let mut citations: Vec<Citation> = Vec::new();

    for passage in passages {
        let snippet: String = passage
            .text
            .trim()
            .lines()
            .next()
            .unwrap_or("")
            .chars()
            .take(BULLET_SNIPPET_CHARS)
            .collect();

        if !snippet.is_empty() && bullets.len() < MAX_ITEMS {
            bullets.push(Bullet {
                text: snippet,
                score: passage.score,
                drug_name: passage.drug_name.clone(),
                active_ingredients: passage.active_ingredients.clone(),
            });
        }

        if citations.len() < MAX_ITEMS {
            citations.push(Citation {
                url: passage.source_url.clone().unwrap_or_default(),
                section: passage.section.clone().unwrap_or_default(),
            });
        }
    }

    Answer {
        summary_text,
        bullets,
        citations,
        disclaimer: messages::DISCLAIMER.to_string(),
    }
}

/// The fixed answer for queries with no corpus coverage.
pub fn not_found() -> Answer {
    Answer {
        summary_text: Some(messages::NOT_FOUND_SUMMARY.to_string()),
        bullets: Vec::new(),
        citations: Vec::new(),
        disclaimer: messages::DISCLAIMER.to_string(),
    }
}

/// The terminal answer for a refused query: the stage-determined
/// refusal becomes the summary, with no bullets or citations.
pub fn refusal(message: Option<&str>) -> Answer {
    Answer {
        summary_text: Some(
            message
                .filter(|m| !m.trim().is_empty())
                .unwrap_or(messages::REFUSAL_UNSUPPORTED)
                .to_string(),
        ),
        bullets: Vec::new(),
        citations: Vec::new(),
        disclaimer: messages::DISCLAIMER.to_string(),
    }
}

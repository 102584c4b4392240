use serde::Serialize;
use signpost_common::types::TopicCategoryRow;
use std::collections::HashSet;

/// 低置信度匹配所需的关键词命中比例
pub const LOW_CONFIDENCE_THRESHOLD: f64 = 0.6;

const MIN_KEYWORD_LEN: usize = 3;

const STOP_WORDS: &[&str] = &[
    "and", "the", "for", "with", "from", "into", "that", "this", "your", "you", "are", "was",
    "were", "not", "but", "all", "any", "can", "has", "have", "how", "what", "when", "who",
    "why", "other", "about", "their", "them", "our", "its", "per", "via",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Low,
}

/// 推断出的主题位置
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InferredTopic {
    pub category_id: String,
    pub category_name: String,
    pub subsection: String,
    pub confidence: Confidence,
    pub score: f64,
}

/// Lowercases, strips apostrophes, turns every other punctuation character
/// into a space and collapses runs of whitespace.
///
/// # Examples
///
/// ```
/// use signpost_rules::topics::normalise;
///
/// assert_eq!(normalise("  Children's  Same-Day   Requests! "), "childrens same day requests");
/// ```
pub fn normalise(text: &str) -> String {
    let mapped: String = text
        .to_lowercase()
        .chars()
        .filter(|c| !matches!(c, '\'' | '\u{2019}' | '\u{2018}'))
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn keywords(label_normalised: &str) -> Vec<&str> {
    label_normalised
        .split(' ')
        .filter(|w| w.chars().count() >= MIN_KEYWORD_LEN && !STOP_WORDS.contains(w))
        .collect()
}

/// Suggests topic placements for a prompt by lexical overlap.
///
/// Verbatim (normalised) subsection matches come first as
/// [`Confidence::High`], longest label first. Remaining pairs whose keywords
/// reach [`LOW_CONFIDENCE_THRESHOLD`] follow as [`Confidence::Low`], highest
/// score first. An empty result means "no suggestion".
pub fn infer_topics(prompt_text: &str, categories: &[TopicCategoryRow]) -> Vec<InferredTopic> {
    let prompt = normalise(prompt_text);
    if prompt.is_empty() {
        return Vec::new();
    }
    let prompt_words: HashSet<&str> = prompt.split(' ').collect();

    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut high: Vec<(usize, InferredTopic)> = Vec::new();
    let mut low: Vec<(usize, InferredTopic)> = Vec::new();

    for category in categories {
        for subsection in &category.subsections {
            let label = normalise(subsection);
            if label.is_empty() {
                continue;
            }
            if !seen.insert((category.id.clone(), subsection.clone())) {
                continue;
            }

            let topic = |confidence, score| InferredTopic {
                category_id: category.id.clone(),
                category_name: category.name.clone(),
                subsection: subsection.clone(),
                confidence,
                score,
            };

            if prompt.contains(&label) {
                high.push((label.len(), topic(Confidence::High, 1.0)));
                continue;
            }

            let words = keywords(&label);
            if words.is_empty() {
                continue;
            }
            let matched = words.iter().filter(|w| prompt_words.contains(*w)).count();
            let score = matched as f64 / words.len() as f64;
            if matched > 0 && score >= LOW_CONFIDENCE_THRESHOLD {
                low.push((label.len(), topic(Confidence::Low, score)));
            }
        }
    }

    high.sort_by(|a, b| b.0.cmp(&a.0));
    low.sort_by(|a, b| b.1.score.total_cmp(&a.1.score).then(b.0.cmp(&a.0)));

    high.into_iter().chain(low).map(|(_, t)| t).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_drop_short_and_stop_words() {
        assert_eq!(keywords("care of the elderly and frail"), vec!["care", "elderly", "frail"]);
    }

    #[test]
    fn blank_prompt_yields_nothing() {
        let cats = vec![TopicCategoryRow {
            id: "c1".into(),
            name: "Admin".into(),
            subsections: vec!["Repeat prescriptions".into()],
            active: true,
        }];
        assert!(infer_topics("  ?! ", &cats).is_empty());
    }
}

//! The `card-batch/v1` output schema and its single validation entry point.
//!
//! Validation is structural first (collecting every problem with a JSON path
//! so the model can be told precisely what to fix) and typed second.

use serde::Serialize;
use serde_json::{Map, Value};
use signpost_common::types::{ContentBlockKind, GeneratedBatch, InteractionKind};

pub const SCHEMA_VERSION: &str = "card-batch/v1";

/// 单张卡片的最长预计学习时长（分钟）
const MAX_ESTIMATED_MINUTES: u64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaIssue {
    pub path: String,
    pub message: String,
}

/// What the caller asked for, checked against the model output.
#[derive(Debug, Clone, Copy)]
pub struct BatchExpectations {
    pub count: u32,
    pub interactive_first: bool,
}

/// Rejected output: the parsed JSON when there was any, plus every issue.
#[derive(Debug, Clone)]
pub struct SchemaFailure {
    pub json: Option<Value>,
    pub issues: Vec<SchemaIssue>,
}

/// Parses raw model text into a [`GeneratedBatch`].
///
/// Accepts bare JSON or JSON wrapped in a markdown code fence. Any failure
/// returns all issues found, never just the first.
pub fn parse_card_batch(
    raw: &str,
    expect: &BatchExpectations,
) -> Result<GeneratedBatch, SchemaFailure> {
    let value = match serde_json::from_str::<Value>(extract_json(raw)) {
        Ok(v) => v,
        Err(e) => {
            return Err(SchemaFailure {
                json: None,
                issues: vec![SchemaIssue {
                    path: "$".to_string(),
                    message: format!("Output is not valid JSON: {e}"),
                }],
            })
        }
    };

    let mut checker = Checker::default();
    checker.batch(&value, expect);
    if !checker.issues.is_empty() {
        return Err(SchemaFailure {
            json: Some(value),
            issues: checker.issues,
        });
    }

    serde_json::from_value::<GeneratedBatch>(value.clone()).map_err(|e| SchemaFailure {
        json: Some(value),
        issues: vec![SchemaIssue {
            path: "$".to_string(),
            message: format!("Output does not match {SCHEMA_VERSION}: {e}"),
        }],
    })
}

/// Strips a surrounding markdown fence or prose around the outermost object.
fn extract_json(raw: &str) -> &str {
    let trimmed = raw.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed);

    if unfenced.starts_with('{') {
        return unfenced;
    }
    match (unfenced.find('{'), unfenced.rfind('}')) {
        (Some(start), Some(end)) if start < end => &unfenced[start..=end],
        _ => unfenced,
    }
}

#[derive(Default)]
struct Checker {
    issues: Vec<SchemaIssue>,
}

impl Checker {
    fn push(&mut self, path: &str, message: impl Into<String>) {
        self.issues.push(SchemaIssue {
            path: path.to_string(),
            message: message.into(),
        });
    }

    fn object<'v>(&mut self, value: &'v Value, path: &str) -> Option<&'v Map<String, Value>> {
        let obj = value.as_object();
        if obj.is_none() {
            self.push(path, "Expected an object");
        }
        obj
    }

    fn required_text(&mut self, obj: &Map<String, Value>, key: &str, path: &str) {
        let field = format!("{path}.{key}");
        match obj.get(key) {
            Some(Value::String(s)) if !s.trim().is_empty() => {}
            Some(Value::String(_)) => self.push(&field, "Must not be empty"),
            Some(_) => self.push(&field, "Expected a string"),
            None => self.push(&field, "Missing required field"),
        }
    }

    /// Optional array; `null` and absence both mean empty.
    fn optional_array<'v>(
        &mut self,
        obj: &'v Map<String, Value>,
        key: &str,
        path: &str,
    ) -> &'v [Value] {
        match obj.get(key) {
            None | Some(Value::Null) => &[],
            Some(Value::Array(items)) => items.as_slice(),
            Some(_) => {
                self.push(&format!("{path}.{key}"), "Expected an array");
                &[]
            }
        }
    }

    fn required_array<'v>(
        &mut self,
        obj: &'v Map<String, Value>,
        key: &str,
        path: &str,
    ) -> Option<&'v [Value]> {
        let field = format!("{path}.{key}");
        match obj.get(key) {
            Some(Value::Array(items)) => Some(items.as_slice()),
            Some(_) => {
                self.push(&field, "Expected an array");
                None
            }
            None => {
                self.push(&field, "Missing required field");
                None
            }
        }
    }

    fn strings(&mut self, items: &[Value], path: &str) {
        for (i, item) in items.iter().enumerate() {
            if !item.is_string() {
                self.push(&format!("{path}[{i}]"), "Expected a string");
            }
        }
    }

    fn answer_index(&mut self, obj: &Map<String, Value>, options: usize, path: &str, required: bool) {
        let field = format!("{path}.answer_index");
        match obj.get("answer_index") {
            None | Some(Value::Null) if !required => {}
            None | Some(Value::Null) => self.push(&field, "Missing required field"),
            Some(v) => match v.as_u64() {
                Some(idx) if (idx as usize) < options => {}
                Some(idx) => self.push(&field, format!("Index {idx} is out of range for {options} options")),
                None => self.push(&field, "Expected a non-negative integer"),
            },
        }
    }

    fn batch(&mut self, value: &Value, expect: &BatchExpectations) {
        let Some(root) = self.object(value, "$") else {
            return;
        };

        if let Some(version) = root.get("schema_version") {
            if version.as_str() != Some(SCHEMA_VERSION) {
                self.push("$.schema_version", format!("Expected \"{SCHEMA_VERSION}\""));
            }
        }

        if let Some(cards) = self.required_array(root, "cards", "$") {
            if cards.len() != expect.count as usize {
                self.push(
                    "$.cards",
                    format!("Expected {} cards, got {}", expect.count, cards.len()),
                );
            }
            for (i, card) in cards.iter().enumerate() {
                self.card(card, &format!("$.cards[{i}]"), expect.interactive_first);
            }
        }

        match root.get("quiz") {
            Some(quiz) => self.quiz(quiz, "$.quiz"),
            None => self.push("$.quiz", "Missing required field"),
        }
    }

    fn card(&mut self, value: &Value, path: &str, interactive_first: bool) {
        let Some(card) = self.object(value, path) else {
            return;
        };
        self.required_text(card, "title", path);

        if let Some(blocks) = self.required_array(card, "content_blocks", path) {
            if blocks.is_empty() {
                self.push(&format!("{path}.content_blocks"), "At least one content block is required");
            }
            for (i, block) in blocks.iter().enumerate() {
                self.content_block(block, &format!("{path}.content_blocks[{i}]"));
            }
        }

        let interactions = self.optional_array(card, "interactions", path);
        if interactive_first && interactions.is_empty() {
            self.push(&format!("{path}.interactions"), "At least one interaction is required");
        }
        for (i, interaction) in interactions.iter().enumerate() {
            self.interaction(interaction, &format!("{path}.interactions[{i}]"));
        }

        match card.get("slot_language") {
            None | Some(Value::Null) => {}
            Some(slot) => self.slot_language(slot, &format!("{path}.slot_language")),
        }

        let netting = self.optional_array(card, "safety_netting", path);
        self.strings(netting, &format!("{path}.safety_netting"));

        let sources = self.optional_array(card, "sources", path);
        for (i, source) in sources.iter().enumerate() {
            let source_path = format!("{path}.sources[{i}]");
            if let Some(obj) = self.object(source, &source_path) {
                self.required_text(obj, "title", &source_path);
                if !matches!(obj.get("url"), None | Some(Value::Null) | Some(Value::String(_))) {
                    self.push(&format!("{source_path}.url"), "Expected a string or null");
                }
            }
        }

        let minutes_path = format!("{path}.estimated_time_minutes");
        match card.get("estimated_time_minutes").map(Value::as_u64) {
            Some(Some(m)) if (1..=MAX_ESTIMATED_MINUTES).contains(&m) => {}
            Some(Some(m)) => self.push(
                &minutes_path,
                format!("Expected 1 to {MAX_ESTIMATED_MINUTES} minutes, got {m}"),
            ),
            Some(None) => self.push(&minutes_path, "Expected a positive integer"),
            None => self.push(&minutes_path, "Missing required field"),
        }

        if !matches!(card.get("needs_sourcing"), None | Some(Value::Bool(_))) {
            self.push(&format!("{path}.needs_sourcing"), "Expected a boolean");
        }

        let tags = self.optional_array(card, "tags", path);
        self.strings(tags, &format!("{path}.tags"));
    }

    fn content_block(&mut self, value: &Value, path: &str) {
        let Some(block) = self.object(value, path) else {
            return;
        };
        let kind_ok = block
            .get("type")
            .is_some_and(|t| serde_json::from_value::<ContentBlockKind>(t.clone()).is_ok());
        if !kind_ok {
            self.push(&format!("{path}.type"), "Expected one of paragraph, callout, steps");
        }
        if !block.get("text").is_some_and(Value::is_string) {
            self.push(&format!("{path}.text"), "Expected a string");
        }
        let items = self.optional_array(block, "items", path);
        self.strings(items, &format!("{path}.items"));
    }

    fn interaction(&mut self, value: &Value, path: &str) {
        let Some(obj) = self.object(value, path) else {
            return;
        };
        let kind = obj
            .get("type")
            .and_then(|t| serde_json::from_value::<InteractionKind>(t.clone()).ok());
        if kind.is_none() {
            self.push(
                &format!("{path}.type"),
                "Expected one of multiple_choice, true_false, scenario, reflection",
            );
        }
        self.required_text(obj, "prompt", path);

        let options = self.optional_array(obj, "options", path);
        self.strings(options, &format!("{path}.options"));
        if matches!(kind, Some(InteractionKind::MultipleChoice | InteractionKind::TrueFalse)) {
            if options.len() < 2 {
                self.push(&format!("{path}.options"), "At least two options are required");
            }
            self.answer_index(obj, options.len(), path, true);
        } else {
            self.answer_index(obj, options.len(), path, false);
        }
    }

    fn slot_language(&mut self, value: &Value, path: &str) {
        let Some(obj) = self.object(value, path) else {
            return;
        };
        let guidance = self.optional_array(obj, "guidance", path);
        for (i, entry) in guidance.iter().enumerate() {
            let entry_path = format!("{path}.guidance[{i}]");
            if let Some(g) = self.object(entry, &entry_path) {
                self.required_text(g, "slot", &entry_path);
                self.required_text(g, "rule", &entry_path);
            }
        }
    }

    fn quiz(&mut self, value: &Value, path: &str) {
        let Some(quiz) = self.object(value, path) else {
            return;
        };
        self.required_text(quiz, "title", path);
        let Some(questions) = self.required_array(quiz, "questions", path) else {
            return;
        };
        if questions.is_empty() {
            self.push(&format!("{path}.questions"), "At least one question is required");
        }
        for (i, question) in questions.iter().enumerate() {
            let q_path = format!("{path}.questions[{i}]");
            let Some(q) = self.object(question, &q_path) else {
                continue;
            };
            self.required_text(q, "question", &q_path);
            match self.required_array(q, "options", &q_path) {
                Some(options) => {
                    self.strings(options, &format!("{q_path}.options"));
                    if options.len() < 2 {
                        self.push(&format!("{q_path}.options"), "At least two options are required");
                    }
                    self.answer_index(q, options.len(), &q_path, true);
                }
                None => self.answer_index(q, 0, &q_path, true),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn card(title: &str) -> Value {
        json!({
            "title": title,
            "content_blocks": [{"type": "paragraph", "text": "Route the request to the pharmacy team."}],
            "interactions": [{
                "type": "multiple_choice",
                "prompt": "Who handles this?",
                "options": ["Reception", "Pharmacy team"],
                "answer_index": 1
            }],
            "safety_netting": ["Escalate to the duty team if unsure."],
            "sources": [{"title": "Signposting Toolkit (internal)", "url": "https://app.signpostingtool.co.uk/x"}],
            "estimated_time_minutes": 3,
            "needs_sourcing": false,
            "tags": ["admin"]
        })
    }

    fn batch(cards: Vec<Value>) -> Value {
        json!({
            "schema_version": SCHEMA_VERSION,
            "cards": cards,
            "quiz": {
                "title": "Check your understanding",
                "questions": [{"question": "Who handles repeat requests?", "options": ["A", "B"], "answer_index": 0}]
            }
        })
    }

    fn expect(count: u32) -> BatchExpectations {
        BatchExpectations {
            count,
            interactive_first: true,
        }
    }

    fn paths(failure: &SchemaFailure) -> Vec<&str> {
        failure.issues.iter().map(|i| i.path.as_str()).collect()
    }

    #[test]
    fn accepts_well_formed_batch() {
        let raw = batch(vec![card("One"), card("Two")]).to_string();
        let parsed = parse_card_batch(&raw, &expect(2)).unwrap();
        assert_eq!(parsed.cards.len(), 2);
        assert_eq!(parsed.cards[1].title, "Two");
        assert_eq!(parsed.quiz.questions.len(), 1);
    }

    #[test]
    fn accepts_fenced_output() {
        let raw = format!("```json\n{}\n```", batch(vec![card("One")]));
        assert!(parse_card_batch(&raw, &expect(1)).is_ok());

        let chatty = format!("Here you go:\n{}\nThanks", batch(vec![card("One")]));
        assert!(parse_card_batch(&chatty, &expect(1)).is_ok());
    }

    #[test]
    fn non_json_has_no_parsed_value() {
        let failure = parse_card_batch("I cannot help with that.", &expect(1)).unwrap_err();
        assert!(failure.json.is_none());
        assert_eq!(paths(&failure), vec!["$"]);
    }

    #[test]
    fn wrong_card_count_is_reported() {
        let raw = batch(vec![card("One")]).to_string();
        let failure = parse_card_batch(&raw, &expect(3)).unwrap_err();
        assert_eq!(paths(&failure), vec!["$.cards"]);
        assert!(failure.issues[0].message.contains("Expected 3 cards, got 1"));
        assert!(failure.json.is_some());
    }

    #[test]
    fn collects_every_issue_with_paths() {
        let mut bad = card("");
        bad["interactions"] = json!([]);
        bad["estimated_time_minutes"] = json!("five");
        bad["content_blocks"][0]["type"] = json!("table");
        let raw = batch(vec![bad]).to_string();

        let failure = parse_card_batch(&raw, &expect(1)).unwrap_err();
        assert_eq!(
            paths(&failure),
            vec![
                "$.cards[0].title",
                "$.cards[0].content_blocks[0].type",
                "$.cards[0].interactions",
                "$.cards[0].estimated_time_minutes",
            ]
        );
    }

    #[test]
    fn interactions_optional_when_not_interactive_first() {
        let mut plain = card("Plain");
        plain["interactions"] = json!([]);
        let raw = batch(vec![plain]).to_string();
        let relaxed = BatchExpectations {
            count: 1,
            interactive_first: false,
        };
        assert!(parse_card_batch(&raw, &relaxed).is_ok());
    }

    #[test]
    fn answer_index_out_of_range() {
        let mut bad = card("One");
        bad["interactions"][0]["answer_index"] = json!(5);
        let raw = batch(vec![bad]).to_string();
        let failure = parse_card_batch(&raw, &expect(1)).unwrap_err();
        assert_eq!(paths(&failure), vec!["$.cards[0].interactions[0].answer_index"]);
    }

    #[test]
    fn missing_quiz_and_wrong_version() {
        let mut value = batch(vec![card("One")]);
        value["schema_version"] = json!("card-batch/v0");
        value.as_object_mut().unwrap().remove("quiz");
        let failure = parse_card_batch(&value.to_string(), &expect(1)).unwrap_err();
        assert_eq!(paths(&failure), vec!["$.schema_version", "$.quiz"]);
    }

    #[test]
    fn slot_language_entries_are_checked() {
        let mut with_slots = card("Slots");
        with_slots["slot_language"] = json!({"relevant": true, "guidance": [{"slot": "red", "rule": ""}]});
        let failure = parse_card_batch(&batch(vec![with_slots]).to_string(), &expect(1)).unwrap_err();
        assert_eq!(paths(&failure), vec!["$.cards[0].slot_language.guidance[0].rule"]);
    }
}

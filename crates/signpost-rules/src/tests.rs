use crate::guards::toolkit_source::{TOOLKIT_SOURCE_TITLE, TOOLKIT_SOURCE_URL_PREFIX};
use crate::guards::validate_admin_cards;
use crate::topics::{infer_topics, Confidence};
use crate::IssueCode;
use signpost_common::types::{
    CardSource, ContentBlock, ContentBlockKind, GeneratedCard, Interaction, InteractionKind,
    SlotGuidance, SlotLanguage, TopicCategoryRow,
};

fn toolkit_source() -> CardSource {
    CardSource {
        title: TOOLKIT_SOURCE_TITLE.to_string(),
        url: Some(format!("{TOOLKIT_SOURCE_URL_PREFIX}handbook/repeat-requests")),
        publisher: None,
    }
}

fn make_card(title: &str, body: &str) -> GeneratedCard {
    GeneratedCard {
        title: title.to_string(),
        content_blocks: vec![ContentBlock {
            kind: ContentBlockKind::Paragraph,
            text: body.to_string(),
            items: vec![],
        }],
        interactions: vec![Interaction {
            kind: InteractionKind::MultipleChoice,
            prompt: "Which team handles this request?".into(),
            options: vec!["Reception".into(), "Pharmacy team".into()],
            answer_index: Some(1),
            explanation: None,
        }],
        slot_language: None,
        safety_netting: vec![],
        sources: vec![toolkit_source()],
        estimated_time_minutes: 3,
        needs_sourcing: false,
        tags: vec![],
    }
}

fn codes(issues: &[crate::Issue]) -> Vec<IssueCode> {
    issues.iter().map(|i| i.code).collect()
}

#[test]
fn clean_card_yields_no_issues() {
    let card = make_card(
        "Repeat prescription requests",
        "Send repeat requests to the pharmacy team using the online form.",
    );
    let issues = validate_admin_cards(&[card], "repeat prescription request handling");
    assert!(issues.is_empty(), "unexpected issues: {issues:?}");
}

#[test]
fn non_toolkit_first_source_is_flagged() {
    let mut card = make_card("Fit notes", "Fit note requests go to the admin inbox.");
    card.sources = vec![CardSource {
        title: "NHS website".into(),
        url: Some("https://www.nhs.uk/fit-notes".into()),
        publisher: None,
    }];
    let issues = validate_admin_cards(&[card], "fit note requests");
    assert_eq!(codes(&issues), vec![IssueCode::MissingToolkitSource]);
    assert_eq!(issues[0].card_title, "Fit notes");
}

#[test]
fn toolkit_source_must_come_first() {
    let mut card = make_card("Fit notes", "Fit note requests go to the admin inbox.");
    card.sources.insert(
        0,
        CardSource {
            title: "NHS website".into(),
            url: Some("https://www.nhs.uk/fit-notes".into()),
            publisher: None,
        },
    );
    let issues = validate_admin_cards(&[card], "fit note requests");
    assert_eq!(codes(&issues), vec![IssueCode::MissingToolkitSource]);
}

#[test]
fn forbidden_terms_name_the_offending_term() {
    let card = make_card(
        "Sore throats",
        "Use the Centor criteria before you decide to diagnose anything.",
    );
    let issues = validate_admin_cards(&[card], "sore throat requests");
    assert_eq!(
        codes(&issues),
        vec![IssueCode::ForbiddenPattern, IssueCode::ForbiddenPattern]
    );
    assert!(issues[0].message.contains("centor"));
    assert!(issues[1].message.contains("diagnose"));
}

#[test]
fn forbidden_source_domain_is_flagged() {
    let mut card = make_card("Hay fever", "Hay fever queries go to the pharmacy team.");
    card.sources.push(CardSource {
        title: "Wiki".into(),
        url: Some("https://en.wikipedia.org/wiki/Hay_fever".into()),
        publisher: None,
    });
    let issues = validate_admin_cards(&[card], "hay fever");
    assert_eq!(codes(&issues), vec![IssueCode::ForbiddenSource]);
}

#[test]
fn triage_prompt_without_slot_guidance_is_flagged_per_card() {
    let cards = vec![
        make_card("Booking rules", "Offer the next available appointment."),
        make_card("Callbacks", "Arrange a callback from the team."),
    ];
    let issues = validate_admin_cards(&cards, "chest pain same-day triage slot rules");
    assert_eq!(
        codes(&issues),
        vec![IssueCode::MissingSlotGuidance, IssueCode::MissingSlotGuidance]
    );
}

#[test]
fn triage_vocabulary_in_card_text_requires_slot_guidance() {
    let card = make_card("Urgent calls", "If in doubt, pass the call to the duty GP.");
    let issues = validate_admin_cards(&[card], "urgent calls");
    assert_eq!(codes(&issues), vec![IssueCode::MissingSlotGuidance]);
}

#[test]
fn populated_slot_guidance_satisfies_triage_prompt() {
    let mut card = make_card("Booking rules", "Offer the next available appointment.");
    card.slot_language = Some(SlotLanguage {
        relevant: true,
        guidance: vec![SlotGuidance {
            slot: "red".into(),
            rule: "Same-day red slot with the duty GP".into(),
        }],
    });
    let issues = validate_admin_cards(&[card], "same-day triage slot rules");
    assert!(issues.is_empty(), "unexpected issues: {issues:?}");
}

#[test]
fn empty_slot_block_counts_as_missing() {
    let mut card = make_card("Booking rules", "Offer the next available appointment.");
    card.slot_language = Some(SlotLanguage::default());
    let issues = validate_admin_cards(&[card], "triage");
    assert_eq!(codes(&issues), vec![IssueCode::MissingSlotGuidance]);
}

fn categories() -> Vec<TopicCategoryRow> {
    vec![
        TopicCategoryRow {
            id: "cat-admin".into(),
            name: "Admin".into(),
            subsections: vec![
                "Repeat prescriptions".into(),
                "Prescriptions".into(),
                "Fit notes".into(),
            ],
            active: true,
        },
        TopicCategoryRow {
            id: "cat-urgent".into(),
            name: "Urgent care".into(),
            subsections: vec!["Same-day triage".into(), "Chest pain pathway".into()],
            active: true,
        },
    ]
}

#[test]
fn verbatim_subsection_is_high_confidence_longest_first() {
    let topics = infer_topics("How do we handle REPEAT prescriptions?", &categories());
    assert_eq!(topics.len(), 2);
    assert_eq!(topics[0].subsection, "Repeat prescriptions");
    assert_eq!(topics[0].confidence, Confidence::High);
    assert_eq!(topics[1].subsection, "Prescriptions");
    assert_eq!(topics[1].confidence, Confidence::High);
}

#[test]
fn keyword_overlap_is_low_confidence_after_high() {
    let topics = infer_topics("chest pain same-day triage slot rules", &categories());
    assert_eq!(topics[0].subsection, "Same-day triage");
    assert_eq!(topics[0].confidence, Confidence::High);
    let low = &topics[1];
    assert_eq!(low.subsection, "Chest pain pathway");
    assert_eq!(low.confidence, Confidence::Low);
    assert!((low.score - 2.0 / 3.0).abs() < 1e-9);
}

#[test]
fn below_threshold_returns_empty() {
    let topics = infer_topics("pathway for something unrelated", &categories());
    assert!(topics.is_empty());
}

#[test]
fn inference_is_idempotent() {
    let first = infer_topics("fit notes and chest pain", &categories());
    let second = infer_topics("fit notes and chest pain", &categories());
    assert_eq!(first, second);
}

use crate::store::{CardEdit, EditorialStore, NewBatch, NewQuiz, PublishOutcome};
use chrono::{Duration, NaiveDate, Utc};
use signpost_common::scope::Scope;
use signpost_common::types::{
    AttemptStatus, CardSource, CardStatus, ContentBlock, ContentBlockKind, CreateGenerationJob,
    GenerationAttemptRow, GenerationJobRow, JobStatus, NewCard, QuizQuestion, RiskLevel,
    TargetRole,
};
use tempfile::TempDir;

async fn setup() -> (TempDir, EditorialStore) {
    signpost_common::id::init(1, 1);
    let dir = TempDir::new().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("signpost.db").display());
    let store = EditorialStore::new(&url, dir.path()).await.unwrap();
    (dir, store)
}

fn job_request(user: &str) -> CreateGenerationJob {
    CreateGenerationJob {
        surgery_scope: Scope::Tenant("s1".into()),
        created_by: user.into(),
        prompt_text: "repeat prescription requests".into(),
        target_role: TargetRole::Admin,
        count: 2,
        tags: vec!["admin".into()],
        interactive_first: true,
    }
}

fn attempt(request_id: &str, index: u32, status: AttemptStatus) -> GenerationAttemptRow {
    GenerationAttemptRow {
        id: signpost_common::id::next_id(),
        request_id: request_id.into(),
        attempt_index: index,
        model_name: "test-model".into(),
        prompt_text: "repeat prescription requests".into(),
        target_role: TargetRole::Admin,
        raw_model_output: "{}".into(),
        raw_model_json: Some(serde_json::json!({})),
        validation_errors: None,
        status,
        surgery_scope: Scope::Tenant("s1".into()),
        created_by: "editor".into(),
        batch_id: None,
        created_at: Utc::now(),
    }
}

fn new_card(title: &str) -> NewCard {
    NewCard {
        title: title.into(),
        topic_id: Some("cat-admin".into()),
        topic_subsection: Some("Repeat prescriptions".into()),
        content_blocks: vec![ContentBlock {
            kind: ContentBlockKind::Paragraph,
            text: "Send requests to the pharmacy team.".into(),
            items: vec![],
        }],
        interactions: vec![],
        slot_language: None,
        safety_netting: vec![],
        sources: vec![CardSource {
            title: "Signposting Toolkit (internal)".into(),
            url: Some("https://app.signpostingtool.co.uk/x".into()),
            publisher: None,
        }],
        estimated_time_minutes: 3,
        risk_level: RiskLevel::Low,
        needs_sourcing: false,
        tags: vec!["admin".into()],
        generated_from: serde_json::json!({"job_id": "j1"}),
    }
}

fn new_batch() -> NewBatch {
    NewBatch {
        surgery_scope: Scope::Tenant("s1".into()),
        created_by: "editor".into(),
        prompt_text: "repeat prescription requests".into(),
        target_role: TargetRole::Admin,
        model_used: "test-model".into(),
        generation_meta: Some(serde_json::json!({"attempts": 1})),
    }
}

fn new_quiz() -> NewQuiz {
    NewQuiz {
        title: "Quiz".into(),
        questions: vec![QuizQuestion {
            question: "Who handles repeat requests?".into(),
            options: vec!["Reception".into(), "Pharmacy team".into()],
            answer_index: 1,
            explanation: None,
        }],
    }
}

async fn running_job(store: &EditorialStore) -> GenerationJobRow {
    let job = store
        .insert_job_rate_limited(&job_request("editor"), 10, Duration::hours(1))
        .await
        .unwrap()
        .unwrap();
    assert!(store.claim_job(&job.id).await.unwrap());
    job
}

/// 生成一个批次并返回第一张卡片 ID
async fn seeded_card(store: &EditorialStore) -> String {
    let job = running_job(store).await;
    let done = store
        .complete_generation(&job.id, &job.id, &new_batch(), &[new_card("One")], &new_quiz())
        .await
        .unwrap();
    done.card_ids[0].clone()
}

#[tokio::test]
async fn rate_limit_counts_per_user_within_window() {
    let (_dir, store) = setup().await;
    let window = Duration::hours(1);

    for _ in 0..2 {
        let job = store
            .insert_job_rate_limited(&job_request("alice"), 2, window)
            .await
            .unwrap();
        assert_eq!(job.unwrap().status, JobStatus::Pending);
    }
    let third = store
        .insert_job_rate_limited(&job_request("alice"), 2, window)
        .await
        .unwrap();
    assert!(third.is_none());

    let other = store
        .insert_job_rate_limited(&job_request("bob"), 2, window)
        .await
        .unwrap();
    assert!(other.is_some());
}

#[tokio::test]
async fn job_round_trips_scope_and_tags() {
    let (_dir, store) = setup().await;
    let mut req = job_request("alice");
    req.surgery_scope = Scope::GlobalDefault;
    let job = store
        .insert_job_rate_limited(&req, 5, Duration::hours(1))
        .await
        .unwrap()
        .unwrap();

    let loaded = store.get_job(&job.id).await.unwrap().unwrap();
    assert_eq!(loaded.surgery_scope, Scope::GlobalDefault);
    assert_eq!(loaded.tags, vec!["admin".to_string()]);
    assert_eq!(loaded.count, 2);
    assert!(loaded.started_at.is_none());
}

#[tokio::test]
async fn claim_job_only_once() {
    let (_dir, store) = setup().await;
    let job = store
        .insert_job_rate_limited(&job_request("alice"), 5, Duration::hours(1))
        .await
        .unwrap()
        .unwrap();

    assert!(store.claim_job(&job.id).await.unwrap());
    assert!(!store.claim_job(&job.id).await.unwrap());
    assert!(!store.claim_job("missing").await.unwrap());

    let loaded = store.get_job(&job.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, JobStatus::Running);
    assert!(loaded.started_at.is_some());
}

#[tokio::test]
async fn failed_job_keeps_message_and_stays_failed() {
    let (_dir, store) = setup().await;
    let job = running_job(&store).await;

    assert!(store.fail_job(&job.id, "VALIDATION_FAILED: nope").await.unwrap());
    assert!(!store.fail_job(&job.id, "again").await.unwrap());

    let loaded = store.get_job(&job.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, JobStatus::Failed);
    assert_eq!(loaded.error_message.as_deref(), Some("VALIDATION_FAILED: nope"));
    assert!(loaded.completed_at.is_some());
}

#[tokio::test]
async fn complete_generation_writes_everything_and_backfills_attempts() {
    let (_dir, store) = setup().await;
    let job = running_job(&store).await;
    store
        .insert_attempt(&attempt(&job.id, 1, AttemptStatus::SchemaMismatch))
        .await
        .unwrap();
    store
        .insert_attempt(&attempt(&job.id, 2, AttemptStatus::Success))
        .await
        .unwrap();

    let done = store
        .complete_generation(
            &job.id,
            &job.id,
            &new_batch(),
            &[new_card("One"), new_card("Two")],
            &new_quiz(),
        )
        .await
        .unwrap();
    assert_eq!(done.card_ids.len(), 2);

    let loaded = store.get_job(&job.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, JobStatus::Complete);
    assert_eq!(loaded.batch_id.as_deref(), Some(done.batch_id.as_str()));

    let attempts = store.list_attempts(&job.id).await.unwrap();
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[0].attempt_index, 1);
    assert!(attempts
        .iter()
        .all(|a| a.batch_id.as_deref() == Some(done.batch_id.as_str())));

    let bundle = store.get_batch_bundle(&done.batch_id).await.unwrap().unwrap();
    assert_eq!(bundle.cards.len(), 2);
    assert!(bundle.cards.iter().all(|c| c.status == CardStatus::Draft));
    assert!(bundle.cards.iter().all(|c| c.version == 0 && c.is_active));
    assert_eq!(bundle.quiz.unwrap().id, done.quiz_id);
    assert_eq!(bundle.batch.surgery_scope, Scope::Tenant("s1".into()));
}

#[tokio::test]
async fn complete_generation_rolls_back_when_job_not_running() {
    let (_dir, store) = setup().await;
    let job = store
        .insert_job_rate_limited(&job_request("alice"), 5, Duration::hours(1))
        .await
        .unwrap()
        .unwrap();
    store
        .insert_attempt(&attempt(&job.id, 1, AttemptStatus::Success))
        .await
        .unwrap();

    let result = store
        .complete_generation(&job.id, &job.id, &new_batch(), &[new_card("One")], &new_quiz())
        .await;
    assert!(result.is_err());

    let attempts = store.list_attempts(&job.id).await.unwrap();
    assert!(attempts[0].batch_id.is_none());
    let loaded = store.get_job(&job.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, JobStatus::Pending);
}

#[tokio::test]
async fn publish_increments_version_once() {
    let (_dir, store) = setup().await;
    let card_id = seeded_card(&store).await;

    assert!(store
        .transition_card(&card_id, &[CardStatus::Draft], CardStatus::Approved)
        .await
        .unwrap());

    let first = store.publish_card(&card_id, "editor", |_| Vec::new()).await.unwrap();
    let card = match first {
        PublishOutcome::Published(card) => card,
        other => panic!("expected publish, got {other:?}"),
    };
    assert_eq!(card.version, 1);
    assert_eq!(card.status, CardStatus::Published);
    assert_eq!(card.published_by.as_deref(), Some("editor"));

    let second = store.publish_card(&card_id, "editor", |_| Vec::new()).await.unwrap();
    assert!(matches!(second, PublishOutcome::NotApproved));

    let versions = store.list_card_versions(&card_id).await.unwrap();
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0].version, 1);
    assert_eq!(versions[0].snapshot["status"], "published");
}

#[tokio::test]
async fn concurrent_publish_has_one_winner() {
    let (_dir, store) = setup().await;
    let card_id = seeded_card(&store).await;
    store
        .transition_card(&card_id, &[CardStatus::Draft], CardStatus::Approved)
        .await
        .unwrap();

    let (a, b) = tokio::join!(
        store.publish_card(&card_id, "a", |_| Vec::new()),
        store.publish_card(&card_id, "b", |_| Vec::new()),
    );
    let outcomes = [a.unwrap(), b.unwrap()];
    let winners = outcomes
        .iter()
        .filter(|o| matches!(o, PublishOutcome::Published(_)))
        .count();
    assert_eq!(winners, 1);

    let card = store.get_card(&card_id).await.unwrap().unwrap();
    assert_eq!(card.version, 1);
    assert_eq!(store.list_card_versions(&card_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn publish_recheck_failure_rolls_back() {
    let (_dir, store) = setup().await;
    let card_id = seeded_card(&store).await;
    store
        .transition_card(&card_id, &[CardStatus::Draft], CardStatus::Approved)
        .await
        .unwrap();

    let outcome = store
        .publish_card(&card_id, "editor", |_| vec!["Review date is required".to_string()])
        .await
        .unwrap();
    assert!(matches!(outcome, PublishOutcome::Refused(ref unmet) if unmet.len() == 1));

    let card = store.get_card(&card_id).await.unwrap().unwrap();
    assert_eq!(card.status, CardStatus::Approved);
    assert_eq!(card.version, 0);
    assert!(store.list_card_versions(&card_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn edits_only_apply_before_publish() {
    let (_dir, store) = setup().await;
    let card_id = seeded_card(&store).await;
    let date = NaiveDate::from_ymd_opt(2027, 1, 31).unwrap();

    let edit = CardEdit {
        title: Some("Renamed".into()),
        review_by_date: Some(Some(date)),
        ..Default::default()
    };
    let card = store.update_card(&card_id, &edit).await.unwrap().unwrap();
    assert_eq!(card.title, "Renamed");
    assert_eq!(card.review_by_date, Some(date));

    store
        .transition_card(&card_id, &[CardStatus::Draft], CardStatus::Approved)
        .await
        .unwrap();
    store.publish_card(&card_id, "editor", |_| Vec::new()).await.unwrap();
    assert!(store.update_card(&card_id, &edit).await.unwrap().is_none());
}

#[tokio::test]
async fn edit_can_raise_risk_level() {
    let (_dir, store) = setup().await;
    let card_id = seeded_card(&store).await;

    let edit = CardEdit {
        risk_level: Some(RiskLevel::High),
        ..Default::default()
    };
    let card = store.update_card(&card_id, &edit).await.unwrap().unwrap();
    assert_eq!(card.risk_level, RiskLevel::High);
}

#[tokio::test]
async fn toggle_active_is_independent_of_status() {
    let (_dir, store) = setup().await;
    let card_id = seeded_card(&store).await;

    let off = store.toggle_card_active(&card_id).await.unwrap().unwrap();
    assert!(!off.is_active);
    assert_eq!(off.status, CardStatus::Draft);
    let on = store.toggle_card_active(&card_id).await.unwrap().unwrap();
    assert!(on.is_active);
    assert!(store.toggle_card_active("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn archive_batch_archives_its_cards() {
    let (_dir, store) = setup().await;
    let card_id = seeded_card(&store).await;
    let card = store.get_card(&card_id).await.unwrap().unwrap();

    assert_eq!(store.archive_batch(&card.batch_id).await.unwrap(), Some(1));
    let archived = store.get_card(&card_id).await.unwrap().unwrap();
    assert_eq!(archived.status, CardStatus::Archived);
    assert!(store.archive_batch("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn stale_running_jobs_are_interrupted() {
    let (_dir, store) = setup().await;
    let job = running_job(&store).await;

    let none = store
        .fail_stale_running_jobs(Utc::now() - Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(none, 0);

    let failed = store
        .fail_stale_running_jobs(Utc::now() + Duration::seconds(1))
        .await
        .unwrap();
    assert_eq!(failed, 1);
    let loaded = store.get_job(&job.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, JobStatus::Failed);
    assert_eq!(loaded.error_message.as_deref(), Some("interrupted"));
}

#[tokio::test]
async fn reference_data_upserts() {
    let (_dir, store) = setup().await;
    store
        .upsert_topic_category("Admin", &["Repeat prescriptions".to_string()], true)
        .await
        .unwrap();
    store
        .upsert_topic_category("Retired", &["Old".to_string()], false)
        .await
        .unwrap();
    let updated = store
        .upsert_topic_category(
            "Admin",
            &["Repeat prescriptions".to_string(), "Fit notes".to_string()],
            true,
        )
        .await
        .unwrap();
    assert_eq!(updated.subsections.len(), 2);

    let active = store.list_active_topic_categories().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].name, "Admin");

    assert!(store.insert_allowed_tag("Admin").await.unwrap());
    assert!(!store.insert_allowed_tag(" admin ").await.unwrap());
    assert_eq!(store.list_allowed_tags().await.unwrap(), vec!["admin".to_string()]);
}

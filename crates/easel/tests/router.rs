//! Interaction router tests: dispatch, validation, policy, submission.

mod support;

use easel::drafts::DraftStore;
use easel::gateway::{
    BannedAction, EphemeralToken, Interaction, PromptsModal, SelectField,
};
use easel::guard::ContentGuard;
use easel::metadata::MetadataCache;
use easel::queue::{job_queue, JobKind, QueueEntry};
use easel::Router;
use easel_db::EaselDb;
use easel_protocol::JobStatus;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use support::{
    job_params, test_catalog, test_config, test_templates, FakeBackend, RecordingResponder,
};
use tokio::sync::mpsc;
use uuid::Uuid;

struct Harness {
    db: EaselDb,
    router: Router<FakeBackend>,
    backend: Arc<FakeBackend>,
    drafts: Arc<DraftStore>,
    rx: mpsc::UnboundedReceiver<QueueEntry>,
    queue: Arc<easel::queue::JobQueue>,
    _dir: tempfile::TempDir,
}

async fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let templates = Arc::new(test_templates(dir.path()));
    let config = Arc::new(test_config(dir.path().to_path_buf()));
    let db = EaselDb::open_memory().await.unwrap();
    let backend = Arc::new(FakeBackend::default());
    let drafts = Arc::new(DraftStore::new());
    let (queue, rx) = job_queue();
    let queue = Arc::new(queue);
    let metadata = Arc::new(MetadataCache::new());

    let router = Router::new(
        config,
        db.clone(),
        Arc::new(test_catalog()),
        templates,
        drafts.clone(),
        Arc::new(ContentGuard::new(db.clone())),
        queue.clone(),
        metadata.clone(),
        backend.clone(),
        Arc::new(support::NoTriggerService),
        backend.clone(),
    );

    Harness {
        db,
        router,
        backend,
        drafts,
        rx,
        queue,
        _dir: dir,
    }
}

fn entry(requester: &str, channel: &str) -> Interaction {
    Interaction::EntryCommand {
        requester_id: requester.to_string(),
        scope_id: "guild-1".to_string(),
        channel_id: channel.to_string(),
    }
}

fn generate(requester: &str) -> Interaction {
    Interaction::GenerateButton {
        requester_id: requester.to_string(),
        scope_id: "guild-1".to_string(),
        channel_id: "chan-1".to_string(),
        ephemeral_token: EphemeralToken("tok".to_string()),
    }
}

fn modal(positive: &str, steps: &str, cfg: &str, seed: &str) -> PromptsModal {
    PromptsModal {
        positive_prompt: positive.to_string(),
        negative_prompt: String::new(),
        steps: steps.to_string(),
        cfg: cfg.to_string(),
        seed: seed.to_string(),
    }
}

#[tokio::test]
async fn entry_command_refused_outside_allowed_channels() {
    let mut h = harness().await;
    let responder = RecordingResponder::default();
    h.router.handle(entry("u1", "chan-9"), &responder).await;

    assert!(responder.last_ephemeral().unwrap().contains("not available"));
    assert!(h.drafts.get("u1").is_none());
    assert!(h.rx.try_recv().is_err());
}

#[tokio::test]
async fn entry_command_opens_modal_with_defaults() {
    let h = harness().await;
    let responder = RecordingResponder::default();
    h.router.handle(entry("u1", "chan-1"), &responder).await;

    let modals = responder.modals.lock().unwrap();
    assert_eq!(modals.len(), 1);
    assert_eq!(modals[0].steps, "28");
    assert_eq!(modals[0].negative_prompt, "lowres");
    assert!(h.drafts.get("u1").is_some());
}

#[tokio::test]
async fn generate_without_session_reports_expiry() {
    let mut h = harness().await;
    let responder = RecordingResponder::default();
    h.router.handle(generate("u1"), &responder).await;
    assert!(responder.last_ephemeral().unwrap().contains("session has expired"));
    assert!(h.rx.try_recv().is_err());
}

#[tokio::test]
async fn generate_requires_nonempty_positive_prompt() {
    let mut h = harness().await;
    let responder = RecordingResponder::default();
    h.router.handle(entry("u1", "chan-1"), &responder).await;
    h.router
        .handle(
            Interaction::PromptsModalSubmitted {
                requester_id: "u1".to_string(),
                fields: modal("   ", "28", "5", "42"),
            },
            &responder,
        )
        .await;
    h.router.handle(generate("u1"), &responder).await;

    assert!(responder
        .last_ephemeral()
        .unwrap()
        .contains("positive prompt"));
    assert!(h.rx.try_recv().is_err());
}

#[tokio::test]
async fn modal_validation_names_the_bad_field() {
    let h = harness().await;
    let responder = RecordingResponder::default();
    h.router.handle(entry("u1", "chan-1"), &responder).await;

    h.router
        .handle(
            Interaction::PromptsModalSubmitted {
                requester_id: "u1".to_string(),
                fields: modal("a cat", "151", "5", "42"),
            },
            &responder,
        )
        .await;
    assert!(responder.last_ephemeral().unwrap().contains("Steps"));

    h.router
        .handle(
            Interaction::PromptsModalSubmitted {
                requester_id: "u1".to_string(),
                fields: modal("a cat", "28", "30.1", "42"),
            },
            &responder,
        )
        .await;
    assert!(responder.last_ephemeral().unwrap().contains("CFG"));

    h.router
        .handle(
            Interaction::PromptsModalSubmitted {
                requester_id: "u1".to_string(),
                fields: modal("a cat", "28", "5", "4294967296"),
            },
            &responder,
        )
        .await;
    assert!(responder.last_ephemeral().unwrap().contains("Seed"));

    // The draft kept its defaults through all three rejections.
    assert_eq!(h.drafts.get("u1").unwrap().steps, 28);
}

#[tokio::test]
async fn banned_word_blocks_submission_with_spoilered_terms() {
    let mut h = harness().await;
    h.db.add_banned_word("badterm", false, "owner").await.unwrap();
    let responder = RecordingResponder::default();

    h.router.handle(entry("u1", "chan-1"), &responder).await;
    h.router
        .handle(
            Interaction::PromptsModalSubmitted {
                requester_id: "u1".to_string(),
                fields: modal("this has a badterm!", "28", "5", "42"),
            },
            &responder,
        )
        .await;
    h.router.handle(generate("u1"), &responder).await;

    let warning = responder.last_warning().unwrap();
    assert!(warning.contains("||badterm||"), "warning was: {warning}");
    assert!(h.rx.try_recv().is_err());
    assert!(h.db.queued_jobs_oldest_first().await.unwrap().is_empty());

    // A non-boundary variant passes and the job is queued.
    h.router
        .handle(
            Interaction::PromptsModalSubmitted {
                requester_id: "u1".to_string(),
                fields: modal("this has badtermy!", "28", "5", "42"),
            },
            &responder,
        )
        .await;
    h.router.handle(generate("u1"), &responder).await;
    assert_eq!(h.rx.try_recv().unwrap().kind, JobKind::Generation);
}

#[tokio::test]
async fn generate_persists_queues_and_ends_the_session() {
    let mut h = harness().await;
    let responder = RecordingResponder::default();

    h.router.handle(entry("u1", "chan-1"), &responder).await;
    h.router
        .handle(
            Interaction::SelectChanged {
                requester_id: "u1".to_string(),
                field: SelectField::Size,
                value: "landscape".to_string(),
            },
            &responder,
        )
        .await;
    h.router
        .handle(
            Interaction::PromptsModalSubmitted {
                requester_id: "u1".to_string(),
                fields: modal("a cat", "30", "7.5", "7"),
            },
            &responder,
        )
        .await;
    h.router.handle(generate("u1"), &responder).await;

    let entry = h.rx.try_recv().unwrap();
    assert_eq!(entry.kind, JobKind::Generation);
    let job = h.db.get_job(entry.job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Queued);
    assert_eq!(job.requester_id, "u1");
    assert_eq!(job.origin_channel_id, "chan-1");
    assert_eq!(job.steps, 30);
    assert_eq!(job.seed, 7);
    assert_eq!(job.size, easel_protocol::SizePreset::Landscape);
    assert_eq!(job.negative_prompt, "");

    // Position message, session gone, token staged for the runner.
    assert!(responder.last_ephemeral().unwrap().contains("#1"));
    assert!(h.drafts.get("u1").is_none());
    assert_eq!(
        h.queue.take_token(entry.job_id),
        Some(EphemeralToken("tok".to_string()))
    );
}

#[tokio::test]
async fn unknown_select_value_is_rejected() {
    let h = harness().await;
    let responder = RecordingResponder::default();
    h.router.handle(entry("u1", "chan-1"), &responder).await;
    h.router
        .handle(
            Interaction::SelectChanged {
                requester_id: "u1".to_string(),
                field: SelectField::Model,
                value: "ghost.safetensors".to_string(),
            },
            &responder,
        )
        .await;
    assert!(responder.last_ephemeral().unwrap().contains("Unknown model"));
}

#[tokio::test]
async fn share_prompt_is_requester_only_and_truncates() {
    let h = harness().await;
    let job_id = Uuid::new_v4();
    let mut params = job_params("u1", "chan-1");
    params.positive_prompt = "p".repeat(1500);
    params.negative_prompt = "n".repeat(800);
    h.db.insert_job(job_id, params).await.unwrap();

    let responder = RecordingResponder::default();
    h.router
        .handle(
            Interaction::SharePromptButton {
                requester_id: "intruder".to_string(),
                job_id,
            },
            &responder,
        )
        .await;
    assert!(responder.last_warning().unwrap().contains("requester"));

    h.router
        .handle(
            Interaction::SharePromptButton {
                requester_id: "u1".to_string(),
                job_id,
            },
            &responder,
        )
        .await;
    let revealed = responder.revealed.lock().unwrap();
    assert_eq!(revealed.len(), 1);
    assert_eq!(revealed[0].0.len(), 1000);
    assert_eq!(revealed[0].1.len(), 500);
}

#[tokio::test]
async fn reroll_copies_the_job_with_a_new_identity() {
    let mut h = harness().await;
    let original = Uuid::new_v4();
    h.db.insert_job(original, job_params("u1", "chan-1"))
        .await
        .unwrap();

    let responder = RecordingResponder::default();
    h.router
        .handle(
            Interaction::RerollButton {
                requester_id: "u1".to_string(),
                job_id: original,
                ephemeral_token: EphemeralToken("tok-2".to_string()),
            },
            &responder,
        )
        .await;

    let entry = h.rx.try_recv().unwrap();
    assert_ne!(entry.job_id, original);
    let copy = h.db.get_job(entry.job_id).await.unwrap();
    assert_eq!(copy.positive_prompt, "a cat");
    assert_eq!(copy.model, "base_v1.safetensors");
    assert!((0..=u32::MAX as i64).contains(&copy.seed));
}

#[tokio::test]
async fn delete_requires_requester_or_moderator() {
    let h = harness().await;
    let job_id = Uuid::new_v4();
    h.db.insert_job(job_id, job_params("u1", "chan-1"))
        .await
        .unwrap();

    let responder = RecordingResponder::default();
    h.router
        .handle(
            Interaction::DeleteButton {
                requester_id: "intruder".to_string(),
                job_id,
                is_moderator: false,
            },
            &responder,
        )
        .await;
    assert!(!responder.deleted.load(Ordering::SeqCst));

    h.router
        .handle(
            Interaction::DeleteButton {
                requester_id: "intruder".to_string(),
                job_id,
                is_moderator: true,
            },
            &responder,
        )
        .await;
    assert!(responder.deleted.load(Ordering::SeqCst));
}

#[tokio::test]
async fn upscale_stages_the_source_image_and_queues() {
    let mut h = harness().await;
    let job_id = Uuid::new_v4();
    h.db.insert_job(job_id, job_params("u1", "chan-1"))
        .await
        .unwrap();
    h.db.set_job_running(job_id, "prompt-77").await.unwrap();
    h.db.set_job_completed(job_id, &["out_00001_.png".to_string()])
        .await
        .unwrap();
    h.backend
        .insert_history("prompt-77", support::completed_entry(&["out_00001_.png"]));

    let responder = RecordingResponder::default();
    h.router
        .handle(
            Interaction::UpscaleButton {
                requester_id: "u1".to_string(),
                job_id,
                image_filename: None,
                ephemeral_token: EphemeralToken("tok-3".to_string()),
            },
            &responder,
        )
        .await;

    let entry = h.rx.try_recv().unwrap();
    assert_eq!(entry.kind, JobKind::Upscale);
    let upscale = h.db.get_upscale_job(entry.job_id).await.unwrap();
    assert_eq!(upscale.source_job_id, job_id);
    // The renderer-chosen name is what later binding must use.
    assert_eq!(upscale.source_image_filename, "staged_out_00001_.png");
    assert_eq!(upscale.upscale_model, "4x_foolhardy.pth");
    assert_eq!(upscale.positive_prompt, "a cat");
}

#[tokio::test]
async fn banned_admin_is_owner_only() {
    let h = harness().await;
    let responder = RecordingResponder::default();

    h.router
        .handle(
            Interaction::BannedCommand {
                requester_id: "u1".to_string(),
                action: BannedAction::Add {
                    word: "badterm".to_string(),
                    partial: false,
                },
            },
            &responder,
        )
        .await;
    assert!(responder.last_warning().unwrap().contains("owner"));
    assert!(h.db.list_banned_words().await.unwrap().is_empty());

    h.router
        .handle(
            Interaction::BannedCommand {
                requester_id: "owner".to_string(),
                action: BannedAction::Add {
                    word: "badterm".to_string(),
                    partial: true,
                },
            },
            &responder,
        )
        .await;
    let words = h.db.list_banned_words().await.unwrap();
    assert_eq!(words.len(), 1);
    assert!(words[0].partial);

    h.router
        .handle(
            Interaction::BannedCommand {
                requester_id: "owner".to_string(),
                action: BannedAction::List,
            },
            &responder,
        )
        .await;
    assert!(responder.last_ephemeral().unwrap().contains("badterm"));

    h.router
        .handle(
            Interaction::BannedCommand {
                requester_id: "owner".to_string(),
                action: BannedAction::Remove {
                    word: "BADTERM".to_string(),
                },
            },
            &responder,
        )
        .await;
    assert!(h.db.list_banned_words().await.unwrap().is_empty());
}

#[tokio::test]
async fn manual_purge_is_owner_only_and_reports_counts() {
    let h = harness().await;
    let responder = RecordingResponder::default();

    h.router
        .handle(
            Interaction::PurgeCommand {
                requester_id: "u1".to_string(),
                max_age_hours: None,
            },
            &responder,
        )
        .await;
    assert!(responder.last_warning().unwrap().contains("owner"));

    h.router
        .handle(
            Interaction::PurgeCommand {
                requester_id: "owner".to_string(),
                max_age_hours: Some(0),
            },
            &responder,
        )
        .await;
    assert!(responder
        .last_ephemeral()
        .unwrap()
        .contains("Purged 0 job(s)"));
}

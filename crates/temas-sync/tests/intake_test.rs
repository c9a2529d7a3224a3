//! Channel intake across the lead lifecycle.
//!
//! Walks the full story: a first message creates the lead, operators move
//! it through the pipeline, and later channel messages keep appending to
//! the transcript without touching the pipeline fields, whatever the
//! stage. Redeliveries are skipped wherever they land.

use std::sync::Arc;

use serde_json::json;

use temas_store::defaults::{HANDLE_FIELD, LEADS_COLLECTION};
use temas_store::test_fixtures::millis;
use temas_store::{FieldFilter, Lead, LeadStatus, MemoryStore, Query, Store};
use temas_sync::{IncomingMessage, IntakeService, LeadsSource, Panel, PanelConfig};

fn setup() -> (Arc<MemoryStore>, Store, IntakeService) {
    let memory = Arc::new(MemoryStore::new());
    let store = Store::new(memory.clone());
    let intake = IntakeService::new(memory.clone());
    (memory, store, intake)
}

async fn find_by_handle(store: &Store, handle: &str) -> Lead {
    let docs = store
        .documents
        .query(Query::all(LEADS_COLLECTION).with_filter(FieldFilter::new(HANDLE_FIELD, json!(handle))))
        .await
        .expect("query should succeed");
    docs.first()
        .expect("lead should exist")
        .decode()
        .expect("lead should decode")
}

#[tokio::test]
async fn test_channel_story_through_the_whole_pipeline() {
    let (_, store, intake) = setup();

    // First contact creates the lead
    let report = intake
        .ingest(&[IncomingMessage::new(
            "mid_001",
            "zeynep.d",
            "Merhaba, bilgi alabilir miyim?",
            millis(10_000),
        )])
        .await
        .expect("first batch");
    assert_eq!(report.created, 1);

    let lead = find_by_handle(&store, "zeynep.d").await;
    assert_eq!(lead.status, LeadStatus::New);
    assert_eq!(lead.first_contact_at, millis(10_000));

    // Operator books the appointment
    store
        .leads
        .advance_status(&lead.id, LeadStatus::AppointmentSet)
        .await
        .expect("advance to appointment");

    // More channel chatter while the appointment stands
    let report = intake
        .ingest(&[IncomingMessage::new(
            "mid_002",
            "zeynep.d",
            "Saat kaçta görüşüyoruz?",
            millis(20_000),
        )])
        .await
        .expect("second batch");
    assert_eq!(report.appended, 1);

    let lead = store.leads.fetch(&lead.id).await.expect("fetch");
    assert_eq!(
        lead.status,
        LeadStatus::AppointmentSet,
        "intake must not move the pipeline"
    );
    assert_eq!(lead.message_history.len(), 2);

    // Session happens and is written up
    store
        .leads
        .append_note_and_complete(&lead.id, "Intro session done, follow-up plan shared")
        .await
        .expect("complete session");

    // A thank-you message after completion still lands in the transcript
    let report = intake
        .ingest(&[IncomingMessage::new(
            "mid_003",
            "zeynep.d",
            "Teşekkürler!",
            millis(30_000),
        )])
        .await
        .expect("third batch");
    assert_eq!(report.appended, 1);

    let lead = store.leads.fetch(&lead.id).await.expect("fetch");
    assert_eq!(
        lead.status,
        LeadStatus::SessionDone,
        "the terminal status survives intake"
    );
    assert_eq!(lead.session_notes.len(), 1);
    assert_eq!(lead.message_history.len(), 3);
    assert_eq!(lead.last_seen_at, Some(millis(30_000)));

    // A redelivery of the very first message is recognized at any stage
    let report = intake
        .ingest(&[IncomingMessage::new(
            "mid_001",
            "zeynep.d",
            "Merhaba, bilgi alabilir miyim?",
            millis(10_000),
        )])
        .await
        .expect("redelivered batch");
    assert_eq!(report.duplicates, 1);

    let lead = store.leads.fetch(&lead.id).await.expect("fetch");
    assert_eq!(lead.message_history.len(), 3);
}

#[tokio::test]
async fn test_intake_lands_on_the_leads_panel() {
    let (_, store, intake) = setup();
    let handle = Panel::new(LeadsSource::new(store.leads.clone()), PanelConfig::default()).start();
    let mut state = handle.state();
    state.changed().await.expect("first snapshot");

    intake
        .ingest(&[
            IncomingMessage::new("mid_001", "zeynep.d", "Merhaba!", millis(10_000)),
            IncomingMessage::new("mid_002", "ali.veli", "Selam", millis(20_000)),
        ])
        .await
        .expect("batch");

    // The two creates may arrive as one frame or two
    loop {
        state.changed().await.expect("push");
        let view = state.borrow_and_update();
        let leads = view.value().expect("view should be ready");
        if leads.len() == 2 {
            assert_eq!(leads[0].handle, "ali.veli", "newest first contact renders first");
            assert_eq!(leads[1].handle, "zeynep.d");
            break;
        }
    }

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_intake_batches_both_land() {
    let (_, store, intake) = setup();
    intake
        .ingest(&[IncomingMessage::new(
            "mid_001",
            "zeynep.d",
            "Merhaba!",
            millis(10_000),
        )])
        .await
        .expect("seed lead");

    let a = intake.clone();
    let b = intake.clone();
    let first = tokio::spawn(async move {
        a.ingest(&[IncomingMessage::new(
            "mid_002",
            "zeynep.d",
            "Fiyat nedir?",
            millis(20_000),
        )])
        .await
    });
    let second = tokio::spawn(async move {
        b.ingest(&[IncomingMessage::new(
            "mid_003",
            "zeynep.d",
            "Adres neresi?",
            millis(30_000),
        )])
        .await
    });

    first
        .await
        .expect("task join")
        .expect("first batch should land within its retry budget");
    second
        .await
        .expect("task join")
        .expect("second batch should land within its retry budget");

    // Both appends survive the contention on the same lead
    let lead = find_by_handle(&store, "zeynep.d").await;
    assert_eq!(lead.message_history.len(), 3);
    assert!(lead.has_processed("mid_002"));
    assert!(lead.has_processed("mid_003"));
}

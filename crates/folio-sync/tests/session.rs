mod common;

use common::{ms, open, settings};
use folio_common::{DocumentStore, MemoryStore};
use folio_sync::{
    CONFLICT_MESSAGE, Decision, Edit, Ignored, Notice, SaveOutcome, SaveStatus, SkipReason,
    SyncError, SyncSession,
};
use tokio::time::sleep;

#[tokio::test(start_paused = true)]
async fn test_burst_of_edits_saves_once() {
    let store = MemoryStore::new();
    let doc = store.seed("", "");
    let session = open(&store, &doc).await;

    for title in ["Q", "Q3", "Q3 ", "Q3 Out", "Q3 Outlook"] {
        assert!(session.edit(Edit::title(title)));
        sleep(ms(200)).await;
    }
    assert_eq!(store.replace_count(&doc.id), 0);

    sleep(ms(2000)).await;
    assert_eq!(store.replace_count(&doc.id), 1);
    assert_eq!(store.replaces()[0].1.title, "Q3 Outlook");

    let view = session.view();
    assert!(!view.dirty);
    assert_eq!(view.draft.title, "Q3 Outlook");
    assert_eq!(view.status, SaveStatus::Saved);
}

#[tokio::test(start_paused = true)]
async fn test_status_moves_dirty_saving_saved() {
    let store = MemoryStore::new();
    let doc = store.seed("", "");
    store.set_write_latency(ms(200));
    let session = open(&store, &doc).await;

    let mut rx = session.subscribe();
    let seen = tokio::spawn(async move {
        let mut seen = Vec::new();
        while rx.changed().await.is_ok() {
            let status = rx.borrow_and_update().status;
            if seen.last() != Some(&status) {
                seen.push(status);
            }
            if status == SaveStatus::Saved {
                break;
            }
        }
        seen
    });

    session.edit(Edit::title("Q3 Outlook"));
    assert_eq!(session.status(), SaveStatus::Dirty);

    sleep(ms(1600)).await;
    assert_eq!(session.status(), SaveStatus::Saving);
    assert_eq!(session.view().status_text, Some("Saving…"));

    sleep(ms(400)).await;
    let view = session.view();
    assert_eq!(view.status, SaveStatus::Saved);
    assert!(view.last_saved_at.is_some());
    assert_eq!(store.replaces().len(), 1);
    assert_eq!(store.replaces()[0].1.title, "Q3 Outlook");

    assert_eq!(
        seen.await.unwrap(),
        [SaveStatus::Dirty, SaveStatus::Saving, SaveStatus::Saved]
    );
}

#[tokio::test(start_paused = true)]
async fn test_save_now_cancels_pending_timer() {
    let store = MemoryStore::new();
    let doc = store.seed("Draft", "");
    let session = open(&store, &doc).await;

    session.edit(Edit::content("<p>hello</p>"));
    sleep(ms(500)).await;
    assert!(matches!(session.save_now().await, SaveOutcome::Saved(_)));

    sleep(ms(3000)).await;
    assert_eq!(store.replace_count(&doc.id), 1);
}

#[tokio::test(start_paused = true)]
async fn test_clean_save_is_skipped() {
    let store = MemoryStore::new();
    let doc = store.seed("Draft", "");
    let session = open(&store, &doc).await;

    assert_eq!(
        session.save_now().await,
        SaveOutcome::Skipped(SkipReason::Clean)
    );

    session.edit(Edit::title("Other"));
    session.edit(Edit::title("Draft"));
    sleep(ms(3000)).await;
    assert_eq!(store.replace_count(&doc.id), 0);
}

#[tokio::test(start_paused = true)]
async fn test_one_save_in_flight_second_requeued() {
    let store = MemoryStore::new();
    let doc = store.seed("", "");
    store.set_write_latency(ms(1000));
    let session = open(&store, &doc).await;

    session.edit(Edit::title("A"));
    let first = tokio::spawn({
        let session = session.clone();
        async move { session.save_now().await }
    });
    sleep(ms(10)).await;

    session.edit(Edit::title("AB"));
    assert_eq!(
        session.save_now().await,
        SaveOutcome::Skipped(SkipReason::InFlight)
    );

    assert!(matches!(first.await.unwrap(), SaveOutcome::Saved(_)));
    // Edited while the first write was outstanding: still dirty, not reset.
    let view = session.view();
    assert_eq!(view.draft.title, "AB");
    assert!(view.dirty);

    sleep(ms(3000)).await;
    assert_eq!(store.replace_count(&doc.id), 2);
    assert_eq!(store.max_writes_in_flight(), 1);
    assert_eq!(store.get(&doc.id).unwrap().title, "AB");
    assert!(!session.is_dirty());
}

#[tokio::test(start_paused = true)]
async fn test_save_leaves_draft_equal_to_baseline() {
    let store = MemoryStore::new();
    let doc = store.seed("Draft", "<p>a</p>");
    let session = open(&store, &doc).await;

    session.edit(Edit::content("<p>b</p>"));
    session.edit(Edit::Pinned(true));
    let SaveOutcome::Saved(revision) = session.save_now().await else {
        panic!("expected save");
    };

    let view = session.view();
    assert!(!view.dirty);
    assert_eq!(view.revision, Some(revision));
    let server = store.get(&doc.id).unwrap();
    assert_eq!(server.content(), "<p>b</p>");
    assert!(server.pinned);
}

#[tokio::test(start_paused = true)]
async fn test_blank_title_saved_as_untitled_and_clean() {
    let store = MemoryStore::new();
    let session = SyncSession::new(store.clone(), settings());
    let view = session.create_document().await.unwrap();
    let id = view.document_id.unwrap();

    session.edit(Edit::content("<p>notes</p>"));
    assert!(matches!(session.save_now().await, SaveOutcome::Saved(_)));

    assert_eq!(store.replaces()[0].1.title, "Untitled");
    let view = session.view();
    assert_eq!(view.draft.title, "Untitled");
    assert!(!view.dirty);
    assert_eq!(store.get(&id).unwrap().title, "Untitled");
}

#[tokio::test(start_paused = true)]
async fn test_failed_save_keeps_draft() {
    let store = MemoryStore::new();
    let doc = store.seed("Draft", "");
    let session = open(&store, &doc).await;
    store.fail_next_save("disk full");

    session.edit(Edit::title("Renamed"));
    assert!(matches!(session.save_now().await, SaveOutcome::Failed(_)));

    let view = session.view();
    assert_eq!(view.status, SaveStatus::Error);
    assert_eq!(view.status_text, Some("Save failed"));
    assert!(view.dirty);
    assert_eq!(view.draft.title, "Renamed");
    assert_eq!(view.revision, Some(doc.revision.clone()));
    assert!(view.last_error.unwrap().contains("disk full"));

    assert!(matches!(session.save_now().await, SaveOutcome::Saved(_)));
    assert_eq!(session.status(), SaveStatus::Saved);
}

#[tokio::test(start_paused = true)]
async fn test_edit_clears_error() {
    let store = MemoryStore::new();
    let doc = store.seed("Draft", "");
    let session = open(&store, &doc).await;
    store.fail_next_save("offline");

    session.edit(Edit::title("One"));
    session.save_now().await;
    assert_eq!(session.status(), SaveStatus::Error);

    session.edit(Edit::title("Two"));
    assert_eq!(session.status(), SaveStatus::Dirty);
}

#[tokio::test(start_paused = true)]
async fn test_edits_before_load_are_ignored() {
    let store = MemoryStore::new();
    let session = SyncSession::new(store.clone(), settings());
    assert!(!session.edit(Edit::title("lost")));
    assert_eq!(
        session.save_now().await,
        SaveOutcome::Skipped(SkipReason::NoDocument)
    );
    assert_eq!(session.status(), SaveStatus::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_clean_remote_change_fast_forwards() {
    let store = MemoryStore::new();
    let doc = store.seed("Draft", "<p>a</p>");
    let session = open(&store, &doc).await;

    store.edit_remote(&doc.id, |d| d.title = "Remote".into());
    assert_eq!(session.refresh().await.unwrap(), Decision::FastForward);

    let view = session.view();
    assert_eq!(view.draft.title, "Remote");
    assert!(!view.dirty);
    assert_eq!(view.status, SaveStatus::Idle);
    assert_eq!(view.notice, Some(Notice::Synced));
    assert_eq!(view.status_text, Some("Synced latest updates"));
}

#[tokio::test(start_paused = true)]
async fn test_dirty_remote_change_conflicts() {
    let store = MemoryStore::new();
    let doc = store.seed("Draft", "<p>a</p>");
    let session = open(&store, &doc).await;

    session.edit(Edit::content("<p>local</p>"));
    store.edit_remote(&doc.id, |d| d.title = "Remote".into());
    assert_eq!(session.refresh().await.unwrap(), Decision::Conflict);

    let view = session.view();
    assert_eq!(view.status, SaveStatus::Conflict);
    assert_eq!(view.draft.title, "Draft");
    assert_eq!(view.draft.content, "<p>local</p>");
    assert_eq!(view.revision, Some(doc.revision.clone()));
    assert_eq!(view.conflict.as_ref().unwrap().message(), CONFLICT_MESSAGE);
    assert_eq!(view.status_text, Some(CONFLICT_MESSAGE));

    // The quiet period passes; the timer must not overwrite the remote change.
    sleep(ms(3000)).await;
    assert_eq!(store.replace_count(&doc.id), 0);

    // Still editable while the conflict is flagged.
    assert!(session.edit(Edit::content("<p>local, more</p>")));
    assert!(session.view().conflict.is_some());

    // Explicit save overwrites.
    assert!(matches!(session.save_now().await, SaveOutcome::Saved(_)));
    let server = store.get(&doc.id).unwrap();
    assert_eq!(server.title, "Draft");
    assert_eq!(server.content(), "<p>local, more</p>");
    let view = session.view();
    assert!(view.conflict.is_none());
    assert_eq!(view.status, SaveStatus::Saved);
}

#[tokio::test(start_paused = true)]
async fn test_discard_resolves_conflict() {
    let store = MemoryStore::new();
    let doc = store.seed("Draft", "<p>a</p>");
    let session = open(&store, &doc).await;

    session.edit(Edit::content("<p>local</p>"));
    store.edit_remote(&doc.id, |d| d.title = "Remote".into());
    session.refresh().await.unwrap();

    let view = session.discard_and_reload().await.unwrap();
    assert!(view.conflict.is_none());
    assert!(!view.dirty);
    assert_eq!(view.draft.title, "Remote");
    assert_eq!(view.draft.content, "<p>a</p>");
    assert_eq!(view.status, SaveStatus::Idle);

    sleep(ms(3000)).await;
    assert_eq!(store.replace_count(&doc.id), 0);
}

#[tokio::test(start_paused = true)]
async fn test_own_save_is_not_a_remote_change() {
    let store = MemoryStore::new();
    let doc = store.seed("Draft", "");
    let session = open(&store, &doc).await;

    session.edit(Edit::title("Mine"));
    session.save_now().await;
    session.edit(Edit::title("Mine, edited"));

    assert_eq!(
        session.refresh().await.unwrap(),
        Decision::Ignored(Ignored::Echo)
    );
    assert!(session.view().conflict.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_two_sessions_clean_reader_adopts_silently() {
    let store = MemoryStore::new();
    let doc = store.seed("Draft", "");
    let a = open(&store, &doc).await;
    let b = open(&store, &doc).await;

    a.edit(Edit::title("From A"));
    sleep(ms(2000)).await;
    assert_eq!(store.get(&doc.id).unwrap().title, "From A");

    assert_eq!(b.refresh().await.unwrap(), Decision::FastForward);
    let view = b.view();
    assert_eq!(view.draft.title, "From A");
    assert_ne!(view.status, SaveStatus::Conflict);
    assert!(view.conflict.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_two_sessions_dirty_reader_conflicts() {
    let store = MemoryStore::new();
    let doc = store.seed("Draft", "");
    let a = open(&store, &doc).await;
    let b = open(&store, &doc).await;

    b.edit(Edit::content("<p>from b</p>"));
    a.edit(Edit::title("From A"));
    a.save_now().await;

    assert_eq!(b.refresh().await.unwrap(), Decision::Conflict);
    let view = b.view();
    assert_eq!(view.status, SaveStatus::Conflict);
    assert_eq!(view.draft.title, "Draft");
    assert_eq!(view.draft.content, "<p>from b</p>");
}

#[tokio::test(start_paused = true)]
async fn test_switch_mid_save_drops_stale_response() {
    let store = MemoryStore::new();
    let first = store.seed("First", "");
    let second = store.seed("Second", "<p>2</p>");
    store.set_write_latency(ms(1000));
    let session = open(&store, &first).await;

    session.edit(Edit::title("First, edited"));
    let save = tokio::spawn({
        let session = session.clone();
        async move { session.save_now().await }
    });
    sleep(ms(10)).await;

    session.open(second.id.clone()).await.unwrap();
    assert_eq!(save.await.unwrap(), SaveOutcome::Stale);

    let view = session.view();
    assert_eq!(view.document_id, Some(second.id.clone()));
    assert_eq!(view.draft.title, "Second");
    assert_eq!(view.revision, Some(second.revision.clone()));
    assert_eq!(view.status, SaveStatus::Idle);
    assert!(view.last_saved_at.is_none());
    // The write itself still landed on the first document.
    assert_eq!(store.get(&first.id).unwrap().title, "First, edited");
}

#[tokio::test(start_paused = true)]
async fn test_switch_cancels_scheduled_save() {
    let store = MemoryStore::new();
    let first = store.seed("First", "");
    let second = store.seed("Second", "");
    let session = open(&store, &first).await;

    session.edit(Edit::title("First, edited"));
    session.open(second.id.clone()).await.unwrap();
    sleep(ms(3000)).await;

    assert_eq!(store.replace_count(&first.id), 0);
    assert_eq!(store.replace_count(&second.id), 0);
}

#[tokio::test(start_paused = true)]
async fn test_remote_change_during_save_is_flagged() {
    let store = MemoryStore::new();
    let doc = store.seed("Draft", "");
    store.set_write_latency(ms(1000));
    let session = open(&store, &doc).await;

    session.edit(Edit::title("Mine"));
    let save = tokio::spawn({
        let session = session.clone();
        async move { session.save_now().await }
    });
    sleep(ms(10)).await;

    let remote = store
        .edit_remote(&doc.id, |d| d.pinned = true)
        .unwrap();
    let remote_revision = remote.revision.clone();
    assert_eq!(
        session.apply_snapshot(remote),
        Decision::Ignored(Ignored::SaveInFlight)
    );
    assert!(matches!(save.await.unwrap(), SaveOutcome::Saved(_)));

    let conflict = session.view().conflict.unwrap();
    assert_eq!(conflict.remote_revision, remote_revision);

    // the echo of our own save must not clear it
    assert_eq!(
        session.refresh().await.unwrap(),
        Decision::Ignored(Ignored::Echo)
    );
    assert!(session.view().conflict.is_some());
    assert_eq!(session.status(), SaveStatus::Conflict);
}

#[tokio::test(start_paused = true)]
async fn test_remote_change_during_failed_save_is_reconciled() {
    let store = MemoryStore::new();
    let doc = store.seed("Draft", "");
    store.set_write_latency(ms(1000));
    store.fail_next_save("503");
    let session = open(&store, &doc).await;

    session.edit(Edit::title("Mine"));
    let save = tokio::spawn({
        let session = session.clone();
        async move { session.save_now().await }
    });
    sleep(ms(10)).await;

    let remote = store
        .edit_remote(&doc.id, |d| d.title = "Theirs".into())
        .unwrap();
    session.apply_snapshot(remote.clone());
    assert!(matches!(save.await.unwrap(), SaveOutcome::Failed(_)));

    let view = session.view();
    assert_eq!(view.conflict.unwrap().remote_revision, remote.revision);
    assert_eq!(view.draft.title, "Mine");
    assert_eq!(store.get(&doc.id).unwrap().title, "Theirs");
}

#[tokio::test(start_paused = true)]
async fn test_snapshot_echoing_baseline_during_save_is_not_a_conflict() {
    let store = MemoryStore::new();
    let doc = store.seed("Draft", "");
    store.set_write_latency(ms(1000));
    let session = open(&store, &doc).await;

    session.edit(Edit::title("Mine"));
    let save = tokio::spawn({
        let session = session.clone();
        async move { session.save_now().await }
    });
    sleep(ms(10)).await;

    session.apply_snapshot(store.get(&doc.id).unwrap());
    assert!(matches!(save.await.unwrap(), SaveOutcome::Saved(_)));
    assert!(session.view().conflict.is_none());
    assert_eq!(session.status(), SaveStatus::Saved);
}

#[tokio::test(start_paused = true)]
async fn test_reopen_during_outstanding_save_still_autosaves() {
    let store = MemoryStore::new();
    let doc = store.seed("Draft", "");
    store.set_write_latency(ms(5000));
    let session = open(&store, &doc).await;

    session.edit(Edit::title("Before close"));
    let save = tokio::spawn({
        let session = session.clone();
        async move { session.save_now().await }
    });
    sleep(ms(10)).await;

    session.close();
    session.open(doc.id.clone()).await.unwrap();
    session.edit(Edit::content("<p>after reopen</p>"));

    // the reopened document's timer fires while the old write is outstanding
    sleep(ms(2000)).await;
    assert_eq!(store.replace_count(&doc.id), 1);

    assert_eq!(save.await.unwrap(), SaveOutcome::Stale);
    sleep(ms(8000)).await;

    assert_eq!(store.replace_count(&doc.id), 2);
    let view = session.view();
    assert!(!view.dirty);
    assert_eq!(view.status, SaveStatus::Saved);
    assert_eq!(store.get(&doc.id).unwrap().content(), "<p>after reopen</p>");
}

#[tokio::test(start_paused = true)]
async fn test_snapshot_for_other_document_ignored() {
    let store = MemoryStore::new();
    let doc = store.seed("Draft", "");
    let other = store.seed("Other", "");
    let session = open(&store, &doc).await;

    assert_eq!(
        session.apply_snapshot(other),
        Decision::Ignored(Ignored::OtherDocument)
    );
    assert_eq!(session.view().draft.title, "Draft");
}

#[tokio::test(start_paused = true)]
async fn test_delete_cancels_scheduled_save() {
    let store = MemoryStore::new();
    let doc = store.seed("Draft", "");
    let session = open(&store, &doc).await;

    session.edit(Edit::title("Doomed"));
    session.delete_document().await.unwrap();
    sleep(ms(3000)).await;

    assert_eq!(store.replace_count(&doc.id), 0);
    assert!(store.get(&doc.id).is_none());
    assert_eq!(session.document_id(), None);
    assert!(matches!(session.refresh().await, Err(SyncError::NoDocument)));
}

#[tokio::test(start_paused = true)]
async fn test_delete_abandons_in_flight_save() {
    let store = MemoryStore::new();
    let doc = store.seed("Draft", "");
    store.set_write_latency(ms(1000));
    let session = open(&store, &doc).await;

    session.edit(Edit::title("Doomed"));
    let save = tokio::spawn({
        let session = session.clone();
        async move { session.save_now().await }
    });
    sleep(ms(10)).await;

    session.delete_document().await.unwrap();
    assert_eq!(save.await.unwrap(), SaveOutcome::Stale);
    assert_eq!(session.view().status, SaveStatus::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_open_missing_document() {
    let store = MemoryStore::new();
    let session = SyncSession::new(store.clone(), settings());
    let err = session.open("doc-404").await.unwrap_err();
    assert!(matches!(err, SyncError::Store(e) if e.is_not_found()));
}

#[tokio::test(start_paused = true)]
async fn test_close_drops_document() {
    let store = MemoryStore::new();
    let doc = store.seed("Draft", "");
    let session = open(&store, &doc).await;

    session.edit(Edit::title("Unsaved"));
    session.close();
    sleep(ms(3000)).await;

    assert_eq!(store.replace_count(&doc.id), 0);
    assert_eq!(session.view().document_id, None);
    assert!(store.fetch(&doc.id).await.is_ok());
}

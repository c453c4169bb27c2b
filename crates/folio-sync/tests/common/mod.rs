#![allow(dead_code)]

use std::time::Duration;

use folio_common::{Document, MemoryStore, SyncSettings};
use folio_sync::SyncSession;

pub const QUIET: Duration = Duration::from_millis(1500);

pub fn settings() -> SyncSettings {
    SyncSettings {
        quiet_period: QUIET,
        ..SyncSettings::default()
    }
}

/// A session on a clone of `store` with `doc` open and loaded.
pub async fn open(store: &MemoryStore, doc: &Document) -> SyncSession<MemoryStore> {
    let session = SyncSession::new(store.clone(), settings());
    session.open(doc.id.clone()).await.unwrap();
    session
}

pub fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

//! Optimistic attachment state for the open document.
//!
//! An upload shows up immediately as a placeholder block. The placeholder's
//! block id is stable: confirmation swaps the block in place by that id, and
//! failure removes exactly that block. Confirmed attachments that no server
//! snapshot has shown yet are kept across snapshots until one includes them,
//! matched by attachment id.

use folio_common::{AttachmentBlock, AttachmentDescriptor, AttachmentId, AttachmentUpload, BlockId, Document};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryState {
    /// Upload outstanding. Never persisted.
    Pending,
    /// Upload confirmed locally, not yet seen in a server snapshot.
    Confirmed,
    /// Present in the last accepted snapshot.
    Synced,
}

#[derive(Debug, Clone)]
struct Entry {
    block: AttachmentBlock,
    state: EntryState,
}

/// An attachment as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentView {
    pub block: AttachmentBlock,
    pub pending: bool,
}

#[derive(Debug, Default)]
pub struct AttachmentLayer {
    entries: Vec<Entry>,
}

impl AttachmentLayer {
    /// Append a placeholder for `upload`, returning its stable id.
    pub fn insert_placeholder(&mut self, upload: &AttachmentUpload) -> BlockId {
        let id = BlockId::generate();
        self.entries.push(Entry {
            block: AttachmentBlock {
                id: id.clone(),
                reference: AttachmentId::new(format!("pending:{id}")),
                filename: upload.filename.clone(),
                content_type: upload.content_type.clone(),
                url: None,
            },
            state: EntryState::Pending,
        });
        id
    }

    /// Replace the placeholder with the confirmed block. Returns `None` if
    /// the placeholder is gone.
    pub fn confirm(
        &mut self,
        placeholder: &BlockId,
        descriptor: &AttachmentDescriptor,
    ) -> Option<AttachmentBlock> {
        let position = self.position(placeholder)?;
        let block = descriptor.to_block(placeholder.clone());

        if self.entries.iter().any(|e| e.block.reference == descriptor.id) {
            // A snapshot already delivered it.
            self.entries.remove(position);
        } else {
            self.entries[position] = Entry {
                block: block.clone(),
                state: EntryState::Confirmed,
            };
        }
        Some(block)
    }

    /// Drop the placeholder after a failed upload.
    pub fn remove(&mut self, placeholder: &BlockId) -> bool {
        match self.position(placeholder) {
            Some(position) => {
                self.entries.remove(position);
                true
            }
            None => false,
        }
    }

    /// Take the attachment blocks of an accepted snapshot.
    ///
    /// The snapshot's attachments come first in server order. Local
    /// placeholders and confirmed-but-unseen attachments follow. Attachments
    /// we had seen before that the snapshot no longer lists were removed
    /// elsewhere and are dropped.
    pub fn merge_snapshot(&mut self, doc: &Document) {
        let mut merged: Vec<Entry> = doc
            .attachments()
            .map(|block| Entry {
                block: block.clone(),
                state: EntryState::Synced,
            })
            .collect();

        for entry in self.entries.drain(..) {
            let listed = merged.iter().any(|e| e.block.reference == entry.block.reference);
            match entry.state {
                EntryState::Pending => merged.push(entry),
                EntryState::Confirmed if !listed => merged.push(entry),
                EntryState::Confirmed | EntryState::Synced => {}
            }
        }

        self.entries = merged;
    }

    /// Attachment blocks to persist: everything except placeholders.
    pub fn confirmed(&self) -> Vec<AttachmentBlock> {
        self.entries
            .iter()
            .filter(|e| e.state != EntryState::Pending)
            .map(|e| e.block.clone())
            .collect()
    }

    pub fn views(&self) -> Vec<AttachmentView> {
        self.entries
            .iter()
            .map(|e| AttachmentView {
                block: e.block.clone(),
                pending: e.state == EntryState::Pending,
            })
            .collect()
    }

    fn position(&self, id: &BlockId) -> Option<usize> {
        self.entries.iter().position(|e| &e.block.id == id)
    }
}

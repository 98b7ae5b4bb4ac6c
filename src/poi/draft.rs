use super::PoiRecord;

/// A POI proposed by a right-click, waiting for the user to confirm it.
#[derive(Debug, Clone, PartialEq)]
pub struct PoiDraft {
    pub record: PoiRecord,
}

/// Title and description typed during confirmation. Blank values keep the draft's.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoiEdit {
    pub title: String,
    pub description: String,
}

/// Synchronous confirm step shown before a draft is committed.
pub trait PoiEditor {
    /// Returns `None` when the user cancels.
    fn confirm(&mut self, draft: &PoiDraft) -> Option<PoiEdit>;
}

impl<F> PoiEditor for F
where
    F: FnMut(&PoiDraft) -> Option<PoiEdit>,
{
    fn confirm(&mut self, draft: &PoiDraft) -> Option<PoiEdit> {
        self(draft)
    }
}

impl PoiDraft {
    pub fn finish(self, edit: PoiEdit) -> PoiRecord {
        let mut record = self.record;
        let title = edit.title.trim();
        if !title.is_empty() {
            record.title = title.to_string();
        }
        let description = edit.description.trim();
        if !description.is_empty() {
            record.description = Some(description.to_string());
        }
        record
    }
}

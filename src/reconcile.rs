use crate::models::{ContactRecord, RecordKey};

/// Drops every review record the backend now reports as completed.
///
/// Review order is preserved. Matching is `RecordKey::same_person`, so a record
/// that is being edited locally disappears as soon as the backend lists it.
pub fn reconcile_review(
    current_review: Vec<ContactRecord>,
    fresh_completed: &[ContactRecord],
) -> Vec<ContactRecord> {
    let completed: Vec<RecordKey> = fresh_completed.iter().map(ContactRecord::key).collect();
    current_review
        .into_iter()
        .filter(|record| {
            let key = record.key();
            !completed.iter().any(|done| done.same_person(&key))
        })
        .collect()
}

//! Owns the three outreach stages and every transition between them.
//!
//! Network operations come in two halves. `begin_*` validates the action and
//! returns the `Request` to dispatch; the matching `Outcome` is later fed to
//! `apply`. The board uses the halves so it stays responsive while requests are
//! in flight. The `async` methods run both halves back to back.

use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::gateway::{self, BackendGateway, GatewayError, Outcome, Request};
use crate::intake;
use crate::models::{CompanyPerson, ContactRecord, DraftEntry, RecordKey};
use crate::reconcile::reconcile_review;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Draft,
    Review,
    Completed,
}

#[derive(Debug, Default)]
pub struct Coordinator {
    drafts: Vec<DraftEntry>,
    review: Vec<ContactRecord>,
    completed: Vec<ContactRecord>,
    error: Option<String>,
    notice: Option<String>,
    generating: HashSet<String>,
    sending: HashSet<RecordKey>,
    looking_up: usize,
    // Moved back to review by the operator; held out of refreshed completions
    redrafted: HashSet<RecordKey>,
    next_seq: u64,
    last_refresh: Option<DateTime<Utc>>,
}

impl Coordinator {
    pub fn new() -> Self {
        Self::default()
    }

    // --- Read access ---

    pub fn drafts(&self) -> &[DraftEntry] {
        &self.drafts
    }

    pub fn review(&self) -> &[ContactRecord] {
        &self.review
    }

    pub fn completed(&self) -> &[ContactRecord] {
        &self.completed
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn last_refresh(&self) -> Option<DateTime<Utc>> {
        self.last_refresh
    }

    pub fn draft(&self, id: &str) -> Option<&DraftEntry> {
        self.drafts.iter().find(|d| d.id == id)
    }

    pub fn review_record(&self, key: &RecordKey) -> Option<&ContactRecord> {
        self.review.iter().find(|r| &r.key() == key)
    }

    /// Which stage holds this person, matched with `RecordKey::same_person`.
    pub fn stage_of(&self, key: &RecordKey) -> Option<Stage> {
        if self.review.iter().any(|r| r.key().same_person(key)) {
            Some(Stage::Review)
        } else if self.completed.iter().any(|r| r.key().same_person(key)) {
            Some(Stage::Completed)
        } else {
            None
        }
    }

    /// Whether any request is still waiting on the backend.
    pub fn is_busy(&self) -> bool {
        !self.generating.is_empty() || !self.sending.is_empty() || self.looking_up > 0
    }

    pub fn is_generating(&self, draft_id: &str) -> bool {
        self.generating.contains(draft_id)
    }

    pub fn is_sending(&self, key: &RecordKey) -> bool {
        self.sending.contains(key)
    }

    pub fn dismiss_error(&mut self) {
        self.error = None;
    }

    pub fn dismiss_notice(&mut self) {
        self.notice = None;
    }

    /// Puts `message` in the error slot, replacing whatever was there.
    pub fn report_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{}", message);
        self.error = Some(message);
    }

    // --- Draft input ---

    pub fn create_draft_input_entry(&mut self) -> String {
        self.push_draft(String::new())
    }

    fn push_draft(&mut self, text: String) -> String {
        let created_at = Utc::now();
        self.next_seq += 1;
        let id = format!("new-{}-{}", created_at.timestamp_millis(), self.next_seq);
        self.drafts.push(DraftEntry {
            id: id.clone(),
            created_at,
            text,
        });
        id
    }

    pub fn discard_draft_input_entry(&mut self, id: &str) -> bool {
        let before = self.drafts.len();
        self.drafts.retain(|d| d.id != id);
        before != self.drafts.len()
    }

    pub fn set_draft_text(&mut self, id: &str, text: &str) -> bool {
        match self.drafts.iter_mut().find(|d| d.id == id) {
            Some(draft) => {
                draft.text = text.to_string();
                true
            }
            None => false,
        }
    }

    pub fn begin_submit(&mut self, id: &str, raw_text: &str) -> Option<Request> {
        if raw_text.trim().is_empty() || self.generating.contains(id) {
            return None;
        }
        let draft = self.drafts.iter_mut().find(|d| d.id == id)?;
        draft.text = raw_text.to_string();
        self.generating.insert(id.to_string());
        Some(Request::Generate {
            draft_id: id.to_string(),
            text: raw_text.to_string(),
        })
    }

    pub fn finish_submit(&mut self, draft_id: &str, result: Result<ContactRecord, GatewayError>) {
        self.generating.remove(draft_id);

        let record = match result {
            Ok(record) if record.has_draft() => record,
            Ok(record) => {
                self.report_error(format!(
                    "Failed to add person: no email draft returned for {}",
                    record.display_name()
                ));
                return;
            }
            Err(e) => {
                self.report_error(format!("Failed to add person: {}", e));
                return;
            }
        };

        self.discard_draft_input_entry(draft_id);

        self.place_in_review(record);
    }

    fn place_in_review(&mut self, record: ContactRecord) -> RecordKey {
        let key = record.key();
        self.completed.retain(|r| !r.key().same_person(&key));
        tracing::info!(key = %key, "ready for review");
        match self.review.iter_mut().find(|r| r.key().same_person(&key)) {
            Some(existing) => *existing = record,
            None => self.review.push(record),
        }
        key
    }

    /// Puts an already drafted record (e.g. one saved to disk) back into review.
    pub fn adopt_for_review(&mut self, record: ContactRecord) -> Option<RecordKey> {
        if !record.has_draft() {
            self.report_error(format!(
                "{} has no email draft to review",
                record.display_name()
            ));
            return None;
        }
        Some(self.place_in_review(record))
    }

    pub async fn submit_draft_input_entry(
        &mut self,
        gateway: &dyn BackendGateway,
        id: &str,
        raw_text: &str,
    ) {
        if let Some(request) = self.begin_submit(id, raw_text) {
            let outcome = gateway::dispatch(gateway, request).await;
            self.apply(outcome);
        }
    }

    // --- Company batches ---

    pub fn begin_company(&mut self, company_url: &str, domain: &str) -> Option<Request> {
        if company_url.trim().is_empty() {
            return None;
        }
        self.looking_up += 1;
        Some(Request::CompanyPeople {
            url: company_url.trim().to_string(),
            domain: domain.trim().to_string(),
        })
    }

    pub fn finish_company(&mut self, domain: &str, result: Result<Vec<CompanyPerson>, GatewayError>) {
        self.looking_up = self.looking_up.saturating_sub(1);

        let people = match result {
            Ok(people) => people,
            Err(e) => {
                self.report_error(format!("Failed to add company: {}", e));
                return;
            }
        };

        tracing::info!(count = people.len(), domain, "replacing drafts with company batch");
        self.drafts.clear();
        for person in &people {
            self.push_draft(intake::company_entry_text(person, domain));
        }
    }

    pub async fn submit_company_batch(
        &mut self,
        gateway: &dyn BackendGateway,
        company_url: &str,
        domain: &str,
    ) {
        if let Some(request) = self.begin_company(company_url, domain) {
            let outcome = gateway::dispatch(gateway, request).await;
            self.apply(outcome);
        }
    }

    // --- Review ---

    pub fn edit_body(&mut self, key: &RecordKey, body: &str) -> bool {
        match self.review.iter_mut().find(|r| &r.key() == key) {
            Some(record) => {
                record.email2 = Some(body.to_string());
                true
            }
            None => false,
        }
    }

    pub fn set_possible_emails(&mut self, key: &RecordKey, emails: Vec<String>) -> bool {
        match self.review.iter_mut().find(|r| &r.key() == key) {
            Some(record) => {
                record.possible_emails = emails;
                true
            }
            None => false,
        }
    }

    pub fn begin_send(&mut self, key: &RecordKey, final_body: &str) -> Option<Request> {
        if self.sending.contains(key) {
            return None;
        }
        let Some(record) = self.review.iter_mut().find(|r| &r.key() == key) else {
            self.report_error(format!("{} is not awaiting review", key));
            return None;
        };
        if final_body.trim().is_empty() {
            let name = record.display_name().to_string();
            self.report_error(format!("Refusing to send an empty email to {}", name));
            return None;
        }
        record.email2 = Some(final_body.to_string());
        if record.domain.as_deref().is_none_or(|d| d.trim().is_empty()) {
            record.domain = record.effective_domain();
        }
        let person = record.clone();
        self.sending.insert(key.clone());
        Some(Request::Send {
            key: key.clone(),
            person,
        })
    }

    pub fn finish_send(
        &mut self,
        key: &RecordKey,
        name: &str,
        result: Result<ContactRecord, GatewayError>,
    ) {
        self.sending.remove(key);

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                self.report_error(format!("Failed to send outreach for {}: {}", name, e));
                return;
            }
        };

        let summary = delivery_summary(&response);

        let Some(index) = self.review.iter().position(|r| &r.key() == key) else {
            // A refresh already reconciled it away while the send was in flight
            if response.is_delivered() && self.stage_of(key).is_none() {
                self.completed.push(response);
            }
            self.notice = Some(format!("{}: {}", name, summary));
            return;
        };

        let record = &mut self.review[index];
        record.email_sent = response.email_sent;
        record.twitter_message_sent = response.twitter_message_sent;

        if record.is_delivered() {
            let record = self.review.remove(index);
            tracing::info!(key = %key, "outreach delivered");
            self.redrafted.retain(|k| !k.same_person(key));
            self.completed.push(record);
            self.notice = Some(format!("Sent outreach to {}: {}", name, summary));
        } else if reached_anyone(&self.review[index]) {
            self.notice = Some(format!("Partially sent to {}: {}", name, summary));
        } else {
            self.report_error(format!("Outreach to {} was not delivered", name));
        }
    }

    pub async fn confirm_send(
        &mut self,
        gateway: &dyn BackendGateway,
        key: &RecordKey,
        final_body: &str,
    ) {
        if let Some(request) = self.begin_send(key, final_body) {
            let outcome = gateway::dispatch(gateway, request).await;
            self.apply(outcome);
        }
    }

    // --- Completed ---

    pub fn redraft(&mut self, key: &RecordKey) -> bool {
        let Some(index) = self.completed.iter().position(|r| &r.key() == key) else {
            return false;
        };
        if !self.completed[index].has_draft() {
            let name = self.completed[index].display_name().to_string();
            self.report_error(format!("{} has no email draft to redraft", name));
            return false;
        }
        let record = self.completed.remove(index);
        tracing::info!(key = %key, "redrafting completed record");
        self.redrafted.insert(key.clone());
        self.review.push(record);
        true
    }

    pub fn begin_refresh(&self) -> Request {
        Request::FetchCompleted
    }

    pub fn finish_refresh(&mut self, result: Result<Vec<ContactRecord>, GatewayError>) {
        let fresh = match result {
            Ok(fresh) => fresh,
            Err(e) => {
                // Transient failures every interval would be noise in the error slot
                tracing::warn!(error = %e, "refreshing completed records failed");
                return;
            }
        };

        let completed: Vec<ContactRecord> = fresh
            .into_iter()
            .filter(|r| {
                let key = r.key();
                !self.redrafted.iter().any(|held| held.same_person(&key))
            })
            .collect();

        let review = std::mem::take(&mut self.review);
        self.review = reconcile_review(review, &completed);
        self.completed = completed;

        let in_review: Vec<RecordKey> = self.review.iter().map(ContactRecord::key).collect();
        self.redrafted
            .retain(|held| in_review.iter().any(|key| key.same_person(held)));

        self.last_refresh = Some(Utc::now());
        tracing::debug!(
            completed = self.completed.len(),
            review = self.review.len(),
            "refreshed completed records"
        );
    }

    pub async fn refresh_completed(&mut self, gateway: &dyn BackendGateway) {
        let outcome = gateway::dispatch(gateway, self.begin_refresh()).await;
        self.apply(outcome);
    }

    pub fn apply(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Generated { draft_id, result } => self.finish_submit(&draft_id, result),
            Outcome::Sent { key, name, result } => self.finish_send(&key, &name, result),
            Outcome::CompanyPeople { domain, result } => self.finish_company(&domain, result),
            Outcome::Completed { result } => self.finish_refresh(result),
        }
    }
}

fn reached_anyone(record: &ContactRecord) -> bool {
    record.email_sent.as_ref().is_some_and(|sent| !sent.is_empty())
        || record.twitter_message_sent == Some(true)
}

/// Human-readable list of the channels a send reached.
pub fn delivery_summary(record: &ContactRecord) -> String {
    let emails = record.email_sent.as_deref().unwrap_or_default();
    let emailed = if emails.is_empty() {
        "no email sent".to_string()
    } else {
        format!("emailed {}", emails.join(", "))
    };
    let dm = match record.twitter_message_sent {
        Some(true) => "Twitter DM sent",
        _ => "no Twitter DM",
    };
    format!("{}; {}", emailed, dm)
}

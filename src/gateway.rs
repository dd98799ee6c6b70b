use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::models::{CompanyPerson, ContactRecord, RecordKey};

pub const DEFAULT_API_URL: &str = "http://localhost:8000";

const GENERATE_PATH: &str = "api/generate-person-content";
const SEND_PATH: &str = "api/send-person";
const COMPANY_PATH: &str = "api/get-company-people";
const COMPLETED_PATH: &str = "api/get-people-records";

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid backend URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("backend returned {status}: {detail}")]
    Status { status: u16, detail: String },

    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
}

// --- Gateway trait ---

/// The external service that enriches, looks up and delivers.
#[async_trait]
pub trait BackendGateway: Send + Sync {
    async fn generate_person_content(&self, text: &str) -> Result<ContactRecord, GatewayError>;
    async fn send_person(&self, person: &ContactRecord) -> Result<ContactRecord, GatewayError>;
    async fn get_company_people(
        &self,
        url: &str,
        domain: &str,
    ) -> Result<Vec<CompanyPerson>, GatewayError>;
    async fn get_completed_records(&self) -> Result<Vec<ContactRecord>, GatewayError>;
}

// --- Requests and outcomes ---

/// A gateway call to run off the UI thread.
#[derive(Debug, Clone)]
pub enum Request {
    Generate { draft_id: String, text: String },
    Send { key: RecordKey, person: ContactRecord },
    CompanyPeople { url: String, domain: String },
    FetchCompleted,
}

/// The result of a `Request`, carried back to whoever owns the state.
#[derive(Debug)]
pub enum Outcome {
    Generated {
        draft_id: String,
        result: Result<ContactRecord, GatewayError>,
    },
    Sent {
        key: RecordKey,
        name: String,
        result: Result<ContactRecord, GatewayError>,
    },
    CompanyPeople {
        domain: String,
        result: Result<Vec<CompanyPerson>, GatewayError>,
    },
    Completed {
        result: Result<Vec<ContactRecord>, GatewayError>,
    },
}

pub async fn dispatch(gateway: &dyn BackendGateway, request: Request) -> Outcome {
    match request {
        Request::Generate { draft_id, text } => Outcome::Generated {
            result: gateway.generate_person_content(&text).await,
            draft_id,
        },
        Request::Send { key, person } => Outcome::Sent {
            result: gateway.send_person(&person).await,
            name: person.display_name().to_string(),
            key,
        },
        Request::CompanyPeople { url, domain } => Outcome::CompanyPeople {
            result: gateway.get_company_people(&url, &domain).await,
            domain,
        },
        Request::FetchCompleted => Outcome::Completed {
            result: gateway.get_completed_records().await,
        },
    }
}

// --- HTTP implementation ---

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    person: &'a ContactRecord,
}

#[derive(Debug, Serialize)]
struct CompanyRequest<'a> {
    url: &'a str,
    domain: &'a str,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct HttpGateway {
    base: Url,
    client: reqwest::Client,
}

impl HttpGateway {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Self::with_client(base_url, client)
    }

    pub fn with_client(base_url: &str, client: reqwest::Client) -> Result<Self, GatewayError> {
        let mut base = Url::parse(base_url.trim())?;
        // Url::join replaces the last segment unless the path ends in '/'
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self { base, client })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url, GatewayError> {
        Ok(self.base.join(path)?)
    }

    async fn read<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, GatewayError> {
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(GatewayError::Status {
                status: status.as_u16(),
                detail: error_detail(&text),
            });
        }

        Ok(serde_json::from_str(&text)?)
    }
}

/// FastAPI reports failures as `{"detail": ...}`; fall back to the raw body.
fn error_detail(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody { detail: serde_json::Value::String(s) }) => s,
        Ok(ErrorBody { detail }) => detail.to_string(),
        Err(_) if body.trim().is_empty() => "(empty body)".to_string(),
        Err(_) => body.trim().to_string(),
    }
}

#[async_trait]
impl BackendGateway for HttpGateway {
    async fn generate_person_content(&self, text: &str) -> Result<ContactRecord, GatewayError> {
        let url = self.endpoint(GENERATE_PATH)?;
        tracing::debug!(%url, chars = text.len(), "generating person content");
        let response = self
            .client
            .post(url)
            .json(&GenerateRequest { text })
            .send()
            .await?;
        Self::read(response).await
    }

    async fn send_person(&self, person: &ContactRecord) -> Result<ContactRecord, GatewayError> {
        let url = self.endpoint(SEND_PATH)?;
        tracing::debug!(%url, name = %person.name, "sending outreach");
        let response = self
            .client
            .post(url)
            .json(&SendRequest { person })
            .send()
            .await?;
        Self::read(response).await
    }

    async fn get_company_people(
        &self,
        url: &str,
        domain: &str,
    ) -> Result<Vec<CompanyPerson>, GatewayError> {
        let endpoint = self.endpoint(COMPANY_PATH)?;
        tracing::debug!(%endpoint, company = url, domain, "fetching company people");
        let response = self
            .client
            .post(endpoint)
            .json(&CompanyRequest { url, domain })
            .send()
            .await?;
        Self::read(response).await
    }

    async fn get_completed_records(&self) -> Result<Vec<ContactRecord>, GatewayError> {
        let url = self.endpoint(COMPLETED_PATH)?;
        tracing::debug!(%url, "fetching completed records");
        let response = self.client.get(url).send().await?;
        Self::read(response).await
    }
}

//! HTTP document store client.
//!
//! Routes, relative to the configured endpoint:
//!
//! - `GET    /documents/{id}`
//! - `PUT    /documents/{id}`              (JSON [`DocumentPatch`])
//! - `DELETE /documents/{id}`
//! - `POST   /documents`
//! - `POST   /documents/{id}/attachments`  (multipart, field `file`)

use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::StoreError;
use crate::model::{AttachmentDescriptor, AttachmentUpload, Document, DocumentId, DocumentPatch};
use crate::store::{AttachmentStore, DocumentStore};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Debug)]
pub struct HttpStore {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpStore {
    pub fn new(endpoint: Url) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self::with_client(client, endpoint))
    }

    pub fn with_client(client: reqwest::Client, endpoint: Url) -> Self {
        // Url::join drops the last path segment unless it ends with '/'
        let endpoint = if endpoint.path().ends_with('/') {
            endpoint
        } else {
            let mut endpoint = endpoint;
            let path = format!("{}/", endpoint.path());
            endpoint.set_path(&path);
            endpoint
        };
        Self { client, endpoint }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn url(&self, path: &str) -> Result<Url, StoreError> {
        self.endpoint
            .join(path)
            .map_err(|e| StoreError::Unavailable(format!("bad url {path}: {e}")))
    }

    fn document_url(&self, id: &DocumentId) -> Result<Url, StoreError> {
        self.url(&format!("documents/{id}"))
    }
}

/// Map non-success statuses onto store errors, keeping the response body as
/// the message.
async fn check(response: Response, id: Option<&DocumentId>) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::NOT_FOUND {
        if let Some(id) = id {
            return Err(StoreError::NotFound { id: id.clone() });
        }
    }
    let message = response.text().await.unwrap_or_default();
    Err(StoreError::Http {
        status: status.as_u16(),
        message,
    })
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, StoreError> {
    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

impl DocumentStore for HttpStore {
    async fn fetch(&self, id: &DocumentId) -> Result<Document, StoreError> {
        let response = self.client.get(self.document_url(id)?).send().await?;
        decode(check(response, Some(id)).await?).await
    }

    async fn replace(&self, id: &DocumentId, patch: &DocumentPatch) -> Result<Document, StoreError> {
        let response = self
            .client
            .put(self.document_url(id)?)
            .json(patch)
            .send()
            .await?;
        decode(check(response, Some(id)).await?).await
    }

    async fn delete(&self, id: &DocumentId) -> Result<(), StoreError> {
        let response = self.client.delete(self.document_url(id)?).send().await?;
        check(response, Some(id)).await?;
        Ok(())
    }

    async fn create(&self) -> Result<Document, StoreError> {
        let response = self
            .client
            .post(self.url("documents")?)
            .json(&serde_json::json!({}))
            .send()
            .await?;
        decode(check(response, None).await?).await
    }
}

impl AttachmentStore for HttpStore {
    async fn upload(
        &self,
        document_id: &DocumentId,
        upload: &AttachmentUpload,
    ) -> Result<AttachmentDescriptor, StoreError> {
        let part = Part::bytes(upload.data.to_vec())
            .file_name(upload.filename.clone())
            .mime_str(&upload.content_type)?;
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(self.url(&format!("documents/{document_id}/attachments"))?)
            .multipart(form)
            .send()
            .await?;
        decode(check(response, Some(document_id)).await?).await
    }
}

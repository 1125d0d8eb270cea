//! Ticket REST client
//!
//! [`TicketApi`] is the seam between the support components and the ticket
//! store. [`HttpTicketApi`] talks to the marketplace REST API; tests swap in
//! in-memory implementations.
//!
//! Requests are never retried here. Failures go back to the caller.

use std::time::Duration;

use async_trait::async_trait;
use pharmadesk_shared::{OrderId, Ticket, TicketId};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

use crate::error::{TicketError, TicketResult};

/// Error code the ticket store uses for writes to a closed ticket
const TICKET_CLOSED_CODE: &str = "TICKET_CLOSED";

/// A file picked for upload. Opaque to the client beyond its bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: None,
            bytes,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// Message ready to send: a non-blank body, at least one attachment, or both
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDraft {
    body: String,
    attachments: Vec<Attachment>,
}

impl MessageDraft {
    /// `None` when there is nothing to send
    pub fn new(body: impl Into<String>, attachments: Vec<Attachment>) -> Option<Self> {
        let body = body.into();
        if body.trim().is_empty() && attachments.is_empty() {
            return None;
        }
        Some(Self { body, attachments })
    }

    pub fn text(body: impl Into<String>) -> Option<Self> {
        Self::new(body, Vec::new())
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }
}

/// Ticket store operations
#[async_trait]
pub trait TicketApi: Send + Sync {
    /// Every ticket visible to the caller, in server order
    async fn list_tickets(&self) -> TicketResult<Vec<Ticket>>;

    async fn get_ticket(&self, id: &TicketId) -> TicketResult<Ticket>;

    /// Create a ticket whose first message is `draft`
    async fn create_ticket(
        &self,
        draft: &MessageDraft,
        order_id: Option<&OrderId>,
    ) -> TicketResult<Ticket>;

    /// Append `draft`; returns the updated ticket
    async fn reply(&self, id: &TicketId, draft: &MessageDraft) -> TicketResult<Ticket>;

    async fn close(&self, id: &TicketId) -> TicketResult<Ticket>;
}

#[derive(Debug, Deserialize)]
struct TicketList {
    tickets: Vec<Ticket>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    error: Option<ErrorDetail>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// [`TicketApi`] over the marketplace REST API
#[derive(Debug, Clone)]
pub struct HttpTicketApi {
    http_client: Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpTicketApi {
    pub fn new(base_url: Url, token: Option<String>, timeout: Duration) -> TicketResult<Self> {
        let http_client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(http_client, base_url, token))
    }

    pub fn with_client(http_client: Client, base_url: Url, token: Option<String>) -> Self {
        Self {
            http_client,
            base_url,
            token,
        }
    }

    fn endpoint(&self, segments: &[&str]) -> TicketResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| TicketError::InvalidResponse(format!("bad base URL {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> TicketResult<T> {
        let response = self.authorize(request).send().await?;
        read_response(response).await
    }
}

fn draft_form(draft: &MessageDraft, order_id: Option<&OrderId>) -> TicketResult<Form> {
    let mut form = Form::new().text("message", draft.body().to_string());
    if let Some(order_id) = order_id {
        form = form.text("order", order_id.to_string());
    }
    for attachment in draft.attachments() {
        let mut part = Part::bytes(attachment.bytes.clone()).file_name(attachment.file_name.clone());
        if let Some(content_type) = &attachment.content_type {
            part = part.mime_str(content_type)?;
        }
        form = form.part("files[]", part);
    }
    Ok(form)
}

async fn read_response<T: DeserializeOwned>(response: Response) -> TicketResult<T> {
    let status = response.status();
    let body = response.text().await?;

    if status.is_success() {
        return serde_json::from_str(&body).map_err(|e| TicketError::InvalidResponse(e.to_string()));
    }

    Err(error_for_status(status, &body))
}

/// Map a non-success response onto the ticket error taxonomy
pub(crate) fn error_for_status(status: StatusCode, body: &str) -> TicketError {
    let envelope: ErrorEnvelope = serde_json::from_str(body).unwrap_or_default();
    let detail = envelope.error.unwrap_or_default();

    if status == StatusCode::CONFLICT || detail.code.as_deref() == Some(TICKET_CLOSED_CODE) {
        return TicketError::TicketClosed;
    }

    match status {
        StatusCode::NOT_FOUND => TicketError::NotFound,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => TicketError::Unauthorized,
        _ => TicketError::Api {
            status: status.as_u16(),
            message: detail
                .message
                .or(envelope.message)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string()),
        },
    }
}

#[async_trait]
impl TicketApi for HttpTicketApi {
    async fn list_tickets(&self) -> TicketResult<Vec<Ticket>> {
        let url = self.endpoint(&["tickets"])?;
        let list: TicketList = self.send(self.http_client.get(url)).await?;
        tracing::debug!(count = list.tickets.len(), "Fetched tickets");
        Ok(list.tickets)
    }

    async fn get_ticket(&self, id: &TicketId) -> TicketResult<Ticket> {
        let url = self.endpoint(&["tickets", id.as_str()])?;
        self.send(self.http_client.get(url)).await
    }

    async fn create_ticket(
        &self,
        draft: &MessageDraft,
        order_id: Option<&OrderId>,
    ) -> TicketResult<Ticket> {
        let url = self.endpoint(&["tickets"])?;
        let form = draft_form(draft, order_id)?;
        let ticket: Ticket = self.send(self.http_client.post(url).multipart(form)).await?;
        tracing::info!(ticket_id = %ticket.id, order_id = ?order_id, "Ticket created");
        Ok(ticket)
    }

    async fn reply(&self, id: &TicketId, draft: &MessageDraft) -> TicketResult<Ticket> {
        let url = self.endpoint(&["tickets", id.as_str(), "reply"])?;
        let form = draft_form(draft, None)?;
        self.send(self.http_client.post(url).multipart(form)).await
    }

    async fn close(&self, id: &TicketId) -> TicketResult<Ticket> {
        let url = self.endpoint(&["tickets", id.as_str(), "close"])?;
        let ticket: Ticket = self.send(self.http_client.post(url)).await?;
        tracing::info!(ticket_id = %id, "Ticket closed");
        Ok(ticket)
    }
}

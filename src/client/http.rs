//! reqwest-backed implementation of [`FarmApi`].

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use super::error::{classify_http_status, ClientError};
use super::session::{AuthGuard, InvalidReason, Session};
use super::FarmApi;
use crate::api::types::{LoginRequest, LoginResponse};
use crate::config::ClientConfig;
use crate::model::{
    AttendanceEntry, AttendanceRange, AttendanceRecord, AttendanceReport, ReviewRequest,
    Submission, Task,
};
use crate::workflow::{ValidSubmission, ValidationError};

/// HTTP client for a farmdesk server.
///
/// Every request passes through the [`AuthGuard`]: an expired token fails
/// before anything is sent, and a 401 clears the session.
pub struct HttpFarmApi {
    client: Client,
    base_url: Url,
    guard: Arc<AuthGuard>,
}

impl HttpFarmApi {
    pub fn new(config: &ClientConfig, guard: Arc<AuthGuard>) -> Result<Self, ClientError> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            client,
            base_url: config.api_url.clone(),
            guard,
        })
    }

    pub fn guard(&self) -> &Arc<AuthGuard> {
        &self.guard
    }

    /// Exchange credentials for a session.
    pub async fn login(
        config: &ClientConfig,
        username: &str,
        password: &str,
    ) -> Result<Session, ClientError> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        let url = join(&config.api_url, "api/auth/login")?;
        let response = client
            .post(url)
            .json(&LoginRequest {
                username: username.to_string(),
                password: password.to_string(),
            })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if status == StatusCode::UNAUTHORIZED {
            return Err(ClientError::Forbidden(body));
        }
        if !status.is_success() {
            return Err(classify_http_status(status.as_u16(), body));
        }
        let parsed: LoginResponse = serde_json::from_str(&body)
            .map_err(|e| ClientError::Parse(format!("{}, body: {}", e, body)))?;
        Session::from_token(parsed.token)
    }

    fn url(&self, path: &str) -> Result<Url, ClientError> {
        join(&self.base_url, path)
    }

    /// Attach the bearer token, send, and decode a JSON body.
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ClientError> {
        let token = self.guard.bearer().await?;
        let response = request.bearer_auth(token).send().await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            self.guard.invalidate(InvalidReason::Unauthorized).await;
            return Err(ClientError::AuthExpired);
        }

        let body = response.text().await?;
        if !status.is_success() {
            return Err(classify_http_status(status.as_u16(), body));
        }

        serde_json::from_str(&body)
            .map_err(|e| ClientError::Parse(format!("{}, body: {}", e, body)))
    }
}

fn join(base: &Url, path: &str) -> Result<Url, ClientError> {
    base.join(path)
        .map_err(|e| ClientError::BadRequest(format!("Invalid URL path {}: {}", path, e)))
}

#[async_trait]
impl FarmApi for HttpFarmApi {
    async fn my_tasks(&self) -> Result<Vec<Task>, ClientError> {
        let url = self.url("api/tasks/my-tasks")?;
        self.send(self.client.get(url)).await
    }

    async fn submissions(&self, task_id: i64) -> Result<Vec<Submission>, ClientError> {
        let url = self.url(&format!("api/task-submissions/{}/submissions", task_id))?;
        self.send(self.client.get(url)).await
    }

    async fn submit(
        &self,
        task_id: i64,
        submission: &ValidSubmission,
    ) -> Result<Submission, ClientError> {
        let url = self.url(&format!("api/task-submissions/{}/submit", task_id))?;
        let mut form = Form::new().text("notes", submission.notes.clone());
        if let Some(photo) = &submission.photo {
            let part = Part::bytes(photo.bytes.to_vec())
                .file_name(photo.file_name.clone())
                .mime_str(&photo.content_type)
                .map_err(|_| ValidationError::NotAnImage(photo.content_type.clone()))?;
            form = form.part("photo", part);
        }
        self.send(self.client.post(url).multipart(form)).await
    }

    async fn pending_submissions(&self) -> Result<Vec<Submission>, ClientError> {
        let url = self.url("api/task-submissions/pending")?;
        self.send(self.client.get(url)).await
    }

    async fn review(
        &self,
        submission_id: i64,
        review: &ReviewRequest,
    ) -> Result<Submission, ClientError> {
        let url = self.url(&format!(
            "api/task-submissions/submissions/{}/review",
            submission_id
        ))?;
        self.send(self.client.patch(url).json(review)).await
    }

    async fn attendance(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<AttendanceReport, ClientError> {
        let url = self.url("api/attendance")?;
        let range = AttendanceRange {
            start_date: start,
            end_date: end,
        };
        self.send(self.client.get(url).query(&range)).await
    }

    async fn record_attendance(
        &self,
        entry: &AttendanceEntry,
    ) -> Result<AttendanceRecord, ClientError> {
        let url = self.url("api/attendance")?;
        self.send(self.client.post(url).json(entry)).await
    }
}

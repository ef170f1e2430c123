// ============================
// crates/client/src/api.rs
// ============================
//! HTTP access to the boardsync REST surface.
use crate::error::ClientError;
use async_trait::async_trait;
use boardsync_common::api::{
    Ack, CreatePermalinkRequest, ErrorBody, HealthResponse, Items, PermalinkCreated,
    PermalinkSummary, ResolvedPermalink, SaveSceneRequest, SceneDocument,
};
use reqwest::{Response, StatusCode};
use tracing::debug;

/// The two scene calls the persistence gateway depends on
#[async_trait]
pub trait SceneApi: Send + Sync {
    /// `None` when the room has never been saved
    async fn fetch_scene(&self, room_id: &str) -> Result<Option<SceneDocument>, ClientError>;

    async fn store_scene(&self, room_id: &str, scene: &SaveSceneRequest) -> Result<(), ClientError>;
}

#[derive(Debug, Clone)]
pub struct HttpApiClient {
    client: reqwest::Client,
    base_url: String,
}

/// Turn a non-success response into the matching error
async fn check(resp: Response) -> Result<Response, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.json::<ErrorBody>().await.ok();
    let detail = body
        .as_ref()
        .map(|b| b.message.clone().unwrap_or_else(|| b.error.clone()))
        .unwrap_or_default();
    debug!(status = status.as_u16(), detail = %detail, "request failed");

    Err(match status {
        StatusCode::NOT_FOUND => ClientError::NotFound,
        StatusCode::FORBIDDEN => ClientError::Forbidden,
        StatusCode::BAD_REQUEST => ClientError::InvalidPayload(detail),
        StatusCode::SERVICE_UNAVAILABLE => ClientError::StoreUnavailable(detail),
        _ => ClientError::Status {
            status: status.as_u16(),
            error: body.map(|b| b.error).unwrap_or_default(),
        },
    })
}

impl HttpApiClient {
    /// `base_url` is the server origin, e.g. `http://localhost:3002`
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api{path}", self.base_url)
    }

    pub async fn health(&self) -> Result<HealthResponse, ClientError> {
        let resp = self.client.get(self.url("/health")).send().await?;
        Ok(check(resp).await?.json().await?)
    }

    pub async fn create_permalink(&self, request: &CreatePermalinkRequest) -> Result<String, ClientError> {
        let resp = self
            .client
            .post(self.url("/permalinks"))
            .json(request)
            .send()
            .await?;
        let created: PermalinkCreated = check(resp).await?.json().await?;
        Ok(created.permalink)
    }

    pub async fn resolve_permalink(&self, permalink: &str) -> Result<ResolvedPermalink, ClientError> {
        let resp = self
            .client
            .get(self.url(&format!("/permalinks/{permalink}")))
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }

    /// The teacher's active links; the token goes in the `Authorization` header
    pub async fn list_permalinks(&self, teacher_id: &str, token: &str) -> Result<Vec<PermalinkSummary>, ClientError> {
        let resp = self
            .client
            .get(self.url("/permalinks"))
            .query(&[("teacher_id", teacher_id)])
            .bearer_auth(token)
            .send()
            .await?;
        let items: Items<PermalinkSummary> = check(resp).await?.json().await?;
        Ok(items.items)
    }

    pub async fn delete_permalink(&self, permalink: &str, teacher_id: &str, token: &str) -> Result<(), ClientError> {
        let resp = self
            .client
            .delete(self.url(&format!("/permalinks/{permalink}")))
            .query(&[("teacher_id", teacher_id)])
            .bearer_auth(token)
            .send()
            .await?;
        let _: Ack = check(resp).await?.json().await?;
        Ok(())
    }
}

#[async_trait]
impl SceneApi for HttpApiClient {
    async fn fetch_scene(&self, room_id: &str) -> Result<Option<SceneDocument>, ClientError> {
        let resp = self
            .client
            .get(self.url(&format!("/scenes/{room_id}")))
            .send()
            .await?;
        match check(resp).await {
            Ok(resp) => Ok(Some(resp.json().await?)),
            Err(ClientError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn store_scene(&self, room_id: &str, scene: &SaveSceneRequest) -> Result<(), ClientError> {
        let resp = self
            .client
            .post(self.url(&format!("/scenes/{room_id}")))
            .json(scene)
            .send()
            .await?;
        let _: Ack = check(resp).await?.json().await?;
        Ok(())
    }
}

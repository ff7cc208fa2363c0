//! HTTP 客户端模块 - `RemoteApi` 的 reqwest 实现
//!
//! 状态码映射见 `FieldSyncError::from_status`：408/429/5xx/连接失败/超时为瞬时失败，
//! 400/409/422、401/403、404 为永久失败。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{multipart, Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, error, info};

use crate::error::{FieldSyncError, Result};
use crate::remote::{
    BoundaryInfo, ClockRequest, ClockResponse, ClockStatusResponse, LocationPost, RemoteApi,
    UploadRequest, UploadResponse,
};
use crate::sdk::HttpClientConfig;
use crate::storage::entities::SyncAction;

const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// 基于 reqwest 的远端接口
#[derive(Debug, Clone)]
pub struct HttpRemoteApi {
    client: Client,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpRemoteApi {
    pub fn new(config: &HttpClientConfig) -> Result<Self> {
        if config.base_url.trim().is_empty() {
            return Err(FieldSyncError::Config("HTTP base_url 不能为空".to_string()));
        }

        let mut builder = Client::builder();
        if let Some(timeout) = config.connect_timeout_secs {
            builder = builder.connect_timeout(Duration::from_secs(timeout));
        }
        if let Some(timeout) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(timeout));
        }

        let client = builder
            .build()
            .map_err(|e| FieldSyncError::Config(format!("创建 HTTP 客户端失败: {}", e)))?;

        info!("✅ HTTP 客户端已创建 (base_url: {})", config.base_url);

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.client.request(method, self.url(path));
        match &self.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// 非 2xx 转换为类型化错误
    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_else(|_| "无法读取错误信息".to_string());
        error!("❌ 请求失败，HTTP 状态码: {}, 错误: {}", status, body);
        Err(FieldSyncError::from_status(status.as_u16(), body))
    }

    /// 解析 JSON 响应；空响应体按默认值处理
    async fn parse_or_default<T: DeserializeOwned + Default>(response: Response) -> Result<T> {
        let bytes = response.bytes().await?;
        if bytes.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(T::default());
        }
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl RemoteApi for HttpRemoteApi {
    async fn upload_item(&self, request: &UploadRequest) -> Result<UploadResponse> {
        let collection = format!("items/{}", request.item_type);
        let (method, path) = match request.action {
            SyncAction::Create => (Method::POST, collection),
            SyncAction::Update | SyncAction::Delete => {
                let remote_id = request.remote_id.as_deref().ok_or_else(|| {
                    FieldSyncError::MissingAssociation(format!(
                        "{} {} 缺少 remote_id",
                        request.action, request.local_id
                    ))
                })?;
                let method = if request.action == SyncAction::Update { Method::PUT } else { Method::DELETE };
                (method, format!("{}/{}", collection, remote_id))
            }
        };

        debug!("📤 {} {} (key={})", method, path, request.idempotency_key);

        let mut builder = self
            .request(method, &path)
            .header(IDEMPOTENCY_HEADER, &request.idempotency_key);

        if request.action != SyncAction::Delete {
            let body = serde_json::json!({
                "localId": request.local_id,
                "ownerId": request.owner_id,
                "payload": request.payload,
            });
            builder = match &request.data {
                Some(data) => {
                    let file = multipart::Part::bytes(data.clone())
                        .file_name(request.local_id.clone())
                        .mime_str("application/octet-stream")
                        .map_err(|e| FieldSyncError::InvalidArgument(format!("创建 multipart part 失败: {}", e)))?;
                    let form = multipart::Form::new()
                        .text("metadata", body.to_string())
                        .part("file", file);
                    builder.multipart(form)
                }
                None => builder.json(&body),
            };
        }

        let response = Self::check(builder.send().await?).await?;
        let result: UploadResponse = Self::parse_or_default(response).await?;

        if request.action != SyncAction::Delete && result.remote_id.is_none() {
            return Err(FieldSyncError::Validation(format!(
                "服务端未返回 remoteId: {}",
                request.local_id
            )));
        }
        Ok(result)
    }

    async fn clock(&self, request: &ClockRequest) -> Result<()> {
        let response = self.request(Method::POST, "clock").json(request).send().await?;
        let result: ClockResponse = Self::check(response).await?.json().await?;
        if !result.ok {
            return Err(FieldSyncError::Validation("服务端拒绝打卡".to_string()));
        }
        Ok(())
    }

    async fn clock_status(&self) -> Result<bool> {
        let response = self.request(Method::GET, "clock/status").send().await?;
        let result: ClockStatusResponse = Self::check(response).await?.json().await?;
        Ok(result.is_clocked_in)
    }

    async fn boundary_info(&self, boundary_id: &str) -> Result<BoundaryInfo> {
        let response = self
            .request(Method::GET, &format!("boundary/{}", boundary_id))
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn post_location(&self, post: &LocationPost) -> Result<()> {
        let response = self.request(Method::POST, "location").json(post).send().await?;
        Self::check(response).await?;
        Ok(())
    }
}

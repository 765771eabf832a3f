use reqwest::header::{CONTENT_TYPE, HeaderValue};
use reqwest::{Method, RequestBuilder, StatusCode, multipart};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use server_wake::RequestActivity;
use tracing::{debug, warn};
use url::Url;

use crate::config::ClientConfig;
use crate::error::{ApiError, ApiResult};

/// Request payload.
#[derive(Debug, Default)]
pub enum Body {
    /// No payload. Still tagged as JSON, which the API expects.
    #[default]
    Empty,
    Json(serde_json::Value),
    /// The transport sets the multipart content type and boundary.
    Multipart(multipart::Form),
}

/// A call against the API, relative to the client's base URL.
#[derive(Debug)]
pub struct ApiRequest {
    method: Method,
    path: String,
    body: Body,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: Body::Empty,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Serialize `body` as the JSON payload.
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> ApiResult<Self> {
        self.body = Body::Json(serde_json::to_value(body)?);
        Ok(self)
    }

    pub fn multipart(mut self, form: multipart::Form) -> Self {
        self.body = Body::Multipart(form);
        self
    }
}

/// Client for the blog API.
///
/// Each round-trip, from sending the request to reading the whole body, is a
/// pending request on the client's [`RequestActivity`].
#[derive(Debug)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    token: Option<SecretString>,
    activity: RequestActivity,
}

impl ApiClient {
    pub fn new(config: ClientConfig) -> ApiResult<Self> {
        let activity = RequestActivity::with_threshold(config.wake_threshold);
        Self::with_activity(config, activity)
    }

    /// Build a client that reports into an existing tracker, so several
    /// clients share one busy window. `config.wake_threshold` is ignored in
    /// favour of the tracker's own.
    pub fn with_activity(config: ClientConfig, activity: RequestActivity) -> ApiResult<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            http: builder.build()?,
            base_url: config.base_url,
            token: config.token,
            activity,
        })
    }

    pub fn activity(&self) -> &RequestActivity {
        &self.activity
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Absolute URL for an API path such as `/posts?page=0`.
    pub fn endpoint(&self, path: &str) -> ApiResult<Url> {
        endpoint_url(&self.base_url, path)
    }

    /// Send `request` and decode the JSON response.
    ///
    /// `204 No Content` and blank bodies yield `Ok(None)`.
    pub async fn send<T: DeserializeOwned>(&self, request: ApiRequest) -> ApiResult<Option<T>> {
        let ApiRequest { method, path, body } = request;
        let url = self.endpoint(&path)?;

        let mut builder = self.http.request(method.clone(), url);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token.expose_secret());
        }
        builder = match body {
            Body::Empty => {
                builder.header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            }
            Body::Json(value) => builder.json(&value),
            Body::Multipart(form) => builder.multipart(form),
        };

        self.activity
            .track(execute(builder, &method, &path))
            .await
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> ApiResult<Option<T>> {
        self.send(ApiRequest::get(path)).await
    }

    /// GET that treats an empty body as an error.
    pub async fn get_required<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        self.get(path).await?.ok_or(ApiError::EmptyBody)
    }

    pub async fn post<T: DeserializeOwned>(&self, path: &str) -> ApiResult<Option<T>> {
        self.send(ApiRequest::post(path)).await
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> ApiResult<Option<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(ApiRequest::post(path).json(body)?).await
    }

    pub async fn put_json<B, T>(&self, path: &str, body: &B) -> ApiResult<Option<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(ApiRequest::put(path).json(body)?).await
    }

    pub async fn patch_json<B, T>(&self, path: &str, body: &B) -> ApiResult<Option<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(ApiRequest::patch(path).json(body)?).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> ApiResult<Option<T>> {
        self.send(ApiRequest::delete(path)).await
    }

    /// POST a multipart form, e.g. an avatar image.
    pub async fn upload<T: DeserializeOwned>(
        &self,
        path: &str,
        form: multipart::Form,
    ) -> ApiResult<Option<T>> {
        self.send(ApiRequest::post(path).multipart(form)).await
    }
}

async fn execute<T: DeserializeOwned>(
    builder: RequestBuilder,
    method: &Method,
    path: &str,
) -> ApiResult<Option<T>> {
    let response = builder.send().await.inspect_err(|err| {
        warn!(%method, path, "API request failed: {err}");
    })?;
    let status = response.status();
    let text = response.text().await?;

    debug!(%method, path, %status, bytes = text.len(), "API response");
    decode_response(status, &text)
}

fn decode_response<T: DeserializeOwned>(status: StatusCode, body: &str) -> ApiResult<Option<T>> {
    if !status.is_success() {
        return Err(ApiError::from_status(status, body));
    }
    if status == StatusCode::NO_CONTENT || body.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(body)?))
}

fn endpoint_url(base: &Url, path: &str) -> ApiResult<Url> {
    let base = base.as_str().trim_end_matches('/');
    let path = path.trim_start_matches('/');
    Ok(Url::parse(&format!("{base}/{path}"))?)
}

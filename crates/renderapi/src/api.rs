//! REST client for the Everkeep rendering backend.
//!
//! Wraps the catalog, upload, start-frame, render, and support endpoints
//! using [`reqwest`]. Methods return raw wire responses; folding them
//! into outcomes lives in [`crate::wire`].

use everkeep_core::catalog::Catalog;

use crate::wire::{
    JobStatusResponse, PaymentStatusResponse, StartFrameRequest, StartFrameResponse,
    StartRenderRequest, StartRenderResponse, UploadResponse,
};

/// HTTP client for one rendering backend deployment.
pub struct RenderApi {
    client: reqwest::Client,
    base_url: String,
}

/// A photo file handed to the upload endpoint.
#[derive(Debug, Clone)]
pub struct UploadFile {
    /// File name as picked by the user, forwarded as the part's name.
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Errors from the rendering backend REST layer.
#[derive(Debug, thiserror::Error)]
pub enum RenderApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend returned a non-2xx status code.
    #[error("render API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// A 2xx response was missing a field the contract promises.
    #[error("render API response missing `{field}`")]
    MissingField { field: &'static str },
}

impl RenderApi {
    /// Create a new client for a rendering backend.
    ///
    /// * `base_url` - Base HTTP URL including any deployment prefix,
    ///   e.g. `https://api.example.com/v1`. A trailing slash is trimmed.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Create a client reusing an existing [`reqwest::Client`] (useful
    /// for connection pooling and for injecting test configuration).
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Fetch the whole option catalog.
    ///
    /// Sends a `GET /catalog` request. The catalog arrives in one piece;
    /// callers install it wholesale or keep what they had.
    pub async fn fetch_catalog(&self) -> Result<Catalog, RenderApiError> {
        let response = self
            .client
            .get(format!("{}/catalog", self.base_url))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Upload photo files and return their backend paths.
    ///
    /// Sends a `POST /upload` multipart request with one `files` part per
    /// photo. A 2xx response without confirmed paths counts as a failed
    /// upload, not an empty success.
    pub async fn upload_photos(
        &self,
        files: Vec<UploadFile>,
    ) -> Result<Vec<String>, RenderApiError> {
        let mut form = reqwest::multipart::Form::new();
        for file in files {
            let part = reqwest::multipart::Part::bytes(file.bytes).file_name(file.name);
            form = form.part("files", part);
        }

        let response = self
            .client
            .post(format!("{}/upload", self.base_url))
            .multipart(form)
            .send()
            .await?;

        let upload: UploadResponse = Self::parse_response(response).await?;
        if upload.files.is_empty() {
            return Err(RenderApiError::MissingField { field: "files" });
        }
        Ok(upload.files)
    }

    /// Generate the start-frame preview for the given picks.
    ///
    /// Sends a `POST /start-frame` request and returns the preview URL.
    /// A 2xx response without one is a contract violation.
    pub async fn generate_start_frame(
        &self,
        request: &StartFrameRequest,
    ) -> Result<String, RenderApiError> {
        let response = self
            .client
            .post(format!("{}/start-frame", self.base_url))
            .json(request)
            .send()
            .await?;

        let preview: StartFrameResponse = Self::parse_response(response).await?;
        match preview.start_frame_url {
            Some(url) if !url.is_empty() => Ok(url),
            _ => Err(RenderApiError::MissingField {
                field: "start_frame_url",
            }),
        }
    }

    /// Submit a paid render.
    ///
    /// Sends a `POST /render/start_paid` request. The response is returned
    /// raw; see [`StartRenderResponse::outcome`] for the branching.
    pub async fn start_paid_render(
        &self,
        request: &StartRenderRequest,
    ) -> Result<StartRenderResponse, RenderApiError> {
        let response = self
            .client
            .post(format!("{}/render/start_paid", self.base_url))
            .json(request)
            .send()
            .await?;

        let parsed: StartRenderResponse = Self::parse_response(response).await?;
        tracing::debug!(status = %parsed.status, "Render submission answered");
        Ok(parsed)
    }

    /// Fetch the current status of a render job.
    ///
    /// Sends a `GET /render/status/{job_id}` request. Unknown jobs come
    /// back as 404 and surface as [`RenderApiError::Api`].
    pub async fn job_status(&self, job_id: &str) -> Result<JobStatusResponse, RenderApiError> {
        let response = self
            .client
            .get(format!("{}/render/status/{}", self.base_url, job_id))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Fetch render status by the payment that gates it.
    ///
    /// Sends a `GET /render/status_by_payment/{payment_key}` request.
    pub async fn payment_status(
        &self,
        payment_key: &str,
    ) -> Result<PaymentStatusResponse, RenderApiError> {
        let response = self
            .client
            .get(format!(
                "{}/render/status_by_payment/{}",
                self.base_url, payment_key
            ))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Send a support message.
    ///
    /// Sends a `POST /support` request. The body is acknowledged, not
    /// parsed.
    pub async fn send_support(
        &self,
        text: &str,
        user_contact: &str,
    ) -> Result<(), RenderApiError> {
        let body = serde_json::json!({
            "text": text,
            "user_contact": user_contact,
        });

        let response = self
            .client
            .post(format!("{}/support", self.base_url))
            .json(&body)
            .send()
            .await?;

        Self::check_status(response).await
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`RenderApiError::Api`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, RenderApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(RenderApiError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, RenderApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }

    /// Assert the response has a success status code, discarding the body.
    async fn check_status(response: reqwest::Response) -> Result<(), RenderApiError> {
        Self::ensure_success(response).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn fetch_catalog_parses_lists() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/catalog"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "scenes": [{"key": "hugging", "title": "Hug", "people": 2, "price_rub": 349}],
                "formats": [{"key": "wide", "title": "16:9"}],
                "backgrounds": [{"key": "clouds", "title": "Clouds"}],
                "music": [{"key": "piano", "title": "Piano"}]
            })))
            .mount(&server)
            .await;

        let api = RenderApi::new(server.uri());
        let catalog = api.fetch_catalog().await.unwrap();
        assert_eq!(catalog.scenes.len(), 1);
        assert_eq!(catalog.scenes[0].price_rub, 349);
        assert_eq!(catalog.formats[0].key, "wide");
    }

    #[tokio::test]
    async fn non_success_surfaces_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/catalog"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let api = RenderApi::new(server.uri());
        let err = api.fetch_catalog().await.unwrap_err();
        assert_matches!(err, RenderApiError::Api { status: 503, ref body } if body == "maintenance");
    }

    #[tokio::test]
    async fn trailing_slash_in_base_url_is_trimmed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/catalog"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let api = RenderApi::new(format!("{}/", server.uri()));
        assert!(api.fetch_catalog().await.is_ok());
    }

    #[tokio::test]
    async fn upload_returns_confirmed_paths() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "files": ["/uploads/a.jpg", "/uploads/b.jpg"]
            })))
            .mount(&server)
            .await;

        let api = RenderApi::new(server.uri());
        let files = vec![
            UploadFile {
                name: "a.jpg".into(),
                bytes: vec![1, 2, 3],
            },
            UploadFile {
                name: "b.jpg".into(),
                bytes: vec![4, 5, 6],
            },
        ];
        let paths = api.upload_photos(files).await.unwrap();
        assert_eq!(paths, vec!["/uploads/a.jpg", "/uploads/b.jpg"]);
    }

    #[tokio::test]
    async fn upload_without_confirmed_paths_is_contract_violation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "files": []
            })))
            .mount(&server)
            .await;

        let api = RenderApi::new(server.uri());
        let err = api
            .upload_photos(vec![UploadFile {
                name: "a.jpg".into(),
                bytes: vec![1],
            }])
            .await
            .unwrap_err();
        assert_matches!(err, RenderApiError::MissingField { field: "files" });
    }

    #[tokio::test]
    async fn start_frame_returns_preview_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/start-frame"))
            .and(body_json(serde_json::json!({
                "scene_key": "hugging",
                "format_key": "wide",
                "background_key": "clouds",
                "photos": ["/uploads/a.jpg", "/uploads/b.jpg"]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "start_frame_url": "https://cdn/sf/1.jpg"
            })))
            .mount(&server)
            .await;

        let api = RenderApi::new(server.uri());
        let request = StartFrameRequest {
            scene_key: "hugging".into(),
            format_key: "wide".into(),
            background_key: "clouds".into(),
            photos: vec!["/uploads/a.jpg".into(), "/uploads/b.jpg".into()],
        };
        let url = api.generate_start_frame(&request).await.unwrap();
        assert_eq!(url, "https://cdn/sf/1.jpg");
    }

    #[tokio::test]
    async fn start_frame_without_url_is_contract_violation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/start-frame"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let api = RenderApi::new(server.uri());
        let request = StartFrameRequest {
            scene_key: "hugging".into(),
            format_key: "wide".into(),
            background_key: String::new(),
            photos: vec!["/uploads/a.jpg".into()],
        };
        let err = api.generate_start_frame(&request).await.unwrap_err();
        assert_matches!(
            err,
            RenderApiError::MissingField {
                field: "start_frame_url"
            }
        );
    }

    #[tokio::test]
    async fn start_paid_render_posts_full_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/render/start_paid"))
            .and(body_json(serde_json::json!({
                "format_key": "wide",
                "scene_key": "hugging",
                "background_key": "clouds",
                "music_key": "",
                "title": "",
                "subtitle": "",
                "photos": ["/uploads/a.jpg"],
                "user": "web_123"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "render_started",
                "job_id": "J1"
            })))
            .mount(&server)
            .await;

        let api = RenderApi::new(server.uri());
        let request = StartRenderRequest {
            format_key: "wide".into(),
            scene_key: "hugging".into(),
            background_key: "clouds".into(),
            music_key: String::new(),
            title: String::new(),
            subtitle: String::new(),
            photos: vec!["/uploads/a.jpg".into()],
            user: "web_123".into(),
        };
        let response = api.start_paid_render(&request).await.unwrap();
        assert_eq!(response.status, "render_started");
        assert_eq!(response.job_id.as_deref(), Some("J1"));
    }

    #[tokio::test]
    async fn job_status_not_found_maps_to_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/render/status/missing"))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_json(serde_json::json!({"error": "not found"})),
            )
            .mount(&server)
            .await;

        let api = RenderApi::new(server.uri());
        let err = api.job_status("missing").await.unwrap_err();
        assert_matches!(err, RenderApiError::Api { status: 404, .. });
    }

    #[tokio::test]
    async fn payment_status_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/render/status_by_payment/pk-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "render_started",
                "job_id": "J7"
            })))
            .mount(&server)
            .await;

        let api = RenderApi::new(server.uri());
        let status = api.payment_status("pk-1").await.unwrap();
        assert_eq!(status.job_id.as_deref(), Some("J7"));
    }

    #[tokio::test]
    async fn support_posts_text_and_contact() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/support"))
            .and(body_json(serde_json::json!({
                "text": "video never arrived",
                "user_contact": "user@example.com"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .mount(&server)
            .await;

        let api = RenderApi::new(server.uri());
        api.send_support("video never arrived", "user@example.com")
            .await
            .unwrap();
    }
}

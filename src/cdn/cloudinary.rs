use super::{status_error, transport_error, CdnBackend, PutOutcome, PutRequest};
use crate::entropy::Entropy;
use crate::hosting::CloudinaryHosting;
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use sha1::{Digest, Sha1};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error};

const BACKEND: &str = "cloudinary";
const DELIVERY_HOST: &str = "https://res.cloudinary.com";

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    public_id: Option<String>,
    secure_url: Option<String>,
    url: Option<String>,
    #[serde(default)]
    existing: bool,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct DestroyResponse {
    result: Option<String>,
    error: Option<ApiError>,
}

/// Hex SHA-1 over the parameters in key order, `&`-joined, with the API
/// secret appended.
pub fn api_signature(params: &BTreeMap<&str, String>, api_secret: &str) -> String {
    let joined = params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");
    let mut hasher = Sha1::new();
    hasher.update(joined.as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Public id of a key: the key without its file extension.
fn public_id(key: &str) -> &str {
    match key.rsplit_once('.') {
        Some((stem, ext)) if !ext.contains('/') => stem,
        _ => key,
    }
}

/// Media-processing CDN driver. Success is decided by the JSON body.
pub struct CloudinaryBackend {
    http: reqwest::Client,
    cloud_name: String,
    api_key: String,
    api_secret: String,
    api_base_url: String,
    entropy: Arc<dyn Entropy>,
}

impl CloudinaryBackend {
    pub fn new(
        http: reqwest::Client,
        hosting: &CloudinaryHosting,
        entropy: Arc<dyn Entropy>,
    ) -> Self {
        Self {
            http,
            cloud_name: hosting.cloud_name.clone(),
            api_key: hosting.api_key.clone(),
            api_secret: hosting.api_secret.clone(),
            api_base_url: hosting.api_base_url.trim_end_matches('/').to_string(),
            entropy,
        }
    }

    fn endpoint(&self, operation: &str) -> String {
        format!(
            "{}/v1_1/{}/image/{}",
            self.api_base_url, self.cloud_name, operation
        )
    }

    /// Signed form carrying `params` plus the api key, timestamp and
    /// signature.
    fn signed_form(&self, mut params: BTreeMap<&str, String>) -> Form {
        params.insert("timestamp", self.entropy.unix_time().to_string());
        let signature = api_signature(&params, &self.api_secret);

        let mut form = Form::new()
            .text("api_key", self.api_key.clone())
            .text("signature", signature);
        for (name, value) in params {
            form = form.text(name.to_string(), value);
        }
        form
    }

    async fn post<T: serde::de::DeserializeOwned>(
        &self,
        operation: &str,
        key: &str,
        form: Form,
    ) -> Result<T> {
        let response = self
            .http
            .post(self.endpoint(operation))
            .multipart(form)
            .send()
            .await
            .map_err(|e| transport_error(BACKEND, key, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(BACKEND, key, e))?;

        if !status.is_success() {
            error!(
                "Failed to upload file to cloudinary: {} returned {}: {}",
                key, status, body
            );
            return Err(match status_error(BACKEND, key, status, &body) {
                Error::Transient { .. } => Error::service(BACKEND, key, body),
                other => other,
            });
        }

        serde_json::from_str(&body).map_err(|e| {
            error!("Failed to upload file to cloudinary: malformed response for {}: {}", key, e);
            Error::service(BACKEND, key, format!("malformed response: {}", e))
        })
    }
}

#[async_trait]
impl CdnBackend for CloudinaryBackend {
    fn name(&self) -> &'static str {
        BACKEND
    }

    async fn put(&self, request: PutRequest<'_>) -> Result<PutOutcome> {
        let mut params = BTreeMap::new();
        params.insert("public_id", public_id(request.key).to_string());
        params.insert("overwrite", request.overwrite.to_string());

        let filename = request.key.rsplit('/').next().unwrap_or(request.key).to_string();
        let file = Part::bytes(request.body.to_vec())
            .file_name(filename)
            .mime_str(request.content_type)
            .map_err(|e| Error::service(BACKEND, request.key, e))?;
        let form = self.signed_form(params).part("file", file);

        let response: UploadResponse = self.post("upload", request.key, form).await?;
        if let Some(api_error) = response.error {
            error!("Failed to upload file to cloudinary: {}", api_error.message);
            return Err(Error::service(BACKEND, request.key, api_error.message));
        }

        let location = match (response.public_id, response.secure_url.or(response.url)) {
            (Some(_), Some(url)) => url,
            _ => {
                error!(
                    "Failed to upload file to cloudinary: response for {} lacks public_id or url",
                    request.key
                );
                return Err(Error::service(
                    BACKEND,
                    request.key,
                    "response lacks public_id or url",
                ));
            }
        };

        if response.existing {
            debug!("{} already on cloudinary", request.key);
            return Ok(PutOutcome::AlreadyPresent {
                location: Some(location),
            });
        }
        Ok(PutOutcome::Stored {
            location: Some(location),
        })
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut params = BTreeMap::new();
        params.insert("public_id", public_id(key).to_string());

        let response: DestroyResponse = self.post("destroy", key, self.signed_form(params)).await?;
        if let Some(api_error) = response.error {
            return Err(Error::service(BACKEND, key, api_error.message));
        }
        match response.result.as_deref() {
            Some("ok") | Some("not found") => Ok(()),
            other => Err(Error::service(
                BACKEND,
                key,
                format!("unexpected destroy result {:?}", other),
            )),
        }
    }

    fn resolve_public_urls(&self, key: &str) -> Vec<String> {
        vec![format!(
            "{}/{}/image/upload/{}",
            DELIVERY_HOST, self.cloud_name, key
        )]
    }

    /// Accepts delivery URLs with or without a `v<digits>` version segment.
    fn key_for_url(&self, url: &str) -> Option<String> {
        let (_, rest) = url.split_once("/image/upload/")?;
        let rest = match rest.split_once('/') {
            Some((version, tail))
                if version.len() > 1
                    && version.starts_with('v')
                    && version[1..].chars().all(|c| c.is_ascii_digit()) =>
            {
                tail
            }
            _ => rest,
        };
        (!rest.is_empty()).then(|| rest.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entropy::SeededEntropy;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const KEY: &str = "neontnacct1_vid1_tid1_w640_h480.jpg";

    fn backend(server: &MockServer) -> CloudinaryBackend {
        let hosting = CloudinaryHosting {
            cloud_name: "neon-labs".to_string(),
            api_key: "api-key".to_string(),
            api_secret: "secret".to_string(),
            api_base_url: server.uri(),
        };
        CloudinaryBackend::new(
            reqwest::Client::new(),
            &hosting,
            Arc::new(SeededEntropy::new(1, 1406671711)),
        )
    }

    fn put(overwrite: bool) -> PutRequest<'static> {
        PutRequest {
            key: KEY,
            body: b"jpeg",
            content_type: "image/jpeg",
            overwrite,
        }
    }

    #[test]
    fn test_api_signature_matches_reference() {
        let mut params = BTreeMap::new();
        params.insert("timestamp", "1406671711".to_string());
        params.insert("public_id", "neontnacct1_vid1_tid1_w640_h480".to_string());
        params.insert("overwrite", "true".to_string());
        assert_eq!(
            api_signature(&params, "secret"),
            "9371f34564a0ac0e29d4aa447672aab7187b1536"
        );
    }

    #[tokio::test]
    async fn test_upload_returns_delivery_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1_1/neon-labs/image/upload"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "public_id": "neontnacct1_vid1_tid1_w640_h480",
                "secure_url": "https://res.cloudinary.com/neon-labs/image/upload/v1/neontnacct1_vid1_tid1_w640_h480.jpg"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = backend(&server).put(put(true)).await.unwrap();
        assert_eq!(
            outcome.location(),
            Some("https://res.cloudinary.com/neon-labs/image/upload/v1/neontnacct1_vid1_tid1_w640_h480.jpg")
        );

        let requests = server.received_requests().await.unwrap();
        let body = String::from_utf8_lossy(&requests[0].body);
        assert!(body.contains("9371f34564a0ac0e29d4aa447672aab7187b1536"));
        assert!(body.contains("name=\"file\""));
    }

    #[tokio::test]
    async fn test_existing_object_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "public_id": "neontnacct1_vid1_tid1_w640_h480",
                "url": "http://res.cloudinary.com/neon-labs/image/upload/neontnacct1_vid1_tid1_w640_h480.jpg",
                "existing": true
            })))
            .mount(&server)
            .await;

        let outcome = backend(&server).put(put(false)).await.unwrap();
        assert!(matches!(outcome, PutOutcome::AlreadyPresent { location: Some(_) }));
    }

    #[tokio::test]
    async fn test_error_and_malformed_bodies_are_service_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"error": {"message": "Invalid image file"}})),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "ok"})))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let backend = backend(&server);
        for _ in 0..3 {
            let err = backend.put(put(true)).await.unwrap_err();
            assert!(matches!(err, Error::Service { backend: "cloudinary", .. }));
        }
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_destroy() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1_1/neon-labs/image/destroy"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"result": "ok"})))
            .expect(1)
            .mount(&server)
            .await;

        backend(&server).delete(KEY).await.unwrap();
    }

    #[test]
    fn test_key_for_url_skips_version() {
        let hosting = CloudinaryHosting {
            cloud_name: "neon-labs".to_string(),
            api_key: "k".to_string(),
            api_secret: "s".to_string(),
            api_base_url: "https://api.cloudinary.com".to_string(),
        };
        let backend = CloudinaryBackend::new(
            reqwest::Client::new(),
            &hosting,
            Arc::new(SeededEntropy::new(1, 1)),
        );
        assert_eq!(
            backend
                .key_for_url("https://res.cloudinary.com/neon-labs/image/upload/v1234/folder/a.jpg")
                .as_deref(),
            Some("folder/a.jpg")
        );
        let url = &backend.resolve_public_urls("folder/a.jpg")[0];
        assert_eq!(backend.key_for_url(url).as_deref(), Some("folder/a.jpg"));
        assert_eq!(public_id("folder/a.jpg"), "folder/a");
        assert_eq!(public_id("folder.v2/a"), "folder.v2/a");
    }
}

use super::{
    prefixed_urls, status_error, strip_prefixes, transport_error, CdnBackend, PutOutcome,
    PutRequest,
};
use crate::entropy::Entropy;
use crate::hosting::{normalize_cdn_prefix, AkamaiHosting};
use crate::signing::{encode_path, ActionBuilder, ActionKind, G2oVersion, SigningContext};
use crate::Result;
use async_trait::async_trait;
use reqwest::StatusCode;
use std::sync::Arc;
use tracing::{debug, error};

const BACKEND: &str = "akamai";

pub const HEADER_ACTION: &str = "X-Akamai-ACS-Action";
pub const HEADER_AUTH_DATA: &str = "X-Akamai-ACS-Auth-Data";
pub const HEADER_AUTH_SIGN: &str = "X-Akamai-ACS-Auth-Sign";

/// NetStorage upload driver. Every request carries a fresh G2O signature.
pub struct AkamaiBackend {
    http: reqwest::Client,
    base_url: String,
    key: String,
    name: String,
    version: u8,
    cpcode: String,
    cdn_prefixes: Vec<String>,
    entropy: Arc<dyn Entropy>,
}

impl AkamaiBackend {
    pub fn new(
        http: reqwest::Client,
        hosting: &AkamaiHosting,
        cdn_prefixes: Vec<String>,
        entropy: Arc<dyn Entropy>,
    ) -> Result<Self> {
        G2oVersion::try_from(hosting.g2o_version)?;
        Ok(Self {
            http,
            base_url: normalize_cdn_prefix(&hosting.host),
            key: hosting.key.clone(),
            name: hosting.name.clone(),
            version: hosting.g2o_version,
            cpcode: hosting.cpcode.trim_matches('/').to_string(),
            cdn_prefixes,
            entropy,
        })
    }

    fn storage_path(&self, key: &str) -> String {
        format!("/{}/{}", self.cpcode, key.trim_start_matches('/'))
    }

    /// Sign and send one action against `key`. The encoded path is computed
    /// once and used for both the request line and the signature.
    async fn send(
        &self,
        action: &ActionBuilder,
        key: &str,
        body: Option<&[u8]>,
    ) -> Result<reqwest::Response> {
        let path = encode_path(&self.storage_path(key));
        let action_string = action.build();
        let signed = SigningContext::new(&self.key, &self.name, self.version, self.entropy.as_ref())?
            .sign(&path, &action_string)?;

        let url = format!("{}{}", self.base_url, path);
        let request = if action.kind().is_read_only() {
            self.http.get(&url)
        } else {
            self.http.post(&url).body(body.unwrap_or_default().to_vec())
        };

        debug!("akamai {} {}", action.kind().name(), url);
        request
            .header(HEADER_ACTION, signed.action)
            .header(HEADER_AUTH_DATA, signed.auth_data)
            .header(HEADER_AUTH_SIGN, signed.auth_sign)
            .header(reqwest::header::ACCEPT_ENCODING, "identity")
            .send()
            .await
            .map_err(|e| transport_error(BACKEND, key, e))
    }

    /// Whether an object is stored at `key`.
    pub async fn stat(&self, key: &str) -> Result<bool> {
        let response = self
            .send(&ActionBuilder::new(ActionKind::Stat), key, None)
            .await?;
        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(status_error(BACKEND, key, status, &body))
            }
        }
    }

    async fn upload(&self, request: PutRequest<'_>) -> Result<()> {
        let action = ActionBuilder::upload_for(request.body, None);
        let response = self.send(&action, request.key, Some(request.body)).await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        error!(
            "Error uploading file to akamai: {} returned {}: {}",
            request.key, status, body
        );
        Err(status_error(BACKEND, request.key, status, &body))
    }
}

#[async_trait]
impl CdnBackend for AkamaiBackend {
    fn name(&self) -> &'static str {
        BACKEND
    }

    async fn put(&self, request: PutRequest<'_>) -> Result<PutOutcome> {
        if !request.overwrite && self.stat(request.key).await? {
            debug!("{} already stored on akamai; skipping upload", request.key);
            return Ok(PutOutcome::AlreadyPresent { location: None });
        }

        self.upload(request).await?;
        Ok(PutOutcome::Stored { location: None })
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let response = self
            .send(&ActionBuilder::new(ActionKind::Delete), key, Some(&[]))
            .await?;
        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => {
                debug!("{} was not on akamai", key);
                Ok(())
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                error!("Error deleting file from akamai: {} returned {}", key, status);
                Err(status_error(BACKEND, key, status, &body))
            }
        }
    }

    fn resolve_public_urls(&self, key: &str) -> Vec<String> {
        prefixed_urls(&self.cdn_prefixes, key)
    }

    fn key_for_url(&self, url: &str) -> Option<String> {
        strip_prefixes(&self.cdn_prefixes, url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entropy::SeededEntropy;
    use crate::signing::sign;
    use crate::Error;
    use wiremock::matchers::{header, header_exists, method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    const KEY: &str = "acct1/x/Y/z/neontnacct1_vid1_tid1_w640_h480.jpg";
    const STORAGE_PATH: &str = "/168974/acct1/x/Y/z/neontnacct1_vid1_tid1_w640_h480.jpg";

    fn backend(server: &MockServer, version: u8) -> AkamaiBackend {
        let hosting = AkamaiHosting {
            host: server.uri(),
            key: "akey".to_string(),
            name: "aname".to_string(),
            cpcode: "168974".to_string(),
            g2o_version: version,
        };
        AkamaiBackend::new(
            reqwest::Client::new(),
            &hosting,
            vec![
                "http://cdn1.akamai.com".to_string(),
                "http://cdn2.akamai.com".to_string(),
            ],
            Arc::new(SeededEntropy::new(7, 1406671711)),
        )
        .unwrap()
    }

    fn put(body: &[u8], overwrite: bool) -> PutRequest<'_> {
        PutRequest {
            key: KEY,
            body,
            content_type: "image/jpeg",
            overwrite,
        }
    }

    fn header_value(request: &Request, name: &str) -> String {
        request
            .headers
            .get(name)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn test_upload_is_signed_post() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(STORAGE_PATH))
            .and(header_exists(HEADER_AUTH_DATA))
            .and(header_exists(HEADER_AUTH_SIGN))
            .and(header("accept-encoding", "identity"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = backend(&server, 5).put(put(b"a", true)).await.unwrap();
        assert_eq!(outcome, PutOutcome::Stored { location: None });

        let requests = server.received_requests().await.unwrap();
        let request = &requests[0];
        let action = header_value(request, HEADER_ACTION);
        assert_eq!(
            action,
            "version=1&action=upload&format=xml&md5=0cc175b9c0f1b6a831c399e269772661"
        );
        assert_eq!(request.body, b"a");

        // The server can recompute the signature from what it received.
        let auth_data = header_value(request, HEADER_AUTH_DATA);
        let fields: Vec<&str> = auth_data.split(", ").collect();
        assert_eq!(fields[0], "5");
        assert_eq!(fields[1], "0.0.0.0");
        assert_eq!(fields[3], "1406671711");
        assert_eq!(fields[5], "aname");
        let (expected_data, expected_sign) = sign(
            "akey",
            "aname",
            5,
            request.url.path(),
            &action,
            1406671711,
            fields[4].parse().unwrap(),
        )
        .unwrap();
        assert_eq!(auth_data, expected_data);
        assert_eq!(header_value(request, HEADER_AUTH_SIGN), expected_sign);
    }

    #[tokio::test]
    async fn test_no_overwrite_sends_only_stat() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(STORAGE_PATH))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let outcome = backend(&server, 5).put(put(b"a", false)).await.unwrap();
        assert!(matches!(outcome, PutOutcome::AlreadyPresent { .. }));

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert!(header_value(&requests[0], HEADER_ACTION).contains("action=stat"));
    }

    #[tokio::test]
    async fn test_no_overwrite_uploads_missing_object() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = backend(&server, 4).put(put(b"a", false)).await.unwrap();
        assert_eq!(outcome, PutOutcome::Stored { location: None });
    }

    #[tokio::test]
    async fn test_error_statuses_are_classified() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("bad signature"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let backend = backend(&server, 5);
        let err = backend.put(put(b"a", true)).await.unwrap_err();
        assert!(matches!(err, Error::Permission { backend: "akamai", .. }));

        let err = backend.put(put(b"a", true)).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_delete_posts_delete_action() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(STORAGE_PATH))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        backend(&server, 5).delete(KEY).await.unwrap();
        let requests = server.received_requests().await.unwrap();
        assert_eq!(
            header_value(&requests[0], HEADER_ACTION),
            "version=1&action=delete&format=xml"
        );
    }

    #[test]
    fn test_public_urls_omit_cpcode() {
        let hosting = AkamaiHosting {
            host: "akamai".to_string(),
            key: "akey".to_string(),
            name: "aname".to_string(),
            cpcode: "168974".to_string(),
            g2o_version: 5,
        };
        let backend = AkamaiBackend::new(
            reqwest::Client::new(),
            &hosting,
            vec!["http://cdn1.akamai.com".to_string()],
            Arc::new(SeededEntropy::new(1, 1)),
        )
        .unwrap();

        assert_eq!(backend.base_url, "http://akamai");
        assert_eq!(backend.storage_path(KEY), STORAGE_PATH);
        assert_eq!(
            backend.resolve_public_urls(KEY),
            vec![format!("http://cdn1.akamai.com/{}", KEY)]
        );
    }

    #[test]
    fn test_rejects_old_protocol() {
        let hosting = AkamaiHosting {
            host: "akamai".to_string(),
            key: "akey".to_string(),
            name: "aname".to_string(),
            cpcode: "168974".to_string(),
            g2o_version: 3,
        };
        let result = AkamaiBackend::new(
            reqwest::Client::new(),
            &hosting,
            Vec::new(),
            Arc::new(SeededEntropy::new(1, 1)),
        );
        assert!(matches!(result, Err(Error::InvalidProtocolVersion(3))));
    }
}

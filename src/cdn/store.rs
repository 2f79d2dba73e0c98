use crate::hosting::{Acl, Credentials};
use crate::models::Config;
use crate::{Error, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::provider::ProvideCredentials;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use aws_sdk_s3::Client as S3Client;
use std::future::Future;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

const BACKEND: &str = "s3";
const DEFAULT_REGION: &str = "us-east-1";
const SESSION_NAME: &str = "rendition-cdn";

/// Error codes S3 returns when temporary credentials are no longer valid.
const EXPIRED_CREDENTIAL_CODES: [&str; 3] = ["ExpiredToken", "InvalidAccessKeyId", "InvalidToken"];

/// Bucket-level object operations used by the S3 backed drivers and
/// redirects.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: &[u8],
        content_type: &str,
        acl: Acl,
    ) -> Result<()>;

    async fn exists(&self, bucket: &str, key: &str) -> Result<bool>;

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()>;

    /// Store an empty object at `key` that redirects to `location`.
    async fn put_redirect(&self, bucket: &str, key: &str, location: &str) -> Result<()>;
}

struct Failure {
    error: Error,
    expired_credentials: bool,
}

fn classify<E>(err: SdkError<E>, key: &str) -> Failure
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => Failure {
            error: Error::transient(BACKEND, key, format!("{:?}", err)),
            expired_credentials: false,
        },
        SdkError::ServiceError(context) => {
            let status = context.raw().status().as_u16();
            let code = context.err().code().unwrap_or_default().to_string();
            let message = context
                .err()
                .message()
                .map(str::to_string)
                .unwrap_or_else(|| code.clone());
            let expired_credentials = EXPIRED_CREDENTIAL_CODES.contains(&code.as_str());

            let error = if status == 403 || code == "AccessDenied" || expired_credentials {
                error!("AWS client error for {}: {} ({})", key, message, code);
                Error::permission(BACKEND, key, message)
            } else if status >= 500 {
                error!("AWS Server error for {}: {} ({})", key, message, code);
                Error::service(BACKEND, key, message)
            } else {
                error!("AWS client error for {}: {} ({})", key, message, code);
                Error::service(BACKEND, key, message)
            };
            Failure {
                error,
                expired_credentials,
            }
        }
        _ => {
            error!("AWS Server error for {}: {:?}", key, err);
            Failure {
                error: Error::service(BACKEND, key, format!("{:?}", err)),
                expired_credentials: false,
            }
        }
    }
}

/// S3 client that resolves its credentials once and refetches them only
/// when S3 rejects them.
pub struct S3ObjectStore {
    client: RwLock<S3Client>,
    credentials: Credentials,
    endpoint: Option<String>,
    region: String,
    config: Config,
}

impl S3ObjectStore {
    pub async fn connect(
        credentials: &Credentials,
        endpoint: Option<&str>,
        region: Option<&str>,
        config: &Config,
    ) -> Result<Self> {
        let region = region.unwrap_or(DEFAULT_REGION).to_string();
        let client = Self::build_client(credentials, endpoint, &region, config).await?;

        Ok(Self {
            client: RwLock::new(client),
            credentials: credentials.clone(),
            endpoint: endpoint.map(str::to_string),
            region,
            config: config.clone(),
        })
    }

    async fn build_client(
        credentials: &Credentials,
        endpoint: Option<&str>,
        region: &str,
        config: &Config,
    ) -> Result<S3Client> {
        let timeouts = aws_config::timeout::TimeoutConfig::builder()
            .connect_timeout(config.connect_timeout)
            .operation_attempt_timeout(config.request_timeout)
            .build();

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .timeout_config(timeouts);

        match credentials {
            Credentials::Environment => {}
            Credentials::Static {
                access_key,
                secret_key,
            } => {
                loader = loader.credentials_provider(aws_sdk_s3::config::Credentials::new(
                    access_key,
                    secret_key,
                    None,
                    None,
                    "hosting-static",
                ));
            }
            Credentials::AssumeRole {
                access_key,
                secret_key,
                external_id,
                ..
            } => {
                let role_arn = credentials.role_arn().ok_or_else(|| {
                    Error::InvalidConfiguration("assume-role credentials need a role".to_string())
                })?;
                let source = aws_sdk_s3::config::Credentials::new(
                    access_key,
                    secret_key,
                    None,
                    None,
                    "hosting-static",
                );

                let mut builder = aws_config::sts::AssumeRoleProvider::builder(role_arn.clone())
                    .session_name(SESSION_NAME)
                    .region(Region::new(region.to_string()));
                if let Some(external_id) = external_id {
                    builder = builder.external_id(external_id);
                }
                let provider = builder.build_from_provider(source).await;

                info!("Assuming role {}", role_arn);
                let temporary = provider.provide_credentials().await.map_err(|e| {
                    error!("AWS client error assuming role {}: {}", role_arn, e);
                    Error::permission(BACKEND, &role_arn, e)
                })?;
                loader = loader.credentials_provider(temporary);
            }
        }

        if let Some(endpoint) = endpoint {
            loader = loader.endpoint_url(endpoint);
        }

        Ok(S3Client::new(&loader.load().await))
    }

    /// Run `op`, refetching credentials and retrying once when they have
    /// expired.
    async fn run<T, F, Fut>(&self, key: &str, op: F) -> Result<T>
    where
        F: Fn(S3Client) -> Fut,
        Fut: Future<Output = std::result::Result<T, Failure>>,
    {
        let client = self.client.read().await.clone();
        match op(client).await {
            Ok(value) => Ok(value),
            Err(failure) if failure.expired_credentials => {
                warn!("S3 rejected credentials for {}; refreshing", key);
                let fresh = Self::build_client(
                    &self.credentials,
                    self.endpoint.as_deref(),
                    &self.region,
                    &self.config,
                )
                .await?;
                *self.client.write().await = fresh.clone();
                op(fresh).await.map_err(|f| f.error)
            }
            Err(failure) => Err(failure.error),
        }
    }
}

fn canned_acl(acl: Acl) -> Option<ObjectCannedAcl> {
    match acl {
        Acl::Private => None,
        Acl::PublicRead => Some(ObjectCannedAcl::PublicRead),
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: &[u8],
        content_type: &str,
        acl: Acl,
    ) -> Result<()> {
        self.run(key, |client| async move {
            client
                .put_object()
                .bucket(bucket)
                .key(key)
                .body(ByteStream::from(body.to_vec()))
                .content_type(content_type)
                .set_acl(canned_acl(acl))
                .send()
                .await
                .map(|_| ())
                .map_err(|e| classify(e, key))
        })
        .await
    }

    async fn exists(&self, bucket: &str, key: &str) -> Result<bool> {
        self.run(key, |client| async move {
            match client.head_object().bucket(bucket).key(key).send().await {
                Ok(_) => Ok(true),
                Err(e) if e.as_service_error().map(|s| s.is_not_found()).unwrap_or(false) => {
                    Ok(false)
                }
                Err(e) => Err(classify(e, key)),
            }
        })
        .await
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        self.run(key, |client| async move {
            client
                .delete_object()
                .bucket(bucket)
                .key(key)
                .send()
                .await
                .map(|_| ())
                .map_err(|e| classify(e, key))
        })
        .await
    }

    async fn put_redirect(&self, bucket: &str, key: &str, location: &str) -> Result<()> {
        self.run(key, |client| async move {
            client
                .put_object()
                .bucket(bucket)
                .key(key)
                .body(ByteStream::from_static(b""))
                .website_redirect_location(location)
                .send()
                .await
                .map(|_| ())
                .map_err(|e| classify(e, key))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn s3_error(code: &str, message: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><Error><Code>{}</Code><Message>{}</Message></Error>"#,
            code, message
        )
    }

    async fn store(server: &MockServer) -> S3ObjectStore {
        let credentials = Credentials::Static {
            access_key: "AKID".to_string(),
            secret_key: "secret".to_string(),
        };
        S3ObjectStore::connect(&credentials, Some(&server.uri()), None, &Config::default())
            .await
            .unwrap()
    }

    #[test]
    fn test_canned_acl() {
        assert_eq!(canned_acl(Acl::Private), None);
        assert_eq!(canned_acl(Acl::PublicRead), Some(ObjectCannedAcl::PublicRead));
    }

    #[test]
    fn test_expired_codes_trigger_refresh() {
        for code in ["ExpiredToken", "InvalidAccessKeyId", "InvalidToken"] {
            assert!(EXPIRED_CREDENTIAL_CODES.contains(&code));
        }
        assert!(!EXPIRED_CREDENTIAL_CODES.contains(&"AccessDenied"));
    }

    #[tokio::test]
    async fn test_expired_token_rebuilds_client_and_retries_once() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/bucket/a.jpg"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_string(s3_error("ExpiredToken", "The provided token has expired.")),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/bucket/a.jpg"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let store = store(&server).await;
        store
            .put_object("bucket", "a.jpg", b"x", "image/jpeg", Acl::Private)
            .await
            .unwrap();

        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_access_denied_is_permission_error() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/bucket/a.jpg"))
            .respond_with(
                ResponseTemplate::new(403).set_body_string(s3_error("AccessDenied", "Access Denied")),
            )
            .mount(&server)
            .await;

        let store = store(&server).await;
        let err = store
            .put_object("bucket", "a.jpg", b"x", "image/jpeg", Acl::PublicRead)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Permission { backend: "s3", .. }));
        assert!(err.is_io());
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_server_error_is_service_error() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/bucket/a.jpg"))
            .respond_with(
                ResponseTemplate::new(501)
                    .set_body_string(s3_error("NotImplemented", "Not implemented")),
            )
            .mount(&server)
            .await;

        let store = store(&server).await;
        let err = store.delete_object("bucket", "a.jpg").await.unwrap_err();

        assert!(matches!(err, Error::Service { backend: "s3", .. }));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_exists_maps_missing_object_to_false() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/bucket/missing.jpg"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/bucket/a.jpg"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let store = store(&server).await;
        assert!(!store.exists("bucket", "missing.jpg").await.unwrap());
        assert!(store.exists("bucket", "a.jpg").await.unwrap());
    }
}

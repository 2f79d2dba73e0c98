use super::ObjectStore;
use crate::models::Config;
use crate::Result;
use tracing::info;

/// Point `src_key` at `dest_key` without copying bytes. Buckets default to
/// the configured hosting bucket.
pub async fn create_redirect(
    store: &dyn ObjectStore,
    config: &Config,
    dest_key: &str,
    src_key: &str,
    dest_bucket: Option<&str>,
    src_bucket: Option<&str>,
) -> Result<()> {
    let dest_bucket = dest_bucket.unwrap_or(&config.hosting_bucket);
    let src_bucket = src_bucket.unwrap_or(&config.hosting_bucket);
    let location = redirect_location(config, dest_key, dest_bucket, src_bucket);

    store.put_redirect(src_bucket, src_key, &location).await?;
    info!("Redirected {}/{} to {}", src_bucket, src_key, location);
    Ok(())
}

/// Same-bucket redirects are relative; cross-bucket ones are absolute.
pub fn redirect_location(
    config: &Config,
    dest_key: &str,
    dest_bucket: &str,
    src_bucket: &str,
) -> String {
    let dest_key = dest_key.trim_start_matches('/');
    if dest_bucket == src_bucket {
        format!("/{}", dest_key)
    } else {
        format!("https://s3.{}/{}/{}", config.s3_host, dest_bucket, dest_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cdn::mock::StoreFault;
    use crate::cdn::MemoryObjectStore;
    use crate::Error;

    fn config() -> Config {
        Config {
            hosting_bucket: "host-bucket".to_string(),
            ..Config::default()
        }
    }

    fn redirect_of(store: &MemoryObjectStore, bucket: &str, key: &str) -> Option<String> {
        store.get(bucket, key).and_then(|o| o.redirect)
    }

    #[tokio::test]
    async fn test_redirect_locations() {
        let store = MemoryObjectStore::new();
        let config = config();
        let dest = "dest/image.jpg";

        let calls = [
            ("src/samebuc.jpg", Some("my-bucket"), Some("my-bucket")),
            ("src/diffbuc.jpg", Some("my-bucket"), Some("obucket")),
            ("src/bothdefault.jpg", None, None),
            ("src/destdefault.jpg", None, Some("mine")),
            ("src/srcdefault.jpg", Some("mine"), None),
        ];
        for (src, dest_bucket, src_bucket) in calls {
            create_redirect(&store, &config, dest, src, dest_bucket, src_bucket)
                .await
                .unwrap();
        }

        assert_eq!(
            redirect_of(&store, "my-bucket", "src/samebuc.jpg").as_deref(),
            Some("/dest/image.jpg")
        );
        assert_eq!(
            redirect_of(&store, "obucket", "src/diffbuc.jpg").as_deref(),
            Some("https://s3.amazonaws.com/my-bucket/dest/image.jpg")
        );
        assert_eq!(
            redirect_of(&store, "host-bucket", "src/bothdefault.jpg").as_deref(),
            Some("/dest/image.jpg")
        );
        assert_eq!(
            redirect_of(&store, "mine", "src/destdefault.jpg").as_deref(),
            Some("https://s3.amazonaws.com/host-bucket/dest/image.jpg")
        );
        assert_eq!(
            redirect_of(&store, "host-bucket", "src/srcdefault.jpg").as_deref(),
            Some("https://s3.amazonaws.com/mine/dest/image.jpg")
        );
    }

    #[tokio::test]
    async fn test_redirect_failures_are_io_errors() {
        for fault in [StoreFault::Permission, StoreFault::Service] {
            let store = MemoryObjectStore::new().with_faults(&[fault]);
            let err = create_redirect(&store, &config(), "dest.jpg", "src.jpg", None, None)
                .await
                .unwrap_err();
            assert!(err.is_io());
            assert!(!matches!(err, Error::Transient { .. }));
        }
    }
}

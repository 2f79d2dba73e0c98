//! Rendition dispatch
//!
//! Drives one upload batch through
//! `Preparing -> Uploading -> Validating -> Committing -> Done`: render every
//! rendition, put them all on the configured backend, probe the resulting
//! serving URLs and record them in the serving-URL registry.

use crate::cdn::{create_backend, BackendContext, CdnBackend, PutOutcome, PutRequest};
use crate::entropy::{Entropy, SystemEntropy};
use crate::hosting::HostingConfig;
use crate::image::{ImageProcessor, ImageService};
use crate::keys::{parse_image_key, resolve_dimensions, select_prefix, KeyBuilder};
use crate::models::{Config, Container, RenditionSize, UploadOutcome};
use crate::probe::{HttpUrlProbe, UrlProbe};
use crate::registry::{MemoryMetadataStore, ServingUrlRegistry, ServingUrlSet};
use crate::video::{VideoClip, VideoEncoder};
use crate::{Error, Result};
use futures::future::join_all;
use image::DynamicImage;
use std::sync::Arc;
use tokio_retry::{strategy::FixedInterval, RetryIf};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Preparing,
    Uploading,
    Validating,
    Committing,
    Done,
    Failed,
}

impl BatchState {
    /// Validating and Committing may be skipped; Done and Failed are final.
    pub fn can_advance_to(self, next: BatchState) -> bool {
        use BatchState::*;
        matches!(
            (self, next),
            (Preparing, Uploading)
                | (Uploading, Validating | Committing | Done)
                | (Validating, Committing | Done)
                | (Committing, Done)
                | (Preparing | Uploading | Validating | Committing, Failed)
        )
    }
}

/// Tracks the state of one batch and logs each transition.
struct Batch<'a> {
    asset_id: &'a str,
    state: BatchState,
}

impl<'a> Batch<'a> {
    fn new(asset_id: &'a str) -> Self {
        debug!("[{}] Preparing renditions", asset_id);
        Self {
            asset_id,
            state: BatchState::Preparing,
        }
    }

    fn advance(&mut self, next: BatchState) -> Result<()> {
        if !self.state.can_advance_to(next) {
            return Err(Error::Invariant(format!(
                "batch {} cannot move from {:?} to {:?}",
                self.asset_id, self.state, next
            )));
        }
        debug!("[{}] {:?} -> {:?}", self.asset_id, self.state, next);
        self.state = next;
        Ok(())
    }

    fn fail(&mut self, err: Error) -> Error {
        error!(
            "[{}] Batch failed while {:?}: {}",
            self.asset_id, self.state, err
        );
        if self.state.can_advance_to(BatchState::Failed) {
            self.state = BatchState::Failed;
        }
        err
    }
}

/// Per-call overrides of the hosting and process configuration.
#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    /// Overrides [`HostingConfig::overwrite`].
    pub overwrite: Option<bool>,
    /// Replace the asset's serving urls instead of merging into them.
    pub servingurl_overwrite: bool,
    /// Overrides [`Config::validate_urls`].
    pub validate_urls: Option<bool>,
}

/// A rendered rendition waiting to be put.
struct Rendition {
    size: RenditionSize,
    key: String,
    container: Container,
    codec: Option<String>,
    body: Vec<u8>,
}

/// Injectable service bundle used to construct [`Dispatcher`] in tests.
pub struct DispatcherServices {
    pub backend: Arc<dyn CdnBackend>,
    pub image: Box<dyn ImageService>,
    pub video: Option<Box<dyn VideoEncoder>>,
    pub probe: Box<dyn UrlProbe>,
    pub registry: Arc<ServingUrlRegistry>,
    pub entropy: Arc<dyn Entropy>,
}

pub struct Dispatcher {
    hosting: HostingConfig,
    config: Config,
    backend: Arc<dyn CdnBackend>,
    image: Box<dyn ImageService>,
    video: Option<Box<dyn VideoEncoder>>,
    probe: Box<dyn UrlProbe>,
    registry: Arc<ServingUrlRegistry>,
    entropy: Arc<dyn Entropy>,
}

impl Dispatcher {
    pub fn with_services(
        hosting: HostingConfig,
        services: DispatcherServices,
        config: Config,
    ) -> Self {
        Self {
            hosting,
            config,
            backend: services.backend,
            image: services.image,
            video: services.video,
            probe: services.probe,
            registry: services.registry,
            entropy: services.entropy,
        }
    }

    /// Dispatcher with the real backend, JPEG renderer and HTTP probe, and a
    /// process-local registry.
    pub async fn new(hosting: HostingConfig, config: Config) -> Result<Self> {
        let http = config.http_client()?;
        let entropy: Arc<dyn Entropy> = Arc::new(SystemEntropy);
        let ctx = BackendContext::new(http.clone(), entropy.clone(), config.clone());
        let backend = create_backend(&hosting, &ctx).await?;
        info!(
            "Dispatching renditions to {} ({} cdn prefixes)",
            backend.name(),
            hosting.cdn_prefixes.len()
        );

        let registry = ServingUrlRegistry::new(Arc::new(MemoryMetadataStore::new()));

        Ok(Self::with_services(
            hosting,
            DispatcherServices {
                backend,
                image: Box::new(ImageProcessor::new()),
                video: None,
                probe: Box::new(HttpUrlProbe::new(http)),
                registry: Arc::new(registry),
                entropy,
            },
            config,
        ))
    }

    pub fn with_video_encoder(mut self, encoder: Box<dyn VideoEncoder>) -> Self {
        self.video = Some(encoder);
        self
    }

    pub fn hosting(&self) -> &HostingConfig {
        &self.hosting
    }

    pub fn registry(&self) -> &ServingUrlRegistry {
        &self.registry
    }

    pub async fn serving_urls(&self, asset_id: &str) -> Result<Option<ServingUrlSet>> {
        self.registry.get(asset_id).await
    }

    fn retry_strategy(&self) -> impl Iterator<Item = std::time::Duration> {
        FixedInterval::new(self.config.retry_interval).take(self.config.transient_retries)
    }

    /// Upload every configured rendition of `source` for `asset_id`.
    ///
    /// Any rendition failing to store or validate fails the whole batch
    /// with [`Error::Batch`]; objects already stored are left in place and
    /// the registry is not touched.
    pub async fn upload(
        &self,
        source: DynamicImage,
        asset_id: &str,
        options: &UploadOptions,
    ) -> Result<Vec<UploadOutcome>> {
        let mut batch = Batch::new(asset_id);
        let source_size = RenditionSize::new(source.width(), source.height());
        let source = Arc::new(source);

        let sizes = if self.hosting.rendition_sizes.is_empty() {
            vec![source_size]
        } else {
            self.hosting.rendition_sizes.clone()
        };

        let keys = KeyBuilder::for_batch(&self.hosting, self.entropy.as_ref());
        if let Some(salt) = keys.salt() {
            debug!("[{}] Using salt {}", asset_id, salt.as_path());
        }

        let renders = sizes.iter().map(|size| {
            self.image
                .render(source.clone(), *size, self.hosting.source_crop)
        });
        let bodies = join_all(renders).await;

        let mut renditions = Vec::with_capacity(sizes.len());
        for (size, body) in sizes.into_iter().zip(bodies) {
            let body = body.map_err(|e| batch.fail(e))?;
            let key = keys
                .image_key(asset_id, size)
                .map_err(|e| batch.fail(e))?;
            renditions.push(Rendition {
                size,
                key,
                container: Container::Jpg,
                codec: None,
                body,
            });
        }

        let outcomes = self.dispatch(&mut batch, &renditions, options).await?;

        if self.hosting.update_serving_urls {
            batch.advance(BatchState::Committing)?;
            let updates: Vec<(RenditionSize, String)> = outcomes
                .iter()
                .map(|outcome| (outcome.size(), outcome.url.clone()))
                .collect();
            self.registry
                .put(asset_id, &updates, options.servingurl_overwrite)
                .await
                .map_err(|e| batch.fail(e))?;
            info!(
                "[{}] Registered {} serving urls{}",
                asset_id,
                updates.len(),
                if options.servingurl_overwrite {
                    " (replacing previous set)"
                } else {
                    ""
                }
            );
        }

        batch.advance(BatchState::Done)?;
        Ok(outcomes)
    }

    /// Upload the configured video formats of one clip. Video renditions
    /// are validated like images but never registered.
    pub async fn upload_video(
        &self,
        clip: &VideoClip,
        options: &UploadOptions,
    ) -> Result<Vec<UploadOutcome>> {
        let formats = &self.hosting.video_rendition_formats;
        if formats.is_empty() {
            debug!("[{}] No video formats configured", clip.asset_id());
            return Ok(Vec::new());
        }
        let encoder = self.video.as_ref().ok_or_else(|| {
            Error::InvalidConfiguration("video formats configured without an encoder".to_string())
        })?;

        let asset_id = clip.asset_id();
        let mut batch = Batch::new(&asset_id);
        let keys = KeyBuilder::for_batch(&self.hosting, self.entropy.as_ref());

        let mut renditions = Vec::with_capacity(formats.len());
        for format in formats {
            let size = resolve_dimensions(format.width, format.height, clip.source_size);
            let codec = format.effective_codec();
            let key = keys
                .video_key(&clip.video_id, &clip.clip_id, size, format.container)
                .map_err(|e| batch.fail(e))?;
            let body = encoder
                .encode(clip, size, format.container, codec.as_deref())
                .await
                .map_err(|e| batch.fail(e))?;
            renditions.push(Rendition {
                size,
                key,
                container: format.container,
                codec,
                body,
            });
        }

        let outcomes = self.dispatch(&mut batch, &renditions, options).await?;
        batch.advance(BatchState::Done)?;
        Ok(outcomes)
    }

    /// Uploading and Validating for a prepared batch.
    async fn dispatch(
        &self,
        batch: &mut Batch<'_>,
        renditions: &[Rendition],
        options: &UploadOptions,
    ) -> Result<Vec<UploadOutcome>> {
        let asset_id = batch.asset_id;
        let overwrite = options.overwrite.unwrap_or(self.hosting.overwrite);
        batch.advance(BatchState::Uploading)?;

        let puts = renditions
            .iter()
            .map(|rendition| self.put_rendition(asset_id, rendition, overwrite));
        let results = join_all(puts).await;

        let mut outcomes = Vec::with_capacity(renditions.len());
        let mut first_error = None;
        for (rendition, result) in renditions.iter().zip(results) {
            let mut outcome = UploadOutcome {
                url: String::new(),
                width: rendition.size.width,
                height: rendition.size.height,
                container: rendition.container,
                codec: rendition.codec.clone(),
                error: None,
            };
            match result.and_then(|put| self.serving_url(asset_id, &rendition.key, &put)) {
                Ok(url) => outcome.url = url,
                Err(e) => {
                    error!(
                        "[{}] Failed to upload {} to {}: {}",
                        asset_id,
                        rendition.key,
                        self.backend.name(),
                        e
                    );
                    outcome.error = Some(e.to_string());
                    first_error.get_or_insert(e);
                }
            }
            outcomes.push(outcome);
        }

        if let Some(source) = first_error {
            return Err(batch.fail(Error::Batch {
                asset_id: asset_id.to_string(),
                outcomes,
                source: Box::new(source),
            }));
        }
        info!(
            "[{}] Stored {} renditions on {}",
            asset_id,
            outcomes.len(),
            self.backend.name()
        );

        if options.validate_urls.unwrap_or(self.config.validate_urls) {
            batch.advance(BatchState::Validating)?;
            let checks = outcomes.iter().map(|outcome| self.validate_url(&outcome.url));
            let results = join_all(checks).await;

            let mut first_error = None;
            for (outcome, result) in outcomes.iter_mut().zip(results) {
                if let Err(e) = result {
                    error!("[{}] {}", asset_id, e);
                    outcome.error = Some(e.to_string());
                    first_error.get_or_insert(e);
                }
            }
            if let Some(source) = first_error {
                return Err(batch.fail(Error::Batch {
                    asset_id: asset_id.to_string(),
                    outcomes,
                    source: Box::new(source),
                }));
            }
        }

        Ok(outcomes)
    }

    async fn put_rendition(
        &self,
        asset_id: &str,
        rendition: &Rendition,
        overwrite: bool,
    ) -> Result<PutOutcome> {
        let request = PutRequest {
            key: &rendition.key,
            body: &rendition.body,
            content_type: rendition.container.content_type(),
            overwrite,
        };

        let outcome = RetryIf::spawn(
            self.retry_strategy(),
            || async move {
                let result = self.backend.put(request).await;
                if let Err(e) = &result {
                    if e.is_transient() {
                        warn!("[{}] Retrying {}: {}", asset_id, request.key, e);
                    }
                }
                result
            },
            |e: &Error| e.is_transient(),
        )
        .await
        .map_err(Error::into_terminal)?;

        if let PutOutcome::AlreadyPresent { .. } = outcome {
            info!(
                "[{}] {} already present, not overwritten",
                asset_id, rendition.key
            );
        }
        Ok(outcome)
    }

    /// The backend's reported location, else the asset's prefix applied to
    /// the key.
    fn serving_url(&self, asset_id: &str, key: &str, put: &PutOutcome) -> Result<String> {
        if let Some(location) = put.location() {
            return Ok(location.to_string());
        }
        let candidates = self.backend.resolve_public_urls(key);
        select_prefix(&candidates, asset_id)
            .map(str::to_string)
            .ok_or_else(|| {
                Error::Invariant(format!(
                    "{} backend has no public url for {}",
                    self.backend.name(),
                    key
                ))
            })
    }

    /// Probe `url`, retrying transient failures. Anything but success ends
    /// as [`Error::InvalidCdnUrl`].
    async fn validate_url(&self, url: &str) -> Result<()> {
        RetryIf::spawn(
            self.retry_strategy(),
            || self.probe.check(url),
            |e: &Error| e.is_transient(),
        )
        .await
        .map_err(|e| match e {
            invalid @ Error::InvalidCdnUrl { .. } => invalid,
            other => Error::InvalidCdnUrl {
                url: url.to_string(),
                reason: other.to_string(),
            },
        })
    }

    /// Delete the object behind `serving_url` and drop its registry entry
    /// when the entry still points at that url.
    pub async fn delete(&self, serving_url: &str) -> Result<()> {
        let key = self.backend.key_for_url(serving_url).ok_or_else(|| {
            Error::NotFound(format!(
                "{} is not served by this {} hosting",
                serving_url,
                self.backend.name()
            ))
        })?;

        RetryIf::spawn(
            self.retry_strategy(),
            || self.backend.delete(&key),
            |e: &Error| e.is_transient(),
        )
        .await
        .map_err(Error::into_terminal)?;
        info!("Deleted {} from {}", key, self.backend.name());

        if self.hosting.update_serving_urls {
            if let Some((asset_id, size)) = parse_image_key(&key) {
                if self
                    .registry
                    .remove_url(&asset_id, size, serving_url)
                    .await?
                {
                    info!("[{}] Removed {} serving url", asset_id, size);
                }
            }
        }
        Ok(())
    }
}

//! Rendition distribution for CDN-hosted media
//!
//! Renders image and video renditions of an asset, uploads them to one of
//! several CDN backends (S3 buckets, the Akamai NetStorage upload API,
//! Cloudinary, the primary origin bucket) and keeps a registry of the serving
//! URL for every rendition size.

pub mod cdn;
pub mod dispatch;
pub mod entropy;
pub mod error;
pub mod hosting;
pub mod image;
pub mod keys;
pub mod models;
pub mod probe;
pub mod registry;
pub mod signing;
pub mod video;

pub use dispatch::{Dispatcher, DispatcherServices, UploadOptions};
pub use error::{Error, Result};
pub use hosting::HostingConfig;

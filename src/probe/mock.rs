use super::UrlProbe;
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Probe answering from a status table; unknown URLs get the default status.
#[derive(Clone)]
pub struct MockUrlProbe {
    default_status: u16,
    statuses: Arc<Mutex<HashMap<String, u16>>>,
    checked: Arc<Mutex<Vec<String>>>,
}

impl MockUrlProbe {
    pub fn new() -> Self {
        Self {
            default_status: 200,
            statuses: Arc::new(Mutex::new(HashMap::new())),
            checked: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.default_status = status;
        self
    }

    pub fn with_url_status(self, url: &str, status: u16) -> Self {
        self.statuses.lock().unwrap().insert(url.to_string(), status);
        self
    }

    pub fn get_check_count(&self) -> usize {
        self.checked.lock().unwrap().len()
    }

    pub fn get_checked_urls(&self) -> Vec<String> {
        self.checked.lock().unwrap().clone()
    }
}

impl Default for MockUrlProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UrlProbe for MockUrlProbe {
    async fn check(&self, url: &str) -> Result<()> {
        self.checked.lock().unwrap().push(url.to_string());
        let status = self
            .statuses
            .lock()
            .unwrap()
            .get(url)
            .copied()
            .unwrap_or(self.default_status);

        match status {
            200..=299 => Ok(()),
            500..=599 => Err(Error::transient("probe", url, format!("HTTP {}", status))),
            _ => Err(Error::InvalidCdnUrl {
                url: url.to_string(),
                reason: format!("HTTP {}", status),
            }),
        }
    }
}

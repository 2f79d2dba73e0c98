use url::form_urlencoded;

/// Content management API version carried in every action string.
pub const API_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Upload,
    Delete,
    Stat,
    Download,
    Dir,
    Du,
    Mkdir,
    Rmdir,
    Rename,
    Symlink,
    Mtime,
    QuickDelete,
}

impl ActionKind {
    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::Upload => "upload",
            ActionKind::Delete => "delete",
            ActionKind::Stat => "stat",
            ActionKind::Download => "download",
            ActionKind::Dir => "dir",
            ActionKind::Du => "du",
            ActionKind::Mkdir => "mkdir",
            ActionKind::Rmdir => "rmdir",
            ActionKind::Rename => "rename",
            ActionKind::Symlink => "symlink",
            ActionKind::Mtime => "mtime",
            ActionKind::QuickDelete => "quick-delete",
        }
    }

    /// Read actions go out as GET, everything else as POST.
    pub fn is_read_only(&self) -> bool {
        matches!(
            self,
            ActionKind::Stat | ActionKind::Download | ActionKind::Dir | ActionKind::Du
        )
    }
}

/// Builds the `X-Akamai-ACS-Action` value. The built string is also the
/// signature input, so it must be produced once and reused for both.
#[derive(Debug, Clone)]
pub struct ActionBuilder {
    kind: ActionKind,
    index_zip: Option<bool>,
    mtime: Option<u64>,
    size: Option<usize>,
    md5: Option<String>,
    sha1: Option<String>,
    sha256: Option<String>,
    destination: Option<String>,
    target: Option<String>,
    quick_delete: Option<String>,
}

impl ActionBuilder {
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            index_zip: None,
            mtime: None,
            size: None,
            md5: None,
            sha1: None,
            sha256: None,
            destination: None,
            target: None,
            quick_delete: None,
        }
    }

    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    pub fn index_zip(mut self, enabled: bool) -> Self {
        self.index_zip = Some(enabled);
        self
    }

    pub fn mtime(mut self, mtime: u64) -> Self {
        self.mtime = Some(mtime);
        self
    }

    pub fn size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    pub fn md5(mut self, digest: impl Into<String>) -> Self {
        self.md5 = Some(digest.into());
        self
    }

    pub fn sha1(mut self, digest: impl Into<String>) -> Self {
        self.sha1 = Some(digest.into());
        self
    }

    pub fn sha256(mut self, digest: impl Into<String>) -> Self {
        self.sha256 = Some(digest.into());
        self
    }

    pub fn destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn quick_delete(mut self, confirmation: impl Into<String>) -> Self {
        self.quick_delete = Some(confirmation.into());
        self
    }

    /// Upload action carrying the body's MD5, computed here when the caller
    /// has not supplied one.
    pub fn upload_for(body: &[u8], md5: Option<String>) -> Self {
        let digest = md5.unwrap_or_else(|| format!("{:x}", md5::compute(body)));
        Self::new(ActionKind::Upload).md5(digest)
    }

    pub fn build(&self) -> String {
        let mut action = format!("version={}&action={}", API_VERSION, self.kind.name());
        if self.kind != ActionKind::Download {
            action.push_str("&format=xml");
        }

        if let Some(index_zip) = self.index_zip {
            action.push_str(&format!("&index-zip={}", if index_zip { 1 } else { 0 }));
        }
        if let Some(mtime) = self.mtime {
            action.push_str(&format!("&mtime={}", mtime));
        }
        if let Some(size) = self.size {
            action.push_str(&format!("&size={}", size));
        }
        if let Some(md5) = &self.md5 {
            action.push_str(&format!("&md5={}", md5));
        }
        if let Some(sha1) = &self.sha1 {
            action.push_str(&format!("&sha1={}", sha1));
        }
        if let Some(sha256) = &self.sha256 {
            action.push_str(&format!("&sha256={}", sha256));
        }
        if let Some(destination) = &self.destination {
            action.push_str(&format!("&destination={}", form_encode(destination)));
        }
        if let Some(target) = &self.target {
            action.push_str(&format!("&target={}", form_encode(target)));
        }
        if let Some(confirmation) = &self.quick_delete {
            action.push_str(&format!("&quick-delete={}", confirmation));
        }

        action
    }
}

fn form_encode(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

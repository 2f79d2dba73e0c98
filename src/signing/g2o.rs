use crate::entropy::Entropy;
use crate::{Error, Result};
use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::Sha256;

/// Client and server address fields are reserved by the protocol and must be
/// sent as this literal.
pub const RESERVED_IP: &str = "0.0.0.0";

const ACTION_LABEL: &str = "x-akamai-acs-action:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum G2oVersion {
    /// HMAC-SHA1
    V4,
    /// HMAC-SHA256
    V5,
}

impl G2oVersion {
    pub fn number(&self) -> u8 {
        match self {
            G2oVersion::V4 => 4,
            G2oVersion::V5 => 5,
        }
    }
}

impl TryFrom<u8> for G2oVersion {
    type Error = Error;

    fn try_from(version: u8) -> Result<Self> {
        match version {
            4 => Ok(G2oVersion::V4),
            5 => Ok(G2oVersion::V5),
            other => Err(Error::InvalidProtocolVersion(other)),
        }
    }
}

/// Header values for one signed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub action: String,
    pub auth_data: String,
    pub auth_sign: String,
}

/// Per-request signing state. Build a fresh one for every outbound request;
/// the timestamp and request id must never be reused.
#[derive(Clone)]
pub struct SigningContext {
    secret: String,
    nonce: String,
    version: G2oVersion,
    client_ip: &'static str,
    server_ip: &'static str,
    unix_time: u64,
    request_id: u32,
}

impl std::fmt::Debug for SigningContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningContext")
            .field("nonce", &self.nonce)
            .field("version", &self.version)
            .field("unix_time", &self.unix_time)
            .field("request_id", &self.request_id)
            .finish_non_exhaustive()
    }
}

impl SigningContext {
    pub fn new(secret: &str, nonce: &str, version: u8, entropy: &dyn Entropy) -> Result<Self> {
        let version = G2oVersion::try_from(version)?;
        Ok(Self {
            secret: secret.to_string(),
            nonce: nonce.to_string(),
            version,
            client_ip: RESERVED_IP,
            server_ip: RESERVED_IP,
            unix_time: entropy.unix_time(),
            request_id: entropy.random_u32(),
        })
    }

    pub fn with_time(mut self, unix_time: u64) -> Self {
        self.unix_time = unix_time;
        self
    }

    pub fn with_request_id(mut self, request_id: u32) -> Self {
        self.request_id = request_id;
        self
    }

    pub fn version(&self) -> G2oVersion {
        self.version
    }

    /// Value of the `X-Akamai-ACS-Auth-Data` header.
    pub fn auth_data(&self) -> String {
        format!(
            "{}, {}, {}, {}, {}, {}",
            self.version.number(),
            self.server_ip,
            self.client_ip,
            self.unix_time,
            self.request_id,
            self.nonce
        )
    }

    /// Value of the `X-Akamai-ACS-Auth-Sign` header. `encoded_path` must be
    /// byte-identical to the path sent on the request line.
    pub fn auth_sign(&self, encoded_path: &str, action: &str) -> Result<String> {
        // LF only, never CRLF.
        let message = format!(
            "{}{}\n{}{}\n",
            self.auth_data(),
            encoded_path,
            ACTION_LABEL,
            action
        );

        let digest = match self.version {
            G2oVersion::V4 => {
                let mut mac = Hmac::<Sha1>::new_from_slice(self.secret.as_bytes())
                    .map_err(|e| Error::Invariant(format!("HMAC key rejected: {}", e)))?;
                mac.update(message.as_bytes());
                mac.finalize().into_bytes().to_vec()
            }
            G2oVersion::V5 => {
                let mut mac = Hmac::<Sha256>::new_from_slice(self.secret.as_bytes())
                    .map_err(|e| Error::Invariant(format!("HMAC key rejected: {}", e)))?;
                mac.update(message.as_bytes());
                mac.finalize().into_bytes().to_vec()
            }
        };

        Ok(base64::engine::general_purpose::STANDARD.encode(digest))
    }

    pub fn sign(&self, encoded_path: &str, action: &str) -> Result<SignedHeaders> {
        Ok(SignedHeaders {
            action: action.to_string(),
            auth_data: self.auth_data(),
            auth_sign: self.auth_sign(encoded_path, action)?,
        })
    }
}

/// Stateless signing entry point with explicit time and request id.
///
/// Returns `(auth_data, auth_sign)`.
pub fn sign(
    secret: &str,
    nonce: &str,
    version: u8,
    encoded_path: &str,
    action: &str,
    unix_time: u64,
    request_id: u32,
) -> Result<(String, String)> {
    let version = G2oVersion::try_from(version)?;
    let context = SigningContext {
        secret: secret.to_string(),
        nonce: nonce.to_string(),
        version,
        client_ip: RESERVED_IP,
        server_ip: RESERVED_IP,
        unix_time,
        request_id,
    };
    let auth_sign = context.auth_sign(encoded_path, action)?;
    Ok((context.auth_data(), auth_sign))
}

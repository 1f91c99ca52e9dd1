//! Text-safe encodings for bytes crossing the host/guest boundary.
//!
//! Assets travel from the fetcher to the sandbox as standard base64 and are
//! decoded back to their exact bytes before staging. Rendered images leave
//! as `data:image/png;base64,` URIs.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// The eight-byte PNG file signature.
pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Prefix of every rendered image URI.
pub const PNG_DATA_URI_PREFIX: &str = "data:image/png;base64,";

/// Encode bytes as standard base64.
pub fn encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode standard base64.
pub fn decode(text: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(text)
}

/// Whether `bytes` start with the PNG signature.
pub fn is_png(bytes: &[u8]) -> bool {
    bytes.starts_with(&PNG_SIGNATURE)
}

/// A fetched asset in its text-safe transport form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedAsset {
    text: String,
}

impl EncodedAsset {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            text: encode(bytes),
        }
    }

    /// Wrap text that is already base64. Validity is checked on decode.
    pub fn from_base64(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Recover the original bytes.
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        decode(&self.text)
    }
}

/// A PNG image as a `data:` URI, ready for an image-displaying surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUri(String);

impl DataUri {
    /// Build a URI from raw PNG bytes. The caller has checked the signature.
    pub fn png(bytes: &[u8]) -> Self {
        Self(format!("{PNG_DATA_URI_PREFIX}{}", encode(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The base64 portion after the prefix.
    pub fn payload(&self) -> &str {
        self.0.strip_prefix(PNG_DATA_URI_PREFIX).unwrap_or(&self.0)
    }

    /// Decode back to image bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, base64::DecodeError> {
        decode(self.payload())
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for DataUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

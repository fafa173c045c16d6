use base64::Engine;
use image::{ImageFormat, ImageReader};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Cursor;
use uuid::Uuid;

use crate::error::InputError;

/// Identifier of a stored image blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageId(pub Uuid);

impl ImageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Object key used by blob storage backends.
    pub fn storage_key(&self) -> String {
        format!("images/{}", self.0)
    }
}

impl Default for ImageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// An in-memory image payload with its detected MIME type.
///
/// Serialized as a `data:` URL so it can travel inside JSON bodies.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ImageData {
    mime: String,
    bytes: Vec<u8>,
}

impl ImageData {
    /// Wrap raw bytes, sniffing the format.
    ///
    /// Only JPEG, PNG and WebP are accepted, and the header must decode.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, InputError> {
        let reader = ImageReader::new(Cursor::new(&bytes))
            .with_guessed_format()
            .map_err(|_| InputError::MalformedImage("unreadable image payload"))?;
        let format = match reader.format() {
            Some(format @ (ImageFormat::Jpeg | ImageFormat::Png | ImageFormat::WebP)) => format,
            _ => return Err(InputError::UnsupportedImage),
        };
        reader
            .into_dimensions()
            .map_err(|_| InputError::MalformedImage("truncated or corrupt image header"))?;

        Ok(Self {
            mime: format.to_mime_type().to_string(),
            bytes,
        })
    }

    /// Parse a `data:<mime>;base64,<payload>` URL.
    pub fn from_data_url(url: &str) -> Result<Self, InputError> {
        let rest = url
            .strip_prefix("data:")
            .ok_or(InputError::MalformedImage("expected a data: URL"))?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or(InputError::MalformedImage("missing ',' separator"))?;
        if !header.ends_with(";base64") {
            return Err(InputError::MalformedImage("only base64 payloads are supported"));
        }

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|_| InputError::MalformedImage("invalid base64 payload"))?;
        if bytes.is_empty() {
            return Err(InputError::MalformedImage("empty payload"));
        }

        // Trust the sniffed format over the declared one.
        Self::from_bytes(bytes)
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.bytes)
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, self.to_base64())
    }
}

impl fmt::Debug for ImageData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageData")
            .field("mime", &self.mime)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl TryFrom<String> for ImageData {
    type Error = InputError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_data_url(&value)
    }
}

impl From<ImageData> for String {
    fn from(value: ImageData) -> Self {
        value.to_data_url()
    }
}

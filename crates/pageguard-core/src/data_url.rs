//! `data:` URL encoding for image payloads

use crate::{Error, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// A decoded `data:` URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUrl {
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl DataUrl {
    pub fn new(mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            mime: mime.into(),
            bytes,
        }
    }

    /// Parse a base64 `data:` URL. Percent-encoded (non-base64) payloads are
    /// accepted as raw bytes.
    pub fn parse(input: &str) -> Result<Self> {
        let rest = input
            .get(..5)
            .filter(|prefix| prefix.eq_ignore_ascii_case("data:"))
            .map(|_| &input[5..])
            .ok_or_else(|| Error::network("not a data url"))?;

        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| Error::network("data url has no payload separator"))?;

        let mut parts = header.split(';');
        let mime = match parts.next() {
            Some(m) if !m.is_empty() => m.to_string(),
            _ => "text/plain".to_string(),
        };
        let is_base64 = parts.any(|p| p.eq_ignore_ascii_case("base64"));

        let bytes = if is_base64 {
            STANDARD
                .decode(payload.trim())
                .map_err(|e| Error::network(format!("invalid base64 payload: {}", e)))?
        } else {
            payload.as_bytes().to_vec()
        };

        Ok(Self { mime, bytes })
    }

    /// Encode as a base64 `data:` URL
    pub fn encode(&self) -> String {
        format!("data:{};base64,{}", self.mime, STANDARD.encode(&self.bytes))
    }

    pub fn is_image(&self) -> bool {
        self.mime.starts_with("image/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_base64_image() {
        let url = DataUrl::parse("data:image/png;base64,iVBORw0KGgo=").unwrap();
        assert_eq!(url.mime, "image/png");
        assert_eq!(&url.bytes[1..4], b"PNG");
        assert!(url.is_image());
    }

    #[test]
    fn test_encode() {
        let url = DataUrl::new("image/jpeg", vec![0xff, 0xd8, 0xff]);
        assert_eq!(url.encode(), "data:image/jpeg;base64,/9j/");
    }

    #[test]
    fn test_rejects_non_data_urls() {
        assert!(DataUrl::parse("https://example.com/x.png").is_err());
        assert!(DataUrl::parse("data:image/png;base64").is_err());
        assert!(DataUrl::parse("data:image/png;base64,@@@").is_err());
    }
}

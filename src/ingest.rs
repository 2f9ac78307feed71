//! Input normalization: file path, raw bytes or an in-memory buffer become a
//! byte payload.

use std::io::Cursor;
use std::path::PathBuf;

use image::ImageFormat;
use tracing::debug;

use crate::error::PipelineError;

/// Fallback MIME type when the payload is not a recognizable image.
const DEFAULT_MIME: &str = "image/jpeg";

/// An image handed to the solver.
#[derive(Debug, Clone)]
pub enum ImageInput {
    Path(PathBuf),
    Bytes(Vec<u8>),
    Buffer(Cursor<Vec<u8>>),
}

impl ImageInput {
    /// Resolve the input into owned bytes.
    pub fn load(self) -> Result<Vec<u8>, PipelineError> {
        let data = match self {
            ImageInput::Path(path) => std::fs::read(&path).map_err(|e| {
                PipelineError::Ingestion(format!("cannot read {}: {}", path.display(), e))
            })?,
            ImageInput::Bytes(data) => data,
            ImageInput::Buffer(cursor) => cursor.into_inner(),
        };

        if data.is_empty() {
            return Err(PipelineError::Ingestion("image payload is empty".to_string()));
        }

        debug!("Image loaded, size: {} bytes", data.len());
        Ok(data)
    }
}

impl From<PathBuf> for ImageInput {
    fn from(path: PathBuf) -> Self {
        ImageInput::Path(path)
    }
}

impl From<&std::path::Path> for ImageInput {
    fn from(path: &std::path::Path) -> Self {
        ImageInput::Path(path.to_path_buf())
    }
}

impl From<Vec<u8>> for ImageInput {
    fn from(data: Vec<u8>) -> Self {
        ImageInput::Bytes(data)
    }
}

impl From<&[u8]> for ImageInput {
    fn from(data: &[u8]) -> Self {
        ImageInput::Bytes(data.to_vec())
    }
}

impl From<Cursor<Vec<u8>>> for ImageInput {
    fn from(cursor: Cursor<Vec<u8>>) -> Self {
        ImageInput::Buffer(cursor)
    }
}

/// Sniff the MIME type from magic bytes.
pub fn detect_mime(data: &[u8]) -> &'static str {
    match image::guess_format(data) {
        Ok(ImageFormat::Png) => "image/png",
        Ok(ImageFormat::Jpeg) => "image/jpeg",
        Ok(ImageFormat::Gif) => "image/gif",
        Ok(ImageFormat::WebP) => "image/webp",
        Ok(ImageFormat::Bmp) => "image/bmp",
        Ok(ImageFormat::Tiff) => "image/tiff",
        _ => DEFAULT_MIME,
    }
}

/// Build a `data:` URL for embedding an image in a JSON request.
pub fn data_url(data: &[u8]) -> String {
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

    format!("data:{};base64,{}", detect_mime(data), BASE64.encode(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0];

    #[test]
    fn test_load_bytes_and_buffer() {
        let bytes = ImageInput::from(vec![1u8, 2, 3]).load().unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);

        let buffered = ImageInput::from(Cursor::new(vec![4u8, 5])).load().unwrap();
        assert_eq!(buffered, vec![4, 5]);
    }

    #[test]
    fn test_load_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"fake image").unwrap();

        let data = ImageInput::from(file.path()).load().unwrap();
        assert_eq!(data, b"fake image");
    }

    #[test]
    fn test_missing_path_is_ingestion_error() {
        let err = ImageInput::Path(PathBuf::from("/definitely/not/here.png"))
            .load()
            .unwrap_err();
        assert!(matches!(err, PipelineError::Ingestion(_)));
    }

    #[test]
    fn test_empty_payload_rejected() {
        let err = ImageInput::Bytes(Vec::new()).load().unwrap_err();
        assert!(matches!(err, PipelineError::Ingestion(_)));
    }

    #[test]
    fn test_detect_mime() {
        assert_eq!(detect_mime(PNG_MAGIC), "image/png");
        assert_eq!(detect_mime(&[0xFF, 0xD8, 0xFF, 0xE0]), "image/jpeg");
        assert_eq!(detect_mime(b"plain text"), "image/jpeg");
    }

    #[test]
    fn test_data_url() {
        let url = data_url(PNG_MAGIC);
        assert!(url.starts_with("data:image/png;base64,"));
    }
}

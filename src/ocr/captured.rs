use std::io::Cursor;
use std::path::Path;

use anyhow::{Context, Result};
use image::{DynamicImage, GrayImage, ImageFormat};

/// An encoded PNG as produced by a browser screenshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CapturedImage {
    png: Vec<u8>,
}

impl CapturedImage {
    pub fn from_png(bytes: Vec<u8>) -> Self {
        Self { png: bytes }
    }

    pub fn from_gray(img: &GrayImage) -> Result<Self> {
        Self::encode(DynamicImage::ImageLuma8(img.clone()))
    }

    pub fn encode(img: DynamicImage) -> Result<Self> {
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png)
            .context("Failed to encode PNG")?;
        Ok(Self {
            png: buf.into_inner(),
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read image {}", path.display()))?;
        Ok(Self::from_png(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.png
    }

    pub fn decode(&self) -> Result<DynamicImage> {
        image::load_from_memory(&self.png).context("Failed to decode captured image")
    }

    /// Width and height, or `None` if the bytes are not a valid image.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.decode().ok().map(|img| (img.width(), img.height()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, &self.png)
            .with_context(|| format!("Failed to write {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_gray_encode_keeps_dimensions() {
        let img = GrayImage::from_pixel(120, 48, Luma([200]));
        let captured = CapturedImage::from_gray(&img).unwrap();
        assert_eq!(captured.dimensions(), Some((120, 48)));
    }

    #[test]
    fn test_invalid_bytes_have_no_dimensions() {
        let captured = CapturedImage::from_png(b"not a png".to_vec());
        assert_eq!(captured.dimensions(), None);
        assert!(captured.decode().is_err());
    }
}

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use image::ImageFormat;

/// One decoded camera frame: PNG bytes plus dimensions. The bytes are shared
/// behind an `Arc` so freezing a captured copy never duplicates the buffer.
#[derive(Debug, Clone)]
pub struct CaptureFrame {
    png: Arc<Vec<u8>>,
    width: u32,
    height: u32,
    pub decoded_at: DateTime<Utc>,
}

impl CaptureFrame {
    pub fn from_png_bytes(png_bytes: Vec<u8>) -> Result<Self> {
        let img = image::load_from_memory_with_format(&png_bytes, ImageFormat::Png)
            .context("frame is not valid PNG data")?;

        Ok(Self {
            width: img.width(),
            height: img.height(),
            png: Arc::new(png_bytes),
            decoded_at: Utc::now(),
        })
    }

    pub fn png_bytes(&self) -> &[u8] {
        &self.png
    }

    pub(crate) fn shared_png(&self) -> Arc<Vec<u8>> {
        Arc::clone(&self.png)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

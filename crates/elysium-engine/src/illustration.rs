use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::ImageFormat;

/// A decoded illustration, normalized to PNG.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Illustration {
    png: Vec<u8>,
    width: u32,
    height: u32,
}

impl Illustration {
    /// Decodes whatever format the provider returned and re-encodes as PNG.
    pub fn from_provider_bytes(bytes: &[u8]) -> Result<Self> {
        let decoded =
            image::load_from_memory(bytes).context("image payload is not a decodable image")?;
        let mut buffer = Cursor::new(Vec::new());
        decoded
            .write_to(&mut buffer, ImageFormat::Png)
            .context("failed to re-encode illustration as PNG")?;
        Ok(Self {
            png: buffer.into_inner(),
            width: decoded.width(),
            height: decoded.height(),
        })
    }

    pub fn png(&self) -> &[u8] {
        &self.png
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.png)
    }

    /// Writes `scene_{index}.png` into `dir` and returns its path.
    pub fn save_numbered(&self, dir: &Path, index: usize) -> Result<PathBuf> {
        fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
        let path = dir.join(format!("scene_{index}.png"));
        fs::write(&path, &self.png).with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }
}

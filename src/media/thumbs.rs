use std::io::Cursor;
use std::path::Path;

use anyhow::{Context, Result};
use image::ImageFormat;

use crate::database::Thumbnail;
use crate::media::ThumbnailGenerator;

pub const DEFAULT_SIZES: [(u32, u32); 3] = [(128, 128), (256, 256), (512, 512)];

/// Renders PNG thumbnails bounded by each size, smallest first, stopping at
/// the first size the image does not fill.
#[derive(Debug, Clone)]
pub struct PngThumbnails {
    sizes: Vec<(u32, u32)>,
}

impl Default for PngThumbnails {
    fn default() -> Self {
        Self::new(DEFAULT_SIZES.to_vec())
    }
}

impl PngThumbnails {
    pub fn new(mut sizes: Vec<(u32, u32)>) -> Self {
        sizes.sort_unstable();
        Self { sizes }
    }
}

impl ThumbnailGenerator for PngThumbnails {
    fn thumbnails(&self, path: &Path) -> Result<Vec<Thumbnail>> {
        let full = image::open(path).with_context(|| format!("Failed to decode {:?}", path))?;
        let mut out = Vec::new();
        for &(width, height) in &self.sizes {
            if width > full.width() || height > full.height() {
                break;
            }
            let thumb = full.thumbnail(width, height);
            let mut png = Cursor::new(Vec::new());
            thumb.write_to(&mut png, ImageFormat::Png).context("Failed to encode thumbnail")?;
            out.push(Thumbnail { width: thumb.width(), height: thumb.height(), image: png.into_inner() });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn stops_at_first_size_larger_than_image() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wide.png");
        RgbImage::from_pixel(300, 200, image::Rgb([10, 20, 30])).save(&path).unwrap();

        let thumbs = PngThumbnails::default().thumbnails(&path).unwrap();
        assert_eq!(thumbs.len(), 1);
        assert_eq!(thumbs[0].width, 128);
        assert!(thumbs[0].height < 128);
        assert_eq!(&thumbs[0].image[1..4], b"PNG");
    }

    #[test]
    fn undecodable_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("not.png");
        fs::write(&path, "plain text").unwrap();
        assert!(PngThumbnails::default().thumbnails(&path).is_err());
    }
}

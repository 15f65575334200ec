//! Image acquisition and transcoding.
//!
//! Every acquired image is stored three times in the image directory:
//!
//! ```text
//! images/
//! ├── <base>_orig.<ext>     # bytes exactly as downloaded
//! ├── <base>.jpg            # full size, recompressed
//! └── thumb_<base>.jpg      # width-capped thumbnail
//! ```
//!
//! `<base>` is a caller-supplied uniqueness token, so concurrent and repeated
//! acquisitions never write the same file. Acquisition never fails loudly:
//! any error is logged and reported as `None`, and the caller substitutes the
//! shared fallback pair (`fallback.jpg` / `thumb_fallback.jpg`), which
//! [`ImageStore::ensure_fallback`] provisions at start-up.

use crate::config::{IMAGES_URL_PREFIX, ImageSettings};
use crate::error::Result;
use crate::fetch::Fetch;
use crate::utils::truncate_for_log;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, instrument, warn};

/// Filename base of the shared fallback variants.
pub const FALLBACK_BASE: &str = "fallback";

/// Public paths of the two variants an article references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePaths {
    pub image: String,
    pub thumb: String,
}

/// Public paths of everything written for one acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageVariants {
    pub original: String,
    pub image: String,
    pub thumb: String,
}

impl From<ImageVariants> for ImagePaths {
    fn from(v: ImageVariants) -> Self {
        Self {
            image: v.image,
            thumb: v.thumb,
        }
    }
}

/// What [`ImageStore::ensure_fallback`] found or did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackStatus {
    /// Variants were already in the image directory.
    Present,
    /// Variants were generated from the bundled source image.
    Provisioned,
    /// No source image; fallback references stay broken until one is added.
    Missing,
}

/// Filenames produced for one base, relative to the image directory.
#[derive(Debug, Clone, PartialEq, Eq)]
struct VariantFiles {
    original: String,
    full: String,
    thumb: String,
}

impl VariantFiles {
    fn new(base: &str, original_ext: &str) -> Self {
        Self {
            original: format!("{base}_orig.{original_ext}"),
            full: format!("{base}.jpg"),
            thumb: format!("thumb_{base}.jpg"),
        }
    }
}

/// Writes image variants into one directory and knows their public URLs.
#[derive(Debug, Clone)]
pub struct ImageStore {
    dir: PathBuf,
    settings: ImageSettings,
}

impl ImageStore {
    pub fn new(dir: PathBuf, settings: ImageSettings) -> Self {
        Self { dir, settings }
    }

    /// Paths substituted when acquisition fails or an item has no image.
    pub fn fallback(&self) -> ImagePaths {
        let files = VariantFiles::new(FALLBACK_BASE, "jpg");
        ImagePaths {
            image: public_path(&files.full),
            thumb: public_path(&files.thumb),
        }
    }

    /// Download `url` and store its variants under `base`.
    ///
    /// Returns `None` on any failure (network, status, decode, encode, write).
    #[instrument(level = "info", skip_all, fields(url = %truncate_for_log(url, 200), %base))]
    pub async fn acquire<F: Fetch>(&self, fetcher: &F, url: &str, base: &str) -> Option<ImageVariants> {
        match self.try_acquire(fetcher, url, base).await {
            Ok(variants) => {
                debug!(original = %variants.original, image = %variants.image, "Stored image variants");
                Some(variants)
            }
            Err(e) => {
                warn!(error = %e, "Image acquisition failed; using fallback");
                None
            }
        }
    }

    async fn try_acquire<F: Fetch>(&self, fetcher: &F, url: &str, base: &str) -> Result<ImageVariants> {
        let bytes = fetcher.fetch(url).await?;
        self.store_variants(bytes, base).await
    }

    /// Decode `bytes` and write the original, full and thumbnail variants.
    ///
    /// Decoding and encoding run on the blocking pool.
    pub async fn store_variants(&self, bytes: Vec<u8>, base: &str) -> Result<ImageVariants> {
        let dir = self.dir.clone();
        let settings = self.settings.clone();
        let base = base.to_string();
        let files =
            tokio::task::spawn_blocking(move || write_variants(&dir, &bytes, &base, &settings))
                .await??;
        Ok(ImageVariants {
            original: public_path(&files.original),
            image: public_path(&files.full),
            thumb: public_path(&files.thumb),
        })
    }

    /// Make sure the fallback variants exist in the image directory.
    ///
    /// If they are missing and `source` exists, it is transcoded into the same
    /// shapes as any acquired image. A missing `source` is only a warning.
    #[instrument(level = "info", skip_all, fields(source = %source.display()))]
    pub async fn ensure_fallback(&self, source: &Path) -> Result<FallbackStatus> {
        fs::create_dir_all(&self.dir).await?;
        let files = VariantFiles::new(FALLBACK_BASE, "jpg");
        if fs::try_exists(self.dir.join(&files.full)).await?
            && fs::try_exists(self.dir.join(&files.thumb)).await?
        {
            return Ok(FallbackStatus::Present);
        }
        if !fs::try_exists(source).await? {
            warn!("No fallback image found; fallback references will be broken until one is provided");
            return Ok(FallbackStatus::Missing);
        }

        let bytes = fs::read(source).await?;
        self.store_variants(bytes, FALLBACK_BASE).await?;
        info!("Provisioned fallback image variants");
        Ok(FallbackStatus::Provisioned)
    }
}

fn public_path(file: &str) -> String {
    format!("{IMAGES_URL_PREFIX}{file}")
}

/// Synchronous core of [`ImageStore::store_variants`].
fn write_variants(
    dir: &Path,
    bytes: &[u8],
    base: &str,
    settings: &ImageSettings,
) -> Result<VariantFiles> {
    let format = image::guess_format(bytes)?;
    let img = image::load_from_memory_with_format(bytes, format)?;
    let ext = format.extensions_str().first().copied().unwrap_or("img");
    let files = VariantFiles::new(base, ext);

    let full = encode_jpeg(&img, settings.full_quality)?;
    let thumb = encode_jpeg(&thumbnail(&img, settings.thumb_width), settings.thumb_quality)?;

    std::fs::create_dir_all(dir)?;
    std::fs::write(dir.join(&files.original), bytes)?;
    std::fs::write(dir.join(&files.full), full)?;
    std::fs::write(dir.join(&files.thumb), thumb)?;
    Ok(files)
}

/// Scale down to `max_width`, keeping the aspect ratio. Never upscales.
fn thumbnail(img: &DynamicImage, max_width: u32) -> DynamicImage {
    let (width, height) = img.dimensions();
    if width <= max_width {
        return img.clone();
    }
    let scaled_height = ((u64::from(height) * u64::from(max_width)) / u64::from(width)).max(1);
    img.resize_exact(max_width, scaled_height as u32, FilterType::Triangle)
}

/// JPEG has no alpha channel, so everything is flattened to RGB first.
fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut out = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut out, quality);
    rgb.write_with_encoder(encoder)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use image::{ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
    use std::collections::HashMap;
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba([200, 30, 30, 128]));
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img)
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    struct MapFetcher(HashMap<String, Vec<u8>>);

    impl Fetch for MapFetcher {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
            self.0.get(url).cloned().ok_or_else(|| Error::Status {
                status: 404,
                url: url.to_string(),
            })
        }
    }

    fn store(dir: &Path) -> ImageStore {
        ImageStore::new(dir.to_path_buf(), ImageSettings::default())
    }

    #[test]
    fn test_thumbnail_caps_width_and_keeps_ratio() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(800, 600, Rgb([1, 2, 3])));
        let thumb = thumbnail(&img, 400);
        assert_eq!(thumb.dimensions(), (400, 300));
    }

    #[test]
    fn test_thumbnail_does_not_upscale() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(120, 80, Rgb([1, 2, 3])));
        assert_eq!(thumbnail(&img, 400).dimensions(), (120, 80));
    }

    #[test]
    fn test_lower_quality_is_smaller() {
        let mut img = RgbImage::new(256, 256);
        for (x, y, px) in img.enumerate_pixels_mut() {
            *px = Rgb([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x ^ y) % 256) as u8]);
        }
        let img = DynamicImage::ImageRgb8(img);
        let high = encode_jpeg(&img, 95).unwrap();
        let low = encode_jpeg(&img, 20).unwrap();
        assert!(low.len() < high.len());
    }

    #[tokio::test]
    async fn test_acquire_writes_three_variants() {
        let tmp = tempfile::tempdir().unwrap();
        let images = store(tmp.path());
        let fetcher = MapFetcher(HashMap::from([(
            "https://x/1.png".to_string(),
            png_bytes(800, 400),
        )]));

        let variants = images
            .acquire(&fetcher, "https://x/1.png", "1700000000000_abcdefg")
            .await
            .unwrap();

        assert_eq!(variants.original, "/data/images/1700000000000_abcdefg_orig.png");
        assert_eq!(variants.image, "/data/images/1700000000000_abcdefg.jpg");
        assert_eq!(variants.thumb, "/data/images/thumb_1700000000000_abcdefg.jpg");

        let full = image::open(tmp.path().join("1700000000000_abcdefg.jpg")).unwrap();
        assert_eq!(full.dimensions(), (800, 400));
        let thumb = image::open(tmp.path().join("thumb_1700000000000_abcdefg.jpg")).unwrap();
        assert_eq!(thumb.dimensions(), (400, 200));
        let original = std::fs::read(tmp.path().join("1700000000000_abcdefg_orig.png")).unwrap();
        assert_eq!(original, png_bytes(800, 400));
    }

    #[tokio::test]
    async fn test_acquire_failure_is_none() {
        let tmp = tempfile::tempdir().unwrap();
        let images = store(tmp.path());
        let fetcher = MapFetcher(HashMap::from([(
            "https://x/not-an-image".to_string(),
            b"<html>nope</html>".to_vec(),
        )]));

        assert!(images.acquire(&fetcher, "https://x/missing.jpg", "a").await.is_none());
        assert!(images.acquire(&fetcher, "https://x/not-an-image", "b").await.is_none());
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_ensure_fallback_lifecycle() {
        let tmp = tempfile::tempdir().unwrap();
        let images_dir = tmp.path().join("images");
        let source = tmp.path().join("assets").join("fallback.jpg");
        let images = store(&images_dir);

        assert_eq!(
            images.ensure_fallback(&source).await.unwrap(),
            FallbackStatus::Missing
        );

        std::fs::create_dir_all(source.parent().unwrap()).unwrap();
        std::fs::write(&source, png_bytes(1000, 500)).unwrap();
        assert_eq!(
            images.ensure_fallback(&source).await.unwrap(),
            FallbackStatus::Provisioned
        );
        assert!(images_dir.join("fallback.jpg").exists());
        assert!(images_dir.join("thumb_fallback.jpg").exists());
        assert_eq!(
            image::open(images_dir.join("thumb_fallback.jpg"))
                .unwrap()
                .dimensions(),
            (400, 200)
        );

        assert_eq!(
            images.ensure_fallback(&source).await.unwrap(),
            FallbackStatus::Present
        );
    }

    #[test]
    fn test_fallback_paths() {
        let images = store(Path::new("/tmp/unused"));
        assert_eq!(
            images.fallback(),
            ImagePaths {
                image: "/data/images/fallback.jpg".to_string(),
                thumb: "/data/images/thumb_fallback.jpg".to_string(),
            }
        );
    }
}

//! Media layout and derived image generation
//!
//! ```text
//! <media_root>/slides/<file>                         original upload
//! <media_root>/slides/<file>.properties              vendor properties
//! <media_root>/slides/<file>.<name>.<png|jpg>        associated images
//! <media_root>/images/<id>/image.dzi                 DZI descriptor
//! <media_root>/images/<id>/image_files/<l>/<c>_<r>.<fmt>
//! <media_root>/images/<id>/thumbnail.png
//! <media_root>/images/<id>/associated_image.png      macro image
//! ```
//!
//! Everything here does blocking file and image work; async callers run it
//! through `tokio::task::spawn_blocking`.

use image::codecs::jpeg::JpegEncoder;
use image::{imageops::FilterType, ColorType, DynamicImage, ImageOutputFormat, RgbImage};
use std::collections::HashSet;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use super::reader::{sidecar, sidecar_paths};
use super::{
    associated_image_extension, extract_metadata, read_dimensions, DeepZoomGenerator,
    DeepZoomGeometry, ImageSlide, SlideError, SlideReader, SlideResult, ASSOCIATED_MACRO,
};
use crate::config::{DeepZoomConfig, TileFormat};
use crate::models::{IntegrityStatus, Slide, SlideMetadata};

pub const DZI_FILE: &str = "image.dzi";
pub const TILES_DIR: &str = "image_files";
pub const THUMBNAIL_FILE: &str = "thumbnail.png";
pub const ASSOCIATED_IMAGE_FILE: &str = "associated_image.png";

/// Directory for original uploads, relative to the media root
const SLIDES_DIR: &str = "slides";

/// An uploaded original and the sidecars sent with it
#[derive(Debug, Clone, Default)]
pub struct SlideUpload {
    pub file_name: String,
    pub data: Vec<u8>,
    /// `key = value` vendor properties
    pub properties: Option<String>,
    pub associated: Vec<AssociatedUpload>,
}

/// Encoded associated image, e.g. the `macro` overview
#[derive(Debug, Clone)]
pub struct AssociatedUpload {
    pub name: String,
    pub data: Vec<u8>,
}

impl SlideUpload {
    pub fn new(file_name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            data,
            ..Default::default()
        }
    }
}

/// File system access for slides and their derived images
#[derive(Debug, Clone)]
pub struct SlideStore {
    media_root: PathBuf,
    deepzoom: DeepZoomConfig,
}

impl SlideStore {
    pub fn new(media_root: impl Into<PathBuf>, deepzoom: DeepZoomConfig) -> Self {
        Self {
            media_root: media_root.into(),
            deepzoom,
        }
    }

    pub fn media_root(&self) -> &Path {
        &self.media_root
    }

    pub fn tile_format(&self) -> TileFormat {
        self.deepzoom.format
    }

    // ========================================================================
    // Paths
    // ========================================================================

    pub fn slide_path(&self, slide: &Slide) -> PathBuf {
        self.media_root.join(&slide.file)
    }

    /// Image directory, derived from the id when `image_root` is not yet set
    pub fn image_dir(&self, slide: &Slide) -> PathBuf {
        if slide.image_root.is_empty() {
            self.media_root.join(Slide::image_root_for(slide.id))
        } else {
            self.media_root.join(&slide.image_root)
        }
    }

    pub fn dzi_path(&self, slide: &Slide) -> PathBuf {
        self.image_dir(slide).join(DZI_FILE)
    }

    pub fn tiles_dir(&self, slide: &Slide) -> PathBuf {
        self.image_dir(slide).join(TILES_DIR)
    }

    pub fn tile_path(
        &self,
        slide: &Slide,
        level: usize,
        col: u32,
        row: u32,
        format: TileFormat,
    ) -> PathBuf {
        self.tiles_dir(slide)
            .join(level.to_string())
            .join(format!("{}_{}.{}", col, row, format.extension()))
    }

    pub fn thumbnail_path(&self, slide: &Slide) -> PathBuf {
        self.image_dir(slide).join(THUMBNAIL_FILE)
    }

    pub fn associated_image_path(&self, slide: &Slide) -> PathBuf {
        self.image_dir(slide).join(ASSOCIATED_IMAGE_FILE)
    }

    // ========================================================================
    // Uploads
    // ========================================================================

    /// Store an uploaded original under `slides/` with its sidecars,
    /// returning the path relative to the media root. A name already used by
    /// an original or a sidecar is never reused; a random suffix is added to
    /// the stem instead.
    pub fn save_upload(&self, upload: &SlideUpload) -> SlideResult<String> {
        let dir = self.media_root.join(SLIDES_DIR);
        std::fs::create_dir_all(&dir)?;

        let mut name = sanitize_file_name(&upload.file_name);
        while name_taken(&dir.join(&name)) {
            name = with_random_suffix(&name);
        }

        let path = dir.join(&name);
        write_atomic(&path, &upload.data)?;
        if let Some(properties) = &upload.properties {
            write_atomic(&sidecar(&path, "properties"), properties.as_bytes())?;
        }
        for image in &upload.associated {
            let ext = associated_image_extension(&image.data)
                .ok_or_else(|| SlideError::InvalidAssociatedImage(image.name.clone()))?;
            write_atomic(&sidecar(&path, &format!("{}.{}", image.name, ext)), &image.data)?;
        }
        Ok(format!("{}/{}", SLIDES_DIR, name))
    }

    /// Remove the original file and its sidecars; missing files are not an
    /// error
    pub fn delete_file(&self, slide: &Slide) -> SlideResult<()> {
        let path = self.slide_path(slide);
        for sidecar in sidecar_paths(&path) {
            remove_if_present(&sidecar)?;
        }
        remove_if_present(&path)
    }

    /// Remove the image directory; a missing directory is not an error
    pub fn delete_images(&self, slide: &Slide) -> SlideResult<()> {
        match std::fs::remove_dir_all(self.image_dir(slide)) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    // ========================================================================
    // Processing
    // ========================================================================

    pub fn open(&self, slide: &Slide) -> SlideResult<ImageSlide> {
        ImageSlide::open(&self.slide_path(slide))
    }

    /// Write the DZI, every tile, the thumbnail and the macro image
    pub fn generate_images(&self, slide: &Slide) -> SlideResult<()> {
        self.try_generate_images(slide)
            .map_err(|e| SlideError::Generate(e.to_string()))
    }

    fn try_generate_images(&self, slide: &Slide) -> SlideResult<()> {
        let reader = self.open(slide)?;
        let format = self.deepzoom.format;
        let generator =
            DeepZoomGenerator::new(&reader, self.deepzoom.tile_size, self.deepzoom.overlap);

        let tiles_dir = self.tiles_dir(slide);
        std::fs::create_dir_all(&tiles_dir)?;
        write_atomic(&self.dzi_path(slide), generator.get_dzi(format).as_bytes())?;

        for (level, &(cols, rows)) in generator.level_tiles().iter().enumerate() {
            std::fs::create_dir_all(tiles_dir.join(level.to_string()))?;
            for row in 0..rows {
                for col in 0..cols {
                    let tile = generator.get_tile(level, col, row)?;
                    let bytes = self.encode_tile(&tile, format)?;
                    write_atomic(&self.tile_path(slide, level, col, row, format), &bytes)?;
                }
            }
        }

        let size = self.deepzoom.thumbnail_size;
        let thumbnail = reader
            .thumbnail(size, size)
            .resize_exact(size, size, FilterType::Lanczos3);
        write_atomic(&self.thumbnail_path(slide), &encode_png(&thumbnail)?)?;

        let associated = reader.associated_image(ASSOCIATED_MACRO)?;
        write_atomic(&self.associated_image_path(slide), &encode_png(&associated)?)?;

        tracing::debug!(
            "Generated {} tiles in {} levels for slide {}",
            generator.geometry().tile_count(),
            generator.level_count(),
            slide.id
        );
        Ok(())
    }

    /// Extract metadata from the slide's vendor properties
    pub fn read_metadata(&self, slide: &Slide) -> SlideResult<SlideMetadata> {
        self.open(slide)
            .and_then(|reader| extract_metadata(reader.properties()))
            .map_err(|e| SlideError::Metadata(e.to_string()))
    }

    fn encode_tile(&self, tile: &RgbImage, format: TileFormat) -> SlideResult<Vec<u8>> {
        match format {
            TileFormat::Jpeg => {
                let mut bytes = Vec::new();
                let mut encoder = JpegEncoder::new_with_quality(&mut bytes, self.deepzoom.jpeg_quality);
                encoder.encode(tile.as_raw(), tile.width(), tile.height(), ColorType::Rgb8)?;
                Ok(bytes)
            }
            TileFormat::Png => encode_png(&DynamicImage::ImageRgb8(tile.clone())),
        }
    }

    // ========================================================================
    // Integrity
    // ========================================================================

    /// Whether every level directory holds at least the expected tiles.
    /// False when the slide cannot be opened.
    pub fn tiles_complete(&self, slide: &Slide) -> bool {
        let Ok(dimensions) = read_dimensions(&self.slide_path(slide)) else {
            return false;
        };
        let geometry = DeepZoomGeometry::new(
            dimensions,
            self.deepzoom.tile_size,
            self.deepzoom.overlap,
        );
        self.tiles_present(slide, &geometry)
    }

    fn tiles_present(&self, slide: &Slide, geometry: &DeepZoomGeometry) -> bool {
        let tiles_dir = self.tiles_dir(slide);
        let ext = self.deepzoom.format.extension();

        geometry
            .level_tiles()
            .iter()
            .enumerate()
            .all(|(level, &(cols, rows))| {
                let Ok(entries) = std::fs::read_dir(tiles_dir.join(level.to_string())) else {
                    return false;
                };
                let present: HashSet<String> = entries
                    .flatten()
                    .map(|e| e.file_name().to_string_lossy().to_string())
                    .collect();
                (0..rows).all(|row| {
                    (0..cols).all(|col| present.contains(&format!("{}_{}.{}", col, row, ext)))
                })
            })
    }

    /// Check the original file, every derived image and the stored metadata
    pub fn check_integrity(&self, slide: &Slide) -> IntegrityStatus {
        IntegrityStatus::new(
            self.slide_path(slide).is_file(),
            self.dzi_path(slide).is_file(),
            self.tiles_complete(slide),
            self.thumbnail_path(slide).is_file(),
            self.associated_image_path(slide).is_file(),
            slide.metadata_valid(),
        )
    }
}

/// Keep the final path component and replace anything outside
/// `[A-Za-z0-9._-]` with `_`
pub fn sanitize_file_name(file_name: &str) -> String {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(file_name)
        .trim_start_matches('.');
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "slide".to_string()
    } else {
        cleaned
    }
}

fn with_random_suffix(name: &str) -> String {
    let suffix = &uuid::Uuid::new_v4().simple().to_string()[..7];
    match name.split_once('.') {
        Some((stem, ext)) => format!("{}_{}.{}", stem, suffix, ext),
        None => format!("{}_{}", name, suffix),
    }
}

fn name_taken(path: &Path) -> bool {
    path.exists() || !sidecar_paths(path).is_empty()
}

fn remove_if_present(path: &Path) -> SlideResult<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}

fn encode_png(image: &DynamicImage) -> SlideResult<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    image.write_to(&mut cursor, ImageOutputFormat::Png)?;
    Ok(cursor.into_inner())
}

/// Write through a temporary file in the target directory, then rename
fn write_atomic(path: &Path, data: &[u8]) -> SlideResult<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    temp.write_all(data)?;
    temp.persist(path).map_err(|e| SlideError::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb, Rgba, RgbaImage};

    struct Fixture {
        _dir: tempfile::TempDir,
        store: SlideStore,
        slide: Slide,
    }

    /// A 600x300 PNG slide with a macro image and vendor properties
    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = SlideStore::new(dir.path(), DeepZoomConfig::default());

        let image: RgbaImage = ImageBuffer::from_fn(600, 300, |x, _| {
            if x < 300 {
                Rgba([200, 0, 0, 255])
            } else {
                Rgba([0, 0, 0, 0])
            }
        });
        let mut png = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(image)
            .write_to(&mut png, ImageOutputFormat::Png)
            .unwrap();
        let mut macro_png = Cursor::new(Vec::new());
        let macro_image: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::from_pixel(30, 10, Rgb([0, 0, 255]));
        DynamicImage::ImageRgb8(macro_image)
            .write_to(&mut macro_png, ImageOutputFormat::Png)
            .unwrap();

        let upload = SlideUpload {
            properties: Some(
                "openslide.mpp-x = 0.25\nopenslide.mpp-y = 0.26\nhamamatsu.SourceLens = 20\nhamamatsu.Created = 2020/01/01\n"
                    .to_string(),
            ),
            associated: vec![AssociatedUpload {
                name: ASSOCIATED_MACRO.to_string(),
                data: macro_png.into_inner(),
            }],
            ..SlideUpload::new("CMU 1.png", png.into_inner())
        };
        let file = store.save_upload(&upload).unwrap();

        let mut slide = Slide::new("CMU-1".to_string(), file, None);
        slide.id = 12;
        slide.image_root = Slide::image_root_for(12);
        Fixture {
            _dir: dir,
            store,
            slide,
        }
    }

    #[test]
    fn test_save_upload_sanitizes_and_never_overwrites() {
        let fx = fixture();
        assert_eq!(fx.slide.file, "slides/CMU_1.png");

        let second = fx
            .store
            .save_upload(&SlideUpload::new("CMU 1.png", b"other".to_vec()))
            .unwrap();
        assert_ne!(second, fx.slide.file);
        assert!(second.starts_with("slides/CMU_1_"));
        assert!(second.ends_with(".png"));
    }

    #[test]
    fn test_sidecars_follow_the_stored_name() {
        let fx = fixture();
        let slides_dir = fx.store.media_root().join("slides");
        assert!(slides_dir.join("CMU_1.png.properties").is_file());
        assert!(slides_dir.join("CMU_1.png.macro.png").is_file());

        let upload = SlideUpload {
            properties: Some("openslide.mpp-x = 1\n".to_string()),
            ..SlideUpload::new("CMU 1.png", b"second".to_vec())
        };
        let second = fx.store.save_upload(&upload).unwrap();
        let second_path = fx.store.media_root().join(&second);
        let mut properties = second_path.clone().into_os_string();
        properties.push(".properties");
        assert_eq!(std::fs::read_to_string(properties).unwrap(), "openslide.mpp-x = 1\n");

        let bad = SlideUpload {
            associated: vec![AssociatedUpload {
                name: "label".to_string(),
                data: b"not an image".to_vec(),
            }],
            ..SlideUpload::new("other.png", b"third".to_vec())
        };
        assert!(matches!(
            fx.store.save_upload(&bad),
            Err(SlideError::InvalidAssociatedImage(ref name)) if name == "label"
        ));
    }

    #[test]
    fn test_delete_file_removes_sidecars() {
        let fx = fixture();
        fx.store.delete_file(&fx.slide).unwrap();
        let left: Vec<_> = std::fs::read_dir(fx.store.media_root().join("slides"))
            .unwrap()
            .flatten()
            .collect();
        assert!(left.is_empty());

        // a fresh upload under the same name starts without vendor data
        let file = fx
            .store
            .save_upload(&SlideUpload::new("CMU 1.png", b"new".to_vec()))
            .unwrap();
        assert_eq!(file, "slides/CMU_1.png");
        assert!(sidecar_paths(&fx.store.media_root().join(&file)).is_empty());
    }

    #[test]
    fn test_orphaned_sidecar_name_is_not_reused() {
        let fx = fixture();
        std::fs::remove_file(fx.store.slide_path(&fx.slide)).unwrap();
        let file = fx
            .store
            .save_upload(&SlideUpload::new("CMU 1.png", b"new".to_vec()))
            .unwrap();
        assert_ne!(file, "slides/CMU_1.png");
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\scans\\a b.svs"), "a_b.svs");
        assert_eq!(sanitize_file_name(".hidden"), "hidden");
        assert_eq!(sanitize_file_name(""), "slide");
    }

    #[test]
    fn test_generate_images_layout() {
        let fx = fixture();
        fx.store.generate_images(&fx.slide).unwrap();

        let dzi = std::fs::read_to_string(fx.store.dzi_path(&fx.slide)).unwrap();
        assert!(dzi.contains(r#"<Size Width="600" Height="300"/>"#));

        let top = fx.store.tile_path(&fx.slide, 10, 2, 1, TileFormat::Jpeg);
        assert!(top.ends_with("images/12/image_files/10/2_1.jpeg"));
        assert!(top.is_file());

        let thumbnail = image::open(fx.store.thumbnail_path(&fx.slide)).unwrap();
        assert_eq!((thumbnail.width(), thumbnail.height()), (256, 256));

        let associated = image::open(fx.store.associated_image_path(&fx.slide)).unwrap();
        assert_eq!(associated.width(), 30);

        let status = fx.store.check_integrity(&fx.slide);
        assert!(status.tiles_complete);
        assert!(!status.metadata_valid);
        assert!(!status.images_incomplete());
    }

    #[test]
    fn test_transparent_pixels_become_white() {
        let fx = fixture();
        fx.store.generate_images(&fx.slide).unwrap();
        let tile = image::open(fx.store.tile_path(&fx.slide, 10, 2, 0, TileFormat::Jpeg))
            .unwrap()
            .into_rgb8();
        let pixel = tile.get_pixel(40, 40);
        assert!(pixel.0.iter().all(|&c| c > 240));
    }

    #[test]
    fn test_missing_macro_fails_generation() {
        let fx = fixture();
        std::fs::remove_file(fx.store.media_root().join("slides/CMU_1.png.macro.png")).unwrap();
        let err = fx.store.generate_images(&fx.slide).unwrap_err();
        assert!(err.to_string().starts_with("Failed to generate images: "));
    }

    #[test]
    fn test_read_metadata() {
        let fx = fixture();
        let metadata = fx.store.read_metadata(&fx.slide).unwrap();
        assert_eq!(metadata.mpp_y, 0.26);
        assert_eq!(metadata.source_lens, 20);

        std::fs::write(
            fx.store.media_root().join("slides/CMU_1.png.properties"),
            "openslide.mpp-x = 0.25\n",
        )
        .unwrap();
        let err = fx.store.read_metadata(&fx.slide).unwrap_err();
        assert!(err.to_string().starts_with("Failed to save metadata: "));
    }

    #[test]
    fn test_tiles_incomplete_after_deleting_one() {
        let fx = fixture();
        fx.store.generate_images(&fx.slide).unwrap();
        std::fs::remove_file(fx.store.tile_path(&fx.slide, 5, 0, 0, TileFormat::Jpeg)).unwrap();
        assert!(!fx.store.tiles_complete(&fx.slide));

        fx.store.delete_images(&fx.slide).unwrap();
        let status = fx.store.check_integrity(&fx.slide);
        assert!(status.file_exists);
        assert!(!status.dzi_exists);
        assert!(status.needs_repair);
    }

    #[test]
    fn test_missing_file() {
        let fx = fixture();
        fx.store.delete_file(&fx.slide).unwrap();
        fx.store.delete_file(&fx.slide).unwrap();
        let status = fx.store.check_integrity(&fx.slide);
        assert!(!status.file_exists);
        assert!(!status.tiles_complete);
    }
}

//! Slide decoding
//!
//! [`SlideReader`] is the seam between pyramid generation and the decoder.
//! [`ImageSlide`] decodes single-resolution TIFF, PNG and JPEG files with the
//! `image` crate. Vendor properties and associated images are read from
//! sidecar files next to the slide:
//!
//! - `<file>.properties`: `key = value` lines
//! - `<file>.<name>.png` / `<file>.<name>.jpg`: associated image `<name>`
//!
//! Uploads bring these sidecars along and the store writes them next to the
//! saved original.

use image::{imageops, DynamicImage, ImageFormat, Rgba, RgbaImage};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::{SlideError, SlideResult};

/// Name of the slide overview image
pub const ASSOCIATED_MACRO: &str = "macro";

/// Read access to a whole-slide image
pub trait SlideReader: Send + Sync {
    /// Level 0 dimensions
    fn dimensions(&self) -> (u32, u32);

    /// Read a region in level 0 coordinates. Pixels outside the slide are
    /// transparent.
    fn read_region(&self, x: u32, y: u32, width: u32, height: u32) -> RgbaImage;

    /// Vendor and decoder properties
    fn properties(&self) -> &HashMap<String, String>;

    /// Names of the available associated images
    fn associated_image_names(&self) -> Vec<String>;

    fn associated_image(&self, name: &str) -> SlideResult<DynamicImage>;

    /// Whole slide fitted within `max_width` x `max_height`, aspect preserved
    fn thumbnail(&self, max_width: u32, max_height: u32) -> DynamicImage;
}

/// Slide decoded into memory by the `image` crate
pub struct ImageSlide {
    image: RgbaImage,
    properties: HashMap<String, String>,
    associated: HashMap<String, PathBuf>,
}

impl ImageSlide {
    pub fn open(path: &Path) -> SlideResult<Self> {
        let open_error = |message: String| SlideError::Open {
            path: path.display().to_string(),
            message,
        };

        let mut reader = image::io::Reader::open(path)
            .map_err(|e| open_error(e.to_string()))?
            .with_guessed_format()
            .map_err(|e| open_error(e.to_string()))?;
        reader.no_limits();
        let image = reader
            .decode()
            .map_err(|e| open_error(e.to_string()))?
            .into_rgba8();

        let mut properties = read_properties(&sidecar(path, "properties"))?;
        properties.insert("openslide.level-count".to_string(), "1".to_string());
        properties.insert(
            "openslide.level[0].width".to_string(),
            image.width().to_string(),
        );
        properties.insert(
            "openslide.level[0].height".to_string(),
            image.height().to_string(),
        );

        Ok(Self {
            image,
            properties,
            associated: find_associated_images(path),
        })
    }

    /// Build a slide from an already decoded image, without sidecars
    pub fn from_image(image: RgbaImage, properties: HashMap<String, String>) -> Self {
        Self {
            image,
            properties,
            associated: HashMap::new(),
        }
    }
}

impl SlideReader for ImageSlide {
    fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    fn read_region(&self, x: u32, y: u32, width: u32, height: u32) -> RgbaImage {
        let (w, h) = self.image.dimensions();
        let mut region = RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 0]));
        if x >= w || y >= h {
            return region;
        }
        let copy_w = width.min(w - x);
        let copy_h = height.min(h - y);
        let view = imageops::crop_imm(&self.image, x, y, copy_w, copy_h).to_image();
        imageops::replace(&mut region, &view, 0, 0);
        region
    }

    fn properties(&self) -> &HashMap<String, String> {
        &self.properties
    }

    fn associated_image_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.associated.keys().cloned().collect();
        names.sort();
        names
    }

    fn associated_image(&self, name: &str) -> SlideResult<DynamicImage> {
        let path = self
            .associated
            .get(name)
            .ok_or_else(|| SlideError::AssociatedImageMissing(name.to_string()))?;
        Ok(image::open(path)?)
    }

    fn thumbnail(&self, max_width: u32, max_height: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(self.image.clone()).thumbnail(max_width, max_height)
    }
}

/// Level 0 dimensions from the file header, without decoding pixels
pub fn read_dimensions(path: &Path) -> SlideResult<(u32, u32)> {
    let open_error = |message: String| SlideError::Open {
        path: path.display().to_string(),
        message,
    };
    image::io::Reader::open(path)
        .map_err(|e| open_error(e.to_string()))?
        .with_guessed_format()
        .map_err(|e| open_error(e.to_string()))?
        .into_dimensions()
        .map_err(|e| open_error(e.to_string()))
}

/// Sidecar extension for an associated image, from its encoded bytes
pub fn associated_image_extension(data: &[u8]) -> Option<&'static str> {
    match image::guess_format(data) {
        Ok(ImageFormat::Png) => Some("png"),
        Ok(ImageFormat::Jpeg) => Some("jpg"),
        _ => None,
    }
}

/// `<path>.<suffix>`
pub(crate) fn sidecar(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

/// Parse `key = value` lines; blank lines and `#` comments are skipped.
/// A missing file yields no properties.
fn read_properties(path: &Path) -> SlideResult<HashMap<String, String>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
        Err(e) => return Err(e.into()),
    };
    Ok(parse_properties(&content))
}

pub(crate) fn parse_properties(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .collect()
}

/// Every sidecar file present for the slide at `path`
pub(crate) fn sidecar_paths(path: &Path) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = find_associated_images(path).into_values().collect();
    let properties = sidecar(path, "properties");
    if properties.is_file() {
        paths.push(properties);
    }
    paths.sort();
    paths
}

fn find_associated_images(path: &Path) -> HashMap<String, PathBuf> {
    let mut found = HashMap::new();
    let (Some(dir), Some(file_name)) = (path.parent(), path.file_name()) else {
        return found;
    };
    let prefix = format!("{}.", file_name.to_string_lossy());

    let Ok(entries) = std::fs::read_dir(dir) else {
        return found;
    };
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        let Some(rest) = name.strip_prefix(&prefix) else {
            continue;
        };
        for ext in ["png", "jpg", "jpeg"] {
            if let Some(assoc) = rest.strip_suffix(&format!(".{}", ext)) {
                if !assoc.is_empty() && !assoc.contains('.') {
                    found.insert(assoc.to_string(), entry.path());
                }
            }
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    fn write_png(path: &Path, width: u32, height: u32, color: [u8; 3]) {
        let img: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::from_pixel(width, height, Rgb(color));
        img.save(path).unwrap();
    }

    #[test]
    fn test_parse_properties() {
        let props = parse_properties(
            "# scanner dump\nopenslide.mpp-x = 0.25\n\nhamamatsu.Created=2020/01/02\nbroken line\n",
        );
        assert_eq!(props.get("openslide.mpp-x").map(String::as_str), Some("0.25"));
        assert_eq!(props.get("hamamatsu.Created").map(String::as_str), Some("2020/01/02"));
        assert_eq!(props.len(), 2);
    }

    #[test]
    fn test_open_with_sidecars() {
        let dir = tempfile::tempdir().unwrap();
        let slide_path = dir.path().join("sample.png");
        write_png(&slide_path, 40, 30, [200, 10, 10]);
        write_png(&dir.path().join("sample.png.macro.png"), 8, 4, [0, 0, 255]);
        std::fs::write(
            dir.path().join("sample.png.properties"),
            "openslide.mpp-x = 0.5\n",
        )
        .unwrap();

        let slide = ImageSlide::open(&slide_path).unwrap();
        assert_eq!(slide.dimensions(), (40, 30));
        assert_eq!(slide.properties()["openslide.mpp-x"], "0.5");
        assert_eq!(slide.properties()["openslide.level[0].width"], "40");
        assert_eq!(slide.associated_image_names(), vec!["macro"]);
        assert_eq!(slide.associated_image("macro").unwrap().width(), 8);
        assert!(matches!(
            slide.associated_image("label"),
            Err(SlideError::AssociatedImageMissing(_))
        ));
    }

    #[test]
    fn test_read_dimensions_and_sidecar_paths() {
        let dir = tempfile::tempdir().unwrap();
        let slide_path = dir.path().join("scan.png");
        write_png(&slide_path, 64, 48, [10, 10, 10]);
        assert_eq!(read_dimensions(&slide_path).unwrap(), (64, 48));
        assert!(sidecar_paths(&slide_path).is_empty());

        write_png(&dir.path().join("scan.png.label.jpg"), 4, 4, [0, 0, 0]);
        std::fs::write(dir.path().join("scan.png.properties"), "a = b\n").unwrap();
        // belongs to another slide
        std::fs::write(dir.path().join("scan.png.old.properties"), "").unwrap();
        let names: Vec<String> = sidecar_paths(&slide_path)
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["scan.png.label.jpg", "scan.png.properties"]);

        assert!(matches!(
            read_dimensions(&dir.path().join("missing.png")),
            Err(SlideError::Open { .. })
        ));
    }

    #[test]
    fn test_associated_image_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("macro.png");
        write_png(&path, 2, 2, [1, 2, 3]);
        assert_eq!(associated_image_extension(&std::fs::read(&path).unwrap()), Some("png"));
        assert_eq!(associated_image_extension(b"not an image"), None);
    }

    #[test]
    fn test_open_missing_file() {
        let result = ImageSlide::open(Path::new("/nonexistent/slide.tif"));
        assert!(matches!(result, Err(SlideError::Open { .. })));
    }

    #[test]
    fn test_read_region_pads_outside_with_transparency() {
        let image = RgbaImage::from_pixel(10, 10, Rgba([1, 2, 3, 255]));
        let slide = ImageSlide::from_image(image, HashMap::new());

        let region = slide.read_region(8, 8, 4, 4);
        assert_eq!(region.dimensions(), (4, 4));
        assert_eq!(region.get_pixel(0, 0), &Rgba([1, 2, 3, 255]));
        assert_eq!(region.get_pixel(3, 3), &Rgba([0, 0, 0, 0]));

        let outside = slide.read_region(20, 0, 2, 2);
        assert_eq!(outside.get_pixel(0, 0)[3], 0);
    }

    #[test]
    fn test_thumbnail_preserves_aspect() {
        let slide = ImageSlide::from_image(RgbaImage::new(1000, 500), HashMap::new());
        let thumb = slide.thumbnail(256, 256);
        assert_eq!(thumb.width(), 256);
        assert_eq!(thumb.height(), 128);
    }
}

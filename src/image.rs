use crate::error::FolioError;
use crate::pdf::flate_compress;
use base64::Engine;
use image::{DynamicImage, GenericImageView, ImageFormat};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub type Fingerprint = [u8; 32];

/// Anything an image can be drawn from.
#[derive(Debug, Clone)]
pub enum ImageSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
    Decoded(DynamicImage),
}

impl ImageSource {
    /// Interprets `data:` URIs as inline bytes and anything else as a path.
    pub fn from_locator(locator: &str) -> Result<Self, FolioError> {
        match parse_data_uri(locator) {
            Some(result) => result.map(ImageSource::Bytes),
            None => Ok(ImageSource::Path(PathBuf::from(locator))),
        }
    }
}

impl From<PathBuf> for ImageSource {
    fn from(path: PathBuf) -> Self {
        ImageSource::Path(path)
    }
}

impl From<&Path> for ImageSource {
    fn from(path: &Path) -> Self {
        ImageSource::Path(path.to_path_buf())
    }
}

impl From<Vec<u8>> for ImageSource {
    fn from(data: Vec<u8>) -> Self {
        ImageSource::Bytes(data)
    }
}

impl From<DynamicImage> for ImageSource {
    fn from(image: DynamicImage) -> Self {
        ImageSource::Decoded(image)
    }
}

fn parse_data_uri(uri: &str) -> Option<Result<Vec<u8>, FolioError>> {
    let rest = uri.strip_prefix("data:")?;
    let Some((header, payload)) = rest.split_once(',') else {
        return Some(Err(FolioError::UnsupportedImageFormat(
            "malformed data URI".to_string(),
        )));
    };
    if !header.split(';').any(|part| part == "base64") {
        return Some(Ok(payload.as_bytes().to_vec()));
    }
    Some(
        base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|err| FolioError::UnsupportedImageFormat(format!("data URI: {err}"))),
    )
}

/// Encoded formats the registry can decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Png,
    Jpeg,
    Gif,
    Bmp,
}

impl ImageKind {
    /// Decoder order used when sniffing fails or the sniffed decoder rejects the data.
    pub const ALL: [ImageKind; 4] = [ImageKind::Png, ImageKind::Jpeg, ImageKind::Gif, ImageKind::Bmp];

    pub fn sniff(data: &[u8]) -> Option<ImageKind> {
        if data.starts_with(b"\x89PNG\r\n\x1a\n") {
            Some(ImageKind::Png)
        } else if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(ImageKind::Jpeg)
        } else if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
            Some(ImageKind::Gif)
        } else if data.starts_with(b"BM") {
            Some(ImageKind::Bmp)
        } else {
            None
        }
    }

    fn format(self) -> ImageFormat {
        match self {
            ImageKind::Png => ImageFormat::Png,
            ImageKind::Jpeg => ImageFormat::Jpeg,
            ImageKind::Gif => ImageFormat::Gif,
            ImageKind::Bmp => ImageFormat::Bmp,
        }
    }

    fn decode_order(data: &[u8]) -> Vec<ImageKind> {
        let mut order = Vec::with_capacity(Self::ALL.len());
        if let Some(kind) = Self::sniff(data) {
            order.push(kind);
        }
        for kind in Self::ALL {
            if !order.contains(&kind) {
                order.push(kind);
            }
        }
        order
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorMode {
    Gray,
    Rgb,
    Cmyk,
}

impl ColorMode {
    pub fn pdf_name(self) -> &'static str {
        match self {
            ColorMode::Gray => "/DeviceGray",
            ColorMode::Rgb => "/DeviceRGB",
            ColorMode::Cmyk => "/DeviceCMYK",
        }
    }

    fn tag(self) -> u8 {
        match self {
            ColorMode::Gray => 1,
            ColorMode::Rgb => 3,
            ColorMode::Cmyk => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFilter {
    Dct,
    Flate,
    Raw,
}

impl ImageFilter {
    pub fn pdf_name(self) -> Option<&'static str> {
        match self {
            ImageFilter::Dct => Some("/DCTDecode"),
            ImageFilter::Flate => Some("/FlateDecode"),
            ImageFilter::Raw => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SoftMask {
    pub data: Vec<u8>,
    pub filter: ImageFilter,
}

/// An image as it will be embedded: one XObject, plus an optional soft mask.
#[derive(Debug, Clone)]
pub struct ImageResource {
    index: usize,
    width: u32,
    height: u32,
    color_mode: ColorMode,
    bits_per_component: u8,
    filter: ImageFilter,
    data: Vec<u8>,
    smask: Option<SoftMask>,
    decode: Option<&'static str>,
    fingerprint: Fingerprint,
}

impl ImageResource {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn resource_name(&self) -> String {
        format!("I{}", self.index)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn color_mode(&self) -> ColorMode {
        self.color_mode
    }

    pub fn bits_per_component(&self) -> u8 {
        self.bits_per_component
    }

    pub fn filter(&self) -> ImageFilter {
        self.filter
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn smask(&self) -> Option<&SoftMask> {
        self.smask.as_ref()
    }

    pub fn decode(&self) -> Option<&'static str> {
        self.decode
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }
}

/// What `register_image` hands back to a drawing call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageHandle {
    pub index: usize,
    pub width: u32,
    pub height: u32,
    pub reused: bool,
}

#[derive(Debug, Default)]
pub struct ImageRegistry {
    images: Vec<ImageResource>,
    by_fingerprint: HashMap<Fingerprint, usize>,
    by_source: HashMap<Fingerprint, usize>,
}

impl ImageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an image, reusing an existing resource when its decoded pixels
    /// match. `compress` only affects images that are encoded by this call.
    pub fn register_image(
        &mut self,
        source: ImageSource,
        compress: bool,
    ) -> Result<ImageHandle, FolioError> {
        match source {
            ImageSource::Path(path) => {
                let data = std::fs::read(&path)?;
                self.register_encoded(data, &path.display().to_string(), compress)
            }
            ImageSource::Bytes(data) => self.register_encoded(data, "in-memory image", compress),
            ImageSource::Decoded(image) => self.register_decoded(&image, None, compress),
        }
    }

    fn register_encoded(
        &mut self,
        data: Vec<u8>,
        label: &str,
        compress: bool,
    ) -> Result<ImageHandle, FolioError> {
        let source_key: Fingerprint = Sha256::digest(&data).into();
        if let Some(&slot) = self.by_source.get(&source_key) {
            log::debug!("image {label} matches an already embedded byte stream");
            return Ok(self.handle(slot, true));
        }

        let (decoded, kind) = decode_with_fallback(&data, label)?;
        let jpeg = (kind == ImageKind::Jpeg).then_some(data);
        let handle = self.register_decoded(&decoded, jpeg, compress)?;
        self.by_source.insert(source_key, handle.index - 1);
        Ok(handle)
    }

    fn register_decoded(
        &mut self,
        image: &DynamicImage,
        jpeg: Option<Vec<u8>>,
        compress: bool,
    ) -> Result<ImageHandle, FolioError> {
        let pixels = CanonicalPixels::from_image(image);
        let fingerprint = pixels.fingerprint();
        if let Some(&slot) = self.by_fingerprint.get(&fingerprint) {
            log::debug!("image content already embedded as I{}", slot + 1);
            return Ok(self.handle(slot, true));
        }

        let index = self.images.len() + 1;
        let resource = match jpeg {
            Some(bytes) => encode_jpeg_passthrough(index, &pixels, bytes, fingerprint)?,
            None => encode_pixels(index, pixels, compress, fingerprint),
        };
        log::debug!(
            "embedded image I{} ({}x{}, {:?}, {:?})",
            index,
            resource.width,
            resource.height,
            resource.color_mode,
            resource.filter
        );
        self.by_fingerprint.insert(fingerprint, self.images.len());
        self.images.push(resource);
        Ok(self.handle(index - 1, false))
    }

    fn handle(&self, slot: usize, reused: bool) -> ImageHandle {
        let image = &self.images[slot];
        ImageHandle {
            index: image.index,
            width: image.width,
            height: image.height,
            reused,
        }
    }

    pub fn get(&self, index: usize) -> Option<&ImageResource> {
        index.checked_sub(1).and_then(|slot| self.images.get(slot))
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ImageResource> {
        self.images.iter()
    }
}

fn decode_with_fallback(data: &[u8], label: &str) -> Result<(DynamicImage, ImageKind), FolioError> {
    let mut last_error = None;
    for kind in ImageKind::decode_order(data) {
        match image::load_from_memory_with_format(data, kind.format()) {
            Ok(image) => return Ok((image, kind)),
            Err(err) => last_error = Some(format!("{kind:?}: {err}")),
        }
    }
    Err(FolioError::UnsupportedImageFormat(format!(
        "{label}: no decoder accepted the data ({})",
        last_error.unwrap_or_else(|| "empty input".to_string())
    )))
}

/// 8-bit pixels in the layout they are embedded with. Equal values mean equal content.
struct CanonicalPixels {
    width: u32,
    height: u32,
    mode: ColorMode,
    pixels: Vec<u8>,
    alpha: Option<Vec<u8>>,
}

impl CanonicalPixels {
    fn from_image(image: &DynamicImage) -> Self {
        let (width, height) = image.dimensions();
        let color = image.color();
        let gray = matches!(
            color,
            image::ColorType::L8
                | image::ColorType::L16
                | image::ColorType::La8
                | image::ColorType::La16
        );
        let channels = if gray { 1 } else { 3 };

        if !color.has_alpha() {
            let pixels = if gray {
                image.to_luma8().into_raw()
            } else {
                image.to_rgb8().into_raw()
            };
            return Self {
                width,
                height,
                mode: if gray { ColorMode::Gray } else { ColorMode::Rgb },
                pixels,
                alpha: None,
            };
        }

        let with_alpha = if gray {
            image.to_luma_alpha8().into_raw()
        } else {
            image.to_rgba8().into_raw()
        };
        let mut pixels = Vec::with_capacity((width * height * channels) as usize);
        let mut alpha = Vec::with_capacity((width * height) as usize);
        for px in with_alpha.chunks_exact(channels as usize + 1) {
            pixels.extend_from_slice(&px[..channels as usize]);
            alpha.push(px[channels as usize]);
        }
        let opaque = alpha.iter().all(|a| *a == 255);
        Self {
            width,
            height,
            mode: if gray { ColorMode::Gray } else { ColorMode::Rgb },
            pixels,
            alpha: if opaque { None } else { Some(alpha) },
        }
    }

    fn fingerprint(&self) -> Fingerprint {
        let mut hasher = Sha256::new();
        hasher.update(self.width.to_be_bytes());
        hasher.update(self.height.to_be_bytes());
        hasher.update([self.mode.tag()]);
        hasher.update(&self.pixels);
        match &self.alpha {
            Some(alpha) => {
                hasher.update([1]);
                hasher.update(alpha);
            }
            None => hasher.update([0]),
        }
        hasher.finalize().into()
    }
}

fn encode_pixels(
    index: usize,
    pixels: CanonicalPixels,
    compress: bool,
    fingerprint: Fingerprint,
) -> ImageResource {
    let (filter, data) = if compress {
        (ImageFilter::Flate, flate_compress(&pixels.pixels))
    } else {
        (ImageFilter::Raw, pixels.pixels)
    };
    let smask = pixels.alpha.map(|alpha| {
        if compress {
            SoftMask {
                data: flate_compress(&alpha),
                filter: ImageFilter::Flate,
            }
        } else {
            SoftMask {
                data: alpha,
                filter: ImageFilter::Raw,
            }
        }
    });
    ImageResource {
        index,
        width: pixels.width,
        height: pixels.height,
        color_mode: pixels.mode,
        bits_per_component: 8,
        filter,
        data,
        smask,
        decode: None,
        fingerprint,
    }
}

fn encode_jpeg_passthrough(
    index: usize,
    pixels: &CanonicalPixels,
    bytes: Vec<u8>,
    fingerprint: Fingerprint,
) -> Result<ImageResource, FolioError> {
    let (color_mode, decode) = match jpeg_component_count(&bytes) {
        Some(1) => (ColorMode::Gray, None),
        Some(3) => (ColorMode::Rgb, None),
        // Adobe writes CMYK JPEGs inverted.
        Some(4) => (ColorMode::Cmyk, Some("[1 0 1 0 1 0 1 0]")),
        other => {
            return Err(FolioError::UnsupportedImageFormat(format!(
                "JPEG with {} colour components",
                other.map(|n| n.to_string()).unwrap_or_else(|| "unknown".to_string())
            )));
        }
    };
    Ok(ImageResource {
        index,
        width: pixels.width,
        height: pixels.height,
        color_mode,
        bits_per_component: 8,
        filter: ImageFilter::Dct,
        data: bytes,
        smask: None,
        decode,
        fingerprint,
    })
}

/// Reads the component count from the first SOFn segment.
fn jpeg_component_count(data: &[u8]) -> Option<u8> {
    let mut pos = 2;
    while pos + 4 <= data.len() {
        if data[pos] != 0xFF {
            return None;
        }
        let marker = data[pos + 1];
        if marker == 0xFF {
            pos += 1;
            continue;
        }
        let length = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
        let is_sof = (0xC0..=0xCF).contains(&marker) && !matches!(marker, 0xC4 | 0xC8 | 0xCC);
        if is_sof {
            return data.get(pos + 9).copied();
        }
        pos += 2 + length;
    }
    None
}


#[cfg(test)]
mod tests {
    use super::test_images::{encode, sample_rgb};
    use super::*;
    use image::{Frame, Rgba, RgbaImage};

    #[test]
    fn path_and_bytes_share_one_resource() {
        let dir = tempfile::tempdir().unwrap();
        let png = encode(&sample_rgb(), ImageFormat::Png);
        let path = dir.path().join("insert.png");
        std::fs::write(&path, &png).unwrap();

        let mut registry = ImageRegistry::new();
        let by_path = registry.register_image(ImageSource::Path(path), true).unwrap();
        let by_bytes = registry.register_image(ImageSource::Bytes(png), true).unwrap();
        let decoded = registry
            .register_image(ImageSource::Decoded(sample_rgb()), true)
            .unwrap();

        assert!(!by_path.reused);
        assert!(by_bytes.reused);
        assert!(decoded.reused);
        assert_eq!(by_path.index, by_bytes.index);
        assert_eq!(by_path.index, decoded.index);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn lossless_reencodings_dedupe() {
        let image = sample_rgb();
        let mut registry = ImageRegistry::new();
        let png = registry
            .register_image(encode(&image, ImageFormat::Png).into(), false)
            .unwrap();
        let bmp = registry
            .register_image(encode(&image, ImageFormat::Bmp).into(), false)
            .unwrap();
        assert_eq!(png.index, bmp.index);
        assert_eq!((bmp.width, bmp.height), (8, 6));
    }

    #[test]
    fn jpeg_keeps_dct_stream() {
        let jpeg = encode(&sample_rgb(), ImageFormat::Jpeg);
        let mut registry = ImageRegistry::new();
        let handle = registry.register_image(jpeg.clone().into(), true).unwrap();
        let resource = registry.get(handle.index).unwrap();
        assert_eq!(resource.filter(), ImageFilter::Dct);
        assert_eq!(resource.color_mode(), ColorMode::Rgb);
        assert_eq!(resource.data(), jpeg.as_slice());

        let decoded = image::load_from_memory(&jpeg).unwrap();
        let again = registry.register_image(decoded.into(), true).unwrap();
        assert_eq!(again.index, handle.index);
    }

    #[test]
    fn gif_embeds_first_frame_only() {
        let red = RgbaImage::from_pixel(4, 4, Rgba([255, 0, 0, 255]));
        let blue = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 255, 255]));
        let mut gif = Vec::new();
        {
            let mut encoder = image::codecs::gif::GifEncoder::new(&mut gif);
            encoder
                .encode_frames(vec![Frame::new(red.clone()), Frame::new(blue)])
                .unwrap();
        }

        let mut registry = ImageRegistry::new();
        let animated = registry.register_image(gif.into(), true).unwrap();
        let first = registry
            .register_image(DynamicImage::ImageRgba8(red).into(), true)
            .unwrap();
        assert_eq!(animated.index, first.index);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn alpha_becomes_soft_mask() {
        let mut img = RgbaImage::from_pixel(2, 2, Rgba([10, 20, 30, 255]));
        img.put_pixel(0, 0, Rgba([10, 20, 30, 0]));
        let mut registry = ImageRegistry::new();
        let handle = registry
            .register_image(DynamicImage::ImageRgba8(img).into(), false)
            .unwrap();
        let resource = registry.get(handle.index).unwrap();
        let mask = resource.smask().unwrap();
        assert_eq!(mask.filter, ImageFilter::Raw);
        assert_eq!(mask.data, vec![0, 255, 255, 255]);
        assert_eq!(resource.data().len(), 12);
    }

    #[test]
    fn compression_applies_to_new_images_only() {
        let image = sample_rgb();
        let mut registry = ImageRegistry::new();
        let raw = registry.register_image(image.clone().into(), false).unwrap();
        let again = registry.register_image(image.into(), true).unwrap();
        assert_eq!(raw.index, again.index);
        assert_eq!(registry.get(raw.index).unwrap().filter(), ImageFilter::Raw);
    }

    #[test]
    fn gray_images_stay_gray() {
        let gray = DynamicImage::ImageLuma8(image::GrayImage::from_pixel(3, 3, image::Luma([90])));
        let mut registry = ImageRegistry::new();
        let handle = registry.register_image(gray.into(), true).unwrap();
        let resource = registry.get(handle.index).unwrap();
        assert_eq!(resource.color_mode(), ColorMode::Gray);
        assert_eq!(resource.filter(), ImageFilter::Flate);
    }

    #[test]
    fn undecodable_data_is_unsupported() {
        let mut registry = ImageRegistry::new();
        let err = registry
            .register_image(b"definitely not an image".to_vec().into(), true)
            .unwrap_err();
        assert!(matches!(err, FolioError::UnsupportedImageFormat(_)));
        assert!(registry.is_empty());
    }

    #[test]
    fn data_uri_locator_decodes_inline_bytes() {
        let png = encode(&sample_rgb(), ImageFormat::Png);
        let uri = format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&png)
        );
        let ImageSource::Bytes(bytes) = ImageSource::from_locator(&uri).unwrap() else {
            panic!("expected inline bytes");
        };
        assert_eq!(bytes, png);
        assert!(matches!(
            ImageSource::from_locator("picture.png").unwrap(),
            ImageSource::Path(_)
        ));
    }

    #[test]
    fn sniffing_orders_decoders() {
        assert_eq!(ImageKind::sniff(b"GIF89a...."), Some(ImageKind::Gif));
        assert_eq!(ImageKind::decode_order(b"BM..")[0], ImageKind::Bmp);
        assert_eq!(ImageKind::decode_order(b"????").len(), 4);
    }

    #[test]
    fn jpeg_component_count_reads_sof() {
        let jpeg = encode(&sample_rgb(), ImageFormat::Jpeg);
        assert_eq!(jpeg_component_count(&jpeg), Some(3));
        assert_eq!(jpeg_component_count(&[0xFF, 0xD8]), None);
    }
}

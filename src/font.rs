use crate::error::FolioError;
use crate::types::{FontStyle, Pt};
use once_cell::unsync::OnceCell;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Extension of the legacy pre-parsed metrics cache.
pub const METRICS_CACHE_EXTENSION: &str = "pkl";

const METRICS_CACHE_VERSION: u32 = 1;

/// The standard PDF fonts. Viewers provide them, so they are never embedded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CoreFont {
    Courier,
    CourierBold,
    CourierOblique,
    CourierBoldOblique,
    Helvetica,
    HelveticaBold,
    HelveticaOblique,
    HelveticaBoldOblique,
    TimesRoman,
    TimesBold,
    TimesItalic,
    TimesBoldItalic,
    Symbol,
    ZapfDingbats,
}

impl CoreFont {
    /// Looks up a built-in face. `family` is matched case-insensitively and
    /// underlining is ignored.
    pub fn lookup(family: &str, style: FontStyle) -> Option<CoreFont> {
        let family = normalize_family(family);
        let style = style.face();
        let font = match (family.as_str(), style.bold, style.italic) {
            ("courier", false, false) => CoreFont::Courier,
            ("courier", true, false) => CoreFont::CourierBold,
            ("courier", false, true) => CoreFont::CourierOblique,
            ("courier", true, true) => CoreFont::CourierBoldOblique,
            ("helvetica", false, false) => CoreFont::Helvetica,
            ("helvetica", true, false) => CoreFont::HelveticaBold,
            ("helvetica", false, true) => CoreFont::HelveticaOblique,
            ("helvetica", true, true) => CoreFont::HelveticaBoldOblique,
            ("times", false, false) => CoreFont::TimesRoman,
            ("times", true, false) => CoreFont::TimesBold,
            ("times", false, true) => CoreFont::TimesItalic,
            ("times", true, true) => CoreFont::TimesBoldItalic,
            ("symbol", false, false) => CoreFont::Symbol,
            ("zapfdingbats", false, false) => CoreFont::ZapfDingbats,
            _ => return None,
        };
        Some(font)
    }

    pub fn base_font(self) -> &'static str {
        match self {
            CoreFont::Courier => "Courier",
            CoreFont::CourierBold => "Courier-Bold",
            CoreFont::CourierOblique => "Courier-Oblique",
            CoreFont::CourierBoldOblique => "Courier-BoldOblique",
            CoreFont::Helvetica => "Helvetica",
            CoreFont::HelveticaBold => "Helvetica-Bold",
            CoreFont::HelveticaOblique => "Helvetica-Oblique",
            CoreFont::HelveticaBoldOblique => "Helvetica-BoldOblique",
            CoreFont::TimesRoman => "Times-Roman",
            CoreFont::TimesBold => "Times-Bold",
            CoreFont::TimesItalic => "Times-Italic",
            CoreFont::TimesBoldItalic => "Times-BoldItalic",
            CoreFont::Symbol => "Symbol",
            CoreFont::ZapfDingbats => "ZapfDingbats",
        }
    }

    /// Symbol and ZapfDingbats carry their own built-in encoding.
    pub fn is_symbolic(self) -> bool {
        matches!(self, CoreFont::Symbol | CoreFont::ZapfDingbats)
    }
}

pub fn is_builtin_font(family: &str, style: FontStyle) -> bool {
    CoreFont::lookup(family, style).is_some()
}

/// Maps common desktop font names onto the built-in family that replaces them.
pub fn builtin_alias(family: &str) -> Option<&'static str> {
    let compact: String = normalize_family(family)
        .chars()
        .filter(|ch| !matches!(ch, ' ' | '-' | '_'))
        .collect();
    match compact.as_str() {
        "arial" => Some("helvetica"),
        "couriernew" => Some("courier"),
        "timesnewroman" => Some("times"),
        _ => None,
    }
}

/// Where the glyph data of a font comes from.
#[derive(Debug, Clone)]
pub enum FontSource {
    File(PathBuf),
    Bytes(Vec<u8>),
    MetricsCache(PathBuf),
    MetricsCacheBytes(Vec<u8>),
}

impl FontSource {
    /// Picks the locator kind from the file extension.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let is_cache = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(METRICS_CACHE_EXTENSION));
        if is_cache {
            FontSource::MetricsCache(path)
        } else {
            FontSource::File(path)
        }
    }

    fn describe(&self) -> String {
        match self {
            FontSource::File(path) | FontSource::MetricsCache(path) => path.display().to_string(),
            FontSource::Bytes(_) => "in-memory font".to_string(),
            FontSource::MetricsCacheBytes(_) => "in-memory metrics cache".to_string(),
        }
    }

    fn load(&self) -> Result<LoadedFont, FolioError> {
        match self {
            FontSource::File(path) => Ok(LoadedFont {
                data: read_font_file(path)?,
                source_path: Some(path.clone()),
                metrics: None,
            }),
            FontSource::Bytes(data) => Ok(LoadedFont {
                data: data.clone(),
                source_path: None,
                metrics: None,
            }),
            FontSource::MetricsCache(path) => {
                let bytes = fs::read(path).map_err(FolioError::FontCacheNotFound)?;
                load_metrics_cache(&bytes)
            }
            FontSource::MetricsCacheBytes(bytes) => load_metrics_cache(bytes),
        }
    }
}

impl From<&Path> for FontSource {
    fn from(path: &Path) -> Self {
        FontSource::from_path(path)
    }
}

impl From<PathBuf> for FontSource {
    fn from(path: PathBuf) -> Self {
        FontSource::from_path(path)
    }
}

impl From<&str> for FontSource {
    fn from(path: &str) -> Self {
        FontSource::from_path(path)
    }
}

struct LoadedFont {
    data: Vec<u8>,
    source_path: Option<PathBuf>,
    metrics: Option<FontMetrics>,
}

fn read_font_file(path: &Path) -> Result<Vec<u8>, FolioError> {
    match fs::read(path) {
        Ok(data) => Ok(data),
        Err(err)
            if matches!(
                err.kind(),
                io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied
            ) =>
        {
            Err(FolioError::FontFileNotFound {
                kind: "TTF",
                path: path.to_string_lossy().into_owned(),
            })
        }
        Err(err) => Err(FolioError::Io(err)),
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct MetricsCacheFile {
    version: u32,
    family: String,
    style: String,
    font_file: PathBuf,
    metrics: FontMetrics,
}

fn load_metrics_cache(bytes: &[u8]) -> Result<LoadedFont, FolioError> {
    let cache: MetricsCacheFile = serde_json::from_slice(bytes)?;
    if cache.version != METRICS_CACHE_VERSION {
        return Err(FolioError::InvalidConfiguration(format!(
            "unsupported font metrics cache version {}",
            cache.version
        )));
    }
    Ok(LoadedFont {
        data: read_font_file(&cache.font_file)?,
        source_path: Some(cache.font_file),
        metrics: Some(cache.metrics),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FontProgramKind {
    TrueType,
    OpenTypeCff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecorationMetrics {
    pub position: i16,
    pub thickness: i16,
}

/// Metrics in glyph space (1/1000 em) for the WinAnsi code range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FontMetrics {
    pub first_char: u8,
    pub last_char: u8,
    pub widths: Vec<u16>,
    pub ascent: i16,
    pub descent: i16,
    pub line_gap: i16,
    pub cap_height: i16,
    pub italic_angle: i16,
    pub stem_v: i16,
    pub bbox: (i16, i16, i16, i16),
    pub underline: Option<DecorationMetrics>,
    pub missing_width: u16,
    pub is_fixed_pitch: bool,
    pub symbolic: bool,
}

impl FontMetrics {
    fn from_face(face: &ttf_parser::Face<'_>) -> Self {
        let units_per_em = face.units_per_em().max(1);
        let scale = 1000.0 / units_per_em as f32;
        let first_char = 32u8;
        let last_char = 255u8;
        let (symbolic, symbol_subtable) = select_symbol_subtable(face);
        let widths = build_widths(face, scale, first_char, last_char, symbol_subtable);
        let missing_width = widths
            .get((b' ' - first_char) as usize)
            .copied()
            .unwrap_or(0);

        let ascent = scale_i16(face.ascender(), scale);
        let descent = scale_i16(face.descender(), scale);
        let line_gap = scale_i16(face.line_gap(), scale);
        let cap_height = face
            .capital_height()
            .map(|value| scale_i16(value, scale))
            .unwrap_or(ascent);
        let underline = face.underline_metrics().map(|metrics| DecorationMetrics {
            position: scale_i16(metrics.position, scale),
            thickness: scale_i16(metrics.thickness, scale),
        });
        let bbox = face.global_bounding_box();
        let bbox = (
            scale_i16(bbox.x_min, scale),
            scale_i16(bbox.y_min, scale),
            scale_i16(bbox.x_max, scale),
            scale_i16(bbox.y_max, scale),
        );
        let italic_angle = face
            .italic_angle()
            .map(|value| value.round() as i16)
            .unwrap_or(0);

        Self {
            first_char,
            last_char,
            widths,
            ascent,
            descent,
            line_gap,
            cap_height,
            italic_angle,
            stem_v: 80,
            bbox,
            underline,
            missing_width,
            is_fixed_pitch: face.is_monospaced(),
            symbolic,
        }
    }

    fn advance_for_code(&self, code: u8) -> u16 {
        if code < self.first_char || code > self.last_char {
            return self.missing_width;
        }
        let idx = (code - self.first_char) as usize;
        self.widths.get(idx).copied().unwrap_or(self.missing_width)
    }

    pub fn measure(&self, font_size: Pt, text: &str) -> Pt {
        let total_units: i64 = encode_winansi(text)
            .into_iter()
            .map(|code| i64::from(self.advance_for_code(code)))
            .sum();
        if total_units <= 0 {
            return Pt::ZERO;
        }
        font_size.mul_ratio(total_units.min(i64::from(i32::MAX)) as i32, 1000)
    }

    /// PDF font descriptor flags.
    pub fn flags(&self, italic: bool) -> u32 {
        let mut flags = if self.symbolic { 4 } else { 32 };
        if self.is_fixed_pitch {
            flags |= 1;
        }
        if italic || self.italic_angle != 0 {
            flags |= 64;
        }
        flags
    }
}

/// An embedded font. Metrics are computed the first time they are needed
/// unless they came from a metrics cache.
#[derive(Debug)]
pub struct FontResource {
    family: String,
    style: FontStyle,
    index: usize,
    base_font: String,
    data: Vec<u8>,
    source_path: Option<PathBuf>,
    program_kind: FontProgramKind,
    metrics: OnceCell<FontMetrics>,
}

impl FontResource {
    pub fn family(&self) -> &str {
        &self.family
    }

    pub fn style(&self) -> FontStyle {
        self.style
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn resource_name(&self) -> String {
        format!("F{}", self.index)
    }

    pub fn base_font(&self) -> &str {
        &self.base_font
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    pub fn program_kind(&self) -> FontProgramKind {
        self.program_kind
    }

    pub fn metrics_loaded(&self) -> bool {
        self.metrics.get().is_some()
    }

    pub fn metrics(&self) -> Result<&FontMetrics, FolioError> {
        self.metrics.get_or_try_init(|| {
            let face = parse_face(&self.data, &self.family)?;
            Ok(FontMetrics::from_face(&face))
        })
    }
}

type FontKey = (String, FontStyle);

#[derive(Debug, Default)]
pub struct FontRegistry {
    fonts: Vec<FontResource>,
    lookup: HashMap<FontKey, usize>,
}

impl FontRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an embeddable font under `(family, style)`.
    ///
    /// Built-in faces are accepted without touching `source` and return
    /// `Ok(None)`. Registering an identity again replaces its data but keeps
    /// the resource index already handed out.
    pub fn register_font(
        &mut self,
        family: &str,
        style: FontStyle,
        source: FontSource,
    ) -> Result<Option<usize>, FolioError> {
        let key = font_key(family, style);
        if is_builtin_font(&key.0, key.1) {
            log::debug!(
                "font {}{} is built in; skipping registration",
                key.0,
                key.1.key()
            );
            return Ok(None);
        }

        let loaded = source.load()?;
        let (program_kind, base_font) = {
            let face = parse_face(&loaded.data, &source.describe())?;
            let kind = if face.tables().cff.is_some() {
                FontProgramKind::OpenTypeCff
            } else {
                FontProgramKind::TrueType
            };
            let base = postscript_name(&face).unwrap_or_else(|| key.0.clone());
            (kind, sanitize_font_name(&base))
        };
        let metrics = OnceCell::new();
        if let Some(cached) = loaded.metrics {
            let _ = metrics.set(cached);
        }

        if let Some(&slot) = self.lookup.get(&key) {
            let font = &mut self.fonts[slot];
            log::debug!(
                "replacing font {}{} (F{}) from {}",
                key.0,
                key.1.key(),
                font.index,
                source.describe()
            );
            font.base_font = base_font;
            font.data = loaded.data;
            font.source_path = loaded.source_path;
            font.program_kind = program_kind;
            font.metrics = metrics;
            return Ok(Some(font.index));
        }

        let index = self.fonts.len() + 1;
        log::debug!(
            "registered font {}{} as F{} from {}",
            key.0,
            key.1.key(),
            index,
            source.describe()
        );
        self.lookup.insert(key.clone(), self.fonts.len());
        self.fonts.push(FontResource {
            family: key.0,
            style: key.1,
            index,
            base_font,
            data: loaded.data,
            source_path: loaded.source_path,
            program_kind,
            metrics,
        });
        Ok(Some(index))
    }

    pub fn resolve(&self, family: &str, style: FontStyle) -> Option<&FontResource> {
        let key = font_key(family, style);
        self.lookup
            .get(&key)
            .and_then(|slot| self.fonts.get(*slot))
    }

    pub fn get(&self, index: usize) -> Option<&FontResource> {
        index.checked_sub(1).and_then(|slot| self.fonts.get(slot))
    }

    pub fn contains(&self, family: &str, style: FontStyle) -> bool {
        self.resolve(family, style).is_some()
    }

    pub fn len(&self) -> usize {
        self.fonts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fonts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FontResource> {
        self.fonts.iter()
    }

    /// Width of `text`, from real metrics for embedded fonts and an average
    /// advance of 0.6 em for built-in ones.
    pub fn string_width(&self, family: &str, style: FontStyle, font_size: Pt, text: &str) -> Pt {
        if let Some(metrics) = self
            .resolve(family, style)
            .and_then(|font| font.metrics().ok())
        {
            return metrics.measure(font_size, text);
        }
        let char_width = (font_size * 0.6).max(Pt::from_f32(0.001));
        let count = text.chars().count().min(i32::MAX as usize) as i32;
        char_width.mul_ratio(count, 1)
    }

    /// Writes a metrics cache for a font that was registered from a file.
    pub fn write_metrics_cache(
        &self,
        family: &str,
        style: FontStyle,
        path: impl AsRef<Path>,
    ) -> Result<(), FolioError> {
        let font = self.resolve(family, style).ok_or_else(|| {
            FolioError::UndefinedFont(format!("{}{}", normalize_family(family), style.key()))
        })?;
        let font_file = font.source_path().ok_or_else(|| {
            FolioError::InvalidConfiguration(format!(
                "font {}{} was not loaded from a file",
                font.family,
                font.style.key()
            ))
        })?;
        let cache = MetricsCacheFile {
            version: METRICS_CACHE_VERSION,
            family: font.family.clone(),
            style: font.style.key().to_string(),
            font_file: font_file.to_path_buf(),
            metrics: font.metrics()?.clone(),
        };
        fs::write(path, serde_json::to_vec_pretty(&cache)?)?;
        Ok(())
    }
}

fn font_key(family: &str, style: FontStyle) -> FontKey {
    (normalize_family(family), style.face())
}

pub(crate) fn normalize_family(name: &str) -> String {
    name.trim()
        .trim_matches('"')
        .trim_matches('\'')
        .to_ascii_lowercase()
}

fn parse_face<'a>(data: &'a [u8], label: &str) -> Result<ttf_parser::Face<'a>, FolioError> {
    ttf_parser::Face::parse(data, 0)
        .map_err(|err| FolioError::InvalidFont(format!("{label}: {err}")))
}

fn postscript_name(face: &ttf_parser::Face<'_>) -> Option<String> {
    use ttf_parser::name::name_id;

    let mut family = None;
    let mut post = None;
    for entry in face.names() {
        let Some(name) = entry.to_string() else {
            continue;
        };
        match entry.name_id {
            name_id::POST_SCRIPT_NAME if post.is_none() => post = Some(name),
            name_id::FAMILY if family.is_none() => family = Some(name),
            _ => {}
        }
    }
    post.or(family)
}

pub(crate) fn sanitize_font_name(name: &str) -> String {
    let mut out = String::new();
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' {
            out.push(ch);
        } else if ch == ' ' {
            out.push('-');
        }
    }
    if out.is_empty() {
        "EmbeddedFont".to_string()
    } else {
        out
    }
}

fn select_symbol_subtable<'a>(
    face: &'a ttf_parser::Face<'a>,
) -> (bool, Option<ttf_parser::cmap::Subtable<'a>>) {
    let Some(cmap) = face.tables().cmap else {
        return (false, None);
    };
    let mut first = None;
    let mut symbol = None;
    let mut has_unicode = false;
    for subtable in cmap.subtables {
        if first.is_none() {
            first = Some(subtable);
        }
        if subtable.platform_id == ttf_parser::name::PlatformId::Windows
            && subtable.encoding_id == 0
        {
            symbol = Some(subtable);
        }
        if subtable.is_unicode() {
            has_unicode = true;
        }
    }
    if has_unicode {
        (false, None)
    } else {
        (symbol.is_some(), symbol.or(first))
    }
}

fn glyph_for_code<'a>(
    face: &'a ttf_parser::Face<'a>,
    code: u8,
    fallback: Option<ttf_parser::cmap::Subtable<'a>>,
) -> Option<ttf_parser::GlyphId> {
    if let Some(ch) = winansi_char(code) {
        if let Some(id) = face.glyph_index(ch) {
            return Some(id);
        }
    }
    let subtable = fallback?;
    subtable
        .glyph_index(code as u32)
        .or_else(|| subtable.glyph_index(code as u32 + 0xF000))
}

fn build_widths(
    face: &ttf_parser::Face<'_>,
    scale: f32,
    first: u8,
    last: u8,
    fallback: Option<ttf_parser::cmap::Subtable<'_>>,
) -> Vec<u16> {
    let mut widths = Vec::with_capacity((last - first) as usize + 1);
    for code in first..=last {
        let width = glyph_for_code(face, code, fallback)
            .and_then(|id| face.glyph_hor_advance(id))
            .unwrap_or(0);
        let scaled = (width as f32 * scale).round() as i32;
        widths.push(scaled.clamp(0, u16::MAX as i32) as u16);
    }
    widths
}

fn scale_i16(value: i16, scale: f32) -> i16 {
    let scaled = (value as f32 * scale).round() as i32;
    scaled.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

/// Encodes text as WinAnsi (cp1252) bytes. Unmappable characters become `?`.
pub(crate) fn encode_winansi(input: &str) -> Vec<u8> {
    input.chars().map(|ch| winansi_byte(ch).unwrap_or(b'?')).collect()
}

fn winansi_byte(ch: char) -> Option<u8> {
    let byte = match ch {
        '\u{0000}'..='\u{007F}' => ch as u8,
        '\u{00A0}'..='\u{00FF}' => ch as u8,
        '\u{20AC}' => 0x80,
        '\u{201A}' => 0x82,
        '\u{0192}' => 0x83,
        '\u{201E}' => 0x84,
        '\u{2026}' => 0x85,
        '\u{2020}' => 0x86,
        '\u{2021}' => 0x87,
        '\u{02C6}' => 0x88,
        '\u{2030}' => 0x89,
        '\u{0160}' => 0x8A,
        '\u{2039}' => 0x8B,
        '\u{0152}' => 0x8C,
        '\u{017D}' => 0x8E,
        '\u{2018}' => 0x91,
        '\u{2019}' => 0x92,
        '\u{201C}' => 0x93,
        '\u{201D}' => 0x94,
        '\u{2022}' => 0x95,
        '\u{2013}' => 0x96,
        '\u{2014}' => 0x97,
        '\u{02DC}' => 0x98,
        '\u{2122}' => 0x99,
        '\u{0161}' => 0x9A,
        '\u{203A}' => 0x9B,
        '\u{0153}' => 0x9C,
        '\u{017E}' => 0x9E,
        '\u{0178}' => 0x9F,
        _ => return None,
    };
    Some(byte)
}

fn winansi_char(code: u8) -> Option<char> {
    let ch = match code {
        0x00..=0x7F | 0xA0..=0xFF => code as char,
        0x80 => '\u{20AC}',
        0x82 => '\u{201A}',
        0x83 => '\u{0192}',
        0x84 => '\u{201E}',
        0x85 => '\u{2026}',
        0x86 => '\u{2020}',
        0x87 => '\u{2021}',
        0x88 => '\u{02C6}',
        0x89 => '\u{2030}',
        0x8A => '\u{0160}',
        0x8B => '\u{2039}',
        0x8C => '\u{0152}',
        0x8E => '\u{017D}',
        0x91 => '\u{2018}',
        0x92 => '\u{2019}',
        0x93 => '\u{201C}',
        0x94 => '\u{201D}',
        0x95 => '\u{2022}',
        0x96 => '\u{2013}',
        0x97 => '\u{2014}',
        0x98 => '\u{02DC}',
        0x99 => '\u{2122}',
        0x9A => '\u{0161}',
        0x9B => '\u{203A}',
        0x9C => '\u{0153}',
        0x9E => '\u{017E}',
        0x9F => '\u{0178}',
        _ => return None,
    };
    Some(ch)
}


#[cfg(test)]
mod tests {
    use super::test_fonts::minimal_ttf;
    use super::*;

    fn write_font(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, minimal_ttf()).unwrap();
        path
    }

    #[test]
    fn missing_font_file_reports_literal_path() {
        let mut registry = FontRegistry::new();
        let err = registry
            .register_font(
                "MyFont",
                FontStyle::REGULAR,
                FontSource::from_path("non-existing-file.ttf"),
            )
            .unwrap_err();
        assert!(matches!(err, FolioError::FontFileNotFound { .. }));
        assert_eq!(err.to_string(), "TTF Font file not found: non-existing-file.ttf");
        assert!(registry.is_empty());
    }

    #[test]
    fn missing_metrics_cache_reports_filesystem_error() {
        let mut registry = FontRegistry::new();
        let err = registry
            .register_font(
                "MyFont",
                FontStyle::REGULAR,
                FontSource::from_path("non-existing-file.pkl"),
            )
            .unwrap_err();
        let expected = fs::read("non-existing-file.pkl").unwrap_err().to_string();
        assert!(matches!(err, FolioError::FontCacheNotFound(_)));
        assert_eq!(err.to_string(), expected);
    }

    #[test]
    fn builtin_fonts_never_create_entries() {
        let dir = tempfile::tempdir().unwrap();
        let font = write_font(dir.path(), "Roboto.ttf");
        let mut registry = FontRegistry::new();
        for (family, style) in [
            ("Helvetica", ""),
            ("Helvetica", "B"),
            ("helvetica", "IB"),
            ("times", ""),
            ("courier", ""),
            ("COURIER", "BIU"),
            ("ZapfDingbats", ""),
        ] {
            let style = FontStyle::parse(style).unwrap();
            let index = registry
                .register_font(family, style, FontSource::File(font.clone()))
                .unwrap();
            assert_eq!(index, None);
        }
        // Locator validity does not matter for built-ins.
        let index = registry
            .register_font("Times", FontStyle::REGULAR, FontSource::from_path("missing.ttf"))
            .unwrap();
        assert_eq!(index, None);
        assert!(registry.is_empty());
    }

    #[test]
    fn registers_and_replaces_keeping_index() {
        let dir = tempfile::tempdir().unwrap();
        let first = write_font(dir.path(), "A.ttf");
        let second = write_font(dir.path(), "B.ttf");
        let mut registry = FontRegistry::new();

        let a = registry
            .register_font("Roboto", FontStyle::REGULAR, FontSource::File(first))
            .unwrap();
        let bold = registry
            .register_font("Roboto", FontStyle::parse("B").unwrap(), FontSource::Bytes(minimal_ttf()))
            .unwrap();
        let again = registry
            .register_font("ROBOTO", FontStyle::parse("U").unwrap(), FontSource::File(second.clone()))
            .unwrap();

        assert_eq!(a, Some(1));
        assert_eq!(bold, Some(2));
        assert_eq!(again, Some(1));
        assert_eq!(registry.len(), 2);
        let font = registry.resolve("roboto", FontStyle::REGULAR).unwrap();
        assert_eq!(font.source_path(), Some(second.as_path()));
        assert_eq!(font.resource_name(), "F1");
        assert_eq!(registry.get(2).unwrap().style().key(), "B");
    }

    #[test]
    fn non_builtin_symbol_style_is_registered() {
        let mut registry = FontRegistry::new();
        let index = registry
            .register_font("symbol", FontStyle::parse("B").unwrap(), FontSource::Bytes(minimal_ttf()))
            .unwrap();
        assert_eq!(index, Some(1));
    }

    #[test]
    fn invalid_font_data_is_rejected() {
        let mut registry = FontRegistry::new();
        let err = registry
            .register_font("Broken", FontStyle::REGULAR, FontSource::Bytes(vec![1, 2, 3]))
            .unwrap_err();
        assert!(matches!(err, FolioError::InvalidFont(_)));
    }

    #[test]
    fn metrics_are_lazy_and_cache_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let font = write_font(dir.path(), "Roboto.ttf");
        let mut registry = FontRegistry::new();
        registry
            .register_font("Roboto", FontStyle::REGULAR, FontSource::File(font))
            .unwrap();

        let resource = registry.resolve("Roboto", FontStyle::REGULAR).unwrap();
        assert!(!resource.metrics_loaded());
        let metrics = resource.metrics().unwrap().clone();
        assert!(resource.metrics_loaded());
        assert_eq!(metrics.ascent, 800);
        assert_eq!(metrics.descent, -200);
        assert_eq!(metrics.widths.len(), 224);

        let cache_path = dir.path().join("Roboto.pkl");
        registry
            .write_metrics_cache("Roboto", FontStyle::REGULAR, &cache_path)
            .unwrap();

        let mut other = FontRegistry::new();
        other
            .register_font("Roboto", FontStyle::REGULAR, FontSource::from_path(&cache_path))
            .unwrap();
        let cached = other.resolve("Roboto", FontStyle::REGULAR).unwrap();
        assert!(cached.metrics_loaded());
        assert_eq!(cached.metrics().unwrap(), &metrics);
    }

    #[test]
    fn builtin_width_uses_average_advance() {
        let registry = FontRegistry::new();
        let width = registry.string_width("courier", FontStyle::REGULAR, Pt::from_i32(10), "abcd");
        assert_eq!(width.to_milli_i64(), 24_000);
    }

    #[test]
    fn winansi_round_trip_for_extensions() {
        assert_eq!(encode_winansi("A\u{2013}\u{4E2D}"), vec![b'A', 0x96, b'?']);
        assert_eq!(winansi_char(0x96), Some('\u{2013}'));
        assert_eq!(winansi_char(0x81), None);
    }

    #[test]
    fn core_font_lookup_is_case_insensitive() {
        let style = FontStyle::parse("BI").unwrap();
        assert_eq!(CoreFont::lookup("HeLvEtIcA", style), Some(CoreFont::HelveticaBoldOblique));
        assert_eq!(CoreFont::lookup("symbol", style), None);
        assert_eq!(builtin_alias("Arial"), Some("helvetica"));
        assert_eq!(builtin_alias("Courier New"), Some("courier"));
        assert_eq!(builtin_alias("times new roman"), Some("times"));
        assert_eq!(builtin_alias("Roboto"), None);
    }

    #[test]
    fn measuring_very_long_text_saturates() {
        let metrics = FontMetrics {
            first_char: 32,
            last_char: 255,
            widths: vec![1000; 224],
            ascent: 800,
            descent: -200,
            line_gap: 0,
            cap_height: 700,
            italic_angle: 0,
            stem_v: 80,
            bbox: (0, -200, 1000, 800),
            underline: None,
            missing_width: 1000,
            is_fixed_pitch: true,
            symbolic: false,
        };
        let size = Pt::from_i32(1);
        assert_eq!(metrics.measure(size, "WW").to_milli_i64(), 2_000);

        let text = "W".repeat(2_200_000);
        let width = metrics.measure(size, &text);
        assert_eq!(width, size.mul_ratio(i32::MAX, 1000));
        assert!(width > Pt::ZERO);
    }
}

use crate::canvas::{Command, Page};
use crate::error::FolioError;
use crate::font::{CoreFont, FontProgramKind, FontResource, encode_winansi};
use crate::image::{ImageResource, SoftMask};
use crate::registry::{FontRef, ResourceRegistry};
use crate::types::{Color, Pt, Size};
use fixed::types::I32F32;
use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Write};

const PDF_HEADER: &[u8] = b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n";

/// Everything the writer needs from a finished document.
pub(crate) struct PdfDocument<'a> {
    pub page_size: Size,
    pub pages: &'a [Page],
    pub registry: &'a ResourceRegistry,
    pub title: Option<&'a str>,
    /// Applies to document-level streams (embedded font programs). Pages and
    /// images carry their own captured flag.
    pub compress: bool,
}

// Resource name and object id.
type ResourceMap<K> = BTreeMap<K, (String, usize)>;

#[derive(Default)]
struct ObjectTable {
    bodies: Vec<Vec<u8>>,
}

impl ObjectTable {
    fn reserve(&mut self) -> usize {
        self.bodies.push(Vec::new());
        self.bodies.len()
    }

    fn add(&mut self, body: impl Into<Vec<u8>>) -> usize {
        self.bodies.push(body.into());
        self.bodies.len()
    }

    fn set(&mut self, id: usize, body: impl Into<Vec<u8>>) {
        if let Some(slot) = id.checked_sub(1).and_then(|idx| self.bodies.get_mut(idx)) {
            *slot = body.into();
        }
    }
}

pub(crate) fn document_to_pdf(doc: &PdfDocument<'_>) -> Result<Vec<u8>, FolioError> {
    let mut objects = ObjectTable::default();
    let catalog_id = objects.reserve();
    let pages_id = objects.reserve();

    let fonts = build_font_objects(&mut objects, doc)?;
    let images = build_image_objects(&mut objects, doc.registry);

    let mut kids = Vec::with_capacity(doc.pages.len());
    for page in doc.pages {
        let content = render_page(page, doc.page_size.height, &fonts, &images);
        let content_id = objects.add(stream_object(content.as_bytes(), page.compress(), ""));
        let resources = page_resources(page, &fonts, &images);
        let page_id = objects.add(format!(
            "<< /Type /Page /Parent {} 0 R /MediaBox [0 0 {} {}] /Resources {} /Contents {} 0 R >>",
            pages_id,
            fmt_pt(doc.page_size.width),
            fmt_pt(doc.page_size.height),
            resources,
            content_id
        ));
        kids.push(format!("{} 0 R", page_id));
    }

    objects.set(
        pages_id,
        format!(
            "<< /Type /Pages /Kids [{}] /Count {} >>",
            kids.join(" "),
            kids.len()
        ),
    );
    objects.set(
        catalog_id,
        format!("<< /Type /Catalog /Pages {} 0 R >>", pages_id),
    );
    let info_id = objects.add(info_object(doc.title));

    let mut out = Vec::new();
    write_pdf(&mut out, &objects.bodies, catalog_id, info_id)?;
    log::debug!(
        "wrote PDF: {} page(s), {} object(s), {} bytes",
        doc.pages.len(),
        objects.bodies.len(),
        out.len()
    );
    Ok(out)
}

fn collect_used_fonts(pages: &[Page]) -> BTreeSet<FontRef> {
    pages
        .iter()
        .flat_map(|page| page.commands())
        .filter_map(|cmd| match cmd {
            Command::DrawText { font, .. } => Some(*font),
            _ => None,
        })
        .collect()
}

// Only fonts some page draws with are written.
fn build_font_objects(
    objects: &mut ObjectTable,
    doc: &PdfDocument<'_>,
) -> Result<ResourceMap<FontRef>, FolioError> {
    let mut fonts = ResourceMap::new();
    let mut core_count = 0usize;
    for font in collect_used_fonts(doc.pages) {
        match font {
            FontRef::Core(core) => {
                core_count += 1;
                let id = objects.add(core_font_object(core));
                fonts.insert(font, (format!("CF{}", core_count), id));
            }
            FontRef::Embedded(index) => {
                let resource = doc
                    .registry
                    .embedded_font(index)
                    .ok_or_else(|| FolioError::UndefinedFont(format!("F{}", index)))?;
                let id = build_embedded_font_objects(objects, resource, doc.compress)?;
                fonts.insert(font, (resource.resource_name(), id));
            }
        }
    }
    Ok(fonts)
}

fn core_font_object(font: CoreFont) -> String {
    let encoding = if font.is_symbolic() {
        ""
    } else {
        " /Encoding /WinAnsiEncoding"
    };
    format!(
        "<< /Type /Font /Subtype /Type1 /BaseFont /{}{} >>",
        font.base_font(),
        encoding
    )
}

fn build_embedded_font_objects(
    objects: &mut ObjectTable,
    font: &FontResource,
    compress: bool,
) -> Result<usize, FolioError> {
    let metrics = font.metrics()?;
    let file_id = objects.add(font_file_object(font.data(), font.program_kind(), compress));

    let font_file_entry = match font.program_kind() {
        FontProgramKind::OpenTypeCff => "FontFile3",
        FontProgramKind::TrueType => "FontFile2",
    };
    let descriptor_id = objects.add(format!(
        "<< /Type /FontDescriptor /FontName /{} /Flags {} /FontBBox [{} {} {} {}] /ItalicAngle {} /Ascent {} /Descent {} /CapHeight {} /StemV {} /MissingWidth {} /{} {} 0 R >>",
        font.base_font(),
        metrics.flags(font.style().italic),
        metrics.bbox.0,
        metrics.bbox.1,
        metrics.bbox.2,
        metrics.bbox.3,
        metrics.italic_angle,
        metrics.ascent,
        metrics.descent,
        metrics.cap_height,
        metrics.stem_v,
        metrics.missing_width,
        font_file_entry,
        file_id
    ));

    let subtype = match font.program_kind() {
        FontProgramKind::OpenTypeCff => "Type1",
        FontProgramKind::TrueType => "TrueType",
    };
    let widths = metrics
        .widths
        .iter()
        .map(|value| value.to_string())
        .collect::<Vec<_>>()
        .join(" ");
    let encoding = if metrics.symbolic {
        ""
    } else {
        " /Encoding /WinAnsiEncoding"
    };
    Ok(objects.add(format!(
        "<< /Type /Font /Subtype /{} /BaseFont /{} /FirstChar {} /LastChar {} /Widths [{}] /FontDescriptor {} 0 R{} >>",
        subtype,
        font.base_font(),
        metrics.first_char,
        metrics.last_char,
        widths,
        descriptor_id,
        encoding
    )))
}

fn font_file_object(data: &[u8], kind: FontProgramKind, compress: bool) -> Vec<u8> {
    let mut extra = format!(" /Length1 {}", data.len());
    if matches!(kind, FontProgramKind::OpenTypeCff) {
        extra.push_str(" /Subtype /OpenType");
    }
    stream_object(data, compress, &extra)
}

fn build_image_objects(
    objects: &mut ObjectTable,
    registry: &ResourceRegistry,
) -> ResourceMap<usize> {
    let mut images = ResourceMap::new();
    for image in registry.images().iter() {
        let smask_id = image
            .smask()
            .map(|mask| objects.add(image_smask_object(image, mask)));
        let id = objects.add(image_object(image, smask_id));
        images.insert(image.index(), (image.resource_name(), id));
    }
    images
}

fn image_object(image: &ImageResource, smask_id: Option<usize>) -> Vec<u8> {
    let mut dict = format!(
        "<< /Type /XObject /Subtype /Image /Width {} /Height {} /ColorSpace {} /BitsPerComponent {}",
        image.width(),
        image.height(),
        image.color_mode().pdf_name(),
        image.bits_per_component()
    );
    if let Some(filter) = image.filter().pdf_name() {
        dict.push_str(&format!(" /Filter {}", filter));
    }
    if let Some(decode) = image.decode() {
        dict.push_str(&format!(" /Decode {}", decode));
    }
    if let Some(id) = smask_id {
        dict.push_str(&format!(" /SMask {} 0 R", id));
    }
    binary_stream(dict, image.data())
}

fn image_smask_object(image: &ImageResource, mask: &SoftMask) -> Vec<u8> {
    let mut dict = format!(
        "<< /Type /XObject /Subtype /Image /Width {} /Height {} /ColorSpace /DeviceGray /BitsPerComponent 8",
        image.width(),
        image.height()
    );
    if let Some(filter) = mask.filter.pdf_name() {
        dict.push_str(&format!(" /Filter {}", filter));
    }
    binary_stream(dict, &mask.data)
}

// `dict` is an unterminated dictionary; /Length and the closing `>>` are added here.
fn binary_stream(mut dict: String, data: &[u8]) -> Vec<u8> {
    dict.push_str(&format!(" /Length {} >>\nstream\n", data.len()));
    let mut out = dict.into_bytes();
    out.extend_from_slice(data);
    out.extend_from_slice(b"\nendstream");
    out
}

fn stream_object(data: &[u8], compress: bool, extra: &str) -> Vec<u8> {
    if compress {
        let packed = flate_compress(data);
        binary_stream(format!("<< /Filter /FlateDecode{}", extra), &packed)
    } else {
        binary_stream(format!("<<{}", extra), data)
    }
}

pub(crate) fn flate_compress(data: &[u8]) -> Vec<u8> {
    use flate2::Compression;
    use flate2::write::ZlibEncoder;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    let _ = encoder.write_all(data);
    encoder.finish().unwrap_or_default()
}

fn page_resources(
    page: &Page,
    fonts: &ResourceMap<FontRef>,
    images: &ResourceMap<usize>,
) -> String {
    let mut page_fonts = BTreeSet::new();
    let mut page_images = BTreeSet::new();
    for cmd in page.commands() {
        match cmd {
            Command::DrawText { font, .. } => {
                if let Some(entry) = fonts.get(font) {
                    page_fonts.insert(entry.clone());
                }
            }
            Command::DrawImage { index, .. } => {
                if let Some(entry) = images.get(index) {
                    page_images.insert(entry.clone());
                }
            }
            _ => {}
        }
    }

    let mut out = String::from("<< /ProcSet [/PDF /Text /ImageB /ImageC]");
    if !page_fonts.is_empty() {
        out.push_str(" /Font ");
        out.push_str(&named_resources(&page_fonts));
    }
    if !page_images.is_empty() {
        out.push_str(" /XObject ");
        out.push_str(&named_resources(&page_images));
    }
    out.push_str(" >>");
    out
}

fn named_resources(entries: &BTreeSet<(String, usize)>) -> String {
    let mut parts = Vec::new();
    for (resource, id) in entries {
        parts.push(format!("/{} {} 0 R", resource, id));
    }
    format!("<< {} >>", parts.join(" "))
}

fn render_page(
    page: &Page,
    page_height: Pt,
    fonts: &ResourceMap<FontRef>,
    images: &ResourceMap<usize>,
) -> String {
    let mut out = String::new();
    for cmd in page.commands() {
        match cmd {
            Command::SaveState => out.push_str("q\n"),
            Command::RestoreState => out.push_str("Q\n"),
            Command::Rotate { angle, x, y } => {
                let radians = angle.to_radians();
                let cos = libm::cosf(radians);
                let sin = libm::sinf(radians);
                let cx = *x;
                let cy = page_height - *y;
                out.push_str(&format!(
                    "{} {} {} {} {} {} cm\n",
                    fmt(cos),
                    fmt(sin),
                    fmt(-sin),
                    fmt(cos),
                    fmt_pt(cx),
                    fmt_pt(cy)
                ));
                out.push_str(&format!("1 0 0 1 {} {} cm\n", fmt_pt(-cx), fmt_pt(-cy)));
            }
            Command::Clip(rect) => {
                out.push_str(&format!(
                    "{} {} {} {} re\nW n\n",
                    fmt_pt(rect.x),
                    fmt_pt(page_height - rect.y - rect.height),
                    fmt_pt(rect.width),
                    fmt_pt(rect.height)
                ));
            }
            Command::SetFillColor(color) => out.push_str(&color_to_pdf_fill(*color)),
            Command::SetStrokeColor(color) => out.push_str(&color_to_pdf_stroke(*color)),
            Command::SetLineWidth(width) => {
                out.push_str(&format!("{} w\n", fmt_pt(*width)));
            }
            Command::DrawText {
                x,
                y,
                font,
                size,
                stretching,
                text,
            } => {
                let Some((resource, _)) = fonts.get(font) else {
                    continue;
                };
                out.push_str("BT\n");
                out.push_str(&format!("/{} {} Tf\n", resource, fmt_pt(*size)));
                out.push_str(&format!("{} Tz\n", fmt(*stretching)));
                out.push_str(&format!(
                    "{} {} Td\n",
                    fmt_pt(*x),
                    fmt_pt(page_height - *y)
                ));
                out.push_str(&format!("({}) Tj\n", pdf_literal(&encode_winansi(text))));
                out.push_str("ET\n");
            }
            Command::DrawRect {
                x,
                y,
                width,
                height,
                style,
            } => {
                out.push_str(&format!(
                    "{} {} {} {} re\n{}\n",
                    fmt_pt(*x),
                    fmt_pt(page_height - *y - *height),
                    fmt_pt(*width),
                    fmt_pt(*height),
                    style.operator()
                ));
            }
            Command::DrawLine { x1, y1, x2, y2 } => {
                out.push_str(&format!(
                    "{} {} m\n{} {} l\nS\n",
                    fmt_pt(*x1),
                    fmt_pt(page_height - *y1),
                    fmt_pt(*x2),
                    fmt_pt(page_height - *y2)
                ));
            }
            Command::DrawImage {
                x,
                y,
                width,
                height,
                index,
            } => {
                let Some((name, _)) = images.get(index) else {
                    continue;
                };
                out.push_str("q\n");
                out.push_str(&format!(
                    "{} 0 0 {} {} {} cm\n",
                    fmt_pt(*width),
                    fmt_pt(*height),
                    fmt_pt(*x),
                    fmt_pt(page_height - *y - *height)
                ));
                out.push_str(&format!("/{} Do\n", name));
                out.push_str("Q\n");
            }
        }
    }
    out
}

fn info_object(title: Option<&str>) -> String {
    let mut entries = vec!["/Producer (folio)".to_string()];
    if let Some(title) = title {
        entries.push(format!("/Title ({})", pdf_literal(&encode_winansi(title))));
    }
    format!("<< {} >>", entries.join(" "))
}

fn write_pdf<W: Write>(
    writer: &mut W,
    objects: &[Vec<u8>],
    catalog_id: usize,
    info_id: usize,
) -> io::Result<()> {
    let mut offset = 0usize;
    let mut offsets = vec![0usize; objects.len() + 1];
    write_bytes(writer, PDF_HEADER, &mut offset)?;
    for (idx, body) in objects.iter().enumerate() {
        write_pdf_object(writer, &mut offset, &mut offsets, idx + 1, body)?;
    }

    let xref_start = offset;
    write_str(
        writer,
        &format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1),
        &mut offset,
    )?;
    for entry in offsets.iter().skip(1) {
        write_str(writer, &format!("{:010} 00000 n \n", entry), &mut offset)?;
    }
    write_str(
        writer,
        &format!(
            "trailer\n<< /Size {} /Root {} 0 R /Info {} 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            catalog_id,
            info_id,
            xref_start
        ),
        &mut offset,
    )?;
    Ok(())
}

fn write_pdf_object<W: Write>(
    writer: &mut W,
    offset: &mut usize,
    offsets: &mut [usize],
    obj_id: usize,
    body: &[u8],
) -> io::Result<()> {
    if let Some(slot) = offsets.get_mut(obj_id) {
        *slot = *offset;
    }
    write_str(writer, &format!("{} 0 obj\n", obj_id), offset)?;
    write_bytes(writer, body, offset)?;
    write_bytes(writer, b"\nendobj\n", offset)?;
    Ok(())
}

fn write_bytes<W: Write>(writer: &mut W, data: &[u8], offset: &mut usize) -> io::Result<()> {
    writer.write_all(data)?;
    *offset += data.len();
    Ok(())
}

fn write_str<W: Write>(writer: &mut W, data: &str, offset: &mut usize) -> io::Result<()> {
    write_bytes(writer, data.as_bytes(), offset)
}

/// Body of a PDF literal string for already-encoded bytes.
fn pdf_literal(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &byte in bytes {
        match byte {
            b'\\' => out.push_str("\\\\"),
            b'(' => out.push_str("\\("),
            b')' => out.push_str("\\)"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b if !(0x20..0x7f).contains(&b) => out.push_str(&format!("\\{:03o}", b)),
            b => out.push(b as char),
        }
    }
    out
}

fn fmt(value: f32) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }
    let fixed = I32F32::from_num(value);
    let scaled = (fixed * I32F32::from_num(1000)).round();
    let milli: i64 = scaled.to_num();
    format_milli(milli)
}

fn format_milli(milli: i64) -> String {
    if milli == 0 {
        return "0".to_string();
    }
    let sign = if milli < 0 { "-" } else { "" };
    let abs = milli.abs();
    let int_part = abs / 1000;
    let frac_part = abs % 1000;
    if frac_part == 0 {
        format!("{}{}", sign, int_part)
    } else {
        let mut s = format!("{}{}.{:03}", sign, int_part, frac_part);
        while s.ends_with('0') {
            s.pop();
        }
        s
    }
}

fn fmt_pt(value: Pt) -> String {
    format_milli(value.to_milli_i64())
}

fn color_to_pdf_fill(color: Color) -> String {
    if color.is_gray() {
        format!("{} g\n", fmt(color.r))
    } else {
        format!("{} {} {} rg\n", fmt(color.r), fmt(color.g), fmt(color.b))
    }
}

fn color_to_pdf_stroke(color: Color) -> String {
    if color.is_gray() {
        format!("{} G\n", fmt(color.r))
    } else {
        format!("{} {} {} RG\n", fmt(color.r), fmt(color.g), fmt(color.b))
    }
}

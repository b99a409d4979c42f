mod canvas;
mod error;
mod font;
mod image;
pub mod legacy;
mod pdf;
mod registry;
mod state;
mod types;

pub use crate::canvas::{Command, Page, PaintStyle};
pub use crate::error::FolioError;
pub use crate::font::{
    CoreFont, DecorationMetrics, FontMetrics, FontProgramKind, FontRegistry, FontResource,
    FontSource, METRICS_CACHE_EXTENSION, builtin_alias, is_builtin_font,
};
pub use crate::image::{
    ColorMode, ImageFilter, ImageHandle, ImageKind, ImageRegistry, ImageResource, ImageSource,
    SoftMask,
};
pub use crate::registry::{FontRef, ResourceRegistry};
pub use crate::state::{
    ContextOverrides, GraphicsState, GraphicsStateStack, OverrideValue, Rotation,
    RotationOverrides,
};
pub use crate::types::{Align, Color, FontStyle, Margins, Pt, Rect, Size, XPos, YPos};

use crate::pdf::PdfDocument;
use std::ops::{Deref, DerefMut};
use std::path::PathBuf;

/// When the compression flag is read for the streams of a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionCapture {
    /// Read each time a page is opened.
    #[default]
    PerPage,
    /// Read once, when the first page is opened.
    PerDocument,
}

impl std::str::FromStr for CompressionCapture {
    type Err = FolioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "page" | "per_page" => Ok(CompressionCapture::PerPage),
            "document" | "per_document" => Ok(CompressionCapture::PerDocument),
            other => Err(FolioError::InvalidConfiguration(format!(
                "unknown compression capture {other:?}; expected page or document"
            ))),
        }
    }
}

// Horizontal space between a cell border and its text.
const CELL_PADDING_MM: f32 = 1.0;

// Core fonts have no metrics of their own here; these match Helvetica.
const CORE_UNDERLINE_POSITION: i16 = -100;
const CORE_UNDERLINE_THICKNESS: i16 = 50;

pub struct Folio {
    page_size: Size,
    margins: Margins,
    compress: bool,
    compression_capture: CompressionCapture,
    captured_compress: Option<bool>,
    title: Option<String>,
    registry: ResourceRegistry,
    states: GraphicsStateStack,
    pages: Vec<Page>,
    current: Option<Page>,
    x: Pt,
    y: Pt,
    last_cell_height: Pt,
}

#[derive(Debug, Clone)]
pub struct FolioBuilder {
    page_size: Size,
    margins: Margins,
    compress: bool,
    compression_capture: CompressionCapture,
    title: Option<String>,
}

/// A text cell. Unset width fits the text; a width of 0 extends to the right
/// margin. Unset height is the current font size.
#[derive(Debug, Clone, Default)]
pub struct Cell {
    text: String,
    width: Option<f32>,
    height: Option<f32>,
    border: bool,
    fill: bool,
    align: Align,
    new_x: XPos,
    new_y: YPos,
}

impl Cell {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn width(mut self, width: f32) -> Self {
        self.width = Some(width);
        self
    }

    pub fn height(mut self, height: f32) -> Self {
        self.height = Some(height);
        self
    }

    pub fn border(mut self, border: bool) -> Self {
        self.border = border;
        self
    }

    pub fn fill(mut self, fill: bool) -> Self {
        self.fill = fill;
        self
    }

    pub fn align(mut self, align: Align) -> Self {
        self.align = align;
        self
    }

    pub fn new_x(mut self, new_x: XPos) -> Self {
        self.new_x = new_x;
        self
    }

    pub fn new_y(mut self, new_y: YPos) -> Self {
        self.new_y = new_y;
        self
    }
}

/// Scope guard returned by [`Folio::local_context`] and [`Folio::rotation`].
///
/// Dereferences to the document, so drawing goes through the guard while it
/// is alive. Dropping it restores the enclosing graphics state and emits the
/// matching `Q`, also when the scope is left through `?` or a panic.
pub struct LocalContext<'a> {
    folio: &'a mut Folio,
    depth: usize,
    scope_id: Option<u64>,
}

impl LocalContext<'_> {
    /// Stack depth of this scope; the page base state is depth 1.
    pub fn depth(&self) -> usize {
        self.depth
    }
}

impl Deref for LocalContext<'_> {
    type Target = Folio;

    fn deref(&self) -> &Folio {
        &*self.folio
    }
}

impl DerefMut for LocalContext<'_> {
    fn deref_mut(&mut self) -> &mut Folio {
        &mut *self.folio
    }
}

impl Drop for LocalContext<'_> {
    fn drop(&mut self) {
        let depth = self.folio.states.depth();
        if depth < self.depth || self.folio.states.scope_id(self.depth) != self.scope_id {
            log::error!(
                "graphics context scope at depth {} was closed before its guard (stack depth is {})",
                self.depth,
                depth
            );
            return;
        }
        if depth > self.depth {
            log::warn!(
                "closing {} manually opened graphics context scope(s) left inside a guarded scope",
                depth - self.depth
            );
        }
        while self.folio.states.depth() >= self.depth {
            if let Err(err) = self.folio.exit_scope() {
                log::error!("failed to restore graphics state: {err}");
                break;
            }
        }
    }
}

impl Folio {
    pub fn builder() -> FolioBuilder {
        FolioBuilder::new()
    }

    pub fn page_size(&self) -> Size {
        self.page_size
    }

    pub fn margins(&self) -> Margins {
        self.margins
    }

    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    /// Pages that have been closed. The page being drawn is [`Folio::current_page`].
    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn current_page(&self) -> Option<&Page> {
        self.current.as_ref()
    }

    pub fn page_count(&self) -> usize {
        self.pages.len() + usize::from(self.current.is_some())
    }

    pub fn compression(&self) -> bool {
        self.compress
    }

    /// Takes effect on the next page opened (or never, once a per-document
    /// capture has happened).
    pub fn set_compression(&mut self, compress: bool) {
        self.compress = compress;
    }

    fn capture_compression(&mut self) -> bool {
        match self.compression_capture {
            CompressionCapture::PerPage => self.compress,
            CompressionCapture::PerDocument => *self.captured_compress.get_or_insert(self.compress),
        }
    }

    pub fn add_page(&mut self) -> Result<(), FolioError> {
        self.finish_page()?;
        let compress = self.capture_compression();
        self.states.open_page()?;
        self.current = Some(Page::new(compress));
        self.x = self.margins.left;
        self.y = self.margins.top;
        self.last_cell_height = Pt::ZERO;
        log::debug!("opened page {} (compress={})", self.page_count(), compress);
        Ok(())
    }

    fn finish_page(&mut self) -> Result<(), FolioError> {
        let Some(mut page) = self.current.take() else {
            return Ok(());
        };
        while page.open_saves() > 0 {
            page.restore_state();
        }
        self.pages.push(page);
        self.states.close_page()
    }

    fn page_mut(&mut self) -> Result<&mut Page, FolioError> {
        self.current.as_mut().ok_or(FolioError::NoPageOpen)
    }

    /// Finishes the open page and serializes the document. A document without
    /// pages gets one blank page.
    pub fn output(&mut self) -> Result<Vec<u8>, FolioError> {
        if self.page_count() == 0 {
            self.add_page()?;
        }
        self.finish_page()?;
        let compress = self
            .pages
            .first()
            .map(Page::compress)
            .unwrap_or(self.compress);
        pdf::document_to_pdf(&PdfDocument {
            page_size: self.page_size,
            pages: &self.pages,
            registry: &self.registry,
            title: self.title.as_deref(),
            compress,
        })
    }

    // --- resources ---

    /// Registers an embeddable font. Built-in families are accepted and
    /// ignored, returning `Ok(None)`.
    pub fn register_font(
        &mut self,
        family: &str,
        style: &str,
        source: impl Into<FontSource>,
    ) -> Result<Option<usize>, FolioError> {
        let style = FontStyle::parse(style)?;
        self.registry.register_font(family, style, source.into())
    }

    /// Draws an image with its top-left corner at `(x, y)`. A zero width or
    /// height is derived from the other keeping the aspect ratio; both zero
    /// draws one point per pixel.
    pub fn image(
        &mut self,
        source: impl Into<ImageSource>,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    ) -> Result<ImageHandle, FolioError> {
        let compress = self.page_mut()?.compress();
        let handle = self.registry.register_image(source.into(), compress)?;
        let natural_w = handle.width.max(1) as f32;
        let natural_h = handle.height.max(1) as f32;
        let (w, h) = match (width > 0.0, height > 0.0) {
            (true, true) => (width, height),
            (true, false) => (width, width * natural_h / natural_w),
            (false, true) => (height * natural_w / natural_h, height),
            (false, false) => (natural_w, natural_h),
        };
        self.page_mut()?.draw_image(
            Pt::from_f32(x),
            Pt::from_f32(y),
            Pt::from_f32(w),
            Pt::from_f32(h),
            handle.index,
        );
        Ok(handle)
    }

    // --- graphics state ---

    pub fn graphics_state(&self) -> &GraphicsState {
        self.states.current()
    }

    /// 0 between pages, 1 on a page with no open scopes.
    pub fn context_depth(&self) -> usize {
        self.states.depth()
    }

    pub fn font_family(&self) -> &str {
        &self.states.current().font_family
    }

    pub fn font_style(&self) -> FontStyle {
        self.states.current().font_style
    }

    pub fn font_size(&self) -> f32 {
        self.states.current().font_size.to_f32()
    }

    pub fn text_color(&self) -> Color {
        self.states.current().text_color
    }

    pub fn fill_color(&self) -> Color {
        self.states.current().fill_color
    }

    pub fn draw_color(&self) -> Color {
        self.states.current().draw_color
    }

    pub fn line_width(&self) -> f32 {
        self.states.current().line_width.to_f32()
    }

    pub fn stretching(&self) -> f32 {
        self.states.current().stretching
    }

    /// Selects a font for the current scope. `size` of 0 keeps the current size.
    pub fn set_font(&mut self, family: &str, style: &str, size: f32) -> Result<(), FolioError> {
        let style = FontStyle::parse(style)?;
        let mut family = font::normalize_family(family);
        if self.registry.resolve_font(&family, style).is_none() {
            if let Some(alias) = builtin_alias(&family) {
                log::warn!("font {family} is not built in; substituting {alias}");
                family = alias.to_string();
            }
        }
        if self.registry.resolve_font(&family, style).is_none() {
            return Err(FolioError::UndefinedFont(font_label(&family, style)));
        }
        if size != 0.0 {
            ContextOverrides::new().font_size(size).validate()?;
        }
        let state = self.states.current_mut();
        state.font_family = family;
        state.font_style = style;
        if size != 0.0 {
            state.font_size = Pt::from_f32(size);
        }
        Ok(())
    }

    pub fn set_font_size(&mut self, size: f32) -> Result<(), FolioError> {
        ContextOverrides::new().font_size(size).validate()?;
        self.states.current_mut().font_size = Pt::from_f32(size);
        Ok(())
    }

    pub fn set_text_color(&mut self, color: impl Into<Color>) {
        self.states.current_mut().text_color = color.into();
    }

    pub fn set_fill_color(&mut self, color: impl Into<Color>) {
        self.states.current_mut().fill_color = color.into();
    }

    pub fn set_draw_color(&mut self, color: impl Into<Color>) {
        self.states.current_mut().draw_color = color.into();
    }

    pub fn set_line_width(&mut self, width: f32) -> Result<(), FolioError> {
        ContextOverrides::new().line_width(width).validate()?;
        self.states.current_mut().line_width = Pt::from_f32(width);
        Ok(())
    }

    pub fn set_stretching(&mut self, percent: f32) -> Result<(), FolioError> {
        ContextOverrides::new().stretching(percent).validate()?;
        self.states.current_mut().stretching = percent;
        Ok(())
    }

    // --- scopes ---

    /// Opens a graphics context scope that lasts as long as the returned guard.
    pub fn local_context(
        &mut self,
        overrides: ContextOverrides,
    ) -> Result<LocalContext<'_>, FolioError> {
        let depth = self.enter_scope(&overrides)?;
        let scope_id = self.states.scope_id(depth);
        Ok(LocalContext {
            folio: self,
            depth,
            scope_id,
        })
    }

    /// Rotates everything drawn through the returned guard by `angle` degrees
    /// counter-clockwise around `(x, y)`.
    pub fn rotation(&mut self, angle: f32, x: f32, y: f32) -> Result<LocalContext<'_>, FolioError> {
        for (name, value) in [("angle", angle), ("x", x), ("y", y)] {
            if !value.is_finite() {
                return Err(FolioError::InvalidConfiguration(format!(
                    "rotation {name} must be finite (got {value})"
                )));
            }
        }
        let overrides = ContextOverrides::new().rotation(Rotation {
            angle,
            x: Pt::from_f32(x),
            y: Pt::from_f32(y),
        });
        self.local_context(overrides)
    }

    /// Like [`Folio::rotation`], from `angle`/`x`/`y` pairs. A missing pivot
    /// coordinate is taken from the cursor.
    pub fn rotation_from_pairs<I, K, V>(&mut self, pairs: I) -> Result<LocalContext<'_>, FolioError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<OverrideValue>,
    {
        let rotation = RotationOverrides::from_pairs(pairs)?;
        let x = rotation.x.unwrap_or_else(|| self.x.to_f32());
        let y = rotation.y.unwrap_or_else(|| self.y.to_f32());
        self.rotation(rotation.angle, x, y)
    }

    pub fn with_local_context<T>(
        &mut self,
        overrides: ContextOverrides,
        f: impl FnOnce(&mut Folio) -> T,
    ) -> Result<T, FolioError> {
        let mut scope = self.local_context(overrides)?;
        Ok(f(&mut scope))
    }

    pub fn with_rotation<T>(
        &mut self,
        angle: f32,
        x: f32,
        y: f32,
        f: impl FnOnce(&mut Folio) -> T,
    ) -> Result<T, FolioError> {
        let mut scope = self.rotation(angle, x, y)?;
        Ok(f(&mut scope))
    }

    /// Limits drawing through the returned guard to a rectangle. The clip is
    /// applied before any rotation opened in the same scope.
    pub fn clip(
        &mut self,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    ) -> Result<LocalContext<'_>, FolioError> {
        for value in [x, y, width, height] {
            if !value.is_finite() {
                return Err(FolioError::InvalidConfiguration(format!(
                    "clip rectangle must be finite (got {value})"
                )));
            }
        }
        self.local_context(ContextOverrides::new().clip(Rect::new(x, y, width, height)))
    }

    /// Opens a scope without a guard. Must be balanced by
    /// [`Folio::end_local_context`]; returns the new depth.
    pub fn begin_local_context(&mut self, overrides: &ContextOverrides) -> Result<usize, FolioError> {
        self.enter_scope(overrides)
    }

    pub fn end_local_context(&mut self) -> Result<(), FolioError> {
        self.exit_scope()
    }

    fn enter_scope(&mut self, overrides: &ContextOverrides) -> Result<usize, FolioError> {
        if self.current.is_none() {
            return Err(FolioError::NoPageOpen);
        }
        overrides.validate()?;
        if overrides.font_family.is_some() || overrides.font_style.is_some() {
            let state = self.states.current();
            let family = overrides
                .font_family
                .as_deref()
                .unwrap_or(&state.font_family);
            let style = overrides.font_style.unwrap_or(state.font_style);
            if self.registry.resolve_font(family, style).is_none() {
                return Err(FolioError::UndefinedFont(font_label(family, style)));
            }
        }
        let depth = self.states.push(overrides)?;
        let page = self.page_mut()?;
        page.save_state();
        if let Some(rect) = overrides.clip {
            page.clip(rect);
        }
        if let Some(rotation) = overrides.rotation {
            page.rotate(rotation.angle, rotation.x, rotation.y);
        }
        Ok(depth)
    }

    fn exit_scope(&mut self) -> Result<(), FolioError> {
        self.states.pop()?;
        if let Some(page) = self.current.as_mut() {
            page.restore_state();
        }
        Ok(())
    }

    // --- cursor ---

    pub fn x(&self) -> f32 {
        self.x.to_f32()
    }

    pub fn y(&self) -> f32 {
        self.y.to_f32()
    }

    pub fn set_x(&mut self, x: f32) {
        self.x = Pt::from_f32(x);
    }

    /// Also moves the cursor back to the left margin.
    pub fn set_y(&mut self, y: f32) {
        self.x = self.margins.left;
        self.y = Pt::from_f32(y);
    }

    pub fn set_xy(&mut self, x: f32, y: f32) {
        self.set_y(y);
        self.set_x(x);
    }

    /// Line break: back to the left margin and down by `height`, or by the
    /// height of the last cell.
    pub fn ln(&mut self, height: Option<f32>) {
        self.x = self.margins.left;
        self.y += height.map(Pt::from_f32).unwrap_or(self.last_cell_height);
    }

    /// Effective page width: the width between the margins.
    pub fn epw(&self) -> f32 {
        (self.page_size.width - self.margins.left - self.margins.right).to_f32()
    }

    // --- drawing ---

    pub fn cell(&mut self, cell: Cell) -> Result<(), FolioError> {
        if self.current.is_none() {
            return Err(FolioError::NoPageOpen);
        }
        let state = self.states.current().clone();
        let font = self
            .registry
            .resolve_font(&state.font_family, state.font_style)
            .ok_or_else(|| FolioError::UndefinedFont(font_label(&state.font_family, state.font_style)))?;
        let padding = Pt::from_mm(CELL_PADDING_MM);
        let text_width = self
            .registry
            .string_width(&state.font_family, state.font_style, state.font_size, &cell.text)
            * (state.stretching / 100.0);
        let underline = match font {
            FontRef::Embedded(index) => self
                .registry
                .embedded_font(index)
                .and_then(|font| font.metrics().ok())
                .and_then(|metrics| metrics.underline),
            FontRef::Core(_) => None,
        }
        .unwrap_or(DecorationMetrics {
            position: CORE_UNDERLINE_POSITION,
            thickness: CORE_UNDERLINE_THICKNESS,
        });

        let x = self.x;
        let y = self.y;
        let width = match cell.width {
            None => text_width + padding + padding,
            Some(w) if w == 0.0 => self.page_size.width - self.margins.right - x,
            Some(w) => Pt::from_f32(w),
        };
        let height = cell
            .height
            .map(Pt::from_f32)
            .unwrap_or(state.font_size);
        let text_offset = match cell.align {
            Align::Left => padding,
            Align::Right => width - padding - text_width,
            Align::Center => (width - text_width) / 2.0,
        };

        let page = self.page_mut()?;
        if let Some(style) = PaintStyle::from_flags(cell.border, cell.fill) {
            if cell.fill {
                page.set_fill_color(state.fill_color);
            }
            if cell.border {
                page.set_stroke_color(state.draw_color);
                page.set_line_width(state.line_width);
            }
            page.draw_rect(x, y, width, height, style);
        }
        if !cell.text.is_empty() {
            let baseline = y + height / 2.0 + state.font_size * 0.3;
            page.set_fill_color(state.text_color);
            page.draw_text(
                x + text_offset,
                baseline,
                font,
                state.font_size,
                state.stretching,
                cell.text.as_str(),
            );
            if state.font_style.underline {
                page.draw_rect(
                    x + text_offset,
                    baseline - state.font_size.mul_ratio(underline.position as i32, 1000),
                    text_width,
                    state
                        .font_size
                        .mul_ratio(underline.thickness as i32, 1000),
                    PaintStyle::Fill,
                );
            }
        }

        self.last_cell_height = height;
        self.x = match cell.new_x {
            XPos::Left => x,
            XPos::Right => x + width,
            XPos::Start => x + text_offset,
            XPos::End => x + text_offset + text_width,
            XPos::Center => x + text_offset + text_width / 2.0,
            XPos::LMargin => self.margins.left,
            XPos::RMargin => self.page_size.width - self.margins.right,
        };
        self.y = match cell.new_y {
            YPos::Top => y,
            YPos::Next => y + height,
            YPos::TMargin => self.margins.top,
            YPos::BMargin => self.page_size.height - self.margins.bottom,
        };
        Ok(())
    }

    pub fn rect(&mut self, x: f32, y: f32, width: f32, height: f32, style: PaintStyle) -> Result<(), FolioError> {
        let state = self.states.current().clone();
        let page = self.page_mut()?;
        if matches!(style, PaintStyle::Fill | PaintStyle::FillStroke) {
            page.set_fill_color(state.fill_color);
        }
        if matches!(style, PaintStyle::Stroke | PaintStyle::FillStroke) {
            page.set_stroke_color(state.draw_color);
            page.set_line_width(state.line_width);
        }
        page.draw_rect(
            Pt::from_f32(x),
            Pt::from_f32(y),
            Pt::from_f32(width),
            Pt::from_f32(height),
            style,
        );
        Ok(())
    }

    pub fn line(&mut self, x1: f32, y1: f32, x2: f32, y2: f32) -> Result<(), FolioError> {
        let state = self.states.current().clone();
        let page = self.page_mut()?;
        page.set_stroke_color(state.draw_color);
        page.set_line_width(state.line_width);
        page.draw_line(
            Pt::from_f32(x1),
            Pt::from_f32(y1),
            Pt::from_f32(x2),
            Pt::from_f32(y2),
        );
        Ok(())
    }
}

fn font_label(family: &str, style: FontStyle) -> String {
    format!("{}{}", font::normalize_family(family), style.key())
}

impl FolioBuilder {
    pub fn new() -> Self {
        Self {
            page_size: Size::a4(),
            // 1 cm
            margins: Margins::all(28.35),
            compress: true,
            compression_capture: CompressionCapture::PerPage,
            title: None,
        }
    }

    /// Starts from the defaults and applies `FOLIO_COMPRESS` and
    /// `FOLIO_COMPRESSION_CAPTURE` when they are set.
    pub fn from_env() -> Result<Self, FolioError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, FolioError> {
        let mut builder = Self::new();
        if let Some(raw) = lookup("FOLIO_COMPRESS") {
            builder.compress = parse_flag("FOLIO_COMPRESS", &raw)?;
        }
        if let Some(raw) = lookup("FOLIO_COMPRESSION_CAPTURE") {
            builder.compression_capture = raw.parse()?;
        }
        Ok(builder)
    }

    pub fn page_size(mut self, size: Size) -> Self {
        self.page_size = size;
        self
    }

    pub fn margins(mut self, margins: Margins) -> Self {
        self.margins = margins;
        self
    }

    pub fn margin_all(mut self, value: f32) -> Self {
        self.margins = Margins::all(value);
        self
    }

    pub fn compress(mut self, enabled: bool) -> Self {
        self.compress = enabled;
        self
    }

    pub fn compression_capture(mut self, capture: CompressionCapture) -> Self {
        self.compression_capture = capture;
        self
    }

    /// Deprecated: font metrics are no longer cached on disk. Accepted for
    /// compatibility and ignored.
    pub fn font_cache_dir(self, _dir: impl Into<PathBuf>) -> Self {
        legacy::warn_deprecated("font_cache_dir", "font metrics are computed on demand");
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn build(self) -> Result<Folio, FolioError> {
        if self.page_size.width <= Pt::ZERO || self.page_size.height <= Pt::ZERO {
            return Err(FolioError::InvalidConfiguration(
                "page size must be positive".to_string(),
            ));
        }
        let m = self.margins;
        if [m.top, m.right, m.bottom, m.left].iter().any(|v| *v < Pt::ZERO) {
            return Err(FolioError::InvalidConfiguration(
                "margins must not be negative".to_string(),
            ));
        }
        if m.left + m.right >= self.page_size.width || m.top + m.bottom >= self.page_size.height {
            return Err(FolioError::InvalidConfiguration(
                "margins leave no printable area".to_string(),
            ));
        }
        Ok(Folio {
            page_size: self.page_size,
            margins: self.margins,
            compress: self.compress,
            compression_capture: self.compression_capture,
            captured_compress: None,
            title: self.title,
            registry: ResourceRegistry::new(),
            states: GraphicsStateStack::new(),
            pages: Vec::new(),
            current: None,
            x: self.margins.left,
            y: self.margins.top,
            last_cell_height: Pt::ZERO,
        })
    }
}

impl Default for FolioBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_flag(key: &str, raw: &str) -> Result<bool, FolioError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(FolioError::InvalidConfiguration(format!(
            "{key} must be a boolean, got {other:?}"
        ))),
    }
}

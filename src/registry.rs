use crate::error::FolioError;
use crate::font::{CoreFont, FontRegistry, FontResource, FontSource};
use crate::image::{ImageHandle, ImageRegistry, ImageSource};
use crate::types::{FontStyle, Pt};

/// Font a text command refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FontRef {
    Core(CoreFont),
    Embedded(usize),
}

/// Every binary asset a document embeds. Owned by a single document; resource
/// indices are stable for its lifetime.
#[derive(Debug, Default)]
pub struct ResourceRegistry {
    fonts: FontRegistry,
    images: ImageRegistry,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_font(
        &mut self,
        family: &str,
        style: FontStyle,
        source: FontSource,
    ) -> Result<Option<usize>, FolioError> {
        self.fonts.register_font(family, style, source)
    }

    pub fn register_image(
        &mut self,
        source: ImageSource,
        compress: bool,
    ) -> Result<ImageHandle, FolioError> {
        self.images.register_image(source, compress)
    }

    /// Built-in faces win over registrations, which cannot shadow them anyway.
    pub fn resolve_font(&self, family: &str, style: FontStyle) -> Option<FontRef> {
        if let Some(core) = CoreFont::lookup(family, style) {
            return Some(FontRef::Core(core));
        }
        self.fonts
            .resolve(family, style)
            .map(|font| FontRef::Embedded(font.index()))
    }

    pub fn embedded_font(&self, index: usize) -> Option<&FontResource> {
        self.fonts.get(index)
    }

    pub fn string_width(&self, family: &str, style: FontStyle, font_size: Pt, text: &str) -> Pt {
        self.fonts.string_width(family, style, font_size, text)
    }

    pub fn fonts(&self) -> &FontRegistry {
        &self.fonts
    }

    pub fn images(&self) -> &ImageRegistry {
        &self.images
    }
}

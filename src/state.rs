//! Graphics state and the per-page stack of nested scopes.
//!
//! The bottom entry of the stack is the page base state. Every scope pushes a
//! copy of the top with its overrides applied and pops it on exit, so fields a
//! scope does not override are inherited from the enclosing one. Between pages
//! the stack is empty and settings go to a detached state that seeds the next
//! page.

use crate::error::FolioError;
use crate::types::{Color, FontStyle, Pt, Rect};

/// Pivoted rotation. The angle is in degrees, counter-clockwise; the pivot is
/// in page coordinates with the origin at the top left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rotation {
    pub angle: f32,
    pub x: Pt,
    pub y: Pt,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GraphicsState {
    pub font_family: String,
    pub font_style: FontStyle,
    pub font_size: Pt,
    pub text_color: Color,
    pub fill_color: Color,
    pub draw_color: Color,
    pub line_width: Pt,
    pub stretching: f32,
    pub rotation: Option<Rotation>,
    /// Intersection of every clip opened by the enclosing scopes.
    pub clip: Option<Rect>,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            font_family: "helvetica".to_string(),
            font_style: FontStyle::REGULAR,
            font_size: Pt::from_i32(12),
            text_color: Color::BLACK,
            fill_color: Color::BLACK,
            draw_color: Color::BLACK,
            // 0.2 mm
            line_width: Pt::from_f32(0.567),
            stretching: 100.0,
            rotation: None,
            clip: None,
        }
    }
}

/// A value in a key/value override list.
#[derive(Debug, Clone, PartialEq)]
pub enum OverrideValue {
    Text(String),
    Number(f32),
    Color(Color),
    Rotation(Rotation),
    Rect(Rect),
}

impl From<&str> for OverrideValue {
    fn from(value: &str) -> Self {
        OverrideValue::Text(value.to_string())
    }
}

impl From<String> for OverrideValue {
    fn from(value: String) -> Self {
        OverrideValue::Text(value)
    }
}

impl From<f32> for OverrideValue {
    fn from(value: f32) -> Self {
        OverrideValue::Number(value)
    }
}

impl From<i32> for OverrideValue {
    fn from(value: i32) -> Self {
        OverrideValue::Number(value as f32)
    }
}

impl From<Color> for OverrideValue {
    fn from(value: Color) -> Self {
        OverrideValue::Color(value)
    }
}

impl From<(u8, u8, u8)> for OverrideValue {
    fn from(value: (u8, u8, u8)) -> Self {
        OverrideValue::Color(value.into())
    }
}

impl From<Rotation> for OverrideValue {
    fn from(value: Rotation) -> Self {
        OverrideValue::Rotation(value)
    }
}

impl From<Rect> for OverrideValue {
    fn from(value: Rect) -> Self {
        OverrideValue::Rect(value)
    }
}

/// Fields a scope changes. Anything left `None` is inherited.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextOverrides {
    pub font_family: Option<String>,
    pub font_style: Option<FontStyle>,
    pub font_size: Option<f32>,
    pub text_color: Option<Color>,
    pub fill_color: Option<Color>,
    pub draw_color: Option<Color>,
    pub line_width: Option<f32>,
    pub stretching: Option<f32>,
    pub rotation: Option<Rotation>,
    pub clip: Option<Rect>,
}

impl ContextOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn font_family(mut self, family: impl Into<String>) -> Self {
        self.font_family = Some(family.into());
        self
    }

    pub fn font_style(mut self, style: FontStyle) -> Self {
        self.font_style = Some(style);
        self
    }

    pub fn font_size(mut self, size: f32) -> Self {
        self.font_size = Some(size);
        self
    }

    pub fn text_color(mut self, color: impl Into<Color>) -> Self {
        self.text_color = Some(color.into());
        self
    }

    pub fn fill_color(mut self, color: impl Into<Color>) -> Self {
        self.fill_color = Some(color.into());
        self
    }

    pub fn draw_color(mut self, color: impl Into<Color>) -> Self {
        self.draw_color = Some(color.into());
        self
    }

    pub fn line_width(mut self, width: f32) -> Self {
        self.line_width = Some(width);
        self
    }

    pub fn stretching(mut self, percent: f32) -> Self {
        self.stretching = Some(percent);
        self
    }

    pub fn rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = Some(rotation);
        self
    }

    pub fn clip(mut self, rect: Rect) -> Self {
        self.clip = Some(rect);
        self
    }

    /// Builds overrides from `(key, value)` pairs. Any unknown key or value of
    /// the wrong shape fails the whole list.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, FolioError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<OverrideValue>,
    {
        let mut overrides = ContextOverrides::default();
        for (key, value) in pairs {
            let key = key.as_ref();
            let value = value.into();
            match key {
                "font_family" => overrides.font_family = Some(expect_text(key, value)?),
                "font_style" => {
                    overrides.font_style = Some(FontStyle::parse(&expect_text(key, value)?)?)
                }
                "font_size" => overrides.font_size = Some(expect_number(key, value)?),
                "text_color" => overrides.text_color = Some(expect_color(key, value)?),
                "fill_color" => overrides.fill_color = Some(expect_color(key, value)?),
                "draw_color" => overrides.draw_color = Some(expect_color(key, value)?),
                "line_width" => overrides.line_width = Some(expect_number(key, value)?),
                "stretching" => overrides.stretching = Some(expect_number(key, value)?),
                "rotation" => match value {
                    OverrideValue::Rotation(rotation) => overrides.rotation = Some(rotation),
                    other => return Err(wrong_shape(key, "a rotation", &other)),
                },
                "clip" => match value {
                    OverrideValue::Rect(rect) => overrides.clip = Some(rect),
                    other => return Err(wrong_shape(key, "a rectangle", &other)),
                },
                _ => {
                    return Err(FolioError::InvalidConfiguration(format!(
                        "unknown graphics context key {key:?}"
                    )));
                }
            }
        }
        Ok(overrides)
    }

    pub fn is_empty(&self) -> bool {
        *self == ContextOverrides::default()
    }

    pub fn validate(&self) -> Result<(), FolioError> {
        if let Some(size) = self.font_size {
            if !size.is_finite() || size <= 0.0 {
                return Err(invalid("font_size must be a positive number", size));
            }
        }
        if let Some(width) = self.line_width {
            if !width.is_finite() || width < 0.0 {
                return Err(invalid("line_width must not be negative", width));
            }
        }
        if let Some(stretching) = self.stretching {
            if !stretching.is_finite() || stretching <= 0.0 {
                return Err(invalid("stretching must be a positive percentage", stretching));
            }
        }
        if let Some(rotation) = self.rotation {
            if !rotation.angle.is_finite() {
                return Err(invalid("rotation angle must be finite", rotation.angle));
            }
        }
        if let Some(rect) = self.clip {
            if rect.width < Pt::ZERO || rect.height < Pt::ZERO {
                return Err(FolioError::InvalidConfiguration(format!(
                    "clip rectangle must not have a negative size (got {rect:?})"
                )));
            }
        }
        if let Some(family) = &self.font_family {
            if family.trim().is_empty() {
                return Err(FolioError::InvalidConfiguration(
                    "font_family must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }

    fn apply(&self, state: &mut GraphicsState) {
        if let Some(family) = &self.font_family {
            state.font_family = family.trim().to_ascii_lowercase();
        }
        if let Some(style) = self.font_style {
            state.font_style = style;
        }
        if let Some(size) = self.font_size {
            state.font_size = Pt::from_f32(size);
        }
        if let Some(color) = self.text_color {
            state.text_color = color;
        }
        if let Some(color) = self.fill_color {
            state.fill_color = color;
        }
        if let Some(color) = self.draw_color {
            state.draw_color = color;
        }
        if let Some(width) = self.line_width {
            state.line_width = Pt::from_f32(width);
        }
        if let Some(stretching) = self.stretching {
            state.stretching = stretching;
        }
        if let Some(rotation) = self.rotation {
            state.rotation = Some(rotation);
        }
        if let Some(rect) = self.clip {
            state.clip = Some(match state.clip {
                Some(outer) => outer.intersect(&rect),
                None => rect,
            });
        }
    }
}

/// Arguments of a rotation scope. A missing pivot coordinate means the current
/// cursor position.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RotationOverrides {
    pub angle: f32,
    pub x: Option<f32>,
    pub y: Option<f32>,
}

impl RotationOverrides {
    /// Only `angle`, `x` and `y` are accepted here; general context keys such
    /// as `font_size` are rejected.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, FolioError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<OverrideValue>,
    {
        let mut angle = None;
        let mut rotation = RotationOverrides::default();
        for (key, value) in pairs {
            let key = key.as_ref();
            let value = value.into();
            match key {
                "angle" => angle = Some(expect_finite(key, value)?),
                "x" => rotation.x = Some(expect_finite(key, value)?),
                "y" => rotation.y = Some(expect_finite(key, value)?),
                _ => {
                    return Err(FolioError::InvalidConfiguration(format!(
                        "unexpected rotation argument {key:?}; only angle, x and y are accepted"
                    )));
                }
            }
        }
        rotation.angle = angle.ok_or_else(|| {
            FolioError::InvalidConfiguration("rotation requires an angle".to_string())
        })?;
        Ok(rotation)
    }
}

fn expect_text(key: &str, value: OverrideValue) -> Result<String, FolioError> {
    match value {
        OverrideValue::Text(text) => Ok(text),
        other => Err(wrong_shape(key, "text", &other)),
    }
}

fn expect_number(key: &str, value: OverrideValue) -> Result<f32, FolioError> {
    match value {
        OverrideValue::Number(number) => Ok(number),
        other => Err(wrong_shape(key, "a number", &other)),
    }
}

fn expect_finite(key: &str, value: OverrideValue) -> Result<f32, FolioError> {
    let number = expect_number(key, value)?;
    if !number.is_finite() {
        return Err(invalid(&format!("{key} must be finite"), number));
    }
    Ok(number)
}

// A plain number is a grey level.
fn expect_color(key: &str, value: OverrideValue) -> Result<Color, FolioError> {
    match value {
        OverrideValue::Color(color) => Ok(color),
        OverrideValue::Number(level) if level.is_finite() && (0.0..=255.0).contains(&level) => {
            Ok(Color::gray8(level.round() as u8))
        }
        other => Err(wrong_shape(key, "a colour", &other)),
    }
}

fn wrong_shape(key: &str, expected: &str, got: &OverrideValue) -> FolioError {
    FolioError::InvalidConfiguration(format!("{key} expects {expected}, got {got:?}"))
}

fn invalid(message: &str, value: f32) -> FolioError {
    FolioError::InvalidConfiguration(format!("{message} (got {value})"))
}

#[derive(Debug, Clone, Default)]
pub struct GraphicsStateStack {
    stack: Vec<GraphicsState>,
    // Parallel to `stack`; tells apart scopes that reuse the same depth.
    ids: Vec<u64>,
    next_id: u64,
    detached: GraphicsState,
}

impl GraphicsStateStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_page_open(&self) -> bool {
        !self.stack.is_empty()
    }

    /// 0 between pages, 1 for a page with no open scopes.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn current(&self) -> &GraphicsState {
        self.stack.last().unwrap_or(&self.detached)
    }

    pub fn current_mut(&mut self) -> &mut GraphicsState {
        match self.stack.last_mut() {
            Some(top) => top,
            None => &mut self.detached,
        }
    }

    pub fn open_page(&mut self) -> Result<(), FolioError> {
        if self.is_page_open() {
            return Err(FolioError::InvalidConfiguration(
                "a page is already open".to_string(),
            ));
        }
        let mut base = self.detached.clone();
        // Transforms and clips belong to the page they were made on.
        base.rotation = None;
        base.clip = None;
        self.stack.push(base);
        let id = self.issue_id();
        self.ids.push(id);
        Ok(())
    }

    /// Ends the page. Scopes still open are discarded and reported as
    /// `UnclosedScopes`; the stack is empty afterwards either way.
    pub fn close_page(&mut self) -> Result<(), FolioError> {
        if !self.is_page_open() {
            return Err(FolioError::NoPageOpen);
        }
        let open = self.stack.len() - 1;
        self.stack.truncate(1);
        self.ids.clear();
        if let Some(base) = self.stack.pop() {
            self.detached = base;
        }
        if open > 0 {
            return Err(FolioError::UnclosedScopes { open });
        }
        Ok(())
    }

    /// Pushes a copy of the top with `overrides` applied and returns the new
    /// depth. Nothing changes when validation fails.
    pub fn push(&mut self, overrides: &ContextOverrides) -> Result<usize, FolioError> {
        let top = self.stack.last().ok_or(FolioError::NoPageOpen)?;
        overrides.validate()?;
        let mut next = top.clone();
        overrides.apply(&mut next);
        self.stack.push(next);
        let id = self.issue_id();
        self.ids.push(id);
        Ok(self.stack.len())
    }

    pub fn pop(&mut self) -> Result<GraphicsState, FolioError> {
        match self.stack.len() {
            0 => Err(FolioError::NoPageOpen),
            1 => Err(FolioError::StackUnderflow),
            _ => {
                self.ids.pop();
                self.stack.pop().ok_or(FolioError::StackUnderflow)
            }
        }
    }

    /// Identifier of the scope at `depth`. Never reused within a document,
    /// so a scope can check it is still the one it opened.
    pub fn scope_id(&self, depth: usize) -> Option<u64> {
        depth.checked_sub(1).and_then(|idx| self.ids.get(idx)).copied()
    }

    fn issue_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open() -> GraphicsStateStack {
        let mut stack = GraphicsStateStack::new();
        stack.open_page().unwrap();
        stack
    }

    #[test]
    fn defaults_match_pdf_initial_state() {
        let state = GraphicsState::default();
        assert_eq!(state.font_family, "helvetica");
        assert_eq!(state.font_size, Pt::from_i32(12));
        assert_eq!(state.text_color, Color::BLACK);
        assert_eq!(state.stretching, 100.0);
        assert_eq!(state.line_width.to_milli_i64(), 567);
        assert!(state.rotation.is_none());
    }

    #[test]
    fn nested_push_pop_round_trips() {
        let mut stack = open();
        let base = stack.current().clone();

        let depth = stack
            .push(&ContextOverrides::new().font_size(24.0).fill_color(Color::from_rgb8(255, 0, 0)))
            .unwrap();
        assert_eq!(depth, 2);
        let outer = stack.current().clone();
        assert_eq!(outer.font_size, Pt::from_i32(24));

        stack.push(&ContextOverrides::new().line_width(2.0)).unwrap();
        assert_eq!(stack.current().font_size, Pt::from_i32(24));
        assert_eq!(stack.current().fill_color, Color::from_rgb8(255, 0, 0));

        stack.pop().unwrap();
        assert_eq!(stack.current(), &outer);
        stack.pop().unwrap();
        assert_eq!(stack.current(), &base);
        assert_eq!(stack.depth(), 1);
    }

    #[test]
    fn unknown_key_fails_before_mutation() {
        let mut stack = open();
        let err = ContextOverrides::from_pairs([
            ("font_size", OverrideValue::from(20)),
            ("font_wobble", OverrideValue::from(1)),
        ])
        .unwrap_err();
        assert!(matches!(err, FolioError::InvalidConfiguration(_)));
        assert_eq!(stack.depth(), 1);

        let err = stack
            .push(&ContextOverrides::new().font_size(0.0))
            .unwrap_err();
        assert!(matches!(err, FolioError::InvalidConfiguration(_)));
        assert_eq!(stack.depth(), 1);
        assert_eq!(stack.current(), &GraphicsState::default());
    }

    #[test]
    fn wrong_value_shape_is_rejected() {
        assert!(ContextOverrides::from_pairs([("font_size", "big")]).is_err());
        assert!(ContextOverrides::from_pairs([("font_style", "BQ")]).is_err());
        let overrides =
            ContextOverrides::from_pairs([("text_color", OverrideValue::from(128))]).unwrap();
        assert_eq!(overrides.text_color, Some(Color::from((128, 128, 128))));
    }

    #[test]
    fn rotation_pairs_reject_context_keys() {
        let err = RotationOverrides::from_pairs([("font_size", 24)]).unwrap_err();
        assert!(err.to_string().contains("font_size"));
        let rotation = RotationOverrides::from_pairs([("angle", 30), ("x", 10)]).unwrap();
        assert_eq!(rotation.angle, 30.0);
        assert_eq!(rotation.x, Some(10.0));
        assert_eq!(rotation.y, None);
    }

    #[test]
    fn rotation_pairs_need_a_finite_angle_and_pivot() {
        let err = RotationOverrides::from_pairs([("x", 10), ("y", 20)]).unwrap_err();
        assert!(matches!(err, FolioError::InvalidConfiguration(_)));
        assert!(err.to_string().contains("angle"));

        assert!(RotationOverrides::from_pairs([("angle", f32::NAN)]).is_err());
        let err = RotationOverrides::from_pairs([
            ("angle", OverrideValue::from(30)),
            ("x", OverrideValue::from(f32::INFINITY)),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("x must be finite"));
    }

    #[test]
    fn nested_clips_intersect_and_unwind() {
        let mut stack = open();
        stack
            .push(&ContextOverrides::new().clip(Rect::new(0.0, 0.0, 100.0, 100.0)))
            .unwrap();
        let overrides =
            ContextOverrides::from_pairs([("clip", Rect::new(50.0, 50.0, 100.0, 100.0))]).unwrap();
        stack.push(&overrides).unwrap();
        assert_eq!(stack.current().clip, Some(Rect::new(50.0, 50.0, 50.0, 50.0)));

        stack.pop().unwrap();
        assert_eq!(stack.current().clip, Some(Rect::new(0.0, 0.0, 100.0, 100.0)));
        stack.pop().unwrap();
        assert_eq!(stack.current().clip, None);

        let err = stack
            .push(&ContextOverrides::new().clip(Rect::new(0.0, 0.0, -1.0, 5.0)))
            .unwrap_err();
        assert!(matches!(err, FolioError::InvalidConfiguration(_)));
        assert!(ContextOverrides::from_pairs([("clip", 3)]).is_err());
    }

    #[test]
    fn scope_ids_differ_for_reused_depths() {
        let mut stack = open();
        let depth = stack.push(&ContextOverrides::new()).unwrap();
        let first = stack.scope_id(depth).unwrap();
        stack.pop().unwrap();
        assert_eq!(stack.scope_id(depth), None);

        let again = stack.push(&ContextOverrides::new()).unwrap();
        assert_eq!(again, depth);
        assert_ne!(stack.scope_id(again), Some(first));
        assert!(stack.scope_id(1).is_some());
        assert_eq!(stack.scope_id(0), None);
    }

    #[test]
    fn base_state_cannot_be_popped() {
        let mut stack = open();
        assert!(matches!(stack.pop(), Err(FolioError::StackUnderflow)));
        assert_eq!(stack.depth(), 1);

        let mut closed = GraphicsStateStack::new();
        assert!(matches!(closed.pop(), Err(FolioError::NoPageOpen)));
        assert!(matches!(
            closed.push(&ContextOverrides::new()),
            Err(FolioError::NoPageOpen)
        ));
    }

    #[test]
    fn closing_with_open_scopes_is_reported() {
        let mut stack = open();
        stack.push(&ContextOverrides::new()).unwrap();
        stack.push(&ContextOverrides::new()).unwrap();
        let err = stack.close_page().unwrap_err();
        assert!(matches!(err, FolioError::UnclosedScopes { open: 2 }));
        assert_eq!(stack.depth(), 0);
        assert!(!stack.is_page_open());
    }

    #[test]
    fn settings_between_pages_seed_the_next_page() {
        let mut stack = GraphicsStateStack::new();
        stack.current_mut().font_size = Pt::from_i32(18);
        stack.open_page().unwrap();
        assert_eq!(stack.current().font_size, Pt::from_i32(18));
        stack.current_mut().font_family = "courier".to_string();
        stack.close_page().unwrap();
        assert_eq!(stack.current().font_family, "courier");
    }
}

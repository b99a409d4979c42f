use crate::registry::FontRef;
use crate::types::{Color, Pt, Rect};

/// How a closed shape is painted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaintStyle {
    Stroke,
    Fill,
    FillStroke,
}

impl PaintStyle {
    pub fn from_flags(stroke: bool, fill: bool) -> Option<Self> {
        match (stroke, fill) {
            (true, true) => Some(PaintStyle::FillStroke),
            (true, false) => Some(PaintStyle::Stroke),
            (false, true) => Some(PaintStyle::Fill),
            (false, false) => None,
        }
    }

    pub fn operator(self) -> &'static str {
        match self {
            PaintStyle::Stroke => "S",
            PaintStyle::Fill => "f",
            PaintStyle::FillStroke => "B",
        }
    }
}

// Coordinates in commands use a top-left origin; the PDF writer flips them.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SaveState,
    RestoreState,
    Rotate {
        angle: f32,
        x: Pt,
        y: Pt,
    },
    // Intersects the clipping path with the rectangle.
    Clip(Rect),
    SetFillColor(Color),
    SetStrokeColor(Color),
    SetLineWidth(Pt),
    // `y` is the baseline.
    DrawText {
        x: Pt,
        y: Pt,
        font: FontRef,
        size: Pt,
        stretching: f32,
        text: String,
    },
    DrawRect {
        x: Pt,
        y: Pt,
        width: Pt,
        height: Pt,
        style: PaintStyle,
    },
    DrawLine {
        x1: Pt,
        y1: Pt,
        x2: Pt,
        y2: Pt,
    },
    DrawImage {
        x: Pt,
        y: Pt,
        width: Pt,
        height: Pt,
        index: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PaintState {
    fill: Color,
    stroke: Color,
    line_width: Pt,
}

impl Default for PaintState {
    // What a PDF viewer starts every content stream with.
    fn default() -> Self {
        Self {
            fill: Color::BLACK,
            stroke: Color::BLACK,
            line_width: Pt::from_i32(1),
        }
    }
}

/// Commands recorded for one page, plus the compression flag captured when it
/// was opened.
#[derive(Debug, Clone)]
pub struct Page {
    commands: Vec<Command>,
    compress: bool,
    emitted: PaintState,
    saved: Vec<PaintState>,
}

impl Page {
    pub fn new(compress: bool) -> Self {
        Self {
            commands: Vec::new(),
            compress,
            emitted: PaintState::default(),
            saved: Vec::new(),
        }
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn compress(&self) -> bool {
        self.compress
    }

    pub fn save_state(&mut self) {
        self.saved.push(self.emitted);
        self.commands.push(Command::SaveState);
    }

    pub fn restore_state(&mut self) {
        if let Some(state) = self.saved.pop() {
            self.emitted = state;
            self.commands.push(Command::RestoreState);
        }
    }

    pub fn open_saves(&self) -> usize {
        self.saved.len()
    }

    pub fn rotate(&mut self, angle: f32, x: Pt, y: Pt) {
        self.commands.push(Command::Rotate { angle, x, y });
    }

    pub fn clip(&mut self, rect: Rect) {
        self.commands.push(Command::Clip(rect));
    }

    pub fn set_fill_color(&mut self, color: Color) {
        if self.emitted.fill == color {
            return;
        }
        self.emitted.fill = color;
        self.commands.push(Command::SetFillColor(color));
    }

    pub fn set_stroke_color(&mut self, color: Color) {
        if self.emitted.stroke == color {
            return;
        }
        self.emitted.stroke = color;
        self.commands.push(Command::SetStrokeColor(color));
    }

    pub fn set_line_width(&mut self, width: Pt) {
        let width = width.max(Pt::ZERO);
        if self.emitted.line_width == width {
            return;
        }
        self.emitted.line_width = width;
        self.commands.push(Command::SetLineWidth(width));
    }

    pub fn draw_text(
        &mut self,
        x: Pt,
        y: Pt,
        font: FontRef,
        size: Pt,
        stretching: f32,
        text: impl Into<String>,
    ) {
        self.commands.push(Command::DrawText {
            x,
            y,
            font,
            size,
            stretching,
            text: text.into(),
        });
    }

    pub fn draw_rect(&mut self, x: Pt, y: Pt, width: Pt, height: Pt, style: PaintStyle) {
        self.commands.push(Command::DrawRect {
            x,
            y,
            width,
            height,
            style,
        });
    }

    pub fn draw_line(&mut self, x1: Pt, y1: Pt, x2: Pt, y2: Pt) {
        self.commands.push(Command::DrawLine { x1, y1, x2, y2 });
    }

    pub fn draw_image(&mut self, x: Pt, y: Pt, width: Pt, height: Pt, index: usize) {
        self.commands.push(Command::DrawImage {
            x,
            y,
            width,
            height,
            index,
        });
    }
}

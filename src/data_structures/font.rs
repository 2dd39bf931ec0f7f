//! Typeface JSON fonts and extruded text.
//!
//! Glyph outlines are strings of commands in font units: `m x y` (move),
//! `l x y` (line), `q x y cx cy` (quadratic curve, end point first) and
//! `b x y c1x c1y c2x c2y` (cubic curve, end point first).

use std::collections::HashMap;

use cgmath::Point2;
use serde::Deserialize;

use crate::data_structures::geometry::{
    Bevel, ExtrudeOptions, Geometry, sample_cubic, sample_quadratic, signed_area,
};

#[derive(Clone, Debug, Deserialize)]
pub struct Glyph {
    /// Horizontal advance.
    pub ha: f32,
    #[serde(default)]
    pub o: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingBox {
    pub x_min: f32,
    pub x_max: f32,
    pub y_min: f32,
    pub y_max: f32,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Font {
    #[serde(default)]
    pub family_name: String,
    pub glyphs: HashMap<String, Glyph>,
    /// Font units per em.
    pub resolution: f32,
    #[serde(default)]
    pub bounding_box: BoundingBox,
    #[serde(default)]
    pub underline_thickness: f32,
}

impl Font {
    fn glyph(&self, c: char) -> Option<&Glyph> {
        let mut buf = [0; 4];
        self.glyphs
            .get(c.encode_utf8(&mut buf) as &str)
            .or_else(|| self.glyphs.get("?"))
    }

    /// Sampled closed outlines of `text`, one per sub path, scaled so an em is `size` high.
    pub fn outlines(&self, text: &str, size: f32, curve_segments: usize) -> Vec<Vec<Point2<f32>>> {
        let scale = size / self.resolution.max(1.0);
        let line_height =
            (self.bounding_box.y_max - self.bounding_box.y_min + self.underline_thickness) * scale;
        let mut outlines = Vec::new();
        let (mut offset_x, mut offset_y) = (0.0, 0.0);
        for c in text.chars() {
            if c == '\n' {
                offset_x = 0.0;
                offset_y -= line_height;
                continue;
            }
            let Some(glyph) = self.glyph(c) else {
                log::warn!("font {} has no glyph for {:?}", self.family_name, c);
                continue;
            };
            if let Some(o) = &glyph.o {
                outlines.extend(glyph_outlines(o, scale, offset_x, offset_y, curve_segments));
            }
            offset_x += glyph.ha * scale;
        }
        outlines
    }
}

struct Commands<'a> {
    tokens: std::str::SplitWhitespace<'a>,
    scale: f32,
    offset: Point2<f32>,
}

impl Commands<'_> {
    fn point(&mut self) -> Option<Point2<f32>> {
        let x: f32 = self.tokens.next()?.parse().ok()?;
        let y: f32 = self.tokens.next()?.parse().ok()?;
        Some(Point2::new(
            x * self.scale + self.offset.x,
            y * self.scale + self.offset.y,
        ))
    }
}

fn glyph_outlines(
    commands: &str,
    scale: f32,
    offset_x: f32,
    offset_y: f32,
    curve_segments: usize,
) -> Vec<Vec<Point2<f32>>> {
    let offset = Point2::new(offset_x, offset_y);
    let mut commands = Commands {
        tokens: commands.split_whitespace(),
        scale,
        offset,
    };
    let mut outlines = Vec::new();
    let mut current: Vec<Point2<f32>> = Vec::new();
    while let Some(action) = commands.tokens.next() {
        let last = current.last().copied().unwrap_or(offset);
        let parsed = match action {
            "m" => commands.point().map(|p| {
                if current.len() > 2 {
                    outlines.push(std::mem::take(&mut current));
                }
                current.clear();
                current.push(p);
            }),
            "l" => commands.point().map(|p| current.push(p)),
            "q" => {
                let end = commands.point();
                let control = commands.point();
                end.zip(control).map(|(end, control)| {
                    current.extend(sample_quadratic(last, control, end, curve_segments));
                })
            }
            "b" => {
                let end = commands.point();
                let c1 = commands.point();
                let c2 = commands.point();
                end.zip(c1).zip(c2).map(|((end, c1), c2)| {
                    current.extend(sample_cubic(last, c1, c2, end, curve_segments));
                })
            }
            "z" => Some(()),
            other => {
                log::warn!("unknown glyph outline command {:?}", other);
                None
            }
        };
        if parsed.is_none() {
            break;
        }
    }
    if current.len() > 2 {
        outlines.push(current);
    }
    outlines
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TextOptions {
    pub size: f32,
    pub depth: f32,
    pub curve_segments: usize,
    pub bevel: Option<Bevel>,
}

impl Default for TextOptions {
    fn default() -> Self {
        Self {
            size: 100.0,
            depth: 50.0,
            curve_segments: 12,
            bevel: None,
        }
    }
}

/// Extruded text. Glyph holes (the counters of letters like `O`) are filled.
pub fn text_geometry(font: &Font, text: &str, options: &TextOptions) -> Geometry {
    // Typeface outlines wind clockwise, their holes counter-clockwise
    let solids: Vec<Vec<Point2<f32>>> = font
        .outlines(text, options.size, options.curve_segments)
        .into_iter()
        .filter(|outline| signed_area(outline) < 0.0)
        .collect();
    Geometry::extrude(
        &solids,
        &ExtrudeOptions {
            depth: options.depth,
            steps: 1,
            bevel: options.bevel,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const FONT: &str = r#"{
        "familyName": "Boxes",
        "resolution": 1000,
        "underlineThickness": 50,
        "boundingBox": { "xMin": 0, "xMax": 1000, "yMin": -200, "yMax": 1000 },
        "glyphs": {
            "I": { "ha": 600, "x_min": 0, "x_max": 500, "o": "m 0 0 l 0 1000 l 500 1000 l 500 0 l 0 0 z" },
            "O": { "ha": 1000, "o": "m 0 0 l 0 1000 l 900 1000 l 900 0 l 0 0 m 200 200 l 700 200 l 700 800 l 200 800 l 200 200" },
            " ": { "ha": 300 }
        }
    }"#;

    fn font() -> Font {
        serde_json::from_str(FONT).expect("font json")
    }

    #[test]
    fn glyphs_advance_and_scale() {
        let outlines = font().outlines("I I", 10.0, 4);
        assert_eq!(outlines.len(), 2);
        let second_min_x = outlines[1].iter().map(|p| p.x).fold(f32::MAX, f32::min);
        assert!((second_min_x - 9.0).abs() < 1e-4);
        let max_y = outlines[0].iter().map(|p| p.y).fold(f32::MIN, f32::max);
        assert!((max_y - 10.0).abs() < 1e-4);
    }

    #[test]
    fn newlines_move_down_one_line() {
        let outlines = font().outlines("I\nI", 1.0, 4);
        let min_y = outlines[1].iter().map(|p| p.y).fold(f32::MAX, f32::min);
        assert!((min_y + 1.25).abs() < 1e-4);
    }

    #[test]
    fn text_keeps_solids_and_drops_holes() {
        let font = font();
        let outlines = font.outlines("O", 1.0, 4);
        assert_eq!(outlines.len(), 2);
        let geometry = text_geometry(
            &font,
            "O",
            &TextOptions {
                size: 1.0,
                depth: 0.5,
                curve_segments: 4,
                bevel: None,
            },
        );
        // two caps of two triangles plus four sides of two triangles
        assert_eq!(geometry.vertex_count(), (2 * 2 + 4 * 2) * 3);
        let bounds = geometry.bounding_box();
        assert!((bounds.max.z - 0.5).abs() < 1e-5);
    }

    #[test]
    fn curves_are_sampled() {
        let outlines = glyph_outlines("m 0 0 q 10 0 5 5 l 5 -5", 1.0, 0.0, 0.0, 4);
        // move, four curve samples, line
        assert_eq!(outlines[0].len(), 6);
        assert_eq!(outlines[0][4], Point2::new(10.0, 0.0));
    }
}

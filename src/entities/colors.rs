//! Per-property calendar colors.
//!
//! Properties without an explicit color get one from a fixed hue cycle,
//! indexed by their position in the input sequence. Every full pass through
//! the cycle lowers saturation and raises lightness, so the second "red" is
//! still distinguishable from the first.
//!
//! Assignment is append-only: adding a property at the end never changes
//! colors already handed out.

use std::collections::HashMap;

use super::model::{Property, PropertyId};

/// Red, orange, yellow, green, cyan, light blue, blue, purple, magenta, pink.
/// Hues too close to a neighbour for contrast are skipped.
pub const HUES: [u16; 10] = [0, 30, 60, 120, 180, 210, 240, 270, 300, 330];

const BASE_SATURATION: i64 = 70;
const SATURATION_STEP: i64 = 10;
const BASE_LIGHTNESS: i64 = 50;
const LIGHTNESS_STEP: i64 = 5;

/// Generated swatches darker than this get white text.
const WHITE_TEXT_BELOW_LIGHTNESS: u8 = 60;
/// Explicit colors brighter than this get black text.
const BLACK_TEXT_ABOVE_LUMINANCE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextColor {
    Black,
    White,
}

impl TextColor {
    pub fn css(&self) -> &'static str {
        match self {
            TextColor::Black => "#000000",
            TextColor::White => "#ffffff",
        }
    }
}

/// Background of a property chip / calendar event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Swatch {
    /// User-chosen color, passed through verbatim.
    Explicit(String),
    /// Derived HSL color. Saturation and lightness in percent.
    Generated { hue: u16, saturation: u8, lightness: u8 },
}

impl Swatch {
    pub fn css(&self) -> String {
        match self {
            Swatch::Explicit(color) => color.clone(),
            Swatch::Generated { hue, saturation, lightness } => {
                format!("hsl({}, {}%, {}%)", hue, saturation, lightness)
            }
        }
    }
}

/// Resolved display color for one property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyColor {
    pub property_id: PropertyId,
    pub property_name: String,
    pub background: Swatch,
    pub text: TextColor,
}

impl PropertyColor {
    pub fn background_css(&self) -> String {
        self.background.css()
    }

    pub fn text_css(&self) -> &'static str {
        self.text.css()
    }
}

/// Lookup from property id to its resolved color.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyColors {
    by_id: HashMap<PropertyId, PropertyColor>,
}

impl PropertyColors {
    pub fn get(&self, id: &PropertyId) -> Option<&PropertyColor> {
        self.by_id.get(id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PropertyId, &PropertyColor)> {
        self.by_id.iter()
    }
}

/// Assign a color to every property in `properties`, keyed by id.
///
/// Position `i` in the sequence picks `HUES[i % 10]`; explicit colors still
/// occupy their position so later auto colors don't shift when a color is
/// set or cleared.
pub fn assign_colors<'a, I>(properties: I) -> PropertyColors
where
    I: IntoIterator<Item = &'a Property>,
{
    let by_id = properties
        .into_iter()
        .enumerate()
        .map(|(index, property)| {
            let (background, text) = match property.explicit_color() {
                Some(color) => (Swatch::Explicit(color.to_string()), contrast_text_color(color)),
                None => generated_swatch(index),
            };
            let color = PropertyColor {
                property_id: property.id.clone(),
                property_name: property.name.clone(),
                background,
                text,
            };
            (property.id.clone(), color)
        })
        .collect();

    PropertyColors { by_id }
}

/// Swatch and text color for the property at `index`.
pub fn generated_swatch(index: usize) -> (Swatch, TextColor) {
    let hue = HUES[index % HUES.len()];
    let pass = i64::try_from(index / HUES.len()).unwrap_or(i64::MAX);

    // CSS clamps out-of-range percentages anyway; clamp here so the values
    // fit the swatch fields after many passes.
    let saturation = BASE_SATURATION
        .saturating_sub(pass.saturating_mul(SATURATION_STEP))
        .clamp(0, 100) as u8;
    let lightness = BASE_LIGHTNESS
        .saturating_add(pass.saturating_mul(LIGHTNESS_STEP))
        .clamp(0, 100) as u8;

    let text = if lightness < WHITE_TEXT_BELOW_LIGHTNESS {
        TextColor::White
    } else {
        TextColor::Black
    };

    (Swatch::Generated { hue, saturation, lightness }, text)
}

/// Perceived luminance (0..=1) of a `#rrggbb` color with 0.299/0.587/0.114
/// channel weights. `None` if the color doesn't start with six hex digits.
pub fn relative_luminance(color: &str) -> Option<f64> {
    let hex = color.trim().trim_start_matches('#');
    let channel = |range: std::ops::Range<usize>| {
        hex.get(range).and_then(|digits| u8::from_str_radix(digits, 16).ok())
    };
    let r = f64::from(channel(0..2)?);
    let g = f64::from(channel(2..4)?);
    let b = f64::from(channel(4..6)?);
    Some((0.299 * r + 0.587 * g + 0.114 * b) / 255.0)
}

/// Black on light backgrounds, white on dark ones. Strictly greater than 0.5
/// is "light".
pub fn text_color_for_luminance(luminance: f64) -> TextColor {
    if luminance > BLACK_TEXT_ABOVE_LUMINANCE {
        TextColor::Black
    } else {
        TextColor::White
    }
}

/// Text color for an explicit background. Unparseable colors get white text.
pub fn contrast_text_color(color: &str) -> TextColor {
    match relative_luminance(color) {
        Some(luminance) => text_color_for_luminance(luminance),
        None => {
            log::debug!("Cannot parse color {:?} for contrast, using white text", color);
            TextColor::White
        }
    }
}

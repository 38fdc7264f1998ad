//! Color-type discrimination for line and polygon records.
//!
//! Each record starts with a color-type value selecting its field layout.
//! These are closed sets; the classification here is shared by the reader
//! (layout selection) and the writer (narrowest-encoding choice) so the two
//! cannot drift apart.

use crate::error::Error;
use crate::typ::{Bitmap, Color, Line, Polygon, SectionKind};

/// Line record color types.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub(crate) enum LineColorType {
    /// 0x00: line + border colors, night same as day
    Same,
    /// 0x01: line + border colors for day and night
    Separate,
    /// 0x03: pattern with transparent day background, solid night
    DayTransparent,
    /// 0x04: pattern with solid day, transparent night background
    NightTransparent,
    /// 0x05: borderless day + night line colors
    BorderlessSeparate,
    /// 0x06: single borderless line color (or single-color pattern on a
    /// transparent background)
    BorderlessSame,
    /// 0x07: pattern with transparent background day and night
    Transparent,
}

impl LineColorType {
    pub(crate) fn from_wire(value: u8) -> Result<Self, Error> {
        match value {
            0x00 => Ok(Self::Same),
            0x01 => Ok(Self::Separate),
            0x03 => Ok(Self::DayTransparent),
            0x04 => Ok(Self::NightTransparent),
            0x05 => Ok(Self::BorderlessSeparate),
            0x06 => Ok(Self::BorderlessSame),
            0x07 => Ok(Self::Transparent),
            other => Err(Error::UnsupportedColorType { kind: SectionKind::Lines, value: other }),
        }
    }

    pub(crate) const fn wire(self) -> u8 {
        match self {
            Self::Same => 0x00,
            Self::Separate => 0x01,
            Self::DayTransparent => 0x03,
            Self::NightTransparent => 0x04,
            Self::BorderlessSeparate => 0x05,
            Self::BorderlessSame => 0x06,
            Self::Transparent => 0x07,
        }
    }
}

/// Polygon record color types.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub(crate) enum PolygonColorType {
    /// 0x01: day + night fill colors (legacy twin of 0x07)
    LegacySeparate,
    /// 0x06: single fill color
    Same,
    /// 0x07: day + night fill colors
    Separate,
    /// 0x08: pattern, one palette for day and night
    Pattern,
    /// 0x09: pattern with distinct day and night palettes
    PatternSeparate,
    /// 0x0B: pattern, transparent night background
    PatternNightTransparent,
    /// 0x0D: pattern, transparent day background
    PatternDayTransparent,
    /// 0x0E: pattern, transparent background day and night
    PatternTransparent,
}

impl PolygonColorType {
    pub(crate) fn from_wire(value: u8) -> Result<Self, Error> {
        match value {
            0x01 => Ok(Self::LegacySeparate),
            0x06 => Ok(Self::Same),
            0x07 => Ok(Self::Separate),
            0x08 => Ok(Self::Pattern),
            0x09 => Ok(Self::PatternSeparate),
            0x0B => Ok(Self::PatternNightTransparent),
            0x0D => Ok(Self::PatternDayTransparent),
            0x0E => Ok(Self::PatternTransparent),
            other => Err(Error::UnsupportedColorType { kind: SectionKind::Polygons, value: other }),
        }
    }

    pub(crate) const fn wire(self) -> u8 {
        match self {
            Self::LegacySeparate => 0x01,
            Self::Same => 0x06,
            Self::Separate => 0x07,
            Self::Pattern => 0x08,
            Self::PatternSeparate => 0x09,
            Self::PatternNightTransparent => 0x0B,
            Self::PatternDayTransparent => 0x0D,
            Self::PatternTransparent => 0x0E,
        }
    }
}

fn background_transparent(pattern: &Bitmap) -> bool {
    pattern.palette().first().is_some_and(|c| c.is_transparent())
}

fn night_matches_day(day: &Bitmap, night: Option<&Bitmap>) -> bool {
    night.is_none_or(|n| n.palette() == day.palette())
}

/// An all-zero night color means "reuse the day value".
fn same_or_unset(night: Color, day: Color) -> bool {
    night.is_unset() || night == day
}

/// Picks the narrowest line encoding that expresses the feature.
pub(crate) fn classify_line(line: &Line) -> Result<LineColorType, Error> {
    let pattern = line.day_pattern.as_ref().or(line.night_pattern.as_ref());
    if let Some(day) = pattern {
        let night = line.night_pattern.as_ref().filter(|_| line.day_pattern.is_some());
        let day_transparent = background_transparent(day);
        let night_transparent = night.map_or(day_transparent, background_transparent);
        let same = night_matches_day(day, night);
        return Ok(match (day_transparent, night_transparent) {
            (true, true) => {
                if line.border_width > 0 {
                    return Err(Error::UnrepresentableFeature {
                        reason: "a fully transparent line pattern cannot carry a border".into(),
                    });
                }
                if same {
                    LineColorType::BorderlessSame
                } else {
                    LineColorType::Transparent
                }
            }
            (true, false) => LineColorType::DayTransparent,
            (false, true) => LineColorType::NightTransparent,
            (false, false) => {
                if same {
                    LineColorType::Same
                } else {
                    LineColorType::Separate
                }
            }
        });
    }

    let bordered = line.border_width > 0
        || !line.day_border_color.is_unset()
        || !line.night_border_color.is_unset();
    let same = same_or_unset(line.night_color, line.day_color)
        && same_or_unset(line.night_border_color, line.day_border_color);
    Ok(match (bordered, same) {
        (true, true) => LineColorType::Same,
        (true, false) => LineColorType::Separate,
        (false, true) => LineColorType::BorderlessSame,
        (false, false) => LineColorType::BorderlessSeparate,
    })
}

/// Picks the narrowest polygon encoding that expresses the feature.
pub(crate) fn classify_polygon(polygon: &Polygon) -> Result<PolygonColorType, Error> {
    let pattern = polygon.day_pattern.as_ref().or(polygon.night_pattern.as_ref());
    if let Some(day) = pattern {
        let night = polygon.night_pattern.as_ref().filter(|_| polygon.day_pattern.is_some());
        let day_transparent = background_transparent(day);
        let night_transparent = night.map_or(day_transparent, background_transparent);
        let same = night_matches_day(day, night);
        return Ok(match (day_transparent, night_transparent) {
            (true, true) => PolygonColorType::PatternTransparent,
            (true, false) => PolygonColorType::PatternDayTransparent,
            (false, true) => PolygonColorType::PatternNightTransparent,
            (false, false) => {
                if same {
                    PolygonColorType::Pattern
                } else {
                    PolygonColorType::PatternSeparate
                }
            }
        });
    }

    if same_or_unset(polygon.night_color, polygon.day_color) {
        Ok(PolygonColorType::Same)
    } else {
        Ok(PolygonColorType::Separate)
    }
}

#[cfg(test)]
mod tests {
    use super::{classify_line, classify_polygon, LineColorType, PolygonColorType};
    use crate::error::Error;
    use crate::typ::{Bitmap, Color, Line, Polygon};

    fn pattern(bg: Color, fg: Color) -> Bitmap {
        Bitmap::new(32, 2, vec![bg, fg], vec![0; 64]).unwrap()
    }

    #[test]
    fn solid_lines() {
        let same = Line::builder()
            .type_code(0x100)
            .day_color(Color::rgb(1, 2, 3))
            .day_border_color(Color::rgb(9, 9, 9))
            .border_width(1)
            .build();
        assert_eq!(classify_line(&same).unwrap(), LineColorType::Same);

        let separate = Line::builder()
            .type_code(0x100)
            .day_color(Color::rgb(1, 2, 3))
            .night_color(Color::rgb(3, 2, 1))
            .border_width(1)
            .build();
        assert_eq!(classify_line(&separate).unwrap(), LineColorType::Separate);

        let borderless = Line::builder().type_code(0x100).day_color(Color::rgb(1, 2, 3)).build();
        assert_eq!(classify_line(&borderless).unwrap(), LineColorType::BorderlessSame);

        let borderless_separate = Line::builder()
            .type_code(0x100)
            .day_color(Color::rgb(1, 2, 3))
            .night_color(Color::rgb(3, 2, 1))
            .build();
        assert_eq!(classify_line(&borderless_separate).unwrap(), LineColorType::BorderlessSeparate);
    }

    #[test]
    fn pattern_lines() {
        let opaque = pattern(Color::rgb(0, 0, 1), Color::rgb(9, 9, 9));
        let clear = pattern(Color::TRANSPARENT, Color::rgb(9, 9, 9));
        let clear_red = pattern(Color::TRANSPARENT, Color::rgb(255, 0, 0));

        let same = Line::builder().type_code(0x100).day_pattern(opaque.clone()).build();
        assert_eq!(classify_line(&same).unwrap(), LineColorType::Same);

        let day_clear = Line::builder()
            .type_code(0x100)
            .day_pattern(clear.clone())
            .night_pattern(opaque.clone())
            .build();
        assert_eq!(classify_line(&day_clear).unwrap(), LineColorType::DayTransparent);

        let night_clear = Line::builder()
            .type_code(0x100)
            .day_pattern(opaque)
            .night_pattern(clear.clone())
            .build();
        assert_eq!(classify_line(&night_clear).unwrap(), LineColorType::NightTransparent);

        let both_clear = Line::builder()
            .type_code(0x100)
            .day_pattern(clear.clone())
            .night_pattern(clear_red)
            .build();
        assert_eq!(classify_line(&both_clear).unwrap(), LineColorType::Transparent);

        let single_clear = Line::builder().type_code(0x100).day_pattern(clear.clone()).build();
        assert_eq!(classify_line(&single_clear).unwrap(), LineColorType::BorderlessSame);

        let impossible = Line::builder()
            .type_code(0x100)
            .day_pattern(clear)
            .border_width(2)
            .build();
        assert!(matches!(
            classify_line(&impossible),
            Err(Error::UnrepresentableFeature { .. })
        ));
    }

    #[test]
    fn polygons() {
        let solid_same = Polygon::builder().type_code(0x200).day_color(Color::rgb(1, 2, 3)).build();
        assert_eq!(classify_polygon(&solid_same).unwrap(), PolygonColorType::Same);

        let solid_separate = Polygon::builder()
            .type_code(0x200)
            .day_color(Color::rgb(1, 2, 3))
            .night_color(Color::rgb(3, 2, 1))
            .build();
        assert_eq!(classify_polygon(&solid_separate).unwrap(), PolygonColorType::Separate);

        let opaque = pattern(Color::rgb(0, 0, 1), Color::rgb(9, 9, 9));
        let clear = pattern(Color::TRANSPARENT, Color::rgb(9, 9, 9));

        let same = Polygon::builder().type_code(0x200).day_pattern(opaque.clone()).build();
        assert_eq!(classify_polygon(&same).unwrap(), PolygonColorType::Pattern);

        let day_clear = Polygon::builder()
            .type_code(0x200)
            .day_pattern(clear.clone())
            .night_pattern(opaque.clone())
            .build();
        assert_eq!(classify_polygon(&day_clear).unwrap(), PolygonColorType::PatternDayTransparent);

        let night_clear = Polygon::builder()
            .type_code(0x200)
            .day_pattern(opaque)
            .night_pattern(clear.clone())
            .build();
        assert_eq!(
            classify_polygon(&night_clear).unwrap(),
            PolygonColorType::PatternNightTransparent
        );

        let both_clear = Polygon::builder().type_code(0x200).day_pattern(clear).build();
        assert_eq!(classify_polygon(&both_clear).unwrap(), PolygonColorType::PatternTransparent);
    }
}

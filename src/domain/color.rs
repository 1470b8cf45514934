// Sensor code to cell text/color mapping
use crate::domain::error::ReportError;
use crate::domain::reading::MAX_SENSOR_CODE;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub fn to_hex(self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.0, self.1, self.2)
    }
}

/// What a single matrix cell shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellStyle {
    pub text: String,
    pub color: Rgb,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Sentinel {
    pub code: i32,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ControlPoint {
    pub temperature: f64,
    pub color: Rgb,
}

/// The code bands and gradient used to color a thermal matrix.
///
/// Band boundaries and the sentinel table have changed between firmware
/// generations, so they are data rather than code and can be overridden
/// from configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ColorScale {
    /// Ordered coldest to hottest.
    pub control_points: Vec<ControlPoint>,
    pub neutral: Rgb,
    pub negative_band_start: i32,
    pub negative_band_end: i32,
    /// Physical value is `code - negative_offset`.
    pub negative_offset: i32,
    pub sentinels: Vec<Sentinel>,
}

impl Default for ColorScale {
    fn default() -> Self {
        let point = |temperature: f64, r, g, b| ControlPoint {
            temperature,
            color: Rgb(r, g, b),
        };

        let sentinels = [
            (92, "SR"),
            (93, "NE"),
            (94, "TN"),
            (95, "SE"),
            (96, "SI"),
            (97, "TA"),
            (98, "SC"),
            (99, "."),
        ]
        .into_iter()
        .map(|(code, text)| Sentinel {
            code,
            text: text.to_string(),
        })
        .collect();

        Self {
            control_points: vec![
                point(-5.0, 128, 255, 255),
                point(4.0, 128, 255, 255),
                point(11.0, 0, 128, 255),
                point(20.0, 0, 255, 128),
                point(28.0, 255, 255, 128),
                point(32.0, 255, 255, 0),
                point(34.0, 255, 128, 128),
                point(37.5, 255, 0, 0),
                point(45.0, 128, 64, 64),
                point(60.0, 128, 0, 0),
            ],
            neutral: Rgb(192, 192, 192),
            negative_band_start: 85,
            negative_band_end: 89,
            negative_offset: 90,
            sentinels,
        }
    }
}

impl ColorScale {
    /// Resolve a raw sensor code into its cell text and color.
    pub fn resolve(&self, code: i32) -> Result<CellStyle, ReportError> {
        if !(0..=MAX_SENSOR_CODE).contains(&code) {
            return Err(ReportError::transient(format!(
                "sensor code {} is outside 0..={}",
                code, MAX_SENSOR_CODE
            )));
        }

        if code == 0 {
            return Ok(CellStyle {
                text: ".".to_string(),
                color: self.neutral,
            });
        }

        if (self.negative_band_start..=self.negative_band_end).contains(&code) {
            let value = code - self.negative_offset;
            return Ok(CellStyle {
                text: value.to_string(),
                color: self.color_for_temperature(f64::from(value)),
            });
        }

        if let Some(sentinel) = self.sentinels.iter().find(|s| s.code == code) {
            return Ok(CellStyle {
                text: sentinel.text.clone(),
                color: self.neutral,
            });
        }

        Ok(CellStyle {
            text: code.to_string(),
            color: self.color_for_temperature(f64::from(code)),
        })
    }

    /// Gradient color for a physical temperature, clamped to the outermost
    /// control points. Also used to sample the legend bar.
    pub fn color_for_temperature(&self, temperature: f64) -> Rgb {
        let (first, last) = match (self.control_points.first(), self.control_points.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return self.neutral,
        };

        if temperature <= first.temperature {
            return first.color;
        }
        if temperature >= last.temperature {
            return last.color;
        }

        for pair in self.control_points.windows(2) {
            let (lo, hi) = (&pair[0], &pair[1]);
            if temperature <= hi.temperature {
                let span = hi.temperature - lo.temperature;
                if span <= 0.0 {
                    return hi.color;
                }
                let f = (temperature - lo.temperature) / span;
                return Rgb(
                    lerp_channel(lo.color.0, hi.color.0, f),
                    lerp_channel(lo.color.1, hi.color.1, f),
                    lerp_channel(lo.color.2, hi.color.2, f),
                );
            }
        }

        last.color
    }
}

fn lerp_channel(from: u8, to: u8, f: f64) -> u8 {
    let value = f64::from(from) + f * (f64::from(to) - f64::from(from));
    value.round().clamp(0.0, 255.0) as u8
}

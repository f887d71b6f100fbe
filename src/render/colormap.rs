//! Segmented colormaps for statistic overlays.
//!
//! The activation palette runs black -> blue -> green -> yellow -> red, the
//! convention used for response-level maps; values are mixed in linear RGB.

use palette::{LinSrgb, Mix, Srgb};

/// Piecewise-linear colormap over `[0, 1]`.
#[derive(Debug, Clone)]
pub struct Colormap {
    stops: Vec<(f32, LinSrgb)>,
}

impl Colormap {
    /// Activation palette for effect-size maps.
    pub fn activation() -> Self {
        Colormap {
            stops: vec![
                (0.0, LinSrgb::new(0.0, 0.0, 0.0)),
                (0.25, LinSrgb::new(0.0, 0.5, 1.0)),
                (0.5, LinSrgb::new(0.0, 1.0, 0.0)),
                (0.75, LinSrgb::new(1.0, 1.0, 0.0)),
                (1.0, LinSrgb::new(1.0, 0.0, 0.0)),
            ],
        }
    }

    /// Evaluate at `u` (clamped to `[0, 1]`), returning 8-bit sRGB.
    pub fn eval(&self, u: f64) -> [u8; 3] {
        let u = u.clamp(0.0, 1.0) as f32;

        let mut lo = &self.stops[0];
        let mut hi = &self.stops[self.stops.len() - 1];
        for pair in self.stops.windows(2) {
            if u >= pair[0].0 && u <= pair[1].0 {
                lo = &pair[0];
                hi = &pair[1];
                break;
            }
        }

        let span = hi.0 - lo.0;
        let t = if span > 0.0 { (u - lo.0) / span } else { 0.0 };
        let mixed = lo.1.mix(hi.1, t);
        let rgb: Srgb = Srgb::from_linear(mixed);
        [
            (rgb.red * 255.0).round() as u8,
            (rgb.green * 255.0).round() as u8,
            (rgb.blue * 255.0).round() as u8,
        ]
    }
}

/// Value window mapping data onto colormap coordinates.
#[derive(Debug, Clone, Copy)]
pub struct NormWindow {
    pub vmin: f64,
    pub vmax: f64,
}

impl NormWindow {
    pub fn new(vmin: f64, vmax: f64) -> Self {
        NormWindow { vmin, vmax }
    }

    /// Window spanning the finite values of an iterator.
    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        let mut vmin = f64::INFINITY;
        let mut vmax = f64::NEG_INFINITY;
        for v in values {
            if v.is_finite() {
                vmin = vmin.min(v);
                vmax = vmax.max(v);
            }
        }
        if vmin.is_finite() && vmax.is_finite() {
            Some(NormWindow { vmin, vmax })
        } else {
            None
        }
    }

    /// Map a value into `[0, 1]`; degenerate windows map to 0.5.
    pub fn normalize(&self, v: f64) -> f64 {
        let span = self.vmax - self.vmin;
        if span <= 0.0 {
            return 0.5;
        }
        ((v - self.vmin) / span).clamp(0.0, 1.0)
    }
}

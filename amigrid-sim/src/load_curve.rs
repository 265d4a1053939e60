// AMIGrid Sim - Daily load curve
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Piecewise-linear residential load curve keyed by hour of day.

use serde::{Deserialize, Serialize};

/// Residential daily load curve, in watts.
///
/// | Hours | Level |
/// |-------|-------|
/// | 00-05 | `base_load` |
/// | 05-06 | ramp to `peak_morning` |
/// | 06-09 | `peak_morning` |
/// | 09-10 | ramp to `midday` |
/// | 10-16 | `midday` |
/// | 16-17 | ramp to `peak_evening` |
/// | 17-21 | `peak_evening` |
/// | 21-22 | ramp to `night` |
/// | 22-24 | `night` |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoadCurve {
    pub base_load: f64,
    pub peak_morning: f64,
    pub midday: f64,
    pub peak_evening: f64,
    pub night: f64,
}

impl Default for LoadCurve {
    fn default() -> Self {
        Self {
            base_load: 500.0,
            peak_morning: 2500.0,
            midday: 1000.0,
            peak_evening: 4000.0,
            night: 400.0,
        }
    }
}

impl LoadCurve {
    /// Load at a fractional hour of day. Hours wrap modulo 24.
    pub fn at(&self, hour: f64) -> f64 {
        let hour = hour.rem_euclid(24.0);
        match hour {
            h if h < 5.0 => self.base_load,
            h if h < 6.0 => lerp(self.base_load, self.peak_morning, h - 5.0),
            h if h < 9.0 => self.peak_morning,
            h if h < 10.0 => lerp(self.peak_morning, self.midday, h - 9.0),
            h if h < 16.0 => self.midday,
            h if h < 17.0 => lerp(self.midday, self.peak_evening, h - 16.0),
            h if h < 21.0 => self.peak_evening,
            h if h < 22.0 => lerp(self.peak_evening, self.night, h - 21.0),
            _ => self.night,
        }
    }

    /// Largest level on the curve.
    pub fn peak(&self) -> f64 {
        [
            self.base_load,
            self.peak_morning,
            self.midday,
            self.peak_evening,
            self.night,
        ]
        .into_iter()
        .fold(0.0, f64::max)
    }
}

fn lerp(from: f64, to: f64, t: f64) -> f64 {
    from + t * (to - from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_plateaus() {
        let curve = LoadCurve::default();
        assert_eq!(curve.at(3.0), 500.0);
        assert_eq!(curve.at(7.5), 2500.0);
        assert_eq!(curve.at(12.0), 1000.0);
        assert_eq!(curve.at(19.0), 4000.0);
        assert_eq!(curve.at(23.0), 400.0);
    }

    #[test]
    fn test_ramps() {
        let curve = LoadCurve::default();
        assert_relative_eq!(curve.at(5.5), 1500.0);
        assert_relative_eq!(curve.at(9.5), 1750.0);
        assert_relative_eq!(curve.at(16.25), 1750.0);
        assert_relative_eq!(curve.at(21.5), 2200.0);
    }

    #[test]
    fn test_wraps() {
        let curve = LoadCurve::default();
        assert_eq!(curve.at(27.0), curve.at(3.0));
        assert_eq!(curve.at(-1.0), curve.at(23.0));
        assert_eq!(curve.peak(), 4000.0);
    }
}

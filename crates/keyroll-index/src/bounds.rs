//! Axis-aligned boxes in (time, pitch) space.

use serde::{Deserialize, Serialize};

/// Split axis of a box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Time,
    Pitch,
}

/// Closed box `[min_time, max_time] x [min_pitch, max_pitch]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_time: f64,
    pub min_pitch: f64,
    pub max_time: f64,
    pub max_pitch: f64,
}

impl Bounds {
    /// Identity for [`Bounds::union`]; intersects nothing.
    pub const EMPTY: Bounds = Bounds {
        min_time: f64::INFINITY,
        min_pitch: f64::INFINITY,
        max_time: f64::NEG_INFINITY,
        max_pitch: f64::NEG_INFINITY,
    };

    pub fn new(min_time: f64, min_pitch: f64, max_time: f64, max_pitch: f64) -> Self {
        Self {
            min_time,
            min_pitch,
            max_time,
            max_pitch,
        }
    }

    /// Box covering a time span across every pitch.
    pub fn time_span(start: f64, end: f64) -> Self {
        Self::new(start, f64::NEG_INFINITY, end, f64::INFINITY)
    }

    /// Square box of half-width `radius` around a point.
    pub fn around(time: f64, pitch: f64, radius: f64) -> Self {
        Self::new(time - radius, pitch - radius, time + radius, pitch + radius)
    }

    /// False for inverted boxes and boxes with NaN coordinates.
    pub fn is_valid(&self) -> bool {
        self.min_time <= self.max_time && self.min_pitch <= self.max_pitch
    }

    pub fn union(&self, other: &Bounds) -> Bounds {
        Bounds {
            min_time: self.min_time.min(other.min_time),
            min_pitch: self.min_pitch.min(other.min_pitch),
            max_time: self.max_time.max(other.max_time),
            max_pitch: self.max_pitch.max(other.max_pitch),
        }
    }

    /// Closed-interval overlap on both axes; touching edges count.
    #[inline]
    pub fn intersects(&self, other: &Bounds) -> bool {
        self.min_time <= other.max_time
            && other.min_time <= self.max_time
            && self.min_pitch <= other.max_pitch
            && other.min_pitch <= self.max_pitch
    }

    pub fn contains_point(&self, time: f64, pitch: f64) -> bool {
        (self.min_time..=self.max_time).contains(&time)
            && (self.min_pitch..=self.max_pitch).contains(&pitch)
    }

    pub fn extent(&self, axis: Axis) -> f64 {
        match axis {
            Axis::Time => self.max_time - self.min_time,
            Axis::Pitch => self.max_pitch - self.min_pitch,
        }
    }

    pub fn center(&self, axis: Axis) -> f64 {
        match axis {
            Axis::Time => (self.min_time + self.max_time) * 0.5,
            Axis::Pitch => (self.min_pitch + self.max_pitch) * 0.5,
        }
    }

    /// Axis with the larger extent; ties go to time.
    pub fn longest_axis(&self) -> Axis {
        if self.extent(Axis::Pitch) > self.extent(Axis::Time) {
            Axis::Pitch
        } else {
            Axis::Time
        }
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::EMPTY
    }
}

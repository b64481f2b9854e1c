//! Pipeline configuration.

use keyroll_index::DEFAULT_REBUILD_INTERVAL;
use keyroll_smf::{ExtractConfig, Timing, UnclosedNotes};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Unit of the times stored in the note index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeUnit {
    /// Raw file ticks
    #[default]
    Ticks,
    /// Quarter notes (ticks / ticks-per-quarter)
    Beats,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyrollConfig {
    pub extract: ExtractConfig,
    pub time_unit: TimeUnit,
    /// Minimum spacing of throttled index rebuilds
    pub rebuild_interval: f64,
}

impl Default for KeyrollConfig {
    fn default() -> Self {
        Self {
            extract: ExtractConfig::default(),
            time_unit: TimeUnit::Ticks,
            rebuild_interval: DEFAULT_REBUILD_INTERVAL,
        }
    }
}

impl KeyrollConfig {
    /// # Example
    /// ```
    /// use keyroll::{KeyrollConfig, TimeUnit};
    ///
    /// let config = KeyrollConfig::builder()
    ///     .time_unit(TimeUnit::Beats)
    ///     .strict(true)
    ///     .rebuild_interval(0.25)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.time_unit, TimeUnit::Beats);
    /// ```
    pub fn builder() -> KeyrollConfigBuilder {
        KeyrollConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<()> {
        if !self.rebuild_interval.is_finite() || self.rebuild_interval < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "rebuild interval must be finite and non-negative, got {}",
                self.rebuild_interval
            )));
        }
        Ok(())
    }

    /// Factor converting file ticks into index time units.
    pub fn tick_scale(&self, timing: Timing) -> Result<f64> {
        match (self.time_unit, timing) {
            (TimeUnit::Ticks, _) => Ok(1.0),
            (TimeUnit::Beats, Timing::Metrical(ticks)) if ticks > 0 => Ok(1.0 / f64::from(ticks)),
            (TimeUnit::Beats, timing) => Err(Error::UnsupportedTiming(timing)),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct KeyrollConfigBuilder {
    config: KeyrollConfig,
}

impl KeyrollConfigBuilder {
    pub fn extract(mut self, extract: ExtractConfig) -> Self {
        self.config.extract = extract;
        self
    }

    /// Close notes left open at track end instead of dropping them.
    pub fn strict(mut self, strict: bool) -> Self {
        self.config.extract.unclosed = if strict {
            UnclosedNotes::CloseAtTrackEnd
        } else {
            UnclosedNotes::Drop
        };
        self
    }

    /// Default: ticks
    pub fn time_unit(mut self, unit: TimeUnit) -> Self {
        self.config.time_unit = unit;
        self
    }

    /// Default: 1.0
    pub fn rebuild_interval(mut self, interval: f64) -> Self {
        self.config.rebuild_interval = interval;
        self
    }

    pub fn build(self) -> Result<KeyrollConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = KeyrollConfig::builder().build().unwrap();
        assert_eq!(config, KeyrollConfig::default());
        assert_eq!(config.extract.unclosed, UnclosedNotes::Drop);
        assert_eq!(config.rebuild_interval, 1.0);
    }

    #[test]
    fn test_rejects_bad_interval() {
        for interval in [-1.0, f64::NAN, f64::INFINITY] {
            let result = KeyrollConfig::builder().rebuild_interval(interval).build();
            assert!(matches!(result, Err(Error::InvalidConfig(_))));
        }
    }

    #[test]
    fn test_tick_scale() {
        let beats = KeyrollConfig::builder()
            .time_unit(TimeUnit::Beats)
            .build()
            .unwrap();
        assert_eq!(beats.tick_scale(Timing::Metrical(480)).unwrap(), 1.0 / 480.0);
        assert!(matches!(
            beats.tick_scale(Timing::Timecode {
                fps: 25,
                subframes: 40
            }),
            Err(Error::UnsupportedTiming(_))
        ));
        assert!(beats.tick_scale(Timing::Metrical(0)).is_err());

        let ticks = KeyrollConfig::default();
        assert_eq!(
            ticks
                .tick_scale(Timing::Timecode {
                    fps: 30,
                    subframes: 80
                })
                .unwrap(),
            1.0
        );
    }
}

//! Timestamp normalization
//!
//! Turns a publisher's publication text plus the capture instant into an
//! offset-aware instant at the deployment's capture offset:
//! 1. the source's absolute formats, in registration order;
//! 2. a relative `<n> <unit>` expression counted back from the capture time;
//! 3. otherwise a `NormalizationError`, and the record is dropped.

use std::collections::HashMap;

use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime, TimeZone};
use tracing::debug;

use crate::error::NormalizationError;
use crate::schemas::{NormalizedArticle, RawArticle};
use crate::sources::AdapterRegistry;

/// Unit words of the relative grammar.
///
/// Deployment-wide and matched case-insensitively. `suffixes` are trailing
/// words allowed after the unit ("yang lalu" = "ago").
#[derive(Debug, Clone)]
pub struct RelativeUnits {
    pub hours: Vec<String>,
    pub minutes: Vec<String>,
    pub seconds: Vec<String>,
    pub suffixes: Vec<String>,
}

impl Default for RelativeUnits {
    fn default() -> Self {
        Self {
            hours: vec!["jam".into()],
            minutes: vec!["menit".into()],
            seconds: vec!["detik".into()],
            suffixes: vec!["yang".into(), "lalu".into()],
        }
    }
}

impl RelativeUnits {
    fn duration(&self, unit: &str, amount: i64) -> Option<Duration> {
        let is = |words: &[String]| words.iter().any(|w| w.eq_ignore_ascii_case(unit));
        if is(&self.hours) {
            Duration::try_hours(amount)
        } else if is(&self.minutes) {
            Duration::try_minutes(amount)
        } else if is(&self.seconds) {
            Duration::try_seconds(amount)
        } else {
            None
        }
    }

    fn is_suffix(&self, word: &str) -> bool {
        self.suffixes.iter().any(|s| s.eq_ignore_ascii_case(word))
    }
}

pub struct TimestampNormalizer {
    formats: HashMap<String, Vec<&'static str>>,
    units: RelativeUnits,
    offset: FixedOffset,
}

impl TimestampNormalizer {
    pub fn new(offset: FixedOffset) -> Self {
        Self {
            formats: HashMap::new(),
            units: RelativeUnits::default(),
            offset,
        }
    }

    /// Registers every adapter's absolute formats under its source id
    pub fn from_registry(registry: &AdapterRegistry, offset: FixedOffset) -> Self {
        let mut normalizer = Self::new(offset);
        for adapter in registry.adapters() {
            normalizer = normalizer.with_formats(adapter.id(), adapter.published_formats());
        }
        normalizer
    }

    pub fn with_formats(mut self, source: &str, formats: &[&'static str]) -> Self {
        self.formats
            .entry(source.to_string())
            .or_default()
            .extend_from_slice(formats);
        self
    }

    pub fn with_units(mut self, units: RelativeUnits) -> Self {
        self.units = units;
        self
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn normalize(
        &self,
        source: &str,
        published_raw: &str,
        scraped_at: DateTime<FixedOffset>,
    ) -> Result<DateTime<FixedOffset>, NormalizationError> {
        let raw = published_raw.trim();

        if let Some(instant) = self.parse_absolute(source, raw) {
            return Ok(instant);
        }

        if let Some(instant) = self.parse_relative(raw, scraped_at) {
            return Ok(instant);
        }

        debug!(source = %source, raw = %published_raw, "Unparseable publication time");
        Err(NormalizationError {
            source_id: source.to_string(),
            raw: published_raw.to_string(),
        })
    }

    /// Normalizes a raw article, or reports why it cannot be stored
    pub fn normalize_article(&self, raw: RawArticle) -> Result<NormalizedArticle, NormalizationError> {
        let published_at = self.normalize(&raw.source, &raw.published_raw, raw.scraped_at)?;
        Ok(NormalizedArticle::from_raw(raw, published_at))
    }

    fn parse_absolute(&self, source: &str, raw: &str) -> Option<DateTime<FixedOffset>> {
        let formats = self.formats.get(source)?;

        formats.iter().find_map(|format| {
            if format.contains("%z") || format.contains("%:z") || format.contains("%#z") {
                DateTime::parse_from_str(raw, format)
                    .ok()
                    .map(|dt| dt.with_timezone(&self.offset))
            } else {
                NaiveDateTime::parse_from_str(raw, format)
                    .ok()
                    .and_then(|naive| self.offset.from_local_datetime(&naive).single())
            }
        })
    }

    /// `<integer> <unit> [suffix...]`, e.g. `2 jam` or `15 menit yang lalu`
    fn parse_relative(&self, raw: &str, scraped_at: DateTime<FixedOffset>) -> Option<DateTime<FixedOffset>> {
        let mut words = raw.split_whitespace();
        let amount: i64 = words.next()?.parse().ok().filter(|n| *n >= 0)?;
        let delta = self.units.duration(words.next()?, amount)?;

        if !words.all(|w| self.units.is_suffix(w)) {
            return None;
        }

        scraped_at
            .with_timezone(&self.offset)
            .checked_sub_signed(delta)
    }
}

//! Regex allow-filtering of records

use crate::errors::Result;
use crate::mapper::FORWARDED_KEYS;
use crate::record::Record;
use regex::Regex;
use std::borrow::Cow;

/// Ordered regex patterns parsed from a comma separated string
#[derive(Debug, Clone)]
pub struct FilterSpec {
    patterns: Vec<Regex>,
}

impl FilterSpec {
    pub fn parse(filters: &str) -> Result<Self> {
        let patterns = filters
            .split(',')
            .map(Regex::new)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self { patterns })
    }

    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(Regex::as_str)
    }

    /// True if any pattern is found in any of the values
    pub fn matches_any(&self, values: &[Cow<'_, str>]) -> bool {
        self.patterns
            .iter()
            .any(|pattern| values.iter().any(|value| pattern.is_match(value)))
    }
}

/// Decides whether a record is forwarded
#[derive(Debug, Clone, Default)]
pub struct Filter {
    spec: Option<FilterSpec>,
}

impl Filter {
    pub fn new(spec: Option<FilterSpec>) -> Self {
        Self { spec }
    }

    pub fn is_enabled(&self) -> bool {
        self.spec.is_some()
    }

    /// Without patterns every record passes. With them, only the forwarded keys
    /// are inspected, so a record carrying none of them is rejected.
    pub fn accepts(&self, record: &Record) -> bool {
        let Some(spec) = &self.spec else {
            return true;
        };

        let values: Vec<Cow<'_, str>> = FORWARDED_KEYS
            .iter()
            .filter_map(|key| record.get(key))
            .map(|value| value.as_text())
            .collect();

        spec.matches_any(&values)
    }
}

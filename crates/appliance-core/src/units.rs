//! Measurement value types: clock frequency, memory size, time interval.
//!
//! Each type stores an immutable `(count, unit)` pair. Conversion to the
//! canonical base unit (hertz, bytes, nanoseconds) saturates at `u64::MAX`
//! instead of wrapping, and all comparisons are defined on the base value so
//! `1MHz` and `1000KHz` compare equal.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use thiserror::Error;

/// Error returned when parsing a formatted measurement value fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnitParseError {
    /// None of the declared unit suffixes matched the input.
    #[error("unrecognized unit suffix in {0:?}")]
    UnknownSuffix(String),
    /// The numeric part before the suffix is empty or not a valid integer.
    #[error("invalid numeric value in {0:?}")]
    InvalidNumber(String),
}

fn split_suffix<'a>(text: &'a str, suffixes: &[&'static str]) -> Option<(&'a str, usize)> {
    suffixes
        .iter()
        .position(|suffix| text.ends_with(suffix))
        .map(|index| (&text[..text.len() - suffixes[index].len()], index))
}

fn parse_count(number: &str, original: &str) -> Result<u64, UnitParseError> {
    if number.is_empty() {
        return Err(UnitParseError::InvalidNumber(original.to_owned()));
    }
    number
        .parse::<u64>()
        .map_err(|_| UnitParseError::InvalidNumber(original.to_owned()))
}

/// Units of clock frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum FrequencyUnit {
    /// Hertz.
    Hz,
    /// Kilohertz (`1_000` Hz).
    KHz,
    /// Megahertz (`1_000_000` Hz).
    MHz,
    /// Gigahertz (`1_000_000_000` Hz).
    GHz,
}

impl FrequencyUnit {
    /// Suffix-match order for parsing. Longer suffixes come first so `"MHz"`
    /// is never consumed as `"Hz"`.
    pub const PARSE_ORDER: [Self; 4] = [Self::KHz, Self::MHz, Self::GHz, Self::Hz];

    /// Multiplier from this unit to hertz.
    #[must_use]
    pub const fn multiplier(self) -> u64 {
        match self {
            Self::Hz => 1,
            Self::KHz => 1_000,
            Self::MHz => 1_000_000,
            Self::GHz => 1_000_000_000,
        }
    }

    /// Canonical display suffix for this unit.
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Hz => "Hz",
            Self::KHz => "KHz",
            Self::MHz => "MHz",
            Self::GHz => "GHz",
        }
    }
}

/// Immutable clock-frequency value.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ClockFrequency {
    count: u64,
    unit: FrequencyUnit,
}

impl ClockFrequency {
    /// Creates a frequency of `count` units.
    #[must_use]
    pub const fn new(count: u64, unit: FrequencyUnit) -> Self {
        Self { count, unit }
    }

    /// Stored unit count.
    #[must_use]
    pub const fn count(self) -> u64 {
        self.count
    }

    /// Stored unit.
    #[must_use]
    pub const fn unit(self) -> FrequencyUnit {
        self.unit
    }

    /// Value in hertz, saturating at `u64::MAX`.
    #[must_use]
    pub const fn hertz(self) -> u64 {
        self.count.saturating_mul(self.unit.multiplier())
    }
}

impl PartialEq for ClockFrequency {
    fn eq(&self, other: &Self) -> bool {
        self.hertz() == other.hertz()
    }
}

impl Eq for ClockFrequency {}

impl PartialOrd for ClockFrequency {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ClockFrequency {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.hertz().cmp(&other.hertz())
    }
}

impl Hash for ClockFrequency {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hertz().hash(state);
    }
}

impl fmt::Display for ClockFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.count, self.unit.suffix())
    }
}

impl FromStr for ClockFrequency {
    type Err = UnitParseError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        const SUFFIXES: [&str; 4] = [
            FrequencyUnit::PARSE_ORDER[0].suffix(),
            FrequencyUnit::PARSE_ORDER[1].suffix(),
            FrequencyUnit::PARSE_ORDER[2].suffix(),
            FrequencyUnit::PARSE_ORDER[3].suffix(),
        ];
        let (number, index) = split_suffix(text, &SUFFIXES)
            .ok_or_else(|| UnitParseError::UnknownSuffix(text.to_owned()))?;
        let count = parse_count(number, text)?;
        Ok(Self::new(count, FrequencyUnit::PARSE_ORDER[index]))
    }
}

/// Units of memory size, in 1024 steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum MemorySizeUnit {
    /// Bytes.
    B,
    /// Kibibytes (`1_024` bytes).
    KB,
    /// Mebibytes (`1_048_576` bytes).
    MB,
    /// Gibibytes (`1_073_741_824` bytes).
    GB,
}

impl MemorySizeUnit {
    /// Suffix-match order for parsing, longest suffixes first.
    pub const PARSE_ORDER: [Self; 4] = [Self::KB, Self::MB, Self::GB, Self::B];

    /// Multiplier from this unit to bytes.
    #[must_use]
    pub const fn multiplier(self) -> u64 {
        match self {
            Self::B => 1,
            Self::KB => 1 << 10,
            Self::MB => 1 << 20,
            Self::GB => 1 << 30,
        }
    }

    /// Canonical display suffix for this unit.
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::B => "B",
            Self::KB => "KB",
            Self::MB => "MB",
            Self::GB => "GB",
        }
    }
}

/// Immutable memory-size value.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct MemorySize {
    count: u64,
    unit: MemorySizeUnit,
}

impl MemorySize {
    /// Creates a size of `count` units.
    #[must_use]
    pub const fn new(count: u64, unit: MemorySizeUnit) -> Self {
        Self { count, unit }
    }

    /// Stored unit count.
    #[must_use]
    pub const fn count(self) -> u64 {
        self.count
    }

    /// Stored unit.
    #[must_use]
    pub const fn unit(self) -> MemorySizeUnit {
        self.unit
    }

    /// Value in bytes, saturating at `u64::MAX`.
    #[must_use]
    pub const fn bytes(self) -> u64 {
        self.count.saturating_mul(self.unit.multiplier())
    }
}

impl PartialEq for MemorySize {
    fn eq(&self, other: &Self) -> bool {
        self.bytes() == other.bytes()
    }
}

impl Eq for MemorySize {}

impl PartialOrd for MemorySize {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MemorySize {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.bytes().cmp(&other.bytes())
    }
}

impl Hash for MemorySize {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bytes().hash(state);
    }
}

impl fmt::Display for MemorySize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.count, self.unit.suffix())
    }
}

impl FromStr for MemorySize {
    type Err = UnitParseError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        const SUFFIXES: [&str; 4] = [
            MemorySizeUnit::PARSE_ORDER[0].suffix(),
            MemorySizeUnit::PARSE_ORDER[1].suffix(),
            MemorySizeUnit::PARSE_ORDER[2].suffix(),
            MemorySizeUnit::PARSE_ORDER[3].suffix(),
        ];
        let (number, index) = split_suffix(text, &SUFFIXES)
            .ok_or_else(|| UnitParseError::UnknownSuffix(text.to_owned()))?;
        let count = parse_count(number, text)?;
        Ok(Self::new(count, MemorySizeUnit::PARSE_ORDER[index]))
    }
}

/// Units of elapsed time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum TimeUnit {
    /// Nanoseconds.
    Ns,
    /// Microseconds (`1_000` ns).
    Us,
    /// Milliseconds (`1_000_000` ns).
    Ms,
    /// Seconds (`1_000_000_000` ns).
    S,
}

impl TimeUnit {
    /// Suffix-match order for parsing, longest suffixes first.
    pub const PARSE_ORDER: [Self; 4] = [Self::Ns, Self::Us, Self::Ms, Self::S];

    /// Multiplier from this unit to nanoseconds.
    #[must_use]
    pub const fn multiplier(self) -> u64 {
        match self {
            Self::Ns => 1,
            Self::Us => 1_000,
            Self::Ms => 1_000_000,
            Self::S => 1_000_000_000,
        }
    }

    /// Canonical display suffix for this unit.
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Ns => "ns",
            Self::Us => "us",
            Self::Ms => "ms",
            Self::S => "s",
        }
    }
}

/// Immutable time-interval value.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct TimeInterval {
    count: u64,
    unit: TimeUnit,
}

impl TimeInterval {
    /// Creates an interval of `count` units.
    #[must_use]
    pub const fn new(count: u64, unit: TimeUnit) -> Self {
        Self { count, unit }
    }

    /// Stored unit count.
    #[must_use]
    pub const fn count(self) -> u64 {
        self.count
    }

    /// Stored unit.
    #[must_use]
    pub const fn unit(self) -> TimeUnit {
        self.unit
    }

    /// Value in nanoseconds, saturating at `u64::MAX`.
    #[must_use]
    pub const fn nanoseconds(self) -> u64 {
        self.count.saturating_mul(self.unit.multiplier())
    }

    /// Converts to a host [`std::time::Duration`].
    #[must_use]
    pub const fn as_duration(self) -> std::time::Duration {
        std::time::Duration::from_nanos(self.nanoseconds())
    }
}

impl PartialEq for TimeInterval {
    fn eq(&self, other: &Self) -> bool {
        self.nanoseconds() == other.nanoseconds()
    }
}

impl Eq for TimeInterval {}

impl PartialOrd for TimeInterval {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeInterval {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.nanoseconds().cmp(&other.nanoseconds())
    }
}

impl Hash for TimeInterval {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.nanoseconds().hash(state);
    }
}

impl fmt::Display for TimeInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.count, self.unit.suffix())
    }
}

impl FromStr for TimeInterval {
    type Err = UnitParseError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        const SUFFIXES: [&str; 4] = [
            TimeUnit::PARSE_ORDER[0].suffix(),
            TimeUnit::PARSE_ORDER[1].suffix(),
            TimeUnit::PARSE_ORDER[2].suffix(),
            TimeUnit::PARSE_ORDER[3].suffix(),
        ];
        let (number, index) = split_suffix(text, &SUFFIXES)
            .ok_or_else(|| UnitParseError::UnknownSuffix(text.to_owned()))?;
        let count = parse_count(number, text)?;
        Ok(Self::new(count, TimeUnit::PARSE_ORDER[index]))
    }
}

#[cfg(test)]
mod tests {
    use super::{
        ClockFrequency, FrequencyUnit, MemorySize, MemorySizeUnit, TimeInterval, TimeUnit,
        UnitParseError,
    };
    use proptest::prelude::*;
    use rstest::rstest;

    #[test]
    fn frequency_base_conversion_saturates_instead_of_wrapping() {
        let huge = ClockFrequency::new(u64::MAX, FrequencyUnit::GHz);
        assert_eq!(huge.hertz(), u64::MAX);
    }

    #[test]
    fn equal_base_values_compare_equal_across_units() {
        assert_eq!(
            ClockFrequency::new(1, FrequencyUnit::MHz),
            ClockFrequency::new(1_000, FrequencyUnit::KHz)
        );
        assert_eq!(
            MemorySize::new(1, MemorySizeUnit::MB),
            MemorySize::new(1_024, MemorySizeUnit::KB)
        );
        assert_eq!(
            TimeInterval::new(1, TimeUnit::Ms),
            TimeInterval::new(1_000, TimeUnit::Us)
        );
    }

    #[test]
    fn ordering_is_consistent_with_base_value() {
        assert!(ClockFrequency::new(999, FrequencyUnit::KHz) < ClockFrequency::new(1, FrequencyUnit::MHz));
        assert!(MemorySize::new(2, MemorySizeUnit::GB) > MemorySize::new(2047, MemorySizeUnit::MB));
    }

    #[rstest]
    #[case("20MHz", 20, FrequencyUnit::MHz)]
    #[case("0Hz", 0, FrequencyUnit::Hz)]
    #[case("4GHz", 4, FrequencyUnit::GHz)]
    #[case("125KHz", 125, FrequencyUnit::KHz)]
    fn frequency_parse_accepts_every_declared_suffix(
        #[case] text: &str,
        #[case] count: u64,
        #[case] unit: FrequencyUnit,
    ) {
        let parsed: ClockFrequency = text.parse().expect("valid frequency literal");
        assert_eq!(parsed.count(), count);
        assert_eq!(parsed.unit(), unit);
        assert_eq!(parsed.to_string(), text);
    }

    #[rstest]
    #[case("64MB", 64, MemorySizeUnit::MB)]
    #[case("512B", 512, MemorySizeUnit::B)]
    #[case("3GB", 3, MemorySizeUnit::GB)]
    fn memory_size_parse_accepts_every_declared_suffix(
        #[case] text: &str,
        #[case] count: u64,
        #[case] unit: MemorySizeUnit,
    ) {
        let parsed: MemorySize = text.parse().expect("valid size literal");
        assert_eq!(parsed.count(), count);
        assert_eq!(parsed.unit(), unit);
        assert_eq!(parsed.to_string(), text);
    }

    #[test]
    fn parse_rejects_unknown_suffix_and_missing_number() {
        assert_eq!(
            "20Mhz".parse::<ClockFrequency>(),
            Err(UnitParseError::UnknownSuffix("20Mhz".to_owned()))
        );
        assert_eq!(
            "MHz".parse::<ClockFrequency>(),
            Err(UnitParseError::InvalidNumber("MHz".to_owned()))
        );
        assert_eq!(
            "12.5ms".parse::<TimeInterval>(),
            Err(UnitParseError::InvalidNumber("12.5ms".to_owned()))
        );
    }

    fn frequency_unit_strategy() -> impl Strategy<Value = FrequencyUnit> {
        prop_oneof![
            Just(FrequencyUnit::Hz),
            Just(FrequencyUnit::KHz),
            Just(FrequencyUnit::MHz),
            Just(FrequencyUnit::GHz),
        ]
    }

    fn time_unit_strategy() -> impl Strategy<Value = TimeUnit> {
        prop_oneof![
            Just(TimeUnit::Ns),
            Just(TimeUnit::Us),
            Just(TimeUnit::Ms),
            Just(TimeUnit::S),
        ]
    }

    proptest! {
        #[test]
        fn frequency_format_parse_roundtrip(count in 0_u64..=u64::MAX, unit in frequency_unit_strategy()) {
            let value = ClockFrequency::new(count, unit);
            let reparsed: ClockFrequency = value.to_string().parse().expect("formatted value reparses");
            prop_assert_eq!(reparsed.count(), value.count());
            prop_assert_eq!(reparsed.unit(), value.unit());
        }

        #[test]
        fn interval_format_parse_roundtrip(count in 0_u64..=u64::MAX, unit in time_unit_strategy()) {
            let value = TimeInterval::new(count, unit);
            let reparsed: TimeInterval = value.to_string().parse().expect("formatted value reparses");
            prop_assert_eq!(reparsed.count(), value.count());
            prop_assert_eq!(reparsed.unit(), value.unit());
        }
    }
}

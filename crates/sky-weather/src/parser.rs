//! Forecast feed parser.
//!
//! The feed is loosely structured and order dependent: a running index
//! decides which forecast slot the next value lands in, so the parser is a
//! small state machine fed one markup event at a time.

use std::cmp::Ordering;

use chrono::{DateTime, Duration, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::types::{ForecastRecord, MainConditions, ParseError, TemperatureUnit};

const TAG_CURRENT_CONDITIONS: &str = "current_conditions";
const TAG_FORECAST_CONDITIONS: &str = "forecast_conditions";
const TAG_CONDITION: &str = "condition";
const TAG_LOW: &str = "low";
const TAG_HIGH: &str = "high";
const TAG_ICON: &str = "icon";
const TAG_DATE_TIME: &str = "current_date_time";
const TAG_TEMP_C: &str = "temp_c";
const TAG_TEMP_F: &str = "temp_f";
const TAG_UNIT_SYSTEM: &str = "unit_system";
const TAG_MORE_INFO: &str = "moreWeatherInformation";
const ATTR_DATA: &str = "data";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S %z";

/// Days anchored to the base timestamp. Slots past these have no validity
/// start and are not reported.
pub const ANCHORED_DAYS: usize = 4;

/// Result of a successful parse
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedForecast {
    pub conditions: MainConditions,
    pub records: Vec<ForecastRecord>,
}

/// Markup event as seen by the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    /// Start (or self-closing) tag with its `data` attribute, if any
    Open { tag: String, data: Option<String> },
    Text(String),
    Close { tag: String },
}

#[derive(Debug, Clone, Default)]
struct Slot {
    conditions: String,
    temp_high: Option<i32>,
    temp_low: Option<i32>,
    icon: Option<String>,
}

/// Accumulated scan state
#[derive(Debug, Clone)]
pub struct ParserState {
    index: i64,
    slots: Vec<Slot>,
    base: Option<DateTime<Utc>>,
    unit_system: Option<String>,
    temp_c: Option<String>,
    temp_f: Option<String>,
    detail_url: Option<String>,
    in_detail: bool,
}

impl Default for ParserState {
    fn default() -> Self {
        Self::new()
    }
}

impl ParserState {
    pub fn new() -> Self {
        Self {
            index: 0,
            slots: Vec::new(),
            base: None,
            unit_system: None,
            temp_c: None,
            temp_f: None,
            detail_url: None,
            in_detail: false,
        }
    }

    /// Feed one event into the machine
    pub fn apply(&mut self, event: FeedEvent) -> Result<(), ParseError> {
        match event {
            FeedEvent::Open { tag, data } => self.open(&tag, data),
            FeedEvent::Text(text) => {
                if self.in_detail && !text.is_empty() {
                    self.detail_url = Some(text);
                }
                Ok(())
            }
            FeedEvent::Close { tag } => {
                if tag == TAG_MORE_INFO {
                    self.in_detail = false;
                }
                Ok(())
            }
        }
    }

    fn open(&mut self, tag: &str, data: Option<String>) -> Result<(), ParseError> {
        let slot_index = usize::try_from(self.index).ok();

        match (tag, slot_index) {
            (TAG_CURRENT_CONDITIONS, _) => self.index = -1,
            (TAG_FORECAST_CONDITIONS, _) => self.index += 1,
            (TAG_MORE_INFO, _) => self.in_detail = true,
            (TAG_UNIT_SYSTEM, _) => self.unit_system = Some(data.unwrap_or_default()),
            (TAG_TEMP_C, _) => self.temp_c = data,
            (TAG_TEMP_F, _) => self.temp_f = data,
            (TAG_CONDITION, Some(index)) => {
                self.slot(index).conditions = data.unwrap_or_default();
            }
            (TAG_LOW, Some(index)) => {
                let value = parse_temperature(tag, require(tag, data)?)?;
                self.slot(index).temp_low = Some(value);
            }
            (TAG_HIGH, Some(index)) => {
                let value = parse_temperature(tag, require(tag, data)?)?;
                self.slot(index).temp_high = Some(value);
            }
            (TAG_ICON, Some(index)) => {
                self.slot(index).icon = data.filter(|icon| !icon.is_empty());
            }
            (TAG_DATE_TIME, Some(_)) => {
                self.base = Some(parse_timestamp(&require(tag, data)?)?);
            }
            _ => {}
        }

        Ok(())
    }

    /// Slot at `index`, creating empty intermediate slots as needed
    fn slot(&mut self, index: usize) -> &mut Slot {
        if index >= self.slots.len() {
            self.slots.resize_with(index + 1, Slot::default);
        }
        &mut self.slots[index]
    }

    /// Close the scan. `now` is the base when the feed carried no timestamp.
    pub fn finish(mut self, now: DateTime<Utc>) -> Result<ParsedForecast, ParseError> {
        let conditions = self.main_conditions()?;
        let base = self.base.unwrap_or(now);

        if self.slots.len() < ANCHORED_DAYS {
            self.slots.resize_with(ANCHORED_DAYS, Slot::default);
        }

        let mut records = Vec::with_capacity(ANCHORED_DAYS);
        for (day, slot) in self.slots.into_iter().enumerate() {
            if slot.conditions.is_empty() {
                continue;
            }
            if day >= ANCHORED_DAYS {
                tracing::debug!("Dropping forecast slot {} beyond anchored days", day);
                continue;
            }
            records.push(ForecastRecord {
                valid_start: base + Duration::days(day as i64),
                temp_high: slot.temp_high,
                temp_low: slot.temp_low,
                conditions: slot.conditions,
                icon: slot.icon,
                url: self.detail_url.clone(),
                alert: false,
            });
        }

        Ok(ParsedForecast {
            conditions,
            records: flatten_forecasts(records),
        })
    }

    fn main_conditions(&self) -> Result<MainConditions, ParseError> {
        let Some(system) = self.unit_system.as_deref() else {
            return Ok(MainConditions::default());
        };

        let unit = TemperatureUnit::from_unit_system(system);
        let (tag, raw) = match unit {
            TemperatureUnit::Celsius => (TAG_TEMP_C, self.temp_c.as_deref()),
            TemperatureUnit::Fahrenheit => (TAG_TEMP_F, self.temp_f.as_deref()),
        };
        let current_temperature = raw.map(|value| parse_temperature(tag, value.to_string())).transpose()?;

        Ok(MainConditions {
            unit,
            current_temperature,
        })
    }
}

fn require(tag: &str, data: Option<String>) -> Result<String, ParseError> {
    data.ok_or_else(|| ParseError::MissingAttribute {
        tag: tag.to_string(),
        attribute: ATTR_DATA.to_string(),
    })
}

fn parse_temperature(tag: &str, value: String) -> Result<i32, ParseError> {
    match value.trim().parse::<i32>() {
        Ok(parsed) => Ok(parsed),
        Err(_) => Err(ParseError::InvalidTemperature {
            tag: tag.to_string(),
            value,
        }),
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, ParseError> {
    DateTime::parse_from_str(value.trim(), TIMESTAMP_FORMAT)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| ParseError::InvalidTimestamp(value.to_string()))
}

/// Parse a raw feed document.
///
/// `expected_days` is what the request asked for; fewer records than that
/// is logged but not an error.
pub fn parse(raw: &str, expected_days: u32) -> Result<ParsedForecast, ParseError> {
    parse_at(raw, expected_days, Utc::now())
}

/// Same as [`parse`] with an explicit fallback base time
pub fn parse_at(
    raw: &str,
    expected_days: u32,
    now: DateTime<Utc>,
) -> Result<ParsedForecast, ParseError> {
    let mut reader = Reader::from_str(raw);
    reader.config_mut().trim_text(true);

    let mut state = ParserState::new();

    loop {
        let event = match reader.read_event() {
            Ok(Event::Start(e)) => open_event(&e)?,
            Ok(Event::Empty(e)) => {
                let open = open_event(&e)?;
                let tag = tag_name(&e);
                state.apply(open)?;
                FeedEvent::Close { tag }
            }
            Ok(Event::End(e)) => FeedEvent::Close {
                tag: String::from_utf8_lossy(e.local_name().as_ref()).into_owned(),
            },
            Ok(Event::Text(t)) => FeedEvent::Text(t.unescape().map_err(malformed)?.into_owned()),
            Ok(Event::CData(c)) => FeedEvent::Text(String::from_utf8_lossy(&c.into_inner()).into_owned()),
            Ok(Event::Eof) => break,
            Ok(_) => continue,
            Err(e) => {
                return Err(ParseError::Malformed(format!(
                    "at position {}: {}",
                    reader.error_position(),
                    e
                )))
            }
        };
        state.apply(event)?;
    }

    let parsed = state.finish(now)?;

    if parsed.records.len() < expected_days as usize {
        tracing::debug!(
            "Feed returned {} of {} requested days",
            parsed.records.len(),
            expected_days
        );
    }

    Ok(parsed)
}

fn tag_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn open_event(e: &BytesStart<'_>) -> Result<FeedEvent, ParseError> {
    let data = match e.try_get_attribute(ATTR_DATA).map_err(malformed)? {
        Some(attr) => Some(attr.unescape_value().map_err(malformed)?.into_owned()),
        None => None,
    };

    Ok(FeedEvent::Open {
        tag: tag_name(e),
        data,
    })
}

fn malformed(e: impl std::fmt::Display) -> ParseError {
    ParseError::Malformed(e.to_string())
}

/// Order records for display: alerts first in discovery order, everything
/// else by validity start. The sort is stable.
pub fn flatten_forecasts(mut records: Vec<ForecastRecord>) -> Vec<ForecastRecord> {
    records.sort_by(|left, right| match (left.alert, right.alert) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => left.valid_start.cmp(&right.valid_start),
    });
    records
}

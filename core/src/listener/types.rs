use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Provider name the tracing subsystem uses for its own bookkeeping events.
pub const SESSION_PROVIDER_NAME: &str = "diagkit-session";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum EventLevel {
    LogAlways = 0,
    Critical = 1,
    Error = 2,
    Warning = 3,
    Informational = 4,
    Verbose = 5,
}

impl From<EventLevel> for u8 {
    fn from(level: EventLevel) -> Self {
        level as u8
    }
}

impl TryFrom<u8> for EventLevel {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, String> {
        match v {
            0 => Ok(EventLevel::LogAlways),
            1 => Ok(EventLevel::Critical),
            2 => Ok(EventLevel::Error),
            3 => Ok(EventLevel::Warning),
            4 => Ok(EventLevel::Informational),
            5 => Ok(EventLevel::Verbose),
            other => Err(format!("invalid event level {other}")),
        }
    }
}

impl std::str::FromStr for EventLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "logalways" | "always" => Ok(EventLevel::LogAlways),
            "critical" => Ok(EventLevel::Critical),
            "error" => Ok(EventLevel::Error),
            "warning" | "warn" => Ok(EventLevel::Warning),
            "informational" | "info" => Ok(EventLevel::Informational),
            "verbose" => Ok(EventLevel::Verbose),
            other => other
                .parse::<u8>()
                .map_err(|_| format!("invalid event level {other}"))
                .and_then(EventLevel::try_from),
        }
    }
}

impl EventLevel {
    /// Enabling at `LogAlways` admits every level, and `LogAlways` events
    /// pass every session. Otherwise the event must be at most as verbose
    /// as the enabled level.
    pub fn allows(self, event_level: EventLevel) -> bool {
        self == EventLevel::LogAlways
            || event_level == EventLevel::LogAlways
            || event_level <= self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventCommand {
    Enable,
    Disable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnableOptions {
    pub keywords: u64,
    pub level: EventLevel,
    pub filter_arguments: Option<String>,
}

impl Default for EnableOptions {
    fn default() -> Self {
        Self {
            keywords: u64::MAX,
            level: EventLevel::Verbose,
            filter_arguments: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    #[serde(with = "keywords_hex")]
    pub keywords: u64,
    pub level: EventLevel,
    #[serde(default)]
    pub filter_arguments: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SerializationFormat {
    Jsonl,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub circular_buffer_mb: u32,
    pub format: SerializationFormat,
    pub request_rundown: bool,
    pub providers: Vec<ProviderConfig>,
}

impl ProviderConfig {
    /// Whether an event at `level` carrying `keywords` passes this provider.
    /// A zero mask on either side matches anything.
    pub fn wants(&self, level: EventLevel, keywords: u64) -> bool {
        self.level.allows(level)
            && (self.keywords == 0 || keywords == 0 || self.keywords & keywords != 0)
    }
}

impl SessionConfig {
    pub fn provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.name == name)
    }
}

/// One decoded event as handed to listener callbacks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    #[serde(rename = "provider")]
    pub provider_name: String,

    #[serde(rename = "event")]
    pub event_name: String,

    #[serde(rename = "id", default)]
    pub event_id: u32,

    #[serde(default = "default_event_level")]
    pub level: EventLevel,

    #[serde(rename = "ts", default = "Utc::now")]
    pub timestamp: DateTime<Utc>,

    #[serde(default)]
    pub payload: Value,
}

fn default_event_level() -> EventLevel {
    EventLevel::Informational
}

impl TraceEvent {
    pub fn new(provider_name: impl Into<String>, event_name: impl Into<String>) -> Self {
        Self {
            provider_name: provider_name.into(),
            event_name: event_name.into(),
            event_id: 0,
            level: default_event_level(),
            timestamp: Utc::now(),
            payload: Value::Null,
        }
    }

    pub fn is_session_internal(&self) -> bool {
        self.provider_name == SESSION_PROVIDER_NAME
    }
}

/// 64-bit keyword masks travel as `0x…` strings; plain numbers are accepted on input.
pub(crate) mod keywords_hex {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &u64, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format!("{v:#018x}"))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Num(u64),
            Str(String),
        }
        match Raw::deserialize(d)? {
            Raw::Num(n) => Ok(n),
            Raw::Str(s) => super::parse_keywords(&s).map_err(D::Error::custom),
        }
    }
}

/// Parses `0x`-prefixed hex or decimal keyword masks.
pub fn parse_keywords(s: &str) -> Result<u64, String> {
    let t = s.trim();
    let parsed = match t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => t.parse::<u64>(),
    };
    parsed.map_err(|_| format!("invalid keywords mask {t}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn level_filtering() {
        assert!(EventLevel::Warning.allows(EventLevel::Error));
        assert!(EventLevel::Warning.allows(EventLevel::Warning));
        assert!(!EventLevel::Warning.allows(EventLevel::Verbose));
        assert!(EventLevel::Critical.allows(EventLevel::LogAlways));
        assert!(EventLevel::LogAlways.allows(EventLevel::Verbose));
    }

    #[test]
    fn level_from_wire_byte() {
        assert_eq!(EventLevel::try_from(0), Ok(EventLevel::LogAlways));
        assert_eq!(EventLevel::try_from(5), Ok(EventLevel::Verbose));
        assert_eq!(
            EventLevel::try_from(6),
            Err("invalid event level 6".to_string())
        );
        assert!(serde_json::from_str::<EventLevel>("6").is_err());
        assert_eq!(serde_json::from_str::<EventLevel>("3").unwrap(), EventLevel::Warning);
    }

    #[test]
    fn provider_wants_level_and_keywords() {
        let p = |keywords, level| ProviderConfig {
            name: "A".into(),
            keywords,
            level,
            filter_arguments: None,
        };
        let narrow = p(0x2, EventLevel::Warning);
        assert!(narrow.wants(EventLevel::Error, 0x3));
        assert!(!narrow.wants(EventLevel::Error, 0x4));
        assert!(!narrow.wants(EventLevel::Verbose, 0x2));
        assert!(narrow.wants(EventLevel::Warning, 0));

        // Zero mask and LogAlways level enable everything.
        let wide = p(0, EventLevel::LogAlways);
        assert!(wide.wants(EventLevel::Verbose, 0x8000));
        assert!(wide.wants(EventLevel::Critical, 0));
    }

    #[test]
    fn level_parses_names_and_numbers() {
        assert_eq!("info".parse::<EventLevel>(), Ok(EventLevel::Informational));
        assert_eq!("Verbose".parse::<EventLevel>(), Ok(EventLevel::Verbose));
        assert_eq!("2".parse::<EventLevel>(), Ok(EventLevel::Error));
        assert!("9".parse::<EventLevel>().is_err());
    }

    #[test]
    fn session_config_wire_shape() {
        let cfg = SessionConfig {
            circular_buffer_mb: 256,
            format: SerializationFormat::Jsonl,
            request_rundown: false,
            providers: vec![ProviderConfig {
                name: "A".into(),
                keywords: u64::MAX,
                level: EventLevel::Verbose,
                filter_arguments: None,
            }],
        };
        let v = serde_json::to_value(&cfg).unwrap();
        assert_eq!(
            v,
            serde_json::json!({
                "circular_buffer_mb": 256,
                "format": "jsonl",
                "request_rundown": false,
                "providers": [{
                    "name": "A",
                    "keywords": "0xffffffffffffffff",
                    "level": 5,
                    "filter_arguments": null
                }]
            })
        );
    }

    #[test]
    fn keywords_accept_numbers_and_hex() {
        let p: ProviderConfig =
            serde_json::from_str(r#"{"name":"A","keywords":16,"level":4}"#).unwrap();
        assert_eq!(p.keywords, 16);
        let p: ProviderConfig =
            serde_json::from_str(r#"{"name":"A","keywords":"0x10","level":4}"#).unwrap();
        assert_eq!(p.keywords, 16);
        assert!(parse_keywords("0xzz").is_err());
    }

    #[test]
    fn event_defaults_missing_fields() {
        let before = Utc::now();
        let ev: TraceEvent = serde_json::from_str(r#"{"provider":"P","event":"E"}"#).unwrap();
        assert_eq!(ev.provider_name, "P");
        assert_eq!(ev.event_name, "E");
        assert_eq!(ev.level, EventLevel::Informational);
        assert_eq!(ev.payload, Value::Null);
        assert!(ev.timestamp >= before);
    }
}

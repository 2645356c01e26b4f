use chrono::{DateTime, Local, NaiveDateTime, SecondsFormat};
use serde::{Deserialize, Serialize};

/// A subject-relation-object edge that has passed endpoint validation.
///
/// Endpoints are non-empty and distinct; there is no way to build a
/// self-loop through the public API.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Triplet {
    subject: String,
    relation: String,
    object: String,
}

impl Triplet {
    /// Returns `None` for an empty endpoint, an empty relation or a self-loop.
    pub fn new(
        subject: impl Into<String>,
        relation: impl Into<String>,
        object: impl Into<String>,
    ) -> Option<Self> {
        let subject = subject.into();
        let relation = relation.into();
        let object = object.into();

        if subject.is_empty() || object.is_empty() || relation.is_empty() {
            return None;
        }
        if subject == object {
            return None;
        }

        Some(Self {
            subject,
            relation,
            object,
        })
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn relation(&self) -> &str {
        &self.relation
    }

    pub fn object(&self) -> &str {
        &self.object
    }

    /// Stamp this triplet with the turn timestamp.
    pub fn at(self, timestamp: impl Into<String>) -> Fact {
        Fact {
            triplet: self,
            timestamp: timestamp.into(),
        }
    }
}

impl std::fmt::Display for Triplet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -[{}]-> {}", self.subject, self.relation, self.object)
    }
}

/// An immutable, timestamped triplet ready to be written to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fact {
    triplet: Triplet,
    timestamp: String,
}

impl Fact {
    pub fn triplet(&self) -> &Triplet {
        &self.triplet
    }

    pub fn subject(&self) -> &str {
        self.triplet.subject()
    }

    pub fn relation(&self) -> &str {
        self.triplet.relation()
    }

    pub fn object(&self) -> &str {
        self.triplet.object()
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn key(&self) -> FactKey {
        FactKey {
            subject: self.subject().to_string(),
            relation: self.relation().to_string(),
            object: self.object().to_string(),
            timestamp: self.timestamp.clone(),
        }
    }
}

/// Status annotation written by conflict resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactStatus {
    Current,
    Past,
}

impl FactStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Current => "current",
            Self::Past => "past",
        }
    }
}

impl std::fmt::Display for FactStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FactStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "current" => Ok(Self::Current),
            "past" => Ok(Self::Past),
            other => Err(format!("unknown fact status '{other}'")),
        }
    }
}

/// Exact-match key for status updates and deletes. The timestamp
/// disambiguates otherwise identical edges written in different turns.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FactKey {
    pub subject: String,
    pub relation: String,
    pub object: String,
    pub timestamp: String,
}

/// A fact as read back from the graph store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFact {
    pub subject: String,
    pub relation: String,
    pub object: String,
    pub timestamp: String,
    pub status: Option<FactStatus>,
}

impl StoredFact {
    pub fn key(&self) -> FactKey {
        FactKey {
            subject: self.subject.clone(),
            relation: self.relation.clone(),
            object: self.object.clone(),
            timestamp: self.timestamp.clone(),
        }
    }

    /// Wall-clock time of the fact, if its timestamp parses.
    pub fn local_time(&self) -> Option<NaiveDateTime> {
        parse_timestamp(&self.timestamp)
    }

    /// One line of the evidence log: `[timestamp] subject -[relation]-> object`.
    pub fn log_line(&self) -> String {
        let ts = if self.timestamp.is_empty() {
            "no-time"
        } else {
            self.timestamp.as_str()
        };
        format!(
            "[{}] {} -[{}]-> {}",
            ts, self.subject, self.relation, self.object
        )
    }
}

impl From<&Fact> for StoredFact {
    fn from(fact: &Fact) -> Self {
        Self {
            subject: fact.subject().to_string(),
            relation: fact.relation().to_string(),
            object: fact.object().to_string(),
            timestamp: fact.timestamp().to_string(),
            status: None,
        }
    }
}

/// Turn timestamp: local time, RFC 3339 with offset, second precision.
pub fn make_timestamp() -> String {
    Local::now().to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// Parse an ISO-8601 timestamp into its wall-clock time. Offsets are
/// accepted and dropped; naive timestamps are taken as-is.
pub fn parse_timestamp(ts: &str) -> Option<NaiveDateTime> {
    let ts = ts.trim();
    if ts.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(ts) {
        return Some(dt.naive_local());
    }
    NaiveDateTime::parse_from_str(ts, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(ts, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Timelike};

    #[test]
    fn test_triplet_rejects_self_loop() {
        assert!(Triplet::new("User", "LIVES_IN", "User").is_none());
    }

    #[test]
    fn test_triplet_rejects_empty_endpoints() {
        assert!(Triplet::new("", "LIVES_IN", "Melbourne").is_none());
        assert!(Triplet::new("User", "LIVES_IN", "").is_none());
        assert!(Triplet::new("User", "", "Melbourne").is_none());
    }

    #[test]
    fn test_fact_key_and_display() {
        let fact = Triplet::new("User", "LIVES_IN", "Melbourne")
            .unwrap()
            .at("2025-01-01T10:00:00+10:00");

        assert_eq!(fact.triplet().to_string(), "User -[LIVES_IN]-> Melbourne");
        let key = fact.key();
        assert_eq!(key.subject, "User");
        assert_eq!(key.object, "Melbourne");
        assert_eq!(key.timestamp, "2025-01-01T10:00:00+10:00");
    }

    #[test]
    fn test_status_round_trip_strings() {
        assert_eq!("past".parse::<FactStatus>().unwrap(), FactStatus::Past);
        assert_eq!(" Current ".parse::<FactStatus>().unwrap(), FactStatus::Current);
        assert!("stale".parse::<FactStatus>().is_err());
        assert_eq!(FactStatus::Past.to_string(), "past");
    }

    #[test]
    fn test_parse_timestamp_keeps_wall_clock() {
        let dt = parse_timestamp("2025-03-04T15:30:00+10:00").unwrap();
        assert_eq!(dt.date(), NaiveDate::from_ymd_opt(2025, 3, 4).unwrap());
        assert_eq!(dt.hour(), 15);

        let naive = parse_timestamp("2025-03-04T09:05:00").unwrap();
        assert_eq!(naive.minute(), 5);

        assert!(parse_timestamp("").is_none());
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_make_timestamp_parses_back() {
        let ts = make_timestamp();
        assert!(parse_timestamp(&ts).is_some());
        assert!(!ts.contains('.'), "second precision expected: {ts}");
    }

    #[test]
    fn test_log_line() {
        let fact = StoredFact {
            subject: "User".to_string(),
            relation: "LIVES_IN".to_string(),
            object: "Melbourne".to_string(),
            timestamp: String::new(),
            status: None,
        };
        assert_eq!(fact.log_line(), "[no-time] User -[LIVES_IN]-> Melbourne");
    }
}

use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unknown day: {0}")]
    Day(String),
    #[error("time must be HH:MM, got {0:?}")]
    Time(String),
    #[error("unknown grade: {0}")]
    Grade(String),
    #[error("unknown field: {0}")]
    Field(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Day {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
}

impl Day {
    pub const ALL: [Day; 6] = [
        Day::Monday,
        Day::Tuesday,
        Day::Wednesday,
        Day::Thursday,
        Day::Friday,
        Day::Saturday,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Day::Monday => "Monday",
            Day::Tuesday => "Tuesday",
            Day::Wednesday => "Wednesday",
            Day::Thursday => "Thursday",
            Day::Friday => "Friday",
            Day::Saturday => "Saturday",
        }
    }
}

impl FromStr for Day {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim();
        Day::ALL
            .into_iter()
            .find(|d| d.as_str().eq_ignore_ascii_case(t))
            .ok_or_else(|| ParseError::Day(t.to_string()))
    }
}

impl fmt::Display for Day {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wall-clock time of day, always rendered as zero-padded `HH:MM`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SlotTime(NaiveTime);

impl SlotTime {
    pub fn from_hm(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(SlotTime)
    }

    pub fn minutes_since_midnight(self) -> u32 {
        self.0.hour() * 60 + self.0.minute()
    }

    pub fn from_minutes(total: u32) -> Option<Self> {
        Self::from_hm(total / 60, total % 60)
    }
}

impl FromStr for SlotTime {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim();
        let bad = || ParseError::Time(t.to_string());
        let (h, m) = t.split_once(':').ok_or_else(bad)?;
        if h.len() != 2 || m.len() != 2 {
            return Err(bad());
        }
        if !h.bytes().chain(m.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(bad());
        }
        let hour: u32 = h.parse().map_err(|_| bad())?;
        let minute: u32 = m.parse().map_err(|_| bad())?;
        SlotTime::from_hm(hour, minute).ok_or_else(bad)
    }
}

impl TryFrom<String> for SlotTime {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SlotTime> for String {
    fn from(value: SlotTime) -> Self {
        value.to_string()
    }
}

impl fmt::Display for SlotTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%H:%M"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Grade {
    #[serde(rename = "Stage 1")]
    Stage1,
    #[serde(rename = "Stage 2")]
    Stage2,
    #[serde(rename = "Stage 3")]
    Stage3,
    #[serde(rename = "Stage 4")]
    Stage4,
    #[serde(rename = "Stage 5")]
    Stage5,
    #[serde(rename = "Stage 6")]
    Stage6,
    #[serde(rename = "Stage 7")]
    Stage7,
    #[serde(rename = "Stage 8")]
    Stage8,
    #[serde(rename = "Stage 9")]
    Stage9,
    #[serde(rename = "IGCSE")]
    Igcse,
    #[serde(rename = "AS Level")]
    AsLevel,
    #[serde(rename = "A Level")]
    ALevel,
}

impl Grade {
    pub const ALL: [Grade; 12] = [
        Grade::Stage1,
        Grade::Stage2,
        Grade::Stage3,
        Grade::Stage4,
        Grade::Stage5,
        Grade::Stage6,
        Grade::Stage7,
        Grade::Stage8,
        Grade::Stage9,
        Grade::Igcse,
        Grade::AsLevel,
        Grade::ALevel,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Grade::Stage1 => "Stage 1",
            Grade::Stage2 => "Stage 2",
            Grade::Stage3 => "Stage 3",
            Grade::Stage4 => "Stage 4",
            Grade::Stage5 => "Stage 5",
            Grade::Stage6 => "Stage 6",
            Grade::Stage7 => "Stage 7",
            Grade::Stage8 => "Stage 8",
            Grade::Stage9 => "Stage 9",
            Grade::Igcse => "IGCSE",
            Grade::AsLevel => "AS Level",
            Grade::ALevel => "A Level",
        }
    }
}

impl FromStr for Grade {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim();
        Grade::ALL
            .into_iter()
            .find(|g| g.label().eq_ignore_ascii_case(t))
            .ok_or_else(|| ParseError::Grade(t.to_string()))
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Store-assigned entry identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub String);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimetableEntry {
    pub id: EntryId,
    pub day: Day,
    pub time: SlotTime,
    pub grade: Grade,
    pub subject: String,
    pub teacher_id: String,
    pub curriculum: String,
}

impl TimetableEntry {
    /// Sort key used for every listing: day, time, grade, subject.
    pub fn listing_key(&self) -> (Day, SlotTime, Grade, &str) {
        (self.day, self.time, self.grade, self.subject.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimetableEntryDraft {
    pub day: Day,
    pub time: SlotTime,
    pub grade: Grade,
    pub subject: String,
    pub teacher_id: String,
    pub curriculum: String,
}

impl TimetableEntryDraft {
    pub fn into_entry(self, id: EntryId) -> TimetableEntry {
        TimetableEntry {
            id,
            day: self.day,
            time: self.time,
            grade: self.grade,
            subject: self.subject,
            teacher_id: self.teacher_id,
            curriculum: self.curriculum,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Teacher {
    pub id: String,
    pub name: String,
    pub subjects: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Field {
    Day,
    Time,
    Grade,
    Subject,
    TeacherId,
}

impl Field {
    pub const ALL: [Field; 5] = [
        Field::Day,
        Field::Time,
        Field::Grade,
        Field::Subject,
        Field::TeacherId,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Field::Day => "day",
            Field::Time => "time",
            Field::Grade => "grade",
            Field::Subject => "subject",
            Field::TeacherId => "teacherId",
        }
    }
}

impl FromStr for Field {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Field::ALL
            .into_iter()
            .find(|f| f.as_str() == s.trim())
            .ok_or_else(|| ParseError::Field(s.trim().to_string()))
    }
}

/// A proposed entry whose fields may still be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub day: Option<Day>,
    pub time: Option<SlotTime>,
    pub grade: Option<Grade>,
    pub subject: Option<String>,
    pub teacher_id: Option<String>,
}

impl Candidate {
    pub fn missing_fields(&self) -> Vec<Field> {
        let blank = |v: &Option<String>| v.as_deref().map(str::trim).unwrap_or("").is_empty();
        let mut out = Vec::new();
        if self.day.is_none() {
            out.push(Field::Day);
        }
        if self.time.is_none() {
            out.push(Field::Time);
        }
        if self.grade.is_none() {
            out.push(Field::Grade);
        }
        if blank(&self.subject) {
            out.push(Field::Subject);
        }
        if blank(&self.teacher_id) {
            out.push(Field::TeacherId);
        }
        out
    }

    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }
}

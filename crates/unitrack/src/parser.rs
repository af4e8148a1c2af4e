use std::sync::LazyLock;

use chrono::NaiveTime;
use regex::Regex;

use crate::types::{ClassTime, CourseLabel, Day};

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Failed to parse time: {0}")]
    TimeParse(String),
    #[error("Missing required field: {0}")]
    MissingField(String),
    #[error("Unrecognized format: {0}")]
    Pattern(String),
}

static RE_CLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{1,2}):(\d{1,2})(?:\s?([ap]m|[AP]M))?").expect("invalid regex: clock")
});

static RE_CLASS_TYPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\((.*?)\)").expect("invalid regex: class type"));

static RE_DAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(Sun|Mon|Tue|Wed|Thu|Fri|Sat)\b").expect("invalid regex: day")
});

static RE_ROOM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Room:\s*(.*)").expect("invalid regex: room"));

static RE_COURSE_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)-(.+?)\s+\[([A-Z0-9]+)\](?:\s+\[([A-Z0-9]+)\])?$")
        .expect("invalid regex: course label")
});

static RE_GRADE_HISTORY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\(([^)]+)\)\s*\[([^\]]+)\]").expect("invalid regex: grade history")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Meridiem {
    Am,
    Pm,
}

#[derive(Debug, Clone, Copy)]
struct Clock {
    hour: u32,
    minute: u32,
    meridiem: Option<Meridiem>,
}

impl Clock {
    /// Hours the portal can only mean on a 24-hour dial.
    fn is_24h(&self) -> bool {
        self.meridiem.is_none() && (self.hour == 0 || self.hour > 12)
    }

    fn to_naive(self, meridiem: Meridiem) -> Result<NaiveTime, ParseError> {
        let hour = if self.is_24h() {
            self.hour
        } else {
            match (meridiem, self.hour) {
                (Meridiem::Am, 12) => 0,
                (Meridiem::Am, h) => h,
                (Meridiem::Pm, 12) => 12,
                (Meridiem::Pm, h) => h + 12,
            }
        };
        NaiveTime::from_hms_opt(hour, self.minute, 0).ok_or_else(|| {
            ParseError::TimeParse(format!("Invalid time: {}:{:02}", self.hour, self.minute))
        })
    }
}

/// An attempt listed in a grade-history cell, e.g. `(Fall 2023-24) [B+]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradeAttempt {
    pub semester: String,
    pub grade: String,
}

pub(crate) fn elem_text(element: scraper::ElementRef) -> String {
    element.text().collect::<String>()
}

pub(crate) fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Capitalizes the first letter of every word and lowercases the rest.
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev_alpha = false;
    for c in text.chars() {
        if prev_alpha {
            out.extend(c.to_lowercase());
        } else {
            out.extend(c.to_uppercase());
        }
        prev_alpha = c.is_alphabetic();
    }
    out
}

/// Largest integer among the `separator`-delimited tokens of a credit cell.
///
/// Lab and lecture credits are printed side by side ("3 1", "1-3"); the
/// course counts for the larger one. Non-numeric tokens are ignored.
pub fn max_credit(cell: &str, separator: char) -> Option<u32> {
    cell.split(separator)
        .filter_map(|token| token.trim().parse::<u32>().ok())
        .max()
}

fn parse_clock(caps: &regex::Captures) -> Result<Clock, ParseError> {
    let hour: u32 = caps[1]
        .parse()
        .map_err(|_| ParseError::TimeParse(format!("Invalid hour: {}", &caps[1])))?;
    let minute: u32 = caps[2]
        .parse()
        .map_err(|_| ParseError::TimeParse(format!("Invalid minute: {}", &caps[2])))?;
    let meridiem = caps.get(3).map(|m| {
        if m.as_str().eq_ignore_ascii_case("pm") {
            Meridiem::Pm
        } else {
            Meridiem::Am
        }
    });
    Ok(Clock {
        hour,
        minute,
        meridiem,
    })
}

/// Picks a meridiem for each side of a range.
///
/// A side without a marker borrows the other side's marker. When neither has
/// one, both start as AM. An inferred side is moved across noon only when the
/// range would otherwise end before it starts.
fn resolve_range(start: Clock, end: Clock) -> Result<(NaiveTime, NaiveTime), ParseError> {
    let (start_m, end_m) = match (start.meridiem, end.meridiem) {
        (Some(s), Some(e)) => (s, e),
        (None, Some(e)) => {
            if e == Meridiem::Pm && start.to_naive(e)? > end.to_naive(e)? {
                (Meridiem::Am, e)
            } else {
                (e, e)
            }
        }
        (Some(s), None) => {
            if s == Meridiem::Am && end.to_naive(s)? < start.to_naive(s)? {
                (s, Meridiem::Pm)
            } else {
                (s, s)
            }
        }
        (None, None) => {
            if end.to_naive(Meridiem::Am)? < start.to_naive(Meridiem::Am)? {
                (Meridiem::Am, Meridiem::Pm)
            } else {
                (Meridiem::Am, Meridiem::Am)
            }
        }
    };
    Ok((start.to_naive(start_m)?, end.to_naive(end_m)?))
}

/// Room text ends at the next day, clock or parenthesised class type.
fn cut_room(rest: &str) -> String {
    let mut end = rest.find('(').unwrap_or(rest.len());
    if let Some(m) = RE_DAY.find(rest) {
        end = end.min(m.start());
    }
    if let Some(m) = RE_CLOCK.find(rest) {
        end = end.min(m.start());
    }
    rest[..end].trim().to_string()
}

/// Decodes a class meeting fragment such as
/// `Time: Sun 08:00 AM - 10:00 AM (Lecture) Room: DN0514`.
///
/// The returned range is always `HH:MM AM - HH:MM PM` style, see
/// [`resolve_range`] for how missing markers are filled in.
pub fn parse_class_time(raw: &str) -> Result<ClassTime, ParseError> {
    let clocks = RE_CLOCK
        .captures_iter(raw)
        .take(2)
        .map(|caps| parse_clock(&caps))
        .collect::<Result<Vec<_>, _>>()?;
    let &[start, end] = clocks.as_slice() else {
        return Err(ParseError::MissingField(format!("time range in '{}'", raw)));
    };

    let day = RE_DAY
        .captures(raw)
        .and_then(|caps| Day::from_abbreviation(&caps[1]))
        .ok_or_else(|| ParseError::MissingField(format!("day in '{}'", raw)))?;

    let room = RE_ROOM
        .captures(raw)
        .map(|caps| cut_room(&caps[1]))
        .filter(|room| !room.is_empty())
        .ok_or_else(|| ParseError::MissingField(format!("room in '{}'", raw)))?;

    let class_type = RE_CLASS_TYPE
        .captures(raw)
        .map(|caps| caps[1].trim().to_string())
        .unwrap_or_default();

    let (start, end) = resolve_range(start, end)?;

    Ok(ClassTime {
        day,
        time_range: format!("{} - {}", start.format("%I:%M %p"), end.format("%I:%M %p")),
        class_type,
        room,
    })
}

/// Decodes `<class id>-<NAME> [<CODE>] [<SECTION>]`. A single bracket is
/// taken as the section.
pub fn parse_course_label(raw: &str) -> Result<CourseLabel, ParseError> {
    let raw = raw.trim();
    let caps = RE_COURSE_LABEL
        .captures(raw)
        .ok_or_else(|| ParseError::Pattern(format!("course label '{}'", raw)))?;

    let section = caps
        .get(4)
        .or_else(|| caps.get(3))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();

    Ok(CourseLabel {
        class_id: caps[1].to_string(),
        course_name: title_case(&caps[2]),
        section,
    })
}

/// All `(semester)[grade]` pairs of a grade-history cell, oldest first.
pub fn parse_grade_history(raw: &str) -> Vec<GradeAttempt> {
    RE_GRADE_HISTORY
        .captures_iter(raw)
        .map(|caps| GradeAttempt {
            semester: caps[1].trim().to_string(),
            grade: caps[2].trim().to_string(),
        })
        .collect()
}

use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Curriculum courses keyed by course code, in portal order.
pub type CourseMap = IndexMap<String, CourseRecord>;

/// One grade bucket (completed, current semester or pre-registered) keyed by course code.
pub type GradeBucket = IndexMap<String, GradeEntry>;

/// Weekly timetable of one semester: day → time range → class.
pub type SemesterRoutine = IndexMap<Day, IndexMap<String, ClassSlot>>;

/// Every semester's routine, ordered by semester label.
pub type ClassRoutine = BTreeMap<String, SemesterRoutine>;

pub type UnlockedCourses = IndexMap<String, UnlockedCourse>;

#[derive(Debug, thiserror::Error)]
#[error("Invalid grade '{0}'")]
pub struct GradeParseError(String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Grade {
    #[serde(rename = "A+")]
    APlus,
    A,
    #[serde(rename = "B+")]
    BPlus,
    B,
    #[serde(rename = "C+")]
    CPlus,
    C,
    #[serde(rename = "D+")]
    DPlus,
    D,
    F,
    #[serde(rename = "W")]
    Withdrawn,
    #[serde(rename = "I")]
    Incomplete,
    #[serde(rename = "-")]
    Pending,
}

impl Grade {
    /// Letter grades the grade report counts as a finished attempt.
    pub fn is_letter(&self) -> bool {
        !matches!(self, Grade::Withdrawn | Grade::Incomplete | Grade::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::APlus => "A+",
            Grade::A => "A",
            Grade::BPlus => "B+",
            Grade::B => "B",
            Grade::CPlus => "C+",
            Grade::C => "C",
            Grade::DPlus => "D+",
            Grade::D => "D",
            Grade::F => "F",
            Grade::Withdrawn => "W",
            Grade::Incomplete => "I",
            Grade::Pending => "-",
        }
    }
}

impl FromStr for Grade {
    type Err = GradeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "A+" => Ok(Grade::APlus),
            "A" => Ok(Grade::A),
            "B+" => Ok(Grade::BPlus),
            "B" => Ok(Grade::B),
            "C+" => Ok(Grade::CPlus),
            "C" => Ok(Grade::C),
            "D+" => Ok(Grade::DPlus),
            "D" => Ok(Grade::D),
            "F" => Ok(Grade::F),
            "W" => Ok(Grade::Withdrawn),
            "I" => Ok(Grade::Incomplete),
            "-" => Ok(Grade::Pending),
            _ => Err(GradeParseError(s.to_string())),
        }
    }
}

impl Display for Grade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown day '{0}'")]
pub struct DayParseError(String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Day {
    Sunday,
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
}

impl Day {
    /// Maps the three-letter abbreviation the portal prints.
    pub fn from_abbreviation(abbr: &str) -> Option<Day> {
        match abbr {
            "Sun" => Some(Day::Sunday),
            "Mon" => Some(Day::Monday),
            "Tue" => Some(Day::Tuesday),
            "Wed" => Some(Day::Wednesday),
            "Thu" => Some(Day::Thursday),
            "Fri" => Some(Day::Friday),
            "Sat" => Some(Day::Saturday),
            _ => None,
        }
    }
}

impl FromStr for Day {
    type Err = DayParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sunday" | "sun" => Ok(Day::Sunday),
            "monday" | "mon" => Ok(Day::Monday),
            "tuesday" | "tue" => Ok(Day::Tuesday),
            "wednesday" | "wed" => Ok(Day::Wednesday),
            "thursday" | "thu" => Ok(Day::Thursday),
            "friday" | "fri" => Ok(Day::Friday),
            "saturday" | "sat" => Ok(Day::Saturday),
            _ => Err(DayParseError(s.to_string())),
        }
    }
}

impl Display for Day {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Day::Sunday => "Sunday",
            Day::Monday => "Monday",
            Day::Tuesday => "Tuesday",
            Day::Wednesday => "Wednesday",
            Day::Thursday => "Thursday",
            Day::Friday => "Friday",
            Day::Saturday => "Saturday",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseRecord {
    pub course_name: String,
    pub credit: u32,
    pub prerequisites: Vec<String>,
}

impl Display for CourseRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({} cr)", self.course_name, self.credit)?;
        if !self.prerequisites.is_empty() {
            write!(f, " after {}", self.prerequisites.join(", "))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeEntry {
    pub course_name: String,
    pub grade: Grade,
    pub semester: String,
    /// Curriculum credit, filled in when the report is assembled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credit: Option<u32>,
}

impl Display for GradeEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}] ({})", self.course_name, self.grade, self.semester)
    }
}

/// Meeting time decoded from a "Time: ..." fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassTime {
    pub day: Day,
    pub time_range: String,
    #[serde(rename = "type")]
    pub class_type: String,
    pub room: String,
}

/// Course identity decoded from a registration anchor such as `101-DATA STRUCTURES [CSE220] [B]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseLabel {
    pub class_id: String,
    pub course_name: String,
    pub section: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassSlot {
    pub course_name: String,
    pub class_id: String,
    pub credit: u32,
    pub section: String,
    #[serde(rename = "type")]
    pub class_type: String,
    pub room: String,
}

impl Display for ClassSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}] {} · room {}",
            self.course_name, self.section, self.class_type, self.room
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockedCourse {
    pub course_name: String,
    pub credit: u32,
    pub prerequisites: Vec<String>,
    pub retake: bool,
}

impl Display for UnlockedCourse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({} cr)", self.course_name, self.credit)?;
        if self.retake {
            write!(f, " [retake]")?;
        }
        Ok(())
    }
}

/// A semester entry of the home page dropdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SemesterOption {
    pub label: String,
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentHome {
    pub user: String,
    pub current_semester: String,
    pub semesters: Vec<SemesterOption>,
}

/// A row or slot the extractors could not decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedRow {
    pub page: String,
    pub detail: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeReport {
    pub completed: GradeBucket,
    pub current_semester: GradeBucket,
    pub pre_registered: GradeBucket,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub semester_class_routine: ClassRoutine,
    pub unlocked_courses: UnlockedCourses,
    pub completed_courses: GradeBucket,
    pub preregistered_courses: GradeBucket,
    pub current_semester_courses: GradeBucket,
    pub current_semester: String,
    pub user: String,
    #[serde(rename = "curriculumncourses")]
    pub curriculum_courses: CourseMap,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped_rows: Vec<SkippedRow>,
}

impl Display for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "┌─ {} ─ {}", self.user, self.current_semester)?;
        writeln!(
            f,
            "│  {} curriculum course(s), {} completed, {} in progress, {} pre-registered",
            self.curriculum_courses.len(),
            self.completed_courses.len(),
            self.current_semester_courses.len(),
            self.preregistered_courses.len()
        )?;
        writeln!(f, "└─ {} unlocked course(s)", self.unlocked_courses.len())?;
        writeln!(f)?;
        for (code, course) in &self.unlocked_courses {
            writeln!(f, "  ▸ {:<10} {}", code, course)?;
        }
        for (semester, routine) in &self.semester_class_routine {
            writeln!(f)?;
            writeln!(f, "── {}", semester)?;
            for (day, slots) in routine {
                for (time, slot) in slots {
                    writeln!(f, "  {:<9} {:<21} {}", day, time, slot)?;
                }
            }
        }
        if !self.skipped_rows.is_empty() {
            writeln!(f)?;
            writeln!(f, "{} row(s) skipped", self.skipped_rows.len())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grade_round_trips_portal_notation() {
        for raw in ["A+", "A", "B+", "B", "C+", "C", "D+", "D", "F", "W", "I", "-"] {
            let grade: Grade = raw.parse().expect("known grade");
            assert_eq!(grade.to_string(), raw);
        }
        assert!("E".parse::<Grade>().is_err());
        assert!(!Grade::Pending.is_letter());
        assert!(Grade::F.is_letter());
    }

    #[test]
    fn test_report_uses_external_field_names() {
        let report = Report {
            semester_class_routine: ClassRoutine::new(),
            unlocked_courses: UnlockedCourses::new(),
            completed_courses: GradeBucket::new(),
            preregistered_courses: GradeBucket::new(),
            current_semester_courses: GradeBucket::new(),
            current_semester: "Fall 2024-25".to_string(),
            user: "Jane Doe".to_string(),
            curriculum_courses: CourseMap::new(),
            skipped_rows: Vec::new(),
        };

        let json = serde_json::to_value(&report).unwrap();
        for key in [
            "semesterClassRoutine",
            "unlockedCourses",
            "completedCourses",
            "preregisteredCourses",
            "currentSemester",
            "user",
            "curriculumncourses",
        ] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
        assert!(json.get("skippedRows").is_none());
    }

    #[test]
    fn test_day_keys_serialize_as_full_names() {
        let mut routine = SemesterRoutine::new();
        routine.insert(Day::Sunday, IndexMap::new());
        let json = serde_json::to_string(&routine).unwrap();
        assert_eq!(json, r#"{"Sunday":{}}"#);
    }
}

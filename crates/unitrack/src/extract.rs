use std::future::Future;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::eligibility::is_excluded;
use crate::parser::{
    ParseError, elem_text, max_credit, normalize_whitespace, parse_class_time,
    parse_course_label, parse_grade_history,
};
use crate::types::{
    ClassSlot, CourseMap, CourseRecord, Grade, GradeEntry, GradeReport, SemesterOption,
    SemesterRoutine, SkippedRow, StudentHome,
};

static RE_SEMESTER_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"q=(.+)").expect("invalid regex: semester token"));

/// Extractor output together with the rows that had to be skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extracted<T> {
    pub value: T,
    pub skipped: Vec<SkippedRow>,
}

impl<T> Extracted<T> {
    fn new(value: T) -> Self {
        Self {
            value,
            skipped: Vec::new(),
        }
    }

    fn skip(&mut self, page: &str, detail: impl Into<String>) {
        let detail = detail.into();
        log::warn!("Skipping row on {}: {}", page, detail);
        self.skipped.push(SkippedRow {
            page: page.to_string(),
            detail,
        });
    }
}

fn child_cells(row: ElementRef) -> Vec<ElementRef> {
    row.children()
        .filter_map(ElementRef::wrap)
        .filter(|e| e.value().name() == "td")
        .collect()
}

fn cell_text(cell: &ElementRef) -> String {
    normalize_whitespace(&elem_text(*cell))
}

/// Whether a login response still shows the captcha challenge.
pub fn captcha_visible(html: &str) -> bool {
    let document = Html::parse_document(html);
    let captcha_sel = Selector::parse("#captcha").unwrap();

    document.select(&captcha_sel).next().is_some_and(|captcha| {
        let style = captcha
            .value()
            .attr("style")
            .unwrap_or_default()
            .replace(' ', "")
            .to_lowercase();
        !style.contains("display:none")
    })
}

/// Reads the signed-in user, the selected semester and the semester dropdown
/// from the student home page.
pub fn extract_student_home(html: &str) -> Result<StudentHome, ParseError> {
    let document = Html::parse_document(html);

    let user_sel = Selector::parse(".navbar-link").unwrap();
    let user = document
        .select(&user_sel)
        .next()
        .map(|e| normalize_whitespace(&elem_text(e)))
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ParseError::MissingField("user name (.navbar-link)".to_string()))?;

    let selected_sel = Selector::parse(r#"#SemesterDropDown > option[selected="selected"]"#).unwrap();
    let current_semester = document
        .select(&selected_sel)
        .next()
        .map(|e| normalize_whitespace(&elem_text(e)))
        .ok_or_else(|| ParseError::MissingField("selected semester".to_string()))?;

    let option_sel = Selector::parse("#SemesterDropDown > option").unwrap();
    let semesters = document
        .select(&option_sel)
        .filter_map(|option| {
            let label = normalize_whitespace(&elem_text(option));
            let value = option.value().attr("value").unwrap_or_default();
            match RE_SEMESTER_TOKEN.captures(value) {
                Some(caps) => Some(SemesterOption {
                    label,
                    token: caps[1].to_string(),
                }),
                None => {
                    log::debug!("Semester option '{}' has no registration token", label);
                    None
                }
            }
        })
        .collect();

    Ok(StudentHome {
        user,
        current_semester,
        semesters,
    })
}

/// Identifiers of the curriculum sections linked from the curriculum page.
pub fn extract_curriculum_ids(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let id_sel = Selector::parse("[curriculumid]").unwrap();

    document
        .select(&id_sel)
        .filter_map(|e| e.value().attr("curriculumid"))
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .collect()
}

/// Course table of one curriculum section.
pub fn extract_curriculum_section(html: &str) -> Extracted<CourseMap> {
    const PAGE: &str = "curriculum";

    let document = Html::parse_document(html);
    let row_sel = Selector::parse(".table-bordered tr:not(:first-child)").unwrap();
    let prereq_sel = Selector::parse("li").unwrap();

    let mut out = Extracted::new(CourseMap::new());

    for row in document.select(&row_sel) {
        let cells = child_cells(row);
        if cells.len() < 3 {
            continue;
        }

        let course_code = cell_text(&cells[0]);
        let course_name = cell_text(&cells[1]);
        if is_excluded(&course_code, &course_name) {
            log::debug!("Excluding curriculum entry {} ({})", course_code, course_name);
            continue;
        }

        let credit_text = cell_text(&cells[2]);
        let Some(credit) = max_credit(&credit_text, ' ') else {
            out.skip(
                PAGE,
                format!("{}: unreadable credit '{}'", course_code, credit_text),
            );
            continue;
        };

        let prerequisites = cells
            .get(3)
            .map(|cell| {
                cell.select(&prereq_sel)
                    .map(|li| cell_text(&li))
                    .filter(|code| !code.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        out.value.insert(
            course_code,
            CourseRecord {
                course_name,
                credit,
                prerequisites,
            },
        );
    }

    out
}

/// Builds the full course map: reads the section ids from the curriculum
/// page and asks `fetch_section` for each section's page, in order.
///
/// A course listed by several sections keeps the last section's record.
pub async fn extract_curriculum<F, Fut, E>(
    html: &str,
    mut fetch_section: F,
) -> Result<Extracted<CourseMap>, E>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<String, E>>,
{
    let ids = extract_curriculum_ids(html);
    log::info!("Found {} curriculum section(s)", ids.len());

    let mut out = Extracted::new(CourseMap::new());
    for id in ids {
        let section_html = fetch_section(id).await?;
        let section = extract_curriculum_section(&section_html);
        out.value.extend(section.value);
        out.skipped.extend(section.skipped);
    }
    Ok(out)
}

fn parse_grade(raw: &str) -> Option<Grade> {
    raw.parse::<Grade>().ok()
}

/// Sorts every course of the grade report into completed, current semester
/// and pre-registered buckets.
///
/// The last `(semester)[grade]` pair of a row decides. A pending last attempt
/// in `current_semester` makes the course in progress, and the newest earlier
/// letter grade (if any) still counts as completed. A pending attempt in any
/// other semester is a pre-registration.
pub fn extract_grade_report(html: &str, current_semester: &str) -> Extracted<GradeReport> {
    let document = Html::parse_document(html);
    let row_sel = Selector::parse("table:not(:first-child) tr:not(:first-child)").unwrap();

    let mut out = Extracted::new(GradeReport::default());

    for row in document.select(&row_sel) {
        let cells = child_cells(row);
        if cells.len() < 3 {
            continue;
        }
        let results = cell_text(&cells[2]);
        if results.is_empty() {
            continue;
        }

        let course_code = cell_text(&cells[0]);
        let course_name = cell_text(&cells[1]);
        let attempts = parse_grade_history(&results);
        let Some(latest) = attempts.last() else {
            log::debug!("No graded attempts for {}: '{}'", course_code, results);
            continue;
        };

        match parse_grade(&latest.grade) {
            Some(Grade::Pending) if latest.semester == current_semester => {
                let previous = attempts[..attempts.len() - 1].iter().rev().find_map(|a| {
                    parse_grade(&a.grade)
                        .filter(Grade::is_letter)
                        .map(|grade| (grade, a))
                });
                if let Some((grade, attempt)) = previous {
                    out.value.completed.insert(
                        course_code.clone(),
                        GradeEntry {
                            course_name: course_name.clone(),
                            grade,
                            semester: attempt.semester.clone(),
                            credit: None,
                        },
                    );
                }
                out.value.current_semester.insert(
                    course_code,
                    GradeEntry {
                        course_name,
                        grade: Grade::Pending,
                        semester: latest.semester.clone(),
                        credit: None,
                    },
                );
            }
            Some(Grade::Pending) => {
                out.value.pre_registered.insert(
                    course_code,
                    GradeEntry {
                        course_name,
                        grade: Grade::Pending,
                        semester: latest.semester.clone(),
                        credit: None,
                    },
                );
            }
            Some(grade) if grade.is_letter() => {
                out.value.completed.insert(
                    course_code,
                    GradeEntry {
                        course_name,
                        grade,
                        semester: latest.semester.clone(),
                        credit: None,
                    },
                );
            }
            Some(grade) => {
                log::debug!("Ignoring {} with latest grade {}", course_code, grade);
            }
            None => out.skip(
                "grade report",
                format!("{}: unknown grade '{}'", course_code, latest.grade),
            ),
        }
    }

    out
}

/// Weekly routine of one semester from its registration page.
///
/// Fails only when the page has no course table at all; broken rows and
/// time fragments are skipped and reported.
pub fn extract_semester_routine(
    html: &str,
    semester: &str,
) -> Result<Extracted<SemesterRoutine>, ParseError> {
    let document = Html::parse_document(html);
    let table_sel = Selector::parse("table").unwrap();
    let course_cell_sel = Selector::parse("td:first-child").unwrap();
    let anchor_sel = Selector::parse("a").unwrap();
    let time_sel = Selector::parse("div > span").unwrap();

    let table = document
        .select(&table_sel)
        .nth(1)
        .ok_or_else(|| ParseError::MissingField(format!("course table for {}", semester)))?;

    let page = format!("registration {}", semester);
    let mut out = Extracted::new(SemesterRoutine::new());

    for cell in table.select(&course_cell_sel) {
        if cell_text(&cell).is_empty() {
            continue;
        }

        let Some(anchor) = cell.select(&anchor_sel).next() else {
            out.skip(&page, format!("no course link in '{}'", cell_text(&cell)));
            continue;
        };
        let label_text = cell_text(&anchor);
        let label = parse_course_label(&label_text).unwrap_or_else(|e| {
            log::warn!("Course label not recognized on {}: {}", page, e);
            Default::default()
        });

        let credit = cell
            .next_siblings()
            .filter_map(ElementRef::wrap)
            .find(|e| e.value().name() == "td")
            .and_then(|td| max_credit(&cell_text(&td), '-'));
        let Some(credit) = credit else {
            out.skip(&page, format!("{}: unreadable credit", label_text));
            continue;
        };

        for span in cell.select(&time_sel) {
            let text = normalize_whitespace(&elem_text(span));
            if !text.contains("Time") {
                continue;
            }
            match parse_class_time(&text) {
                Ok(time) => {
                    out.value.entry(time.day).or_default().insert(
                        time.time_range,
                        ClassSlot {
                            course_name: label.course_name.clone(),
                            class_id: label.class_id.clone(),
                            credit,
                            section: label.section.clone(),
                            class_type: time.class_type,
                            room: time.room,
                        },
                    );
                }
                Err(e) => out.skip(&page, format!("{}: {}", label_text, e)),
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Day;
    use std::collections::HashMap;
    use std::fs;

    fn fixture(name: &str) -> String {
        fs::read_to_string(format!("fixtures/{}", name)).expect("Failed to read fixture")
    }

    #[test]
    fn test_captcha_visible() {
        assert!(captcha_visible(&fixture("login_captcha.html")));
        assert!(!captcha_visible(&fixture("login_failed.html")));
        assert!(!captcha_visible("<html><body></body></html>"));
    }

    #[test]
    fn test_extract_student_home() {
        let home = extract_student_home(&fixture("student_home.html")).unwrap();
        assert_eq!(home.user, "DOE, JANE");
        assert_eq!(home.current_semester, "Fall 2024-25");
        assert_eq!(
            home.semesters,
            vec![
                SemesterOption {
                    label: "Spring 2024-25".to_string(),
                    token: "MjAyNDI1LTI=".to_string(),
                },
                SemesterOption {
                    label: "Fall 2024-25".to_string(),
                    token: "MjAyNDI1LTE=".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_extract_student_home_requires_user() {
        let err = extract_student_home("<html><body></body></html>").unwrap_err();
        assert!(matches!(err, ParseError::MissingField(_)));
    }

    #[test]
    fn test_extract_curriculum_ids() {
        let ids = extract_curriculum_ids(&fixture("curriculum_index.html"));
        assert_eq!(ids, vec!["101", "102"]);
    }

    #[test]
    fn test_extract_curriculum_section() {
        let section = extract_curriculum_section(&fixture("curriculum_section.html"));
        let courses = &section.value;

        assert_eq!(
            courses.keys().collect::<Vec<_>>(),
            vec!["CSE101", "CSE110", "CSE220", "PHY101"]
        );
        assert_eq!(courses["CSE101"].credit, 3);
        assert!(courses["CSE101"].prerequisites.is_empty());
        assert_eq!(courses["CSE110"].prerequisites, vec!["CSE101"]);
        assert_eq!(courses["CSE220"].prerequisites, vec!["CSE110", "MAT101"]);
        assert_eq!(courses["PHY101"].credit, 3, "lab+lecture cell takes the max");

        assert!(!courses.contains_key("0"));
        assert!(!courses.contains_key("ELEC#1"));
        assert!(!courses.contains_key("GEN*2"));
        assert!(!courses.contains_key("INT400"));

        assert_eq!(section.skipped.len(), 1);
        assert!(section.skipped[0].detail.contains("MAT999"));
    }

    #[tokio::test]
    async fn test_extract_curriculum_fetches_every_section() {
        let pages: HashMap<&str, String> = HashMap::from([
            ("101", fixture("curriculum_section.html")),
            (
                "102",
                r#"<table class="table-bordered">
                    <tr><td>Code</td><td>Name</td><td>Credit</td><td>Pre</td></tr>
                    <tr><td>MAT101</td><td>CALCULUS I</td><td>3</td><td></td></tr>
                </table>"#
                    .to_string(),
            ),
        ]);

        let mut requested = Vec::new();
        let curriculum = extract_curriculum(&fixture("curriculum_index.html"), |id| {
            requested.push(id.clone());
            let page = pages.get(id.as_str()).cloned();
            async move { page.ok_or("missing page") }
        })
        .await
        .unwrap();

        assert_eq!(requested, vec!["101", "102"]);
        assert_eq!(curriculum.value.len(), 5);
        assert_eq!(curriculum.value["MAT101"].course_name, "CALCULUS I");
        assert_eq!(curriculum.skipped.len(), 1);
    }

    #[tokio::test]
    async fn test_extract_curriculum_propagates_fetch_error() {
        let result = extract_curriculum(&fixture("curriculum_index.html"), |_| async {
            Err::<String, _>("offline")
        })
        .await;
        assert_eq!(result.unwrap_err(), "offline");
    }

    #[test]
    fn test_extract_grade_report_buckets() {
        let report = extract_grade_report(&fixture("grade_report.html"), "Fall 2024-25");
        let grades = &report.value;

        assert_eq!(grades.completed["CSE101"].grade, Grade::D);
        assert_eq!(grades.completed["CSE101"].semester, "Fall 2022-23");
        assert_eq!(grades.completed["ENG101"].grade, Grade::APlus);

        // retaking: previous letter grade stays completed, the course is in progress too
        assert_eq!(grades.completed["CSE110"].grade, Grade::F);
        assert_eq!(grades.completed["CSE110"].semester, "Spring 2023-24");
        assert_eq!(grades.current_semester["CSE110"].grade, Grade::Pending);

        assert_eq!(grades.current_semester["CSE220"].grade, Grade::Pending);
        assert!(!grades.completed.contains_key("CSE220"));

        assert_eq!(grades.pre_registered["PHY101"].semester, "Spring 2024-25");
        assert!(!grades.completed.contains_key("PHY101"));

        assert!(!grades.completed.contains_key("HIS101"), "withdrawn is not completed");
        assert!(!grades.completed.contains_key("ART101"), "no history recorded");

        assert_eq!(report.skipped.len(), 1);
        assert!(report.skipped[0].detail.contains("BAN101"));
    }

    #[test]
    fn test_extract_semester_routine() {
        let routine =
            extract_semester_routine(&fixture("registration.html"), "Fall 2024-25").unwrap();
        let days = &routine.value;

        let sunday = &days[&Day::Sunday];
        let slot = &sunday["08:00 AM - 09:30 AM"];
        assert_eq!(slot.course_name, "Data Structures");
        assert_eq!(slot.class_id, "01234");
        assert_eq!(slot.section, "B");
        assert_eq!(slot.credit, 3);
        assert_eq!(slot.class_type, "Theory");
        assert_eq!(slot.room, "DN0514");

        let lab = &days[&Day::Tuesday]["11:00 AM - 02:00 PM"];
        assert_eq!(lab.class_type, "Lab");
        assert_eq!(lab.room, "1108");

        let physics = &days[&Day::Monday]["02:00 PM - 03:30 PM"];
        assert_eq!(physics.course_name, "Physics I");
        assert_eq!(physics.credit, 4);

        let unknown = &days[&Day::Wednesday]["09:00 AM - 10:30 AM"];
        assert_eq!(unknown.course_name, "", "unrecognized label falls back to empty fields");

        // one time fragment without a room, one row without a link
        assert_eq!(routine.skipped.len(), 2);
    }

    #[test]
    fn test_extract_semester_routine_requires_course_table() {
        let err = extract_semester_routine("<table><tr><td>x</td></tr></table>", "Fall").unwrap_err();
        assert!(matches!(err, ParseError::MissingField(_)));
    }
}

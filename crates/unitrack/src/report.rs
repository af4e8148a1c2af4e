use crate::eligibility::compute_unlocked;
use crate::parser::title_case;
use crate::types::{ClassRoutine, CourseMap, GradeBucket, GradeReport, Report, SkippedRow};

/// Turns the portal's `LAST, FIRST` into `First Last`.
pub fn display_name(raw: &str) -> String {
    let name = match raw.split_once(',') {
        Some((last, first)) => format!("{} {}", first.trim(), last.trim()),
        None => raw.trim().to_string(),
    };
    title_case(&name)
}

fn with_curriculum_credit(completed: GradeBucket, course_map: &CourseMap) -> GradeBucket {
    completed
        .into_iter()
        .map(|(code, mut entry)| {
            if let Some(course) = course_map.get(&code) {
                entry.credit = Some(course.credit);
            }
            (code, entry)
        })
        .collect()
}

/// Everything the scrape gathered, before assembly.
#[derive(Debug, Clone, Default)]
pub struct ReportParts {
    pub grades: GradeReport,
    pub routine: ClassRoutine,
    pub course_map: CourseMap,
    pub user: String,
    pub current_semester: String,
    pub skipped: Vec<SkippedRow>,
}

/// Assembles the final report: computes the unlocked courses and attaches
/// curriculum credits to the completed ones.
pub fn pack(parts: ReportParts) -> Report {
    let ReportParts {
        grades,
        routine,
        course_map,
        user,
        current_semester,
        skipped,
    } = parts;

    let unlocked_courses = compute_unlocked(
        &course_map,
        &grades.completed,
        &grades.current_semester,
        &grades.pre_registered,
    );
    log::info!(
        "Packed report: {} unlocked, {} completed",
        unlocked_courses.len(),
        grades.completed.len()
    );

    Report {
        semester_class_routine: routine,
        unlocked_courses,
        completed_courses: with_curriculum_credit(grades.completed, &course_map),
        preregistered_courses: grades.pre_registered,
        current_semester_courses: grades.current_semester,
        current_semester,
        user: display_name(&user),
        curriculum_courses: course_map,
        skipped_rows: skipped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CourseRecord, Grade, GradeEntry};

    #[test]
    fn test_display_name() {
        assert_eq!(display_name("DOE, JANE MARIE"), "Jane Marie Doe");
        assert_eq!(display_name("  jane doe "), "Jane Doe");
    }

    #[test]
    fn test_pack_marks_d_grade_for_retake() {
        let course_map = CourseMap::from([(
            "CSE101".to_string(),
            CourseRecord {
                course_name: "PROGRAMMING".to_string(),
                credit: 3,
                prerequisites: Vec::new(),
            },
        )]);
        let grades = GradeReport {
            completed: GradeBucket::from([(
                "CSE101".to_string(),
                GradeEntry {
                    course_name: "PROGRAMMING".to_string(),
                    grade: Grade::D,
                    semester: "Fall22".to_string(),
                    credit: None,
                },
            )]),
            ..Default::default()
        };

        let report = pack(ReportParts {
            grades,
            course_map,
            user: "DOE, JANE".to_string(),
            current_semester: "Fall 2024-25".to_string(),
            ..Default::default()
        });

        assert_eq!(report.user, "Jane Doe");
        assert_eq!(report.completed_courses["CSE101"].grade, Grade::D);
        assert_eq!(report.completed_courses["CSE101"].credit, Some(3));
        assert!(report.unlocked_courses["CSE101"].retake);
        assert_eq!(report.current_semester, "Fall 2024-25");
    }
}

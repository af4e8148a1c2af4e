//! Unlocked-course inference over the curriculum prerequisite graph.

use crate::types::{CourseMap, CourseRecord, Grade, GradeBucket, UnlockedCourse, UnlockedCourses};

/// Curriculum entries that never take part in eligibility: placeholder codes,
/// elective pools (`#`, `*`) and the internship.
pub fn is_excluded(course_code: &str, course_name: &str) -> bool {
    course_code == "0"
        || course_code.contains('#')
        || course_code.contains('*')
        || course_name == "INTERNSHIP"
}

/// Every prerequisite is completed or being taken this semester.
pub fn prerequisites_met(
    prerequisites: &[String],
    completed: &GradeBucket,
    current_semester: &GradeBucket,
) -> bool {
    prerequisites
        .iter()
        .all(|code| completed.contains_key(code) || current_semester.contains_key(code))
}

fn unlock(course: &CourseRecord, retake: bool) -> UnlockedCourse {
    UnlockedCourse {
        course_name: course.course_name.clone(),
        credit: course.credit,
        prerequisites: course.prerequisites.clone(),
        retake,
    }
}

/// Courses the student may register for next.
///
/// Completed `D` courses come first as retakes. Then, in curriculum order,
/// every course that is not excluded or completed is unlocked when it is
/// pre-registered, or when it is not already being taken and all its
/// prerequisites are met.
pub fn compute_unlocked(
    course_map: &CourseMap,
    completed: &GradeBucket,
    current_semester: &GradeBucket,
    pre_registered: &GradeBucket,
) -> UnlockedCourses {
    let mut unlocked = UnlockedCourses::new();

    for (code, entry) in completed {
        if entry.grade != Grade::D {
            continue;
        }
        match course_map.get(code) {
            Some(course) => {
                unlocked.insert(
                    code.clone(),
                    UnlockedCourse {
                        course_name: entry.course_name.clone(),
                        ..unlock(course, true)
                    },
                );
            }
            None => log::warn!("Cannot offer retake of {}: not in curriculum", code),
        }
    }

    for (code, course) in course_map {
        if is_excluded(code, &course.course_name)
            || completed.contains_key(code)
            || unlocked.contains_key(code)
        {
            continue;
        }

        if pre_registered.contains_key(code) {
            unlocked.insert(code.clone(), unlock(course, false));
            continue;
        }

        let in_progress = current_semester.get(code).is_some_and(|entry| {
            entry.course_name == course.course_name
                && !matches!(entry.grade, Grade::Withdrawn | Grade::Incomplete)
        });
        if in_progress {
            continue;
        }

        if prerequisites_met(&course.prerequisites, completed, current_semester) {
            unlocked.insert(code.clone(), unlock(course, false));
        }
    }

    unlocked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GradeEntry;

    fn course(name: &str, credit: u32, prerequisites: &[&str]) -> CourseRecord {
        CourseRecord {
            course_name: name.to_string(),
            credit,
            prerequisites: prerequisites.iter().map(|p| p.to_string()).collect(),
        }
    }

    fn graded(name: &str, grade: Grade) -> GradeEntry {
        GradeEntry {
            course_name: name.to_string(),
            grade,
            semester: "Fall 2022-23".to_string(),
            credit: None,
        }
    }

    fn curriculum() -> CourseMap {
        CourseMap::from([
            ("CSE101".to_string(), course("PROGRAMMING", 3, &[])),
            ("CSE110".to_string(), course("DATA STRUCTURES", 3, &["CSE101"])),
            ("CSE220".to_string(), course("ALGORITHMS", 3, &["CSE110"])),
            ("CSE330".to_string(), course("COMPILERS", 3, &["CSE220", "MAT101"])),
            ("MAT101".to_string(), course("CALCULUS I", 3, &[])),
            ("PHY101".to_string(), course("PHYSICS I", 4, &["MAT101"])),
            ("0".to_string(), course("PLACEHOLDER", 0, &[])),
            ("INT400".to_string(), course("INTERNSHIP", 3, &[])),
            ("ELEC#1".to_string(), course("ELECTIVE", 3, &[])),
        ])
    }

    #[test]
    fn test_is_excluded() {
        assert!(is_excluded("0", "ANYTHING"));
        assert!(is_excluded("GEN#2", "ELECTIVE"));
        assert!(is_excluded("GEN*2", "ELECTIVE"));
        assert!(is_excluded("INT400", "INTERNSHIP"));
        assert!(!is_excluded("CSE101", "PROGRAMMING"));
    }

    #[test]
    fn test_completed_prerequisite_unlocks_next_course() {
        let completed = GradeBucket::from([("CSE101".to_string(), graded("PROGRAMMING", Grade::B))]);
        let unlocked =
            compute_unlocked(&curriculum(), &completed, &GradeBucket::new(), &GradeBucket::new());

        let next = &unlocked["CSE110"];
        assert!(!next.retake);
        assert_eq!(next.prerequisites, vec!["CSE101"]);
        assert!(!unlocked.contains_key("CSE101"), "completed course is not offered again");
        assert!(!unlocked.contains_key("CSE220"));
        assert!(unlocked.contains_key("MAT101"), "no prerequisites");
    }

    #[test]
    fn test_d_grade_becomes_retake_only() {
        let completed = GradeBucket::from([("CSE101".to_string(), graded("Programming", Grade::D))]);
        let unlocked =
            compute_unlocked(&curriculum(), &completed, &GradeBucket::new(), &GradeBucket::new());

        let retake = &unlocked["CSE101"];
        assert!(retake.retake);
        assert_eq!(retake.credit, 3);
        assert_eq!(retake.course_name, "Programming");
        assert_eq!(
            unlocked.keys().filter(|code| *code == "CSE101").count(),
            1,
            "never also a fresh unlock"
        );
        assert_eq!(unlocked.get_index_of("CSE101"), Some(0), "retakes come first");
    }

    #[test]
    fn test_d_grade_outside_curriculum_is_skipped() {
        let completed = GradeBucket::from([("OLD100".to_string(), graded("Legacy", Grade::D))]);
        let unlocked =
            compute_unlocked(&curriculum(), &completed, &GradeBucket::new(), &GradeBucket::new());
        assert!(!unlocked.contains_key("OLD100"));
    }

    #[test]
    fn test_current_semester_counts_as_prerequisite_but_is_not_unlocked() {
        let completed = GradeBucket::from([("CSE101".to_string(), graded("PROGRAMMING", Grade::A))]);
        let current = GradeBucket::from([(
            "CSE110".to_string(),
            graded("DATA STRUCTURES", Grade::Pending),
        )]);
        let unlocked = compute_unlocked(&curriculum(), &completed, &current, &GradeBucket::new());

        assert!(!unlocked.contains_key("CSE110"));
        assert!(unlocked.contains_key("CSE220"));
    }

    #[test]
    fn test_withdrawn_current_course_stays_available() {
        let completed = GradeBucket::from([("CSE101".to_string(), graded("PROGRAMMING", Grade::A))]);
        let current = GradeBucket::from([(
            "CSE110".to_string(),
            graded("DATA STRUCTURES", Grade::Withdrawn),
        )]);
        let unlocked = compute_unlocked(&curriculum(), &completed, &current, &GradeBucket::new());
        assert!(unlocked.contains_key("CSE110"));
    }

    #[test]
    fn test_pre_registered_is_unlocked_without_prerequisites() {
        let pre = GradeBucket::from([("PHY101".to_string(), graded("PHYSICS I", Grade::Pending))]);
        let unlocked = compute_unlocked(&curriculum(), &GradeBucket::new(), &GradeBucket::new(), &pre);

        let physics = &unlocked["PHY101"];
        assert!(!physics.retake);
        assert_eq!(physics.credit, 4);
    }

    #[test]
    fn test_excluded_codes_never_unlock() {
        let unlocked = compute_unlocked(
            &curriculum(),
            &GradeBucket::new(),
            &GradeBucket::new(),
            &GradeBucket::new(),
        );
        for code in ["0", "INT400", "ELEC#1"] {
            assert!(!unlocked.contains_key(code), "{code} must stay excluded");
        }
    }

    #[test]
    fn test_compute_unlocked_is_idempotent() {
        let completed = GradeBucket::from([
            ("CSE101".to_string(), graded("PROGRAMMING", Grade::D)),
            ("MAT101".to_string(), graded("CALCULUS I", Grade::B)),
        ]);
        let current = GradeBucket::from([(
            "CSE110".to_string(),
            graded("DATA STRUCTURES", Grade::Pending),
        )]);
        let map = curriculum();

        let first = compute_unlocked(&map, &completed, &current, &GradeBucket::new());
        let second = compute_unlocked(&map, &completed, &current, &GradeBucket::new());
        assert_eq!(first, second);

        let mut reversed = map.clone();
        reversed.reverse();
        let third = compute_unlocked(&reversed, &completed, &current, &GradeBucket::new());
        let mut a: Vec<_> = first.keys().collect();
        let mut b: Vec<_> = third.keys().collect();
        a.sort();
        b.sort();
        assert_eq!(a, b, "membership does not depend on curriculum order");
    }
}

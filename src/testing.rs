//! Shared fixtures for unit tests.

use crate::data::{CourseCategory, CourseSpec, Day, FixedSlot, Teacher, TimetableInput};

/// Two sections whose quotas fill all 42 weekly slots exactly, so it is
/// solvable without free periods.
pub fn full_week_input() -> TimetableInput {
    use CourseCategory::{Administrative, Lab, Theory};

    TimetableInput {
        sections: vec!["A".into(), "B".into()],
        courses: vec![
            CourseSpec::new("MATH", 6, Theory, Teacher::named("Mr. Rao")),
            CourseSpec::new("PHY", 6, Theory, Teacher::named("Ms. Iyer")),
            CourseSpec::new("CHEM", 6, Theory, Teacher::named("Ms. Menon")),
            CourseSpec::new("BIO", 6, Theory, Teacher::named("Mr. Das")),
            CourseSpec::new("ENG", 6, Theory, Teacher::named("Ms. Paul")),
            CourseSpec::new("HIST", 4, Theory, Teacher::named("Mr. Roy")),
            CourseSpec::new("CHEM_LAB", 2, Lab, Teacher::named("Ms. Menon")),
            CourseSpec::new("SPORT", 4, Administrative, Teacher::AllStaff),
        ],
        fixed_slots: vec![
            FixedSlot::new("A", Day::Mon, 1, "MATH"),
            FixedSlot::new("A", Day::Wed, 6, "CHEM_LAB"),
            FixedSlot::new("B", Day::Tue, 2, "HIST"),
            FixedSlot::new("B", Day::Sat, 7, "SPORT"),
        ],
        include_free_periods: false,
        free_period_quota: 2,
    }
}

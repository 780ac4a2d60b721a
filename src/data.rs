use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::extract::Solution;
use crate::solver::{NoSolutionReason, SolveStats};

// Type aliases for clarity
pub type SectionId = String;
pub type CourseId = String;
pub type Period = u8;

/// Number of teaching periods in a day. Periods are numbered `1..=PERIOD_COUNT`.
pub const PERIOD_COUNT: usize = 7;

/// Wall-clock range of each period, indexed by `period - 1`. Display only.
pub const PERIOD_TIMES: [&str; PERIOD_COUNT] = [
    "08:30-09:20",
    "09:20-10:10",
    "10:10-11:00",
    "11:15-12:00",
    "12:00-12:45",
    "13:35-14:25",
    "14:25-15:15",
];

/// The only period pairs a lab session may occupy.
pub const LAB_PAIRS: [(Period, Period); 2] = [(4, 5), (6, 7)];

/// Identifier of the pseudo-course added when free periods are enabled.
pub const FREE_COURSE: &str = "FREE";

/// A teaching day, in week order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
pub enum Day {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
}

impl Day {
    pub const ALL: [Day; 6] = [Day::Mon, Day::Tue, Day::Wed, Day::Thu, Day::Fri, Day::Sat];

    /// Position of the day within the week, starting at 0 for Monday.
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Day {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Day::Mon => "Mon",
            Day::Tue => "Tue",
            Day::Wed => "Wed",
            Day::Thu => "Thu",
            Day::Fri => "Fri",
            Day::Sat => "Sat",
        };
        f.write_str(name)
    }
}

/// What kind of course this is. Drives which scheduling rules apply to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CourseCategory {
    Theory,
    /// Each session spans two consecutive periods.
    Lab,
    /// Library, activities, personality development and the like.
    Administrative,
    Free,
}

/// Who teaches a course.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Teacher {
    Named(String),
    /// Shared by every teacher; never conflicts.
    AllStaff,
    /// No specific teacher; never conflicts.
    Unassigned,
}

impl Teacher {
    pub fn named(name: &str) -> Self {
        Teacher::Named(name.to_string())
    }

    /// Name of a real teacher, `None` for the sentinels.
    pub fn name(&self) -> Option<&str> {
        match self {
            Teacher::Named(name) => Some(name),
            Teacher::AllStaff | Teacher::Unassigned => None,
        }
    }
}

impl fmt::Display for Teacher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Teacher::Named(name) => f.write_str(name),
            Teacher::AllStaff => f.write_str("All Staff"),
            Teacher::Unassigned => f.write_str("None"),
        }
    }
}

/// A course in the input catalog.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseSpec {
    pub id: CourseId,
    /// Periods per section per week, or sessions for labs.
    pub weekly_count: u32,
    pub category: CourseCategory,
    pub teacher: Teacher,
}

impl CourseSpec {
    pub fn new(id: &str, weekly_count: u32, category: CourseCategory, teacher: Teacher) -> Self {
        Self {
            id: id.to_string(),
            weekly_count,
            category,
            teacher,
        }
    }
}

/// A slot whose course is pinned by configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FixedSlot {
    pub section: SectionId,
    pub day: Day,
    pub period: Period,
    pub course: CourseId,
}

impl FixedSlot {
    pub fn new(section: &str, day: Day, period: Period, course: &str) -> Self {
        Self {
            section: section.to_string(),
            day,
            period,
            course: course.to_string(),
        }
    }
}

impl fmt::Display for FixedSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}, {})",
            self.section, self.day, self.period, self.course
        )
    }
}

fn default_free_period_quota() -> u32 {
    2
}

/// The complete input for the timetabling problem.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimetableInput {
    pub sections: Vec<SectionId>,
    pub courses: Vec<CourseSpec>,
    #[serde(default)]
    pub fixed_slots: Vec<FixedSlot>,
    /// Adds the `FREE` pseudo-course and lets a slot stay empty.
    #[serde(default)]
    pub include_free_periods: bool,
    #[serde(default = "default_free_period_quota")]
    pub free_period_quota: u32,
}

impl TimetableInput {
    /// The two-section departmental catalog the solver ships with.
    pub fn default_catalog(include_free_periods: bool) -> Self {
        use CourseCategory::{Administrative, Lab, Theory};

        let courses = vec![
            CourseSpec::new("PAS", 5, Theory, Teacher::named("Ms. Sowmiya")),
            CourseSpec::new("OS", 6, Theory, Teacher::named("Ms. K.Sudha")),
            CourseSpec::new("ML", 5, Theory, Teacher::named("Mr. Dinesh Kumar")),
            CourseSpec::new("FDSA", 5, Theory, Teacher::named("Ms. Deepika")),
            CourseSpec::new("CN", 6, Theory, Teacher::named("Ms. Kirupavathy")),
            CourseSpec::new("EVS", 4, Theory, Teacher::named("Ms. Sophia")),
            CourseSpec::new("FDSA_LAB", 1, Lab, Teacher::named("Ms. Deepika")),
            CourseSpec::new("ML_LAB", 1, Lab, Teacher::named("Mr. Dinesh Kumar")),
            CourseSpec::new("PD", 2, Administrative, Teacher::named("Ms. Kirupavathy")),
            CourseSpec::new("LIB", 1, Administrative, Teacher::named("Ms. Kirupavathy")),
            CourseSpec::new("ACT", 2, Administrative, Teacher::AllStaff),
        ];

        let fixed_slots = vec![
            FixedSlot::new("A", Day::Tue, 2, "PD"),
            FixedSlot::new("A", Day::Fri, 4, "PD"),
            FixedSlot::new("B", Day::Tue, 3, "PD"),
            FixedSlot::new("B", Day::Fri, 5, "PD"),
            FixedSlot::new("A", Day::Thu, 6, "LIB"),
            FixedSlot::new("B", Day::Thu, 7, "LIB"),
            FixedSlot::new("A", Day::Fri, 7, "ACT"),
            FixedSlot::new("B", Day::Sat, 7, "ACT"),
        ];

        Self {
            sections: vec!["A".to_string(), "B".to_string()],
            courses,
            fixed_slots,
            include_free_periods,
            free_period_quota: default_free_period_quota(),
        }
    }
}

fn default_time_limit_ms() -> Option<u64> {
    Some(120_000)
}

fn default_workers() -> usize {
    8
}

/// Search budget as it arrives over the wire. An explicit `null` time limit
/// disables the budget.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SolverOptions {
    #[serde(default = "default_time_limit_ms")]
    pub time_limit_ms: Option<u64>,
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            time_limit_ms: default_time_limit_ms(),
            workers: default_workers(),
        }
    }
}

/// Body of a solve request. A missing input means the default catalog.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SolveRequest {
    #[serde(default)]
    pub input: Option<TimetableInput>,
    #[serde(default)]
    pub solver: SolverOptions,
}

/// How a solve ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum OutputStatus {
    Solved,
    /// The search space was exhausted: no timetable exists.
    Infeasible,
    /// The budget ran out first: a timetable may still exist.
    TimeLimit,
}

impl From<NoSolutionReason> for OutputStatus {
    fn from(reason: NoSolutionReason) -> Self {
        match reason {
            NoSolutionReason::Infeasible => OutputStatus::Infeasible,
            NoSolutionReason::TimeLimit => OutputStatus::TimeLimit,
        }
    }
}

fn period_times() -> BTreeMap<Period, String> {
    PERIOD_TIMES
        .iter()
        .enumerate()
        .map(|(i, time)| (i as Period + 1, time.to_string()))
        .collect()
}

/// The final output of the solver.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimetableOutput {
    pub status: OutputStatus,
    pub timetable: Option<Solution>,
    /// Section -> course -> periods allocated.
    pub course_totals: BTreeMap<SectionId, BTreeMap<CourseId, usize>>,
    /// Teacher -> periods taught across all sections.
    pub teacher_workload: BTreeMap<String, usize>,
    /// Period -> wall-clock range, for whoever renders the timetable.
    pub period_times: BTreeMap<Period, String>,
    pub stats: SolveStats,
}

impl TimetableOutput {
    pub fn solved(solution: Solution, stats: SolveStats) -> Self {
        Self {
            status: OutputStatus::Solved,
            course_totals: solution.course_totals(),
            teacher_workload: solution.teacher_workload(),
            timetable: Some(solution),
            period_times: period_times(),
            stats,
        }
    }

    pub fn unsolved(reason: NoSolutionReason, stats: SolveStats) -> Self {
        Self {
            status: reason.into(),
            timetable: None,
            course_totals: BTreeMap::new(),
            teacher_workload: BTreeMap::new(),
            period_times: period_times(),
            stats,
        }
    }

    pub fn is_solved(&self) -> bool {
        self.status == OutputStatus::Solved
    }
}

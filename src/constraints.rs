//! Scheduling rules compiled to cardinality constraints.
//!
//! Every rule becomes one or more constraints of the form
//! `min <= (number of true literals) <= max`, where a literal is a decision
//! variable or its negation. The solver only ever sees this one shape.

use itertools::{Itertools, iproduct};
use log::{info, trace};

use crate::catalog::Catalog;
use crate::data::{Day, LAB_PAIRS, PERIOD_COUNT, Period};
use crate::variables::{Assignment, VarId, VarKey, VarSpace};

/// The scheduling rule a constraint was generated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rule {
    /// One course per slot, or at most one with free periods.
    SlotCoverage,
    /// Exact weekly periods per (section, course).
    CourseQuota,
    /// A real teacher is in at most one room per (day, period).
    TeacherOverlap,
    /// A theory course at most once per (section, day).
    SameDayRepeat,
    /// Both periods of a lab pair agree.
    LabPairing,
    /// Labs stay out of periods that belong to no lab pair.
    LabWindow,
    /// At most one lab session per (section, day).
    LabDailyLimit,
    /// No theory course in two consecutive periods.
    ImmediateRepeat,
    FixedSlot,
}

/// A variable or its negation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lit {
    pub var: VarId,
    pub positive: bool,
}

impl Lit {
    pub fn pos(var: VarId) -> Self {
        Self { var, positive: true }
    }

    pub fn neg(var: VarId) -> Self {
        Self {
            var,
            positive: false,
        }
    }

    /// Whether the literal holds when its variable takes `value`.
    pub fn holds(self, value: bool) -> bool {
        self.positive == value
    }
}

#[derive(Debug, Clone)]
pub struct Constraint {
    pub rule: Rule,
    pub lits: Vec<Lit>,
    pub min: u32,
    pub max: u32,
}

impl Constraint {
    fn at_most(rule: Rule, vars: impl IntoIterator<Item = VarId>, max: u32) -> Self {
        Self {
            rule,
            lits: vars.into_iter().map(Lit::pos).collect(),
            min: 0,
            max,
        }
    }

    fn exactly(rule: Rule, vars: impl IntoIterator<Item = VarId>, count: u32) -> Self {
        Self {
            rule,
            lits: vars.into_iter().map(Lit::pos).collect(),
            min: count,
            max: count,
        }
    }

    /// At least one of the literals holds.
    fn clause(rule: Rule, lits: Vec<Lit>) -> Self {
        let max = lits.len() as u32;
        Self {
            rule,
            lits,
            min: 1,
            max,
        }
    }

    pub fn is_satisfied(&self, assignment: &Assignment) -> bool {
        let holding = self
            .lits
            .iter()
            .filter(|lit| lit.holds(assignment.value(lit.var)))
            .count() as u32;
        (self.min..=self.max).contains(&holding)
    }
}

/// Where the variables of one (section, course) quota can go, bucketed by day.
///
/// Implied by the quota and the per-day rules; the solver uses it to see a
/// quota become unreachable well before the last slot is decided.
#[derive(Debug, Clone)]
pub struct QuotaProfile {
    pub section: usize,
    pub course: usize,
    pub quota: u32,
    pub day_cap: u32,
    /// One bucket of variables per day, in week order.
    pub days: Vec<Vec<VarId>>,
}

/// Every constraint for one catalog, built against its variable space.
#[derive(Debug, Clone)]
pub struct ConstraintSet {
    constraints: Vec<Constraint>,
    profiles: Vec<QuotaProfile>,
    free_periods: bool,
}

impl ConstraintSet {
    pub fn build(catalog: &Catalog, vars: &VarSpace) -> Self {
        let mut set = Self {
            constraints: Vec::new(),
            profiles: Vec::new(),
            free_periods: catalog.include_free_periods(),
        };

        set.add_slot_coverage(catalog, vars);
        set.add_course_quota(catalog, vars);
        set.add_teacher_overlap(catalog, vars);
        set.add_same_day_repeat(catalog, vars);
        set.add_lab_contiguity(catalog, vars);
        set.add_immediate_repeat(catalog, vars);
        set.add_fixed_slots(catalog, vars);

        info!(
            "Built {} constraints over {} variables",
            set.constraints.len(),
            vars.len()
        );
        set
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn profiles(&self) -> &[QuotaProfile] {
        &self.profiles
    }

    pub fn free_periods(&self) -> bool {
        self.free_periods
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn by_rule(&self, rule: Rule) -> impl Iterator<Item = &Constraint> {
        self.constraints.iter().filter(move |c| c.rule == rule)
    }

    /// Every constraint a complete assignment breaks.
    pub fn violations(&self, assignment: &Assignment) -> Vec<&Constraint> {
        self.constraints
            .iter()
            .filter(|c| !c.is_satisfied(assignment))
            .collect()
    }

    fn push(&mut self, constraint: Constraint) {
        self.constraints.push(constraint);
    }

    fn sections_and_days(catalog: &Catalog) -> impl Iterator<Item = (usize, Day)> {
        iproduct!(0..catalog.sections().len(), Day::ALL)
    }

    fn periods() -> impl Iterator<Item = Period> + Clone {
        1..=PERIOD_COUNT as Period
    }

    fn add_slot_coverage(&mut self, catalog: &Catalog, vars: &VarSpace) {
        info!("Adding 'slot coverage' constraints...");
        let min = if self.free_periods { 0 } else { 1 };
        for ((section, day), period) in
            Self::sections_and_days(catalog).cartesian_product(Self::periods())
        {
            self.push(Constraint {
                rule: Rule::SlotCoverage,
                lits: vars.slot(section, day, period).map(Lit::pos).collect(),
                min,
                max: 1,
            });
        }
    }

    fn add_course_quota(&mut self, catalog: &Catalog, vars: &VarSpace) {
        info!("Adding 'course quota' constraints...");
        for (section, (index, course)) in
            iproduct!(0..catalog.sections().len(), catalog.courses().iter().enumerate())
        {
            let days: Vec<Vec<VarId>> = Day::ALL
                .iter()
                .map(|&day| {
                    Self::periods()
                        .map(|period| {
                            vars.var(VarKey {
                                section,
                                day,
                                period,
                                course: index,
                            })
                        })
                        .collect()
                })
                .collect();
            let quota = course.period_quota();
            self.push(Constraint::exactly(
                Rule::CourseQuota,
                days.iter().flatten().copied(),
                quota,
            ));
            self.profiles.push(QuotaProfile {
                section,
                course: index,
                quota,
                day_cap: course.day_cap(),
                days,
            });
        }
    }

    fn add_teacher_overlap(&mut self, catalog: &Catalog, vars: &VarSpace) {
        info!("Adding 'no teacher overlap' constraints...");
        let sections = catalog.sections().len();
        for (teacher, courses) in catalog.courses_by_teacher() {
            if sections * courses.len() < 2 {
                trace!("teacher {} can never overlap, skipping", teacher);
                continue;
            }
            for (day, period) in iproduct!(Day::ALL, Self::periods()) {
                let busy = iproduct!(0..sections, courses.iter()).map(|(section, &course)| {
                    vars.var(VarKey {
                        section,
                        day,
                        period,
                        course,
                    })
                });
                self.push(Constraint::at_most(Rule::TeacherOverlap, busy, 1));
            }
        }
    }

    fn add_same_day_repeat(&mut self, catalog: &Catalog, vars: &VarSpace) {
        info!("Adding 'no same-day repeat' constraints...");
        let theory: Vec<usize> = (0..catalog.courses().len())
            .filter(|&c| catalog.course(c).is_theory())
            .collect();
        for ((section, day), &course) in
            Self::sections_and_days(catalog).cartesian_product(theory.iter())
        {
            let day_vars = Self::periods().map(|period| {
                vars.var(VarKey {
                    section,
                    day,
                    period,
                    course,
                })
            });
            self.push(Constraint::at_most(Rule::SameDayRepeat, day_vars, 1));
        }
    }

    fn add_lab_contiguity(&mut self, catalog: &Catalog, vars: &VarSpace) {
        info!("Adding 'lab contiguity' constraints...");
        let labs: Vec<usize> = (0..catalog.courses().len())
            .filter(|&c| catalog.course(c).is_lab())
            .collect();
        if labs.is_empty() {
            return;
        }
        let in_pair = |period: Period| LAB_PAIRS.iter().any(|&(a, b)| period == a || period == b);

        for (section, day) in Self::sections_and_days(catalog) {
            let at = |period: Period, course: usize| {
                vars.var(VarKey {
                    section,
                    day,
                    period,
                    course,
                })
            };

            let lab_periods = iproduct!(labs.iter(), Self::periods()).map(|(&c, p)| at(p, c));
            self.push(Constraint::at_most(Rule::LabDailyLimit, lab_periods, 2));

            for &course in &labs {
                for &(first, second) in &LAB_PAIRS {
                    let (x, y) = (at(first, course), at(second, course));
                    // first implies second, and back
                    self.push(Constraint::clause(
                        Rule::LabPairing,
                        vec![Lit::neg(x), Lit::pos(y)],
                    ));
                    self.push(Constraint::clause(
                        Rule::LabPairing,
                        vec![Lit::pos(x), Lit::neg(y)],
                    ));
                }
                for period in Self::periods().filter(|&p| !in_pair(p)) {
                    self.push(Constraint::at_most(Rule::LabWindow, [at(period, course)], 0));
                }
            }
        }
    }

    fn add_immediate_repeat(&mut self, catalog: &Catalog, vars: &VarSpace) {
        info!("Adding 'no immediate repetition' constraints...");
        let theory: Vec<usize> = (0..catalog.courses().len())
            .filter(|&c| catalog.course(c).is_theory())
            .collect();
        for ((section, day), &course) in
            Self::sections_and_days(catalog).cartesian_product(theory.iter())
        {
            for period in 1..PERIOD_COUNT as Period {
                let pair = [period, period + 1].map(|p| {
                    vars.var(VarKey {
                        section,
                        day,
                        period: p,
                        course,
                    })
                });
                self.push(Constraint::at_most(Rule::ImmediateRepeat, pair, 1));
            }
        }
    }

    fn add_fixed_slots(&mut self, catalog: &Catalog, vars: &VarSpace) {
        info!("Adding 'fixed slot' constraints...");
        for pin in catalog.pins() {
            let var = vars.var(VarKey {
                section: pin.section,
                day: pin.day,
                period: pin.period,
                course: pin.course,
            });
            trace!("pinning {}", vars.name(var, catalog));
            self.push(Constraint::exactly(Rule::FixedSlot, [var], 1));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{CourseCategory, CourseSpec, FixedSlot, Teacher, TimetableInput};

    fn build(input: &TimetableInput) -> (Catalog, VarSpace, ConstraintSet) {
        let catalog = Catalog::from_input(input).unwrap();
        let vars = VarSpace::new(&catalog);
        let set = ConstraintSet::build(&catalog, &vars);
        (catalog, vars, set)
    }

    fn key(catalog: &Catalog, section: &str, day: Day, period: Period, course: &str) -> VarKey {
        VarKey {
            section: catalog.section_index(section).unwrap(),
            day,
            period,
            course: catalog.course_index(course).unwrap(),
        }
    }

    #[test]
    fn test_rule_counts_for_default_catalog() {
        let (_, _, set) = build(&TimetableInput::default_catalog(false));
        // 2 sections x 6 days x 7 periods
        assert_eq!(set.by_rule(Rule::SlotCoverage).count(), 84);
        assert_eq!(set.by_rule(Rule::CourseQuota).count(), 2 * 11);
        // 6 named teachers, each across 42 day-periods
        assert_eq!(set.by_rule(Rule::TeacherOverlap).count(), 6 * 42);
        // 6 theory courses per (section, day)
        assert_eq!(set.by_rule(Rule::SameDayRepeat).count(), 12 * 6);
        assert_eq!(set.by_rule(Rule::ImmediateRepeat).count(), 12 * 6 * 6);
        assert_eq!(set.by_rule(Rule::LabDailyLimit).count(), 12);
        assert_eq!(set.by_rule(Rule::LabPairing).count(), 12 * 2 * 4);
        assert_eq!(set.by_rule(Rule::LabWindow).count(), 12 * 2 * 3);
        assert_eq!(set.by_rule(Rule::FixedSlot).count(), 8);
        assert_eq!(set.profiles().len(), 22);
    }

    #[test]
    fn test_coverage_relaxes_with_free_periods() {
        let (_, _, strict) = build(&TimetableInput::default_catalog(false));
        assert!(strict.by_rule(Rule::SlotCoverage).all(|c| c.min == 1 && c.max == 1));

        let (_, _, relaxed) = build(&TimetableInput::default_catalog(true));
        assert!(relaxed.by_rule(Rule::SlotCoverage).all(|c| c.min == 0 && c.max == 1));
        assert!(relaxed.free_periods());
    }

    #[test]
    fn test_lab_quota_is_two_periods_per_session() {
        let (catalog, vars, set) = build(&TimetableInput::default_catalog(false));
        let lab = catalog.course_index("ML_LAB").unwrap();
        let quota = set
            .by_rule(Rule::CourseQuota)
            .find(|c| vars.key(c.lits[0].var).course == lab)
            .unwrap();
        assert_eq!((quota.min, quota.max), (2, 2));
        assert_eq!(quota.lits.len(), 42);
    }

    #[test]
    fn test_shared_teachers_are_exempt_from_overlap() {
        let (catalog, vars, set) = build(&TimetableInput::default_catalog(true));
        let act = catalog.course_index("ACT").unwrap();
        let free = catalog.course_index("FREE").unwrap();
        for constraint in set.by_rule(Rule::TeacherOverlap) {
            for lit in &constraint.lits {
                let course = vars.key(lit.var).course;
                assert_ne!(course, act);
                assert_ne!(course, free);
            }
        }
    }

    #[test]
    fn test_teacher_overlap_links_sections_and_courses() {
        let (catalog, vars, set) = build(&TimetableInput::default_catalog(false));
        let cn_a = vars.var(key(&catalog, "A", Day::Mon, 1, "CN"));
        let pd_b = vars.var(key(&catalog, "B", Day::Mon, 1, "PD"));
        let shared = set
            .by_rule(Rule::TeacherOverlap)
            .find(|c| c.lits.contains(&Lit::pos(cn_a)))
            .unwrap();
        assert!(shared.lits.contains(&Lit::pos(pd_b)));
        assert_eq!(shared.max, 1);
        // CN, PD and LIB in both sections
        assert_eq!(shared.lits.len(), 6);
    }

    #[test]
    fn test_repeat_rules_only_cover_theory() {
        let (catalog, vars, set) = build(&TimetableInput::default_catalog(true));
        for constraint in set
            .by_rule(Rule::SameDayRepeat)
            .chain(set.by_rule(Rule::ImmediateRepeat))
        {
            for lit in &constraint.lits {
                assert!(catalog.course(vars.key(lit.var).course).is_theory());
            }
        }
    }

    #[test]
    fn test_lab_window_forbids_morning_periods() {
        let (catalog, vars, set) = build(&TimetableInput::default_catalog(false));
        let forbidden: Vec<Period> = set
            .by_rule(Rule::LabWindow)
            .map(|c| vars.key(c.lits[0].var).period)
            .collect();
        assert!(forbidden.iter().all(|p| (1..=3).contains(p)));

        let x4 = vars.var(key(&catalog, "A", Day::Mon, 4, "FDSA_LAB"));
        let x5 = vars.var(key(&catalog, "A", Day::Mon, 5, "FDSA_LAB"));
        let pairing: Vec<&Constraint> = set
            .by_rule(Rule::LabPairing)
            .filter(|c| c.lits.iter().any(|l| l.var == x4))
            .collect();
        assert_eq!(pairing.len(), 2);
        assert!(pairing.iter().all(|c| c.lits.iter().any(|l| l.var == x5)));
    }

    #[test]
    fn test_violations_report_broken_rules() {
        let input = TimetableInput {
            sections: vec!["A".into()],
            courses: vec![
                CourseSpec::new("MATH", 1, CourseCategory::Theory, Teacher::named("Mr. X")),
                CourseSpec::new("LAB", 1, CourseCategory::Lab, Teacher::named("Mr. X")),
            ],
            fixed_slots: vec![FixedSlot::new("A", Day::Mon, 1, "MATH")],
            include_free_periods: false,
            free_period_quota: 2,
        };
        let (catalog, vars, set) = build(&input);

        // MATH at Mon 1 and Mon 2, LAB only at Mon 4: breaks quota, repeats,
        // lab pairing and coverage everywhere else.
        let mut values = vec![false; vars.len()];
        values[vars.var(key(&catalog, "A", Day::Mon, 1, "MATH"))] = true;
        values[vars.var(key(&catalog, "A", Day::Mon, 2, "MATH"))] = true;
        values[vars.var(key(&catalog, "A", Day::Mon, 4, "LAB"))] = true;
        let broken: Vec<Rule> = set
            .violations(&Assignment::new(values))
            .iter()
            .map(|c| c.rule)
            .collect();

        assert!(broken.contains(&Rule::CourseQuota));
        assert!(broken.contains(&Rule::SameDayRepeat));
        assert!(broken.contains(&Rule::ImmediateRepeat));
        assert!(broken.contains(&Rule::LabPairing));
        assert!(broken.contains(&Rule::SlotCoverage));
        assert!(!broken.contains(&Rule::FixedSlot));
        assert!(!broken.contains(&Rule::LabWindow));
    }
}

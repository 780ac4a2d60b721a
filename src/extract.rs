use log::{error, info};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::catalog::Catalog;
use crate::data::{CourseId, Day, PERIOD_COUNT, Period, SectionId, Teacher};
use crate::error::{Result, TimetableError};
use crate::variables::{Assignment, VarSpace};

/// What happens in one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cell {
    pub course: CourseId,
    pub teacher: Teacher,
}

/// A finished timetable: section -> day -> period -> cell.
///
/// A missing period is an empty slot, which only occurs with free periods
/// enabled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Solution {
    sections: BTreeMap<SectionId, BTreeMap<Day, BTreeMap<Period, Cell>>>,
}

impl Solution {
    pub fn cell(&self, section: &str, day: Day, period: Period) -> Option<&Cell> {
        self.sections.get(section)?.get(&day)?.get(&period)
    }

    pub fn sections(&self) -> impl Iterator<Item = &SectionId> {
        self.sections.keys()
    }

    /// Every filled slot as `(section, day, period, cell)`.
    pub fn cells(&self) -> impl Iterator<Item = (&SectionId, Day, Period, &Cell)> {
        self.sections.iter().flat_map(|(section, days)| {
            days.iter().flat_map(move |(&day, periods)| {
                periods
                    .iter()
                    .map(move |(&period, cell)| (section, day, period, cell))
            })
        })
    }

    /// Periods allocated to each course, per section.
    pub fn course_totals(&self) -> BTreeMap<SectionId, BTreeMap<CourseId, usize>> {
        let mut totals: BTreeMap<SectionId, BTreeMap<CourseId, usize>> = BTreeMap::new();
        for (section, _, _, cell) in self.cells() {
            *totals
                .entry(section.clone())
                .or_default()
                .entry(cell.course.clone())
                .or_default() += 1;
        }
        totals
    }

    /// Periods taught per teacher across all sections. Slots without a
    /// teacher are not counted.
    pub fn teacher_workload(&self) -> BTreeMap<String, usize> {
        let mut workload = BTreeMap::new();
        for (_, _, _, cell) in self.cells() {
            if cell.teacher == Teacher::Unassigned {
                continue;
            }
            *workload.entry(cell.teacher.to_string()).or_default() += 1;
        }
        workload
    }
}

/// Turns a solved assignment into a [`Solution`].
///
/// Fails if a slot holds more than one course, or holds none while free
/// periods are disabled: either means the constraints let a bad assignment
/// through.
pub fn extract(catalog: &Catalog, vars: &VarSpace, assignment: &Assignment) -> Result<Solution> {
    let mut sections = BTreeMap::new();
    for (section_index, section) in catalog.sections().iter().enumerate() {
        let mut days = BTreeMap::new();
        for day in Day::ALL {
            let mut periods = BTreeMap::new();
            for period in 1..=PERIOD_COUNT as Period {
                let courses: Vec<usize> = vars
                    .slot(section_index, day, period)
                    .filter(|&var| assignment.value(var))
                    .map(|var| vars.key(var).course)
                    .collect();
                match courses.as_slice() {
                    [] if catalog.include_free_periods() => {}
                    [] => {
                        return Err(invariant(format!(
                            "slot ({}, {}, {}) is empty but free periods are disabled",
                            section, day, period
                        )));
                    }
                    [course] => {
                        let course = catalog.course(*course);
                        periods.insert(
                            period,
                            Cell {
                                course: course.id.clone(),
                                teacher: course.teacher.clone(),
                            },
                        );
                    }
                    many => {
                        let names: Vec<&str> =
                            many.iter().map(|&c| catalog.course(c).id.as_str()).collect();
                        return Err(invariant(format!(
                            "slot ({}, {}, {}) holds {} courses: {}",
                            section,
                            day,
                            period,
                            many.len(),
                            names.join(", ")
                        )));
                    }
                }
            }
            days.insert(day, periods);
        }
        sections.insert(section.clone(), days);
    }

    let solution = Solution { sections };
    info!("Extracted {} scheduled periods", solution.cells().count());
    Ok(solution)
}

fn invariant(message: String) -> TimetableError {
    error!("{}", message);
    TimetableError::Invariant(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::ConstraintSet;
    use crate::data::{FREE_COURSE, TimetableInput};
    use crate::solver::{Solver, SolverConfig};
    use crate::testing::full_week_input;
    use crate::variables::VarKey;
    use std::time::Duration;

    fn solved(input: &TimetableInput) -> (Catalog, Solution) {
        let catalog = Catalog::from_input(input).unwrap();
        let vars = VarSpace::new(&catalog);
        let constraints = ConstraintSet::build(&catalog, &vars);
        let config = SolverConfig::default()
            .with_workers(1)
            .with_time_limit(Some(Duration::from_secs(60)));
        let outcome = Solver::new(&vars, &constraints, config).solve().unwrap();
        let solution = extract(&catalog, &vars, outcome.assignment().unwrap()).unwrap();
        (catalog, solution)
    }

    #[test]
    fn test_pinned_slot_is_reported() {
        let (_, solution) = solved(&TimetableInput::default_catalog(true));
        let cell = solution.cell("A", Day::Tue, 2).unwrap();
        assert_eq!(cell.course, "PD");
        assert_eq!(cell.teacher, Teacher::named("Ms. Kirupavathy"));
        assert_eq!(solution.cell("B", Day::Sat, 7).unwrap().course, "ACT");
        assert_eq!(solution.cell("A", Day::Thu, 6).unwrap().course, "LIB");
    }

    #[test]
    fn test_every_cell_is_filled_without_free_periods() {
        let (catalog, solution) = solved(&full_week_input());
        for section in catalog.sections() {
            for day in Day::ALL {
                for period in 1..=PERIOD_COUNT as Period {
                    assert!(solution.cell(section, day, period).is_some());
                }
            }
        }
        assert_eq!(solution.cells().count(), 84);
        let sections: Vec<&SectionId> = solution.sections().collect();
        assert_eq!(sections, vec!["A", "B"]);
    }

    #[test]
    fn test_course_totals_match_quotas() {
        let (catalog, solution) = solved(&TimetableInput::default_catalog(true));
        let totals = solution.course_totals();
        for section in catalog.sections() {
            for course in catalog.courses() {
                assert_eq!(
                    totals[section][&course.id],
                    course.period_quota() as usize,
                    "{} in section {}",
                    course.id,
                    section
                );
            }
        }
        assert_eq!(totals["A"]["OS"], 6);
        assert_eq!(totals["B"][FREE_COURSE], 2);
    }

    #[test]
    fn test_lab_sessions_sit_in_whole_pairs() {
        let (catalog, solution) = solved(&TimetableInput::default_catalog(true));
        let labs: Vec<&str> = catalog
            .courses()
            .iter()
            .filter(|c| c.is_lab())
            .map(|c| c.id.as_str())
            .collect();
        for (section, day, period, cell) in solution.cells() {
            if !labs.contains(&cell.course.as_str()) {
                continue;
            }
            assert!((4..=7).contains(&period));
            let partner = if period % 2 == 0 { period + 1 } else { period - 1 };
            assert_eq!(
                solution.cell(section, day, partner).map(|c| c.course.as_str()),
                Some(cell.course.as_str())
            );
        }
    }

    #[test]
    fn test_no_teacher_is_in_two_rooms() {
        let (_, solution) = solved(&TimetableInput::default_catalog(true));
        let mut seen = std::collections::HashSet::new();
        for (_, day, period, cell) in solution.cells() {
            if let Some(name) = cell.teacher.name() {
                assert!(seen.insert((day, period, name.to_string())), "{} double-booked", name);
            }
        }
    }

    #[test]
    fn test_teacher_workload_sums_over_sections() {
        let (_, solution) = solved(&full_week_input());
        let workload = solution.teacher_workload();
        assert_eq!(workload["Mr. Rao"], 12);
        // CHEM plus two lab sessions, in both sections
        assert_eq!(workload["Ms. Menon"], 20);
        assert_eq!(workload["All Staff"], 8);
    }

    #[test]
    fn test_two_courses_in_one_slot_is_an_invariant_violation() {
        let catalog = Catalog::from_input(&full_week_input()).unwrap();
        let vars = VarSpace::new(&catalog);
        let mut values = vec![false; vars.len()];
        for course in ["MATH", "PHY"] {
            values[vars.var(VarKey {
                section: 0,
                day: Day::Mon,
                period: 1,
                course: catalog.course_index(course).unwrap(),
            })] = true;
        }
        let err = extract(&catalog, &vars, &Assignment::new(values)).unwrap_err();
        assert!(matches!(err, TimetableError::Invariant(_)));
        assert!(err.to_string().contains("MATH, PHY"));
    }

    #[test]
    fn test_empty_slot_without_free_periods_is_an_invariant_violation() {
        let catalog = Catalog::from_input(&full_week_input()).unwrap();
        let vars = VarSpace::new(&catalog);
        let values = vec![false; vars.len()];
        let err = extract(&catalog, &vars, &Assignment::new(values)).unwrap_err();
        assert!(err.to_string().contains("(A, Mon, 1)"));
    }

    #[test]
    fn test_solution_serializes_as_nested_lookup() {
        let (_, solution) = solved(&full_week_input());
        let json = serde_json::to_value(&solution).unwrap();
        assert_eq!(json["A"]["Mon"]["1"]["course"], "MATH");
        assert_eq!(json["A"]["Mon"]["1"]["teacher"]["named"], "Mr. Rao");
    }
}

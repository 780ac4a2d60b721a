use itertools::Itertools;
use log::{debug, info};
use std::collections::HashMap;

use crate::data::{
    CourseCategory, CourseId, Day, FREE_COURSE, FixedSlot, PERIOD_COUNT, Period, SectionId,
    Teacher, TimetableInput,
};
use crate::error::ConfigError;

const SLOTS_PER_SECTION: usize = Day::ALL.len() * PERIOD_COUNT;

/// A validated course.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Course {
    pub id: CourseId,
    pub weekly_count: u32,
    pub category: CourseCategory,
    pub teacher: Teacher,
}

impl Course {
    pub fn is_lab(&self) -> bool {
        self.category == CourseCategory::Lab
    }

    /// Only theory courses are held to the no-repeat rules.
    pub fn is_theory(&self) -> bool {
        self.category == CourseCategory::Theory
    }

    /// Number of periods the course occupies per section per week, `None`
    /// when it does not fit in a `u32`.
    fn checked_period_quota(&self) -> Option<u32> {
        if self.is_lab() {
            self.weekly_count.checked_mul(2)
        } else {
            Some(self.weekly_count)
        }
    }

    /// Number of periods the course occupies per section per week.
    pub fn period_quota(&self) -> u32 {
        self.checked_period_quota().unwrap_or(u32::MAX)
    }

    /// Most periods the course may take in one section on one day.
    pub fn day_cap(&self) -> u32 {
        match self.category {
            CourseCategory::Theory => 1,
            CourseCategory::Lab => 2,
            CourseCategory::Administrative | CourseCategory::Free => PERIOD_COUNT as u32,
        }
    }
}

/// A fixed slot resolved to catalog indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pin {
    pub section: usize,
    pub day: Day,
    pub period: Period,
    pub course: usize,
}

/// The immutable domain model for one run.
///
/// Built once from a [`TimetableInput`]; everything downstream refers to
/// sections and courses by their index in this catalog.
#[derive(Debug, Clone)]
pub struct Catalog {
    sections: Vec<SectionId>,
    courses: Vec<Course>,
    pins: Vec<Pin>,
    include_free_periods: bool,
}

impl Catalog {
    /// Validates the input and builds the catalog. The first offending item
    /// is reported.
    pub fn from_input(input: &TimetableInput) -> Result<Self, ConfigError> {
        if input.sections.is_empty() {
            return Err(ConfigError::NoSections);
        }
        if let Some(dup) = input.sections.iter().duplicates().next() {
            return Err(ConfigError::DuplicateSection(dup.clone()));
        }
        if input.courses.is_empty() {
            return Err(ConfigError::NoCourses);
        }
        if let Some(dup) = input.courses.iter().map(|c| &c.id).duplicates().next() {
            return Err(ConfigError::DuplicateCourse(dup.clone()));
        }
        if let Some(reserved) = input
            .courses
            .iter()
            .find(|c| c.id == FREE_COURSE || c.category == CourseCategory::Free)
        {
            return Err(ConfigError::ReservedCourse(reserved.id.clone()));
        }

        let mut courses: Vec<Course> = input
            .courses
            .iter()
            .map(|spec| Course {
                id: spec.id.clone(),
                weekly_count: spec.weekly_count,
                category: spec.category,
                teacher: spec.teacher.clone(),
            })
            .collect();
        if input.include_free_periods {
            courses.push(Course {
                id: FREE_COURSE.to_string(),
                weekly_count: input.free_period_quota,
                category: CourseCategory::Free,
                teacher: Teacher::Unassigned,
            });
        }

        if let Some(oversized) = courses.iter().find(|c| {
            c.checked_period_quota()
                .is_none_or(|quota| quota as usize > SLOTS_PER_SECTION)
        }) {
            return Err(ConfigError::QuotaExceedsWeek(
                oversized.id.clone(),
                SLOTS_PER_SECTION,
            ));
        }

        let section_index: HashMap<&str, usize> = input
            .sections
            .iter()
            .enumerate()
            .map(|(i, s)| (s.as_str(), i))
            .collect();
        let course_index: HashMap<&str, usize> = courses
            .iter()
            .enumerate()
            .map(|(i, c)| (c.id.as_str(), i))
            .collect();

        let mut pins = Vec::with_capacity(input.fixed_slots.len());
        let mut pinned_by: HashMap<(usize, Day, Period), &FixedSlot> = HashMap::new();
        for slot in &input.fixed_slots {
            let section = *section_index
                .get(slot.section.as_str())
                .ok_or_else(|| ConfigError::UnknownSection(slot.clone()))?;
            let course = *course_index
                .get(slot.course.as_str())
                .ok_or_else(|| ConfigError::UnknownCourse(slot.clone()))?;
            if slot.period < 1 || slot.period as usize > PERIOD_COUNT {
                return Err(ConfigError::PeriodOutOfRange(slot.clone()));
            }
            if let Some(previous) = pinned_by.insert((section, slot.day, slot.period), slot) {
                if previous.course != slot.course {
                    return Err(ConfigError::ConflictingFixedSlots(
                        previous.clone(),
                        slot.clone(),
                    ));
                }
                // same pin listed twice
                continue;
            }
            pins.push(Pin {
                section,
                day: slot.day,
                period: slot.period,
                course,
            });
        }

        info!(
            "Catalog ready: {} sections, {} courses, {} fixed slots, free periods {}",
            input.sections.len(),
            courses.len(),
            pins.len(),
            if input.include_free_periods { "on" } else { "off" }
        );
        for course in &courses {
            debug!(
                "course {} ({:?}) needs {} periods per section, taught by {}",
                course.id,
                course.category,
                course.period_quota(),
                course.teacher
            );
        }

        Ok(Self {
            sections: input.sections.clone(),
            courses,
            pins,
            include_free_periods: input.include_free_periods,
        })
    }

    pub fn sections(&self) -> &[SectionId] {
        &self.sections
    }

    pub fn courses(&self) -> &[Course] {
        &self.courses
    }

    pub fn course(&self, index: usize) -> &Course {
        &self.courses[index]
    }

    pub fn pins(&self) -> &[Pin] {
        &self.pins
    }

    pub fn include_free_periods(&self) -> bool {
        self.include_free_periods
    }

    pub fn section_index(&self, section: &str) -> Option<usize> {
        self.sections.iter().position(|s| s == section)
    }

    pub fn course_index(&self, course: &str) -> Option<usize> {
        self.courses.iter().position(|c| c.id == course)
    }

    /// Slots each section has in a week.
    pub fn slots_per_section(&self) -> usize {
        SLOTS_PER_SECTION
    }

    /// Periods each section's quotas add up to.
    pub fn periods_demanded(&self) -> usize {
        self.courses.iter().map(|c| c.period_quota() as usize).sum()
    }

    /// Course indices grouped by real teacher, in teacher-name order.
    pub fn courses_by_teacher(&self) -> Vec<(&str, Vec<usize>)> {
        self.courses
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.teacher.name().map(|name| (name, i)))
            .into_group_map()
            .into_iter()
            .sorted_by_key(|(name, _)| *name)
            .collect()
    }
}

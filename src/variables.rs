use std::ops::Range;

use crate::catalog::Catalog;
use crate::data::{Day, PERIOD_COUNT, Period};

pub type VarId = usize;

/// The (section, day, period, course) tuple a variable stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarKey {
    pub section: usize,
    pub day: Day,
    pub period: Period,
    pub course: usize,
}

/// One boolean decision variable per (section, day, period, course).
///
/// Variables are laid out slot-major: the courses of one slot occupy a
/// contiguous range of ids, and slots follow section, day, period order.
#[derive(Debug, Clone)]
pub struct VarSpace {
    sections: usize,
    courses: usize,
}

impl VarSpace {
    pub fn new(catalog: &Catalog) -> Self {
        Self {
            sections: catalog.sections().len(),
            courses: catalog.courses().len(),
        }
    }

    pub fn len(&self) -> usize {
        self.slot_count() * self.courses
    }

    pub fn sections(&self) -> usize {
        self.sections
    }

    pub fn courses(&self) -> usize {
        self.courses
    }

    pub fn slot_count(&self) -> usize {
        self.sections * Day::ALL.len() * PERIOD_COUNT
    }

    fn slot_of(&self, section: usize, day: Day, period: Period) -> usize {
        debug_assert!(section < self.sections);
        debug_assert!((1..=PERIOD_COUNT).contains(&(period as usize)));
        (section * Day::ALL.len() + day.index()) * PERIOD_COUNT + (period as usize - 1)
    }

    pub fn var(&self, key: VarKey) -> VarId {
        debug_assert!(key.course < self.courses);
        self.slot_of(key.section, key.day, key.period) * self.courses + key.course
    }

    pub fn key(&self, var: VarId) -> VarKey {
        let course = var % self.courses;
        let slot = var / self.courses;
        let period = (slot % PERIOD_COUNT) as Period + 1;
        let day = Day::ALL[(slot / PERIOD_COUNT) % Day::ALL.len()];
        let section = slot / (PERIOD_COUNT * Day::ALL.len());
        VarKey {
            section,
            day,
            period,
            course,
        }
    }

    /// Variables of every course at one slot.
    pub fn slot(&self, section: usize, day: Day, period: Period) -> Range<VarId> {
        self.slot_range(self.slot_of(section, day, period))
    }

    pub fn slot_range(&self, slot: usize) -> Range<VarId> {
        let start = slot * self.courses;
        start..start + self.courses
    }

    /// Slot indices belonging to one section.
    pub fn section_slots(&self, section: usize) -> Range<usize> {
        let per_section = Day::ALL.len() * PERIOD_COUNT;
        section * per_section..(section + 1) * per_section
    }

    /// Readable name such as `x_A_Tue_2_PD`, used in logs and diagnostics.
    pub fn name(&self, var: VarId, catalog: &Catalog) -> String {
        let key = self.key(var);
        format!(
            "x_{}_{}_{}_{}",
            catalog.sections()[key.section],
            key.day,
            key.period,
            catalog.course(key.course).id
        )
    }
}

/// A complete valuation of a [`VarSpace`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    values: Vec<bool>,
}

impl Assignment {
    pub fn new(values: Vec<bool>) -> Self {
        Self { values }
    }

    pub fn value(&self, var: VarId) -> bool {
        self.values[var]
    }

    pub fn values(&self) -> &[bool] {
        &self.values
    }

    pub fn true_count(&self) -> usize {
        self.values.iter().filter(|v| **v).count()
    }
}

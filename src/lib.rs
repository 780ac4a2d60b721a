//! Weekly class timetabling.
//!
//! Assigns courses to (section, day, period) slots under hard rules: every
//! slot covered, exact weekly quotas, no teacher in two rooms at once, labs
//! in whole two-period sessions, pinned administrative slots and no repeated
//! theory subjects within a day.
//!
//! The pipeline is [`catalog::Catalog`] (validated input) ->
//! [`variables::VarSpace`] -> [`constraints::ConstraintSet`] ->
//! [`solver::Solver`] -> [`extract::extract`]. [`solver::solve`] runs all of
//! it for one [`data::TimetableInput`].

pub mod catalog;
pub mod constraints;
pub mod data;
pub mod error;
pub mod extract;
pub mod server;
pub mod solver;
pub mod variables;

#[cfg(test)]
mod testing;

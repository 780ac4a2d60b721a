use log::{debug, info, trace, warn};
use rayon::prelude::*;
use serde::Serialize;
use std::cmp::Reverse;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crate::catalog::Catalog;
use crate::constraints::{ConstraintSet, QuotaProfile};
use crate::data::{SolverOptions, TimetableInput, TimetableOutput};
use crate::error::{ConfigError, Result};
use crate::extract;
use crate::variables::{Assignment, VarId, VarSpace};

/// How many search nodes a worker expands between deadline checks.
const INTERRUPT_FREQUENCY: u64 = 256;

/// Sub-problems handed out per worker thread.
const FRONTIER_PER_WORKER: usize = 4;

/// Deepest decision level the root is split at.
const MAX_FRONTIER_DEPTH: usize = 12;

/// Builds the model for `input`, searches it and extracts the timetable.
pub fn solve(input: &TimetableInput, options: &SolverOptions) -> Result<TimetableOutput> {
    let start_time = Instant::now();
    let config = SolverConfig::from_options(options)?;
    let catalog = Catalog::from_input(input)?;
    info!(
        "Each section needs {} periods across {} slots",
        catalog.periods_demanded(),
        catalog.slots_per_section()
    );

    let vars = VarSpace::new(&catalog);
    info!(
        "Generated {} assignment variables ({} slots x {} courses)",
        vars.len(),
        vars.slot_count(),
        vars.courses()
    );
    let constraints = ConstraintSet::build(&catalog, &vars);

    let output = match Solver::new(&vars, &constraints, config).solve()? {
        SolveOutcome::Solved { assignment, stats } => {
            let solution = extract::extract(&catalog, &vars, &assignment)?;
            TimetableOutput::solved(solution, stats)
        }
        SolveOutcome::NoSolutionFound { reason, stats } => {
            warn!("No solution found: {:?}", reason);
            TimetableOutput::unsolved(reason, stats)
        }
    };
    info!("Finished in {:.2?}", start_time.elapsed());
    Ok(output)
}

/// Solver configuration.
#[derive(Debug, Clone)]
pub struct SolverConfig {
    /// Wall-clock budget for the search. `None` searches until done.
    pub time_limit: Option<Duration>,
    /// Number of worker threads.
    pub workers: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            time_limit: Some(Duration::from_secs(120)),
            workers: 8,
        }
    }
}

impl SolverConfig {
    pub fn from_options(options: &SolverOptions) -> std::result::Result<Self, ConfigError> {
        if options.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        Ok(Self {
            time_limit: options.time_limit_ms.map(Duration::from_millis),
            workers: options.workers,
        })
    }

    pub fn with_time_limit(mut self, time_limit: Option<Duration>) -> Self {
        self.time_limit = time_limit;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }
}

/// Why the solver came back empty-handed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoSolutionReason {
    /// Every branch was refuted; no timetable exists.
    Infeasible,
    /// The budget ran out first. Inconclusive.
    TimeLimit,
}

/// Search effort, summed over all workers.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SolveStats {
    pub nodes: u64,
    pub backtracks: u64,
    pub subproblems: usize,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone)]
pub enum SolveOutcome {
    Solved {
        assignment: Assignment,
        stats: SolveStats,
    },
    NoSolutionFound {
        reason: NoSolutionReason,
        stats: SolveStats,
    },
}

impl SolveOutcome {
    pub fn assignment(&self) -> Option<&Assignment> {
        match self {
            SolveOutcome::Solved { assignment, .. } => Some(assignment),
            SolveOutcome::NoSolutionFound { .. } => None,
        }
    }

    pub fn stats(&self) -> &SolveStats {
        match self {
            SolveOutcome::Solved { stats, .. } | SolveOutcome::NoSolutionFound { stats, .. } => {
                stats
            }
        }
    }
}

/// Backtracking search with constraint propagation over a [`ConstraintSet`].
///
/// The search branches on one course variable of the most constrained open
/// slot, trying `true` before `false`, and propagates every constraint to a
/// fixpoint after each decision. With several workers the root is split into
/// an ordered frontier of disjoint sub-problems; the lowest-indexed success
/// wins, so the answer does not depend on the worker count.
pub struct Solver<'a> {
    vars: &'a VarSpace,
    constraints: &'a ConstraintSet,
    config: SolverConfig,
}

impl<'a> Solver<'a> {
    pub fn new(vars: &'a VarSpace, constraints: &'a ConstraintSet, config: SolverConfig) -> Self {
        Self {
            vars,
            constraints,
            config,
        }
    }

    pub fn solve(&self) -> Result<SolveOutcome> {
        let start_time = Instant::now();
        let deadline = self.config.time_limit.map(|limit| start_time + limit);
        let mut stats = SolveStats::default();

        let infeasible = |mut stats: SolveStats| -> Result<SolveOutcome> {
            stats.elapsed_ms = elapsed_ms(start_time);
            Ok(SolveOutcome::NoSolutionFound {
                reason: NoSolutionReason::Infeasible,
                stats,
            })
        };

        if !self.quotas_fit_week() {
            return infeasible(stats);
        }

        let net = Network::new(self.vars, self.constraints);
        let Some(root) = SearchState::root(&net) else {
            info!("Root propagation found a contradiction");
            return infeasible(stats);
        };

        let frontier = if self.config.workers > 1 {
            let (frontier, expanded) =
                split(&net, &root, self.config.workers * FRONTIER_PER_WORKER);
            stats.nodes += expanded;
            frontier
        } else {
            vec![Vec::new()]
        };
        stats.subproblems = frontier.len();
        if frontier.is_empty() {
            info!("Every branch of the frontier was refuted");
            return infeasible(stats);
        }

        info!(
            "Starting search: {} sub-problems on {} workers, budget {:?}",
            frontier.len(),
            self.config.workers,
            self.config.time_limit
        );
        let best = AtomicUsize::new(usize::MAX);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers)
            .build()?;
        let results: Vec<(Subtree, u64, u64)> = pool.install(|| {
            frontier
                .par_iter()
                .enumerate()
                .map(|(index, prefix)| {
                    let Some(state) = replay(&net, &root, prefix) else {
                        return (Subtree::Exhausted, 0, 0);
                    };
                    let control = Control {
                        deadline,
                        best: &best,
                        index,
                    };
                    let mut worker = Worker::new(&net, state);
                    let outcome = worker.run(&control);
                    if matches!(outcome, Subtree::Found(_)) {
                        best.fetch_min(index, Ordering::Relaxed);
                    }
                    debug!(
                        "sub-problem {} {} after {} nodes",
                        index,
                        outcome.label(),
                        worker.nodes
                    );
                    (outcome, worker.nodes, worker.backtracks)
                })
                .collect()
        });

        let mut found = None;
        let mut timed_out = false;
        for (outcome, nodes, backtracks) in results {
            stats.nodes += nodes;
            stats.backtracks += backtracks;
            match outcome {
                Subtree::Found(assignment) => {
                    if found.is_none() {
                        found = Some(assignment);
                    }
                }
                Subtree::TimedOut => timed_out = true,
                Subtree::Exhausted | Subtree::Abandoned => {}
            }
        }
        stats.elapsed_ms = elapsed_ms(start_time);

        match found {
            Some(assignment) => {
                info!(
                    "Solution found in {:.2?} ({} nodes, {} backtracks)",
                    start_time.elapsed(),
                    stats.nodes,
                    stats.backtracks
                );
                Ok(SolveOutcome::Solved { assignment, stats })
            }
            None if timed_out => Ok(SolveOutcome::NoSolutionFound {
                reason: NoSolutionReason::TimeLimit,
                stats,
            }),
            None => infeasible(stats),
        }
    }

    /// Each section's quotas must fill its week exactly, or fit inside it when
    /// slots may stay empty.
    fn quotas_fit_week(&self) -> bool {
        for section in 0..self.vars.sections() {
            let slots = self.vars.section_slots(section).len();
            let demand: usize = self
                .constraints
                .profiles()
                .iter()
                .filter(|p| p.section == section)
                .map(|p| p.quota as usize)
                .sum();
            let fits = if self.constraints.free_periods() {
                demand <= slots
            } else {
                demand == slots
            };
            if !fits {
                warn!(
                    "Section #{} needs {} periods but has {} slots (free periods {})",
                    section,
                    demand,
                    slots,
                    if self.constraints.free_periods() { "on" } else { "off" }
                );
                return false;
            }
        }
        true
    }
}

fn elapsed_ms(start_time: Instant) -> u64 {
    u64::try_from(start_time.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Static lookup tables shared by every worker.
struct Network<'a> {
    vars: &'a VarSpace,
    set: &'a ConstraintSet,
    /// Constraints mentioning each variable, with the polarity it appears in.
    watches: Vec<Vec<(usize, bool)>>,
    /// Quota profile each variable belongs to.
    profile_of: Vec<usize>,
    /// Quota profiles of each section.
    section_profiles: Vec<Vec<usize>>,
}

impl<'a> Network<'a> {
    fn new(vars: &'a VarSpace, set: &'a ConstraintSet) -> Self {
        let mut watches = vec![Vec::new(); vars.len()];
        for (index, constraint) in set.constraints().iter().enumerate() {
            for lit in &constraint.lits {
                watches[lit.var].push((index, lit.positive));
            }
        }

        let mut profile_of = vec![0; vars.len()];
        let mut section_profiles = vec![Vec::new(); vars.sections()];
        for (index, profile) in set.profiles().iter().enumerate() {
            for &var in profile.days.iter().flatten() {
                profile_of[var] = index;
            }
            section_profiles[profile.section].push(index);
        }

        trace!(
            "watch lists hold {} entries",
            watches.iter().map(Vec::len).sum::<usize>()
        );
        Self {
            vars,
            set,
            watches,
            profile_of,
            section_profiles,
        }
    }

    fn profile(&self, var: VarId) -> &QuotaProfile {
        &self.set.profiles()[self.profile_of[var]]
    }
}

/// Branch-local search state: a partial assignment with its undo trail.
#[derive(Debug, Clone)]
struct SearchState {
    values: Vec<Option<bool>>,
    /// Per constraint, literals known to hold.
    holding: Vec<u32>,
    /// Per constraint, literals known to fail.
    failing: Vec<u32>,
    trail: Vec<VarId>,
    /// Trail length when each open decision level began.
    levels: Vec<usize>,
    queue: Vec<VarId>,
    dirty: Vec<bool>,
    dirty_profiles: Vec<usize>,
}

impl SearchState {
    /// Propagates the constraints that hold before any decision. `None` when
    /// they already contradict each other.
    fn root(net: &Network) -> Option<Self> {
        let profiles = net.set.profiles().len();
        let mut state = Self {
            values: vec![None; net.vars.len()],
            holding: vec![0; net.set.len()],
            failing: vec![0; net.set.len()],
            trail: Vec::new(),
            levels: Vec::new(),
            queue: Vec::new(),
            dirty: vec![true; profiles],
            dirty_profiles: (0..profiles).collect(),
        };
        for index in 0..net.set.len() {
            if !state.check_constraint(net, index) {
                return None;
            }
        }
        if !state.propagate(net) {
            return None;
        }
        debug!(
            "root propagation fixed {} of {} variables",
            state.trail.len(),
            state.values.len()
        );
        Some(state)
    }

    fn assign(&mut self, net: &Network, var: VarId, value: bool) {
        debug_assert!(self.values[var].is_none());
        self.values[var] = Some(value);
        self.trail.push(var);
        for &(index, positive) in &net.watches[var] {
            if positive == value {
                self.holding[index] += 1;
            } else {
                self.failing[index] += 1;
            }
        }
        self.queue.push(var);
        let profile = net.profile_of[var];
        if !self.dirty[profile] {
            self.dirty[profile] = true;
            self.dirty_profiles.push(profile);
        }
    }

    /// Opens a decision level, assigns and propagates. On `false` the level
    /// stays open for the caller to undo.
    fn decide(&mut self, net: &Network, var: VarId, value: bool) -> bool {
        self.levels.push(self.trail.len());
        self.assign(net, var, value);
        self.propagate(net)
    }

    /// Retracts every assignment made since the last decision level opened.
    fn undo_level(&mut self, net: &Network) {
        let mark = self.levels.pop().unwrap_or(0);
        while self.trail.len() > mark {
            let Some(var) = self.trail.pop() else { break };
            let Some(value) = self.values[var].take() else {
                continue;
            };
            for &(index, positive) in &net.watches[var] {
                if positive == value {
                    self.holding[index] -= 1;
                } else {
                    self.failing[index] -= 1;
                }
            }
        }
        self.clear_pending();
    }

    fn clear_pending(&mut self) {
        self.queue.clear();
        for profile in self.dirty_profiles.drain(..) {
            self.dirty[profile] = false;
        }
    }

    /// Runs every consequence of the queued assignments. `false` on conflict.
    fn propagate(&mut self, net: &Network) -> bool {
        loop {
            while let Some(var) = self.queue.pop() {
                for &(index, _) in &net.watches[var] {
                    if !self.check_constraint(net, index) {
                        self.clear_pending();
                        return false;
                    }
                }
            }
            while let Some(profile) = self.dirty_profiles.pop() {
                self.dirty[profile] = false;
                if !self.check_profile(net, profile) {
                    self.clear_pending();
                    return false;
                }
            }
            if self.queue.is_empty() {
                break;
            }
        }
        self.sections_have_room(net)
    }

    fn check_constraint(&mut self, net: &Network, index: usize) -> bool {
        let constraint = &net.set.constraints()[index];
        let holding = self.holding[index];
        let open = constraint.lits.len() as u32 - holding - self.failing[index];
        if holding > constraint.max || holding + open < constraint.min {
            return false;
        }
        if open == 0 {
            return true;
        }
        if holding == constraint.max {
            for lit in &constraint.lits {
                if self.values[lit.var].is_none() {
                    self.assign(net, lit.var, !lit.positive);
                }
            }
        } else if holding + open == constraint.min {
            for lit in &constraint.lits {
                if self.values[lit.var].is_none() {
                    self.assign(net, lit.var, lit.positive);
                }
            }
        }
        true
    }

    fn not_false(&self, vars: &[VarId]) -> u32 {
        vars.iter().filter(|&&v| self.values[v] != Some(false)).count() as u32
    }

    fn placed(&self, profile: &QuotaProfile) -> u32 {
        profile
            .days
            .iter()
            .flatten()
            .filter(|&&v| self.values[v] == Some(true))
            .count() as u32
    }

    /// Most periods the profile's course can still end up with.
    fn reachable(&self, profile: &QuotaProfile) -> u32 {
        profile
            .days
            .iter()
            .map(|day| self.not_false(day).min(profile.day_cap))
            .sum()
    }

    fn check_profile(&mut self, net: &Network, index: usize) -> bool {
        let profile = &net.set.profiles()[index];
        let reachable = self.reachable(profile);
        if reachable < profile.quota {
            return false;
        }
        if reachable == profile.quota {
            // every day has to contribute all it can
            for day in &profile.days {
                if self.not_false(day) <= profile.day_cap {
                    for &var in day {
                        if self.values[var].is_none() {
                            self.assign(net, var, true);
                        }
                    }
                }
            }
        }
        true
    }

    /// Periods still owed by a section's quotas must fit in its undecided slots.
    fn sections_have_room(&self, net: &Network) -> bool {
        net.section_profiles
            .iter()
            .enumerate()
            .all(|(section, profiles)| {
                let owed: u32 = profiles
                    .iter()
                    .map(|&p| {
                        let profile = &net.set.profiles()[p];
                        profile.quota.saturating_sub(self.placed(profile))
                    })
                    .sum();
                let open = net
                    .vars
                    .section_slots(section)
                    .filter(|&slot| self.slot_is_open(net, slot))
                    .count() as u32;
                owed <= open
            })
    }

    fn slot_is_open(&self, net: &Network, slot: usize) -> bool {
        let range = net.vars.slot_range(slot);
        !range.clone().any(|v| self.values[v] == Some(true))
            && range.into_iter().any(|v| self.values[v].is_none())
    }

    /// The next variable to branch on, or `None` once every slot is decided.
    fn pick_branch(&self, net: &Network) -> Option<VarId> {
        let mut best: Option<(usize, usize)> = None;
        for slot in 0..net.vars.slot_count() {
            let range = net.vars.slot_range(slot);
            if range.clone().any(|v| self.values[v] == Some(true)) {
                continue;
            }
            let open = range.filter(|&v| self.values[v].is_none()).count();
            if open > 0 && best.is_none_or(|(fewest, _)| open < fewest) {
                best = Some((open, slot));
            }
        }
        let (_, slot) = best?;
        net.vars
            .slot_range(slot)
            .filter(|&v| self.values[v].is_none())
            .min_by_key(|&v| {
                let profile = net.profile(v);
                let slack = self.reachable(profile).saturating_sub(profile.quota);
                let owed = profile.quota.saturating_sub(self.placed(profile));
                (slack, Reverse(owed), v)
            })
    }

    fn to_assignment(&self) -> Assignment {
        Assignment::new(self.values.iter().map(|v| v.unwrap_or(false)).collect())
    }
}

/// Decisions leading from the root to one sub-problem.
type Prefix = Vec<(VarId, bool)>;

fn replay(net: &Network, root: &SearchState, prefix: &[(VarId, bool)]) -> Option<SearchState> {
    let mut state = root.clone();
    for &(var, value) in prefix {
        if !state.decide(net, var, value) {
            return None;
        }
    }
    Some(state)
}

/// Expands the root breadth-first until there are at least `target`
/// sub-problems. The result is in the order a single worker would visit them,
/// paired with the number of nodes expanded to get there.
fn split(net: &Network, root: &SearchState, target: usize) -> (Vec<Prefix>, u64) {
    let mut frontier: Vec<Prefix> = vec![Vec::new()];
    let mut expanded = 0;
    for _ in 0..MAX_FRONTIER_DEPTH {
        if frontier.len() >= target {
            break;
        }
        let mut next = Vec::with_capacity(frontier.len() * 2);
        let mut grew = false;
        for prefix in frontier {
            let Some(state) = replay(net, root, &prefix) else {
                continue;
            };
            let Some(var) = state.pick_branch(net) else {
                next.push(prefix);
                continue;
            };
            grew = true;
            expanded += 1;
            for value in [true, false] {
                let mut child = state.clone();
                if child.decide(net, var, value) {
                    let mut extended = prefix.clone();
                    extended.push((var, value));
                    next.push(extended);
                }
            }
        }
        frontier = next;
        if !grew {
            break;
        }
    }
    (frontier, expanded)
}

/// How one sub-problem ended.
#[derive(Debug)]
enum Subtree {
    Found(Assignment),
    Exhausted,
    /// A lower-indexed sub-problem already succeeded.
    Abandoned,
    TimedOut,
}

impl Subtree {
    fn label(&self) -> &'static str {
        match self {
            Subtree::Found(_) => "found",
            Subtree::Exhausted => "exhausted",
            Subtree::Abandoned => "abandoned",
            Subtree::TimedOut => "timed out",
        }
    }
}

struct Control<'c> {
    deadline: Option<Instant>,
    best: &'c AtomicUsize,
    index: usize,
}

impl Control<'_> {
    fn interrupt(&self) -> Option<Subtree> {
        if self.best.load(Ordering::Relaxed) < self.index {
            return Some(Subtree::Abandoned);
        }
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Some(Subtree::TimedOut);
        }
        None
    }
}

#[derive(Debug, Clone, Copy)]
struct Branch {
    var: VarId,
    /// The `true` branch failed and `false` is being explored.
    refuted: bool,
}

/// Depth-first search over one sub-problem with an explicit branch stack.
struct Worker<'n, 'a> {
    net: &'n Network<'a>,
    state: SearchState,
    branches: Vec<Branch>,
    nodes: u64,
    backtracks: u64,
}

impl<'n, 'a> Worker<'n, 'a> {
    fn new(net: &'n Network<'a>, state: SearchState) -> Self {
        Self {
            net,
            state,
            branches: Vec::new(),
            nodes: 0,
            backtracks: 0,
        }
    }

    fn run(&mut self, control: &Control) -> Subtree {
        loop {
            if self.nodes % INTERRUPT_FREQUENCY == 0 {
                if let Some(stop) = control.interrupt() {
                    return stop;
                }
            }
            self.nodes += 1;

            let Some(var) = self.state.pick_branch(self.net) else {
                return Subtree::Found(self.state.to_assignment());
            };
            self.branches.push(Branch {
                var,
                refuted: false,
            });
            if !self.state.decide(self.net, var, true) && !self.backtrack() {
                return Subtree::Exhausted;
            }
        }
    }

    /// Unwinds failed branches until one can take its `false` side. Returns
    /// `false` once the branch stack is empty.
    fn backtrack(&mut self) -> bool {
        loop {
            let Some(branch) = self.branches.last_mut() else {
                return false;
            };
            self.backtracks += 1;
            self.state.undo_level(self.net);
            if branch.refuted {
                self.branches.pop();
                continue;
            }
            branch.refuted = true;
            let var = branch.var;
            if self.state.decide(self.net, var, false) {
                return true;
            }
        }
    }
}

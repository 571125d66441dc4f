//! Next-best-view planning loop.
//!
//! [`ViewPlanner::run`] drives one planning session: wait for START, acquire the
//! view space and the current view, pull baseline data, then repeat rounds of
//! evaluate, select, record and move until the termination criterion fires or a
//! stop is requested. The planning table is flushed to disk whenever the
//! session ends, including when it ends with an error.
//!
//! Commands are applied only at checkpoints: between retry attempts, at the
//! pause checkpoints of a round, and at the end of a round. A remote call in
//! flight is never interrupted.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use anyhow::{Result, anyhow};
use tracing::{debug, error, info, instrument, warn};

use crate::core::control::{Command, CommandEffect, ControlFlags};
use crate::core::recorder::PlanningTable;
use crate::core::selector::select_best;
use crate::core::termination::{TerminationCriterion, TerminationInput};
use crate::core::types::{RayParams, ReceiveStatus, View};
use crate::core::utility::{UtilityWeights, compute_return};
use crate::core::view_space::ViewSpace;
use crate::io::capabilities::{InformationRequest, InformationService, RobotInterface};
use crate::io::commands::CommandInbox;
use crate::io::config::{PlannerConfig, TimingConfig};
use crate::io::data_file::write_planning_data;
use crate::retry::{RetryOutcome, RetryPolicy, retry_until_accepted};

/// Where the planner currently is in its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannerState {
    WaitingForStart,
    AcquiringViewSpace,
    AcquiringCurrentView,
    Planning,
    Terminated,
}

/// Reason why `run` stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanStop {
    /// STOP_AND_PRINT was observed at the end of a round.
    StopRequested,
    /// The termination criterion accepted the last round.
    TerminationCriterion,
    /// STOP_AND_PRINT arrived before START; nothing was planned.
    StoppedBeforeStart,
}

/// Summary of a planning session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanOutcome {
    /// Rounds recorded in the planning table.
    pub iterations: u32,
    pub stop: PlanStop,
    /// File the final planning table was written to.
    pub data_file: PathBuf,
}

/// Every candidate of a round was excluded, so no view can be selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoViableViewError {
    pub iteration: u32,
    /// Candidates that were evaluated in that round.
    pub considered: usize,
}

impl fmt::Display for NoViableViewError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "no viable candidate view in round {} ({} candidates evaluated)",
            self.iteration, self.considered
        )
    }
}

impl std::error::Error for NoViableViewError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RoundOutcome {
    Continue,
    Terminate,
}

/// One candidate of the current round.
#[derive(Debug, Clone)]
struct Candidate {
    view: View,
    /// `None` once the view was excluded by its cost.
    cost: Option<f64>,
    /// `None` when not evaluated or when the call failed.
    information: Option<Vec<f64>>,
}

/// Applies queued commands and performs their side effects.
#[derive(Debug)]
struct CommandDesk {
    inbox: CommandInbox,
    flags: Arc<ControlFlags>,
    data_dir: PathBuf,
    written: Vec<PathBuf>,
}

impl CommandDesk {
    /// Apply every queued command. Returns true if START was among them, even
    /// when a later command in the same drain cleared the started flag again.
    fn pump(&mut self, table: &PlanningTable) -> bool {
        let mut saw_start = false;
        for command in self.inbox.drain() {
            info!(?command, "command received");
            saw_start |= command == Command::Start;
            if self.flags.apply(command) == CommandEffect::FlushData {
                match write_planning_data(&self.data_dir, table) {
                    Ok(path) => self.written.push(path),
                    Err(err) => error!(err = %format!("{err:#}"), "failed to write planning data"),
                }
            }
        }
        saw_start
    }
}

/// Next-best-view planner over a robot, an information service and a
/// termination criterion.
pub struct ViewPlanner<R, I, T> {
    robot: R,
    information: I,
    termination: T,
    flags: Arc<ControlFlags>,
    desk: CommandDesk,
    weights: UtilityWeights,
    metric_names: Vec<String>,
    ray: RayParams,
    timing: TimingConfig,
    view_space: ViewSpace,
    current_view: Option<View>,
    table: PlanningTable,
    state: PlannerState,
    iterations: u32,
}

impl<R, I, T> ViewPlanner<R, I, T>
where
    R: RobotInterface,
    I: InformationService,
    T: TerminationCriterion,
{
    /// Build a planner. `flags` must be the same flags any other command
    /// consumer shares; `inbox` is drained only by this planner.
    pub fn new(
        robot: R,
        information: I,
        termination: T,
        config: &PlannerConfig,
        flags: Arc<ControlFlags>,
        inbox: CommandInbox,
    ) -> Self {
        let (weights, missing) = config.utility_weights();
        for metric in missing {
            warn!(metric, "no weight configured for information metric, using 0");
        }
        let metric_names = config.metric_names();
        Self {
            robot,
            information,
            termination,
            desk: CommandDesk {
                inbox,
                flags: Arc::clone(&flags),
                data_dir: config.data_dir(),
                written: Vec::new(),
            },
            flags,
            weights,
            table: PlanningTable::with_metrics(&metric_names),
            metric_names,
            ray: config.ray,
            timing: config.timing.clone(),
            view_space: ViewSpace::default(),
            current_view: None,
            state: PlannerState::WaitingForStart,
            iterations: 0,
        }
    }

    pub fn state(&self) -> PlannerState {
        self.state
    }

    pub fn table(&self) -> &PlanningTable {
        &self.table
    }

    pub fn view_space(&self) -> &ViewSpace {
        &self.view_space
    }

    pub fn current_view(&self) -> Option<&View> {
        self.current_view.as_ref()
    }

    /// Files written on PRINT_DATA requests, oldest first.
    pub fn printed_data_files(&self) -> &[PathBuf] {
        &self.desk.written
    }

    /// Run the session to completion and flush the planning table.
    ///
    /// Returns [`NoViableViewError`] (inside `anyhow::Error`) when a round has
    /// no viable candidate; the table is flushed before the error is returned.
    #[instrument(skip_all)]
    pub fn run(&mut self) -> Result<PlanOutcome> {
        let result = self.drive();
        self.state = PlannerState::Terminated;
        let flushed = write_planning_data(&self.desk.data_dir, &self.table);
        match (result, flushed) {
            (Ok(stop), Ok(data_file)) => {
                info!(iterations = self.iterations, ?stop, "planning finished");
                Ok(PlanOutcome {
                    iterations: self.iterations,
                    stop,
                    data_file,
                })
            }
            (Ok(_), Err(flush_err)) => Err(flush_err),
            (Err(err), Ok(_)) => Err(err),
            (Err(err), Err(flush_err)) => {
                error!(err = %format!("{flush_err:#}"), "failed to flush planning data");
                Err(err)
            }
        }
    }

    fn drive(&mut self) -> Result<PlanStop> {
        if !self.wait_for_start() {
            return Ok(PlanStop::StoppedBeforeStart);
        }
        self.acquire_view_space()?;
        self.acquire_current_view()?;
        self.retrieve_baseline_data();
        self.state = PlannerState::Planning;

        loop {
            if self.plan_round()? == RoundOutcome::Terminate {
                return Ok(PlanStop::TerminationCriterion);
            }
            self.desk.pump(&self.table);
            if self.flags.stop_requested() {
                info!(iterations = self.iterations, "stop requested");
                return Ok(PlanStop::StopRequested);
            }
        }
    }

    /// Block until START. Returns false if a stop arrives with no START
    /// before it. A stop that follows START is left for the end of round 1.
    fn wait_for_start(&mut self) -> bool {
        self.state = PlannerState::WaitingForStart;
        info!("waiting for START");
        loop {
            let saw_start = self.desk.pump(&self.table);
            if saw_start || self.flags.started() {
                info!("planning started");
                return true;
            }
            if self.flags.stop_requested() {
                info!("stop requested before START");
                return false;
            }
            thread::sleep(self.timing.startup_poll());
        }
    }

    fn acquire_view_space(&mut self) -> Result<()> {
        self.state = PlannerState::AcquiringViewSpace;
        let policy = RetryPolicy::until_success(self.timing.startup_poll());
        let robot = &self.robot;
        let desk = &mut self.desk;
        let table = &self.table;
        let view_space = retry_until_accepted(
            "view space",
            &policy,
            &self.flags,
            || robot.view_space(),
            |_| true,
            || {
                desk.pump(table);
            },
        )
        .completed()
        .ok_or_else(|| anyhow!("view space service never replied"))?;
        info!(views = view_space.len(), "view space received");
        self.view_space.replace(view_space);
        Ok(())
    }

    fn acquire_current_view(&mut self) -> Result<()> {
        self.state = PlannerState::AcquiringCurrentView;
        let policy = RetryPolicy::until_success(self.timing.startup_poll());
        let robot = &self.robot;
        let desk = &mut self.desk;
        let table = &self.table;
        let view = retry_until_accepted(
            "current view",
            &policy,
            &self.flags,
            || robot.current_view(),
            |_| true,
            || {
                desk.pump(table);
            },
        )
        .completed()
        .ok_or_else(|| anyhow!("current view service never replied"))?;
        info!(view = %view.id, "current view received");
        self.current_view = Some(view);
        Ok(())
    }

    fn retrieve_baseline_data(&mut self) {
        let policy = RetryPolicy::abortable(self.timing.retrieve_retry());
        let robot = &self.robot;
        let desk = &mut self.desk;
        let table = &self.table;
        let outcome = retry_until_accepted(
            "retrieve data",
            &policy,
            &self.flags,
            || robot.retrieve_data(),
            |status| *status == ReceiveStatus::Received,
            || {
                desk.pump(table);
            },
        );
        match outcome {
            RetryOutcome::Completed { attempts, .. } => info!(attempts, "data received"),
            RetryOutcome::Aborted { attempts } | RetryOutcome::Exhausted { attempts } => {
                warn!(attempts, "data retrieval abandoned, planning on possibly stale data");
            }
        }
    }

    /// Move to `target`. After an abandoned move the robot position is unknown,
    /// so the current view is fetched again.
    fn move_to_view(&mut self, target: View) -> Result<()> {
        let policy = RetryPolicy::abortable(self.timing.move_retry());
        let robot = &self.robot;
        let desk = &mut self.desk;
        let table = &self.table;
        let outcome = retry_until_accepted(
            "move",
            &policy,
            &self.flags,
            || robot.move_to(&target),
            |moved| *moved,
            || {
                desk.pump(table);
            },
        );
        match outcome {
            RetryOutcome::Completed { attempts, .. } => {
                info!(view = %target.id, attempts, "moved to view");
                self.current_view = Some(target);
                Ok(())
            }
            RetryOutcome::Aborted { attempts } | RetryOutcome::Exhausted { attempts } => {
                warn!(view = %target.id, attempts, "move abandoned, re-acquiring current view");
                self.acquire_current_view()?;
                self.state = PlannerState::Planning;
                Ok(())
            }
        }
    }

    /// Drain commands and, while paused, keep draining until resumed.
    fn pause_checkpoint(&mut self, phase: &'static str) {
        self.desk.pump(&self.table);
        if !self.flags.paused() {
            return;
        }
        info!(phase, "paused, waiting for START");
        while self.flags.paused() {
            thread::sleep(self.timing.pause_poll());
            self.desk.pump(&self.table);
        }
        info!(phase, "resumed");
    }

    fn plan_round(&mut self) -> Result<RoundOutcome> {
        let iteration = self.iterations + 1;
        self.pause_checkpoint("candidate filtering");

        if self.flags.take_reinit() {
            info!("reinit requested, re-acquiring view space and current view");
            self.acquire_view_space()?;
            self.acquire_current_view()?;
            self.state = PlannerState::Planning;
        }

        let current = self
            .current_view
            .ok_or_else(|| anyhow!("current view not acquired"))?;
        let mut candidates = self.evaluate_costs(&current);

        self.pause_checkpoint("information gain");
        self.evaluate_information(&mut candidates);

        let returns: Vec<Option<f64>> = candidates
            .iter()
            .map(|candidate| self.candidate_return(candidate))
            .collect();
        let Some(selection) = select_best(&returns) else {
            error!(iteration, considered = candidates.len(), "no viable candidate view");
            return Err(NoViableViewError {
                iteration,
                considered: candidates.len(),
            }
            .into());
        };

        let chosen = &candidates[selection.position];
        let next_view = chosen.view;
        let cost = chosen
            .cost
            .ok_or_else(|| anyhow!("selected view {} has no usable cost", next_view.id))?;
        let information = chosen.information.clone().unwrap_or_default();

        let report =
            self.table
                .record_iteration(&next_view, &selection.summary, cost, &information, &[]);
        if report.dropped_information > 0 {
            warn!(
                dropped = report.dropped_information,
                metrics = self.metric_names.len(),
                "information vector longer than metric list, extra values not recorded"
            );
        }
        self.iterations = iteration;
        info!(
            iteration,
            view = %next_view.id,
            return_value = selection.summary.best_return,
            winning_margin = selection.summary.winning_margin,
            cost,
            "next best view selected"
        );

        let input = TerminationInput {
            iteration,
            summary: &selection.summary,
            cost,
            information: &information,
        };
        if self.termination.should_terminate(&input) {
            info!(iteration, "termination criterion met");
            return Ok(RoundOutcome::Terminate);
        }

        self.move_to_view(next_view)?;
        self.retrieve_baseline_data();
        Ok(RoundOutcome::Continue)
    }

    /// Cost of reaching every good view. Views with a failed or exceptional
    /// cost are marked bad and stay excluded until the view space is replaced.
    fn evaluate_costs(&mut self, current: &View) -> Vec<Candidate> {
        let indices = self.view_space.good_indices();
        let mut candidates = Vec::with_capacity(indices.len());
        for index in indices {
            let Some(view) = self.view_space.view(index).copied() else {
                continue;
            };
            let cost = match self.robot.movement_cost(current, &view) {
                Ok(reply) => {
                    let usable = reply.usable();
                    if usable.is_none() {
                        debug!(view = %view.id, ?reply, "cost not usable, marking view bad");
                    }
                    usable
                }
                Err(err) => {
                    warn!(view = %view.id, %err, "movement cost failed, marking view bad");
                    None
                }
            };
            if cost.is_none() {
                self.view_space.mark_bad(view.id);
            }
            candidates.push(Candidate {
                view,
                cost,
                information: None,
            });
        }
        let viable = candidates.iter().filter(|c| c.cost.is_some()).count();
        info!(candidates = candidates.len(), viable, "movement costs evaluated");
        candidates
    }

    /// Information gain of every cost-viable candidate, one pose per request.
    fn evaluate_information(&self, candidates: &mut [Candidate]) {
        for candidate in candidates.iter_mut().filter(|c| c.cost.is_some()) {
            let poses = [candidate.view.pose];
            let request = InformationRequest {
                poses: &poses,
                metric_names: &self.metric_names,
                ray: &self.ray,
            };
            match self.information.information_gain(&request) {
                Ok(values) => candidate.information = Some(values),
                Err(err) => {
                    warn!(view = %candidate.view.id, %err, "information gain failed, using cost only");
                }
            }
        }
    }

    fn candidate_return(&self, candidate: &Candidate) -> Option<f64> {
        let cost = candidate.cost?;
        let view_return = compute_return(cost, candidate.information.as_deref(), &self.weights);
        if let Some(mismatch) = view_return.mismatch {
            error!(
                view = %candidate.view.id,
                weights = mismatch.weights,
                values = mismatch.values,
                "more information values than weights, using cost only"
            );
        }
        Some(view_return.value)
    }
}

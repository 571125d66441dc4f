//! Test-only service doubles and fixtures for driving the planning loop.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::path::Path;

use anyhow::{Result, bail};
use tempfile::TempDir;

use crate::core::types::{METRIC_NAMES, MovementCost, Pose, ReceiveStatus, View, ViewId};
use crate::core::view_space::ViewSpace;
use crate::io::capabilities::{
    InformationRequest, InformationService, RobotInterface, ServiceError, ServiceResult,
};
use crate::io::commands::CommandSender;
use crate::io::config::{MetricConfig, PlannerConfig, TimingConfig};

/// View `id` at `(x, 0, 0)` with identity orientation.
pub fn view(id: u64, x: f64) -> View {
    View::new(ViewId(id), Pose::at(x, 0.0, 0.0))
}

/// Config that writes into `data_dir`, polls without delay, and weights only
/// the first metric (`NrOfUnknownVoxels`) with 1.0.
pub fn fast_config(data_dir: &Path) -> PlannerConfig {
    let mut config = PlannerConfig::template();
    config.data_folder = Some(data_dir.to_path_buf());
    config.timing = TimingConfig {
        startup_poll_ms: 1,
        retrieve_retry_ms: 0,
        move_retry_ms: 0,
        pause_poll_ms: 1,
    };
    config
        .information_metric
        .insert(METRIC_NAMES[0].to_string(), MetricConfig { weight: 1.0 });
    config
}

/// [`fast_config`] inside a fresh temporary directory.
pub fn temp_config() -> Result<(TempDir, PlannerConfig)> {
    let temp = tempfile::tempdir()?;
    let config = fast_config(temp.path());
    Ok((temp, config))
}

/// Robot operations, for call counting and command injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RobotOp {
    ViewSpace,
    CurrentView,
    RetrieveData,
    MovementCost,
    MoveTo,
}

/// One recorded robot call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RobotCall {
    ViewSpace,
    CurrentView,
    RetrieveData,
    MovementCost { from: ViewId, to: ViewId },
    MoveTo(ViewId),
}

impl RobotCall {
    pub fn op(&self) -> RobotOp {
        match self {
            RobotCall::ViewSpace => RobotOp::ViewSpace,
            RobotCall::CurrentView => RobotOp::CurrentView,
            RobotCall::RetrieveData => RobotOp::RetrieveData,
            RobotCall::MovementCost { .. } => RobotOp::MovementCost,
            RobotCall::MoveTo(_) => RobotOp::MoveTo,
        }
    }
}

#[derive(Debug)]
struct Trigger {
    op: RobotOp,
    nth: usize,
    token: String,
    fired: bool,
}

/// Scripted [`RobotInterface`].
///
/// Without a script every call succeeds: the view space is the configured view
/// list, the current view is the start view, data is RECEIVED, moves succeed,
/// and the cost of a move is the Euclidean distance between the two positions.
/// Queued replies and per-view costs override those defaults. `send_on` pushes
/// a command token while the N-th call of an operation is in flight.
#[derive(Debug)]
pub struct ScriptedRobot {
    start_view: View,
    views: Vec<View>,
    costs: HashMap<ViewId, MovementCost>,
    view_space_failures: Cell<u32>,
    current_view_failures: Cell<u32>,
    retrieve_replies: RefCell<VecDeque<ServiceResult<ReceiveStatus>>>,
    move_replies: RefCell<VecDeque<ServiceResult<bool>>>,
    commands: Option<CommandSender>,
    triggers: RefCell<Vec<Trigger>>,
    calls: RefCell<Vec<RobotCall>>,
}

impl ScriptedRobot {
    pub fn new(start_view: View, views: Vec<View>) -> Self {
        Self {
            start_view,
            views,
            costs: HashMap::new(),
            view_space_failures: Cell::new(0),
            current_view_failures: Cell::new(0),
            retrieve_replies: RefCell::new(VecDeque::new()),
            move_replies: RefCell::new(VecDeque::new()),
            commands: None,
            triggers: RefCell::new(Vec::new()),
            calls: RefCell::new(Vec::new()),
        }
    }

    /// Cost reported for any move to view `id`.
    pub fn with_cost(mut self, id: u64, cost: MovementCost) -> Self {
        self.costs.insert(ViewId(id), cost);
        self
    }

    /// The first `n` view space requests fail as unavailable.
    pub fn failing_view_space(self, n: u32) -> Self {
        self.view_space_failures.set(n);
        self
    }

    /// The first `n` current view requests fail as unavailable.
    pub fn failing_current_view(self, n: u32) -> Self {
        self.current_view_failures.set(n);
        self
    }

    pub fn with_retrieve_replies(self, replies: Vec<ServiceResult<ReceiveStatus>>) -> Self {
        self.retrieve_replies.borrow_mut().extend(replies);
        self
    }

    pub fn with_move_replies(self, replies: Vec<ServiceResult<bool>>) -> Self {
        self.move_replies.borrow_mut().extend(replies);
        self
    }

    /// Channel used by `send_on`.
    pub fn with_commands(mut self, sender: CommandSender) -> Self {
        self.commands = Some(sender);
        self
    }

    /// Send `token` during the `nth` (1-based) call of `op`.
    pub fn send_on(self, op: RobotOp, nth: usize, token: &str) -> Self {
        self.triggers.borrow_mut().push(Trigger {
            op,
            nth,
            token: token.to_string(),
            fired: false,
        });
        self
    }

    pub fn calls(&self) -> Vec<RobotCall> {
        self.calls.borrow().clone()
    }

    pub fn count(&self, op: RobotOp) -> usize {
        self.calls.borrow().iter().filter(|call| call.op() == op).count()
    }

    /// Targets of the movement cost calls, in call order.
    pub fn cost_targets(&self) -> Vec<ViewId> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|call| match call {
                RobotCall::MovementCost { to, .. } => Some(*to),
                _ => None,
            })
            .collect()
    }

    /// Fail if scripted replies or command triggers were left unused.
    pub fn assert_drained(&self) -> Result<()> {
        let retrieve = self.retrieve_replies.borrow().len();
        let moves = self.move_replies.borrow().len();
        let pending: Vec<String> = self
            .triggers
            .borrow()
            .iter()
            .filter(|trigger| !trigger.fired)
            .map(|trigger| format!("{} on {:?} #{}", trigger.token, trigger.op, trigger.nth))
            .collect();
        if retrieve > 0 || moves > 0 || !pending.is_empty() {
            bail!(
                "scripted robot not drained: {retrieve} retrieve replies, {moves} move replies, triggers [{}]",
                pending.join(", ")
            );
        }
        Ok(())
    }

    fn record(&self, call: RobotCall) {
        self.calls.borrow_mut().push(call);
        let op = call.op();
        let count = self.count(op);
        for trigger in &mut *self.triggers.borrow_mut() {
            if trigger.fired || trigger.op != op || trigger.nth != count {
                continue;
            }
            let sender = self
                .commands
                .as_ref()
                .expect("send_on requires with_commands");
            sender.send(trigger.token.as_str());
            trigger.fired = true;
        }
    }
}

fn take_failure(failures: &Cell<u32>) -> bool {
    let left = failures.get();
    if left == 0 {
        return false;
    }
    failures.set(left - 1);
    true
}

impl RobotInterface for ScriptedRobot {
    fn view_space(&self) -> ServiceResult<ViewSpace> {
        self.record(RobotCall::ViewSpace);
        if take_failure(&self.view_space_failures) {
            return Err(ServiceError::unavailable("view space not ready"));
        }
        Ok(ViewSpace::new(self.views.clone()))
    }

    fn current_view(&self) -> ServiceResult<View> {
        self.record(RobotCall::CurrentView);
        if take_failure(&self.current_view_failures) {
            return Err(ServiceError::unavailable("current view not ready"));
        }
        Ok(self.start_view)
    }

    fn retrieve_data(&self) -> ServiceResult<ReceiveStatus> {
        self.record(RobotCall::RetrieveData);
        self.retrieve_replies
            .borrow_mut()
            .pop_front()
            .unwrap_or(Ok(ReceiveStatus::Received))
    }

    fn movement_cost(&self, from: &View, to: &View) -> ServiceResult<MovementCost> {
        self.record(RobotCall::MovementCost {
            from: from.id,
            to: to.id,
        });
        Ok(self.costs.get(&to.id).copied().unwrap_or_else(|| {
            MovementCost::Cost((to.pose.position - from.pose.position).norm())
        }))
    }

    fn move_to(&self, target: &View) -> ServiceResult<bool> {
        self.record(RobotCall::MoveTo(target.id));
        self.move_replies.borrow_mut().pop_front().unwrap_or(Ok(true))
    }
}

type InformationReply = Box<dyn Fn(&Pose) -> ServiceResult<Vec<f64>>>;

/// Scripted [`InformationService`] answering from a function of the pose.
pub struct ScriptedInformation {
    reply: InformationReply,
    calls: RefCell<Vec<Pose>>,
}

impl ScriptedInformation {
    pub fn from_fn<F>(reply: F) -> Self
    where
        F: Fn(&Pose) -> ServiceResult<Vec<f64>> + 'static,
    {
        Self {
            reply: Box::new(reply),
            calls: RefCell::new(Vec::new()),
        }
    }

    /// Same vector for every pose.
    pub fn constant(values: Vec<f64>) -> Self {
        Self::from_fn(move |_| Ok(values.clone()))
    }

    /// Poses requested so far, in call order.
    pub fn calls(&self) -> Vec<Pose> {
        self.calls.borrow().clone()
    }
}

impl InformationService for ScriptedInformation {
    fn information_gain(&self, request: &InformationRequest<'_>) -> ServiceResult<Vec<f64>> {
        let [pose] = request.poses else {
            return Err(ServiceError::malformed(format!(
                "expected a single pose, got {}",
                request.poses.len()
            )));
        };
        self.calls.borrow_mut().push(*pose);
        (self.reply)(pose)
    }
}

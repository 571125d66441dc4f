//! Multi-round planning scenarios against scripted services.
//!
//! Each test scripts the robot and information service, queues operator
//! commands (some injected while a given robot call is in flight), runs the
//! planner to completion, and checks the recorded table and service traffic.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use planner::core::control::ControlFlags;
use planner::core::termination::{IterationLimit, NeverTerminate, TerminationCriterion};
use planner::core::types::{CostException, MovementCost, ReceiveStatus, ViewId};
use planner::io::capabilities::ServiceError;
use planner::io::commands::{CommandInbox, command_channel};
use planner::io::config::PlannerConfig;
use planner::planning::{NoViableViewError, PlanStop, ViewPlanner};
use planner::test_support::{RobotOp, ScriptedInformation, ScriptedRobot, temp_config, view};

fn build_planner<'a, T: TerminationCriterion>(
    robot: &'a ScriptedRobot,
    information: &'a ScriptedInformation,
    termination: T,
    config: &PlannerConfig,
    inbox: CommandInbox,
) -> ViewPlanner<&'a ScriptedRobot, &'a ScriptedInformation, T> {
    ViewPlanner::new(
        robot,
        information,
        termination,
        config,
        Arc::new(ControlFlags::new()),
        inbox,
    )
}

fn data_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .expect("read data dir")
        .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with("planning_data") && name.ends_with(".data"))
        .collect();
    names.sort();
    names
}

#[test]
fn best_of_two_views_wins_by_nine() {
    let (temp, config) = temp_config().expect("config");
    let (sender, inbox) = command_channel();
    let robot = ScriptedRobot::new(view(0, 0.0), vec![view(1, 1.0), view(2, 2.0)])
        .with_cost(1, MovementCost::Cost(1.0))
        .with_cost(2, MovementCost::Cost(2.0));
    let information = ScriptedInformation::from_fn(|pose| Ok(vec![pose.position.x * 10.0]));
    sender.send("START");

    let outcome = build_planner(&robot, &information, IterationLimit(1), &config, inbox)
        .run()
        .expect("run");

    assert_eq!(outcome.stop, PlanStop::TerminationCriterion);
    let contents = fs::read_to_string(&outcome.data_file).expect("read data");
    let mut lines = contents.lines();
    let header: Vec<&str> = lines.next().expect("header").split(' ').collect();
    let row: Vec<f64> = lines
        .next()
        .expect("row")
        .split(' ')
        .map(|value| value.parse().expect("number"))
        .collect();
    assert!(lines.next().is_none());
    let cell = |name: &str| row[header.iter().position(|column| *column == name).expect("column")];
    assert_eq!(cell("pos_x"), 2.0);
    assert_eq!(cell("return_value"), 18.0);
    assert_eq!(cell("winning_margin"), 9.0);
    assert_eq!(cell("cost"), 2.0);
    assert!(outcome.data_file.starts_with(temp.path()));
}

#[test]
fn stop_before_second_retrieval_records_one_row() {
    let (temp, config) = temp_config().expect("config");
    let (sender, inbox) = command_channel();
    let robot = ScriptedRobot::new(view(0, 0.0), vec![view(1, 1.0), view(2, 2.0)])
        .with_commands(sender.clone())
        .send_on(RobotOp::RetrieveData, 2, "STOP_AND_PRINT");
    let information = ScriptedInformation::constant(vec![1.0]);
    sender.send("START");

    let mut planner = build_planner(&robot, &information, NeverTerminate, &config, inbox);
    let outcome = planner.run().expect("run");

    assert_eq!(outcome.stop, PlanStop::StopRequested);
    assert_eq!(outcome.iterations, 1);
    assert_eq!(planner.table().len(), 1);
    assert_eq!(robot.count(RobotOp::RetrieveData), 2);
    assert_eq!(robot.count(RobotOp::MoveTo), 1);
    let contents = fs::read_to_string(&outcome.data_file).expect("read data");
    assert_eq!(contents.lines().count(), 2);
    assert_eq!(data_files(temp.path()).len(), 1);
    robot.assert_drained().expect("drained");
}

#[test]
fn start_then_stop_queued_together_records_one_row() {
    let (temp, config) = temp_config().expect("config");
    let (sender, inbox) = command_channel();
    let robot = ScriptedRobot::new(view(0, 0.0), vec![view(1, 1.0), view(2, 2.0)]);
    let information = ScriptedInformation::constant(vec![1.0]);
    sender.send("START");
    sender.send("STOP_AND_PRINT");

    let mut planner = build_planner(&robot, &information, NeverTerminate, &config, inbox);
    let outcome = planner.run().expect("run");

    assert_eq!(outcome.stop, PlanStop::StopRequested);
    assert_eq!(outcome.iterations, 1);
    assert_eq!(planner.table().len(), 1);
    assert_eq!(robot.count(RobotOp::RetrieveData), 2);
    let contents = fs::read_to_string(&outcome.data_file).expect("read data");
    assert_eq!(contents.lines().count(), 2);
    assert_eq!(data_files(temp.path()).len(), 1);
}

#[test]
fn cost_excluded_view_stays_excluded() {
    let (_temp, config) = temp_config().expect("config");
    let (sender, inbox) = command_channel();
    let robot = ScriptedRobot::new(
        view(0, 0.0),
        vec![view(1, 1.0), view(2, 2.0), view(3, 3.0)],
    )
    .with_cost(2, MovementCost::Exception(CostException::Unreachable))
    .with_commands(sender.clone())
    .send_on(RobotOp::RetrieveData, 3, "STOP_AND_PRINT");
    let information = ScriptedInformation::constant(vec![1.0]);
    sender.send("START");

    let mut planner = build_planner(&robot, &information, NeverTerminate, &config, inbox);
    let outcome = planner.run().expect("run");

    assert_eq!(outcome.iterations, 2);
    assert_eq!(
        robot.cost_targets(),
        vec![ViewId(1), ViewId(2), ViewId(3), ViewId(1), ViewId(3)]
    );
    assert!(planner.view_space().is_bad(ViewId(2)));
    assert_eq!(information.calls().len(), 4);
}

#[test]
fn reinit_restores_excluded_views() {
    let (_temp, config) = temp_config().expect("config");
    let (sender, inbox) = command_channel();
    let robot = ScriptedRobot::new(
        view(0, 0.0),
        vec![view(1, 1.0), view(2, 2.0), view(3, 3.0)],
    )
    .with_cost(2, MovementCost::Exception(CostException::Timeout))
    .with_commands(sender.clone())
    .send_on(RobotOp::RetrieveData, 2, "REINIT")
    .send_on(RobotOp::RetrieveData, 3, "STOP_AND_PRINT");
    let information = ScriptedInformation::constant(vec![1.0]);
    sender.send("START");

    let outcome = build_planner(&robot, &information, NeverTerminate, &config, inbox)
        .run()
        .expect("run");

    assert_eq!(outcome.iterations, 2);
    assert_eq!(robot.count(RobotOp::ViewSpace), 2);
    assert_eq!(robot.count(RobotOp::CurrentView), 2);
    assert_eq!(
        robot.cost_targets(),
        vec![
            ViewId(1),
            ViewId(2),
            ViewId(3),
            ViewId(1),
            ViewId(2),
            ViewId(3)
        ]
    );
}

#[test]
fn pause_suspends_round_until_start() {
    let (_temp, config) = temp_config().expect("config");
    let (sender, inbox) = command_channel();
    // Round 1 costs views 1 and 2; the third cost call belongs to round 2.
    let robot = ScriptedRobot::new(view(0, 0.0), vec![view(1, 1.0), view(2, 2.0)])
        .with_commands(sender.clone())
        .send_on(RobotOp::MovementCost, 3, "PAUSE");
    let resumed = Arc::new(AtomicBool::new(false));
    let seen = Arc::clone(&resumed);
    let information = ScriptedInformation::from_fn(move |_| {
        Ok(vec![if seen.load(Ordering::SeqCst) { 1.0 } else { -1.0 }])
    });
    sender.send("START");

    let resume_sender = sender.clone();
    let resume_flag = Arc::clone(&resumed);
    let resumer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(200));
        resume_flag.store(true, Ordering::SeqCst);
        resume_sender.send("START");
    });

    let mut planner = build_planner(&robot, &information, IterationLimit(2), &config, inbox);
    let outcome = planner.run().expect("run");
    resumer.join().expect("resumer");

    assert_eq!(outcome.iterations, 2);
    let table = planner.table();
    assert_eq!(table.value(0, "NrOfUnknownVoxels"), Some(-1.0));
    assert_eq!(table.value(1, "NrOfUnknownVoxels"), Some(1.0));
    assert_eq!(robot.count(RobotOp::MovementCost), 4);
}

#[test]
fn no_viable_view_flushes_then_reports() {
    let (temp, config) = temp_config().expect("config");
    let (sender, inbox) = command_channel();
    let robot = ScriptedRobot::new(view(0, 0.0), vec![view(1, 1.0), view(2, 2.0)])
        .with_cost(1, MovementCost::Exception(CostException::Other))
        .with_cost(2, MovementCost::Exception(CostException::Unreachable));
    let information = ScriptedInformation::constant(vec![1.0]);
    sender.send("START");

    let err = build_planner(&robot, &information, NeverTerminate, &config, inbox)
        .run()
        .unwrap_err();

    let no_view = err
        .downcast_ref::<NoViableViewError>()
        .expect("no viable view error");
    assert_eq!(no_view.iteration, 1);
    assert_eq!(no_view.considered, 2);
    let files = data_files(temp.path());
    assert_eq!(files.len(), 1);
    let contents = fs::read_to_string(temp.path().join(&files[0])).expect("read data");
    assert_eq!(contents.lines().count(), 1);
    assert_eq!(robot.count(RobotOp::MoveTo), 0);
}

#[test]
fn print_data_writes_an_extra_file() {
    let (temp, config) = temp_config().expect("config");
    let (sender, inbox) = command_channel();
    let robot = ScriptedRobot::new(view(0, 0.0), vec![view(1, 1.0), view(2, 2.0)])
        .with_commands(sender.clone())
        .send_on(RobotOp::MoveTo, 1, "PRINT_DATA")
        .send_on(RobotOp::RetrieveData, 3, "STOP_AND_PRINT");
    let information = ScriptedInformation::constant(vec![1.0]);
    sender.send("START");

    let mut planner = build_planner(&robot, &information, NeverTerminate, &config, inbox);
    let outcome = planner.run().expect("run");

    assert_eq!(outcome.iterations, 2);
    assert_eq!(data_files(temp.path()).len(), 2);
    assert_eq!(planner.printed_data_files().len(), 1);
}

#[test]
fn startup_services_are_polled_until_ready() {
    let (_temp, config) = temp_config().expect("config");
    let (sender, inbox) = command_channel();
    let robot = ScriptedRobot::new(view(0, 0.0), vec![view(1, 1.0)])
        .failing_view_space(3)
        .failing_current_view(2)
        .with_retrieve_replies(vec![
            Ok(ReceiveStatus::ReceptionFailed),
            Err(ServiceError::unavailable("sensor offline")),
            Ok(ReceiveStatus::Received),
        ]);
    let information = ScriptedInformation::constant(vec![1.0]);
    sender.send("START");

    let outcome = build_planner(&robot, &information, IterationLimit(1), &config, inbox)
        .run()
        .expect("run");

    assert_eq!(outcome.iterations, 1);
    assert_eq!(robot.count(RobotOp::ViewSpace), 4);
    assert_eq!(robot.count(RobotOp::CurrentView), 3);
    assert_eq!(robot.count(RobotOp::RetrieveData), 3);
    robot.assert_drained().expect("drained");
}

#[test]
fn abort_cancels_only_the_blocked_retrieval() {
    let (_temp, config) = temp_config().expect("config");
    let (sender, inbox) = command_channel();
    let robot = ScriptedRobot::new(view(0, 0.0), vec![view(1, 1.0), view(2, 2.0)])
        .with_retrieve_replies(vec![
            Ok(ReceiveStatus::ReceptionFailed),
            Ok(ReceiveStatus::ReceptionFailed),
            Ok(ReceiveStatus::ReceptionFailed),
            Ok(ReceiveStatus::Received),
        ])
        .with_commands(sender.clone())
        .send_on(RobotOp::RetrieveData, 2, "ABORT_LOOP");
    let information = ScriptedInformation::constant(vec![1.0]);
    sender.send("START");

    let outcome = build_planner(&robot, &information, IterationLimit(2), &config, inbox)
        .run()
        .expect("run");

    // Baseline retrieval gives up after attempt 2; the retrieval after the
    // first move retries through the remaining failure without aborting.
    assert_eq!(outcome.iterations, 2);
    assert_eq!(robot.count(RobotOp::RetrieveData), 4);
    robot.assert_drained().expect("drained");
}

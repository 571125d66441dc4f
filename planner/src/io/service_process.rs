//! Service clients backed by external commands.
//!
//! Each call spawns the configured command, writes one JSON request to its
//! stdin and reads one JSON reply from its stdout. Replies are checked against
//! the embedded JSON Schemas before they are deserialized, so a bridge that
//! drifts from the wire format fails loudly as [`ServiceErrorKind::Malformed`]
//! instead of feeding the loop half-parsed data.
//!
//! [`ServiceErrorKind::Malformed`]: crate::io::capabilities::ServiceErrorKind::Malformed

use std::time::Duration;

use anyhow::{Result, anyhow};
use jsonschema::{Validator, validator_for};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::core::types::{
    CostException, MovementCost, PLANNING_FRAME, Pose, RayParams, ReceiveStatus, View, ViewId,
};
use crate::core::view_space::ViewSpace;
use crate::io::capabilities::{
    InformationRequest, InformationService, RobotInterface, ServiceError, ServiceResult,
};
use crate::io::config::ServicesConfig;
use crate::io::process::run_with_timeout;

const VIEW_SPACE_SCHEMA: &str = include_str!("../../schemas/services/view_space.schema.json");
const CURRENT_VIEW_SCHEMA: &str = include_str!("../../schemas/services/current_view.schema.json");
const RETRIEVE_DATA_SCHEMA: &str =
    include_str!("../../schemas/services/retrieve_data.schema.json");
const MOVEMENT_COST_SCHEMA: &str =
    include_str!("../../schemas/services/movement_cost.schema.json");
const MOVE_TO_SCHEMA: &str = include_str!("../../schemas/services/move_to.schema.json");
const INFORMATION_SCHEMA: &str = include_str!("../../schemas/services/information.schema.json");

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoseMsg {
    pub position: [f64; 3],
    /// Quaternion as `[x, y, z, w]`.
    pub orientation: [f64; 4],
}

impl From<&Pose> for PoseMsg {
    fn from(pose: &Pose) -> Self {
        Self {
            position: [pose.position.x, pose.position.y, pose.position.z],
            orientation: pose.orientation_xyzw(),
        }
    }
}

impl From<PoseMsg> for Pose {
    fn from(msg: PoseMsg) -> Self {
        Pose::from_parts(msg.position, msg.orientation)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewMsg {
    pub id: ViewId,
    pub pose: PoseMsg,
}

impl From<&View> for ViewMsg {
    fn from(view: &View) -> Self {
        Self {
            id: view.id,
            pose: PoseMsg::from(&view.pose),
        }
    }
}

impl From<ViewMsg> for View {
    fn from(msg: ViewMsg) -> Self {
        View::new(msg.id, msg.pose.into())
    }
}

#[derive(Debug, Serialize)]
struct FrameRequest<'a> {
    frame: &'a str,
}

#[derive(Debug, Serialize)]
struct MovementCostRequest<'a> {
    frame: &'a str,
    start_view: ViewMsg,
    target_view: ViewMsg,
    additional_information: bool,
}

#[derive(Debug, Serialize)]
struct MoveToRequest<'a> {
    frame: &'a str,
    target_view: ViewMsg,
}

#[derive(Debug, Serialize)]
struct InformationRequestMsg<'a> {
    frame: &'a str,
    poses: Vec<PoseMsg>,
    metric_names: &'a [String],
    ray: &'a RayParams,
}

#[derive(Debug, Deserialize)]
struct ViewSpaceReply {
    views: Vec<ViewMsg>,
}

#[derive(Debug, Deserialize)]
struct CurrentViewReply {
    view: ViewMsg,
}

#[derive(Debug, Deserialize)]
struct RetrieveDataReply {
    receive_status: ReceiveStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum CostExceptionMsg {
    None,
    Unreachable,
    Timeout,
    Other,
}

#[derive(Debug, Deserialize)]
struct MovementCostReply {
    #[serde(default)]
    cost: f64,
    exception: CostExceptionMsg,
}

impl From<MovementCostReply> for MovementCost {
    fn from(reply: MovementCostReply) -> Self {
        match reply.exception {
            CostExceptionMsg::None => MovementCost::Cost(reply.cost),
            CostExceptionMsg::Unreachable => MovementCost::Exception(CostException::Unreachable),
            CostExceptionMsg::Timeout => MovementCost::Exception(CostException::Timeout),
            CostExceptionMsg::Other => MovementCost::Exception(CostException::Other),
        }
    }
}

#[derive(Debug, Deserialize)]
struct MoveToReply {
    success: bool,
}

#[derive(Debug, Deserialize)]
struct InformationReply {
    values: Vec<f64>,
}

/// One external command plus the schema its replies must satisfy.
struct ServiceCommand {
    name: &'static str,
    argv: Vec<String>,
    schema: Validator,
}

impl ServiceCommand {
    fn new(name: &'static str, argv: &[String], schema: &str) -> Result<Self> {
        if argv.first().is_none_or(|program| program.trim().is_empty()) {
            return Err(anyhow!("services.{name} must be a non-empty array"));
        }
        let schema_value: Value = serde_json::from_str(schema)
            .map_err(|err| anyhow!("parse {name} reply schema: {err}"))?;
        let schema = validator_for(&schema_value)
            .map_err(|err| anyhow!("invalid {name} reply schema: {err}"))?;
        Ok(Self {
            name,
            argv: argv.to_vec(),
            schema,
        })
    }

    #[instrument(skip_all, fields(service = self.name))]
    fn call<Req: Serialize, Rep: DeserializeOwned>(
        &self,
        request: &Req,
        timeout: Duration,
        output_limit_bytes: usize,
    ) -> ServiceResult<Rep> {
        let payload = serde_json::to_vec(request)
            .map_err(|err| ServiceError::malformed(format!("encode {} request: {err}", self.name)))?;

        let output = run_with_timeout(&self.argv, &payload, timeout, output_limit_bytes)
            .map_err(|err| ServiceError::unavailable(format!("{}: {err:#}", self.name)))?;
        if output.timed_out {
            return Err(ServiceError::unavailable(format!(
                "{} timed out after {:?}",
                self.name, timeout
            )));
        }
        if !output.status.success() {
            return Err(ServiceError::unavailable(format!(
                "{} exited with status {:?}: {}",
                self.name,
                output.status.code(),
                output.stderr_tail()
            )));
        }

        let reply = decode_reply(&self.schema, &output.stdout)
            .map_err(|err| ServiceError::malformed(format!("{}: {err:#}", self.name)))?;
        debug!("service reply decoded");
        Ok(reply)
    }
}

/// Parse `stdout` as JSON, validate it against `schema`, then deserialize.
fn decode_reply<T: DeserializeOwned>(schema: &Validator, stdout: &[u8]) -> Result<T> {
    let value: Value =
        serde_json::from_slice(stdout).map_err(|err| anyhow!("parse reply json: {err}"))?;
    let messages: Vec<String> = schema
        .iter_errors(&value)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        return Err(anyhow!(
            "reply schema validation failed: {}",
            messages.join("; ")
        ));
    }
    serde_json::from_value(value).map_err(|err| anyhow!("deserialize reply: {err}"))
}

/// [`RobotInterface`] implemented by external commands.
pub struct ProcessRobotInterface {
    view_space: ServiceCommand,
    current_view: ServiceCommand,
    retrieve_data: ServiceCommand,
    movement_cost: ServiceCommand,
    move_to: ServiceCommand,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl ProcessRobotInterface {
    pub fn new(config: &ServicesConfig) -> Result<Self> {
        Ok(Self {
            view_space: ServiceCommand::new("view_space", &config.view_space, VIEW_SPACE_SCHEMA)?,
            current_view: ServiceCommand::new(
                "current_view",
                &config.current_view,
                CURRENT_VIEW_SCHEMA,
            )?,
            retrieve_data: ServiceCommand::new(
                "retrieve_data",
                &config.retrieve_data,
                RETRIEVE_DATA_SCHEMA,
            )?,
            movement_cost: ServiceCommand::new(
                "movement_cost",
                &config.movement_cost,
                MOVEMENT_COST_SCHEMA,
            )?,
            move_to: ServiceCommand::new("move_to", &config.move_to, MOVE_TO_SCHEMA)?,
            timeout: config.call_timeout(),
            output_limit_bytes: config.output_limit_bytes,
        })
    }

    fn frame() -> FrameRequest<'static> {
        FrameRequest {
            frame: PLANNING_FRAME,
        }
    }
}

impl RobotInterface for ProcessRobotInterface {
    fn view_space(&self) -> ServiceResult<ViewSpace> {
        let reply: ViewSpaceReply =
            self.view_space
                .call(&Self::frame(), self.timeout, self.output_limit_bytes)?;
        Ok(ViewSpace::new(
            reply.views.into_iter().map(View::from).collect(),
        ))
    }

    fn current_view(&self) -> ServiceResult<View> {
        let reply: CurrentViewReply =
            self.current_view
                .call(&Self::frame(), self.timeout, self.output_limit_bytes)?;
        Ok(reply.view.into())
    }

    fn retrieve_data(&self) -> ServiceResult<ReceiveStatus> {
        let reply: RetrieveDataReply =
            self.retrieve_data
                .call(&Self::frame(), self.timeout, self.output_limit_bytes)?;
        Ok(reply.receive_status)
    }

    fn movement_cost(&self, from: &View, to: &View) -> ServiceResult<MovementCost> {
        let request = MovementCostRequest {
            frame: PLANNING_FRAME,
            start_view: from.into(),
            target_view: to.into(),
            additional_information: true,
        };
        let reply: MovementCostReply =
            self.movement_cost
                .call(&request, self.timeout, self.output_limit_bytes)?;
        Ok(reply.into())
    }

    fn move_to(&self, target: &View) -> ServiceResult<bool> {
        let request = MoveToRequest {
            frame: PLANNING_FRAME,
            target_view: target.into(),
        };
        let reply: MoveToReply = self
            .move_to
            .call(&request, self.timeout, self.output_limit_bytes)?;
        Ok(reply.success)
    }
}

/// [`InformationService`] implemented by an external command.
pub struct ProcessInformationService {
    information: ServiceCommand,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl ProcessInformationService {
    pub fn new(config: &ServicesConfig) -> Result<Self> {
        Ok(Self {
            information: ServiceCommand::new(
                "information",
                &config.information,
                INFORMATION_SCHEMA,
            )?,
            timeout: config.call_timeout(),
            output_limit_bytes: config.output_limit_bytes,
        })
    }
}

impl InformationService for ProcessInformationService {
    fn information_gain(&self, request: &InformationRequest<'_>) -> ServiceResult<Vec<f64>> {
        let msg = InformationRequestMsg {
            frame: PLANNING_FRAME,
            poses: request.poses.iter().map(PoseMsg::from).collect(),
            metric_names: request.metric_names,
            ray: request.ray,
        };
        let reply: InformationReply =
            self.information
                .call(&msg, self.timeout, self.output_limit_bytes)?;
        Ok(reply.values)
    }
}

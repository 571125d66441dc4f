//! Service abstractions the planning loop depends on.
//!
//! [`RobotInterface`] and [`InformationService`] decouple the loop from the
//! transport that reaches the robot and the 3D model. Production code talks to
//! external processes (see [`crate::io::service_process`]); tests use scripted
//! doubles that return queued replies.

use std::fmt;

use crate::core::types::{MovementCost, Pose, RayParams, ReceiveStatus, View};
use crate::core::view_space::ViewSpace;

/// Why a service call produced no usable reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceErrorKind {
    /// The call did not complete (not reachable, timed out, exited non-zero).
    Unavailable,
    /// The call completed but its reply could not be decoded.
    Malformed,
}

/// Failure of a single service call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceError {
    pub kind: ServiceErrorKind,
    pub message: String,
}

impl ServiceError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: ServiceErrorKind::Unavailable,
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self {
            kind: ServiceErrorKind::Malformed,
            message: message.into(),
        }
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            ServiceErrorKind::Unavailable => "service unavailable",
            ServiceErrorKind::Malformed => "malformed service reply",
        };
        write!(f, "{kind}: {}", self.message)
    }
}

impl std::error::Error for ServiceError {}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Robot-side services: feasible views, motion cost, motion, and sensing.
pub trait RobotInterface {
    /// Feasible candidate views.
    fn view_space(&self) -> ServiceResult<ViewSpace>;

    /// View the sensor is currently at.
    fn current_view(&self) -> ServiceResult<View>;

    /// Trigger sensing at the current view and report whether data arrived.
    fn retrieve_data(&self) -> ServiceResult<ReceiveStatus>;

    /// Cost of moving from `from` to `to`.
    fn movement_cost(&self, from: &View, to: &View) -> ServiceResult<MovementCost>;

    /// Move to `target`. `Ok(false)` means the service ran but the motion failed.
    fn move_to(&self, target: &View) -> ServiceResult<bool>;
}

/// Parameters of an information gain request.
#[derive(Debug, Clone)]
pub struct InformationRequest<'a> {
    pub poses: &'a [Pose],
    pub metric_names: &'a [String],
    pub ray: &'a RayParams,
}

/// Model-side service estimating expected information per metric.
pub trait InformationService {
    /// Expected information for each pose in the batch, one value per metric in
    /// `request.metric_names` order.
    ///
    /// The planner only ever sends single-pose batches; the reply is the vector
    /// for that pose.
    fn information_gain(&self, request: &InformationRequest<'_>) -> ServiceResult<Vec<f64>>;
}

impl<T: RobotInterface + ?Sized> RobotInterface for &T {
    fn view_space(&self) -> ServiceResult<ViewSpace> {
        (**self).view_space()
    }

    fn current_view(&self) -> ServiceResult<View> {
        (**self).current_view()
    }

    fn retrieve_data(&self) -> ServiceResult<ReceiveStatus> {
        (**self).retrieve_data()
    }

    fn movement_cost(&self, from: &View, to: &View) -> ServiceResult<MovementCost> {
        (**self).movement_cost(from, to)
    }

    fn move_to(&self, target: &View) -> ServiceResult<bool> {
        (**self).move_to(target)
    }
}

impl<T: InformationService + ?Sized> InformationService for &T {
    fn information_gain(&self, request: &InformationRequest<'_>) -> ServiceResult<Vec<f64>> {
        (**self).information_gain(request)
    }
}

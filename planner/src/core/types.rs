//! Shared value types for the planning core.
//!
//! These types are the contract between the planning loop and the services it
//! calls. They carry no I/O and compare deterministically.

use std::fmt;

use nalgebra::{Quaternion, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// Information metrics requested from the information service, in request order.
///
/// Information vectors returned by the service follow this order, and the
/// configured metric weights are resolved against it.
pub const METRIC_NAMES: [&str; 9] = [
    "NrOfUnknownVoxels",
    "AverageUncertainty",
    "AverageEndPointUncertainty",
    "UnknownObjectSideFrontier",
    "UnknownObjectVolumeFrontier",
    "ClassicFrontier",
    "EndNodeOccupancySum",
    "TotalOccupancyCertainty",
    "TotalNrOfOccupieds",
];

/// Reference frame in which all poses are expressed.
pub const PLANNING_FRAME: &str = "dr_origin";

/// Position plus unit-quaternion orientation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vector3<f64>,
    pub orientation: UnitQuaternion<f64>,
}

impl Pose {
    pub fn new(position: Vector3<f64>, orientation: UnitQuaternion<f64>) -> Self {
        Self {
            position,
            orientation,
        }
    }

    /// Build a pose from `[x, y, z]` and an `[x, y, z, w]` quaternion.
    ///
    /// The quaternion is normalized; callers may pass slightly denormalized
    /// values received over the wire.
    pub fn from_parts(position: [f64; 3], orientation: [f64; 4]) -> Self {
        let [qx, qy, qz, qw] = orientation;
        Self {
            position: Vector3::new(position[0], position[1], position[2]),
            orientation: UnitQuaternion::from_quaternion(Quaternion::new(qw, qx, qy, qz)),
        }
    }

    /// Pose at `position` with identity orientation.
    pub fn at(x: f64, y: f64, z: f64) -> Self {
        Self::new(Vector3::new(x, y, z), UnitQuaternion::identity())
    }

    /// Orientation as `[x, y, z, w]`.
    pub fn orientation_xyzw(&self) -> [f64; 4] {
        let q = self.orientation.quaternion();
        [q.i, q.j, q.k, q.w]
    }

    /// `pos_x, pos_y, pos_z, rot_x, rot_y, rot_z, rot_w`, the order used by the
    /// planning table.
    pub fn components(&self) -> [f64; 7] {
        let [qx, qy, qz, qw] = self.orientation_xyzw();
        [
            self.position.x,
            self.position.y,
            self.position.z,
            qx,
            qy,
            qz,
            qw,
        ]
    }
}

/// Opaque view identifier assigned by the robot interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ViewId(pub u64);

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "view-{}", self.0)
    }
}

/// A candidate or current viewpoint.
///
/// Equality is by identifier only: two views with the same id are the same
/// view even if their poses were reported with different rounding.
#[derive(Debug, Clone, Copy)]
pub struct View {
    pub id: ViewId,
    pub pose: Pose,
}

impl View {
    pub fn new(id: ViewId, pose: Pose) -> Self {
        Self { id, pose }
    }
}

impl PartialEq for View {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for View {}

/// Reason a movement cost could not be computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CostException {
    /// No feasible motion reaches the target.
    Unreachable,
    /// The motion planner gave up before finding a solution.
    Timeout,
    Other,
}

/// Movement cost reported by the robot interface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MovementCost {
    /// Usable, non-negative cost.
    Cost(f64),
    /// Cost unusable; the target view is excluded.
    Exception(CostException),
}

impl MovementCost {
    /// Cost value if usable.
    ///
    /// Negative or non-finite values are treated as unusable even when the
    /// service did not flag them.
    pub fn usable(&self) -> Option<f64> {
        match *self {
            MovementCost::Cost(cost) if cost.is_finite() && cost >= 0.0 => Some(cost),
            _ => None,
        }
    }
}

/// Outcome of a data retrieval request. Only `Received` counts as success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReceiveStatus {
    Received,
    ReceptionFailed,
}

/// Fixed ray-casting parameters passed with every information request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RayParams {
    pub resolution_x: f64,
    pub resolution_y: f64,
    pub step_size: u32,
    /// Subwindow bounds in image pixels.
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
    /// Ray depth bounds in meters.
    pub min_depth: f64,
    pub max_depth: f64,
    pub occupied_passthrough_threshold: u32,
}

impl Default for RayParams {
    fn default() -> Self {
        // 188x120 px subwindow centred on (376, 240).
        let (center_x, center_y) = (376.0, 240.0);
        let (width, height) = (188.0, 120.0);
        Self {
            resolution_x: 0.5,
            resolution_y: 0.5,
            step_size: 2,
            min_x: center_x - width / 2.0,
            max_x: center_x + width / 2.0,
            min_y: center_y - height / 2.0,
            max_y: center_y + height / 2.0,
            min_depth: 0.05,
            max_depth: 1.5,
            occupied_passthrough_threshold: 0,
        }
    }
}

/// Return statistics for one planning round.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ReturnSummary {
    pub best_return: f64,
    /// Best minus second-best return; zero with fewer than two viable candidates.
    pub winning_margin: f64,
    pub mean: f64,
    pub stddev: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn views_compare_by_id_only() {
        let a = View::new(ViewId(1), Pose::at(0.0, 0.0, 0.0));
        let b = View::new(ViewId(1), Pose::at(5.0, 0.0, 0.0));
        let c = View::new(ViewId(2), Pose::at(0.0, 0.0, 0.0));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn pose_components_follow_table_order() {
        let pose = Pose::from_parts([1.0, 2.0, 3.0], [0.0, 0.0, 0.0, 2.0]);
        assert_eq!(pose.components(), [1.0, 2.0, 3.0, 0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn negative_cost_is_not_usable() {
        assert_eq!(MovementCost::Cost(2.5).usable(), Some(2.5));
        assert_eq!(MovementCost::Cost(-1.0).usable(), None);
        assert_eq!(
            MovementCost::Exception(CostException::Unreachable).usable(),
            None
        );
    }

    #[test]
    fn default_ray_window_is_centred() {
        let ray = RayParams::default();
        assert_eq!((ray.min_x, ray.max_x), (282.0, 470.0));
        assert_eq!((ray.min_y, ray.max_y), (180.0, 300.0));
    }
}

//! Vocabulary shared between the amalgamation server and its viewers:
//! the trajectory dataset model, view-update parameters, the group
//! display palette, and the byte-level wire format for streamed records.

pub mod palette;
pub mod wire;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound on the number of groups; group position doubles as the
/// bit position in a selection mask, so the mask width is the limit.
pub const MAX_GROUPS: usize = 32;

/// An integer position, either a raw dataset sample or a mapped
/// screen-space coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// An ordered path of recorded positions. Sample order is temporal and
/// the sequence is read-only once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trajectory {
    pub samples: Vec<Point>,
}

impl Trajectory {
    pub fn new(samples: Vec<Point>) -> Self {
        Self { samples }
    }
}

/// The full collection of trajectories, owned by the server for the
/// process lifetime and immutable after load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    pub trajectories: Vec<Trajectory>,
}

/// A named subset of trajectories, stored as indices into the dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
    pub members: Vec<usize>,
}

/// All groups, in palette/mask-bit order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupList {
    pub groups: Vec<Group>,
}

/// Whether the group at `index` is selected by `mask`. Group position
/// determines the bit position.
pub fn group_selected(mask: u32, index: usize) -> bool {
    index < MAX_GROUPS && mask & (1 << index) != 0
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ViewRequestError {
    #[error("view dimensions must be non-zero, got {0}x{1}")]
    ZeroView(i32, i32),
    #[error("frame rectangle is degenerate on the {0} axis")]
    DegenerateFrame(&'static str),
    #[error("resolution must be at least 1, got {0}")]
    BadResolution(i32),
}

/// One control update: the view size, the dataset rectangle mapped onto
/// it, the quantization grid size, and the group selection mask.
///
/// `frame_top` and `frame_bottom` define an arbitrary mapping rectangle;
/// neither axis ordering nor positive extent is required beyond being
/// non-degenerate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewRequest {
    pub view: Point,
    pub frame_top: Point,
    pub frame_bottom: Point,
    pub resolution: i32,
    pub mask: u32,
}

impl ViewRequest {
    /// Rejects parameters that would otherwise surface as a division by
    /// zero inside the projection.
    pub fn validate(&self) -> Result<(), ViewRequestError> {
        if self.view.x == 0 || self.view.y == 0 {
            return Err(ViewRequestError::ZeroView(self.view.x, self.view.y));
        }
        if self.frame_bottom.x == self.frame_top.x {
            return Err(ViewRequestError::DegenerateFrame("x"));
        }
        if self.frame_bottom.y == self.frame_top.y {
            return Err(ViewRequestError::DegenerateFrame("y"));
        }
        if self.resolution < 1 {
            return Err(ViewRequestError::BadResolution(self.resolution));
        }
        Ok(())
    }
}

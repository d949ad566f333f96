// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Set of tracked points with stable identifiers.

use crate::core::track::klt::{Lost, Tracked};
use crate::misc::type_aliases::{Float, Point2};

/// A point alive in the current frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackPoint {
    /// Identifier, kept while the point is tracked and never reused.
    pub id: u64,
    /// Pixel coordinates in the current frame.
    pub position: Point2,
    /// Residual of the last tracking, zero for freshly detected points.
    pub residual: Float,
}

/// Points tracked in the current frame.
#[derive(Debug, Clone, Default)]
pub struct TrackSet {
    points: Vec<TrackPoint>,
    next_id: u64,
}

/// Index-aligned positions of the points tracked between two frames.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Correspondences {
    /// Positions in the previous frame.
    pub previous: Vec<Point2>,
    /// Positions in the current frame.
    pub current: Vec<Point2>,
}

impl Correspondences {
    /// Number of correspondences.
    pub fn len(&self) -> usize {
        self.current.len()
    }

    /// True if there is no correspondence.
    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }
}

impl TrackSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of alive points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// True if no point is alive.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Alive points.
    pub fn points(&self) -> &[TrackPoint] {
        &self.points
    }

    /// Positions of alive points.
    pub fn positions(&self) -> Vec<Point2> {
        self.points.iter().map(|p| p.position).collect()
    }

    /// Update the set with the tracking results of its points, in the same order.
    /// Lost points are dropped.
    /// Returns the correspondences of the points still alive.
    pub fn advance(&mut self, results: Vec<Result<Tracked, Lost>>) -> Correspondences {
        debug_assert_eq!(self.points.len(), results.len());
        let mut correspondences = Correspondences::default();
        let points = std::mem::take(&mut self.points);
        for (point, result) in points.into_iter().zip(results) {
            if let Ok(tracked) = result {
                correspondences.previous.push(point.position);
                correspondences.current.push(tracked.position);
                self.points.push(TrackPoint {
                    position: tracked.position,
                    residual: tracked.residual,
                    ..point
                });
            }
        }
        correspondences
    }

    /// Discard all points and start again from new positions.
    pub fn replace<I: IntoIterator<Item = Point2>>(&mut self, positions: I) {
        self.points.clear();
        for position in positions {
            self.points.push(TrackPoint {
                id: self.next_id,
                position,
                residual: 0.0,
            });
            self.next_id += 1;
        }
    }
}

// TESTS #############################################################

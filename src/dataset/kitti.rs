// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Helper functions to handle the KITTI odometry dataset.
//!
//! Expected layout of the dataset root directory:
//!
//! ```text
//! sequences/00/calib.txt
//! sequences/00/image_0/000000.png
//! sequences/00/image_0/000001.png
//! poses/00.txt
//! ```

use itertools::Itertools;
use nalgebra::{DMatrix, Translation3};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::{camera::Intrinsics, odometry::FrameSource};
use crate::math::so3;
use crate::misc::interop;
use crate::misc::type_aliases::{Float, Iso3, Mat3};

/// Errors when reading dataset files.
#[derive(Debug, Error)]
pub enum Error {
    /// File could not be read.
    #[error("cannot read {path}: {source}")]
    Io {
        /// Path of the file.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// File content could not be parsed.
    #[error("cannot parse {path}: {source}")]
    Parse {
        /// Path of the file.
        path: PathBuf,
        /// Underlying error.
        source: parse::Error,
    },
    /// Image could not be decoded.
    #[error("cannot decode image {path}: {source}")]
    Image {
        /// Path of the image.
        path: PathBuf,
        /// Underlying error.
        source: image::ImageError,
    },
}

/// Number of frames processed in each sequence, none for unknown sequences.
pub fn frame_limit(sequence: &str) -> Option<usize> {
    match sequence {
        "00" | "02" | "05" | "08" => Some(4000),
        "01" | "06" | "07" | "10" => Some(2000),
        "03" => Some(1500),
        "04" => Some(500),
        "09" => Some(3000),
        _ => None,
    }
}

/// Files of a sequence in the dataset.
#[derive(Debug, Clone)]
pub struct Sequence {
    root: PathBuf,
    id: String,
}

impl Sequence {
    /// Sequence `id` (like "00") of the dataset at `root`.
    pub fn new<P: AsRef<Path>>(root: P, id: &str) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            id: id.to_string(),
        }
    }

    /// Identifier of the sequence.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Directory of the sequence.
    pub fn directory(&self) -> PathBuf {
        self.root.join("sequences").join(&self.id)
    }

    /// Path of the calibration file.
    pub fn calibration_path(&self) -> PathBuf {
        self.directory().join("calib.txt")
    }

    /// Path of the ground truth poses file.
    pub fn poses_path(&self) -> PathBuf {
        self.root.join("poses").join(format!("{}.txt", self.id))
    }

    /// Path of the left grayscale image of a frame.
    pub fn image_path(&self, index: usize) -> PathBuf {
        self.directory()
            .join("image_0")
            .join(format!("{:06}.png", index))
    }

    /// Intrinsics of the left grayscale camera.
    pub fn read_calibration(&self) -> Result<Intrinsics, Error> {
        let path = self.calibration_path();
        let content = read_to_string(&path)?;
        parse::calibration(&content).map_err(|source| Error::Parse { path, source })
    }

    /// Ground truth camera poses.
    /// Malformed lines leave a hole at their frame index.
    pub fn read_poses(&self) -> Result<Vec<Option<Iso3>>, Error> {
        let content = read_to_string(&self.poses_path())?;
        Ok(parse::poses(&content))
    }

    /// Frames of the sequence, stopping after `limit` frames if given.
    pub fn frames(&self, limit: Option<usize>) -> Frames {
        Frames {
            sequence: self.clone(),
            limit,
        }
    }
}

fn read_to_string(path: &Path) -> Result<String, Error> {
    std::fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Reader of the images of a sequence.
/// The sequence ends at the first missing image.
#[derive(Debug, Clone)]
pub struct Frames {
    sequence: Sequence,
    limit: Option<usize>,
}

impl FrameSource for Frames {
    type Error = Error;

    fn frame(&mut self, index: usize) -> Result<Option<DMatrix<u8>>, Error> {
        if self.limit.map_or(false, |limit| index >= limit) {
            return Ok(None);
        }
        let path = self.sequence.image_path(index);
        if !path.is_file() {
            log::info!("no image {}, end of sequence", path.display());
            return Ok(None);
        }
        let img = image::open(&path).map_err(|source| Error::Image { path, source })?;
        Ok(Some(interop::frame_from_image(img)))
    }
}

/// Write a pose in the KITTI format: the 12 values of its 3x4 matrix, row major.
pub fn format_pose(pose: &Iso3) -> String {
    let r = pose.rotation.to_rotation_matrix().into_inner();
    let t = pose.translation.vector;
    (0..3)
        .flat_map(|i| vec![r[(i, 0)], r[(i, 1)], r[(i, 2)], t[i]])
        // Adding zero turns -0 into 0.
        .map(|v| format!("{:.6e}", v + 0.0))
        .join(" ")
}

/// Rigid body motion from the 12 values of a 3x4 matrix, row major.
/// The rotation block is projected on the closest rotation.
pub fn pose_from_values(v: &[Float; 12]) -> Iso3 {
    let rotation = Mat3::new(v[0], v[1], v[2], v[4], v[5], v[6], v[8], v[9], v[10]);
    let translation = Translation3::new(v[3], v[7], v[11]);
    Iso3::from_parts(translation, so3::orthonormalize(&rotation))
}

/// Parse calibration and ground truth files.
pub mod parse {
    use super::*;
    use nom::{
        bytes::complete::take_till1,
        character::complete::{char, space0, space1},
        combinator::all_consuming,
        multi::count,
        number::complete::double,
        sequence::{preceded, terminated, tuple},
        IResult,
    };

    /// Errors of the parsers.
    #[derive(Debug, Error, Clone, PartialEq, Eq)]
    pub enum Error {
        /// A line does not have the expected content.
        #[error("malformed line {0}")]
        MalformedLine(usize),
        /// The calibration of the left grayscale camera is missing.
        #[error("no P0 projection matrix")]
        MissingProjection,
    }

    /// Intrinsics from the `P0` projection matrix of a calibration file.
    pub fn calibration(file_content: &str) -> Result<Intrinsics, Error> {
        for (line_index, line) in file_content.lines().enumerate() {
            let (values, name) = match label(line) {
                Ok(parsed) => parsed,
                Err(_) => continue,
            };
            if name != "P0" {
                continue;
            }
            let (_, v) = matrix_3x4(values).map_err(|_| Error::MalformedLine(line_index + 1))?;
            let k = Mat3::new(v[0], v[1], v[2], v[4], v[5], v[6], v[8], v[9], v[10]);
            return Ok(Intrinsics::from_matrix(&k));
        }
        Err(Error::MissingProjection)
    }

    /// Poses of a ground truth file, one per non empty line.
    /// Lines without exactly 12 numbers are skipped and give `None`,
    /// so that poses stay aligned with frame indices.
    pub fn poses(file_content: &str) -> Vec<Option<Iso3>> {
        file_content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(line_index, line)| match matrix_3x4(line) {
                Ok((_, v)) => Some(pose_from_values(&v)),
                Err(_) => {
                    log::warn!("{}, skipped", Error::MalformedLine(line_index + 1));
                    None
                }
            })
            .collect()
    }

    // nom parsers #############################################################

    // Label of a calibration line, like "P0:".
    fn label(input: &str) -> IResult<&str, &str> {
        preceded(space0, terminated(take_till1(|c| c == ':'), char(':')))(input)
    }

    // Exactly 12 numbers separated by spaces.
    fn matrix_3x4(input: &str) -> IResult<&str, [Float; 12]> {
        let (rest, (first, others)) = all_consuming(terminated(
            tuple((preceded(space0, double), count(preceded(space1, double), 11))),
            space0,
        ))(input)?;
        let mut values = [first; 12];
        values[1..].copy_from_slice(&others);
        Ok((rest, values))
    }
} // pub mod parse

// TESTS #############################################################

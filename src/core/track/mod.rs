// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Tracking of 2D points across consecutive frames.

pub mod klt;
pub mod lk_optimizer;
pub mod tracks;

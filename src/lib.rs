// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
//! An interactive virtual piano.
//!
//! Live input from keys and pointers is reconciled into note on/off requests for a
//! sampled voice engine, and a scheduler can play a scripted melody through the same
//! engine. Both sources share one set of active notes that the front end renders.

pub mod active;
pub mod audio;
pub mod config;
pub mod controller;
pub mod engine;
pub mod input;
pub mod melody;
pub mod notes;
pub mod piano;
pub mod playsync;
pub mod samples;
pub mod scheduler;
pub mod transport;
#[cfg(test)]
mod testutil;

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
use std::fmt;

/// Why the engine could not become ready.
#[derive(Clone, Debug, PartialEq)]
pub enum Failure {
    /// The platform refused to start audio output. Unlocking may be retried.
    Unlock(String),
    /// The sample set could not be loaded. Fatal for the session.
    SampleLoad(String),
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Unlock(reason) => write!(f, "audio output unavailable: {}", reason),
            Failure::SampleLoad(reason) => write!(f, "piano samples unavailable: {}", reason),
        }
    }
}

/// The voice engine's lifecycle.
///
/// ```text
/// Uninitialized -> Unlocking -> LoadingSamples -> Ready
///                     |               |
///                     v               v
///              Failed(Unlock)  Failed(SampleLoad)
/// ```
///
/// Any state may move to Disposed.
#[derive(Clone, Debug, PartialEq)]
pub enum Readiness {
    Uninitialized,
    Unlocking,
    LoadingSamples,
    Ready,
    Failed(Failure),
    Disposed,
}

impl Readiness {
    /// True once audio output has been started.
    pub fn output_unlocked(&self) -> bool {
        matches!(
            self,
            Readiness::LoadingSamples
                | Readiness::Ready
                | Readiness::Failed(Failure::SampleLoad(_))
        )
    }

    pub fn samples_loaded(&self) -> bool {
        *self == Readiness::Ready
    }

    /// True when notes can be played.
    pub fn is_ready(&self) -> bool {
        self.output_unlocked() && self.samples_loaded()
    }

    /// True while output is running and the sample set is still on its way.
    pub fn is_loading(&self) -> bool {
        *self == Readiness::LoadingSamples
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Readiness::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}

impl fmt::Display for Readiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Readiness::Uninitialized => write!(f, "uninitialized"),
            Readiness::Unlocking => write!(f, "unlocking"),
            Readiness::LoadingSamples => write!(f, "loading samples"),
            Readiness::Ready => write!(f, "ready"),
            Readiness::Failed(failure) => write!(f, "failed ({})", failure),
            Readiness::Disposed => write!(f, "disposed"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_derived_flags() {
        let cases = [
            (Readiness::Uninitialized, false, false, false),
            (Readiness::Unlocking, false, false, false),
            (Readiness::LoadingSamples, true, false, true),
            (Readiness::Ready, true, true, false),
            (
                Readiness::Failed(Failure::Unlock("denied".into())),
                false,
                false,
                false,
            ),
            (
                Readiness::Failed(Failure::SampleLoad("404".into())),
                true,
                false,
                false,
            ),
            (Readiness::Disposed, false, false, false),
        ];

        for (readiness, unlocked, ready, loading) in cases {
            assert_eq!(unlocked, readiness.output_unlocked(), "{}", readiness);
            assert_eq!(ready, readiness.is_ready(), "{}", readiness);
            assert_eq!(loading, readiness.is_loading(), "{}", readiness);
        }
    }
}

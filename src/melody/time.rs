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
//! Musical time: positions within a piece and note lengths.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::transport::Tempo;

use super::MelodyError;

/// When an event starts, either as `bars:beats:sixteenths` or in plain seconds.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Position {
    Musical {
        bars: u32,
        beats: u32,
        sixteenths: f64,
    },
    Seconds(f64),
}

impl Position {
    pub fn musical(bars: u32, beats: u32, sixteenths: f64) -> Position {
        Position::Musical {
            bars,
            beats,
            sixteenths,
        }
    }

    /// Seconds from the start of the piece at the given tempo.
    pub fn to_seconds(&self, tempo: &Tempo) -> f64 {
        match self {
            Position::Musical {
                bars,
                beats,
                sixteenths,
            } => {
                let quarter = tempo.seconds_per_quarter();
                f64::from(*bars) * tempo.seconds_per_measure()
                    + f64::from(*beats) * quarter
                    + sixteenths * quarter / 4.0
            }
            Position::Seconds(seconds) => *seconds,
        }
    }
}

impl FromStr for Position {
    type Err = MelodyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = |reason: &str| MelodyError::Time {
            value: s.to_string(),
            reason: reason.to_string(),
        };

        if !s.contains(':') {
            return parse_seconds(s).map(Position::Seconds).ok_or_else(|| {
                invalid("expected bars:beats:sixteenths or a number of seconds")
            });
        }

        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() > 3 {
            return Err(invalid("too many fields"));
        }
        let bars = parts[0]
            .parse::<u32>()
            .map_err(|_| invalid("bars must be a whole number"))?;
        let beats = match parts.get(1) {
            Some(beats) => beats
                .parse::<u32>()
                .map_err(|_| invalid("beats must be a whole number"))?,
            None => 0,
        };
        let sixteenths = match parts.get(2) {
            Some(sixteenths) => sixteenths
                .parse::<f64>()
                .ok()
                .filter(|s| s.is_finite() && *s >= 0.0)
                .ok_or_else(|| invalid("sixteenths must be a non-negative number"))?,
            None => 0.0,
        };
        Ok(Position::musical(bars, beats, sixteenths))
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Position::Musical {
                bars,
                beats,
                sixteenths,
            } => write!(f, "{}:{}:{}", bars, beats, sixteenths),
            Position::Seconds(seconds) => write!(f, "{}s", seconds),
        }
    }
}

impl TryFrom<String> for Position {
    type Error = MelodyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Position> for String {
    fn from(value: Position) -> Self {
        value.to_string()
    }
}

/// How long an event lasts.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum NoteValue {
    /// A fraction of a whole note: `4n` is a quarter note, `8n.` a dotted eighth, `8t`
    /// an eighth note triplet.
    Note {
        division: u32,
        dotted: bool,
        triplet: bool,
    },
    /// A number of measures, `1m`.
    Measures(f64),
    Seconds(f64),
}

impl NoteValue {
    pub fn note(division: u32) -> NoteValue {
        NoteValue::Note {
            division,
            dotted: false,
            triplet: false,
        }
    }

    pub fn to_seconds(&self, tempo: &Tempo) -> f64 {
        match self {
            NoteValue::Note {
                division,
                dotted,
                triplet,
            } => {
                let mut seconds = 4.0 * tempo.seconds_per_quarter() / f64::from(*division);
                if *dotted {
                    seconds *= 1.5;
                }
                if *triplet {
                    seconds *= 2.0 / 3.0;
                }
                seconds
            }
            NoteValue::Measures(measures) => measures * tempo.seconds_per_measure(),
            NoteValue::Seconds(seconds) => *seconds,
        }
    }
}

impl FromStr for NoteValue {
    type Err = MelodyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = |reason: &str| MelodyError::Time {
            value: s.to_string(),
            reason: reason.to_string(),
        };

        let (body, dotted) = match s.strip_suffix('.') {
            Some(body) => (body, true),
            None => (s, false),
        };

        if let Some(division) = body.strip_suffix('n').or_else(|| body.strip_suffix('t')) {
            let triplet = body.ends_with('t');
            let division = division
                .parse::<u32>()
                .ok()
                .filter(|d| *d > 0)
                .ok_or_else(|| invalid("note divisions must be positive whole numbers"))?;
            return Ok(NoteValue::Note {
                division,
                dotted,
                triplet,
            });
        }
        if dotted {
            return Err(invalid("only note values can be dotted"));
        }
        if let Some(measures) = s.strip_suffix('m') {
            return measures
                .parse::<f64>()
                .ok()
                .filter(|m| m.is_finite() && *m > 0.0)
                .map(NoteValue::Measures)
                .ok_or_else(|| invalid("measures must be a positive number"));
        }
        parse_seconds(s)
            .map(NoteValue::Seconds)
            .ok_or_else(|| invalid("expected a note value such as 4n, 8n., 8t, 1m or seconds"))
    }
}

impl fmt::Display for NoteValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoteValue::Note {
                division,
                dotted,
                triplet,
            } => {
                write!(f, "{}{}", division, if *triplet { "t" } else { "n" })?;
                if *dotted {
                    write!(f, ".")?;
                }
                Ok(())
            }
            NoteValue::Measures(measures) => write!(f, "{}m", measures),
            NoteValue::Seconds(seconds) => write!(f, "{}s", seconds),
        }
    }
}

impl TryFrom<String> for NoteValue {
    type Error = MelodyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NoteValue> for String {
    fn from(value: NoteValue) -> Self {
        value.to_string()
    }
}

/// Reads `0.5` or `0.5s` as seconds.
fn parse_seconds(s: &str) -> Option<f64> {
    s.strip_suffix('s')
        .unwrap_or(s)
        .parse::<f64>()
        .ok()
        .filter(|seconds| seconds.is_finite() && *seconds >= 0.0)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::transport::TimeSignature;

    #[test]
    fn test_positions() -> Result<(), MelodyError> {
        let tempo = Tempo::default();
        assert_eq!(0.0, "0:0:0".parse::<Position>()?.to_seconds(&tempo));
        assert_eq!(0.5, "0:1:0".parse::<Position>()?.to_seconds(&tempo));
        assert_eq!(7.0, "3:2:0".parse::<Position>()?.to_seconds(&tempo));
        assert_eq!(0.25, "0:0:2".parse::<Position>()?.to_seconds(&tempo));
        assert_eq!(2.0, "2".parse::<Position>()?.to_seconds(&tempo));
        assert_eq!(Position::Seconds(1.25), "1.25s".parse()?);
        assert_eq!(Position::musical(1, 2, 0.0), "1:2".parse()?);

        let slow = Tempo::new(60.0, TimeSignature::new(3, 4));
        assert_eq!(4.0, "1:1:0".parse::<Position>()?.to_seconds(&slow));

        assert!("a:1:0".parse::<Position>().is_err());
        assert!("0:1:0:0".parse::<Position>().is_err());
        assert!("-1".parse::<Position>().is_err());
        Ok(())
    }

    #[test]
    fn test_note_values() -> Result<(), MelodyError> {
        let tempo = Tempo::default();
        let seconds = |s: &str| -> Result<f64, MelodyError> {
            Ok(s.parse::<NoteValue>()?.to_seconds(&tempo))
        };
        assert_eq!(0.5, seconds("4n")?);
        assert_eq!(1.0, seconds("2n")?);
        assert_eq!(2.0, seconds("1n")?);
        assert_eq!(0.375, seconds("8n.")?);
        assert!((seconds("4t")? - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(4.0, seconds("2m")?);
        assert_eq!(0.3, seconds("0.3")?);
        assert_eq!(0.3, seconds("0.3s")?);

        assert!("0n".parse::<NoteValue>().is_err());
        assert!("1m.".parse::<NoteValue>().is_err());
        assert!("quarter".parse::<NoteValue>().is_err());
        Ok(())
    }

    #[test]
    fn test_display_parses_back() -> Result<(), MelodyError> {
        for value in ["4n", "8n.", "16t", "1m", "0.5s"] {
            assert_eq!(value, value.parse::<NoteValue>()?.to_string());
        }
        assert_eq!("2:3:0", "2:3:0".parse::<Position>()?.to_string());
        Ok(())
    }
}

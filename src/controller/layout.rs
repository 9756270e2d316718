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
//! Where each key sits on the terminal keyboard.

use std::ops::RangeInclusive;

use crate::notes::{KeyColor, NoteId, NoteRegistry};

pub const WHITE_WIDTH: u16 = 3;
pub const WHITE_HEIGHT: u16 = 5;
pub const BLACK_WIDTH: u16 = 2;
pub const BLACK_HEIGHT: u16 = 3;

/// A key's cell rectangle.
#[derive(Clone, Debug, PartialEq)]
pub struct KeyRect {
    pub note: NoteId,
    pub color: KeyColor,
    pub left: u16,
    pub top: u16,
    pub width: u16,
    pub height: u16,
    pub label: String,
}

impl KeyRect {
    fn contains(&self, column: u16, row: u16) -> bool {
        (self.left..self.left + self.width).contains(&column)
            && (self.top..self.top + self.height).contains(&row)
    }
}

/// The keys of a range of octaves laid out left to right. Black keys straddle the
/// boundary between their neighbouring white keys.
#[derive(Clone, Debug)]
pub struct KeyboardLayout {
    whites: Vec<KeyRect>,
    blacks: Vec<KeyRect>,
    top: u16,
}

impl KeyboardLayout {
    pub fn new(registry: &NoteRegistry, octaves: RangeInclusive<i8>, top: u16) -> KeyboardLayout {
        let mut whites = Vec::new();
        let mut blacks = Vec::new();
        for key in registry
            .keys()
            .iter()
            .filter(|key| octaves.contains(&key.octave()))
        {
            let rect = |left, width, height| KeyRect {
                note: key.id(),
                color: key.color(),
                left,
                top,
                width,
                height,
                label: key.display_label(),
            };
            match key.color() {
                KeyColor::White => {
                    let left = whites.len() as u16 * WHITE_WIDTH;
                    whites.push(rect(left, WHITE_WIDTH, WHITE_HEIGHT));
                }
                KeyColor::Black => {
                    let left = (whites.len() as u16 * WHITE_WIDTH).saturating_sub(1);
                    blacks.push(rect(left, BLACK_WIDTH, BLACK_HEIGHT));
                }
            }
        }

        KeyboardLayout { whites, blacks, top }
    }

    /// Keys in drawing order: white keys, then the black keys over them.
    pub fn keys(&self) -> impl Iterator<Item = &KeyRect> {
        self.whites.iter().chain(self.blacks.iter())
    }

    /// The key under a cell. Black keys win where they overlap white ones.
    pub fn hit(&self, column: u16, row: u16) -> Option<NoteId> {
        self.blacks
            .iter()
            .chain(self.whites.iter())
            .find(|key| key.contains(column, row))
            .map(|key| key.note)
    }

    pub fn width(&self) -> u16 {
        self.whites.len() as u16 * WHITE_WIDTH
    }

    pub fn top(&self) -> u16 {
        self.top
    }

    /// The first row below the keyboard.
    pub fn bottom(&self) -> u16 {
        self.top + WHITE_HEIGHT
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testutil::note;

    #[test]
    fn test_layout() {
        let layout = KeyboardLayout::new(&NoteRegistry::default(), 3..=4, 2);
        assert_eq!(14 * WHITE_WIDTH, layout.width());
        assert_eq!(24, layout.keys().count());
        assert_eq!(7, layout.bottom());

        let c3 = layout.keys().find(|k| k.note == note("C3")).expect("C3");
        assert_eq!("A", c3.label);
        let g4 = layout.keys().find(|k| k.note == note("G4")).expect("G4");
        assert_eq!("", g4.label);
    }

    #[test]
    fn test_hit() {
        let layout = KeyboardLayout::new(&NoteRegistry::default(), 3..=4, 2);
        assert_eq!(Some(note("C3")), layout.hit(0, 6));
        assert_eq!(Some(note("C#3")), layout.hit(2, 2));
        assert_eq!(Some(note("C#3")), layout.hit(3, 4));
        // Below the black key the white key shows through.
        assert_eq!(Some(note("C3")), layout.hit(2, 5));
        assert_eq!(Some(note("D3")), layout.hit(4, 2));
        assert_eq!(Some(note("E3")), layout.hit(7, 2));
        assert_eq!(Some(note("F3")), layout.hit(9, 2));
        assert_eq!(Some(note("B4")), layout.hit(41, 6));

        assert_eq!(None, layout.hit(0, 1));
        assert_eq!(None, layout.hit(0, 7));
        assert_eq!(None, layout.hit(42, 3));
    }
}

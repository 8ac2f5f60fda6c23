//! The register file. Every register holds one word; the special registers only mean something
//! because the instructions that use them say so.

use std::convert::TryFrom;
use std::fmt::{Display, Formatter};

use num_enum::{TryFromPrimitive, IntoPrimitive};
use strum_macros::{Display as StrumDisplay, IntoStaticStr, EnumString, EnumIter};

use crate::address::Word;

/// Number of registers. Register ids are dense, `0..REGISTER_COUNT`.
pub const REGISTER_COUNT: usize = 10;

/// Value `cmp` leaves in `bi` when its operands are equal.
pub const BRANCH_TRUE: Word = 0xFFFF;
/// Value `cmp` leaves in `bi` when its operands differ.
pub const BRANCH_FALSE: Word = 0x0000;

/**
  Register ids. The discriminant is the id used in encoded operands, and the `strum` name is
  the alias accepted by the assembler.
*/
#[derive(
  StrumDisplay, IntoStaticStr, EnumString, EnumIter, TryFromPrimitive, IntoPrimitive,
  Clone,        Copy,          Eq,         PartialEq, Debug,           Hash
)]
#[strum(serialize_all = "snake_case")]
#[repr(u16)]
pub enum Register {
  // General purpose //
  Aa,
  Bb,
  Cc,
  Dd,

  // Special //
  Ex, // extra, remainder of `div` and `dvc`
  Ac, // accumulator
  Sp, // stack pointer
  Pc, // program counter
  Bi, // branch indicator, set by `cmp`
  Lc, // address of the last instruction executed
}

impl Register {
  pub fn id(&self) -> Word {
    Into::<Word>::into(*self)
  }

  pub fn from_id(id: Word) -> Option<Register> {
    Register::try_from(id).ok()
  }
}


/// Fixed-size storage for every register. Reads and writes never fail.
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct RegisterFile {
  cells: [Word; REGISTER_COUNT]
}

impl RegisterFile {

  pub fn new() -> RegisterFile {
    RegisterFile::default()
  }

  pub fn get(&self, register: Register) -> Word {
    self.cells[register.id() as usize]
  }

  pub fn set(&mut self, register: Register, value: Word) {
    self.cells[register.id() as usize] = value;
  }

  /// Applies `f` to the register's value in place.
  pub fn update<F>(&mut self, register: Register, f: F)
    where F: FnOnce(Word) -> Word
  {
    let cell = &mut self.cells[register.id() as usize];
    *cell = f(*cell);
  }

}

impl Display for RegisterFile {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let text =
      self.cells
          .iter()
          .enumerate()
          .filter_map(|(id, value)| {
            Register::from_id(id as Word).map(|r| format!("{}:{:04x}", r, value))
          })
          .collect::<Vec<String>>()
          .join(" ");
    write!(f, "{}", text)
  }
}

//! The assembled unit: constants, subroutines, and the entry point.

use std::fmt::{Display, Formatter};

use string_cache::DefaultAtom;

use super::Instruction;
use crate::address::Word;

/// The name the last subroutine of every program must have.
pub const MAIN: &str = "main";

/**
  One word of constant data at a fixed address. A string constant occupies one `Constant` per
  word, and only the first of them carries the name. Names are interned, and they do not
  survive encoding.
*/
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct Constant {
  pub name    : Option<DefaultAtom>,
  pub address : Word,
  pub value   : Word,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct Subroutine {
  pub name         : Option<DefaultAtom>,
  pub address      : Word,
  pub instructions : Vec<Instruction>,
}

impl Subroutine {

  /// Size in words of every instruction in the subroutine.
  pub fn size(&self) -> usize {
    self.instructions.iter().map(Instruction::size).sum()
  }

  /// Each instruction paired with its address.
  pub fn addressed(&self) -> impl Iterator<Item = (Word, &Instruction)> + '_ {
    let mut address = self.address;
    self.instructions.iter().map(move |instruction| {
      let here = address;
      address = address.wrapping_add(instruction.size() as Word);
      (here, instruction)
    })
  }

}

/**
  An assembled program. Constants come first in address order, followed by the subroutines in
  declaration order; the last subroutine is `main` and `entry` is its address.
*/
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct Program {
  pub constants   : Vec<Constant>,
  pub subroutines : Vec<Subroutine>,
  pub entry       : Word,
}

impl Program {

  /// Size in words of all constants and code.
  pub fn size(&self) -> usize {
    self.constants.len() + self.subroutines.iter().map(Subroutine::size).sum::<usize>()
  }

  pub fn main(&self) -> Option<&Subroutine> {
    self.subroutines.last()
  }

  /// Every `(address, word)` the program occupies, constants first.
  pub fn memory_image(&self) -> Vec<(Word, Word)> {
    let mut image: Vec<(Word, Word)> =
      self.constants.iter().map(|c| (c.address, c.value)).collect();
    for subroutine in &self.subroutines {
      for (address, instruction) in subroutine.addressed() {
        for (i, word) in instruction.words().enumerate() {
          image.push((address.wrapping_add(i as Word), word));
        }
      }
    }
    image
  }

  /// A copy with every symbol name removed except `main`, which is what survives encoding.
  pub fn without_symbols(&self) -> Program {
    let last = self.subroutines.len().saturating_sub(1);
    Program {
      constants   : self.constants
                        .iter()
                        .map(|c| Constant{ name: None, ..c.clone() })
                        .collect(),
      subroutines : self.subroutines
                        .iter()
                        .enumerate()
                        .map(|(i, s)| Subroutine{
                          name: if i == last { Some(DefaultAtom::from(MAIN)) } else { None },
                          ..s.clone()
                        })
                        .collect(),
      entry       : self.entry,
    }
  }

}

impl Display for Program {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    for constant in &self.constants {
      match &constant.name {
        Some(name) => writeln!(f, "{:04x}: {:04x}  ; {}", constant.address, constant.value, name)?,
        None       => writeln!(f, "{:04x}: {:04x}", constant.address, constant.value)?,
      }
    }
    for subroutine in &self.subroutines {
      match &subroutine.name {
        Some(name) => writeln!(f, "{}:", name)?,
        None       => writeln!(f, "{{{:04x}}}:", subroutine.address)?,
      }
      for (address, instruction) in subroutine.addressed() {
        writeln!(f, "  {:04x}: {}", address, instruction)?;
      }
    }
    write!(f, "entry: {:04x}", self.entry)
  }
}

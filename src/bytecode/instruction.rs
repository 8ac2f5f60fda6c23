use std::fmt::{Display, Formatter};

use super::Opcode;
use crate::address::Word;

/// An opcode together with its operand words.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct Instruction {
  pub opcode   : Opcode,
  pub operands : Vec<Word>,
}

impl Instruction {

  /**
    Builds an instruction. It is the caller's responsibility to supply exactly
    `opcode.operand_count()` operands; the assembler and the decoder both check this before
    construction.
  */
  pub fn new(opcode: Opcode, operands: Vec<Word>) -> Instruction {
    debug_assert_eq!(operands.len(), opcode.operand_count());
    Instruction{ opcode, operands }
  }

  pub fn size(&self) -> usize {
    self.opcode.instruction_size()
  }

  /// The encoded words of this instruction, opcode first.
  pub fn words(&self) -> impl Iterator<Item = Word> + '_ {
    std::iter::once(self.opcode.code()).chain(self.operands.iter().copied())
  }

}

impl Display for Instruction {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.opcode)?;
    for operand in &self.operands {
      write!(f, " {:04x}", operand)?;
    }
    Ok(())
  }
}

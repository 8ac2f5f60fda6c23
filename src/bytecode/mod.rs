/*!

  The machine uses a 16 bit big-endian word size, and memory addresses name words, not bytes.
  An encoded instruction is one opcode word followed by a fixed number of operand words:

    [Opcode:16][Operand:16]*

  The number of operands depends only on the opcode, so a decoder walking a word stream never
  needs a separator between instructions. Operands are stored as bare words; whether an
  operand names a register, an address, or an immediate value is known only to the opcode
  that consumes it.

  Unlike a byte-oriented encoding, there is nothing to pack: every component of an
  instruction already occupies a whole word. An `Instruction` is therefore just the opcode
  and its operand words, and the opcode enum doubles as the instruction table, carrying the
  mnemonic (via `strum`), the opcode number (via `num_enum`), and the operand count.

*/

pub mod assembly;
pub mod binary;
mod instruction;
pub mod program;

pub use binary::{encode_program, decode_program, MAGIC, SECTION_SENTINEL};
pub use instruction::Instruction;
pub use program::{Constant, Subroutine, Program, MAIN};

use std::convert::TryFrom;

use num_enum::{TryFromPrimitive, IntoPrimitive};
use strum_macros::{Display as StrumDisplay, IntoStaticStr, EnumString, EnumIter};

use crate::address::Word;

/**
  Opcodes of the virtual machine, numbered in declaration order. The order is the encoding,
  so new opcodes go at the end.
*/
#[derive(
  StrumDisplay, IntoStaticStr, EnumString, EnumIter, TryFromPrimitive, IntoPrimitive,
  Clone,        Copy,          Eq,         PartialEq, Debug,           Hash
)]
#[strum(serialize_all = "snake_case")]
#[repr(u16)]
pub enum Opcode {
  Nop,  // nop
  Cop,  // cop( dst reg, src reg )
  Cpl,  // cpl( dst reg, immediate )
  Str,  // str( address reg, value reg )
  Ldr,  // ldr( dst reg, address reg )
  // Opcode 0x05

  // Accumulator arithmetic //
  Add,  // add( reg )
  Sub,  // sub( reg )
  Twc,  // twc( reg )
  Inc,  // inc( reg )
  Dec,  // dec( reg )
  Mul,  // mul( reg )
  Div,  // div( reg )
  Dvc,  // dvc( reg )
  // Opcode 0x0d

  // Bitwise //
  Xor,  // xor( reg )
  And,  // and( reg )
  Orr,  // orr( reg )
  Not,  // not( reg )
  Shr,  // shr( reg, amount reg )
  Shl,  // shl( reg, amount reg )
  // Opcode 0x13

  Vga,  // vga

  // Stack and control flow //
  Psh,  // psh( reg )
  Pop,  // pop( dst reg )
  Ret,  // ret
  Cal,  // cal( address )
  Cmp,  // cmp( reg, reg )
  Cle,  // cle( address )
  Cln,  // cln( address )
  Gto,  // gto( address reg )
  Gte,  // gte( address reg )
  Gtn,  // gtn( address reg )
  // Opcode 0x1e

  // Heap relative //
  Sth,  // sth( offset reg, value reg )
  Ldh,  // ldh( dst reg, offset reg )
}

impl Opcode {

  pub fn code(&self) -> Word {
    Into::<Word>::into(*self)
  }

  pub fn from_code(code: Word) -> Option<Opcode> {
    Opcode::try_from(code).ok()
  }

  pub fn mnemonic(&self) -> &'static str {
    (*self).into()
  }

  /// Number of operand words following the opcode word.
  pub fn operand_count(&self) -> usize {
    match self {

      | Opcode::Nop
      | Opcode::Vga
      | Opcode::Ret => 0,

      | Opcode::Add
      | Opcode::Sub
      | Opcode::Twc
      | Opcode::Inc
      | Opcode::Dec
      | Opcode::Mul
      | Opcode::Div
      | Opcode::Dvc
      | Opcode::Xor
      | Opcode::And
      | Opcode::Orr
      | Opcode::Not
      | Opcode::Psh
      | Opcode::Pop
      | Opcode::Cal
      | Opcode::Cle
      | Opcode::Cln
      | Opcode::Gto
      | Opcode::Gte
      | Opcode::Gtn => 1,

      | Opcode::Cop
      | Opcode::Cpl
      | Opcode::Str
      | Opcode::Ldr
      | Opcode::Shr
      | Opcode::Shl
      | Opcode::Cmp
      | Opcode::Sth
      | Opcode::Ldh => 2,

    }
  }

  /// Returns the size in WORDS of an instruction for this opcode.
  pub fn instruction_size(&self) -> usize {
    1 + self.operand_count()
  }

}

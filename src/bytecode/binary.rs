/*!
  This module is responsible for the encoding and decoding of SVB binaries.

  All words are 16 bit big-endian. The layout is:

    "SVCB"                                  4 byte magic number
    (address, value)*                       one pair per constant word, in address order
    ffff                                    section sentinel
    (address, length, code[length])*        one frame per subroutine, in declaration order

  The stream ends at the end of the buffer. The last subroutine is the entry point. The
  sentinel is only recognised where a constant pair would start, so a constant may hold the
  value `ffff`, but no constant may live at address `ffff`. A subroutine frame must end below
  `ffff` and may not wrap around the address space.
*/

use log::debug;
use string_cache::DefaultAtom;

use super::{Opcode, Instruction, Constant, Subroutine, Program, MAIN};
use crate::address::{Word, HALT_ADDRESS};
use crate::error::BinaryError;

pub const MAGIC: &[u8; 4] = b"SVCB";

/// Separates the constant section from the subroutine frames.
pub const SECTION_SENTINEL: Word = 0xFFFF;

/// Whether `length` words starting at `address` stay below `HALT_ADDRESS` without wrapping.
fn frame_fits(address: Word, length: usize) -> bool {
  address != HALT_ADDRESS && address as usize + length <= HALT_ADDRESS as usize
}

/// Serializes a program. Constants are written in ascending address order.
pub fn encode_program(program: &Program) -> Result<Vec<u8>, BinaryError> {
  if program.subroutines.is_empty() {
    return Err(BinaryError::MissingEntryPoint);
  }

  let mut words: Vec<Word> = Vec::with_capacity(2 * program.constants.len() + program.size() + 1);

  let mut constants: Vec<&Constant> = program.constants.iter().collect();
  constants.sort_by_key(|c| c.address);
  for constant in constants {
    if constant.address == HALT_ADDRESS {
      return Err(BinaryError::ReservedAddress);
    }
    words.push(constant.address);
    words.push(constant.value);
  }

  words.push(SECTION_SENTINEL);

  for subroutine in &program.subroutines {
    let size = subroutine.size();
    if size > Word::max_value() as usize {
      return Err(BinaryError::SubroutineTooLarge{ address: subroutine.address });
    }
    if !frame_fits(subroutine.address, size) {
      return Err(BinaryError::ReservedAddress);
    }
    words.push(subroutine.address);
    words.push(size as Word);
    for instruction in &subroutine.instructions {
      words.extend(instruction.words());
    }
  }

  let mut bytes = Vec::with_capacity(MAGIC.len() + 2 * words.len());
  bytes.extend_from_slice(MAGIC);
  for word in words {
    bytes.extend_from_slice(&word.to_be_bytes());
  }
  Ok(bytes)
}

/**
  Deserializes a program. Every opcode is checked against the instruction table, and every
  instruction must fit inside its subroutine's frame. Decoded constants and subroutines are
  unnamed, except that the last subroutine is named `main`.
*/
pub fn decode_program(bytes: &[u8]) -> Result<Program, BinaryError> {
  if bytes.len() < MAGIC.len() || &bytes[..MAGIC.len()] != &MAGIC[..] {
    return Err(BinaryError::InvalidMagic);
  }
  let payload = &bytes[MAGIC.len()..];
  if payload.len() % 2 != 0 {
    return Err(BinaryError::OddLength{ length: payload.len() });
  }
  let words: Vec<Word> =
    payload.chunks(2)
           .map(|pair| Word::from_be_bytes([pair[0], pair[1]]))
           .collect();

  // region Constants
  let mut constants: Vec<Constant> = Vec::new();
  let mut offset = 0usize;
  loop {
    match words.get(offset) {

      None => {
        return Err(BinaryError::Truncated{ offset, context: "the constant section" });
      }

      Some(&SECTION_SENTINEL) => {
        offset += 1;
        break;
      }

      Some(&address) => {
        let value =
          *words.get(offset + 1)
                .ok_or(BinaryError::Truncated{ offset: offset + 1, context: "a constant pair" })?;
        constants.push(Constant{ name: None, address, value });
        offset += 2;
      }

    } // end match on word
  }
  // endregion

  // region Subroutines
  let mut subroutines: Vec<Subroutine> = Vec::new();
  while offset < words.len() {
    let address = words[offset];
    let length =
      *words.get(offset + 1)
            .ok_or(BinaryError::Truncated{ offset: offset + 1, context: "a subroutine header" })?
        as usize;
    if !frame_fits(address, length) {
      return Err(BinaryError::ReservedAddress);
    }

    let start = offset + 2;
    let end = start + length;
    if end > words.len() {
      return Err(BinaryError::Truncated{ offset: words.len(), context: "a subroutine body" });
    }

    let mut instructions: Vec<Instruction> = Vec::new();
    let mut cursor = start;
    while cursor < end {
      let code = words[cursor];
      let opcode =
        Opcode::from_code(code)
          .ok_or(BinaryError::UnknownOpcode{ opcode: code, offset: cursor })?;
      if cursor + opcode.instruction_size() > end {
        return Err(BinaryError::InstructionOverrun{
          opcode,
          address: address.wrapping_add((cursor - start) as Word)
        });
      }
      let operands = words[cursor + 1 .. cursor + opcode.instruction_size()].to_vec();
      instructions.push(Instruction::new(opcode, operands));
      cursor += opcode.instruction_size();
    }

    subroutines.push(Subroutine{ name: None, address, instructions });
    offset = end;
  }
  // endregion

  let entry = match subroutines.last_mut() {
    Some(main) => {
      main.name = Some(DefaultAtom::from(MAIN));
      main.address
    }
    None => return Err(BinaryError::MissingEntryPoint)
  };

  debug!(
    "decoded {} constant words and {} subroutines, entry at {:04x}",
    constants.len(), subroutines.len(), entry
  );

  Ok(Program{ constants, subroutines, entry })
}

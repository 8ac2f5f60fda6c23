/*!
  Resolves symbols in tokenized assembly and lays the result out in memory.

  Assembly is one forward pass over the lines followed by one patch pass. The forward pass
  keeps an address cursor that starts at the program base. Each constant word and each
  instruction word takes the next address. Constant and subroutine references are resolved
  as soon as they are seen, so those symbols have to be declared first. A subroutine may name
  itself, because it is declared when it opens. A label reference may point forward within
  its own subroutine. It is recorded as a patch and filled in once the whole file has been
  read.

  The last subroutine must be `main`, and its address becomes the entry point.
*/

use std::str::FromStr;

use log::debug;
use string_cache::DefaultAtom;

use crate::address::{Word, HALT_ADDRESS};
use crate::bytecode::assembly::{classify_line, parse_constant_value, parse_operand, tokenize,
                                Operand, SourceLine, Statement};
use crate::bytecode::{Constant, Instruction, Opcode, Program, Subroutine, MAIN};
use crate::error::AssemblyError;
use crate::symboltable::SymbolTable;

/// An operand slot holding a label reference. It is filled in by the patch pass.
#[derive(Clone, Debug)]
struct LabelPatch {
  line        : usize,
  scope       : usize,
  subroutine  : usize,
  instruction : usize,
  operand     : usize,
  name        : String,
}

pub struct Assembler {
  /// Next free address. It is wider than a word so that running off the end can be detected.
  cursor      : u32,
  symbols     : SymbolTable,
  constants   : Vec<Constant>,
  subroutines : Vec<Subroutine>,
  /// Label scope of the open subroutine, if there is one.
  scope       : Option<usize>,
  patches     : Vec<LabelPatch>,
}

impl Assembler {

  pub fn new(base: Word) -> Assembler {
    Assembler {
      cursor      : base as u32,
      symbols     : SymbolTable::new(),
      constants   : Vec::new(),
      subroutines : Vec::new(),
      scope       : None,
      patches     : Vec::new(),
    }
  }

  /// Consumes the assembler, producing a program from the given lines.
  pub fn assemble(mut self, lines: &[SourceLine]) -> Result<Program, AssemblyError> {
    for line in lines {
      self.assemble_line(line)?;
    }
    self.close_subroutine();
    self.patch_labels()?;
    self.finish()
  }

  fn assemble_line(&mut self, line: &SourceLine) -> Result<(), AssemblyError> {
    match classify_line(line)? {

      Statement::Constant{ name, value } => {
        self.declare_constant(line.number, name, value)
      }

      Statement::Subroutine(name) => {
        self.open_subroutine(line.number, name)
      }

      Statement::Label(name) => {
        self.declare_label(line.number, name)
      }

      Statement::Instruction{ mnemonic, operands } => {
        self.emit_instruction(line.number, mnemonic, operands)
      }

    } // end match on statement
  }

  /// Moves the cursor past `size` words and returns where they start.
  fn reserve(&mut self, line: usize, size: usize) -> Result<Word, AssemblyError> {
    let start = self.cursor;
    let end = start as usize + size;
    if start >= HALT_ADDRESS as u32 || end > HALT_ADDRESS as usize {
      return Err(AssemblyError::AddressSpaceExhausted{ line });
    }
    self.cursor = end as u32;
    Ok(start as Word)
  }

  // region Declarations

  fn declare_constant(&mut self, line: usize, name: &str, value: &str)
    -> Result<(), AssemblyError>
  {
    if !self.subroutines.is_empty() {
      return Err(AssemblyError::ConstantInSubroutine{ line, name: name.to_string() });
    }
    let words = parse_constant_value(line, value)?;
    let address = self.reserve(line, words.len())?;
    let atom = DefaultAtom::from(name);

    if self.symbols.insert_constant(atom.clone(), address).is_err() {
      return Err(AssemblyError::DuplicateConstant{ line, name: name.to_string() });
    }

    for (i, word) in words.into_iter().enumerate() {
      self.constants.push(Constant{
        name    : match i { 0 => Some(atom.clone()), _ => None },
        address : address.wrapping_add(i as Word),
        value   : word,
      });
    }
    Ok(())
  }

  fn open_subroutine(&mut self, line: usize, name: &str) -> Result<(), AssemblyError> {
    self.close_subroutine();
    let address = self.reserve(line, 0)?;
    let atom = DefaultAtom::from(name);

    match self.symbols.insert_subroutine(atom.clone(), address) {
      Some(scope) => {
        self.scope = Some(scope);
        self.subroutines.push(Subroutine{ name: Some(atom), address, instructions: Vec::new() });
        Ok(())
      }
      None => Err(AssemblyError::DuplicateSubroutine{ line, name: name.to_string() })
    }
  }

  /// The cursor already sits past the open subroutine, so closing it only ends its scope.
  fn close_subroutine(&mut self) {
    if let (Some(_), Some(subroutine)) = (self.scope, self.subroutines.last()) {
      debug!(
        "committed subroutine {} at {:04x} ({} words)",
        subroutine.name.as_ref().map_or("?", |n| &n[..]),
        subroutine.address,
        subroutine.size()
      );
    }
    self.scope = None;
  }

  fn declare_label(&mut self, line: usize, name: &str) -> Result<(), AssemblyError> {
    let scope =
      self.scope
          .ok_or_else(|| AssemblyError::LabelOutsideSubroutine{ line, name: name.to_string() })?;
    let address = self.reserve(line, 0)?;

    match self.symbols.insert_label(scope, DefaultAtom::from(name), address) {
      true  => Ok(()),
      false => Err(AssemblyError::DuplicateLabel{ line, name: name.to_string() })
    }
  }

  // endregion

  // region Instructions

  fn emit_instruction(&mut self, line: usize, mnemonic: &str, tokens: &[String])
    -> Result<(), AssemblyError>
  {
    let scope = self.scope.ok_or(AssemblyError::InstructionOutsideSubroutine{ line })?;
    let opcode =
      Opcode::from_str(mnemonic)
        .map_err(|_| AssemblyError::UnknownMnemonic{ line, mnemonic: mnemonic.to_string() })?;

    if tokens.len() != opcode.operand_count() {
      return Err(AssemblyError::WrongOperandCount{
        line,
        opcode,
        expected : opcode.operand_count(),
        found    : tokens.len(),
      });
    }

    let subroutine = self.subroutines.len() - 1;
    let instruction = self.subroutines[subroutine].instructions.len();
    let mut operands: Vec<Word> = Vec::with_capacity(tokens.len());

    for (i, token) in tokens.iter().enumerate() {
      let word = match parse_operand(line, token)? {

        | Operand::Literal(word) => word,

        | Operand::Register(register) => register.id(),

        | Operand::Constant(name) => {
          self.symbols
              .constant_address(name)
              .ok_or_else(|| AssemblyError::UndeclaredConstant{ line, name: name.to_string() })?
        }

        | Operand::Subroutine(name) => {
          self.symbols
              .subroutine_address(name)
              .ok_or_else(|| AssemblyError::UndeclaredSubroutine{ line, name: name.to_string() })?
        }

        | Operand::Label(name) => {
          self.patches.push(LabelPatch{
            line,
            scope,
            subroutine,
            instruction,
            operand : i,
            name    : name.to_string(),
          });
          0
        }

      }; // end match on operand
      operands.push(word);
    }

    self.reserve(line, opcode.instruction_size())?;
    self.subroutines[subroutine].instructions.push(Instruction::new(opcode, operands));
    Ok(())
  }

  // endregion

  fn patch_labels(&mut self) -> Result<(), AssemblyError> {
    for patch in &self.patches {
      let address =
        self.symbols
            .label_address(patch.scope, &patch.name)
            .ok_or_else(|| AssemblyError::UndeclaredLabel{
              line : patch.line,
              name : patch.name.clone()
            })?;
      self.subroutines[patch.subroutine]
          .instructions[patch.instruction]
          .operands[patch.operand] = address;
    }
    debug!("patched {} label references", self.patches.len());
    Ok(())
  }

  fn finish(self) -> Result<Program, AssemblyError> {
    let entry = match self.subroutines.last() {

      None => return Err(AssemblyError::MissingMain),

      Some(Subroutine{ name: Some(name), address, .. }) if &name[..] == MAIN => *address,

      Some(subroutine) => {
        return Err(AssemblyError::MisnamedMain{
          found: subroutine.name.as_ref().map_or(String::new(), |n| n.to_string())
        });
      }

    };

    Ok(Program {
      constants   : self.constants,
      subroutines : self.subroutines,
      entry,
    })
  }

}

/// Assembles already tokenized lines with the program starting at `base`.
pub fn assemble(lines: &[SourceLine], base: Word) -> Result<Program, AssemblyError> {
  Assembler::new(base).assemble(lines)
}

/// Tokenizes and assembles source text with the program starting at `base`.
pub fn assemble_source(text: &str, base: Word) -> Result<Program, AssemblyError> {
  assemble(&tokenize(text)?, base)
}

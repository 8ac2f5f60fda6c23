/*!
  The execution engine. A `Cpu` owns the register file, the address space, and the video device
  its `vga` instruction talks to.

  Executing one instruction goes like this:

   1. fetch the opcode word at `pc`,
   2. decode it, failing on a word that is not an opcode,
   3. read the operand words that follow it,
   4. copy `pc` into `lc` and advance `pc` past the instruction,
   5. execute.

  Because `pc` moves before execution, `cal` pushes the address of the next instruction. The
  machine halts when `pc` reaches `HALT_ADDRESS`. The loader pushes that address before
  jumping to `main`, so returning from `main` halts.

  All arithmetic wraps at 16 bits. Negation is two's complement, `~x + 1`, everywhere.
*/

mod session;

pub use session::Session;

use std::fmt::{Display, Formatter};

use log::debug;
#[cfg(feature = "trace_computation")]
use log::trace;
use prettytable::{format as TableFormat, Table};
use strum::IntoEnumIterator;

use crate::address::{Word, Layout, MachineConfig, HALT_ADDRESS};
use crate::bytecode::{Instruction, Opcode, Program};
use crate::error::CpuError;
use crate::memory::Memory;
use crate::register::{Register, RegisterFile, BRANCH_TRUE, BRANCH_FALSE};
use crate::video::{VideoDevice, NullVideo};

/// Heap metadata written by the argument loader.
pub const ARGUMENT_LENGTH_ADDRESS : Word = 0xFFFE;
pub const ARGUMENT_COUNT_ADDRESS  : Word = 0xFFFD;
/// Holds the heap offset once a program is loaded.
pub const HEAP_OFFSET_ADDRESS     : Word = 0xFFFF;

/// Number of stack words shown by the `Display` impl.
const STACK_DISPLAY_DEPTH: usize = 8;

/// What a single step left the machine doing.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Step {
  Continue,
  Halted,
}

/// Two's complement negation.
fn negate(value: Word) -> Word {
  (!value).wrapping_add(1)
}

/// Splits a two's complement word into its sign and magnitude.
fn sign_magnitude(value: Word) -> (bool, Word) {
  match value & 0x8000 != 0 {
    true  => (true, negate(value)),
    false => (false, value)
  }
}

pub struct Cpu {
  registers : RegisterFile,
  memory    : Memory,
  layout    : Layout,
  video     : Box<dyn VideoDevice>,
}

impl Cpu {

  /// A machine with the given layout and no video output.
  pub fn new(config: MachineConfig) -> Result<Cpu, CpuError> {
    Cpu::with_video(config, Box::new(NullVideo))
  }

  pub fn with_video(config: MachineConfig, video: Box<dyn VideoDevice>) -> Result<Cpu, CpuError> {
    let layout = Layout::new(config)?;
    let mut registers = RegisterFile::new();
    registers.set(Register::Sp, layout.stack_top());
    Ok(Cpu {
      registers,
      memory: Memory::new(),
      layout,
      video,
    })
  }

  // region Accessors

  pub fn layout(&self) -> &Layout {
    &self.layout
  }

  pub fn registers(&self) -> &RegisterFile {
    &self.registers
  }

  pub fn registers_mut(&mut self) -> &mut RegisterFile {
    &mut self.registers
  }

  pub fn memory(&self) -> &Memory {
    &self.memory
  }

  pub fn memory_mut(&mut self) -> &mut Memory {
    &mut self.memory
  }

  pub fn register(&self, register: Register) -> Word {
    self.registers.get(register)
  }

  pub fn set_register(&mut self, register: Register, value: Word) {
    self.registers.set(register, value);
  }

  pub fn is_halted(&self) -> bool {
    self.registers.get(Register::Pc) == HALT_ADDRESS
  }

  // endregion

  // region Loading

  /**
    Copies a program into memory and prepares to run it. The heap starts right after the
    program, the stack holds the halt address so that returning from `main` stops the
    machine, and `pc` points at the entry.

    The program is expected to have been assembled for this machine's `program_offset`. It is
    refused if it does not fit between `program_offset` and `HALT_ADDRESS`.
  */
  pub fn load(&mut self, program: &Program) -> Result<(), CpuError> {
    let size = program.size();
    let available = (HALT_ADDRESS - self.layout.program_offset) as usize;
    if size > available {
      return Err(CpuError::ProgramTooLarge{ size, available });
    }

    for (address, word) in program.memory_image() {
      self.memory.set(address, word);
    }

    self.layout.heap_offset = self.layout.program_offset + size as Word;
    self.memory.set(HEAP_OFFSET_ADDRESS, self.layout.heap_offset);

    self.registers.set(Register::Sp, self.layout.stack_top());
    self.push(HALT_ADDRESS);
    self.registers.set(Register::Pc, program.entry);

    debug!(
      "loaded {} words, heap at {:04x}, entry at {:04x}",
      size, self.layout.heap_offset, program.entry
    );
    Ok(())
  }

  /**
    Copies command-line arguments into the heap, one word per UTF-16 unit with a zero after each
    argument. The total number of words goes to `ARGUMENT_LENGTH_ADDRESS` and the number of
    arguments to `ARGUMENT_COUNT_ADDRESS`. Call this after `load`.
  */
  pub fn load_arguments(&mut self, arguments: &[&str]) -> Result<(), CpuError> {
    let words: Vec<Word> =
      arguments.iter()
               .flat_map(|argument| argument.encode_utf16().chain(std::iter::once(0)))
               .collect();

    let start = self.layout.heap_offset;
    let available = (ARGUMENT_COUNT_ADDRESS as usize).saturating_sub(start as usize);
    if words.len() > available {
      return Err(CpuError::HeapOverflow{ needed: words.len(), available });
    }

    for (i, word) in words.iter().enumerate() {
      self.memory.set(start.wrapping_add(i as Word), *word);
    }
    self.memory.set(ARGUMENT_LENGTH_ADDRESS, words.len() as Word);
    self.memory.set(ARGUMENT_COUNT_ADDRESS, arguments.len() as Word);
    self.memory.set(HEAP_OFFSET_ADDRESS, start);

    debug!("loaded {} argument(s) into {} heap words", arguments.len(), words.len());
    Ok(())
  }

  // endregion

  // region Execution

  /// Runs until the machine halts, returning the finished session.
  pub fn run(&mut self) -> Result<Session, CpuError> {
    let mut session = Session::new();
    session.run(self, None)?;
    Ok(session)
  }

  /// Executes one instruction. Stepping a halted machine does nothing.
  pub fn step(&mut self) -> Result<Step, CpuError> {
    if self.is_halted() {
      return Ok(Step::Halted);
    }

    let address = self.registers.get(Register::Pc);
    let instruction = self.fetch(address)?;

    self.registers.set(Register::Lc, address);
    self.registers.set(Register::Pc, address.wrapping_add(instruction.size() as Word));

    #[cfg(feature = "trace_computation")]
    trace!("{:04x}: {:<16} {}", address, instruction.to_string(), self.registers);

    if let Err(error) = self.execute(&instruction, address) {
      // Leave `pc` on the faulting instruction.
      self.registers.set(Register::Pc, address);
      return Err(error);
    }

    match self.is_halted() {
      true  => Ok(Step::Halted),
      false => Ok(Step::Continue)
    }
  }

  /// Decodes the instruction at `address`.
  pub fn fetch(&mut self, address: Word) -> Result<Instruction, CpuError> {
    let code = self.memory.get(address);
    let opcode =
      Opcode::from_code(code)
        .ok_or(CpuError::UnknownOpcode{ opcode: code, address })?;
    let operands =
      (1..opcode.instruction_size())
        .map(|i| self.memory.get(address.wrapping_add(i as Word)))
        .collect();
    Ok(Instruction::new(opcode, operands))
  }

  fn execute(&mut self, instruction: &Instruction, address: Word) -> Result<(), CpuError> {
    let opcode = instruction.opcode;
    let operands = &instruction.operands;

    // Operand `i` as a register id.
    let register = |i: usize| -> Result<Register, CpuError> {
      Register::from_id(operands[i])
        .ok_or(CpuError::InvalidRegister{ register: operands[i], opcode, address })
    };

    match opcode {

      Opcode::Nop => {}

      // region Moves

      Opcode::Cop => {
        let value = self.registers.get(register(1)?);
        self.registers.set(register(0)?, value);
      }

      Opcode::Cpl => {
        self.registers.set(register(0)?, operands[1]);
      }

      Opcode::Str => {
        let target = self.registers.get(register(0)?);
        let value = self.registers.get(register(1)?);
        self.memory.set(target, value);
      }

      Opcode::Ldr => {
        let target = register(0)?;
        let source = self.registers.get(register(1)?);
        let value = self.memory.get(source);
        self.registers.set(target, value);
      }

      // endregion

      // region Arithmetic

      Opcode::Add => {
        let value = self.registers.get(register(0)?);
        self.registers.update(Register::Ac, |ac| ac.wrapping_add(value));
      }

      Opcode::Sub => {
        let value = negate(self.registers.get(register(0)?));
        self.registers.update(Register::Ac, |ac| ac.wrapping_add(value));
      }

      Opcode::Twc => self.registers.update(register(0)?, negate),

      Opcode::Inc => self.registers.update(register(0)?, |r| r.wrapping_add(1)),

      Opcode::Dec => self.registers.update(register(0)?, |r| r.wrapping_add(negate(1))),

      Opcode::Mul => {
        let value = self.registers.get(register(0)?);
        self.registers.update(Register::Ac, |ac| ac.wrapping_mul(value));
      }

      Opcode::Div => {
        let divisor = self.registers.get(register(0)?);
        if divisor == 0 {
          return Err(CpuError::DivisionByZero{ opcode, address });
        }
        let dividend = self.registers.get(Register::Ac);
        self.registers.set(Register::Ex, dividend % divisor);
        self.registers.set(Register::Ac, dividend / divisor);
      }

      Opcode::Dvc => {
        let divisor = self.registers.get(register(0)?);
        if divisor == 0 {
          return Err(CpuError::DivisionByZero{ opcode, address });
        }
        let (dividend_negative, dividend) = sign_magnitude(self.registers.get(Register::Ac));
        let (divisor_negative, divisor) = sign_magnitude(divisor);
        let quotient = dividend / divisor;

        self.registers.set(Register::Ex, dividend % divisor);
        self.registers.set(
          Register::Ac,
          match dividend_negative == divisor_negative {
            true  => quotient,
            false => negate(quotient)
          }
        );
      }

      // endregion

      // region Bitwise

      Opcode::Xor => {
        let value = self.registers.get(register(0)?);
        self.registers.update(Register::Ac, |ac| ac ^ value);
      }

      Opcode::And => {
        let value = self.registers.get(register(0)?);
        self.registers.update(Register::Ac, |ac| ac & value);
      }

      Opcode::Orr => {
        let value = self.registers.get(register(0)?);
        self.registers.update(Register::Ac, |ac| ac | value);
      }

      Opcode::Not => self.registers.update(register(0)?, |r| !r),

      Opcode::Shr => {
        let amount = self.registers.get(register(1)?) as u32;
        self.registers.update(register(0)?, |r| r.checked_shr(amount).unwrap_or(0));
      }

      Opcode::Shl => {
        let amount = self.registers.get(register(1)?) as u32;
        self.registers.update(register(0)?, |r| r.checked_shl(amount).unwrap_or(0));
      }

      // endregion

      Opcode::Vga => {
        self.video.redraw(self.memory.text(&self.layout), &self.layout);
      }

      // region Stack and control flow

      Opcode::Psh => {
        let value = self.registers.get(register(0)?);
        self.push(value);
      }

      Opcode::Pop => {
        let target = register(0)?;
        let value = self.pop();
        self.registers.set(target, value);
      }

      Opcode::Ret => {
        let target = self.pop();
        self.registers.set(Register::Pc, target);
      }

      Opcode::Cal => self.call(operands[0]),

      Opcode::Cmp => {
        let a = self.registers.get(register(0)?);
        let b = self.registers.get(register(1)?);
        self.registers.set(
          Register::Bi,
          match a == b {
            true  => BRANCH_TRUE,
            false => BRANCH_FALSE
          }
        );
      }

      Opcode::Cle => {
        if self.branch_taken() {
          self.call(operands[0]);
        }
      }

      Opcode::Cln => {
        if !self.branch_taken() {
          self.call(operands[0]);
        }
      }

      Opcode::Gto => {
        let target = self.registers.get(register(0)?);
        self.registers.set(Register::Pc, target);
      }

      Opcode::Gte => {
        let target = self.registers.get(register(0)?);
        if self.branch_taken() {
          self.registers.set(Register::Pc, target);
        }
      }

      Opcode::Gtn => {
        let target = self.registers.get(register(0)?);
        if !self.branch_taken() {
          self.registers.set(Register::Pc, target);
        }
      }

      // endregion

      // region Heap

      Opcode::Sth => {
        let target = self.layout.heap_offset.wrapping_add(self.registers.get(register(0)?));
        let value = self.registers.get(register(1)?);
        self.memory.set(target, value);
      }

      Opcode::Ldh => {
        let target = register(0)?;
        let source = self.layout.heap_offset.wrapping_add(self.registers.get(register(1)?));
        let value = self.memory.get(source);
        self.registers.set(target, value);
      }

      // endregion

    } // end match on opcode

    Ok(())
  }

  // endregion

  // region Low-level utility methods

  fn push(&mut self, value: Word) {
    let sp = self.registers.get(Register::Sp).wrapping_sub(1);
    self.registers.set(Register::Sp, sp);
    self.memory.set(sp, value);
  }

  fn pop(&mut self) -> Word {
    let sp = self.registers.get(Register::Sp);
    let value = self.memory.get(sp);
    self.registers.set(Register::Sp, sp.wrapping_add(1));
    value
  }

  fn call(&mut self, target: Word) {
    let next = self.registers.get(Register::Pc);
    self.push(next);
    self.registers.set(Register::Pc, target);
  }

  fn branch_taken(&self) -> bool {
    self.registers.get(Register::Bi) == BRANCH_TRUE
  }

  // endregion

  // region Display methods

  fn make_register_table(&self) -> Table {
    let mut table = Table::new();

    table.set_format(*TABLE_DISPLAY_FORMAT);
    table.set_titles(row![ubr->"Register", ubl->"Contents"]);

    for register in Register::iter() {
      let value = format!("{:04x}", self.registers.get(register));
      match register == Register::Pc {
        true  => table.add_row(row![r->format!("* --> {} =", register), value]),
        false => table.add_row(row![r->format!("{} =", register), value]),
      };
    }
    table
  }

  fn make_stack_table(&self) -> Table {
    let mut table = Table::new();

    table.set_format(*TABLE_DISPLAY_FORMAT);
    table.set_titles(row![ubr->"Address", ubl->"Contents"]);

    let sp = self.registers.get(Register::Sp) as usize;
    let top = self.layout.stack_top() as usize;
    for address in (sp..top).take(STACK_DISPLAY_DEPTH) {
      table.add_row(
        row![r->format!("{:04x} =", address), format!("{:04x}", self.memory.peek(address as Word))]
      );
    }
    table
  }

  // endregion

}

lazy_static! {
  static ref TABLE_DISPLAY_FORMAT: TableFormat::TableFormat =
    TableFormat::FormatBuilder::new()
      .column_separator('│')
      .borders(' ')
      .separator(
        TableFormat::LinePosition::Title,
        TableFormat::LineSeparator::new('─', '┼', ' ', ' ')
      )
      .separator(
        TableFormat::LinePosition::Bottom,
        TableFormat::LineSeparator::new('─', '┴', ' ', ' ')
      )
      .padding(1, 1)
      .build();
}

impl Display for Cpu {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let register_table = self.make_register_table();
    let stack_table = self.make_stack_table();

    let mut combined_table = table!([register_table, stack_table]);

    combined_table.set_titles(row![ub->"Registers", ub->"Stack"]);
    combined_table.set_format(*TABLE_DISPLAY_FORMAT);

    let state = match self.is_halted() {
      true  => "Halted.",
      false => "Running."
    };

    write!(f, "{}\t{}\n{}", state, self.layout, combined_table)
  }
}

impl std::fmt::Debug for Cpu {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Cpu")
     .field("registers", &self.registers)
     .field("memory", &self.memory)
     .field("layout", &self.layout)
     .finish()
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use std::cell::RefCell;
  use std::rc::Rc;

  use proptest::prelude::*;

  use crate::assembler::assemble_source;
  use crate::bytecode::{Constant, Subroutine};

  fn machine() -> Cpu {
    Cpu::new(MachineConfig::default()).unwrap()
  }

  /// Assembles and loads `text`, then runs it to completion.
  fn run_source(text: &str) -> Cpu {
    let mut cpu = machine();
    let program = assemble_source(text, cpu.layout().program_offset).unwrap();
    cpu.load(&program).unwrap();
    cpu.run().unwrap();
    cpu
  }

  /// Executes a single instruction at the program offset with the given register values.
  fn execute_one(instruction: Instruction, setup: &[(Register, Word)]) -> Result<Cpu, CpuError> {
    let mut cpu = machine();
    let origin = cpu.layout().program_offset;
    for (i, word) in instruction.words().enumerate() {
      cpu.memory_mut().set(origin + i as Word, word);
    }
    cpu.set_register(Register::Pc, origin);
    for (register, value) in setup {
      cpu.set_register(*register, *value);
    }
    cpu.step()?;
    Ok(cpu)
  }

  fn one(opcode: Opcode, operands: &[Word]) -> Instruction {
    Instruction::new(opcode, operands.to_vec())
  }

  #[test]
  fn constant_plus_three_is_eight() {
    let cpu = run_source("
      x = 0x0005
      main:
        cpl aa [x]
        ldr ac aa
        cpl bb 3
        add bb
        ret
    ");
    assert_eq!(cpu.register(Register::Ac), 8);
    assert!(cpu.is_halted());
  }

  #[test]
  fn push_then_pop_leaves_accumulator_alone() {
    let mut cpu = machine();
    let program = assemble_source("main:\n psh ac\n pop ac\n ret", 0x0900).unwrap();
    cpu.load(&program).unwrap();
    cpu.set_register(Register::Ac, 0x1234);
    let sp = cpu.register(Register::Sp);

    assert_eq!(cpu.step(), Ok(Step::Continue));
    assert_eq!(cpu.register(Register::Sp), sp.wrapping_sub(1));
    assert_eq!(cpu.step(), Ok(Step::Continue));
    assert_eq!(cpu.register(Register::Sp), sp);
    assert_eq!(cpu.step(), Ok(Step::Halted));

    assert_eq!(cpu.register(Register::Ac), 0x1234);
    assert_eq!(cpu.register(Register::Pc), HALT_ADDRESS);
  }

  #[test]
  fn loader_prepares_stack_heap_and_entry() {
    let mut cpu = machine();
    let program = assemble_source("x = 7\nmain:\n ret", 0x0900).unwrap();
    cpu.load(&program).unwrap();

    let layout = *cpu.layout();
    assert_eq!(layout.heap_offset, 0x0902);
    assert_eq!(cpu.register(Register::Sp), layout.stack_max);
    assert_eq!(cpu.memory().peek(layout.stack_max), HALT_ADDRESS);
    assert_eq!(cpu.register(Register::Pc), 0x0901);
    assert_eq!(cpu.memory().peek(0x0900), 7);
    assert_eq!(cpu.memory().peek(HEAP_OFFSET_ADDRESS), 0x0902);
  }

  #[test]
  fn loader_refuses_programs_that_reach_the_halt_address() {
    let mut cpu = machine();
    let available = (HALT_ADDRESS - cpu.layout().program_offset) as usize;
    let filler = |count: usize| Program {
      constants: (0..count)
        .map(|i| Constant{ name: None, address: 0x0900 + (i % 0x100) as Word, value: 0 })
        .collect(),
      subroutines: vec![Subroutine{
        name: None,
        address: 0x0900,
        instructions: vec![Instruction::new(Opcode::Ret, vec![])],
      }],
      entry: 0x0900,
    };

    assert_eq!(
      cpu.load(&filler(available)),
      Err(CpuError::ProgramTooLarge{ size: available + 1, available })
    );
    assert_eq!(cpu.layout().heap_offset, cpu.layout().program_offset);

    cpu.load(&filler(available - 1)).unwrap();
    assert_eq!(cpu.layout().heap_offset, HALT_ADDRESS);
  }

  #[test]
  fn oversized_screen_cannot_build_a_machine() {
    assert_eq!(
      Cpu::new(MachineConfig{ video_width: 256, video_height: 256 }).err(),
      Some(CpuError::VideoTooLarge{ width: 256, height: 256 })
    );
  }

  #[test]
  fn fetch_records_last_instruction_and_advances_pc() {
    let cpu = execute_one(one(Opcode::Cpl, &[Register::Dd.id(), 9]), &[]).unwrap();
    assert_eq!(cpu.register(Register::Dd), 9);
    assert_eq!(cpu.register(Register::Lc), 0x0900);
    assert_eq!(cpu.register(Register::Pc), 0x0903);
  }

  #[test]
  fn moves() {
    let cpu = execute_one(one(Opcode::Cop, &[0, 1]), &[(Register::Bb, 42)]).unwrap();
    assert_eq!(cpu.register(Register::Aa), 42);

    let mut cpu = execute_one(
      one(Opcode::Str, &[0, 1]),
      &[(Register::Aa, 0x4000), (Register::Bb, 0xBEEF)]
    ).unwrap();
    assert_eq!(cpu.memory_mut().get(0x4000), 0xBEEF);

    let mut cpu = machine();
    cpu.memory_mut().set(0x4000, 0x0102);
    cpu.memory_mut().set(0x0900, Opcode::Ldr.code());
    cpu.memory_mut().set(0x0901, Register::Cc.id());
    cpu.memory_mut().set(0x0902, Register::Aa.id());
    cpu.set_register(Register::Aa, 0x4000);
    cpu.set_register(Register::Pc, 0x0900);
    cpu.step().unwrap();
    assert_eq!(cpu.register(Register::Cc), 0x0102);
  }

  #[test]
  fn accumulator_arithmetic() {
    let ac = Register::Ac;
    let bb = Register::Bb;

    let cpu = execute_one(one(Opcode::Add, &[1]), &[(ac, 0xFFFF), (bb, 2)]).unwrap();
    assert_eq!(cpu.register(ac), 1);

    let cpu = execute_one(one(Opcode::Sub, &[1]), &[(ac, 1), (bb, 2)]).unwrap();
    assert_eq!(cpu.register(ac), 0xFFFF);

    let cpu = execute_one(one(Opcode::Mul, &[1]), &[(ac, 0x0100), (bb, 0x0101)]).unwrap();
    assert_eq!(cpu.register(ac), 0x0100);

    let cpu = execute_one(one(Opcode::Twc, &[1]), &[(bb, 5)]).unwrap();
    assert_eq!(cpu.register(bb), 0xFFFB);

    let cpu = execute_one(one(Opcode::Inc, &[1]), &[(bb, 0xFFFF)]).unwrap();
    assert_eq!(cpu.register(bb), 0);

    let cpu = execute_one(one(Opcode::Dec, &[1]), &[(bb, 0)]).unwrap();
    assert_eq!(cpu.register(bb), 0xFFFF);
  }

  #[test]
  fn unsigned_division() {
    let cpu = execute_one(
      one(Opcode::Div, &[Register::Bb.id()]),
      &[(Register::Ac, 0xFFF9), (Register::Bb, 2)]
    ).unwrap();
    assert_eq!(cpu.register(Register::Ac), 0x7FFC);
    assert_eq!(cpu.register(Register::Ex), 1);
  }

  #[test]
  fn signed_division_negates_the_quotient_only() {
    // -7 / 2
    let cpu = execute_one(
      one(Opcode::Dvc, &[Register::Bb.id()]),
      &[(Register::Ac, negate(7)), (Register::Bb, 2)]
    ).unwrap();
    assert_eq!(cpu.register(Register::Ac), negate(3));
    assert_eq!(cpu.register(Register::Ex), 1);

    // -8 / -2
    let cpu = execute_one(
      one(Opcode::Dvc, &[Register::Bb.id()]),
      &[(Register::Ac, negate(8)), (Register::Bb, negate(2))]
    ).unwrap();
    assert_eq!(cpu.register(Register::Ac), 4);
    assert_eq!(cpu.register(Register::Ex), 0);
  }

  #[test]
  fn division_by_zero_traps_without_side_effects() {
    for opcode in &[Opcode::Div, Opcode::Dvc] {
      let mut cpu = machine();
      cpu.memory_mut().set(0x0900, opcode.code());
      cpu.memory_mut().set(0x0901, Register::Bb.id());
      cpu.set_register(Register::Pc, 0x0900);
      cpu.set_register(Register::Ac, 10);
      assert_eq!(
        cpu.step(),
        Err(CpuError::DivisionByZero{ opcode: *opcode, address: 0x0900 })
      );
      assert_eq!(cpu.register(Register::Ac), 10);
      assert_eq!(cpu.register(Register::Ex), 0);
      assert_eq!(cpu.register(Register::Pc), 0x0900);
    }
  }

  #[test]
  fn bitwise() {
    let ac = Register::Ac;
    let bb = Register::Bb;

    let cpu = execute_one(one(Opcode::Xor, &[1]), &[(ac, 0b1100), (bb, 0b1010)]).unwrap();
    assert_eq!(cpu.register(ac), 0b0110);
    let cpu = execute_one(one(Opcode::And, &[1]), &[(ac, 0b1100), (bb, 0b1010)]).unwrap();
    assert_eq!(cpu.register(ac), 0b1000);
    let cpu = execute_one(one(Opcode::Orr, &[1]), &[(ac, 0b1100), (bb, 0b1010)]).unwrap();
    assert_eq!(cpu.register(ac), 0b1110);
    let cpu = execute_one(one(Opcode::Not, &[1]), &[(bb, 0x00FF)]).unwrap();
    assert_eq!(cpu.register(bb), 0xFF00);
  }

  #[test]
  fn shifts_take_their_amount_from_a_register() {
    let aa = Register::Aa;
    let bb = Register::Bb;

    let cpu = execute_one(one(Opcode::Shl, &[0, 1]), &[(aa, 0x0101), (bb, 4)]).unwrap();
    assert_eq!(cpu.register(aa), 0x1010);
    let cpu = execute_one(one(Opcode::Shr, &[0, 1]), &[(aa, 0x8000), (bb, 15)]).unwrap();
    assert_eq!(cpu.register(aa), 1);
    let cpu = execute_one(one(Opcode::Shr, &[0, 1]), &[(aa, 0xFFFF), (bb, 16)]).unwrap();
    assert_eq!(cpu.register(aa), 0);
    let cpu = execute_one(one(Opcode::Shl, &[0, 1]), &[(aa, 0xFFFF), (bb, 300)]).unwrap();
    assert_eq!(cpu.register(aa), 0);
  }

  #[test]
  fn compare_sets_branch_indicator() {
    let cpu = execute_one(one(Opcode::Cmp, &[0, 1]), &[(Register::Aa, 3), (Register::Bb, 3)]).unwrap();
    assert_eq!(cpu.register(Register::Bi), BRANCH_TRUE);
    let cpu = execute_one(one(Opcode::Cmp, &[0, 1]), &[(Register::Aa, 3), (Register::Bb, 4)]).unwrap();
    assert_eq!(cpu.register(Register::Bi), BRANCH_FALSE);
  }

  #[test]
  fn call_then_return_resumes_after_the_call() {
    let mut cpu = machine();
    let program = assemble_source("
      helper:
        ret
      main:
        cal {helper}
        inc aa
        ret
    ", 0x0900).unwrap();
    cpu.load(&program).unwrap();
    let sp = cpu.register(Register::Sp);

    cpu.step().unwrap();
    assert_eq!(cpu.register(Register::Pc), 0x0900);
    assert_eq!(cpu.register(Register::Sp), sp - 1);
    cpu.step().unwrap();
    assert_eq!(cpu.register(Register::Pc), 0x0903);
    assert_eq!(cpu.register(Register::Sp), sp);

    cpu.run().unwrap();
    assert_eq!(cpu.register(Register::Aa), 1);
  }

  #[test]
  fn conditional_calls_and_jumps() {
    let cpu = run_source("
      mark:
        inc dd
        ret
      main:
        cpl aa 1
        cmp aa aa
        cle {mark}
        cln {mark}
        cmp aa bb
        cln {mark}
        cpl cc &skip
        gte cc
        inc bb
        cmp aa aa
        gtn cc
        inc bb
        gte cc
        inc bb
      &skip
        ret
    ");
    assert_eq!(cpu.register(Register::Dd), 2);
    assert_eq!(cpu.register(Register::Bb), 2);
  }

  #[test]
  fn countdown_loop_with_unconditional_jump() {
    let cpu = run_source("
      main:
        cpl aa 5
        cpl dd 0
        cpl cc &top
        cpl ex &done
      &top
        cmp aa dd
        gte ex
        inc bb
        dec aa
        gto cc
      &done
        ret
    ");
    assert_eq!(cpu.register(Register::Bb), 5);
    assert_eq!(cpu.register(Register::Aa), 0);
  }

  #[test]
  fn heap_relative_access() {
    let mut cpu = machine();
    let program = assemble_source("
      main:
        cpl aa 2
        cpl bb 0x00ab
        sth aa bb
        ldh cc aa
        ret
    ", 0x0900).unwrap();
    cpu.load(&program).unwrap();
    cpu.run().unwrap();
    let heap = cpu.layout().heap_offset;
    assert_eq!(cpu.memory().peek(heap + 2), 0x00AB);
    assert_eq!(cpu.register(Register::Cc), 0x00AB);
  }

  #[test]
  fn arguments_are_copied_into_the_heap() {
    let mut cpu = machine();
    let program = assemble_source("main:\n ret", 0x0900).unwrap();
    cpu.load(&program).unwrap();
    cpu.load_arguments(&["ab", "c"]).unwrap();

    let heap = cpu.layout().heap_offset;
    let copied: Vec<Word> = (0..5).map(|i| cpu.memory().peek(heap + i)).collect();
    assert_eq!(copied, vec!['a' as Word, 'b' as Word, 0, 'c' as Word, 0]);
    assert_eq!(cpu.memory().peek(ARGUMENT_LENGTH_ADDRESS), 5);
    assert_eq!(cpu.memory().peek(ARGUMENT_COUNT_ADDRESS), 2);
    assert_eq!(cpu.memory().peek(HEAP_OFFSET_ADDRESS), heap);
  }

  #[test]
  fn arguments_may_not_reach_the_metadata() {
    let mut cpu = machine();
    let program = assemble_source("main:\n ret", 0x0900).unwrap();
    cpu.load(&program).unwrap();
    let available = (ARGUMENT_COUNT_ADDRESS - cpu.layout().heap_offset) as usize;
    let huge = "x".repeat(available);
    assert_eq!(
      cpu.load_arguments(&[huge.as_str()]),
      Err(CpuError::HeapOverflow{ needed: available + 1, available })
    );
  }

  #[test]
  fn unknown_opcode_is_fatal() {
    let mut cpu = machine();
    cpu.memory_mut().set(0x0900, 0x0042);
    cpu.set_register(Register::Pc, 0x0900);
    assert_eq!(cpu.step(), Err(CpuError::UnknownOpcode{ opcode: 0x0042, address: 0x0900 }));
  }

  #[test]
  fn register_operands_are_checked() {
    assert_eq!(
      execute_one(one(Opcode::Inc, &[10]), &[]).err(),
      Some(CpuError::InvalidRegister{ register: 10, opcode: Opcode::Inc, address: 0x0900 })
    );
  }

  #[test]
  fn halted_machine_does_not_step() {
    let mut cpu = machine();
    cpu.set_register(Register::Pc, HALT_ADDRESS);
    assert_eq!(cpu.step(), Ok(Step::Halted));
    assert_eq!(cpu.register(Register::Lc), 0);
  }

  struct RecordingVideo {
    frames: Rc<RefCell<Vec<Vec<Word>>>>,
  }

  impl VideoDevice for RecordingVideo {
    fn redraw(&mut self, text: &[Word], layout: &Layout) {
      assert_eq!(text.len(), layout.text_size());
      self.frames.borrow_mut().push(text[..2].to_vec());
    }
  }

  #[test]
  fn vga_redraws_the_text_region() {
    let frames = Rc::new(RefCell::new(Vec::new()));
    let video = RecordingVideo{ frames: frames.clone() };
    let mut cpu = Cpu::with_video(MachineConfig::default(), Box::new(video)).unwrap();
    let program = assemble_source("
      main:
        cpl aa 0
        cpl bb 0x0048
        str aa bb
        vga
        inc aa
        cpl bb 0x0069
        str aa bb
        vga
        ret
    ", 0x0900).unwrap();
    cpu.load(&program).unwrap();
    cpu.run().unwrap();
    assert_eq!(*frames.borrow(), vec![vec![0x48, 0], vec![0x48, 0x69]]);
  }

  #[test]
  fn display_highlights_pc() {
    let mut cpu = machine();
    let program = assemble_source("main:\n ret", 0x0900).unwrap();
    cpu.load(&program).unwrap();
    let text = cpu.to_string();
    assert!(text.contains("* --> pc ="));
    assert!(text.contains("Running."));
    assert!(text.contains("ffff"));
  }

  proptest! {
    #[test]
    fn twos_complement_is_an_involution(x in any::<u16>()) {
      let cpu = execute_one(one(Opcode::Twc, &[0]), &[(Register::Aa, x)]).unwrap();
      let once = cpu.register(Register::Aa);
      let cpu = execute_one(one(Opcode::Twc, &[0]), &[(Register::Aa, once)]).unwrap();
      prop_assert_eq!(cpu.register(Register::Aa), x);
    }

    #[test]
    fn sub_undoes_add(ac in any::<u16>(), x in any::<u16>()) {
      let mut cpu = machine();
      let program = assemble_source("main:\n add bb\n sub bb\n ret", 0x0900).unwrap();
      cpu.load(&program).unwrap();
      cpu.set_register(Register::Ac, ac);
      cpu.set_register(Register::Bb, x);
      cpu.run().unwrap();
      prop_assert_eq!(cpu.register(Register::Ac), ac);
    }

    #[test]
    fn signed_and_unsigned_division_agree_on_positive_operands(
      a in 0u16..0x8000,
      b in 1u16..0x8000,
    ) {
      let setup = [(Register::Ac, a), (Register::Bb, b)];
      let unsigned = execute_one(one(Opcode::Div, &[Register::Bb.id()]), &setup).unwrap();
      let signed = execute_one(one(Opcode::Dvc, &[Register::Bb.id()]), &setup).unwrap();
      prop_assert_eq!(signed.register(Register::Ac), unsigned.register(Register::Ac));
      prop_assert_eq!(signed.register(Register::Ex), unsigned.register(Register::Ex));
    }

    #[test]
    fn negative_dividend_negates_the_quotient(a in 1u16..0x8000, b in 1u16..0x8000) {
      let unsigned = execute_one(
        one(Opcode::Div, &[Register::Bb.id()]),
        &[(Register::Ac, a), (Register::Bb, b)]
      ).unwrap();
      let signed = execute_one(
        one(Opcode::Dvc, &[Register::Bb.id()]),
        &[(Register::Ac, negate(a)), (Register::Bb, b)]
      ).unwrap();
      prop_assert_eq!(signed.register(Register::Ac), negate(unsigned.register(Register::Ac)));
      prop_assert_eq!(signed.register(Register::Ex), unsigned.register(Register::Ex));
    }
  }
}

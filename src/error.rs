//! Errors for each phase: assembling source, decoding a binary, and running a program.

use thiserror::Error;

use crate::address::Word;
use crate::bytecode::Opcode;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
  #[error("assembly error: {0}")]
  Assembly(#[from] AssemblyError),
  #[error("binary error: {0}")]
  Binary(#[from] BinaryError),
  #[error("cpu error: {0}")]
  Cpu(#[from] CpuError),
}

/// Conditions that abort assembly. Line numbers count from 1.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum AssemblyError {
  #[error("line {line}: cannot tokenize `{text}`")]
  Syntax { line: usize, text: String },
  #[error("line {line}: {mnemonic} is not an operation")]
  UnknownMnemonic { line: usize, mnemonic: String },
  #[error("line {line}: {opcode} requires {expected} operands but was given {found}")]
  WrongOperandCount { line: usize, opcode: Opcode, expected: usize, found: usize },
  #[error("line {line}: constant [{name}] is not declared")]
  UndeclaredConstant { line: usize, name: String },
  #[error("line {line}: subroutine {{{name}}} is not declared")]
  UndeclaredSubroutine { line: usize, name: String },
  #[error("line {line}: label &{name} is not declared in this subroutine")]
  UndeclaredLabel { line: usize, name: String },
  #[error("line {line}: constant {name} is already declared")]
  DuplicateConstant { line: usize, name: String },
  #[error("line {line}: subroutine {name} is already declared")]
  DuplicateSubroutine { line: usize, name: String },
  #[error("line {line}: label &{name} is already declared in this subroutine")]
  DuplicateLabel { line: usize, name: String },
  #[error("line {line}: `{token}` is not a valid hex literal")]
  InvalidHex { line: usize, token: String },
  #[error("line {line}: `{token}` is not a valid 16 bit integer")]
  InvalidInteger { line: usize, token: String },
  #[error("line {line}: `{token}` is not a valid constant value")]
  InvalidConstantValue { line: usize, token: String },
  #[error("line {line}: `{token}` is not an operand")]
  UnknownOperand { line: usize, token: String },
  #[error("line {line}: `{token}` is not a valid symbol name")]
  InvalidName { line: usize, token: String },
  #[error("line {line}: instruction outside of any subroutine")]
  InstructionOutsideSubroutine { line: usize },
  #[error("line {line}: label &{name} outside of any subroutine")]
  LabelOutsideSubroutine { line: usize, name: String },
  #[error("line {line}: constant {name} declared inside a subroutine")]
  ConstantInSubroutine { line: usize, name: String },
  #[error("line {line}: program does not fit below address ffff")]
  AddressSpaceExhausted { line: usize },
  #[error("no subroutines; the last subroutine must be main")]
  MissingMain,
  #[error("the last subroutine must be main, found {found}")]
  MisnamedMain { found: String },
}

/// Conditions that make a byte stream unloadable.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum BinaryError {
  #[error("missing SVCB magic number")]
  InvalidMagic,
  #[error("binary has an odd number of bytes ({length}); the payload must be whole words")]
  OddLength { length: usize },
  #[error("binary ends in the middle of {context} at word {offset}")]
  Truncated { offset: usize, context: &'static str },
  #[error("opcode {opcode:04x} at word {offset} does not exist")]
  UnknownOpcode { opcode: Word, offset: usize },
  #[error("{opcode} at {address:04x} runs past the end of its subroutine")]
  InstructionOverrun { opcode: Opcode, address: Word },
  #[error("binary has no subroutines, so it has no entry point")]
  MissingEntryPoint,
  #[error("address ffff is reserved and cannot hold program data")]
  ReservedAddress,
  #[error("subroutine at {address:04x} is too large to encode")]
  SubroutineTooLarge { address: Word },
}

/// Conditions that stop a machine from being built, loaded, or run. During execution the CPU
/// stops at the faulting instruction.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum CpuError {
  #[error("unknown opcode {opcode:04x} at {address:04x}")]
  UnknownOpcode { opcode: Word, address: Word },
  #[error("operand {register:04x} of {opcode} at {address:04x} is not a register")]
  InvalidRegister { register: Word, opcode: Opcode, address: Word },
  #[error("{opcode} at {address:04x} divides by zero")]
  DivisionByZero { opcode: Opcode, address: Word },
  #[error("arguments need {needed} words of heap but only {available} are free")]
  HeapOverflow { needed: usize, available: usize },
  #[error("program of {size} words does not fit in the {available} words above the stack")]
  ProgramTooLarge { size: usize, available: usize },
  #[error("a {width}x{height} text buffer leaves no room for the stack and a program")]
  VideoTooLarge { width: Word, height: Word },
}

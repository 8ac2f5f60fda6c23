/*!
  A small virtual computer: a 16 bit word-addressed CPU, an assembler for its instruction set,
  and the SVB binary format that connects the two.

  Source text is tokenized and assembled into a `Program`, which `encode_program` turns into
  bytes and `decode_program` turns back. A `Cpu` loads a `Program` and runs it until `pc`
  reaches `0xFFFF`.
*/

#[macro_use] extern crate prettytable;
#[macro_use] extern crate lazy_static;

pub mod address;
pub mod assembler;
pub mod bytecode;
pub mod cpu;
pub mod error;
pub mod memory;
pub mod register;
pub mod symboltable;
pub mod video;

pub use address::{Word, Layout, MachineConfig, Section, HALT_ADDRESS};
pub use assembler::{assemble, assemble_source, Assembler};
pub use bytecode::{encode_program, decode_program, Instruction, Opcode, Program};
pub use cpu::{Cpu, Session, Step};
pub use error::{Error, Result, AssemblyError, BinaryError, CpuError};
pub use register::Register;
pub use video::{VideoDevice, NullVideo};

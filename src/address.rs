//! Words, addresses, and the layout of the 64K-word address space.
//!
//! The address space is split into four contiguous regions, computed from the dimensions of
//! the video text buffer:
//!
//! ```text
//! text     [0, stack_min)                 video text buffer
//! stack    [stack_min, stack_max]         grows downward from `stack_max`
//! program  [program_offset, heap_offset)  assembled constants and code
//! heap     [heap_offset, 0xFFFF)          runtime data, e.g. command-line arguments
//! ```

use std::fmt::{Display, Formatter};

use strum_macros::{Display as StrumDisplay, IntoStaticStr};

use crate::error::CpuError;

/// Registers, memory cells, opcodes and operands are all one 16 bit word.
pub type Word = u16;

/// Number of addressable words.
pub const ADDRESS_SPACE_SIZE: usize = 1 << 16;

/// A `pc` equal to this address halts the machine. It is never a constant or instruction address.
pub const HALT_ADDRESS: Word = 0xFFFF;

/// Words of stack between the end of the text buffer and the start of the program.
const STACK_WORDS: Word = 303;

/// Largest text buffer that leaves room for the stack and at least one program word below
/// `HALT_ADDRESS`.
pub const MAX_VIDEO_SIZE: usize = HALT_ADDRESS as usize - STACK_WORDS as usize - 2;

/// Settings from which a `Layout` is derived.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct MachineConfig {
  pub video_width  : Word,
  pub video_height : Word,
}

impl Default for MachineConfig {
  fn default() -> MachineConfig {
    MachineConfig {
      video_width  : 80,
      video_height : 25,
    }
  }
}

#[derive(
  StrumDisplay, IntoStaticStr,
  Copy, Clone, Eq, PartialEq, Debug, Hash
)]
#[strum(serialize_all = "snake_case")]
pub enum Section {
  Text,
  Stack,
  Program,
  Heap,
}

/**
  Region boundaries of the address space. Everything except `heap_offset` is fixed by the
  `MachineConfig`; `heap_offset` is moved past the program exactly once, when a program is
  loaded.
*/
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct Layout {
  pub video_width    : Word,
  pub video_height   : Word,
  pub stack_min      : Word,
  pub stack_max      : Word,
  pub program_offset : Word,
  pub heap_offset    : Word,
}

impl Layout {

  /// Fails if the text buffer is so large that the regions would not fit below `HALT_ADDRESS`.
  pub fn new(config: MachineConfig) -> Result<Layout, CpuError> {
    let video_size = config.video_width as usize * config.video_height as usize;
    match video_size <= MAX_VIDEO_SIZE {
      true  => Ok(Layout::fitted(config, video_size as Word)),
      false => Err(CpuError::VideoTooLarge{
        width  : config.video_width,
        height : config.video_height
      })
    }
  }

  /// `video_size` must be at most `MAX_VIDEO_SIZE`.
  fn fitted(config: MachineConfig, video_size: Word) -> Layout {
    let program_offset = video_size + STACK_WORDS + 1;
    Layout {
      video_width  : config.video_width,
      video_height : config.video_height,
      stack_min    : video_size + 1,
      stack_max    : video_size + STACK_WORDS,
      program_offset,
      heap_offset  : program_offset,
    }
  }

  /// Number of words in the video text buffer.
  pub fn text_size(&self) -> usize {
    self.video_width as usize * self.video_height as usize
  }

  /// Initial stack pointer. The stack is pre-decremented, so the first push lands on `stack_max`.
  pub fn stack_top(&self) -> Word {
    self.stack_max.wrapping_add(1)
  }

  pub fn section_of(&self, address: Word) -> Section {
    match address {
      a if a < self.stack_min    => Section::Text,
      a if a <= self.stack_max   => Section::Stack,
      a if a < self.heap_offset  => Section::Program,
      _                          => Section::Heap
    }
  }

}

impl Default for Layout {
  fn default() -> Layout {
    let config = MachineConfig::default();
    Layout::fitted(config, config.video_width * config.video_height)
  }
}

impl Display for Layout {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(
      f,
      "text [0000, {:04x})  stack [{:04x}, {:04x}]  program [{:04x}, {:04x})  heap [{:04x}, ffff)",
      self.stack_min,
      self.stack_min, self.stack_max,
      self.program_offset, self.heap_offset,
      self.heap_offset
    )
  }
}

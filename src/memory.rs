//! The 64K-word address space.

use crate::address::{Word, ADDRESS_SPACE_SIZE, Layout};

/// Value of a word that has never been written.
pub const DEFAULT_WORD: Word = 0x0000;

/**
  Word-addressed random access memory covering every 16 bit address. An address is "mapped"
  once it has been written or read through `get`; a read of an unmapped address yields
  `DEFAULT_WORD` and maps it. Observers that must not disturb the mapping use `peek`.
*/
#[derive(Clone)]
pub struct Memory {
  words  : Box<[Word]>,
  mapped : Box<[bool]>,
}

impl Memory {

  pub fn new() -> Memory {
    Memory {
      words  : vec![DEFAULT_WORD; ADDRESS_SPACE_SIZE].into_boxed_slice(),
      mapped : vec![false; ADDRESS_SPACE_SIZE].into_boxed_slice(),
    }
  }

  pub fn get(&mut self, address: Word) -> Word {
    self.mapped[address as usize] = true;
    self.words[address as usize]
  }

  pub fn set(&mut self, address: Word, value: Word) {
    self.mapped[address as usize] = true;
    self.words[address as usize] = value;
  }

  /// Reads a word without mapping it.
  pub fn peek(&self, address: Word) -> Word {
    self.words[address as usize]
  }

  pub fn is_mapped(&self, address: Word) -> bool {
    self.mapped[address as usize]
  }

  pub fn mapped_addresses(&self) -> impl Iterator<Item = Word> + '_ {
    self.mapped
        .iter()
        .enumerate()
        .filter(|(_, mapped)| **mapped)
        .map(|(address, _)| address as Word)
  }

  /// The video text buffer, `layout.text_size()` words starting at address zero.
  pub fn text(&self, layout: &Layout) -> &[Word] {
    &self.words[..layout.text_size().min(ADDRESS_SPACE_SIZE)]
  }

}

impl Default for Memory {
  fn default() -> Memory {
    Memory::new()
  }
}

impl std::fmt::Debug for Memory {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "Memory {{ mapped: {} words }}", self.mapped_addresses().count())
  }
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn unwritten_reads_default_and_materialize() {
    let mut memory = Memory::new();
    assert!(!memory.is_mapped(0x1234));
    assert_eq!(memory.peek(0x1234), DEFAULT_WORD);
    assert!(!memory.is_mapped(0x1234));
    assert_eq!(memory.get(0x1234), DEFAULT_WORD);
    assert!(memory.is_mapped(0x1234));
  }

  #[test]
  fn writes_are_visible_at_every_address() {
    let mut memory = Memory::new();
    memory.set(0, 1);
    memory.set(0xFFFF, 2);
    assert_eq!(memory.get(0), 1);
    assert_eq!(memory.get(0xFFFF), 2);
    assert_eq!(memory.mapped_addresses().collect::<Vec<Word>>(), vec![0, 0xFFFF]);
  }

  #[test]
  fn text_region_is_the_video_buffer() {
    let layout = Layout::default();
    let mut memory = Memory::new();
    memory.set(1999, 0x0741);
    memory.set(2000, 0x0742);
    let text = memory.text(&layout);
    assert_eq!(text.len(), 2000);
    assert_eq!(text[1999], 0x0741);
  }
}

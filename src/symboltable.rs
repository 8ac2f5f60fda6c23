use std::collections::HashMap;

use bimap::BiMap;
use string_cache::DefaultAtom;

use crate::address::Word;

/**
  The assembler's symbol table has three namespaces, each mapping a name to an address:

   - constants, referenced as `[name]`. Every constant occupies at least one word, so
     constant addresses are unique as well as names, and the table is a BiMap that refuses
     to overwrite either side.
   - subroutines, referenced as `{name}`. An empty subroutine shares its address with the
     next one, so this is a plain map.
   - labels, referenced as `&name`, with one scope per subroutine.

  The table exists only while assembling; nothing in it reaches the binary.
*/
pub struct SymbolTable {
  constants   : BiMap<DefaultAtom, Word>,
  subroutines : HashMap<DefaultAtom, Word>,
  labels      : Vec<HashMap<DefaultAtom, Word>>,
}

impl SymbolTable {

  pub fn new() -> SymbolTable {
    SymbolTable{
      constants   : BiMap::new(),
      subroutines : HashMap::new(),
      labels      : Vec::new(),
    }
  }

  // region Constants

  pub fn constant_address(&self, name: &str) -> Option<Word> {
    self.constants.get_by_left(&DefaultAtom::from(name)).cloned()
  }

  pub fn insert_constant(&mut self, name: DefaultAtom, address: Word)
    -> Result<(), (DefaultAtom, Word)>
  {
    self.constants.insert_no_overwrite(name, address)
  }

  // endregion

  // region Subroutines

  pub fn subroutine_address(&self, name: &str) -> Option<Word> {
    self.subroutines.get(&DefaultAtom::from(name)).cloned()
  }

  /// Records a subroutine and opens a new label scope for it. Returns the scope index, or
  /// `None` if the name is taken.
  pub fn insert_subroutine(&mut self, name: DefaultAtom, address: Word) -> Option<usize> {
    if self.subroutines.contains_key(&name) {
      return None;
    }
    self.subroutines.insert(name, address);
    self.labels.push(HashMap::new());
    Some(self.labels.len() - 1)
  }

  // endregion

  // region Labels

  /// Returns `false` if the label already exists in `scope`.
  pub fn insert_label(&mut self, scope: usize, name: DefaultAtom, address: Word) -> bool {
    match self.labels.get_mut(scope) {
      Some(labels) if !labels.contains_key(&name) => {
        labels.insert(name, address);
        true
      }
      _ => false
    }
  }

  pub fn label_address(&self, scope: usize, name: &str) -> Option<Word> {
    self.labels
        .get(scope)
        .and_then(|labels| labels.get(&DefaultAtom::from(name)).cloned())
  }

  // endregion

}

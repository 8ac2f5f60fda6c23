//! The video device the `vga` instruction hands the text region to.

use crate::address::{Layout, Word};

/**
  Something that can draw the text region of memory. The CPU calls `redraw` once per `vga`
  instruction and ignores what happens next. `text` holds `layout.text_size()` words in row-major
  order, one character per word.
*/
pub trait VideoDevice {
  fn redraw(&mut self, text: &[Word], layout: &Layout);
}

/// A device that draws nothing.
#[derive(Copy, Clone, Debug, Default)]
pub struct NullVideo;

impl VideoDevice for NullVideo {
  fn redraw(&mut self, _text: &[Word], _layout: &Layout) {}
}

/// Renders the text region as lines of characters. Words that are not valid characters, and
/// the zero word, render as spaces.
pub fn render_text(text: &[Word], layout: &Layout) -> String {
  let width = (layout.video_width as usize).max(1);
  let mut rendered = String::with_capacity(text.len() + text.len() / width);
  for (row, line) in text.chunks(width).enumerate() {
    if row > 0 {
      rendered.push('\n');
    }
    let characters = std::char::decode_utf16(line.iter().cloned())
      .map(|c| match c {
        Ok(c) if c != '\0' && !c.is_control() => c,
        _ => ' '
      });
    rendered.extend(characters);
  }
  rendered
}

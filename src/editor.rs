use anyhow::{anyhow, Context, Result};
use std::io::Write;

/// Multi-line text with a cursor, edited one key at a time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextBuffer {
    text: String,
    cursor: usize, // byte offset, always on a char boundary
}

impl TextBuffer {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            cursor: text.len(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn insert(&mut self, c: char) {
        self.text.insert(self.cursor, c);
        self.cursor += c.len_utf8();
    }

    pub fn newline(&mut self) {
        self.insert('\n');
    }

    pub fn backspace(&mut self) {
        if let Some(c) = self.text[..self.cursor].chars().next_back() {
            self.cursor -= c.len_utf8();
            self.text.remove(self.cursor);
        }
    }

    pub fn delete(&mut self) {
        if self.cursor < self.text.len() {
            self.text.remove(self.cursor);
        }
    }

    pub fn left(&mut self) {
        if let Some(c) = self.text[..self.cursor].chars().next_back() {
            self.cursor -= c.len_utf8();
        }
    }

    pub fn right(&mut self) {
        if let Some(c) = self.text[self.cursor..].chars().next() {
            self.cursor += c.len_utf8();
        }
    }

    pub fn home(&mut self) {
        self.cursor = self.line_start();
    }

    pub fn end(&mut self) {
        self.cursor = self.text[self.cursor..]
            .find('\n')
            .map_or(self.text.len(), |i| self.cursor + i);
    }

    pub fn up(&mut self) {
        let start = self.line_start();
        if start == 0 {
            self.cursor = 0;
            return;
        }
        let column = self.text[start..self.cursor].chars().count();
        let prev_start = self.text[..start - 1].rfind('\n').map_or(0, |i| i + 1);
        self.cursor = advance(&self.text, prev_start, start - 1, column);
    }

    pub fn down(&mut self) {
        let column = self.text[self.line_start()..self.cursor].chars().count();
        let Some(offset) = self.text[self.cursor..].find('\n') else {
            self.cursor = self.text.len();
            return;
        };
        let next_start = self.cursor + offset + 1;
        let next_end = self.text[next_start..]
            .find('\n')
            .map_or(self.text.len(), |i| next_start + i);
        self.cursor = advance(&self.text, next_start, next_end, column);
    }

    /// (line, column) of the cursor, both counted in chars from zero.
    pub fn position(&self) -> (usize, usize) {
        let before = &self.text[..self.cursor];
        let line = before.matches('\n').count();
        let column = before[self.line_start()..].chars().count();
        (line, column)
    }

    fn line_start(&self) -> usize {
        self.text[..self.cursor].rfind('\n').map_or(0, |i| i + 1)
    }
}

/// Byte offset `column` chars into `text[start..end]`, clamped to `end`.
fn advance(text: &str, start: usize, end: usize, column: usize) -> usize {
    text[start..end]
        .char_indices()
        .nth(column)
        .map_or(end, |(i, _)| start + i)
}

/// The operator's preferred editor: `$VISUAL`, then `$EDITOR`, then `vi`.
pub fn editor_command() -> String {
    ["VISUAL", "EDITOR"]
        .into_iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|e| !e.trim().is_empty())
        .unwrap_or_else(|| "vi".to_string())
}

/// Opens `text` in an external editor and returns what was saved.
///
/// The caller must release the terminal first.
pub fn edit_externally(text: &str) -> Result<String> {
    let mut file = tempfile::Builder::new()
        .prefix("outreach-")
        .suffix(".txt")
        .tempfile()
        .context("Failed to create temporary file for editing")?;
    file.write_all(text.as_bytes())
        .context("Failed to write temporary file")?;
    file.flush()?;

    let command = editor_command();
    let mut parts = command.split_whitespace();
    let program = parts.next().ok_or_else(|| anyhow!("Editor command is empty"))?;

    let status = std::process::Command::new(program)
        .args(parts)
        .arg(file.path())
        .status()
        .with_context(|| format!("Failed to launch editor '{}'", program))?;

    if !status.success() {
        return Err(anyhow!("Editor '{}' exited with {}", program, status));
    }

    let edited = std::fs::read_to_string(file.path())
        .context("Failed to read edited text back")?;
    Ok(edited.trim_end_matches('\n').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_backspace() {
        let mut buf = TextBuffer::new("Hi");
        buf.insert(' ');
        buf.insert('J');
        assert_eq!(buf.text(), "Hi J");

        buf.backspace();
        buf.backspace();
        assert_eq!(buf.text(), "Hi");

        let mut empty = TextBuffer::default();
        empty.backspace();
        assert_eq!(empty.text(), "");
    }

    #[test]
    fn test_cursor_movement_with_multibyte_chars() {
        let mut buf = TextBuffer::new("Zoë");
        buf.left();
        buf.insert('x');
        assert_eq!(buf.text(), "Zoxë");

        buf.right();
        buf.right();
        buf.insert('!');
        assert_eq!(buf.text(), "Zoxë!");

        buf.home();
        buf.delete();
        assert_eq!(buf.text(), "oxë!");
    }

    #[test]
    fn test_vertical_movement_keeps_column() {
        let mut buf = TextBuffer::new("Dear Ada,\nHi\nThanks for the talk");
        assert_eq!(buf.position(), (2, 19));

        buf.up();
        assert_eq!(buf.position(), (1, 2));

        buf.up();
        assert_eq!(buf.position(), (0, 2));
        buf.insert('_');
        assert_eq!(buf.text(), "De_ar Ada,\nHi\nThanks for the talk");

        buf.down();
        buf.down();
        assert_eq!(buf.position(), (2, 2));

        buf.down();
        assert_eq!(buf.position(), (2, 19));
    }

    #[test]
    fn test_end_and_newline() {
        let mut buf = TextBuffer::new("one\ntwo");
        buf.up();
        buf.home();
        buf.end();
        buf.newline();
        buf.insert('x');
        assert_eq!(buf.text(), "one\nx\ntwo");
    }

    #[test]
    fn test_editor_command_falls_back() {
        let visual = std::env::var("VISUAL").ok();
        let editor = std::env::var("EDITOR").ok();
        unsafe {
            std::env::remove_var("VISUAL");
            std::env::set_var("EDITOR", "nano -w");
        }
        assert_eq!(editor_command(), "nano -w");

        unsafe { std::env::set_var("VISUAL", "  "); }
        assert_eq!(editor_command(), "nano -w");

        unsafe { std::env::set_var("VISUAL", "hx"); }
        assert_eq!(editor_command(), "hx");

        unsafe { std::env::remove_var("VISUAL"); }
        unsafe { std::env::remove_var("EDITOR"); }
        assert_eq!(editor_command(), "vi");

        unsafe {
            if let Some(v) = visual { std::env::set_var("VISUAL", v); }
            if let Some(e) = editor { std::env::set_var("EDITOR", e); }
        }
    }
}

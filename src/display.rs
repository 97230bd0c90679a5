use std::collections::BTreeSet;
use std::fmt::Write;

use unicode_width::UnicodeWidthChar;

use crate::{Annotation, AnnotationSet};

/// Renders a set's annotations as underlines beneath the document text.
///
/// Line breaks in the text are drawn as `⏎` so every column stays aligned.
pub struct AnnotationSetDisplay<'a> {
    text: &'a str,
    set: &'a AnnotationSet,
    include_types: BTreeSet<String>,
    include_all: bool,
    show_ids: bool,
}

// Alice met Bob.
// ╰───╯Person {"gender":"female"}
//       ╰─╯Verb
//           ╰─╯Person
//              ╰Stop
//
// Annotations are listed in document order; zero-length annotations
// draw a lone `╰` at their offset.
impl<'a> std::fmt::Display for AnnotationSetDisplay<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // display column of each char boundary, so column_at[i] is the
        // width of the first i chars
        let mut opening_line = String::with_capacity(self.text.len());
        let mut column_at = Vec::with_capacity(self.text.len() + 1);
        let mut column = 0;
        column_at.push(column);
        for ch in self.text.chars() {
            let shown = match ch {
                '\n' | '\r' => '⏎',
                '\t' => ' ',
                other => other,
            };
            opening_line.push(shown);
            column += UnicodeWidthChar::width(shown).unwrap_or(0);
            column_at.push(column);
        }

        f.write_str(&opening_line)?;

        for annotation in self.set.iter().filter(|a| self.is_included(a)) {
            f.write_char('\n')?;

            let last = column_at.len() - 1;
            let start_col = column_at[annotation.start().min(last)];
            let end_col = column_at[annotation.end().min(last)];
            for _ in 0..start_col {
                f.write_char(' ')?;
            }

            f.write_char('╰')?;

            let width = end_col - start_col;
            for _ in (start_col + 1)..end_col.saturating_sub(1) {
                f.write_char('─')?;
            }

            if width > 1 {
                f.write_char('╯')?;
            }

            f.write_str(annotation.annotation_type())?;
            if self.show_ids {
                write!(f, "#{}", annotation.id())?;
            }
            if !annotation.features().is_empty() {
                let features = serde_json::to_string(annotation.features())
                    .map_err(|_| std::fmt::Error)?;
                write!(f, " {}", features)?;
            }
        }

        Ok(())
    }
}

impl<'a> AnnotationSetDisplay<'a> {
    pub fn new(text: &'a str, set: &'a AnnotationSet) -> Self {
        AnnotationSetDisplay {
            text,
            set,
            include_types: BTreeSet::new(),
            include_all: false,
            show_ids: false,
        }
    }

    fn is_included(&self, annotation: &Annotation) -> bool {
        self.include_all || self.include_types.contains(annotation.annotation_type())
    }

    pub fn include(&mut self, annotation_type: &str) {
        self.include_types.insert(annotation_type.to_string());
    }

    /// Takes self
    pub fn with(mut self, annotation_type: &str) -> Self {
        self.include(annotation_type);
        self
    }

    /// Takes self, includes every type
    pub fn with_all(mut self) -> Self {
        self.include_all = true;
        self
    }

    /// Suffix each type with `#id`.
    pub fn with_ids(mut self) -> Self {
        self.show_ids = true;
        self
    }
}

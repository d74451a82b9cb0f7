//! Columnar tree rendering for discussion output.

use colored::Colorize;
use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::item_set::ItemSet;
use crate::types::{Id, Item};

pub const ITEM_LINK_PREFIX: &str = "https://news.ycombinator.com/item?id=";

struct TreeLine {
    link: String,
    by: String,
    age: String,
    indent: String,
    text: String,
    root: bool,
    active: bool,
}

/// Buffers lines for a batch of trees so the author and age columns can be
/// width-aligned, then writes them in one pass.
pub struct TreeWriter {
    now: SystemTime,
    active_after: SystemTime,
    lines: Vec<TreeLine>,
    show_color: bool,
    max_width: usize,
}

impl TreeWriter {
    /// `max_width` of 0 disables wrapping.
    pub fn new(
        now: SystemTime,
        active_after: SystemTime,
        show_color: bool,
        max_width: usize,
    ) -> Self {
        Self {
            now,
            active_after,
            lines: Vec::new(),
            show_color,
            max_width,
        }
    }

    /// Queue `root` and its subtree, children newest first.
    pub fn write_tree(&mut self, root: &Arc<Item>, by_parent: &HashMap<Id, ItemSet>) {
        self.write_tree_recurse(root, by_parent, String::new());
    }

    fn write_tree_recurse(
        &mut self,
        item: &Arc<Item>,
        by_parent: &HashMap<Id, ItemSet>,
        indent: String,
    ) {
        let is_active = item.is_active(self.active_after);
        let has_active_child = by_parent
            .get(&item.id)
            .is_some_and(|kids| kids.iter().any(|kid| kid.is_active(self.active_after)));

        self.push_line(
            item,
            is_active || has_active_child || item.is_root(),
            is_active,
            &indent,
        );

        let children = by_parent
            .get(&item.id)
            .map(ItemSet::order_by_time_desc)
            .unwrap_or_default();

        for (i, child) in children.iter().enumerate() {
            let rail = if i + 1 != children.len() { "|" } else { " " };
            self.write_tree_recurse(child, by_parent, format!("{indent}{rail}"));
        }
    }

    fn push_line(&mut self, item: &Item, show_text: bool, active: bool, indent: &str) {
        let text = if show_text {
            let raw = if item.dead {
                "[dead]"
            } else if item.deleted {
                "[deleted]"
            } else if !item.title.is_empty() {
                &item.title
            } else {
                &item.text
            };
            clean_text(raw)
        } else {
            String::new()
        };

        let age = self
            .now
            .duration_since(item.created())
            .unwrap_or(Duration::ZERO);

        self.lines.push(TreeLine {
            link: format!("{ITEM_LINK_PREFIX}{}", item.id),
            by: item.by.clone(),
            age: format_age(age),
            indent: indent.to_string(),
            text,
            root: item.is_root(),
            active,
        });
    }

    pub fn write_to(&self, w: &mut dyn Write) -> io::Result<()> {
        let by_width = self.lines.iter().map(|l| l.by.len()).max().unwrap_or(0);
        let age_width = self.lines.iter().map(|l| l.age.len()).max().unwrap_or(0);

        for (i, line) in self.lines.iter().enumerate() {
            if line.root && i != 0 {
                writeln!(w)?;
            }

            let mut out = String::new();
            let mut printable = 0;

            out.push_str(&line.link);
            printable += line.link.len();

            out.push(' ');
            out.push_str(&" ".repeat(by_width - line.by.len()));
            out.push_str(&line.by);
            printable += by_width + 1;

            let age = format!("{:>age_width$}", line.age);
            if self.show_color {
                let colored_age = if line.active {
                    age.bright_blue()
                } else {
                    age.blue()
                };
                out.push(' ');
                out.push_str(&colored_age.to_string());
            } else {
                out.push(' ');
                out.push_str(&age);
            }
            printable += age_width + 1;

            let mut rails = format!(" {}", line.indent);
            if !line.indent.is_empty() {
                rails.push('\\');
                if !line.text.is_empty() {
                    rails.push_str("- ");
                }
            }
            printable += rails.len();
            if self.show_color {
                out.push_str(&rails.bright_black().to_string());
            } else {
                out.push_str(&rails);
            }

            let text = truncated(&line.text, self.max_width, printable);
            if self.show_color && line.root {
                out.push_str(&text.bright_green().to_string());
            } else {
                out.push_str(&text);
            }

            writeln!(w, "{out}")?;
        }

        Ok(())
    }
}

/// Cap `text` to the remaining width in characters, appending an ellipsis
/// when something was cut.
fn truncated(text: &str, max_width: usize, printable: usize) -> String {
    if max_width == 0 {
        return text.to_string();
    }

    let remaining = max_width.saturating_sub(printable).max(1);
    if text.chars().count() <= remaining {
        return text.to_string();
    }

    let mut out: String = text.chars().take(remaining.saturating_sub(1)).collect();
    out.push('…');
    out
}

/// Unescape the common HTML entities, scrub control characters, and
/// collapse runs of whitespace.
pub fn clean_text(text: &str) -> String {
    let unescaped = text
        .replace("<p>", " ")
        .replace("</p>", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .replace("&#39;", "'");

    let scrubbed: String = unescaped
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();

    scrubbed.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Positive duration for columnar display; left-padding aligns columns.
pub fn format_age(d: Duration) -> String {
    let total_minutes = d.as_secs() / 60;

    if total_minutes < 60 {
        return format!("{total_minutes}m");
    }

    let hours = total_minutes / 60;
    let minutes = total_minutes % 60;
    format!("{hours}h{minutes:>2}m")
}

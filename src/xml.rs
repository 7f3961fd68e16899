//! Element-name sanitizing and the small document model written to disk.
//!
//! Documents are headless (no XML declaration), one root element, two-space indentation.
//! A [`View`] maps element names to [`Record`]s; each record is a flat list of fields.

/// Turn any display string into a valid element name.
///
/// Whitespace runs become `_`, anything outside `[A-Za-z0-9_]` becomes `_`, and a
/// leading `_` is added when the result does not start with a letter.
pub fn sanitize(label: &str) -> String {
    let mut out = String::with_capacity(label.len() + 1);
    let mut in_space = false;
    for ch in label.chars() {
        if ch.is_whitespace() {
            if !in_space {
                out.push('_');
            }
            in_space = true;
            continue;
        }
        in_space = false;
        if ch.is_ascii_alphanumeric() || ch == '_' {
            out.push(ch);
        } else {
            out.push('_');
        }
    }
    if !out.starts_with(|c: char| c.is_ascii_alphabetic()) {
        out.insert(0, '_');
    }
    out
}

/// Flat, ordered set of named text fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, String)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((name.to_string(), value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str())
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

/// Label -> record mapping. Labels are stored as given and must already be valid
/// element names (see [`sanitize`]); inserting an existing label replaces the earlier
/// record but keeps its position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct View {
    entries: Vec<(String, Record)>,
}

impl View {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, label: &str, record: Record) {
        debug_assert!(is_element_name(label), "unsanitized label: {label}");
        match self.entries.iter_mut().find(|(k, _)| k == label) {
            Some(slot) => slot.1 = record,
            None => self.entries.push((label.to_string(), record)),
        }
    }

    pub fn get(&self, label: &str) -> Option<&Record> {
        self.entries.iter().find(|(k, _)| k == label).map(|(_, r)| r)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.entries.iter().map(|(_, r)| r)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append every entry of `other`, with the usual overwrite rule.
    pub fn extend(&mut self, other: &View) {
        for (k, r) in &other.entries {
            self.insert(k, r.clone());
        }
    }
}

pub fn render_view(root: &str, view: &View) -> String {
    let root = sanitize(root);
    let mut out = format!("<{}>\n", root);
    for (label, record) in &view.entries {
        write_record(&mut out, label, record, 1);
    }
    out.push_str(&format!("</{}>\n", root));
    out
}

pub fn render_record(root: &str, record: &Record) -> String {
    let mut out = String::new();
    write_record(&mut out, &sanitize(root), record, 0);
    out
}

fn write_record(out: &mut String, name: &str, record: &Record, depth: usize) {
    let pad = "  ".repeat(depth);
    out.push_str(&format!("{pad}<{name}>\n"));
    for (field, value) in record.fields() {
        if value.is_empty() {
            out.push_str(&format!("{pad}  <{field}/>\n"));
        } else {
            out.push_str(&format!("{pad}  <{field}>{}</{field}>\n", escape(value)));
        }
    }
    out.push_str(&format!("{pad}</{name}>\n"));
}

/// True for names `sanitize` can produce: a letter or `_`, then `[A-Za-z0-9_]`.
pub fn is_element_name(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

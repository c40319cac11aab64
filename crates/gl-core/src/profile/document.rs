//! In-memory model of the profile file
//!
//! A [`ProfileDocument`] is the parsed line sequence. Every mutation the
//! store performs is applied here first and the whole document is then
//! rendered back in one write. Line order, blank lines and lines we do
//! not understand survive the round trip.

use super::{HEADER, TYPE_TAG};

/// One settings line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileSetting {
    pub path: String,
    pub scope: i32,
    pub type_tag: i32,
    pub value: String,
}

impl ProfileSetting {
    /// Create a setting with the standard type tag
    pub fn new(path: impl Into<String>, value: impl Into<String>, scope: i32) -> Self {
        Self {
            path: path.into(),
            scope,
            type_tag: TYPE_TAG,
            value: value.into(),
        }
    }

    /// Parse a `path\tscope\ttype\tvalue` line.
    ///
    /// The value is everything after the third tab. Returns `None` for
    /// lines with fewer than four fields or non-numeric scope/type.
    pub fn parse(line: &str) -> Option<Self> {
        let mut fields = line.splitn(4, '\t');
        let path = fields.next()?;
        let scope = fields.next()?.trim().parse().ok()?;
        let type_tag = fields.next()?.trim().parse().ok()?;
        let value = fields.next()?;

        Some(Self {
            path: path.to_string(),
            scope,
            type_tag,
            value: value.to_string(),
        })
    }

    /// Render as a file line (no terminator)
    pub fn render(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}",
            self.path, self.scope, self.type_tag, self.value
        )
    }
}

/// A line of the profile file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileLine {
    /// `PHD Config 1`
    Header,
    /// Empty or whitespace-only line, kept verbatim
    Blank(String),
    /// A settings line
    Setting(ProfileSetting),
    /// Anything else, kept verbatim and otherwise ignored
    Other(String),
}

impl ProfileLine {
    fn parse(line: &str) -> Self {
        if line == HEADER {
            ProfileLine::Header
        } else if line.trim().is_empty() {
            ProfileLine::Blank(line.to_string())
        } else {
            match ProfileSetting::parse(line) {
                Some(setting) => ProfileLine::Setting(setting),
                None => ProfileLine::Other(line.to_string()),
            }
        }
    }

    fn render(&self) -> String {
        match self {
            ProfileLine::Header => HEADER.to_string(),
            ProfileLine::Blank(raw) | ProfileLine::Other(raw) => raw.clone(),
            ProfileLine::Setting(setting) => setting.render(),
        }
    }

    fn as_setting(&self) -> Option<&ProfileSetting> {
        match self {
            ProfileLine::Setting(setting) => Some(setting),
            _ => None,
        }
    }
}

/// Parsed profile file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileDocument {
    lines: Vec<ProfileLine>,
    /// Source text ended with a line terminator
    trailing_newline: bool,
}

impl ProfileDocument {
    /// Empty document (renders as just the header)
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse file contents.
    ///
    /// Lines are split on `\n` with a trailing `\r` stripped, so blank
    /// lines at the end of the file survive a rewrite.
    pub fn parse(text: &str) -> Self {
        if text.is_empty() {
            return Self::default();
        }

        let (body, trailing_newline) = match text.strip_suffix('\n') {
            Some(body) => (body, true),
            None => (text, false),
        };
        let lines = body
            .split('\n')
            .map(|line| ProfileLine::parse(line.strip_suffix('\r').unwrap_or(line)))
            .collect();

        Self {
            lines,
            trailing_newline,
        }
    }

    /// Render file contents.
    ///
    /// The header is always emitted first. Header lines found further
    /// down are kept where they are.
    pub fn render(&self) -> String {
        let mut out: Vec<String> = Vec::with_capacity(self.lines.len() + 1);
        if self.lines.first() != Some(&ProfileLine::Header) {
            out.push(HEADER.to_string());
        }
        out.extend(self.lines.iter().map(ProfileLine::render));

        let mut text = out.join("\n");
        if self.trailing_newline {
            text.push('\n');
        }
        text
    }

    /// All lines in file order
    pub fn lines(&self) -> &[ProfileLine] {
        &self.lines
    }

    /// Settings in file order
    pub fn settings(&self) -> impl Iterator<Item = &ProfileSetting> {
        self.lines.iter().filter_map(ProfileLine::as_setting)
    }

    /// First setting with exactly this path
    pub fn get(&self, path: &str) -> Option<&ProfileSetting> {
        self.settings().find(|s| s.path == path)
    }

    /// Set `path` to `value`.
    ///
    /// An existing line is rewritten in place with the standard type
    /// tag; otherwise a line is appended.
    pub fn set(&mut self, path: &str, value: &str, scope: i32) {
        self.upsert(ProfileSetting::new(path, value, scope));
    }

    /// Insert or replace a complete setting, keeping its scope and type tag
    pub fn upsert(&mut self, setting: ProfileSetting) {
        let existing = self.lines.iter().position(
            |line| matches!(line, ProfileLine::Setting(s) if s.path == setting.path),
        );

        match existing {
            Some(index) => self.lines[index] = ProfileLine::Setting(setting),
            None => self.lines.push(ProfileLine::Setting(setting)),
        }
    }

    /// Remove every line with exactly this path; returns how many were removed
    pub fn remove(&mut self, path: &str) -> usize {
        self.remove_where(|s| s.path == path)
    }

    /// Remove every setting matching `predicate`; returns how many were removed
    pub fn remove_where<F>(&mut self, mut predicate: F) -> usize
    where
        F: FnMut(&ProfileSetting) -> bool,
    {
        let before = self.lines.len();
        self.lines.retain(|line| match line {
            ProfileLine::Setting(s) => !predicate(s),
            _ => true,
        });
        before - self.lines.len()
    }
}

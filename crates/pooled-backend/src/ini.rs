// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Named-section configuration model.
//!
//! The backend executable reads a file of `[name]` headers followed by
//! `key = value` lines. Edits go through [`ConfigDocument`] so that removing
//! one section can never touch another whose name merely shares a prefix.

use std::fmt::Write as _;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IniError {
	#[error("line {line}: entry appears before any section header")]
	EntryOutsideSection { line: usize },

	#[error("line {line}: malformed line '{content}'")]
	Malformed { line: usize, content: String },

	#[error("{what} contains a line break or bracket: {value:?}")]
	IllegalText { what: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
	name: String,
	entries: Vec<(String, String)>,
}

impl Section {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			entries: Vec::new(),
		}
	}

	/// Builder form of [`Section::set`].
	pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.set(key, value);
		self
	}

	/// Replace the value of `key` in place, or append it.
	pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
		let key = key.into();
		let value = value.into();
		match self.entries.iter_mut().find(|(k, _)| *k == key) {
			Some(entry) => entry.1 = value,
			None => self.entries.push((key, value)),
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn get(&self, key: &str) -> Option<&str> {
		self.entries
			.iter()
			.find(|(k, _)| k == key)
			.map(|(_, v)| v.as_str())
	}

	pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
		self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
	}

	fn check(&self) -> Result<(), IniError> {
		if self.name.is_empty() || self.name.contains(['\n', '\r', '[', ']']) {
			return Err(IniError::IllegalText {
				what: "section name",
				value: self.name.clone(),
			});
		}
		for (key, value) in &self.entries {
			if key.is_empty() || key.contains(['\n', '\r', '=', '[', ']']) {
				return Err(IniError::IllegalText {
					what: "key",
					value: key.clone(),
				});
			}
			if value.contains(['\n', '\r']) {
				return Err(IniError::IllegalText {
					what: "value",
					value: value.clone(),
				});
			}
		}
		Ok(())
	}
}

/// Ordered sections, rendered deterministically.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigDocument {
	sections: Vec<Section>,
}

impl ConfigDocument {
	pub fn new() -> Self {
		Self::default()
	}

	/// Parse configuration text. Blank lines and `#` / `;` comments are dropped.
	pub fn parse(text: &str) -> Result<Self, IniError> {
		let mut sections: Vec<Section> = Vec::new();

		for (idx, raw) in text.lines().enumerate() {
			let line_no = idx + 1;
			let line = raw.trim();
			if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
				continue;
			}

			if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
				sections.push(Section::new(name.trim()));
				continue;
			}

			let Some((key, value)) = line.split_once('=') else {
				return Err(IniError::Malformed {
					line: line_no,
					content: line.to_string(),
				});
			};

			let Some(section) = sections.last_mut() else {
				return Err(IniError::EntryOutsideSection { line: line_no });
			};
			section.set(key.trim(), value.trim());
		}

		Ok(Self { sections })
	}

	pub fn sections(&self) -> &[Section] {
		&self.sections
	}

	pub fn section(&self, name: &str) -> Option<&Section> {
		self.sections.iter().find(|s| s.name == name)
	}

	pub fn contains(&self, name: &str) -> bool {
		self.section(name).is_some()
	}

	/// Replace the section with the exact same name in place, or append it.
	pub fn upsert_section(&mut self, section: Section) -> Result<(), IniError> {
		section.check()?;
		match self.sections.iter_mut().find(|s| s.name == section.name) {
			Some(existing) => *existing = section,
			None => self.sections.push(section),
		}
		Ok(())
	}

	/// Remove the section whose name equals `name` exactly.
	pub fn remove_section(&mut self, name: &str) -> bool {
		let before = self.sections.len();
		self.sections.retain(|s| s.name != name);
		self.sections.len() != before
	}

	pub fn render(&self) -> String {
		let mut out = String::new();
		for (i, section) in self.sections.iter().enumerate() {
			if i > 0 {
				out.push('\n');
			}
			let _ = writeln!(out, "[{}]", section.name);
			for (key, value) in &section.entries {
				let _ = writeln!(out, "{key} = {value}");
			}
		}
		out
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	const SAMPLE: &str = "\
# managed by pooled-server
[google_abcd1234]
type = drive
scope = drive

; comment
[pool_ab]
type = union
upstreams = google_abcd1234:

[pool_abc]
type = union

[pool_ab_chunker]
type = chunker
remote = pool_ab:
";

	#[test]
	fn parse_keeps_order_and_values() {
		let doc = ConfigDocument::parse(SAMPLE).unwrap();
		let names: Vec<_> = doc.sections().iter().map(|s| s.name()).collect();
		assert_eq!(
			names,
			vec!["google_abcd1234", "pool_ab", "pool_abc", "pool_ab_chunker"]
		);
		assert_eq!(
			doc.section("pool_ab").and_then(|s| s.get("upstreams")),
			Some("google_abcd1234:")
		);
	}

	#[test]
	fn remove_matches_exact_name_only() {
		let mut doc = ConfigDocument::parse(SAMPLE).unwrap();
		assert!(doc.remove_section("pool_ab"));
		assert!(!doc.contains("pool_ab"));
		assert!(doc.contains("pool_abc"));
		assert!(doc.contains("pool_ab_chunker"));
		assert!(!doc.remove_section("pool_ab"));
	}

	#[test]
	fn upsert_replaces_in_place() {
		let mut doc = ConfigDocument::parse(SAMPLE).unwrap();
		doc.upsert_section(Section::new("pool_ab").with("type", "union").with("upstreams", "x:"))
			.unwrap();
		assert_eq!(doc.sections()[1].name(), "pool_ab");
		assert_eq!(doc.sections()[1].get("upstreams"), Some("x:"));
		assert_eq!(doc.sections().len(), 4);
	}

	#[test]
	fn rejects_line_breaks() {
		let mut doc = ConfigDocument::new();
		let err = doc
			.upsert_section(Section::new("ok").with("token", "a\n[evil]"))
			.unwrap_err();
		assert!(matches!(err, IniError::IllegalText { what: "value", .. }));

		let err = doc.upsert_section(Section::new("bad]\n[x")).unwrap_err();
		assert!(matches!(err, IniError::IllegalText { what: "section name", .. }));
		assert!(doc.sections().is_empty());
	}

	#[test]
	fn entry_before_header_is_an_error() {
		let err = ConfigDocument::parse("type = drive\n").unwrap_err();
		assert_eq!(err, IniError::EntryOutsideSection { line: 1 });
	}

	#[test]
	fn render_separates_sections_with_blank_line() {
		let mut doc = ConfigDocument::new();
		doc.upsert_section(Section::new("a").with("k", "v")).unwrap();
		doc.upsert_section(Section::new("b").with("k", "w")).unwrap();
		assert_eq!(doc.render(), "[a]\nk = v\n\n[b]\nk = w\n");
	}

	proptest! {
		#[test]
		fn rendered_text_parses_back(
			names in proptest::collection::btree_set("[a-z][a-z0-9_]{0,15}", 1..6),
			value in "[A-Za-z0-9:_ ,{}\"]{0,40}",
		) {
			let mut doc = ConfigDocument::new();
			for name in &names {
				doc.upsert_section(Section::new(name.clone()).with("type", "union").with("v", value.trim()))
					.unwrap();
			}
			let text = doc.render();
			let parsed = ConfigDocument::parse(&text).unwrap();
			prop_assert_eq!(&parsed, &doc);
			prop_assert_eq!(parsed.render(), text);
		}
	}
}

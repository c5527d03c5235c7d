//! Placeholder templates for collections.
//!
//! A placeholder is a name in double braces, such as `{{prefix}}`. Creating a
//! template turns literal text into placeholders. Filling a template turns
//! placeholders back into text. Substitution reaches every text field of an
//! entry and its embedded descendants: descriptions, metadata values,
//! titles, PV names and string data. Identifiers are never rewritten.

use std::collections::BTreeSet;

use regex_lite::{Captures, Regex};
use thiserror::Error;
use tracing::debug;

use crate::{
    Result,
    entry::{Collection, Entry, EntryHeader, EntryRef, EpicsValue, ID, Readback},
};

/// Matches a placeholder and captures its name. Placeholders do not nest.
pub const PLACEHOLDER_PATTERN: &str = r"\{\{(.*?)\}\}";

/// Direction of a substitution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TemplateMode {
    /// Replace each literal key with `{{value}}`.
    CreatePlaceholders,
    /// Replace each `{{key}}` with its value.
    #[default]
    FillPlaceholders,
}

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Invalid template pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex_lite::Error,
    },
}

impl From<TemplateError> for crate::Error {
    fn from(err: TemplateError) -> Self {
        crate::Error::Template(err)
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|source| {
        TemplateError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        }
        .into()
    })
}

/// Matches `target` or any whole placeholder.
fn guarded(target: &str) -> Result<Regex> {
    compile(&format!("{PLACEHOLDER_PATTERN}|{}", regex_lite::escape(target)))
}

fn replace_guarded(pattern: &Regex, text: &str, replacement: &str) -> String {
    pattern
        .replace_all(text, |caps: &Captures<'_>| {
            if caps.get(1).is_some() {
                caps[0].to_string()
            } else {
                replacement.to_string()
            }
        })
        .into_owned()
}

/// Replaces every occurrence of `target` in `text` that is not part of an
/// existing placeholder.
///
/// An empty target leaves the text unchanged.
pub fn safe_replace(text: &str, target: &str, replacement: &str) -> Result<String> {
    if target.is_empty() {
        return Ok(text.to_string());
    }
    Ok(replace_guarded(&guarded(target)?, text, replacement))
}

/// Names of all placeholders in the text fields of `entry` and its embedded
/// descendants.
pub fn find_placeholders(entry: &Entry) -> Result<BTreeSet<String>> {
    let placeholder = compile(PLACEHOLDER_PATTERN)?;
    let mut scratch = entry.clone();
    let mut texts = Vec::new();
    entry_texts(&mut scratch, &mut texts);

    let mut found = BTreeSet::new();
    for text in texts {
        found.extend(
            placeholder
                .captures_iter(text.as_str())
                .filter_map(|caps| caps.get(1))
                .map(|name| name.as_str().to_string()),
        );
    }
    Ok(found)
}

/// Rewrites the text fields of `entry` and its embedded descendants in place.
///
/// Substitutions are applied in order, each to the output of the previous
/// one. Empty keys are ignored.
pub fn substitute_placeholders<K, V>(
    entry: &mut Entry,
    substitutions: &[(K, V)],
    mode: TemplateMode,
) -> Result<()>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let rules = rules(substitutions, mode)?;
    let mut texts = Vec::new();
    entry_texts(entry, &mut texts);
    apply(&rules, texts);
    debug!(id = %entry.uuid(), rules = rules.len(), ?mode, "Substituted placeholders");
    Ok(())
}

/// Copy of `template` with `substitutions` applied.
///
/// With `new_uuids`, every entry in the copy gets a fresh id and starts over
/// at revision 0. Embedded children are re-pointed at their container's new
/// id, so the copy can be saved next to the template.
pub fn fill_template_collection<K, V>(
    template: &Collection,
    substitutions: &[(K, V)],
    new_uuids: bool,
    mode: TemplateMode,
) -> Result<Collection>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let rules = rules(substitutions, mode)?;
    let mut filled = template.clone();
    if new_uuids {
        let old = filled.header.uuid;
        filled.header.uuid = ID::generate();
        filled.header.revision = 0;
        for slot in &mut filled.children {
            if let EntryRef::Entry(child) = slot {
                renew_ids(child, old, filled.header.uuid);
            }
        }
    }

    let mut texts = Vec::new();
    collection_texts(&mut filled, &mut texts);
    apply(&rules, texts);
    debug!(
        template = %template.header.uuid,
        id = %filled.header.uuid,
        ?mode,
        "Filled template collection"
    );
    Ok(filled)
}

enum Rule {
    Fill { placeholder: String, value: String },
    Create { target: Regex, placeholder: String },
}

impl Rule {
    fn apply(&self, text: &str) -> String {
        match self {
            Rule::Fill { placeholder, value } => text.replace(placeholder.as_str(), value),
            Rule::Create {
                target,
                placeholder,
            } => replace_guarded(target, text, placeholder),
        }
    }
}

fn rules<K, V>(substitutions: &[(K, V)], mode: TemplateMode) -> Result<Vec<Rule>>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    substitutions
        .iter()
        .filter(|(key, _)| !key.as_ref().is_empty())
        .map(|(key, value)| {
            let (key, value) = (key.as_ref(), value.as_ref());
            Ok(match mode {
                TemplateMode::FillPlaceholders => Rule::Fill {
                    placeholder: format!("{{{{{key}}}}}"),
                    value: value.to_string(),
                },
                TemplateMode::CreatePlaceholders => Rule::Create {
                    target: guarded(key)?,
                    placeholder: format!("{{{{{value}}}}}"),
                },
            })
        })
        .collect()
}

fn apply(rules: &[Rule], texts: Vec<&mut String>) {
    for text in texts {
        for rule in rules {
            *text = rule.apply(text.as_str());
        }
    }
}

fn renew_ids(entry: &mut Entry, old_parent: ID, new_parent: ID) {
    let header = entry.header_mut();
    if header.parent == Some(old_parent) {
        header.parent = Some(new_parent);
    }
    let old = header.uuid;
    let new = ID::generate();
    header.uuid = new;
    header.revision = 0;
    for slot in entry.child_slots_mut() {
        if let EntryRef::Entry(child) = slot {
            renew_ids(child, old, new);
        }
    }
}

fn header_texts<'a>(header: &'a mut EntryHeader, out: &mut Vec<&'a mut String>) {
    out.push(&mut header.description);
    out.extend(header.metadata.values_mut());
}

fn value_texts<'a>(value: &'a mut EpicsValue, out: &mut Vec<&'a mut String>) {
    match value {
        EpicsValue::Str(text) => out.push(text),
        EpicsValue::Array(items) => {
            for item in items {
                value_texts(item, out);
            }
        }
        EpicsValue::Bool(_) | EpicsValue::Int(_) | EpicsValue::Float(_) => {}
    }
}

fn readback_texts<'a>(readback: &'a mut Readback, out: &mut Vec<&'a mut String>) {
    header_texts(&mut readback.header, out);
    out.push(&mut readback.pv_name);
    if let Some(data) = &mut readback.data {
        value_texts(data, out);
    }
}

fn slot_texts<'a>(slot: &'a mut EntryRef, out: &mut Vec<&'a mut String>) {
    if let EntryRef::Entry(entry) = slot {
        entry_texts(entry, out);
    }
}

fn collection_texts<'a>(collection: &'a mut Collection, out: &mut Vec<&'a mut String>) {
    header_texts(&mut collection.header, out);
    out.push(&mut collection.title);
    for slot in &mut collection.children {
        slot_texts(slot, out);
    }
}

fn entry_texts<'a>(entry: &'a mut Entry, out: &mut Vec<&'a mut String>) {
    match entry {
        Entry::Parameter(p) => {
            header_texts(&mut p.header, out);
            out.push(&mut p.pv_name);
            for slot in &mut p.readback {
                slot_texts(slot, out);
            }
        }
        Entry::Setpoint(s) => {
            header_texts(&mut s.header, out);
            out.push(&mut s.pv_name);
            if let Some(data) = &mut s.data {
                value_texts(data, out);
            }
            for slot in &mut s.readback {
                slot_texts(slot, out);
            }
        }
        Entry::Readback(r) => readback_texts(r, out),
        Entry::Collection(c) => collection_texts(c, out),
        Entry::Snapshot(s) => {
            header_texts(&mut s.header, out);
            out.push(&mut s.title);
            for slot in &mut s.children {
                slot_texts(slot, out);
            }
            for readback in &mut s.meta_pvs {
                readback_texts(readback, out);
            }
        }
    }
}

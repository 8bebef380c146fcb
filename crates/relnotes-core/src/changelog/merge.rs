//! Building version entries and merging them into the changelog.
//!
//! Every operation comes in two flavours: a pure `*_content` function over
//! the document text, and a path-based wrapper that reads the file, applies
//! it, and writes the result back with [`write_atomic`]. The pure forms are
//! what dry runs and most tests use.
//!
//! Merging is idempotent per version: regenerating an entry replaces the
//! existing `## [<version>]` section in place instead of adding a second one,
//! and reference-style link definitions are deduplicated (first one wins)
//! after every merge.

use std::collections::HashMap;

use camino::Utf8Path;
use tracing::{debug, info, instrument, warn};

use super::{
    ChangelogError, ChangelogResult, Document, STANDARD_HEADER, Section, UNRELEASED,
    escape_section_body, is_unreleased, link_definition, read_or_empty, section_key, write_atomic,
};
use crate::git::History;
use crate::notes::ReleaseNotes;
use crate::release::Release;
use crate::version::parse_version;

/// Text of a brand new changelog: the standard header and an empty
/// Unreleased section.
pub fn new_changelog() -> String {
    format!("{STANDARD_HEADER}\n## [{UNRELEASED}]\n")
}

/// Make sure the changelog at `path` exists and has an Unreleased section.
///
/// Creates the file with the standard header when it is missing (the parent
/// directory must exist). Returns whether the file was changed.
#[instrument(fields(%path))]
pub fn ensure_unreleased_section(path: &Utf8Path) -> ChangelogResult<bool> {
    let content = read_or_empty(path)?;
    if content.trim().is_empty() {
        write_atomic(path, &new_changelog())?;
        info!("created changelog");
        return Ok(true);
    }

    match ensure_unreleased_content(&content) {
        Some(updated) => {
            write_atomic(path, &updated)?;
            info!("added Unreleased section");
            Ok(true)
        }
        None => {
            debug!("Unreleased section already present");
            Ok(false)
        }
    }
}

/// Insert an empty Unreleased section ahead of the first version section.
///
/// Returns `None` when the document already has one.
pub fn ensure_unreleased_content(content: &str) -> Option<String> {
    let mut doc = Document::parse(content);
    if doc.unreleased_index().is_some() {
        return None;
    }
    doc.insert_section(0, Section::empty(UNRELEASED));
    Some(doc.render())
}

/// Raw text between the `## [Unreleased]` line and the next `## [` line (or
/// the end of the document). Headers inside code fences do not count. Empty
/// when there is no Unreleased section.
pub fn parse_unreleased_section(content: &str) -> String {
    let mut offset = 0;
    let mut start = None;
    let mut in_fence = false;

    for line in content.split_inclusive('\n') {
        let text = line.trim_end_matches(['\n', '\r']);
        if text.trim_start().starts_with("```") {
            in_fence = !in_fence;
        }
        match start {
            _ if in_fence => {}
            None => {
                if section_key(text).is_some_and(is_unreleased) {
                    start = Some(offset + line.len());
                }
            }
            Some(begin) => {
                if section_key(text).is_some() {
                    return content[begin..offset].to_string();
                }
            }
        }
        offset += line.len();
    }

    start.map(|begin| content[begin..].to_string()).unwrap_or_default()
}

/// Render the changelog entry for `release`.
///
/// The date is the tag's creation date when the tag already exists, today
/// otherwise. The link line is added when the remote is known: a compare
/// link against the previous tag, or the release page for a first release.
#[instrument(skip_all, fields(version = %release.version))]
pub fn build_changelog_from_notes(
    history: &dyn History,
    release: &Release,
    notes: &ReleaseNotes,
) -> String {
    let date = match history.tag_date(&release.version) {
        Ok(date) => date,
        Err(e) => {
            debug!(%e, "no tag date, using today");
            chrono::Local::now().date_naive().to_string()
        }
    };

    let link = match history.repo_info() {
        Ok(Some(info)) => Some(match release.previous_tag {
            Some(ref previous) => info.compare_url(previous, &release.version),
            None => info.tag_url(&release.version),
        }),
        Ok(None) => None,
        Err(e) => {
            warn!(%e, "could not read repository coordinates, omitting link");
            None
        }
    };

    let mut fragment = format!("## [{}] - {date}\n", release.version);
    if let Some(link) = link {
        fragment.push_str(&format!("[{}]: {link}\n", release.version));
    }
    let body = escape_section_body(&notes.render_body());
    if !body.is_empty() {
        fragment.push('\n');
        fragment.push_str(&body);
    }
    fragment
}

/// Merge `fragment` into the changelog at `path`.
///
/// See [`prepend_fragment`] for the merge rules. A missing file is created
/// with the standard header first.
#[instrument(skip(fragment), fields(%path))]
pub fn prepend_to_changelog(path: &Utf8Path, fragment: &str) -> ChangelogResult<()> {
    let content = read_or_empty(path)?;
    let updated = prepend_fragment(&content, fragment)?;
    write_atomic(path, &updated)
}

/// Merge a `## [<version>] ...` fragment into a changelog document.
///
/// An existing section with the same key is replaced in place (any further
/// duplicates are removed). Otherwise the fragment is inserted after the
/// Unreleased section, ahead of the first version that is not newer than
/// it. Link definitions are consolidated afterwards.
pub fn prepend_fragment(content: &str, fragment: &str) -> ChangelogResult<String> {
    let lines = fragment
        .trim_start_matches(['\n', '\r'])
        .trim_end()
        .split('\n')
        .map(String::from)
        .collect();
    let mut section = Section::from_lines(lines).ok_or(ChangelogError::MissingFragmentHeader)?;
    section.ensure_blank_tail();

    let base = if content.trim().is_empty() {
        new_changelog()
    } else {
        content.to_string()
    };
    let mut doc = Document::parse(&base);

    let existing: Vec<usize> = doc
        .sections
        .iter()
        .enumerate()
        .filter(|(_, s)| s.key == section.key)
        .map(|(i, _)| i)
        .collect();

    if let Some((&first, duplicates)) = existing.split_first() {
        info!(version = %section.key, "replacing existing changelog entry");
        for &i in duplicates.iter().rev() {
            doc.sections.remove(i);
        }
        doc.sections[first] = section;
    } else {
        let index = insertion_index(&doc, &section.key);
        debug!(version = %section.key, index, "inserting changelog entry");
        doc.insert_section(index, section);
    }

    Ok(consolidate_link_definitions(&doc.render()))
}

/// Where a new section with `key` goes: after Unreleased, before the first
/// version that is not newer. Sections whose keys are not versions are
/// stepped over.
fn insertion_index(doc: &Document, key: &str) -> usize {
    let start = doc.unreleased_index().map_or(0, |i| i + 1);
    let Ok(new_version) = parse_version(key) else {
        return start;
    };
    doc.sections
        .iter()
        .enumerate()
        .skip(start)
        .find(|(_, s)| parse_version(&s.key).is_ok_and(|v| v <= new_version))
        .map_or(doc.sections.len(), |(i, _)| i)
}

/// Keep only the first `[label]: url` definition per label.
///
/// Later definitions are dropped even when their URL differs; a conflicting
/// one is logged.
pub fn consolidate_link_definitions(content: &str) -> String {
    let mut seen: HashMap<&str, &str> = HashMap::new();
    let mut kept: Vec<&str> = Vec::new();
    let mut in_fence = false;

    for line in content.split('\n') {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
        }
        if !in_fence
            && let Some((label, url)) = link_definition(line)
        {
            if let Some(first) = seen.get(label) {
                if *first != url {
                    warn!(%label, kept = %first, dropped = %url, "dropping conflicting link definition");
                }
                continue;
            }
            seen.insert(label, url);
        }
        kept.push(line);
    }

    kept.join("\n")
}

/// A version entry produced by [`move_unreleased_content`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedEntry {
    /// The entry as merged, staged lines included.
    pub fragment: String,
    /// The whole updated document.
    pub document: String,
}

/// Move staged Unreleased content into the entry for `release`.
///
/// Returns the merged entry, or `None` (leaving the file alone) when nothing
/// is staged.
#[instrument(skip_all, fields(%path, version = %release.version))]
pub fn move_unreleased_to_version(
    path: &Utf8Path,
    history: &dyn History,
    release: &Release,
    notes: &ReleaseNotes,
) -> ChangelogResult<Option<MergedEntry>> {
    let content = read_or_empty(path)?;
    let fragment = build_changelog_from_notes(history, release, notes);
    let Some(merged) = move_unreleased_content(&content, &fragment)? else {
        debug!("nothing staged under Unreleased");
        return Ok(None);
    };
    write_atomic(path, &merged.document)?;
    info!("moved Unreleased entries into release");
    Ok(Some(merged))
}

/// Pure form of [`move_unreleased_to_version`]: put the staged lines right
/// below `fragment`'s header and link line, empty the Unreleased section, and
/// merge.
pub fn move_unreleased_content(
    content: &str,
    fragment: &str,
) -> ChangelogResult<Option<MergedEntry>> {
    let mut doc = Document::parse(content);
    let Some(index) = doc.unreleased_index() else {
        return Ok(None);
    };

    let section = &doc.sections[index];
    let body_start = section.body_start();
    let (links, staged): (Vec<String>, Vec<String>) = section.lines[body_start..]
        .iter()
        .cloned()
        .partition(|l| link_definition(l).is_some());
    let staged = trim_blank_edges(staged);
    if staged.is_empty() {
        return Ok(None);
    }

    let mut fresh = section.lines[..body_start].to_vec();
    fresh.extend(links);
    fresh.push(String::new());
    doc.sections[index].lines = fresh;

    let fragment = with_staged_lines(fragment, &staged)?;
    let document = prepend_fragment(&doc.render(), &fragment)?;
    Ok(Some(MergedEntry { fragment, document }))
}

fn with_staged_lines(fragment: &str, staged: &[String]) -> ChangelogResult<String> {
    let lines: Vec<&str> = fragment.trim_end().split('\n').collect();
    if lines.first().and_then(|l| section_key(l)).is_none() {
        return Err(ChangelogError::MissingFragmentHeader);
    }
    let head = 1 + lines[1..]
        .iter()
        .take_while(|l| link_definition(l).is_some())
        .count();
    let rest: Vec<&str> = lines[head..]
        .iter()
        .copied()
        .skip_while(|l| l.trim().is_empty())
        .collect();

    let mut out: Vec<&str> = lines[..head].to_vec();
    out.push("");
    out.extend(staged.iter().map(String::as_str));
    if !rest.is_empty() {
        out.push("");
        out.extend(rest);
    }
    let mut joined = out.join("\n");
    joined.push('\n');
    Ok(joined)
}

fn trim_blank_edges(mut lines: Vec<String>) -> Vec<String> {
    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }
    let leading = lines.iter().take_while(|l| l.trim().is_empty()).count();
    lines.drain(..leading);
    lines
}

/// Add a bullet to the Unreleased section of the changelog at `path`,
/// optionally under a `### <heading>` subsection.
///
/// The file and the Unreleased section are created when missing.
#[instrument(skip(text), fields(%path))]
pub fn stage_unreleased_entry(
    path: &Utf8Path,
    heading: Option<&str>,
    text: &str,
) -> ChangelogResult<()> {
    let content = read_or_empty(path)?;
    let updated = stage_entry_content(&content, heading, text);
    write_atomic(path, &updated)?;
    info!(?heading, "staged Unreleased entry");
    Ok(())
}

/// Pure form of [`stage_unreleased_entry`].
pub fn stage_entry_content(content: &str, heading: Option<&str>, text: &str) -> String {
    let base = if content.trim().is_empty() {
        new_changelog()
    } else {
        content.to_string()
    };
    let base = ensure_unreleased_content(&base).unwrap_or(base);

    let bullet = to_bullet(text);
    if bullet.is_empty() {
        return base;
    }

    let mut doc = Document::parse(&base);
    let Some(index) = doc.unreleased_index() else {
        return base;
    };
    let section = &mut doc.sections[index];
    match heading.map(str::trim).filter(|h| !h.is_empty()) {
        Some(heading) => stage_under_heading(section, heading, bullet),
        None => stage_loose(section, bullet),
    }
    section.ensure_blank_tail();
    doc.render()
}

fn to_bullet(text: &str) -> String {
    let joined = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if joined.is_empty() || joined.starts_with("- ") || joined.starts_with("* ") {
        joined
    } else {
        format!("- {joined}")
    }
}

fn is_subheading(line: &str) -> bool {
    line.starts_with("### ")
}

fn last_non_blank(section: &Section, range: std::ops::Range<usize>) -> Option<usize> {
    range.rev().find(|&i| !section.lines[i].trim().is_empty())
}

fn stage_under_heading(section: &mut Section, heading: &str, bullet: String) {
    let start = section.body_start();
    let end = section.content_end();
    let found = (start..end).find(|&i| {
        section.lines[i]
            .strip_prefix("### ")
            .is_some_and(|t| t.trim().eq_ignore_ascii_case(heading))
    });

    match found {
        Some(at) => {
            let sub_end = (at + 1..end)
                .find(|&i| is_subheading(&section.lines[i]))
                .unwrap_or(end);
            let insert = last_non_blank(section, at + 1..sub_end).map_or(at + 1, |i| i + 1);
            section.lines.insert(insert, bullet);
        }
        None => {
            let block = [String::new(), format!("### {heading}"), bullet];
            section.lines.splice(end..end, block);
        }
    }
}

fn stage_loose(section: &mut Section, bullet: String) {
    let start = section.body_start();
    let end = section.content_end();
    let first_sub = (start..end)
        .find(|&i| is_subheading(&section.lines[i]))
        .unwrap_or(end);

    match last_non_blank(section, start..first_sub) {
        Some(i) => section.lines.insert(i + 1, bullet),
        None => {
            section
                .lines
                .splice(start..start, [String::new(), bullet]);
        }
    }
}

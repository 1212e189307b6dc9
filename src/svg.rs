//! Patches stat values into pre-existing SVG templates.
//!
//! Each value targets an element with a known `id` attribute plus a
//! companion `<id>_dots` element holding an alignment filler, so that
//! label/value columns stay lined up regardless of value width. The
//! document is rewritten as a quick-xml event stream: untouched events
//! (declaration included) pass through byte-identical, which makes the
//! patch idempotent. A missing id is a documented no-op, never an error.

use crate::stats::Stats;
use anyhow::{Context, Result};
use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use std::fs;
use std::path::Path;

// Column widths from the rendered templates. Contrib and age rows sit
// at the end of their lines and take no filler.
const COMMIT_WIDTH: usize = 22;
const STAR_WIDTH: usize = 14;
const REPO_WIDTH: usize = 6;
const FOLLOWER_WIDTH: usize = 10;

struct Replacement {
    id: String,
    text: String,
}

/// Overwrite the template at `path` in place with the given stats.
pub fn overwrite<P: AsRef<Path>>(path: P, stats: &Stats) -> Result<()> {
    let path = path.as_ref();
    let input = fs::read_to_string(path)
        .with_context(|| format!("failed to read template {}", path.display()))?;

    let mut replacements = Vec::new();
    justify(&mut replacements, "age_data", stats.age.clone(), 0);
    justify(
        &mut replacements,
        "commit_data",
        with_thousands(stats.commits),
        COMMIT_WIDTH,
    );
    justify(
        &mut replacements,
        "star_data",
        with_thousands(stats.stars),
        STAR_WIDTH,
    );
    justify(
        &mut replacements,
        "repo_data",
        with_thousands(stats.repos),
        REPO_WIDTH,
    );
    justify(
        &mut replacements,
        "contrib_data",
        with_thousands(stats.contributed_repos),
        0,
    );
    justify(
        &mut replacements,
        "follower_data",
        with_thousands(stats.followers),
        FOLLOWER_WIDTH,
    );

    let output = patch_document(&input, &replacements)
        .with_context(|| format!("failed to patch template {}", path.display()))?;

    fs::write(path, output)
        .with_context(|| format!("failed to write template {}", path.display()))
}

/// Queue the value plus its `<id>_dots` alignment filler.
fn justify(out: &mut Vec<Replacement>, id: &str, text: String, width: usize) {
    let filler_len = width.saturating_sub(text.chars().count());
    out.push(Replacement {
        id: format!("{id}_dots"),
        text: dot_string(filler_len),
    });
    out.push(Replacement {
        id: id.to_string(),
        text,
    });
}

/// Filler of `len` dots framed by single spaces; short lengths come from
/// a fixed table so the filler never degenerates to a lone framed dot.
fn dot_string(len: usize) -> String {
    match len {
        0 => String::new(),
        1 => " ".to_string(),
        2 => ". ".to_string(),
        n => format!(" {} ", ".".repeat(n)),
    }
}

/// Render with thousands separators: 12345 -> "12,345".
fn with_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Stream the document through, swapping the text content of the first
/// element whose `id` matches each replacement. The element's direct
/// text is dropped (nested elements keep theirs); a self-closing
/// placeholder is expanded so it can carry text. Ids with no match in
/// the document are skipped.
fn patch_document(input: &str, replacements: &[Replacement]) -> Result<String> {
    let mut reader = Reader::from_str(input);
    let mut writer = Writer::new(Vec::new());
    let mut used = vec![false; replacements.len()];

    // Depth inside a matched element while its old content is dropped.
    let mut replacing: Option<usize> = None;

    loop {
        match reader.read_event()? {
            Event::Eof => break,
            Event::Start(e) => {
                if let Some(depth) = replacing.as_mut() {
                    *depth += 1;
                    writer.write_event(Event::Start(e))?;
                } else if let Some(text) = take_replacement(&e, replacements, &mut used)? {
                    writer.write_event(Event::Start(e))?;
                    writer.write_event(Event::Text(BytesText::new(text)))?;
                    replacing = Some(0);
                } else {
                    writer.write_event(Event::Start(e))?;
                }
            }
            Event::End(e) => {
                match replacing.as_mut() {
                    Some(0) => replacing = None,
                    Some(depth) => *depth -= 1,
                    None => {}
                }
                writer.write_event(Event::End(e))?;
            }
            Event::Empty(e) => {
                if replacing.is_none() {
                    if let Some(text) = take_replacement(&e, replacements, &mut used)? {
                        let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                        writer.write_event(Event::Start(e))?;
                        writer.write_event(Event::Text(BytesText::new(text)))?;
                        writer.write_event(Event::End(BytesEnd::new(name)))?;
                        continue;
                    }
                }
                writer.write_event(Event::Empty(e))?;
            }
            Event::Text(_) | Event::CData(_) | Event::GeneralRef(_) if replacing == Some(0) => {}
            event => writer.write_event(event)?,
        }
    }

    String::from_utf8(writer.into_inner()).context("patched document is not valid UTF-8")
}

/// The pending replacement for this element's `id`, if any; each
/// replacement fires at most once, on its first match in the document.
fn take_replacement<'a>(
    element: &BytesStart<'_>,
    replacements: &'a [Replacement],
    used: &mut [bool],
) -> Result<Option<&'a str>> {
    let Some(attr) = element.try_get_attribute("id")? else {
        return Ok(None);
    };
    let id = attr.unescape_value()?;
    for (i, r) in replacements.iter().enumerate() {
        if !used[i] && r.id == id.as_ref() {
            used[i] = true;
            return Ok(Some(r.text.as_str()));
        }
    }
    Ok(None)
}

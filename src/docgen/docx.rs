//! Run-preserving `{{key}}` substitution for WordprocessingML packages.
//!
//! Each `w:r` run is buffered and its text read the way Word shows it:
//! `w:t` contents joined, `w:tab` as `\t`, `w:br` as `\n`. A placeholder
//! inside one `w:t` is filled in place. One spread over several `w:t`
//! elements makes the whole run text be rebuilt, with tabs and breaks
//! restored in order. Run properties are never touched, so a placeholder
//! only matches when it sits inside a single run.

use std::borrow::Cow;
use std::io::{Cursor, Read, Write};

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::{TemplateError, TemplateResult};

const MAIN_PART: &str = "word/document.xml";

fn is_text_part(name: &str) -> bool {
    name == MAIN_PART
        || ((name.starts_with("word/header") || name.starts_with("word/footer"))
            && name.ends_with(".xml"))
}

fn corrupt<E: std::fmt::Display>(err: E) -> TemplateError {
    TemplateError::Corrupt(err.to_string())
}

fn xml_error<E: std::fmt::Display>(err: E) -> TemplateError {
    TemplateError::Xml(err.to_string())
}

/// Fills a `.docx` file. Every zip entry other than the document body,
/// headers and footers is copied through untouched.
pub fn fill_docx(template: &[u8], context: &[(String, String)]) -> TemplateResult<Vec<u8>> {
    let mut archive = ZipArchive::new(Cursor::new(template)).map_err(corrupt)?;
    if archive.by_name(MAIN_PART).is_err() {
        return Err(TemplateError::Corrupt(format!("missing {MAIN_PART}")));
    }

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for index in 0..archive.len() {
        let name = archive.by_index_raw(index).map_err(corrupt)?.name().to_string();
        if is_text_part(&name) {
            let mut xml = Vec::new();
            archive
                .by_index(index)
                .map_err(corrupt)?
                .read_to_end(&mut xml)?;
            let filled = substitute_runs(&xml, context)?;
            writer.start_file(name, options).map_err(corrupt)?;
            writer.write_all(&filled)?;
        } else {
            let entry = archive.by_index_raw(index).map_err(corrupt)?;
            writer.raw_copy_file(entry).map_err(corrupt)?;
        }
    }

    let cursor = writer.finish().map_err(corrupt)?;
    Ok(cursor.into_inner())
}

/// Replaces placeholders run by run inside one WordprocessingML part.
pub fn substitute_runs(xml: &[u8], context: &[(String, String)]) -> TemplateResult<Vec<u8>> {
    let mut reader = Reader::from_reader(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len()));
    let mut buf = Vec::new();
    let mut run: Option<Vec<Event<'static>>> = None;

    loop {
        let event = reader.read_event_into(&mut buf).map_err(xml_error)?;
        match event {
            Event::Eof => break,
            Event::Start(ref start) if start.name().as_ref() == b"w:r" => {
                // Runs nested inside text boxes: emit the outer run as is.
                if let Some(outer) = run.take() {
                    write_all(&mut writer, outer)?;
                }
                run = Some(vec![event.into_owned()]);
            }
            Event::End(ref end) if end.name().as_ref() == b"w:r" => match run.take() {
                Some(mut events) => {
                    events.push(event.into_owned());
                    let events = rewrite_run(events, context)?;
                    write_all(&mut writer, events)?;
                }
                None => writer.write_event(event).map_err(xml_error)?,
            },
            other => match run.as_mut() {
                Some(events) => events.push(other.into_owned()),
                None => writer.write_event(other).map_err(xml_error)?,
            },
        }
        buf.clear();
    }

    if let Some(rest) = run.take() {
        write_all(&mut writer, rest)?;
    }
    Ok(writer.into_inner())
}

fn write_all(writer: &mut Writer<Vec<u8>>, events: Vec<Event<'static>>) -> TemplateResult<()> {
    for event in events {
        writer.write_event(event).map_err(xml_error)?;
    }
    Ok(())
}

fn is_text_element(name: &[u8]) -> bool {
    name == b"w:t"
}

fn is_break_element(name: &[u8]) -> bool {
    name == b"w:br" || name == b"w:cr"
}

/// Direct children of a run that carry text. Tabs read as `\t` and breaks as
/// `\n`; everything else (run properties, drawings) is kept verbatim.
enum Piece {
    Text {
        start: BytesStart<'static>,
        text: String,
        events: Vec<Event<'static>>,
    },
    Tab(Event<'static>),
    Break(Event<'static>),
    Other(Event<'static>),
}

impl Piece {
    fn is_content(&self) -> bool {
        !matches!(self, Piece::Other(_))
    }
}

fn split_run(events: Vec<Event<'static>>) -> TemplateResult<Vec<Piece>> {
    let mut pieces = Vec::with_capacity(events.len());
    let mut depth = 0usize;
    let mut text: Option<(BytesStart<'static>, String, Vec<Event<'static>>)> = None;
    let mut skip_end = false;

    for event in events {
        if let Some((_, buffer, collected)) = text.as_mut() {
            match &event {
                Event::Text(t) => buffer.push_str(&t.unescape().map_err(xml_error)?),
                Event::CData(data) => buffer.push_str(&String::from_utf8_lossy(data)),
                _ => {}
            }
            let closes = matches!(&event, Event::End(end) if is_text_element(end.name().as_ref()));
            collected.push(event);
            if closes {
                if let Some((start, text, events)) = text.take() {
                    pieces.push(Piece::Text { start, text, events });
                }
            }
            continue;
        }
        if skip_end {
            skip_end = !matches!(event, Event::End(_));
            continue;
        }

        match event {
            Event::Start(ref start) if depth == 0 && is_text_element(start.name().as_ref()) => {
                let owned = start.clone().into_owned();
                text = Some((owned, String::new(), vec![event]));
            }
            Event::Empty(ref start) if depth == 0 && is_text_element(start.name().as_ref()) => {
                let owned = start.clone().into_owned();
                pieces.push(Piece::Text {
                    start: owned,
                    text: String::new(),
                    events: vec![event],
                });
            }
            Event::Empty(ref start) if depth == 0 && start.name().as_ref() == b"w:tab" => {
                pieces.push(Piece::Tab(event));
            }
            Event::Empty(ref start) if depth == 0 && is_break_element(start.name().as_ref()) => {
                pieces.push(Piece::Break(event));
            }
            Event::Start(ref start)
                if depth == 0
                    && (start.name().as_ref() == b"w:tab"
                        || is_break_element(start.name().as_ref())) =>
            {
                let empty = Event::Empty(start.clone().into_owned());
                if start.name().as_ref() == b"w:tab" {
                    pieces.push(Piece::Tab(empty));
                } else {
                    pieces.push(Piece::Break(empty));
                }
                skip_end = true;
            }
            Event::Start(_) => {
                depth += 1;
                pieces.push(Piece::Other(event));
            }
            Event::End(_) => {
                depth = depth.saturating_sub(1);
                pieces.push(Piece::Other(event));
            }
            other => pieces.push(Piece::Other(other)),
        }
    }

    if let Some((_, _, events)) = text.take() {
        pieces.extend(events.into_iter().map(Piece::Other));
    }
    Ok(pieces)
}

fn joined_text<'a>(pieces: impl Iterator<Item = (&'a Piece, Option<&'a str>)>) -> String {
    let mut out = String::new();
    for (piece, replaced) in pieces {
        match piece {
            Piece::Text { text, .. } => out.push_str(replaced.unwrap_or(text)),
            Piece::Tab(_) => out.push('\t'),
            Piece::Break(_) => out.push('\n'),
            Piece::Other(_) => {}
        }
    }
    out
}

pub fn apply_context<'a>(text: &'a str, context: &[(String, String)]) -> Cow<'a, str> {
    let mut current = Cow::Borrowed(text);
    for (key, value) in context {
        let placeholder = format!("{{{{{key}}}}}");
        if current.contains(&placeholder) {
            current = Cow::Owned(current.replace(&placeholder, value));
        }
    }
    current
}

fn preserved(start: &BytesStart<'_>) -> BytesStart<'static> {
    let mut out = BytesStart::new("w:t");
    for attr in start.attributes().flatten() {
        if attr.key.as_ref() != b"xml:space" {
            out.push_attribute(attr);
        }
    }
    out.push_attribute(("xml:space", "preserve"));
    out.into_owned()
}

fn push_text(out: &mut Vec<Event<'static>>, start: &BytesStart<'_>, text: &str) {
    out.push(Event::Start(preserved(start)));
    out.push(Event::Text(BytesText::new(text).into_owned()));
    out.push(Event::End(BytesEnd::new("w:t")));
}

fn rewrite_run(
    mut events: Vec<Event<'static>>,
    context: &[(String, String)],
) -> TemplateResult<Vec<Event<'static>>> {
    if events.len() < 2 {
        return Ok(events);
    }
    let run_end = events.pop();
    let run_start = events.remove(0);
    let pieces = split_run(events)?;

    let original = joined_text(pieces.iter().map(|piece| (piece, None)));
    let replaced = apply_context(&original, context).into_owned();

    let mut out = vec![run_start];
    if replaced == original {
        for piece in pieces {
            emit_original(&mut out, piece);
        }
        out.extend(run_end);
        return Ok(out);
    }

    // Placeholders that sit inside one `w:t` are filled in place, which
    // leaves tabs, breaks and the other `w:t` elements where they were.
    let per_element: Vec<Option<String>> = pieces
        .iter()
        .map(|piece| match piece {
            Piece::Text { text, .. } => match apply_context(text, context) {
                Cow::Owned(filled) => Some(filled),
                Cow::Borrowed(_) => None,
            },
            _ => None,
        })
        .collect();
    let in_place = joined_text(
        pieces
            .iter()
            .zip(per_element.iter())
            .map(|(piece, filled)| (piece, filled.as_deref())),
    );
    let control_free = per_element
        .iter()
        .flatten()
        .all(|filled| !filled.contains(['\t', '\n']));

    if in_place == replaced && control_free {
        for (piece, filled) in pieces.into_iter().zip(per_element) {
            match (piece, filled) {
                (Piece::Text { start, .. }, Some(filled)) => push_text(&mut out, &start, &filled),
                (piece, _) => emit_original(&mut out, piece),
            }
        }
        out.extend(run_end);
        return Ok(out);
    }

    // Otherwise the run text is rebuilt from the substituted string, with
    // `\t` and `\n` turned back into `w:tab` and `w:br` in order.
    let text_start = pieces
        .iter()
        .find_map(|piece| match piece {
            Piece::Text { start, .. } => Some(start.clone()),
            _ => None,
        })
        .unwrap_or_else(|| BytesStart::new("w:t"));
    let mut breaks: std::collections::VecDeque<Event<'static>> = pieces
        .iter()
        .filter_map(|piece| match piece {
            Piece::Break(event) => Some(event.clone()),
            _ => None,
        })
        .collect();

    let mut rebuilt = false;
    for piece in pieces {
        if !piece.is_content() {
            emit_original(&mut out, piece);
            continue;
        }
        if rebuilt {
            continue;
        }
        rebuilt = true;
        let mut segment = String::new();
        for ch in replaced.chars() {
            match ch {
                '\t' | '\n' => {
                    if !segment.is_empty() {
                        push_text(&mut out, &text_start, &segment);
                        segment.clear();
                    }
                    if ch == '\t' {
                        out.push(Event::Empty(BytesStart::new("w:tab")));
                    } else {
                        let event = breaks
                            .pop_front()
                            .unwrap_or_else(|| Event::Empty(BytesStart::new("w:br")));
                        out.push(event);
                    }
                }
                _ => segment.push(ch),
            }
        }
        if !segment.is_empty() {
            push_text(&mut out, &text_start, &segment);
        }
    }
    out.extend(run_end);
    Ok(out)
}

fn emit_original(out: &mut Vec<Event<'static>>, piece: Piece) {
    match piece {
        Piece::Text { events, .. } => out.extend(events),
        Piece::Tab(event) | Piece::Break(event) | Piece::Other(event) => out.push(event),
    }
}

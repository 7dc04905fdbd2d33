// src/patch/placeholder.rs

//! Raw placeholder-span substitution
//!
//! A placeholder span is a fixed-length reserved byte region inside a
//! binary: at least [`MIN_REPEATS`] repetitions of the magic marker,
//! optionally followed by a colon-joined list of already-embedded search
//! paths, terminated by NUL. Rewriting replaces the span content with
//! the preserved paths plus the new targets, NUL-padded to the exact
//! original span length. Capacity is validated for every span before a
//! single byte is written.

use crate::error::{Error, Result};
use std::path::Path;

/// The reserved magic marker unit.
pub const PLACEHOLD: &[u8] = b"/PLACEHOLD";

/// Minimum marker repetitions for a region to count as a span.
pub const MIN_REPEATS: usize = 5;

/// One located span: `content` covers everything up to (excluding) the
/// terminating NUL.
#[derive(Debug)]
struct Span {
    start: usize,
    len: usize,
    existing: Vec<String>,
}

/// Locate every placeholder span in `data`.
fn find_spans(data: &[u8]) -> Vec<Span> {
    let mut spans = Vec::new();
    let unit = PLACEHOLD.len();
    let mut i = 0;

    while i + unit * MIN_REPEATS <= data.len() {
        if !data[i..].starts_with(PLACEHOLD) {
            i += 1;
            continue;
        }

        let start = i;
        let mut cursor = i;
        while data[cursor..].starts_with(PLACEHOLD) {
            cursor += unit;
        }
        let repeats = (cursor - start) / unit;
        if repeats < MIN_REPEATS {
            i = cursor;
            continue;
        }

        // tail up to NUL; whitespace disqualifies the region
        let mut nul = None;
        let mut tail_end = cursor;
        for (offset, &byte) in data[cursor..].iter().enumerate() {
            if byte == 0 {
                nul = Some(cursor + offset);
                break;
            }
            if byte.is_ascii_whitespace() {
                break;
            }
            tail_end = cursor + offset + 1;
        }
        let Some(nul) = nul else {
            i = tail_end.max(cursor + 1);
            continue;
        };

        let tail = &data[cursor..nul];
        let existing = String::from_utf8_lossy(tail)
            .split(':')
            .filter(|part| !part.is_empty() && !part.contains("PLACEHOLD"))
            .map(str::to_string)
            .collect();

        spans.push(Span {
            start,
            len: nul - start,
            existing,
        });
        i = nul + 1;
    }

    spans
}

/// Rewrite every placeholder span to hold the preserved plus new target
/// paths. Returns `None` when no span exists. Over-capacity anywhere
/// fails the whole file before any byte is written.
pub fn apply(path: &Path, data: &[u8], targets: &[String]) -> Result<Option<Vec<u8>>> {
    let spans = find_spans(data);
    if spans.is_empty() {
        return Ok(None);
    }

    // encode and size-check every span up front
    let mut encoded = Vec::with_capacity(spans.len());
    for span in &spans {
        let mut paths: Vec<&str> = span.existing.iter().map(String::as_str).collect();
        for target in targets {
            if !paths.contains(&target.as_str()) {
                paths.push(target);
            }
        }
        let joined = paths.join(":").into_bytes();
        if joined.len() > span.len {
            return Err(Error::Capacity {
                path: path.to_path_buf(),
                needed: joined.len(),
                available: span.len,
                targets: paths.join(":"),
            });
        }
        encoded.push(joined);
    }

    let mut patched = data.to_vec();
    for (span, content) in spans.iter().zip(encoded) {
        let region = &mut patched[span.start..span.start + span.len];
        region[..content.len()].copy_from_slice(&content);
        region[content.len()..].fill(0);
    }
    Ok(Some(patched))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A span of `repeats` markers plus `tail`, NUL-terminated, embedded
    /// between fixed guard bytes.
    fn fixture(repeats: usize, tail: &[u8]) -> Vec<u8> {
        let mut data = b"\x7fELF-ish header ".to_vec();
        for _ in 0..repeats {
            data.extend_from_slice(PLACEHOLD);
        }
        data.extend_from_slice(tail);
        data.push(0);
        data.extend_from_slice(b" trailing section bytes");
        data
    }

    fn span_content(data: &[u8]) -> &[u8] {
        let start = b"\x7fELF-ish header ".len();
        let nul = data[start..].iter().position(|&b| b == 0).unwrap();
        &data[start..start + nul]
    }

    #[test]
    fn test_length_preserved_and_nul_padded() {
        let data = fixture(20, b"");
        let targets = vec!["/opt/prefix/lib".to_string()];

        let patched = apply(Path::new("libfoo.so"), &data, &targets)
            .unwrap()
            .unwrap();
        assert_eq!(patched.len(), data.len());

        // span decodes to exactly the new path list, NUL padding after
        let span_len = PLACEHOLD.len() * 20;
        let start = b"\x7fELF-ish header ".len();
        let region = &patched[start..start + span_len];
        assert!(region.starts_with(b"/opt/prefix/lib"));
        assert!(region[b"/opt/prefix/lib".len()..].iter().all(|&b| b == 0));

        // bytes outside the span are untouched
        assert_eq!(&patched[..start], &data[..start]);
        assert_eq!(&patched[start + span_len..], &data[start + span_len..]);
    }

    #[test]
    fn test_existing_paths_preserved_before_targets() {
        let data = fixture(20, b":/already/baked:/second");
        let targets = vec!["/opt/prefix/lib".to_string()];

        let patched = apply(Path::new("libfoo.so"), &data, &targets)
            .unwrap()
            .unwrap();
        let content = span_content(&patched);
        assert_eq!(content, b"/already/baked:/second:/opt/prefix/lib");
    }

    #[test]
    fn test_duplicate_targets_not_repeated() {
        let data = fixture(20, b":/opt/prefix/lib");
        let targets = vec!["/opt/prefix/lib".to_string()];

        let patched = apply(Path::new("libfoo.so"), &data, &targets)
            .unwrap()
            .unwrap();
        assert_eq!(span_content(&patched), b"/opt/prefix/lib");
    }

    #[test]
    fn test_capacity_error_leaves_input_untouched() {
        // five repeats reserve 50 bytes; demand far more
        let data = fixture(5, b"");
        let targets = vec!["/an/extremely/long/install/prefix/library/directory".to_string()];

        match apply(Path::new("libfoo.so"), &data, &targets) {
            Err(Error::Capacity {
                path,
                needed,
                available,
                ..
            }) => {
                assert_eq!(path, Path::new("libfoo.so"));
                assert_eq!(available, PLACEHOLD.len() * 5);
                assert!(needed > available);
            }
            other => panic!("expected Capacity error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_all_spans_validated_before_any_write() {
        // first span is roomy, second is deliberately short; nothing may
        // be written for either
        let mut data = fixture(20, b"");
        let second = fixture(5, b"");
        data.extend_from_slice(&second);

        let targets = vec!["/an/extremely/long/install/prefix/library/directory".to_string()];
        assert!(matches!(
            apply(Path::new("libfoo.so"), &data, &targets),
            Err(Error::Capacity { .. })
        ));
    }

    #[test]
    fn test_too_few_repeats_is_not_a_span() {
        let data = fixture(4, b"");
        let targets = vec!["/opt/lib".to_string()];
        assert!(apply(Path::new("x"), &data, &targets).unwrap().is_none());
    }

    #[test]
    fn test_no_marker_is_untouched() {
        let data = b"just some ordinary bytes".to_vec();
        let targets = vec!["/opt/lib".to_string()];
        assert!(apply(Path::new("x"), &data, &targets).unwrap().is_none());
    }

    #[test]
    fn test_multiple_spans_rewritten() {
        let mut data = fixture(20, b"");
        let first_len = data.len();
        data.extend_from_slice(&fixture(10, b":/old"));

        let targets = vec!["/opt/lib".to_string()];
        let patched = apply(Path::new("x"), &data, &targets).unwrap().unwrap();
        assert_eq!(patched.len(), data.len());

        assert_eq!(span_content(&patched[..first_len]), b"/opt/lib");
        assert_eq!(span_content(&patched[first_len..]), b"/old:/opt/lib");
    }
}

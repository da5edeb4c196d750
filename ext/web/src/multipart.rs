//! Multipart Codec (C9, spec §4.9): parse/serialize `multipart/form-data` as
//! part of Body methods, and the `application/x-www-form-urlencoded`
//! fallback chosen by `serialize` when no entry is a Blob/File.

use bytes::Bytes;

use crate::blob::Blob;
use crate::error::WebError;
use crate::form_data::{FormData, FormValue};

pub fn extract_boundary(content_type: &str) -> Option<String> {
    let lower = content_type.to_ascii_lowercase();
    if !lower.starts_with("multipart/form-data") {
        return None;
    }
    content_type.split(';').find_map(|part| {
        let part = part.trim();
        part.strip_prefix("boundary=").map(|b| b.trim_matches('"').to_string())
    })
}

struct Part {
    name: String,
    filename: Option<String>,
    content_type: Option<String>,
    body: Vec<u8>,
}

pub fn parse(bytes: &[u8], boundary: &str) -> Result<FormData, WebError> {
    let delimiter = format!("--{boundary}");
    let text_boundary = delimiter.as_bytes();
    let mut parts = Vec::new();
    let mut offset = 0;

    while let Some(rel) = find(&bytes[offset..], text_boundary) {
        let start = offset + rel + text_boundary.len();
        offset = start;
        if bytes[offset..].starts_with(b"--") {
            break;
        }
        let Some(header_end_rel) = find(&bytes[offset..], b"\r\n\r\n") else {
            break;
        };
        let header_block = &bytes[offset..offset + header_end_rel];
        let body_start = offset + header_end_rel + 4;
        let Some(next_boundary_rel) = find(&bytes[body_start..], text_boundary) else {
            break;
        };
        // trailing CRLF before the next boundary belongs to the delimiter, not the body
        let mut body_end = body_start + next_boundary_rel;
        if body_end >= 2 && bytes[body_end - 2] == b'\r' && bytes[body_end - 1] == b'\n' {
            body_end -= 2;
        }
        let headers = String::from_utf8_lossy(header_block);
        let (name, filename) = parse_content_disposition(&headers);
        let content_type = parse_header_value(&headers, "content-type");
        if let Some(name) = name {
            parts.push(Part {
                name,
                filename,
                content_type,
                body: bytes[body_start..body_end].to_vec(),
            });
        }
        offset = body_start + next_boundary_rel;
    }

    let mut fd = FormData::new();
    for part in parts {
        match part.filename {
            Some(filename) => {
                let blob = Blob::from_bytes(
                    Bytes::from(part.body),
                    part.content_type.unwrap_or_else(|| "application/octet-stream".to_string()),
                );
                fd.append_blob(&part.name, blob, Some(&filename));
            }
            None => {
                let text = String::from_utf8_lossy(&part.body).into_owned();
                fd.append_text(&part.name, &text);
            }
        }
    }
    Ok(fd)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn parse_content_disposition(headers: &str) -> (Option<String>, Option<String>) {
    let Some(line) = headers
        .lines()
        .find(|l| l.to_ascii_lowercase().starts_with("content-disposition"))
    else {
        return (None, None);
    };
    let name = extract_quoted(line, "name=");
    let filename = extract_quoted(line, "filename=");
    (name, filename)
}

fn extract_quoted(line: &str, key: &str) -> Option<String> {
    let idx = line.to_ascii_lowercase().find(key)?;
    let rest = &line[idx + key.len()..];
    let rest = rest.strip_prefix('"')?;
    let end = rest.find('"')?;
    Some(rest[..end].to_string())
}

fn parse_header_value(headers: &str, key: &str) -> Option<String> {
    headers.lines().find_map(|l| {
        let (k, v) = l.split_once(':')?;
        if k.trim().eq_ignore_ascii_case(key) {
            Some(v.trim().to_string())
        } else {
            None
        }
    })
}

/// Selects a boundary that does not appear in any value, and chooses
/// `multipart/form-data` only when an entry is a Blob/File (spec §4.9).
pub fn serialize(form: &FormData) -> (String, Vec<u8>) {
    let has_file = form
        .entries()
        .iter()
        .any(|(_, v)| matches!(v, FormValue::File(_)));
    if !has_file {
        let body = form
            .entries()
            .iter()
            .map(|(name, value)| {
                let FormValue::Text(text) = value else {
                    unreachable!()
                };
                format!("{}={}", url_encode(name), url_encode(text))
            })
            .collect::<Vec<_>>()
            .join("&");
        return (
            "application/x-www-form-urlencoded".to_string(),
            body.into_bytes(),
        );
    }

    let boundary = select_boundary(form);
    let mut out = Vec::new();
    for (name, value) in form.entries() {
        out.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        match value {
            FormValue::Text(text) => {
                out.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                );
                out.extend_from_slice(text.as_bytes());
            }
            FormValue::File(file) => {
                out.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{}\"\r\n",
                        file.name
                    )
                    .as_bytes(),
                );
                out.extend_from_slice(
                    format!("Content-Type: {}\r\n\r\n", file.blob.content_type()).as_bytes(),
                );
                out.extend_from_slice(&file.blob.bytes());
            }
        }
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={boundary}"), out)
}

fn select_boundary(form: &FormData) -> String {
    let mut candidate = "----islet-boundary".to_string();
    loop {
        let collides = form.entries().iter().any(|(_, v)| match v {
            FormValue::Text(t) => t.contains(&candidate),
            FormValue::File(f) => f.blob.bytes().windows(candidate.len()).any(|w| w == candidate.as_bytes()),
        });
        if !collides {
            return candidate;
        }
        candidate.push_str(&uuid::Uuid::new_v4().simple().to_string()[..8]);
    }
}

fn url_encode(s: &str) -> String {
    percent_encoding::utf8_percent_encode(s, percent_encoding::NON_ALPHANUMERIC).to_string()
}

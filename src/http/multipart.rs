//! `multipart/form-data` body decoding.
//!
//! Parts are delimited by `--<boundary>` lines. Each part carries its own
//! header block; the `Content-Disposition` `name` parameter decides whether
//! the part is kept, and a `filename` parameter turns it into an upload.

use crate::http::parser::{ParseError, find_bytes, split_header_line};
use crate::http::request::UploadedFile;
use std::collections::HashMap;

const DEFAULT_PART_TYPE: &str = "application/octet-stream";

/// Text fields and file parts decoded from one body.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FormData {
    pub fields: HashMap<String, String>,
    pub files: Vec<UploadedFile>,
}

pub fn is_multipart(content_type: &str) -> bool {
    content_type
        .trim()
        .to_ascii_lowercase()
        .contains("multipart/form-data")
}

/// Extracts the `boundary=` token from a Content-Type value, unquoting it.
pub fn boundary(content_type: &str) -> Option<String> {
    let lower = content_type.to_ascii_lowercase();
    let start = lower.find("boundary=")? + "boundary=".len();
    let raw = content_type[start..].trim_start();

    let token = match raw.strip_prefix('"') {
        Some(quoted) => quoted.split('"').next().unwrap_or(""),
        None => raw.split(';').next().unwrap_or("").trim(),
    };

    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

pub fn parse_multipart(body: &[u8], boundary: &str) -> Result<FormData, ParseError> {
    let opening = format!("--{boundary}").into_bytes();
    // Later delimiters must start a line, so payload bytes that merely
    // contain the boundary token are left alone.
    let delimiter = format!("\r\n--{boundary}").into_bytes();
    let mut form = FormData::default();

    let Some(first) = find_bytes(body, &opening, 0) else {
        return Ok(form);
    };
    let mut pos = first + opening.len();

    loop {
        let rest = &body[pos..];
        if rest.starts_with(b"--") {
            break;
        }
        if !rest.starts_with(b"\r\n") {
            return Err(ParseError::InvalidMultipart);
        }
        pos += 2;

        let headers_end =
            find_bytes(body, b"\r\n\r\n", pos).ok_or(ParseError::InvalidMultipart)?;
        let part_headers = parse_part_headers(&body[pos..headers_end]);
        pos = headers_end + 4;

        let next = find_bytes(body, &delimiter, pos);
        let data = &body[pos..next.unwrap_or(body.len())];

        if let Some(disposition) = part_headers.get("content-disposition") {
            let params = disposition_params(disposition);
            if let Some(name) = params.get("name") {
                match params.get("filename") {
                    Some(filename) => form.files.push(UploadedFile {
                        name: name.clone(),
                        filename: filename.clone(),
                        content_type: part_headers
                            .get("content-type")
                            .cloned()
                            .unwrap_or_else(|| DEFAULT_PART_TYPE.to_string()),
                        data: data.to_vec(),
                    }),
                    None => {
                        form.fields
                            .insert(name.clone(), String::from_utf8_lossy(data).into_owned());
                    }
                }
            }
        }

        match next {
            Some(found) => pos = found + delimiter.len(),
            None => break,
        }
    }

    Ok(form)
}

/// Part headers use the same colon rule as request headers; lines without a
/// colon are ignored rather than failing the whole body.
fn parse_part_headers(raw: &[u8]) -> HashMap<String, String> {
    String::from_utf8_lossy(raw)
        .split("\r\n")
        .filter_map(split_header_line)
        .map(|(k, v)| (k.to_ascii_lowercase(), v.to_string()))
        .collect()
}

/// `form-data; name="a"; filename="b.txt"` -> {name: a, filename: b.txt}
fn disposition_params(value: &str) -> HashMap<String, String> {
    value
        .split(';')
        .skip(1)
        .filter_map(|token| {
            let (key, value) = token.split_once('=')?;
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(value);
            Some((key.trim().to_ascii_lowercase(), value.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_variants() {
        assert_eq!(
            boundary("multipart/form-data; boundary=abc123").as_deref(),
            Some("abc123")
        );
        assert_eq!(
            boundary("multipart/form-data; boundary=\"quoted tok\"").as_deref(),
            Some("quoted tok")
        );
        assert_eq!(
            boundary("multipart/form-data; Boundary=xyz; charset=utf-8").as_deref(),
            Some("xyz")
        );
        assert_eq!(boundary("multipart/form-data"), None);
        assert_eq!(boundary("multipart/form-data; boundary="), None);
    }

    #[test]
    fn disposition_keys_are_case_insensitive() {
        let params = disposition_params("form-data; NAME=\"f\"; FileName=\"a.bin\"");
        assert_eq!(params.get("name").map(String::as_str), Some("f"));
        assert_eq!(params.get("filename").map(String::as_str), Some("a.bin"));
    }

    #[test]
    fn part_without_name_is_skipped() {
        let body = b"--b\r\nContent-Disposition: form-data\r\n\r\nignored\r\n--b--\r\n";
        let form = parse_multipart(body, "b").unwrap();
        assert!(form.fields.is_empty());
        assert!(form.files.is_empty());
    }

    #[test]
    fn boundary_token_inside_payload_is_data() {
        let body = b"--b\r\nContent-Disposition: form-data; name=\"f\"; filename=\"x.txt\"\r\n\r\n\
                     a--b c\n--b d\r\n--b--\r\n";
        let form = parse_multipart(body, "b").unwrap();
        assert_eq!(form.files[0].data, b"a--b c\n--b d");
    }

    #[test]
    fn missing_crlf_after_boundary_fails() {
        let body = b"--bXX";
        assert_eq!(
            parse_multipart(body, "b").unwrap_err(),
            ParseError::InvalidMultipart
        );
    }
}

use webserv::http::multipart::{boundary, is_multipart, parse_multipart};
use webserv::http::parser::{ParseError, parse_http_request};

const BOUNDARY: &str = "----webservBoundary7MA4YWxk";

fn form_body(file_bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Disposition: form-data; name=\"description\"\r\n\r\n");
    body.extend_from_slice(b"holiday photo\r\n");
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        b"Content-Disposition: form-data; name=\"file\"; filename=\"beach.png\"\r\n",
    );
    body.extend_from_slice(b"Content-Type: image/png\r\n\r\n");
    body.extend_from_slice(file_bytes);
    body.extend_from_slice(b"\r\n");
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

#[test]
fn test_multipart_field_and_file_round_trip() {
    let payload = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0xff];
    let form = parse_multipart(&form_body(&payload), BOUNDARY).unwrap();

    assert_eq!(form.fields.get("description").map(String::as_str), Some("holiday photo"));
    assert_eq!(form.files.len(), 1);

    let file = &form.files[0];
    assert_eq!(file.name, "file");
    assert_eq!(file.filename, "beach.png");
    assert_eq!(file.content_type, "image/png");
    assert_eq!(file.data, payload);
}

#[test]
fn test_multipart_through_request_parser() {
    let body = form_body(b"plain text file");
    let mut raw = format!(
        "POST /upload HTTP/1.1\r\nHost: localhost\r\nContent-Type: multipart/form-data; boundary={BOUNDARY}\r\nContent-Length: {}\r\n\r\n",
        body.len()
    )
    .into_bytes();
    raw.extend_from_slice(&body);

    let (req, consumed) = parse_http_request(&raw).unwrap();
    assert_eq!(consumed, raw.len());
    assert_eq!(req.form_fields["description"], "holiday photo");
    assert_eq!(req.uploaded_files[0].data, b"plain text file");
    assert_eq!(req.body, body);
}

#[test]
fn test_quoted_boundary() {
    let ct = "multipart/form-data; boundary=\"abc def\"";
    assert!(is_multipart(ct));
    assert_eq!(boundary(ct).as_deref(), Some("abc def"));
}

#[test]
fn test_file_part_without_content_type_defaults() {
    let body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"f\"; filename=\"x.bin\"\r\n\r\nxyz\r\n--{BOUNDARY}--\r\n"
    );
    let form = parse_multipart(body.as_bytes(), BOUNDARY).unwrap();

    assert_eq!(form.files[0].content_type, "application/octet-stream");
    assert_eq!(form.files[0].data, b"xyz");
}

#[test]
fn test_missing_header_separator_is_a_failure() {
    let body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"a\"\r\nvalue--{BOUNDARY}--"
    );
    assert!(matches!(
        parse_multipart(body.as_bytes(), BOUNDARY),
        Err(ParseError::InvalidMultipart)
    ));
}

#[test]
fn test_multipart_without_boundary_rejects_request() {
    let raw = b"POST /upload HTTP/1.1\r\nContent-Type: multipart/form-data\r\nContent-Length: 0\r\n\r\n";
    assert!(matches!(
        parse_http_request(raw),
        Err(ParseError::InvalidMultipart)
    ));
}

#[test]
fn test_file_payload_may_contain_boundary_token() {
    let payload = format!("line one --{BOUNDARY} still data\n--{BOUNDARY}-- also data");
    let form = parse_multipart(&form_body(payload.as_bytes()), BOUNDARY).unwrap();

    assert_eq!(form.files.len(), 1);
    assert_eq!(form.files[0].data, payload.as_bytes());
    assert_eq!(form.fields["description"], "holiday photo");
}

use webserv::http::response::{Response, ResponseBuilder, StatusCode};
use webserv::http::writer::{serialize_head, serialize_response};

#[test]
fn test_status_code_as_u16() {
    assert_eq!(StatusCode::Ok.as_u16(), 200);
    assert_eq!(StatusCode::Created.as_u16(), 201);
    assert_eq!(StatusCode::NoContent.as_u16(), 204);
    assert_eq!(StatusCode::MovedPermanently.as_u16(), 301);
    assert_eq!(StatusCode::BadRequest.as_u16(), 400);
    assert_eq!(StatusCode::NotFound.as_u16(), 404);
    assert_eq!(StatusCode::MethodNotAllowed.as_u16(), 405);
    assert_eq!(StatusCode::PayloadTooLarge.as_u16(), 413);
    assert_eq!(StatusCode::HeaderFieldsTooLarge.as_u16(), 431);
    assert_eq!(StatusCode::InternalServerError.as_u16(), 500);
    assert_eq!(StatusCode::BadGateway.as_u16(), 502);
}

#[test]
fn test_status_code_round_trips_through_u16() {
    for code in [200, 201, 204, 301, 400, 403, 404, 405, 413, 431, 500, 501, 502] {
        assert_eq!(StatusCode::from_u16(code).unwrap().as_u16(), code);
    }
    assert_eq!(StatusCode::from_u16(418), None);
}

#[test]
fn test_status_code_reason_phrase() {
    assert_eq!(StatusCode::Ok.reason_phrase(), "OK");
    assert_eq!(StatusCode::NoContent.reason_phrase(), "No Content");
    assert_eq!(StatusCode::NotFound.reason_phrase(), "Not Found");
    assert_eq!(
        StatusCode::MethodNotAllowed.reason_phrase(),
        "Method Not Allowed"
    );
    assert_eq!(
        StatusCode::HeaderFieldsTooLarge.reason_phrase(),
        "Request Header Fields Too Large"
    );
}

#[test]
fn test_response_builder_with_headers() {
    let response = ResponseBuilder::new(StatusCode::Ok)
        .header("Content-Type", "text/plain")
        .header("X-Custom", "value")
        .body(b"test".to_vec())
        .build();

    assert_eq!(response.headers.get("Content-Type").unwrap(), "text/plain");
    assert_eq!(response.headers.get("X-Custom").unwrap(), "value");
    assert_eq!(response.header("x-custom"), Some("value"));
}

#[test]
fn test_response_builder_auto_content_length() {
    let body = b"This is the body".to_vec();
    let response = ResponseBuilder::new(StatusCode::Ok).body(body.clone()).build();

    assert_eq!(response.headers["Content-Length"], body.len().to_string());
}

#[test]
fn test_response_builder_preserves_custom_content_length() {
    let response = ResponseBuilder::new(StatusCode::Ok)
        .header("Content-Length", "999")
        .body(b"test".to_vec())
        .build();

    assert_eq!(response.headers.get("Content-Length").unwrap(), "999");
}

#[test]
fn test_response_builder_empty_body() {
    let response = ResponseBuilder::new(StatusCode::NoContent).build();

    assert!(response.body.is_empty());
    assert_eq!(response.headers.get("Content-Length").unwrap(), "0");
}

#[test]
fn test_response_error_helper_is_html() {
    let response = Response::error(StatusCode::NotFound);

    assert_eq!(response.status, StatusCode::NotFound);
    assert_eq!(response.header("Content-Type"), Some("text/html"));
    let body = String::from_utf8(response.body).unwrap();
    assert!(body.contains("404 Not Found"));
}

#[test]
fn test_serialized_response_layout() {
    let mut response = ResponseBuilder::new(StatusCode::Created)
        .header("Content-Type", "text/plain")
        .body(b"made".to_vec())
        .build();
    response.set_header("Connection", "close");

    let bytes = serialize_response(&response);
    assert_eq!(
        bytes,
        b"HTTP/1.1 201 Created\r\nConnection: close\r\nContent-Length: 4\r\nContent-Type: text/plain\r\n\r\nmade"
    );
}

#[test]
fn test_head_serialization_keeps_length_but_drops_body() {
    let response = ResponseBuilder::new(StatusCode::Ok)
        .body(b"twelve bytes".to_vec())
        .build();
    let head = serialize_head(&response);

    assert!(head.ends_with(b"Content-Length: 12\r\n\r\n"));
    assert!(!head.ends_with(b"twelve bytes"));
}

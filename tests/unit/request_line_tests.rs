//! Unit tests for bounded request-line reading on device connections.

use chardev::ipc::server::{read_request_line, RequestLine, MAX_REQUEST_LINE};

#[tokio::test]
async fn reads_lines_one_at_a_time() {
    let mut input: &[u8] = b"{\"op\":\"open\"}\n{\"op\":\"close\"}\n";
    let mut buf = Vec::new();

    assert_eq!(read_request_line(&mut input, &mut buf).await.unwrap(), RequestLine::Line);
    assert_eq!(buf, b"{\"op\":\"open\"}\n");
    assert_eq!(read_request_line(&mut input, &mut buf).await.unwrap(), RequestLine::Line);
    assert_eq!(buf, b"{\"op\":\"close\"}\n");
    assert_eq!(read_request_line(&mut input, &mut buf).await.unwrap(), RequestLine::Eof);
}

#[tokio::test]
async fn unterminated_last_line_is_still_a_line() {
    let mut input: &[u8] = b"{\"op\":\"close\"}";
    let mut buf = Vec::new();

    assert_eq!(read_request_line(&mut input, &mut buf).await.unwrap(), RequestLine::Line);
    assert_eq!(buf, b"{\"op\":\"close\"}");
}

#[tokio::test]
async fn line_at_limit_is_accepted() {
    let mut line = vec![b'x'; MAX_REQUEST_LINE - 1];
    line.push(b'\n');
    let mut input: &[u8] = &line;
    let mut buf = Vec::new();

    assert_eq!(read_request_line(&mut input, &mut buf).await.unwrap(), RequestLine::Line);
    assert_eq!(buf.len(), MAX_REQUEST_LINE);
}

#[tokio::test]
async fn oversized_line_is_discarded_and_next_line_survives() {
    let mut data = vec![b'x'; MAX_REQUEST_LINE * 3];
    data.extend_from_slice(b"\n{\"op\":\"open\"}\n");
    let mut input: &[u8] = &data;
    let mut buf = Vec::new();

    assert_eq!(
        read_request_line(&mut input, &mut buf).await.unwrap(),
        RequestLine::Oversized
    );
    assert!(buf.is_empty(), "oversized line is not buffered");
    assert_eq!(read_request_line(&mut input, &mut buf).await.unwrap(), RequestLine::Line);
    assert_eq!(buf, b"{\"op\":\"open\"}\n");
}

#[tokio::test]
async fn full_capacity_write_fits_in_one_line() {
    use chardev::device::BUF_LEN;
    use chardev::ipc::protocol::DeviceRequest;

    let request = DeviceRequest::Write {
        data: vec![0xff; BUF_LEN],
        length: None,
    };
    let line = serde_json::to_string(&request).unwrap();
    assert!(line.len() < MAX_REQUEST_LINE);
}

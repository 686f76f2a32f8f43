use std::io::Read;

use courier_multipart::{Error, MultipartStream, Parameter, Stage};
use tempfile::tempdir;

fn drain(stream: &mut MultipartStream, chunk: usize) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut buf = vec![0u8; chunk];
    loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Ok(out);
        }
        out.extend_from_slice(&buf[..n]);
    }
}

#[test]
fn test_content_length_matches_output_for_mixed_parameters() {
    let dir = tempdir().unwrap();
    let small = dir.path().join("small.txt");
    let large = dir.path().join("large.png");
    std::fs::write(&small, "tiny").unwrap();
    std::fs::write(&large, (0..200_000u32).map(|i| (i % 251) as u8).collect::<Vec<_>>()).unwrap();

    let params = vec![
        Parameter::text("title", "holiday photos"),
        Parameter::number("count", 2.0),
        Parameter::file("notes", &small),
        Parameter::file("photo", &large),
        Parameter::binary("thumb", vec![0xffu8; 513]).with_content_type("image/jpeg"),
        Parameter::list("tags", ["sea", "sun"]),
    ];

    for chunk in [1usize, 3, 64, 4096, 1 << 20] {
        let mut stream = MultipartStream::new(&params).unwrap();
        let expected = stream.content_length();
        let body = drain(&mut stream, chunk).unwrap();
        assert_eq!(body.len() as u64, expected, "chunk size {chunk}");
        assert_eq!(stream.produced(), expected);
        assert_eq!(stream.stage(), Stage::Done);
    }
}

#[test]
fn test_file_part_carries_derived_content_type_and_bytes() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("doc.pdf");
    std::fs::write(&path, b"%PDF-1.4 body").unwrap();

    let mut stream = MultipartStream::with_boundary(&[Parameter::file("upload", &path)], "BD").unwrap();
    let body = String::from_utf8(drain(&mut stream, 10).unwrap()).unwrap();

    assert!(body.starts_with("--BD\r\nContent-Disposition: form-data; name=\"upload\"; filename=\"doc.pdf\"\r\n"));
    assert!(body.contains("Content-Type: application/pdf\r\n\r\n%PDF-1.4 body\r\n--BD--\r\n"));
}

#[test]
fn test_boundary_inside_file_is_detected_while_streaming() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("evil.bin");
    let mut content = vec![b'a'; 10_000];
    content.extend_from_slice(b"SPLITBOUNDARY");
    content.extend_from_slice(&[b'b'; 100]);
    std::fs::write(&path, &content).unwrap();

    let mut stream =
        MultipartStream::with_boundary(&[Parameter::file("f", &path)], "SPLITBOUNDARY").unwrap();
    // 7-byte reads split the boundary across two chunks.
    let err = drain(&mut stream, 7).unwrap_err();
    assert!(Error::is_collision(&err));
}

#[test]
fn test_file_shrinking_mid_stream_is_an_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("shrink.bin");
    std::fs::write(&path, vec![1u8; 1000]).unwrap();

    let mut stream = MultipartStream::with_boundary(&[Parameter::file("f", &path)], "S").unwrap();
    std::fs::write(&path, vec![1u8; 10]).unwrap();

    let err = drain(&mut stream, 64).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
}

#[test]
fn test_missing_file_fails_construction() {
    let err = MultipartStream::new(&[Parameter::file("f", "/no/such/file")]).unwrap_err();
    assert!(matches!(err, Error::Io { .. }));
}

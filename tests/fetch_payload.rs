use failure_link::{
    classify::{FailureLink, JobOutcome, ParStatus, UnpackStatus},
    config::Network,
    fetch::{
        FetchError, HttpIndexer, Indexer, IndexerReply, IndexerResponse, ReplacementPayload,
        ResponseHeaders, disposition_filename, looks_like_nzb,
    },
};
use std::io::{ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread::JoinHandle;

fn original() -> JobOutcome {
    JobOutcome {
        par_status: ParStatus::Failed,
        unpack_status: UnpackStatus::Skipped,
        forced_failure: false,
        directory: None,
        nzb_filename: "Original.nzb".into(),
        category: "tv".into(),
    }
}

fn response(status: u16) -> IndexerResponse {
    IndexerResponse {
        status,
        headers: ResponseHeaders::default(),
        body: None,
    }
}

#[test]
fn disposition_filename_forms() {
    assert_eq!(
        disposition_filename("attachment; filename=\"Show.S01E02.nzb\"").as_deref(),
        Some("Show.S01E02.nzb")
    );
    assert_eq!(
        disposition_filename("attachment;filename=Show.S01E02.nzb").as_deref(),
        Some("Show.S01E02.nzb")
    );
    assert_eq!(
        disposition_filename("attachment; FILENAME=\"a \\\"b\\\".nzb\"; size=10").as_deref(),
        Some("a \"b\".nzb")
    );
    assert_eq!(disposition_filename("inline"), None);
}

#[test]
fn nzb_signature() {
    assert!(looks_like_nzb(b"<?xml version=\"1.0\"?><nzb/>"));
    assert!(!looks_like_nzb(b""));
    assert!(!looks_like_nzb(b"<html>Not found</html>"));
    assert!(!looks_like_nzb(b" <?xml"));
}

#[test]
fn status_mapping() {
    assert!(matches!(response(200).into_reply(), Ok(IndexerReply::Acknowledged { .. })));
    assert!(matches!(response(404).into_reply(), Ok(IndexerReply::NoRelease(_))));
    assert!(matches!(response(500).into_reply(), Err(FetchError::Status(500))));
    assert!(matches!(response(302).into_reply(), Err(FetchError::Status(302))));
}

#[test]
fn payload_from_headers() {
    let headers = ResponseHeaders::from_pairs([
        ("Content-Disposition", "attachment; filename=\"Show.S01E02.nzb\""),
        ("X-DNZB-Category", "TV > HD"),
        ("X-DNZB-ProperName", "Show"),
        ("X-DNZB-EpisodeName", "Pilot"),
        ("Server", "nginx"),
    ]);
    let payload =
        ReplacementPayload::from_reply(&headers, Some(b"<?xml ?><nzb/>".to_vec()), &original())
            .unwrap();
    assert_eq!(payload.filename, "Show.S01E02.nzb");
    assert_eq!(payload.category, "TV > HD");
    assert_eq!(
        payload.dnzb_headers,
        vec![
            ("Category".to_string(), "TV > HD".to_string()),
            ("ProperName".to_string(), "Show".to_string()),
            ("EpisodeName".to_string(), "Pilot".to_string()),
        ]
    );
}

#[test]
fn lowercased_header_names_are_recased() {
    let headers = ResponseHeaders::from_pairs([("x-dnzb-more-info", "http://x")]);
    assert_eq!(
        headers.dnzb(),
        vec![("More-Info".to_string(), "http://x".to_string())]
    );
    assert_eq!(headers.get("X-DNZB-More-Info"), Some("http://x"));
}

#[test]
fn non_xml_body_is_no_payload() {
    let headers = ResponseHeaders::default();
    assert!(ReplacementPayload::from_reply(&headers, Some(b"sorry".to_vec()), &original()).is_none());
    assert!(ReplacementPayload::from_reply(&headers, Some(Vec::new()), &original()).is_none());
    assert!(ReplacementPayload::from_reply(&headers, None, &original()).is_none());
}

#[test]
fn missing_metadata_falls_back_to_failed_job() {
    let headers = ResponseHeaders::from_pairs([("Content-Disposition", "attachment")]);
    let payload =
        ReplacementPayload::from_reply(&headers, Some(b"<?xml?>".to_vec()), &original()).unwrap();
    assert_eq!(payload.filename, "Original.nzb");
    assert_eq!(payload.category, "tv");
    assert!(payload.dnzb_headers.is_empty());
}

const NZB_BODY: &str = "<?xml version=\"1.0\"?><nzb></nzb>";

fn http_response(status: &str, extra_headers: &[(&str, &str)], body: &str) -> String {
    let mut out = format!("HTTP/1.1 {status}\r\n");
    for (name, value) in extra_headers {
        out.push_str(&format!("{name}: {value}\r\n"));
    }
    out.push_str(&format!(
        "Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    ));
    out
}

fn read_request(stream: &mut TcpStream) {
    let mut seen = Vec::new();
    let mut buf = [0u8; 1024];
    while !seen.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut buf) {
            Ok(0) | Err(_) => return,
            Ok(n) => seen.extend_from_slice(&buf[..n]),
        }
    }
}

/// Local indexer that gives one canned answer per connection; `None` hangs
/// up after reading the request. Hands the listener back once done.
fn serve(answers: Vec<Option<String>>) -> (FailureLink, JoinHandle<TcpListener>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let link = FailureLink::parse(&format!(
        "http://{}/api?t=failure&id=42",
        listener.local_addr().unwrap()
    ))
    .unwrap();
    let server = std::thread::spawn(move || {
        for answer in answers {
            let (mut stream, _) = listener.accept().unwrap();
            read_request(&mut stream);
            if let Some(resp) = answer {
                stream.write_all(resp.as_bytes()).unwrap();
            }
        }
        listener
    });
    (link, server)
}

fn assert_no_further_connection(listener: TcpListener) {
    listener.set_nonblocking(true).unwrap();
    let err = listener.accept().map(|_| ()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::WouldBlock);
}

fn indexer() -> HttpIndexer {
    HttpIndexer::new(&Network {
        http_timeout_seconds: 10,
        ..Network::default()
    })
    .unwrap()
}

#[test]
fn http_indexer_returns_replacement_and_headers() {
    let resp = http_response(
        "200 OK",
        &[
            ("Content-Disposition", "attachment; filename=\"Next.Release.nzb\""),
            ("X-DNZB-Zeta", "1"),
            ("X-DNZB-Alpha", "2"),
            ("X-DNZB-Zeta", "3"),
        ],
        NZB_BODY,
    );
    let (link, server) = serve(vec![Some(resp)]);

    let response = indexer().fetch(&link, true).unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.body.as_deref(), Some(NZB_BODY.as_bytes()));
    let IndexerReply::Acknowledged { headers, body } = response.into_reply().unwrap() else {
        panic!("expected an acknowledged reply");
    };
    let payload = ReplacementPayload::from_reply(&headers, body, &original()).unwrap();
    assert_eq!(payload.filename, "Next.Release.nzb");
    assert_eq!(payload.category, "tv");
    // Repeated names are grouped together.
    assert_eq!(
        payload.dnzb_headers,
        vec![
            ("Zeta".to_string(), "1".to_string()),
            ("Zeta".to_string(), "3".to_string()),
            ("Alpha".to_string(), "2".to_string()),
        ]
    );
    assert_no_further_connection(server.join().unwrap());
}

#[test]
fn http_indexer_404_without_body_is_no_release() {
    let (link, server) = serve(vec![Some(http_response("404 Not Found", &[], "none"))]);

    let response = indexer().fetch(&link, false).unwrap();
    assert_eq!(response.status, 404);
    assert_eq!(response.body, None);
    assert!(matches!(response.into_reply(), Ok(IndexerReply::NoRelease(_))));
    assert_no_further_connection(server.join().unwrap());
}

#[test]
fn http_indexer_reads_body_only_on_success() {
    let (link, server) = serve(vec![
        Some(http_response("500 Internal Server Error", &[], NZB_BODY)),
        Some(http_response("200 OK", &[], NZB_BODY)),
    ]);
    let indexer = indexer();

    let failed = indexer.fetch(&link, true).unwrap();
    assert_eq!(failed.body, None);
    assert!(matches!(failed.into_reply(), Err(FetchError::Status(500))));

    let unwanted = indexer.fetch(&link, false).unwrap();
    assert_eq!(unwanted.status, 200);
    assert_eq!(unwanted.body, None);
    assert_no_further_connection(server.join().unwrap());
}

#[test]
fn http_indexer_retries_a_dropped_connection_once() {
    let (link, server) = serve(vec![None, Some(http_response("200 OK", &[], NZB_BODY))]);

    let response = indexer().fetch(&link, true).unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.body.as_deref(), Some(NZB_BODY.as_bytes()));
    assert_no_further_connection(server.join().unwrap());
}

#[test]
fn http_indexer_second_transport_failure_is_fatal() {
    let (link, server) = serve(vec![None, None]);

    let err = indexer().fetch(&link, true).unwrap_err();
    assert!(matches!(err, FetchError::Transport(_)), "{err:?}");
    assert_no_further_connection(server.join().unwrap());
}

//! Wire-contract checks: stable labels and payload field names
//!
//! Consumers key on the event label and the camelCase payload fields, so
//! any drift here is a breaking protocol change.

use sentinel_core::types::{PiiEntity, ScanEvent, ScanEventKind, ScanResult};
use chrono::Utc;
use serde_json::Value;

fn result() -> ScanResult {
    let entity = PiiEntity {
        pii_type: "EMAIL".into(),
        pii_type_label: "EMAIL".into(),
        start_position: 9,
        end_position: 25,
        confidence: 0.95,
        sensitive_value: Some("enc::john@example.com".into()),
        sensitive_context: Some("enc::Contact: john@example.com".into()),
        masked_context: Some("Contact: [EMAIL]".into()),
    };
    let summary = ScanResult::summarize(std::slice::from_ref(&entity));
    ScanResult {
        scan_id: "scan-1".into(),
        space_key: "SP".into(),
        page_id: "p-1".into(),
        page_title: "Title".into(),
        page_url: Some("http://example/pages/viewpage.action?pageId=p-1".into()),
        attachment_name: None,
        attachment_type: None,
        attachment_url: None,
        source_content: "Contact: john@example.com".into(),
        detected_entities: vec![entity],
        summary,
        analysis_progress_percentage: 50,
        emitted_at: Utc::now(),
        is_final: true,
    }
}

fn serialized(kind: ScanEventKind) -> Value {
    let event = ScanEvent::new("scan-1", kind).in_space("SP").on_page("p-1");
    serde_json::to_value(&event).unwrap()
}

#[test]
fn every_label_is_stable() {
    let kinds: Vec<(ScanEventKind, &str)> = vec![
        (ScanEventKind::MultiStart, "multiStart"),
        (
            ScanEventKind::Start {
                pages_total: 2,
                analysis_progress_percentage: 0,
            },
            "start",
        ),
        (
            ScanEventKind::PageStart {
                page_title: "T".into(),
                page_url: None,
                page_index: 1,
                pages_total: 2,
                analysis_progress_percentage: 0,
            },
            "pageStart",
        ),
        (ScanEventKind::Item(result()), "item"),
        (ScanEventKind::AttachmentItem(result()), "attachmentItem"),
        (
            ScanEventKind::PageComplete {
                analysis_progress_percentage: 50,
            },
            "pageComplete",
        ),
        (
            ScanEventKind::ScanError {
                attachment_name: None,
                message: "boom".into(),
            },
            "scanError",
        ),
        (
            ScanEventKind::Error {
                message: "fatal".into(),
            },
            "error",
        ),
        (
            ScanEventKind::Complete {
                analysis_progress_percentage: 100,
            },
            "complete",
        ),
        (ScanEventKind::MultiComplete, "multiComplete"),
        (ScanEventKind::Keepalive, "keepalive"),
    ];

    for (kind, label) in kinds {
        assert_eq!(kind.label(), label);
        let json = serialized(kind);
        assert_eq!(json["type"], label);
    }
}

#[test]
fn envelope_fields_are_camel_case() {
    let json = serialized(ScanEventKind::MultiStart);
    assert_eq!(json["scanId"], "scan-1");
    assert_eq!(json["spaceKey"], "SP");
    assert_eq!(json["pageId"], "p-1");
    assert!(json["ts"].is_string());
    assert_eq!(json["eventSeq"], 0);
}

#[test]
fn start_payload_fields() {
    let json = serialized(ScanEventKind::Start {
        pages_total: 7,
        analysis_progress_percentage: 25,
    });
    assert_eq!(json["payload"]["pagesTotal"], 7);
    assert_eq!(json["payload"]["analysisProgressPercentage"], 25);
}

#[test]
fn page_start_payload_fields() {
    let json = serialized(ScanEventKind::PageStart {
        page_title: "T".into(),
        page_url: Some("http://x".into()),
        page_index: 3,
        pages_total: 7,
        analysis_progress_percentage: 29,
    });
    let payload = &json["payload"];
    assert_eq!(payload["pageTitle"], "T");
    assert_eq!(payload["pageUrl"], "http://x");
    assert_eq!(payload["pageIndex"], 3);
    assert_eq!(payload["pagesTotal"], 7);
    assert_eq!(payload["analysisProgressPercentage"], 29);
}

#[test]
fn item_payload_carries_the_result() {
    let json = serialized(ScanEventKind::Item(result()));
    let payload = &json["payload"];
    assert_eq!(payload["scanId"], "scan-1");
    assert_eq!(payload["spaceKey"], "SP");
    assert_eq!(payload["pageId"], "p-1");
    assert_eq!(payload["pageTitle"], "Title");
    assert_eq!(payload["sourceContent"], "Contact: john@example.com");
    assert_eq!(payload["isFinal"], true);
    assert_eq!(payload["analysisProgressPercentage"], 50);
    assert_eq!(payload["summary"]["EMAIL"], 1);

    let entity = &payload["detectedEntities"][0];
    assert_eq!(entity["piiType"], "EMAIL");
    assert_eq!(entity["piiTypeLabel"], "EMAIL");
    assert_eq!(entity["startPosition"], 9);
    assert_eq!(entity["endPosition"], 25);
    assert_eq!(entity["maskedContext"], "Contact: [EMAIL]");
}

#[test]
fn scan_error_payload_fields() {
    let json = serialized(ScanEventKind::ScanError {
        attachment_name: Some("file.pdf".into()),
        message: "boom".into(),
    });
    assert_eq!(json["payload"]["attachmentName"], "file.pdf");
    assert_eq!(json["payload"]["message"], "boom");

    // An absent attachment name is omitted, not null
    let json = serialized(ScanEventKind::ScanError {
        attachment_name: None,
        message: "boom".into(),
    });
    assert!(json["payload"].get("attachmentName").is_none());
}

#[test]
fn events_roundtrip_through_json() {
    for kind in [
        ScanEventKind::MultiStart,
        ScanEventKind::Item(result()),
        ScanEventKind::Error {
            message: "fatal".into(),
        },
        ScanEventKind::Keepalive,
    ] {
        let event = ScanEvent::new("scan-1", kind).in_space("SP");
        let json = serde_json::to_string(&event).unwrap();
        let back: ScanEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.label(), event.label());
        assert_eq!(back.scan_id, event.scan_id);
        assert_eq!(back.space_key, event.space_key);
    }
}

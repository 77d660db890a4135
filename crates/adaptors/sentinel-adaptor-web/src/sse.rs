//! Wire shim: orchestrator events to SSE frames

use axum::response::sse::Event;
use sentinel_core::types::ScanEvent;

/// Map a scan event to its on-the-wire SSE frame
///
/// The frame's event name is the stable label of the closed event set; the
/// data is the full event as JSON. Consumers tolerate additional fields.
pub fn to_sse_event(event: &ScanEvent) -> Event {
    let data = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    Event::default().event(event.label()).data(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_core::types::ScanEventKind;

    #[test]
    fn test_frame_carries_label_and_payload() {
        let event = ScanEvent::new(
            "s1",
            ScanEventKind::Start {
                pages_total: 3,
                analysis_progress_percentage: 0,
            },
        )
        .in_space("SP");

        // The Event API is opaque; format and inspect the rendered frame
        let rendered = format!("{:?}", to_sse_event(&event));
        assert!(rendered.contains("start"));
        assert!(rendered.contains("pagesTotal"));
    }
}

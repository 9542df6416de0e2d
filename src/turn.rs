//! Turn processor (the core request).
//! Pairs the device's latest board frame with the submitted piece photo,
//! downscales both, asks the vision model for module and piece grid
//! positions, and recovers a JSON object from the model's text.

use serde_json::Value;

use crate::error::RelayError;
use crate::extract::extract_json;
use crate::prepare::prepare_image;
use crate::state::AppState;

/// The six board modules the model is asked to locate.
const MODULES: [&str; 6] = [
    "Mall",
    "HDB Block",
    "Wet Market",
    "Park",
    "MRT Station",
    "Bus Stop",
];

#[derive(Debug)]
pub struct TurnOutcome {
    /// Parsed model output, stored as-is; key/value shapes are trusted
    /// as returned.
    pub processed_data: Value,
    /// Raw model text, returned alongside for auditability.
    pub raw_response: String,
}

/// Runs one turn for `session_id` against the board last seen by
/// `device_id`. On success the parsed result overwrites the session's
/// stored game state; on any failure the stored state is untouched.
pub async fn process_turn(
    state: &AppState,
    device_id: &str,
    session_id: &str,
    piece_bytes: &[u8],
) -> Result<TurnOutcome, RelayError> {
    let board_bytes = state.latest_image(device_id).await.ok_or_else(|| {
        RelayError::NotFound(format!("No recent image found for device with ID: {device_id}."))
    })?;

    let board_jpeg = prepare_image(&board_bytes, "board")?;
    let piece_jpeg = prepare_image(piece_bytes, "piece")?;

    let prompt = build_prompt();
    let raw_response = state
        .vision
        .generate(&prompt, &[board_jpeg, piece_jpeg])
        .await?;

    let processed_data =
        extract_json(&raw_response).ok_or_else(|| RelayError::response_parse(raw_response.clone()))?;

    state.store_session(session_id, processed_data.clone()).await;

    Ok(TurnOutcome {
        processed_data,
        raw_response,
    })
}

fn build_prompt() -> String {
    let module_list = MODULES
        .iter()
        .map(|m| format!("'{m}'"))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"Analyze the two provided images.
The first image is the game board.
The second image is a specific game piece.

1. On the game board, identify the locations of the following modules: {module_list}.
2. On the game board, locate the game piece shown in the second image.

Return the output as a JSON object with two keys: 'module_positions' and 'piece_position'.
- 'module_positions' should be a dictionary mapping module names to their grid coordinates (e.g., "A1", "B3").
- 'piece_position' should be the grid coordinate of the identified game piece.

Example response format:
{{
  "module_positions": {{ "Mall": "C3", "Park": "D2" }},
  "piece_position": "B4"
}}"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::{VisionBackend, VisionError};
    use async_trait::async_trait;
    use image::{DynamicImage, ImageFormat, RgbImage};
    use serde_json::json;
    use std::io::Cursor;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns a canned response and counts how often it is asked.
    struct FixedVision {
        text: String,
        calls: AtomicUsize,
    }

    impl FixedVision {
        fn new(text: &str) -> Arc<Self> {
            Arc::new(Self {
                text: text.to_string(),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl VisionBackend for FixedVision {
        async fn generate(&self, _: &str, _: &[Vec<u8>]) -> Result<String, VisionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.text.clone())
        }
    }

    fn png_bytes() -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::new(8, 8));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[tokio::test]
    async fn test_missing_board_image_skips_model() {
        let vision = FixedVision::new("{}");
        let state = AppState::new(vision.clone());

        let err = process_turn(&state, "cam-1", "s1", &png_bytes())
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::NotFound(_)));
        assert_eq!(vision.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_bare_json_response_is_parsed() {
        let vision =
            FixedVision::new(r#"{"module_positions": {"Mall": "C3"}, "piece_position": "B4"}"#);
        let state = AppState::new(vision);
        state.record_frame("cam-1", png_bytes()).await;

        let outcome = process_turn(&state, "cam-1", "s1", &png_bytes())
            .await
            .unwrap();
        let expected = json!({"module_positions": {"Mall": "C3"}, "piece_position": "B4"});
        assert_eq!(outcome.processed_data, expected);
        assert_eq!(state.sessions.read().await["s1"], expected);
    }

    #[tokio::test]
    async fn test_fenced_json_response_is_parsed() {
        let vision = FixedVision::new(
            "```json\n{\"module_positions\": {\"Mall\": \"C3\"}, \"piece_position\": \"B4\"}\n```",
        );
        let state = AppState::new(vision);
        state.record_frame("cam-1", png_bytes()).await;

        let outcome = process_turn(&state, "cam-1", "s1", &png_bytes())
            .await
            .unwrap();
        assert_eq!(
            outcome.processed_data,
            json!({"module_positions": {"Mall": "C3"}, "piece_position": "B4"})
        );
    }

    #[tokio::test]
    async fn test_unparsable_response_leaves_session_untouched() {
        let vision = FixedVision::new("I see a lovely board but cannot answer in JSON.");
        let state = AppState::new(vision);
        state.record_frame("cam-1", png_bytes()).await;
        let prior = json!({"piece_position": "A1"});
        state.store_session("s1", prior.clone()).await;

        let err = process_turn(&state, "cam-1", "s1", &png_bytes())
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::ResponseParse { .. }));
        assert_eq!(state.sessions.read().await["s1"], prior);
    }

    #[tokio::test]
    async fn test_success_overwrites_prior_session_state() {
        let vision = FixedVision::new(r#"{"module_positions": {}, "piece_position": "D4"}"#);
        let state = AppState::new(vision);
        state.record_frame("cam-1", png_bytes()).await;
        state
            .store_session("s1", json!({"piece_position": "A1"}))
            .await;

        process_turn(&state, "cam-1", "s1", &png_bytes())
            .await
            .unwrap();
        assert_eq!(
            state.sessions.read().await["s1"],
            json!({"module_positions": {}, "piece_position": "D4"})
        );
    }

    #[tokio::test]
    async fn test_undecodable_piece_image_is_rejected() {
        let vision = FixedVision::new("{}");
        let state = AppState::new(vision.clone());
        state.record_frame("cam-1", png_bytes()).await;

        let err = process_turn(&state, "cam-1", "s1", b"not an image")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RelayError::InvalidImage { kind: "piece", .. }
        ));
        assert_eq!(vision.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_prompt_names_every_module() {
        let prompt = build_prompt();
        for module in MODULES {
            assert!(prompt.contains(module), "prompt missing module {module}");
        }
        assert!(prompt.contains("module_positions"));
        assert!(prompt.contains("piece_position"));
    }
}

//! Form controller: uploads a file, tracks progress and merges the result.
//!
//! Every failure leaves the form exactly as it was before the upload.

use std::time::Duration;
use tracing::{info, warn};

use crate::client::{ClientError, UploadClient, UploadFile};
use crate::form::TravellerForm;
use crate::progress::{self, UploadProgress, CLEAR_DELAY};

/// Non-blocking notification shown to the user after an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Success(String),
    Error(String),
}

pub struct FormController {
    form: TravellerForm,
    client: UploadClient,
    progress: UploadProgress,
    clear_delay: Duration,
}

impl FormController {
    pub fn new(client: UploadClient) -> Self {
        Self {
            form: TravellerForm::new(),
            client,
            progress: UploadProgress::new(),
            clear_delay: CLEAR_DELAY,
        }
    }

    pub fn with_clear_delay(mut self, delay: Duration) -> Self {
        self.clear_delay = delay;
        self
    }

    pub fn form(&self) -> &TravellerForm {
        &self.form
    }

    pub fn form_mut(&mut self) -> &mut TravellerForm {
        &mut self.form
    }

    pub fn progress(&self) -> &UploadProgress {
        &self.progress
    }

    /// Upload `file`, merge what comes back, and report the outcome.
    ///
    /// Only one upload runs at a time; the next one may start once the
    /// previous indicator has been cleared.
    pub async fn handle_file_upload(&mut self, file: &UploadFile) -> Notice {
        if self.progress.is_active() {
            return Notice::Error("A file is already being processed".to_string());
        }

        info!("File upload started: {}", file.filename);
        self.progress.start();
        self.progress.advance(progress::UPLOAD_START, "Uploading file...");

        let tracker = self.progress.clone();
        let outcome = self
            .client
            .upload(file, move |sent, total| tracker.upload(sent, total))
            .await;
        let notice = match outcome {
            Ok(body) => self.apply_response(&body),
            Err(e) => {
                warn!("Error processing file: {}", e);
                Notice::Error(describe_error(&e))
            }
        };

        self.progress.clear_after(self.clear_delay);
        notice
    }

    fn apply_response(&mut self, body: &serde_json::Value) -> Notice {
        self.progress
            .advance(progress::PROCESSING, "Processing AI response...");

        if let Some(refusal) = body.get("refusal").and_then(|r| r.as_str()) {
            warn!("Model refused: {}", refusal);
            return Notice::Error(refusal.to_string());
        }

        self.progress
            .advance(progress::UPDATING, "Updating traveller information...");

        match self.form.merge_response(body) {
            Ok(merged) => {
                info!("Traveller information updated ({} slots)", merged);
                self.progress
                    .advance(progress::COMPLETE, "Processing complete!");
                Notice::Success("Traveller information updated".to_string())
            }
            Err(_) => Notice::Error("Received invalid data from AI. Please try again.".to_string()),
        }
    }
}

/// User-facing text for a failed upload. Transport and HTTP failures get a
/// common prefix and the server's own error detail when it sent one.
fn describe_error(err: &ClientError) -> String {
    match err {
        ClientError::Transport(e) => format!("Failed to process the file: {}", e),
        ClientError::Server { error, message, .. } => format!(
            "Failed to process the file: {}",
            error.as_deref().unwrap_or(message)
        ),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn note() -> UploadFile {
        UploadFile::new("note.txt", b"John Smith, born 1990-05-02, Swedish".to_vec()).unwrap()
    }

    async fn controller_answering(status: u16, body: serde_json::Value) -> (MockServer, FormController) {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/process-travellers");
                then.status(status).json_body(body);
            })
            .await;
        let controller = FormController::new(UploadClient::new(&server.base_url()))
            .with_clear_delay(Duration::from_millis(20));
        (server, controller)
    }

    #[tokio::test]
    async fn test_successful_upload_merges_and_completes() {
        let (_server, mut controller) = controller_answering(
            200,
            serde_json::json!({
                "travellers": [{"firstName": "John", "lastName": "Smith", "dateOfBirth": "19900502",
                                "gender": "male", "nationality": "Swedish"}],
                "globalInfo": {}
            }),
        )
        .await;

        let notice = controller.handle_file_upload(&note()).await;
        assert_eq!(notice, Notice::Success("Traveller information updated".into()));

        let slot = controller.form().slot(1).unwrap();
        assert_eq!(slot.summary_line(), "✓ John Smith (Sverige)");

        let state = controller.progress().current();
        assert_eq!(state.percent, 100);
        assert_eq!(state.label, "Processing complete!");

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!controller.progress().is_active());
    }

    #[tokio::test]
    async fn test_refusal_is_reported_and_form_untouched() {
        let (_server, mut controller) =
            controller_answering(200, serde_json::json!({"refusal": "I can't help with that."})).await;

        let notice = controller.handle_file_upload(&note()).await;
        assert_eq!(notice, Notice::Error("I can't help with that.".into()));
        assert_eq!(controller.form().slots(), TravellerForm::new().slots());
    }

    #[tokio::test]
    async fn test_malformed_travellers_warns_and_form_untouched() {
        let (_server, mut controller) =
            controller_answering(200, serde_json::json!({"travellers": null})).await;

        let notice = controller.handle_file_upload(&note()).await;
        assert_eq!(
            notice,
            Notice::Error("Received invalid data from AI. Please try again.".into())
        );
        assert_eq!(controller.form().slots(), TravellerForm::new().slots());
    }

    #[tokio::test]
    async fn test_server_error_detail_is_shown() {
        let (_server, mut controller) = controller_answering(
            500,
            serde_json::json!({"message": "Error extracting file content", "error": "failed to load PDF: Parse error"}),
        )
        .await;

        let notice = controller.handle_file_upload(&note()).await;
        assert_eq!(
            notice,
            Notice::Error("Failed to process the file: failed to load PDF: Parse error".into())
        );
    }

    #[tokio::test]
    async fn test_transport_error_leaves_prior_state() {
        // Nothing listens on port 1
        let mut controller = FormController::new(UploadClient::new("http://127.0.0.1:1"))
            .with_clear_delay(Duration::from_millis(20));
        controller.form_mut().select_slot(1).unwrap().first_name = "Anna".into();
        controller.form_mut().save_slot();
        let before = controller.form().slots().to_vec();

        let notice = controller.handle_file_upload(&note()).await;
        match notice {
            Notice::Error(msg) => assert!(msg.starts_with("Failed to process the file: ")),
            other => panic!("expected error, got {:?}", other),
        }
        assert_eq!(controller.form().slots(), &before[..]);
    }

    #[tokio::test]
    async fn test_second_upload_waits_for_indicator_to_clear() {
        let (_server, controller) = controller_answering(200, serde_json::json!({"travellers": [], "globalInfo": {}})).await;
        let mut controller = controller.with_clear_delay(Duration::from_millis(200));

        assert!(matches!(controller.handle_file_upload(&note()).await, Notice::Success(_)));
        assert!(matches!(controller.handle_file_upload(&note()).await, Notice::Error(_)));

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(matches!(controller.handle_file_upload(&note()).await, Notice::Success(_)));
    }
}

//! Wire types for the rendering backend's JSON contract.
//!
//! Responses are flat objects discriminated by a `status` string, with
//! optional fields whose presence depends on that status. The structs
//! here keep the raw shape; the `outcome`/`observation` methods fold a
//! raw response into a closed enum so callers branch exhaustively
//! instead of string-matching.

use serde::{Deserialize, Serialize};

/// Fallback message for `status == "error"` responses without one.
const DEFAULT_SERVER_ERROR: &str = "server error";

/// Progress reported while a job runs but the backend omits the field.
pub const DEFAULT_IN_PROGRESS: u8 = 50;

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Body of `POST /start-frame`.
#[derive(Debug, Clone, Serialize)]
pub struct StartFrameRequest {
    pub scene_key: String,
    pub format_key: String,
    pub background_key: String,
    /// Backend paths previously confirmed by the upload endpoint.
    pub photos: Vec<String>,
}

/// Body of `POST /render/start_paid`.
#[derive(Debug, Clone, Serialize)]
pub struct StartRenderRequest {
    pub format_key: String,
    pub scene_key: String,
    pub background_key: String,
    /// Empty string means a silent render.
    pub music_key: String,
    pub title: String,
    pub subtitle: String,
    pub photos: Vec<String>,
    /// Client tag for backend-side correlation, e.g. `web_1700000000000`.
    pub user: String,
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// Confirmed upload paths from `POST /upload`.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadResponse {
    #[serde(default)]
    pub files: Vec<String>,
}

/// Preview response from `POST /start-frame`.
#[derive(Debug, Clone, Deserialize)]
pub struct StartFrameResponse {
    /// URL of the rendered preview image. The endpoint has been observed
    /// answering 200 without it, so absence is checked by the client.
    #[serde(default)]
    pub start_frame_url: Option<String>,
}

/// Finished-render payload nested under `result`.
#[derive(Debug, Clone, Deserialize)]
pub struct RenderResult {
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub start_frame_url: Option<String>,
}

/// Payment object attached to `need_payment` responses.
///
/// Some providers return a linked-data document (`@context` present)
/// with the link under `paymentLink`, others a plain object with `url`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentObject {
    #[serde(rename = "@context", default)]
    pub context: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(rename = "paymentLink", default)]
    pub payment_link: Option<String>,
}

/// Raw response of `POST /render/start_paid`.
#[derive(Debug, Clone, Deserialize)]
pub struct StartRenderResponse {
    pub status: String,
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub status_url: Option<String>,
    #[serde(default)]
    pub payment_url: Option<String>,
    #[serde(default)]
    pub payment_id: Option<String>,
    #[serde(default)]
    pub payment_key: Option<String>,
    #[serde(default)]
    pub price_rub: Option<u32>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub result: Option<RenderResult>,
    #[serde(default)]
    pub payment: Option<PaymentObject>,
}

/// Raw response of `GET /render/status/{job_id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct JobStatusResponse {
    pub status: String,
    #[serde(default)]
    pub progress: Option<i64>,
    #[serde(default)]
    pub start_frame_url: Option<String>,
    #[serde(default)]
    pub result: Option<RenderResult>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Raw response of `GET /render/status_by_payment/{payment_key}`.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentStatusResponse {
    pub status: String,
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub result: Option<RenderResult>,
}

// ---------------------------------------------------------------------------
// Interpretation
// ---------------------------------------------------------------------------

/// Interpreted outcome of a render submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartRenderOutcome {
    /// The backend already had the finished video.
    Done { video_url: String },
    /// A payment must be completed before rendering begins.
    NeedPayment {
        /// Where the user pays, when the backend supplied a link.
        url: Option<String>,
        payment_key: Option<String>,
        price_rub: Option<u32>,
    },
    /// Rendering has started; poll the job for the result.
    RenderStarted { job_id: String },
    /// A payment was created earlier and is awaiting confirmation.
    PendingPayment { payment_key: Option<String> },
    /// The backend refused the submission.
    ServerError { message: String },
    /// A status value this client does not know.
    Unrecognized { status: String },
}

impl StartRenderResponse {
    /// Payment URL, wherever the backend put it.
    ///
    /// Tried in order: the flat `payment_url` field, then `payment.url`,
    /// then `payment.paymentLink`. Empty strings count as absent.
    pub fn payment_link(&self) -> Option<String> {
        [
            self.payment_url.as_deref(),
            self.payment.as_ref().and_then(|p| p.url.as_deref()),
            self.payment.as_ref().and_then(|p| p.payment_link.as_deref()),
        ]
        .into_iter()
        .flatten()
        .find(|url| !url.is_empty())
        .map(str::to_string)
    }

    /// Fold the raw response into a [`StartRenderOutcome`].
    ///
    /// `done` without a video URL and `render_started` without a job id
    /// are contract violations and fold into `Unrecognized` rather than
    /// producing half-usable outcomes.
    pub fn outcome(&self) -> StartRenderOutcome {
        match self.status.as_str() {
            "need_payment" => StartRenderOutcome::NeedPayment {
                url: self.payment_link(),
                payment_key: self.payment_key.clone(),
                price_rub: self.price_rub,
            },
            "done" => match self.result.as_ref().and_then(|r| r.video_url.as_deref()) {
                Some(video_url) => StartRenderOutcome::Done {
                    video_url: video_url.to_string(),
                },
                None => StartRenderOutcome::Unrecognized {
                    status: self.status.clone(),
                },
            },
            "render_started" => match self.job_id.as_deref() {
                Some(job_id) => StartRenderOutcome::RenderStarted {
                    job_id: job_id.to_string(),
                },
                None => StartRenderOutcome::Unrecognized {
                    status: self.status.clone(),
                },
            },
            "pending_payment" => StartRenderOutcome::PendingPayment {
                payment_key: self.payment_key.clone(),
            },
            "error" => StartRenderOutcome::ServerError {
                message: self
                    .message
                    .clone()
                    .unwrap_or_else(|| DEFAULT_SERVER_ERROR.to_string()),
            },
            _ => StartRenderOutcome::Unrecognized {
                status: self.status.clone(),
            },
        }
    }
}

/// One observation of a running render job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobObservation {
    /// Queued or processing. Carries the backend's progress percentage
    /// and a possibly refreshed preview frame.
    InProgress {
        progress: u8,
        start_frame_url: Option<String>,
    },
    /// The job finished. The video URL is optional at the wire level;
    /// callers decide how to treat a completion without one.
    Done {
        video_url: Option<String>,
        start_frame_url: Option<String>,
    },
    /// The job failed server-side.
    Failed { message: String },
    /// A status value this client does not know.
    Unrecognized { status: String },
}

impl JobStatusResponse {
    /// Fold the raw response into a [`JobObservation`].
    ///
    /// Missing progress reads as [`DEFAULT_IN_PROGRESS`]; out-of-range
    /// values are clamped to 0..=100.
    pub fn observation(&self) -> JobObservation {
        match self.status.as_str() {
            "queued" | "processing" => JobObservation::InProgress {
                progress: self
                    .progress
                    .map(|p| p.clamp(0, 100) as u8)
                    .unwrap_or(DEFAULT_IN_PROGRESS),
                start_frame_url: self.start_frame_url.clone(),
            },
            "done" => {
                let result = self.result.as_ref();
                JobObservation::Done {
                    video_url: result.and_then(|r| r.video_url.clone()),
                    start_frame_url: result.and_then(|r| r.start_frame_url.clone()),
                }
            }
            "error" => JobObservation::Failed {
                message: self
                    .error
                    .clone()
                    .unwrap_or_else(|| DEFAULT_SERVER_ERROR.to_string()),
            },
            _ => JobObservation::Unrecognized {
                status: self.status.clone(),
            },
        }
    }
}

/// One observation of a payment that gates a render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentObservation {
    /// Payment confirmed; rendering started under the given job.
    RenderStarted { job_id: String },
    /// The render finished while the payment poll was waiting.
    Done { job_id: String, video_url: String },
    /// Nothing conclusive yet; keep polling.
    Pending,
}

impl PaymentStatusResponse {
    /// Fold the raw response into a [`PaymentObservation`].
    ///
    /// Anything short of a fully-populated `render_started` or `done`
    /// reads as `Pending`; the payment poll is deliberately tolerant.
    pub fn observation(&self) -> PaymentObservation {
        match self.status.as_str() {
            "render_started" => match self.job_id.as_deref() {
                Some(job_id) => PaymentObservation::RenderStarted {
                    job_id: job_id.to_string(),
                },
                None => PaymentObservation::Pending,
            },
            "done" => {
                let video_url = self.result.as_ref().and_then(|r| r.video_url.as_deref());
                match (self.job_id.as_deref(), video_url) {
                    (Some(job_id), Some(video_url)) => PaymentObservation::Done {
                        job_id: job_id.to_string(),
                        video_url: video_url.to_string(),
                    },
                    _ => PaymentObservation::Pending,
                }
            }
            _ => PaymentObservation::Pending,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // -- Submission outcomes --

    #[test]
    fn outcome_done_with_video() {
        let resp: StartRenderResponse = serde_json::from_str(
            r#"{"status":"done","result":{"video_url":"https://cdn/v/1.mp4"}}"#,
        )
        .unwrap();
        match resp.outcome() {
            StartRenderOutcome::Done { video_url } => {
                assert_eq!(video_url, "https://cdn/v/1.mp4");
            }
            other => panic!("Expected Done, got {other:?}"),
        }
    }

    #[test]
    fn outcome_done_without_video_is_unrecognized() {
        let resp: StartRenderResponse = serde_json::from_str(r#"{"status":"done"}"#).unwrap();
        match resp.outcome() {
            StartRenderOutcome::Unrecognized { status } => assert_eq!(status, "done"),
            other => panic!("Expected Unrecognized, got {other:?}"),
        }
    }

    #[test]
    fn outcome_need_payment_flat_url() {
        let resp: StartRenderResponse = serde_json::from_str(
            r#"{"status":"need_payment","payment_url":"https://pay/1","payment_key":"pk-1","price_rub":349}"#,
        )
        .unwrap();
        match resp.outcome() {
            StartRenderOutcome::NeedPayment {
                url,
                payment_key,
                price_rub,
            } => {
                assert_eq!(url.as_deref(), Some("https://pay/1"));
                assert_eq!(payment_key.as_deref(), Some("pk-1"));
                assert_eq!(price_rub, Some(349));
            }
            other => panic!("Expected NeedPayment, got {other:?}"),
        }
    }

    #[test]
    fn outcome_need_payment_nested_url() {
        let resp: StartRenderResponse = serde_json::from_str(
            r#"{"status":"need_payment","payment":{"url":"https://pay/nested"}}"#,
        )
        .unwrap();
        match resp.outcome() {
            StartRenderOutcome::NeedPayment { url, .. } => {
                assert_eq!(url.as_deref(), Some("https://pay/nested"));
            }
            other => panic!("Expected NeedPayment, got {other:?}"),
        }
    }

    #[test]
    fn outcome_need_payment_linked_data_payment_link() {
        let resp: StartRenderResponse = serde_json::from_str(
            r#"{"status":"need_payment","payment":{"@context":"https://schema.org","id":"op-7","paymentLink":"https://pay/ld"}}"#,
        )
        .unwrap();
        match resp.outcome() {
            StartRenderOutcome::NeedPayment { url, .. } => {
                assert_eq!(url.as_deref(), Some("https://pay/ld"));
            }
            other => panic!("Expected NeedPayment, got {other:?}"),
        }
    }

    #[test]
    fn payment_link_prefers_flat_then_url_then_link() {
        let resp: StartRenderResponse = serde_json::from_str(
            r#"{"status":"need_payment","payment_url":"https://pay/flat","payment":{"url":"https://pay/url","paymentLink":"https://pay/link"}}"#,
        )
        .unwrap();
        assert_eq!(resp.payment_link().as_deref(), Some("https://pay/flat"));

        let resp: StartRenderResponse = serde_json::from_str(
            r#"{"status":"need_payment","payment":{"url":"https://pay/url","paymentLink":"https://pay/link"}}"#,
        )
        .unwrap();
        assert_eq!(resp.payment_link().as_deref(), Some("https://pay/url"));
    }

    #[test]
    fn payment_link_skips_empty_strings() {
        let resp: StartRenderResponse = serde_json::from_str(
            r#"{"status":"need_payment","payment_url":"","payment":{"paymentLink":"https://pay/ld"}}"#,
        )
        .unwrap();
        assert_eq!(resp.payment_link().as_deref(), Some("https://pay/ld"));
    }

    #[test]
    fn outcome_need_payment_without_any_url() {
        let resp: StartRenderResponse =
            serde_json::from_str(r#"{"status":"need_payment","payment_key":"pk-2"}"#).unwrap();
        match resp.outcome() {
            StartRenderOutcome::NeedPayment { url, .. } => assert_eq!(url, None),
            other => panic!("Expected NeedPayment, got {other:?}"),
        }
    }

    #[test]
    fn outcome_render_started() {
        let resp: StartRenderResponse =
            serde_json::from_str(r#"{"status":"render_started","job_id":"J1","status_url":"/render/status/J1"}"#)
                .unwrap();
        match resp.outcome() {
            StartRenderOutcome::RenderStarted { job_id } => assert_eq!(job_id, "J1"),
            other => panic!("Expected RenderStarted, got {other:?}"),
        }
    }

    #[test]
    fn outcome_render_started_without_job_is_unrecognized() {
        let resp: StartRenderResponse =
            serde_json::from_str(r#"{"status":"render_started"}"#).unwrap();
        match resp.outcome() {
            StartRenderOutcome::Unrecognized { status } => assert_eq!(status, "render_started"),
            other => panic!("Expected Unrecognized, got {other:?}"),
        }
    }

    #[test]
    fn outcome_pending_payment() {
        let resp: StartRenderResponse =
            serde_json::from_str(r#"{"status":"pending_payment","payment_key":"pk-3"}"#).unwrap();
        match resp.outcome() {
            StartRenderOutcome::PendingPayment { payment_key } => {
                assert_eq!(payment_key.as_deref(), Some("pk-3"));
            }
            other => panic!("Expected PendingPayment, got {other:?}"),
        }
    }

    #[test]
    fn outcome_error_uses_server_message() {
        let resp: StartRenderResponse =
            serde_json::from_str(r#"{"status":"error","message":"scene disabled"}"#).unwrap();
        match resp.outcome() {
            StartRenderOutcome::ServerError { message } => assert_eq!(message, "scene disabled"),
            other => panic!("Expected ServerError, got {other:?}"),
        }
    }

    #[test]
    fn outcome_error_without_message_falls_back() {
        let resp: StartRenderResponse = serde_json::from_str(r#"{"status":"error"}"#).unwrap();
        match resp.outcome() {
            StartRenderOutcome::ServerError { message } => assert_eq!(message, "server error"),
            other => panic!("Expected ServerError, got {other:?}"),
        }
    }

    #[test]
    fn outcome_unknown_status() {
        let resp: StartRenderResponse =
            serde_json::from_str(r#"{"status":"maintenance"}"#).unwrap();
        match resp.outcome() {
            StartRenderOutcome::Unrecognized { status } => assert_eq!(status, "maintenance"),
            other => panic!("Expected Unrecognized, got {other:?}"),
        }
    }

    // -- Job observations --

    #[test]
    fn job_processing_with_progress_and_preview() {
        let resp: JobStatusResponse = serde_json::from_str(
            r#"{"status":"processing","progress":73,"start_frame_url":"https://cdn/sf/2.jpg"}"#,
        )
        .unwrap();
        match resp.observation() {
            JobObservation::InProgress {
                progress,
                start_frame_url,
            } => {
                assert_eq!(progress, 73);
                assert_eq!(start_frame_url.as_deref(), Some("https://cdn/sf/2.jpg"));
            }
            other => panic!("Expected InProgress, got {other:?}"),
        }
    }

    #[test]
    fn job_queued_without_progress_defaults() {
        let resp: JobStatusResponse = serde_json::from_str(r#"{"status":"queued"}"#).unwrap();
        match resp.observation() {
            JobObservation::InProgress { progress, .. } => {
                assert_eq!(progress, DEFAULT_IN_PROGRESS);
            }
            other => panic!("Expected InProgress, got {other:?}"),
        }
    }

    #[test]
    fn job_progress_clamped() {
        let resp: JobStatusResponse =
            serde_json::from_str(r#"{"status":"processing","progress":250}"#).unwrap();
        match resp.observation() {
            JobObservation::InProgress { progress, .. } => assert_eq!(progress, 100),
            other => panic!("Expected InProgress, got {other:?}"),
        }
    }

    #[test]
    fn job_done_with_result() {
        let resp: JobStatusResponse = serde_json::from_str(
            r#"{"status":"done","result":{"video_url":"https://cdn/v/1.mp4","start_frame_url":"https://cdn/sf/1.jpg"}}"#,
        )
        .unwrap();
        match resp.observation() {
            JobObservation::Done {
                video_url,
                start_frame_url,
            } => {
                assert_eq!(video_url.as_deref(), Some("https://cdn/v/1.mp4"));
                assert_eq!(start_frame_url.as_deref(), Some("https://cdn/sf/1.jpg"));
            }
            other => panic!("Expected Done, got {other:?}"),
        }
    }

    #[test]
    fn job_error_message() {
        let resp: JobStatusResponse =
            serde_json::from_str(r#"{"status":"error","error":"face not detected"}"#).unwrap();
        match resp.observation() {
            JobObservation::Failed { message } => assert_eq!(message, "face not detected"),
            other => panic!("Expected Failed, got {other:?}"),
        }
    }

    #[test]
    fn job_unknown_status() {
        let resp: JobStatusResponse = serde_json::from_str(r#"{"status":"paused"}"#).unwrap();
        match resp.observation() {
            JobObservation::Unrecognized { status } => assert_eq!(status, "paused"),
            other => panic!("Expected Unrecognized, got {other:?}"),
        }
    }

    // -- Payment observations --

    #[test]
    fn payment_render_started() {
        let resp: PaymentStatusResponse =
            serde_json::from_str(r#"{"status":"render_started","job_id":"J9"}"#).unwrap();
        match resp.observation() {
            PaymentObservation::RenderStarted { job_id } => assert_eq!(job_id, "J9"),
            other => panic!("Expected RenderStarted, got {other:?}"),
        }
    }

    #[test]
    fn payment_render_started_without_job_stays_pending() {
        let resp: PaymentStatusResponse =
            serde_json::from_str(r#"{"status":"render_started"}"#).unwrap();
        assert_eq!(resp.observation(), PaymentObservation::Pending);
    }

    #[test]
    fn payment_done_needs_job_and_video() {
        let resp: PaymentStatusResponse = serde_json::from_str(
            r#"{"status":"done","job_id":"J9","result":{"video_url":"https://cdn/v/9.mp4"}}"#,
        )
        .unwrap();
        match resp.observation() {
            PaymentObservation::Done { job_id, video_url } => {
                assert_eq!(job_id, "J9");
                assert_eq!(video_url, "https://cdn/v/9.mp4");
            }
            other => panic!("Expected Done, got {other:?}"),
        }

        let partial: PaymentStatusResponse =
            serde_json::from_str(r#"{"status":"done","job_id":"J9"}"#).unwrap();
        assert_eq!(partial.observation(), PaymentObservation::Pending);
    }

    #[test]
    fn payment_unknown_status_stays_pending() {
        let resp: PaymentStatusResponse =
            serde_json::from_str(r#"{"status":"created"}"#).unwrap();
        assert_eq!(resp.observation(), PaymentObservation::Pending);
    }

    // -- Request serialization --

    #[test]
    fn start_render_request_field_names() {
        let req = StartRenderRequest {
            format_key: "wide".into(),
            scene_key: "hugging".into(),
            background_key: "clouds".into(),
            music_key: String::new(),
            title: String::new(),
            subtitle: String::new(),
            photos: vec!["/uploads/a.jpg".into()],
            user: "web_1700000000000".into(),
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["format_key"], "wide");
        assert_eq!(value["music_key"], "");
        assert_eq!(value["photos"][0], "/uploads/a.jpg");
        assert_eq!(value["user"], "web_1700000000000");
    }

    #[test]
    fn upload_response_tolerates_missing_files() {
        let resp: UploadResponse = serde_json::from_str(r#"{}"#).unwrap();
        assert!(resp.files.is_empty());
    }
}

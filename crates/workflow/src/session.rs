//! Render workflow session: the state machine from photo upload to
//! finished video.
//!
//! [`WorkflowSession`] owns the catalog, the user's selection, the photo
//! set, and the render/payment state behind one mutex. Stage-advancing
//! operations snapshot a generation counter before their network call
//! and discard the response if the counter moved while they were
//! waiting, so a stale start frame or render outcome never lands on top
//! of an edited selection. Status polling runs on a spawned task guarded
//! by a [`CancellationToken`]; at most one poll task is live at a time.
//!
//! Workflow events are broadcast via a [`tokio::sync::broadcast`]
//! channel. Call [`WorkflowSession::subscribe`] to receive them.

use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;

use everkeep_core::catalog::{Catalog, PhotoRule, FALLBACK_PHOTO_RULE};
use everkeep_core::photos::{PhotoPolicyError, PhotoSet, UploadPlan};
use everkeep_core::rules::{ScenePolicy, Selection, SelectionRules};
use everkeep_renderapi::api::{RenderApi, RenderApiError, UploadFile};
use everkeep_renderapi::wire::{
    JobObservation, PaymentObservation, StartFrameRequest, StartRenderOutcome, StartRenderRequest,
};

use crate::events::WorkflowEvent;
use crate::poll::{poll_until, PollConfig, PollOutcome, PollStep};

/// Broadcast channel capacity for workflow events.
const EVENT_CHANNEL_CAPACITY: usize = 256;

// Progress milestones matching the service UI.
const PROGRESS_PREVIEW_REQUESTED: u8 = 10;
const PROGRESS_PREVIEW_READY: u8 = 40;
const PROGRESS_SUBMITTED: u8 = 5;
const PROGRESS_RENDER_STARTED: u8 = 10;
const PROGRESS_DONE: u8 = 100;

/// Where the workflow currently stands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Phase {
    /// Not enough photos yet (or just reset).
    #[default]
    Idle,
    /// Enough photos for the selected scene.
    PhotosReady,
    /// Start-frame request in flight.
    GeneratingStartFrame,
    /// Preview available; the render can be submitted.
    StartFrameReady,
    /// Render submission in flight.
    Submitting,
    /// Waiting for the user to complete a payment.
    NeedPayment,
    /// Payment created earlier; its confirmation is being polled.
    PendingPayment,
    /// The backend accepted the job.
    RenderStarted,
    /// Actively polling job status.
    Polling,
    /// Final video available.
    Done,
    /// Terminal failure for this attempt. Selection edits, new uploads,
    /// or a new submission leave it.
    Error,
}

/// Which request the primary UI action would fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimaryAction {
    GeneratePreview,
    StartRender,
}

/// Session tuning. Everything has a service-appropriate default.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// Scene-to-format coupling; empty keys disable it.
    pub scene_policy: ScenePolicy,
    /// Budget for job-status polling.
    pub job_poll: PollConfig,
    /// Budget for payment-confirmation polling.
    pub payment_poll: PollConfig,
    /// Client tag sent with submissions. `None` derives a fresh
    /// `web_<unix-millis>` tag per submission.
    pub user_tag: Option<String>,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            scene_policy: ScenePolicy::default(),
            job_poll: PollConfig::default(),
            payment_poll: PollConfig::payment_default(),
            user_tag: None,
        }
    }
}

/// Payment details surfaced while a render is gated.
#[derive(Debug, Clone)]
pub struct PaymentTicket {
    /// Where the user pays, when the backend supplied a link.
    pub url: Option<String>,
    /// Key for the confirmation-status endpoint.
    pub payment_key: Option<String>,
    /// Price in whole roubles.
    pub price_rub: u32,
}

/// Point-in-time view of the session for rendering UI state.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub phase: Phase,
    pub selection: Selection,
    pub photo_count: usize,
    pub photos_required: usize,
    pub photos_max: usize,
    pub primary_action: PrimaryAction,
    pub primary_enabled: bool,
    pub progress: u8,
    pub start_frame_url: Option<String>,
    pub video_url: Option<String>,
    pub payment: Option<PaymentTicket>,
}

/// Errors returned by session operations.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// Input rejected before any network activity.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The photo admission policy refused the wave.
    #[error(transparent)]
    PhotoPolicy(#[from] PhotoPolicyError),

    /// The backend call failed (network or non-2xx).
    #[error(transparent)]
    Api(#[from] RenderApiError),

    /// The backend refused the operation with its own message.
    #[error("backend refused: {0}")]
    Server(String),

    /// The backend answered with a status this client does not know.
    #[error("unexpected backend status: {0}")]
    UnexpectedStatus(String),

    /// The session moved on while the call was in flight; the response
    /// was discarded and no state changed.
    #[error("superseded by a newer edit")]
    Superseded,
}

/// Mutable state behind the session mutex.
#[derive(Default)]
struct SessionState {
    catalog: Option<Catalog>,
    selection: Selection,
    photos: PhotoSet,
    phase: Phase,
    start_frame_url: Option<String>,
    video_url: Option<String>,
    progress: u8,
    job_id: Option<String>,
    payment: Option<PaymentTicket>,
    /// Bumped by every invalidating edit; stage-advancing ops discard
    /// their response when it moved.
    generation: u64,
    /// Token of the live poll task, if any.
    poll_cancel: Option<CancellationToken>,
}

impl SessionState {
    /// Photo rule for the current selection, falling back when no
    /// catalog is installed.
    fn photo_rule(&self) -> PhotoRule {
        self.catalog
            .as_ref()
            .map(|c| c.rule_for(&self.selection.scene_key))
            .unwrap_or(FALLBACK_PHOTO_RULE)
    }

    /// Cancel the live poll task, if any.
    fn cancel_poll(&mut self) {
        if let Some(cancel) = self.poll_cancel.take() {
            cancel.cancel();
        }
    }

    /// Drop everything downstream of the photo set: preview, job,
    /// payment, progress. Bumps the generation so in-flight responses
    /// discard themselves, and recomputes the resting phase from the
    /// photo count.
    fn invalidate_downstream(&mut self) {
        self.generation += 1;
        self.cancel_poll();
        self.start_frame_url = None;
        self.video_url = None;
        self.job_id = None;
        self.payment = None;
        self.progress = 0;
        self.phase = if self.photos.len() >= self.photo_rule().required {
            Phase::PhotosReady
        } else {
            Phase::Idle
        };
    }
}

/// One user's render workflow against one backend deployment.
///
/// Created via [`WorkflowSession::new`]; the returned `Arc` is cheap to
/// clone into UI tasks.
pub struct WorkflowSession {
    api: RenderApi,
    config: WorkflowConfig,
    event_tx: broadcast::Sender<WorkflowEvent>,
    state: Mutex<SessionState>,
    /// Correlates this session's log lines.
    session_id: uuid::Uuid,
}

impl WorkflowSession {
    /// Create a new session over the given API client.
    pub fn new(api: RenderApi, config: WorkflowConfig) -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            api,
            config,
            event_tx,
            state: Mutex::new(SessionState::default()),
            session_id: uuid::Uuid::new_v4(),
        })
    }

    /// Subscribe to workflow events.
    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.event_tx.subscribe()
    }

    /// Fetch and install the option catalog, then apply selection
    /// defaults (first entry of each list).
    ///
    /// On failure the previous catalog and all other state stay
    /// untouched; the call may simply be retried.
    pub async fn load_catalog(&self) -> Result<(), WorkflowError> {
        let catalog = self.api.fetch_catalog().await?;

        let mut state = self.state.lock().await;
        tracing::info!(
            session = %self.session_id,
            scenes = catalog.scenes.len(),
            formats = catalog.formats.len(),
            "Catalog installed",
        );
        self.emit(WorkflowEvent::CatalogLoaded {
            scenes: catalog.scenes.len(),
            formats: catalog.formats.len(),
            backgrounds: catalog.backgrounds.len(),
            music: catalog.music.len(),
        });

        state.selection = Selection::default_for(&catalog);
        state.catalog = Some(catalog);
        self.apply_selection_rules(&mut state);
        state.invalidate_downstream();
        self.emit_photo_gate(&state);
        Ok(())
    }

    /// Select a scene. Invalidates everything downstream, may pin the
    /// format, and may truncate the photo set to the new ceiling.
    pub async fn select_scene(&self, key: &str) -> Result<(), WorkflowError> {
        let mut state = self.state.lock().await;
        let catalog = Self::catalog_of(&state)?;
        if state.selection.scene_key == key {
            return Ok(());
        }
        if catalog.scene(key).is_none() {
            return Err(WorkflowError::Validation(format!("unknown scene '{key}'")));
        }

        state.selection.scene_key = key.to_string();
        self.apply_selection_rules(&mut state);
        state.invalidate_downstream();
        tracing::debug!(session = %self.session_id, scene = key, "Scene selected");
        self.emit_photo_gate(&state);
        Ok(())
    }

    /// Select a format. Refused while the scene pins another one.
    /// Invalidates everything downstream.
    pub async fn select_format(&self, key: &str) -> Result<(), WorkflowError> {
        let mut state = self.state.lock().await;
        let catalog = Self::catalog_of(&state)?;
        if state.selection.format_key == key {
            return Ok(());
        }
        if !catalog.has_format(key) {
            return Err(WorkflowError::Validation(format!("unknown format '{key}'")));
        }
        let rules = SelectionRules::derive(&state.selection, catalog, &self.config.scene_policy);
        if !rules.is_format_allowed(key) {
            return Err(WorkflowError::Validation(format!(
                "format '{key}' is not available for the selected scene"
            )));
        }

        state.selection.format_key = key.to_string();
        state.invalidate_downstream();
        self.emit_photo_gate(&state);
        Ok(())
    }

    /// Select a background. Invalidates everything downstream.
    pub async fn select_background(&self, key: &str) -> Result<(), WorkflowError> {
        let mut state = self.state.lock().await;
        let catalog = Self::catalog_of(&state)?;
        if state.selection.background_key == key {
            return Ok(());
        }
        if !catalog.backgrounds.iter().any(|b| b.key == key) {
            return Err(WorkflowError::Validation(format!(
                "unknown background '{key}'"
            )));
        }

        state.selection.background_key = key.to_string();
        state.invalidate_downstream();
        self.emit_photo_gate(&state);
        Ok(())
    }

    /// Select a music track, or the empty key for a silent render.
    ///
    /// Music does not affect the preview, so nothing is invalidated.
    pub async fn select_music(&self, key: &str) -> Result<(), WorkflowError> {
        let mut state = self.state.lock().await;
        let catalog = Self::catalog_of(&state)?;
        if !key.is_empty() && !catalog.music.iter().any(|m| m.key == key) {
            return Err(WorkflowError::Validation(format!("unknown track '{key}'")));
        }

        state.selection.music_key = key.to_string();
        Ok(())
    }

    /// Upload a wave of photo files.
    ///
    /// The wave is admitted against the current scene's photo rule
    /// before any network activity; see [`UploadPlan::plan`] for the
    /// refusal cases. On transport failure the set stays untouched.
    /// Returns the new photo count.
    pub async fn upload_photos(
        self: &Arc<Self>,
        files: Vec<UploadFile>,
    ) -> Result<usize, WorkflowError> {
        let (plan, names, generation) = {
            let state = self.state.lock().await;
            let rule = state.photo_rule();
            let plan = UploadPlan::plan(state.photos.len(), files.len(), rule.max)?;
            let names: Vec<String> = files.iter().map(|f| f.name.clone()).collect();
            (plan, names, state.generation)
        };

        tracing::info!(
            session = %self.session_id,
            count = names.len(),
            replace = plan.replace_existing,
            "Uploading photos",
        );
        let result = self.api.upload_photos(files).await;

        let mut state = self.state.lock().await;
        match result {
            Err(err) => {
                tracing::warn!(session = %self.session_id, error = %err, "Photo upload failed");
                self.emit_photo_gate(&state);
                Err(err.into())
            }
            Ok(paths) => {
                if state.generation != generation {
                    tracing::debug!(session = %self.session_id, "Discarding stale upload result");
                    return Err(WorkflowError::Superseded);
                }
                state.photos.admit(plan, paths.into_iter().zip(names));
                state.invalidate_downstream();
                self.emit_photo_gate(&state);
                Ok(state.photos.len())
            }
        }
    }

    /// Generate the start-frame preview for the current picks.
    ///
    /// Requires the scene's photo count. Starts a fresh attempt: any
    /// active poll is cancelled and previous render results dropped. On
    /// failure the session returns to its resting phase so the call can
    /// be retried.
    pub async fn generate_start_frame(self: &Arc<Self>) -> Result<String, WorkflowError> {
        let (request, generation) = {
            let mut state = self.state.lock().await;
            let rule = state.photo_rule();
            if state.photos.len() < rule.required {
                return Err(WorkflowError::Validation(format!(
                    "this scene needs {} photo(s)",
                    rule.required
                )));
            }

            state.generation += 1;
            state.cancel_poll();
            state.video_url = None;
            state.job_id = None;
            state.payment = None;
            state.phase = Phase::GeneratingStartFrame;
            state.progress = PROGRESS_PREVIEW_REQUESTED;
            self.emit(WorkflowEvent::Progress {
                percent: PROGRESS_PREVIEW_REQUESTED,
            });

            let request = StartFrameRequest {
                scene_key: state.selection.scene_key.clone(),
                format_key: state.selection.format_key.clone(),
                background_key: state.selection.background_key.clone(),
                photos: state.photos.urls().to_vec(),
            };
            (request, state.generation)
        };

        tracing::info!(session = %self.session_id, scene = %request.scene_key, "Requesting start frame");
        let result = self.api.generate_start_frame(&request).await;

        let mut state = self.state.lock().await;
        if state.generation != generation {
            tracing::debug!(session = %self.session_id, "Discarding stale start frame");
            return Err(WorkflowError::Superseded);
        }
        match result {
            Ok(url) => {
                state.start_frame_url = Some(url.clone());
                state.phase = Phase::StartFrameReady;
                state.progress = PROGRESS_PREVIEW_READY;
                self.emit(WorkflowEvent::StartFrameReady { url: url.clone() });
                self.emit(WorkflowEvent::Progress {
                    percent: PROGRESS_PREVIEW_READY,
                });
                Ok(url)
            }
            Err(err) => {
                tracing::warn!(session = %self.session_id, error = %err, "Start frame failed");
                state.phase = if state.photos.len() >= state.photo_rule().required {
                    Phase::PhotosReady
                } else {
                    Phase::Idle
                };
                self.emit(WorkflowEvent::Failed {
                    message: format!("could not generate the start frame: {err}"),
                });
                Err(err.into())
            }
        }
    }

    /// Submit the render and follow it to a terminal state.
    ///
    /// Requires an installed catalog, the scene's photo count, and a
    /// generated start frame. The submission response branches into
    /// completion, payment gating, or polling; polling continues on a
    /// background task and reports through the event stream.
    pub async fn start_render(self: &Arc<Self>) -> Result<(), WorkflowError> {
        let (request, generation) = {
            let mut state = self.state.lock().await;
            if state.catalog.is_none() {
                return Err(WorkflowError::Validation("catalog not loaded yet".into()));
            }
            let rule = state.photo_rule();
            if state.photos.len() < rule.required {
                return Err(WorkflowError::Validation(format!(
                    "this scene needs {} photo(s)",
                    rule.required
                )));
            }
            if state.start_frame_url.is_none() {
                return Err(WorkflowError::Validation(
                    "generate the start frame first".into(),
                ));
            }

            state.generation += 1;
            state.cancel_poll();
            state.video_url = None;
            state.job_id = None;
            state.payment = None;
            state.phase = Phase::Submitting;
            state.progress = PROGRESS_SUBMITTED;
            self.emit(WorkflowEvent::Progress {
                percent: PROGRESS_SUBMITTED,
            });

            let request = StartRenderRequest {
                format_key: state.selection.format_key.clone(),
                scene_key: state.selection.scene_key.clone(),
                background_key: state.selection.background_key.clone(),
                music_key: state.selection.music_key.clone(),
                title: String::new(),
                subtitle: String::new(),
                photos: state.photos.urls().to_vec(),
                user: self.user_tag(),
            };
            (request, state.generation)
        };

        tracing::info!(
            session = %self.session_id,
            scene = %request.scene_key,
            user = %request.user,
            "Submitting render",
        );
        let result = self.api.start_paid_render(&request).await;

        let mut state = self.state.lock().await;
        if state.generation != generation {
            tracing::debug!(session = %self.session_id, "Discarding stale submission outcome");
            return Err(WorkflowError::Superseded);
        }

        let response = match result {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(session = %self.session_id, error = %err, "Render submission failed");
                state.phase = Phase::Error;
                self.emit(WorkflowEvent::Failed {
                    message: format!("could not start the render: {err}"),
                });
                return Err(err.into());
            }
        };

        match response.outcome() {
            StartRenderOutcome::Done { video_url } => {
                self.finish(&mut state, video_url, None);
                Ok(())
            }
            StartRenderOutcome::NeedPayment {
                url,
                payment_key,
                price_rub,
            } => {
                let price_rub = price_rub.unwrap_or_else(|| {
                    state
                        .catalog
                        .as_ref()
                        .map(|c| c.price_for(&state.selection.scene_key))
                        .unwrap_or(0)
                });
                tracing::info!(
                    session = %self.session_id,
                    price_rub,
                    has_url = url.is_some(),
                    "Payment required",
                );
                state.payment = Some(PaymentTicket {
                    url: url.clone(),
                    payment_key,
                    price_rub,
                });
                state.phase = Phase::NeedPayment;
                state.progress = 0;
                self.emit(WorkflowEvent::PaymentRequired { url, price_rub });
                self.emit(WorkflowEvent::Progress { percent: 0 });
                Ok(())
            }
            StartRenderOutcome::RenderStarted { job_id } => {
                tracing::info!(session = %self.session_id, job_id = %job_id, "Render started");
                state.job_id = Some(job_id.clone());
                state.phase = Phase::RenderStarted;
                state.progress = PROGRESS_RENDER_STARTED;
                self.emit(WorkflowEvent::RenderStarted {
                    job_id: job_id.clone(),
                });
                self.emit(WorkflowEvent::Progress {
                    percent: PROGRESS_RENDER_STARTED,
                });
                self.begin_job_poll(&mut state, job_id);
                Ok(())
            }
            StartRenderOutcome::PendingPayment { payment_key } => {
                tracing::info!(
                    session = %self.session_id,
                    has_key = payment_key.is_some(),
                    "Payment pending confirmation",
                );
                let price_rub = state
                    .catalog
                    .as_ref()
                    .map(|c| c.price_for(&state.selection.scene_key))
                    .unwrap_or(0);
                state.payment = Some(PaymentTicket {
                    url: None,
                    payment_key: payment_key.clone(),
                    price_rub,
                });
                state.phase = Phase::PendingPayment;
                self.emit(WorkflowEvent::PaymentPending);
                if let Some(key) = payment_key {
                    self.begin_payment_poll(&mut state, key);
                }
                Ok(())
            }
            StartRenderOutcome::ServerError { message } => {
                state.phase = Phase::Error;
                self.emit(WorkflowEvent::Failed {
                    message: format!("could not start the render: {message}"),
                });
                Err(WorkflowError::Server(message))
            }
            StartRenderOutcome::Unrecognized { status } => {
                state.phase = Phase::Error;
                self.emit(WorkflowEvent::Failed {
                    message: format!("could not start the render: unexpected status '{status}'"),
                });
                Err(WorkflowError::UnexpectedStatus(status))
            }
        }
    }

    /// Send a support message. Pure pass-through with local validation;
    /// touches no workflow state.
    pub async fn send_support(&self, text: &str, contact: &str) -> Result<(), WorkflowError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(WorkflowError::Validation("message text is empty".into()));
        }
        self.api.send_support(text, contact.trim()).await?;
        tracing::info!(session = %self.session_id, "Support message sent");
        Ok(())
    }

    /// Return to the post-catalog initial state: photos dropped,
    /// selection back to defaults, any poll cancelled. The catalog is
    /// kept.
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        state.photos.clear();
        if let Some(defaults) = state.catalog.as_ref().map(Selection::default_for) {
            state.selection = defaults;
        }
        self.apply_selection_rules(&mut state);
        state.invalidate_downstream();
        tracing::info!(session = %self.session_id, "Session reset");
        self.emit(WorkflowEvent::WorkflowReset);
        self.emit_photo_gate(&state);
    }

    /// Cancel any live poll task. Intended for orderly shutdown; the
    /// session remains usable afterwards.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        state.cancel_poll();
    }

    /// Point-in-time view of the session for rendering UI state.
    pub async fn snapshot(&self) -> Snapshot {
        let state = self.state.lock().await;
        let rule = state.photo_rule();
        let in_flight = matches!(
            state.phase,
            Phase::GeneratingStartFrame | Phase::Submitting | Phase::RenderStarted | Phase::Polling
        );
        Snapshot {
            phase: state.phase,
            selection: state.selection.clone(),
            photo_count: state.photos.len(),
            photos_required: rule.required,
            photos_max: rule.max,
            primary_action: if state.start_frame_url.is_some() {
                PrimaryAction::StartRender
            } else {
                PrimaryAction::GeneratePreview
            },
            primary_enabled: state.photos.len() >= rule.required && !in_flight,
            progress: state.progress,
            start_frame_url: state.start_frame_url.clone(),
            video_url: state.video_url.clone(),
            payment: state.payment.clone(),
        }
    }

    // ---- private helpers ----

    fn emit(&self, event: WorkflowEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Emit the photo-gate state (count against requirement) so the UI
    /// can re-render its enablement and counters.
    fn emit_photo_gate(&self, state: &SessionState) {
        let rule = state.photo_rule();
        self.emit(WorkflowEvent::PhotoSetChanged {
            count: state.photos.len(),
            required: rule.required,
            max: rule.max,
        });
    }

    fn catalog_of(state: &SessionState) -> Result<&Catalog, WorkflowError> {
        state
            .catalog
            .as_ref()
            .ok_or_else(|| WorkflowError::Validation("catalog not loaded yet".into()))
    }

    /// Re-derive the selection rules and apply their consequences:
    /// a pinned format overrides the pick, and a lowered photo ceiling
    /// truncates the set from the tail.
    fn apply_selection_rules(&self, state: &mut SessionState) {
        let Some(catalog) = &state.catalog else {
            return;
        };
        let rules = SelectionRules::derive(&state.selection, catalog, &self.config.scene_policy);
        if let Some(locked) = &rules.locked_format {
            if state.selection.format_key != *locked {
                tracing::debug!(
                    session = %self.session_id,
                    format = %locked,
                    "Scene pins the format",
                );
                state.selection.format_key = locked.clone();
            }
        }
        if state.photos.len() > rules.photo_rule.max {
            state.photos.shrink_to(rules.photo_rule.max);
        }
    }

    fn user_tag(&self) -> String {
        self.config
            .user_tag
            .clone()
            .unwrap_or_else(|| format!("web_{}", chrono::Utc::now().timestamp_millis()))
    }

    /// Apply a finished render: terminal phase, full progress, video
    /// URL, completion event.
    fn finish(&self, state: &mut SessionState, video_url: String, preview: Option<String>) {
        state.poll_cancel = None;
        state.phase = Phase::Done;
        state.progress = PROGRESS_DONE;
        state.video_url = Some(video_url.clone());
        if let Some(url) = preview {
            if state.start_frame_url.as_deref() != Some(url.as_str()) {
                state.start_frame_url = Some(url.clone());
                self.emit(WorkflowEvent::PreviewUpdated { url });
            }
        }
        tracing::info!(session = %self.session_id, video_url = %video_url, "Render complete");
        self.emit(WorkflowEvent::Progress {
            percent: PROGRESS_DONE,
        });
        self.emit(WorkflowEvent::Completed { video_url });
    }

    /// Mark the attempt failed and tell subscribers why.
    fn fail(&self, state: &mut SessionState, message: String) {
        state.poll_cancel = None;
        state.phase = Phase::Error;
        tracing::warn!(session = %self.session_id, message = %message, "Workflow failed");
        self.emit(WorkflowEvent::Failed { message });
    }

    /// Install a fresh poll token and spawn the job-status poll task.
    fn begin_job_poll(self: &Arc<Self>, state: &mut SessionState, job_id: String) {
        state.cancel_poll();
        let cancel = CancellationToken::new();
        state.poll_cancel = Some(cancel.clone());
        state.phase = Phase::Polling;
        let generation = state.generation;

        let session = Arc::clone(self);
        tokio::spawn(async move {
            session.run_job_poll(job_id, generation, cancel).await;
        });
    }

    /// Install a fresh poll token and spawn the payment-confirmation
    /// poll task.
    fn begin_payment_poll(self: &Arc<Self>, state: &mut SessionState, payment_key: String) {
        state.cancel_poll();
        let cancel = CancellationToken::new();
        state.poll_cancel = Some(cancel.clone());
        let generation = state.generation;

        let session = Arc::clone(self);
        tokio::spawn(async move {
            session
                .run_payment_poll(payment_key, generation, cancel)
                .await;
        });
    }

    /// Poll one job until it finishes, fails, or the budget runs out.
    ///
    /// Transport failures are terminal here: the job endpoint answering
    /// at all is part of the render working.
    async fn run_job_poll(
        self: Arc<Self>,
        job_id: String,
        generation: u64,
        cancel: CancellationToken,
    ) {
        let outcome = poll_until(&self.config.job_poll, &cancel, |attempt| {
            let session = Arc::clone(&self);
            let job_id = job_id.clone();
            async move {
                tracing::debug!(
                    session = %session.session_id,
                    job_id = %job_id,
                    attempt,
                    "Polling job status",
                );
                match session.api.job_status(&job_id).await {
                    Err(err) => PollStep::Terminal(JobPollEnd::Transport {
                        message: err.to_string(),
                    }),
                    Ok(response) => match response.observation() {
                        JobObservation::InProgress {
                            progress,
                            start_frame_url,
                        } => {
                            let mut state = session.state.lock().await;
                            if state.generation != generation {
                                return PollStep::Terminal(JobPollEnd::Stale);
                            }
                            state.progress = progress;
                            session.emit(WorkflowEvent::Progress { percent: progress });
                            if let Some(url) = start_frame_url {
                                if state.start_frame_url.as_deref() != Some(url.as_str()) {
                                    state.start_frame_url = Some(url.clone());
                                    session.emit(WorkflowEvent::PreviewUpdated { url });
                                }
                            }
                            PollStep::Continue
                        }
                        JobObservation::Done {
                            video_url,
                            start_frame_url,
                        } => PollStep::Terminal(JobPollEnd::Done {
                            video_url,
                            start_frame_url,
                        }),
                        JobObservation::Failed { message } => {
                            PollStep::Terminal(JobPollEnd::Failed { message })
                        }
                        JobObservation::Unrecognized { status } => {
                            PollStep::Terminal(JobPollEnd::Unrecognized { status })
                        }
                    },
                }
            }
        })
        .await;

        let mut state = self.state.lock().await;
        if state.generation != generation {
            tracing::debug!(session = %self.session_id, "Job poll outcome is stale, dropping");
            return;
        }
        match outcome {
            PollOutcome::Terminal(JobPollEnd::Done {
                video_url: Some(video_url),
                start_frame_url,
            }) => self.finish(&mut state, video_url, start_frame_url),
            PollOutcome::Terminal(JobPollEnd::Done {
                video_url: None, ..
            }) => self.fail(
                &mut state,
                "the render finished but no video came back".into(),
            ),
            PollOutcome::Terminal(JobPollEnd::Failed { message }) => {
                self.fail(&mut state, format!("render failed: {message}"))
            }
            PollOutcome::Terminal(JobPollEnd::Transport { message }) => self.fail(
                &mut state,
                format!("could not retrieve render status: {message}"),
            ),
            PollOutcome::Terminal(JobPollEnd::Unrecognized { status }) => self.fail(
                &mut state,
                format!("unexpected render status '{status}'"),
            ),
            PollOutcome::Terminal(JobPollEnd::Stale) => {}
            PollOutcome::Exhausted => self.fail(
                &mut state,
                "could not get the result in time, try again later".into(),
            ),
            PollOutcome::Cancelled => {
                tracing::debug!(session = %self.session_id, "Job poll cancelled");
            }
        }
    }

    /// Poll a payment until the backend reports the render moving, then
    /// hand off to job polling on the same task.
    ///
    /// Transport failures are tolerated here: payment providers confirm
    /// asynchronously and the status endpoint may hiccup while they do.
    async fn run_payment_poll(
        self: Arc<Self>,
        payment_key: String,
        generation: u64,
        cancel: CancellationToken,
    ) {
        let outcome = poll_until(&self.config.payment_poll, &cancel, |attempt| {
            let session = Arc::clone(&self);
            let payment_key = payment_key.clone();
            async move {
                tracing::debug!(
                    session = %session.session_id,
                    attempt,
                    "Polling payment status",
                );
                match session.api.payment_status(&payment_key).await {
                    Err(err) => {
                        tracing::debug!(
                            session = %session.session_id,
                            error = %err,
                            "Payment status unavailable, retrying",
                        );
                        PollStep::Continue
                    }
                    Ok(response) => match response.observation() {
                        PaymentObservation::Pending => PollStep::Continue,
                        PaymentObservation::RenderStarted { job_id } => {
                            PollStep::Terminal(PaymentPollEnd::RenderStarted { job_id })
                        }
                        PaymentObservation::Done { job_id, video_url } => {
                            PollStep::Terminal(PaymentPollEnd::Done { job_id, video_url })
                        }
                    },
                }
            }
        })
        .await;

        let handoff = {
            let mut state = self.state.lock().await;
            if state.generation != generation {
                tracing::debug!(session = %self.session_id, "Payment poll outcome is stale, dropping");
                return;
            }
            match outcome {
                PollOutcome::Terminal(PaymentPollEnd::RenderStarted { job_id }) => {
                    tracing::info!(
                        session = %self.session_id,
                        job_id = %job_id,
                        "Payment confirmed, render started",
                    );
                    state.job_id = Some(job_id.clone());
                    state.phase = Phase::Polling;
                    self.emit(WorkflowEvent::RenderStarted {
                        job_id: job_id.clone(),
                    });
                    let cancel = CancellationToken::new();
                    state.poll_cancel = Some(cancel.clone());
                    Some((job_id, cancel))
                }
                PollOutcome::Terminal(PaymentPollEnd::Done { job_id, video_url }) => {
                    state.job_id = Some(job_id);
                    self.finish(&mut state, video_url, None);
                    None
                }
                PollOutcome::Exhausted => {
                    self.fail(
                        &mut state,
                        "the payment was not confirmed in time".into(),
                    );
                    None
                }
                PollOutcome::Cancelled => {
                    tracing::debug!(session = %self.session_id, "Payment poll cancelled");
                    None
                }
            }
        };

        if let Some((job_id, cancel)) = handoff {
            self.run_job_poll(job_id, generation, cancel).await;
        }
    }
}

/// Terminal states of one job-poll run.
enum JobPollEnd {
    Done {
        video_url: Option<String>,
        start_frame_url: Option<String>,
    },
    Failed {
        message: String,
    },
    Transport {
        message: String,
    },
    Unrecognized {
        status: String,
    },
    /// The session moved on mid-poll; nothing to apply.
    Stale,
}

/// Terminal states of one payment-poll run.
enum PaymentPollEnd {
    RenderStarted { job_id: String },
    Done { job_id: String, video_url: String },
}

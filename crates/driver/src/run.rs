//! One end-to-end render run: catalog, photos, preview, submission,
//! and the event stream through to a terminal state.

use anyhow::Context;
use tokio::sync::broadcast;

use everkeep_renderapi::api::{RenderApi, UploadFile};
use everkeep_workflow::events::WorkflowEvent;
use everkeep_workflow::poll::PollConfig;
use everkeep_workflow::session::{WorkflowConfig, WorkflowSession};

use crate::config::DriverConfig;

/// How a run ended short of an error.
#[derive(Debug)]
pub enum RunOutcome {
    /// The render finished.
    Completed { video_url: String },
    /// The backend wants a payment before it renders. Opening the link
    /// and re-running afterwards is up to the user.
    PaymentRequired {
        url: Option<String>,
        price_rub: u32,
    },
}

/// Drive one full render workflow against the configured backend.
pub async fn run(config: DriverConfig) -> anyhow::Result<RunOutcome> {
    let api = RenderApi::new(config.api_base.clone());
    let workflow = WorkflowConfig {
        scene_policy: config.scene_policy.clone(),
        job_poll: config.poll,
        payment_poll: PollConfig {
            interval: config.poll.interval,
            ..PollConfig::payment_default()
        },
        user_tag: config.user_tag.clone(),
    };
    let session = WorkflowSession::new(api, workflow);

    session
        .load_catalog()
        .await
        .context("loading the option catalog")?;

    if let Some(scene) = &config.scene {
        session
            .select_scene(scene)
            .await
            .context("selecting the scene")?;
    }
    if let Some(format) = &config.format {
        session
            .select_format(format)
            .await
            .context("selecting the format")?;
    }
    if let Some(background) = &config.background {
        session
            .select_background(background)
            .await
            .context("selecting the background")?;
    }
    if let Some(music) = &config.music {
        session
            .select_music(music)
            .await
            .context("selecting the music track")?;
    }

    let mut files = Vec::with_capacity(config.photo_paths.len());
    for path in &config.photo_paths {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("reading photo {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "photo.jpg".to_string());
        files.push(UploadFile { name, bytes });
    }

    let count = session
        .upload_photos(files)
        .await
        .context("uploading photos")?;
    tracing::info!(count, "Photos uploaded");

    let preview = session
        .generate_start_frame()
        .await
        .context("generating the start frame")?;
    tracing::info!(url = %preview, "Start frame ready");

    // Subscribe before submitting so nothing the submission emits is
    // missed; polling reports through the same stream afterwards.
    let mut events = session.subscribe();
    session
        .start_render()
        .await
        .context("submitting the render")?;

    loop {
        match events.recv().await {
            Ok(WorkflowEvent::Completed { video_url }) => {
                return Ok(RunOutcome::Completed { video_url });
            }
            Ok(WorkflowEvent::PaymentRequired { url, price_rub }) => {
                return Ok(RunOutcome::PaymentRequired { url, price_rub });
            }
            Ok(WorkflowEvent::Failed { message }) => anyhow::bail!(message),
            Ok(WorkflowEvent::RenderStarted { job_id }) => {
                tracing::info!(job_id = %job_id, "Render accepted");
            }
            Ok(WorkflowEvent::PaymentPending) => {
                tracing::info!("Payment pending, waiting for confirmation");
            }
            Ok(WorkflowEvent::Progress { percent }) => {
                tracing::info!(percent, "Render progress");
            }
            Ok(WorkflowEvent::PreviewUpdated { url }) => {
                tracing::debug!(url = %url, "Preview frame refreshed");
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Event stream lagged");
            }
            Err(broadcast::error::RecvError::Closed) => {
                anyhow::bail!("event stream closed before the render finished");
            }
        }
    }
}

//! Workflow events broadcast to UI subscribers.
//!
//! These events represent the user-visible state changes of a render
//! workflow. The session produces them after interpreting backend
//! responses; subscribers render them and fire side effects such as
//! opening a payment link in the browser.

use serde::Serialize;

/// A user-visible state change in the render workflow.
#[derive(Debug, Clone, Serialize)]
pub enum WorkflowEvent {
    /// The option catalog was installed and selection defaults applied.
    CatalogLoaded {
        scenes: usize,
        formats: usize,
        backgrounds: usize,
        music: usize,
    },

    /// The photo set or its requirement changed (upload, truncation,
    /// replacement, selection edit, reset).
    PhotoSetChanged {
        count: usize,
        required: usize,
        max: usize,
    },

    /// The start-frame preview is ready to show.
    StartFrameReady { url: String },

    /// Render progress moved.
    Progress {
        /// Completion percentage (0-100).
        percent: u8,
    },

    /// A payment must be completed before rendering continues. Opening
    /// `url` is the subscriber's job.
    PaymentRequired {
        url: Option<String>,
        /// Price in whole roubles.
        price_rub: u32,
    },

    /// A payment exists but has not been confirmed yet.
    PaymentPending,

    /// The backend accepted the job and started rendering.
    RenderStarted { job_id: String },

    /// The backend refreshed the preview frame mid-render.
    PreviewUpdated { url: String },

    /// The final video is ready.
    Completed { video_url: String },

    /// An operation or the render itself failed. The message is
    /// presentable to the user.
    Failed { message: String },

    /// The session returned to its post-catalog initial state.
    WorkflowReset,
}

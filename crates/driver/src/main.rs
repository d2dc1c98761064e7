//! `everkeep-driver` -- command-line front end for the render workflow.
//!
//! Uploads a set of photos, generates the start-frame preview, submits
//! a paid render, and follows it to the finished video. A render gated
//! on payment prints the payment link and exits with code 2 so scripts
//! can tell it apart from a failure.
//!
//! # Environment variables
//!
//! | Variable                      | Required | Default | Description                               |
//! |-------------------------------|----------|---------|-------------------------------------------|
//! | `EVERKEEP_API_BASE`           | yes      | --      | Backend base URL, e.g. `https://api.example.com/v1` |
//! | `EVERKEEP_PHOTOS`             | yes      | --      | Comma-separated photo file paths          |
//! | `EVERKEEP_SCENE`              | no       | catalog default | Scene key                         |
//! | `EVERKEEP_FORMAT`             | no       | catalog default | Format key                        |
//! | `EVERKEEP_BACKGROUND`         | no       | catalog default | Background key                    |
//! | `EVERKEEP_MUSIC`              | no       | catalog default | Music key, empty for silence      |
//! | `EVERKEEP_SKY_SCENE`          | no       | --      | Scene pinned to `EVERKEEP_TALL_FORMAT`    |
//! | `EVERKEEP_TALL_FORMAT`        | no       | --      | Format the pinned scene must use          |
//! | `EVERKEEP_POLL_INTERVAL_SECS` | no       | `3`     | Seconds between status polls              |
//! | `EVERKEEP_POLL_MAX_ATTEMPTS`  | no       | `30`    | Status poll budget                        |
//! | `EVERKEEP_USER`               | no       | derived | Client tag sent with submissions          |

use everkeep_driver::config::DriverConfig;
use everkeep_driver::run::{self, RunOutcome};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "everkeep_driver=info,everkeep_workflow=info,everkeep_renderapi=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match DriverConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "Invalid configuration");
            std::process::exit(1);
        }
    };

    tracing::info!(
        api_base = %config.api_base,
        photos = config.photo_paths.len(),
        "Starting everkeep-driver",
    );

    match run::run(config).await {
        Ok(RunOutcome::Completed { video_url }) => {
            tracing::info!(video_url = %video_url, "Render complete");
        }
        Ok(RunOutcome::PaymentRequired { url, price_rub }) => {
            match url {
                Some(url) => tracing::warn!(
                    price_rub,
                    url = %url,
                    "Payment required, open the link and run again once paid",
                ),
                None => tracing::warn!(price_rub, "Payment required, but no link was provided"),
            }
            std::process::exit(2);
        }
        Err(err) => {
            tracing::error!("Render workflow failed: {err:#}");
            std::process::exit(1);
        }
    }
}

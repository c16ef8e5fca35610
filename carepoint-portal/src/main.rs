use carepoint_booking::ViewEvent;
use carepoint_portal::{failure_message, landing_for, DoctorView, PatientView, PortalContext, PortalError, View};
use carepoint_store::Config;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn report(errors: &[PortalError]) {
    for e in errors {
        tracing::warn!("{}", e.user_message());
    }
}

async fn follow(mut events: broadcast::Receiver<ViewEvent>) {
    loop {
        match events.recv().await {
            Ok(ViewEvent::Refreshed(event)) => tracing::info!(
                "{} view refreshed: {} appointment(s), {} pending",
                event.role,
                event.appointment_count,
                event.pending_count
            ),
            Ok(failed @ ViewEvent::Failed { role, .. }) => {
                if let Some(message) = failure_message(&failed) {
                    tracing::warn!("{} view not updated: {}", role, message);
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!("Skipped {} refresh event(s)", skipped)
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "carepoint_portal=debug,carepoint_booking=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;
    tracing::info!("Starting CarePoint portal against {}", config.api.base_url);

    let ctx = PortalContext::from_config(&config)?;
    let Some(session) = ctx.sessions.load() else {
        tracing::info!("No active session in {}. Sign in first.", config.storage.session_dir);
        return Ok(());
    };

    match landing_for(&session) {
        View::PatientPortal => {
            let view = PatientView::open(&ctx).await?;
            report(view.load_errors());
            tokio::select! {
                _ = follow(view.subscribe()) => {}
                _ = tokio::signal::ctrl_c() => tracing::info!("Shutting down"),
            }
            view.close();
        }
        View::DoctorPortal => {
            let view = DoctorView::open(&ctx).await?;
            report(view.load_errors());
            tokio::select! {
                _ = follow(view.subscribe()) => {}
                _ = tokio::signal::ctrl_c() => tracing::info!("Shutting down"),
            }
            view.close();
        }
        other => tracing::warn!("{} has no portal role, landing on {:?}", session.email, other),
    }

    Ok(())
}

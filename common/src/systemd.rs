use sd_notify::NotifyState;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::Notify;
use tracing::{debug, error, info};

/// Spawn the signal handler. Any of interrupt, terminate or quit wakes the
/// task waiting on `notifier`, or the next one to wait if none is waiting yet.
pub fn run(notifier: Arc<Notify>) {
    tokio::spawn(async move {
        if let Err(e) = handle_signals(notifier).await {
            error!("signal handler: {}", e);
        }
    });
}

/// Tell systemd the service is ready. Outside systemd this is a no-op.
pub fn notify_ready() {
    if let Err(e) = sd_notify::notify(false, &[NotifyState::Ready]) {
        error!("notify ready: {}", e);
    } else {
        debug!("notified ready");
    }
}

async fn handle_signals(notifier: Arc<Notify>) -> std::io::Result<()> {
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut quit = signal(SignalKind::quit())?;

    tokio::select! {
        _ = interrupt.recv() => info!("received interrupt signal"),
        _ = terminate.recv() => info!("received terminate signal"),
        _ = quit.recv() => info!("received quit signal"),
    }

    request_shutdown(&notifier);
    Ok(())
}

/// The permit left by `notify_one` is kept until someone waits, so a signal
/// received before the server starts listening is not lost.
fn request_shutdown(notifier: &Notify) {
    if let Err(e) = sd_notify::notify(false, &[NotifyState::Stopping]) {
        error!("notify stopping: {}", e);
    }

    notifier.notify_one();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn shutdown_before_waiting_is_kept() {
        let notifier = Notify::new();
        request_shutdown(&notifier);

        let waited = tokio::time::timeout(Duration::from_secs(1), notifier.notified()).await;
        assert!(waited.is_ok());
    }
}

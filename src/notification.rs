const APP_NAME: &str = "poimap";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Info,
    Success,
    Error,
}

impl NotificationKind {
    const fn summary(self) -> &'static str {
        match self {
            Self::Info => "poimap",
            Self::Success => "POI saved",
            Self::Error => "poimap error",
        }
    }
}

pub trait Notifier {
    fn notify(&self, kind: NotificationKind, body: &str);
}

/// Desktop notifications through the session notification daemon.
#[derive(Debug, Default, Clone, Copy)]
pub struct DesktopNotifier;

impl Notifier for DesktopNotifier {
    fn notify(&self, kind: NotificationKind, body: &str) {
        send(kind, body);
    }
}

/// Writes notifications to the log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, kind: NotificationKind, body: &str) {
        match kind {
            NotificationKind::Error => tracing::error!(%body, "notification"),
            NotificationKind::Info | NotificationKind::Success => {
                tracing::info!(?kind, %body, "notification")
            }
        }
    }
}

pub fn send(kind: NotificationKind, body: impl Into<String>) {
    let body = body.into();
    if let Err(err) = notify_rust::Notification::new()
        .appname(APP_NAME)
        .summary(kind.summary())
        .body(&body)
        .show()
    {
        tracing::warn!("system notification failed: {err}");
        LogNotifier.notify(kind, &body);
    }
}

//! Push payloads and notification clicks.

use serde::{Deserialize, Serialize};
use tracing::warn;

const DEFAULT_TITLE: &str = "HalalTrade Pro";
const DEFAULT_BODY: &str = "New notification";
const DEFAULT_URL: &str = "/";
const ICON: &str = "/icons/icon-192x192.png";
const BADGE: &str = "/icons/icon-72x72.png";
const VIBRATE_PATTERN: [u32; 3] = [100, 50, 100];

/// Action id that closes the notification without opening anything.
pub const DISMISS_ACTION: &str = "dismiss";
pub const OPEN_ACTION: &str = "open";

/// JSON body of a push message. Every field is optional.
#[derive(Debug, Default, Deserialize)]
pub struct PushPayload {
    pub title: Option<String>,
    pub body: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
}

/// A notification ready to be shown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    /// Where a click should take the user.
    pub url: String,
    pub actions: Vec<NotificationAction>,
}

impl From<PushPayload> for Notification {
    fn from(payload: PushPayload) -> Self {
        Self {
            title: payload.title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            body: payload.body.unwrap_or_else(|| DEFAULT_BODY.to_string()),
            icon: ICON.to_string(),
            badge: BADGE.to_string(),
            vibrate: VIBRATE_PATTERN.to_vec(),
            url: payload.url.unwrap_or_else(|| DEFAULT_URL.to_string()),
            actions: vec![
                NotificationAction {
                    action: OPEN_ACTION.to_string(),
                    title: "Open App".to_string(),
                },
                NotificationAction {
                    action: DISMISS_ACTION.to_string(),
                    title: "Dismiss".to_string(),
                },
            ],
        }
    }
}

/// Builds the notification for a push message.
///
/// A push without data shows nothing; neither does one whose data is not a
/// JSON object.
pub fn notification_from_push(data: Option<&[u8]>) -> Option<Notification> {
    let data = data?;
    match serde_json::from_slice::<PushPayload>(data) {
        Ok(payload) => Some(payload.into()),
        Err(e) => {
            warn!(error = %e, "ignoring push message with unreadable payload");
            None
        }
    }
}

/// An application window the worker can bring to the front.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientWindow {
    pub id: u64,
    pub url: String,
    pub focusable: bool,
}

/// What a notification click should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    /// The notification was closed and nothing else happens.
    Dismissed,
    /// Focus this existing window.
    Focus(u64),
    /// Open a new window at this URL.
    Open(String),
}

/// Resolves a click on `notification`.
///
/// `action` is the id of the pressed action button, `None` for a click on
/// the notification body. The first focusable window on `origin` wins.
pub fn resolve_click(
    notification: &Notification,
    action: Option<&str>,
    windows: &[ClientWindow],
    origin: &str,
) -> ClickOutcome {
    if action == Some(DISMISS_ACTION) {
        return ClickOutcome::Dismissed;
    }

    windows
        .iter()
        .find(|w| w.focusable && w.url.contains(origin))
        .map_or_else(
            || ClickOutcome::Open(notification.url.clone()),
            |w| ClickOutcome::Focus(w.id),
        )
}

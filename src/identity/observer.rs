// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Sign-up notifications.
//!
//! Observers are called on the authentication path, so they are synchronous
//! and must return immediately. Anything slow (outbox writes, emails) belongs
//! on the far side of a channel.

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::models::User;

/// Event emitted the first time an external identity is seen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSignedUp {
    pub user_id: Uuid,
    pub external_user_id: i64,
    pub login: String,
    pub signed_up_at: DateTime<Utc>,
}

impl From<&User> for UserSignedUp {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id,
            external_user_id: user.external_user_id,
            login: user.login.clone(),
            signed_up_at: Utc::now(),
        }
    }
}

/// Receives user lifecycle notifications. Fire-and-forget.
pub trait UserObserver: Send + Sync {
    fn on_user_signed_up(&self, user: &User);
}

/// Logs sign-ups.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingUserObserver;

impl UserObserver for LoggingUserObserver {
    fn on_user_signed_up(&self, user: &User) {
        tracing::info!(
            user_id = %user.id,
            external_user_id = user.external_user_id,
            login = %user.login,
            "User signed up"
        );
    }
}

/// Forwards sign-ups to an unbounded channel.
///
/// A dropped receiver is not an error for the sender: the event is
/// discarded and authentication proceeds.
#[derive(Debug, Clone)]
pub struct ChannelUserObserver {
    tx: mpsc::UnboundedSender<UserSignedUp>,
}

impl ChannelUserObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<UserSignedUp>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl UserObserver for ChannelUserObserver {
    fn on_user_signed_up(&self, user: &User) {
        if self.tx.send(UserSignedUp::from(user)).is_err() {
            tracing::debug!(user_id = %user.id, "Sign-up event dropped, no receiver");
        }
    }
}

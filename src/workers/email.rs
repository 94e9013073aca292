use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use diesel::prelude::*;
use serde::Deserialize;
use tokio::task;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    email::{email_log_entry, render_activity_email, render_fallback_email,
        render_single_use_code_email, OutgoingEmail},
    jobs::JOB_SEND_NOTIFICATION_EMAIL,
    models::{Activity, NewEmailLog, Notification, SingleUseCode, User, CT_ACTIVITY,
        CT_SINGLE_USE_CODE},
    schema::{activities, email_logs, notifications, single_use_codes, users},
    state::AppState,
};

use super::{JobExecution, JobHandler};

#[derive(Debug, Deserialize)]
struct DispatchPayload {
    notification_id: Uuid,
}

pub struct SendNotificationEmailJob;

impl SendNotificationEmailJob {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SendNotificationEmailJob {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobHandler for SendNotificationEmailJob {
    fn job_type(&self) -> &'static str {
        JOB_SEND_NOTIFICATION_EMAIL
    }

    async fn handle(&self, state: Arc<AppState>, job: crate::models::Job) -> JobExecution {
        let payload: DispatchPayload = match serde_json::from_value(job.payload.clone()) {
            Ok(p) => p,
            Err(err) => {
                return JobExecution::Failed {
                    error: format!("invalid dispatch payload: {err}"),
                }
            }
        };

        let notification_id = payload.notification_id;
        let state_clone = state.clone();
        let context =
            match task::spawn_blocking(move || load_dispatch_context(state_clone, &payload)).await {
                Ok(Ok(ctx)) => ctx,
                Ok(Err(LoadError::Missing(what))) => {
                    return JobExecution::Failed {
                        error: format!("{what} no longer exists"),
                    }
                }
                Ok(Err(LoadError::Infra(err))) => {
                    warn!(job_id = %job.id, error = %err, "dispatch load failed; will retry");
                    return JobExecution::Retry {
                        delay: Duration::from_secs(30),
                        error: err,
                    };
                }
                Err(join_err) => {
                    error!(job_id = %job.id, error = %join_err, "dispatch load task panicked");
                    return JobExecution::Retry {
                        delay: Duration::from_secs(60),
                        error: format!("worker panicked: {join_err}"),
                    };
                }
            };

        if context.suppressed {
            info!(
                job_id = %job.id,
                notification_id = %notification_id,
                "recipient opted out of email notifications; skipping"
            );
            return JobExecution::Success;
        }

        // A transport failure is final for this notification: it is audited
        // below but the job is never requeued, so the recipient gets at most
        // one delivery attempt.
        let log_row = match state
            .email
            .send(&state.config.email_from, &context.message)
            .await
        {
            Ok(message_id) => email_log_entry(
                &context.message.to,
                &context.message.subject,
                true,
                &format!("Message ID: {message_id}"),
            ),
            Err(err) => {
                warn!(
                    job_id = %job.id,
                    notification_id = %notification_id,
                    error = %err,
                    "failed to send notification email"
                );
                email_log_entry(
                    &context.message.to,
                    &context.message.subject,
                    false,
                    &format!("Error: {err:#}"),
                )
            }
        };

        let state_clone = state.clone();
        match task::spawn_blocking(move || write_email_logs(state_clone, vec![log_row])).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                // The email already went out (or definitively failed); losing
                // the audit row is logged but cannot be retried without
                // risking a duplicate send.
                error!(job_id = %job.id, error = %err, "failed to write email log");
            }
            Err(join_err) => {
                error!(job_id = %job.id, error = %join_err, "email log task panicked");
            }
        }

        JobExecution::Success
    }
}

enum LoadError {
    Missing(&'static str),
    Infra(String),
}

struct DispatchContext {
    message: OutgoingEmail,
    suppressed: bool,
}

fn load_dispatch_context(
    state: Arc<AppState>,
    payload: &DispatchPayload,
) -> Result<DispatchContext, LoadError> {
    let mut conn = state
        .db()
        .map_err(|err| LoadError::Infra(format!("{err:?}")))?;

    let notification: Notification = notifications::table
        .find(payload.notification_id)
        .first(&mut conn)
        .optional()
        .map_err(|err| LoadError::Infra(format!("{err:?}")))?
        .ok_or(LoadError::Missing("notification"))?;

    let recipient: User = users::table
        .find(notification.user_id)
        .first(&mut conn)
        .optional()
        .map_err(|err| LoadError::Infra(format!("{err:?}")))?
        .ok_or(LoadError::Missing("recipient"))?;

    // Opted-out users still receive login codes; everything else is dropped
    // before rendering.
    let suppressed =
        !recipient.email_notification && notification.content_type != CT_SINGLE_USE_CODE;

    let rendered = match notification.content_type.as_str() {
        CT_ACTIVITY => {
            let activity: Activity = activities::table
                .find(notification.object_id)
                .first(&mut conn)
                .optional()
                .map_err(|err| LoadError::Infra(format!("{err:?}")))?
                .ok_or(LoadError::Missing("activity"))?;
            render_activity_email(&activity.action, &activity.content_type)
        }
        CT_SINGLE_USE_CODE => {
            let code: SingleUseCode = single_use_codes::table
                .find(notification.object_id)
                .first(&mut conn)
                .optional()
                .map_err(|err| LoadError::Infra(format!("{err:?}")))?
                .ok_or(LoadError::Missing("single-use code"))?;
            render_single_use_code_email(code.code, state.config.code_expiry_minutes)
        }
        _ => render_fallback_email(),
    };

    Ok(DispatchContext {
        message: rendered.to(recipient.email),
        suppressed,
    })
}

fn write_email_logs(state: Arc<AppState>, rows: Vec<NewEmailLog>) -> Result<(), String> {
    let mut conn = state.db().map_err(|err| format!("{err:?}"))?;

    diesel::insert_into(email_logs::table)
        .values(&rows)
        .execute(&mut conn)
        .map_err(|err| format!("{err:?}"))?;

    Ok(())
}

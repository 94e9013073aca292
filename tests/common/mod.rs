use std::env;
use std::sync::Arc;

use anyhow::{anyhow, ensure, Context, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::PgConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use http_body_util::BodyExt;
use once_cell::sync::Lazy;
use rand::rngs::OsRng;
use serde::Serialize;
use taskboard::auth::jwt::JwtService;
use taskboard::config::AppConfig;
use taskboard::db::{self, PgPool};
use taskboard::email::{EmailTransport, OutgoingEmail};
use taskboard::jobs::{
    enqueue_job, mark_job_failed, mark_job_succeeded, reserve_job, retry_job_after,
    JOB_SEND_NOTIFICATION_EMAIL,
};
use taskboard::models::{EmailLog, Job, NewAccessListEntry, NewUser, Notification};
use taskboard::routes;
use taskboard::state::AppState;
use taskboard::workers::email::SendNotificationEmailJob;
use taskboard::{JobExecution, JobHandler};
use tokio::sync::Mutex;
use tower::util::ServiceExt;
use uuid::Uuid;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

static DB_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

#[allow(dead_code)]
#[derive(Clone)]
pub struct SentEmail {
    pub from: String,
    pub message: OutgoingEmail,
}

#[derive(Default)]
pub struct FakeTransport {
    sent: Mutex<Vec<SentEmail>>,
    failure: Mutex<Option<String>>,
}

#[async_trait]
impl EmailTransport for FakeTransport {
    async fn send(&self, from: &str, message: &OutgoingEmail) -> Result<String> {
        if let Some(reason) = self.failure.lock().await.clone() {
            return Err(anyhow!(reason));
        }
        let mut guard = self.sent.lock().await;
        guard.push(SentEmail {
            from: from.to_string(),
            message: message.clone(),
        });
        Ok(format!("fake-message-{}", guard.len()))
    }
}

impl FakeTransport {
    #[allow(dead_code)]
    pub async fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().await.clone()
    }

    #[allow(dead_code)]
    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }

    #[allow(dead_code)]
    pub async fn set_failure(&self, reason: Option<&str>) {
        *self.failure.lock().await = reason.map(|reason| reason.to_string());
    }
}

pub struct TestApp {
    pub state: AppState,
    router: Router,
    transport: Arc<FakeTransport>,
}

impl TestApp {
    pub async fn new() -> Result<Self> {
        let database_url = env::var("TEST_DATABASE_URL")
            .context("TEST_DATABASE_URL must be set for integration tests")?;

        let config = AppConfig {
            database_url: database_url.clone(),
            database_max_pool_size: db::DEFAULT_MAX_POOL_SIZE,
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            jwt_secret: "test-secret".to_string(),
            jwt_issuer: "test-issuer".to_string(),
            jwt_audience: "test-audience".to_string(),
            jwt_expiry_minutes: 60,
            cors_allowed_origin: None,
            aws_endpoint_url: None,
            aws_access_key_id: None,
            aws_secret_access_key: None,
            aws_region: "us-east-1".to_string(),
            email_from: "noreply@taskboard.test".to_string(),
            code_expiry_minutes: 15,
        };

        let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
        prepare_database(&pool).await?;

        let transport = Arc::new(FakeTransport::default());
        let transport_for_state: Arc<dyn EmailTransport> = transport.clone();
        let jwt = JwtService::from_config(&config)?;
        let state = AppState::new(pool.clone(), config, transport_for_state, jwt);
        let router = routes::create_router(state.clone());

        Ok(Self {
            state,
            router,
            transport,
        })
    }

    pub async fn cleanup(&self) -> Result<()> {
        let pool = self.state.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("failed to get cleanup connection: {err}"))?;
            truncate_all(&mut conn)?;
            Ok(())
        })
        .await
        .context("cleanup task panicked")?
    }

    #[allow(dead_code)]
    pub fn transport(&self) -> Arc<FakeTransport> {
        self.transport.clone()
    }

    pub async fn insert_user(&self, email: &str, password: &str) -> Result<Uuid> {
        let email = email.to_string();
        let password = password.to_string();
        self.with_conn(move |conn| {
            let user = NewUser {
                id: Uuid::new_v4(),
                email,
                password_hash: Some(hash_password(&password)?),
                first_name: String::new(),
                last_name: String::new(),
            };
            diesel::insert_into(taskboard::schema::users::table)
                .values(&user)
                .execute(conn)
                .context("failed to insert user")?;
            Ok(user.id)
        })
        .await
    }

    #[allow(dead_code)]
    pub async fn set_user_name(&self, user_id: Uuid, first: &str, last: &str) -> Result<()> {
        use taskboard::schema::users;
        let first = first.to_string();
        let last = last.to_string();
        self.with_conn(move |conn| {
            diesel::update(users::table.find(user_id))
                .set((users::first_name.eq(first), users::last_name.eq(last)))
                .execute(conn)
                .context("failed to rename user")?;
            Ok(())
        })
        .await
    }

    #[allow(dead_code)]
    pub async fn set_email_notification(&self, user_id: Uuid, enabled: bool) -> Result<()> {
        use taskboard::schema::users;
        self.with_conn(move |conn| {
            diesel::update(users::table.find(user_id))
                .set(users::email_notification.eq(enabled))
                .execute(conn)
                .context("failed to update notification preference")?;
            Ok(())
        })
        .await
    }

    #[allow(dead_code)]
    pub async fn allow_email(&self, email: &str) -> Result<()> {
        let entry = NewAccessListEntry {
            id: Uuid::new_v4(),
            email: email.to_string(),
        };
        self.with_conn(move |conn| {
            diesel::insert_into(taskboard::schema::access_list::table)
                .values(&entry)
                .execute(conn)
                .context("failed to insert access list entry")?;
            Ok(())
        })
        .await
    }

    pub async fn login_token(&self, email: &str, password: &str) -> Result<String> {
        #[derive(Serialize)]
        struct LoginPayload<'a> {
            email: &'a str,
            password: &'a str,
        }

        let response = self
            .post_json("/api/auth/login", &LoginPayload { email, password }, None)
            .await?;

        ensure!(
            response.status() == StatusCode::OK,
            "login failed with status {}",
            response.status()
        );

        let body = body_to_vec(response.into_body()).await?;
        #[derive(serde::Deserialize)]
        struct LoginResponse {
            access_token: String,
        }
        let parsed: LoginResponse = serde_json::from_slice(&body)?;
        Ok(parsed.access_token)
    }

    #[allow(dead_code)]
    pub async fn clear_jobs(&self) -> Result<()> {
        self.with_conn(|conn| {
            use taskboard::schema::jobs::dsl::jobs as jobs_table;
            diesel::delete(jobs_table)
                .execute(conn)
                .context("failed to clear jobs")?;
            Ok(())
        })
        .await
    }

    #[allow(dead_code)]
    pub async fn jobs_by_type(&self, ty: &str) -> Result<Vec<Job>> {
        let ty = ty.to_string();
        self.with_conn(move |conn| {
            use taskboard::schema::jobs::dsl::{job_type as job_type_col, jobs as jobs_table};
            let rows = jobs_table
                .filter(job_type_col.eq(&ty))
                .load::<Job>(conn)
                .context("failed to load jobs")?;
            Ok(rows)
        })
        .await
    }

    #[allow(dead_code)]
    pub async fn notifications_for(&self, user_id: Uuid) -> Result<Vec<Notification>> {
        self.with_conn(move |conn| {
            use taskboard::schema::notifications;
            let rows = notifications::table
                .filter(notifications::user_id.eq(user_id))
                .order(notifications::created_at.asc())
                .load::<Notification>(conn)
                .context("failed to load notifications")?;
            Ok(rows)
        })
        .await
    }

    #[allow(dead_code)]
    pub async fn email_logs(&self) -> Result<Vec<EmailLog>> {
        self.with_conn(|conn| {
            use taskboard::schema::email_logs;
            let rows = email_logs::table
                .order(email_logs::created_at.asc())
                .load::<EmailLog>(conn)
                .context("failed to load email logs")?;
            Ok(rows)
        })
        .await
    }

    /// Enqueue a dispatch job by hand, bypassing notification fan-out.
    #[allow(dead_code)]
    pub async fn enqueue_email_job(&self, notification_id: Uuid) -> Result<Uuid> {
        self.with_conn(move |conn| {
            let job = enqueue_job(
                conn,
                JOB_SEND_NOTIFICATION_EMAIL,
                serde_json::json!({ "notification_id": notification_id }),
                None,
            )
            .context("failed to enqueue job")?;
            Ok(job.id)
        })
        .await
    }

    /// Drain every runnable email job the way the worker loop would,
    /// recording the terminal status of each. Jobs pushed into the future by
    /// a retry are left queued.
    #[allow(dead_code)]
    pub async fn run_email_jobs(&self) -> Result<usize> {
        let handler = SendNotificationEmailJob::new();
        let state = Arc::new(self.state.clone());
        let mut processed = 0;

        loop {
            let job = self
                .with_conn(|conn| {
                    reserve_job(conn, &[JOB_SEND_NOTIFICATION_EMAIL])
                        .context("failed to reserve job")
                })
                .await?;
            let Some(job) = job else {
                break;
            };

            let job_id = job.id;
            let outcome = handler.handle(state.clone(), job).await;
            self.with_conn(move |conn| {
                match outcome {
                    JobExecution::Success => mark_job_succeeded(conn, job_id),
                    JobExecution::Retry { delay, error } => {
                        retry_job_after(conn, job_id, delay, &error)
                    }
                    JobExecution::Failed { error } => mark_job_failed(conn, job_id, &error),
                }
                .context("failed to record job outcome")?;
                Ok(())
            })
            .await?;
            processed += 1;
        }

        Ok(processed)
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let body = serde_json::to_vec(payload)?;
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(path)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::from(body))?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    #[allow(dead_code)]
    pub async fn patch_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let body = serde_json::to_vec(payload)?;
        let mut builder = Request::builder()
            .method(Method::PATCH)
            .uri(path)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::from(body))?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        let mut builder = Request::builder().method(Method::GET).uri(path);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::empty())?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    #[allow(dead_code)]
    pub async fn delete(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        let builder = Request::builder().method(Method::DELETE).uri(path);
        let builder = if let Some(token) = token {
            builder.header("authorization", format!("Bearer {token}"))
        } else {
            builder
        };
        let request = builder.body(Body::empty())?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    pub async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut PgConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.state.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("failed to get database connection: {err}"))?;
            f(&mut conn)
        })
        .await
        .context("connection task panicked")?
    }
}

pub async fn acquire_db_lock() -> tokio::sync::MutexGuard<'static, ()> {
    DB_LOCK.lock().await
}

pub async fn body_to_vec(body: Body) -> Result<Vec<u8>> {
    let collected = body
        .collect()
        .await
        .map_err(|err| anyhow!("failed to read response body: {err}"))?;
    Ok(collected.to_bytes().to_vec())
}

async fn prepare_database(pool: &PgPool) -> Result<()> {
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut conn = pool
            .get()
            .map_err(|err| anyhow!("failed to acquire connection: {err}"))?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|err| anyhow!("failed to run migrations: {err}"))?;
        truncate_all(&mut conn)?;
        Ok(())
    })
    .await
    .context("migration task panicked")?
}

fn truncate_all(conn: &mut PgConnection) -> Result<()> {
    conn.batch_execute(
        "TRUNCATE TABLE jobs, todos, email_logs, notifications, activities, attachments, comments, \
         subtask_assignees, subtasks, task_assignees, tasks, project_assignees, projects, \
         domain_members, domains, single_use_codes, access_list, users RESTART IDENTITY CASCADE;",
    )
    .context("failed to truncate tables")?;
    Ok(())
}

fn hash_password(password: &str) -> Result<String> {
    use argon2::password_hash::{PasswordHasher, SaltString};
    use argon2::Argon2;

    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| anyhow!("failed to hash password: {err}"))?
        .to_string())
}

//! Relational database source: a login check.
//!
//! Each check logs in as the monitoring user against the `postgres`
//! database, pings the session, and disconnects. The server picks the
//! authentication method (cleartext, MD5 or SCRAM). Results are cached
//! for `scrape_interval` so frequent scrapes do not open a connection
//! each.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use sqlx::postgres::PgConnectOptions;
use sqlx::{ConnectOptions, Connection};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use fleet_core::ResourceDescriptor;
use fleet_metrics::{Desc, Metric};

use crate::error::{SourceError, SourceResult};
use crate::source::{MetricSource, SourceSettings};

const PG_UP: Desc = Desc::gauge("pg_up", "Whether the server answered the login attempt", &[]);
const PG_AUTHENTICATED: Desc = Desc::gauge(
    "pg_authenticated",
    "Whether the monitoring user authenticated successfully",
    &[],
);
const PG_LOGIN_DURATION: Desc = Desc::gauge(
    "pg_login_duration_seconds",
    "Duration of the last login check",
    &[],
);

#[derive(Debug, Clone, Copy, PartialEq)]
struct LoginCheck {
    up: bool,
    authenticated: bool,
    duration: Duration,
}

pub struct PostgresSource {
    address: String,
    options: PgConnectOptions,
    connect_timeout: Duration,
    query_timeout: Duration,
    scrape_interval: Duration,
    last: Mutex<Option<(Instant, LoginCheck)>>,
    closed: AtomicBool,
}

impl PostgresSource {
    pub fn new(descriptor: &ResourceDescriptor, settings: &SourceSettings) -> SourceResult<Self> {
        if !descriptor.endpoint.is_defined() {
            return Err(SourceError::MissingEndpoint);
        }
        let credentials = settings
            .credentials
            .as_ref()
            .ok_or(SourceError::MissingCredentials("postgres"))?;

        let options = PgConnectOptions::new_without_pgpass()
            .host(&descriptor.endpoint.host)
            .port(descriptor.endpoint.port)
            .username(&credentials.user)
            .password(&credentials.password)
            .database("postgres")
            .application_name("fleetd");

        Ok(Self {
            address: descriptor.endpoint.address(),
            options,
            // At least one second.
            connect_timeout: settings.connect_timeout.max(Duration::from_secs(1)),
            query_timeout: settings.query_timeout,
            scrape_interval: settings.scrape_interval,
            last: Mutex::new(None),
            closed: AtomicBool::new(false),
        })
    }

    pub(crate) fn boxed(
        descriptor: &ResourceDescriptor,
        settings: &SourceSettings,
    ) -> SourceResult<Box<dyn MetricSource>> {
        Ok(Box::new(Self::new(descriptor, settings)?))
    }

    async fn check_login(&self) -> LoginCheck {
        let started = Instant::now();
        let (up, authenticated) = match tokio::time::timeout(self.connect_timeout, self.options.connect()).await {
            Ok(Ok(mut conn)) => {
                let alive = match tokio::time::timeout(self.query_timeout, conn.ping()).await {
                    Ok(Ok(())) => true,
                    Ok(Err(e)) => {
                        warn!(address = %self.address, error = %e, "postgres ping failed");
                        false
                    }
                    Err(_) => {
                        warn!(address = %self.address, timeout = ?self.query_timeout, "postgres ping timed out");
                        false
                    }
                };
                if tokio::time::timeout(self.query_timeout, conn.close()).await.is_err() {
                    debug!(address = %self.address, "postgres disconnect timed out");
                }
                (alive, alive)
            }
            // The server answered and refused the login.
            Ok(Err(sqlx::Error::Database(e))) => {
                debug!(address = %self.address, code = ?e.code(), error = %e, "login rejected");
                (true, false)
            }
            Ok(Err(e)) => {
                warn!(address = %self.address, error = %e, "postgres connect failed");
                (false, false)
            }
            Err(_) => {
                warn!(address = %self.address, timeout = ?self.connect_timeout, "postgres connect timed out");
                (false, false)
            }
        };

        LoginCheck {
            up,
            authenticated,
            duration: started.elapsed(),
        }
    }
}

#[async_trait]
impl MetricSource for PostgresSource {
    async fn collect(&self) -> Vec<Metric> {
        if self.closed.load(Ordering::Acquire) {
            return Vec::new();
        }

        let mut last = self.last.lock().await;
        let cached = *last;
        let check = match cached {
            Some((at, check)) if at.elapsed() < self.scrape_interval => check,
            _ => {
                let check = self.check_login().await;
                *last = Some((Instant::now(), check));
                check
            }
        };

        vec![
            PG_UP.sample(if check.up { 1.0 } else { 0.0 }, &[]),
            PG_AUTHENTICATED.sample(if check.authenticated { 1.0 } else { 0.0 }, &[]),
            PG_LOGIN_DURATION.sample(check.duration.as_secs_f64(), &[]),
        ]
    }

    async fn close(&self) -> SourceResult<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

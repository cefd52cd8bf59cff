//! Process-wide registry of the three connection pools.

use std::str::FromStr;

use anyhow::{Context, Result};
use sqlx::any::{AnyConnectOptions, AnyPoolOptions};
use tracing::info;

use crate::{
    error::DbError,
    profile::{ConnectionProfile, DatabaseSettings},
    schema,
    session::SessionProvider,
    DatabaseRole,
};

/// Built once at start-up and passed to every service that needs a session.
#[derive(Debug, Clone)]
pub struct ConnectionRegistry {
    main: SessionProvider,
    analytics: SessionProvider,
    logs: SessionProvider,
}

impl ConnectionRegistry {
    /// Validates every profile, opens one pool per profile and checks that each
    /// database answers. Any failure aborts start-up.
    pub async fn connect(settings: &DatabaseSettings) -> Result<Self> {
        settings
            .validate()
            .context("invalid database configuration")?;
        sqlx::any::install_default_drivers();

        let main = open_provider(&settings.main).await?;
        let analytics = open_provider(&settings.analytics).await?;
        let logs = open_provider(&settings.logs).await?;

        Ok(Self {
            main,
            analytics,
            logs,
        })
    }

    pub fn main(&self) -> &SessionProvider {
        &self.main
    }

    pub fn analytics(&self) -> &SessionProvider {
        &self.analytics
    }

    pub fn logs(&self) -> &SessionProvider {
        &self.logs
    }

    pub fn provider(&self, role: DatabaseRole) -> &SessionProvider {
        match role {
            DatabaseRole::Main => &self.main,
            DatabaseRole::Analytics => &self.analytics,
            DatabaseRole::Logs => &self.logs,
        }
    }

    /// Creates any missing tables on every database.
    pub async fn bootstrap_schema(&self) -> Result<()> {
        for role in DatabaseRole::ALL {
            let provider = self.provider(role);
            schema::bootstrap(provider.pool(), role, provider.backend())
                .await
                .with_context(|| format!("bootstrapping {role} schema"))?;
        }
        Ok(())
    }

    /// Pings every database and reports each result.
    pub async fn health(&self) -> Vec<(DatabaseRole, Result<(), DbError>)> {
        let (main, analytics, logs) =
            tokio::join!(self.main.ping(), self.analytics.ping(), self.logs.ping());
        vec![
            (DatabaseRole::Main, main),
            (DatabaseRole::Analytics, analytics),
            (DatabaseRole::Logs, logs),
        ]
    }

    pub async fn close(&self) {
        tokio::join!(self.main.close(), self.analytics.close(), self.logs.close());
    }
}

async fn open_provider(profile: &ConnectionProfile) -> Result<SessionProvider> {
    let role = profile.role;
    let backend = profile.backend()?;
    let options = AnyConnectOptions::from_str(&profile.connection_url())
        .with_context(|| format!("parsing {role} connection URL"))?;

    let max_connections = profile.pool.max_connections().max(1);
    let pool = AnyPoolOptions::new()
        .min_connections(profile.pool.pool_size.min(max_connections))
        .max_connections(max_connections)
        .acquire_timeout(profile.pool.pool_timeout)
        .max_lifetime(profile.pool.pool_recycle)
        .test_before_acquire(true)
        .connect_with(options)
        .await
        .with_context(|| format!("connecting to {role} database"))?;

    let provider = SessionProvider::new(role, backend, pool);
    provider
        .ping()
        .await
        .with_context(|| format!("initial connectivity check for {role} database"))?;

    info!(
        %role,
        ?backend,
        pool_size = profile.pool.pool_size,
        max_connections,
        "database pool ready"
    );
    Ok(provider)
}

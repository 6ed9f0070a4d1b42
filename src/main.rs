use anyhow::{Context, Result};
use axum::Router;
use bucket_store::{
    AppState, config,
    models::event::StorageEvent,
    routes,
    services::{
        auth_service::{Authorizer, CredentialStore},
        storage_service::StorageService,
    },
};
use chrono::Local;
use std::{io::ErrorKind, sync::Arc};
use tokio::{fs, net::TcpListener, sync::broadcast};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // --- Parse config + token flag ---
    let (cfg, print_token) = config::AppConfig::from_env_and_args()?;

    tracing::info!("Starting bucket-store with config: {:?}", cfg);

    // --- Load client credentials ---
    let credentials = CredentialStore::load(&cfg.credentials_file)
        .await
        .context("loading client credentials")?;

    // --- Handle token mode ---
    if let Some(client_id) = print_token {
        let authorizer = Authorizer::new(Arc::new(credentials));
        let token = authorizer
            .issue_token(&client_id, Local::now().naive_local())
            .with_context(|| format!("client `{}` is not in the credentials file", client_id))?;
        println!("{}", token);
        return Ok(()); // exit after printing
    }

    // --- Ensure storage directory exists ---
    if !fs::try_exists(&cfg.storage_dir).await? {
        fs::create_dir_all(&cfg.storage_dir).await?;
        tracing::info!("Created storage directory at {}", cfg.storage_dir.display());
    }

    if credentials.is_empty() {
        tracing::warn!(
            "No clients defined in {}; every request will be rejected",
            cfg.credentials_file.display()
        );
    } else {
        tracing::info!("Loaded {} client credential(s)", credentials.len());
    }

    // --- Initialize core services ---
    let storage = StorageService::new(cfg.storage_dir.clone());
    let authorizer = Authorizer::new(Arc::new(credentials));
    tokio::spawn(audit_events(storage.subscribe()));

    // --- Build router ---
    let app: Router = routes::routes::routes().with_state(AppState {
        storage,
        authorizer,
    });

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Log every storage notification until the engine is dropped.
async fn audit_events(mut events: broadcast::Receiver<StorageEvent>) {
    loop {
        match events.recv().await {
            Ok(StorageEvent::BucketCreated { bucket }) => {
                tracing::info!(bucket = %bucket, "bucket created");
            }
            Ok(StorageEvent::ObjectWritten {
                bucket,
                object_id,
                owner_id,
            }) => {
                tracing::info!(bucket = %bucket, object_id = %object_id, owner = %owner_id, "object write");
            }
            Ok(StorageEvent::ObjectDeleted {
                bucket,
                object_id,
                owner_id,
            }) => {
                tracing::info!(bucket = %bucket, object_id = %object_id, owner = %owner_id, "object delete");
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!("audit log skipped {} storage events", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

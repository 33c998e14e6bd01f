pub mod api;

use crate::cli::ServeArgs;
use std::error::Error;
use std::net::SocketAddr;
use std::time::Duration;
use axum_server::{ tls_rustls::RustlsConfig, Handle };
use tokio::net::TcpListener;
use tokio::signal;
use log::{ error, info };

use self::api::{ router, AppState };

pub struct Server {
    addr: String,
    state: AppState,
    args: ServeArgs,
}

impl Server {
    pub fn new(addr: String, state: AppState, args: ServeArgs) -> Self {
        Self { addr, state, args }
    }

    pub async fn run(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let app = router(self.state.clone());

        match (self.args.enable_tls, &self.args.tls_cert_path, &self.args.tls_key_path) {
            (true, Some(cert_path), Some(key_path)) => {
                let addr = self.addr.parse::<SocketAddr>()?;
                info!(
                    "TLS enabled. Loading certificate from '{}' and key from '{}'",
                    cert_path,
                    key_path
                );
                let tls_config = RustlsConfig::from_pem_file(cert_path, key_path).await?;

                let handle = Handle::new();
                let shutdown = handle.clone();
                tokio::spawn(async move {
                    shutdown_signal().await;
                    shutdown.graceful_shutdown(Some(Duration::from_secs(10)));
                });

                info!("HTTPS server listening on: https://{}", addr);
                axum_server::bind_rustls(addr, tls_config)
                    .handle(handle)
                    .serve(app.into_make_service())
                    .await?;
            }
            (true, _, _) => {
                error!("--enable-tls was set but certificate/key paths are incomplete.");
                return Err("TLS enabled without cert/key".into());
            }
            (false, _, _) => {
                let listener = TcpListener::bind(&self.addr).await.map_err(|e| {
                    format!("Failed to bind HTTP server to {}: {}. Try a different port.", self.addr, e)
                })?;
                info!("HTTP server listening on: http://{}", listener.local_addr()?);
                axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
            }
        }

        info!("Server shut down");
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

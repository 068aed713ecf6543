pub mod api;

use crate::cli::Args;
use self::api::AppState;
use log::{ error, info };
use std::error::Error;

pub struct Server {
    addr: String,
    app_state: AppState,
    args: Args,
}

impl Server {
    pub fn new(addr: String, app_state: AppState, args: Args) -> Self {
        Self {
            addr,
            app_state,
            args,
        }
    }

    fn tls_paths(&self) -> Result<Option<(String, String)>, Box<dyn Error + Send + Sync>> {
        if !self.args.enable_tls {
            info!("TLS not enabled. Serving plain HTTP.");
            return Ok(None);
        }
        match (&self.args.tls_cert_path, &self.args.tls_key_path) {
            (Some(cert_path), Some(key_path)) => {
                info!(
                    "TLS enabled. Loading certificate from '{}' and key from '{}'",
                    cert_path,
                    key_path
                );
                Ok(Some((cert_path.clone(), key_path.clone())))
            }
            (Some(_), None) | (None, Some(_)) => {
                error!("Both --tls-cert-path and --tls-key-path must be provided to enable TLS.");
                Err("Missing TLS certificate or key path".into())
            }
            (None, None) => {
                error!("--enable-tls was set but no certificate/key paths provided.");
                Err("TLS enabled without cert/key".into())
            }
        }
    }

    pub async fn run(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let tls = self.tls_paths()?;
        let cors = api::cors_layer(&self.args.cors_origin)?;
        let app = api::router(self.app_state.clone(), cors, self.args.max_upload_bytes);
        api::start_http_server(&self.addr, app, tls).await
    }
}

// HTTP server assembly

use crate::api::routes;
use crate::api::state::AppState;
use crate::config::ApiSettings;
use crate::Result;
use axum::routing::{delete, get, post, put};
use axum::Router;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub struct ApiServer {
    config: ApiSettings,
    state: Arc<AppState>,
}

impl ApiServer {
    pub fn new(state: Arc<AppState>) -> Self {
        Self {
            config: state.config.api.clone(),
            state,
        }
    }

    pub fn build_router(&self) -> Router {
        let api = Router::new()
            .route("/health", get(routes::health::health))
            .route(
                "/certificates",
                get(routes::certificates::list).post(routes::certificates::create),
            )
            .route(
                "/certificates/:fingerprint",
                get(routes::certificates::get)
                    .patch(routes::certificates::update)
                    .delete(routes::certificates::delete),
            )
            .route(
                "/certificates/:fingerprint/children",
                get(routes::certificates::children),
            )
            .route(
                "/certificates/:fingerprint/settings",
                put(routes::certificates::replace_policy),
            )
            .route("/certificates/:fingerprint/san", post(routes::san::add))
            .route(
                "/certificates/:fingerprint/san/:kind/:value",
                delete(routes::san::remove),
            )
            .route("/certificates/:fingerprint/san/apply", post(routes::san::apply))
            .route("/certificates/:fingerprint/renew", post(routes::renew::renew))
            .route(
                "/certificates/:fingerprint/check-renewal-passphrases",
                get(routes::renew::check_passphrases),
            )
            .route("/certificates/:fingerprint/history", get(routes::renew::history))
            .route(
                "/certificates/:fingerprint/history/:version/:form",
                get(routes::files::download_archived),
            )
            .route(
                "/certificates/:fingerprint/passphrase",
                post(routes::passphrase::store).delete(routes::passphrase::delete),
            )
            .route("/certificates/:fingerprint/files", get(routes::files::list))
            .route(
                "/certificates/:fingerprint/download/:form",
                get(routes::files::download),
            )
            .route("/certificates/:fingerprint/download", get(routes::files::bundle))
            .route("/certificates/:fingerprint/convert", post(routes::files::convert))
            .route(
                "/certificates/:fingerprint/backups",
                get(routes::files::list_backups).post(routes::files::create_backup),
            )
            .route(
                "/certificates/:fingerprint/backups/:backup_id",
                delete(routes::files::delete_backup),
            )
            .route(
                "/certificates/:fingerprint/backups/:backup_id/restore",
                post(routes::files::restore_backup),
            )
            .route(
                "/certificates/:fingerprint/deploy-actions",
                get(routes::actions::list).post(routes::actions::create),
            )
            .route(
                "/certificates/:fingerprint/deploy-actions/:action_id",
                put(routes::actions::update).delete(routes::actions::delete),
            )
            .route(
                "/certificates/:fingerprint/deploy-actions/:action_id/test",
                post(routes::actions::test),
            )
            .route("/certificates/:fingerprint/deploy", post(routes::actions::deploy))
            .route(
                "/settings/deployment",
                get(routes::settings::get_all).put(routes::settings::put_all),
            )
            .route(
                "/settings/deployment/:category",
                get(routes::settings::get_category)
                    .put(routes::settings::put_category)
                    .delete(routes::settings::delete_category),
            )
            .route("/scheduler/status", get(routes::scheduler::status))
            .route(
                "/scheduler/settings",
                get(routes::scheduler::get_settings).post(routes::scheduler::put_settings),
            )
            .route("/scheduler/run", post(routes::scheduler::run_now))
            .route("/scheduler/report", get(routes::scheduler::last_report));

        Router::new()
            .route("/health", get(routes::health::health))
            .nest("/api", api)
            .layer(TraceLayer::new_for_http())
            .layer(CompressionLayer::new())
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone())
    }

    pub async fn run(self) -> Result<()> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        tracing::info!(%addr, "API listening");
        axum::serve(listener, self.build_router()).await?;
        Ok(())
    }
}

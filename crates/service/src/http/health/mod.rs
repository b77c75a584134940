use axum::extract::FromRef;
use axum::routing::get;
use axum::Router;

mod data_source;
mod liveness;
mod readiness;

pub use data_source::{DataSource, DataSourceError, DynDataSource, SqliteSource, StateDataSource};

/// `/livez` and `/readyz`, to be nested under the status prefix.
pub fn router<S, T>(state: S) -> Router<T>
where
    S: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
    DynDataSource: FromRef<S>,
{
    Router::new()
        .route("/livez", get(liveness::handler))
        .route("/readyz", get(readiness::handler))
        .with_state(state)
}

pub mod filter;

use axum::extract::State;

use crate::auth::extractor::AuthUser;
use crate::errors::AppError;
use crate::events::store::list_for_user;
use crate::history::filter::{HistoryFilter, HistoryQuery};
use crate::models::event::Event;
use crate::routes::extract::{Json, Query};
use crate::state::AppState;

/// GET /history
///
/// The caller's events, newest first, narrowed by the optional filters.
pub async fn handle_history(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<Event>>, AppError> {
    let filter = HistoryFilter::try_from(&query).map_err(AppError::Validation)?;
    let events = list_for_user(&state.db, auth.id).await?;
    Ok(Json(filter.apply(events)))
}

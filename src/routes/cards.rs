use axum::extract::{Query, State};
use axum::Json;

use crate::app_state::AppState;
use crate::models::card::{CardPrint, ScryfallCard};
use crate::models::faceswap::{CardPrintsQuery, CardSearchQuery};
use crate::routes::error::{ApiError, ApiResult};

/// GET /api/v1/cards/search?q=: Search card prints on Scryfall.
pub async fn search_cards(
    State(state): State<AppState>,
    Query(query): Query<CardSearchQuery>,
) -> ApiResult<Json<Vec<ScryfallCard>>> {
    let q = query.q.trim();
    if q.is_empty() {
        return Err(ApiError::BadRequest("q must not be empty".to_string()));
    }

    Ok(Json(state.scryfall.search_cards(q).await?))
}

/// GET /api/v1/cards/prints?uri=: All prints behind a card's `prints_search_uri`.
pub async fn card_prints(
    State(state): State<AppState>,
    Query(query): Query<CardPrintsQuery>,
) -> ApiResult<Json<Vec<CardPrint>>> {
    Ok(Json(state.scryfall.card_prints(&query.uri).await?))
}

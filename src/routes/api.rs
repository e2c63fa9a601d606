// Handlers for the REST API

use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    response::Json,
};
use serde::Deserialize;

use crate::{
    catalog,
    error::{AppError, AppResult},
    filters::{FilterField, FilterSet},
    listing::VehicleListing,
    routes::AppState,
    search::{self, SearchOptions},
};

#[derive(Debug, Deserialize)]
pub struct CatalogQuery {
    make: Option<String>,
    model: Option<String>,
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}

// Splits the raw query into keyword, page and validated filters
fn parse_search_query(params: &HashMap<String, String>) -> AppResult<(Option<&str>, u32, FilterSet)> {
    let keyword = non_empty(params.get("keyword"));

    let page = match non_empty(params.get("page")) {
        Some(raw) => raw
            .parse::<u32>()
            .map_err(|_| AppError::BadRequest(format!("invalid page '{}'", raw)))?,
        None => 1,
    };

    let mut filters = FilterSet::new();
    for (name, raw) in params {
        if name == "keyword" || name == "page" || raw.trim().is_empty() {
            continue;
        }
        match FilterField::from_name(name) {
            Some(field) => filters.set(field, field.parse(raw))?,
            None => tracing::debug!(param = %name, "Ignoring unknown query parameter"),
        }
    }

    Ok((keyword, page, filters))
}

// GET /api/?keyword=&page=&<filter>=...
pub async fn search_vehicles(
    State(app_state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> AppResult<Json<Vec<VehicleListing>>> {
    tracing::info!("[HANDLER] /api/ - Request received: {:?}", params);

    let (keyword, page, filters) = parse_search_query(&params)?;
    let options = SearchOptions::from_settings(&app_state.settings).single_page(page);

    let listings = search::search_all(&*app_state.api, keyword, &filters, options).await?;

    if listings.is_empty() {
        tracing::info!("[HANDLER] /api/ - No listings found for page {}", page);
        return Err(AppError::NotFound("No listings found".to_string()));
    }

    tracing::info!("[HANDLER] /api/ - Returning {} listings for page {}", listings.len(), page);
    Ok(Json(listings))
}

// GET /api/makes-models-trims/?make=&model=
pub async fn get_makes_models_trims(
    State(app_state): State<AppState>,
    Query(query): Query<CatalogQuery>,
) -> AppResult<Json<Vec<String>>> {
    let make = non_empty(query.make.as_ref());
    let model = non_empty(query.model.as_ref());
    tracing::info!("[HANDLER] /api/makes-models-trims/ - make: {:?}, model: {:?}", make, model);

    let names = catalog::makes_models_trims(&*app_state.api, make, model).await?;
    Ok(Json(names))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        Router,
        body::{Body, to_bytes},
        http::{Request, StatusCode},
    };
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use crate::config::Settings;
    use crate::gateway::mock::MockApi;
    use crate::routes::{AppState, create_router};

    fn app(api: Arc<MockApi>) -> Router {
        let settings = Settings {
            sleep_time_ms: 0,
            ..Settings::default()
        };
        create_router(AppState {
            settings: Arc::new(settings),
            api,
        })
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn corolla() -> Value {
        json!({
            "id": "12345",
            "makeYear": "2010",
            "price": "$8000",
            "make": "Toyota",
            "model": "Corolla",
            "displayTime": "1638467200"
        })
    }

    #[tokio::test]
    async fn search_returns_listing_array() {
        let api = Arc::new(MockApi::with_data(vec![json!({ "items": [corolla()] })]));
        let (status, body) = get(
            app(api.clone()),
            "/api/?make=Toyota&priceTo=10000&transmission=Manual;Automatic&page=2",
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["listing_title"], "2010 Toyota Corolla");
        assert_eq!(body[0]["price"], 8000);
        assert_eq!(
            api.bodies()[0],
            vec![
                "page",
                "2",
                "make",
                "Toyota",
                "priceTo",
                "10000",
                "transmission",
                "Manual;Automatic"
            ]
        );
        assert_eq!(api.call_count(), 1);
    }

    #[tokio::test]
    async fn search_without_filters_is_rejected() {
        let api = Arc::new(MockApi::default());
        let (status, body) = get(app(api.clone()), "/api/").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
        assert_eq!(api.call_count(), 0);
    }

    #[tokio::test]
    async fn invalid_filter_value_is_rejected() {
        let api = Arc::new(MockApi::default());
        let (status, body) = get(app(api.clone()), "/api/?sellerType=Robot").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("sellerType"));
        assert_eq!(api.call_count(), 0);
    }

    #[tokio::test]
    async fn no_listings_is_not_found() {
        let api = Arc::new(MockApi::with_data(vec![json!({ "items": [] })]));
        let (status, body) = get(app(api), "/api/?keyword=civic").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({ "error": "No listings found" }));
    }

    #[tokio::test]
    async fn makes_models_trims_endpoint() {
        let cars = json!({ "Toyota": { "Corolla": ["LE", "S"] } });
        let api = Arc::new(MockApi::with_data(vec![cars.clone(), cars]));

        let (status, body) = get(app(api.clone()), "/api/makes-models-trims/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!(["Toyota"]));

        let (_, body) = get(app(api), "/api/makes-models-trims/?make=Toyota&model=Corolla").await;
        assert_eq!(body, json!(["LE", "S"]));
    }
}

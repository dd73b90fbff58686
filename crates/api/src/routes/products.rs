//! Product CRUD endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use catalog_store::{CatalogStore, NewProduct, OrderId, Product, ProductId};
use common::{ProductEvent, ProductEventType};
use messaging::EventPublisher;
use serde::Serialize;

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S: CatalogStore> {
    pub store: S,
    pub publisher: Arc<dyn EventPublisher>,
}

#[derive(Serialize)]
pub struct ProductsResponse {
    pub products: Vec<Product>,
}

/// GET /products: list every product.
#[tracing::instrument(skip(state))]
pub async fn list<S: CatalogStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<ProductsResponse>, ApiError> {
    let products = state.store.list_products().await?;
    Ok(Json(ProductsResponse { products }))
}

/// GET /products/{id}: fetch one product.
#[tracing::instrument(skip(state))]
pub async fn get<S: CatalogStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<i64>,
) -> Result<Json<Product>, ApiError> {
    let id = ProductId::new(id);
    state
        .store
        .get_product(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Product {id} not found")))
}

/// GET /products/{id}/orders: products reserved for the order with this id.
#[tracing::instrument(skip(state))]
pub async fn for_order<S: CatalogStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(order_id): Path<i64>,
) -> Result<Json<ProductsResponse>, ApiError> {
    let products = state
        .store
        .products_for_order(OrderId::new(order_id))
        .await?;
    Ok(Json(ProductsResponse { products }))
}

/// POST /products: create a product and announce it.
#[tracing::instrument(skip(state, req), fields(name = %req.name))]
pub async fn create<S: CatalogStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<NewProduct>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    validate(&req)?;
    let product = state.store.create_product(req).await?;

    publish(&state, ProductEventType::Created, &product).await;
    Ok((StatusCode::CREATED, Json(product)))
}

/// PUT /products/{id}: replace a product's fields.
#[tracing::instrument(skip(state, req))]
pub async fn replace<S: CatalogStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<i64>,
    Json(req): Json<NewProduct>,
) -> Result<Json<Product>, ApiError> {
    validate(&req)?;
    let id = ProductId::new(id);
    let product = state
        .store
        .replace_product(id, req)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Product {id} not found")))?;

    publish(&state, ProductEventType::Updated, &product).await;
    Ok(Json(product))
}

/// DELETE /products/{id}: remove a product.
#[tracing::instrument(skip(state))]
pub async fn delete<S: CatalogStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let id = ProductId::new(id);
    let product = state
        .store
        .delete_product(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Product {id} not found")))?;

    publish(&state, ProductEventType::Deleted, &product).await;
    Ok(StatusCode::NO_CONTENT)
}

fn validate(req: &NewProduct) -> Result<(), ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::BadRequest("name must not be empty".to_string()));
    }
    if !req.details.price.is_finite() || req.details.price < 0.0 {
        return Err(ApiError::BadRequest(format!(
            "invalid price: {}",
            req.details.price
        )));
    }
    Ok(())
}

/// Publishes a product event. Failures are logged; the change is already stored.
async fn publish<S: CatalogStore>(
    state: &AppState<S>,
    event_type: ProductEventType,
    product: &Product,
) {
    let event = ProductEvent::new(event_type, product.clone());
    let body = match serde_json::to_vec(&event) {
        Ok(body) => body,
        Err(e) => {
            tracing::error!(error = %e, %event_type, "failed to encode product event");
            return;
        }
    };

    if let Err(e) = state.publisher.publish(event_type.routing_key(), body).await {
        tracing::warn!(
            error = %e,
            %event_type,
            product_id = %product.id,
            "failed to publish product event"
        );
    }
}

use crate::access::Caller;
use crate::error::ApiError;
use actix_cors::Cors;
use actix_web::{web, App, HttpResponse, HttpServer};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use shadowvec_core::{AccessContext, CollectionDefinition, Error, ListQuery, Record, RecordId};
use shadowvec_search::{QueryEngine, SearchCriteria, SearchRequest};
use shadowvec_storage::{MemoryRecordStore, MutationOutcome, RecordStore, ShadowIndex};
use std::sync::Arc;

/// Shared handles every handler works with.
#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<MemoryRecordStore>,
    pub engine: Arc<QueryEngine>,
    pub index: ShadowIndex,
    /// Bearer token granting administrator access. `None` disables admin access.
    pub admin_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LimitParams {
    limit: Option<usize>,
}

pub struct RestApi;

impl RestApi {
    pub async fn start(state: ApiState, port: u16) -> std::io::Result<()> {
        HttpServer::new(move || {
            let cors = Cors::default()
                .allow_any_origin()
                .allow_any_method()
                .allow_any_header()
                .max_age(3600);

            App::new()
                .wrap(cors)
                .app_data(web::Data::new(state.clone()))
                .configure(configure)
        })
        .bind(("0.0.0.0", port))?
        .run()
        .await
    }
}

/// Register every route. Expects `web::Data<ApiState>` in the app data.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/api/health", web::get().to(health))
        .route("/api/collections", web::get().to(list_collections))
        .route("/api/collections", web::post().to(create_collection))
        .route("/api/collections/{collection}/vss", web::post().to(search))
        .route("/api/collections/{collection}/records", web::get().to(list_records))
        .route("/api/collections/{collection}/records", web::post().to(create_record))
        .route("/api/collections/{collection}/records/{id}", web::patch().to(update_record))
        .route("/api/collections/{collection}/records/{id}", web::delete().to(delete_record));
}

fn require_admin(caller: &Caller) -> Result<(), ApiError> {
    if caller.0.is_admin() {
        return Ok(());
    }
    Err(ApiError::new(
        Error::Forbidden("only admins can perform this action".to_string()),
        &caller.0,
    ))
}

fn require_authenticated(caller: &Caller) -> Result<(), ApiError> {
    if caller.0.is_admin() || caller.0.is_authenticated() {
        return Ok(());
    }
    Err(ApiError::new(
        Error::Forbidden("authentication required".to_string()),
        &caller.0,
    ))
}

/// The record stays committed, but a failed shadow sync fails the request
/// with the first hook error.
fn synced(outcome: MutationOutcome, access: &AccessContext) -> Result<Arc<Record>, ApiError> {
    match outcome.hook_errors.into_iter().next() {
        Some(error) => Err(ApiError::new(error, access)),
        None => Ok(outcome.record),
    }
}

async fn health(state: web::Data<ApiState>) -> HttpResponse {
    let stats = state.index.pool().stats();
    HttpResponse::Ok().json(json!({
        "code": 200,
        "message": "API is healthy.",
        "data": {
            "shadowTables": stats.tables,
            "availableReaders": stats.available_readers,
            "activeWriters": stats.active_writers,
            "closed": stats.closed,
        },
    }))
}

/// `POST /api/collections/{collection}/vss?limit=N` with a `{field: vector}` body.
async fn search(
    state: web::Data<ApiState>,
    caller: Caller,
    path: web::Path<String>,
    params: web::Query<LimitParams>,
    body: web::Json<Value>,
) -> Result<HttpResponse, ApiError> {
    let collection = path.into_inner();
    let access = caller.0;

    // Checked before anything touches storage.
    let criteria = SearchCriteria::from_value(body.into_inner()).map_err(ApiError::for_caller(&access))?;

    let mut request = SearchRequest::new(collection, criteria, access.clone());
    request.limit = params.limit;

    let results = state
        .engine
        .search(request)
        .await
        .map_err(ApiError::for_caller(&access))?;
    Ok(HttpResponse::Ok().json(results))
}

async fn list_collections(state: web::Data<ApiState>, caller: Caller) -> Result<HttpResponse, ApiError> {
    require_admin(&caller)?;
    let items: Vec<CollectionDefinition> = state
        .store
        .list_collections()
        .iter()
        .map(|c| c.to_definition())
        .collect();
    Ok(HttpResponse::Ok().json(json!({
        "totalItems": items.len(),
        "items": items,
    })))
}

async fn create_collection(
    state: web::Data<ApiState>,
    caller: Caller,
    body: web::Json<CollectionDefinition>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&caller)?;
    let access = &caller.0;

    let descriptor = body
        .into_inner()
        .into_descriptor()
        .map_err(ApiError::for_caller(access))?;
    let created = state
        .store
        .create_collection(descriptor)
        .map_err(ApiError::for_caller(access))?;

    tracing::info!(
        collection = %created.name(),
        vector_enabled = created.is_vector_enabled(),
        "collection created"
    );
    Ok(HttpResponse::Ok().json(created.to_definition()))
}

async fn list_records(
    state: web::Data<ApiState>,
    caller: Caller,
    path: web::Path<String>,
    params: web::Query<LimitParams>,
) -> Result<HttpResponse, ApiError> {
    let collection = path.into_inner();
    let access = caller.0;

    let mut query = ListQuery::new(access.clone());
    if let Some(limit) = params.limit {
        query = query.with_limit(limit);
    }
    let records = state
        .store
        .list(&collection, &query)
        .map_err(ApiError::for_caller(&access))?;

    let items: Vec<Value> = records.iter().map(|r| r.export(&access)).collect();
    Ok(HttpResponse::Ok().json(json!({
        "totalItems": items.len(),
        "items": items,
    })))
}

async fn create_record(
    state: web::Data<ApiState>,
    caller: Caller,
    path: web::Path<String>,
    body: web::Json<Map<String, Value>>,
) -> Result<HttpResponse, ApiError> {
    require_authenticated(&caller)?;
    let collection = path.into_inner();
    let access = caller.0;

    let mut data = body.into_inner();
    let id = match data.remove("id") {
        None | Some(Value::Null) => None,
        Some(Value::String(id)) if !id.is_empty() => Some(RecordId::new(id)),
        Some(_) => {
            return Err(ApiError::new(
                Error::Validation("id must be a non-empty string".to_string()),
                &access,
            ))
        }
    };

    let outcome = state
        .store
        .create(&collection, id, data)
        .await
        .map_err(ApiError::for_caller(&access))?;
    let record = synced(outcome, &access)?;
    Ok(HttpResponse::Ok().json(record.export(&access)))
}

async fn update_record(
    state: web::Data<ApiState>,
    caller: Caller,
    path: web::Path<(String, String)>,
    body: web::Json<Map<String, Value>>,
) -> Result<HttpResponse, ApiError> {
    require_authenticated(&caller)?;
    let (collection, id) = path.into_inner();
    let access = caller.0;

    let outcome = state
        .store
        .update(&collection, &RecordId::new(id), body.into_inner())
        .await
        .map_err(ApiError::for_caller(&access))?;
    let record = synced(outcome, &access)?;
    Ok(HttpResponse::Ok().json(record.export(&access)))
}

async fn delete_record(
    state: web::Data<ApiState>,
    caller: Caller,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, ApiError> {
    require_authenticated(&caller)?;
    let (collection, id) = path.into_inner();
    let access = caller.0;

    state
        .store
        .delete(&collection, &RecordId::new(id))
        .await
        .map_err(ApiError::for_caller(&access))?;
    Ok(HttpResponse::NoContent().finish())
}

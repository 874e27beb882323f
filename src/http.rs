use crate::cors::CorsPolicy;
use crate::model::CounterResponse;
use crate::store::CounterStore;
use crate::store::StoreError;
use anyhow::anyhow;
use dropshot::endpoint;
use dropshot::ApiDescription;
use dropshot::ConfigDropshot;
use dropshot::HttpCodedResponse;
use dropshot::HttpError;
use dropshot::HttpResponseHeaders;
use dropshot::HttpResponseOk;
use dropshot::HttpServerStarter;
use dropshot::RequestContext;
use slog::error;
use slog::info;
use std::sync::Arc;

/// The server-wide context: the counter store and the CORS policy applied to
/// every response.
pub struct CounterContext {
    store: Arc<dyn CounterStore>,
    cors: CorsPolicy,
}

impl CounterContext {
    pub fn new(store: Arc<dyn CounterStore>, cors: CorsPolicy) -> CounterContext {
        CounterContext { store, cors }
    }
}

type CorsResponse<T> = HttpResponseHeaders<HttpResponseOk<T>>;

impl From<StoreError> for HttpError {
    fn from(value: StoreError) -> Self {
        let message = value.to_string();
        HttpError {
            status_code: http::StatusCode::INTERNAL_SERVER_ERROR,
            error_code: Some(value.error_code().to_string()),
            external_message: message.clone(),
            internal_message: message,
        }
    }
}

pub fn counter_api() -> Result<ApiDescription<CounterContext>, String> {
    let mut api = ApiDescription::new();
    api.register(api_get_counter)?;
    api.register(api_increment_counter)?;
    api.register(api_counter_preflight)?;
    api.register(api_increment_preflight)?;
    Ok(api)
}

pub async fn create_dropshot_server(
    config_dropshot: ConfigDropshot,
    log: slog::Logger,
    api_context: CounterContext,
) -> anyhow::Result<dropshot::HttpServer<CounterContext>> {
    let api = counter_api()
        .map_err(|error| anyhow!("registering endpoints: {}", error))?;

    Ok(HttpServerStarter::new(&config_dropshot, api, api_context, &log)
        .map_err(|error| anyhow!("creating Dropshot server: {:#}", error))?
        .start())
}

fn with_cors<T: HttpCodedResponse>(
    rqctx: &RequestContext<CounterContext>,
    body: T,
) -> HttpResponseHeaders<T> {
    let mut response = HttpResponseHeaders::new_unnamed(body);
    rqctx
        .context()
        .cors
        .decorate(rqctx.request.headers(), response.headers_mut());
    response
}

fn log_store_error(log: &slog::Logger, operation: &'static str, e: &StoreError) {
    error!(log, "counter store failed";
        "operation" => operation,
        "error_message" => %e);
}

/// Fetch the current value of the counter.
#[endpoint {
    method = GET,
    path = "/api/counter",
}]
async fn api_get_counter(
    rqctx: RequestContext<CounterContext>,
) -> Result<CorsResponse<CounterResponse>, HttpError> {
    let store = &rqctx.context().store;
    let count = store.read().await.map_err(|e| {
        log_store_error(&rqctx.log, "read", &e);
        e
    })?;
    Ok(with_cors(&rqctx, HttpResponseOk(CounterResponse::current(count))))
}

/// Add one to the counter and return the new value.
#[endpoint {
    method = POST,
    path = "/api/counter/increment",
}]
async fn api_increment_counter(
    rqctx: RequestContext<CounterContext>,
) -> Result<CorsResponse<CounterResponse>, HttpError> {
    let store = &rqctx.context().store;
    let count = store.increment().await.map_err(|e| {
        log_store_error(&rqctx.log, "increment", &e);
        e
    })?;
    info!(rqctx.log, "incremented counter"; "count" => count);
    Ok(with_cors(&rqctx, HttpResponseOk(CounterResponse::incremented(count))))
}

#[endpoint {
    method = OPTIONS,
    path = "/api/counter",
    unpublished = true,
}]
async fn api_counter_preflight(
    rqctx: RequestContext<CounterContext>,
) -> Result<CorsResponse<&'static str>, HttpError> {
    preflight(&rqctx)
}

#[endpoint {
    method = OPTIONS,
    path = "/api/counter/increment",
    unpublished = true,
}]
async fn api_increment_preflight(
    rqctx: RequestContext<CounterContext>,
) -> Result<CorsResponse<&'static str>, HttpError> {
    preflight(&rqctx)
}

fn preflight(
    rqctx: &RequestContext<CounterContext>,
) -> Result<CorsResponse<&'static str>, HttpError> {
    let headers = rqctx.context().cors.preflight(rqctx.request.headers())?;
    let mut response = HttpResponseHeaders::new_unnamed(HttpResponseOk("OK"));
    response.headers_mut().extend(headers);
    Ok(response)
}

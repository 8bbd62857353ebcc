use actix_web::{
    HttpRequest, HttpResponse, get, post, put,
    web::{self, Path},
};
use tokio::sync::watch;
use tracing::{Instrument, instrument};

use crate::{
    api::{
        events::event_stream,
        rest::{BudgetItemRequest, ItemsRequest, ItemsResponse, PopulationUpdateRequest, SeedResponse},
        state::AppState,
    },
    model::{
        apperror::{ApplicationError, ErrorType},
        models::{BudgetItem, EducationRecord, JobRecord, ReligionRecord, sum_amounts},
    },
};

/***************** Demographics *********************/

/**
 * Endpoint to retrieve the population totals.
 */
#[instrument(skip(http_request, app_state), fields(service = "getPopulation", trace_id = get_trace_id(&http_request)))]
#[get("/api/services/v1_0/demographics/population")]
pub async fn population_get(http_request: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let population = app_state.demographic_service.get_population_data().instrument(span).await;
    let Some(population) = population else {
        return Err(ApplicationError::new(ErrorType::NotFound, "Population data not found".to_string()));
    };
    Ok(HttpResponse::Ok().json(population))
}

/**
 * Endpoint to overwrite the population totals.
 */
#[instrument(skip(http_request, app_state, request_body), fields(service = "updatePopulation", trace_id = get_trace_id(&http_request)))]
#[put("/api/services/v1_0/demographics/population")]
pub async fn population_update(http_request: HttpRequest, request_body: web::Json<PopulationUpdateRequest>, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    app_state.jwt_service.validate_admin(&http_request)?;
    let request = request_body.into_inner();
    if !app_state.demographic_service.update_population_data(request.male, request.female).instrument(span).await {
        return Err(ApplicationError::new(ErrorType::DatabaseError, "Failed to update population data".to_string()));
    }
    Ok(HttpResponse::Ok().finish())
}

/**
 * Streams the population totals as server-sent events.
 */
#[instrument(skip(http_request, app_state), fields(service = "watchPopulation", trace_id = get_trace_id(&http_request)))]
#[get("/api/services/v1_0/demographics/population:watch")]
pub async fn population_watch(http_request: HttpRequest, app_state: web::Data<AppState>) -> HttpResponse {
    let (sender, receiver) = watch::channel(None);
    let subscription = app_state.demographic_service.subscribe_to_population_data(move |population| {
        sender.send_replace(Some(population));
    });
    event_stream(receiver, subscription)
}

/**
 * Endpoint to retrieve the residents per religion.
 */
#[instrument(skip(http_request, app_state), fields(service = "getReligions", trace_id = get_trace_id(&http_request), result))]
#[get("/api/services/v1_0/demographics/religions")]
pub async fn religions_get(http_request: HttpRequest, app_state: web::Data<AppState>) -> HttpResponse {
    let span = tracing::Span::current();
    let religions = app_state.demographic_service.get_religions_data().instrument(span.clone()).await;
    span.record("result", religions.len());
    HttpResponse::Ok().json(ItemsResponse::new(religions))
}

/**
 * Endpoint to replace the religion list.
 */
#[instrument(skip(http_request, app_state, request_body), fields(service = "updateReligions", trace_id = get_trace_id(&http_request)))]
#[put("/api/services/v1_0/demographics/religions")]
pub async fn religions_update(http_request: HttpRequest, request_body: web::Json<ItemsRequest<ReligionRecord>>, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    app_state.jwt_service.validate_admin(&http_request)?;
    if !app_state.demographic_service.update_religions_data(request_body.into_inner().items).instrument(span).await {
        return Err(ApplicationError::new(ErrorType::DatabaseError, "Failed to update religions data".to_string()));
    }
    Ok(HttpResponse::Ok().finish())
}

#[instrument(skip(http_request, app_state), fields(service = "watchReligions", trace_id = get_trace_id(&http_request)))]
#[get("/api/services/v1_0/demographics/religions:watch")]
pub async fn religions_watch(http_request: HttpRequest, app_state: web::Data<AppState>) -> HttpResponse {
    let (sender, receiver) = watch::channel(None);
    let subscription = app_state.demographic_service.subscribe_to_religions_data(move |religions| {
        sender.send_replace(Some(ItemsResponse::new(religions)));
    });
    event_stream(receiver, subscription)
}

/**
 * Endpoint to retrieve the residents per occupation.
 */
#[instrument(skip(http_request, app_state), fields(service = "getJobs", trace_id = get_trace_id(&http_request), result))]
#[get("/api/services/v1_0/demographics/jobs")]
pub async fn jobs_get(http_request: HttpRequest, app_state: web::Data<AppState>) -> HttpResponse {
    let span = tracing::Span::current();
    let jobs = app_state.demographic_service.get_jobs_data().instrument(span.clone()).await;
    span.record("result", jobs.len());
    HttpResponse::Ok().json(ItemsResponse::new(jobs))
}

#[instrument(skip(http_request, app_state, request_body), fields(service = "updateJobs", trace_id = get_trace_id(&http_request)))]
#[put("/api/services/v1_0/demographics/jobs")]
pub async fn jobs_update(http_request: HttpRequest, request_body: web::Json<ItemsRequest<JobRecord>>, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    app_state.jwt_service.validate_admin(&http_request)?;
    if !app_state.demographic_service.update_jobs_data(request_body.into_inner().items).instrument(span).await {
        return Err(ApplicationError::new(ErrorType::DatabaseError, "Failed to update jobs data".to_string()));
    }
    Ok(HttpResponse::Ok().finish())
}

#[instrument(skip(http_request, app_state), fields(service = "watchJobs", trace_id = get_trace_id(&http_request)))]
#[get("/api/services/v1_0/demographics/jobs:watch")]
pub async fn jobs_watch(http_request: HttpRequest, app_state: web::Data<AppState>) -> HttpResponse {
    let (sender, receiver) = watch::channel(None);
    let subscription = app_state.demographic_service.subscribe_to_jobs_data(move |jobs| {
        sender.send_replace(Some(ItemsResponse::new(jobs)));
    });
    event_stream(receiver, subscription)
}

/**
 * Endpoint to retrieve the residents per education level.
 */
#[instrument(skip(http_request, app_state), fields(service = "getEducation", trace_id = get_trace_id(&http_request), result))]
#[get("/api/services/v1_0/demographics/education")]
pub async fn education_get(http_request: HttpRequest, app_state: web::Data<AppState>) -> HttpResponse {
    let span = tracing::Span::current();
    let education = app_state.demographic_service.get_education_data().instrument(span.clone()).await;
    span.record("result", education.len());
    HttpResponse::Ok().json(ItemsResponse::new(education))
}

#[instrument(skip(http_request, app_state, request_body), fields(service = "updateEducation", trace_id = get_trace_id(&http_request)))]
#[put("/api/services/v1_0/demographics/education")]
pub async fn education_update(http_request: HttpRequest, request_body: web::Json<ItemsRequest<EducationRecord>>, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    app_state.jwt_service.validate_admin(&http_request)?;
    if !app_state.demographic_service.update_education_data(request_body.into_inner().items).instrument(span).await {
        return Err(ApplicationError::new(ErrorType::DatabaseError, "Failed to update education data".to_string()));
    }
    Ok(HttpResponse::Ok().finish())
}

#[instrument(skip(http_request, app_state), fields(service = "watchEducation", trace_id = get_trace_id(&http_request)))]
#[get("/api/services/v1_0/demographics/education:watch")]
pub async fn education_watch(http_request: HttpRequest, app_state: web::Data<AppState>) -> HttpResponse {
    let (sender, receiver) = watch::channel(None);
    let subscription = app_state.demographic_service.subscribe_to_education_data(move |education| {
        sender.send_replace(Some(ItemsResponse::new(education)));
    });
    event_stream(receiver, subscription)
}

/**
 * Endpoint to seed the demographic documents once.
 */
#[instrument(skip(http_request, app_state), fields(service = "initializeDemographics", trace_id = get_trace_id(&http_request)))]
#[post("/api/services/v1_0/demographics:initialize")]
pub async fn demographics_initialize(http_request: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    app_state.jwt_service.validate_admin(&http_request)?;
    let outcome = app_state.demographic_service.initialize_demographic_data().instrument(span).await;
    Ok(HttpResponse::Ok().json(SeedResponse::try_from(outcome)?))
}

/***************** Budget *********************/

/**
 * Endpoint to retrieve the revenue lines of a year.
 */
#[instrument(skip(http_request, app_state), fields(service = "getRevenue", trace_id = get_trace_id(&http_request), result))]
#[get("/api/services/v1_0/budget/{year}/revenue")]
pub async fn revenue_get(path: Path<i32>, http_request: HttpRequest, app_state: web::Data<AppState>) -> HttpResponse {
    let span = tracing::Span::current();
    let revenue = app_state.budget_service.get_revenue_data(path.into_inner()).instrument(span.clone()).await;
    span.record("result", revenue.len());
    HttpResponse::Ok().json(ItemsResponse::new(revenue))
}

/**
 * Endpoint to replace the revenue lines of a year. Rewrites the summary.
 */
#[instrument(skip(http_request, app_state, request_body), fields(service = "updateRevenue", trace_id = get_trace_id(&http_request)))]
#[put("/api/services/v1_0/budget/{year}/revenue")]
pub async fn revenue_update(path: Path<i32>, http_request: HttpRequest, request_body: web::Json<ItemsRequest<BudgetItemRequest>>, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    app_state.jwt_service.validate_admin(&http_request)?;
    let year = path.into_inner();
    let items = budget_items(year, request_body.into_inner())?;
    if !app_state.budget_service.update_revenue_data(year, items).instrument(span).await {
        return Err(ApplicationError::new(ErrorType::DatabaseError, format!("Failed to update revenue data for {year}")));
    }
    Ok(HttpResponse::Ok().finish())
}

#[instrument(skip(http_request, app_state), fields(service = "watchRevenue", trace_id = get_trace_id(&http_request)))]
#[get("/api/services/v1_0/budget/{year}/revenue:watch")]
pub async fn revenue_watch(path: Path<i32>, http_request: HttpRequest, app_state: web::Data<AppState>) -> HttpResponse {
    let (sender, receiver) = watch::channel(None);
    let subscription = app_state.budget_service.subscribe_to_revenue_data(path.into_inner(), move |revenue| {
        sender.send_replace(Some(ItemsResponse::new(revenue)));
    });
    event_stream(receiver, subscription)
}

/**
 * Endpoint to retrieve the expenditure lines of a year.
 */
#[instrument(skip(http_request, app_state), fields(service = "getExpenditure", trace_id = get_trace_id(&http_request), result))]
#[get("/api/services/v1_0/budget/{year}/expenditure")]
pub async fn expenditure_get(path: Path<i32>, http_request: HttpRequest, app_state: web::Data<AppState>) -> HttpResponse {
    let span = tracing::Span::current();
    let expenditure = app_state.budget_service.get_expenditure_data(path.into_inner()).instrument(span.clone()).await;
    span.record("result", expenditure.len());
    HttpResponse::Ok().json(ItemsResponse::new(expenditure))
}

#[instrument(skip(http_request, app_state, request_body), fields(service = "updateExpenditure", trace_id = get_trace_id(&http_request)))]
#[put("/api/services/v1_0/budget/{year}/expenditure")]
pub async fn expenditure_update(path: Path<i32>, http_request: HttpRequest, request_body: web::Json<ItemsRequest<BudgetItemRequest>>, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    app_state.jwt_service.validate_admin(&http_request)?;
    let year = path.into_inner();
    let items = budget_items(year, request_body.into_inner())?;
    if !app_state.budget_service.update_expenditure_data(year, items).instrument(span).await {
        return Err(ApplicationError::new(ErrorType::DatabaseError, format!("Failed to update expenditure data for {year}")));
    }
    Ok(HttpResponse::Ok().finish())
}

#[instrument(skip(http_request, app_state), fields(service = "watchExpenditure", trace_id = get_trace_id(&http_request)))]
#[get("/api/services/v1_0/budget/{year}/expenditure:watch")]
pub async fn expenditure_watch(path: Path<i32>, http_request: HttpRequest, app_state: web::Data<AppState>) -> HttpResponse {
    let (sender, receiver) = watch::channel(None);
    let subscription = app_state.budget_service.subscribe_to_expenditure_data(path.into_inner(), move |expenditure| {
        sender.send_replace(Some(ItemsResponse::new(expenditure)));
    });
    event_stream(receiver, subscription)
}

/**
 * Endpoint to retrieve the summary of a year.
 */
#[instrument(skip(http_request, app_state), fields(service = "getBudgetSummary", trace_id = get_trace_id(&http_request)))]
#[get("/api/services/v1_0/budget/{year}/summary")]
pub async fn summary_get(path: Path<i32>, http_request: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let year = path.into_inner();
    let Some(summary) = app_state.budget_service.get_budget_summary(year).instrument(span).await else {
        return Err(ApplicationError::new(ErrorType::NotFound, format!("Budget summary for {year} not found")));
    };
    Ok(HttpResponse::Ok().json(summary))
}

#[instrument(skip(http_request, app_state), fields(service = "watchBudgetSummary", trace_id = get_trace_id(&http_request)))]
#[get("/api/services/v1_0/budget/{year}/summary:watch")]
pub async fn summary_watch(path: Path<i32>, http_request: HttpRequest, app_state: web::Data<AppState>) -> HttpResponse {
    let (sender, receiver) = watch::channel(None);
    let subscription = app_state.budget_service.subscribe_to_budget_summary(path.into_inner(), move |summary| {
        sender.send_replace(Some(summary));
    });
    event_stream(receiver, subscription)
}

/**
 * Endpoint to seed the budget documents of a year once.
 */
#[instrument(skip(http_request, app_state), fields(service = "initializeBudget", trace_id = get_trace_id(&http_request)))]
#[post("/api/services/v1_0/budget/{year}:initialize")]
pub async fn budget_initialize(path: Path<i32>, http_request: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    app_state.jwt_service.validate_admin(&http_request)?;
    let outcome = app_state.budget_service.initialize_budget_data(path.into_inner()).instrument(span).await;
    Ok(HttpResponse::Ok().json(SeedResponse::try_from(outcome)?))
}

/**
 * Converts the request lines to items of `year`. A list whose total is out of range is rejected.
 */
fn budget_items(year: i32, request: ItemsRequest<BudgetItemRequest>) -> Result<Vec<BudgetItem>, ApplicationError> {
    let items: Vec<BudgetItem> = request.items.into_iter().map(|item| BudgetItem::from((item, year))).collect();
    sum_amounts(&items)?;
    Ok(items)
}

/**
 * Registers the demographic and budget endpoints.
 */
pub fn configure(config: &mut web::ServiceConfig) {
    config
        .service(population_get)
        .service(population_update)
        .service(population_watch)
        .service(religions_get)
        .service(religions_update)
        .service(religions_watch)
        .service(jobs_get)
        .service(jobs_update)
        .service(jobs_watch)
        .service(education_get)
        .service(education_update)
        .service(education_watch)
        .service(demographics_initialize)
        .service(revenue_get)
        .service(revenue_update)
        .service(revenue_watch)
        .service(expenditure_get)
        .service(expenditure_update)
        .service(expenditure_watch)
        .service(summary_get)
        .service(summary_watch)
        .service(budget_initialize);
}

/**
 * Retrieves the trace ID from the HTTP request headers.
 * If the trace ID is not present, a new UUID is generated.
 */
pub(crate) fn get_trace_id(http_request: &HttpRequest) -> String {
    http_request.headers().get("X-Trace-ID").and_then(|v| v.to_str().ok().map(std::string::ToString::to_string)).unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

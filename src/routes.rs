use crate::auth::{acting_user, check_authorization_level, AuthConfig, AuthorizationLevel};
use crate::error::LedgerError;
use crate::ledger;
use crate::profile::ensure_profile;
use crate::schemas::{ExpenseFilter, ExpenseRequest, PaymentRequest, UserId};
use crate::store::ExpenseStore;
use actix_web::error::InternalError;
use actix_web::{get, post, web, HttpRequest, HttpResponse};
use serde::Serialize;
use std::sync::Arc;
use tracing::error;

pub struct AppState {
    pub store: Arc<dyn ExpenseStore>,
    pub auth: AuthConfig,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ErrorBody {
    fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

fn error_response(err: &LedgerError) -> HttpResponse {
    let body = ErrorBody::new(err.to_string());
    match err {
        LedgerError::Validation(_) => HttpResponse::BadRequest().json(body),
        LedgerError::Integrity(_) => {
            error!(error = %err, "ledger is inconsistent");
            HttpResponse::Conflict().json(body)
        }
        LedgerError::Persistence(_) => {
            error!(error = %err, "store request failed");
            HttpResponse::InternalServerError().json(body)
        }
    }
}

fn unauthorized(message: &str) -> HttpResponse {
    HttpResponse::Unauthorized().json(ErrorBody::new(message))
}

/// Resolves the user a request acts for. Logged-in users get their profile
/// created on their first request.
async fn authenticate(request: &HttpRequest, state: &AppState) -> Result<UserId, HttpResponse> {
    let level = check_authorization_level(request, &state.auth)
        .ok_or_else(|| unauthorized("missing or invalid authorization"))?;
    if let AuthorizationLevel::Frontend(user) = &level {
        ensure_profile(state.store.as_ref(), user)
            .await
            .map_err(|err| error_response(&err))?;
    }
    acting_user(request, &level).ok_or_else(|| unauthorized("no acting user given"))
}

#[post("/expenses/preview")]
async fn preview_expense(
    request: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<ExpenseRequest>,
) -> HttpResponse {
    if let Err(response) = authenticate(&request, &state).await {
        return response;
    }
    match ledger::preview_split(&body) {
        Ok(shares) => HttpResponse::Ok().json(shares),
        Err(err) => error_response(&err),
    }
}

#[post("/expenses")]
async fn add_expense(
    request: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<ExpenseRequest>,
) -> HttpResponse {
    let user = match authenticate(&request, &state).await {
        Ok(user) => user,
        Err(response) => return response,
    };
    match ledger::create_expense(state.store.as_ref(), &user, body.into_inner()).await {
        Ok(expense) => HttpResponse::Ok().json(expense),
        Err(err) => error_response(&err),
    }
}

#[get("/expenses")]
async fn list_expenses(
    request: HttpRequest,
    state: web::Data<AppState>,
    filter: web::Query<ExpenseFilter>,
) -> HttpResponse {
    let user = match authenticate(&request, &state).await {
        Ok(user) => user,
        Err(response) => return response,
    };
    match ledger::expenses_for(state.store.as_ref(), &user, &filter).await {
        Ok(expenses) => HttpResponse::Ok().json(expenses),
        Err(err) => error_response(&err),
    }
}

#[get("/balances")]
async fn get_balances(request: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    let user = match authenticate(&request, &state).await {
        Ok(user) => user,
        Err(response) => return response,
    };
    match ledger::balances_for(state.store.as_ref(), &user).await {
        Ok(balances) => HttpResponse::Ok().json(balances),
        Err(err) => error_response(&err),
    }
}

#[get("/settlements")]
async fn get_settlements(request: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    if let Err(response) = authenticate(&request, &state).await {
        return response;
    }
    match ledger::settlement_plan(state.store.as_ref()).await {
        Ok(plan) => HttpResponse::Ok().json(plan),
        Err(err) => error_response(&err),
    }
}

#[post("/payments")]
async fn add_payment(
    request: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<PaymentRequest>,
) -> HttpResponse {
    let user = match authenticate(&request, &state).await {
        Ok(user) => user,
        Err(response) => return response,
    };
    match ledger::record_payment(state.store.as_ref(), &user, body.into_inner()).await {
        Ok(payment) => HttpResponse::Ok().json(payment),
        Err(err) => error_response(&err),
    }
}

#[get("/profile")]
async fn get_profile(request: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    let user = match authenticate(&request, &state).await {
        Ok(user) => user,
        Err(response) => return response,
    };
    match state.store.get_profile(&user).await {
        Ok(Some(profile)) => HttpResponse::Ok().json(profile),
        Ok(None) => HttpResponse::NotFound().json(ErrorBody::new("Couldn't find the profile")),
        Err(err) => error_response(&err),
    }
}

#[get("/users")]
async fn list_users(request: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    if let Err(response) = authenticate(&request, &state).await {
        return response;
    }
    match state.store.list_profiles().await {
        Ok(profiles) => HttpResponse::Ok().json(profiles),
        Err(err) => error_response(&err),
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    let json_config = web::JsonConfig::default().error_handler(|err, _| {
        let response = HttpResponse::BadRequest().json(ErrorBody::new(err.to_string()));
        InternalError::from_response(err, response).into()
    });
    let query_config = web::QueryConfig::default().error_handler(|err, _| {
        let response = HttpResponse::BadRequest().json(ErrorBody::new(err.to_string()));
        InternalError::from_response(err, response).into()
    });

    cfg.app_data(json_config)
        .app_data(query_config)
        .service(preview_expense)
        .service(add_expense)
        .service(list_expenses)
        .service(get_balances)
        .service(get_settlements)
        .service(add_payment)
        .service(get_profile)
        .service(list_users);
}

use rocket::{
    http::Status,
    serde::json::{json, Json, Value},
    Catcher, Request, Route,
};

use crate::error::ErrorBody;

pub mod admin;
pub mod auth;
pub mod results;
pub mod voters;
pub mod votes;

pub fn routes() -> Vec<Route> {
    let mut routes = routes![health];
    routes.extend(admin::routes());
    routes.extend(auth::routes());
    routes.extend(results::routes());
    routes.extend(voters::routes());
    routes.extend(votes::routes());
    routes
}

/// JSON bodies for failures that never reach a handler, such as rejected
/// auth tokens or malformed request bodies.
pub fn catchers() -> Vec<Catcher> {
    catchers![
        bad_request,
        unauthorized,
        forbidden,
        not_found,
        unprocessable,
        internal_error
    ]
}

#[get("/health")]
fn health() -> Json<Value> {
    Json(json!({ "ok": true }))
}

fn caught(kind: &str, status: Status, req: &Request) -> Json<ErrorBody> {
    Json(ErrorBody::new(
        kind,
        format!("{} {}: {}", req.method(), req.uri().path(), status.reason_lossy()),
    ))
}

#[catch(400)]
fn bad_request(req: &Request) -> Json<ErrorBody> {
    caught("ValidationError", Status::BadRequest, req)
}

#[catch(401)]
fn unauthorized(req: &Request) -> Json<ErrorBody> {
    caught("Unauthorized", Status::Unauthorized, req)
}

#[catch(403)]
fn forbidden(req: &Request) -> Json<ErrorBody> {
    caught("Forbidden", Status::Forbidden, req)
}

#[catch(404)]
fn not_found(req: &Request) -> Json<ErrorBody> {
    caught("NotFound", Status::NotFound, req)
}

#[catch(422)]
fn unprocessable(req: &Request) -> Json<ErrorBody> {
    caught("ValidationError", Status::UnprocessableEntity, req)
}

#[catch(500)]
fn internal_error(req: &Request) -> Json<ErrorBody> {
    caught("InternalError", Status::InternalServerError, req)
}

use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicUsize, Ordering};

use log::{error, info, warn};
use rocket::{
    fairing::{Fairing, Info, Kind},
    http::StatusClass,
    request::{FromRequest, Outcome},
    tokio::sync::broadcast::{error::RecvError, Receiver},
    Data, Orbit, Request, Response, Rocket,
};

use crate::backend::Backend;
use crate::model::event::VoteCast;

/// Identifies one request across its request and response log lines.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub struct RequestId(pub usize);

impl Display for RequestId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl RequestId {
    /// The next id. Wraps around on overflow.
    pub fn next() -> RequestId {
        static NEXT_REQUEST_ID: AtomicUsize = AtomicUsize::new(0);
        RequestId(NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for &'r RequestId {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        Outcome::Success(req.local_cache(RequestId::next))
    }
}

/// Logs every request and response, and every committed vote once the
/// server is running.
#[derive(Debug, Copy, Clone)]
pub struct LoggerFairing;

#[rocket::async_trait]
impl Fairing for LoggerFairing {
    fn info(&self) -> Info {
        Info {
            name: "Logger",
            kind: Kind::Liftoff | Kind::Request | Kind::Response | Kind::Shutdown,
        }
    }

    async fn on_liftoff(&self, rocket: &Rocket<Orbit>) {
        let config = rocket.config();
        let protocol = if config.tls_enabled() { "https" } else { "http" };
        info!(
            "Ballot service listening on {protocol}://{}:{}",
            config.address, config.port
        );

        match rocket.state::<Backend>() {
            Some(backend) => {
                rocket::tokio::spawn(log_vote_events(backend.events.subscribe()));
            }
            None => warn!("No backend managed; vote events will not be logged"),
        }
    }

    async fn on_request(&self, req: &mut Request<'_>, _data: &mut Data<'_>) {
        let id = req.local_cache(RequestId::next);
        info!("->req{id} {} {}", req.method(), req.uri());
    }

    async fn on_response<'r>(&self, req: &'r Request<'_>, res: &mut Response<'r>) {
        let id = req.local_cache(RequestId::next);
        let status = res.status();
        let route = match req.route() {
            Some(route) => match route.name {
                Some(ref name) => format!("{name} ({})", route.uri),
                None => route.uri.to_string(),
            },
            None => "UNKNOWN ROUTE".to_string(),
        };
        match status.class() {
            StatusClass::ServerError => error!("<-rsp{id} {status} {route}"),
            StatusClass::ClientError => warn!("<-rsp{id} {status} {route}"),
            _ => info!("<-rsp{id} {status} {route}"),
        }
    }

    async fn on_shutdown(&self, _rocket: &Rocket<Orbit>) {
        warn!("Shutdown requested, stopping gracefully...");
    }
}

/// Log each committed vote until the event bus closes.
async fn log_vote_events(mut events: Receiver<VoteCast>) {
    loop {
        match events.recv().await {
            Ok(event) => info!(
                "Vote for {} committed: {} for candidate, {} in total",
                event.candidate_id, event.candidate_votes, event.aggregate_total
            ),
            Err(RecvError::Lagged(missed)) => {
                warn!("Vote event logger fell behind; {missed} event(s) not logged")
            }
            Err(RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::events::EventBus;

    #[test]
    fn request_ids_increase() {
        let first = RequestId::next();
        let second = RequestId::next();
        assert!(second > first);
        assert_eq!(first.to_string(), first.0.to_string());
    }

    #[rocket::async_test]
    async fn vote_logger_stops_when_the_bus_closes() {
        log4rs_test_utils::test_logging::init_logging_once_for(["evote_backend"], None, None);

        let bus = EventBus::new(4);
        let logger = rocket::tokio::spawn(log_vote_events(bus.subscribe()));
        bus.publish(VoteCast {
            voter_id: None,
            candidate_id: "C1".to_string(),
            candidate_votes: 1,
            aggregate_total: 1,
            timestamp: Utc::now(),
        });
        drop(bus);
        logger.await.unwrap();
    }
}

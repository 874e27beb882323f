use crate::DbConnection;
use anyhow::Context;
use slog::error;

pub type DbPool = bb8::Pool<async_bb8_diesel::ConnectionManager<DbConnection>>;

pub async fn create_pool(
    log: slog::Logger,
    db_url: &str,
    max_size: u32,
) -> anyhow::Result<DbPool> {
    let error_sink = LoggingErrorSink::new(log, pool_target(db_url));
    let manager = async_bb8_diesel::ConnectionManager::new(db_url);
    bb8::Builder::new()
        .error_sink(Box::new(error_sink))
        .max_size(max_size)
        .build(manager)
        .await
        .context("building pool")
}

/// Host, port and database of a connection string, without the scheme,
/// credentials or query parameters, so it can be logged.
fn pool_target(db_url: &str) -> String {
    let rest = db_url.split_once("://").map_or(db_url, |(_, rest)| rest);
    let rest = rest.split_once('?').map_or(rest, |(before, _)| before);
    let (authority, path) = rest.split_once('/').unwrap_or((rest, ""));
    let host = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
    if path.is_empty() {
        host.to_string()
    } else {
        format!("{}/{}", host, path)
    }
}

// LoggingErrorSink is cribbed from Omicron
#[derive(Clone, Debug)]
struct LoggingErrorSink {
    log: slog::Logger,
    target: String,
}

impl LoggingErrorSink {
    fn new(log: slog::Logger, target: String) -> LoggingErrorSink {
        LoggingErrorSink { log, target }
    }
}

impl bb8::ErrorSink<async_bb8_diesel::ConnectionError> for LoggingErrorSink {
    fn sink(&self, error: async_bb8_diesel::ConnectionError) {
        error!(
            &self.log,
            "counter database connection error";
            "db_target" => &self.target,
            "error_message" => #%error
        );
    }

    fn boxed_clone(
        &self,
    ) -> Box<dyn bb8::ErrorSink<async_bb8_diesel::ConnectionError>> {
        Box::new(self.clone())
    }
}

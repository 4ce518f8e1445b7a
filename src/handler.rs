use async_trait::async_trait;
use tokio::net::tcp::OwnedWriteHalf;

use crate::request::Request;
use crate::response::ResponseWriter;

/// Write half of an accepted connection, as handed to [`Handler::handle`].
pub type ConnectionWriter = OwnedWriteHalf;

/// Application entry point: one call per parsed request.
///
/// A handler drives the writer through any sequence its state machine
/// allows; the server flushes and closes the connection afterwards, so
/// handlers never touch the connection itself. A panicking handler takes
/// down only its own connection task.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn handle(&self, request: Request, response: &mut ResponseWriter<ConnectionWriter>);
}

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use pico_http::{
    serve, ConnectionWriter, Handler, Headers, Request, ResponseWriter, StatusCode, WriteError,
};

const PORT: u16 = 42069;

const SUCCESS_PAGE: &str = "<html>
  <head>
    <title>200 OK</title>
  </head>
  <body>
    <h1>Success!</h1>
    <p>Your request was an absolute banger.</p>
  </body>
</html>";

const BAD_REQUEST_PAGE: &str = "<html>
  <head>
    <title>400 Bad Request</title>
  </head>
  <body>
    <h1>Bad Request</h1>
    <p>Your request honestly kinda sucked.</p>
  </body>
</html>";

const SERVER_ERROR_PAGE: &str = "<html>
  <head>
    <title>500 Internal Server Error</title>
  </head>
  <body>
    <h1>Internal Server Error</h1>
    <p>Okay, you know what? This one is on me.</p>
  </body>
</html>";

struct DemoHandler;

#[async_trait]
impl Handler for DemoHandler {
    async fn handle(&self, request: Request, response: &mut ResponseWriter<ConnectionWriter>) {
        let result = match request.request_line.request_target.as_str() {
            "/yourproblem" => page(response, StatusCode::BAD_REQUEST, BAD_REQUEST_PAGE),
            "/myproblem" => page(response, StatusCode::INTERNAL_SERVER_ERROR, SERVER_ERROR_PAGE),
            "/chunked" => coffee_stream(response).await,
            _ => page(response, StatusCode::OK, SUCCESS_PAGE),
        };

        if let Err(e) = result {
            error!(cause = %e, "handler failed to write response");
        }
    }
}

fn page(
    response: &mut ResponseWriter<ConnectionWriter>,
    status: StatusCode,
    body: &str,
) -> Result<(), WriteError> {
    response.write_status(status)?;

    let mut headers = Headers::new();
    headers.set("Content-Type", "text/html; charset=utf-8");
    headers.set("Connection", "close");
    response.write_headers(headers)?;

    response.write_body(body.as_bytes())?;
    Ok(())
}

/// Chunked demo route: streams a few lines and closes with a trailer
/// carrying the total payload length.
async fn coffee_stream(response: &mut ResponseWriter<ConnectionWriter>) -> Result<(), WriteError> {
    response.write_status(StatusCode::OK)?;

    let mut headers = Headers::new();
    headers.set("Content-Type", "text/plain");
    headers.set("Transfer-Encoding", "chunked");
    headers.set("Trailer", "X-Total-Length");
    headers.set("Connection", "close");
    response.write_headers(headers)?;

    let mut total = 0;
    for line in [
        "I could go for a cup of coffee\n",
        "But not Java\n",
        "Never go full Java\n",
    ] {
        total += response.write_chunked_body(line.as_bytes()).await?;
    }
    response.write_chunked_body_done().await?;

    let mut trailers = Headers::new();
    trailers.set("X-Total-Length", &total.to_string());
    response.write_trailers(trailers).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;

    let server = serve(PORT, Arc::new(DemoHandler))
        .await
        .context("failed to start server")?;
    info!(port = PORT, "serving http on localhost");

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = sigint.recv() => {}
        _ = sigterm.recv() => {}
    }

    server.close();
    info!("server gracefully shutting down");
    Ok(())
}

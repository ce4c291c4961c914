use super::pipeline::BuildContext;
use anyhow::{Context, Result};
use axum::{
    Router,
    extract::State,
    http::header,
    response::{
        IntoResponse,
        sse::{Event, KeepAlive, Sse},
    },
    routing::get,
};
use log::{error, info};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::broadcast::{self, error::RecvError};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

/// Served at `/livereload.js`; reloads the page on every `/_reload` event.
const CLIENT_SCRIPT: &str = r#"(function () {
  var origin = document.currentScript ? document.currentScript.src : location.href;
  var source = new EventSource(new URL('/_reload', origin));
  source.onmessage = function () {
    location.reload();
  };
  source.onerror = function () {
    console.log('[sitekit] live reload disconnected');
    source.close();
  };
})();
"#;

/// Addresses the servers actually bound to
#[derive(Debug, Clone, Copy)]
pub struct Servers {
    pub site: SocketAddr,
    pub livereload: SocketAddr,
}

/// Start the site and live-reload servers in the background.
///
/// Returns once both listeners are bound, so the task can continue with
/// the watcher.
pub async fn start(ctx: &BuildContext) -> Result<Servers> {
    let build_dir = ctx.config.build_dir(&ctx.root);

    // build output first, project root (components, sources) second
    let site = Router::new()
        .fallback_service(ServeDir::new(&build_dir).fallback(ServeDir::new(&ctx.root)));

    let livereload = Router::new()
        .route("/livereload.js", get(client_script))
        .route("/_reload", get(sse_handler))
        .layer(CorsLayer::permissive())
        .with_state(ctx.reload.clone());

    let servers = Servers {
        site: spawn_server("site", ctx.config.port, site).await?,
        livereload: spawn_server("livereload", ctx.config.livereload, livereload).await?,
    };

    println!("\n🚀 Site ready at: http://localhost:{}", servers.site.port());
    println!("   Live reload on port {}", servers.livereload.port());
    println!("   Press Ctrl+C to stop");

    Ok(servers)
}

async fn spawn_server(name: &'static str, port: u16, app: Router) -> Result<SocketAddr> {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {} server to port {}", name, port))?;
    let local = listener.local_addr()?;
    info!("{} server listening on {}", name, local);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("{} server error: {}", name, e);
        }
    });

    Ok(local)
}

async fn client_script() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/javascript")],
        CLIENT_SCRIPT,
    )
}

/// SSE endpoint for live reload
async fn sse_handler(
    State(reload_tx): State<broadcast::Sender<()>>,
) -> Sse<impl futures::Stream<Item = Result<Event, std::convert::Infallible>>> {
    let mut rx = reload_tx.subscribe();

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(()) => yield Ok(Event::default().data("reload")),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

//! Liveness endpoint for hosting platforms
//!
//! Runs on its own OS thread with its own single-threaded runtime.

use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, StatusCode};
use std::convert::Infallible;
use std::net::{SocketAddr, TcpListener};
use std::thread::JoinHandle;
use tokio::sync::oneshot;

pub const ALIVE_BODY: &str = "Bot is alive and fast!";

/// Static "I am up" responder
pub struct HealthServer;

impl HealthServer {
    /// Bind `addr` and start serving
    pub fn bind(addr: SocketAddr) -> crate::Result<HealthHandle> {
        let listener = TcpListener::bind(addr)?;
        Self::spawn(listener)
    }

    /// Serve on an already bound listener
    pub fn spawn(listener: TcpListener) -> crate::Result<HealthHandle> {
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let thread = std::thread::Builder::new()
            .name("health".to_string())
            .spawn(move || serve(listener, shutdown_rx))?;

        log::info!("Health check listening on {}", local_addr);
        Ok(HealthHandle {
            local_addr,
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        })
    }
}

fn serve(listener: TcpListener, shutdown: oneshot::Receiver<()>) {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            log::error!("Health runtime failed to start: {}", e);
            return;
        }
    };

    runtime.block_on(async move {
        let builder = match hyper::Server::from_tcp(listener) {
            Ok(builder) => builder,
            Err(e) => {
                log::error!("Health server failed to start: {}", e);
                return;
            }
        };

        let make_svc = make_service_fn(|_conn| async { Ok::<_, Infallible>(service_fn(handle)) });
        let server = builder.serve(make_svc).with_graceful_shutdown(async {
            let _ = shutdown.await;
        });

        if let Err(e) = server.await {
            log::error!("Health server error: {}", e);
        }
    });
}

async fn handle(req: Request<Body>) -> Result<Response<Body>, Infallible> {
    // Health checks arrive every few seconds; keep them out of normal logs
    log::trace!("{} {}", req.method(), req.uri().path());

    let response = match *req.method() {
        Method::GET | Method::HEAD => Response::new(Body::from(ALIVE_BODY)),
        _ => {
            let mut response = Response::new(Body::from("Method Not Allowed"));
            *response.status_mut() = StatusCode::METHOD_NOT_ALLOWED;
            response
        }
    };
    Ok(response)
}

/// Running liveness worker. Dropping it stops the server without waiting.
pub struct HealthHandle {
    local_addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl HealthHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting requests and wait for the worker thread to exit
    pub fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("Health thread panicked");
            }
        }
    }
}

impl Drop for HealthHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

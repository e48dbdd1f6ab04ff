//! Minimal stackware example — a header-gated profiling wrap around a
//! trivially slow handler.
//!
//! Run with:
//!   RUST_LOG=debug cargo run --example basic
//!
//! Requests carrying `x-profile: 1` are sampled; the third profiled
//! request writes a dump under `tmp/` (save_every = 3). The final
//! administrative flush shows the out-of-band entry point.

use stackware::{Config, Middleware, Request, Response};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let app = Middleware::new(
        busy_handler,
        Config::new()
            .interval(500)
            .save_every(3)
            .enabled_when(|req: &Request| req.header("x-profile").is_some()),
    );

    for i in 0..6 {
        let req = if i % 2 == 0 {
            Request::get("/work").with_header("x-profile", "1")
        } else {
            Request::get("/work")
        };
        let response = app.call(req).await.expect("request cycle failed");
        println!("request {i}: {}", response.status_code());
    }

    // out-of-band flush against the active configuration
    Middleware::save(None).expect("final flush failed");
    println!("dumps land under {}", Middleware::path().display());
}

// Burns a little CPU so the sampler has something to see.
async fn busy_handler(_req: Request) -> Response {
    let mut acc = 0u64;
    for i in 0..2_000_000u64 {
        acc = acc.wrapping_mul(31).wrapping_add(i);
    }
    Response::text(format!("done: {acc}"))
}

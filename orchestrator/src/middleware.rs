// Browser clients talk to the API and WebSocket from another origin

pub fn cors() -> warp::cors::Builder {
    warp::cors()
        .allow_any_origin()
        .allow_headers(vec![
            "Origin",
            "Accept",
            "Content-Type",
            "Content-Length",
            "Access-Control-Request-Method",
            "Access-Control-Request-Headers",
            "Sec-WebSocket-Protocol",
        ])
        .allow_methods(vec!["GET", "POST", "OPTIONS"])
}

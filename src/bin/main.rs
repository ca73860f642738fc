#[cfg(not(target_arch = "wasm32"))]
mod native {
    extern crate mesh;

    use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
    use mesh::core::db::{seed_demo_data, MemoryStore};
    use tracing::{info, warn};
    use tracing_subscriber::{fmt, EnvFilter};

    mod adapter {
        use actix_web::HttpRequest;
        use spin_sdk::http::{Method, Request};

        pub fn actix_to_spin_request(req: &HttpRequest, body: actix_web::web::Bytes) -> Request {
            let method = match req.method().as_str() {
                "GET" => Method::Get,
                "POST" => Method::Post,
                "PUT" => Method::Put,
                "DELETE" => Method::Delete,
                "HEAD" => Method::Head,
                "OPTIONS" => Method::Options,
                "PATCH" => Method::Patch,
                _ => Method::Get,
            };

            let mut builder = Request::builder();
            builder.method(method).uri(req.uri().to_string());
            for (name, value) in req.headers() {
                if let Ok(val_str) = value.to_str() {
                    builder.header(name.as_str(), val_str);
                }
            }
            builder.body(body.to_vec()).build()
        }

        pub fn spin_to_actix_response(spin_resp: spin_sdk::http::Response) -> actix_web::HttpResponse {
            let status = *spin_resp.status();
            let body = spin_resp.body().to_vec();

            let mut response = actix_web::HttpResponse::build(
                actix_web::http::StatusCode::from_u16(status)
                    .unwrap_or(actix_web::http::StatusCode::INTERNAL_SERVER_ERROR),
            );
            if !body.is_empty() {
                response.content_type("application/json");
            }
            response.body(body)
        }
    }

    pub async fn run() -> std::io::Result<()> {
        fmt().with_env_filter(EnvFilter::from_default_env()).init();

        let store = web::Data::new(MemoryStore::new());
        if mesh::config::seed_demo_data() {
            if let Err(e) = seed_demo_data(store.get_ref()) {
                warn!("failed to seed demo data: {:#}", e);
            }
        }

        let address = mesh::config::bind_address();
        info!("Server listening on http://{}", address);

        HttpServer::new(move || {
            App::new()
                .app_data(store.clone())
                .default_service(web::route().to(handle_all))
        })
        .bind(&address)?
        .run()
        .await
    }

    async fn handle_all(
        store: web::Data<MemoryStore>,
        req: HttpRequest,
        body: web::Bytes,
    ) -> HttpResponse {
        let spin_req = adapter::actix_to_spin_request(&req, body);
        adapter::spin_to_actix_response(mesh::handlers::route(store.get_ref(), spin_req))
    }
}

#[cfg(not(target_arch = "wasm32"))]
#[actix_web::main]
async fn main() -> std::io::Result<()> {
    native::run().await
}

#[cfg(target_arch = "wasm32")]
fn main() {}

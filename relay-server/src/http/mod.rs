mod handlers;
mod routes;
mod server;
mod ws;

pub use routes::create_router;
pub use server::HttpServer;

pub mod api {
    pub mod error;
}
pub mod client {
    pub mod client;
    pub mod credential;
}

pub mod config;
pub mod logger;
pub mod models;
